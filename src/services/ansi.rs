/// ANSI-to-Markup Renderer
/// Turns raw terminal output into HTML for the webview: text is escaped first,
/// then SGR escape sequences become `<span style=...>` runs.
///
/// The renderer is pure. Callers may re-render a growing buffer as often as
/// they like; nothing carries over between calls.

use crate::models::Markup;

const DEFAULT_FG: Color = Color::Rgb(0xff, 0xff, 0xff);
const DEFAULT_BG: Color = Color::Rgb(0x00, 0x00, 0x00);

/// The 16 base colours, normal then bright.
const PALETTE: [&str; 16] = [
    "#000", "#A00", "#0A0", "#A50", "#00A", "#A0A", "#0AA", "#AAA", "#555", "#F55", "#5F5",
    "#FF5", "#55F", "#F5F", "#5FF", "#FFF",
];

const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    fn css(&self) -> String {
        match *self {
            Color::Indexed(n) if n < 16 => PALETTE[n as usize].to_string(),
            Color::Indexed(n) if n < 232 => {
                let n = n - 16;
                let r = CUBE_LEVELS[(n / 36) as usize];
                let g = CUBE_LEVELS[((n / 6) % 6) as usize];
                let b = CUBE_LEVELS[(n % 6) as usize];
                format!("#{:02x}{:02x}{:02x}", r, g, b)
            }
            Color::Indexed(n) => {
                let level = 8 + (n - 232) * 10;
                format!("#{:02x}{:02x}{:02x}", level, level, level)
            }
            Color::Rgb(r, g, b) => format!("#{:02x}{:02x}{:02x}", r, g, b),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Style {
    fg: Option<Color>,
    bg: Option<Color>,
    bold: bool,
    faint: bool,
    italic: bool,
    underline: bool,
    inverse: bool,
    conceal: bool,
    strike: bool,
}

impl Style {
    fn is_plain(&self) -> bool {
        *self == Style::default()
    }

    fn css(&self) -> String {
        let (fg, bg) = if self.inverse {
            (
                Some(self.bg.unwrap_or(DEFAULT_BG)),
                Some(self.fg.unwrap_or(DEFAULT_FG)),
            )
        } else {
            (self.fg, self.bg)
        };

        let mut rules = Vec::new();
        if let Some(fg) = fg {
            rules.push(format!("color:{}", fg.css()));
        }
        if let Some(bg) = bg {
            rules.push(format!("background-color:{}", bg.css()));
        }
        if self.bold {
            rules.push("font-weight:bold".to_string());
        }
        if self.faint {
            rules.push("opacity:0.5".to_string());
        }
        if self.italic {
            rules.push("font-style:italic".to_string());
        }
        match (self.underline, self.strike) {
            (true, true) => rules.push("text-decoration:underline line-through".to_string()),
            (true, false) => rules.push("text-decoration:underline".to_string()),
            (false, true) => rules.push("text-decoration:line-through".to_string()),
            (false, false) => {}
        }
        if self.conceal {
            rules.push("visibility:hidden".to_string());
        }
        rules.join(";")
    }

    /// Apply one SGR parameter list, e.g. `1;38;5;208` or `38:2::255:0:0`.
    fn apply(&mut self, params: &str) {
        let fields: Vec<&str> = params.split(';').collect();
        let mut i = 0;
        while i < fields.len() {
            let field = fields[i];
            if field.contains(':') {
                self.apply_group(field);
                i += 1;
                continue;
            }
            let Some(code) = top_level_code(field) else {
                i += 1;
                continue;
            };
            if code == 38 || code == 48 {
                let rest: Vec<Option<u32>> = fields[i + 1..].iter().map(|f| top_level_code(f)).collect();
                let (color, used) = extended_color(&rest);
                self.set_extended(code, color);
                i += used;
            } else {
                self.apply_code(code);
            }
            i += 1;
        }
    }

    /// A colon group carries its own sub-parameters, e.g. `4:3` or
    /// `38:2:<colour space>:r:g:b`.
    fn apply_group(&mut self, group: &str) {
        let mut parts = group.split(':');
        let head = parts.next().and_then(|h| h.parse::<u32>().ok());
        let subs: Vec<&str> = parts.collect();
        match head {
            Some(code @ (38 | 48)) => {
                let mode = subs.first().and_then(|m| m.parse::<u32>().ok());
                // The truecolour form may carry a colour space id (often empty) before r:g:b.
                let values = match mode {
                    Some(2) if subs.len() >= 5 => &subs[2..],
                    _ => subs.get(1..).unwrap_or(&[]),
                };
                let tail: Vec<Option<u32>> = std::iter::once(mode)
                    .chain(values.iter().map(|v| v.parse::<u32>().ok()))
                    .collect();
                let (color, _) = extended_color(&tail);
                self.set_extended(code, color);
            }
            Some(4) => self.underline = subs.first().map_or(true, |style| *style != "0"),
            Some(code) => self.apply_code(code),
            None => {}
        }
    }

    fn set_extended(&mut self, code: u32, color: Option<Color>) {
        let Some(color) = color else {
            return;
        };
        if code == 38 {
            self.fg = Some(color);
        } else {
            self.bg = Some(color);
        }
    }

    fn apply_code(&mut self, code: u32) {
        match code {
            0 => *self = Style::default(),
            1 => self.bold = true,
            2 => self.faint = true,
            3 => self.italic = true,
            4 | 21 => self.underline = true,
            7 => self.inverse = true,
            8 => self.conceal = true,
            9 => self.strike = true,
            22 => {
                self.bold = false;
                self.faint = false;
            }
            23 => self.italic = false,
            24 => self.underline = false,
            27 => self.inverse = false,
            28 => self.conceal = false,
            29 => self.strike = false,
            30..=37 => self.fg = Some(Color::Indexed((code - 30) as u8)),
            39 => self.fg = None,
            40..=47 => self.bg = Some(Color::Indexed((code - 40) as u8)),
            49 => self.bg = None,
            90..=97 => self.fg = Some(Color::Indexed((code - 90 + 8) as u8)),
            100..=107 => self.bg = Some(Color::Indexed((code - 100 + 8) as u8)),
            _ => {}
        }
    }
}

// `ESC[m` is a reset; so is every empty `;` field.
fn top_level_code(field: &str) -> Option<u32> {
    if field.is_empty() {
        Some(0)
    } else {
        field.parse().ok()
    }
}

/// Parse the tail of a `38`/`48` parameter. Returns the colour (if valid) and
/// how many fields were consumed.
fn extended_color(rest: &[Option<u32>]) -> (Option<Color>, usize) {
    let channel = |v: Option<u32>| v.and_then(|v| u8::try_from(v).ok());
    match rest.first() {
        Some(Some(5)) => {
            let color = rest.get(1).copied().and_then(channel).map(Color::Indexed);
            (color, rest.len().min(2))
        }
        Some(Some(2)) => {
            let rgb = (
                rest.get(1).copied().and_then(channel),
                rest.get(2).copied().and_then(channel),
                rest.get(3).copied().and_then(channel),
            );
            let color = match rgb {
                (Some(r), Some(g), Some(b)) => Some(Color::Rgb(r, g, b)),
                _ => None,
            };
            (color, rest.len().min(4))
        }
        Some(_) => (None, 1),
        None => (None, 0),
    }
}

/// Escape the five HTML metacharacters.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

struct Writer {
    out: String,
    style: Style,
    open: bool,
}

impl Writer {
    fn restyle(&mut self, next: Style) {
        if next == self.style {
            return;
        }
        if self.open {
            self.out.push_str("</span>");
            self.open = false;
        }
        if !next.is_plain() {
            self.out.push_str("<span style=\"");
            self.out.push_str(&next.css());
            self.out.push_str("\">");
            self.open = true;
        }
        self.style = next;
    }

    fn finish(mut self) -> String {
        if self.open {
            self.out.push_str("</span>");
        }
        self.out
    }
}

/// Render terminal text to markup.
///
/// Unknown or truncated escape sequences are kept as literal text without the
/// ESC byte. Well-formed control sequences with no visual meaning here
/// (cursor motion, erase, window title) are removed.
pub fn render(buffer: &str) -> Markup {
    let escaped = escape_html(buffer);
    let mut w = Writer {
        out: String::with_capacity(escaped.len()),
        style: Style::default(),
        open: false,
    };
    let mut chars = escaped.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            w.out.push(c);
            continue;
        }

        match chars.peek() {
            Some('[') => {
                chars.next();
                let mut params = String::new();
                while let Some(&next) = chars.peek() {
                    if ('\x30'..='\x3f').contains(&next) {
                        params.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let mut intermediates = String::new();
                while let Some(&next) = chars.peek() {
                    if ('\x20'..='\x2f').contains(&next) {
                        intermediates.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match chars.peek() {
                    Some(&fin) if ('\x40'..='\x7e').contains(&fin) => {
                        chars.next();
                        let is_sgr = fin == 'm'
                            && intermediates.is_empty()
                            && params.chars().all(|p| p.is_ascii_digit() || p == ';' || p == ':');
                        if is_sgr {
                            let mut next = w.style;
                            next.apply(&params);
                            w.restyle(next);
                        }
                    }
                    _ => {
                        // Truncated sequence
                        w.out.push('[');
                        w.out.push_str(&params);
                        w.out.push_str(&intermediates);
                    }
                }
            }
            Some(']') => {
                // OSC ends at BEL or `ESC \`. Anything else that is not
                // printable (a newline, another escape) means it never will.
                let mut scan = chars.clone();
                scan.next();
                let mut terminated = false;
                while let Some(next) = scan.next() {
                    match next {
                        '\x07' => {
                            terminated = true;
                            break;
                        }
                        '\x1b' => {
                            terminated = scan.next() == Some('\\');
                            break;
                        }
                        c if c.is_control() => break,
                        _ => {}
                    }
                }
                if terminated {
                    chars = scan;
                } else {
                    chars.next();
                    w.out.push(']');
                }
            }
            // Lone or unsupported escape: drop the ESC, keep what follows.
            _ => {}
        }
    }

    Markup::from_rendered(w.finish())
}
