/// Build Console
/// Persistent, append-only view of the build channel. Unlike the modal runner
/// it never finishes: a completion is narrated as one more line and the
/// console keeps listening.
///
/// Only the rows inside the viewport are rendered, so the history can grow
/// without making each update more expensive.

use super::ansi;
use super::channel::{EventBus, Subscription};
use super::modal::Presenter;
use super::sentinel::{self, Payload};
use crate::config::ConsoleConfig;
use crate::models::{Channel, ConsoleView, Frame, RenderedLine};
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::Arc;

pub const CONSOLE_CHANNEL: Channel = Channel::BuildOutput;

pub const FINISHED_PREFIX: &str = "Command finished with exit code: ";

#[derive(Debug, Default)]
pub struct ConsoleBuffer {
    lines: Vec<String>,
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one payload; returns the index of the stored line.
    pub fn push(&mut self, payload: &str) -> usize {
        let line = match sentinel::classify(payload) {
            Payload::Content(line) => line.to_string(),
            Payload::Completion(done) => format!("{}{}", FINISHED_PREFIX, done.raw_code()),
        };
        self.lines.push(line);
        self.lines.len() - 1
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn render(&self, range: Range<usize>) -> Vec<RenderedLine> {
        let end = range.end.min(self.lines.len());
        let start = range.start.min(end);
        self.lines[start..end]
            .iter()
            .enumerate()
            .map(|(offset, line)| RenderedLine {
                index: start + offset,
                markup: ansi::render(line),
            })
            .collect()
    }
}

/// Scroll position in rows, with auto-follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    top: usize,
    rows: usize,
    threshold: usize,
}

impl Viewport {
    pub fn new(rows: usize, threshold: usize) -> Self {
        Self {
            top: 0,
            rows: rows.max(1),
            threshold,
        }
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn max_top(&self, total: usize) -> usize {
        total.saturating_sub(self.rows)
    }

    /// Within `threshold` rows of the end, inclusive.
    pub fn is_near_bottom(&self, total: usize) -> bool {
        total.saturating_sub(self.top + self.rows) <= self.threshold
    }

    /// Update after the history grew from `before` to `after` lines. Returns
    /// whether the view is following the tail.
    pub fn on_append(&mut self, before: usize, after: usize) -> bool {
        if self.is_near_bottom(before) {
            self.top = self.max_top(after);
            true
        } else {
            false
        }
    }

    pub fn scroll_to(&mut self, top: usize, total: usize) {
        self.top = top.min(self.max_top(total));
    }

    pub fn resize(&mut self, rows: usize, total: usize) {
        let following = self.is_near_bottom(total);
        self.rows = rows.max(1);
        if following {
            self.top = self.max_top(total);
        } else {
            self.top = self.top.min(self.max_top(total));
        }
    }

    pub fn window(&self, total: usize) -> Range<usize> {
        let start = self.top.min(total);
        start..(start + self.rows).min(total)
    }
}

struct ConsoleState {
    buffer: ConsoleBuffer,
    viewport: Viewport,
}

impl ConsoleState {
    fn view(&self) -> ConsoleView {
        let total = self.buffer.len();
        ConsoleView {
            total,
            top: self.viewport.top(),
            following: self.viewport.is_near_bottom(total),
            lines: self.buffer.render(self.viewport.window(total)),
        }
    }
}

pub struct BuildConsole {
    state: Arc<Mutex<ConsoleState>>,
    presenter: Arc<dyn Presenter>,
    _subscription: Subscription,
}

impl BuildConsole {
    pub fn mount(bus: Arc<dyn EventBus>, presenter: Arc<dyn Presenter>, config: &ConsoleConfig) -> Self {
        let state = Arc::new(Mutex::new(ConsoleState {
            buffer: ConsoleBuffer::new(),
            viewport: Viewport::new(config.viewport_rows, config.follow_threshold),
        }));

        let subscription = {
            let state = state.clone();
            let presenter = presenter.clone();
            Subscription::acquire(bus, CONSOLE_CHANNEL, move |line| {
                let view = {
                    let mut state = state.lock();
                    let before = state.buffer.len();
                    state.buffer.push(line);
                    let after = state.buffer.len();
                    state.viewport.on_append(before, after);
                    state.view()
                };
                presenter.present(Frame::Console(view));
            })
        };

        log::debug!("[Console] mounted on {}", CONSOLE_CHANNEL);
        Self {
            state,
            presenter,
            _subscription: subscription,
        }
    }

    /// User scroll. Moving away from the bottom stops auto-follow until the
    /// view is brought back within the threshold.
    pub fn scroll_to(&self, top: usize) {
        let view = {
            let mut state = self.state.lock();
            let total = state.buffer.len();
            state.viewport.scroll_to(top, total);
            state.view()
        };
        self.presenter.present(Frame::Console(view));
    }

    pub fn resize(&self, rows: usize) {
        let view = {
            let mut state = self.state.lock();
            let total = state.buffer.len();
            state.viewport.resize(rows, total);
            state.view()
        };
        self.presenter.present(Frame::Console(view));
    }

    pub fn view(&self) -> ConsoleView {
        self.state.lock().view()
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lines(&self) -> Vec<String> {
        self.state.lock().buffer.lines().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_is_narrated_inline() {
        let mut buffer = ConsoleBuffer::new();
        buffer.push("Compiling");
        buffer.push("command.done.0");
        buffer.push("command.done.x");
        buffer.push("after");
        assert_eq!(
            buffer.lines(),
            [
                "Compiling",
                "Command finished with exit code: 0",
                "Command finished with exit code: x",
                "after",
            ]
        );
    }

    #[test]
    fn renders_only_the_requested_rows() {
        let mut buffer = ConsoleBuffer::new();
        for i in 0..1000 {
            buffer.push(&format!("line {}", i));
        }
        let rows = buffer.render(500..503);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].index, 500);
        assert_eq!(rows[2].markup.as_str(), "line 502");

        assert_eq!(buffer.render(998..2000).len(), 2);
        assert!(buffer.render(5000..6000).is_empty());
    }

    #[test]
    fn each_line_is_escaped() {
        let mut buffer = ConsoleBuffer::new();
        buffer.push("<img src=x onerror=alert(1)>");
        let rows = buffer.render(0..1);
        assert_eq!(rows[0].markup.as_str(), "&lt;img src=x onerror=alert(1)&gt;");
    }

    fn filled(total: usize, viewport: &mut Viewport) {
        for n in 0..total {
            viewport.on_append(n, n + 1);
        }
    }

    #[test]
    fn follows_while_at_bottom() {
        let mut viewport = Viewport::new(10, 6);
        filled(100, &mut viewport);
        assert_eq!(viewport.top(), 90);
        assert!(viewport.on_append(100, 101));
        assert_eq!(viewport.top(), 91);
        assert_eq!(viewport.window(101), 91..101);
    }

    #[test]
    fn short_history_stays_at_top() {
        let mut viewport = Viewport::new(10, 6);
        filled(4, &mut viewport);
        assert_eq!(viewport.top(), 0);
        assert_eq!(viewport.window(4), 0..4);
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut viewport = Viewport::new(10, 6);
        filled(100, &mut viewport);

        // Six rows above the end: still follows.
        viewport.scroll_to(84, 100);
        assert!(viewport.is_near_bottom(100));
        assert!(viewport.on_append(100, 101));
        assert_eq!(viewport.top(), 91);

        // Seven rows above the end: left alone.
        viewport.scroll_to(84, 101);
        assert!(!viewport.is_near_bottom(101));
        assert!(!viewport.on_append(101, 102));
        assert_eq!(viewport.top(), 84);
    }

    #[test]
    fn scrolled_up_position_is_kept() {
        let mut viewport = Viewport::new(10, 6);
        filled(100, &mut viewport);
        viewport.scroll_to(20, 100);
        for n in 100..150 {
            viewport.on_append(n, n + 1);
        }
        assert_eq!(viewport.top(), 20);
    }

    #[test]
    fn scroll_is_clamped() {
        let mut viewport = Viewport::new(10, 6);
        filled(30, &mut viewport);
        viewport.scroll_to(500, 30);
        assert_eq!(viewport.top(), 20);
    }

    #[test]
    fn resize_keeps_following() {
        let mut viewport = Viewport::new(10, 2);
        filled(50, &mut viewport);
        viewport.resize(20, 50);
        assert_eq!(viewport.top(), 30);
        assert_eq!(viewport.rows(), 20);

        viewport.scroll_to(0, 50);
        viewport.resize(5, 50);
        assert_eq!(viewport.top(), 0);
    }
}
