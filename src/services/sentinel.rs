/// Line Sentinel Protocol
/// Commands report termination in-band: the backend emits a payload of the
/// form `command.done.<code>` on the same channel as the output lines.

/// Substring that marks a completion payload.
pub const DONE_MARKER: &str = "command.done";

/// Exit code the runner reports when the output stream could not be read.
pub const READ_FAILURE_CODE: i32 = 999;

/// Classification of one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<'a> {
    Content(&'a str),
    Completion(Completion),
}

/// Exit status carried by a completion payload.
///
/// Only the exact text `0` is a success. A missing or non-numeric code is a
/// failure like any nonzero one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    code: String,
}

impl Completion {
    pub fn raw_code(&self) -> &str {
        &self.code
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.code.parse().ok()
    }

    pub fn succeeded(&self) -> bool {
        self.code == "0"
    }
}

pub fn classify(payload: &str) -> Payload<'_> {
    let Some(start) = payload.find(DONE_MARKER) else {
        return Payload::Content(payload);
    };

    let rest = &payload[start + DONE_MARKER.len()..];
    let code = rest
        .strip_prefix('.')
        .and_then(|tail| tail.split('.').next())
        .unwrap_or_default();

    Payload::Completion(Completion {
        code: code.to_string(),
    })
}

/// Wire form of a completion payload.
pub fn completion_payload(code: i32) -> String {
    format!("{}.{}", DONE_MARKER, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(payload: &str) -> Completion {
        match classify(payload) {
            Payload::Completion(c) => c,
            Payload::Content(line) => panic!("expected completion, got content {:?}", line),
        }
    }

    #[test]
    fn plain_lines_pass_through_verbatim() {
        assert_eq!(classify("Compiling foo v0.1.0"), Payload::Content("Compiling foo v0.1.0"));
        assert_eq!(classify(""), Payload::Content(""));
        assert_eq!(classify("\n  indented"), Payload::Content("\n  indented"));
        assert_eq!(classify("command done"), Payload::Content("command done"));
    }

    #[test]
    fn zero_is_success() {
        let done = completion("foo.command.done.0");
        assert!(done.succeeded());
        assert_eq!(done.exit_code(), Some(0));

        assert!(completion("command.done.0").succeeded());
    }

    #[test]
    fn nonzero_is_failure() {
        let done = completion("foo.command.done.7");
        assert!(!done.succeeded());
        assert_eq!(done.exit_code(), Some(7));
        assert_eq!(done.raw_code(), "7");
    }

    #[test]
    fn malformed_code_still_terminates_as_failure() {
        let done = completion("foo.command.done.x");
        assert!(!done.succeeded());
        assert_eq!(done.exit_code(), None);

        let bare = completion("command.done");
        assert!(!bare.succeeded());
        assert_eq!(bare.raw_code(), "");

        assert!(!completion("command.done.00").succeeded());
        assert!(!completion("command.done. 0").succeeded());
    }

    #[test]
    fn wire_form_matches_classifier() {
        assert_eq!(completion_payload(3), "command.done.3");
        assert_eq!(completion(&completion_payload(READ_FAILURE_CODE)).exit_code(), Some(999));
        assert!(completion(&completion_payload(0)).succeeded());
    }
}
