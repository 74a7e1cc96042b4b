/// Models module
/// Shared data types between the streaming core, the backend runner and the
/// webview. Everything that crosses IPC is serializable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Known event channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    /// Persistent build console.
    BuildOutput,
    /// One-shot modal runner.
    CommandOutput,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::BuildOutput, Channel::CommandOutput];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::BuildOutput => "build-output",
            Channel::CommandOutput => "command-output",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical command name, resolved by the backend runner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommandId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A unit of work. Immutable for the life of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub command: CommandId,
    pub channel: Channel,
    pub requires_secret: bool,
}

impl RunRequest {
    pub fn new(command: impl Into<CommandId>, channel: Channel) -> Self {
        Self {
            command: command.into(),
            channel,
            requires_secret: false,
        }
    }

    pub fn with_secret(mut self) -> Self {
        self.requires_secret = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Idle,
    AwaitingSecret,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

/// A secret typed by the user (e.g. a sudo password).
///
/// The bytes are overwritten when the value is wiped or dropped, and `Debug`
/// never prints them.
#[derive(Default, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zero the backing buffer and leave the secret empty.
    pub fn wipe(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        for byte in bytes.iter_mut() {
            // SAFETY: `byte` is a valid, exclusive reference into `bytes`.
            unsafe { std::ptr::write_volatile(byte, 0) };
        }
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Arguments forwarded with an invocation.
#[derive(Debug, Default)]
pub struct InvokeArgs {
    pub password: Option<Secret>,
}

impl InvokeArgs {
    pub fn with_password(password: Secret) -> Self {
        Self {
            password: Some(password),
        }
    }
}

/// Escaped, style-annotated HTML produced by the ANSI renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Markup(String);

impl Markup {
    pub(crate) fn from_rendered(html: String) -> Self {
        Self(html)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a modal runner, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalView {
    pub command: CommandId,
    pub status: RunStatus,
    pub headline: String,
    pub markup: Markup,
    pub closable: bool,
    pub secret_prompt: bool,
    pub exit_code: Option<String>,
}

/// One rendered console row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedLine {
    pub index: usize,
    pub markup: Markup,
}

/// Visible slice of the build console.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleView {
    pub total: usize,
    pub top: usize,
    pub following: bool,
    pub lines: Vec<RenderedLine>,
}

/// Display updates pushed to the presenter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    Modal(ModalView),
    /// Scroll the modal to its newest line once the previous frame is laid out.
    ScrollToLatest { command: CommandId },
    Console(ConsoleView),
}
