/// Shell configuration
/// Loaded from `shell.json` in the app config directory. Every field has a
/// default, so a missing file or a partial file is fine.

use crate::error::{Result, ShellError};
use crate::models::{Channel, CommandId, RunRequest};
use crate::services::session::Headlines;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "shell.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsoleConfig {
    /// Rows rendered at once.
    pub viewport_rows: usize,
    /// How close to the end (in rows) still counts as "at the bottom".
    pub follow_threshold: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            viewport_rows: 40,
            follow_threshold: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtyConfig {
    pub cols: u16,
    pub rows: u16,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self { cols: 120, rows: 40 }
    }
}

fn default_channel() -> Channel {
    Channel::CommandOutput
}

/// A backend command the shell can run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEntry {
    pub id: CommandId,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default = "default_channel")]
    pub channel: Channel,
    #[serde(default)]
    pub requires_secret: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub done_message: Option<String>,
    #[serde(default)]
    pub failed_message: Option<String>,
}

impl CommandEntry {
    pub fn request(&self) -> RunRequest {
        RunRequest {
            command: self.id.clone(),
            channel: self.channel,
            requires_secret: self.requires_secret,
        }
    }

    pub fn headlines(&self) -> Headlines {
        Headlines {
            title: self.title.clone().unwrap_or_else(|| self.id.to_string()),
            done: self.done_message.clone(),
            failed: self.failed_message.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub console: ConsoleConfig,
    pub pty: PtyConfig,
    pub commands: Vec<CommandEntry>,
}

impl ShellConfig {
    /// Read the config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("[Config] {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&content)
            .map_err(|e| ShellError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: ShellConfig =
            serde_json::from_str(content).map_err(|e| ShellError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.console.viewport_rows == 0 {
            return Err(ShellError::Config("console.viewportRows must be at least 1".into()));
        }
        let mut seen = HashSet::new();
        for entry in &self.commands {
            if !seen.insert(&entry.id) {
                return Err(ShellError::Config(format!("duplicate command id {}", entry.id)));
            }
            if entry.program.trim().is_empty() {
                return Err(ShellError::Config(format!("command {} has no program", entry.id)));
            }
        }
        Ok(())
    }

    pub fn command(&self, id: &CommandId) -> Option<&CommandEntry> {
        self.commands.iter().find(|entry| &entry.id == id)
    }
}
