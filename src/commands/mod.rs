/// Commands module
/// Tauri IPC handlers for the run modal and the build console. The webview
/// only triggers actions here; all state lives in `DesktopState`.

pub mod console;
pub mod run;

use crate::config::ShellConfig;
use crate::services::{CommandRunner, EventBus, Presenter, Views};
use std::sync::Arc;

/// Everything the IPC handlers share.
pub struct DesktopState {
    pub config: ShellConfig,
    pub runner: Arc<CommandRunner>,
    pub views: Views,
}

impl DesktopState {
    pub fn new(config: ShellConfig, bus: Arc<dyn EventBus>, presenter: Arc<dyn Presenter>) -> Self {
        let runner = Arc::new(CommandRunner::from_config(bus.clone(), &config));
        let views = Views::new(bus, runner.clone(), presenter);
        Self {
            config,
            runner,
            views,
        }
    }
}
