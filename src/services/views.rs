/// Mounted views
/// At most one modal per command and one build console. Mounting a view that
/// is already mounted does nothing, so a view never holds two listeners.

use super::channel::EventBus;
use super::console::BuildConsole;
use super::modal::{ModalRunner, Presenter};
use super::session::{Headlines, Invoker};
use crate::config::ConsoleConfig;
use crate::error::{Result, ShellError};
use crate::models::{CommandId, RunRequest};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Views {
    bus: Arc<dyn EventBus>,
    invoker: Arc<dyn Invoker>,
    presenter: Arc<dyn Presenter>,
    modals: Mutex<HashMap<CommandId, ModalRunner>>,
    console: Mutex<Option<BuildConsole>>,
}

impl Views {
    pub fn new(bus: Arc<dyn EventBus>, invoker: Arc<dyn Invoker>, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            bus,
            invoker,
            presenter,
            modals: Mutex::new(HashMap::new()),
            console: Mutex::new(None),
        }
    }

    /// Returns `false` if a modal for the command is already mounted.
    pub fn mount_modal(&self, request: RunRequest, headlines: Headlines) -> bool {
        let mut modals = self.modals.lock();
        if modals.contains_key(&request.command) {
            log::debug!("[Views] modal for {} already mounted", request.command);
            return false;
        }
        let command = request.command.clone();
        let runner = ModalRunner::mount(
            self.bus.clone(),
            self.invoker.clone(),
            self.presenter.clone(),
            request,
            headlines,
        );
        modals.insert(command, runner);
        true
    }

    pub fn with_modal<T>(&self, command: &CommandId, f: impl FnOnce(&ModalRunner) -> T) -> Result<T> {
        let modals = self.modals.lock();
        let runner = modals
            .get(command)
            .ok_or_else(|| ShellError::NotMounted(format!("modal for {}", command)))?;
        Ok(f(runner))
    }

    /// Drops the modal and its listener. The command itself keeps running.
    pub fn unmount_modal(&self, command: &CommandId) -> bool {
        let removed = self.modals.lock().remove(command);
        removed.is_some()
    }

    pub fn is_modal_mounted(&self, command: &CommandId) -> bool {
        self.modals.lock().contains_key(command)
    }

    /// Returns `false` if the console is already mounted.
    pub fn mount_console(&self, config: &ConsoleConfig) -> bool {
        let mut console = self.console.lock();
        if console.is_some() {
            log::debug!("[Views] console already mounted");
            return false;
        }
        *console = Some(BuildConsole::mount(
            self.bus.clone(),
            self.presenter.clone(),
            config,
        ));
        true
    }

    pub fn with_console<T>(&self, f: impl FnOnce(&BuildConsole) -> T) -> Result<T> {
        let console = self.console.lock();
        let console = console
            .as_ref()
            .ok_or_else(|| ShellError::NotMounted("console".to_string()))?;
        Ok(f(console))
    }

    pub fn unmount_console(&self) -> bool {
        let removed = self.console.lock().take();
        removed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, Frame, InvokeArgs, RunStatus};
    use crate::services::channel::LocalBus;

    #[derive(Default)]
    struct Frames(Mutex<Vec<Frame>>);

    impl Presenter for Frames {
        fn present(&self, frame: Frame) {
            self.0.lock().push(frame);
        }
    }

    struct NoopInvoker;

    impl Invoker for NoopInvoker {
        fn invoke(&self, _command: &CommandId, _args: InvokeArgs) -> Result<()> {
            Ok(())
        }
    }

    fn views(bus: &Arc<LocalBus>) -> Views {
        Views::new(bus.clone(), Arc::new(NoopInvoker), Arc::new(Frames::default()))
    }

    fn install() -> RunRequest {
        RunRequest::new("install_sdk", Channel::CommandOutput)
    }

    #[test]
    fn second_modal_mount_is_a_noop() {
        let bus = Arc::new(LocalBus::new());
        let views = views(&bus);

        assert!(views.mount_modal(install(), Headlines::titled("Installing")));
        assert!(!views.mount_modal(install(), Headlines::titled("Installing")));
        assert_eq!(bus.listener_count(Channel::CommandOutput), 1);

        views.with_modal(&CommandId::new("install_sdk"), ModalRunner::begin).unwrap();
        bus.emit(Channel::CommandOutput, "once").unwrap();
        let output = views
            .with_modal(&CommandId::new("install_sdk"), ModalRunner::output)
            .unwrap();
        assert_eq!(output, vec!["once".to_string()]);
    }

    #[test]
    fn unmount_then_mount_starts_fresh() {
        let bus = Arc::new(LocalBus::new());
        let views = views(&bus);
        let command = CommandId::new("install_sdk");

        views.mount_modal(install(), Headlines::titled("Installing"));
        views.with_modal(&command, ModalRunner::begin).unwrap();
        assert!(views.unmount_modal(&command));
        assert!(!views.unmount_modal(&command));
        assert_eq!(bus.listener_count(Channel::CommandOutput), 0);

        assert!(views.mount_modal(install(), Headlines::titled("Installing")));
        let status = views.with_modal(&command, |m| m.view().status).unwrap();
        assert_eq!(status, RunStatus::Idle);
    }

    #[test]
    fn missing_views_are_reported() {
        let bus = Arc::new(LocalBus::new());
        let views = views(&bus);
        let err = views.with_modal(&CommandId::new("nope"), ModalRunner::begin);
        assert!(matches!(err, Err(ShellError::NotMounted(_))));
        assert!(matches!(views.with_console(BuildConsole::len), Err(ShellError::NotMounted(_))));
        assert!(!views.is_modal_mounted(&CommandId::new("nope")));
    }

    #[test]
    fn console_mounts_once() {
        let bus = Arc::new(LocalBus::new());
        let views = views(&bus);

        assert!(views.mount_console(&ConsoleConfig::default()));
        assert!(!views.mount_console(&ConsoleConfig::default()));
        assert_eq!(bus.listener_count(Channel::BuildOutput), 1);

        bus.emit(Channel::BuildOutput, "compiling").unwrap();
        assert_eq!(views.with_console(BuildConsole::len).unwrap(), 1);

        assert!(views.unmount_console());
        assert_eq!(bus.listener_count(Channel::BuildOutput), 0);
    }
}
