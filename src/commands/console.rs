/// Build console commands
/// The console listens on the build channel for as long as it is mounted.

use super::DesktopState;
use crate::models::{CommandId, ConsoleView, InvokeArgs};
use crate::services::{BuildConsole, Invoker};
use tauri::State;

#[tauri::command]
pub fn console_mount(state: State<'_, DesktopState>) -> bool {
    state.views.mount_console(&state.config.console)
}

#[tauri::command]
pub fn console_scroll(state: State<'_, DesktopState>, top: usize) -> Result<(), String> {
    state
        .views
        .with_console(|console| console.scroll_to(top))
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn console_resize(state: State<'_, DesktopState>, rows: usize) -> Result<(), String> {
    state
        .views
        .with_console(|console| console.resize(rows))
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn console_view(state: State<'_, DesktopState>) -> Option<ConsoleView> {
    state.views.with_console(BuildConsole::view).ok()
}

#[tauri::command]
pub fn console_unmount(state: State<'_, DesktopState>) -> bool {
    state.views.unmount_console()
}

/// Start a build command; its output lands in the console.
#[tauri::command]
pub fn run_build(state: State<'_, DesktopState>, command: CommandId) -> Result<(), String> {
    state
        .runner
        .invoke(&command, InvokeArgs::default())
        .map_err(|e| e.to_string())
}
