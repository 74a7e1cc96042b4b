/// Run modal commands
/// Called from the frontend via e.g. invoke("modal_begin", { command: "install_sdk" })

use super::DesktopState;
use crate::models::{CommandId, ModalView, Secret};
use crate::services::ModalRunner;
use tauri::State;

/// Mount the modal for a configured command. Mounting twice is harmless and
/// returns `false`.
#[tauri::command]
pub fn modal_mount(state: State<'_, DesktopState>, command: CommandId) -> Result<bool, String> {
    let entry = state
        .config
        .command(&command)
        .ok_or_else(|| format!("unknown command: {}", command))?;
    Ok(state.views.mount_modal(entry.request(), entry.headlines()))
}

#[tauri::command]
pub fn modal_begin(state: State<'_, DesktopState>, command: CommandId) -> Result<(), String> {
    state
        .views
        .with_modal(&command, ModalRunner::begin)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn modal_submit_secret(
    state: State<'_, DesktopState>,
    command: CommandId,
    password: Secret,
) -> Result<(), String> {
    state
        .views
        .with_modal(&command, |runner| runner.submit_secret(password))
        .and_then(|submitted| submitted)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn modal_cancel_secret(state: State<'_, DesktopState>, command: CommandId) -> Result<(), String> {
    state
        .views
        .with_modal(&command, ModalRunner::cancel_secret)
        .and_then(|cancelled| cancelled)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn modal_close(state: State<'_, DesktopState>, command: CommandId) -> Result<(), String> {
    state
        .views
        .with_modal(&command, ModalRunner::close)
        .and_then(|closed| closed)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn modal_view(state: State<'_, DesktopState>, command: CommandId) -> Result<ModalView, String> {
    state
        .views
        .with_modal(&command, ModalRunner::view)
        .map_err(|e| e.to_string())
}

/// Drop the modal and its listener. The command itself keeps running.
#[tauri::command]
pub fn modal_unmount(state: State<'_, DesktopState>, command: CommandId) -> bool {
    state.views.unmount_modal(&command)
}
