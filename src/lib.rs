/// IDE shell core
/// Runs backend commands and streams their output, line by line, into either
/// a one-shot run modal or the persistent build console.
///
/// Module structure:
/// - services: channel transport, sentinel protocol, ANSI rendering, run
///   session, build console, PTY runner
/// - models: shared data types
/// - config: `shell.json` loading
/// - commands / bridge: Tauri IPC handlers and event plumbing (`desktop` feature)

pub mod config;
pub mod error;
pub mod models;
pub mod services;

#[cfg(feature = "desktop")]
mod bridge;
#[cfg(feature = "desktop")]
mod commands;

pub use error::{Result, ShellError};

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use crate::bridge::{TauriBus, WebviewPresenter};
    use crate::commands::DesktopState;
    use crate::config::{ShellConfig, CONFIG_FILE};
    use std::sync::Arc;
    use tauri::{Manager, RunEvent};

    tauri::Builder::default()
        .setup(|app| {
            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Info)
                        .build(),
                )?;
            }

            let config_path = app.path().app_config_dir()?.join(CONFIG_FILE);
            let config = ShellConfig::load(&config_path)?;
            log::info!(
                "Loaded {} command(s) from {}",
                config.commands.len(),
                config_path.display()
            );

            let handle = app.handle().clone();
            app.manage(DesktopState::new(
                config,
                Arc::new(TauriBus::new(handle.clone())),
                Arc::new(WebviewPresenter::new(handle)),
            ));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::run::modal_mount,
            commands::run::modal_begin,
            commands::run::modal_submit_secret,
            commands::run::modal_cancel_secret,
            commands::run::modal_close,
            commands::run::modal_view,
            commands::run::modal_unmount,
            commands::console::console_mount,
            commands::console::console_scroll,
            commands::console::console_resize,
            commands::console::console_view,
            commands::console::console_unmount,
            commands::console::run_build,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| {
            if let RunEvent::Exit = event {
                // Views detach on their own; running commands must not outlive the app.
                log::info!("App shutting down - killing running commands");
                if let Some(state) = app_handle.try_state::<DesktopState>() {
                    state.runner.shutdown();
                }
            }
        });
}
