/// Tauri bridge
/// Routes the core's event bus and display frames through the Tauri event
/// system. Channel payloads travel as JSON strings.

use crate::error::{Result, ShellError};
use crate::models::{Channel, Frame};
use crate::services::channel::{EventBus, LineHandler, ListenerId};
use crate::services::modal::Presenter;
use tauri::{AppHandle, Emitter, Listener};

pub const MODAL_FRAME_EVENT: &str = "modal-frame";
pub const CONSOLE_FRAME_EVENT: &str = "console-frame";

pub struct TauriBus {
    app: AppHandle,
}

impl TauriBus {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl EventBus for TauriBus {
    fn listen(&self, channel: Channel, handler: LineHandler) -> ListenerId {
        let id = self.app.listen_any(channel.as_str(), move |event| {
            match serde_json::from_str::<String>(event.payload()) {
                Ok(line) => handler(&line),
                Err(e) => log::warn!("[Bridge] non-text payload on {}: {}", channel, e),
            }
        });
        ListenerId::from_raw(u64::from(id))
    }

    fn unlisten(&self, id: ListenerId) {
        match u32::try_from(id.raw()) {
            Ok(raw) => self.app.unlisten(raw),
            Err(_) => log::warn!("[Bridge] invalid listener id {}", id.raw()),
        }
    }

    fn emit(&self, channel: Channel, line: &str) -> Result<()> {
        self.app
            .emit(channel.as_str(), line)
            .map_err(|e| ShellError::Emit {
                channel: channel.to_string(),
                message: e.to_string(),
            })
    }
}

/// Pushes frames to the webview.
pub struct WebviewPresenter {
    app: AppHandle,
}

impl WebviewPresenter {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl Presenter for WebviewPresenter {
    fn present(&self, frame: Frame) {
        let event = match frame {
            Frame::Console(_) => CONSOLE_FRAME_EVENT,
            Frame::Modal(_) | Frame::ScrollToLatest { .. } => MODAL_FRAME_EVENT,
        };
        if let Err(e) = self.app.emit(event, &frame) {
            log::warn!("[Bridge] failed to present frame: {}", e);
        }
    }
}
