/// Event Channel Client
/// Line-oriented pub/sub between the backend runner and its consumers.
///
/// `EventBus` is the transport seam: `LocalBus` dispatches in-process, the
/// desktop build routes through the Tauri event system. Consumers hold a
/// `Subscription`, which unlistens exactly once when dropped.

use crate::error::Result;
use crate::models::Channel;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type LineHandler = Box<dyn Fn(&str) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

pub trait EventBus: Send + Sync {
    /// Register `handler` for every payload emitted on `channel`.
    fn listen(&self, channel: Channel, handler: LineHandler) -> ListenerId;

    /// Remove a listener. No delivery to it happens after this returns.
    fn unlisten(&self, id: ListenerId);

    fn emit(&self, channel: Channel, line: &str) -> Result<()>;
}

struct Slot {
    id: ListenerId,
    channel: Channel,
    handler: Mutex<Option<LineHandler>>,
}

/// In-process bus. Payloads are delivered synchronously on the emitting
/// thread, in emission order.
///
/// A handler must not emit on its own channel or unlisten itself; both
/// would wait on the slot it is running in.
pub struct LocalBus {
    next_id: AtomicU64,
    slots: Mutex<Vec<Arc<Slot>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn listener_count(&self, channel: Channel) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|slot| slot.channel == channel)
            .count()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for LocalBus {
    fn listen(&self, channel: Channel, handler: LineHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.slots.lock().push(Arc::new(Slot {
            id,
            channel,
            handler: Mutex::new(Some(handler)),
        }));
        log::debug!("[Bus] listener {} on {}", id.0, channel);
        id
    }

    fn unlisten(&self, id: ListenerId) {
        let removed = {
            let mut slots = self.slots.lock();
            slots
                .iter()
                .position(|slot| slot.id == id)
                .map(|pos| slots.remove(pos))
        };
        if let Some(slot) = removed {
            // Waits for an in-flight delivery to finish.
            slot.handler.lock().take();
            log::debug!("[Bus] removed listener {} from {}", id.0, slot.channel);
        }
    }

    fn emit(&self, channel: Channel, line: &str) -> Result<()> {
        let targets: Vec<Arc<Slot>> = self
            .slots
            .lock()
            .iter()
            .filter(|slot| slot.channel == channel)
            .cloned()
            .collect();

        for slot in targets {
            let handler = slot.handler.lock();
            if let Some(handler) = handler.as_ref() {
                handler(line);
            }
        }
        Ok(())
    }
}

/// An active listener, released when dropped.
pub struct Subscription {
    bus: Arc<dyn EventBus>,
    channel: Channel,
    id: Option<ListenerId>,
}

impl Subscription {
    pub fn acquire(
        bus: Arc<dyn EventBus>,
        channel: Channel,
        on_line: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        let id = bus.listen(channel, Box::new(on_line));
        Self {
            bus,
            channel,
            id: Some(id),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// Unsubscribe now instead of at drop.
    pub fn release(mut self) {
        self.unlisten();
    }

    fn unlisten(&mut self) {
        if let Some(id) = self.id.take() {
            self.bus.unlisten(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unlisten();
    }
}
