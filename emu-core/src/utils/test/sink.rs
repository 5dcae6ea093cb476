use crate::plugin::{ClientEvent, ClientPlugin, NotificationSink};
use std::sync::{Arc, Mutex};

/// Keeps every event it is handed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Vec<ClientEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink::default()
    }

    pub fn events(&self) -> &[ClientEvent] {
        &self.events
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&mut self, event: &ClientEvent) {
        self.events.push(*event);
    }
}

/// What a [`RecordingPlugin`] saw, readable after the plugin moved into a client.
#[derive(Debug, Default)]
pub struct PluginLog {
    pub events: Vec<ClientEvent>,
    pub removed: bool,
}

/// A plugin that writes into a shared [`PluginLog`].
pub struct RecordingPlugin {
    name: String,
    log: Arc<Mutex<PluginLog>>,
}

impl RecordingPlugin {
    pub fn new(name: &str) -> (Self, Arc<Mutex<PluginLog>>) {
        let log = Arc::new(Mutex::new(PluginLog::default()));
        let plugin = RecordingPlugin {
            name: name.to_string(),
            log: Arc::clone(&log),
        };
        (plugin, log)
    }
}

impl ClientPlugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&mut self, event: &ClientEvent) {
        if let Ok(mut log) = self.log.lock() {
            log.events.push(*event);
        }
    }

    fn on_remove(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.removed = true;
        }
    }
}
