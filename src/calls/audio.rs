//! Audio routing for the call lifetime.

use crate::platform::{AudioDevice, AudioMode};
use log::debug;
use std::sync::Arc;

/// Switches the platform audio manager between normal and call routing.
pub struct AudioRouteController {
    device: Arc<dyn AudioDevice>,
}

impl AudioRouteController {
    pub fn new(device: Arc<dyn AudioDevice>) -> Self {
        Self { device }
    }

    /// Entering or leaving a call always routes to the earpiece.
    pub fn set_call_active(&self, active: bool) {
        let mode = if active {
            AudioMode::Communication
        } else {
            AudioMode::Normal
        };
        debug!(target: "Call/Audio", "Audio mode -> {mode:?}");
        self.device.set_mode(mode);
        self.device.set_speakerphone_on(false);
    }

    pub fn set_speakerphone_on(&self, on: bool) {
        if self.device.mode() != AudioMode::Communication {
            debug!(target: "Call/Audio", "Speakerphone toggled outside of a call");
        }
        self.device.set_speakerphone_on(on);
    }

    pub fn is_speakerphone_on(&self) -> bool {
        self.device.is_speakerphone_on()
    }
}
