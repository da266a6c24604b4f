//! Device-facing capabilities supplied by the host application.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Answers "may we capture audio from the microphone right now".
pub trait PermissionSource: Send + Sync {
    fn audio_capture_granted(&self) -> bool;
}

/// A fixed answer, for hosts without a runtime permission model.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub bool);

impl PermissionSource for StaticPermission {
    fn audio_capture_granted(&self) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioMode {
    #[default]
    Normal,
    Communication,
}

/// The platform audio manager.
pub trait AudioDevice: Send + Sync {
    fn set_mode(&self, mode: AudioMode);
    fn mode(&self) -> AudioMode;
    fn set_speakerphone_on(&self, on: bool);
    fn is_speakerphone_on(&self) -> bool;
}

/// Audio device for hosts with no routing to control; remembers what it was told.
#[derive(Debug, Default)]
pub struct HeadlessAudioDevice {
    mode: Mutex<AudioMode>,
    speaker: AtomicBool,
}

impl AudioDevice for HeadlessAudioDevice {
    fn set_mode(&self, mode: AudioMode) {
        *self.mode.lock().expect("audio mode lock should not be poisoned") = mode;
    }

    fn mode(&self) -> AudioMode {
        *self.mode.lock().expect("audio mode lock should not be poisoned")
    }

    fn set_speakerphone_on(&self, on: bool) {
        self.speaker.store(on, Ordering::Relaxed);
    }

    fn is_speakerphone_on(&self) -> bool {
        self.speaker.load(Ordering::Relaxed)
    }
}
