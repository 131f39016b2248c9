//! Maps tagged server events onto the UI callback surface.
//!
//! This is the only stateful part of the client. Two independent booleans
//! track user speech and assistant responses; they exist purely to
//! deduplicate repeated start/stop notifications from a chattering event
//! stream. They are deliberately not collapsed into one enum: the user can
//! barge in while the assistant is mid-response, so the two axes overlap.

use crate::events::ServerEvent;
use tracing::{debug, warn};

/// A boxed notification callback, invoked on the session's event loop.
pub type Notify = Box<dyn FnMut() + Send>;
/// Error callback, receives a human-readable message.
pub type NotifyError = Box<dyn FnMut(String) + Send>;
/// Audio-level callback, receives a normalized level in `0.0..=1.0`.
pub type NotifyLevel = Box<dyn FnMut(f32) + Send>;

/// Optional handlers for everything a voice UI animates on.
///
/// Unset handlers are skipped; the session runs fine with none at all.
#[derive(Default)]
pub struct SessionCallbacks {
    pub on_user_start_speaking: Option<Notify>,
    pub on_user_stop_speaking: Option<Notify>,
    pub on_ai_start_speaking: Option<Notify>,
    pub on_ai_stop_speaking: Option<Notify>,
    pub on_audio_playback_start: Option<Notify>,
    pub on_audio_playback_end: Option<Notify>,
    pub on_audio_level: Option<NotifyLevel>,
    pub on_error: Option<NotifyError>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_user_start_speaking(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_user_start_speaking = Some(Box::new(f));
        self
    }

    pub fn on_user_stop_speaking(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_user_stop_speaking = Some(Box::new(f));
        self
    }

    pub fn on_ai_start_speaking(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_ai_start_speaking = Some(Box::new(f));
        self
    }

    pub fn on_ai_stop_speaking(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_ai_stop_speaking = Some(Box::new(f));
        self
    }

    pub fn on_audio_playback_start(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_audio_playback_start = Some(Box::new(f));
        self
    }

    pub fn on_audio_playback_end(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_audio_playback_end = Some(Box::new(f));
        self
    }

    pub fn on_audio_level(mut self, f: impl FnMut(f32) + Send + 'static) -> Self {
        self.on_audio_level = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(String) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// Translates server events into callback invocations.
pub struct EventDispatcher {
    user_speaking: bool,
    ai_responding: bool,
    callbacks: SessionCallbacks,
}

impl EventDispatcher {
    pub fn new(callbacks: SessionCallbacks) -> Self {
        Self {
            user_speaking: false,
            ai_responding: false,
            callbacks,
        }
    }

    pub fn user_speaking(&self) -> bool {
        self.user_speaking
    }

    pub fn ai_responding(&self) -> bool {
        self.ai_responding
    }

    /// Processes one server event.
    ///
    /// Start/stop transitions are idempotent-guarded: a repeated edge in
    /// the same direction does not re-fire its callback.
    pub fn handle(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::SpeechStarted => {
                if !self.user_speaking {
                    self.user_speaking = true;
                    debug!("user started speaking");
                    fire(&mut self.callbacks.on_user_start_speaking);
                }
            }
            ServerEvent::SpeechStopped => {
                if self.user_speaking {
                    self.user_speaking = false;
                    debug!("user stopped speaking");
                    fire(&mut self.callbacks.on_user_stop_speaking);
                }
            }
            ServerEvent::ResponseCreated => {
                if !self.ai_responding {
                    self.ai_responding = true;
                    debug!("assistant response started");
                    fire(&mut self.callbacks.on_ai_start_speaking);
                }
            }
            ServerEvent::ResponseDone | ServerEvent::ResponseCancelled => {
                if self.ai_responding {
                    self.ai_responding = false;
                    debug!("assistant response finished");
                    fire(&mut self.callbacks.on_ai_stop_speaking);
                }
            }
            // Playback notifications are stateless leaves. A server-side
            // `cleared` (interrupted utterance) reads the same as `stopped`.
            ServerEvent::OutputAudioStarted => {
                fire(&mut self.callbacks.on_audio_playback_start);
            }
            ServerEvent::OutputAudioStopped | ServerEvent::OutputAudioCleared => {
                fire(&mut self.callbacks.on_audio_playback_end);
            }
            ServerEvent::Error { error } => {
                warn!(code = ?error.code, "server error event: {}", error.message);
                self.reset_speaking_states();
                if let Some(cb) = &mut self.callbacks.on_error {
                    cb(error.message.clone());
                }
            }
            // Audio deltas are consumed by the transport's playback sink.
            ServerEvent::ResponseAudioDelta { .. } | ServerEvent::Ignored => {}
        }
    }

    /// Forces both flags to false, firing the matching stop callback for
    /// each one that was set. Keeps the UI from sticking in a speaking
    /// state after an error.
    pub fn reset_speaking_states(&mut self) {
        if self.user_speaking {
            self.user_speaking = false;
            fire(&mut self.callbacks.on_user_stop_speaking);
        }
        if self.ai_responding {
            self.ai_responding = false;
            fire(&mut self.callbacks.on_ai_stop_speaking);
        }
    }

    /// Clears both flags without firing callbacks. Used on disconnect.
    pub fn clear(&mut self) {
        self.user_speaking = false;
        self.ai_responding = false;
    }

    /// Forwards a microphone level sample to the level callback.
    pub fn level(&mut self, level: f32) {
        if let Some(cb) = &mut self.callbacks.on_audio_level {
            cb(level);
        }
    }
}

fn fire(slot: &mut Option<Notify>) {
    if let Some(cb) = slot {
        cb();
    }
}
