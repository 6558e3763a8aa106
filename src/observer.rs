//! Observer surface consumed by the surrounding application.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,
    /// True while the remote turn is still in progress.
    pub is_partial: bool,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>, is_partial: bool) -> Self {
        Self {
            text: text.into(),
            is_partial,
            timestamp: Utc::now(),
        }
    }
}

/// Callbacks fired by a session. All methods default to no-ops.
///
/// Volume is reported from the capture thread; everything else from the
/// transport task or the thread calling `connect`/`disconnect`.
pub trait SessionObserver: Send + Sync {
    fn on_transcript(&self, _event: &TranscriptEvent) {}
    fn on_volume(&self, _level: f32) {}
    fn on_status(&self, _connected: bool) {}
    fn on_error(&self, _message: &str) {}
}

/// Owned form of the observer callbacks, for channel-based consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transcript(TranscriptEvent),
    Volume(f32),
    Status(bool),
    Error(String),
}

impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_transcript(&self, event: &TranscriptEvent) {
        let _ = self.send(SessionEvent::Transcript(event.clone()));
    }

    fn on_volume(&self, level: f32) {
        let _ = self.send(SessionEvent::Volume(level));
    }

    fn on_status(&self, connected: bool) {
        let _ = self.send(SessionEvent::Status(connected));
    }

    fn on_error(&self, message: &str) {
        let _ = self.send(SessionEvent::Error(message.to_string()));
    }
}

/// Per-session gate in front of the observer.
///
/// Status fires only on change, errors at most once, and volume/transcripts
/// stop as soon as the session starts closing.
pub(crate) struct SessionEmitter {
    observer: Arc<dyn SessionObserver>,
    connected: AtomicBool,
    error_reported: AtomicBool,
    live: AtomicBool,
}

impl SessionEmitter {
    pub(crate) fn new(observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            observer,
            connected: AtomicBool::new(false),
            error_reported: AtomicBool::new(false),
            live: AtomicBool::new(true),
        }
    }

    pub(crate) fn connected(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.observer.on_status(true);
        }
    }

    /// Final status for the session; emitted once.
    pub(crate) fn closed(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.observer.on_status(false);
    }

    pub(crate) fn silence(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    pub(crate) fn volume(&self, level: f32) {
        if self.live.load(Ordering::Acquire) {
            self.observer.on_volume(level);
        }
    }

    pub(crate) fn transcript(&self, event: TranscriptEvent) {
        if self.live.load(Ordering::Acquire) {
            self.observer.on_transcript(&event);
        }
    }

    /// Returns false when an error was already reported for this session.
    pub(crate) fn error(&self, message: &str) -> bool {
        if self.error_reported.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.observer.on_error(message);
        true
    }
}
