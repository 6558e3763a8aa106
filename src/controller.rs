use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::audio::{AlsaBackend, AudioBackend, AudioConfig};
use crate::config::{CallRequest, Config, EndpointConfig};
use crate::error::SessionError;
use crate::observer::SessionObserver;
use crate::session::Session;
use crate::state_machine::SessionState;

/// Entry point for applications: at most one live session at a time.
///
/// Callbacks go to the observer supplied at construction. `connect` on a
/// controller that already has a live session hangs that one up first, so the
/// capture device is never held twice.
pub struct SessionController {
    endpoint: EndpointConfig,
    audio: AudioConfig,
    backend: Arc<dyn AudioBackend>,
    observer: Arc<dyn SessionObserver>,
    session: Option<Session>,
    muted: Arc<AtomicBool>,
}

impl SessionController {
    pub fn new(
        endpoint: EndpointConfig,
        audio: AudioConfig,
        backend: Arc<dyn AudioBackend>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            endpoint,
            audio,
            backend,
            observer,
            session: None,
            muted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Controller on the system's ALSA devices.
    pub fn with_alsa(config: &Config, observer: Arc<dyn SessionObserver>) -> Self {
        Self::new(
            config.endpoint.clone(),
            config.audio.clone(),
            Arc::new(AlsaBackend),
            observer,
        )
    }

    /// Start a call. Resolves once the endpoint acknowledged the setup and
    /// capture is running, or with the error that was already reported to
    /// the observer.
    pub async fn connect(&mut self, request: CallRequest) -> Result<(), SessionError> {
        self.disconnect();

        let session = Session::new(self.observer.clone(), self.muted.clone());
        log::info!(
            "Starting session {} as '{}'",
            session.id(),
            request.persona.name
        );
        self.session = Some(session.clone());
        session
            .open(&self.endpoint, &self.audio, self.backend.as_ref(), &request)
            .await
    }

    /// Hang up. Safe to call at any time, any number of times.
    pub fn disconnect(&mut self) {
        if let Some(session) = &self.session {
            session.close();
        }
    }

    /// Keep the call open but stop sending microphone audio.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        log::info!("Microphone {}", if muted { "muted" } else { "unmuted" });
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, Session::state)
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(Session::id)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.disconnect();
    }
}
