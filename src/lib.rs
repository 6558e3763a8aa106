//! Realtime voice sessions with a remote persona endpoint.
//!
//! Microphone audio is captured on a dedicated thread, metered, resampled to
//! 16 kHz PCM16 and streamed over a WebSocket as base64 JSON frames. Audio and
//! transcript parts coming back are played gaplessly and reported to a
//! [`SessionObserver`].

pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod net_link;
pub mod observer;
pub mod protocol;
pub mod session;
pub mod state_machine;

pub use config::{CallRequest, Config, EndpointConfig, Persona};
pub use controller::SessionController;
pub use error::{AudioError, SessionError};
pub use observer::{SessionEvent, SessionObserver, TranscriptEvent};
pub use session::Session;
pub use state_machine::SessionState;
