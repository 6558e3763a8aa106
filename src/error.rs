//! Error taxonomy for the session engine.

use thiserror::Error;

/// Capture/playback device failures, classified where they are detected.
///
/// The display strings are the fixed user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("Microphone access was denied. Allow microphone access and try again.")]
    PermissionDenied,

    #[error("The audio device is busy in another application.")]
    DeviceBusy,

    #[error("No audio device was found. Connect a microphone or speaker and try again.")]
    DeviceNotFound,

    #[error("Audio device error: {0}")]
    Hardware(String),
}

impl AudioError {
    /// Map an OS errno (sign ignored) onto the fixed categories.
    pub fn from_errno(errno: i32, context: &str) -> Self {
        match errno.abs() {
            1 | 13 => AudioError::PermissionDenied, // EPERM, EACCES
            16 => AudioError::DeviceBusy,           // EBUSY
            2 | 6 | 19 => AudioError::DeviceNotFound, // ENOENT, ENXIO, ENODEV
            code => AudioError::Hardware(format!("{} (errno {})", context, code)),
        }
    }
}

impl From<alsa::Error> for AudioError {
    fn from(e: alsa::Error) -> Self {
        AudioError::from_errno(e.errno() as i32, &e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Permission(AudioError),

    #[error("{0}")]
    Device(AudioError),

    #[error("Connection error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<AudioError> for SessionError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::PermissionDenied => SessionError::Permission(e),
            other => SessionError::Device(other),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Protocol(e.to_string())
    }
}
