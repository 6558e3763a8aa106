//! Device seam between the audio engines and the platform backend.
//!
//! Both device kinds are blocking: a capture read returns one hardware period
//! and a playback write returns once the device has accepted the samples, so
//! the calling thread is paced by the hardware buffer.

use crate::error::AudioError;

use super::audio_system::AudioConfig;

pub trait CaptureDevice: Send {
    /// Negotiated capture rate.
    fn sample_rate(&self) -> u32;

    /// Block until one period is available and return it as mono samples.
    fn read_block(&mut self) -> Result<Vec<f32>, AudioError>;
}

pub trait PlaybackDevice: Send {
    /// Negotiated output rate.
    fn sample_rate(&self) -> u32;

    /// Frames per hardware period; silence is written in units of this size.
    fn period_size(&self) -> usize;

    /// Write mono samples, blocking until the device accepted all of them.
    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError>;
}

/// Opens devices. Access is requested at open time, so permission and
/// availability problems surface from these calls.
pub trait AudioBackend: Send + Sync {
    fn open_capture(&self, config: &AudioConfig) -> Result<Box<dyn CaptureDevice>, AudioError>;

    fn open_playback(&self, config: &AudioConfig)
    -> Result<Box<dyn PlaybackDevice>, AudioError>;
}
