//! The AudioSystem owns one session's capture device and output timeline.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O to avoid
//! contention with async network tasks.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{AudioError, SessionError};
use crate::observer::SessionEmitter;

use super::capture::{AudioCaptureEngine, CaptureStage};
use super::codec::EncodedFrame;
use super::device::AudioBackend;
use super::playback::{PlaybackEngine, PlaybackScheduler};

/// Audio system configuration (`[audio]` section).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    /// ALSA capture device name (e.g. "default", "plughw:0,0")
    pub capture_device: String,
    /// ALSA playback device name
    pub playback_device: String,
    /// Desired capture rate; uplink audio is resampled to 16 kHz regardless
    pub capture_sample_rate: u32,
    /// Desired capture channel count, mixed down to mono
    pub capture_channels: u32,
    /// Frames per capture period; one uplink frame is sent per period
    pub capture_period_size: usize,
    /// Downlink rate. Audio arrives at this rate and is played without resampling
    pub playback_sample_rate: u32,
    /// Playback channel count; mono audio is duplicated into every channel
    pub playback_channels: u32,
    /// Frames per playback period (0 = let ALSA decide)
    pub playback_period_size: usize,
    /// Uplink frames buffered between the capture thread and the transport
    pub uplink_queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_device: "default".to_string(),
            playback_device: "default".to_string(),
            capture_sample_rate: 48000,
            capture_channels: 1,
            capture_period_size: 1024,
            playback_sample_rate: 24000,
            playback_channels: 1,
            playback_period_size: 480,
            uplink_queue_depth: 64,
        }
    }
}

/// Capture and playback halves for a single session.
///
/// Devices are acquired in [`AudioSystem::open`]; nothing flows until
/// [`AudioSystem::start_playback`] and [`AudioSystem::start_capture`].
/// The halves are released separately so the session can interleave the
/// transport shutdown between them.
pub struct AudioSystem {
    config: AudioConfig,
    capture: AudioCaptureEngine,
    playback: PlaybackEngine,
}

impl AudioSystem {
    /// Acquire the capture device first, then the playback device.
    pub fn open(backend: &dyn AudioBackend, config: &AudioConfig) -> Result<Self, AudioError> {
        log::info!(
            "AudioSystem opening, capture: \"{}\", playback: \"{}\", downlink: {}Hz",
            config.capture_device,
            config.playback_device,
            config.playback_sample_rate,
        );
        let capture = AudioCaptureEngine::open(backend, config)?;
        let playback = PlaybackEngine::open(backend, config)?;
        Ok(Self {
            config: config.clone(),
            capture,
            playback,
        })
    }

    pub(crate) fn start_playback(
        &mut self,
        faults: mpsc::UnboundedSender<SessionError>,
    ) -> Result<PlaybackScheduler> {
        self.playback.start(self.config.playback_sample_rate, faults)
    }

    pub(crate) fn start_capture(
        &mut self,
        uplink: mpsc::Sender<EncodedFrame>,
        emitter: Arc<SessionEmitter>,
        muted: Arc<AtomicBool>,
        faults: mpsc::UnboundedSender<SessionError>,
    ) -> Result<()> {
        self.capture
            .start(CaptureStage::new(uplink, emitter, muted, faults))
    }

    pub fn stop_capture(&mut self) -> Result<()> {
        self.capture.stop()
    }

    pub fn stop_playback(&mut self) -> Result<()> {
        self.playback.stop()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_running()
    }
}
