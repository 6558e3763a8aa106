//! In-memory devices paced by sleeping one period per call.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AudioError;

use super::audio_system::AudioConfig;
use super::device::{AudioBackend, CaptureDevice, PlaybackDevice};
use super::playback::{AudioClock, ChunkSink, PlaybackChunk};

const CAPTURE_RATE: u32 = 48_000;
const CAPTURE_PERIOD: usize = 480;
const PLAYBACK_PERIOD: usize = 240;

/// Called with "capture device" / "playback device" when a fake device is dropped.
pub type ReleaseHook = Arc<dyn Fn(&'static str) + Send + Sync>;

#[derive(Default, Clone)]
pub struct FakeBackend {
    capture_error: Option<AudioError>,
    playback_error: Option<AudioError>,
    capture_panics: bool,
    playback_rate: Option<u32>,
    on_release: Option<ReleaseHook>,
    /// Every sample handed to the playback device, silence included.
    pub played: Arc<Mutex<Vec<f32>>>,
}

impl FakeBackend {
    pub fn failing_capture(error: AudioError) -> Self {
        Self {
            capture_error: Some(error),
            ..Default::default()
        }
    }

    pub fn failing_playback(error: AudioError) -> Self {
        Self {
            playback_error: Some(error),
            ..Default::default()
        }
    }

    /// Capture device whose first read panics the capture thread.
    pub fn panicking_capture() -> Self {
        Self {
            capture_panics: true,
            ..Default::default()
        }
    }

    pub fn with_playback_rate(mut self, rate: u32) -> Self {
        self.playback_rate = Some(rate);
        self
    }

    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.on_release = Some(hook);
        self
    }

    pub fn audible_samples(&self) -> usize {
        self.played
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.abs() > f32::EPSILON)
            .count()
    }
}

impl AudioBackend for FakeBackend {
    fn open_capture(&self, _config: &AudioConfig) -> Result<Box<dyn CaptureDevice>, AudioError> {
        if let Some(e) = &self.capture_error {
            return Err(e.clone());
        }
        Ok(Box::new(FakeCapture {
            phase: 0.0,
            panics: self.capture_panics,
            on_release: self.on_release.clone(),
        }))
    }

    fn open_playback(&self, config: &AudioConfig) -> Result<Box<dyn PlaybackDevice>, AudioError> {
        if let Some(e) = &self.playback_error {
            return Err(e.clone());
        }
        Ok(Box::new(FakePlayback {
            rate: self.playback_rate.unwrap_or(config.playback_sample_rate),
            played: self.played.clone(),
            on_release: self.on_release.clone(),
        }))
    }
}

struct FakeCapture {
    phase: f32,
    panics: bool,
    on_release: Option<ReleaseHook>,
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        if let Some(hook) = &self.on_release {
            hook("capture device");
        }
    }
}

impl CaptureDevice for FakeCapture {
    fn sample_rate(&self) -> u32 {
        CAPTURE_RATE
    }

    fn read_block(&mut self) -> Result<Vec<f32>, AudioError> {
        std::thread::sleep(Duration::from_millis(10));
        if self.panics {
            panic!("capture device fault");
        }
        let block = (0..CAPTURE_PERIOD)
            .map(|_| {
                self.phase += 0.05;
                0.3 * self.phase.sin()
            })
            .collect();
        Ok(block)
    }
}

struct FakePlayback {
    rate: u32,
    played: Arc<Mutex<Vec<f32>>>,
    on_release: Option<ReleaseHook>,
}

impl Drop for FakePlayback {
    fn drop(&mut self) {
        if let Some(hook) = &self.on_release {
            hook("playback device");
        }
    }
}

impl PlaybackDevice for FakePlayback {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn period_size(&self) -> usize {
        PLAYBACK_PERIOD
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        let secs = samples.len() as f64 / self.rate as f64;
        std::thread::sleep(Duration::from_secs_f64(secs));
        self.played.lock().unwrap().extend_from_slice(samples);
        Ok(())
    }
}

// ======================== Scheduler doubles ========================

#[derive(Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn set(&self, t: f64) {
        *self.now.lock().unwrap() = t;
    }
}

impl AudioClock for ManualClock {
    fn current_time(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}

/// Records `(start_time, sample_count)` per submitted chunk.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub submitted: Arc<Mutex<Vec<(f64, usize)>>>,
}

impl ChunkSink for RecordingSink {
    fn submit(&mut self, chunk: PlaybackChunk, start_time: f64) -> Result<(), AudioError> {
        self.submitted
            .lock()
            .unwrap()
            .push((start_time, chunk.samples.len()));
        Ok(())
    }
}
