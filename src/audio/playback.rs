//! Gapless playback of downlink audio on a monotonic output timeline.
//!
//! [`PlaybackScheduler`] keeps nothing but a `next_start_time` cursor: every
//! chunk starts at `max(now, cursor)` and moves the cursor to its end, so two
//! consecutive chunks can never overlap. The device side is the
//! `audio-playback` thread, which keeps the output fed with silence and writes
//! each chunk once the timeline reaches its start frame.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use tokio::sync::mpsc;

use crate::error::{AudioError, SessionError};

use super::audio_system::AudioConfig;
use super::device::{AudioBackend, PlaybackDevice};

/// Decoded downlink samples awaiting their start time.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PlaybackChunk {
    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub start_time: f64,
    pub duration: f64,
}

/// Monotonic audio clock, in seconds.
pub trait AudioClock: Send + Sync {
    fn current_time(&self) -> f64;
}

/// Receives chunks together with their absolute start time.
pub trait ChunkSink: Send {
    fn submit(&mut self, chunk: PlaybackChunk, start_time: f64) -> Result<(), AudioError>;
}

pub struct PlaybackScheduler {
    clock: Arc<dyn AudioClock>,
    sink: Box<dyn ChunkSink>,
    sample_rate: u32,
    next_start_time: f64,
}

impl PlaybackScheduler {
    pub fn new(clock: Arc<dyn AudioClock>, sink: Box<dyn ChunkSink>, sample_rate: u32) -> Self {
        Self {
            clock,
            sink,
            sample_rate,
            next_start_time: 0.0,
        }
    }

    /// Fixed downlink rate this scheduler plays at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn schedule(&mut self, samples: Vec<f32>) -> Result<ScheduledChunk, AudioError> {
        let chunk = PlaybackChunk {
            samples,
            sample_rate: self.sample_rate,
        };
        let duration = chunk.duration();
        let start_time = self.clock.current_time().max(self.next_start_time);

        self.sink.submit(chunk, start_time)?;
        self.next_start_time = start_time + duration;

        Ok(ScheduledChunk {
            start_time,
            duration,
        })
    }
}

// ======================== Device timeline ========================

/// Frames committed to the output device, read as seconds.
pub struct DeviceClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl AudioClock for DeviceClock {
    fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }
}

struct DeviceSink {
    tx: std_mpsc::Sender<(u64, Vec<f32>)>,
    sample_rate: u32,
}

impl ChunkSink for DeviceSink {
    fn submit(&mut self, chunk: PlaybackChunk, start_time: f64) -> Result<(), AudioError> {
        let start_frame = (start_time * self.sample_rate as f64).round() as u64;
        self.tx
            .send((start_frame, chunk.samples))
            .map_err(|_| AudioError::Hardware("playback thread has stopped".into()))
    }
}

/// Owns the output device thread; the paired scheduler feeds it.
pub struct PlaybackEngine {
    device: Option<Box<dyn PlaybackDevice>>,
    frames: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    pub fn open(backend: &dyn AudioBackend, config: &AudioConfig) -> Result<Self, AudioError> {
        let device = backend.open_playback(config)?;
        // Downlink audio is never resampled, so the device must run at its rate.
        if device.sample_rate() != config.playback_sample_rate {
            return Err(AudioError::Hardware(format!(
                "playback device runs at {}Hz, downlink audio is {}Hz",
                device.sample_rate(),
                config.playback_sample_rate
            )));
        }
        log::info!(
            "Playback device ready: rate={}, period={}",
            device.sample_rate(),
            device.period_size()
        );
        Ok(Self {
            device: Some(device),
            frames: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        })
    }

    /// Start the output timeline and return the scheduler that feeds it.
    pub(crate) fn start(
        &mut self,
        sample_rate: u32,
        faults: mpsc::UnboundedSender<SessionError>,
    ) -> Result<PlaybackScheduler> {
        let Some(device) = self.device.take() else {
            anyhow::bail!("playback engine already started or released");
        };
        let (tx, rx) = std_mpsc::channel();
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let frames = self.frames.clone();
        let handle = thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || playback_thread(device, rx, &frames, &running, faults))?;
        self.handle = Some(handle);

        let clock = Arc::new(DeviceClock {
            frames: self.frames.clone(),
            sample_rate,
        });
        Ok(PlaybackScheduler::new(
            clock,
            Box::new(DeviceSink { tx, sample_rate }),
            sample_rate,
        ))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.device.take();
        if let Some(h) = self.handle.take() {
            h.join()
                .map_err(|_| anyhow::anyhow!("playback thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn playback_thread(
    mut device: Box<dyn PlaybackDevice>,
    rx: std_mpsc::Receiver<(u64, Vec<f32>)>,
    frames: &AtomicU64,
    running: &AtomicBool,
    faults: mpsc::UnboundedSender<SessionError>,
) {
    let period = device.period_size().max(1);
    let silence = vec![0.0f32; period];
    let mut pending: VecDeque<(u64, Vec<f32>)> = VecDeque::new();
    let mut scheduler_alive = true;

    log::info!("Playback started: rate={}, period={}", device.sample_rate(), period);

    while running.load(Ordering::Relaxed) {
        while scheduler_alive {
            match rx.try_recv() {
                Ok(item) => pending.push_back(item),
                Err(std_mpsc::TryRecvError::Empty) => break,
                Err(std_mpsc::TryRecvError::Disconnected) => scheduler_alive = false,
            }
        }
        if !scheduler_alive && pending.is_empty() {
            log::info!("Playback channel closed");
            break;
        }

        let position = frames.load(Ordering::Acquire);
        let due = pending.front().map(|(start, _)| *start);
        let written = match due {
            // Due or late: late chunks start now, right after what is already queued.
            // One period per pass so a stop request cuts the chunk short.
            Some(start) if start <= position => match pending.front_mut() {
                Some((_, samples)) => {
                    let n = samples.len().min(period);
                    let result = device.write(&samples[..n]).map(|_| n);
                    samples.drain(..n);
                    if samples.is_empty() {
                        pending.pop_front();
                    }
                    result
                }
                None => Ok(0),
            },
            Some(start) => {
                let gap = ((start - position) as usize).min(period);
                device.write(&silence[..gap]).map(|_| gap)
            }
            None => device.write(&silence).map(|_| period),
        };

        match written {
            Ok(n) => {
                frames.fetch_add(n as u64, Ordering::Release);
            }
            Err(e) => {
                log::error!("Playback device error: {}", e);
                let _ = faults.send(SessionError::from(e));
                break;
            }
        }
    }
    running.store(false, Ordering::SeqCst);
    if !pending.is_empty() {
        log::debug!("Discarding {} unplayed chunk(s)", pending.len());
    }

    drop(device);
    log::info!("Playback stopped");
}
