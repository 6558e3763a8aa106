use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::{AudioError, SessionError};
use crate::observer::SessionEmitter;

use super::audio_system::AudioConfig;
use super::codec::{self, AudioFrame, EncodedFrame};
use super::device::{AudioBackend, CaptureDevice};

/// Per-block processing: level metering, resampling, encoding, forwarding.
pub(crate) struct CaptureStage {
    uplink: mpsc::Sender<EncodedFrame>,
    emitter: Arc<SessionEmitter>,
    muted: Arc<AtomicBool>,
    faults: mpsc::UnboundedSender<SessionError>,
    dropped: u64,
}

impl CaptureStage {
    pub(crate) fn new(
        uplink: mpsc::Sender<EncodedFrame>,
        emitter: Arc<SessionEmitter>,
        muted: Arc<AtomicBool>,
        faults: mpsc::UnboundedSender<SessionError>,
    ) -> Self {
        Self {
            uplink,
            emitter,
            muted,
            faults,
            dropped: 0,
        }
    }

    /// Handle one captured block. Returns false once the uplink is gone.
    pub(crate) fn process(&mut self, frame: AudioFrame) -> bool {
        if self.muted.load(Ordering::Relaxed) {
            self.emitter.volume(0.0);
            return true;
        }

        self.emitter.volume(codec::rms(&frame.samples));

        match self.uplink.try_send(codec::encode_frame(&frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped == 1 || self.dropped % 50 == 0 {
                    log::warn!("Uplink queue full, dropped {} frame(s) so far", self.dropped);
                }
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn fault(&self, error: AudioError) {
        let _ = self.faults.send(SessionError::from(error));
    }
}

/// Owns the capture device and the thread its blocking reads run on.
///
/// `open` requests device access; `start` hands the device to the
/// `audio-capture` thread, after which every hardware period drives one
/// [`CaptureStage::process`] call.
pub struct AudioCaptureEngine {
    device: Option<Box<dyn CaptureDevice>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioCaptureEngine {
    pub fn open(backend: &dyn AudioBackend, config: &AudioConfig) -> Result<Self, AudioError> {
        let device = backend.open_capture(config)?;
        log::info!("Capture device ready: rate={}", device.sample_rate());
        Ok(Self {
            device: Some(device),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        })
    }

    pub(crate) fn start(&mut self, stage: CaptureStage) -> Result<()> {
        let Some(device) = self.device.take() else {
            anyhow::bail!("capture engine already started or released");
        };
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || capture_thread(device, stage, &running))?;
        self.handle = Some(handle);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Signal the thread to stop and wait for it to release the device.
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        // Never started: the device is still held here.
        self.device.take();
        if let Some(h) = self.handle.take() {
            h.join()
                .map_err(|_| anyhow::anyhow!("capture thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for AudioCaptureEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn capture_thread(mut device: Box<dyn CaptureDevice>, mut stage: CaptureStage, running: &AtomicBool) {
    let sample_rate = device.sample_rate();
    log::info!("Capture started: rate={} → {}Hz", sample_rate, codec::TARGET_SAMPLE_RATE);

    while running.load(Ordering::Relaxed) {
        match device.read_block() {
            Ok(samples) => {
                if samples.is_empty() {
                    continue;
                }
                if !stage.process(AudioFrame {
                    samples,
                    sample_rate,
                }) {
                    log::warn!("Uplink closed, stopping capture");
                    break;
                }
            }
            Err(e) => {
                log::error!("Capture device error: {}", e);
                stage.fault(e);
                break;
            }
        }
    }
    running.store(false, Ordering::SeqCst);

    drop(device);
    log::info!("Capture device released");
    drop(stage);
    log::info!("Capture stage released");
}
