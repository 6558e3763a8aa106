//! ALSA PCM device wrappers for audio capture and playback.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};

use crate::error::AudioError;

use super::audio_system::AudioConfig;
use super::codec;
use super::device::{AudioBackend, CaptureDevice, PlaybackDevice};

/// Consecutive recoveries tolerated before a write gives up on the remaining frames.
const MAX_RECOVERY_RETRIES: u32 = 3;

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Actual number of channels
    pub channels: u32,
    /// Period size in frames (one frame = channels × sample_width)
    pub period_size: usize,
}

/// Backend that opens real ALSA devices by name.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlsaBackend;

impl AudioBackend for AlsaBackend {
    fn open_capture(&self, config: &AudioConfig) -> Result<Box<dyn CaptureDevice>, AudioError> {
        let (pcm, params) = open_pcm(
            &config.capture_device,
            Direction::Capture,
            config.capture_sample_rate,
            config.capture_channels,
            Some(config.capture_period_size),
        )?;
        // The first readi starts the stream.
        pcm.prepare()?;
        let buf = vec![0i16; params.period_size * params.channels as usize];
        Ok(Box::new(AlsaCapture { pcm, params, buf }))
    }

    fn open_playback(
        &self,
        config: &AudioConfig,
    ) -> Result<Box<dyn PlaybackDevice>, AudioError> {
        let (pcm, params) = open_pcm(
            &config.playback_device,
            Direction::Playback,
            config.playback_sample_rate,
            config.playback_channels,
            Some(config.playback_period_size),
        )?;
        Ok(Box::new(AlsaPlayback { pcm, params }))
    }
}

pub struct AlsaCapture {
    pcm: PCM,
    params: AlsaParams,
    buf: Vec<i16>,
}

impl CaptureDevice for AlsaCapture {
    fn sample_rate(&self) -> u32 {
        self.params.sample_rate
    }

    fn read_block(&mut self) -> Result<Vec<f32>, AudioError> {
        let channels = self.params.channels as usize;
        let io = self.pcm.io_i16()?;
        let frames = match io.readi(&mut self.buf) {
            Ok(frames) => frames,
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                self.pcm.prepare()?;
                io.readi(&mut self.buf)?
            }
        };
        Ok(codec::i16_to_mono_f32(&self.buf[..frames * channels], channels))
    }
}

pub struct AlsaPlayback {
    pcm: PCM,
    params: AlsaParams,
}

impl PlaybackDevice for AlsaPlayback {
    fn sample_rate(&self) -> u32 {
        self.params.sample_rate
    }

    fn period_size(&self) -> usize {
        self.params.period_size
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        let channels = self.params.channels as usize;
        let pcm_data = codec::f32_to_i16_interleaved(samples, channels);
        let io = self.pcm.io_i16()?;

        // Retry short writes and recover from XRUN without losing frames.
        let total_frames = samples.len();
        let mut frames_written = 0;
        let mut retry_count = 0u32;
        while frames_written < total_frames {
            let offset = frames_written * channels;
            match io.writei(&pcm_data[offset..]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA XRUN or error: {}, recovering...", e);
                    retry_count += 1;
                    self.pcm.prepare()?;
                    if retry_count >= MAX_RECOVERY_RETRIES {
                        log::error!(
                            "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                            retry_count,
                            total_frames - frames_written
                        );
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
    channels: u32,
    period_size: Option<usize>,
) -> Result<(PCM, AlsaParams), AudioError> {
    let dir_name = match direction {
        Direction::Capture => "Capture",
        Direction::Playback => "Playback",
    };
    let pcm = PCM::new(device, direction, false).map_err(|e| {
        log::error!("Failed to open PCM device '{}' for {}: {}", device, dir_name, e);
        AudioError::from(e)
    })?;

    // Configure hardware parameters
    {
        let hwp = HwParams::any(&pcm)?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::S16LE)?;
        hwp.set_channels(channels)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        if let Some(ps) = period_size.filter(|ps| *ps > 0) {
            hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)?;
        }
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let params = {
        let hwp = pcm.hw_params_current()?;
        AlsaParams {
            sample_rate: hwp.get_rate()?,
            channels: hwp.get_channels()?,
            period_size: hwp.get_period_size()? as usize,
        }
    };

    log::info!(
        "ALSA {}: device={}, rate={}, channels={}, period_size={}",
        dir_name,
        device,
        params.sample_rate,
        params.channels,
        params.period_size,
    );

    Ok((pcm, params))
}
