//! Stateless sample conversion shared by the capture and playback paths.
//!
//! - PCM16: f32 in [-1, 1] ⇄ signed 16-bit little-endian bytes
//! - Resampling: block-average decimation/interpolation to the 16 kHz uplink rate
//! - Wire text: base64 transcoding for the JSON message envelope

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::SessionError;

/// Uplink sample rate expected by the remote endpoint.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

const PCM16_SCALE: f32 = 32768.0;

// ======================== Formats ========================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Pcm16,
    Opus,
}

/// Format descriptor carried next to every audio payload, e.g. `pcm16@16000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub codec: Codec,
    pub sample_rate: u32,
}

impl AudioFormat {
    pub const fn pcm16(sample_rate: u32) -> Self {
        Self {
            codec: Codec::Pcm16,
            sample_rate,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codec = match self.codec {
            Codec::Pcm16 => "pcm16",
            Codec::Opus => "opus",
        };
        write!(f, "{}@{}", codec, self.sample_rate)
    }
}

impl FromStr for AudioFormat {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (codec, rate) = s
            .split_once('@')
            .ok_or_else(|| SessionError::Protocol(format!("malformed audio format '{}'", s)))?;
        let codec = match codec.trim().to_ascii_lowercase().as_str() {
            "pcm" | "pcm16" | "s16le" => Codec::Pcm16,
            "opus" => Codec::Opus,
            other => {
                return Err(SessionError::Protocol(format!(
                    "unsupported audio codec '{}'",
                    other
                )));
            }
        };
        let sample_rate = rate
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|r| *r > 0)
            .ok_or_else(|| SessionError::Protocol(format!("invalid sample rate in '{}'", s)))?;
        Ok(Self { codec, sample_rate })
    }
}

// ======================== Frames ========================

/// Mono float samples at a given rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Text-safe payload ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub format: AudioFormat,
    pub data: String,
}

// ======================== PCM16 ========================

/// Clamp to [-1, 1], scale to i16 and pack little-endian.
pub fn encode16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let s = if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) };
        let v = (s * PCM16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Inverse of [`encode16`]. A trailing odd byte is ignored.
pub fn decode16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / PCM16_SCALE)
        .collect()
}

/// Convert interleaved i16 device samples to mono f32, averaging channels.
pub fn i16_to_mono_f32(interleaved: &[i16], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    interleaved
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            sum as f32 / channels as f32 / PCM16_SCALE
        })
        .collect()
}

/// Convert mono f32 to interleaved i16, duplicating into every channel.
pub fn f32_to_i16_interleaved(samples: &[f32], channels: usize) -> Vec<i16> {
    let channels = channels.max(1);
    let mut out = Vec::with_capacity(samples.len() * channels);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * PCM16_SCALE)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        for _ in 0..channels {
            out.push(v);
        }
    }
    out
}

// ======================== Level ========================

/// Root-mean-square amplitude, clamped to [0, 1].
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    ((sum / samples.len() as f64).sqrt() as f32).clamp(0.0, 1.0)
}

// ======================== Resampling ========================

/// Block-average resampling from `src_rate` to [`TARGET_SAMPLE_RATE`].
pub fn resample_to_16k(samples: &[f32], src_rate: u32) -> Vec<f32> {
    resample(samples, src_rate, TARGET_SAMPLE_RATE)
}

/// Block-average resampling between arbitrary rates.
///
/// Each output sample averages the input samples that fall into its window;
/// when upsampling the window is shorter than one input sample and the nearest
/// preceding sample is repeated.
pub fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || src_rate == 0 || dst_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let start = ((i as f64 * ratio).floor() as usize).min(samples.len() - 1);
        let end = (((i + 1) as f64 * ratio).floor() as usize).min(samples.len());
        if end > start {
            let window = &samples[start..end];
            out.push(window.iter().sum::<f32>() / window.len() as f32);
        } else {
            out.push(samples[start]);
        }
    }
    out
}

// ======================== Wire text ========================

pub fn to_wire_text(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn from_wire_text(text: &str) -> Result<Vec<u8>, SessionError> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| SessionError::Protocol(format!("invalid base64 payload: {}", e)))
}

/// Resample a captured block to the uplink rate and wrap it for the wire.
pub fn encode_frame(frame: &AudioFrame) -> EncodedFrame {
    let resampled = resample_to_16k(&frame.samples, frame.sample_rate);
    EncodedFrame {
        format: AudioFormat::pcm16(TARGET_SAMPLE_RATE),
        data: to_wire_text(&encode16(&resampled)),
    }
}
