//! audio - Audio capture, playback, and codec library
//!
//! Uses ALSA for audio I/O on dedicated threads. Uplink audio is metered,
//! resampled to 16 kHz and sent as base64 PCM16; downlink audio is decoded and
//! scheduled gaplessly on the output device's timeline.

mod alsa_device;
mod audio_system;
pub mod capture;
pub mod codec;
pub mod device;
#[cfg(test)]
pub(crate) mod mock;
mod opus_codec;
pub mod playback;
pub mod stream_decoder;

pub use alsa_device::AlsaBackend;
pub use audio_system::{AudioConfig, AudioSystem};
pub use capture::AudioCaptureEngine;
pub use codec::{AudioFormat, AudioFrame, Codec, EncodedFrame};
pub use device::{AudioBackend, CaptureDevice, PlaybackDevice};
pub use playback::{AudioClock, ChunkSink, PlaybackChunk, PlaybackScheduler, ScheduledChunk};
pub use stream_decoder::{DecoderSet, StreamDecoder};
