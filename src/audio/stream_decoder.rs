//! Generic stream decoder trait for multi-format downlink audio.

use anyhow::Result;

use super::codec::{self, AudioFormat, Codec};
use super::opus_codec::OpusDecoder;

/// Converts one downlink audio payload into mono f32 samples at the
/// payload's own rate. Implementations never resample.
pub trait StreamDecoder: Send {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>>;
}

pub struct Pcm16Decoder;

impl StreamDecoder for Pcm16Decoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>> {
        Ok(codec::decode16(data))
    }
}

/// Factory function: create a decoder for the format announced on the wire.
pub fn create_decoder(format: &AudioFormat) -> Result<Box<dyn StreamDecoder>> {
    match format.codec {
        Codec::Pcm16 => Ok(Box::new(Pcm16Decoder)),
        Codec::Opus => Ok(Box::new(OpusDecoder::new(format.sample_rate)?)),
    }
}

/// Decoders keyed by format, created on first use for a session.
#[derive(Default)]
pub struct DecoderSet {
    decoders: Vec<(AudioFormat, Box<dyn StreamDecoder>)>,
}

impl DecoderSet {
    pub fn decode(&mut self, format: &AudioFormat, data: &[u8]) -> Result<Vec<f32>> {
        if let Some((_, decoder)) = self.decoders.iter_mut().find(|(f, _)| f == format) {
            return decoder.decode(data);
        }
        let mut decoder = create_decoder(format)?;
        let samples = decoder.decode(data);
        self.decoders.push((*format, decoder));
        samples
    }
}
