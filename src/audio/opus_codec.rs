//! Opus decoding for compressed downlink audio.
//!
//! Decodes at the stream's announced rate; the playback path never resamples.

use anyhow::Result;

use super::stream_decoder::StreamDecoder;

/// Max 120ms @ 48kHz = 5760 samples/channel.
const MAX_FRAME_SIZE: usize = 5760;

pub struct OpusDecoder {
    decoder: opus::Decoder,
    sample_rate: u32,
}

impl OpusDecoder {
    /// * `sample_rate` - Opus stream sample rate (8000, 12000, 16000, 24000 or 48000)
    pub fn new(sample_rate: u32) -> Result<Self> {
        let decoder = opus::Decoder::new(sample_rate, opus::Channels::Mono)?;
        Ok(Self {
            decoder,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decode one Opus packet to mono float PCM.
    pub fn decode(&mut self, opus_data: &[u8]) -> Result<Vec<f32>> {
        let mut pcm_buf = vec![0f32; MAX_FRAME_SIZE];
        let decoded = self.decoder.decode_float(opus_data, &mut pcm_buf, false)?;
        pcm_buf.truncate(decoded);
        Ok(pcm_buf)
    }
}

impl StreamDecoder for OpusDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>> {
        OpusDecoder::decode(self, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_encoder_output() {
        let mut encoder =
            opus::Encoder::new(24_000, opus::Channels::Mono, opus::Application::Voip).unwrap();
        let frame: Vec<f32> = (0..480).map(|i| (i as f32 * 0.05).sin() * 0.2).collect();
        let packet = encoder.encode_vec_float(&frame, 4000).unwrap();

        let mut decoder = OpusDecoder::new(24_000).unwrap();
        assert_eq!(decoder.sample_rate(), 24_000);
        let out = decoder.decode(&packet).unwrap();
        assert_eq!(out.len(), 480);
    }

    #[test]
    fn test_rejects_unsupported_rate() {
        assert!(OpusDecoder::new(44_100).is_err());
    }
}
