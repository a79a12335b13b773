//! Linear PCM framing for the voice wire format.
//!
//! - Outbound: f32 samples → int16 (×32768, wrapping) → little-endian bytes → base64
//! - Inbound:  base64 → little-endian int16 → f32 (÷32768)

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;

use crate::error::AssistantError;

/// Sample rate of microphone frames sent to the service.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of synthesized audio received from the service.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

const SCALE: f64 = 32768.0;

/// Convert one float sample to int16 the way a JS `Int16Array` store does:
/// truncate toward zero, then wrap modulo 2^16. No clamping, so `1.0`
/// becomes `-32768`.
pub fn to_int16(sample: f32) -> i16 {
    let scaled = sample as f64 * SCALE;
    if !scaled.is_finite() {
        return 0;
    }
    scaled.trunc().rem_euclid(65536.0) as u16 as i16
}

pub fn to_float(sample: i16) -> f32 {
    (sample as f64 / SCALE) as f32
}

/// Pack samples as little-endian int16 bytes.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &s in samples {
        buf.put_i16_le(to_int16(s));
    }
    buf.to_vec()
}

/// Interpret bytes as little-endian int16 mono samples.
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>, AssistantError> {
    if bytes.len() % 2 != 0 {
        return Err(AssistantError::Decode(format!(
            "odd PCM16 byte count: {}",
            bytes.len()
        )));
    }
    let mut buf = bytes;
    let mut out = Vec::with_capacity(bytes.len() / 2);
    while buf.has_remaining() {
        out.push(to_float(buf.get_i16_le()));
    }
    Ok(out)
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>, AssistantError> {
    STANDARD
        .decode(data)
        .map_err(|e| AssistantError::Decode(format!("invalid base64: {}", e)))
}

/// A decoded mono buffer ready for scheduling.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Decode a base64 PCM16 payload.
    pub fn from_base64(data: &str, sample_rate: u32) -> Result<Self, AssistantError> {
        let bytes = decode_base64(data)?;
        Ok(Self::new(decode_pcm16(&bytes)?, sample_rate))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }
}

/// One outbound audio frame: base64 payload plus MIME tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBlob {
    mime_type: String,
    data: String,
}

impl WireBlob {
    /// Encode a block of microphone samples captured at 16 kHz.
    pub fn pcm16(samples: &[f32]) -> Self {
        Self {
            mime_type: INPUT_MIME_TYPE.to_string(),
            data: STANDARD.encode(encode_pcm16(samples)),
        }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    #[cfg(test)]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int16s(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn half_scale_encodes_exactly() {
        let bytes = encode_pcm16(&[0.5, -0.5, 0.0]);
        assert_eq!(int16s(&bytes), vec![16384, -16384, 0]);
    }

    #[test]
    fn out_of_range_samples_wrap_instead_of_clamping() {
        assert_eq!(to_int16(1.0), -32768);
        assert_eq!(to_int16(-1.0), -32768);
        assert_eq!(to_int16(1.5), -16384);
        assert_eq!(to_int16(f32::NAN), 0);
        // beyond i64 range the wrap still follows the low 16 bits
        assert_eq!(to_int16(2f32.powi(48)), 0);
        assert_eq!(to_int16(-(2f32.powi(48))), 0);
        assert_eq!(to_int16(3e38), 0);
        assert_eq!(to_int16(2.0), 0);
        assert_eq!(to_int16(-1.5), 16384);
    }

    #[test]
    fn encoder_truncates_toward_zero() {
        // 0.3 * 32768 = 9830.4, -0.3 * 32768 = -9830.4
        assert_eq!(to_int16(0.3), 9830);
        assert_eq!(to_int16(-0.3), -9830);
    }

    #[test]
    fn blob_carries_mime_tag_and_base64_payload() {
        let blob = WireBlob::pcm16(&[0.5, -0.5]);
        assert_eq!(blob.mime_type(), "audio/pcm;rate=16000");
        let bytes = decode_base64(blob.data()).unwrap();
        assert_eq!(int16s(&bytes), vec![16384, -16384]);

        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(json["data"], blob.data());
    }

    #[test]
    fn decode_reproduces_input_within_quantization() {
        let samples: Vec<f32> = (0..480)
            .map(|i| (i as f32 * 0.05).sin() * 0.9)
            .collect();
        let blob = WireBlob::pcm16(&samples);
        let buffer = AudioBuffer::from_base64(blob.data(), INPUT_SAMPLE_RATE).unwrap();

        assert_eq!(buffer.len(), samples.len());
        for (a, b) in samples.iter().zip(&buffer.samples) {
            assert!((a - b).abs() <= 1.0 / 32768.0 + f32::EPSILON, "{} vs {}", a, b);
        }
    }

    #[test]
    fn malformed_payloads_are_decode_errors() {
        assert!(matches!(
            AudioBuffer::from_base64("not base64!!", OUTPUT_SAMPLE_RATE),
            Err(AssistantError::Decode(_))
        ));
        // three bytes cannot hold whole int16 samples
        let odd = STANDARD.encode([1u8, 2, 3]);
        assert!(matches!(
            AudioBuffer::from_base64(&odd, OUTPUT_SAMPLE_RATE),
            Err(AssistantError::Decode(_))
        ));
    }

    #[test]
    fn duration_follows_sample_rate() {
        let buffer = AudioBuffer::new(vec![0.0; 12_000], OUTPUT_SAMPLE_RATE);
        assert!((buffer.duration() - 0.5).abs() < 1e-12);
    }
}
