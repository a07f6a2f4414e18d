//! PCM16 wire codec: f32 frames to base64 chunks and back.

use crate::audio::AudioFrame;
use crate::error::{Result, VoxError};
use crate::transport::messages::EncodedChunk;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Encode a captured frame into the service's wire format.
///
/// Samples are clamped to [-1, 1], converted to little-endian PCM16 and
/// base64-encoded, tagged with the frame's sample rate.
pub fn encode_frame(frame: &AudioFrame) -> EncodedChunk {
    let mut bytes = Vec::with_capacity(frame.samples.len() * 2);
    for &sample in &frame.samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * f32::from(i16::MAX)) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    EncodedChunk::pcm16(BASE64.encode(&bytes), frame.sample_rate)
}

/// Decode base64 PCM16 bytes from the service into f32 samples.
///
/// # Errors
///
/// Returns an error if the payload is not valid base64 or has an odd byte
/// count.
pub fn decode_pcm16(data: &str) -> Result<Vec<f32>> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| VoxError::Malformed(format!("invalid base64 audio: {e}")))?;
    if bytes.len() % 2 != 0 {
        return Err(VoxError::Malformed(format!(
            "odd PCM16 byte count: {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / f32::from(i16::MAX))
        .collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn frame(samples: Vec<f32>) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: 16_000,
            channels: 1,
        }
    }

    #[test]
    fn encode_then_decode_preserves_samples() {
        let original = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        let chunk = encode_frame(&frame(original.clone()));
        let decoded = decode_pcm16(&chunk.data).unwrap();

        assert_eq!(decoded.len(), original.len());
        for (a, b) in original.iter().zip(&decoded) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let chunk = encode_frame(&frame(vec![2.0, -2.0]));
        let decoded = decode_pcm16(&chunk.data).unwrap();
        assert!((decoded[0] - 1.0).abs() < 1e-3);
        assert!((decoded[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn invalid_base64_is_malformed() {
        assert!(matches!(
            decode_pcm16("not base64!!!"),
            Err(VoxError::Malformed(_))
        ));
    }

    #[test]
    fn odd_byte_count_is_malformed() {
        let data = BASE64.encode([0u8, 1, 2]);
        assert!(matches!(decode_pcm16(&data), Err(VoxError::Malformed(_))));
    }
}
