//! PCM frame transcoding and amplitude metadata.
//!
//! The wire carries audio as base64-encoded PCM 16-bit signed little-endian.
//! Transcoding is lossless: `decode(encode(x)) == x` bit-exact. All functions
//! here are pure and safe to call concurrently on independent buffers.

use base64::prelude::*;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{SessionError, SessionResult};

/// Normalized amplitude above which a frame counts as significant signal.
pub const SIGNIFICANCE_THRESHOLD: f32 = 0.01;

/// Pack samples into little-endian bytes.
pub fn encode_pcm(samples: &[i16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        buf.put_i16_le(sample);
    }
    buf.freeze()
}

/// Unpack little-endian bytes into samples.
///
/// Rejects odd-length input; a partial trailing sample indicates a truncated
/// frame and is never silently dropped.
pub fn decode_pcm(data: &[u8]) -> SessionResult<Vec<i16>> {
    if data.len() % 2 != 0 {
        return Err(SessionError::Codec(format!(
            "PCM payload length {} is not a multiple of 2",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Encode samples to the base64 wire representation.
pub fn to_wire(samples: &[i16]) -> String {
    BASE64_STANDARD.encode(encode_pcm(samples))
}

/// Decode the base64 wire representation back to samples.
pub fn from_wire(payload: &str) -> SessionResult<Vec<i16>> {
    let bytes = BASE64_STANDARD
        .decode(payload)
        .map_err(|e| SessionError::Codec(format!("invalid base64 payload: {e}")))?;
    decode_pcm(&bytes)
}

/// Maximum normalized absolute amplitude across the buffer, clamped to [0, 1].
pub fn peak_amplitude(samples: &[i16]) -> f32 {
    samples
        .iter()
        .map(|&s| s.unsigned_abs() as f32 / 32768.0)
        .fold(0.0f32, f32::max)
        .clamp(0.0, 1.0)
}

/// Whether any sample exceeds the significance threshold.
pub fn has_significant_audio(samples: &[i16]) -> bool {
    peak_amplitude(samples) > SIGNIFICANCE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_exact() {
        let samples: Vec<i16> = vec![0, 1, -1, i16::MAX, i16::MIN, 12345, -12345];
        let encoded = encode_pcm(&samples);
        assert_eq!(encoded.len(), samples.len() * 2);
        assert_eq!(decode_pcm(&encoded).expect("Should decode"), samples);
    }

    #[test]
    fn test_wire_round_trip() {
        let samples: Vec<i16> = (-500..500).collect();
        let wire = to_wire(&samples);
        assert_eq!(from_wire(&wire).expect("Should decode"), samples);
    }

    #[test]
    fn test_empty_buffer() {
        assert!(decode_pcm(&[]).expect("Should decode").is_empty());
        assert_eq!(peak_amplitude(&[]), 0.0);
        assert!(!has_significant_audio(&[]));
    }

    #[test]
    fn test_odd_length_rejected() {
        let err = decode_pcm(&[0u8, 1, 2]).unwrap_err();
        match err {
            SessionError::Codec(_) => {}
            _ => panic!("Expected Codec error"),
        }
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(from_wire("not base64!!!").is_err());
    }

    #[test]
    fn test_peak_amplitude_half_scale() {
        // One sample at half scale, the rest silent
        let mut samples = vec![0i16; 100];
        samples[42] = 16384;
        assert_eq!(peak_amplitude(&samples), 0.5);
        assert!(has_significant_audio(&samples));
    }

    #[test]
    fn test_all_zero_buffer() {
        let samples = vec![0i16; 160];
        assert_eq!(peak_amplitude(&samples), 0.0);
        assert!(!has_significant_audio(&samples));
    }

    #[test]
    fn test_min_sample_clamped() {
        // i16::MIN normalizes to exactly 1.0 after clamping
        assert_eq!(peak_amplitude(&[i16::MIN]), 1.0);
    }

    #[test]
    fn test_threshold_boundary() {
        // 327 / 32768 ≈ 0.00998, just under the threshold
        assert!(!has_significant_audio(&[327]));
        // 330 / 32768 ≈ 0.01007, just over
        assert!(has_significant_audio(&[330]));
    }
}
