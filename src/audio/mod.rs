//! Audio pipeline: frame codec, capture-side emission and playback pacing.
//!
//! All audio is mono 16-bit signed PCM. The two directions run at fixed,
//! independent sample rates that are never negotiated per session.

pub mod codec;
pub mod outbound;
pub mod playback;

pub use outbound::OutboundAudio;
pub use playback::{BufferSink, Playback, PlaybackSink};

/// Sample rate of captured (outbound) audio, in Hz.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized (inbound) audio, in Hz.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// A bounded chunk of mono PCM samples with presence metadata.
///
/// Frames are moved through the pipelines and consumed exactly once; they are
/// never shared or mutated concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw 16-bit signed samples
    pub samples: Vec<i16>,
    /// Advisory hint: the frame contains perceptually significant signal
    pub has_audio: bool,
    /// Peak normalized amplitude across the buffer, clamped to [0, 1]
    pub max_amplitude: f32,
}

impl AudioFrame {
    /// Build a frame from raw samples, computing presence metadata.
    pub fn from_samples(samples: Vec<i16>) -> Self {
        let max_amplitude = codec::peak_amplitude(&samples);
        Self {
            has_audio: max_amplitude > codec::SIGNIFICANCE_THRESHOLD,
            max_amplitude,
            samples,
        }
    }

    /// Number of samples in the frame.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
