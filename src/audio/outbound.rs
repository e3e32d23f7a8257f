//! Capture-side audio pipeline.
//!
//! Turns captured PCM chunks into outbound [`ClientEvent::AudioChunk`]
//! messages, but only while the session is active. Frames offered outside
//! the active phase are dropped silently; this avoids races right at session
//! start and stop. The outbound queue is bounded: under sustained
//! backpressure frames are dropped rather than blocking the capture source.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, watch};
use tracing::{trace, warn};

use crate::audio::codec;
use crate::protocol::ClientEvent;
use crate::session::SessionPhase;

/// Capacity of the outbound message queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Handle for feeding captured PCM into the session.
///
/// Cheap to clone; all clones share the same queue and drop counter. Capture
/// code calls [`push`](Self::push) at its own cadence and is never blocked.
#[derive(Clone)]
pub struct OutboundAudio {
    phase: watch::Receiver<SessionPhase>,
    outgoing: mpsc::Sender<ClientEvent>,
    dropped: Arc<AtomicU64>,
}

impl OutboundAudio {
    pub(crate) fn new(
        phase: watch::Receiver<SessionPhase>,
        outgoing: mpsc::Sender<ClientEvent>,
    ) -> Self {
        Self {
            phase,
            outgoing,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Offer one chunk of captured PCM samples.
    ///
    /// Encodes the chunk, computes presence metadata and enqueues the message.
    /// Dropped without error while the session is not active or when the
    /// queue is full.
    pub fn push(&self, samples: &[i16]) {
        if *self.phase.borrow() != SessionPhase::Active {
            trace!("Session not active, dropping capture frame");
            return;
        }

        let event = ClientEvent::AudioChunk {
            audio: codec::to_wire(samples),
            has_audio: codec::has_significant_audio(samples),
            max_amplitude: codec::peak_amplitude(samples),
        };

        if let Err(mpsc::error::TrySendError::Full(_)) = self.outgoing.try_send(event) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped, "Outbound queue full, dropping capture frame");
        }
    }

    /// Number of frames dropped due to backpressure since session creation.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
