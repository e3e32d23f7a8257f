//! Playback-side audio pipeline.
//!
//! Buffers synthesized-audio frames in arrival order and drives a
//! [`PlaybackSink`] one frame at a time: the next frame starts only after the
//! previous one has finished playing, so frames never overlap and are never
//! reordered. An empty queue leaves playback idle; no synthetic silence is
//! inserted.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::audio::AudioFrame;

/// Consumer of decoded playback frames.
///
/// Implementations wrap the actual output device (or a test collector). The
/// `play` future must resolve when the frame has finished playing; the driver
/// relies on that to serialize playback.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Play one frame to completion.
    async fn play(&self, frame: AudioFrame);
}

/// Sink that collects frames instead of playing them. Used in tests and as a
/// stand-in when no output device is attached.
#[derive(Default)]
pub struct BufferSink {
    frames: Mutex<Vec<AudioFrame>>,
}

impl BufferSink {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames received so far, in playback order.
    pub fn frames(&self) -> Vec<AudioFrame> {
        self.frames.lock().expect("sink lock poisoned").clone()
    }
}

#[async_trait]
impl PlaybackSink for BufferSink {
    async fn play(&self, frame: AudioFrame) {
        self.frames.lock().expect("sink lock poisoned").push(frame);
    }
}

/// Ordered playback queue with a serialized driver task.
pub struct Playback {
    queue: Arc<Mutex<VecDeque<AudioFrame>>>,
    notify: Arc<Notify>,
    closed: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

impl Playback {
    /// Spawn the driver task over the given sink.
    pub fn spawn(sink: Arc<dyn PlaybackSink>) -> Self {
        let queue: Arc<Mutex<VecDeque<AudioFrame>>> = Arc::new(Mutex::new(VecDeque::new()));
        let notify = Arc::new(Notify::new());
        let closed = Arc::new(AtomicBool::new(false));

        let driver_queue = queue.clone();
        let driver_notify = notify.clone();
        let driver_closed = closed.clone();
        let driver = tokio::spawn(async move {
            loop {
                if driver_closed.load(Ordering::SeqCst) {
                    break;
                }
                let next = driver_queue.lock().expect("playback lock poisoned").pop_front();
                match next {
                    // The previous frame has fully played before the next one
                    // is dequeued; this await is the serialization point.
                    Some(frame) => sink.play(frame).await,
                    None => driver_notify.notified().await,
                }
            }
            debug!("Playback driver stopped");
        });

        Self {
            queue,
            notify,
            closed,
            driver,
        }
    }

    /// Append a frame to the tail of the queue.
    pub fn enqueue(&self, frame: AudioFrame) {
        self.queue
            .lock()
            .expect("playback lock poisoned")
            .push_back(frame);
        self.notify.notify_one();
    }

    /// Discard all queued frames. A frame already handed to the sink is
    /// allowed to finish; nothing queued before this call will play after it.
    pub fn clear(&self) {
        self.queue.lock().expect("playback lock poisoned").clear();
    }

    /// Number of frames waiting to play.
    pub fn len(&self) -> usize {
        self.queue.lock().expect("playback lock poisoned").len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the driver after any in-progress frame and discard the queue.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.clear();
        self.notify.notify_one();
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.close();
        self.driver.abort();
    }
}
