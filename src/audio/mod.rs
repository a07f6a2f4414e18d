//! Audio capture, playback scheduling, and the wire codec.

pub mod capture;
pub mod encode;
pub mod playback;
pub mod scheduler;

use crate::config::AudioConfig;
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One fixed-size frame of captured audio.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono f32 samples at `sample_rate`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count after downmixing (always 1 today).
    pub channels: u16,
}

/// Commands consumed by the playback device task.
#[derive(Debug)]
pub enum PlaybackCommand {
    /// Schedule decoded samples for gapless playback.
    Enqueue { samples: Vec<f32> },
    /// Interruption: discard every live chunk and reset the cursor.
    Flush,
}

/// Bounded frame queue between the capture callback and the encode task.
///
/// The capture callback must return promptly, so `push` never blocks and
/// never allocates while holding the lock longer than a deque operation.
/// Overflow policy: **drop-oldest** — under sustained slowness the freshest
/// audio wins.
#[derive(Clone)]
pub struct FrameQueue {
    inner: Arc<FrameQueueInner>,
}

struct FrameQueueInner {
    frames: Mutex<VecDeque<AudioFrame>>,
    notify: Notify,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(FrameQueueInner {
                frames: Mutex::new(VecDeque::with_capacity(capacity)),
                notify: Notify::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Append a frame, evicting the oldest when full.
    ///
    /// Returns `true` if an old frame was dropped. Safe to call from the
    /// realtime capture callback.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let dropped = {
            let mut frames = match self.inner.frames.lock() {
                Ok(f) => f,
                Err(_) => return false,
            };
            let dropped = if frames.len() >= self.inner.capacity {
                frames.pop_front();
                true
            } else {
                false
            };
            frames.push_back(frame);
            dropped
        };
        if dropped {
            debug!("capture queue full, dropped oldest frame");
        }
        self.inner.notify.notify_one();
        dropped
    }

    /// Wait for and take the oldest queued frame.
    pub async fn pop(&self) -> AudioFrame {
        loop {
            if let Ok(mut frames) = self.inner.frames.lock()
                && let Some(frame) = frames.pop_front()
            {
                return frame;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.inner.frames.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Seam between the session controller and the platform audio stack.
///
/// Device acquisition happens synchronously in `start()` so permission
/// failures surface as a failed start, never mid-session. The returned
/// devices run until the session's cancellation token fires, then release
/// their streams.
pub trait AudioDevices: Send + Sync + 'static {
    /// Acquire the input device.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::DeviceAccess` when the device is unavailable or
    /// permission is refused.
    fn open_input(&self, config: &AudioConfig) -> Result<Box<dyn InputDevice>>;

    /// Acquire the output device.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::DeviceAccess` when the device is unavailable.
    fn open_output(&self, config: &AudioConfig) -> Result<Box<dyn OutputDevice>>;
}

/// A running input device: streams captured frames until cancelled.
#[async_trait::async_trait]
pub trait InputDevice: Send + 'static {
    async fn run(self: Box<Self>, frames: FrameQueue, cancel: CancellationToken) -> Result<()>;
}

/// A running output device: drains playback commands until cancelled.
#[async_trait::async_trait]
pub trait OutputDevice: Send + 'static {
    async fn run(
        self: Box<Self>,
        commands: mpsc::UnboundedReceiver<PlaybackCommand>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// cpal-backed [`AudioDevices`] implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalAudio;

impl AudioDevices for CpalAudio {
    fn open_input(&self, config: &AudioConfig) -> Result<Box<dyn InputDevice>> {
        Ok(Box::new(capture::CpalCapture::open(config)?))
    }

    fn open_output(&self, config: &AudioConfig) -> Result<Box<dyn OutputDevice>> {
        Ok(Box::new(playback::CpalPlayback::open(config)?))
    }
}
