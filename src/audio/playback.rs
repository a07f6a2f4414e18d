//! Speaker playback via cpal, scheduled for gapless rendering.
//!
//! Inbound chunks queue behind each other in arrival order; the output
//! callback drains them back-to-back so there is never a gap or an overlap.
//! A flush (barge-in or teardown) silences the device immediately.

use crate::audio::PlaybackCommand;
use crate::audio::scheduler::{PlaybackSchedule, Scheduled};
use crate::config::AudioConfig;
use crate::error::{Result, VoxError};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// One chunk waiting on, or partially through, the device.
struct QueuedChunk {
    handle: u64,
    samples: Vec<f32>,
    pos: usize,
}

/// Scheduled chunk queue shared between the session task and the output
/// callback. The schedule's cursor and live-handle set live here so both
/// sides observe one consistent state under a single lock.
pub struct ChunkQueue {
    schedule: PlaybackSchedule,
    chunks: VecDeque<QueuedChunk>,
    frames_played: u64,
    sample_rate: u32,
}

impl ChunkQueue {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            schedule: PlaybackSchedule::new(),
            chunks: VecDeque::new(),
            frames_played: 0,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Current device time in seconds, derived from frames rendered so far.
    pub fn device_time(&self) -> f64 {
        self.frames_played as f64 / f64::from(self.sample_rate)
    }

    /// Schedule a chunk after everything already queued.
    pub fn enqueue(&mut self, samples: Vec<f32>) -> Scheduled {
        let duration = samples.len() as f64 / f64::from(self.sample_rate);
        let (handle, slot) = self.schedule.schedule(self.device_time(), duration);
        self.chunks.push_back(QueuedChunk {
            handle,
            samples,
            pos: 0,
        });
        slot
    }

    /// Render into the device buffer, completing chunks as they exhaust.
    /// Silence when nothing is queued.
    pub fn fill(&mut self, out: &mut [f32]) {
        for slot in out.iter_mut() {
            *slot = loop {
                match self.chunks.front_mut() {
                    Some(chunk) if chunk.pos < chunk.samples.len() => {
                        let sample = chunk.samples[chunk.pos];
                        chunk.pos += 1;
                        break sample;
                    }
                    Some(chunk) => {
                        // Natural completion: the handle removes itself.
                        let handle = chunk.handle;
                        self.chunks.pop_front();
                        self.schedule.complete(handle);
                    }
                    None => break 0.0,
                }
            };
        }
        self.frames_played += out.len() as u64;
    }

    /// Discard every queued chunk and reset the cursor.
    ///
    /// Returns how many live handles were discarded. The next chunk will
    /// schedule relative to current device time.
    pub fn flush(&mut self) -> usize {
        self.chunks.clear();
        self.schedule.flush().len()
    }

    /// Chunks scheduled or playing right now.
    pub fn live_count(&self) -> usize {
        self.schedule.live_count()
    }
}

/// Audio playback to the system speakers.
pub struct CpalPlayback {
    device: cpal::Device,
    stream_config: StreamConfig,
    sample_rate: u32,
}

impl CpalPlayback {
    /// Acquire the output device.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::DeviceAccess` if no output device is available or
    /// the named device cannot be found.
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.output_device {
            host.output_devices()
                .map_err(|e| VoxError::DeviceAccess(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    VoxError::DeviceAccess(format!("output device '{name}' not found"))
                })?
        } else {
            host.default_output_device()
                .ok_or_else(|| VoxError::DeviceAccess("no default output device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate: config.output_sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            device,
            stream_config,
            sample_rate: config.output_sample_rate,
        })
    }

    /// Run the output stream, draining playback commands until cancelled.
    ///
    /// Teardown flushes pending chunks and releases the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio stream cannot be created or started.
    pub async fn run(
        &self,
        mut commands: mpsc::UnboundedReceiver<PlaybackCommand>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let queue = Arc::new(Mutex::new(ChunkQueue::new(self.sample_rate)));
        let queue_cb = Arc::clone(&queue);

        let stream = self
            .device
            .build_output_stream(
                &self.stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    match queue_cb.lock() {
                        Ok(mut q) => q.fill(data),
                        Err(_) => data.fill(0.0),
                    }
                },
                move |err| {
                    error!("audio output stream error: {err}");
                },
                None,
            )
            .map_err(|e| VoxError::Audio(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| VoxError::Audio(format!("failed to start output stream: {e}")))?;

        info!("audio playback started at {}Hz", self.sample_rate);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    if let Ok(mut q) = queue.lock() {
                        match cmd {
                            PlaybackCommand::Enqueue { samples } => {
                                q.enqueue(samples);
                            }
                            PlaybackCommand::Flush => {
                                let discarded = q.flush();
                                if discarded > 0 {
                                    info!("playback flushed, {discarded} chunks discarded");
                                }
                            }
                        }
                    }
                }
            }
        }

        // Teardown path: empty the queue before releasing the device.
        if let Ok(mut q) = queue.lock() {
            q.flush();
        }
        drop(stream);
        info!("audio playback stopped");
        Ok(())
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| VoxError::DeviceAccess(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

#[async_trait::async_trait]
impl crate::audio::OutputDevice for CpalPlayback {
    async fn run(
        self: Box<Self>,
        commands: mpsc::UnboundedReceiver<PlaybackCommand>,
        cancel: CancellationToken,
    ) -> Result<()> {
        CpalPlayback::run(&self, commands, cancel).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn chunks_render_back_to_back() {
        let mut queue = ChunkQueue::new(4);
        queue.enqueue(vec![1.0, 2.0]);
        queue.enqueue(vec![3.0, 4.0]);

        let mut out = [0.0f32; 6];
        queue.fill(&mut out);
        // Both chunks render contiguously, then silence.
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn handles_complete_naturally_as_chunks_exhaust() {
        let mut queue = ChunkQueue::new(4);
        queue.enqueue(vec![1.0, 1.0]);
        queue.enqueue(vec![2.0, 2.0]);
        assert_eq!(queue.live_count(), 2);

        let mut out = [0.0f32; 3];
        queue.fill(&mut out);
        // First chunk done, second still live.
        assert_eq!(queue.live_count(), 1);

        queue.fill(&mut out);
        assert_eq!(queue.live_count(), 0);
    }

    #[test]
    fn flush_silences_immediately_and_resets_cursor() {
        let mut queue = ChunkQueue::new(4);
        queue.enqueue(vec![1.0; 8]);
        queue.enqueue(vec![2.0; 8]);

        let discarded = queue.flush();
        assert_eq!(discarded, 2);
        assert_eq!(queue.live_count(), 0);

        let mut out = [9.0f32; 4];
        queue.fill(&mut out);
        assert_eq!(out, [0.0; 4]);

        // Next chunk schedules relative to current device time, not after
        // the discarded audio.
        let slot = queue.enqueue(vec![1.0; 4]);
        assert_eq!(slot.start, queue.device_time());
    }

    #[test]
    fn scheduled_slots_never_gap_or_overlap() {
        let mut queue = ChunkQueue::new(1000);
        let mut previous_end = 0.0;
        for i in 0..20 {
            let slot = queue.enqueue(vec![0.0; 100]);
            assert!(slot.start >= previous_end, "overlap at chunk {i}");
            assert_eq!(slot.start, previous_end, "gap at chunk {i}");
            previous_end = slot.end;
        }
    }

    #[test]
    fn device_time_advances_with_rendering() {
        let mut queue = ChunkQueue::new(100);
        assert_eq!(queue.device_time(), 0.0);
        let mut out = [0.0f32; 50];
        queue.fill(&mut out);
        assert!((queue.device_time() - 0.5).abs() < 1e-9);
    }
}
