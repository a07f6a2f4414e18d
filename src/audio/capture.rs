//! Microphone capture via cpal.
//!
//! Captures at the device's native sample rate, downmixes to mono, and
//! resamples to the session input rate (default 16kHz). The stream callback
//! only pushes into the bounded [`FrameQueue`]; encoding and sending happen
//! on a separate task so the callback always returns promptly.

use crate::audio::{AudioFrame, FrameQueue};
use crate::config::AudioConfig;
use crate::error::{Result, VoxError};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Audio capture from the system microphone.
pub struct CpalCapture {
    device: cpal::Device,
    stream_config: StreamConfig,
    /// Rate the session sends to the service (e.g. 16kHz).
    target_sample_rate: u32,
}

impl CpalCapture {
    /// Acquire the input device.
    ///
    /// Uses the device's default configuration for compatibility and
    /// resamples to the target rate in software.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::DeviceAccess` if no input device is available or
    /// the named device cannot be found.
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| VoxError::DeviceAccess(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| VoxError::DeviceAccess(format!("input device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| VoxError::DeviceAccess("no default input device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        let default_config = device
            .default_input_config()
            .map_err(|e| VoxError::DeviceAccess(format!("no default input config: {e}")))?;

        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            device,
            stream_config,
            target_sample_rate: config.input_sample_rate,
        })
    }

    /// Run the capture stream, pushing frames into `frames` until cancelled.
    ///
    /// The device is released when this returns, even if frames are still in
    /// flight downstream.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio stream cannot be created or started.
    pub async fn run(&self, frames: FrameQueue, cancel: CancellationToken) -> Result<()> {
        let native_rate = self.stream_config.sample_rate;
        let native_channels = self.stream_config.channels;
        let target_rate = self.target_sample_rate;

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        downmix(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    let samples = if native_rate != target_rate {
                        resample(&mono, native_rate, target_rate)
                    } else {
                        mono
                    };
                    frames.push(AudioFrame {
                        samples,
                        sample_rate: target_rate,
                        channels: 1,
                    });
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| VoxError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| VoxError::Audio(format!("failed to start input stream: {e}")))?;

        info!("audio capture started: native {native_rate}Hz -> target {target_rate}Hz");

        // Hold the stream alive until the session tears down.
        cancel.cancelled().await;

        drop(stream);
        info!("audio capture stopped");
        Ok(())
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
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
impl crate::audio::InputDevice for CpalCapture {
    async fn run(self: Box<Self>, frames: FrameQueue, cancel: CancellationToken) -> Result<()> {
        CpalCapture::run(&self, frames, cancel).await
    }
}

/// Average interleaved channels down to mono.
fn downmix(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler.
///
/// Speech energy sits below 8kHz, so for 48kHz -> 16kHz this is sufficient
/// without an anti-alias filter.
fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };
        output.push(sample as f32);
    }

    output
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        let mono = downmix(&stereo, 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn resample_halves_length_for_double_rate() {
        let samples: Vec<f32> = (0..480).map(|i| (i as f32) / 480.0).collect();
        let out = resample(&samples, 48_000, 16_000);
        assert_eq!(out.len(), 160);
        // A linear ramp stays a linear ramp.
        assert!((out[80] - 0.5).abs() < 0.02);
    }

    #[test]
    fn resample_is_identity_at_equal_rates() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16_000, 16_000), samples);
    }
}
