//! Microphone capture abstraction and its `cpal`-backed implementation (C10).

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};

use crate::config::DeviceSelector;
use crate::error::CaptureError;

/// Parameters the capture implementation must honor: mono output at
/// `sample_rate`, delivered in blocks of `block_size` samples.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSpec {
    pub sample_rate: u32,
    pub block_size: usize,
}

/// A running capture stream. Dropping it stops capture.
pub trait CaptureHandle {
    fn is_active(&self) -> bool;
}

/// A narrow abstraction over the microphone: open a stream that invokes a
/// caller-supplied callback with mono `f32` blocks at `spec.sample_rate`.
/// The callback runs on the realtime audio thread and must never block.
pub trait Capture {
    type Handle: CaptureHandle;

    fn open<F>(&self, spec: CaptureSpec, on_block: F) -> Result<Self::Handle, CaptureError>
    where
        F: FnMut(&[f32]) + Send + 'static;
}

pub struct CpalHandle {
    stream: Stream,
}

impl CaptureHandle for CpalHandle {
    fn is_active(&self) -> bool {
        true
    }
}

/// `cpal`-backed capture. Resolves `device` (§6 `audio.device`) by index or
/// case-insensitive substring match against enumerated input device names,
/// falling back to the host's default input device when unset.
pub struct CpalCapture {
    device: Option<DeviceSelector>,
}

impl CpalCapture {
    pub fn new(device: Option<DeviceSelector>) -> Self {
        Self { device }
    }

    fn resolve_device(&self, host: &cpal::Host) -> Result<Device, CaptureError> {
        match &self.device {
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
            Some(DeviceSelector::Index(idx)) => {
                let devices: Vec<Device> = host
                    .input_devices()
                    .map_err(|e| CaptureError::BuildStream(e.to_string()))?
                    .collect();
                let idx = usize::try_from(*idx).map_err(|_| {
                    CaptureError::DeviceNotFound(idx.to_string())
                })?;
                devices
                    .into_iter()
                    .nth(idx)
                    .ok_or_else(|| CaptureError::DeviceNotFound(idx.to_string()))
            }
            Some(DeviceSelector::Name(needle)) => {
                let needle = needle.to_lowercase();
                let devices = host
                    .input_devices()
                    .map_err(|e| CaptureError::BuildStream(e.to_string()))?;
                for device in devices {
                    if let Ok(name) = device.name() {
                        if name.to_lowercase().contains(&needle) {
                            return Ok(device);
                        }
                    }
                }
                Err(CaptureError::DeviceNotFound(needle))
            }
        }
    }
}

impl Capture for CpalCapture {
    type Handle = CpalHandle;

    fn open<F>(&self, spec: CaptureSpec, mut on_block: F) -> Result<Self::Handle, CaptureError>
    where
        F: FnMut(&[f32]) + Send + 'static,
    {
        let host = cpal::default_host();
        let device = self.resolve_device(&host)?;

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::BuildStream(e.to_string()))?;
        let source_channels = supported.channels() as usize;

        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let block_size = spec.block_size;
        let mut pending: Vec<f32> = Vec::with_capacity(block_size);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    downmix_into(data, source_channels, &mut pending, block_size, &mut on_block);
                },
                move |err| log::error!("input stream error: {}", err),
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let floats: Vec<f32> = data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    downmix_into(&floats, source_channels, &mut pending, block_size, &mut on_block);
                },
                move |err| log::error!("input stream error: {}", err),
                None,
            ),
            other => {
                return Err(CaptureError::BuildStream(format!(
                    "unsupported sample format: {:?}",
                    other
                )))
            }
        }
        .map_err(|e| CaptureError::BuildStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::StartStream(e.to_string()))?;

        Ok(CpalHandle { stream })
    }
}

/// Downmix an interleaved block to mono and accumulate into `pending`,
/// flushing full `block_size` chunks to `on_block` as they fill.
fn downmix_into(
    interleaved: &[f32],
    channels: usize,
    pending: &mut Vec<f32>,
    block_size: usize,
    on_block: &mut impl FnMut(&[f32]),
) {
    if channels == 0 {
        return;
    }
    for frame in interleaved.chunks_exact(channels) {
        let mono = frame.iter().sum::<f32>() / channels as f32;
        pending.push(mono);
        if pending.len() >= block_size {
            on_block(pending);
            pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_flushes_at_block_size() {
        let mut pending = Vec::new();
        let mut flushed: Vec<Vec<f32>> = Vec::new();
        let stereo = [1.0, 3.0, 2.0, 4.0, 5.0, 7.0, 6.0, 8.0];
        downmix_into(&stereo, 2, &mut pending, 2, &mut |block| {
            flushed.push(block.to_vec());
        });
        assert_eq!(flushed, vec![vec![2.0, 3.0], vec![6.0, 7.0]]);
        assert!(pending.is_empty());
    }

    #[test]
    fn downmix_retains_partial_block() {
        let mut pending = Vec::new();
        let mut flushed: Vec<Vec<f32>> = Vec::new();
        let mono = [1.0, 2.0, 3.0];
        downmix_into(&mono, 1, &mut pending, 4, &mut |block| {
            flushed.push(block.to_vec());
        });
        assert!(flushed.is_empty());
        assert_eq!(pending, vec![1.0, 2.0, 3.0]);
    }
}
