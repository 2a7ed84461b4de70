//! Microphone capture using cpal
//!
//! cpal streams are not `Send` on every platform, so each capture owns a
//! dedicated thread that builds the input stream, plays it, and drops it when
//! asked to stop. Stopping joins that thread: once `stop_all` returns the
//! device is released and no further chunk can arrive. On a multi-thread
//! runtime the join runs under `block_in_place` so other tasks keep moving.

use super::source::{
    AudioChunk, CaptureError, CaptureFormat, CaptureHandle, CaptureTracks, RecordingSource,
};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Capture from a cpal input device
pub struct MicrophoneSource {
    /// Device name (None = default input device)
    device_name: Option<String>,
}

impl MicrophoneSource {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    /// List available capture devices
    pub fn list_devices() -> Result<Vec<String>, CaptureError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| classify_backend_message(e.to_string()))?
            .filter_map(|device| device.name().ok())
            .collect::<Vec<_>>();

        debug!("Found {} input devices", devices.len());
        Ok(devices)
    }
}

#[async_trait]
impl RecordingSource for MicrophoneSource {
    async fn start(&self) -> Result<CaptureHandle, CaptureError> {
        let device_name = self.device_name.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = match open_stream(device_name.as_deref(), chunk_tx) {
                    Ok((stream, format)) => {
                        let _ = ready_tx.send(Ok(format));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Blocks until stop is requested or the tracks handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Capture stream dropped");
            })
            .map_err(|e| {
                CaptureError::DeviceUnavailable(format!("Failed to spawn capture thread: {}", e))
            })?;

        let format = match ready_rx.await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CaptureError::DeviceUnavailable(
                    "Capture thread exited during startup".to_string(),
                ))
            }
        };

        Ok(CaptureHandle::new(
            format,
            chunk_rx,
            Box::new(MicrophoneTracks {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            }),
        ))
    }
}

/// Owns the capture thread of one recording
struct MicrophoneTracks {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureTracks for MicrophoneTracks {
    fn stop_all(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if join_capture_thread(thread).is_err() {
                error!("Capture thread panicked");
            }
        }
    }
}

/// Join without stalling a tokio worker when one is available
///
/// `block_in_place` is only legal on a multi-thread runtime; elsewhere the
/// join is bounded by the thread dropping its stream after the stop signal.
fn join_capture_thread(thread: JoinHandle<()>) -> std::thread::Result<()> {
    let on_worker = Handle::try_current()
        .map(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
        .unwrap_or(false);

    if on_worker {
        tokio::task::block_in_place(|| thread.join())
    } else {
        thread.join()
    }
}

impl Drop for MicrophoneTracks {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn open_stream(
    device_name: Option<&str>,
    chunk_tx: mpsc::UnboundedSender<AudioChunk>,
) -> Result<(Stream, CaptureFormat), CaptureError> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name)?;

    let supported = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("Input device not available".to_string())
        }
        other => classify_backend_message(other.to_string()),
    })?;

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let format = CaptureFormat {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    info!(
        sample_rate = format.sample_rate,
        channels = format.channels,
        sample_format = ?sample_format,
        "Opening capture stream"
    );

    let stream = match sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &config, chunk_tx)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, chunk_tx)?,
        SampleFormat::F32 => build_stream::<f32>(&device, &config, chunk_tx)?,
        other => {
            return Err(CaptureError::DeviceUnavailable(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream.play().map_err(|e| match e {
        cpal::PlayStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("Input device not available".to_string())
        }
        other => classify_backend_message(other.to_string()),
    })?;

    Ok((stream, format))
}

fn select_device(host: &cpal::Host, device_name: Option<&str>) -> Result<Device, CaptureError> {
    if let Some(name) = device_name {
        let mut devices = host
            .input_devices()
            .map_err(|e| classify_backend_message(e.to_string()))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Using requested input device: {}", name);
            return Ok(device);
        }
        warn!("Requested input device '{}' not found, falling back to default", name);
    }

    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceUnavailable("No default input device found".to_string()))?;

    info!(
        "Using default input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    chunk_tx: mpsc::UnboundedSender<AudioChunk>,
) -> Result<Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let err_fn = |err: cpal::StreamError| error!("Capture stream error: {}", err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if data.is_empty() {
                    return;
                }
                let chunk: AudioChunk = data.iter().map(|&s| s.to_sample::<i16>()).collect();
                // Receiver gone means the recording was finalized
                let _ = chunk_tx.send(chunk);
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                CaptureError::DeviceUnavailable("Input device not available".to_string())
            }
            other => classify_backend_message(other.to_string()),
        })
}

/// Backends report permission problems only through their message text
fn classify_backend_message(message: String) -> CaptureError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CaptureError::PermissionDenied
    } else {
        CaptureError::DeviceUnavailable(message)
    }
}
