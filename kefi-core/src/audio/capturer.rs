use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info, warn};

use super::AudioError;
use crate::capture::{AudioInput, CaptureError, CaptureStream};
use crate::permissions::{PermissionState, check_microphone_permission};

type FailureSlot = Arc<Mutex<Option<String>>>;

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub buffer_size: u32,
    pub ready_timeout: Duration,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 48_000,
            buffer_size: 480,
            ready_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns the cpal input stream. cpal streams are not `Send`, so a capturer
/// lives on the thread that created it.
pub struct AudioCapturer {
    pub config: AudioConfig,
    stream: Option<Stream>,
    consumer: Option<Consumer<Vec<f32>>>,
    dropped_chunks: Arc<AtomicUsize>,
    failure: FailureSlot,
    pub device_name: String,
}

impl AudioCapturer {
    pub fn new(mut config: AudioConfig) -> Result<Self, AudioError> {
        if config.buffer_size == 0 {
            return Err(AudioError::InvalidConfig(
                "buffer_size must be greater than 0".to_string(),
            ));
        }

        let host = cpal::default_host();
        let mut devices = host
            .input_devices()
            .map_err(|err| AudioError::HostUnavailable(err.to_string()))?;
        if devices.next().is_none() {
            return Err(AudioError::NoInputDevice);
        }
        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;

        let device_name = match device.name() {
            Ok(name) => name,
            Err(_) => "unknown-input-device".to_string(),
        };

        let supported_config = device
            .default_input_config()
            .map_err(|err| AudioError::DefaultInputConfig(err.to_string()))?;
        let sample_format = supported_config.sample_format();
        let stream_config: StreamConfig = supported_config.into();
        config.input_sample_rate = stream_config.sample_rate.0;

        let ring_capacity =
            ((config.input_sample_rate as usize / config.buffer_size as usize) * 2).max(64);
        let (producer, consumer) = RingBuffer::<Vec<f32>>::new(ring_capacity);
        let dropped_chunks = Arc::new(AtomicUsize::new(0));
        let failure: FailureSlot = Arc::new(Mutex::new(None));

        let callbacks = StreamCallbacks {
            input_channels: usize::from(stream_config.channels),
            producer,
            dropped_chunks: Arc::clone(&dropped_chunks),
            failure: Arc::clone(&failure),
        };
        let stream = match sample_format {
            SampleFormat::F32 => build_stream(&device, &stream_config, callbacks, |sample: f32| {
                sample
            })?,
            SampleFormat::I16 => build_stream(&device, &stream_config, callbacks, |sample: i16| {
                sample as f32 / i16::MAX as f32
            })?,
            SampleFormat::U16 => build_stream(&device, &stream_config, callbacks, |sample: u16| {
                (sample as f32 / u16::MAX as f32) * 2.0 - 1.0
            })?,
            other => {
                return Err(AudioError::UnsupportedSampleFormat(format!("{other:?}")));
            }
        };

        debug!(
            device_name = device_name.as_str(),
            input_sample_rate = config.input_sample_rate,
            "audio capturer initialized"
        );

        Ok(Self {
            config,
            stream: Some(stream),
            consumer: Some(consumer),
            dropped_chunks,
            failure,
            device_name,
        })
    }

    pub fn take_consumer(&mut self) -> Result<Consumer<Vec<f32>>, AudioError> {
        self.consumer
            .take()
            .ok_or_else(|| AudioError::InvalidConfig("ring buffer consumer already taken".to_string()))
    }

    pub fn start(&self) -> Result<(), AudioError> {
        match &self.stream {
            Some(stream) => stream
                .play()
                .map_err(|err| AudioError::StreamStart(err.to_string())),
            None => Err(AudioError::StreamStart("stream is not initialized".to_string())),
        }
    }

    pub fn stop(&self) -> Result<(), AudioError> {
        match &self.stream {
            Some(stream) => stream
                .pause()
                .map_err(|err| AudioError::StreamStop(err.to_string())),
            None => Ok(()),
        }
    }

    pub fn dropped_chunk_count(&self) -> usize {
        self.dropped_chunks.load(Ordering::Relaxed)
    }
}

struct StreamCallbacks {
    input_channels: usize,
    producer: Producer<Vec<f32>>,
    dropped_chunks: Arc<AtomicUsize>,
    failure: FailureSlot,
}

fn build_stream<T, F>(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    callbacks: StreamCallbacks,
    normalize: F,
) -> Result<Stream, AudioError>
where
    T: cpal::SizedSample + Send + 'static,
    F: Fn(T) -> f32 + Send + 'static,
{
    let StreamCallbacks {
        input_channels,
        mut producer,
        dropped_chunks,
        failure,
    } = callbacks;

    device
        .build_input_stream(
            stream_config,
            move |data: &[T], _| {
                let mono_chunk = interleaved_to_mono(data, input_channels, &normalize);
                if producer.push(mono_chunk).is_err() {
                    mark_dropped(&dropped_chunks);
                }
            },
            move |err| {
                warn!("audio stream callback error: {err}");
                if let Ok(mut slot) = failure.lock() {
                    slot.get_or_insert_with(|| err.to_string());
                }
            },
            None,
        )
        .map_err(|err| AudioError::StreamBuild(err.to_string()))
}

fn interleaved_to_mono<T, F>(data: &[T], input_channels: usize, normalize: &F) -> Vec<f32>
where
    T: Copy,
    F: Fn(T) -> f32,
{
    if input_channels <= 1 {
        return data.iter().map(|sample| normalize(*sample)).collect();
    }

    let mut mono = Vec::with_capacity(data.len() / input_channels);
    for frame in data.chunks_exact(input_channels) {
        let sum: f32 = frame.iter().map(|sample| normalize(*sample)).sum();
        mono.push(sum / input_channels as f32);
    }
    mono
}

fn mark_dropped(counter: &AtomicUsize) {
    let total = counter.fetch_add(1, Ordering::Relaxed) + 1;
    if total.is_multiple_of(100) {
        warn!(
            dropped_chunks = total,
            "audio chunks dropped due to ring buffer pressure"
        );
    }
}

#[derive(Debug, Clone, Default)]
pub struct CpalInput {
    config: AudioConfig,
}

impl CpalInput {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

struct ReadyStream {
    consumer: Consumer<Vec<f32>>,
    sample_rate: u32,
    failure: FailureSlot,
}

impl AudioInput for CpalInput {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn CaptureStream>, CaptureError>> {
        let config = self.config.clone();
        async move {
            if check_microphone_permission() == PermissionState::Denied {
                return Err(CaptureError::DeviceNotFound(
                    "no default audio input device".to_string(),
                ));
            }

            let ready_timeout = config.ready_timeout;
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<ReadyStream, AudioError>>(1);
            let worker = thread::Builder::new()
                .name("kefi-capture".to_string())
                .spawn(move || run_capture_worker(config, stop_rx, ready_tx))
                .map_err(|err| CaptureError::RecordingFailure(err.to_string()))?;

            let ready =
                tokio::task::spawn_blocking(move || ready_rx.recv_timeout(ready_timeout)).await;

            let mut stream = CpalStream {
                consumer: None,
                sample_rate: 0,
                failure: Arc::new(Mutex::new(None)),
                stop_tx: Some(stop_tx),
                worker: Some(worker),
            };

            match ready {
                Ok(Ok(Ok(ready))) => {
                    info!(sample_rate = ready.sample_rate, "microphone stream acquired");
                    stream.consumer = Some(ready.consumer);
                    stream.sample_rate = ready.sample_rate;
                    stream.failure = ready.failure;
                    Ok(Box::new(stream) as Box<dyn CaptureStream>)
                }
                Ok(Ok(Err(err))) => {
                    stream.release();
                    Err(CaptureError::from(err))
                }
                Ok(Err(err)) => {
                    stream.release();
                    Err(CaptureError::from(AudioError::WorkerStart(err.to_string())))
                }
                Err(err) => {
                    stream.release();
                    Err(CaptureError::from(AudioError::WorkerStart(err.to_string())))
                }
            }
        }
        .boxed()
    }
}

fn run_capture_worker(
    config: AudioConfig,
    stop_rx: Receiver<()>,
    ready_tx: SyncSender<Result<ReadyStream, AudioError>>,
) {
    let mut capturer = match AudioCapturer::new(config) {
        Ok(value) => value,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    let consumer = match capturer.take_consumer() {
        Ok(value) => value,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    if let Err(err) = capturer.start() {
        let _ = ready_tx.send(Err(err));
        return;
    }

    let ready = ReadyStream {
        consumer,
        sample_rate: capturer.config.input_sample_rate,
        failure: Arc::clone(&capturer.failure),
    };
    if ready_tx.send(Ok(ready)).is_err() {
        let _ = capturer.stop();
        return;
    }

    // Blocks until release() sends or drops the stop sender.
    let _ = stop_rx.recv();

    if let Err(err) = capturer.stop() {
        warn!("failed to stop audio capturer: {err}");
    }
    let dropped = capturer.dropped_chunk_count();
    if dropped > 0 {
        warn!(dropped_chunks = dropped, "capture session dropped audio chunks");
    }
    debug!(
        device_name = capturer.device_name.as_str(),
        "capture worker exiting"
    );
}

struct CpalStream {
    consumer: Option<Consumer<Vec<f32>>>,
    sample_rate: u32,
    failure: FailureSlot,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn drain(&mut self) -> Vec<f32> {
        let mut samples = Vec::new();
        if let Some(consumer) = self.consumer.as_mut() {
            while let Ok(chunk) = consumer.pop() {
                samples.extend_from_slice(&chunk);
            }
        }
        samples
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|slot| slot.clone())
    }

    fn release(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("capture worker thread panicked");
            }
            debug!("microphone stream released");
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_frames_are_averaged() {
        let mono = interleaved_to_mono(&[0.5_f32, -0.5, 1.0, 0.0], 2, &|sample: f32| sample);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn i16_samples_are_normalized() {
        let mono = interleaved_to_mono(&[i16::MAX, 0], 1, &|sample: i16| {
            sample as f32 / i16::MAX as f32
        });
        assert_eq!(mono, vec![1.0, 0.0]);
    }

    #[test]
    fn released_stream_is_idle_and_release_is_idempotent() {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let worker = thread::spawn(move || {
            let _ = stop_rx.recv();
        });
        let mut stream = CpalStream {
            consumer: None,
            sample_rate: 48_000,
            failure: Arc::new(Mutex::new(Some("device unplugged".to_string()))),
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        };

        assert_eq!(stream.failure().as_deref(), Some("device unplugged"));
        stream.release();
        stream.release();
        assert!(stream.drain().is_empty());
        assert!(stream.worker.is_none());
    }
}
