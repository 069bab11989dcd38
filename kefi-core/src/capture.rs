use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioError, LevelAnalyzer, assemble_payload};
use crate::config::CoreSettings;
use crate::input::{DocumentHost, normalize_transcript, replace_first};
use crate::metrics::RuntimeMetrics;
use crate::network::{NetworkError, TranscriptionService};
use crate::permissions::{DeviceErrorClass, classify_device_error};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("microphone access was denied: {0}")]
    PermissionDenied(String),
    #[error("no microphone was found: {0}")]
    DeviceNotFound(String),
    #[error("audio capture is not supported here: {0}")]
    Unsupported(String),
    #[error("recording failed: {0}")]
    RecordingFailure(String),
    #[error("transcription failed: {0}")]
    TranscriptionFailure(String),
}

impl CaptureError {
    pub fn from_device_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_device_error(&message) {
            DeviceErrorClass::PermissionDenied => CaptureError::PermissionDenied(message),
            DeviceErrorClass::DeviceNotFound => CaptureError::DeviceNotFound(message),
            DeviceErrorClass::Unsupported => CaptureError::Unsupported(message),
            DeviceErrorClass::Other => CaptureError::RecordingFailure(message),
        }
    }
}

impl From<AudioError> for CaptureError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::NoInputDevice => CaptureError::DeviceNotFound(err.to_string()),
            AudioError::HostUnavailable(message) | AudioError::UnsupportedSampleFormat(message) => {
                CaptureError::Unsupported(message)
            }
            AudioError::DefaultInputConfig(message)
            | AudioError::StreamBuild(message)
            | AudioError::StreamStart(message) => CaptureError::from_device_message(message),
            other => CaptureError::RecordingFailure(other.to_string()),
        }
    }
}

impl From<NetworkError> for CaptureError {
    fn from(err: NetworkError) -> Self {
        CaptureError::TranscriptionFailure(err.to_string())
    }
}

pub trait CaptureStream: Send {
    fn sample_rate(&self) -> u32;

    fn drain(&mut self) -> Vec<f32>;

    fn failure(&self) -> Option<String>;

    /// Stops capture and frees the device. Must be safe to call repeatedly.
    fn release(&mut self);
}

pub trait AudioInput: Send + Sync {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn CaptureStream>, CaptureError>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Transcribing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionOutcome {
    pub text: String,
    /// `false` when the placeholder was gone by the time the text arrived.
    pub placed: bool,
}

#[derive(Debug, Clone)]
struct CaptureSettings {
    placeholder_token: String,
    error_marker: String,
    bucket_count: usize,
    level_interval: Duration,
    max_recording: Duration,
}

struct SessionResources {
    stream: Box<dyn CaptureStream>,
    recorded: Vec<f32>,
    tasks: Vec<JoinHandle<()>>,
    released: bool,
}

impl SessionResources {
    fn new(stream: Box<dyn CaptureStream>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self {
            stream,
            recorded: Vec::new(),
            tasks,
            released: false,
        }
    }

    fn release(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if !self.released {
            self.stream.release();
            self.released = true;
            debug!("capture resources released");
        }
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        self.release();
    }
}

/// Releases on the blocking pool; a device release may join its worker thread.
async fn release_off_runtime(mut resources: SessionResources) {
    if let Err(err) = tokio::task::spawn_blocking(move || resources.release()).await {
        warn!(error = %err, "failed to release capture resources");
    }
}

#[derive(Default)]
struct CaptureInner {
    state: RecordingState,
    acquiring: bool,
    cancel_acquire: bool,
    session_id: u64,
    token: Option<String>,
    resources: Option<SessionResources>,
}

struct CaptureShared {
    inner: Mutex<CaptureInner>,
    input: Arc<dyn AudioInput>,
    transcriber: Arc<dyn TranscriptionService>,
    host: Arc<dyn DocumentHost>,
    metrics: Arc<Mutex<RuntimeMetrics>>,
    settings: CaptureSettings,
    levels: watch::Sender<Vec<f32>>,
    elapsed_secs: watch::Sender<u64>,
    state: watch::Sender<RecordingState>,
    last_error: watch::Sender<Option<CaptureError>>,
}

#[derive(Clone)]
pub struct CaptureSession {
    shared: Arc<CaptureShared>,
}

impl CaptureSession {
    pub fn new(
        input: Arc<dyn AudioInput>,
        transcriber: Arc<dyn TranscriptionService>,
        host: Arc<dyn DocumentHost>,
        metrics: Arc<Mutex<RuntimeMetrics>>,
        settings: &CoreSettings,
    ) -> Self {
        let settings = CaptureSettings {
            placeholder_token: settings.placeholder_token.clone(),
            error_marker: settings.transcription_error_marker.clone(),
            bucket_count: LevelAnalyzer::new(settings.level_bucket_count).bucket_count(),
            level_interval: settings.level_interval(),
            max_recording: settings.max_recording(),
        };
        let (levels, _) = watch::channel(vec![0.0; settings.bucket_count]);
        let (elapsed_secs, _) = watch::channel(0);
        let (state, _) = watch::channel(RecordingState::Idle);
        let (last_error, _) = watch::channel(None);

        Self {
            shared: Arc::new(CaptureShared {
                inner: Mutex::new(CaptureInner::default()),
                input,
                transcriber,
                host,
                metrics,
                settings,
                levels,
                elapsed_secs,
                state,
                last_error,
            }),
        }
    }

    pub fn state(&self) -> RecordingState {
        *self.shared.state.borrow()
    }

    pub async fn is_disabled(&self) -> bool {
        let inner = self.shared.inner.lock().await;
        inner.acquiring || inner.state != RecordingState::Idle
    }

    pub fn subscribe_levels(&self) -> watch::Receiver<Vec<f32>> {
        self.shared.levels.subscribe()
    }

    pub fn subscribe_elapsed(&self) -> watch::Receiver<u64> {
        self.shared.elapsed_secs.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RecordingState> {
        self.shared.state.subscribe()
    }

    /// Most recent failure of a session that ended without a caller to report
    /// to (device errors, automatic stop).
    pub fn subscribe_errors(&self) -> watch::Receiver<Option<CaptureError>> {
        self.shared.last_error.subscribe()
    }

    /// Acquires the microphone and inserts the placeholder at the caret.
    /// Returns `Ok(false)` without side effects when a session is already
    /// active.
    pub async fn start(&self) -> Result<bool, CaptureError> {
        {
            let mut inner = self.shared.inner.lock().await;
            if inner.acquiring || inner.state != RecordingState::Idle {
                debug!(state = ?inner.state, "start ignored; capture already active");
                return Ok(false);
            }
            inner.acquiring = true;
            inner.cancel_acquire = false;
        }

        let opened = self.shared.input.open().await;

        let mut inner = self.shared.inner.lock().await;
        inner.acquiring = false;
        let stream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "failed to acquire microphone");
                return Err(err);
            }
        };
        if std::mem::take(&mut inner.cancel_acquire) {
            drop(inner);
            release_off_runtime(SessionResources::new(stream, Vec::new())).await;
            info!("capture shut down while the microphone was being acquired");
            return Ok(false);
        }

        let token = self.shared.settings.placeholder_token.clone();
        self.shared.host.insert_at_caret(&token);

        inner.session_id += 1;
        let session_id = inner.session_id;
        let sample_rate = stream.sample_rate();
        inner.token = Some(token);
        inner.state = RecordingState::Recording;
        let tasks = vec![
            tokio::spawn(run_level_loop(self.clone(), session_id)),
            tokio::spawn(run_elapsed_counter(
                Arc::clone(&self.shared),
                Instant::now(),
            )),
            tokio::spawn(run_auto_stop(self.clone(), session_id)),
        ];
        inner.resources = Some(SessionResources::new(stream, tasks));

        self.shared.elapsed_secs.send_replace(0);
        self.shared.last_error.send_replace(None);
        self.shared.state.send_replace(RecordingState::Recording);
        info!(session_id, sample_rate, "recording started");
        Ok(true)
    }

    pub async fn stop(&self) -> Result<Option<TranscriptionOutcome>, CaptureError> {
        self.finish(None).await
    }

    /// Tears down whatever is active and resolves an outstanding placeholder
    /// to the error marker. A transcription still in flight is discarded.
    pub async fn shutdown(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.acquiring {
            inner.cancel_acquire = true;
        }
        let was_active = inner.state != RecordingState::Idle;

        let resources = inner.resources.take();
        if let Some(token) = inner.token.take() {
            self.substitute(&token, &self.shared.settings.error_marker);
        }
        inner.session_id += 1;
        inner.state = RecordingState::Idle;
        drop(inner);

        if let Some(resources) = resources {
            release_off_runtime(resources).await;
        }

        self.publish_idle();
        if was_active {
            info!("capture session shut down");
        }
    }

    async fn finish(
        &self,
        expected_session: Option<u64>,
    ) -> Result<Option<TranscriptionOutcome>, CaptureError> {
        let shared = &self.shared;
        let (session_id, mut resources) = {
            let mut inner = shared.inner.lock().await;
            if inner.state != RecordingState::Recording {
                debug!(state = ?inner.state, "stop ignored; not recording");
                return Ok(None);
            }
            if expected_session.is_some_and(|id| id != inner.session_id) {
                return Ok(None);
            }
            let Some(resources) = inner.resources.take() else {
                return Ok(None);
            };
            inner.state = RecordingState::Transcribing;
            (inner.session_id, resources)
        };

        let tail = resources.stream.drain();
        resources.recorded.extend_from_slice(&tail);
        let failure = resources.stream.failure();
        let sample_rate = resources.stream.sample_rate();
        let samples = std::mem::take(&mut resources.recorded);
        release_off_runtime(resources).await;

        shared.state.send_replace(RecordingState::Transcribing);
        shared.levels.send_replace(vec![0.0; shared.settings.bucket_count]);
        info!(
            session_id,
            samples = samples.len(),
            sample_rate,
            "recording stopped; transcribing"
        );

        let started = Instant::now();
        let result = match failure {
            Some(failure) => Err(CaptureError::RecordingFailure(failure)),
            None => self.transcribe(samples, sample_rate).await,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut inner = shared.inner.lock().await;
        if inner.session_id != session_id {
            debug!(
                session_id,
                "capture was shut down during transcription; discarding result"
            );
            return result.map(|text| Some(TranscriptionOutcome { text, placed: false }));
        }
        let token = inner.token.take();
        inner.state = RecordingState::Idle;

        let outcome = match result {
            Ok(text) => {
                let placed = token
                    .as_deref()
                    .is_some_and(|token| self.substitute(token, &text));
                drop(inner);
                shared
                    .metrics
                    .lock()
                    .await
                    .record_transcription_success(elapsed_ms);
                info!(
                    session_id,
                    placed,
                    chars = text.chars().count(),
                    elapsed_ms,
                    "transcription resolved"
                );
                Ok(Some(TranscriptionOutcome { text, placed }))
            }
            Err(err) => {
                if let Some(token) = token.as_deref() {
                    self.substitute(token, &shared.settings.error_marker);
                }
                drop(inner);
                let mut metrics = shared.metrics.lock().await;
                match err {
                    CaptureError::TranscriptionFailure(_) => {
                        metrics.record_transcription_failure(elapsed_ms)
                    }
                    _ => metrics.record_capture_abort(),
                }
                drop(metrics);
                error!(session_id, error = %err, "transcription failed");
                shared.last_error.send_replace(Some(err.clone()));
                Err(err)
            }
        };

        self.publish_idle();
        outcome
    }

    async fn transcribe(&self, samples: Vec<f32>, sample_rate: u32) -> Result<String, CaptureError> {
        if samples.is_empty() {
            return Err(CaptureError::TranscriptionFailure(
                "no audio was captured".to_string(),
            ));
        }

        let payload =
            tokio::task::spawn_blocking(move || assemble_payload(&samples, sample_rate))
                .await
                .map_err(|err| CaptureError::TranscriptionFailure(err.to_string()))?
                .map_err(|err| CaptureError::TranscriptionFailure(err.to_string()))?;
        debug!(
            bytes = payload.bytes.len(),
            duration_ms = payload.duration_ms,
            "uploading recording"
        );

        let transcript = self.shared.transcriber.transcribe(payload).await?;
        Ok(normalize_transcript(&transcript))
    }

    async fn abort(&self, session_id: u64, err: CaptureError) {
        let mut inner = self.shared.inner.lock().await;
        if inner.session_id != session_id || inner.state != RecordingState::Recording {
            return;
        }

        let resources = inner.resources.take();
        if let Some(token) = inner.token.take() {
            self.substitute(&token, &self.shared.settings.error_marker);
        }
        inner.state = RecordingState::Idle;
        drop(inner);

        if let Some(resources) = resources {
            release_off_runtime(resources).await;
        }

        self.shared.metrics.lock().await.record_capture_abort();
        error!(session_id, error = %err, "recording aborted");
        self.shared.last_error.send_replace(Some(err));
        self.publish_idle();
    }

    fn substitute(&self, token: &str, replacement: &str) -> bool {
        let content = self.shared.host.content();
        match replace_first(&content, token, replacement) {
            Some(updated) => {
                self.shared.host.propose_content(updated);
                true
            }
            None => {
                warn!("placeholder token no longer in document; nothing inserted");
                false
            }
        }
    }

    fn publish_idle(&self) {
        self.shared
            .levels
            .send_replace(vec![0.0; self.shared.settings.bucket_count]);
        self.shared.elapsed_secs.send_replace(0);
        self.shared.state.send_replace(RecordingState::Idle);
    }
}

async fn run_level_loop(session: CaptureSession, session_id: u64) {
    let shared = &session.shared;
    let mut analyzer = LevelAnalyzer::new(shared.settings.bucket_count);
    let mut ticker = tokio::time::interval(shared.settings.level_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let failure = {
            let mut inner = shared.inner.lock().await;
            if inner.session_id != session_id || inner.state != RecordingState::Recording {
                return;
            }
            let Some(resources) = inner.resources.as_mut() else {
                return;
            };

            let fresh = resources.stream.drain();
            resources.recorded.extend_from_slice(&fresh);
            match resources.stream.failure() {
                Some(failure) => Some(failure),
                None => {
                    shared
                        .levels
                        .send_replace(analyzer.analyze(&resources.recorded));
                    None
                }
            }
        };

        if let Some(failure) = failure {
            warn!(session_id, failure = failure.as_str(), "audio stream failed mid-session");
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .abort(session_id, CaptureError::RecordingFailure(failure))
                    .await;
            });
            return;
        }
    }
}

async fn run_elapsed_counter(shared: Arc<CaptureShared>, started_at: Instant) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        shared.elapsed_secs.send_replace(started_at.elapsed().as_secs());
    }
}

async fn run_auto_stop(session: CaptureSession, session_id: u64) {
    tokio::time::sleep(session.shared.settings.max_recording).await;
    info!(session_id, "maximum recording length reached; stopping");
    tokio::spawn(async move {
        if let Err(err) = session.finish(Some(session_id)).await {
            warn!(session_id, error = %err, "automatic stop failed");
        }
    });
}
