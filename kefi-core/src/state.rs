use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::audio::CpalInput;
use crate::capture::{AudioInput, CaptureError, CaptureSession, TranscriptionOutcome};
use crate::config::CoreSettings;
use crate::error::AppError;
use crate::executor::{ExecutionOutcome, OperationExecutor};
use crate::input::DocumentHost;
use crate::metrics::{PerformanceReport, RuntimeMetrics};
use crate::network::{BackendClient, NetworkError, TextBackend, TranscriptionService};
use crate::operations::{OperationDescriptor, OperationError, OperationOptions, build_catalog};
use crate::permissions::{PermissionReport, check_permissions};
use crate::placement::{Point, Size, ToolbarPlacement};
use crate::selection::{OperationStatus, Selection, SelectionState, Visibility};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionView {
    pub selection: Option<Selection>,
    pub visibility: Visibility,
    pub status: OperationStatus,
    pub active_operation: Option<String>,
}

pub struct RuntimeState {
    pub settings: CoreSettings,
    pub selection: Arc<Mutex<SelectionState>>,
    pub executor: OperationExecutor,
    pub capture: CaptureSession,
    pub metrics: Arc<Mutex<RuntimeMetrics>>,
    backend_client: Option<Arc<BackendClient>>,
}

#[derive(Clone)]
pub struct CoreState {
    runtime: Arc<RuntimeState>,
}

impl CoreState {
    pub fn new(
        settings: CoreSettings,
        host: Arc<dyn DocumentHost>,
        backend: Arc<dyn TextBackend>,
        transcriber: Arc<dyn TranscriptionService>,
        audio_input: Arc<dyn AudioInput>,
    ) -> Result<Self, AppError> {
        Self::assemble(settings, host, backend, transcriber, audio_input, None)
    }

    pub fn connect(settings: CoreSettings, host: Arc<dyn DocumentHost>) -> Result<Self, AppError> {
        let settings = settings.validate()?;
        let client = Arc::new(
            BackendClient::new(&settings).map_err(|err| AppError::ClientBuild(err.to_string()))?,
        );
        Self::assemble(
            settings,
            host,
            client.clone(),
            client.clone(),
            Arc::new(CpalInput::default()),
            Some(client),
        )
    }

    fn assemble(
        settings: CoreSettings,
        host: Arc<dyn DocumentHost>,
        backend: Arc<dyn TextBackend>,
        transcriber: Arc<dyn TranscriptionService>,
        audio_input: Arc<dyn AudioInput>,
        backend_client: Option<Arc<BackendClient>>,
    ) -> Result<Self, AppError> {
        let settings = settings.validate()?;
        let selection = Arc::new(Mutex::new(SelectionState::new()));
        let metrics = Arc::new(Mutex::new(RuntimeMetrics::new()));
        let catalog = build_catalog();
        let operation_count = catalog.len();

        let executor = OperationExecutor::new(
            catalog,
            Arc::clone(&selection),
            Arc::clone(&host),
            backend,
            Arc::clone(&metrics),
            &settings,
        );
        let capture = CaptureSession::new(
            audio_input,
            transcriber,
            host,
            Arc::clone(&metrics),
            &settings,
        );

        info!(
            backend_url = settings.backend_url.as_str(),
            operations = operation_count,
            "core state initialized"
        );

        Ok(Self {
            runtime: Arc::new(RuntimeState {
                settings,
                selection,
                executor,
                capture,
                metrics,
                backend_client,
            }),
        })
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.runtime.settings
    }

    pub fn capture(&self) -> &CaptureSession {
        &self.runtime.capture
    }

    pub async fn update_selection(
        &self,
        start: usize,
        end: usize,
        text: impl Into<String>,
        anchor: Option<Point>,
    ) {
        self.runtime
            .selection
            .lock()
            .await
            .update_selection(start, end, text, anchor);
    }

    pub async fn clear_selection(&self) {
        self.runtime.selection.lock().await.clear_selection();
    }

    pub async fn dismiss_error(&self) {
        self.runtime.selection.lock().await.dismiss_error();
    }

    pub async fn selection_view(&self) -> SelectionView {
        let selection = self.runtime.selection.lock().await;
        SelectionView {
            selection: selection.selection().cloned(),
            visibility: selection.visibility(),
            status: selection.status().clone(),
            active_operation: selection.active_operation().map(str::to_string),
        }
    }

    pub async fn toolbar_position(&self, toolbar: Size, viewport: Size) -> Option<ToolbarPlacement> {
        self.runtime
            .selection
            .lock()
            .await
            .toolbar_position(toolbar, viewport, &self.runtime.settings)
    }

    pub async fn available_operations(&self) -> Vec<OperationDescriptor> {
        self.runtime.executor.available_operations().await
    }

    pub async fn execute(
        &self,
        operation_id: &str,
        options: OperationOptions,
    ) -> Result<ExecutionOutcome, OperationError> {
        self.runtime.executor.execute(operation_id, options).await
    }

    pub async fn start_recording(&self) -> Result<bool, CaptureError> {
        self.runtime.capture.start().await
    }

    pub async fn stop_recording(&self) -> Result<Option<TranscriptionOutcome>, CaptureError> {
        self.runtime.capture.stop().await
    }

    /// Asks the backend which operations it can serve and disables the ones it
    /// cannot. Returns the number of disabled operations in the new catalog.
    pub async fn refresh_backend_policy(&self) -> Result<usize, NetworkError> {
        let Some(client) = self.runtime.backend_client.as_ref() else {
            debug!("no backend client configured; policy refresh skipped");
            return Ok(0);
        };

        let remote = client.fetch_operation_info().await?;
        let catalog = build_catalog().with_backend_policy(&remote);
        let disabled = catalog
            .iter()
            .filter(|descriptor| descriptor.is_disabled())
            .count();
        self.runtime.executor.replace_catalog(catalog).await;
        info!(
            remote_operations = remote.len(),
            disabled, "backend operation policy applied"
        );
        Ok(disabled)
    }

    pub async fn performance_report(&self) -> PerformanceReport {
        self.runtime.metrics.lock().await.report()
    }

    pub fn check_permissions(&self) -> PermissionReport {
        check_permissions()
    }

    pub async fn shutdown(&self) {
        self.runtime.capture.shutdown().await;
        self.runtime.executor.shutdown().await;
        info!("core state shut down");
    }
}
