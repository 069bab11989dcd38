use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CoreSettings;
use crate::input::{DocumentHost, splice_checked};
use crate::metrics::RuntimeMetrics;
use crate::network::TextBackend;
use crate::operations::{Catalog, OperationDescriptor, OperationError, OperationOptions};
use crate::selection::{AutoHide, Selection, SelectionState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub operation_id: String,
    pub range: Range<usize>,
    pub text: String,
}

pub struct OperationExecutor {
    catalog: Mutex<Arc<Catalog>>,
    selection: Arc<Mutex<SelectionState>>,
    host: Arc<dyn DocumentHost>,
    backend: Arc<dyn TextBackend>,
    metrics: Arc<Mutex<RuntimeMetrics>>,
    success_display: Duration,
    auto_hide_task: Mutex<Option<JoinHandle<()>>>,
}

impl OperationExecutor {
    pub fn new(
        catalog: Catalog,
        selection: Arc<Mutex<SelectionState>>,
        host: Arc<dyn DocumentHost>,
        backend: Arc<dyn TextBackend>,
        metrics: Arc<Mutex<RuntimeMetrics>>,
        settings: &CoreSettings,
    ) -> Self {
        Self {
            catalog: Mutex::new(Arc::new(catalog)),
            selection,
            host,
            backend,
            metrics,
            success_display: settings.success_display(),
            auto_hide_task: Mutex::new(None),
        }
    }

    pub async fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&*self.catalog.lock().await)
    }

    /// Swaps the catalog used by later calls. Operations already running keep
    /// the descriptor they started with.
    pub async fn replace_catalog(&self, catalog: Catalog) {
        *self.catalog.lock().await = Arc::new(catalog);
    }

    pub async fn available_operations(&self) -> Vec<OperationDescriptor> {
        let catalog = self.catalog().await;
        let selection = self.selection.lock().await;
        match selection.selection() {
            Some(current) => catalog
                .get_available(&current.text)
                .into_iter()
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub async fn execute(
        &self,
        operation_id: &str,
        options: OperationOptions,
    ) -> Result<ExecutionOutcome, OperationError> {
        let started = Instant::now();
        let catalog = self.catalog().await;

        let (ticket, snapshot, descriptor) = {
            let mut selection = self.selection.lock().await;
            if selection.is_pending() {
                warn!(
                    operation = operation_id,
                    pending = selection.active_operation().unwrap_or_default(),
                    "operation rejected while another is pending"
                );
                return Err(OperationError::Busy);
            }

            let (snapshot, descriptor) =
                match prepare(&catalog, &selection, operation_id, &options) {
                    Ok(value) => value,
                    Err(err) => {
                        if err != OperationError::NoSelection {
                            selection.reject_operation(operation_id, err.to_string());
                        }
                        warn!(operation = operation_id, error = %err, "operation refused");
                        return Err(err);
                    }
                };
            let ticket = selection.start_operation(operation_id)?;
            (ticket, snapshot, descriptor)
        };

        info!(
            operation = operation_id,
            start = snapshot.start,
            end = snapshot.end,
            is_async = descriptor.is_async(),
            "operation started"
        );

        let result = descriptor
            .invoke(&snapshot.text, &options, self.backend.as_ref())
            .await;

        let mut selection = self.selection.lock().await;
        let outcome = result.and_then(|text| self.merge(operation_id, &snapshot, text));
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(merged) => {
                let anchor = self.host.caret_anchor_point();
                if selection.reanchor(ticket, merged.range.start, &merged.text, anchor) {
                    if let Some(auto_hide) = selection.complete_operation(ticket) {
                        self.schedule_auto_hide(auto_hide).await;
                    }
                } else {
                    debug!(
                        operation = operation_id,
                        "selection moved on while operation ran; result applied without re-anchoring"
                    );
                }
                drop(selection);

                self.metrics.lock().await.record_operation_success(elapsed_ms);
                info!(
                    operation = operation_id,
                    start = merged.range.start,
                    end = merged.range.end,
                    elapsed_ms,
                    "operation succeeded"
                );
            }
            Err(err) => {
                selection.fail_operation(ticket, err.to_string());
                drop(selection);

                let mut metrics = self.metrics.lock().await;
                if *err == OperationError::StaleSelection {
                    metrics.record_stale_rejection(elapsed_ms);
                    warn!(
                        operation = operation_id,
                        start = snapshot.start,
                        end = snapshot.end,
                        "operation result rejected; selected text changed while pending"
                    );
                } else {
                    metrics.record_operation_failure(elapsed_ms);
                    warn!(operation = operation_id, error = %err, elapsed_ms, "operation failed");
                }
            }
        }

        outcome
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.auto_hide_task.lock().await.take() {
            task.abort();
        }
    }

    fn merge(
        &self,
        operation_id: &str,
        snapshot: &Selection,
        result: String,
    ) -> Result<ExecutionOutcome, OperationError> {
        let content = self.host.content();
        let merged = splice_checked(&content, snapshot.start, snapshot.end, &snapshot.text, &result)?;
        self.host.propose_content(merged);

        Ok(ExecutionOutcome {
            operation_id: operation_id.to_string(),
            range: snapshot.start..snapshot.start + result.len(),
            text: result,
        })
    }

    async fn schedule_auto_hide(&self, auto_hide: AutoHide) {
        let selection = Arc::clone(&self.selection);
        let delay = self.success_display;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if selection.lock().await.expire_success(auto_hide) {
                debug!("success display elapsed");
            }
        });

        if let Some(previous) = self.auto_hide_task.lock().await.replace(task) {
            previous.abort();
        }
    }
}

fn prepare<'c>(
    catalog: &'c Catalog,
    selection: &SelectionState,
    operation_id: &str,
    options: &OperationOptions,
) -> Result<(Selection, &'c OperationDescriptor), OperationError> {
    let descriptor = catalog
        .get(operation_id)
        .ok_or_else(|| OperationError::UnknownOperation(operation_id.to_string()))?;
    let snapshot = selection
        .selection()
        .cloned()
        .ok_or(OperationError::NoSelection)?;

    if descriptor.requires_prompt() && !options.has_instruction() {
        return Err(OperationError::MissingInstruction(operation_id.to_string()));
    }
    if !descriptor.is_available(&snapshot.text) {
        return Err(OperationError::HandlerFailure(format!(
            "operation `{operation_id}` is not available for the selected text"
        )));
    }

    Ok((snapshot, descriptor))
}
