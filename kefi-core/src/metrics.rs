use std::collections::VecDeque;

use serde::Serialize;

use crate::utils::now_epoch_ms;

const DEFAULT_WINDOW_SIZE: usize = 256;
const OPERATION_P95_TARGET_MS: u64 = 2_000;
const TRANSCRIPTION_P95_TARGET_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub samples: usize,
    pub average_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

impl MetricSummary {
    fn empty() -> Self {
        Self {
            samples: 0,
            average_ms: 0,
            p95_ms: 0,
            max_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub generated_at_ms: u64,
    pub operation_latency: MetricSummary,
    pub transcription_latency: MetricSummary,
    pub operations_succeeded: u64,
    pub operations_failed: u64,
    pub stale_rejections: u64,
    pub transcriptions_succeeded: u64,
    pub transcriptions_failed: u64,
    pub capture_aborts: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct RollingMetric {
    values: VecDeque<u64>,
    capacity: usize,
}

impl RollingMetric {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, value_ms: u64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value_ms);
    }

    fn summary(&self) -> MetricSummary {
        if self.values.is_empty() {
            return MetricSummary::empty();
        }

        let samples = self.values.len();
        let sum: u64 = self.values.iter().sum();
        let mut sorted = self.values.iter().copied().collect::<Vec<_>>();
        sorted.sort_unstable();
        let p95_index = ((samples as f64 * 0.95).ceil() as usize)
            .saturating_sub(1)
            .min(samples - 1);

        MetricSummary {
            samples,
            average_ms: sum / samples as u64,
            p95_ms: sorted[p95_index],
            max_ms: sorted[samples - 1],
        }
    }
}

#[derive(Debug)]
pub struct RuntimeMetrics {
    operation_ms: RollingMetric,
    transcription_ms: RollingMetric,
    operations_succeeded: u64,
    operations_failed: u64,
    stale_rejections: u64,
    transcriptions_succeeded: u64,
    transcriptions_failed: u64,
    capture_aborts: u64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self {
            operation_ms: RollingMetric::new(DEFAULT_WINDOW_SIZE),
            transcription_ms: RollingMetric::new(DEFAULT_WINDOW_SIZE),
            operations_succeeded: 0,
            operations_failed: 0,
            stale_rejections: 0,
            transcriptions_succeeded: 0,
            transcriptions_failed: 0,
            capture_aborts: 0,
        }
    }

    pub fn record_operation_success(&mut self, latency_ms: u64) {
        self.operation_ms.record(latency_ms);
        self.operations_succeeded += 1;
    }

    pub fn record_operation_failure(&mut self, latency_ms: u64) {
        self.operation_ms.record(latency_ms);
        self.operations_failed += 1;
    }

    /// A stale rejection is also counted as a failed operation.
    pub fn record_stale_rejection(&mut self, latency_ms: u64) {
        self.record_operation_failure(latency_ms);
        self.stale_rejections += 1;
    }

    pub fn record_transcription_success(&mut self, latency_ms: u64) {
        self.transcription_ms.record(latency_ms);
        self.transcriptions_succeeded += 1;
    }

    pub fn record_transcription_failure(&mut self, latency_ms: u64) {
        self.transcription_ms.record(latency_ms);
        self.transcriptions_failed += 1;
    }

    pub fn record_capture_abort(&mut self) {
        self.capture_aborts += 1;
    }

    pub fn report(&self) -> PerformanceReport {
        let operation_latency = self.operation_ms.summary();
        let transcription_latency = self.transcription_ms.summary();

        let mut warnings = Vec::new();
        if self.stale_rejections > 0 {
            warnings.push(format!(
                "Rejected {} operation results because the document changed underneath them.",
                self.stale_rejections
            ));
        }
        if self.transcriptions_failed > 0 {
            warnings.push(format!(
                "{} transcriptions failed.",
                self.transcriptions_failed
            ));
        }
        if self.capture_aborts > 0 {
            warnings.push(format!(
                "{} recordings were aborted by device errors.",
                self.capture_aborts
            ));
        }
        if operation_latency.samples > 0 && operation_latency.p95_ms > OPERATION_P95_TARGET_MS {
            warnings.push(format!(
                "Operation P95 latency {}ms exceeded target {}ms.",
                operation_latency.p95_ms, OPERATION_P95_TARGET_MS
            ));
        }
        if transcription_latency.samples > 0
            && transcription_latency.p95_ms > TRANSCRIPTION_P95_TARGET_MS
        {
            warnings.push(format!(
                "Transcription P95 latency {}ms exceeded target {}ms.",
                transcription_latency.p95_ms, TRANSCRIPTION_P95_TARGET_MS
            ));
        }

        PerformanceReport {
            generated_at_ms: now_epoch_ms(),
            operation_latency,
            transcription_latency,
            operations_succeeded: self.operations_succeeded,
            operations_failed: self.operations_failed,
            stale_rejections: self.stale_rejections,
            transcriptions_succeeded: self.transcriptions_succeeded,
            transcriptions_failed: self.transcriptions_failed,
            capture_aborts: self.capture_aborts,
            warnings,
        }
    }
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reports_average_p95_and_max() {
        let mut metric = RollingMetric::new(DEFAULT_WINDOW_SIZE);
        for value in 1..=100 {
            metric.record(value);
        }

        let summary = metric.summary();
        assert_eq!(summary.samples, 100);
        assert_eq!(summary.average_ms, 50);
        assert_eq!(summary.p95_ms, 95);
        assert_eq!(summary.max_ms, 100);
    }

    #[test]
    fn rolling_window_evicts_oldest_samples() {
        let mut metric = RollingMetric::new(3);
        for value in [1_000, 1, 2, 3] {
            metric.record(value);
        }
        assert_eq!(metric.summary().max_ms, 3);
    }

    #[test]
    fn empty_report_has_no_warnings() {
        let report = RuntimeMetrics::new().report();
        assert_eq!(report.operation_latency, MetricSummary::empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn stale_rejections_count_as_failures_and_warn() {
        let mut metrics = RuntimeMetrics::new();
        metrics.record_operation_success(12);
        metrics.record_stale_rejection(30);
        metrics.record_transcription_failure(40);

        let report = metrics.report();
        assert_eq!(report.operations_succeeded, 1);
        assert_eq!(report.operations_failed, 1);
        assert_eq!(report.stale_rejections, 1);
        assert_eq!(report.transcriptions_failed, 1);
        assert_eq!(report.warnings.len(), 2);
    }
}
