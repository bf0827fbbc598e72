//! In-process metrics aggregated from workflow events.
//!
//! [`MetricsCollector`] is an [`EventSink`]: hand it to a workflow engine or
//! guide chain and it keeps counters, histograms and per-run metrics that
//! can be exported as Prometheus text or JSON.

use crate::events::{types, EventSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const PREFIX: &str = "ensemble";

/// Terminal or running status of a tracked workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Still executing.
    Running,
    /// Wrote its output.
    Completed,
    /// Terminated with an error.
    Failed,
}

/// Metrics for one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    /// Run identifier.
    pub workflow_id: String,
    /// Start time.
    pub start_time: DateTime<Utc>,
    /// End time, once finished.
    pub end_time: Option<DateTime<Utc>>,
    /// Wall-clock duration in seconds, once finished.
    pub duration_seconds: f64,
    /// Steps in the guide.
    pub total_steps: u64,
    /// Steps completed during this run (resumed steps excluded).
    pub completed_steps: u64,
    /// Steps that failed.
    pub failed_steps: u64,
    /// Generation calls per stage role.
    pub calls_by_role: BTreeMap<String, u64>,
    /// Error messages in order.
    pub errors: Vec<String>,
    /// Current status.
    pub status: WorkflowStatus,
}

impl WorkflowMetrics {
    fn new(workflow_id: impl Into<String>, total_steps: u64) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            start_time: Utc::now(),
            end_time: None,
            duration_seconds: 0.0,
            total_steps,
            completed_steps: 0,
            failed_steps: 0,
            calls_by_role: BTreeMap::new(),
            errors: Vec::new(),
            status: WorkflowStatus::Running,
        }
    }

    fn finish(&mut self, status: WorkflowStatus) {
        let end = Utc::now();
        self.duration_seconds = (end - self.start_time).num_milliseconds() as f64 / 1000.0;
        self.end_time = Some(end);
        self.status = status;
    }
}

/// Aggregate view returned by [`MetricsCollector::summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Counter values by key.
    pub counters: BTreeMap<String, f64>,
    /// Latest gauge values by key.
    pub gauges: BTreeMap<String, f64>,
    /// Histogram count/sum/min/max by key.
    pub histograms: BTreeMap<String, HistogramSummary>,
    /// Workflows by status.
    pub workflows: BTreeMap<String, u64>,
}

/// Summary statistics for one histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Number of observations.
    pub count: usize,
    /// Sum of observations.
    pub sum: f64,
    /// Smallest observation.
    pub min: f64,
    /// Largest observation.
    pub max: f64,
}

/// Collects counters, gauges, histograms and per-workflow metrics.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: DashMap<String, f64>,
    gauges: DashMap<String, f64>,
    histograms: DashMap<String, Vec<f64>>,
    workflows: DashMap<String, WorkflowMetrics>,
}

fn metric_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", v.replace('"', "\\\"")))
        .collect();
    format!("{name}{{{}}}", rendered.join(","))
}

fn base_name(key: &str) -> &str {
    key.split('{').next().unwrap_or(key)
}

impl MetricsCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds to a counter.
    pub fn increment_counter(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        *self.counters.entry(metric_key(name, labels)).or_insert(0.0) += value;
    }

    /// Sets a gauge.
    pub fn record_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.gauges.insert(metric_key(name, labels), value);
    }

    /// Records a histogram observation.
    pub fn record_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.histograms
            .entry(metric_key(name, labels))
            .or_default()
            .push(value);
    }

    /// Returns a counter value, zero if never incremented.
    #[must_use]
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        self.counters
            .get(&metric_key(name, labels))
            .map_or(0.0, |v| *v)
    }

    /// Returns the metrics for a workflow run.
    #[must_use]
    pub fn workflow(&self, workflow_id: &str) -> Option<WorkflowMetrics> {
        self.workflows.get(workflow_id).map(|m| m.clone())
    }

    /// Starts tracking a workflow run.
    pub fn start_workflow(&self, workflow_id: &str, total_steps: u64) {
        self.workflows.insert(
            workflow_id.to_string(),
            WorkflowMetrics::new(workflow_id, total_steps),
        );
        self.increment_counter(&format!("{PREFIX}_workflows_started_total"), 1.0, &[]);
        self.record_gauge(
            &format!("{PREFIX}_active_workflows"),
            self.active_workflows() as f64,
            &[],
        );
    }

    /// Records one generation call for a workflow.
    pub fn record_call(&self, workflow_id: &str, role: &str, duration_ms: Option<f64>) {
        if let Some(mut wf) = self.workflows.get_mut(workflow_id) {
            *wf.calls_by_role.entry(role.to_string()).or_insert(0) += 1;
        }
        self.increment_counter(
            &format!("{PREFIX}_generation_calls_total"),
            1.0,
            &[("role", role)],
        );
        if let Some(ms) = duration_ms {
            self.record_histogram(
                &format!("{PREFIX}_generation_duration_ms"),
                ms,
                &[("role", role)],
            );
        }
    }

    /// Records a completed step.
    pub fn complete_step(&self, workflow_id: &str, duration_ms: Option<f64>) {
        if let Some(mut wf) = self.workflows.get_mut(workflow_id) {
            wf.completed_steps += 1;
        }
        self.increment_counter(&format!("{PREFIX}_steps_completed_total"), 1.0, &[]);
        if let Some(ms) = duration_ms {
            self.record_histogram(&format!("{PREFIX}_step_duration_ms"), ms, &[]);
        }
    }

    /// Records a failure and closes the workflow as failed.
    pub fn fail_workflow(&self, workflow_id: &str, kind: &str, error: &str) {
        if let Some(mut wf) = self.workflows.get_mut(workflow_id) {
            wf.failed_steps += 1;
            wf.errors.push(error.to_string());
            wf.finish(WorkflowStatus::Failed);
        }
        self.increment_counter(&format!("{PREFIX}_errors_total"), 1.0, &[("kind", kind)]);
        self.record_gauge(
            &format!("{PREFIX}_active_workflows"),
            self.active_workflows() as f64,
            &[],
        );
    }

    /// Closes a workflow as completed.
    pub fn end_workflow(&self, workflow_id: &str) {
        if let Some(mut wf) = self.workflows.get_mut(workflow_id) {
            wf.finish(WorkflowStatus::Completed);
        }
        self.increment_counter(&format!("{PREFIX}_workflows_completed_total"), 1.0, &[]);
        self.record_gauge(
            &format!("{PREFIX}_active_workflows"),
            self.active_workflows() as f64,
            &[],
        );
    }

    fn active_workflows(&self) -> usize {
        self.workflows
            .iter()
            .filter(|wf| wf.status == WorkflowStatus::Running)
            .count()
    }

    /// Returns an aggregate snapshot.
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let counters = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        let gauges = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        let histograms = self
            .histograms
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| {
                let values = e.value();
                let summary = HistogramSummary {
                    count: values.len(),
                    sum: values.iter().sum(),
                    min: values.iter().copied().fold(f64::INFINITY, f64::min),
                    max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                };
                (e.key().clone(), summary)
            })
            .collect();
        let mut workflows = BTreeMap::new();
        for wf in &self.workflows {
            let status = serde_json::to_value(wf.status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            *workflows.entry(status).or_insert(0) += 1;
        }
        MetricsSummary {
            counters,
            gauges,
            histograms,
            workflows,
        }
    }

    /// Renders counters, gauges and histogram summaries in Prometheus text format.
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();
        let mut typed = std::collections::BTreeSet::new();

        for (key, value) in &summary.counters {
            let name = base_name(key);
            if typed.insert(name.to_string()) {
                let _ = writeln!(out, "# TYPE {name} counter");
            }
            let _ = writeln!(out, "{key} {value}");
        }
        for (key, value) in &summary.gauges {
            let name = base_name(key);
            if typed.insert(name.to_string()) {
                let _ = writeln!(out, "# TYPE {name} gauge");
            }
            let _ = writeln!(out, "{key} {value}");
        }
        for (key, hist) in &summary.histograms {
            let name = base_name(key);
            if typed.insert(name.to_string()) {
                let _ = writeln!(out, "# TYPE {name} summary");
            }
            let labels = &key[name.len()..];
            let _ = writeln!(out, "{name}_count{labels} {}", hist.count);
            let _ = writeln!(out, "{name}_sum{labels} {}", hist.sum);
        }
        out
    }

    /// Renders the summary and every workflow as pretty JSON.
    #[must_use]
    pub fn export_json(&self) -> String {
        let workflows: BTreeMap<String, WorkflowMetrics> = self
            .workflows
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let doc = serde_json::json!({
            "summary": self.summary(),
            "workflows": workflows,
        });
        serde_json::to_string_pretty(&doc).unwrap_or_default()
    }

    fn observe(&self, event_type: &str, data: Option<&Value>) {
        let field = |name: &str| data.and_then(|d| d.get(name));
        let run_id = field("run_id").and_then(Value::as_str).unwrap_or_default();
        let duration_ms = field("duration_ms").and_then(Value::as_f64);

        match event_type {
            types::WORKFLOW_STARTED => {
                let total = field("total_steps").and_then(Value::as_u64).unwrap_or(0);
                self.start_workflow(run_id, total);
            }
            types::STAGE_ITERATION => {
                let role = field("role").and_then(Value::as_str).unwrap_or("unknown");
                self.record_call(run_id, role, duration_ms);
            }
            types::STAGE_CONVERGED => {
                let stage = field("stage").and_then(Value::as_str).unwrap_or("unknown");
                self.increment_counter(
                    &format!("{PREFIX}_convergences_total"),
                    1.0,
                    &[("stage", stage)],
                );
            }
            types::STEP_COMPLETED => self.complete_step(run_id, duration_ms),
            types::CHECKPOINT_SAVED => {
                self.increment_counter(&format!("{PREFIX}_checkpoints_saved_total"), 1.0, &[]);
            }
            types::WORKFLOW_RESUMED => {
                self.increment_counter(&format!("{PREFIX}_workflows_resumed_total"), 1.0, &[]);
            }
            types::WORKFLOW_COMPLETED => self.end_workflow(run_id),
            types::WORKFLOW_FAILED => {
                let kind = field("kind").and_then(Value::as_str).unwrap_or("unknown");
                let error = field("error").and_then(Value::as_str).unwrap_or_default();
                self.fail_workflow(run_id, kind, error);
            }
            types::CHAIN_GUIDE_COMPLETED => {
                self.increment_counter(&format!("{PREFIX}_chain_guides_completed_total"), 1.0, &[]);
            }
            _ => {}
        }
    }
}

#[async_trait]
impl EventSink for MetricsCollector {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.observe(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.observe(event_type, data.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counters_with_labels() {
        let metrics = MetricsCollector::new();
        metrics.increment_counter("calls", 1.0, &[("role", "creative")]);
        metrics.increment_counter("calls", 2.0, &[("role", "creative")]);
        metrics.increment_counter("calls", 1.0, &[("role", "analytical")]);

        assert!((metrics.counter("calls", &[("role", "creative")]) - 3.0).abs() < f64::EPSILON);
        assert!((metrics.counter("calls", &[("role", "analytical")]) - 1.0).abs() < f64::EPSILON);
        assert!(metrics.counter("calls", &[]).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_events_drive_workflow_metrics() {
        let metrics = MetricsCollector::new();
        metrics
            .emit(types::WORKFLOW_STARTED, Some(json!({"run_id": "r1", "total_steps": 2})))
            .await;
        metrics
            .emit(
                types::STAGE_ITERATION,
                Some(json!({"run_id": "r1", "role": "creative", "duration_ms": 5.0})),
            )
            .await;
        metrics
            .emit(
                types::STAGE_ITERATION,
                Some(json!({"run_id": "r1", "role": "analytical", "duration_ms": 7.0})),
            )
            .await;
        metrics
            .emit(types::STEP_COMPLETED, Some(json!({"run_id": "r1", "duration_ms": 12.0})))
            .await;
        metrics.emit(types::WORKFLOW_COMPLETED, Some(json!({"run_id": "r1"}))).await;

        let wf = metrics.workflow("r1").unwrap();
        assert_eq!(wf.total_steps, 2);
        assert_eq!(wf.completed_steps, 1);
        assert_eq!(wf.calls_by_role.get("creative"), Some(&1));
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert!(wf.end_time.is_some());

        let summary = metrics.summary();
        assert_eq!(summary.workflows.get("completed"), Some(&1));
        let hist = summary.histograms["ensemble_step_duration_ms"];
        assert_eq!(hist.count, 1);
    }

    #[tokio::test]
    async fn test_failure_event() {
        let metrics = MetricsCollector::new();
        metrics
            .emit(types::WORKFLOW_STARTED, Some(json!({"run_id": "r2", "total_steps": 1})))
            .await;
        metrics
            .emit(
                types::WORKFLOW_FAILED,
                Some(json!({"run_id": "r2", "kind": "generation_timeout", "error": "late"})),
            )
            .await;

        let wf = metrics.workflow("r2").unwrap();
        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(wf.errors, vec!["late".to_string()]);
        assert!(
            (metrics.counter("ensemble_errors_total", &[("kind", "generation_timeout")]) - 1.0)
                .abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = MetricsCollector::new();
        metrics.increment_counter("ensemble_generation_calls_total", 1.0, &[("role", "creative")]);
        metrics.increment_counter("ensemble_generation_calls_total", 1.0, &[("role", "adversarial")]);
        metrics.record_histogram("ensemble_step_duration_ms", 10.0, &[]);

        let text = metrics.export_prometheus();
        assert_eq!(text.matches("# TYPE ensemble_generation_calls_total counter").count(), 1);
        assert!(text.contains("ensemble_generation_calls_total{role=\"creative\"} 1"));
        assert!(text.contains("ensemble_step_duration_ms_count 1"));
        assert!(text.contains("ensemble_step_duration_ms_sum 10"));
    }

    #[test]
    fn test_json_export_parses() {
        let metrics = MetricsCollector::new();
        metrics.start_workflow("r3", 4);
        let doc: Value = serde_json::from_str(&metrics.export_json()).unwrap();
        assert_eq!(doc["workflows"]["r3"]["total_steps"], 4);
        assert_eq!(doc["summary"]["workflows"]["running"], 1);
    }
}
