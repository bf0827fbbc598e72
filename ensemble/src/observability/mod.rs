//! Observability utilities.

mod metrics;
mod tracing;

pub use metrics::{
    HistogramSummary, MetricsCollector, MetricsSummary, WorkflowMetrics, WorkflowStatus,
};
pub use tracing::SpanTimer;
