//! Event sinks for workflow observability.
//!
//! Sinks are explicit objects handed to the workflow engine and guide chain.
//! When none is supplied, [`NoOpEventSink`] is used.

mod sink;

pub use sink::{CollectingEventSink, EventSink, FanOutEventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the engine and chain.
pub mod types {
    /// A workflow run began.
    pub const WORKFLOW_STARTED: &str = "workflow.started";
    /// A workflow run restored state from a checkpoint.
    pub const WORKFLOW_RESUMED: &str = "workflow.resumed";
    /// A workflow run wrote its output.
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    /// A workflow run terminated with an error.
    pub const WORKFLOW_FAILED: &str = "workflow.failed";
    /// A step entered the pipeline.
    pub const STEP_STARTED: &str = "step.started";
    /// A step's output was appended.
    pub const STEP_COMPLETED: &str = "step.completed";
    /// One generation call finished inside a stage.
    pub const STAGE_ITERATION: &str = "stage.iteration";
    /// An iterative stage stopped on identical output.
    pub const STAGE_CONVERGED: &str = "stage.converged";
    /// A stage produced its final output.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A checkpoint was written.
    pub const CHECKPOINT_SAVED: &str = "checkpoint.saved";
    /// A checkpoint was read for resume.
    pub const CHECKPOINT_LOADED: &str = "checkpoint.loaded";
    /// A chain run began.
    pub const CHAIN_STARTED: &str = "chain.started";
    /// One guide of a chain finished.
    pub const CHAIN_GUIDE_COMPLETED: &str = "chain.guide_completed";
    /// A chain run wrote its combined output.
    pub const CHAIN_COMPLETED: &str = "chain.completed";
}
