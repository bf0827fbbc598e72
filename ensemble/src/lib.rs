//! # Ensemble
//!
//! Step-by-step generation workflows driven by a three-stage model ensemble.
//!
//! A guide is a list of `Step N: description` lines. For every step the
//! [`pipeline::StagePipeline`] produces a creative draft, refines it until a
//! pass returns identical text, then hardens it the same way under an
//! adversarial review. The [`workflow::WorkflowEngine`] appends each step's
//! output to an append-only accumulation that later steps see as context:
//!
//! - **Checkpoints**: progress is saved after every step and a run can resume
//!   from the first step not yet completed
//! - **Guide chains**: several guides run in order, each seeing the output of
//!   the guides before it
//! - **Event sinks**: workflow, step and stage events for logging and metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ensemble::prelude::*;
//! use std::sync::Arc;
//!
//! let settings = Settings::from_env()?;
//! let client = Arc::new(OllamaClient::from_settings(&settings)?);
//! let engine = WorkflowEngine::new(settings, client)
//!     .with_checkpoint_file("progress.json");
//!
//! let output = engine.run("A URL shortener", "coding_guide.txt", None).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod events;
pub mod generation;
pub mod guide;
pub mod observability;
pub mod pipeline;
pub mod state;
pub mod testing;
pub mod utils;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::Checkpoint;
    pub use crate::config::{Settings, StageRole};
    pub use crate::errors::{EnsembleError, Result};
    pub use crate::events::{
        CollectingEventSink, EventSink, FanOutEventSink, LoggingEventSink, NoOpEventSink,
    };
    #[cfg(feature = "ollama")]
    pub use crate::generation::OllamaClient;
    pub use crate::generation::{
        GenerationClient, GenerationError, GenerationRequest, RetryConfig,
    };
    pub use crate::guide::{load_guide, parse_steps, Step};
    pub use crate::observability::MetricsCollector;
    pub use crate::pipeline::{PipelineHooks, StagePipeline, StepContext};
    pub use crate::state::AccumulationState;
    pub use crate::workflow::{ChainValidation, GuideChain, WorkflowEngine};
}
