//! Step sequencing and guide chaining.
//!
//! [`WorkflowEngine`] drives one guide through the stage pipeline with
//! optional checkpointing and resume. [`GuideChain`] runs several guides in
//! order, feeding each guide's output forward as context for the next.

mod chain;
mod engine;


pub use chain::{ChainValidation, GuideChain};
pub use engine::{resolve_spec, WorkflowEngine, WorkflowPhase};
