//! Workflow settings.
//!
//! Settings are built once before a run and never mutated by the core.

mod settings;

pub use settings::{Settings, StageRole};
