//! Testing utilities for ensemble workflows.
//!
//! This module provides:
//! - A scripted generation client that needs no server
//! - Guide and spec file fixtures
//! - Assertions over accumulated output

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_prompt_contains, assert_section_order, assert_step_sections};
pub use fixtures::GuideFixture;
pub use mocks::{ScriptedClient, ScriptedReply};
