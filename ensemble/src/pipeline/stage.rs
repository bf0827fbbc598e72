//! The three stages and their prompts.

use std::fmt;

use super::context::StepContext;
use crate::config::StageRole;

/// One stage of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Single creative pass producing the draft.
    Draft,
    /// Iterative correction of errors and inefficiencies.
    Refine,
    /// Iterative adversarial security review.
    Harden,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Self; 3] = [Self::Draft, Self::Refine, Self::Harden];

    /// Returns the model role the stage runs under.
    #[must_use]
    pub const fn role(self) -> StageRole {
        match self {
            Self::Draft => StageRole::Creative,
            Self::Refine => StageRole::Analytical,
            Self::Harden => StageRole::Adversarial,
        }
    }

    /// Returns the stage name used in logs and events.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Refine => "refine",
            Self::Harden => "harden",
        }
    }

    /// Whether the stage loops until convergence.
    #[must_use]
    pub const fn is_iterative(self) -> bool {
        !matches!(self, Self::Draft)
    }

    /// Builds the prompt for one pass. `current` is ignored by the draft stage.
    #[must_use]
    pub fn prompt(self, ctx: &StepContext, current: &str) -> String {
        let previous = &ctx.previous_output;
        match self {
            Self::Draft => format!(
                "{previous}\nApply this step to the spec '{}': {}\nGenerate a creative draft of code or plan.",
                ctx.spec, ctx.description
            ),
            Self::Refine => format!(
                "{previous}\nStrictly analyze this for errors, bugs, inefficiencies:\n{current}\nCorrect without adding new features."
            ),
            Self::Harden => format!(
                "{previous}\nAct as a hacker: Identify security flaws in the following and suggest fixes:\n{current}\nList vulnerabilities and provide corrected code."
            ),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
