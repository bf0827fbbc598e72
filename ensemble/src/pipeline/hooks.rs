//! Caller-supplied post-stage transforms.

use std::fmt;
use std::sync::Arc;

use super::stage::Stage;

/// A pure text transform applied to a stage's output.
pub type PostStageHook = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Optional transforms run after each stage.
///
/// When present, a hook's result replaces the stage output before the next
/// stage consumes it.
#[derive(Clone, Default)]
pub struct PipelineHooks {
    post_draft: Option<PostStageHook>,
    post_refine: Option<PostStageHook>,
    post_harden: Option<PostStageHook>,
}

impl fmt::Debug for PipelineHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineHooks")
            .field("post_draft", &self.post_draft.is_some())
            .field("post_refine", &self.post_refine.is_some())
            .field("post_harden", &self.post_harden.is_some())
            .finish()
    }
}

impl PipelineHooks {
    /// Creates an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook run after the draft stage.
    #[must_use]
    pub fn with_post_draft<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.post_draft = Some(Arc::new(hook));
        self
    }

    /// Sets the hook run after the refine stage.
    #[must_use]
    pub fn with_post_refine<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.post_refine = Some(Arc::new(hook));
        self
    }

    /// Sets the hook run after the harden stage.
    #[must_use]
    pub fn with_post_harden<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.post_harden = Some(Arc::new(hook));
        self
    }

    /// Returns the hook registered for a stage.
    #[must_use]
    pub fn hook_for(&self, stage: Stage) -> Option<&PostStageHook> {
        match stage {
            Stage::Draft => self.post_draft.as_ref(),
            Stage::Refine => self.post_refine.as_ref(),
            Stage::Harden => self.post_harden.as_ref(),
        }
    }

    /// Runs the stage's hook over `output`, or returns it unchanged.
    #[must_use]
    pub fn apply(&self, stage: Stage, output: String) -> String {
        match self.hook_for(stage) {
            Some(hook) => hook(&output),
            None => output,
        }
    }
}
