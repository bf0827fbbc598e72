//! The three-stage generation pipeline.
//!
//! Every step passes through a single creative draft, then an iterative
//! refine loop, then an iterative harden loop. The iterative stages stop as
//! soon as a pass returns text identical to its input, or after
//! `max_iterations` passes. Generation failures propagate unchanged; the
//! pipeline has no retry logic of its own.

mod context;
mod hooks;
mod stage;

pub use context::StepContext;
pub use hooks::{PipelineHooks, PostStageHook};
pub use stage::Stage;

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::config::Settings;
use crate::errors::Result;
use crate::events::{types, EventSink, NoOpEventSink};
use crate::generation::{GenerationClient, GenerationRequest};
use crate::observability::SpanTimer;

/// Result of running one iterative stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    /// Final text of the stage, before any hook.
    pub text: String,
    /// Generation calls made.
    pub iterations: u32,
    /// Whether a pass reproduced its input exactly.
    pub converged: bool,
}

/// Runs draft, refine and harden for one step.
pub struct StagePipeline {
    settings: Settings,
    client: Arc<dyn GenerationClient>,
    hooks: PipelineHooks,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePipeline")
            .field("settings", &self.settings)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl StagePipeline {
    /// Creates a pipeline over a generation client.
    #[must_use]
    pub fn new(settings: Settings, client: Arc<dyn GenerationClient>) -> Self {
        Self {
            settings,
            client,
            hooks: PipelineHooks::default(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the post-stage hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: PipelineHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets the sink receiving stage events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Processes one step and returns the hardened output.
    ///
    /// The draft, refined and hardened texts are also written back into
    /// `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the first generation error, unchanged.
    pub async fn process(&self, ctx: &mut StepContext) -> Result<String> {
        let mut text = String::new();
        for stage in Stage::ALL {
            let produced = if stage.is_iterative() {
                self.iterate(stage, ctx, &text).await?.text
            } else {
                self.draft(ctx).await?
            };
            text = self.hooks.apply(stage, produced);
            let slot = match stage {
                Stage::Draft => &mut ctx.draft,
                Stage::Refine => &mut ctx.refined,
                Stage::Harden => &mut ctx.hardened,
            };
            slot.clone_from(&text);
        }
        Ok(text)
    }

    async fn draft(&self, ctx: &StepContext) -> Result<String> {
        let timer = SpanTimer::start("draft");
        let text = self.generate(Stage::Draft, ctx, "", 1).await?;
        self.event_sink
            .emit(
                types::STAGE_COMPLETED,
                Some(json!({
                    "run_id": ctx.run_id,
                    "step": ctx.ordinal,
                    "stage": Stage::Draft.name(),
                    "iterations": 1,
                    "converged": false,
                    "duration_ms": timer.finish(),
                })),
            )
            .await;
        Ok(text)
    }

    /// Runs one iterative stage starting from `initial`.
    ///
    /// # Errors
    ///
    /// Returns the first generation error, unchanged.
    pub async fn iterate(
        &self,
        stage: Stage,
        ctx: &StepContext,
        initial: &str,
    ) -> Result<StageOutcome> {
        let timer = SpanTimer::start(stage.name());
        let mut current = initial.to_string();
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.settings.max_iterations {
            iterations += 1;
            let next = self.generate(stage, ctx, &current, iterations).await?;
            if next == current {
                converged = true;
                debug!(step = ctx.ordinal, stage = %stage, iteration = iterations, "Converged");
                self.event_sink
                    .emit(
                        types::STAGE_CONVERGED,
                        Some(json!({
                            "run_id": ctx.run_id,
                            "step": ctx.ordinal,
                            "stage": stage.name(),
                            "iteration": iterations,
                        })),
                    )
                    .await;
                break;
            }
            current = next;
        }

        self.event_sink
            .emit(
                types::STAGE_COMPLETED,
                Some(json!({
                    "run_id": ctx.run_id,
                    "step": ctx.ordinal,
                    "stage": stage.name(),
                    "iterations": iterations,
                    "converged": converged,
                    "duration_ms": timer.finish(),
                })),
            )
            .await;

        Ok(StageOutcome {
            text: current,
            iterations,
            converged,
        })
    }

    async fn generate(
        &self,
        stage: Stage,
        ctx: &StepContext,
        current: &str,
        iteration: u32,
    ) -> Result<String> {
        let role = stage.role();
        let model = self.settings.model_for(role);
        let request = GenerationRequest::new(
            model,
            stage.prompt(ctx, current),
            self.settings.temperature_for(role),
            self.settings.max_tokens,
        );

        if self.settings.verbose {
            info!(step = ctx.ordinal, stage = %stage, model, iteration, "Generating");
        } else {
            debug!(step = ctx.ordinal, stage = %stage, model, iteration, "Generating");
        }

        let timer = SpanTimer::start(stage.name());
        let text = self.client.generate(&request).await?;
        self.event_sink
            .emit(
                types::STAGE_ITERATION,
                Some(json!({
                    "run_id": ctx.run_id,
                    "step": ctx.ordinal,
                    "stage": stage.name(),
                    "role": role.to_string(),
                    "model": model,
                    "iteration": iteration,
                    "duration_ms": timer.finish(),
                })),
            )
            .await;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageRole;
    use crate::errors::EnsembleError;
    use crate::events::CollectingEventSink;
    use crate::generation::{GenerationError, MockGenerationClient};
    use crate::testing::ScriptedClient;
    use mockall::Sequence;
    use pretty_assertions::assert_eq;

    fn settings(max_iterations: u32) -> Settings {
        Settings::default().with_max_iterations(max_iterations)
    }

    fn step() -> StepContext {
        StepContext::new(1, "Design the API", "a todo app", "")
    }

    #[tokio::test]
    async fn test_identical_responses_converge_after_one_call_per_stage() {
        let mut mock = MockGenerationClient::new();
        mock.expect_generate()
            .times(3)
            .returning(|_| Ok("stable".to_string()));

        let pipeline = StagePipeline::new(settings(5), Arc::new(mock));
        let mut ctx = step();
        let output = pipeline.process(&mut ctx).await.unwrap();

        assert_eq!(output, "stable");
        assert_eq!(ctx.draft, "stable");
        assert_eq!(ctx.refined, "stable");
    }

    #[tokio::test]
    async fn test_refine_converges_with_exactly_one_call() {
        let mut mock = MockGenerationClient::new();
        mock.expect_generate()
            .times(1)
            .returning(|_| Ok("same text".to_string()));

        let pipeline = StagePipeline::new(settings(5), Arc::new(mock));
        let outcome = pipeline
            .iterate(Stage::Refine, &step(), "same text")
            .await
            .unwrap();

        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 1);
    }

    #[tokio::test]
    async fn test_iteration_cap_returns_last_text() {
        let client = Arc::new(ScriptedClient::new());
        let pipeline = StagePipeline::new(settings(3), client.clone());

        let outcome = pipeline
            .iterate(Stage::Harden, &step(), "start")
            .await
            .unwrap();

        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.text, "codestral:22b output #3");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_convergence_requires_exact_equality() {
        let client = Arc::new(
            ScriptedClient::new().with_responses(["draft", "draft ", "draft ", "h", "h"]),
        );
        let pipeline = StagePipeline::new(settings(5), client.clone());
        let mut ctx = step();
        let output = pipeline.process(&mut ctx).await.unwrap();

        assert_eq!(ctx.refined, "draft ");
        assert_eq!(output, "h");
        assert_eq!(client.call_count(), 5);
    }

    #[tokio::test]
    async fn test_zero_iterations_passes_draft_through() {
        let client = Arc::new(ScriptedClient::constant("only draft"));
        let pipeline = StagePipeline::new(settings(0), client.clone());
        let mut ctx = step();

        assert_eq!(pipeline.process(&mut ctx).await.unwrap(), "only draft");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stages_use_role_models_and_feed_forward() {
        let client = Arc::new(ScriptedClient::new().with_responses(["D", "R", "R", "H", "H"]));
        let config = settings(3)
            .with_model(StageRole::Creative, "m-a")
            .with_model(StageRole::Analytical, "m-b")
            .with_model(StageRole::Adversarial, "m-c");
        let pipeline = StagePipeline::new(config.clone(), client.clone());
        pipeline.process(&mut step()).await.unwrap();

        assert_eq!(client.models(), vec!["m-a", "m-b", "m-b", "m-c", "m-c"]);
        let requests = client.requests();
        assert!((requests[0].temperature() - config.temp_creative).abs() < f64::EPSILON);
        assert!(requests[1].prompt.contains("\nD\n"));
        assert!(requests[3].prompt.contains("\nR\n"));
    }

    #[tokio::test]
    async fn test_hooks_replace_stage_output() {
        let client = Arc::new(ScriptedClient::echo().with_responses(["raw"]));
        let hooks = PipelineHooks::new()
            .with_post_draft(|s| format!("[{s}]"))
            .with_post_harden(|_| "final".to_string());
        let pipeline = StagePipeline::new(settings(1), client.clone()).with_hooks(hooks);
        let mut ctx = step();
        let output = pipeline.process(&mut ctx).await.unwrap();

        assert_eq!(ctx.draft, "[raw]");
        assert!(client.prompts()[1].contains("\n[raw]\n"));
        assert_eq!(output, "final");
        assert_eq!(ctx.hardened, "final");
    }

    #[tokio::test]
    async fn test_generation_error_propagates_unchanged() {
        let mut seq = Sequence::new();
        let mut mock = MockGenerationClient::new();
        mock.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("draft".to_string()));
        mock.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(GenerationError::Timeout { attempts: 3 }));

        let pipeline = StagePipeline::new(settings(3), Arc::new(mock));
        let err = pipeline.process(&mut step()).await.unwrap_err();

        assert!(matches!(
            err,
            EnsembleError::Generation(GenerationError::Timeout { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn test_emits_stage_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let client = Arc::new(ScriptedClient::constant("x"));
        let pipeline = StagePipeline::new(settings(2), client).with_event_sink(sink.clone());
        pipeline
            .process(&mut step().with_run_id("run-1"))
            .await
            .unwrap();

        assert_eq!(sink.count(types::STAGE_ITERATION), 3);
        assert_eq!(sink.count(types::STAGE_CONVERGED), 2);
        let completed = sink.payloads(types::STAGE_COMPLETED);
        assert_eq!(completed.len(), 3);
        assert_eq!(completed[0]["run_id"], "run-1");
        assert_eq!(completed[0]["stage"], "draft");
    }
}
