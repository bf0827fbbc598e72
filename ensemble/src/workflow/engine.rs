//! The workflow driver.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::checkpoint::Checkpoint;
use crate::config::Settings;
use crate::errors::{EnsembleError, Result};
use crate::events::{types, EventSink, NoOpEventSink};
use crate::generation::GenerationClient;
use crate::guide::{load_guide, Step};
use crate::observability::SpanTimer;
use crate::pipeline::{PipelineHooks, StagePipeline, StepContext};
use crate::state::AccumulationState;
use crate::utils::{fingerprint, generate_run_id, preview};

/// Where a workflow run currently is.
///
/// Step numbers are 1-based positions within the guide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPhase {
    /// No run has begun.
    NotStarted,
    /// Reading the specification and parsing the guide.
    ParsingGuide,
    /// Loading and checking a resume checkpoint.
    RestoringCheckpoint,
    /// Running a step through the pipeline.
    ProcessingStep(usize),
    /// Persisting the checkpoint for a completed step.
    CheckpointingStep(usize),
    /// Writing the accumulated output.
    WritingOutput,
    /// Output written.
    Done,
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not_started"),
            Self::ParsingGuide => f.write_str("parsing_guide"),
            Self::RestoringCheckpoint => f.write_str("restoring_checkpoint"),
            Self::ProcessingStep(n) => write!(f, "processing_step({n})"),
            Self::CheckpointingStep(n) => write!(f, "checkpointing_step({n})"),
            Self::WritingOutput => f.write_str("writing_output"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// Resolves a specification argument.
///
/// If `spec` names a readable file its contents are returned, otherwise the
/// string itself is the specification text.
///
/// # Errors
///
/// Returns an IO error if `spec` names a file that cannot be read.
pub fn resolve_spec(spec: &str) -> Result<String> {
    let path = Path::new(spec);
    if path.is_file() {
        debug!(path = %path.display(), "Reading specification from file");
        return std::fs::read_to_string(path).map_err(|e| EnsembleError::io(path, e));
    }
    Ok(spec.to_string())
}

/// Runs every step of one guide, in order, through the stage pipeline.
pub struct WorkflowEngine {
    pipeline: StagePipeline,
    event_sink: Arc<dyn EventSink>,
    checkpoint_file: Option<PathBuf>,
    trust_checkpoints: bool,
    phase: Mutex<WorkflowPhase>,
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("pipeline", &self.pipeline)
            .field("checkpoint_file", &self.checkpoint_file)
            .field("trust_checkpoints", &self.trust_checkpoints)
            .field("phase", &*self.phase.lock())
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Creates an engine over a generation client.
    #[must_use]
    pub fn new(settings: Settings, client: Arc<dyn GenerationClient>) -> Self {
        Self {
            pipeline: StagePipeline::new(settings, client),
            event_sink: Arc::new(NoOpEventSink),
            checkpoint_file: None,
            trust_checkpoints: false,
            phase: Mutex::new(WorkflowPhase::NotStarted),
        }
    }

    /// Sets the post-stage hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: PipelineHooks) -> Self {
        self.pipeline = self.pipeline.with_hooks(hooks);
        self
    }

    /// Sets the sink receiving workflow, step and stage events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.pipeline = self.pipeline.with_event_sink(sink.clone());
        self.event_sink = sink;
        self
    }

    /// Saves a checkpoint to `path` after every completed step.
    #[must_use]
    pub fn with_checkpoint_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_file = Some(path.into());
        self
    }

    /// Accepts resume checkpoints recorded for a different guide or spec.
    #[must_use]
    pub fn trust_checkpoints(mut self, trust: bool) -> Self {
        self.trust_checkpoints = trust;
        self
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        self.pipeline.settings()
    }

    /// Returns the checkpoint path, if checkpointing is enabled.
    #[must_use]
    pub fn checkpoint_file(&self) -> Option<&Path> {
        self.checkpoint_file.as_deref()
    }

    /// Returns the phase the latest run reached.
    #[must_use]
    pub fn phase(&self) -> WorkflowPhase {
        *self.phase.lock()
    }

    fn enter(&self, phase: WorkflowPhase) {
        debug!(%phase, "Workflow phase");
        *self.phase.lock() = phase;
    }

    /// Parses a guide and reports its steps without generating anything.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::GuideNotFound`] or [`EnsembleError::GuideEmpty`].
    pub fn dry_run(&self, guide: impl AsRef<Path>) -> Result<Vec<Step>> {
        let guide = guide.as_ref();
        let steps = load_guide(guide)?;
        info!(guide = %guide.display(), steps = steps.len(), "Dry run validated guide");
        for step in &steps {
            info!(step = step.ordinal, description = %step.description, "Step");
        }
        Ok(steps)
    }

    /// Runs a guide against a specification and returns the accumulated output.
    ///
    /// `spec` is either specification text or the path of a file holding it.
    /// When `resume_from` names an existing checkpoint, already completed
    /// steps are restored and skipped. The accumulated output is also
    /// written to the configured output file.
    ///
    /// # Errors
    ///
    /// Any guide, checkpoint, generation or IO failure terminates the run.
    /// Checkpoints saved before the failure remain resumable.
    pub async fn run(
        &self,
        spec: &str,
        guide: impl AsRef<Path>,
        resume_from: Option<&Path>,
    ) -> Result<String> {
        self.enter(WorkflowPhase::ParsingGuide);
        let spec_text = match resolve_spec(spec) {
            Ok(text) => text,
            Err(err) => return Err(self.fail("", err).await),
        };
        self.run_resolved(&spec_text, guide.as_ref(), resume_from)
            .await
    }

    /// Runs with already-resolved specification text.
    pub(crate) async fn run_resolved(
        &self,
        spec_text: &str,
        guide: &Path,
        resume_from: Option<&Path>,
    ) -> Result<String> {
        let run_id = generate_run_id().to_string();
        match self.execute(&run_id, spec_text, guide, resume_from).await {
            Ok(output) => Ok(output),
            Err(err) => Err(self.fail(&run_id, err).await),
        }
    }

    async fn fail(&self, run_id: &str, err: EnsembleError) -> EnsembleError {
        let phase = self.phase();
        error!(run_id, %phase, kind = err.kind(), error = %err, "Workflow failed");
        self.event_sink
            .emit(
                types::WORKFLOW_FAILED,
                Some(json!({
                    "run_id": run_id,
                    "phase": phase.to_string(),
                    "kind": err.kind(),
                    "error": err.to_string(),
                })),
            )
            .await;
        err
    }

    async fn execute(
        &self,
        run_id: &str,
        spec_text: &str,
        guide: &Path,
        resume_from: Option<&Path>,
    ) -> Result<String> {
        let run_timer = SpanTimer::start("workflow");
        self.enter(WorkflowPhase::ParsingGuide);
        let steps = load_guide(guide)?;
        let guide_id = guide.display().to_string();

        info!(
            run_id,
            guide = %guide_id,
            steps = steps.len(),
            spec = %preview(spec_text, 100),
            "Loaded guide"
        );
        self.event_sink
            .emit(
                types::WORKFLOW_STARTED,
                Some(json!({
                    "run_id": run_id,
                    "guide": guide_id,
                    "total_steps": steps.len(),
                    "spec_fingerprint": fingerprint(spec_text),
                })),
            )
            .await;

        let mut state = match resume_from.filter(|path| path.exists()) {
            Some(path) => {
                self.enter(WorkflowPhase::RestoringCheckpoint);
                self.restore(run_id, path, &guide_id, spec_text, steps.len())
                    .await?
            }
            None => AccumulationState::new(),
        };

        let total = steps.len();
        let start = state.completed();
        if start > 0 {
            info!(run_id, start_step = start + 1, "Starting from step");
        }

        for (index, step) in steps.iter().enumerate().skip(start) {
            let position = index + 1;
            self.enter(WorkflowPhase::ProcessingStep(position));
            info!(
                run_id,
                step = position,
                total,
                description = %preview(&step.description, 50),
                "Processing step"
            );
            self.event_sink
                .emit(
                    types::STEP_STARTED,
                    Some(json!({
                        "run_id": run_id,
                        "step": position,
                        "ordinal": step.ordinal,
                        "total_steps": total,
                    })),
                )
                .await;

            let step_timer = SpanTimer::start("step");
            let mut ctx =
                StepContext::new(step.ordinal, &step.description, spec_text, state.context())
                    .with_run_id(run_id);
            let output = self.pipeline.process(&mut ctx).await?;
            state.append(output);

            if let Some(path) = &self.checkpoint_file {
                self.enter(WorkflowPhase::CheckpointingStep(position));
                Checkpoint::capture(&guide_id, spec_text, &state).save(path)?;
                if self.settings().verbose {
                    info!(run_id, checkpoint = %path.display(), "Checkpoint saved");
                }
                self.event_sink
                    .emit(
                        types::CHECKPOINT_SAVED,
                        Some(json!({
                            "run_id": run_id,
                            "path": path.display().to_string(),
                            "completed_steps": state.completed(),
                        })),
                    )
                    .await;
            }

            self.event_sink
                .emit(
                    types::STEP_COMPLETED,
                    Some(json!({
                        "run_id": run_id,
                        "step": position,
                        "completed_steps": state.completed(),
                        "duration_ms": step_timer.finish(),
                    })),
                )
                .await;
            info!(run_id, step = position, "Step complete");
        }

        self.enter(WorkflowPhase::WritingOutput);
        let output_file = &self.settings().output_file;
        std::fs::write(output_file, state.context())
            .map_err(|e| EnsembleError::io(output_file, e))?;

        self.enter(WorkflowPhase::Done);
        info!(run_id, output = %output_file.display(), "Workflow complete");
        self.event_sink
            .emit(
                types::WORKFLOW_COMPLETED,
                Some(json!({
                    "run_id": run_id,
                    "completed_steps": state.completed(),
                    "output_file": output_file.display().to_string(),
                    "duration_ms": run_timer.finish(),
                })),
            )
            .await;

        Ok(state.into_context())
    }

    async fn restore(
        &self,
        run_id: &str,
        path: &Path,
        guide_id: &str,
        spec_text: &str,
        total_steps: usize,
    ) -> Result<AccumulationState> {
        let checkpoint = Checkpoint::load(path)?;
        self.verify_checkpoint(&checkpoint, path, guide_id, spec_text, total_steps)?;

        let age_secs = checkpoint
            .created_at()
            .ok()
            .map(|created| (chrono::Utc::now() - created).num_seconds());
        info!(
            run_id,
            checkpoint = %path.display(),
            completed_steps = checkpoint.completed_steps,
            timestamp = %checkpoint.timestamp,
            age_secs = ?age_secs,
            "Resuming from checkpoint"
        );
        self.event_sink
            .emit(
                types::CHECKPOINT_LOADED,
                Some(json!({
                    "run_id": run_id,
                    "path": path.display().to_string(),
                    "timestamp": checkpoint.timestamp,
                })),
            )
            .await;
        self.event_sink
            .emit(
                types::WORKFLOW_RESUMED,
                Some(json!({
                    "run_id": run_id,
                    "completed_steps": checkpoint.completed_steps,
                })),
            )
            .await;

        Ok(checkpoint.to_state())
    }

    fn verify_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        path: &Path,
        guide_id: &str,
        spec_text: &str,
        total_steps: usize,
    ) -> Result<()> {
        let mismatch = if checkpoint.guide_file != guide_id {
            Some(("guide_file", checkpoint.guide_file.clone(), guide_id.to_string()))
        } else if checkpoint.spec != spec_text {
            Some(("spec", checkpoint.spec.clone(), spec_text.to_string()))
        } else if checkpoint.completed_steps > total_steps {
            Some((
                "completed_steps",
                checkpoint.completed_steps.to_string(),
                total_steps.to_string(),
            ))
        } else {
            None
        };

        let Some((field, expected, actual)) = mismatch else {
            return Ok(());
        };
        if self.trust_checkpoints {
            warn!(checkpoint = %path.display(), field, "Resuming from a checkpoint recorded for a different run");
            return Ok(());
        }
        Err(EnsembleError::CheckpointMismatch {
            path: path.to_path_buf(),
            field,
            expected: preview(&expected, 60),
            actual: preview(&actual, 60),
        })
    }
}
