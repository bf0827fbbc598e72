//! Sequential guide chaining.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::engine::{resolve_spec, WorkflowEngine};
use crate::config::Settings;
use crate::errors::{EnsembleError, Result};
use crate::events::{types, EventSink, NoOpEventSink};
use crate::generation::GenerationClient;
use crate::guide::{load_guide, Step};
use crate::pipeline::PipelineHooks;

/// Outcome of validating every guide in a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainValidation {
    /// Each guide with its parsed steps, in chain order.
    pub guides: Vec<(String, Vec<Step>)>,
    /// Sum of step counts across the chain.
    pub total_steps: usize,
}

/// Runs guides one after another, each seeing the previous guides' output.
pub struct GuideChain {
    settings: Settings,
    client: Arc<dyn GenerationClient>,
    hooks: PipelineHooks,
    event_sink: Arc<dyn EventSink>,
    checkpoint_dir: Option<PathBuf>,
}

impl fmt::Debug for GuideChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuideChain")
            .field("settings", &self.settings)
            .field("hooks", &self.hooks)
            .field("checkpoint_dir", &self.checkpoint_dir)
            .finish_non_exhaustive()
    }
}

/// Formats the chain section recorded for one guide's output.
#[must_use]
pub(crate) fn guide_section(guide: &str, output: &str) -> String {
    format!("\n\n--- Output from {guide} ---\n{output}")
}

/// Prefixes the specification with the chain context, when there is any.
#[must_use]
pub(crate) fn enhance_spec(context: &str, spec: &str) -> String {
    if context.is_empty() {
        spec.to_string()
    } else {
        format!("Previous context:\n{context}\n\nCurrent spec:\n{spec}")
    }
}

impl GuideChain {
    /// Creates a chain over a generation client.
    #[must_use]
    pub fn new(settings: Settings, client: Arc<dyn GenerationClient>) -> Self {
        Self {
            settings,
            client,
            hooks: PipelineHooks::default(),
            event_sink: Arc::new(NoOpEventSink),
            checkpoint_dir: None,
        }
    }

    /// Sets the post-stage hooks used by every guide.
    #[must_use]
    pub fn with_hooks(mut self, hooks: PipelineHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets the event sink shared by every guide.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Stores one checkpoint per guide under `dir`.
    #[must_use]
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Returns the output path used for the guide at `index`.
    ///
    /// Per-guide outputs live next to the chain's own output file.
    #[must_use]
    pub fn guide_output_path(&self, index: usize, guide: &Path) -> PathBuf {
        let name = file_name(guide).replace(".txt", "");
        let dir = self.settings.output_file.parent().unwrap_or(Path::new(""));
        dir.join(format!("output_{index}_{name}.txt"))
    }

    /// Returns the checkpoint path used for the guide at `index`, if enabled.
    #[must_use]
    pub fn guide_checkpoint_path(&self, index: usize, guide: &Path) -> Option<PathBuf> {
        self.checkpoint_dir
            .as_ref()
            .map(|dir| dir.join(format!("checkpoint_{index}_{}.json", file_name(guide))))
    }

    fn engine_for(&self, index: usize, guide: &Path) -> Result<WorkflowEngine> {
        let settings = self
            .settings
            .clone()
            .with_output_file(self.guide_output_path(index, guide));
        let mut engine = WorkflowEngine::new(settings, self.client.clone())
            .with_hooks(self.hooks.clone())
            .with_event_sink(self.event_sink.clone());

        if let Some(path) = self.guide_checkpoint_path(index, guide) {
            if let Some(dir) = &self.checkpoint_dir {
                std::fs::create_dir_all(dir).map_err(|e| EnsembleError::io(dir, e))?;
            }
            engine = engine.with_checkpoint_file(path);
        }
        Ok(engine)
    }

    /// Runs every guide in order and returns the combined chain context.
    ///
    /// The combined context is also written to the configured output file.
    ///
    /// # Errors
    ///
    /// The first failing guide terminates the chain.
    pub async fn run<P: AsRef<Path>>(&self, spec: &str, guides: &[P]) -> Result<String> {
        let spec_text = resolve_spec(spec)?;
        let names: Vec<String> = guides
            .iter()
            .map(|g| g.as_ref().display().to_string())
            .collect();

        info!(guides = guides.len(), chain = %names.join(" -> "), "Starting guide chain");
        self.event_sink
            .emit(
                types::CHAIN_STARTED,
                Some(json!({ "guides": names, "total_guides": guides.len() })),
            )
            .await;

        let mut context = String::new();
        for (index, (guide, name)) in guides.iter().zip(&names).enumerate() {
            let guide = guide.as_ref();
            info!(position = index + 1, total = guides.len(), guide = %name, "Processing guide");

            let engine = self.engine_for(index, guide)?;
            let enhanced = enhance_spec(&context, &spec_text);
            let output = engine.run_resolved(&enhanced, guide, None).await?;
            context.push_str(&guide_section(name, &output));

            self.event_sink
                .emit(
                    types::CHAIN_GUIDE_COMPLETED,
                    Some(json!({
                        "index": index,
                        "guide": name,
                        "output_file": engine.settings().output_file.display().to_string(),
                    })),
                )
                .await;
        }

        let output_file = &self.settings.output_file;
        std::fs::write(output_file, &context).map_err(|e| EnsembleError::io(output_file, e))?;
        info!(output = %output_file.display(), "Guide chain complete");
        self.event_sink
            .emit(
                types::CHAIN_COMPLETED,
                Some(json!({
                    "total_guides": guides.len(),
                    "output_file": output_file.display().to_string(),
                })),
            )
            .await;

        Ok(context)
    }

    /// Parses every guide without generating anything.
    ///
    /// # Errors
    ///
    /// Returns the first guide error encountered.
    pub fn dry_run<P: AsRef<Path>>(&self, guides: &[P]) -> Result<ChainValidation> {
        let mut validated = Vec::with_capacity(guides.len());
        let mut total_steps = 0;

        for (index, guide) in guides.iter().enumerate() {
            let guide = guide.as_ref();
            let steps = load_guide(guide)?;
            total_steps += steps.len();
            info!(position = index + 1, guide = %guide.display(), steps = steps.len(), "Validated guide");
            validated.push((guide.display().to_string(), steps));
        }

        info!(total_steps, "Chain validation successful");
        Ok(ChainValidation {
            guides: validated,
            total_steps,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedClient;

    fn chain(output: &str) -> GuideChain {
        let settings = Settings::default().with_output_file(output);
        GuideChain::new(settings, Arc::new(ScriptedClient::new()))
    }

    #[test]
    fn test_enhance_spec_only_with_context() {
        assert_eq!(enhance_spec("", "spec"), "spec");
        assert_eq!(
            enhance_spec("ctx", "spec"),
            "Previous context:\nctx\n\nCurrent spec:\nspec"
        );
    }

    #[test]
    fn test_guide_section_format() {
        assert_eq!(
            guide_section("a_guide.txt", "out"),
            "\n\n--- Output from a_guide.txt ---\nout"
        );
    }

    #[test]
    fn test_per_guide_paths() {
        let chain = chain("runs/final.txt").with_checkpoint_dir("cps");
        assert_eq!(
            chain.guide_output_path(1, Path::new("guides/api_guide.txt")),
            PathBuf::from("runs/output_1_api_guide.txt")
        );
        assert_eq!(
            chain.guide_checkpoint_path(0, Path::new("guides/api_guide.txt")),
            Some(PathBuf::from("cps/checkpoint_0_api_guide.txt.json"))
        );
    }

    #[test]
    fn test_paths_without_checkpoint_dir() {
        let chain = chain("final.txt");
        assert_eq!(
            chain.guide_output_path(0, Path::new("plan_guide.txt")),
            PathBuf::from("output_0_plan_guide.txt")
        );
        assert_eq!(chain.guide_checkpoint_path(0, Path::new("plan_guide.txt")), None);
    }
}
