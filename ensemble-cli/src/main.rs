//! `ensemble` command-line entry point.

mod cli;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ensemble::prelude::*;
use tracing::debug;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = logging::init_tracing(cli.verbose, cli.log_format) {
        eprintln!("Failed to initialize logging: {err}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", describe(&err));
            ExitCode::FAILURE
        }
    }
}

/// Renders an error with a prefix naming its kind.
fn describe(err: &anyhow::Error) -> String {
    let prefix = match err.downcast_ref::<EnsembleError>().map(EnsembleError::kind) {
        Some("generation_unavailable") => "Connection Error",
        Some("generation_timeout") => "Timeout Error",
        Some("generation_rejected") => "Generation Error",
        Some("checkpoint_corrupt" | "checkpoint_mismatch") => "Checkpoint Error",
        Some("config") => "Configuration Error",
        _ => "Error",
    };
    format!("{prefix}: {err:#}")
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let settings = match &cli.config {
        Some(path) => Settings::from_json_file(path)?,
        None => Settings::from_env()?,
    };
    Ok(settings
        .with_output_file(&cli.output)
        .with_verbose(cli.verbose))
}

fn event_sink(verbose: bool, metrics: Arc<MetricsCollector>) -> Arc<dyn EventSink> {
    Arc::new(
        FanOutEventSink::new()
            .with_sink(Arc::new(LoggingEventSink::new(verbose)))
            .with_sink(metrics),
    )
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    let client: Arc<dyn GenerationClient> = Arc::new(
        OllamaClient::from_settings(&settings).context("Failed to build the generation client")?,
    );
    let metrics = Arc::new(MetricsCollector::new());
    let sink = event_sink(settings.verbose, metrics.clone());

    if let Some(guides) = &cli.chain {
        let mut chain = GuideChain::new(settings, client).with_event_sink(sink);
        if let Some(dir) = &cli.checkpoint_dir {
            chain = chain.with_checkpoint_dir(dir);
        }

        if cli.dry_run {
            let validation = chain.dry_run(guides.as_slice())?;
            println!("Dry run - Validated {} guides in chain", validation.guides.len());
            for (index, (guide, steps)) in validation.guides.iter().enumerate() {
                println!("\n[{}] {guide}: {} steps", index + 1, steps.len());
                for step in steps {
                    println!("    Step {}: {}", step.ordinal, step.description);
                }
            }
            println!("\nChain validation successful. Total steps: {}", validation.total_steps);
            return Ok(());
        }

        let Some(spec) = &cli.spec else {
            bail!("--spec is required unless using --dry-run");
        };
        chain.run(spec, guides.as_slice()).await?;
        println!("Guide chain complete. Final output: {}", cli.output.display());
    } else {
        let mut engine = WorkflowEngine::new(settings, client)
            .with_event_sink(sink)
            .trust_checkpoints(cli.trust_checkpoint);
        if let Some(path) = &cli.checkpoint {
            engine = engine.with_checkpoint_file(path);
        }

        if cli.dry_run {
            let steps = engine.dry_run(&cli.guide)?;
            println!("Dry run - Validated {} steps:", steps.len());
            for step in &steps {
                println!("  Step {}: {}", step.ordinal, step.description);
            }
            println!("\nGuide validation successful.");
            return Ok(());
        }

        let Some(spec) = &cli.spec else {
            bail!("--spec is required unless using --dry-run");
        };
        engine.run(spec, &cli.guide, cli.resume.as_deref()).await?;
        println!("Workflow complete. Output written to {}", cli.output.display());
    }

    debug!(target: "ensemble::metrics", "\n{}", metrics.export_prometheus());
    Ok(())
}
