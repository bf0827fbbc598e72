//! Command-line arguments.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Multi-model code generation with iterative refinement and security review.
#[derive(Parser, Debug)]
#[command(
    name = "ensemble",
    version,
    about = "Run a guide step by step through a draft, refine and harden model ensemble",
    after_help = "Examples:\n  ensemble --spec \"A URL shortener\" --guide coding_guide.txt\n  ensemble --spec spec.md --checkpoint progress.json\n  ensemble --spec spec.md --resume progress.json --checkpoint progress.json\n  ensemble --spec spec.md --chain design_guide.txt build_guide.txt --checkpoint-dir checkpoints\n  ensemble --dry-run --guide coding_guide.txt"
)]
pub struct Cli {
    /// Project specification, as text or a path to a file
    #[arg(long)]
    pub spec: Option<String>,

    /// Guide file listing the steps
    #[arg(long, value_name = "PATH", default_value = "coding_guide.txt")]
    pub guide: PathBuf,

    /// Where the accumulated output is written
    #[arg(long, value_name = "PATH", default_value = "final_output.txt")]
    pub output: PathBuf,

    /// JSON settings file overriding models and parameters
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable detailed logging
    #[arg(long)]
    pub verbose: bool,

    /// Parse and validate guides without running models
    #[arg(long)]
    pub dry_run: bool,

    /// Save progress to this checkpoint after each step
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,

    /// Resume from this checkpoint
    #[arg(long, value_name = "PATH", conflicts_with = "chain")]
    pub resume: Option<PathBuf>,

    /// Run several guides in order, each seeing the previous output
    #[arg(long, value_name = "GUIDE", num_args = 1..)]
    pub chain: Option<Vec<PathBuf>>,

    /// Directory for per-guide checkpoints when chaining
    #[arg(long, value_name = "DIR", requires = "chain")]
    pub checkpoint_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Accept a resume checkpoint recorded for a different guide or spec
    #[arg(long, requires = "resume")]
    pub trust_checkpoint: bool,
}
