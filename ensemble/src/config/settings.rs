//! Settings record and its loaders.

use crate::errors::{EnsembleError, Result};
use crate::generation::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Legacy settings names paired with the field they alias.
const LEGACY_FIELDS: [(&str, &str); 4] = [
    ("ollama_api", "api_url"),
    ("model_a", "model_creative"),
    ("model_b", "model_analytical"),
    ("model_c", "model_adversarial"),
];

/// The role a pipeline stage plays, which selects its model and temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// Drafting role, high temperature.
    Creative,
    /// Error-correction role, low temperature.
    Analytical,
    /// Security-review role.
    Adversarial,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creative => write!(f, "creative"),
            Self::Analytical => write!(f, "analytical"),
            Self::Adversarial => write!(f, "adversarial"),
        }
    }
}

/// Immutable settings for a workflow or chain run.
///
/// Unknown fields in a settings file are ignored and missing fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Generation endpoint URL.
    #[serde(alias = "ollama_api")]
    pub api_url: String,
    /// Model used by the draft stage.
    #[serde(alias = "model_a")]
    pub model_creative: String,
    /// Model used by the refine stage.
    #[serde(alias = "model_b")]
    pub model_analytical: String,
    /// Model used by the harden stage.
    #[serde(alias = "model_c")]
    pub model_adversarial: String,
    /// Temperature for the creative role.
    pub temp_creative: f64,
    /// Temperature for the analytical role.
    pub temp_analytical: f64,
    /// Temperature for the adversarial role.
    pub temp_adversarial: f64,
    /// Maximum tokens per generation request.
    pub max_tokens: u32,
    /// Pass cap for each iterative stage.
    pub max_iterations: u32,
    /// Where the final output is written.
    pub output_file: PathBuf,
    /// Emit per-iteration progress at info level.
    pub verbose: bool,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Client-side retry policy.
    pub retry: RetryConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/api/generate".to_string(),
            model_creative: "qwen2.5-coder:7b".to_string(),
            model_analytical: "deepseek-coder-v2:16b".to_string(),
            model_adversarial: "codestral:22b".to_string(),
            temp_creative: 0.8,
            temp_analytical: 0.3,
            temp_adversarial: 0.7,
            max_tokens: 2000,
            max_iterations: 3,
            output_file: PathBuf::from("final_output.txt"),
            verbose: false,
            request_timeout_secs: 120,
            retry: RetryConfig::default(),
        }
    }
}

impl Settings {
    /// Creates settings with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::Config`] if the file cannot be read or is not
    /// a JSON object of the expected field types.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EnsembleError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
            .map_err(|e| EnsembleError::Config(format!("{}: {e}", path.display())))
    }

    /// Parses settings from JSON text.
    ///
    /// Legacy field names (`ollama_api`, `model_a`, `model_b`, `model_c`) are
    /// accepted. When a legacy name and its current name are both present,
    /// the current name wins and the legacy entry is ignored.
    ///
    /// # Errors
    ///
    /// Returns the serde error for malformed input.
    pub fn from_json_str(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        let mut value: serde_json::Value = serde_json::from_str(raw)?;
        if let Some(fields) = value.as_object_mut() {
            for (legacy, current) in LEGACY_FIELDS {
                if fields.contains_key(current) && fields.remove(legacy).is_some() {
                    warn!(legacy, current, "Ignoring legacy settings field shadowed by its current name");
                }
            }
        }
        serde_json::from_value(value)
    }

    /// Builds settings from defaults plus process environment overrides.
    ///
    /// # Errors
    ///
    /// See [`Settings::apply_env_overrides`].
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an environment lookup.
    ///
    /// Recognized keys: `OLLAMA_API`, `MODEL_A`, `MODEL_B`, `MODEL_C`,
    /// `TEMP_CREATIVE`, `TEMP_ANALYTICAL`, `TEMP_ADVERSARIAL`, `MAX_TOKENS`,
    /// `MAX_ITERATIONS`, `OUTPUT_FILE`, `VERBOSE`.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::Config`] when a numeric variable does not
    /// parse. Unrecognized boolean values leave the current value in place.
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OLLAMA_API") {
            self.api_url = v;
        }
        if let Some(v) = lookup("MODEL_A") {
            self.model_creative = v;
        }
        if let Some(v) = lookup("MODEL_B") {
            self.model_analytical = v;
        }
        if let Some(v) = lookup("MODEL_C") {
            self.model_adversarial = v;
        }
        if let Some(v) = lookup("TEMP_CREATIVE") {
            self.temp_creative = parse_env("TEMP_CREATIVE", &v)?;
        }
        if let Some(v) = lookup("TEMP_ANALYTICAL") {
            self.temp_analytical = parse_env("TEMP_ANALYTICAL", &v)?;
        }
        if let Some(v) = lookup("TEMP_ADVERSARIAL") {
            self.temp_adversarial = parse_env("TEMP_ADVERSARIAL", &v)?;
        }
        if let Some(v) = lookup("MAX_TOKENS") {
            self.max_tokens = parse_env("MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("MAX_ITERATIONS") {
            self.max_iterations = parse_env("MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = lookup("OUTPUT_FILE") {
            self.output_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("VERBOSE") {
            match v.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.verbose = true,
                "false" | "0" | "no" => self.verbose = false,
                _ => {}
            }
        }
        Ok(self)
    }

    /// Sets the output file.
    #[must_use]
    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = path.into();
        self
    }

    /// Sets the iteration cap for refine and harden.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the verbose flag.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets the model for a role.
    #[must_use]
    pub fn with_model(mut self, role: StageRole, model: impl Into<String>) -> Self {
        let model = model.into();
        match role {
            StageRole::Creative => self.model_creative = model,
            StageRole::Analytical => self.model_analytical = model,
            StageRole::Adversarial => self.model_adversarial = model,
        }
        self
    }

    /// Returns the model configured for a role.
    #[must_use]
    pub fn model_for(&self, role: StageRole) -> &str {
        match role {
            StageRole::Creative => &self.model_creative,
            StageRole::Analytical => &self.model_analytical,
            StageRole::Adversarial => &self.model_adversarial,
        }
    }

    /// Returns the temperature configured for a role.
    #[must_use]
    pub fn temperature_for(&self, role: StageRole) -> f64 {
        match role {
            StageRole::Creative => self.temp_creative,
            StageRole::Analytical => self.temp_analytical,
            StageRole::Adversarial => self.temp_adversarial,
        }
    }

    /// Gets the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| EnsembleError::Config(format!("{key}={value:?}: {e}")))
}
