//! Guide parsing.
//!
//! A guide is plain text where each recognized line reads
//! `Step <n>: <description>`. Other lines are ignored.

use crate::errors::{EnsembleError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

/// Suffix that marks a file as a guide when listing alternatives.
pub const GUIDE_SUFFIX: &str = "_guide.txt";

/// One unit of work within a guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Ordinal as written in the guide.
    pub ordinal: u32,
    /// What the step asks for.
    pub description: String,
}

impl Step {
    /// Creates a step.
    #[must_use]
    pub fn new(ordinal: u32, description: impl Into<String>) -> Self {
        Self {
            ordinal,
            description: description.into(),
        }
    }
}

fn step_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^Step\s+(\d+):\s*(.+)$").unwrap_or_else(|e| unreachable!("{e}"))
    })
}

/// Parses guide text into steps ordered by ascending ordinal.
///
/// A later line with the same ordinal replaces an earlier one. Returns an
/// empty vector when no line matches.
#[must_use]
pub fn parse_steps(text: &str) -> Vec<Step> {
    let mut by_ordinal: BTreeMap<u32, String> = BTreeMap::new();
    for line in text.lines() {
        let Some(caps) = step_pattern().captures(line.trim()) else {
            continue;
        };
        // Ordinals beyond u32 are not steps.
        let Ok(ordinal) = caps[1].parse::<u32>() else {
            continue;
        };
        by_ordinal.insert(ordinal, caps[2].trim().to_string());
    }
    by_ordinal
        .into_iter()
        .map(|(ordinal, description)| Step::new(ordinal, description))
        .collect()
}

/// Reads and parses a guide file.
///
/// # Errors
///
/// - [`EnsembleError::GuideNotFound`] if the file cannot be read, listing
///   guide-like siblings.
/// - [`EnsembleError::GuideEmpty`] if no step line is present.
pub fn load_guide(path: impl AsRef<Path>) -> Result<Vec<Step>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|_| EnsembleError::GuideNotFound {
        path: path.to_path_buf(),
        available: list_available_guides(path),
    })?;

    let steps = parse_steps(&text);
    if steps.is_empty() {
        return Err(EnsembleError::GuideEmpty {
            path: path.to_path_buf(),
        });
    }
    tracing::debug!(guide = %path.display(), steps = steps.len(), "Parsed guide");
    Ok(steps)
}

/// Lists `*_guide.txt` file names in the directory containing `path`.
///
/// Returns a sorted list, empty when the directory is unreadable.
#[must_use]
pub fn list_available_guides(path: &Path) -> Vec<String> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(GUIDE_SUFFIX))
        .collect();
    names.sort();
    names
}
