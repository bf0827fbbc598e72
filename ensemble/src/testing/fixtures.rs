//! File fixtures for workflow tests.

use std::path::PathBuf;

use crate::errors::{EnsembleError, Result};

/// Writes guide and spec files into a caller-owned directory.
#[derive(Debug, Clone)]
pub struct GuideFixture {
    dir: PathBuf,
}

impl GuideFixture {
    /// Creates a fixture rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns a path inside the fixture directory.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Writes a guide with one `Step N: description` line per entry.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be written.
    pub fn write_guide(&self, name: &str, steps: &[&str]) -> Result<PathBuf> {
        let body: String = steps
            .iter()
            .enumerate()
            .map(|(i, description)| format!("Step {}: {description}\n", i + 1))
            .collect();
        self.write_file(name, &body)
    }

    /// Writes arbitrary text to a file in the fixture directory.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be written.
    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path(name);
        std::fs::write(&path, contents).map_err(|e| EnsembleError::io(&path, e))?;
        Ok(path)
    }

    /// Reads a file from the fixture directory.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read.
    pub fn read(&self, name: &str) -> Result<String> {
        let path = self.path(name);
        std::fs::read_to_string(&path).map_err(|e| EnsembleError::io(&path, e))
    }
}
