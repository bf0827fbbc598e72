//! Small helpers for identifiers, fingerprints and timestamps.

pub mod timestamps;

pub use timestamps::{iso_timestamp, parse_timestamp, Timestamp, TimestampError};

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generates a new run identifier.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}

/// Returns the hex SHA-256 of a text, shortened to 16 characters.
///
/// Used in events so that specification text never has to be logged.
#[must_use]
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(16);
    encoded
}

/// Shortens text for log lines and error messages, appending `...` when cut.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}
