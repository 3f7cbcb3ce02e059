//! Gross sanity check of produced and pre-existing artifacts.

use crate::tools::MediaTools;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Valid { duration_secs: f64 },
    Invalid(String),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid { .. })
    }
}

/// A container is usable only with a finite, positive duration.
pub fn duration_is_valid(duration_secs: f64) -> bool {
    duration_secs.is_finite() && duration_secs > 0.0
}

/// Probe `path` for its duration. Never touches the filesystem beyond reading.
pub async fn verify_artifact<T: MediaTools + ?Sized>(tools: &T, path: &Path) -> Verification {
    match tools.probe_duration(path).await {
        Ok(d) if duration_is_valid(d) => Verification::Valid { duration_secs: d },
        Ok(d) => {
            debug!(path = %path.display(), duration = d, "non-positive duration");
            Verification::Invalid(format!("duration {}", d))
        }
        Err(e) => Verification::Invalid(e.to_string()),
    }
}
