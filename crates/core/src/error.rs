//! Run-level error taxonomy.
//!
//! Only `ModelInitialization` and `EncodingDetection` abort a run. Attempt
//! and segment failures are absorbed by the retry controller and show up as
//! absent segments and per-row outcomes instead of errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DrillError {
    #[error("failed to initialize speech synthesizer: {message}")]
    ModelInitialization { message: String },

    #[error("could not decode {} with any of [{}]", path.display(), tried.join(", "))]
    EncodingDetection { path: PathBuf, tried: Vec<&'static str> },

    #[error("synthesis attempt failed: {message}")]
    SynthesisAttempt { message: String },

    #[error("failed to export {}: {message}", path.display())]
    Export { path: PathBuf, message: String },
}

impl DrillError {
    pub(crate) fn model_init(err: impl std::fmt::Display) -> Self {
        Self::ModelInitialization {
            message: err.to_string(),
        }
    }

    pub(crate) fn attempt(err: impl std::fmt::Display) -> Self {
        Self::SynthesisAttempt {
            message: err.to_string(),
        }
    }

    pub(crate) fn export(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Export {
            path: path.into(),
            message: format!("{:#}", err),
        }
    }

    /// Whether this error must stop the run before (or instead of) row processing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DrillError::ModelInitialization { .. } | DrillError::EncodingDetection { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(DrillError::model_init("missing config.yaml").is_fatal());
        assert!(DrillError::EncodingDetection { path: "a.csv".into(), tried: vec!["utf-8"] }.is_fatal());
        assert!(!DrillError::attempt("boom").is_fatal());
        assert!(!DrillError::export("out.wav", "disk full").is_fatal());
    }

    #[test]
    fn test_encoding_message_lists_candidates() {
        let err = DrillError::EncodingDetection {
            path: "rows.csv".into(),
            tried: vec!["utf-8-sig", "utf-8", "gb18030", "gbk"],
        };
        assert_eq!(
            err.to_string(),
            "could not decode rows.csv with any of [utf-8-sig, utf-8, gb18030, gbk]"
        );
    }
}
