//! Error types for path handling, pipeline execution and document loading.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::PipelineStage;

/// Errors from JSON Pointer parsing and pointer-addressed updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("invalid JSON Pointer \"{pointer}\": must be empty or start with \"/\"")]
    InvalidPointer { pointer: String },

    #[error("invalid array index \"{segment}\" in {pointer}")]
    InvalidArrayIndex { pointer: String, segment: String },
}

/// Errors raised while running the pipeline.
///
/// Only caller misuse ends up here. Incomplete schemas and data in
/// transition are handled by fallbacks inside the stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("middleware for stage {stage} called next() more than once")]
    NextCalledMultipleTimes { stage: PipelineStage },

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Errors while reading schema or data documents.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
}

impl PathError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

impl PipelineError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Path(e) => e.exit_code(),
            PipelineError::NextCalledMultipleTimes { .. } => 2,
        }
    }
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            LoadError::InvalidJson { .. } => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_exit_codes() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("schema.json"),
        };
        assert_eq!(err.exit_code(), 3);

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = LoadError::InvalidJson { source };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn pipeline_error_exit_codes() {
        let err = PipelineError::NextCalledMultipleTimes {
            stage: PipelineStage::Finalize,
        };
        assert_eq!(err.exit_code(), 2);

        let err = PipelineError::from(PathError::InvalidPointer {
            pointer: "name".into(),
        });
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn path_error_display() {
        let err = PathError::InvalidPointer {
            pointer: "a/b".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid JSON Pointer \"a/b\": must be empty or start with \"/\""
        );
    }

    #[test]
    fn next_called_twice_display_names_stage() {
        let err = PipelineError::NextCalledMultipleTimes {
            stage: PipelineStage::BuildTree,
        };
        assert_eq!(
            err.to_string(),
            "middleware for stage BUILD_TREE called next() more than once"
        );
    }
}
