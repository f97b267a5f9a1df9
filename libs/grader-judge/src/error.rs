//! Error types for the judging core.
//!
//! Per-fixture failures and build failures are recorded in the report and
//! never show up here. Only conditions that point at the grading environment
//! (or an interrupted pass) are raised to the caller.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    /// A toolchain binary could not be started at all
    #[error("failed to invoke `{program}`: {source}")]
    Invocation {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("judging pass was cancelled")]
    Cancelled,

    #[error("no submission for '{student_id}' at {path}")]
    MissingSubmission { student_id: String, path: PathBuf },

    /// The isolated build area could not be prepared or read
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl JudgeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        JudgeError::Io { path: path.into(), source }
    }
}

/// Fixture store problems, all detected while loading
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("fixture directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("fixture '{id}' has an input file but no expected output ({path})")]
    MissingExpected { id: String, path: PathBuf },

    #[error("unknown assignment '{0}'")]
    UnknownAssignment(String),

    #[error("assignment '{assignment}' has no phase '{phase}'")]
    UnknownPhase { assignment: String, phase: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolution failure for one build target
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("build target not found: {0}")]
pub struct BuildTargetNotFound(pub String);
