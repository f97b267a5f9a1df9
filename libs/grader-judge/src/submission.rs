//! Where student submissions come from.

use crate::error::JudgeError;
use std::path::{Component, Path, PathBuf};

/// Makes a student's submission available as a local directory
pub trait SubmissionProvider {
    fn materialize(&self, student_id: &str) -> Result<PathBuf, JudgeError>;
}

/// Submissions already unpacked under `<root>/<student_id>`
#[derive(Debug, Clone)]
pub struct LocalSubmissions {
    root: PathBuf,
}

impl LocalSubmissions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SubmissionProvider for LocalSubmissions {
    fn materialize(&self, student_id: &str) -> Result<PathBuf, JudgeError> {
        let mut components = Path::new(student_id).components();
        let single_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        let path = self.root.join(student_id);
        if !single_name || !path.is_dir() {
            return Err(JudgeError::MissingSubmission {
                student_id: student_id.to_string(),
                path,
            });
        }
        Ok(path)
    }
}
