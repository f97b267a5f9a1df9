//! Judging core: resolve, build, run and score one submission.

pub mod aggregator;
pub mod classifier;
pub mod comparator;
pub mod compiler;
pub mod error;
pub mod fixtures;
pub mod judge;
pub mod process;
pub mod resolver;
pub mod runner;
pub mod submission;

mod judge_tests;

pub use error::{BuildTargetNotFound, FixtureError, JudgeError};
pub use fixtures::{FixtureGroup, FixtureProvider, FixtureStore};
pub use judge::judge;
pub use submission::{LocalSubmissions, SubmissionProvider};
