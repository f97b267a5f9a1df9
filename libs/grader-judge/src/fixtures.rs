//! On-disk fixture store.
//!
//! Fixtures live next to each other as `<id>.in` / `<id>.out` pairs, one
//! directory per assignment and, for multi-phase assignments, one
//! subdirectory per phase. Everything is read and validated up front so a
//! broken store fails at startup instead of halfway through a batch.

use crate::error::FixtureError;
use grader_common::config::{AssignmentConfig, AssignmentConfigManager};
use grader_common::types::Fixture;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub const INPUT_EXT: &str = "in";
pub const EXPECTED_EXT: &str = "out";

/// Fixture lookup by assignment and optional phase
pub trait FixtureProvider {
    fn list_fixtures(
        &self,
        assignment_id: &str,
        phase: Option<&str>,
    ) -> Result<Vec<Fixture>, FixtureError>;
}

/// Fixtures of one phase (or of the whole assignment when `phase` is None)
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureGroup {
    pub phase: Option<String>,
    pub fixtures: Vec<Fixture>,
}

/// Read-only, preloaded collection of fixtures for every configured assignment
#[derive(Debug, Default)]
pub struct FixtureStore {
    groups: HashMap<String, Vec<FixtureGroup>>,
}

impl FixtureStore {
    /// Load and validate fixtures for every assignment in the manager
    pub fn load(manager: &AssignmentConfigManager) -> Result<Self, FixtureError> {
        let mut groups = HashMap::new();
        for config in manager.iter() {
            groups.insert(config.id.clone(), load_assignment(config)?);
        }
        Ok(Self { groups })
    }

    /// All groups of an assignment, in phase declaration order
    pub fn groups(&self, assignment_id: &str) -> Result<&[FixtureGroup], FixtureError> {
        self.groups
            .get(assignment_id)
            .map(|g| g.as_slice())
            .ok_or_else(|| FixtureError::UnknownAssignment(assignment_id.to_string()))
    }

    pub fn total(&self, assignment_id: &str) -> usize {
        self.groups
            .get(assignment_id)
            .map(|groups| groups.iter().map(|g| g.fixtures.len()).sum())
            .unwrap_or(0)
    }
}

impl FixtureProvider for FixtureStore {
    fn list_fixtures(
        &self,
        assignment_id: &str,
        phase: Option<&str>,
    ) -> Result<Vec<Fixture>, FixtureError> {
        let groups = self.groups(assignment_id)?;
        match phase {
            None => Ok(groups.iter().flat_map(|g| g.fixtures.iter().cloned()).collect()),
            Some(name) => groups
                .iter()
                .find(|g| g.phase.as_deref() == Some(name))
                .map(|g| g.fixtures.clone())
                .ok_or_else(|| FixtureError::UnknownPhase {
                    assignment: assignment_id.to_string(),
                    phase: name.to_string(),
                }),
        }
    }
}

/// Load every phase of one assignment
pub fn load_assignment(config: &AssignmentConfig) -> Result<Vec<FixtureGroup>, FixtureError> {
    if config.phases.is_empty() {
        let fixtures = load_dir(&config.fixtures_dir, None)?;
        return Ok(vec![FixtureGroup { phase: None, fixtures }]);
    }

    config
        .phases
        .iter()
        .map(|phase| {
            let dir = config.fixtures_dir.join(&phase.fixtures);
            let fixtures = load_dir(&dir, Some(&phase.name))?;
            Ok(FixtureGroup {
                phase: Some(phase.name.clone()),
                fixtures,
            })
        })
        .collect()
}

/// Load all `<id>.in` / `<id>.out` pairs in one directory
pub fn load_dir(dir: &Path, phase: Option<&str>) -> Result<Vec<Fixture>, FixtureError> {
    if !dir.is_dir() {
        return Err(FixtureError::MissingDirectory(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|source| FixtureError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| FixtureError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let (Some(stem), Some(ext)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };

        match ext {
            INPUT_EXT => ids.push(stem.to_string()),
            EXPECTED_EXT if !dir.join(format!("{}.{}", stem, INPUT_EXT)).exists() => {
                warn!(fixture = stem, dir = %dir.display(), "Expected output without input, ignoring");
            }
            _ => {}
        }
    }

    ids.sort_by(|a, b| compare_ids(a, b));

    let mut fixtures = Vec::with_capacity(ids.len());
    for id in ids {
        let input_path = dir.join(format!("{}.{}", id, INPUT_EXT));
        let expected_path = dir.join(format!("{}.{}", id, EXPECTED_EXT));
        if !expected_path.is_file() {
            return Err(FixtureError::MissingExpected {
                id,
                path: expected_path,
            });
        }
        let input = read(&input_path)?;
        let expected_output = read(&expected_path)?;
        fixtures.push(Fixture {
            id,
            phase: phase.map(str::to_string),
            input,
            expected_output,
        });
    }

    debug!(dir = %dir.display(), count = fixtures.len(), "Loaded fixtures");
    Ok(fixtures)
}

fn read(path: &Path) -> Result<String, FixtureError> {
    fs::read_to_string(path).map_err(|source| FixtureError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Numeric ids first in numeric order, then everything else lexically
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
