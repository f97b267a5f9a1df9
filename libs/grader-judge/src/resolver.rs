//! Build Resolver - locate the buildable unit(s) of a submission
//!
//! Student projects arrive in whatever layout the student picked. The
//! resolver maps an assignment's `BuildMode` onto concrete build targets
//! without touching anything but the filesystem metadata.

use crate::error::BuildTargetNotFound;
use globset::Glob;
use grader_common::config::{AssignmentConfig, BuildMode, TargetSpec};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const MAKEFILE_NAMES: [&str; 2] = ["Makefile", "makefile"];

/// What the compiler invoker is asked to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildUnit {
    /// Source files, relative to the submission root
    Sources(Vec<PathBuf>),
    /// A Makefile at the submission root, with an optional make target
    Makefile { target: Option<String> },
}

/// One target of an assignment after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPlan {
    pub name: String,
    pub phase: Option<String>,
    pub executable: String,
    pub unit: Result<BuildUnit, BuildTargetNotFound>,
}

/// Resolve every build target of an assignment against a submission root
///
/// A failure to resolve one target never prevents the others from resolving.
pub fn resolve(root: &Path, config: &AssignmentConfig) -> Vec<TargetPlan> {
    let plans = match &config.build {
        BuildMode::SingleFile {
            default_source,
            extensions,
        } => vec![TargetPlan {
            name: config.id.clone(),
            phase: None,
            executable: config.executable.clone(),
            unit: resolve_single_file(root, default_source, extensions),
        }],
        BuildMode::MultiFile { targets } => targets
            .iter()
            .map(|spec| TargetPlan {
                name: spec.name.clone(),
                phase: spec.phase.clone(),
                executable: spec
                    .executable
                    .clone()
                    .unwrap_or_else(|| config.executable.clone()),
                unit: resolve_multi_file(root, spec),
            })
            .collect(),
        BuildMode::Makefile { target } => vec![TargetPlan {
            name: config.id.clone(),
            phase: None,
            executable: config.executable.clone(),
            unit: resolve_makefile(root, target.clone()),
        }],
    };

    for plan in &plans {
        debug!(
            target_name = %plan.name,
            mode = config.build.name(),
            resolved = plan.unit.is_ok(),
            "Resolved build target"
        );
    }
    plans
}

/// Pick the single top-level source file, falling back to the default name
fn resolve_single_file(
    root: &Path,
    default_source: &str,
    extensions: &[String],
) -> Result<BuildUnit, BuildTargetNotFound> {
    let entries = fs::read_dir(root)
        .map_err(|e| BuildTargetNotFound(format!("cannot read {}: {}", root.display(), e)))?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|e| e == ext))
        })
        .filter_map(|path| path.file_name().map(PathBuf::from))
        .collect();
    candidates.sort();

    if candidates.len() == 1 {
        return Ok(BuildUnit::Sources(candidates));
    }

    let default = PathBuf::from(default_source);
    if is_contained(&default) && root.join(&default).is_file() {
        return Ok(BuildUnit::Sources(vec![default]));
    }

    Err(BuildTargetNotFound(if candidates.is_empty() {
        format!("no source file and no {} in submission", default_source)
    } else {
        format!(
            "{} candidate source files and no {} to disambiguate",
            candidates.len(),
            default_source
        )
    }))
}

/// Resolve each configured path or glob of a multi-file target
fn resolve_multi_file(root: &Path, spec: &TargetSpec) -> Result<BuildUnit, BuildTargetNotFound> {
    let mut sources = Vec::new();
    for pattern in &spec.sources {
        if is_glob(pattern) {
            let matched = expand_glob(root, pattern)?;
            if matched.is_empty() {
                return Err(BuildTargetNotFound(format!(
                    "{}: nothing matches {}",
                    spec.name, pattern
                )));
            }
            sources.extend(matched);
        } else {
            let rel = PathBuf::from(pattern);
            if !is_contained(&rel) || !root.join(&rel).is_file() {
                return Err(BuildTargetNotFound(format!("{}: missing {}", spec.name, pattern)));
            }
            sources.push(rel);
        }
    }
    sources.dedup();
    Ok(BuildUnit::Sources(sources))
}

fn resolve_makefile(root: &Path, target: Option<String>) -> Result<BuildUnit, BuildTargetNotFound> {
    if MAKEFILE_NAMES.iter().any(|name| root.join(name).is_file()) {
        Ok(BuildUnit::Makefile { target })
    } else {
        Err(BuildTargetNotFound("no Makefile at submission root".to_string()))
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// Relative paths that stay inside the submission root
fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn expand_glob(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, BuildTargetNotFound> {
    let matcher = Glob::new(pattern)
        .map_err(|e| BuildTargetNotFound(format!("invalid pattern {}: {}", pattern, e)))?
        .compile_matcher();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    let mut matched: Vec<PathBuf> = walker
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .filter(|rel| matcher.is_match(rel))
        .collect();
    matched.sort();
    Ok(matched)
}
