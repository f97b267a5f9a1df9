// Assignment configuration for the grader
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/assignments.json";
pub const DEFAULT_EXECUTABLE: &str = "student_program";

/// How the buildable unit is located inside a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum BuildMode {
    /// One translation unit at the top of the submission
    SingleFile {
        #[serde(default = "default_source")]
        default_source: String,
        #[serde(default = "default_extensions")]
        extensions: Vec<String>,
    },
    /// Several independent programs, each built from its own sources
    MultiFile { targets: Vec<TargetSpec> },
    /// The submission ships its own Makefile
    Makefile {
        #[serde(default)]
        target: Option<String>,
    },
}

impl BuildMode {
    pub fn name(&self) -> &'static str {
        match self {
            BuildMode::SingleFile { .. } => "single-file",
            BuildMode::MultiFile { .. } => "multi-file",
            BuildMode::Makefile { .. } => "makefile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    /// Paths relative to the submission root, glob patterns allowed
    pub sources: Vec<String>,
    #[serde(default)]
    pub executable: Option<String>,
    /// Fixture phase judged against this target; all phases when unset
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    /// Fixture subdirectory below the assignment's fixtures_dir
    pub fixtures: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    #[default]
    Tolerant,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiplierStep {
    /// Upper bound (inclusive) of the failing-fixture ratio this step covers
    pub max_failure_ratio: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierPolicy {
    pub steps: Vec<MultiplierStep>,
}

impl Default for MultiplierPolicy {
    fn default() -> Self {
        Self {
            steps: vec![
                MultiplierStep { max_failure_ratio: 0.2, multiplier: 0.8 },
                MultiplierStep { max_failure_ratio: 0.5, multiplier: 0.6 },
                MultiplierStep { max_failure_ratio: 0.8, multiplier: 0.4 },
                MultiplierStep { max_failure_ratio: 1.0, multiplier: 0.2 },
            ],
        }
    }
}

impl MultiplierPolicy {
    /// Map a failure ratio in [0, 1] to a score multiplier
    pub fn multiplier_for(&self, failure_ratio: f64) -> f64 {
        if failure_ratio <= 0.0 {
            return 1.0;
        }
        self.steps
            .iter()
            .find(|step| failure_ratio <= step.max_failure_ratio + 1e-9)
            .map(|step| step.multiplier)
            .unwrap_or(0.0)
    }

    fn validate(&self) -> Result<()> {
        let mut previous = 0.0;
        for step in &self.steps {
            if !(0.0..=1.0).contains(&step.max_failure_ratio) {
                bail!("max_failure_ratio {} is outside [0, 1]", step.max_failure_ratio);
            }
            if !(0.0..=1.0).contains(&step.multiplier) {
                bail!("multiplier {} is outside [0, 1]", step.multiplier);
            }
            if step.max_failure_ratio < previous {
                bail!("multiplier steps must be sorted by max_failure_ratio");
            }
            previous = step.max_failure_ratio;
        }
        // Every ratio up to a fully failing submission needs a step
        match self.steps.last() {
            Some(last) if last.max_failure_ratio >= 1.0 => Ok(()),
            _ => bail!("the last multiplier step must cover max_failure_ratio 1.0"),
        }
    }
}

/// One gradable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub build: BuildMode,
    /// Command template; `{sources}`, `{output}` and `{target}` are expanded
    #[serde(default)]
    pub toolchain: Option<Vec<String>>,
    #[serde(default = "default_executable")]
    pub executable: String,
    pub fixtures_dir: PathBuf,
    #[serde(default)]
    pub phases: Vec<PhaseSpec>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub comparison: ComparisonMode,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_compile_timeout_secs")]
    pub compile_timeout_secs: u64,
    #[serde(default)]
    pub allow_nonzero_exit: bool,
    #[serde(default)]
    pub verbose_diff: bool,
    #[serde(default = "default_diff_lines")]
    pub diff_lines: usize,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default)]
    pub multiplier: MultiplierPolicy,
}

fn default_source() -> String {
    "main.cpp".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["cpp".to_string(), "cc".to_string(), "c".to_string()]
}

fn default_executable() -> String {
    DEFAULT_EXECUTABLE.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_compile_timeout_secs() -> u64 {
    120
}

fn default_diff_lines() -> usize {
    10
}

fn default_max_output_bytes() -> usize {
    64 * 1024
}

impl AssignmentConfig {
    /// Toolchain command, falling back to the per-mode default
    pub fn toolchain_command(&self) -> Vec<String> {
        if let Some(cmd) = &self.toolchain {
            return cmd.clone();
        }
        match &self.build {
            BuildMode::SingleFile { .. } | BuildMode::MultiFile { .. } => [
                "g++", "-std=c++11", "-O2", "{sources}", "-o", "{output}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            BuildMode::Makefile { target } => {
                let mut cmd = vec!["make".to_string()];
                if target.is_some() {
                    cmd.push("{target}".to_string());
                }
                cmd
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("Assignment id cannot be empty");
        }
        if self.executable.trim().is_empty() {
            bail!("Assignment '{}': executable name cannot be empty", self.id);
        }
        if self.timeout_secs == 0 || self.compile_timeout_secs == 0 {
            bail!("Assignment '{}': timeouts must be positive", self.id);
        }
        if self.toolchain.as_ref().is_some_and(|cmd| cmd.is_empty()) {
            bail!("Assignment '{}': toolchain command cannot be empty", self.id);
        }

        let mut phase_names = HashSet::new();
        for phase in &self.phases {
            if !phase_names.insert(phase.name.as_str()) {
                bail!("Assignment '{}': duplicate phase '{}'", self.id, phase.name);
            }
        }

        match &self.build {
            BuildMode::SingleFile { extensions, .. } if extensions.is_empty() => {
                bail!("Assignment '{}': single-file mode needs at least one extension", self.id);
            }
            BuildMode::MultiFile { targets } => {
                if targets.is_empty() {
                    bail!("Assignment '{}': multi-file mode needs at least one target", self.id);
                }
                let mut names = HashSet::new();
                for target in targets {
                    if !names.insert(target.name.as_str()) {
                        bail!("Assignment '{}': duplicate target '{}'", self.id, target.name);
                    }
                    if target.sources.is_empty() {
                        bail!("Assignment '{}': target '{}' lists no sources", self.id, target.name);
                    }
                    if let Some(phase) = &target.phase {
                        if !phase_names.contains(phase.as_str()) {
                            bail!(
                                "Assignment '{}': target '{}' refers to unknown phase '{}'",
                                self.id,
                                target.name,
                                phase
                            );
                        }
                    }
                }
            }
            _ => {}
        }

        self.multiplier
            .validate()
            .with_context(|| format!("Assignment '{}': invalid multiplier policy", self.id))
    }
}

/// Lookup of assignment configuration by id
pub trait AssignmentProvider {
    fn get_config(&self, assignment_id: &str) -> Result<&AssignmentConfig>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignmentsJson {
    pub assignments: Vec<AssignmentConfig>,
}

/// Assignment configuration manager
#[derive(Debug, Clone)]
pub struct AssignmentConfigManager {
    configs: BTreeMap<String, AssignmentConfig>,
}

impl AssignmentConfigManager {
    /// Load assignment configurations from assignments.json
    ///
    /// Relative `fixtures_dir` entries are resolved against the directory that
    /// holds the configuration file.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Assignment config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let parsed: AssignmentsJson = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_configs(parsed.assignments.into_iter().map(|mut cfg| {
            if cfg.fixtures_dir.is_relative() {
                cfg.fixtures_dir = base.join(&cfg.fixtures_dir);
            }
            cfg
        }))
    }

    /// Load with GRADER_CONFIG or the default path (config/assignments.json)
    pub fn load_default() -> Result<Self> {
        let path = std::env::var("GRADER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(Path::new(&path))
    }

    pub fn from_configs(configs: impl IntoIterator<Item = AssignmentConfig>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for cfg in configs {
            cfg.validate()?;
            if map.contains_key(&cfg.id) {
                bail!("Duplicate assignment id: {}", cfg.id);
            }
            map.insert(cfg.id.clone(), cfg);
        }
        Ok(Self { configs: map })
    }

    pub fn contains(&self, assignment_id: &str) -> bool {
        self.configs.contains_key(assignment_id)
    }

    /// List all configured assignment ids
    pub fn list_assignments(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssignmentConfig> {
        self.configs.values()
    }
}

impl AssignmentProvider for AssignmentConfigManager {
    fn get_config(&self, assignment_id: &str) -> Result<&AssignmentConfig> {
        self.configs
            .get(assignment_id)
            .ok_or_else(|| anyhow::anyhow!("No configuration found for assignment: {}", assignment_id))
    }
}
