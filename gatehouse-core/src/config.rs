//! Configuration system for Gatehouse.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment variables -> explicit overrides.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gates::GateThresholds;
use crate::hardening::HardeningPolicy;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub contradiction: ContradictionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub gates: GateThresholds,
    #[serde(default)]
    pub hardening: HardeningPolicy,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    /// Keyword table set used by the heuristic stages.
    #[serde(default = "default_lexicon_version")]
    pub lexicon_version: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collection: CollectionConfig::default(),
            dedup: DedupConfig::default(),
            contradiction: ContradictionConfig::default(),
            retry: RetryConfig::default(),
            gates: GateThresholds::default(),
            hardening: HardeningPolicy::default(),
            artifacts: ArtifactConfig::default(),
            lexicon_version: default_lexicon_version(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_checkpoint_ttl() -> u64 {
    86_400
}
fn default_max_rounds() -> usize {
    2
}
fn default_time_budget() -> u64 {
    1_800
}
fn default_lexicon_version() -> String {
    "v1".to_string()
}

/// Collector registry and checkpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collectors to run. Empty means every registered collector.
    #[serde(default)]
    pub enabled_collectors: Vec<String>,
    /// Order in which collectors are preferred for targeted recollection.
    #[serde(default)]
    pub collector_preference: Vec<String>,
    #[serde(default = "default_true")]
    pub checkpoint_enabled: bool,
    /// Checkpoint lifetime in seconds (default: one day).
    #[serde(default = "default_checkpoint_ttl")]
    pub checkpoint_ttl_secs: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            enabled_collectors: Vec::new(),
            collector_preference: Vec::new(),
            checkpoint_enabled: true,
            checkpoint_ttl_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Merge semantically identical claims across sources (Tier B).
    #[serde(default = "default_true")]
    pub semantic: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { semantic: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionConfig {
    /// Abort before synthesis when unresolved high-severity contradictions exist.
    #[serde(default)]
    pub block_on_high_unresolved: bool,
    /// Pass heuristic candidates through the configured refiner.
    #[serde(default = "default_true")]
    pub llm_refine: bool,
}

impl Default for ContradictionConfig {
    fn default() -> Self {
        Self {
            block_on_high_unresolved: false,
            llm_refine: true,
        }
    }
}

/// What happens when gates still fail after the last retry round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatePolicy {
    /// Raise a blocking error.
    Strict,
    /// Return the best-effort result with a warning.
    #[default]
    Soft,
}

impl std::fmt::Display for GatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatePolicy::Strict => write!(f, "strict"),
            GatePolicy::Soft => write!(f, "soft"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Wall-clock budget for the whole run, checked between rounds.
    #[serde(default = "default_time_budget")]
    pub time_budget_secs: u64,
    #[serde(default)]
    pub policy: GatePolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_rounds: 2,
            time_budget_secs: 1_800,
            policy: GatePolicy::Soft,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Directory for run artifacts. Nothing is written when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Reject settings the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.retry.max_rounds > 10 {
            problems.push(format!("retry.max_rounds is {} (maximum 10)", self.retry.max_rounds));
        }
        let tolerance = self.gates.awareness_tolerance;
        if !(tolerance > 0.0 && tolerance < 0.5) {
            problems.push(format!("gates.awareness_tolerance {tolerance} must be in (0, 0.5)"));
        }
        if self.lexicon_version.trim().is_empty() {
            problems.push("lexicon_version is empty".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                message: problems.join("; "),
            })
        }
    }

    /// Collector names to run, given the registered names.
    pub fn enabled<'a>(&self, registered: &[&'a str]) -> Vec<&'a str> {
        if self.collection.enabled_collectors.is_empty() {
            return registered.to_vec();
        }
        registered
            .iter()
            .copied()
            .filter(|name| self.collection.enabled_collectors.iter().any(|e| e.as_str() == *name))
            .collect()
    }
}

/// Load configuration by merging defaults, files, environment and overrides.
///
/// Environment variables use the `GATEHOUSE_` prefix with `__` separating
/// sections, e.g. `GATEHOUSE_RETRY__MAX_ROUNDS=3`.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&PipelineConfig>,
) -> Result<PipelineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(path) = user_config_path() {
        if path.exists() {
            figment = figment.merge(Toml::file(&path));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("GATEHOUSE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "gatehouse", "gatehouse")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".gatehouse").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.retry.max_rounds, 2);
        assert_eq!(config.retry.policy, GatePolicy::Soft);
        assert!(config.dedup.semantic);
        assert!(config.contradiction.llm_refine);
        assert!(!config.contradiction.block_on_high_unresolved);
        assert_eq!(config.collection.checkpoint_ttl_secs, 86_400);
        assert_eq!(config.gates.min_evidence_items, 40);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backward_compat_empty_toml() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
[retry]
policy = "strict"

[gates]
competitor_floor = 4

[[hardening.competitor_catalog]]
name = "Rivalry"
aliases = ["rivalry app"]
"#,
        )
        .unwrap();
        assert_eq!(config.retry.policy, GatePolicy::Strict);
        assert_eq!(config.retry.max_rounds, 2);
        assert_eq!(config.gates.competitor_floor, 4);
        assert_eq!(config.gates.competitor_target, 5);
        assert_eq!(config.hardening.competitor_catalog[0].aliases, vec!["rivalry app".to_string()]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.retry.max_rounds = 11;
        config.gates.awareness_tolerance = 0.5;
        config.lexicon_version = " ".into();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_rounds"));
        assert!(err.contains("awareness_tolerance"));
        assert!(err.contains("lexicon_version"));
    }

    #[test]
    fn test_enabled_collectors() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.enabled(&["a", "b"]), vec!["a", "b"]);
        config.collection.enabled_collectors = vec!["b".into(), "zzz".into()];
        assert_eq!(config.enabled(&["a", "b"]), vec!["b"]);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = PipelineConfig::default();
        overrides.retry.max_rounds = 5;
        overrides.dedup.semantic = false;
        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.retry.max_rounds, 5);
        assert!(!config.dedup.semantic);
    }

    #[test]
    fn test_load_config_from_workspace_and_env() {
        Jail::expect_with(|jail| {
            jail.create_dir(".gatehouse")?;
            jail.create_file(
                ".gatehouse/config.toml",
                r#"
[retry]
max_rounds = 4
time_budget_secs = 60

[collection]
collector_preference = ["listener", "scout"]
"#,
            )?;
            jail.set_env("GATEHOUSE_RETRY__POLICY", "strict");
            jail.set_env("GATEHOUSE_GATES__MIN_SEGMENTS", "3");

            let config = load_config(Some(jail.directory()), None).map_err(|e| e.to_string())?;
            assert_eq!(config.retry.max_rounds, 4);
            assert_eq!(config.retry.time_budget_secs, 60);
            assert_eq!(config.retry.policy, GatePolicy::Strict);
            assert_eq!(config.gates.min_segments, 3);
            assert_eq!(config.collection.collector_preference, vec!["listener", "scout"]);
            assert!(config_exists(Some(jail.directory())));
            Ok(())
        });
    }
}
