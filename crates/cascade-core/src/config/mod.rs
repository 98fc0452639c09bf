//! YAML configuration: backend selection plus per-stage overrides.

use crate::errors::ConfigError;
use crate::model::CompletionParams;
use crate::parser::MarkerSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Fake,
    Openai,
    Gemini,
}

impl ProviderKind {
    pub fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            ProviderKind::Fake => None,
            ProviderKind::Openai => Some("OPENAI_API_KEY"),
            ProviderKind::Gemini => Some("GEMINI_API_KEY"),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key; provider default if unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Canned reply for the `fake` provider.
    #[serde(default)]
    pub fake_response: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_model(),
            api_key_env: None,
            base_url: None,
            timeout_secs: None,
            fake_response: None,
        }
    }
}

impl BackendConfig {
    /// Key from the configured variable; `None` when unset or blank.
    pub fn api_key(&self) -> Option<String> {
        let var = self
            .api_key_env
            .as_deref()
            .or_else(|| self.provider.default_api_key_env())?;
        std::env::var(var).ok().filter(|key| !key.trim().is_empty())
    }
}

fn default_max_bias_score() -> f64 {
    0.3
}

fn default_max_critical_issues() -> usize {
    2
}

/// Acceptance limits for the framing pre-check on a stage's input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurityThresholds {
    #[serde(default = "default_max_bias_score")]
    pub max_bias_score: f64,
    #[serde(default = "default_max_critical_issues")]
    pub max_critical_issues: usize,
}

impl Default for PurityThresholds {
    fn default() -> Self {
        Self {
            max_bias_score: default_max_bias_score(),
            max_critical_issues: default_max_critical_issues(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageOverrides {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub markers: Option<MarkerSpec>,
    /// Only meaningful for stages that consult the semantic judge.
    #[serde(default)]
    pub semantic_scoring: Option<bool>,
    /// Enables the framing pre-check; only the objective stage runs one.
    #[serde(default)]
    pub purity: Option<PurityThresholds>,
}

impl StageOverrides {
    pub fn apply_params(&self, defaults: CompletionParams) -> CompletionParams {
        CompletionParams {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
        }
    }

    fn validate(&self, stage: &str) -> Result<(), ConfigError> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError(format!(
                    "stage '{}': temperature {} outside 0.0..=2.0",
                    stage, t
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ConfigError(format!("stage '{}': max_tokens must be > 0", stage)));
        }
        if let Some(purity) = &self.purity {
            if !(0.0..=1.0).contains(&purity.max_bias_score) {
                return Err(ConfigError(format!(
                    "stage '{}': purity.max_bias_score {} outside 0.0..=1.0",
                    stage, purity.max_bias_score
                )));
            }
        }
        if let Some(markers) = &self.markers {
            markers
                .validate()
                .map_err(|e| ConfigError(format!("stage '{}': {}", stage, e.0)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CascadeConfig {
    pub version: u32,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub stages: BTreeMap<String, StageOverrides>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            backend: BackendConfig::default(),
            stages: BTreeMap::new(),
        }
    }
}

impl CascadeConfig {
    pub fn stage(&self, name: &str) -> Option<&StageOverrides> {
        self.stages.get(name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError(format!(
                "unsupported config version {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        if self.backend.model.trim().is_empty() {
            return Err(ConfigError("backend.model must not be empty".into()));
        }
        for (name, overrides) in &self.stages {
            overrides.validate(name)?;
        }
        Ok(())
    }
}

pub fn parse_config(raw: &str) -> Result<CascadeConfig, ConfigError> {
    let cfg: CascadeConfig = serde_yaml::from_str(raw)
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_config(path: &Path) -> Result<CascadeConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ValueShape;
    use std::io::Write;

    const SAMPLE: &str = r#"
version: 1
backend:
  provider: gemini
  model: gemini-1.5-flash
  api_key_env: MY_GEMINI_KEY
  timeout_secs: 30
stages:
  reasoning:
    temperature: 0.2
    max_tokens: 512
  objective:
    semantic_scoring: false
  compassion:
    markers:
      fallback: impact
      sections:
        - key: impact
          markers: ["IMPACT:"]
        - key: opportunities
          markers: ["CHANCES:", "OPPORTUNITIES:"]
          shape:
            kind: bullet_list
"#;

    #[test]
    fn loads_sample_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.backend.provider, ProviderKind::Gemini);
        assert_eq!(cfg.backend.timeout_secs, Some(30));

        let reasoning = cfg.stage("reasoning").unwrap();
        let params = reasoning.apply_params(CompletionParams::new(0.7, 2048));
        assert_eq!(params, CompletionParams::new(0.2, 512));
        assert_eq!(cfg.stage("objective").unwrap().semantic_scoring, Some(false));

        let markers = cfg.stage("compassion").unwrap().markers.as_ref().unwrap();
        assert_eq!(markers.delimiter, ':');
        assert_eq!(markers.sections[1].shape, ValueShape::BulletList);
    }

    #[test]
    fn defaults_when_sections_absent() {
        let cfg = parse_config("version: 1\n").unwrap();
        assert_eq!(cfg, CascadeConfig::default());
        assert!(cfg.stage("reasoning").is_none());
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = parse_config("version: 2\n").unwrap_err();
        assert!(err.to_string().contains("unsupported config version 2"));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_overrides() {
        assert!(parse_config("version: 1\nbackend:\n  provder: fake\n").is_err());

        let err = parse_config("version: 1\nstages:\n  reasoning:\n    temperature: 3.5\n")
            .unwrap_err();
        assert!(err.0.contains("reasoning"));

        let err = parse_config(
            "version: 1\nstages:\n  context:\n    markers:\n      fallback: missing\n      sections:\n        - key: a\n          markers: [\"A:\"]\n",
        )
        .unwrap_err();
        assert!(err.0.contains("context"));
    }

    #[test]
    fn purity_thresholds_default_per_field() {
        let cfg = parse_config(
            "version: 1\nstages:\n  objective:\n    purity:\n      max_critical_issues: 1\n",
        )
        .unwrap();
        let purity = cfg.stage("objective").unwrap().purity.unwrap();
        assert_eq!(purity.max_critical_issues, 1);
        assert_eq!(purity.max_bias_score, 0.3);

        let err = parse_config(
            "version: 1\nstages:\n  objective:\n    purity:\n      max_bias_score: 1.5\n",
        )
        .unwrap_err();
        assert!(err.0.contains("max_bias_score"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(err.0.contains("failed to read config"));
    }
}
