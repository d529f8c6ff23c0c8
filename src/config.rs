//! Loading service configuration (dimension weights + level mapping) from TOML and env.
//!
//! Order of precedence: built-in defaults, then the TOML file named by
//! `DASHBOARD_CONFIG_PATH`, then individual env overrides. The resulting
//! `AppConfig` is validated once and treated as immutable afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::Difficulty;
use crate::error::ConfigError;
use crate::scoring::{Dimension, Dimensions};

/// Percentage weight per scoring dimension. Must sum to 100.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Weights(pub Dimensions<u32>);

impl Default for Weights {
  fn default() -> Self {
    Self(Dimensions {
      grammar_morphology: 23,
      vocabulary_sophistication: 21,
      fluency_coherence: 17,
      syntax_word_order: 14,
      pause_patterns: 11,
      task_completion: 14,
    })
  }
}

impl Weights {
  pub fn get(&self, dimension: Dimension) -> u32 {
    *self.0.get(dimension)
  }

  pub fn sum(&self) -> u32 {
    Dimension::ALL.iter().map(|d| self.get(*d)).sum()
  }
}

/// Per-tier prompt selection and recording limits.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LevelSettings {
  #[serde(default = "default_cefr_levels")]
  pub cefr: Vec<String>,
  #[serde(default = "default_seconds")]
  pub minimum_seconds: u32,
  #[serde(default = "default_seconds")]
  pub recommended_seconds: u32,
}

fn default_cefr_levels() -> Vec<String> { vec!["A1.1".into()] }
fn default_seconds() -> u32 { 30 }

impl Default for LevelSettings {
  fn default() -> Self {
    Self { cefr: default_cefr_levels(), minimum_seconds: 30, recommended_seconds: 30 }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
struct FileConfig {
  #[serde(default)]
  weights: Option<Weights>,
  #[serde(default)]
  levels: BTreeMap<Difficulty, LevelSettings>,
}

/// Connection settings for the PostgREST endpoint.
#[derive(Clone, Debug, Default)]
pub struct DatastoreSettings {
  pub url: Option<String>,
  pub service_key: Option<String>,
  pub anon_key: Option<String>,
}

impl DatastoreSettings {
  /// The key used for dashboard queries: service role first, anon key as fallback.
  pub fn api_key(&self) -> Option<&str> {
    self.service_key.as_deref().or(self.anon_key.as_deref())
  }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
  pub weights: Weights,
  pub levels: BTreeMap<Difficulty, LevelSettings>,
  pub datastore: DatastoreSettings,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      weights: Weights::default(),
      levels: Difficulty::ALL.iter().map(|d| (*d, LevelSettings::default())).collect(),
      datastore: DatastoreSettings::default(),
    }
  }
}

impl AppConfig {
  /// Build the configuration from the process environment. Fails fast on invalid weights.
  pub fn from_env() -> Result<Self, ConfigError> {
    let mut cfg = Self::default();
    if let Ok(path) = std::env::var("DASHBOARD_CONFIG_PATH") {
      cfg.merge_file(&path)?;
    }
    cfg.apply_overrides(|key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
  }

  fn merge_file(&mut self, path: &str) -> Result<(), ConfigError> {
    let raw = std::fs::read_to_string(path)
      .map_err(|source| ConfigError::Read { path: path.to_string(), source })?;
    self.merge_toml(&raw).map_err(|source| ConfigError::Parse { path: path.to_string(), source })?;
    info!(target: "ibrani_dashboard", %path, "Loaded dashboard config (TOML)");
    Ok(())
  }

  fn merge_toml(&mut self, raw: &str) -> Result<(), toml::de::Error> {
    let file: FileConfig = toml::from_str(raw)?;
    if let Some(w) = file.weights {
      self.weights = w;
    }
    self.levels.extend(file.levels);
    Ok(())
  }

  /// Apply env-style overrides. `lookup` returns the raw value for a key, if set.
  pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    for dim in Dimension::ALL {
      let key = format!("{}_WEIGHT", dim.as_str().to_uppercase());
      if let Some(raw) = lookup(&key) {
        *self.weights.0.get_mut(dim) = parse_override(&key, &raw)?;
      }
    }

    for tier in Difficulty::ALL {
      let upper = tier.as_str().to_uppercase();
      let level = self.levels.entry(tier).or_default();

      if let Some(raw) = lookup(&format!("LEVEL_{upper}")) {
        level.cefr = raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
      }
      let min_key = format!("MIN_SECONDS_{upper}");
      if let Some(raw) = lookup(&min_key) {
        level.minimum_seconds = parse_override(&min_key, &raw)?;
      }
      let rec_key = format!("RECOMMENDED_SECONDS_{upper}");
      if let Some(raw) = lookup(&rec_key) {
        level.recommended_seconds = parse_override(&rec_key, &raw)?;
      }
    }

    if let Some(url) = lookup("SUPABASE_URL") {
      self.datastore.url = Some(url);
    }
    if let Some(key) = lookup("SUPABASE_SERVICE_ROLE_KEY") {
      self.datastore.service_key = Some(key);
    }
    if let Some(key) = lookup("SUPABASE_ANON_KEY") {
      self.datastore.anon_key = Some(key);
    }
    Ok(())
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let sum = self.weights.sum();
    if sum != 100 {
      return Err(ConfigError::WeightSum { sum });
    }
    for (tier, level) in &self.levels {
      if level.cefr.is_empty() {
        warn!(target: "ibrani_dashboard", %tier, "Level has no CEFR labels; random prompt selection will match nothing");
      }
    }
    Ok(())
  }

  pub fn level(&self, tier: Difficulty) -> LevelSettings {
    self.levels.get(&tier).cloned().unwrap_or_default()
  }
}

fn parse_override(key: &str, raw: &str) -> Result<u32, ConfigError> {
  raw.trim().parse::<u32>().map_err(|_| ConfigError::InvalidOverride { key: key.to_string(), value: raw.to_string() })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |k: &str| map.get(k).cloned()
  }

  #[test]
  fn shipped_defaults_are_valid() {
    let cfg = AppConfig::default();
    assert_eq!(cfg.weights.sum(), 100);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.level(Difficulty::Hard).minimum_seconds, 30);
  }

  #[test]
  fn env_overrides_replace_weights_and_levels() {
    let mut cfg = AppConfig::default();
    cfg.apply_overrides(lookup_from(&[
      ("GRAMMAR_MORPHOLOGY_WEIGHT", "25"),
      ("PAUSE_PATTERNS_WEIGHT", "9"),
      ("LEVEL_MEDIUM", "A2.1, A2.2"),
      ("MIN_SECONDS_EASY", "45"),
      ("SUPABASE_URL", "https://db.example.com"),
      ("SUPABASE_ANON_KEY", "anon"),
    ]))
    .unwrap();

    assert_eq!(cfg.weights.get(Dimension::GrammarMorphology), 25);
    assert_eq!(cfg.weights.get(Dimension::PausePatterns), 9);
    assert_eq!(cfg.level(Difficulty::Medium).cefr, vec!["A2.1", "A2.2"]);
    assert_eq!(cfg.level(Difficulty::Easy).minimum_seconds, 45);
    assert_eq!(cfg.datastore.api_key(), Some("anon"));
    assert!(cfg.validate().is_ok());
  }

  #[test]
  fn weights_not_summing_to_100_fail_fast() {
    let mut cfg = AppConfig::default();
    cfg.apply_overrides(lookup_from(&[("TASK_COMPLETION_WEIGHT", "20")])).unwrap();
    match cfg.validate() {
      Err(ConfigError::WeightSum { sum }) => assert_eq!(sum, 106),
      other => panic!("expected weight sum error, got {other:?}"),
    }
  }

  #[test]
  fn unparsable_override_is_rejected() {
    let mut cfg = AppConfig::default();
    let err = cfg.apply_overrides(lookup_from(&[("SYNTAX_WORD_ORDER_WEIGHT", "fourteen")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidOverride { .. }));
  }

  #[test]
  fn toml_file_overrides_weights_and_levels() {
    let mut cfg = AppConfig::default();
    cfg
      .merge_toml(
        r#"
        [weights]
        grammar_morphology = 20
        vocabulary_sophistication = 20
        fluency_coherence = 20
        syntax_word_order = 15
        task_completion = 15
        pause_patterns = 10

        [levels.difficult]
        cefr = ["B2.1", "B2.2"]
        recommended_seconds = 60
        "#,
      )
      .unwrap();

    assert_eq!(cfg.weights.get(Dimension::FluencyCoherence), 20);
    let hard = cfg.level(Difficulty::Difficult);
    assert_eq!(hard.cefr, vec!["B2.1", "B2.2"]);
    assert_eq!(hard.recommended_seconds, 60);
    assert_eq!(hard.minimum_seconds, 30);
    assert!(cfg.validate().is_ok());
  }
}
