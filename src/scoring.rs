//! CEFR mapping and weighted scoring of the six evaluated speaking dimensions.
//!
//! - `map_score_to_cefr` is strict: anything outside [0, 100] is rejected.
//! - `calculate_overall_score` folds six raw scores into one weighted composite.
//! - `weighted_score_for_dimension` is lenient: a parameter without a weight
//!   yields a zero score labelled "N/A" instead of an error.
//!
//! All functions are pure; weights are passed in explicitly.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use tracing::error;

use crate::config::Weights;
use crate::domain::AiParameter;
use crate::error::ScoreError;

/// Label reported when a parameter has no configured weight.
pub const NOT_AVAILABLE: &str = "N/A";

/// CEFR proficiency band, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CefrBand {
  #[serde(rename = "A1.1")] A1_1,
  #[serde(rename = "A1.2")] A1_2,
  #[serde(rename = "A2.1")] A2_1,
  #[serde(rename = "A2.2")] A2_2,
  #[serde(rename = "B1.1")] B1_1,
  #[serde(rename = "B1.2")] B1_2,
  #[serde(rename = "B2.1")] B2_1,
  #[serde(rename = "B2.2")] B2_2,
  C1,
  C2,
}

impl CefrBand {
  pub fn as_str(&self) -> &'static str {
    match self {
      CefrBand::A1_1 => "A1.1",
      CefrBand::A1_2 => "A1.2",
      CefrBand::A2_1 => "A2.1",
      CefrBand::A2_2 => "A2.2",
      CefrBand::B1_1 => "B1.1",
      CefrBand::B1_2 => "B1.2",
      CefrBand::B2_1 => "B2.1",
      CefrBand::B2_2 => "B2.2",
      CefrBand::C1 => "C1",
      CefrBand::C2 => "C2",
    }
  }
}

impl fmt::Display for CefrBand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Exclusive upper bounds of every band below C2.
const BAND_LADDER: [(f64, CefrBand); 9] = [
  (45.0, CefrBand::A1_1),
  (50.0, CefrBand::A1_2),
  (55.0, CefrBand::A2_1),
  (60.0, CefrBand::A2_2),
  (65.0, CefrBand::B1_1),
  (70.0, CefrBand::B1_2),
  (75.0, CefrBand::B2_1),
  (80.0, CefrBand::B2_2),
  (90.0, CefrBand::C1),
];

pub fn map_score_to_cefr(score: f64) -> Result<CefrBand, ScoreError> {
  if !(0.0..=100.0).contains(&score) {
    return Err(ScoreError::InvalidScoreRange { score });
  }
  Ok(
    BAND_LADDER
      .iter()
      .find(|(upper, _)| score < *upper)
      .map(|(_, band)| *band)
      .unwrap_or(CefrBand::C2),
  )
}

/// One of the six weighted scoring dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
  GrammarMorphology,
  VocabularySophistication,
  FluencyCoherence,
  SyntaxWordOrder,
  PausePatterns,
  TaskCompletion,
}

impl Dimension {
  /// Summation order of the composite score.
  pub const ALL: [Dimension; 6] = [
    Dimension::GrammarMorphology,
    Dimension::VocabularySophistication,
    Dimension::FluencyCoherence,
    Dimension::SyntaxWordOrder,
    Dimension::PausePatterns,
    Dimension::TaskCompletion,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Dimension::GrammarMorphology => "grammar_morphology",
      Dimension::VocabularySophistication => "vocabulary_sophistication",
      Dimension::FluencyCoherence => "fluency_coherence",
      Dimension::SyntaxWordOrder => "syntax_word_order",
      Dimension::PausePatterns => "pause_patterns",
      Dimension::TaskCompletion => "task_completion",
    }
  }

  /// `None` for parameters that are recorded but never weighted.
  pub fn from_parameter(p: AiParameter) -> Option<Self> {
    match p {
      AiParameter::GrammarMorphology => Some(Dimension::GrammarMorphology),
      AiParameter::VocabularySophistication => Some(Dimension::VocabularySophistication),
      AiParameter::FluencyCoherence => Some(Dimension::FluencyCoherence),
      AiParameter::SyntaxWordOrder => Some(Dimension::SyntaxWordOrder),
      AiParameter::PausePatterns => Some(Dimension::PausePatterns),
      AiParameter::TaskCompletion => Some(Dimension::TaskCompletion),
      AiParameter::OverallProficiency => None,
    }
  }
}

/// One value per scoring dimension, serialized with the dimension names as keys.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions<T> {
  pub grammar_morphology: T,
  pub vocabulary_sophistication: T,
  pub fluency_coherence: T,
  pub syntax_word_order: T,
  pub pause_patterns: T,
  pub task_completion: T,
}

impl<T> Dimensions<T> {
  pub fn get(&self, d: Dimension) -> &T {
    match d {
      Dimension::GrammarMorphology => &self.grammar_morphology,
      Dimension::VocabularySophistication => &self.vocabulary_sophistication,
      Dimension::FluencyCoherence => &self.fluency_coherence,
      Dimension::SyntaxWordOrder => &self.syntax_word_order,
      Dimension::PausePatterns => &self.pause_patterns,
      Dimension::TaskCompletion => &self.task_completion,
    }
  }

  pub fn get_mut(&mut self, d: Dimension) -> &mut T {
    match d {
      Dimension::GrammarMorphology => &mut self.grammar_morphology,
      Dimension::VocabularySophistication => &mut self.vocabulary_sophistication,
      Dimension::FluencyCoherence => &mut self.fluency_coherence,
      Dimension::SyntaxWordOrder => &mut self.syntax_word_order,
      Dimension::PausePatterns => &mut self.pause_patterns,
      Dimension::TaskCompletion => &mut self.task_completion,
    }
  }

  pub fn from_fn(mut f: impl FnMut(Dimension) -> T) -> Self {
    Dimensions {
      grammar_morphology: f(Dimension::GrammarMorphology),
      vocabulary_sophistication: f(Dimension::VocabularySophistication),
      fluency_coherence: f(Dimension::FluencyCoherence),
      syntax_word_order: f(Dimension::SyntaxWordOrder),
      pause_patterns: f(Dimension::PausePatterns),
      task_completion: f(Dimension::TaskCompletion),
    }
  }

  /// Build a value for every dimension, stopping at the first error.
  pub fn try_from_fn<E>(mut f: impl FnMut(Dimension) -> Result<T, E>) -> Result<Self, E> {
    Ok(Dimensions {
      grammar_morphology: f(Dimension::GrammarMorphology)?,
      vocabulary_sophistication: f(Dimension::VocabularySophistication)?,
      fluency_coherence: f(Dimension::FluencyCoherence)?,
      syntax_word_order: f(Dimension::SyntaxWordOrder)?,
      pause_patterns: f(Dimension::PausePatterns)?,
      task_completion: f(Dimension::TaskCompletion)?,
    })
  }
}

/// Result of `calculate_overall_score`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WeightedScores {
  pub final_score: u32,
  pub final_score_cefr_level: CefrBand,
  pub weighted_components: Dimensions<f64>,
  /// Bands of the raw (unweighted) inputs.
  pub raw_score_cefr_levels: Dimensions<CefrBand>,
}

pub fn calculate_overall_score(weights: &Weights, input: &Dimensions<f64>) -> Result<WeightedScores, ScoreError> {
  let weighted_components = Dimensions::from_fn(|d| input.get(d) * (f64::from(weights.get(d)) / 100.0));

  let sum: f64 = Dimension::ALL.iter().map(|d| *weighted_components.get(*d)).sum();
  let final_score = round_score(sum);

  let raw_score_cefr_levels = Dimensions::try_from_fn(|d| map_score_to_cefr(*input.get(d)))?;

  Ok(WeightedScores {
    final_score_cefr_level: map_score_to_cefr(f64::from(final_score))?,
    final_score,
    weighted_components,
    raw_score_cefr_levels,
  })
}

/// Weighted contribution of one parameter plus the band of its raw score.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DimensionScore {
  pub weighted_score: f64,
  /// `None` when the parameter has no weight; serialized as "N/A".
  #[serde(serialize_with = "serialize_band_or_na")]
  pub raw_score_cefr_level: Option<CefrBand>,
}

impl DimensionScore {
  pub fn not_available() -> Self {
    Self { weighted_score: 0.0, raw_score_cefr_level: None }
  }

  pub fn label(&self) -> &'static str {
    self.raw_score_cefr_level.map(|b| b.as_str()).unwrap_or(NOT_AVAILABLE)
  }
}

fn serialize_band_or_na<S: Serializer>(band: &Option<CefrBand>, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_str(band.map(|b| b.as_str()).unwrap_or(NOT_AVAILABLE))
}

pub fn weighted_score_for_dimension(
  weights: &Weights,
  parameter: AiParameter,
  raw_score: f64,
) -> Result<DimensionScore, ScoreError> {
  let Some(dimension) = Dimension::from_parameter(parameter) else {
    error!(target: "scoring", parameter = parameter.as_str(), "No weight defined for parameter");
    return Ok(DimensionScore::not_available());
  };

  let weight = f64::from(weights.get(dimension));
  Ok(DimensionScore {
    weighted_score: raw_score * (weight / 100.0),
    raw_score_cefr_level: Some(map_score_to_cefr(raw_score)?),
  })
}

/// Round half up (`-2.5` goes to `-2`).
pub fn round_half_up(value: f64) -> f64 {
  (value + 0.5).floor()
}

/// Round half up to an integer score. Inputs are non-negative sums of in-range values.
pub fn round_score(value: f64) -> u32 {
  round_half_up(value).max(0.0) as u32
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  fn sample_input() -> Dimensions<f64> {
    Dimensions {
      grammar_morphology: 80.0,
      vocabulary_sophistication: 70.0,
      fluency_coherence: 60.0,
      syntax_word_order: 90.0,
      pause_patterns: 40.0,
      task_completion: 50.0,
    }
  }

  #[test]
  fn band_boundaries() {
    assert_eq!(map_score_to_cefr(0.0).unwrap(), CefrBand::A1_1);
    assert_eq!(map_score_to_cefr(44.9).unwrap(), CefrBand::A1_1);
    assert_eq!(map_score_to_cefr(45.0).unwrap(), CefrBand::A1_2);
    assert_eq!(map_score_to_cefr(59.99).unwrap(), CefrBand::A2_2);
    assert_eq!(map_score_to_cefr(79.0).unwrap(), CefrBand::B2_2);
    assert_eq!(map_score_to_cefr(80.0).unwrap(), CefrBand::C1);
    assert_eq!(map_score_to_cefr(89.9).unwrap(), CefrBand::C1);
    assert_eq!(map_score_to_cefr(90.0).unwrap(), CefrBand::C2);
    assert_eq!(map_score_to_cefr(100.0).unwrap(), CefrBand::C2);
  }

  #[test]
  fn out_of_range_scores_are_rejected() {
    for bad in [-1.0, 100.01, 101.0, f64::NAN, f64::INFINITY] {
      assert!(
        matches!(map_score_to_cefr(bad), Err(ScoreError::InvalidScoreRange { .. })),
        "{bad} should be rejected"
      );
    }
  }

  #[test]
  fn bands_serialize_with_dotted_labels() {
    assert_eq!(serde_json::to_string(&CefrBand::B1_2).unwrap(), "\"B1.2\"");
    assert_eq!(serde_json::to_string(&CefrBand::C1).unwrap(), "\"C1\"");
    let parsed: CefrBand = serde_json::from_str("\"A2.1\"").unwrap();
    assert_eq!(parsed, CefrBand::A2_1);
  }

  #[test]
  fn overall_score_with_default_weights() {
    let scores = calculate_overall_score(&Weights::default(), &sample_input()).unwrap();
    // 18.4 + 14.7 + 10.2 + 12.6 + 4.4 + 7 = 67.3
    assert_eq!(scores.final_score, 67);
    assert_eq!(scores.final_score_cefr_level, CefrBand::B1_2);
    assert!((scores.weighted_components.grammar_morphology - 18.4).abs() < 1e-9);
    assert!((scores.weighted_components.pause_patterns - 4.4).abs() < 1e-9);
    assert_eq!(scores.raw_score_cefr_levels.syntax_word_order, CefrBand::C2);
    assert_eq!(scores.raw_score_cefr_levels.pause_patterns, CefrBand::A1_1);
    assert_eq!(scores.raw_score_cefr_levels.fluency_coherence, CefrBand::B1_1);
  }

  #[test]
  fn overall_score_rejects_out_of_range_dimension() {
    let mut input = sample_input();
    input.task_completion = 120.0;
    assert!(calculate_overall_score(&Weights::default(), &input).is_err());
  }

  #[test]
  fn overall_score_serializes_with_dimension_keys() {
    let scores = calculate_overall_score(&Weights::default(), &sample_input()).unwrap();
    let v = serde_json::to_value(&scores).unwrap();
    assert_eq!(v["final_score"], 67);
    assert_eq!(v["final_score_cefr_level"], "B1.2");
    assert_eq!(v["raw_score_cefr_levels"]["grammar_morphology"], "C1");
  }

  #[test]
  fn single_dimension_uses_configured_weight() {
    let s = weighted_score_for_dimension(&Weights::default(), AiParameter::VocabularySophistication, 70.0).unwrap();
    assert!((s.weighted_score - 14.7).abs() < 1e-9);
    assert_eq!(s.raw_score_cefr_level, Some(CefrBand::B2_1));
  }

  #[test]
  fn unweighted_parameter_degrades_to_not_available() {
    let s = weighted_score_for_dimension(&Weights::default(), AiParameter::OverallProficiency, 85.0).unwrap();
    assert_eq!(s, DimensionScore::not_available());
    assert_eq!(s.label(), NOT_AVAILABLE);
    let v = serde_json::to_value(&s).unwrap();
    assert_eq!(v["raw_score_cefr_level"], "N/A");
    assert_eq!(v["weighted_score"], 0.0);
  }

  #[test]
  fn rounding_is_half_up() {
    assert_eq!(round_score(67.5), 68);
    assert_eq!(round_score(67.49), 67);
    assert_eq!(round_score(0.0), 0);
    assert_eq!(round_half_up(-2.5), -2.0);
    assert_eq!(round_half_up(-20.0), -20.0);
  }

  proptest! {
    #[test]
    fn mapper_is_monotonic(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
      let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
      prop_assert!(map_score_to_cefr(lo).unwrap() <= map_score_to_cefr(hi).unwrap());
    }

    #[test]
    fn mapper_rejects_outside_domain(s in prop_oneof![-1.0e6f64..-1.0e-9, 100.000001f64..1.0e6]) {
      prop_assert!(map_score_to_cefr(s).is_err());
    }

    #[test]
    fn composite_matches_weighted_sum(
      g in 0.0f64..=100.0, v in 0.0f64..=100.0, f in 0.0f64..=100.0,
      s in 0.0f64..=100.0, p in 0.0f64..=100.0, t in 0.0f64..=100.0,
    ) {
      let input = Dimensions {
        grammar_morphology: g, vocabulary_sophistication: v, fluency_coherence: f,
        syntax_word_order: s, pause_patterns: p, task_completion: t,
      };
      let scores = calculate_overall_score(&Weights::default(), &input).unwrap();
      let expected = g * 0.23 + v * 0.21 + f * 0.17 + s * 0.14 + p * 0.11 + t * 0.14;
      prop_assert!((f64::from(scores.final_score) - expected).abs() <= 0.5 + 1e-9);
      // Banding the composite directly gives the same band.
      prop_assert_eq!(scores.final_score_cefr_level, map_score_to_cefr(f64::from(scores.final_score)).unwrap());
    }

    #[test]
    fn raising_a_weight_never_lowers_the_composite(g in 0.0f64..=100.0, t in 0.0f64..=100.0) {
      let input = Dimensions { grammar_morphology: g, task_completion: t, ..sample_input() };
      let base = Weights::default();
      let mut heavier = base.clone();
      heavier.0.grammar_morphology += 5;
      heavier.0.task_completion -= 5;
      let before = calculate_overall_score(&base, &input).unwrap().final_score;
      let after = calculate_overall_score(&heavier, &input).unwrap().final_score;
      if g > t + 1e-6 {
        prop_assert!(after >= before);
      } else if g < t - 1e-6 {
        prop_assert!(after <= before);
      }
    }
  }
}
