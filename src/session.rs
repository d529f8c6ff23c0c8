//! Session aggregation: folds the four per-tier results of one session into a
//! single flat summary record.
//!
//! The aggregation is best-effort. Missing prompts, transcripts, scores or whole
//! tiers never fail the summary; they fall back to the constants below. Averages
//! always divide by `SESSION_TIER_COUNT`, not by the number of tiers that
//! actually reported a value.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use crate::domain::Difficulty;
use crate::scoring::{map_score_to_cefr, round_half_up, CefrBand, Dimension};

/// Value used for any absent numeric score.
pub const MISSING_SCORE: f64 = 0.0;
/// Value used for any absent prompt or audio path.
pub const MISSING_TEXT: &str = "";
/// Divisor of every session-level average.
pub const SESSION_TIER_COUNT: f64 = 4.0;

/// Tier-keyed map that keeps the insertion order of its source (a JSON object
/// or a datastore result set). Serialized as a JSON object.
#[derive(Clone, Debug, PartialEq)]
pub struct TierMap<T>(Vec<(Difficulty, T)>);

impl<T> Default for TierMap<T> {
  fn default() -> Self {
    Self(Vec::new())
  }
}

impl<T> TierMap<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert or replace; a replaced entry keeps its original position.
  pub fn insert(&mut self, tier: Difficulty, value: T) {
    match self.0.iter_mut().find(|(t, _)| *t == tier) {
      Some(slot) => slot.1 = value,
      None => self.0.push((tier, value)),
    }
  }

  pub fn get(&self, tier: Difficulty) -> Option<&T> {
    self.0.iter().find(|(t, _)| *t == tier).map(|(_, v)| v)
  }

  pub fn iter(&self) -> impl Iterator<Item = (Difficulty, &T)> {
    self.0.iter().map(|(t, v)| (*t, v))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl<T> FromIterator<(Difficulty, T)> for TierMap<T> {
  fn from_iter<I: IntoIterator<Item = (Difficulty, T)>>(iter: I) -> Self {
    let mut map = TierMap::new();
    for (tier, value) in iter {
      map.insert(tier, value);
    }
    map
  }
}

impl<T: Serialize> Serialize for TierMap<T> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.0.len()))?;
    for (tier, value) in &self.0 {
      map.serialize_entry(tier, value)?;
    }
    map.end()
  }
}

/// A `null` tier value reads as `T::default()`.
impl<'de, T: Deserialize<'de> + Default> Deserialize<'de> for TierMap<T> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct TierMapVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de> + Default> Visitor<'de> for TierMapVisitor<T> {
      type Value = TierMap<T>;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map keyed by difficulty tier")
      }

      fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = TierMap::new();
        while let Some((tier, value)) = access.next_entry::<Difficulty, Option<T>>()? {
          map.insert(tier, value.unwrap_or_default());
        }
        Ok(map)
      }
    }

    deserializer.deserialize_map(TierMapVisitor(PhantomData))
  }
}

/// Transcript statistics produced by the speech pipeline for one answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMetadata {
  #[serde(default)] pub text: Option<String>,
  #[serde(default)] pub total_words: Option<u32>,
  #[serde(default)] pub unique_words: Option<u32>,
  #[serde(default)] pub speaking_duration: Option<f64>,
  #[serde(default)] pub pause_count: Option<u32>,
  #[serde(default)] pub language: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")] pub words_per_minute: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")] pub pauses_per_minute: Option<f64>,
}

/// One evaluated dimension. Only `raw_score` is read; the rest is carried through.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionEvaluation {
  #[serde(default)]
  pub raw_score: Option<f64>,
  #[serde(flatten)]
  pub details: serde_json::Map<String, serde_json::Value>,
}

/// AI evaluation of one answer. Fluency is reported under `fluency_speaking_rate`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
  #[serde(default)] pub grammar_morphology: Option<DimensionEvaluation>,
  #[serde(default)] pub vocabulary_sophistication: Option<DimensionEvaluation>,
  #[serde(default)] pub syntax_word_order: Option<DimensionEvaluation>,
  #[serde(default)] pub task_completion: Option<DimensionEvaluation>,
  #[serde(default)] pub fluency_speaking_rate: Option<DimensionEvaluation>,
  #[serde(default)] pub pause_patterns: Option<DimensionEvaluation>,
  #[serde(default)] pub overall_assessment: Option<DimensionEvaluation>,
}

impl EvaluationResult {
  pub fn raw_score(&self, dimension: Dimension) -> Option<f64> {
    let entry = match dimension {
      Dimension::GrammarMorphology => &self.grammar_morphology,
      Dimension::VocabularySophistication => &self.vocabulary_sophistication,
      Dimension::SyntaxWordOrder => &self.syntax_word_order,
      Dimension::TaskCompletion => &self.task_completion,
      Dimension::FluencyCoherence => &self.fluency_speaking_rate,
      Dimension::PausePatterns => &self.pause_patterns,
    };
    entry.as_ref().and_then(|e| e.raw_score)
  }
}

/// The part of a per-tier weighted score the aggregator reads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallScoreRef {
  #[serde(default)]
  pub final_score: Option<f64>,
  #[serde(flatten)]
  pub details: serde_json::Map<String, serde_json::Value>,
}

/// Partial result of one tier; anything may be missing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelResult {
  #[serde(default)] pub prompt: Option<String>,
  #[serde(default)] pub audio_file_path: Option<String>,
  #[serde(default)] pub assessment_id: Option<String>,
  #[serde(default)] pub result: Option<TranscriptMetadata>,
  #[serde(default, rename = "evaluationResult")] pub evaluation_result: Option<EvaluationResult>,
  #[serde(default)] pub overall_score: Option<OverallScoreRef>,
}

impl LevelResult {
  fn raw_score(&self, dimension: Dimension) -> Option<f64> {
    self.evaluation_result.as_ref().and_then(|e| e.raw_score(dimension))
  }

  fn final_score(&self) -> Option<f64> {
    self.overall_score.as_ref().and_then(|o| o.final_score)
  }

  fn transcript<U>(&self, pick: impl Fn(&TranscriptMetadata) -> Option<U>) -> Option<U> {
    self.result.as_ref().and_then(pick)
  }
}

/// Localized improvement tip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImprovementTip {
  #[serde(default, skip_serializing_if = "Option::is_none")] pub en: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")] pub ar: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")] pub he: Option<String>,
}

/// Session-level record persisted for downstream consumers. Field names are a
/// stable contract, including the `cerf` spelling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
  pub session_id: String,
  pub prompts: TierMap<String>,
  pub transcripts: Vec<String>,
  pub improvement_tip: Option<ImprovementTip>,
  pub audio_durations: Vec<f64>,
  pub word_counts: Vec<u32>,
  pub unique_words: Vec<u32>,
  pub pause_counts: Vec<u32>,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub audio_links: TierMap<String>,
  pub language_detected: Vec<String>,

  pub grammar_morphology_raw_score: i64,
  pub grammar_morphology_cerf_score: CefrBand,
  pub vocabulary_sophistication_raw_score: i64,
  pub vocabulary_sophistication_cerf_score: CefrBand,
  pub syntax_word_order_raw_score: i64,
  pub syntax_word_order_cerf_score: CefrBand,
  pub task_completion_raw_score: i64,
  pub task_completion_cerf_score: CefrBand,
  pub fluency_coherence_raw_score: i64,
  pub fluency_coherence_cerf_score: CefrBand,
  pub pause_patterns_raw_score: i64,
  pub pause_patterns_cerf_score: CefrBand,
  pub final_score_raw_score: i64,
  pub final_score_cerf_score: CefrBand,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TierMap<String>, D::Error> {
  Ok(Option::<TierMap<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `round(sum / 4)` with absent values counted as zero.
/// Signed, so out-of-range inputs stay visible in the stored average.
fn session_average(values: impl Iterator<Item = Option<f64>>) -> i64 {
  let sum: f64 = values.map(|v| v.unwrap_or(MISSING_SCORE)).sum();
  round_half_up(sum / SESSION_TIER_COUNT) as i64
}

/// Band an average without failing. Out-of-range averages can only come from
/// out-of-range inputs; they are clamped for banding and reported.
fn band_of_average(field: &'static str, average: i64) -> CefrBand {
  match map_score_to_cefr(average as f64) {
    Ok(band) => band,
    Err(e) => {
      warn!(target: "scoring", field, average, error = %e, "Session average outside 0-100; clamping for banding");
      if average > 100 { CefrBand::C2 } else { CefrBand::A1_1 }
    }
  }
}

pub fn build_session_summary(
  levels: &TierMap<LevelResult>,
  improvement_tip: Option<ImprovementTip>,
  session_id: &str,
) -> SessionSummary {
  if levels.len() != Difficulty::ALL.len() {
    warn!(target: "scoring", %session_id, tiers = levels.len(), "Summarizing a session with missing tiers");
  }

  let prompts: TierMap<String> = levels
    .iter()
    .map(|(tier, r)| (tier, r.prompt.clone().unwrap_or_else(|| MISSING_TEXT.to_string())))
    .collect();
  let audio_links: TierMap<String> = levels
    .iter()
    .map(|(tier, r)| (tier, r.audio_file_path.clone().unwrap_or_else(|| MISSING_TEXT.to_string())))
    .collect();

  let transcripts = levels.iter().filter_map(|(_, r)| r.transcript(|m| m.text.clone())).collect();
  let audio_durations = levels.iter().filter_map(|(_, r)| r.transcript(|m| m.speaking_duration)).collect();
  let word_counts = levels.iter().filter_map(|(_, r)| r.transcript(|m| m.total_words)).collect();
  let unique_words = levels.iter().filter_map(|(_, r)| r.transcript(|m| m.unique_words)).collect();
  let pause_counts = levels.iter().filter_map(|(_, r)| r.transcript(|m| m.pause_count)).collect();
  let language_detected = levels.iter().filter_map(|(_, r)| r.transcript(|m| m.language.clone())).collect();

  let avg = |d: Dimension| session_average(levels.iter().map(|(_, r)| r.raw_score(d)));
  let grammar = avg(Dimension::GrammarMorphology);
  let vocabulary = avg(Dimension::VocabularySophistication);
  let syntax = avg(Dimension::SyntaxWordOrder);
  let task = avg(Dimension::TaskCompletion);
  let fluency = avg(Dimension::FluencyCoherence);
  let pauses = avg(Dimension::PausePatterns);
  let final_score = session_average(levels.iter().map(|(_, r)| r.final_score()));

  debug!(target: "scoring", %session_id, grammar, vocabulary, syntax, task, fluency, pauses, final_score, "Session averages");

  SessionSummary {
    session_id: session_id.to_string(),
    prompts,
    transcripts,
    improvement_tip,
    audio_durations,
    word_counts,
    unique_words,
    pause_counts,
    audio_links,
    language_detected,
    grammar_morphology_raw_score: grammar,
    grammar_morphology_cerf_score: band_of_average("grammar_morphology", grammar),
    vocabulary_sophistication_raw_score: vocabulary,
    vocabulary_sophistication_cerf_score: band_of_average("vocabulary_sophistication", vocabulary),
    syntax_word_order_raw_score: syntax,
    syntax_word_order_cerf_score: band_of_average("syntax_word_order", syntax),
    task_completion_raw_score: task,
    task_completion_cerf_score: band_of_average("task_completion", task),
    fluency_coherence_raw_score: fluency,
    fluency_coherence_cerf_score: band_of_average("fluency_coherence", fluency),
    pause_patterns_raw_score: pauses,
    pause_patterns_cerf_score: band_of_average("pause_patterns", pauses),
    final_score_raw_score: final_score,
    final_score_cerf_score: band_of_average("final_score", final_score),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn level(grammar: Option<f64>, final_score: Option<f64>) -> LevelResult {
    LevelResult {
      evaluation_result: Some(EvaluationResult {
        grammar_morphology: grammar.map(|s| DimensionEvaluation { raw_score: Some(s), ..Default::default() }),
        ..Default::default()
      }),
      overall_score: final_score.map(|s| OverallScoreRef { final_score: Some(s), ..Default::default() }),
      ..Default::default()
    }
  }

  #[test]
  fn averages_always_divide_by_four() {
    let levels: TierMap<LevelResult> = [
      (Difficulty::Easy, level(Some(80.0), Some(70.0))),
      (Difficulty::Medium, level(Some(80.0), None)),
      (Difficulty::Hard, level(None, None)),
      (Difficulty::Difficult, LevelResult::default()),
    ]
    .into_iter()
    .collect();

    let s = build_session_summary(&levels, None, "sess-1");
    assert_eq!(s.grammar_morphology_raw_score, 40);
    assert_eq!(s.grammar_morphology_cerf_score, CefrBand::A1_1);
    // round(70 / 4) = round(17.5) = 18
    assert_eq!(s.final_score_raw_score, 18);
    assert_eq!(s.vocabulary_sophistication_raw_score, 0);
    assert_eq!(s.vocabulary_sophistication_cerf_score, CefrBand::A1_1);
  }

  #[test]
  fn fewer_than_four_tiers_still_divide_by_four() {
    let levels: TierMap<LevelResult> = [(Difficulty::Easy, level(Some(100.0), Some(100.0)))].into_iter().collect();
    let s = build_session_summary(&levels, None, "sess-2");
    assert_eq!(s.grammar_morphology_raw_score, 25);
    assert_eq!(s.final_score_raw_score, 25);
  }

  #[test]
  fn full_session_from_json_keeps_input_order() {
    // Parsed from text so the object order is the wire order.
    let input = r#"{
      "hard": {
        "prompt": "Describe your city",
        "audio_file_path": "audio/hard.webm",
        "result": { "text": "שלום", "total_words": 40, "unique_words": 30, "speaking_duration": 31.5, "pause_count": 3, "language": "he" },
        "evaluationResult": {
          "grammar_morphology": { "raw_score": 82, "error_count": 1 },
          "vocabulary_sophistication": { "raw_score": 75 },
          "syntax_word_order": { "raw_score": 70 },
          "task_completion": { "raw_score": 90 },
          "fluency_speaking_rate": { "raw_score": 66, "wpm": 95 },
          "pause_patterns": { "raw_score": 60, "ppm": 4 }
        },
        "overall_score": { "final_score": 76, "final_score_cefr_level": "B2.2" }
      },
      "easy": {
        "prompt": "Introduce yourself",
        "result": { "text": "אני", "total_words": 12, "speaking_duration": 20.0, "language": "he" },
        "evaluationResult": {
          "grammar_morphology": { "raw_score": 90 },
          "vocabulary_sophistication": { "raw_score": 85 },
          "syntax_word_order": { "raw_score": 80 },
          "task_completion": { "raw_score": 100 },
          "fluency_speaking_rate": { "raw_score": 70 },
          "pause_patterns": { "raw_score": 64 }
        },
        "overall_score": { "final_score": 84 }
      },
      "medium": {},
      "difficult": { "prompt": null }
    }"#;

    let levels: TierMap<LevelResult> = serde_json::from_str(input).unwrap();
    let tip = ImprovementTip { en: Some("Use more connectors".into()), ..Default::default() };
    let s = build_session_summary(&levels, Some(tip), "sess-3");

    assert_eq!(s.transcripts, vec!["שלום", "אני"]);
    assert_eq!(s.word_counts, vec![40, 12]);
    assert_eq!(s.unique_words, vec![30]);
    assert_eq!(s.pause_counts, vec![3]);
    assert_eq!(s.audio_durations, vec![31.5, 20.0]);
    assert_eq!(s.language_detected, vec!["he", "he"]);

    // (82 + 90) / 4 = 43
    assert_eq!(s.grammar_morphology_raw_score, 43);
    // (66 + 70) / 4 = 34
    assert_eq!(s.fluency_coherence_raw_score, 34);
    // (90 + 100) / 4 = 47.5 -> 48
    assert_eq!(s.task_completion_raw_score, 48);
    assert_eq!(s.task_completion_cerf_score, CefrBand::A1_2);
    // (76 + 84) / 4 = 40
    assert_eq!(s.final_score_raw_score, 40);

    let out = serde_json::to_value(&s).unwrap();
    let prompt_keys: Vec<&String> = out["prompts"].as_object().unwrap().keys().collect();
    assert_eq!(prompt_keys.len(), 4);
    assert_eq!(out["prompts"]["hard"], "Describe your city");
    assert_eq!(out["prompts"]["medium"], "");
    assert_eq!(out["prompts"]["difficult"], "");
    assert_eq!(out["audio_links"]["easy"], "");
    assert_eq!(out["audio_links"]["hard"], "audio/hard.webm");
    assert_eq!(out["task_completion_cerf_score"], "A1.2");
    assert_eq!(out["improvement_tip"]["en"], "Use more connectors");
  }

  #[test]
  fn tier_map_serializes_in_insertion_order() {
    let map: TierMap<String> = [(Difficulty::Difficult, "d".to_string()), (Difficulty::Easy, "e".to_string())]
      .into_iter()
      .collect();
    assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"difficult":"d","easy":"e"}"#);
    let back: TierMap<String> = serde_json::from_str(r#"{"medium":"m","easy":"e"}"#).unwrap();
    let order: Vec<Difficulty> = back.iter().map(|(t, _)| t).collect();
    assert_eq!(order, vec![Difficulty::Medium, Difficulty::Easy]);
  }

  #[test]
  fn out_of_range_inputs_never_fail_the_summary() {
    let levels: TierMap<LevelResult> = [
      (Difficulty::Easy, level(Some(400.0), None)),
      (Difficulty::Medium, level(Some(400.0), None)),
    ]
    .into_iter()
    .collect();
    let s = build_session_summary(&levels, None, "sess-4");
    assert_eq!(s.grammar_morphology_raw_score, 200);
    assert_eq!(s.grammar_morphology_cerf_score, CefrBand::C2);
  }

  #[test]
  fn negative_averages_are_kept_and_banded_lowest() {
    let levels: TierMap<LevelResult> = [
      (Difficulty::Easy, level(Some(-40.0), Some(-40.0))),
      (Difficulty::Medium, level(Some(-40.0), None)),
    ]
    .into_iter()
    .collect();
    let s = build_session_summary(&levels, None, "sess-5");
    assert_eq!(s.grammar_morphology_raw_score, -20);
    assert_eq!(s.grammar_morphology_cerf_score, CefrBand::A1_1);
    // round(-10) stays -10
    assert_eq!(s.final_score_raw_score, -10);
  }

  #[test]
  fn null_tier_reads_as_empty_result() {
    let input = r#"{
      "easy": { "evaluationResult": { "grammar_morphology": { "raw_score": 80 } }, "overall_score": { "final_score": 60 } },
      "medium": null,
      "hard": { "evaluationResult": { "grammar_morphology": { "raw_score": 80 } } },
      "difficult": {}
    }"#;
    let levels: TierMap<LevelResult> = serde_json::from_str(input).unwrap();
    assert_eq!(levels.len(), 4);
    assert_eq!(levels.get(Difficulty::Medium), Some(&LevelResult::default()));

    let s = build_session_summary(&levels, None, "sess-6");
    assert_eq!(s.grammar_morphology_raw_score, 40);
    assert_eq!(s.final_score_raw_score, 15);
    assert_eq!(s.prompts.get(Difficulty::Medium).map(String::as_str), Some(""));
  }

  #[test]
  fn stored_summary_with_null_audio_links_decodes() {
    let levels: TierMap<LevelResult> = [(Difficulty::Easy, level(Some(60.0), Some(60.0)))].into_iter().collect();
    let mut row = serde_json::to_value(build_session_summary(&levels, None, "sess-7")).unwrap();
    row["audio_links"] = serde_json::Value::Null;

    let back: SessionSummary = serde_json::from_value(row.clone()).unwrap();
    assert!(back.audio_links.is_empty());
    assert_eq!(back.final_score_raw_score, 15);

    row.as_object_mut().unwrap().remove("audio_links");
    let missing: SessionSummary = serde_json::from_value(row).unwrap();
    assert!(missing.audio_links.is_empty());
  }
}
