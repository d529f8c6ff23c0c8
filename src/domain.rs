//! Domain enums and records shared by the scoring core and the datastore layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Difficulty tier of one question in a session. A full session has one answer per tier.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
  Difficult,
}

impl Difficulty {
  pub const ALL: [Difficulty; 4] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard, Difficulty::Difficult];

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
      Difficulty::Difficult => "difficult",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|d| d.as_str() == s)
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
  InProgress,
  Processing,
  Completed,
  Failed,
  Cancelled,
}

impl AssessmentStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      AssessmentStatus::InProgress => "in_progress",
      AssessmentStatus::Processing => "processing",
      AssessmentStatus::Completed => "completed",
      AssessmentStatus::Failed => "failed",
      AssessmentStatus::Cancelled => "cancelled",
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  InProgress,
  ReadyForAggregation,
  Completed,
  Failed,
}

/// Every AI evaluation parameter the platform records. Only six of them carry a weight.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AiParameter {
  GrammarMorphology,
  VocabularySophistication,
  SyntaxWordOrder,
  TaskCompletion,
  OverallProficiency,
  FluencyCoherence,
  PausePatterns,
}

impl AiParameter {
  pub const ALL: [AiParameter; 7] = [
    AiParameter::GrammarMorphology,
    AiParameter::VocabularySophistication,
    AiParameter::SyntaxWordOrder,
    AiParameter::TaskCompletion,
    AiParameter::OverallProficiency,
    AiParameter::FluencyCoherence,
    AiParameter::PausePatterns,
  ];

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|p| p.as_str() == s)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      AiParameter::GrammarMorphology => "grammar_morphology",
      AiParameter::VocabularySophistication => "vocabulary_sophistication",
      AiParameter::SyntaxWordOrder => "syntax_word_order",
      AiParameter::TaskCompletion => "task_completion",
      AiParameter::OverallProficiency => "overall_proficiency",
      AiParameter::FluencyCoherence => "fluency_coherence",
      AiParameter::PausePatterns => "pause_patterns",
    }
  }
}

/// Assessment row (one answered question).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Assessment {
  #[serde(default)] pub id: String,
  #[serde(default)] pub session_id: Option<String>,
  #[serde(default)] pub created_at: Option<String>,
  #[serde(default)] pub updated_at: Option<String>,
  #[serde(default)] pub status: Option<AssessmentStatus>,
  #[serde(default)] pub user_agent: Option<String>,
  #[serde(default)] pub ip_address: Option<String>,
  #[serde(default)] pub audio_file_path: Option<String>,
  #[serde(default)] pub audio_duration_seconds: Option<f64>,
  #[serde(default)] pub transcript: Option<String>,
  #[serde(default)] pub transcription_language_detected: Option<String>,
  #[serde(default)] pub prompt_id: Option<i64>,
  #[serde(default)] pub prompt: Option<String>,
  #[serde(default)] pub total_processing_seconds: Option<f64>,
  #[serde(default)] pub question_sequence: Option<i32>,
  #[serde(default)] pub difficulty_level: Option<String>,
  #[serde(default)] pub session_status: Option<String>,
}

/// Session row tracking progress across the four questions.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct V3Session {
  #[serde(default)] pub session_id: String,
  #[serde(default)] pub user_test_code: String,
  #[serde(default)] pub created_at: Option<String>,
  #[serde(default)] pub total_questions: Option<u32>,
  #[serde(default)] pub completed_questions: Option<u32>,
  #[serde(default)] pub failed_questions: Option<u32>,
  #[serde(default)] pub processing_questions: Option<u32>,
  #[serde(default)] pub status: Option<SessionStatus>,
  #[serde(default)] pub last_activity: Option<String>,
  #[serde(default)] pub can_aggregate: Option<bool>,
  #[serde(default)] pub cefr_display_hidden: Option<bool>,
}

/// Partial update for a session row; `None` fields are left untouched.
#[derive(Clone, Debug, Serialize, Default)]
pub struct V3SessionPatch {
  #[serde(skip_serializing_if = "Option::is_none")] pub completed_questions: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")] pub failed_questions: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")] pub processing_questions: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")] pub status: Option<SessionStatus>,
  #[serde(skip_serializing_if = "Option::is_none")] pub can_aggregate: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")] pub cefr_display_hidden: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterScore {
  pub id: String,
  #[serde(default)] pub assessment_id: Option<String>,
  pub parameter_type: String,
  pub raw_score: f64,
  pub cefr_level: String,
  pub weight_percentage: f64,
  #[serde(default)] pub calculation_method: Option<String>,
  #[serde(default)] pub evidence_summary: Option<String>,
  #[serde(default)] pub algorithm_version: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssessmentResult {
  pub assessment_id: String,
  pub overall_raw_score: f64,
  pub overall_cefr_level: String,
  #[serde(default)] pub parameter_weights: serde_json::Value,
  #[serde(default)] pub calculation_details: serde_json::Value,
  #[serde(default)] pub next_level_requirements: Option<String>,
  #[serde(default)] pub algorithm_version: Option<String>,
  #[serde(default)] pub manual_review_required: Option<bool>,
}

/// Prompt bank entry in three languages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserQuestion {
  pub id: i64,
  pub level: String,
  #[serde(default)] pub prompt_ar: String,
  #[serde(default)] pub prompt_he: String,
  #[serde(default)] pub prompt_en: String,
}
