//! Public HTTP request/response DTOs (serde ready).
//! Kept separate from the domain records so the wire shape can evolve on its own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::LevelSettings;
use crate::domain::{Assessment, AssessmentResult, Difficulty, ParameterScore, UserQuestion};
use crate::scoring::CefrBand;
use crate::session::{ImprovementTip, LevelResult, TierMap};

/// Threshold used by the stuck-assessment cleanup when none is given.
pub const DEFAULT_STUCK_HOURS: u32 = 2;

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct CefrQuery {
    pub score: f64,
}
#[derive(Serialize)]
pub struct CefrOut {
    pub score: f64,
    pub cefr_level: CefrBand,
}

/// Single-dimension request. `dimension` is a parameter name; names without a
/// weight (or unknown names) yield an "N/A" result instead of an error.
#[derive(Debug, Deserialize)]
pub struct DimensionIn {
    pub dimension: String,
    pub raw_score: f64,
}

#[derive(Debug, Deserialize)]
pub struct SessionSummaryIn {
    pub session_id: String,
    pub assessments: TierMap<LevelResult>,
    #[serde(default)]
    pub improvement_tip: Option<ImprovementTip>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AggregateIn {
    #[serde(default)]
    pub improvement_tip: Option<ImprovementTip>,
}

#[derive(Debug, Deserialize)]
pub struct RandomPromptQuery {
    pub difficulty: Difficulty,
    /// Comma-separated prompt ids to skip, e.g. `3,17`.
    #[serde(default)]
    pub exclude: Option<String>,
}
#[derive(Serialize)]
pub struct RandomPromptOut {
    pub difficulty: Difficulty,
    pub minimum_seconds: u32,
    pub recommended_seconds: u32,
    pub prompt: UserQuestion,
}

#[derive(Debug, Default, Deserialize)]
pub struct StuckQuery {
    #[serde(default)]
    pub hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ParameterScoresQuery {
    /// Comma-separated assessment ids.
    pub assessment_ids: String,
}

#[derive(Serialize)]
pub struct AssessmentDetailOut {
    pub assessment: Assessment,
    pub parameter_scores: Vec<ParameterScore>,
    pub result: Option<AssessmentResult>,
    pub has_valid_transcript: bool,
}

#[derive(Serialize)]
pub struct LevelsOut {
    pub levels: BTreeMap<Difficulty, LevelSettings>,
}

#[derive(Serialize)]
pub struct DeletedOut {
    pub deleted: bool,
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parse `exclude=1,2,3`; the error is the first entry that is not an id.
pub fn parse_exclude_ids(raw: Option<&str>) -> Result<Vec<i64>, String> {
    let Some(raw) = raw else { return Ok(Vec::new()) };
    split_list(raw).map(|s| s.parse::<i64>().map_err(|_| s.to_string())).collect()
}
