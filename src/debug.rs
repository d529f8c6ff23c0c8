//! Diagnostics behind `/debug` and `/debug-data`.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::config::AppConfig;
use crate::dashboard::day_key;
use crate::domain::Assessment;
use crate::error::DbError;
use crate::store::Store;

const SAMPLE_ROWS: usize = 5;
const SAMPLE_SESSIONS: usize = 10;
const ID_PREFIX: usize = 8;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvFlags {
  pub has_supabase_url: bool,
  pub has_service_key: bool,
  pub has_anon_key: bool,
  pub datastore_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRow {
  pub id: String,
  pub session_id: Option<String>,
  pub status: Option<String>,
  pub created_at: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
  pub timestamp: String,
  pub env: EnvFlags,
  pub connection_ok: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub connection_error: Option<String>,
  pub sample_count: usize,
  pub sample: Vec<SampleRow>,
}

/// Row counts for one UTC day.
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayAnalysis {
  pub total_rows: usize,
  pub unique_sessions: usize,
  /// Sessions that appear on more than one row.
  pub duplicate_sessions: usize,
  pub unique_ips: usize,
  pub unique_user_agents: usize,
  pub status_breakdown: BTreeMap<String, usize>,
  pub session_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugDataReport {
  pub today: String,
  pub yesterday: String,
  pub today_analysis: DayAnalysis,
  pub yesterday_analysis: DayAnalysis,
}

/// First eight characters of an id, for display.
pub fn short_id(id: &str) -> String {
  let mut out: String = id.chars().take(ID_PREFIX).collect();
  if id.chars().count() > ID_PREFIX {
    out.push('…');
  }
  out
}

/// Log-safe truncation for large strings.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    return s.to_string();
  }
  let head: String = s.chars().take(max).collect();
  format!("{head}… ({} bytes total)", s.len())
}

pub fn analyze_day(rows: &[Assessment]) -> DayAnalysis {
  let mut per_session: HashMap<&str, usize> = HashMap::new();
  let mut ips = HashSet::new();
  let mut agents = HashSet::new();
  let mut statuses: BTreeMap<String, usize> = BTreeMap::new();

  for a in rows {
    if let Some(s) = a.session_id.as_deref() {
      *per_session.entry(s).or_default() += 1;
    }
    if let Some(ip) = a.ip_address.as_deref() {
      ips.insert(ip);
    }
    if let Some(ua) = a.user_agent.as_deref() {
      agents.insert(ua);
    }
    let status = a.status.map(|s| s.as_str()).unwrap_or("unknown");
    *statuses.entry(status.to_string()).or_default() += 1;
  }

  let mut session_ids: Vec<String> = per_session.keys().map(|s| short_id(s)).collect();
  session_ids.sort();
  session_ids.truncate(SAMPLE_SESSIONS);

  DayAnalysis {
    total_rows: rows.len(),
    unique_sessions: per_session.len(),
    duplicate_sessions: per_session.values().filter(|n| **n > 1).count(),
    unique_ips: ips.len(),
    unique_user_agents: agents.len(),
    status_breakdown: statuses,
    session_ids,
  }
}

fn env_flags(config: &AppConfig, store: Option<&Store>) -> EnvFlags {
  let ds = &config.datastore;
  EnvFlags {
    has_supabase_url: ds.url.is_some(),
    has_service_key: ds.service_key.is_some(),
    has_anon_key: ds.anon_key.is_some(),
    datastore_enabled: store.is_some(),
  }
}

#[instrument(level = "info", skip_all)]
pub async fn debug_snapshot(config: &AppConfig, store: Option<&Store>, now: DateTime<Utc>) -> DebugSnapshot {
  let env = env_flags(config, store);
  let result = match store {
    None => Err(DbError::Disabled),
    Some(store) => store.assessments_between("id,session_id,status,created_at", &day_key(now - Duration::days(7)), None).await,
  };

  match result {
    Ok(rows) => DebugSnapshot {
      timestamp: now.to_rfc3339(),
      env,
      connection_ok: true,
      connection_error: None,
      sample_count: rows.len(),
      sample: rows
        .into_iter()
        .rev()
        .take(SAMPLE_ROWS)
        .map(|a| SampleRow {
          id: short_id(&a.id),
          session_id: a.session_id.as_deref().map(short_id),
          status: a.status.map(|s| s.as_str().to_string()),
          created_at: a.created_at,
        })
        .collect(),
    },
    Err(e) => {
      warn!(target: "ibrani_dashboard", error = %trunc_for_log(&e.to_string(), 200), "Debug connection test failed");
      DebugSnapshot {
        timestamp: now.to_rfc3339(),
        env,
        connection_ok: false,
        connection_error: Some(e.to_string()),
        sample_count: 0,
        sample: Vec::new(),
      }
    }
  }
}

/// Today vs yesterday (UTC) over the raw assessment rows.
#[instrument(level = "info", skip(store))]
pub async fn debug_data(store: &Store, now: DateTime<Utc>) -> Result<DebugDataReport, DbError> {
  let today = day_key(now);
  let yesterday = day_key(now - Duration::days(1));
  let columns = "id,session_id,status,ip_address,user_agent,created_at";

  let today_rows = store.assessments_between(columns, &today, None).await?;
  let yesterday_rows = store.assessments_between(columns, &yesterday, Some(&today)).await?;

  Ok(DebugDataReport {
    today_analysis: analyze_day(&today_rows),
    yesterday_analysis: analyze_day(&yesterday_rows),
    today,
    yesterday,
  })
}
