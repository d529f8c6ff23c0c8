//! Dashboard metrics over the assessment log.
//!
//! Reads are plain range queries; all aggregation (distinct sessions, success
//! rate, mean/median processing time, per-day trends) happens here in pure
//! functions so it can be tested without a datastore. Datastore failures are
//! logged and reported as zeroed metrics / empty trends.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::domain::{Assessment, AssessmentStatus};
use crate::error::DbError;
use crate::store::Store;

/// Hour of day the dashboard week starts on Saturday.
const WEEK_START_HOUR: u32 = 8;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
  /// Distinct sessions since the start of the dashboard week.
  pub total_assessments: usize,
  /// Distinct sessions since midnight (UTC).
  pub today_assessments: usize,
  pub success_rate: f64,
  pub avg_processing_time: f64,
  pub median_processing_time: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyTrend {
  pub date: String,
  pub assessments: usize,
  pub completed: usize,
}

/// Last Saturday 08:00 UTC; today 08:00 when today is Saturday.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
  let days_back = match now.weekday().num_days_from_sunday() {
    6 => 0,
    d => i64::from(d) + 1,
  };
  let day = now.date_naive() - Duration::days(days_back);
  let time = NaiveTime::from_hms_opt(WEEK_START_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
  Utc.from_utc_datetime(&day.and_time(time))
}

/// `YYYY-MM-DD` of `now` in UTC.
pub fn day_key(now: DateTime<Utc>) -> String {
  now.format("%Y-%m-%d").to_string()
}

pub fn round1(value: f64) -> f64 {
  (value * 10.0).round() / 10.0
}

pub fn mean(values: &[f64]) -> f64 {
  if values.is_empty() {
    return 0.0;
  }
  values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
  if values.is_empty() {
    return 0.0;
  }
  let mut sorted = values.to_vec();
  sorted.sort_by(|a, b| a.total_cmp(b));
  let mid = sorted.len() / 2;
  if sorted.len() % 2 == 0 {
    (sorted[mid - 1] + sorted[mid]) / 2.0
  } else {
    sorted[mid]
  }
}

/// Rows without a session id count together as one session.
pub fn distinct_sessions<'a>(rows: impl IntoIterator<Item = &'a Assessment>) -> usize {
  rows.into_iter().map(|a| a.session_id.as_deref()).collect::<HashSet<_>>().len()
}

fn is_completed(a: &Assessment) -> bool {
  a.status == Some(AssessmentStatus::Completed)
}

/// Fold the week's rows and today's rows into the metrics record.
pub fn summarize(week: &[Assessment], today: &[Assessment]) -> DashboardMetrics {
  let total = distinct_sessions(week);
  let completed = distinct_sessions(week.iter().filter(|a| is_completed(a)));
  let processing: Vec<f64> = week.iter().filter_map(|a| a.total_processing_seconds).collect();

  let success_rate = if total > 0 { completed as f64 / total as f64 * 100.0 } else { 0.0 };

  DashboardMetrics {
    total_assessments: total,
    today_assessments: distinct_sessions(today),
    success_rate: round1(success_rate),
    avg_processing_time: round1(mean(&processing)),
    median_processing_time: round1(median(&processing)),
  }
}

/// Per-day counts keyed by the UTC date prefix of `created_at`, sorted by date.
pub fn daily_trends(rows: &[Assessment]) -> Vec<DailyTrend> {
  let mut by_day: BTreeMap<String, DailyTrend> = BTreeMap::new();
  for a in rows {
    let Some(created) = a.created_at.as_deref() else { continue };
    let date = created.split('T').next().unwrap_or(created).to_string();
    let entry = by_day
      .entry(date.clone())
      .or_insert_with(|| DailyTrend { date, assessments: 0, completed: 0 });
    entry.assessments += 1;
    if is_completed(a) {
      entry.completed += 1;
    }
  }
  by_day.into_values().collect()
}

async fn fetch_metrics(store: &Store, now: DateTime<Utc>) -> Result<DashboardMetrics, DbError> {
  let since = week_start(now).to_rfc3339();
  let week = store
    .assessments_between("session_id,status,total_processing_seconds", &since, None)
    .await?;
  let today = store.assessments_between("session_id", &day_key(now), None).await?;
  Ok(summarize(&week, &today))
}

#[instrument(level = "info", skip(store))]
pub async fn get_dashboard_metrics(store: Option<&Store>, now: DateTime<Utc>) -> DashboardMetrics {
  let Some(store) = store else {
    error!(target: "ibrani_dashboard", "Datastore not configured; reporting empty metrics");
    return DashboardMetrics::default();
  };
  match fetch_metrics(store, now).await {
    Ok(m) => {
      info!(target: "ibrani_dashboard", total = m.total_assessments, today = m.today_assessments, success_rate = m.success_rate, "Dashboard metrics computed");
      m
    }
    Err(e) => {
      error!(target: "ibrani_dashboard", error = %e, "Dashboard metrics query failed");
      DashboardMetrics::default()
    }
  }
}

#[instrument(level = "info", skip(store))]
pub async fn get_weekly_trends(store: Option<&Store>, now: DateTime<Utc>) -> Vec<DailyTrend> {
  let Some(store) = store else {
    error!(target: "ibrani_dashboard", "Datastore not configured; no weekly trends");
    return Vec::new();
  };
  let since = week_start(now).to_rfc3339();
  match store.assessments_between("created_at,status", &since, None).await {
    Ok(rows) => daily_trends(&rows),
    Err(e) => {
      error!(target: "ibrani_dashboard", error = %e, "Weekly trends query failed");
      Vec::new()
    }
  }
}
