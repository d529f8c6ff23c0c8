//! Minimal PostgREST (Supabase REST) client.
//!
//! We only need table selects with simple filters, single-row writes and RPC
//! calls. Requests are instrumented with table names, filter counts and row
//! counts; we never log the API key or row contents.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::DatastoreSettings;
use crate::error::DbError;

/// Filter + projection for one PostgREST request, rendered as query pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
  select: Option<String>,
  filters: Vec<(String, String)>,
  order: Option<String>,
  limit: Option<usize>,
}

impl Query {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn select(mut self, columns: &str) -> Self {
    self.select = Some(columns.split_whitespace().collect::<Vec<_>>().join(""));
    self
  }

  pub fn eq(self, column: &str, value: impl ToString) -> Self {
    self.filter(column, "eq", value)
  }

  pub fn gte(self, column: &str, value: impl ToString) -> Self {
    self.filter(column, "gte", value)
  }

  pub fn lt(self, column: &str, value: impl ToString) -> Self {
    self.filter(column, "lt", value)
  }

  pub fn order(mut self, column: &str, ascending: bool) -> Self {
    let dir = if ascending { "asc" } else { "desc" };
    self.order = Some(format!("{column}.{dir}"));
    self
  }

  pub fn limit(mut self, n: usize) -> Self {
    self.limit = Some(n);
    self
  }

  fn filter(mut self, column: &str, op: &str, value: impl ToString) -> Self {
    self.filters.push((column.to_string(), format!("{op}.{}", value.to_string())));
    self
  }

  /// Human-readable filter description for errors and logs.
  pub fn describe(&self) -> String {
    if self.filters.is_empty() {
      return "(all rows)".to_string();
    }
    self.filters.iter().map(|(c, f)| format!("{c}={f}")).collect::<Vec<_>>().join("&")
  }

  pub fn to_pairs(&self) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(self.filters.len() + 3);
    pairs.push(("select".to_string(), self.select.clone().unwrap_or_else(|| "*".to_string())));
    pairs.extend(self.filters.iter().cloned());
    if let Some(order) = &self.order {
      pairs.push(("order".to_string(), order.clone()));
    }
    if let Some(limit) = self.limit {
      pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
  }
}

#[derive(Clone)]
pub struct SupabaseClient {
  client: reqwest::Client,
  rest_url: String,
}

#[derive(Deserialize)]
struct PostgrestError {
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  details: Option<String>,
}

impl SupabaseClient {
  /// Construct the client if both URL and key are configured; otherwise return None.
  pub fn from_settings(settings: &DatastoreSettings) -> Option<Self> {
    let url = settings.url.as_deref()?.trim_end_matches('/');
    let key = settings.api_key()?;

    let mut headers = HeaderMap::new();
    headers.insert("apikey", HeaderValue::from_str(key).ok()?);
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}")).ok()?);
    headers.insert(USER_AGENT, HeaderValue::from_static("ibrani-dashboard/0.1"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .default_headers(headers)
      .build()
      .ok()?;

    Some(Self { client, rest_url: format!("{url}/rest/v1") })
  }

  pub fn rest_url(&self) -> &str {
    &self.rest_url
  }

  #[instrument(level = "debug", skip(self, query), fields(filters = %query.describe()))]
  pub async fn select<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>, DbError> {
    let res = self
      .client
      .get(format!("{}/{}", self.rest_url, table))
      .query(&query.to_pairs())
      .send()
      .await?;
    let rows: Vec<T> = decode(res).await?;
    debug!(target: "store", %table, rows = rows.len(), "select");
    Ok(rows)
  }

  /// First matching row, or None.
  pub async fn select_one<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Option<T>, DbError> {
    let rows = self.select::<T>(table, &query.clone().limit(1)).await?;
    Ok(rows.into_iter().next())
  }

  #[instrument(level = "debug", skip(self, row))]
  pub async fn insert<B: Serialize, T: DeserializeOwned>(&self, table: &str, row: &B) -> Result<T, DbError> {
    let res = self
      .client
      .post(format!("{}/{}", self.rest_url, table))
      .header(CONTENT_TYPE, "application/json")
      .header("Prefer", "return=representation")
      .json(row)
      .send()
      .await?;
    first_row(table, "insert", decode(res).await?)
  }

  /// Insert, or merge into the row with the same primary key.
  #[instrument(level = "debug", skip(self, row))]
  pub async fn upsert<B: Serialize, T: DeserializeOwned>(&self, table: &str, on_conflict: &str, row: &B) -> Result<T, DbError> {
    let res = self
      .client
      .post(format!("{}/{}", self.rest_url, table))
      .query(&[("on_conflict", on_conflict)])
      .header(CONTENT_TYPE, "application/json")
      .header("Prefer", "resolution=merge-duplicates,return=representation")
      .json(row)
      .send()
      .await?;
    first_row(table, "upsert", decode(res).await?)
  }

  #[instrument(level = "debug", skip(self, query, patch), fields(filters = %query.describe()))]
  pub async fn update<B: Serialize, T: DeserializeOwned>(&self, table: &str, query: &Query, patch: &B) -> Result<T, DbError> {
    let res = self
      .client
      .patch(format!("{}/{}", self.rest_url, table))
      .query(&query.to_pairs())
      .header(CONTENT_TYPE, "application/json")
      .header("Prefer", "return=representation")
      .json(patch)
      .send()
      .await?;
    first_row(table, &query.describe(), decode(res).await?)
  }

  /// Delete matching rows; returns how many were removed.
  #[instrument(level = "debug", skip(self, query), fields(filters = %query.describe()))]
  pub async fn delete(&self, table: &str, query: &Query) -> Result<usize, DbError> {
    let res = self
      .client
      .delete(format!("{}/{}", self.rest_url, table))
      .query(&query.to_pairs())
      .header("Prefer", "return=representation")
      .send()
      .await?;
    let rows: Vec<serde_json::Value> = decode(res).await?;
    Ok(rows.len())
  }

  #[instrument(level = "debug", skip(self, args))]
  pub async fn rpc<A: Serialize, T: DeserializeOwned>(&self, function: &str, args: &A) -> Result<T, DbError> {
    let res = self
      .client
      .post(format!("{}/rpc/{}", self.rest_url, function))
      .header(CONTENT_TYPE, "application/json")
      .json(args)
      .send()
      .await?;
    decode(res).await
  }
}

async fn decode<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, DbError> {
  let status = res.status();
  let body = res.text().await?;
  if !status.is_success() {
    return Err(DbError::Status { status: status.as_u16(), message: extract_postgrest_error(&body).unwrap_or(body) });
  }
  Ok(serde_json::from_str(&body)?)
}

fn first_row<T>(table: &str, filter: &str, rows: Vec<T>) -> Result<T, DbError> {
  rows.into_iter().next().ok_or_else(|| DbError::NotFound { table: table.to_string(), filter: filter.to_string() })
}

fn extract_postgrest_error(body: &str) -> Option<String> {
  let e = serde_json::from_str::<PostgrestError>(body).ok()?;
  match (e.message, e.details) {
    (Some(m), Some(d)) => Some(format!("{m} ({d})")),
    (Some(m), None) => Some(m),
    (None, d) => d,
  }
}
