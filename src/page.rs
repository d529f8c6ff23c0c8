//! Server-rendered dashboard page (metric cards + weekly activity).

use std::fmt::Write;

use crate::dashboard::{DailyTrend, DashboardMetrics};

const STYLE: &str = "\
body{font-family:system-ui,sans-serif;background:#f9fafb;margin:0;padding:2rem;color:#111827}\
main{max-width:72rem;margin:0 auto}\
h1{font-size:1.875rem;margin:0}\
.subtitle{color:#4b5563;margin:.25rem 0 2rem}\
.grid{display:grid;grid-template-columns:repeat(auto-fit,minmax(14rem,1fr));gap:1.5rem;margin-bottom:2rem}\
.card,.panel{background:#fff;border:1px solid #e5e7eb;border-radius:.5rem;padding:1.5rem;box-shadow:0 1px 2px rgba(0,0,0,.05)}\
.card .title{color:#4b5563;font-size:.875rem}\
.card .value{font-size:1.5rem;font-weight:700;margin-top:.25rem}\
.row{display:flex;justify-content:space-between;padding:.5rem 0;border-bottom:1px solid #e5e7eb}\
.row:last-child{border-bottom:0}\
.total{color:#2563eb;margin-right:1rem}.done{color:#16a34a}\
.empty{color:#6b7280}\
.status{margin-top:2rem;background:#f0fdf4;border:1px solid #bbf7d0;border-radius:.5rem;padding:1rem;color:#166534}";

/// Minimal HTML escaping for text and attribute content.
pub fn escape_html(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(c),
    }
  }
  out
}

/// Thousands separators, e.g. `12345` -> `12,345`.
fn group_thousands(n: usize) -> String {
  let digits = n.to_string();
  let mut out = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, c) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push(',');
    }
    out.push(c);
  }
  out
}

fn metric_card(out: &mut String, title: &str, value: &str) {
  let _ = write!(
    out,
    r#"<div class="card"><div class="title">{}</div><div class="value">{}</div></div>"#,
    escape_html(title),
    escape_html(value)
  );
}

pub fn render_dashboard(metrics: &DashboardMetrics, trends: &[DailyTrend]) -> String {
  let mut cards = String::new();
  metric_card(&mut cards, "Total Assessments", &group_thousands(metrics.total_assessments));
  metric_card(&mut cards, "Today's Assessments", &metrics.today_assessments.to_string());
  metric_card(&mut cards, "Success Rate", &format!("{}%", metrics.success_rate));
  metric_card(&mut cards, "Avg Processing Time", &format!("{}s", metrics.avg_processing_time));
  metric_card(&mut cards, "Median Processing Time", &format!("{}s", metrics.median_processing_time));

  let mut activity = String::new();
  if trends.is_empty() {
    activity.push_str(r#"<p class="empty">No data available for the past week</p>"#);
  } else {
    for day in trends {
      let _ = write!(
        activity,
        r#"<div class="row"><span>{}</span><span><span class="total">{} total</span><span class="done">{} completed</span></span></div>"#,
        escape_html(&day.date),
        day.assessments,
        day.completed
      );
    }
  }

  format!(
    r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Ibrani Dashboard</title>
<style>{STYLE}</style>
</head>
<body>
<main>
<h1>Ibrani Dashboard</h1>
<p class="subtitle">Hebrew Assessment Platform Analytics</p>
<section class="grid">{cards}</section>
<section class="panel"><h2>Weekly Activity</h2>{activity}</section>
<p class="status">System Status: All services operational</p>
</main>
</body>
</html>
"#
  )
}
