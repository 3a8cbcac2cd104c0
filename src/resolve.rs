use std::collections::HashMap;
use std::thread;

use log::warn;
use serde_json::Value;

use crate::config;
use crate::grafana::{GrafanaClient, Panel};

/// Outcome of resolving one metric placeholder. Resolution is best-effort per
/// placeholder: failures degrade to an outcome, they never abort the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Value(String),
    Unresolved(UnresolvedReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// Token has no underscore, so it cannot name a panel/series pair.
    NotAMetricToken,
    /// No panel title matched the placeholder after normalization.
    PanelNotFound,
    /// The query call failed or the panel has no target for the series.
    QueryFailed,
    /// The result carried no numeric-typed field to aggregate.
    NoNumericColumn,
    /// The numeric column existed but every entry was null.
    EmptySeries,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NotAMetricToken => "not a metric token",
            Self::PanelNotFound => "panel not found",
            Self::QueryFailed => "query failed",
            Self::NoNumericColumn => "no numeric column in result",
            Self::EmptySeries => "series has no values",
        };
        f.write_str(text)
    }
}

/// Lowercase a title and keep only ASCII alphanumerics, so that
/// `"CPU Usage (%)"` and `"cpuusage"` compare equal.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Split `{{slug_L}}` on the last underscore into (panel slug, query letter).
/// Slugs containing underscores therefore lose their tail segment; that
/// matches the placeholder grammar the decks already use.
pub fn parse_metric_token(placeholder: &str) -> Option<(String, String)> {
    let inner = placeholder.strip_prefix("{{")?.strip_suffix("}}")?;
    let (slug, letter) = inner.rsplit_once('_')?;
    Some((slug.to_string(), letter.to_string()))
}

pub fn slug_to_title(slug: &str) -> String {
    slug.replace('-', " ")
}

pub fn find_panel_by_title<'a>(panels: &'a [Panel], title: &str) -> Option<&'a Panel> {
    let wanted = normalize_title(title);
    panels.iter().find(|panel| {
        let normalized = normalize_title(&panel.title);
        !normalized.is_empty() && normalized == wanted
    })
}

/// Pull the first numeric column of the addressed query series: the first
/// frame's first `"number"`-typed field and its parallel value column, with
/// nulls dropped. Any structural mismatch yields `None`.
pub fn extract_numeric_series(result: &Value, ref_id: &str) -> Option<Vec<f64>> {
    let frame = result.get("results")?.get(ref_id)?.get("frames")?.get(0)?;
    let fields = frame.get("schema")?.get("fields")?.as_array()?;
    let index = fields
        .iter()
        .position(|field| field.get("type").and_then(Value::as_str) == Some("number"))?;
    let column = frame.get("data")?.get("values")?.get(index)?.as_array()?;
    Some(column.iter().filter_map(Value::as_f64).collect())
}

/// Render the sentence for a non-empty series with one-decimal max and mean.
pub fn format_stats(template: &str, values: &[f64]) -> String {
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    template
        .replace("{max}", &format!("{max:.1}"))
        .replace("{mean}", &format!("{mean:.1}"))
}

enum CachedQuery {
    Data(Value),
    Missing(UnresolvedReason),
}

/// Resolves metric placeholders against one dashboard, caching raw query
/// results per (slug, letter) for the lifetime of a document.
pub struct MetricResolver<'a> {
    client: &'a GrafanaClient,
    panels: &'a [Panel],
    start_ts: i64,
    end_ts: i64,
    template: &'a str,
    cache: HashMap<(String, String), CachedQuery>,
}

impl<'a> MetricResolver<'a> {
    pub fn new(
        client: &'a GrafanaClient,
        panels: &'a [Panel],
        start_ts: i64,
        end_ts: i64,
        template: &'a str,
    ) -> Self {
        Self {
            client,
            panels,
            start_ts,
            end_ts,
            template,
            cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, placeholder: &str) -> Resolution {
        let Some((slug, letter)) = parse_metric_token(placeholder) else {
            return Resolution::Unresolved(UnresolvedReason::NotAMetricToken);
        };

        let key = (slug.clone(), letter.clone());
        if !self.cache.contains_key(&key) {
            let cached = self.run_query(&slug, &letter);
            self.cache.insert(key.clone(), cached);
        }

        match &self.cache[&key] {
            CachedQuery::Missing(reason) => Resolution::Unresolved(*reason),
            CachedQuery::Data(raw) => match extract_numeric_series(raw, &letter) {
                None => Resolution::Unresolved(UnresolvedReason::NoNumericColumn),
                Some(values) if values.is_empty() => {
                    Resolution::Unresolved(UnresolvedReason::EmptySeries)
                }
                Some(values) => Resolution::Value(format_stats(self.template, &values)),
            },
        }
    }

    fn run_query(&self, slug: &str, letter: &str) -> CachedQuery {
        let title = slug_to_title(slug);
        println!("  > querying '{title}' series {letter}");
        let Some(panel) = find_panel_by_title(self.panels, &title) else {
            warn!("no panel matching '{title}'");
            return CachedQuery::Missing(UnresolvedReason::PanelNotFound);
        };

        let result = self
            .client
            .query_panel(panel, letter, self.start_ts, self.end_ts);
        // Pause only when a network query was actually issued, not on cache hits.
        thread::sleep(config::QUERY_PAUSE);

        match result {
            Some(raw) => CachedQuery::Data(raw),
            None => CachedQuery::Missing(UnresolvedReason::QueryFailed),
        }
    }
}
