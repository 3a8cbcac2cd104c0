use std::thread;

use anyhow::Context;
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config;

/// One dashboard panel as returned by the dashboard definition API. Query
/// targets stay raw JSON because they are forwarded verbatim to the query API.
#[derive(Debug, Clone, Deserialize)]
pub struct Panel {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub panel_type: String,
    #[serde(default)]
    pub datasource: Option<Value>,
    #[serde(default)]
    pub targets: Vec<Value>,
    #[serde(default)]
    pub panels: Vec<Panel>,
}

#[derive(Debug, Deserialize)]
struct DashboardEnvelope {
    #[serde(default)]
    dashboard: DashboardBody,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardBody {
    #[serde(default)]
    panels: Vec<Panel>,
}

/// A fetched dashboard definition with its panel tree already flattened.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub panels: Vec<Panel>,
}

/// Depth-first flattening: a row panel is followed by its nested panels.
pub fn flatten_panels(panels: &[Panel]) -> Vec<Panel> {
    let mut all = Vec::new();
    for panel in panels {
        all.push(panel.clone());
        if panel.panel_type == "row" && !panel.panels.is_empty() {
            all.extend(flatten_panels(&panel.panels));
        }
    }
    all
}

/// Select and prepare the panel's targets for one query series. Targets without
/// a datasource inherit the panel's; the `real_hosts` host override must never
/// reach the query API; point count and interval get capped defaults.
pub fn prepare_queries(panel: &Panel, ref_id: &str) -> Vec<Value> {
    let mut selected = Vec::new();
    for target in &panel.targets {
        if target.get("refId").and_then(Value::as_str) != Some(ref_id) {
            continue;
        }
        let mut query = target.clone();
        if let Some(fields) = query.as_object_mut() {
            if fields.get("datasource").map_or(true, Value::is_null) {
                if let Some(datasource) = &panel.datasource {
                    fields.insert("datasource".to_string(), datasource.clone());
                }
            }
            fields.remove("real_hosts");
            fields.entry("maxDataPoints").or_insert(json!(720));
            fields.entry("intervalMs").or_insert(json!(3_600_000));
        }
        selected.push(query);
    }
    selected
}

pub struct GrafanaClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl GrafanaClient {
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        // The monitored Grafana runs with a self-signed certificate.
        let http = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Fetch a dashboard definition, retrying a fixed number of times.
    /// Exhausting the retries yields `None`; the caller proceeds without stats.
    pub fn fetch_dashboard(&self, uid: &str) -> Option<Dashboard> {
        let url = format!("{}/api/dashboards/uid/{uid}", self.base_url);
        for attempt in 1..=config::DASHBOARD_FETCH_ATTEMPTS {
            match self.try_fetch_dashboard(&url) {
                Ok(dashboard) => return Some(dashboard),
                Err(err) => {
                    warn!(
                        "dashboard {uid} fetch failed (attempt {attempt}/{}): {err:#}",
                        config::DASHBOARD_FETCH_ATTEMPTS
                    );
                    thread::sleep(config::DASHBOARD_FETCH_RETRY_DELAY);
                }
            }
        }
        None
    }

    fn try_fetch_dashboard(&self, url: &str) -> anyhow::Result<Dashboard> {
        let envelope: DashboardEnvelope = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .timeout(config::DASHBOARD_FETCH_TIMEOUT)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(Dashboard {
            panels: flatten_panels(&envelope.dashboard.panels),
        })
    }

    /// Run one ad-hoc query against a panel's series over `[start_ts, end_ts]`.
    /// Single attempt: any failure logs and yields `None`.
    pub fn query_panel(
        &self,
        panel: &Panel,
        ref_id: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Option<Value> {
        let queries = prepare_queries(panel, ref_id);
        if queries.is_empty() {
            return None;
        }
        match self.try_query(&queries, start_ts, end_ts) {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(
                    "query {ref_id} on panel '{}' failed: {err:#}",
                    panel.title
                );
                None
            }
        }
    }

    fn try_query(&self, queries: &[Value], start_ts: i64, end_ts: i64) -> anyhow::Result<Value> {
        let payload = json!({
            "queries": queries,
            "from": start_ts.to_string(),
            "to": end_ts.to_string(),
        });
        let result = self
            .http
            .post(format!("{}/api/ds/query", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(config::QUERY_TIMEOUT)
            .json(&payload)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel_from(value: Value) -> Panel {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn flattening_splices_row_children_after_the_row() {
        let panels: Vec<Panel> = serde_json::from_value(json!([
            {"title": "CPU Usage", "type": "timeseries"},
            {"title": "Disk", "type": "row", "panels": [
                {"title": "Disk Read", "type": "timeseries"},
                {"title": "Inner Row", "type": "row", "panels": [
                    {"title": "Disk Write", "type": "timeseries"}
                ]}
            ]},
            {"title": "Memory", "type": "timeseries"}
        ]))
        .unwrap();

        let titles: Vec<String> = flatten_panels(&panels)
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(
            titles,
            [
                "CPU Usage",
                "Disk",
                "Disk Read",
                "Inner Row",
                "Disk Write",
                "Memory"
            ]
        );
    }

    #[test]
    fn prepare_selects_only_the_requested_series() {
        let panel = panel_from(json!({
            "title": "CPU Usage",
            "targets": [
                {"refId": "A", "expr": "cpu"},
                {"refId": "B", "expr": "cpu_b"}
            ]
        }));
        let queries = prepare_queries(&panel, "B");
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0]["expr"], "cpu_b");
        assert!(prepare_queries(&panel, "Z").is_empty());
    }

    #[test]
    fn prepare_inherits_panel_datasource_when_target_has_none() {
        let panel = panel_from(json!({
            "title": "CPU Usage",
            "datasource": {"uid": "ds-1"},
            "targets": [
                {"refId": "A"},
                {"refId": "A", "datasource": null},
                {"refId": "A", "datasource": {"uid": "ds-own"}}
            ]
        }));
        let queries = prepare_queries(&panel, "A");
        assert_eq!(queries[0]["datasource"]["uid"], "ds-1");
        assert_eq!(queries[1]["datasource"]["uid"], "ds-1");
        assert_eq!(queries[2]["datasource"]["uid"], "ds-own");
    }

    #[test]
    fn prepare_strips_host_override_and_defaults_caps() {
        let panel = panel_from(json!({
            "title": "CPU Usage",
            "targets": [{
                "refId": "A",
                "real_hosts": ["10.0.0.1"],
                "maxDataPoints": 100
            }]
        }));
        let queries = prepare_queries(&panel, "A");
        assert!(queries[0].get("real_hosts").is_none());
        assert_eq!(queries[0]["maxDataPoints"], 100);
        assert_eq!(queries[0]["intervalMs"], 3_600_000);
    }

    #[test]
    fn envelope_tolerates_missing_fields() {
        let envelope: DashboardEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.dashboard.panels.is_empty());

        let envelope: DashboardEnvelope = serde_json::from_str(
            r#"{"dashboard": {"title": "Monthly", "panels": [{"title": "CPU Usage"}]}}"#,
        )
        .unwrap();
        assert_eq!(envelope.dashboard.panels[0].title, "CPU Usage");
        assert!(envelope.dashboard.panels[0].targets.is_empty());
    }
}
