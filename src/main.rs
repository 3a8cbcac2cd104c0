use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use log::{error, warn};

mod config;
mod dates;
mod grafana;
mod locate;
mod pptx;
mod resolve;

use dates::DateWindow;
use grafana::{Dashboard, GrafanaClient};
use resolve::{MetricResolver, Resolution};

#[derive(Parser)]
#[command(name = "monthly-report-stats")]
#[command(about = "Fills monthly report decks with Grafana usage statistics", long_about = None)]
struct Cli {
    /// Customer folder to process; all customers when omitted
    customer: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let api_key = std::env::var(config::GRAFANA_API_KEY_ENV).with_context(|| {
        format!(
            "{} must be set to a Grafana service account token",
            config::GRAFANA_API_KEY_ENV
        )
    })?;
    let base_url = std::env::var(config::GRAFANA_URL_ENV)
        .unwrap_or_else(|_| config::DEFAULT_GRAFANA_URL.to_string());

    let template_root = Path::new(config::TEMPLATE_DIR);
    let output_root = Path::new(config::OUTPUT_DIR);

    match &cli.customer {
        Some(customer) => println!("Processing customer '{customer}'."),
        None => println!("Processing all customers."),
    }

    let files = locate::find_templates(template_root, cli.customer.as_deref());
    if files.is_empty() {
        println!("No template files to process.");
        return Ok(());
    }

    let window = dates::current_window();
    println!("Reporting window: {}", window.filename_date);

    let client = GrafanaClient::new(&base_url, &api_key)?;
    let mut dashboards: HashMap<String, Option<Dashboard>> = HashMap::new();
    let total = files.len();

    for (index, path) in files.iter().enumerate() {
        println!("----------------------------------------");
        println!("File {}/{}: {}", index + 1, total, path.display());

        let dashboard = match locate::customer_segment(template_root, path) {
            Some(customer) => dashboards
                .entry(customer.clone())
                .or_insert_with(|| load_dashboard(&client, &customer))
                .as_ref(),
            None => {
                warn!("{} is outside the template root; stats skipped", path.display());
                None
            }
        };

        if let Err(err) = process_file(path, template_root, output_root, dashboard, &window, &client)
        {
            error!("{}: {err:#}", path.display());
        }
    }

    println!("All decks processed.");
    Ok(())
}

/// Fetched at most once per customer per run; both outcomes are cached.
fn load_dashboard(client: &GrafanaClient, customer: &str) -> Option<Dashboard> {
    match config::dashboard_uid(customer) {
        None => {
            warn!("no dashboard mapping for customer '{customer}'; stats skipped");
            None
        }
        Some(uid) => {
            println!("  > loading dashboard {uid} for '{customer}'");
            client.fetch_dashboard(uid)
        }
    }
}

fn process_file(
    path: &Path,
    template_root: &Path,
    output_root: &Path,
    dashboard: Option<&Dashboard>,
    window: &DateWindow,
    client: &GrafanaClient,
) -> anyhow::Result<()> {
    let mut deck = pptx::Presentation::open(path)?;
    let mut replacements = window.placeholders.clone();
    let mut failures: Vec<String> = Vec::new();

    if let Some(dashboard) = dashboard {
        let discovered = deck.placeholders()?;
        let mut resolver = MetricResolver::new(
            client,
            &dashboard.panels,
            window.start_ts,
            window.end_ts,
            config::SENTENCE_TEMPLATE,
        );
        for placeholder in &discovered {
            if replacements.contains_key(placeholder) {
                continue;
            }
            match resolver.resolve(placeholder) {
                Resolution::Value(sentence) => {
                    replacements.insert(placeholder.clone(), sentence);
                }
                Resolution::Unresolved(reason) => {
                    warn!("{placeholder}: {reason}");
                    replacements.insert(placeholder.clone(), "N/A".to_string());
                    failures.push(placeholder.clone());
                }
            }
        }
    }

    deck.substitute(&replacements)?;

    if !failures.is_empty() {
        failures.sort();
        println!("  ! placeholders without usable stats:");
        for name in &failures {
            println!("    - {name}");
        }
    }

    let out_path = locate::mirrored_output_path(template_root, output_root, path)
        .with_context(|| format!("{} is not under {}", path.display(), template_root.display()))?;
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    deck.save(&out_path)?;
    println!("  > wrote {}", out_path.display());
    Ok(())
}
