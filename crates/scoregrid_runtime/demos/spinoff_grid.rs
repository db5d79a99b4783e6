//! Spinoff grid demo
//!
//! Scores one spinoff with the built-in planner, rule scorers and
//! composer, then prints the composite and the flat grid. Pass a TOML
//! config path as the first argument to override the defaults.

use anyhow::Result;
use scoregrid_core::{FeatureBank, FeatureSet, Goal, Provenance};
use scoregrid_runtime::{GRID_HEADER, Orchestrator, OrchestratorConfig, builtin_registry};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn features() -> Result<FeatureBank> {
    let bank = FeatureBank::from_sets([
        FeatureSet::new(
            "capital_structure",
            [
                ("net_leverage_turns", json!(3.2)),
                ("fcf_to_net_debt_pct", json!(22)),
                ("special_dividend_flag", json!(true)),
            ],
        )?
        .with_provenance(vec![Provenance::new(
            "net_leverage_turns",
            "https://example.com/press",
        )]),
        FeatureSet::new(
            "ownership",
            [
                ("mgmt_ownership_pct", json!(2.1)),
                ("perf_equity_present", json!(1)),
            ],
        )?,
        FeatureSet::new(
            "microstructure",
            [
                ("free_float_pct", json!(65)),
                ("russell_eligible", json!(0)),
                ("avg_daily_dollar_volume", json!(12_000_000)),
            ],
        )?,
        FeatureSet::new(
            "ops",
            [
                ("ebitda_margin_pct", json!(14)),
                ("customer_conc_top5_pct", json!(38)),
            ],
        )?,
    ])?;
    Ok(bank)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scoregrid=info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => OrchestratorConfig::load(path)?,
        None => OrchestratorConfig::default(),
    };

    let registry = builtin_registry(config.composer.clone())?;
    let orchestrator = Orchestrator::new(Arc::new(registry), config);
    let report = orchestrator
        .run(&Goal::new("Score spinoff Example SpinCo"), &features()?)
        .await?;

    println!("status: {:?}", report.status);
    if let Some(composite) = report.composite() {
        println!(
            "composite: {:.2} ({})",
            composite.composite_score, composite.policy
        );
    }

    println!("{}", GRID_HEADER.join(" | "));
    for row in report.grid_rows("Example SpinCo") {
        println!("{}", row.fields().join(" | "));
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
