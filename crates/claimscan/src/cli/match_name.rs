use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use claimscan_core::ingest::MatchEngine;
use claimscan_core::load_registry;

use super::load_config;

pub async fn run(
    config: Option<&Path>,
    registry: &Path,
    threshold: Option<f64>,
    name: &str,
) -> Result<ExitCode> {
    let config = load_config(config).await?;
    let registry = load_registry(registry)
        .await
        .with_context(|| format!("loading registry {}", registry.display()))?;

    let threshold = threshold.unwrap_or(config.matching.threshold);
    let engine = MatchEngine::new(config.matching.metric, threshold);
    let result = engine.find_best_match(name, &registry);

    if result.is_match() {
        println!(
            "{}\t{}\t{:.2}",
            result.matched_id, result.matched_name, result.confidence
        );
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}", result.matched_name);
        Ok(ExitCode::FAILURE)
    }
}
