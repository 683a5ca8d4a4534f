use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use console::style;

use claimscan_core::ingest::{IngestPipeline, InputFile};
use claimscan_core::{load_registry, DocumentRecord, DocumentStatus};

use super::{file_name, load_config};

pub async fn run(
    config: Option<&Path>,
    registry: &Path,
    json: bool,
    files: &[PathBuf],
) -> Result<ExitCode> {
    let config = load_config(config).await?;
    let registry = load_registry(registry)
        .await
        .with_context(|| format!("loading registry {}", registry.display()))?;

    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        inputs.push(InputFile::new(file_name(path), bytes));
    }

    let pipeline = IngestPipeline::from_config(&config)?;
    let records = pipeline.process_files(&inputs, &registry).await?;
    pipeline.queue().shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for record in &records {
            print_record(record);
        }
    }

    let failed = records
        .iter()
        .filter(|r| r.status == DocumentStatus::Error)
        .count();
    if failed > 0 {
        eprintln!(
            "{} {failed} of {} documents failed",
            style("✗").red(),
            records.len()
        );
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

fn print_record(record: &DocumentRecord) {
    match record.status {
        DocumentStatus::Done => println!(
            "{}\t{}\t{}\t{}\t{:.2}",
            record.file_name,
            record.extracted_name,
            if record.is_matched() {
                record.matched_id.as_str()
            } else {
                "-"
            },
            record.matched_name,
            record.confidence
        ),
        _ => {
            println!("{}\terror", record.file_name);
            eprintln!(
                "{} {}: {}",
                style("✗").red(),
                style(&record.file_name).bold(),
                record.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
