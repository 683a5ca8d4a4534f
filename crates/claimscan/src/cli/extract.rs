use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use console::style;

use claimscan_core::ingest::{
    CompositeParser, DocxParser, Parser, PdfParser, PlainTextParser, RuleBasedExtractor,
};

use super::load_config;

pub async fn run(config: Option<&Path>, file: &Path) -> Result<ExitCode> {
    let config = load_config(config).await?;
    let parser = CompositeParser::new()
        .with_parser(Box::new(PlainTextParser::new()))
        .with_parser(Box::new(DocxParser::new()))
        .with_parser(Box::new(PdfParser::from_config(&config.pdf)));

    let document = parser
        .parse_file(file)
        .await
        .with_context(|| format!("extracting text from {}", file.display()))?;

    let name = RuleBasedExtractor::with_default_patterns().extract_name(&document.full_text);

    eprintln!(
        "{} {} ({}{})",
        style("●").green(),
        style(file.display()).bold(),
        document.format,
        document
            .pdf_tier
            .map(|tier| format!(", {tier}"))
            .unwrap_or_default()
    );
    eprintln!("  Insured (patterns): {name}");
    println!("{}", document.full_text);

    Ok(ExitCode::SUCCESS)
}
