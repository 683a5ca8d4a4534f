pub mod extract;
pub mod match_name;
pub mod scan;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use claimscan_core::PipelineConfig;

#[derive(Parser)]
#[command(
    name = "claimscan",
    about = "Find the insured party in claim documents and match it to a registry",
    version
)]
pub struct Cli {
    /// Pipeline configuration file (JSON)
    #[arg(short, long, global = true, env = "CLAIMSCAN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process claim documents and match each to the registry
    Scan {
        /// Registry of known insureds (JSON array of {id, canonical_name})
        #[arg(short, long)]
        registry: PathBuf,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
        /// Documents to process (.pdf, .docx, .txt)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Match a single name against the registry
    Match {
        #[arg(short, long)]
        registry: PathBuf,
        /// Override the configured match threshold
        #[arg(long)]
        threshold: Option<f64>,
        name: String,
    },
    /// Print the text extracted from a document
    Extract {
        file: PathBuf,
    },
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("claimscan").join("config.json"))
}

/// Explicit file, else the user config file if present, else defaults;
/// then environment overrides.
pub async fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let file = path
        .map(Path::to_path_buf)
        .or_else(|| default_config_path().filter(|p| p.exists()));

    let mut config = match file {
        Some(file) => PipelineConfig::from_file(&file)
            .await
            .with_context(|| format!("reading config {}", file.display()))?,
        None => PipelineConfig::default(),
    };

    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

pub fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.to_string_lossy().into_owned(),
        |n| n.to_string_lossy().into_owned(),
    )
}
