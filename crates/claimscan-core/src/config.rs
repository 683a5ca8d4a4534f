use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ingest::SimilarityMetric;

/// Remote completion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Completion endpoint accepting `{prompt, max_length, temperature}`
    pub endpoint: String,
    pub connect_timeout_seconds: u32,
    /// Whole-request bound; an expired call counts as a failure
    pub request_timeout_seconds: u32,
    pub user_agent: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/chat".to_string(),
            connect_timeout_seconds: 10,
            request_timeout_seconds: 30,
            user_agent: None,
        }
    }
}

/// Serial PDF queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Total attempts per task, first try included
    pub max_attempts: u32,
    /// Backoff after the n-th failure is `base_delay_ms * 2^n`
    pub base_delay_ms: u64,
    /// Pause between the end of one task and the start of the next
    pub inter_task_delay_ms: u64,
    pub task_timeout_seconds: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            inter_task_delay_ms: 50,
            task_timeout_seconds: 30,
        }
    }
}

impl QueueConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn inter_task_delay(&self) -> Duration {
        Duration::from_millis(self.inter_task_delay_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.task_timeout_seconds))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub threshold: f64,
    pub metric: SimilarityMetric,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: crate::ingest::DEFAULT_MATCH_THRESHOLD,
            metric: SimilarityMetric::Dice,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_text_len: usize,
    pub corruption_markers: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_text_len: 10,
            corruption_markers: vec!["WebKitFormBoundary".to_string(), "PyFPDF".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-character delay when replaying a regex hit to a token stream
    pub replay_delay_ms: u64,
    /// Reparse PDFs through the repair/salvage path before going remote
    pub reparse_pdf: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_tokens: 200,
            temperature: 0.3,
            replay_delay_ms: 20,
            reparse_pdf: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    pub repair_enabled: bool,
    /// Program name or path of the xref repair utility
    pub repair_tool: String,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            repair_enabled: true,
            repair_tool: "qpdf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub remote: RemoteConfig,
    pub queue: QueueConfig,
    pub matching: MatchConfig,
    pub validation: ValidationConfig,
    pub extraction: ExtractionConfig,
    pub pdf: PdfConfig,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Overlay `CLAIMSCAN_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CLAIMSCAN_LLM_URL") {
            self.remote.endpoint = url;
        }
        if let Some(timeout) = lookup("CLAIMSCAN_LLM_TIMEOUT") {
            self.remote.request_timeout_seconds = parse_var("CLAIMSCAN_LLM_TIMEOUT", &timeout)?;
        }
        if let Some(threshold) = lookup("CLAIMSCAN_MATCH_THRESHOLD") {
            self.matching.threshold = parse_var("CLAIMSCAN_MATCH_THRESHOLD", &threshold)?;
        }
        if let Some(tool) = lookup("CLAIMSCAN_REPAIR_TOOL") {
            self.pdf.repair_enabled = !tool.is_empty();
            self.pdf.repair_tool = tool;
        }
        if let Some(attempts) = lookup("CLAIMSCAN_MAX_ATTEMPTS") {
            self.queue.max_attempts = parse_var("CLAIMSCAN_MAX_ATTEMPTS", &attempts)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.matching.threshold) {
            return Err(Error::InvalidConfig(format!(
                "match threshold {} outside [0, 1]",
                self.matching.threshold
            )));
        }
        if self.queue.max_attempts == 0 {
            return Err(Error::InvalidConfig("queue.max_attempts must be at least 1".into()));
        }
        url::Url::parse(&self.remote.endpoint).map_err(|e| {
            Error::InvalidConfig(format!("remote endpoint '{}': {e}", self.remote.endpoint))
        })?;
        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{key}={value}: {e}")))
}
