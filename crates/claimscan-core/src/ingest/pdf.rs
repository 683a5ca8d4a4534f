use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use super::parser::{DocumentFormat, ParseError, ParseResult, ParsedDocument, Parser};
use crate::config::PdfConfig;

/// Which rung of the PDF fallback ladder produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfTier {
    Direct,
    Repaired,
    Salvaged,
}

impl PdfTier {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Repaired => "repaired",
            Self::Salvaged => "salvaged",
        }
    }
}

impl std::fmt::Display for PdfTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PdfText {
    pub text: String,
    pub page_count: u32,
}

/// Structural PDF parser. Implementations are synchronous and run on the
/// blocking pool.
pub trait PdfBackend: Send + Sync {
    fn extract(&self, data: &[u8]) -> ParseResult<PdfText>;
}

pub struct LopdfBackend;

impl PdfBackend for LopdfBackend {
    fn extract(&self, data: &[u8]) -> ParseResult<PdfText> {
        let document = lopdf::Document::load_mem(data)
            .map_err(|e| ParseError::ParseFailed(format!("PDF load failed: {e}")))?;

        let pages: Vec<u32> = document.get_pages().keys().copied().collect();
        if pages.is_empty() {
            return Err(ParseError::ParseFailed("PDF has no pages".into()));
        }

        let text = document
            .extract_text(&pages)
            .map_err(|e| ParseError::ParseFailed(format!("PDF text extraction failed: {e}")))?;

        Ok(PdfText {
            text,
            page_count: u32::try_from(pages.len()).unwrap_or(u32::MAX),
        })
    }
}

/// External utility that rewrites a damaged PDF (typically its
/// cross-reference table) into a parseable one.
#[async_trait::async_trait]
pub trait PdfRepairTool: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    async fn repair(&self, data: &[u8]) -> ParseResult<Vec<u8>>;
}

pub struct QpdfRepair {
    program: String,
}

impl QpdfRepair {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn locate(&self) -> Option<PathBuf> {
        which::which(&self.program).ok()
    }
}

impl Default for QpdfRepair {
    fn default() -> Self {
        Self::new("qpdf")
    }
}

#[async_trait::async_trait]
impl PdfRepairTool for QpdfRepair {
    fn name(&self) -> &str {
        &self.program
    }

    fn is_available(&self) -> bool {
        self.locate().is_some()
    }

    async fn repair(&self, data: &[u8]) -> ParseResult<Vec<u8>> {
        let binary = self.locate().ok_or_else(|| {
            ParseError::ParseFailed(format!("{} not found on PATH", self.program))
        })?;

        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in.pdf");
        let output = dir.path().join("out.pdf");
        tokio::fs::write(&input, data).await?;

        let result = Command::new(&binary)
            .arg(&input)
            .arg(&output)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        // qpdf exits with 3 when it succeeded with warnings, which is the
        // normal outcome of an xref rebuild.
        match result.status.code() {
            Some(0 | 3) => {}
            code => {
                let stderr = String::from_utf8_lossy(&result.stderr);
                return Err(ParseError::ParseFailed(format!(
                    "{} exited with {code:?}: {}",
                    self.program,
                    stderr.trim()
                )));
            }
        }

        Ok(tokio::fs::read(&output).await?)
    }
}

/// Keep printable ASCII, turn CR/LF into line breaks, drop everything else,
/// then collapse every whitespace run to a single space. Never fails; the
/// result may be empty.
#[must_use]
pub fn salvage_text(data: &[u8]) -> String {
    let mut raw = String::with_capacity(data.len());
    for &byte in data {
        match byte {
            32..=126 => raw.push(char::from(byte)),
            b'\n' | b'\r' => raw.push('\n'),
            _ => {}
        }
    }

    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}

/// PDF parser with a three-rung ladder: direct parse, repair then parse,
/// raw byte salvage.
pub struct PdfParser {
    backend: Arc<dyn PdfBackend>,
    repair: Option<Arc<dyn PdfRepairTool>>,
    skip_direct: bool,
}

impl PdfParser {
    #[must_use]
    pub fn new(backend: Arc<dyn PdfBackend>) -> Self {
        Self {
            backend,
            repair: None,
            skip_direct: false,
        }
    }

    #[must_use]
    pub fn with_repair_tool(mut self, tool: Arc<dyn PdfRepairTool>) -> Self {
        self.repair = Some(tool);
        self
    }

    #[must_use]
    pub fn from_config(config: &PdfConfig) -> Self {
        let parser = Self::new(Arc::new(LopdfBackend));
        if config.repair_enabled {
            parser.with_repair_tool(Arc::new(QpdfRepair::new(config.repair_tool.clone())))
        } else {
            parser
        }
    }

    /// A parser sharing this one's backend and repair tool that starts the
    /// ladder at the repair rung.
    #[must_use]
    pub fn alternate_path(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            repair: self.repair.clone(),
            skip_direct: true,
        }
    }

    async fn parse_direct(&self, data: &[u8]) -> ParseResult<PdfText> {
        let backend = Arc::clone(&self.backend);
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || backend.extract(&data))
            .await
            .map_err(|e| ParseError::ParseFailed(format!("PDF parse task failed: {e}")))?
    }

    async fn parse_repaired(&self, data: &[u8]) -> ParseResult<PdfText> {
        let tool = self
            .repair
            .as_ref()
            .filter(|t| t.is_available())
            .ok_or_else(|| ParseError::ParseFailed("no PDF repair tool available".into()))?;

        let repaired = tool.repair(data).await?;
        tracing::debug!(
            tool = tool.name(),
            bytes = repaired.len(),
            "Repaired PDF cross-reference table"
        );

        self.parse_direct(&repaired).await
    }

    pub async fn extract_with_fallback(&self, data: &[u8]) -> ParsedDocument {
        if !self.skip_direct {
            match self.parse_direct(data).await {
                Ok(parsed) => {
                    tracing::debug!(sample = %preview(&parsed.text), "PDF parsed directly");
                    return ParsedDocument::new(DocumentFormat::Pdf, parsed.text)
                        .with_page_count(parsed.page_count)
                        .with_pdf_tier(PdfTier::Direct);
                }
                Err(e) => tracing::warn!(error = %e, "Direct PDF parse failed, attempting repair"),
            }
        }

        match self.parse_repaired(data).await {
            Ok(parsed) => {
                tracing::info!(sample = %preview(&parsed.text), "PDF parsed after repair");
                return ParsedDocument::new(DocumentFormat::Pdf, parsed.text)
                    .with_page_count(parsed.page_count)
                    .with_pdf_tier(PdfTier::Repaired);
            }
            Err(e) => tracing::warn!(error = %e, "PDF repair fallback failed"),
        }

        let text = salvage_text(data);
        tracing::info!(
            chars = text.len(),
            sample = %preview(&text),
            "Using raw byte salvage for PDF"
        );
        ParsedDocument::new(DocumentFormat::Pdf, text).with_pdf_tier(PdfTier::Salvaged)
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::from_config(&PdfConfig::default())
    }
}

#[async_trait::async_trait]
impl Parser for PdfParser {
    fn supported_formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Pdf]
    }

    async fn parse_bytes(
        &self,
        data: &[u8],
        _format: DocumentFormat,
    ) -> ParseResult<ParsedDocument> {
        Ok(self.extract_with_fallback(data).await)
    }
}
