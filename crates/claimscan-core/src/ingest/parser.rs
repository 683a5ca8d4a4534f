use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::docx::DocxParser;
use super::pdf::{PdfParser, PdfTier};
use crate::config::ValidationConfig;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse failed: {0}")]
    ParseFailed(String),
    #[error("Error parsing DOCX: {0}")]
    Docx(String),
    #[error("Invalid content detected: {0}")]
    InvalidContent(String),
    #[error("Parse timed out after {0:?}")]
    Timeout(Duration),
}

impl ParseError {
    /// Whether another attempt on the same bytes could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ParseFailed(_) | Self::InvalidContent(_) | Self::Timeout(_)
        )
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Resolve the format from the extension of an uploaded file name.
    pub fn from_file_name(name: &str) -> ParseResult<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ParseError::UnsupportedFormat("no extension".into()))?;

        Self::from_extension(ext).ok_or_else(|| ParseError::UnsupportedFormat(ext.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "txt",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub format: DocumentFormat,
    pub full_text: String,
    pub page_count: Option<u32>,
    pub pdf_tier: Option<PdfTier>,
}

impl ParsedDocument {
    #[must_use]
    pub fn new(format: DocumentFormat, full_text: String) -> Self {
        Self {
            format,
            full_text,
            page_count: None,
            pdf_tier: None,
        }
    }

    #[must_use]
    pub fn with_page_count(mut self, count: u32) -> Self {
        self.page_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_pdf_tier(mut self, tier: PdfTier) -> Self {
        self.pdf_tier = Some(tier);
        self
    }
}

#[async_trait::async_trait]
pub trait Parser: Send + Sync {
    fn supported_formats(&self) -> &[DocumentFormat];

    fn can_parse(&self, format: DocumentFormat) -> bool {
        self.supported_formats().contains(&format)
    }

    async fn parse_bytes(&self, data: &[u8], format: DocumentFormat) -> ParseResult<ParsedDocument>;

    async fn parse_file(&self, path: &Path) -> ParseResult<ParsedDocument> {
        let name = path.to_string_lossy();
        let format = DocumentFormat::from_file_name(&name)?;

        if !self.can_parse(format) {
            return Err(ParseError::UnsupportedFormat(format.to_string()));
        }

        let data = tokio::fs::read(path).await?;
        self.parse_bytes(&data, format).await
    }
}

pub struct PlainTextParser;

impl PlainTextParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Parser for PlainTextParser {
    fn supported_formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::PlainText]
    }

    async fn parse_bytes(
        &self,
        data: &[u8],
        format: DocumentFormat,
    ) -> ParseResult<ParsedDocument> {
        let text = String::from_utf8_lossy(data).into_owned();
        Ok(ParsedDocument::new(format, text))
    }
}

/// Rejects extracted text that is too short or carries known corruption
/// artifacts (multipart boundaries, generator banners from broken PDFs).
#[derive(Debug, Clone)]
pub struct ContentValidator {
    min_text_len: usize,
    corruption_markers: Vec<String>,
}

impl ContentValidator {
    #[must_use]
    pub fn new(min_text_len: usize, corruption_markers: Vec<String>) -> Self {
        Self {
            min_text_len,
            corruption_markers,
        }
    }

    #[must_use]
    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(config.min_text_len, config.corruption_markers.clone())
    }

    pub fn validate(&self, text: &str) -> ParseResult<()> {
        if let Some(marker) = self
            .corruption_markers
            .iter()
            .find(|m| text.contains(m.as_str()))
        {
            return Err(ParseError::InvalidContent(format!("contains '{marker}'")));
        }

        let len = text.trim().chars().count();
        if len < self.min_text_len {
            return Err(ParseError::InvalidContent(format!(
                "only {len} characters of text (minimum {})",
                self.min_text_len
            )));
        }

        Ok(())
    }
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

/// Dispatches raw bytes to the parser registered for the declared format.
pub struct CompositeParser {
    parsers: Vec<Box<dyn Parser>>,
}

impl CompositeParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Box<dyn Parser>) -> Self {
        self.parsers.push(parser);
        self
    }

    fn find_parser(&self, format: DocumentFormat) -> Option<&dyn Parser> {
        self.parsers.iter().find(|p| p.can_parse(format)).map(AsRef::as_ref)
    }

    /// Extract text from bytes whose format is given by a file extension.
    pub async fn extract_text(
        &self,
        data: &[u8],
        declared_extension: &str,
    ) -> ParseResult<ParsedDocument> {
        let ext = declared_extension.trim_start_matches('.');
        let format = DocumentFormat::from_extension(ext)
            .ok_or_else(|| ParseError::UnsupportedFormat(ext.to_lowercase()))?;

        self.parse_bytes(data, format).await
    }
}

impl Default for CompositeParser {
    fn default() -> Self {
        Self::new()
            .with_parser(Box::new(PlainTextParser::new()))
            .with_parser(Box::new(DocxParser::new()))
            .with_parser(Box::new(PdfParser::default()))
    }
}

#[async_trait::async_trait]
impl Parser for CompositeParser {
    fn supported_formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::PlainText, DocumentFormat::Pdf, DocumentFormat::Docx]
    }

    fn can_parse(&self, format: DocumentFormat) -> bool {
        self.find_parser(format).is_some()
    }

    async fn parse_bytes(
        &self,
        data: &[u8],
        format: DocumentFormat,
    ) -> ParseResult<ParsedDocument> {
        let parser = self
            .find_parser(format)
            .ok_or_else(|| ParseError::UnsupportedFormat(format.to_string()))?;

        parser.parse_bytes(data, format).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_text_parser() {
        let parser = PlainTextParser::new();
        let data = b"Named Insured: Riley HealthCare LLC";

        let doc = parser.parse_bytes(data, DocumentFormat::PlainText).await.unwrap();

        assert_eq!(doc.full_text, "Named Insured: Riley HealthCare LLC");
        assert!(doc.pdf_tier.is_none());
    }

    #[tokio::test]
    async fn test_plain_text_invalid_utf8_is_lossy() {
        let parser = PlainTextParser::new();

        let doc = parser
            .parse_bytes(b"Acme \xff Corp", DocumentFormat::PlainText)
            .await
            .unwrap();

        assert_eq!(doc.full_text, "Acme \u{fffd} Corp");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_extension("pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("DOCX"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("txt"), Some(DocumentFormat::PlainText));
        assert_eq!(DocumentFormat::from_extension("xlsx"), None);
    }

    #[test]
    fn test_format_from_file_name() {
        assert_eq!(
            DocumentFormat::from_file_name("claims/sample1.PDF").unwrap(),
            DocumentFormat::Pdf
        );
        assert!(matches!(
            DocumentFormat::from_file_name("scan.png"),
            Err(ParseError::UnsupportedFormat(ext)) if ext == "png"
        ));
        assert!(matches!(
            DocumentFormat::from_file_name("README"),
            Err(ParseError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_composite_rejects_unknown_extension() {
        let parser = CompositeParser::default();

        let result = parser.extract_text(b"hello", "xls").await;

        assert!(matches!(result, Err(ParseError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_composite_dispatches_text() {
        let parser = CompositeParser::default();

        let doc = parser.extract_text(b"Issued to: Acme Corp", ".txt").await.unwrap();

        assert_eq!(doc.format, DocumentFormat::PlainText);
        assert_eq!(doc.full_text, "Issued to: Acme Corp");
    }

    #[tokio::test]
    async fn test_composite_without_parser_for_format() {
        let parser = CompositeParser::new().with_parser(Box::new(PlainTextParser::new()));

        let result = parser.extract_text(b"%PDF-1.4", "pdf").await;

        assert!(matches!(result, Err(ParseError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_validator_rejects_markers_and_short_text() {
        let validator = ContentValidator::default();

        assert!(validator.validate("Named Insured: Riley HealthCare LLC").is_ok());
        assert!(matches!(
            validator.validate("------WebKitFormBoundaryabc123 Named Insured: Acme"),
            Err(ParseError::InvalidContent(_))
        ));
        assert!(matches!(
            validator.validate("Created by PyFPDF 1.7.2 http://pyfpdf.googlecode.com"),
            Err(ParseError::InvalidContent(_))
        ));
        assert!(matches!(
            validator.validate("   short  "),
            Err(ParseError::InvalidContent(_))
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ParseError::ParseFailed("xref".into()).is_retryable());
        assert!(ParseError::InvalidContent("short".into()).is_retryable());
        assert!(ParseError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(!ParseError::UnsupportedFormat("png".into()).is_retryable());
        assert!(!ParseError::Docx("corrupt".into()).is_retryable());
    }
}
