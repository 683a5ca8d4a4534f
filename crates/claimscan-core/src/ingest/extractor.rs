use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::parser::{DocumentFormat, Parser};
use crate::config::ExtractionConfig;

/// Sentinel returned by every extractor when no name could be found.
pub const UNKNOWN_ENTITY: &str = "UNKNOWN";

/// Receives name fragments as they are produced.
pub type TokenSink = mpsc::UnboundedSender<String>;

/// Generation settings passed through to the remote model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ExtractOptions {
    #[must_use]
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

/// Produces the primary insured name for a document's text, or
/// [`UNKNOWN_ENTITY`]. Implementations never fail.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        options: &ExtractOptions,
        tokens: Option<&TokenSink>,
    ) -> String;
}

pub struct ExtractionPattern {
    pub name: &'static str,
    pub regex: regex::Regex,
}

impl ExtractionPattern {
    pub fn new(name: &'static str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            regex: regex::Regex::new(pattern)?,
        })
    }
}

const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    (
        "entity_marker",
        r"((?:[A-Z][\w&'-]*\.?[ \t]+)*[A-Z][\w&'-]*\.?)[ \t]*(?i:\((?:primary|main) entity\))",
    ),
    ("named_insured", r"(?i)\bnamed\s+insured[:\s]+([^.\n]+)"),
    ("insured", r"(?i)\binsured(?:\s+party)?[:\s]+([^.\n]+)"),
    ("policy_holder", r"(?i)\bpolicy\s*holder[:\s]+([^.\n]+)"),
    ("certificate_holder", r"(?i)\bcertificate\s+holder[:\s]+([^.\n]+)"),
    ("issued_to", r"(?i)\bissued\s+to[:\s]+([^.\n]+)"),
    (
        "primary_account",
        r"(?i)\brefer\s+to\s+([^\n]+?)\s+as\s+the\s+primary\s+account",
    ),
    (
        "legal_suffix",
        r"\b((?:[A-Z][A-Za-z0-9&'-]*[ \t]+){1,5}(?i:Ltd|LLC|Inc|Corporation|Corp|Co|Group|Partners|Farms|Holdings|Industries|Associates|RE|HealthCare)\b\.?)",
    ),
    (
        "industry_keyword",
        r"\b((?:[A-Z][A-Za-z0-9&'-]*[ \t]+){1,4}(?i:Healthcare|Medical|Financial|Insurance|Construction|Manufacturing|Software|Services|Solutions)\b(?:[ \t]+[A-Z][A-Za-z0-9&'-]*){0,3})",
    ),
];

fn clean_capture(raw: &str) -> &str {
    raw.trim()
        .trim_end_matches([',', ';', ':'])
        .trim_end()
}

/// Ordered cascade of patterns; the first pattern yielding a non-empty
/// capture decides the name.
pub struct RuleBasedExtractor {
    patterns: Vec<ExtractionPattern>,
}

impl RuleBasedExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: ExtractionPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    #[must_use]
    pub fn with_default_patterns() -> Self {
        let mut extractor = Self::new();

        for &(name, pattern) in DEFAULT_PATTERNS {
            match ExtractionPattern::new(name, pattern) {
                Ok(p) => extractor = extractor.with_pattern(p),
                Err(e) => tracing::error!(pattern = name, error = %e, "Skipping invalid pattern"),
            }
        }

        extractor
    }

    #[must_use]
    pub fn extract_name(&self, text: &str) -> String {
        for pattern in &self.patterns {
            let Some(captures) = pattern.regex.captures(text) else {
                continue;
            };

            let name = captures
                .iter()
                .skip(1)
                .flatten()
                .map(|m| clean_capture(m.as_str()))
                .find(|s| !s.is_empty());

            if let Some(name) = name {
                tracing::debug!(pattern = pattern.name, name, "Pattern matched insured name");
                return name.to_string();
            }
        }

        UNKNOWN_ENTITY.to_string()
    }
}

impl Default for RuleBasedExtractor {
    fn default() -> Self {
        Self::with_default_patterns()
    }
}

#[async_trait::async_trait]
impl Extractor for RuleBasedExtractor {
    async fn extract(
        &self,
        text: &str,
        _options: &ExtractOptions,
        _tokens: Option<&TokenSink>,
    ) -> String {
        self.extract_name(text)
    }
}

/// Original bytes of the document the text came from.
#[derive(Debug, Clone, Copy)]
pub struct SourceDocument<'a> {
    pub bytes: &'a [u8],
    pub format: DocumentFormat,
}

/// Patterns first, then a second look at PDFs through an alternate parse,
/// then the remote model.
pub struct CompositeExtractor {
    rules: RuleBasedExtractor,
    reparser: Option<Arc<dyn Parser>>,
    remote: Option<Box<dyn Extractor>>,
    replay_delay: Duration,
}

impl CompositeExtractor {
    #[must_use]
    pub fn new(rules: RuleBasedExtractor) -> Self {
        Self {
            rules,
            reparser: None,
            remote: None,
            replay_delay: Duration::from_millis(ExtractionConfig::default().replay_delay_ms),
        }
    }

    #[must_use]
    pub fn with_reparser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.reparser = Some(parser);
        self
    }

    #[must_use]
    pub fn with_remote(mut self, remote: Box<dyn Extractor>) -> Self {
        self.remote = Some(remote);
        self
    }

    #[must_use]
    pub fn with_replay_delay(mut self, delay: Duration) -> Self {
        self.replay_delay = delay;
        self
    }

    async fn replay(&self, name: &str, tokens: &TokenSink) {
        for c in name.chars() {
            tokio::time::sleep(self.replay_delay).await;
            if tokens.send(c.to_string()).is_err() {
                break;
            }
        }
    }

    async fn reparse_pdf(&self, source: SourceDocument<'_>) -> Option<String> {
        let parser = self.reparser.as_ref()?;
        if source.format != DocumentFormat::Pdf {
            return None;
        }

        match parser.parse_bytes(source.bytes, source.format).await {
            Ok(document) => Some(document.full_text),
            Err(e) => {
                tracing::warn!(error = %e, "Alternate PDF parse failed");
                None
            }
        }
    }

    pub async fn extract_insured_name(
        &self,
        text: &str,
        source: Option<SourceDocument<'_>>,
        options: &ExtractOptions,
        tokens: Option<&TokenSink>,
    ) -> String {
        let mut name = self.rules.extract_name(text);

        if name == UNKNOWN_ENTITY {
            if let Some(source) = source {
                if let Some(reparsed) = self.reparse_pdf(source).await {
                    name = self.rules.extract_name(&reparsed);
                    if name != UNKNOWN_ENTITY {
                        tracing::info!(
                            name = %name,
                            "Insured name found after alternate PDF parse"
                        );
                    }
                }
            }
        }

        if name != UNKNOWN_ENTITY {
            if let Some(tokens) = tokens {
                self.replay(&name, tokens).await;
            }
            return name;
        }

        match &self.remote {
            Some(remote) => {
                tracing::info!("Pattern extraction found nothing, asking remote model");
                remote.extract(text, options, tokens).await
            }
            None => UNKNOWN_ENTITY.to_string(),
        }
    }
}

impl Default for CompositeExtractor {
    fn default() -> Self {
        Self::new(RuleBasedExtractor::with_default_patterns())
    }
}

#[async_trait::async_trait]
impl Extractor for CompositeExtractor {
    async fn extract(
        &self,
        text: &str,
        options: &ExtractOptions,
        tokens: Option<&TokenSink>,
    ) -> String {
        self.extract_insured_name(text, None, options, tokens).await
    }
}
