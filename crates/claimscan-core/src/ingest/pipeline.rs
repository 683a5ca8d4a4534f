use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use super::docx::DocxParser;
use super::extractor::{CompositeExtractor, ExtractOptions, SourceDocument};
use super::normalizer::MatchEngine;
use super::parser::{
    CompositeParser, ContentValidator, DocumentFormat, ParseError, Parser, PlainTextParser,
};
use super::pdf::{PdfParser, PdfTier};
use super::queue::{ProcessingTask, QueueError, SerialQueue};
use super::remote::{RemoteError, RemoteExtractor};
use crate::config::PipelineConfig;
use crate::document::DocumentRecord;
use crate::registry::RegistryEntry;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Remote client error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Record error: {0}")]
    Record(#[from] crate::Error),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Text and insured name extracted from one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub raw_text: String,
    pub insured_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_tier: Option<PdfTier>,
}

/// An uploaded file awaiting processing.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

pub struct IngestPipeline {
    parser: Arc<dyn Parser>,
    queue: Arc<SerialQueue>,
    validator: ContentValidator,
    extractor: CompositeExtractor,
    matcher: MatchEngine,
    options: ExtractOptions,
}

impl IngestPipeline {
    /// `queue` handles PDFs; `parser` handles everything else directly.
    #[must_use]
    pub fn new(
        parser: Arc<dyn Parser>,
        queue: Arc<SerialQueue>,
        extractor: CompositeExtractor,
    ) -> Self {
        Self {
            parser,
            queue,
            validator: ContentValidator::default(),
            extractor,
            matcher: MatchEngine::default(),
            options: ExtractOptions::default(),
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: ContentValidator) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn with_match_engine(mut self, matcher: MatchEngine) -> Self {
        self.matcher = matcher;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Wire the full stack from configuration. Spawns the queue worker, so
    /// this must run inside a tokio runtime.
    pub fn from_config(config: &PipelineConfig) -> IngestResult<Self> {
        let pdf = PdfParser::from_config(&config.pdf);
        let reparser: Arc<dyn Parser> = Arc::new(pdf.alternate_path());

        let parser: Arc<dyn Parser> = Arc::new(
            CompositeParser::new()
                .with_parser(Box::new(PlainTextParser::new()))
                .with_parser(Box::new(DocxParser::new()))
                .with_parser(Box::new(pdf)),
        );
        let validator = ContentValidator::from_config(&config.validation);
        let queue = Arc::new(SerialQueue::new(
            Arc::clone(&parser),
            validator.clone(),
            config.queue.clone(),
        ));

        let mut extractor = CompositeExtractor::default()
            .with_remote(Box::new(RemoteExtractor::new(&config.remote)?))
            .with_replay_delay(Duration::from_millis(config.extraction.replay_delay_ms));
        if config.extraction.reparse_pdf {
            extractor = extractor.with_reparser(reparser);
        }

        Ok(Self::new(parser, queue, extractor)
            .with_validator(validator)
            .with_match_engine(MatchEngine::new(
                config.matching.metric,
                config.matching.threshold,
            ))
            .with_options(ExtractOptions::from_config(&config.extraction)))
    }

    pub fn queue(&self) -> &Arc<SerialQueue> {
        &self.queue
    }

    pub fn match_engine(&self) -> &MatchEngine {
        &self.matcher
    }

    /// Extract text and the insured name from one upload. When `progress`
    /// is given it receives the cumulative partial name after every token;
    /// all of it is delivered before this returns.
    pub async fn process(
        &self,
        file_name: &str,
        bytes: &[u8],
        progress: Option<mpsc::UnboundedSender<String>>,
    ) -> IngestResult<ExtractionResult> {
        let format = DocumentFormat::from_file_name(file_name)?;

        let document = match format {
            DocumentFormat::Pdf => {
                let task = ProcessingTask::new(bytes.to_vec(), format.as_str());
                tracing::debug!(file = file_name, task_id = %task.id, "Queueing PDF");
                self.queue.enqueue(task).await?
            }
            DocumentFormat::Docx => {
                let document = self.parser.parse_bytes(bytes, format).await?;
                self.validator.validate(&document.full_text)?;
                document
            }
            DocumentFormat::PlainText => self.parser.parse_bytes(bytes, format).await?,
        };

        let source = SourceDocument { bytes, format };
        let text = &document.full_text;

        let insured_name = match progress {
            Some(progress) => {
                let (tokens, mut received) = mpsc::unbounded_channel::<String>();

                let extraction = async move {
                    let name = self
                        .extractor
                        .extract_insured_name(text, Some(source), &self.options, Some(&tokens))
                        .await;
                    drop(tokens);
                    name
                };
                let forwarding = async {
                    let mut partial = String::new();
                    while let Some(token) = received.recv().await {
                        partial.push_str(&token);
                        let _ = progress.send(partial.clone());
                    }
                    partial
                };

                let (name, partial) = tokio::join!(extraction, forwarding);
                // The last update always matches the returned name.
                if partial != name {
                    let _ = progress.send(name.clone());
                }
                name
            }
            None => {
                self.extractor
                    .extract_insured_name(text, Some(source), &self.options, None)
                    .await
            }
        };

        tracing::info!(
            file = file_name,
            format = %format,
            tier = ?document.pdf_tier,
            insured = %insured_name,
            "Document processed"
        );

        Ok(ExtractionResult {
            raw_text: document.full_text,
            insured_name,
            pdf_tier: document.pdf_tier,
        })
    }

    /// Process one upload end to end and resolve it against `registry`.
    /// Processing failures end up in the record, not in the `Err` arm.
    pub async fn process_document(
        &self,
        file: &InputFile,
        registry: &[RegistryEntry],
        progress: Option<mpsc::UnboundedSender<String>>,
    ) -> IngestResult<DocumentRecord> {
        let mut record = DocumentRecord::new(file.file_name.as_str());
        record.start_processing()?;

        match self.process(&file.file_name, &file.bytes, progress).await {
            Ok(extraction) => {
                let matched = self.matcher.find_best_match(&extraction.insured_name, registry);
                record.complete(extraction.insured_name, &matched)?;
            }
            Err(e) => {
                tracing::error!(file = %file.file_name, error = %e, "Document processing failed");
                record.fail(e.to_string())?;
            }
        }

        Ok(record)
    }

    /// Process a batch concurrently. PDFs still go through the queue one at
    /// a time. Records come back in input order.
    pub async fn process_files(
        &self,
        files: &[InputFile],
        registry: &[RegistryEntry],
    ) -> IngestResult<Vec<DocumentRecord>> {
        let started = std::time::Instant::now();

        let records = join_all(
            files
                .iter()
                .map(|file| self.process_document(file, registry, None)),
        )
        .await
        .into_iter()
        .collect::<IngestResult<Vec<_>>>()?;

        tracing::info!(
            documents = records.len(),
            failed = records.iter().filter(|r| r.error.is_some()).count(),
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Batch processed"
        );

        Ok(records)
    }
}
