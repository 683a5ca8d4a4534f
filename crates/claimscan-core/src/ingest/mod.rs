mod docx;
mod extractor;
mod normalizer;
mod parser;
mod pdf;
mod pipeline;
mod queue;
mod remote;

pub use docx::DocxParser;
pub use extractor::{
    CompositeExtractor, ExtractOptions, ExtractionPattern, Extractor,
    RuleBasedExtractor, SourceDocument, TokenSink, UNKNOWN_ENTITY,
};
pub use normalizer::{
    normalize_name, MatchEngine, MatchResult, SimilarityMetric, CORPORATE_SUFFIXES,
    DEFAULT_MATCH_THRESHOLD, NO_MATCH_NAME,
};
pub use parser::{
    CompositeParser, ContentValidator, DocumentFormat, ParseError, ParseResult, ParsedDocument,
    Parser, PlainTextParser,
};
pub use pdf::{
    salvage_text, LopdfBackend, PdfBackend, PdfParser, PdfRepairTool, PdfText, PdfTier,
    QpdfRepair,
};
pub use pipeline::{ExtractionResult, IngestError, IngestPipeline, IngestResult, InputFile};
pub use queue::{
    backoff_delay, ProcessingTask, QueueError, QueueResult, SerialQueue, TaskHandle,
};
pub use remote::{
    build_extraction_prompt, CompletionFrame, CompletionRequest, RemoteError, RemoteExtractor,
    RemoteResult,
};
