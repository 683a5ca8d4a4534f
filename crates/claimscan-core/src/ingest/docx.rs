use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};

use super::parser::{DocumentFormat, ParseError, ParseResult, ParsedDocument, Parser};

const DOCUMENT_PART: &str = "word/document.xml";

/// Raw text of a Word document: text runs in order, one line per paragraph.
/// A corrupt container is reported as [`ParseError::Docx`]; there is no
/// lower-fidelity fallback.
pub struct DocxParser;

impl DocxParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn read_document_xml(data: &[u8]) -> ParseResult<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data))
            .map_err(|e| ParseError::Docx(format!("not a DOCX container: {e}")))?;

        let mut part = archive
            .by_name(DOCUMENT_PART)
            .map_err(|e| ParseError::Docx(format!("missing {DOCUMENT_PART}: {e}")))?;

        let mut xml = String::new();
        part.read_to_string(&mut xml)
            .map_err(|e| ParseError::Docx(format!("unreadable {DOCUMENT_PART}: {e}")))?;

        Ok(xml)
    }

    fn extract_raw_text(xml: &str) -> ParseResult<String> {
        let mut reader = Reader::from_str(xml);
        let mut text = String::new();
        let mut in_text_run = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
                Ok(Event::Text(t)) if in_text_run => {
                    let unescaped = t
                        .unescape()
                        .map_err(|e| ParseError::Docx(format!("bad text run: {e}")))?;
                    text.push_str(&unescaped);
                }
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"w:t" => in_text_run = false,
                    b"w:p" => text.push('\n'),
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"w:tab" => text.push('\t'),
                    b"w:br" | b"w:cr" => text.push('\n'),
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ParseError::Docx(format!(
                        "malformed XML at byte {}: {e}",
                        reader.buffer_position()
                    )))
                }
                _ => {}
            }
        }

        Ok(text)
    }
}

impl Default for DocxParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Parser for DocxParser {
    fn supported_formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Docx]
    }

    async fn parse_bytes(
        &self,
        data: &[u8],
        format: DocumentFormat,
    ) -> ParseResult<ParsedDocument> {
        let xml = Self::read_document_xml(data)?;
        let text = Self::extract_raw_text(&xml)?;

        tracing::debug!(chars = text.len(), "Parsed DOCX document");

        Ok(ParsedDocument::new(format, text))
    }
}
