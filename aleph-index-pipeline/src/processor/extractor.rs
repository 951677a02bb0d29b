//! Content extraction: turning a document body into record texts.

use thiserror::Error;

use aleph_store::Document;

/// Why a document's content could not be extracted. Stored on the document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("No content available for document")]
    MissingContent,

    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    #[error("Content is not valid UTF-8")]
    InvalidEncoding,

    #[error("Malformed CSV: {0}")]
    MalformedCsv(String),
}

/// Splits document content into the ordered texts that become its records.
pub trait ContentExtractor: Send + Sync {
    fn extract(
        &self,
        document: &Document,
        content: Option<&[u8]>,
    ) -> Result<Vec<String>, ExtractionError>;
}

/// Extractor for plain text, markdown and CSV.
///
/// Text and markdown yield one record per paragraph; CSV yields one record
/// per row, with the cells joined by spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextFormat {
    Plain,
    Csv,
}

fn format_of(document: &Document) -> Result<TextFormat, ExtractionError> {
    let declared = document
        .content_type
        .as_deref()
        .map(|t| t.split(';').next().unwrap_or(t).trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty() && t != "application/octet-stream");

    let content_type = match declared {
        Some(t) => t,
        None => {
            let extension = document
                .file_name
                .as_deref()
                .and_then(|name| name.rsplit_once('.'))
                .map(|(_, ext)| ext.to_ascii_lowercase());
            match extension.as_deref() {
                Some("txt") => "text/plain".to_string(),
                Some("md") | Some("markdown") => "text/markdown".to_string(),
                Some("csv") => "text/csv".to_string(),
                _ => return Err(ExtractionError::UnsupportedType("unknown".to_string())),
            }
        }
    };

    match content_type.as_str() {
        "text/plain" | "text/markdown" => Ok(TextFormat::Plain),
        "text/csv" => Ok(TextFormat::Csv),
        other => Err(ExtractionError::UnsupportedType(other.to_string())),
    }
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                out.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join(" "));
    }
    out
}

/// One record per CSV row, blank cells dropped. Quoted cells may span lines.
fn csv_rows(text: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractionError::MalformedCsv(e.to_string()))?;
        let row = record
            .iter()
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

impl ContentExtractor for TextExtractor {
    fn extract(
        &self,
        document: &Document,
        content: Option<&[u8]>,
    ) -> Result<Vec<String>, ExtractionError> {
        let format = format_of(document)?;
        let bytes = content.ok_or(ExtractionError::MissingContent)?;
        let text = std::str::from_utf8(bytes).map_err(|_| ExtractionError::InvalidEncoding)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        Ok(match format {
            TextFormat::Plain => paragraphs(text),
            TextFormat::Csv => csv_rows(text)?,
        })
    }
}
