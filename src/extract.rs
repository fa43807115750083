//! Text extraction for uploaded files.
//!
//! Dispatches on a closed [`ExtractionStrategy`] chosen from the file
//! extension (then the declared media type). Binary formats are not parsed:
//! they get a deterministic placeholder naming the file, its size and an
//! estimated page count.
//!
//! Extraction never panics and never raises. Every outcome is a
//! [`ProcessedFile`], with `status = Error` and a message when reading or
//! decoding fails.

use chrono::Utc;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::ExtractionError;
use crate::models::{word_count, FileMetadata, ProcessedFile, ProcessedStatus};
use crate::validate::{extension_of, FileDescriptor};

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_DOC: &str = "application/msword";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Text,
    Csv,
    /// PDF and other binary document formats.
    PdfPlaceholder,
    /// Unknown types, decoded as lossy UTF-8.
    FallbackText,
}

impl ExtractionStrategy {
    pub fn select(name: &str, media_type: &str) -> Self {
        let by_extension = extension_of(name).and_then(|ext| match ext.as_str() {
            ".txt" => Some(ExtractionStrategy::Text),
            ".csv" => Some(ExtractionStrategy::Csv),
            ".pdf" | ".docx" | ".doc" => Some(ExtractionStrategy::PdfPlaceholder),
            _ => None,
        });
        if let Some(strategy) = by_extension {
            return strategy;
        }

        let media_type = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match media_type.as_str() {
            MIME_TEXT => ExtractionStrategy::Text,
            MIME_CSV => ExtractionStrategy::Csv,
            MIME_PDF | MIME_DOCX | MIME_DOC => ExtractionStrategy::PdfPlaceholder,
            _ => ExtractionStrategy::FallbackText,
        }
    }
}

/// Media type implied by a file name, for sources that carry none (local
/// paths). Unknown extensions map to `application/octet-stream`.
pub fn media_type_for(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some(".txt") => MIME_TEXT,
        Some(".csv") => MIME_CSV,
        Some(".pdf") => MIME_PDF,
        Some(".docx") => MIME_DOCX,
        Some(".doc") => MIME_DOC,
        _ => "application/octet-stream",
    }
}

/// Where an upload's bytes come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl FileSource {
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, ExtractionError> {
        match self {
            FileSource::Bytes(bytes) => Ok(bytes.clone()),
            FileSource::Path(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| ExtractionError::Read {
                        name: name.to_string(),
                        source,
                    })
            }
        }
    }
}

/// Output of a successful strategy run, before it is wrapped into a
/// [`ProcessedFile`].
struct Extraction {
    content: String,
    text: String,
    page_count: Option<u32>,
    headers: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct TextExtractor {
    csv_sample_rows: usize,
    bytes_per_page: u64,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

impl TextExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            csv_sample_rows: config.csv_sample_rows,
            bytes_per_page: config.bytes_per_page.max(1),
        }
    }

    /// Reads `source` and extracts it. A read failure yields a failed file.
    pub async fn extract_source(&self, file: &FileDescriptor, source: &FileSource) -> ProcessedFile {
        match source.read(&file.name).await {
            Ok(bytes) => self.extract(file, &bytes),
            Err(e) => failed(file, &e),
        }
    }

    pub fn extract(&self, file: &FileDescriptor, bytes: &[u8]) -> ProcessedFile {
        let strategy = ExtractionStrategy::select(&file.name, &file.media_type);
        let result = match strategy {
            ExtractionStrategy::Text => extract_plain(file, bytes),
            ExtractionStrategy::Csv => self.extract_csv(file, bytes),
            ExtractionStrategy::PdfPlaceholder => Ok(self.placeholder(file, bytes.len() as u64)),
            ExtractionStrategy::FallbackText => Ok(extract_lossy(bytes)),
        };

        match result.and_then(|ex| non_empty(file, ex)) {
            Ok(ex) => {
                tracing::debug!(
                    file = %file.name,
                    strategy = ?strategy,
                    words = word_count(&ex.text),
                    "extracted text"
                );
                completed(file, ex)
            }
            Err(e) => {
                tracing::warn!(file = %file.name, error = %e, "extraction failed");
                failed(file, &e)
            }
        }
    }

    fn extract_csv(&self, file: &FileDescriptor, bytes: &[u8]) -> Result<Extraction, ExtractionError> {
        let content = decode_utf8(file, bytes)?;
        let mut lines = content.lines().map(str::trim_end).filter(|l| !l.trim().is_empty());

        let headers: Vec<String> = lines
            .next()
            .map(|h| h.split(',').map(|c| c.trim().to_string()).collect())
            .unwrap_or_default();
        let rows: Vec<&str> = lines.collect();

        let mut text = format!(
            "CSV File: {}\nHeaders: {}\nTotal Rows: {}\n",
            file.name,
            headers.join(", "),
            rows.len()
        );
        if !rows.is_empty() {
            let shown = rows.len().min(self.csv_sample_rows);
            text.push_str(&format!("\nSample Data (first {} rows):\n", shown));
            for row in &rows[..shown] {
                text.push_str(row);
                text.push('\n');
            }
            if rows.len() > shown {
                text.push_str(&format!("... and {} more rows\n", rows.len() - shown));
            }
        }

        Ok(Extraction {
            content,
            text,
            page_count: None,
            headers: Some(headers),
        })
    }

    fn placeholder(&self, file: &FileDescriptor, size: u64) -> Extraction {
        let pages = estimated_pages(size, self.bytes_per_page);
        let format = file
            .extension()
            .map(|e| e.trim_start_matches('.').to_ascii_uppercase())
            .unwrap_or_else(|| "binary".to_string());
        let text = format!(
            "[Simulated {format} extraction]\n\
             File: {name}\n\
             Size: {size} bytes\n\
             Estimated pages: {pages}\n\n\
             This is placeholder content. {format} parsing is not performed, so the \
             document text is unavailable and this block describes the source file only.\n",
            format = format,
            name = file.name,
            size = size,
            pages = pages,
        );
        Extraction {
            content: String::new(),
            text,
            page_count: Some(pages),
            headers: None,
        }
    }
}

/// `ceil(size / bytes_per_page)`, at least one page.
pub fn estimated_pages(size: u64, bytes_per_page: u64) -> u32 {
    let pages = size.div_ceil(bytes_per_page.max(1)).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

fn decode_utf8(file: &FileDescriptor, bytes: &[u8]) -> Result<String, ExtractionError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| ExtractionError::InvalidUtf8 {
        name: file.name.clone(),
    })
}

fn extract_plain(file: &FileDescriptor, bytes: &[u8]) -> Result<Extraction, ExtractionError> {
    let content = decode_utf8(file, bytes)?;
    Ok(Extraction {
        text: content.clone(),
        content,
        page_count: None,
        headers: None,
    })
}

fn extract_lossy(bytes: &[u8]) -> Extraction {
    let content = String::from_utf8_lossy(bytes).into_owned();
    Extraction {
        text: content.clone(),
        content,
        page_count: None,
        headers: None,
    }
}

fn non_empty(file: &FileDescriptor, ex: Extraction) -> Result<Extraction, ExtractionError> {
    if ex.text.trim().is_empty() {
        return Err(ExtractionError::Empty {
            name: file.name.clone(),
        });
    }
    Ok(ex)
}

fn completed(file: &FileDescriptor, ex: Extraction) -> ProcessedFile {
    ProcessedFile {
        id: Uuid::new_v4().to_string(),
        name: file.name.clone(),
        media_type: file.media_type.clone(),
        size: file.size,
        content: ex.content,
        metadata: FileMetadata {
            word_count: word_count(&ex.text),
            page_count: ex.page_count,
            date_extracted: Some(Utc::now()),
            headers: ex.headers,
            language: None,
        },
        extracted_text: ex.text,
        status: ProcessedStatus::Completed,
        error: None,
    }
}

fn failed(file: &FileDescriptor, err: &ExtractionError) -> ProcessedFile {
    ProcessedFile {
        id: Uuid::new_v4().to_string(),
        name: file.name.clone(),
        media_type: file.media_type.clone(),
        size: file.size,
        content: String::new(),
        extracted_text: String::new(),
        metadata: FileMetadata {
            word_count: 0,
            date_extracted: Some(Utc::now()),
            ..Default::default()
        },
        status: ProcessedStatus::Error,
        error: Some(err.to_string()),
    }
}
