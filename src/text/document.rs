//! Documents as seen by the pipeline: normalized text plus source metadata.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::normalizer::normalize;

/// Source format of an uploaded document, as reported by the ingestion side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Epub,
    Txt,
    #[default]
    Unknown,
}

impl DocumentFormat {
    /// Infer the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => DocumentFormat::Pdf,
            Some("docx") => DocumentFormat::Docx,
            Some("epub") => DocumentFormat::Epub,
            Some("txt") | Some("text") | Some("md") => DocumentFormat::Txt,
            _ => DocumentFormat::Unknown,
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentFormat::Pdf => write!(f, "pdf"),
            DocumentFormat::Docx => write!(f, "docx"),
            DocumentFormat::Epub => write!(f, "epub"),
            DocumentFormat::Txt => write!(f, "txt"),
            DocumentFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// Descriptive metadata carried alongside the text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: String,
    pub format: DocumentFormat,
}

impl DocumentMeta {
    /// Metadata derived from a file path: title from the file stem, format from the extension.
    pub fn from_path(path: &Path) -> Self {
        let title = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "Untitled".to_string());
        Self { title, format: DocumentFormat::from_path(path) }
    }
}

/// An uploaded document after normalization. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    meta: DocumentMeta,
    text: String,
}

impl Document {
    /// Normalize already-decoded text into a document.
    pub fn new(raw_text: &str, meta: DocumentMeta) -> Self {
        Self { meta, text: normalize(raw_text) }
    }

    pub fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    /// Normalized text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
