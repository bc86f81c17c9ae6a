//! Core data models used throughout Harborlight.
//!
//! These types represent the documents, chunks, and index records that flow
//! through the knowledge-base update pipeline, and the answers produced by
//! the query pipeline.

use serde::Serialize;

/// Document type, dispatched by archive entry extension.
///
/// This is a closed set: any entry whose extension maps to none of these
/// variants is skipped by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    PlainText,
    Markdown,
    PdfExtract,
}

impl SourceKind {
    /// Map a lowercase file extension to a document type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "txt" => Some(SourceKind::PlainText),
            "md" => Some(SourceKind::Markdown),
            "pdf" => Some(SourceKind::PdfExtract),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::PlainText => "plain_text",
            SourceKind::Markdown => "markdown",
            SourceKind::PdfExtract => "pdf_extract",
        }
    }
}

/// A normalized text unit extracted from the archive.
///
/// Created by the loader, immutable thereafter, consumed by the chunker.
#[derive(Debug, Clone)]
pub struct Document {
    /// Archive entry path; acts as the document identifier.
    pub path: String,
    /// Full extracted text.
    pub text: String,
    pub kind: SourceKind,
    /// File name of the archive the document came from.
    pub origin: String,
}

/// A bounded, overlapping segment of a document's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Stable identifier derived from the document path and ordinal, so a
    /// re-upsert overwrites rather than duplicates.
    pub id: String,
    pub document_path: String,
    /// Inherited from the parent document; carried into index metadata.
    pub kind: SourceKind,
    pub index: i64,
    pub text: String,
}

/// An embedded chunk ready to be written to the vector index.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub text: String,
    pub metadata: serde_json::Value,
}

/// A record returned from the vector index for a query, with its
/// similarity score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// Provenance of a generated answer, disclosed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    KnowledgeBase,
    WebSearch,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::KnowledgeBase => "knowledge_base",
            AnswerSource::WebSearch => "web_search",
        }
    }
}

/// Final result of the answer pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_dispatch_is_closed() {
        assert_eq!(SourceKind::from_extension("txt"), Some(SourceKind::PlainText));
        assert_eq!(SourceKind::from_extension("md"), Some(SourceKind::Markdown));
        assert_eq!(SourceKind::from_extension("pdf"), Some(SourceKind::PdfExtract));
        assert_eq!(SourceKind::from_extension("docx"), None);
        assert_eq!(SourceKind::from_extension(""), None);
    }

    #[test]
    fn answer_source_labels() {
        assert_eq!(AnswerSource::KnowledgeBase.as_str(), "knowledge_base");
        assert_eq!(AnswerSource::WebSearch.as_str(), "web_search");
    }
}
