//! Core data models: documents, questions, and their lifecycle statuses.
//!
//! Statuses serialize to the exact strings stored in the database
//! (`"Initial"`, `"Downloading"`, ...). [`DocumentStatus`] is ordered in
//! lifecycle order, so "has the document reached `Downloaded` yet" is a
//! plain comparison.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::CatalogEntry;

/// Lifecycle status of a [`Document`].
///
/// Transitions only move forward:
///
/// ```text
/// Initial → Downloading → Downloaded → Indexing → Indexed
/// ```
///
/// There is no document-level error state. A failed download or index
/// build leaves the document in `Downloading` or `Indexing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    Initial,
    Downloading,
    Downloaded,
    Indexing,
    Indexed,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 5] = [
        DocumentStatus::Initial,
        DocumentStatus::Downloading,
        DocumentStatus::Downloaded,
        DocumentStatus::Indexing,
        DocumentStatus::Indexed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Initial => "Initial",
            DocumentStatus::Downloading => "Downloading",
            DocumentStatus::Downloaded => "Downloaded",
            DocumentStatus::Indexing => "Indexing",
            DocumentStatus::Indexed => "Indexed",
        }
    }

    /// True while the document body has not been stored locally.
    pub fn needs_download(&self) -> bool {
        *self < DocumentStatus::Downloaded
    }

    /// True while no persisted index exists for the document.
    pub fn needs_index(&self) -> bool {
        *self < DocumentStatus::Indexed
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Initial" => Ok(DocumentStatus::Initial),
            "Downloading" => Ok(DocumentStatus::Downloading),
            "Downloaded" => Ok(DocumentStatus::Downloaded),
            "Indexing" => Ok(DocumentStatus::Indexing),
            "Indexed" => Ok(DocumentStatus::Indexed),
            other => bail!("invalid document status: '{}'", other),
        }
    }
}

/// Status of a [`Question`] as it moves through the answering pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionStatus {
    Initial,
    Generating,
    Answered,
    Error,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Initial => "Initial",
            QuestionStatus::Generating => "Generating",
            QuestionStatus::Answered => "Answered",
            QuestionStatus::Error => "Error",
        }
    }

    /// `Answered` and `Error` are final; nothing moves a question out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestionStatus::Answered | QuestionStatus::Error)
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Initial" => Ok(QuestionStatus::Initial),
            "Generating" => Ok(QuestionStatus::Generating),
            "Answered" => Ok(QuestionStatus::Answered),
            "Error" => Ok(QuestionStatus::Error),
            other => bail!("invalid question status: '{}'", other),
        }
    }
}

/// A catalog document as stored locally.
///
/// `body_id` is the catalog's stable key and is unique across documents.
/// The descriptive fields never change after creation; only `path` and
/// `status` are mutated, by the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub body_id: i64,
    pub doc_name: String,
    pub prod_code: String,
    pub doc_title: String,
    pub type_name: String,
    /// Local path of the downloaded body; `None` until downloaded.
    pub path: Option<String>,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to register a document first seen in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub body_id: i64,
    pub doc_name: String,
    pub prod_code: String,
    pub doc_title: String,
    pub type_name: String,
}

impl From<&CatalogEntry> for NewDocument {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            body_id: entry.body_id,
            doc_name: entry.name.trim().to_string(),
            prod_code: entry.product_code.trim().to_string(),
            doc_title: entry.title.trim().to_string(),
            type_name: entry.type_name.trim().to_string(),
        }
    }
}

/// Partial update of a document's mutable fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentUpdate {
    pub path: Option<String>,
    pub status: Option<DocumentStatus>,
}

impl DocumentUpdate {
    pub fn status(status: DocumentStatus) -> Self {
        Self {
            path: None,
            status: Some(status),
        }
    }
}

/// A user question about one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub doc_id: i64,
    pub question: String,
    /// Generated answer; set only together with [`QuestionStatus::Answered`].
    pub answer: Option<String>,
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update of a question's status and answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionUpdate {
    pub status: Option<QuestionStatus>,
    pub answer: Option<String>,
}

impl QuestionUpdate {
    pub fn status(status: QuestionStatus) -> Self {
        Self {
            status: Some(status),
            answer: None,
        }
    }

    pub fn answered(answer: impl Into<String>) -> Self {
        Self {
            status: Some(QuestionStatus::Answered),
            answer: Some(answer.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_status_order_follows_lifecycle() {
        for pair in DocumentStatus::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should precede {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_document_status_string_roundtrip() {
        for status in DocumentStatus::ALL {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("Error".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_needs_download_and_index() {
        assert!(DocumentStatus::Initial.needs_download());
        assert!(DocumentStatus::Downloading.needs_download());
        assert!(!DocumentStatus::Downloaded.needs_download());
        assert!(DocumentStatus::Downloaded.needs_index());
        assert!(DocumentStatus::Indexing.needs_index());
        assert!(!DocumentStatus::Indexed.needs_index());
        assert!(!DocumentStatus::Indexed.needs_download());
    }

    #[test]
    fn test_question_status_serializes_as_plain_string() {
        let json = serde_json::to_string(&QuestionStatus::Generating).unwrap();
        assert_eq!(json, "\"Generating\"");
        assert!(QuestionStatus::Answered.is_terminal());
        assert!(QuestionStatus::Error.is_terminal());
        assert!(!QuestionStatus::Initial.is_terminal());
    }

    #[test]
    fn test_new_document_trims_catalog_fields() {
        let entry = CatalogEntry {
            body_id: 42,
            name: " Policy A ".to_string(),
            product_code: "  P-01\n".to_string(),
            title: "\tHome insurance ".to_string(),
            type_name: " OWU ".to_string(),
        };
        let doc = NewDocument::from(&entry);
        assert_eq!(doc.body_id, 42);
        assert_eq!(doc.doc_name, "Policy A");
        assert_eq!(doc.prod_code, "P-01");
        assert_eq!(doc.doc_title, "Home insurance");
        assert_eq!(doc.type_name, "OWU");
    }
}
