//! Storage abstraction for documents and questions.
//!
//! The [`Store`] trait is the single source of truth for lifecycle state.
//! The lifecycle controller persists every transition through it and keeps
//! nothing of its own, so any implementation that honors these contracts can
//! back the service (SQLite in the application, [`memory::InMemoryStore`]
//! for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, DocumentUpdate, NewDocument, Question, QuestionUpdate};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_documents`](Store::list_documents) | Page through documents by id |
/// | [`get_document_by_body_id`](Store::get_document_by_body_id) | Catalog sync lookup |
/// | [`create_document`](Store::create_document) | Register a catalog entry |
/// | [`get_or_create_document`](Store::get_or_create_document) | Insert-or-fetch by `body_id` |
/// | [`update_document`](Store::update_document) | Set path and/or status |
/// | [`create_question`](Store::create_question) | Insert-or-fetch by `(doc_id, text)` |
/// | [`update_question`](Store::update_question) | Set status and/or answer |
#[async_trait]
pub trait Store: Send + Sync {
    /// Documents ordered by id, skipping `skip` and returning at most `limit`.
    async fn list_documents(&self, skip: i64, limit: i64) -> Result<Vec<Document>>;

    async fn get_document(&self, id: i64) -> Result<Option<Document>>;

    async fn get_document_by_body_id(&self, body_id: i64) -> Result<Option<Document>>;

    async fn get_document_by_path(&self, path: &str) -> Result<Option<Document>>;

    /// Create a document in `Initial` status. Fails if `body_id` exists.
    async fn create_document(&self, doc: &NewDocument) -> Result<Document>;

    /// Create a document in `Initial` status, or return the existing record
    /// with the same `body_id` untouched.
    ///
    /// The boolean is `true` when a new record was created. Concurrent calls
    /// for one `body_id` create exactly one document.
    async fn get_or_create_document(&self, doc: &NewDocument) -> Result<(Document, bool)>;

    /// Apply a partial update and return the updated record.
    /// Fails if the document does not exist.
    async fn update_document(&self, id: i64, update: &DocumentUpdate) -> Result<Document>;

    async fn count_documents(&self) -> Result<i64>;

    /// Questions ordered by id, skipping `skip` and returning at most `limit`.
    async fn list_questions(&self, skip: i64, limit: i64) -> Result<Vec<Question>>;

    async fn get_question(&self, id: i64) -> Result<Option<Question>>;

    /// Exact-text lookup of a question for a document.
    async fn find_question(&self, doc_id: i64, question: &str) -> Result<Option<Question>>;

    /// Create a question in `Initial` status, or return the existing record
    /// for the same `(doc_id, question)`.
    ///
    /// The boolean is `true` when a new record was created.
    async fn create_question(&self, doc_id: i64, question: &str) -> Result<(Question, bool)>;

    /// Apply a partial update and return the updated record.
    /// Fails if the question does not exist.
    async fn update_question(&self, id: i64, update: &QuestionUpdate) -> Result<Question>;

    async fn count_questions(&self) -> Result<i64>;
}
