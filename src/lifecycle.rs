//! Document lifecycle and question-answering pipeline.
//!
//! A document moves `Initial → Downloading → Downloaded → Indexing →
//! Indexed`, driven only by questions asked about it. Answering a question:
//!
//! 1. Mark it `Generating`.
//! 2. Under the document's lock, download the body if the document is
//!    before `Downloaded`, then build and persist the index if it is before
//!    `Indexed`. Both checks re-read the stored status, so a step is never
//!    repeated once the document is past it.
//! 3. Load the persisted index and query it (outside the lock).
//! 4. Mark it `Answered` with the response.
//!
//! Any failure marks the question `Error` and leaves the document where it
//! stopped. A document left in `Downloading` or `Indexing` by a failure is
//! retried by the next question, since its status is still before the
//! step's target.
//!
//! Submission never blocks on this work: [`LifecycleController`] pushes
//! question ids onto an unbounded queue consumed by a fixed pool of workers.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio::task::JoinHandle;

use gtc_qa_core::catalog::Catalog;
use gtc_qa_core::models::{
    Document, DocumentStatus, DocumentUpdate, NewDocument, Question, QuestionStatus,
    QuestionUpdate,
};
use gtc_qa_core::store::Store;

use crate::engine::{index_dir_for, IndexEngine};

/// Outcome of a catalog sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    /// Entries in the catalog listing.
    pub fetched: usize,
    /// Documents created by this sync.
    pub created: usize,
    /// Entries that already had a document.
    pub existing: usize,
}

/// Rejected question submission.
#[derive(Debug)]
pub enum SubmitError {
    DocumentNotFound(i64),
    EmptyPrompt,
    Other(anyhow::Error),
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::DocumentNotFound(id) => write!(f, "document {} not found", id),
            SubmitError::EmptyPrompt => write!(f, "prompt must not be empty"),
            SubmitError::Other(e) => write!(f, "{:#}", e),
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<anyhow::Error> for SubmitError {
    fn from(e: anyhow::Error) -> Self {
        SubmitError::Other(e)
    }
}

/// Failed catalog sync, split by which side failed.
#[derive(Debug)]
pub enum RefreshError {
    /// The catalog listing could not be fetched or parsed.
    Catalog(anyhow::Error),
    /// Registering documents in the store failed.
    Store(anyhow::Error),
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::Catalog(e) => write!(f, "Failed to list catalog documents: {:#}", e),
            RefreshError::Store(e) => write!(f, "Failed to register catalog documents: {:#}", e),
        }
    }
}

impl std::error::Error for RefreshError {}

/// One async mutex per document id, created on first use.
///
/// Entries are never removed, so the map holds at most one small mutex per
/// known document.
#[derive(Default)]
pub struct DocumentLocks {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentLocks {
    pub async fn lock(&self, doc_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(doc_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Reduce a server-assigned file name to a safe final path component.
fn local_file_name(server_name: &str, body_id: i64) -> String {
    let name = server_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        format!("{}.pdf", body_id)
    } else {
        name.to_string()
    }
}

/// The transitions and answering steps, shared by all workers.
pub struct Pipeline {
    store: Arc<dyn Store>,
    catalog: Arc<dyn Catalog>,
    engine: Arc<dyn IndexEngine>,
    documents_dir: PathBuf,
    locks: DocumentLocks,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn Catalog>,
        engine: Arc<dyn IndexEngine>,
        documents_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            catalog,
            engine,
            documents_dir: documents_dir.into(),
            locks: DocumentLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Answer a stored question, recording the outcome on it.
    ///
    /// Pipeline failures end in `Error` and are not returned; the `Err`
    /// case means the question could not be loaded or its final status
    /// could not be written.
    pub async fn answer_question(&self, question_id: i64) -> Result<Question> {
        let question = self
            .store
            .get_question(question_id)
            .await?
            .ok_or_else(|| anyhow!("question {} not found", question_id))?;

        match self.generate(&question).await {
            Ok(answer) => {
                let updated = self
                    .store
                    .update_question(question.id, &QuestionUpdate::answered(answer))
                    .await?;
                tracing::info!(
                    question_id = question.id,
                    document_id = question.doc_id,
                    "question answered"
                );
                Ok(updated)
            }
            Err(e) => {
                tracing::error!(
                    question_id = question.id,
                    document_id = question.doc_id,
                    error = ?e,
                    "failed to answer question"
                );
                self.mark_failed(question.id).await
            }
        }
    }

    async fn mark_failed(&self, question_id: i64) -> Result<Question> {
        self.store
            .update_question(question_id, &QuestionUpdate::status(QuestionStatus::Error))
            .await
    }

    async fn generate(&self, question: &Question) -> Result<String> {
        self.store
            .update_question(question.id, &QuestionUpdate::status(QuestionStatus::Generating))
            .await?;

        let doc = self.prepare_document(question.doc_id).await?;
        let path = doc
            .path
            .ok_or_else(|| anyhow!("document {} is indexed but has no path", doc.id))?;

        let index = self.engine.load(&index_dir_for(Path::new(&path))).await?;
        self.engine.query(&index, &question.question).await
    }

    /// Bring a document to `Indexed`, performing only the steps it still
    /// needs.
    pub async fn prepare_document(&self, doc_id: i64) -> Result<Document> {
        let _guard = self.locks.lock(doc_id).await;

        let mut doc = self
            .store
            .get_document(doc_id)
            .await?
            .ok_or_else(|| anyhow!("document {} not found", doc_id))?;

        if doc.status.needs_download() {
            doc = self.download(&doc).await?;
        }
        if doc.status.needs_index() {
            doc = self.index(&doc).await?;
        }
        Ok(doc)
    }

    async fn download(&self, doc: &Document) -> Result<Document> {
        self.store
            .update_document(doc.id, &DocumentUpdate::status(DocumentStatus::Downloading))
            .await?;
        tracing::info!(document_id = doc.id, body_id = doc.body_id, "downloading");

        let body = self
            .catalog
            .fetch_body(doc.body_id)
            .await
            .with_context(|| format!("Failed to fetch body {}", doc.body_id))?;

        let dir = self.documents_dir.join(doc.body_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(local_file_name(&body.file_name, doc.body_id));
        tokio::fs::write(&path, &body.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let update = DocumentUpdate {
            path: Some(path.display().to_string()),
            status: Some(DocumentStatus::Downloaded),
        };
        let updated = self.store.update_document(doc.id, &update).await?;
        tracing::info!(
            document_id = doc.id,
            bytes = body.bytes.len(),
            path = %path.display(),
            "downloaded"
        );
        Ok(updated)
    }

    async fn index(&self, doc: &Document) -> Result<Document> {
        let path = doc
            .path
            .as_deref()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("document {} has no local file to index", doc.id))?;

        self.store
            .update_document(doc.id, &DocumentUpdate::status(DocumentStatus::Indexing))
            .await?;
        tracing::info!(document_id = doc.id, "indexing");

        let index = self.engine.build_index(&path).await?;
        self.engine.persist(&index, &index_dir_for(&path)).await?;

        let updated = self
            .store
            .update_document(doc.id, &DocumentUpdate::status(DocumentStatus::Indexed))
            .await?;
        tracing::info!(document_id = doc.id, chunks = index.chunks.len(), "indexed");
        Ok(updated)
    }
}

/// Entry point for catalog sync and question submission.
///
/// Owns the sending half of the work queue; workers hold the pipeline.
pub struct LifecycleController {
    pipeline: Arc<Pipeline>,
    catalog: Arc<dyn Catalog>,
    /// `None` once shutdown has begun.
    jobs: Mutex<Option<mpsc::UnboundedSender<i64>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LifecycleController {
    /// Spawn `worker_count` workers on the current runtime.
    pub fn start(pipeline: Pipeline, worker_count: usize) -> Self {
        let catalog = pipeline.catalog.clone();
        let pipeline = Arc::new(pipeline);
        let (tx, rx) = mpsc::unbounded_channel::<i64>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let worker_count = worker_count.max(1);
        let workers = (0..worker_count)
            .map(|worker_id| {
                let pipeline = pipeline.clone();
                let rx = rx.clone();
                tokio::spawn(worker_loop(worker_id, pipeline, rx))
            })
            .collect();
        tracing::info!(workers = worker_count, "question workers started");

        Self {
            pipeline,
            catalog,
            jobs: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.pipeline.store()
    }

    /// Register catalog entries not yet known locally. Existing documents
    /// are left untouched, and overlapping refreshes register each entry
    /// once.
    pub async fn refresh_documents(&self) -> std::result::Result<RefreshSummary, RefreshError> {
        let entries = self
            .catalog
            .list_metadata()
            .await
            .map_err(RefreshError::Catalog)?;
        let store = self.store();

        let mut summary = RefreshSummary {
            fetched: entries.len(),
            created: 0,
            existing: 0,
        };
        for entry in &entries {
            let (doc, created) = store
                .get_or_create_document(&NewDocument::from(entry))
                .await
                .map_err(RefreshError::Store)?;
            if !created {
                summary.existing += 1;
                continue;
            }
            tracing::info!(
                document_id = doc.id,
                body_id = doc.body_id,
                name = %doc.doc_name,
                "registered document"
            );
            summary.created += 1;
        }

        tracing::info!(
            fetched = summary.fetched,
            created = summary.created,
            existing = summary.existing,
            "catalog refreshed"
        );
        Ok(summary)
    }

    /// Record a question and schedule it for answering.
    ///
    /// Resubmitting the same text for the same document returns the
    /// existing record and schedules nothing.
    pub async fn submit_question(
        &self,
        document_id: i64,
        text: &str,
    ) -> std::result::Result<Question, SubmitError> {
        if text.trim().is_empty() {
            return Err(SubmitError::EmptyPrompt);
        }
        let jobs = self
            .jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| anyhow!("question workers are shutting down"))?;
        let store = self.store();
        if store.get_document(document_id).await?.is_none() {
            return Err(SubmitError::DocumentNotFound(document_id));
        }

        let (question, created) = store.create_question(document_id, text).await?;
        if created {
            jobs.send(question.id)
                .map_err(|_| anyhow!("question workers are not running"))?;
            tracing::info!(
                question_id = question.id,
                document_id,
                "question queued"
            );
        }
        Ok(question)
    }

    /// Stop accepting work and wait for queued questions to finish.
    ///
    /// Submissions after this point are rejected. Calling it again is a
    /// no-op.
    pub async fn shutdown(&self) {
        drop(self.jobs.lock().unwrap_or_else(|e| e.into_inner()).take());
        let workers = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *workers)
        };
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "question worker ended abnormally");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    pipeline: Arc<Pipeline>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<i64>>>,
) {
    tracing::debug!(worker_id, "worker started");
    loop {
        let next = rx.lock().await.recv().await;
        let Some(question_id) = next else { break };

        // Run each question in its own task so a panic only fails that question.
        let job = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.answer_question(question_id).await })
        };
        match job.await {
            Ok(Ok(question)) => {
                tracing::debug!(worker_id, question_id, status = %question.status, "done");
            }
            Ok(Err(e)) => {
                tracing::error!(worker_id, question_id, error = ?e, "question lost");
            }
            Err(e) => {
                tracing::error!(worker_id, question_id, error = %e, "question task panicked");
                if let Err(e) = pipeline.mark_failed(question_id).await {
                    tracing::error!(question_id, error = ?e, "could not mark question failed");
                }
            }
        }
    }
    tracing::debug!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_file_name_keeps_last_component() {
        assert_eq!(local_file_name("OWU_2024.pdf", 1), "OWU_2024.pdf");
        assert_eq!(local_file_name("../../etc/passwd", 1), "passwd");
        assert_eq!(local_file_name("C:\\docs\\owu.pdf", 1), "owu.pdf");
        assert_eq!(local_file_name("dir/", 7), "7.pdf");
        assert_eq!(local_file_name("..", 7), "7.pdf");
        assert_eq!(local_file_name("", 7), "7.pdf");
    }

    #[tokio::test]
    async fn test_document_locks_serialize_same_id() {
        let locks = Arc::new(DocumentLocks::default());
        let guard = locks.lock(1).await;

        // A different id is independent.
        let _other = locks.lock(2).await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock(1).await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }
}
