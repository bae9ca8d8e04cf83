//! In-memory [`Store`] implementation for tests and offline runs.
//!
//! Records live in `Vec`s behind a single `std::sync::RwLock`, so the
//! insert-or-fetch in [`Store::create_question`] is atomic.

use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    Document, DocumentStatus, DocumentUpdate, NewDocument, Question, QuestionStatus,
    QuestionUpdate,
};

use super::Store;

#[derive(Default)]
struct Tables {
    documents: Vec<Document>,
    questions: Vec<Question>,
}

/// In-memory store. Ids are assigned sequentially from 1.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T: Clone>(items: &[T], skip: i64, limit: i64) -> Vec<T> {
    items
        .iter()
        .skip(skip.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

fn insert_document(tables: &mut Tables, doc: &NewDocument) -> Document {
    let now = Utc::now();
    let created = Document {
        id: tables.documents.len() as i64 + 1,
        body_id: doc.body_id,
        doc_name: doc.doc_name.clone(),
        prod_code: doc.prod_code.clone(),
        doc_title: doc.doc_title.clone(),
        type_name: doc.type_name.clone(),
        path: None,
        status: DocumentStatus::Initial,
        created_at: now,
        updated_at: now,
    };
    tables.documents.push(created.clone());
    created
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_documents(&self, skip: i64, limit: i64) -> Result<Vec<Document>> {
        let tables = self.tables.read().unwrap();
        Ok(page(&tables.documents, skip, limit))
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn get_document_by_body_id(&self, body_id: i64) -> Result<Option<Document>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .documents
            .iter()
            .find(|d| d.body_id == body_id)
            .cloned())
    }

    async fn get_document_by_path(&self, path: &str) -> Result<Option<Document>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .documents
            .iter()
            .find(|d| d.path.as_deref() == Some(path))
            .cloned())
    }

    async fn create_document(&self, doc: &NewDocument) -> Result<Document> {
        let mut tables = self.tables.write().unwrap();
        if tables.documents.iter().any(|d| d.body_id == doc.body_id) {
            bail!("document with body_id {} already exists", doc.body_id);
        }
        Ok(insert_document(&mut tables, doc))
    }

    async fn get_or_create_document(&self, doc: &NewDocument) -> Result<(Document, bool)> {
        let mut tables = self.tables.write().unwrap();
        if let Some(existing) = tables.documents.iter().find(|d| d.body_id == doc.body_id) {
            return Ok((existing.clone(), false));
        }
        Ok((insert_document(&mut tables, doc), true))
    }


    async fn update_document(&self, id: i64, update: &DocumentUpdate) -> Result<Document> {
        let mut tables = self.tables.write().unwrap();
        let doc = tables
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| anyhow!("document {} not found", id))?;
        if let Some(path) = &update.path {
            doc.path = Some(path.clone());
        }
        if let Some(status) = update.status {
            doc.status = status;
        }
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    async fn count_documents(&self) -> Result<i64> {
        Ok(self.tables.read().unwrap().documents.len() as i64)
    }

    async fn list_questions(&self, skip: i64, limit: i64) -> Result<Vec<Question>> {
        let tables = self.tables.read().unwrap();
        Ok(page(&tables.questions, skip, limit))
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.questions.iter().find(|q| q.id == id).cloned())
    }

    async fn find_question(&self, doc_id: i64, question: &str) -> Result<Option<Question>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .questions
            .iter()
            .find(|q| q.doc_id == doc_id && q.question == question)
            .cloned())
    }

    async fn create_question(&self, doc_id: i64, question: &str) -> Result<(Question, bool)> {
        let mut tables = self.tables.write().unwrap();
        if let Some(existing) = tables
            .questions
            .iter()
            .find(|q| q.doc_id == doc_id && q.question == question)
        {
            return Ok((existing.clone(), false));
        }
        if !tables.documents.iter().any(|d| d.id == doc_id) {
            bail!("document {} not found", doc_id);
        }
        let now = Utc::now();
        let created = Question {
            id: tables.questions.len() as i64 + 1,
            doc_id,
            question: question.to_string(),
            answer: None,
            status: QuestionStatus::Initial,
            created_at: now,
            updated_at: now,
        };
        tables.questions.push(created.clone());
        Ok((created, true))
    }

    async fn update_question(&self, id: i64, update: &QuestionUpdate) -> Result<Question> {
        let mut tables = self.tables.write().unwrap();
        let q = tables
            .questions
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| anyhow!("question {} not found", id))?;
        if let Some(status) = update.status {
            q.status = status;
        }
        if let Some(answer) = &update.answer {
            q.answer = Some(answer.clone());
        }
        q.updated_at = Utc::now();
        Ok(q.clone())
    }

    async fn count_questions(&self) -> Result<i64> {
        Ok(self.tables.read().unwrap().questions.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_doc(body_id: i64) -> NewDocument {
        NewDocument {
            body_id,
            doc_name: format!("Doc {}", body_id),
            prod_code: "P".to_string(),
            doc_title: "Title".to_string(),
            type_name: "OWU".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_document_rejects_duplicate_body_id() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc(42)).await.unwrap();
        assert_eq!(doc.id, 1);
        assert_eq!(doc.status, DocumentStatus::Initial);
        assert!(doc.path.is_none());
        assert!(store.create_document(&new_doc(42)).await.is_err());
        assert_eq!(store.count_documents().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_document_keeps_existing_record() {
        let store = InMemoryStore::new();
        let (doc, created) = store.get_or_create_document(&new_doc(42)).await.unwrap();
        assert!(created);
        store
            .update_document(doc.id, &DocumentUpdate::status(DocumentStatus::Indexed))
            .await
            .unwrap();

        let mut renamed = new_doc(42);
        renamed.doc_name = "Renamed".to_string();
        let (again, created) = store.get_or_create_document(&renamed).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, doc.id);
        assert_eq!(again.doc_name, "Doc 42");
        assert_eq!(again.status, DocumentStatus::Indexed);
        assert_eq!(store.count_documents().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_document_and_lookup_by_path() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc(1)).await.unwrap();
        let update = DocumentUpdate {
            path: Some("/data/1/a.pdf".to_string()),
            status: Some(DocumentStatus::Downloaded),
        };
        let updated = store.update_document(doc.id, &update).await.unwrap();
        assert_eq!(updated.status, DocumentStatus::Downloaded);

        let by_path = store.get_document_by_path("/data/1/a.pdf").await.unwrap();
        assert_eq!(by_path.map(|d| d.id), Some(doc.id));

        // Status-only update keeps the path.
        let updated = store
            .update_document(doc.id, &DocumentUpdate::status(DocumentStatus::Indexed))
            .await
            .unwrap();
        assert_eq!(updated.path.as_deref(), Some("/data/1/a.pdf"));
        assert!(store
            .update_document(99, &DocumentUpdate::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_create_question_is_insert_or_fetch() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc(1)).await.unwrap();
        let (q1, created1) = store.create_question(doc.id, "What?").await.unwrap();
        let (q2, created2) = store.create_question(doc.id, "What?").await.unwrap();
        assert!(created1);
        assert!(!created2);
        assert_eq!(q1.id, q2.id);
        assert_eq!(store.count_questions().await.unwrap(), 1);
        assert!(store.create_question(99, "What?").await.is_err());
    }

    #[tokio::test]
    async fn test_pagination() {
        let store = InMemoryStore::new();
        for body_id in 1..=5 {
            store.create_document(&new_doc(body_id)).await.unwrap();
        }
        let page = store.list_documents(1, 2).await.unwrap();
        assert_eq!(
            page.iter().map(|d| d.body_id).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert!(store.list_documents(10, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_question_answer() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc(1)).await.unwrap();
        let (q, _) = store.create_question(doc.id, "Why?").await.unwrap();
        let q = store
            .update_question(q.id, &QuestionUpdate::answered("Because."))
            .await
            .unwrap();
        assert_eq!(q.status, QuestionStatus::Answered);
        assert_eq!(q.answer.as_deref(), Some("Because."));
        let found = store.find_question(doc.id, "Why?").await.unwrap().unwrap();
        assert_eq!(found, q);
    }
}
