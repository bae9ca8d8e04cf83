//! SQLite-backed [`Store`] implementation.
//!
//! Statuses are stored as their exact string names and timestamps as Unix
//! seconds. Uniqueness of `documents.body_id` and `questions(doc_id,
//! question)` is enforced by the schema in [`crate::migrate`].

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use gtc_qa_core::models::{Document, DocumentUpdate, NewDocument, Question, QuestionUpdate};
use gtc_qa_core::store::Store;

const DOCUMENT_COLUMNS: &str = "id, body_id, doc_name, prod_code, doc_title, type_name, \
                                path, status, created_at, updated_at";
const QUESTION_COLUMNS: &str = "id, doc_id, question, answer, status, created_at, updated_at";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_ts(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| anyhow!("invalid timestamp: {}", ts))
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let status: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        body_id: row.get("body_id"),
        doc_name: row.get("doc_name"),
        prod_code: row.get("prod_code"),
        doc_title: row.get("doc_title"),
        type_name: row.get("type_name"),
        path: row.get("path"),
        status: status.parse()?,
        created_at: from_ts(row.get("created_at"))?,
        updated_at: from_ts(row.get("updated_at"))?,
    })
}

fn row_to_question(row: &SqliteRow) -> Result<Question> {
    let status: String = row.get("status");
    Ok(Question {
        id: row.get("id"),
        doc_id: row.get("doc_id"),
        question: row.get("question"),
        answer: row.get("answer"),
        status: status.parse()?,
        created_at: from_ts(row.get("created_at"))?,
        updated_at: from_ts(row.get("updated_at"))?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_documents(&self, skip: i64, limit: i64) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents ORDER BY id LIMIT ? OFFSET ?",
            DOCUMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit.max(0))
            .bind(skip.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let sql = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn get_document_by_body_id(&self, body_id: i64) -> Result<Option<Document>> {
        let sql = format!(
            "SELECT {} FROM documents WHERE body_id = ?",
            DOCUMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(body_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn get_document_by_path(&self, path: &str) -> Result<Option<Document>> {
        let sql = format!(
            "SELECT {} FROM documents WHERE path = ? ORDER BY id LIMIT 1",
            DOCUMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn create_document(&self, doc: &NewDocument) -> Result<Document> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO documents (body_id, doc_name, prod_code, doc_title, type_name,
                                   path, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, 'Initial', ?, ?)
            "#,
        )
        .bind(doc.body_id)
        .bind(&doc.doc_name)
        .bind(&doc.prod_code)
        .bind(&doc.doc_title)
        .bind(&doc.type_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create document with body_id {}", doc.body_id))?;

        let id = result.last_insert_rowid();
        self.get_document(id)
            .await?
            .ok_or_else(|| anyhow!("document {} vanished after insert", id))
    }

    async fn get_or_create_document(&self, doc: &NewDocument) -> Result<(Document, bool)> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO documents (body_id, doc_name, prod_code, doc_title, type_name,
                                   path, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, 'Initial', ?, ?)
            ON CONFLICT(body_id) DO NOTHING
            "#,
        )
        .bind(doc.body_id)
        .bind(&doc.doc_name)
        .bind(&doc.prod_code)
        .bind(&doc.doc_title)
        .bind(&doc.type_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to register document with body_id {}", doc.body_id))?;

        let created = result.rows_affected() > 0;
        let stored = self
            .get_document_by_body_id(doc.body_id)
            .await?
            .ok_or_else(|| anyhow!("document with body_id {} vanished after insert", doc.body_id))?;
        Ok((stored, created))
    }

    async fn update_document(&self, id: i64, update: &DocumentUpdate) -> Result<Document> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET path = COALESCE(?, path),
                status = COALESCE(?, status),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.path.as_deref())
        .bind(update.status.map(|s| s.as_str()))
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("document {} not found", id);
        }
        self.get_document(id)
            .await?
            .ok_or_else(|| anyhow!("document {} not found", id))
    }

    async fn count_documents(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_questions(&self, skip: i64, limit: i64) -> Result<Vec<Question>> {
        let sql = format!(
            "SELECT {} FROM questions ORDER BY id LIMIT ? OFFSET ?",
            QUESTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit.max(0))
            .bind(skip.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_question).collect()
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>> {
        let sql = format!("SELECT {} FROM questions WHERE id = ?", QUESTION_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_question).transpose()
    }

    async fn find_question(&self, doc_id: i64, question: &str) -> Result<Option<Question>> {
        let sql = format!(
            "SELECT {} FROM questions WHERE doc_id = ? AND question = ?",
            QUESTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(doc_id)
            .bind(question)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_question).transpose()
    }

    async fn create_question(&self, doc_id: i64, question: &str) -> Result<(Question, bool)> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO questions (doc_id, question, answer, status, created_at, updated_at)
            VALUES (?, ?, NULL, 'Initial', ?, ?)
            ON CONFLICT(doc_id, question) DO NOTHING
            "#,
        )
        .bind(doc_id)
        .bind(question)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create question for document {}", doc_id))?;

        let created = result.rows_affected() > 0;
        let stored = self
            .find_question(doc_id, question)
            .await?
            .ok_or_else(|| anyhow!("question for document {} vanished after insert", doc_id))?;
        Ok((stored, created))
    }

    async fn update_question(&self, id: i64, update: &QuestionUpdate) -> Result<Question> {
        let result = sqlx::query(
            r#"
            UPDATE questions
            SET status = COALESCE(?, status),
                answer = COALESCE(?, answer),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.answer.as_deref())
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("question {} not found", id);
        }
        self.get_question(id)
            .await?
            .ok_or_else(|| anyhow!("question {} not found", id))
    }

    async fn count_questions(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
