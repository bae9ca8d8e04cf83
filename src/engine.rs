//! Indexing and query engine.
//!
//! [`IndexEngine`] is the capability the lifecycle controller drives:
//! build an index from a downloaded file, persist it, load it back, and
//! answer a question against it. [`LocalIndexEngine`] composes text
//! extraction, chunking, optional embeddings, hybrid retrieval and an
//! [`AnswerGenerator`].
//!
//! An index is stored as `<dir>/index.json`. It is written to
//! `index.json.tmp` first and renamed into place, so a crash mid-write
//! never leaves a truncated index behind.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gtc_qa_core::chunk::chunk_text;
use gtc_qa_core::embedding::EmbeddingProvider;
use gtc_qa_core::index::{RetrievalParams, SemanticIndex};

use crate::answer::{create_answerer, AnswerGenerator};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::extract_file;

pub const INDEX_FILE: &str = "index.json";

/// Answer returned when retrieval finds no passage for the question.
pub const NO_RELEVANT_INFORMATION: &str =
    "The document does not contain information relevant to this question.";

/// Index directory for a downloaded document file: `<dir of file>/index`.
pub fn index_dir_for(file: &Path) -> PathBuf {
    file.parent()
        .map(|p| p.join("index"))
        .unwrap_or_else(|| PathBuf::from("index"))
}

#[async_trait]
pub trait IndexEngine: Send + Sync {
    /// Build an index from a local document file.
    async fn build_index(&self, source: &Path) -> Result<SemanticIndex>;

    /// Persist an index into directory `dest`, replacing any previous one.
    async fn persist(&self, index: &SemanticIndex, dest: &Path) -> Result<()>;

    /// Load the index persisted in `dest`.
    async fn load(&self, dest: &Path) -> Result<SemanticIndex>;

    /// Answer a question against a loaded index.
    async fn query(&self, index: &SemanticIndex, question: &str) -> Result<String>;
}

pub struct LocalIndexEngine {
    max_tokens: usize,
    params: RetrievalParams,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    answerer: Arc<dyn AnswerGenerator>,
}

impl LocalIndexEngine {
    pub fn new(
        max_tokens: usize,
        params: RetrievalParams,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        answerer: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            max_tokens,
            params,
            embedder,
            answerer,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.chunking.max_tokens,
            RetrievalParams {
                hybrid_alpha: config.answer.hybrid_alpha,
                top_k: config.answer.top_k,
            },
            create_embedder(&config.embedding)?,
            create_answerer(&config.answer)?,
        ))
    }

    /// The embedder to use for querying `index`, if its vectors came from
    /// the same model.
    fn query_embedder(&self, index: &SemanticIndex) -> Option<&Arc<dyn EmbeddingProvider>> {
        let embedder = self.embedder.as_ref()?;
        if !index.has_vectors() {
            return None;
        }
        if index.model.as_deref() != Some(embedder.model_name()) {
            tracing::warn!(
                index_model = ?index.model,
                model = embedder.model_name(),
                "index was embedded with a different model; using keyword retrieval"
            );
            return None;
        }
        Some(embedder)
    }
}

#[async_trait]
impl IndexEngine for LocalIndexEngine {
    async fn build_index(&self, source: &Path) -> Result<SemanticIndex> {
        let path = source.to_path_buf();
        let max_tokens = self.max_tokens;
        let chunks = tokio::task::spawn_blocking(move || {
            extract_file(&path).map(|text| chunk_text(&text, max_tokens))
        })
        .await
        .context("text extraction task panicked")??;

        if chunks.is_empty() {
            bail!("no text could be extracted from {}", source.display());
        }

        let index = SemanticIndex::new(source.display().to_string(), chunks);
        match &self.embedder {
            Some(embedder) => {
                let texts: Vec<String> = index.chunks.iter().map(|c| c.text.clone()).collect();
                let vectors = embedder.embed(&texts).await?;
                index.with_vectors(embedder.model_name(), vectors)
            }
            None => Ok(index),
        }
    }

    async fn persist(&self, index: &SemanticIndex, dest: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dest)
            .await
            .with_context(|| format!("Failed to create index directory: {}", dest.display()))?;

        let json = serde_json::to_vec(index)?;
        let tmp = dest.join(format!("{}.tmp", INDEX_FILE));
        let target = dest.join(INDEX_FILE);
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .with_context(|| format!("Failed to move index into {}", target.display()))?;
        Ok(())
    }

    async fn load(&self, dest: &Path) -> Result<SemanticIndex> {
        let path = dest.join(INDEX_FILE);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read index: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse index: {}", path.display()))
    }

    async fn query(&self, index: &SemanticIndex, question: &str) -> Result<String> {
        let query_vec = match self.query_embedder(index) {
            Some(embedder) => embedder.embed(&[question.to_string()]).await?.into_iter().next(),
            None => None,
        };

        let passages = index.retrieve(question, query_vec.as_deref(), &self.params);
        if passages.is_empty() {
            return Ok(NO_RELEVANT_INFORMATION.to_string());
        }
        self.answerer.generate(question, &passages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::ExtractiveAnswerer;
    use tempfile::TempDir;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.to_lowercase().contains("flood") {
                        vec![0.0, 1.0]
                    } else {
                        vec![1.0, 0.0]
                    }
                })
                .collect())
        }
    }

    fn engine(embedder: Option<Arc<dyn EmbeddingProvider>>) -> LocalIndexEngine {
        LocalIndexEngine::new(
            10,
            RetrievalParams {
                hybrid_alpha: 0.6,
                top_k: 1,
            },
            embedder,
            Arc::new(ExtractiveAnswerer),
        )
    }

    fn write_doc(tmp: &TempDir) -> PathBuf {
        let path = tmp.path().join("42").join("owu.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "Fire damage is covered.\n\nFlood damage is covered too.\n\nClaims go to the insurer.",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_index_dir_is_sibling_of_file() {
        assert_eq!(
            index_dir_for(Path::new("/data/42/owu.pdf")),
            PathBuf::from("/data/42/index")
        );
    }

    #[tokio::test]
    async fn test_build_persist_load_query() {
        let tmp = TempDir::new().unwrap();
        let file = write_doc(&tmp);
        let engine = engine(None);

        let index = engine.build_index(&file).await.unwrap();
        assert_eq!(index.chunks.len(), 3);

        let dir = index_dir_for(&file);
        engine.persist(&index, &dir).await.unwrap();
        assert!(dir.join(INDEX_FILE).exists());
        assert!(!dir.join("index.json.tmp").exists());

        let loaded = engine.load(&dir).await.unwrap();
        assert_eq!(loaded, index);

        let answer = engine.query(&loaded, "Who handles claims?").await.unwrap();
        assert_eq!(answer, "Claims go to the insurer.");

        let answer = engine.query(&loaded, "earthquake").await.unwrap();
        assert_eq!(answer, NO_RELEVANT_INFORMATION);
    }

    #[tokio::test]
    async fn test_query_uses_embeddings_when_available() {
        let tmp = TempDir::new().unwrap();
        let file = write_doc(&tmp);
        let engine = engine(Some(Arc::new(FixedEmbedder)));

        let index = engine.build_index(&file).await.unwrap();
        assert!(index.has_vectors());
        assert_eq!(index.model.as_deref(), Some("fixed"));

        let answer = engine.query(&index, "Is flood water damage included?").await.unwrap();
        assert_eq!(answer, "Flood damage is covered too.");
    }

    #[tokio::test]
    async fn test_build_fails_for_empty_or_missing_file() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("empty.txt");
        std::fs::write(&empty, "  \n\n ").unwrap();
        assert!(engine(None).build_index(&empty).await.is_err());
        assert!(engine(None)
            .build_index(&tmp.path().join("missing.pdf"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_load_missing_index_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(engine(None).load(tmp.path()).await.is_err());
    }
}
