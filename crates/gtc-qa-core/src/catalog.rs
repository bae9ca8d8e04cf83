//! Upstream document catalog abstraction.
//!
//! The [`Catalog`] trait is the boundary to the external service that owns
//! document metadata and bodies. The application ships a SOAP client; tests
//! and embedders can use [`InMemoryCatalog`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// One metadata record from the catalog listing.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub body_id: i64,
    pub name: String,
    pub product_code: String,
    pub title: String,
    pub type_name: String,
}

/// A downloaded document body with its server-assigned file name.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentBody {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Read-only access to the upstream catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch the full metadata list in one response.
    async fn list_metadata(&self) -> Result<Vec<CatalogEntry>>;

    /// Fetch the raw body of one document.
    async fn fetch_body(&self, body_id: i64) -> Result<DocumentBody>;
}

/// In-memory [`Catalog`] for tests and offline runs.
///
/// Counts body fetches so callers can assert how often a download happened.
#[derive(Default)]
pub struct InMemoryCatalog {
    entries: RwLock<Vec<CatalogEntry>>,
    bodies: RwLock<BTreeMap<i64, DocumentBody>>,
    fetches: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document with its metadata and body.
    pub fn insert(&self, entry: CatalogEntry, body: DocumentBody) {
        self.bodies.write().unwrap().insert(entry.body_id, body);
        let mut entries = self.entries.write().unwrap();
        entries.retain(|e| e.body_id != entry.body_id);
        entries.push(entry);
    }

    /// Number of successful or failed `fetch_body` calls so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn list_metadata(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.entries.read().unwrap().clone())
    }

    async fn fetch_body(&self, body_id: i64) -> Result<DocumentBody> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .read()
            .unwrap()
            .get(&body_id)
            .cloned()
            .ok_or_else(|| anyhow!("catalog has no body for id {}", body_id))
    }
}
