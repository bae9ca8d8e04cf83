//! CLI command implementations.
//!
//! Each `run_*` function opens what it needs from the config and prints
//! results to stdout; diagnostics go through `tracing` to stderr.

use anyhow::{Context, Result};
use std::sync::Arc;

use gtc_qa_core::catalog::Catalog;
use gtc_qa_core::models::{Document, Question};
use gtc_qa_core::store::Store;

use crate::catalog_soap::SoapCatalog;
use crate::config::Config;
use crate::db;
use crate::engine::{IndexEngine, LocalIndexEngine};
use crate::lifecycle::{LifecycleController, Pipeline};
use crate::migrate;
use crate::server::{self, AppState};
use crate::sqlite_store::SqliteStore;

/// Wire the SQLite store, SOAP catalog and local engine into a running
/// controller with `workers` workers. Applies migrations first.
pub async fn open_controller(config: &Config, workers: usize) -> Result<LifecycleController> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let catalog: Arc<dyn Catalog> = Arc::new(SoapCatalog::new(&config.catalog)?);
    let engine: Arc<dyn IndexEngine> = Arc::new(LocalIndexEngine::from_config(config)?);
    let pipeline = Pipeline::new(store, catalog, engine, &config.storage.documents_dir);

    Ok(LifecycleController::start(pipeline, workers))
}

pub async fn run_refresh(config: &Config) -> Result<()> {
    let controller = open_controller(config, 1).await?;
    let summary = controller.refresh_documents().await?;
    println!(
        "Fetched {} catalog entries: {} new, {} already known.",
        summary.fetched, summary.created, summary.existing
    );
    controller.shutdown().await;
    Ok(())
}

pub async fn run_documents(config: &Config, skip: i64, limit: i64) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let docs = store.list_documents(skip, limit).await?;
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in &docs {
        print_document(doc);
    }
    let total = store.count_documents().await?;
    println!("\n{} of {} documents shown.", docs.len(), total);
    Ok(())
}

pub async fn run_questions(config: &Config, skip: i64, limit: i64) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let questions = store.list_questions(skip, limit).await?;
    if questions.is_empty() {
        println!("No questions.");
        return Ok(());
    }
    for q in &questions {
        print_question(q);
    }
    let total = store.count_questions().await?;
    println!("\n{} of {} questions shown.", questions.len(), total);
    Ok(())
}

/// Submit a question and wait for the pipeline to finish with it.
pub async fn run_ask(config: &Config, document_id: i64, prompt: &str) -> Result<()> {
    let controller = open_controller(config, 1).await?;
    let store = controller.store().clone();
    let submitted = controller.submit_question(document_id, prompt).await?;
    controller.shutdown().await;

    let question = store
        .get_question(submitted.id)
        .await?
        .context("question disappeared from the store")?;
    print_question(&question);
    Ok(())
}

pub async fn run_serve(config: &Config) -> Result<()> {
    let api_key = config.api_key()?;
    let controller = Arc::new(open_controller(config, config.workers.count).await?);
    let state = AppState::new(controller.clone(), &api_key);
    server::run_server(&config.server.bind, state).await?;

    tracing::info!("draining question queue");
    controller.shutdown().await;
    Ok(())
}

fn print_document(doc: &Document) {
    println!(
        "{:>5}  body={:<8} {:<12} {:<10} {}",
        doc.id,
        doc.body_id,
        doc.status.as_str(),
        doc.prod_code,
        doc.doc_name
    );
}

fn print_question(q: &Question) {
    println!("#{} (document {}) [{}] {}", q.id, q.doc_id, q.status, q.question);
    if let Some(answer) = &q.answer {
        for line in answer.lines() {
            println!("    {}", line);
        }
    }
}
