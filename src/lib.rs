//! # GTC Q&A
//!
//! Answers free-text questions about insurance documents published in the
//! GTC SOAP catalog. Document metadata is synchronized on demand; a
//! document's body is downloaded and indexed the first time someone asks
//! about it, and every question is answered asynchronously by a worker
//! pool.
//!
//! # Architecture
//!
//! ```text
//! HTTP (axum) ──► LifecycleController ──► queue ──► workers
//!                      │                               │
//!                      ▼                               ▼
//!                 Store (SQLite)  ◄──── Pipeline: Catalog (SOAP) + IndexEngine
//! ```
//!
//! Runtime-agnostic models, traits, chunking and retrieval live in the
//! `gtc-qa-core` crate; this crate provides the SQLite store, the SOAP
//! catalog client, the indexing engine, the lifecycle controller, the HTTP
//! server and the `gtc-qa` CLI.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] / [`migrate`] | SQLite pool and schema |
//! | [`sqlite_store`] | SQLite implementation of the store trait |
//! | [`catalog_soap`] | SOAP client for the GTC catalog |
//! | [`extract`] | PDF / text extraction |
//! | [`embedding`] / [`answer`] | OpenAI embedding and answer providers |
//! | [`engine`] | Build, persist, load and query per-document indexes |
//! | [`lifecycle`] | Document state machine, question pipeline, catalog sync |
//! | [`server`] | HTTP API with API-key authentication |
//! | [`commands`] | CLI command implementations |

pub mod answer;
pub mod catalog_soap;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod http;
pub mod lifecycle;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
