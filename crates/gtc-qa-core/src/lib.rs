//! # GTC Q&A Core
//!
//! Runtime-agnostic building blocks for the GTC Q&A service: document and
//! question models, the [`store::Store`] and [`catalog::Catalog`] traits,
//! paragraph chunking, and the persisted [`index::SemanticIndex`].
//!
//! This crate contains no tokio, sqlx, HTTP or filesystem code. The
//! application crate supplies the SQLite store, the SOAP catalog client and
//! the lifecycle controller that drives documents through their states.

pub mod catalog;
pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod store;
