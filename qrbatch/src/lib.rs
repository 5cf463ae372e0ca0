//! qrbatch - Batch QR code generation pipeline
//!
//! This library turns a catalog of items into QR code images, batch by
//! batch, with per-item retries, cancellation, progress reporting, and an
//! in-memory result cache.
//!
//! # High-Level API
//!
//! Most callers build a [`orchestrator::GenerationOrchestrator`] with an
//! encoder, spawn its worker, and drive everything through the returned
//! [`orchestrator::PipelineHandle`]:
//!
//! ```ignore
//! use std::sync::Arc;
//! use qrbatch::orchestrator::GenerationOrchestrator;
//! use qrbatch::pipeline::PipelineConfig;
//! use qrbatch::catalog::CatalogItem;
//! use tokio_util::sync::CancellationToken;
//!
//! let (orchestrator, handle) =
//!     GenerationOrchestrator::new(Arc::new(my_encoder), PipelineConfig::default());
//! let shutdown = CancellationToken::new();
//! tokio::spawn(orchestrator.run(shutdown.clone()));
//!
//! handle.start(vec![CatalogItem::new("item-1", "https://example.com/i/1")])?;
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod encoder;
pub mod lifecycle;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod state;

/// Version of the qrbatch library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
