#![deny(missing_docs)]

//! Core library for the docpoll PDF text extraction service.

/// HTTP routing and REST handlers.
pub mod api;
/// Temporary storage for uploaded files.
pub mod blob;
/// Environment-driven configuration management.
pub mod config;
/// Text extraction from uploaded documents.
pub mod extract;
/// Job identifiers, states, and record stores.
pub mod jobs;
/// Structured logging and tracing setup.
pub mod logging;
/// Job lifecycle counters.
pub mod metrics;
/// Work queue carrying job identifiers to extraction consumers.
pub mod queue;
/// Ingest and polling orchestration.
pub mod service;
/// Background extraction worker and consumer pool.
pub mod worker;
