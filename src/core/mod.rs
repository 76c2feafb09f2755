// src/core/mod.rs

/// Data structures shared across the crate: scanner ids, per-scanner data,
/// results and the final aggregate.
pub mod models;

/// Library error types.
pub mod error;

/// Network-facing clients, one per upstream data source.
pub mod probe;

/// The `Scanner` trait and the six built-in scanners.
pub mod scanner;

/// Severity ladders and recommendations for finished results.
pub mod knowledge_base;

/// Concurrent execution of registered scanners.
pub mod orchestrator;

/// Cache and rate limit handling in front of the orchestrator.
pub mod service;
