//! # doc-triage
//!
//! doc-triage is a self-learning, fully local search engine that
//! classifies free-text error messages against a corpus of Markdown
//! documentation, one file per error category per service.
//!
//! This crate provides both a command-line interface and a library that
//! can be used programmatically in other Rust applications.
//!
//! ## Features
//!
//! - Hybrid ranking: TF-IDF cosine similarity fused with Okapi BM25
//! - A feedback loop that absorbs corrections, adjusts confidence and
//!   learns shortcut answers for repeated queries
//! - Persistent vectors, vocabulary and feedback in an on-disk store
//! - A TTL-bounded hot-query cache with hit/miss accounting
//!
//! ## Examples
//!
//! ### Classifying an error message
//!
//! ```no_run
//! use doc_triage::config::EngineSettings;
//! use doc_triage::search::engine::HybridEngine;
//! use std::path::PathBuf;
//!
//! let settings = EngineSettings {
//!     docs_root: PathBuf::from("data/services"),
//!     ..EngineSettings::default()
//! };
//!
//! let engine = HybridEngine::new(settings);
//! engine.index().unwrap();
//!
//! let result = engine.classify("schema validation failed", None).unwrap();
//! println!("{} ({:.1}%)", result.doc_path, result.confidence);
//! ```
//!
//! ### Teaching a correction
//!
//! ```no_run
//! # use doc_triage::config::EngineSettings;
//! # use doc_triage::search::engine::HybridEngine;
//! # let engine = HybridEngine::new(EngineSettings::default());
//! # engine.index().unwrap();
//! let receipt = engine
//!     .teach("quantity: -5", "services/logitrack/NEGATIVE_VALUE.md")
//!     .unwrap();
//! println!("{}", receipt.message);
//! ```

// Allow internal modules to reference the crate by its library name
extern crate self as doc_triage;

pub mod cli;
pub mod config;
pub mod corpus;
pub mod models;
pub mod ranking;
pub mod search;

// Re-export commonly used types for convenience
pub use config::{EngineSettings, TriageConfig};
pub use models::{Classification, IndexSummary, Source, StatusReport, TeachReceipt, TopMatch};
pub use search::engine::{HybridEngine, ENGINE_ID};
pub use search::errors::ClassifyError;

// Tests are defined in their respective modules with #[cfg(test)]
