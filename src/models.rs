use serde::Serialize;
use std::collections::BTreeMap;

use crate::search::cache::CacheStats;
use crate::search::feedback::FeedbackReport;

/// Which path inside the engine produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Served from the hot-query cache.
    Cache,
    /// Served by the learned query-pattern shortcut.
    Learned,
    /// Last-resort document prior for queries with no usable tokens.
    Prior,
    /// Freshly computed hybrid TF-IDF + BM25 score.
    Hybrid,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Source::Cache => "cache",
            Source::Learned => "learned",
            Source::Prior => "prior",
            Source::Hybrid => "hybrid",
        };
        write!(f, "{tag}")
    }
}

/// Result of classifying one error message.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub doc_path: String,
    /// Confidence in [0, 100] after feedback adjustment.
    pub confidence: f64,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// One row of a ranked top-N answer.
#[derive(Debug, Clone, Serialize)]
pub struct TopMatch {
    pub doc_path: String,
    pub confidence: f64,
    pub service: String,
    pub category: String,
}

/// Score breakdown for the winning document of a query.
#[derive(Debug, Clone, Serialize)]
pub struct RankingExplanation {
    pub doc_path: String,
    pub service: String,
    pub category: String,
    pub tfidf_raw: f64,
    pub bm25_raw: f64,
    pub tfidf_normalized: f64,
    pub bm25_normalized: f64,
    pub tfidf_weight: f64,
    pub bm25_weight: f64,
    pub fused_score: f64,
    pub confidence: f64,
}

/// Outcome of teaching the engine a correction.
#[derive(Debug, Clone, Serialize)]
pub struct TeachReceipt {
    pub ok: bool,
    pub message: String,
    /// True when the in-memory update could not be persisted and will be
    /// retried; the learning itself already took effect.
    pub retryable: bool,
}

/// What `index()` did.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub documents: usize,
    pub vocabulary_size: usize,
    /// False when vectors were loaded from the persistent store instead
    /// of being recomputed.
    pub reindexed: bool,
}

/// Health and accounting snapshot of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub healthy: bool,
    /// Set when any persistence operation failed this session; the
    /// engine keeps answering from memory.
    pub degraded_persistence: bool,
    pub documents: usize,
    pub vocabulary_size: usize,
    pub predictions_total: u64,
    pub corrections_total: u64,
    pub feedback: FeedbackReport,
    pub engine_weights: BTreeMap<String, f64>,
    pub cache: CacheStats,
}
