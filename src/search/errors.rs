use thiserror::Error;

use crate::search::store::StoreError;

/// Errors surfaced by the classification engine.
///
/// Recoverable conditions (cache timeouts, best-effort persistence) are
/// absorbed inside the engine and never reach this enum; everything here
/// either means the engine is not ready to answer or that answering would
/// produce an undefined result.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The engine has no indexed documents to classify against.
    #[error("no documents indexed; run index() first")]
    EmptyCorpus,

    /// Indexing produced a vocabulary with zero features.
    #[error("indexed vocabulary is empty")]
    EmptyVocabulary,

    /// The query contains no searchable terms once tokenized.
    #[error("query contains no searchable terms")]
    EmptyQueryAfterTokenisation,

    /// A vectorizer was asked to transform before being fitted.
    #[error("vectorizer used before fit")]
    NotFitted,

    /// A query vector and the document matrix disagree on width; scoring
    /// them against each other would silently misalign columns.
    #[error("vector dimension {stored} does not match vocabulary size {expected}")]
    DimensionMismatch { stored: usize, expected: usize },

    /// The referenced document is not part of the indexed corpus.
    #[error("unknown document: {0}")]
    UnknownDocument(String),

    /// The corpus tree could not be walked or read.
    #[error("corpus error: {0}")]
    Corpus(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
