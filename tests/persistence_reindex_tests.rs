mod common;

use common::{persistent_settings, write_doc};
use std::fs;
use tempfile::TempDir;

use doc_triage::search::engine::HybridEngine;
use doc_triage::Source;

fn corpus_and_store() -> (TempDir, TempDir) {
    let docs = TempDir::new().unwrap();
    write_doc(
        docs.path(),
        "services/logitrack/NEGATIVE_VALUE.md",
        "quantity cannot be negative; positive values only",
    );
    write_doc(
        docs.path(),
        "services/skyguard/SCHEMA_VALIDATION.md",
        "schema validation failed for payload",
    );
    (docs, TempDir::new().unwrap())
}

#[test]
fn test_second_index_loads_persisted_vectors() {
    let (docs, store) = corpus_and_store();

    let engine = HybridEngine::new(persistent_settings(docs.path(), store.path()));
    let summary = engine.index().unwrap();
    assert!(summary.reindexed);
    let first = engine.classify("schema validation failed", None).unwrap();
    engine.flush();
    drop(engine);

    // A fresh process over the same store loads instead of refitting.
    let engine = HybridEngine::new(persistent_settings(docs.path(), store.path()));
    let summary = engine.index().unwrap();
    assert!(!summary.reindexed);
    assert_eq!(summary.documents, 2);

    // Identical in-memory state yields the identical answer.
    let second = engine.classify("schema validation failed", None).unwrap();
    assert_eq!(second.doc_path, first.doc_path);
    assert_eq!(second.confidence.to_bits(), first.confidence.to_bits());
}

#[test]
fn test_unchanged_corpus_indexes_idempotently() {
    let (docs, store) = corpus_and_store();

    let engine = HybridEngine::new(persistent_settings(docs.path(), store.path()));
    assert!(engine.index().unwrap().reindexed);

    // Same engine, same corpus: the second index call must load.
    let summary = engine.index().unwrap();
    assert!(!summary.reindexed);
    assert_eq!(summary.vocabulary_size, engine.status().vocabulary_size);
}

#[test]
fn test_content_change_triggers_reindex() {
    let (docs, store) = corpus_and_store();

    let engine = HybridEngine::new(persistent_settings(docs.path(), store.path()));
    engine.index().unwrap();
    drop(engine);

    write_doc(
        docs.path(),
        "services/skyguard/SCHEMA_VALIDATION.md",
        "schema validation failed for payload; field types must match",
    );

    let engine = HybridEngine::new(persistent_settings(docs.path(), store.path()));
    assert!(engine.index().unwrap().reindexed);
}

#[test]
fn test_added_document_triggers_reindex() {
    let (docs, store) = corpus_and_store();

    let engine = HybridEngine::new(persistent_settings(docs.path(), store.path()));
    engine.index().unwrap();
    drop(engine);

    write_doc(
        docs.path(),
        "services/vault/DISK_FULL.md",
        "disk full, cannot write to storage",
    );

    let engine = HybridEngine::new(persistent_settings(docs.path(), store.path()));
    let summary = engine.index().unwrap();
    assert!(summary.reindexed);
    assert_eq!(summary.documents, 3);
}

#[test]
fn test_learned_shortcut_survives_restart() {
    let (docs, store) = corpus_and_store();
    let schema_doc = "services/skyguard/SCHEMA_VALIDATION.md";

    let engine = HybridEngine::new(persistent_settings(docs.path(), store.path()));
    engine.index().unwrap();
    for _ in 0..2 {
        let receipt = engine.teach("schema validation failed", schema_doc).unwrap();
        assert!(receipt.ok);
        assert!(!receipt.retryable);
    }
    engine.flush();
    drop(engine);

    let engine = HybridEngine::new(persistent_settings(docs.path(), store.path()));
    engine.index().unwrap();

    let result = engine.classify("schema validation failed", None).unwrap();
    assert_eq!(result.source, Source::Learned);
    assert_eq!(result.doc_path, schema_doc);
    assert!(result.confidence >= 97.0);

    let status = engine.status();
    assert_eq!(status.corrections_total, 2);
    assert!(!status.degraded_persistence);
}

#[test]
fn test_store_files_use_expected_layout() {
    let (docs, store) = corpus_and_store();

    let engine = HybridEngine::new(persistent_settings(docs.path(), store.path()));
    engine.index().unwrap();
    engine
        .teach(
            "schema validation failed",
            "services/skyguard/SCHEMA_VALIDATION.md",
        )
        .unwrap();

    assert!(store.path().join("documents.json").exists());
    assert!(store.path().join("vectors_tfidf.bin").exists());
    assert!(store.path().join("vocabulary_tfidf.json").exists());
    assert!(store.path().join("metadata_tfidf.json").exists());
    assert!(store.path().join("feedback.json").exists());

    // Vector file header: record count then dimension, little-endian.
    let raw = fs::read(store.path().join("vectors_tfidf.bin")).unwrap();
    let count = u32::from_le_bytes(raw[0..4].try_into().unwrap());
    let dimension = u32::from_le_bytes(raw[4..8].try_into().unwrap());
    assert_eq!(count, 2);
    assert_eq!(dimension as usize, engine.status().vocabulary_size);
}

#[test]
fn test_memory_only_engine_still_learns() {
    let docs = TempDir::new().unwrap();
    write_doc(
        docs.path(),
        "services/skyguard/SCHEMA_VALIDATION.md",
        "schema validation failed for payload",
    );

    let engine = HybridEngine::new(common::memory_settings(docs.path()));
    engine.index().unwrap();

    let doc = "services/skyguard/SCHEMA_VALIDATION.md";
    engine.teach("schema validation failed", doc).unwrap();
    engine.teach("schema validation failed", doc).unwrap();

    let result = engine.classify("schema validation failed", None).unwrap();
    assert_eq!(result.source, Source::Learned);
    // Nothing was persisted and nothing failed.
    assert!(!engine.status().degraded_persistence);
}
