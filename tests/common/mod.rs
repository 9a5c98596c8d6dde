#![allow(dead_code)]

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use doc_triage::config::EngineSettings;
use doc_triage::search::engine::HybridEngine;

/// Write one corpus file under `<root>/<rel>`, creating parents.
pub fn write_doc(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Memory-only settings over a given corpus directory.
pub fn memory_settings(docs_root: &Path) -> EngineSettings {
    EngineSettings {
        docs_root: docs_root.to_path_buf(),
        store_dir: None,
        ..EngineSettings::default()
    }
}

/// Settings with persistence into `store_dir`.
pub fn persistent_settings(docs_root: &Path, store_dir: &Path) -> EngineSettings {
    EngineSettings {
        docs_root: docs_root.to_path_buf(),
        store_dir: Some(store_dir.to_path_buf()),
        ..EngineSettings::default()
    }
}

/// The two-document corpus from the classification scenarios:
/// a negative-quantity error and a schema-validation error.
pub fn scenario_corpus() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_doc(
        dir.path(),
        "services/logitrack/NEGATIVE_VALUE.md",
        "quantity cannot be negative; positive values only",
    );
    write_doc(
        dir.path(),
        "services/skyguard/SCHEMA_VALIDATION.md",
        "schema validation failed for payload",
    );
    dir
}

/// Build and index a memory-only engine over a corpus directory.
pub fn indexed_engine(docs_root: &Path) -> HybridEngine {
    let engine = HybridEngine::new(memory_settings(docs_root));
    engine.index().unwrap();
    engine
}
