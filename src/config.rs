use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ranking::Bm25Params;
use crate::search::feedback::FeedbackConfig;
use crate::search::fusion::FusionWeights;
use crate::search::tfidf::{DocFrequency, TfidfOptions};

/// Global configuration for the triage engine
/// All fields are optional to support partial configurations and merging
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus: Option<CorpusConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tfidf: Option<TfidfConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25: Option<Bm25Config>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion: Option<FusionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorpusConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TfidfConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_features: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ngram_min: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ngram_max: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_df: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_df_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Bm25Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FusionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tfidf_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25_weight: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeedbackSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_boost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_penalty: Option<f64>,
}

/// Fully resolved settings handed to the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub docs_root: PathBuf,
    /// `None` disables persistence entirely (memory-only engine).
    pub store_dir: Option<PathBuf>,
    pub cache_enabled: bool,
    pub cache_ttl_seconds: u64,
    pub tfidf: TfidfOptions,
    pub bm25: Bm25Params,
    pub fusion: FusionWeights,
    pub feedback: FeedbackConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            docs_root: PathBuf::from("data/services"),
            store_dir: Some(PathBuf::from("data/store")),
            cache_enabled: true,
            cache_ttl_seconds: 3600,
            tfidf: TfidfOptions::default(),
            bm25: Bm25Params::default(),
            fusion: FusionWeights::default(),
            feedback: FeedbackConfig::default(),
        }
    }
}

impl TriageConfig {
    /// Load configuration from an explicit file, or from `triage.json` in
    /// the working directory when present. A missing default file is not
    /// an error; a broken file is.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(path) => Some(path.to_path_buf()),
            None => match env::var_os("TRIAGE_CONFIG") {
                Some(path) => Some(PathBuf::from(path)),
                None => {
                    let default = PathBuf::from("triage.json");
                    default.exists().then_some(default)
                }
            },
        };

        match path {
            Some(path) => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("cannot read config file {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Resolve the layered configuration into concrete settings:
    /// built-in defaults, then the file, then environment overrides.
    pub fn resolve(&self) -> EngineSettings {
        let mut settings = EngineSettings::default();

        if let Some(corpus) = &self.corpus {
            if let Some(docs_root) = &corpus.docs_root {
                settings.docs_root = docs_root.clone();
            }
        }
        if let Some(store) = &self.store {
            if let Some(dir) = &store.dir {
                settings.store_dir = Some(dir.clone());
            }
            if store.enabled == Some(false) {
                settings.store_dir = None;
            }
        }
        if let Some(cache) = &self.cache {
            if let Some(enabled) = cache.enabled {
                settings.cache_enabled = enabled;
            }
            if let Some(ttl) = cache.ttl_seconds {
                settings.cache_ttl_seconds = ttl;
            }
        }
        if let Some(tfidf) = &self.tfidf {
            if let Some(max_features) = tfidf.max_features {
                settings.tfidf.max_features = Some(max_features);
            }
            let (ngram_min, ngram_max) = settings.tfidf.ngram_range;
            settings.tfidf.ngram_range = (
                tfidf.ngram_min.unwrap_or(ngram_min),
                tfidf.ngram_max.unwrap_or(ngram_max),
            );
            if let Some(min_df) = tfidf.min_df {
                settings.tfidf.min_df = DocFrequency::Count(min_df);
            }
            if let Some(max_df) = tfidf.max_df_ratio {
                settings.tfidf.max_df = DocFrequency::Ratio(max_df);
            }
        }
        if let Some(bm25) = &self.bm25 {
            if let Some(k1) = bm25.k1 {
                settings.bm25.k1 = k1;
            }
            if let Some(b) = bm25.b {
                settings.bm25.b = b;
            }
            if let Some(delta) = bm25.delta {
                settings.bm25.delta = delta;
            }
        }
        if let Some(fusion) = &self.fusion {
            if let Some(weight) = fusion.tfidf_weight {
                settings.fusion.tfidf = weight;
            }
            if let Some(weight) = fusion.bm25_weight {
                settings.fusion.bm25 = weight;
            }
        }
        if let Some(feedback) = &self.feedback {
            if let Some(rate) = feedback.learning_rate {
                settings.feedback.learning_rate = rate;
            }
            if let Some(boost) = feedback.confidence_boost {
                settings.feedback.confidence_boost = boost;
            }
            if let Some(penalty) = feedback.confidence_penalty {
                settings.feedback.confidence_penalty = penalty;
            }
        }

        apply_env_overrides(&mut settings);
        settings
    }
}

/// Environment variables win over both the file and the defaults.
fn apply_env_overrides(settings: &mut EngineSettings) {
    if let Some(docs_root) = env::var_os("TRIAGE_DOCS_ROOT") {
        settings.docs_root = PathBuf::from(docs_root);
    }
    if let Some(store_dir) = env::var_os("TRIAGE_STORE_DIR") {
        if store_dir.is_empty() {
            settings.store_dir = None;
        } else {
            settings.store_dir = Some(PathBuf::from(store_dir));
        }
    }
    if let Ok(enabled) = env::var("TRIAGE_CACHE_ENABLED") {
        settings.cache_enabled = matches!(enabled.as_str(), "1" | "true" | "yes");
    }
    if let Ok(ttl) = env::var("TRIAGE_CACHE_TTL") {
        if let Ok(ttl) = ttl.parse() {
            settings.cache_ttl_seconds = ttl;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_resolves_to_defaults() {
        let settings = TriageConfig::default().resolve();
        assert_eq!(settings.docs_root, PathBuf::from("data/services"));
        assert!(settings.cache_enabled);
        assert_eq!(settings.cache_ttl_seconds, 3600);
        assert_eq!(settings.tfidf.ngram_range, (1, 2));
        assert_eq!(settings.bm25.k1, 1.5);
    }

    #[test]
    fn test_file_fields_override_defaults() {
        let config: TriageConfig = serde_json::from_str(
            r#"{
                "corpus": {"docs_root": "docs"},
                "cache": {"enabled": false},
                "bm25": {"k1": 1.2},
                "fusion": {"tfidf_weight": 1.0, "bm25_weight": 1.0}
            }"#,
        )
        .unwrap();

        let settings = config.resolve();
        assert_eq!(settings.docs_root, PathBuf::from("docs"));
        assert!(!settings.cache_enabled);
        assert_eq!(settings.bm25.k1, 1.2);
        let weights = settings.fusion.normalized();
        assert_eq!(weights.tfidf, 0.5);
    }

    #[test]
    fn test_store_can_be_disabled() {
        let config: TriageConfig =
            serde_json::from_str(r#"{"store": {"enabled": false}}"#).unwrap();
        assert!(config.resolve().store_dir.is_none());
    }
}
