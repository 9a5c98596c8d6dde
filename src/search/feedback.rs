use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::search::store::VectorStore;
use crate::search::tokenization::normalize_query;

/// Separator for the composite (query, document) aggregate key.
const PAIR_KEY_SEP: &str = "||";

/// How many prediction records are retained in memory and on disk.
/// Aggregates never depend on predictions, so trimming old ones is safe.
const PREDICTION_HISTORY_LIMIT: usize = 1000;

/// Tuning knobs for the feedback loop.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackConfig {
    /// EMA learning rate for per-(query, document) success rates.
    pub learning_rate: f64,
    /// Points added per unit of success-rate surplus above neutral.
    pub confidence_boost: f64,
    /// Points removed per unit of success-rate deficit below neutral.
    pub confidence_penalty: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            confidence_boost: 5.0,
            confidence_penalty: 10.0,
        }
    }
}

/// One prediction the engine handed out. Append-only; recording a
/// prediction never touches any aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub query_raw: String,
    pub query_normalized: String,
    pub predicted_doc: String,
    pub engine: String,
    pub raw_confidence: f64,
    pub adjusted_confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// One user correction (or confirmation). The correction stream is the
/// source of truth: every aggregate below can be rebuilt from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub query_normalized: String,
    pub predicted_doc: String,
    pub actual_doc: String,
    pub is_correct: bool,
    pub original_confidence: f64,
    pub engine: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDocStats {
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub total_count: u32,
    pub success_rate: f64,
}

impl Default for QueryDocStats {
    fn default() -> Self {
        Self {
            correct_count: 0,
            incorrect_count: 0,
            total_count: 0,
            // Neutral prior
            success_rate: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStats {
    pub times_shown: u32,
    pub times_correct: u32,
    pub accuracy: f64,
}

impl Default for DocumentStats {
    fn default() -> Self {
        Self {
            times_shown: 0,
            times_correct: 0,
            accuracy: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub total_predictions: u32,
    pub correct_predictions: u32,
    pub incorrect_predictions: u32,
    pub accuracy: f64,
    pub weight: f64,
}

impl Default for EngineStats {
    fn default() -> Self {
        Self {
            total_predictions: 0,
            correct_predictions: 0,
            incorrect_predictions: 0,
            accuracy: 0.5,
            weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryPattern {
    pub best_doc: Option<String>,
    pub best_doc_count: u32,
    pub total_count: u32,
    pub avg_confidence: f64,
}

/// Persisted form of the whole feedback state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackSnapshot {
    pub predictions: Vec<PredictionRecord>,
    pub corrections: Vec<CorrectionRecord>,
    pub query_doc_stats: BTreeMap<String, QueryDocStats>,
    pub doc_stats: BTreeMap<String, DocumentStats>,
    pub engine_stats: BTreeMap<String, EngineStats>,
    pub query_patterns: BTreeMap<String, QueryPattern>,
}

/// Outcome of recording one correction.
#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    pub is_correct: bool,
    pub success_rate: f64,
    pub doc_accuracy: f64,
    pub engine_accuracy: f64,
    pub engine_weight: f64,
    /// False when the in-memory update could not be persisted; the
    /// update is retained and retried on the next mutation or flush.
    pub persisted: bool,
}

/// A bypass answer from the learned query patterns.
#[derive(Debug, Clone)]
pub struct Shortcut {
    pub doc_path: String,
    pub confidence: f64,
    /// True for an exact normalized-query match, false for the fuzzy
    /// similar-query fallback.
    pub exact: bool,
}

/// Per-document accuracy line for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct TopDocumentReport {
    pub doc_path: String,
    pub accuracy: f64,
    pub times_shown: u32,
    pub times_correct: u32,
}

/// Aggregate view of the feedback loop for `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackReport {
    pub predictions_total: u64,
    pub corrections_total: u64,
    pub correct_corrections: u64,
    pub overall_accuracy: f64,
    pub unique_queries: usize,
    pub unique_documents: usize,
    pub learning_rate: f64,
    pub top_documents: Vec<TopDocumentReport>,
}

fn pair_key(query_normalized: &str, doc_path: &str) -> String {
    format!("{query_normalized}{PAIR_KEY_SEP}{doc_path}")
}

/// Jaccard similarity between the whitespace word sets of two
/// normalized queries.
fn query_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

#[derive(Debug, Default)]
struct FeedbackState {
    predictions: Vec<PredictionRecord>,
    corrections: Vec<CorrectionRecord>,
    query_doc_stats: BTreeMap<String, QueryDocStats>,
    doc_stats: BTreeMap<String, DocumentStats>,
    engine_stats: BTreeMap<String, EngineStats>,
    query_patterns: BTreeMap<String, QueryPattern>,
}

impl FeedbackState {
    fn from_snapshot(snapshot: FeedbackSnapshot) -> Self {
        Self {
            predictions: snapshot.predictions,
            corrections: snapshot.corrections,
            query_doc_stats: snapshot.query_doc_stats,
            doc_stats: snapshot.doc_stats,
            engine_stats: snapshot.engine_stats,
            query_patterns: snapshot.query_patterns,
        }
    }

    fn snapshot(&self) -> FeedbackSnapshot {
        FeedbackSnapshot {
            predictions: self.predictions.clone(),
            corrections: self.corrections.clone(),
            query_doc_stats: self.query_doc_stats.clone(),
            doc_stats: self.doc_stats.clone(),
            engine_stats: self.engine_stats.clone(),
            query_patterns: self.query_patterns.clone(),
        }
    }

    /// Fold one correction into every aggregate. Also used verbatim when
    /// rebuilding aggregates from the correction stream.
    fn apply_correction(&mut self, record: &CorrectionRecord, learning_rate: f64) {
        let query = &record.query_normalized;
        let actual = &record.actual_doc;
        let hit = if record.is_correct { 1.0 } else { 0.0 };

        // Pair history for the answer the engine gave; this is the pair
        // adjust_confidence looks up when the engine proposes it again.
        let stats = self
            .query_doc_stats
            .entry(pair_key(query, &record.predicted_doc))
            .or_default();
        if record.is_correct {
            stats.correct_count += 1;
        } else {
            stats.incorrect_count += 1;
        }
        stats.total_count += 1;
        stats.success_rate = learning_rate * hit + (1.0 - learning_rate) * stats.success_rate;

        // A miss still names the right answer, which is positive
        // evidence for the (query, actual) pair.
        if !record.is_correct {
            let confirmed = self
                .query_doc_stats
                .entry(pair_key(query, actual))
                .or_default();
            confirmed.correct_count += 1;
            confirmed.total_count += 1;
            confirmed.success_rate =
                learning_rate + (1.0 - learning_rate) * confirmed.success_rate;
        }

        // Per-document track record over the corrections in which the
        // document was the confirmed answer.
        let doc = self.doc_stats.entry(actual.clone()).or_default();
        doc.times_shown += 1;
        if record.is_correct {
            doc.times_correct += 1;
        }
        doc.accuracy = doc.times_correct as f64 / doc.times_shown as f64;

        // Per-engine accuracy and UCB1-style weight: accuracy plus an
        // exploration bonus that shrinks as evidence accumulates.
        let engine = self.engine_stats.entry(record.engine.clone()).or_default();
        engine.total_predictions += 1;
        if record.is_correct {
            engine.correct_predictions += 1;
        } else {
            engine.incorrect_predictions += 1;
        }
        let total = engine.total_predictions as f64;
        engine.accuracy = engine.correct_predictions as f64 / total;
        engine.weight = engine.accuracy + (2.0 * (total + 1.0).ln() / (total + 1.0)).sqrt();

        // Query pattern: the running best answer for this exact query.
        let pattern = self.query_patterns.entry(query.clone()).or_default();
        pattern.total_count += 1;
        pattern.avg_confidence = (pattern.avg_confidence * (pattern.total_count - 1) as f64
            + record.original_confidence)
            / pattern.total_count as f64;
        if record.is_correct {
            if pattern.best_doc.as_deref() == Some(actual.as_str()) {
                pattern.best_doc_count += 1;
            } else if pattern.best_doc.is_none() || pattern.best_doc_count == 0 {
                pattern.best_doc = Some(actual.clone());
                pattern.best_doc_count = 1;
            }
        }
    }
}

/// Adaptive learning layer: records what the engine answered, absorbs
/// user corrections, and turns the accumulated history into confidence
/// adjustments and answer shortcuts.
///
/// Readers (classify) take a short read lease; writers (teach) hold the
/// write lease only for the bounded set of map updates. Persistence is
/// best-effort: a failing store never blocks or corrupts the in-memory
/// state, it only marks the loop dirty for a later retry.
pub struct FeedbackLoop {
    config: FeedbackConfig,
    state: RwLock<FeedbackState>,
    store: Option<Arc<VectorStore>>,
    dirty: AtomicBool,
    degraded: AtomicBool,
}

impl FeedbackLoop {
    pub fn new(config: FeedbackConfig, store: Option<Arc<VectorStore>>) -> Self {
        let mut degraded = false;
        let state = match store.as_deref().map(VectorStore::load_feedback) {
            Some(Ok(Some(snapshot))) => {
                debug!(
                    corrections = snapshot.corrections.len(),
                    "loaded feedback state from store"
                );
                FeedbackState::from_snapshot(snapshot)
            }
            Some(Ok(None)) | None => FeedbackState::default(),
            Some(Err(err)) => {
                warn!(%err, "feedback store unreadable; running in memory-only mode");
                degraded = true;
                FeedbackState::default()
            }
        };

        Self {
            config,
            state: RwLock::new(state),
            store,
            dirty: AtomicBool::new(false),
            degraded: AtomicBool::new(degraded),
        }
    }

    pub fn config(&self) -> FeedbackConfig {
        self.config
    }

    /// True once any persistence operation has failed this session.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Append a prediction record. Aggregates are untouched, so enabling
    /// or disabling prediction recording can never change a returned
    /// answer.
    pub fn record_prediction(
        &self,
        query: &str,
        predicted_doc: &str,
        raw_confidence: f64,
        adjusted_confidence: f64,
        engine: &str,
    ) {
        let record = PredictionRecord {
            query_raw: query.to_string(),
            query_normalized: normalize_query(query),
            predicted_doc: predicted_doc.to_string(),
            engine: engine.to_string(),
            raw_confidence,
            adjusted_confidence,
            timestamp: Utc::now(),
        };

        let mut state = self.state.write().unwrap();
        state.predictions.push(record);
        if state.predictions.len() > PREDICTION_HISTORY_LIMIT {
            let excess = state.predictions.len() - PREDICTION_HISTORY_LIMIT;
            state.predictions.drain(..excess);
        }
        drop(state);

        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Record a correction and update every aggregate atomically with the
    /// append, then persist best-effort.
    pub fn record_correction(
        &self,
        query: &str,
        predicted_doc: &str,
        actual_doc: &str,
        original_confidence: f64,
        engine: &str,
    ) -> CorrectionOutcome {
        let record = CorrectionRecord {
            query_normalized: normalize_query(query),
            predicted_doc: predicted_doc.to_string(),
            actual_doc: actual_doc.to_string(),
            is_correct: predicted_doc == actual_doc,
            original_confidence,
            engine: engine.to_string(),
            timestamp: Utc::now(),
        };

        let (is_correct, success_rate, doc_accuracy, engine_accuracy, engine_weight) = {
            let mut state = self.state.write().unwrap();
            state.apply_correction(&record, self.config.learning_rate);
            state.corrections.push(record.clone());

            let success_rate = state.query_doc_stats
                [&pair_key(&record.query_normalized, &record.predicted_doc)]
                .success_rate;
            let doc_accuracy = state.doc_stats[&record.actual_doc].accuracy;
            let engine = &state.engine_stats[&record.engine];
            (
                record.is_correct,
                success_rate,
                doc_accuracy,
                engine.accuracy,
                engine.weight,
            )
        };

        self.dirty.store(true, Ordering::Relaxed);
        let persisted = self.try_persist();

        CorrectionOutcome {
            is_correct,
            success_rate,
            doc_accuracy,
            engine_accuracy,
            engine_weight,
            persisted,
        }
    }

    /// The learned answer for a query, if the pattern history warrants a
    /// bypass of scoring.
    ///
    /// An exact normalized match with at least two confirmations answers
    /// at `95 + min(5, confirmations)`. Otherwise the most similar
    /// confirmed pattern (Jaccard above 0.6) answers at a lower band,
    /// `80 + min(15, similarity * confirmations * 5)`.
    pub fn best_document_for(&self, query: &str) -> Option<Shortcut> {
        let normalized = normalize_query(query);
        let state = self.state.read().unwrap();

        if let Some(pattern) = state.query_patterns.get(&normalized) {
            if pattern.best_doc_count >= 2 {
                if let Some(doc) = &pattern.best_doc {
                    let confidence =
                        (95.0 + (pattern.best_doc_count as f64).min(5.0)).min(100.0);
                    return Some(Shortcut {
                        doc_path: doc.clone(),
                        confidence,
                        exact: true,
                    });
                }
            }
        }

        let mut best: Option<(&str, f64)> = None;
        for (pattern_query, pattern) in &state.query_patterns {
            if pattern.best_doc_count < 2 || pattern_query == &normalized {
                continue;
            }
            let Some(doc) = &pattern.best_doc else { continue };

            let similarity = query_similarity(&normalized, pattern_query);
            if similarity <= 0.6 {
                continue;
            }
            let score = similarity * pattern.best_doc_count as f64;
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((doc.as_str(), score));
            }
        }

        best.map(|(doc, score)| Shortcut {
            doc_path: doc.to_string(),
            confidence: 80.0 + (score * 5.0).min(15.0),
            exact: false,
        })
    }

    /// Adjust a raw confidence using the accumulated history for this
    /// (query, document, engine) combination. The result is clamped to
    /// [0, 100].
    pub fn adjust_confidence(
        &self,
        query: &str,
        doc_path: &str,
        raw_confidence: f64,
        engine: &str,
    ) -> f64 {
        let normalized = normalize_query(query);
        let state = self.state.read().unwrap();
        let mut adjusted = raw_confidence;

        // History of this exact (query, document) pair.
        if let Some(stats) = state.query_doc_stats.get(&pair_key(&normalized, doc_path)) {
            if stats.total_count > 0 {
                let sr = stats.success_rate;
                if sr > 0.7 {
                    adjusted += self.config.confidence_boost * (sr - 0.5);
                } else if sr < 0.3 {
                    adjusted -= self.config.confidence_penalty * (0.5 - sr);
                }
            }
        }

        // Document track record, once it has enough evidence.
        if let Some(doc) = state.doc_stats.get(doc_path) {
            if doc.times_shown >= 3 {
                adjusted += (doc.accuracy - 0.5) * 5.0;
            }
        }

        // Engine track record scales the whole estimate.
        if let Some(engine_stats) = state.engine_stats.get(engine) {
            if engine_stats.total_predictions >= 5 {
                adjusted *= 0.8 + 0.4 * engine_stats.accuracy;
            }
        }

        // Similar queries that were confirmed to land on this document.
        let mut max_similarity = 0.0f64;
        for (pattern_query, pattern) in &state.query_patterns {
            if pattern.best_doc.as_deref() == Some(doc_path) && pattern.best_doc_count >= 2 {
                max_similarity = max_similarity.max(query_similarity(&normalized, pattern_query));
            }
        }
        if max_similarity > 0.5 {
            adjusted += 5.0 * (max_similarity - 0.5) * 2.0;
        }

        adjusted.clamp(0.0, 100.0)
    }

    /// The document with the best correction track record, used as a
    /// last-resort prior when a query tokenizes to nothing.
    pub fn document_prior(&self) -> Option<(String, f64)> {
        let state = self.state.read().unwrap();
        state
            .doc_stats
            .iter()
            .filter(|(_, stats)| stats.times_shown > 0)
            // BTreeMap iterates in path order, so max_by keeps the
            // lexicographically first path on ties.
            .max_by(|a, b| {
                a.1.accuracy
                    .partial_cmp(&b.1.accuracy)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.0.cmp(a.0))
            })
            .map(|(doc, stats)| (doc.clone(), stats.accuracy))
    }

    /// Normalized per-engine weights across engines with any history.
    pub fn engine_weights(&self) -> BTreeMap<String, f64> {
        let state = self.state.read().unwrap();
        let mut weights: BTreeMap<String, f64> = state
            .engine_stats
            .iter()
            .filter(|(_, stats)| stats.total_predictions > 0)
            .map(|(engine, stats)| (engine.clone(), stats.weight))
            .collect();

        let total: f64 = weights.values().sum();
        if total > 0.0 {
            for weight in weights.values_mut() {
                *weight /= total;
            }
        }
        weights
    }

    pub fn predictions_total(&self) -> u64 {
        self.state.read().unwrap().predictions.len() as u64
    }

    pub fn corrections_total(&self) -> u64 {
        self.state.read().unwrap().corrections.len() as u64
    }

    pub fn report(&self) -> FeedbackReport {
        let state = self.state.read().unwrap();
        let corrections_total = state.corrections.len() as u64;
        let correct = state.corrections.iter().filter(|c| c.is_correct).count() as u64;

        let mut top_documents: Vec<TopDocumentReport> = state
            .doc_stats
            .iter()
            .filter(|(_, stats)| stats.times_shown >= 3)
            .map(|(doc, stats)| TopDocumentReport {
                doc_path: doc.clone(),
                accuracy: stats.accuracy,
                times_shown: stats.times_shown,
                times_correct: stats.times_correct,
            })
            .collect();
        top_documents.sort_by(|a, b| {
            b.accuracy
                .partial_cmp(&a.accuracy)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.times_shown.cmp(&a.times_shown))
        });
        top_documents.truncate(5);

        FeedbackReport {
            predictions_total: state.predictions.len() as u64,
            corrections_total,
            correct_corrections: correct,
            overall_accuracy: if corrections_total > 0 {
                correct as f64 / corrections_total as f64
            } else {
                0.0
            },
            unique_queries: state.query_patterns.len(),
            unique_documents: state.doc_stats.len(),
            learning_rate: self.config.learning_rate,
            top_documents,
        }
    }

    /// Recompute every aggregate from the correction stream, discarding
    /// the current aggregate maps. Used when persisted aggregates are
    /// suspect.
    pub fn rebuild_aggregates(&self) {
        let mut state = self.state.write().unwrap();
        let corrections = std::mem::take(&mut state.corrections);

        state.query_doc_stats.clear();
        state.doc_stats.clear();
        state.engine_stats.clear();
        state.query_patterns.clear();

        for record in &corrections {
            state.apply_correction(record, self.config.learning_rate);
        }
        state.corrections = corrections;
        drop(state);

        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Persist pending state if anything changed since the last
    /// successful write. Returns true when the store is in sync.
    pub fn flush(&self) -> bool {
        if !self.dirty.load(Ordering::Relaxed) {
            return true;
        }
        self.try_persist()
    }

    fn try_persist(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };

        let snapshot = self.state.read().unwrap().snapshot();
        match store.save_feedback(&snapshot) {
            Ok(()) => {
                self.dirty.store(false, Ordering::Relaxed);
                true
            }
            Err(err) => {
                warn!(%err, "could not persist feedback state; keeping in-memory copy");
                self.degraded.store(true, Ordering::Relaxed);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loop_in_memory() -> FeedbackLoop {
        FeedbackLoop::new(FeedbackConfig::default(), None)
    }

    fn correct(feedback: &FeedbackLoop, query: &str, doc: &str) -> CorrectionOutcome {
        feedback.record_correction(query, doc, doc, 80.0, "hybrid")
    }

    #[test]
    fn test_prediction_updates_no_aggregates() {
        let feedback = loop_in_memory();
        feedback.record_prediction("negative value", "a.md", 70.0, 70.0, "hybrid");

        assert_eq!(feedback.predictions_total(), 1);
        let report = feedback.report();
        assert_eq!(report.corrections_total, 0);
        assert_eq!(report.unique_documents, 0);
        assert_eq!(report.unique_queries, 0);
    }

    #[test]
    fn test_success_rate_ema() {
        let feedback = loop_in_memory();

        // One hit from the 0.5 seed: 0.1 * 1 + 0.9 * 0.5 = 0.55
        let outcome = correct(&feedback, "negative value", "a.md");
        assert!((outcome.success_rate - 0.55).abs() < 1e-9);

        // A second hit compounds: 0.1 + 0.9 * 0.55 = 0.595
        let outcome = correct(&feedback, "negative value", "a.md");
        assert!((outcome.success_rate - 0.595).abs() < 1e-9);

        // A miss decays the pair the engine proposed: 0.9 * 0.595 = 0.5355
        let outcome =
            feedback.record_correction("negative value", "a.md", "b.md", 60.0, "hybrid");
        assert!(!outcome.is_correct);
        assert!((outcome.success_rate - 0.5355).abs() < 1e-9);
    }

    #[test]
    fn test_exact_shortcut_requires_two_confirmations() {
        let feedback = loop_in_memory();
        correct(&feedback, "schema validation failed", "schema.md");
        assert!(feedback.best_document_for("schema validation failed").is_none());

        correct(&feedback, "schema validation failed", "schema.md");
        let shortcut = feedback
            .best_document_for("schema validation failed")
            .unwrap();
        assert_eq!(shortcut.doc_path, "schema.md");
        assert!(shortcut.exact);
        assert!(shortcut.confidence >= 97.0);
        assert!(shortcut.confidence <= 100.0);
    }

    #[test]
    fn test_fuzzy_shortcut_for_similar_query() {
        let feedback = loop_in_memory();
        correct(&feedback, "schema validation failed badly", "schema.md");
        correct(&feedback, "schema validation failed badly", "schema.md");

        // Three of four words shared: similarity 0.75
        let shortcut = feedback
            .best_document_for("schema validation failed")
            .unwrap();
        assert_eq!(shortcut.doc_path, "schema.md");
        assert!(!shortcut.exact);
        assert!(shortcut.confidence >= 80.0);
        assert!(shortcut.confidence < 97.0);
    }

    #[test]
    fn test_adjust_confidence_boosts_proven_pairs() {
        let feedback = loop_in_memory();
        for _ in 0..10 {
            correct(&feedback, "negative value", "a.md");
        }

        let adjusted = feedback.adjust_confidence("negative value", "a.md", 70.0, "hybrid");
        assert!(adjusted > 70.0);
        assert!(adjusted <= 100.0);
    }

    #[test]
    fn test_adjust_confidence_penalizes_bad_pairs() {
        let feedback = loop_in_memory();
        for _ in 0..10 {
            feedback.record_correction("negative value", "wrong.md", "a.md", 70.0, "hybrid");
        }

        // The engine kept proposing wrong.md for this query and kept
        // being corrected; proposing it again scores lower.
        let adjusted = feedback.adjust_confidence("negative value", "wrong.md", 70.0, "hybrid");
        assert!(adjusted < 70.0);

        // The confirmed answer meanwhile gains ground.
        let boosted = feedback.adjust_confidence("negative value", "a.md", 70.0, "hybrid");
        assert!(boosted > adjusted);
    }

    #[test]
    fn test_adjust_confidence_clamped() {
        let feedback = loop_in_memory();
        for _ in 0..20 {
            correct(&feedback, "negative value", "a.md");
        }
        let adjusted = feedback.adjust_confidence("negative value", "a.md", 99.5, "hybrid");
        assert!(adjusted <= 100.0);

        for _ in 0..20 {
            feedback.record_correction("broken", "bad.md", "good.md", 50.0, "hybrid");
        }
        let adjusted = feedback.adjust_confidence("broken", "bad.md", 0.5, "hybrid");
        assert!(adjusted >= 0.0);
    }

    #[test]
    fn test_engine_weights_normalize() {
        let feedback = loop_in_memory();
        correct(&feedback, "q1", "a.md");
        feedback.record_correction("q2", "a.md", "b.md", 70.0, "fallback");

        let weights = feedback.engine_weights();
        assert_eq!(weights.len(), 2);
        let total: f64 = weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(weights["hybrid"] > weights["fallback"]);
    }

    #[test]
    fn test_document_prior_prefers_accurate_docs() {
        let feedback = loop_in_memory();
        correct(&feedback, "q1", "good.md");
        feedback.record_correction("q2", "bad.md", "meh.md", 50.0, "hybrid");

        let (doc, accuracy) = feedback.document_prior().unwrap();
        assert_eq!(doc, "good.md");
        assert_eq!(accuracy, 1.0);
    }

    #[test]
    fn test_rebuild_aggregates_matches_incremental() {
        let feedback = loop_in_memory();
        correct(&feedback, "q1", "a.md");
        correct(&feedback, "q1", "a.md");
        feedback.record_correction("q2", "a.md", "b.md", 60.0, "hybrid");

        let before = feedback.report();
        let shortcut_before = feedback.best_document_for("q1").unwrap();

        feedback.rebuild_aggregates();

        let after = feedback.report();
        let shortcut_after = feedback.best_document_for("q1").unwrap();
        assert_eq!(before.corrections_total, after.corrections_total);
        assert_eq!(before.overall_accuracy, after.overall_accuracy);
        assert_eq!(before.unique_queries, after.unique_queries);
        assert_eq!(shortcut_before.doc_path, shortcut_after.doc_path);
        assert_eq!(shortcut_before.confidence, shortcut_after.confidence);
    }

    #[test]
    fn test_memory_only_mode_reports_unpersisted() {
        let feedback = loop_in_memory();
        let outcome = correct(&feedback, "q1", "a.md");
        assert!(!outcome.persisted);
        // Memory-only is a configuration, not a failure
        assert!(!feedback.is_degraded());
    }
}
