use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::corpus::{self, CorpusDocument};
use crate::models::{
    Classification, IndexSummary, RankingExplanation, Source, StatusReport, TeachReceipt,
    TopMatch,
};
use crate::ranking::Bm25;
use crate::search::cache::{CachedPrediction, QueryCache, SEARCH_PREFIX};
use crate::search::errors::ClassifyError;
use crate::search::feedback::{FeedbackLoop, Shortcut};
use crate::search::fusion::{self, FusionWeights};
use crate::search::similarity;
use crate::search::store::VectorStore;
use crate::search::tfidf::TfidfVectorizer;
use crate::search::tokenization;

/// Engine identifier used for cache keys and feedback attribution.
pub const ENGINE_ID: &str = "hybrid";

/// Vector type under which TF-IDF rows are persisted.
const VECTOR_TYPE_TFIDF: &str = "tfidf";

/// Everything classify needs, immutable once built. Reindexing builds a
/// fresh state off to the side and swaps it in atomically, so concurrent
/// readers always see one consistent corpus.
struct IndexState {
    documents: Vec<CorpusDocument>,
    vectorizer: TfidfVectorizer,
    matrix: Vec<Vec<f32>>,
    bm25: Bm25,
}

/// Hybrid classification engine: TF-IDF cosine and Okapi BM25 fused into
/// one score, a hot-query cache in front, and a feedback loop that
/// adjusts confidence and learns shortcut answers from corrections.
pub struct HybridEngine {
    settings: EngineSettings,
    store: Option<Arc<VectorStore>>,
    cache: QueryCache,
    feedback: FeedbackLoop,
    index: RwLock<Option<Arc<IndexState>>>,
    store_degraded: AtomicBool,
}

impl HybridEngine {
    /// Build an engine from resolved settings. The store is optional; a
    /// store that cannot be opened demotes the engine to memory-only
    /// operation instead of failing.
    pub fn new(settings: EngineSettings) -> Self {
        let mut store_degraded = false;
        let store = match &settings.store_dir {
            Some(dir) => match VectorStore::open(dir) {
                Ok(store) => Some(Arc::new(store)),
                Err(err) => {
                    warn!(%err, dir = %dir.display(), "vector store unavailable; running in memory-only mode");
                    store_degraded = true;
                    None
                }
            },
            None => None,
        };

        let cache = QueryCache::new(settings.cache_enabled, settings.cache_ttl_seconds);
        let feedback = FeedbackLoop::new(settings.feedback, store.clone());

        Self {
            settings,
            store,
            cache,
            feedback,
            index: RwLock::new(None),
            store_degraded: AtomicBool::new(store_degraded),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn fusion_weights(&self) -> FusionWeights {
        self.settings.fusion.normalized()
    }

    fn mark_store_degraded(&self) {
        self.store_degraded.store(true, Ordering::Relaxed);
    }

    fn current_state(&self) -> Result<Arc<IndexState>, ClassifyError> {
        let state = self
            .index
            .read()
            .unwrap()
            .clone()
            .ok_or(ClassifyError::EmptyCorpus)?;
        if state.documents.is_empty() {
            return Err(ClassifyError::EmptyCorpus);
        }
        Ok(state)
    }

    // ---------------------------------------------------------------
    // Indexing
    // ---------------------------------------------------------------

    /// Walk the corpus and (re)build or load the in-memory indices.
    ///
    /// When the persisted vector set still matches the corpus, TF-IDF
    /// vectors and the vocabulary are loaded from the store and only the
    /// lightweight BM25 state is recomputed. Any fresh fit invalidates
    /// the hot-query cache.
    pub fn index(&self) -> Result<IndexSummary, ClassifyError> {
        let documents = corpus::load_corpus(&self.settings.docs_root)
            .map_err(|err| ClassifyError::Corpus(err.to_string()))?;

        if documents.is_empty() {
            warn!(root = %self.settings.docs_root.display(), "no documentation files found");
            *self.index.write().unwrap() = None;
            return Ok(IndexSummary {
                documents: 0,
                vocabulary_size: 0,
                reindexed: false,
            });
        }

        let paths: Vec<String> = documents.iter().map(|d| d.doc_path.clone()).collect();
        self.persist_documents(&documents);

        let state = match self.try_load_state(&documents, &paths) {
            Some(state) => {
                info!(documents = paths.len(), "loaded vectors from persistent store");
                state
            }
            None => self.fit_state(documents)?,
        };
        let reindexed = state.1;
        let state = state.0;

        let summary = IndexSummary {
            documents: state.documents.len(),
            vocabulary_size: state.vectorizer.vocabulary_len(),
            reindexed,
        };

        *self.index.write().unwrap() = Some(Arc::new(state));
        if reindexed {
            self.cache.invalidate_on_doc_change();
        }

        info!(
            documents = summary.documents,
            vocabulary = summary.vocabulary_size,
            reindexed,
            "indexing complete"
        );
        Ok(summary)
    }

    fn persist_documents(&self, documents: &[CorpusDocument]) {
        let Some(store) = &self.store else { return };
        for doc in documents {
            if let Err(err) =
                store.save_document(&doc.doc_path, &doc.content, &doc.service, &doc.category)
            {
                warn!(%err, doc = %doc.doc_path, "could not persist document");
                self.mark_store_degraded();
                return;
            }
        }
    }

    /// Try to serve the index from persisted vectors. Returns `None` when
    /// a reindex is needed or any load step fails.
    fn try_load_state(
        &self,
        documents: &[CorpusDocument],
        paths: &[String],
    ) -> Option<(IndexState, bool)> {
        let store = self.store.as_ref()?;

        match store.needs_reindex(paths, VECTOR_TYPE_TFIDF) {
            Ok(false) => {}
            Ok(true) => return None,
            Err(err) => {
                warn!(%err, "needs_reindex check failed; rebuilding");
                self.mark_store_degraded();
                return None;
            }
        }

        let (stored_paths, matrix) = match store.get_all_vectors(VECTOR_TYPE_TFIDF) {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(%err, "could not load persisted vectors; rebuilding");
                self.mark_store_degraded();
                return None;
            }
        };
        let (feature_names, idf_values) = match store.get_vocabulary(VECTOR_TYPE_TFIDF) {
            Ok(Some((names, Some(idf)))) => (names, idf),
            Ok(_) => return None,
            Err(err) => {
                warn!(%err, "could not load persisted vocabulary; rebuilding");
                self.mark_store_degraded();
                return None;
            }
        };
        if stored_paths.is_empty() || feature_names.is_empty() {
            return None;
        }

        // Reorder the corpus documents to line up with the stored rows.
        let mut ordered = Vec::with_capacity(stored_paths.len());
        for stored_path in &stored_paths {
            let doc = documents.iter().find(|d| &d.doc_path == stored_path)?;
            ordered.push(doc.clone());
        }

        let vectorizer = TfidfVectorizer::from_parts(
            self.settings.tfidf.clone(),
            feature_names,
            idf_values,
            ordered.len(),
        );
        let bm25 = self.fit_bm25(&ordered);

        Some((
            IndexState {
                documents: ordered,
                vectorizer,
                matrix,
                bm25,
            },
            false,
        ))
    }

    /// Fit TF-IDF and BM25 from scratch and persist the results.
    fn fit_state(&self, documents: Vec<CorpusDocument>) -> Result<(IndexState, bool), ClassifyError> {
        debug!(documents = documents.len(), "building fresh index");

        let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let mut vectorizer = TfidfVectorizer::new(self.settings.tfidf.clone());
        let matrix = vectorizer.fit_transform(&contents)?;
        if vectorizer.vocabulary_len() == 0 {
            return Err(ClassifyError::EmptyVocabulary);
        }

        if let Some(store) = &self.store {
            let paths: Vec<String> = documents.iter().map(|d| d.doc_path.clone()).collect();
            let persisted = store
                .save_vectors_batch(&paths, &matrix, VECTOR_TYPE_TFIDF)
                .and_then(|_| {
                    store.save_vocabulary(
                        VECTOR_TYPE_TFIDF,
                        vectorizer.feature_names(),
                        Some(vectorizer.idf_values()),
                    )
                })
                .and_then(|_| {
                    let options = vectorizer.options();
                    store.save_metadata(
                        VECTOR_TYPE_TFIDF,
                        &serde_json::json!({
                            "max_features": options.max_features,
                            "ngram_min": options.ngram_range.0,
                            "ngram_max": options.ngram_range.1,
                            "stop_words": true,
                        }),
                    )
                });
            if let Err(err) = persisted {
                warn!(%err, "could not persist vectors; continuing in memory");
                self.mark_store_degraded();
            }
        }

        let bm25 = self.fit_bm25(&documents);
        Ok((
            IndexState {
                documents,
                vectorizer,
                matrix,
                bm25,
            },
            true,
        ))
    }

    fn fit_bm25(&self, documents: &[CorpusDocument]) -> Bm25 {
        let tokenized: Vec<Vec<String>> = documents
            .iter()
            .map(|d| tokenization::tokenize(&d.content))
            .collect();
        let mut bm25 = Bm25::new(self.settings.bm25);
        bm25.fit(&tokenized);
        bm25
    }

    // ---------------------------------------------------------------
    // Classification
    // ---------------------------------------------------------------

    /// Classify an error message against the corpus.
    ///
    /// `method` is accepted for forward compatibility; anything other
    /// than the hybrid engine is answered by the hybrid engine with a
    /// warning attached.
    pub fn classify(
        &self,
        query: &str,
        method: Option<&str>,
    ) -> Result<Classification, ClassifyError> {
        self.classify_inner(query, method).map(|(result, _)| result)
    }

    /// Classification plus the raw (pre-adjustment) confidence, which
    /// the teach path feeds into the correction record.
    fn classify_inner(
        &self,
        query: &str,
        method: Option<&str>,
    ) -> Result<(Classification, f64), ClassifyError> {
        let warning = method
            .filter(|m| !m.eq_ignore_ascii_case(ENGINE_ID))
            .map(|m| format!("method '{m}' is not available; the hybrid engine answered"));

        let state = self.current_state()?;
        if state.vectorizer.vocabulary_len() == 0 {
            return Err(ClassifyError::EmptyVocabulary);
        }

        // Fast path: a previous answer for this exact query.
        if let Some(hit) = self.cache.get(SEARCH_PREFIX, query, ENGINE_ID) {
            self.feedback
                .record_prediction(query, &hit.doc_path, hit.confidence, hit.confidence, ENGINE_ID);
            return Ok((
                Classification {
                    doc_path: hit.doc_path,
                    confidence: hit.confidence,
                    source: Source::Cache,
                    warning,
                },
                hit.confidence,
            ));
        }

        // Learned shortcut from confirmed corrections.
        if let Some(Shortcut {
            doc_path,
            confidence,
            ..
        }) = self.feedback.best_document_for(query)
        {
            self.cache.set(
                SEARCH_PREFIX,
                query,
                ENGINE_ID,
                CachedPrediction {
                    doc_path: doc_path.clone(),
                    confidence,
                },
            );
            self.feedback
                .record_prediction(query, &doc_path, confidence, confidence, ENGINE_ID);
            return Ok((
                Classification {
                    doc_path,
                    confidence,
                    source: Source::Learned,
                    warning,
                },
                confidence,
            ));
        }

        let query_tokens = tokenization::tokenize(query);
        if query_tokens.is_empty() {
            return self
                .prior_fallback(query, &state, warning)
                .ok_or(ClassifyError::EmptyQueryAfterTokenisation);
        }

        let fused = self.fused_scores(&state, query, &query_tokens)?;
        let best_idx = similarity::argmax(&fused).ok_or(ClassifyError::EmptyCorpus)?;
        let raw_confidence = fused[best_idx] * 100.0;
        let doc_path = state.documents[best_idx].doc_path.clone();

        let adjusted =
            self.feedback
                .adjust_confidence(query, &doc_path, raw_confidence, ENGINE_ID);

        self.cache.set(
            SEARCH_PREFIX,
            query,
            ENGINE_ID,
            CachedPrediction {
                doc_path: doc_path.clone(),
                confidence: adjusted,
            },
        );
        self.feedback
            .record_prediction(query, &doc_path, raw_confidence, adjusted, ENGINE_ID);

        Ok((
            Classification {
                doc_path,
                confidence: adjusted,
                source: Source::Hybrid,
                warning,
            },
            raw_confidence,
        ))
    }

    /// Answer a token-less query from the document correction history, if
    /// there is any.
    fn prior_fallback(
        &self,
        query: &str,
        state: &IndexState,
        warning: Option<String>,
    ) -> Option<(Classification, f64)> {
        let (doc_path, accuracy) = self.feedback.document_prior()?;
        // The prior may reference a document that has left the corpus.
        if !state.documents.iter().any(|d| d.doc_path == doc_path) {
            return None;
        }

        let confidence = (accuracy * 100.0).clamp(0.0, 100.0);
        self.feedback
            .record_prediction(query, &doc_path, confidence, confidence, ENGINE_ID);
        Some((
            Classification {
                doc_path,
                confidence,
                source: Source::Prior,
                warning,
            },
            confidence,
        ))
    }

    fn fused_scores(
        &self,
        state: &IndexState,
        query: &str,
        query_tokens: &[String],
    ) -> Result<Vec<f64>, ClassifyError> {
        let query_row = state.vectorizer.transform_one(query)?;
        if let Some(row) = state.matrix.first() {
            if row.len() != query_row.len() {
                return Err(ClassifyError::DimensionMismatch {
                    stored: row.len(),
                    expected: query_row.len(),
                });
            }
        }
        let tfidf_scores = similarity::cosine_scores(&query_row, &state.matrix);
        let bm25_scores = state.bm25.scores(query_tokens);
        Ok(fusion::fuse(&tfidf_scores, &bm25_scores, self.fusion_weights()))
    }

    /// Top-N documents by fused score.
    pub fn top_matches(&self, query: &str, n: usize) -> Result<Vec<TopMatch>, ClassifyError> {
        let state = self.current_state()?;
        let query_tokens = tokenization::tokenize(query);
        if query_tokens.is_empty() {
            return Err(ClassifyError::EmptyQueryAfterTokenisation);
        }

        let fused = self.fused_scores(&state, query, &query_tokens)?;
        Ok(similarity::top_k(&fused, n)
            .into_iter()
            .map(|(idx, score)| {
                let doc = &state.documents[idx];
                TopMatch {
                    doc_path: doc.doc_path.clone(),
                    confidence: score * 100.0,
                    service: doc.service.clone(),
                    category: doc.category.clone(),
                }
            })
            .collect())
    }

    /// Break down how the winning document was scored for a query.
    pub fn explain(&self, query: &str) -> Result<RankingExplanation, ClassifyError> {
        let state = self.current_state()?;
        let query_tokens = tokenization::tokenize(query);
        if query_tokens.is_empty() {
            return Err(ClassifyError::EmptyQueryAfterTokenisation);
        }

        let query_row = state.vectorizer.transform_one(query)?;
        let tfidf_scores = similarity::cosine_scores(&query_row, &state.matrix);
        let bm25_scores = state.bm25.scores(&query_tokens);

        let tfidf_normalized = fusion::min_max_normalize(&tfidf_scores);
        let bm25_normalized = fusion::min_max_normalize(&bm25_scores);
        let weights = self.fusion_weights();
        let fused = fusion::fuse(&tfidf_scores, &bm25_scores, weights);

        let best_idx = similarity::argmax(&fused).ok_or(ClassifyError::EmptyCorpus)?;
        let doc = &state.documents[best_idx];

        Ok(RankingExplanation {
            doc_path: doc.doc_path.clone(),
            service: doc.service.clone(),
            category: doc.category.clone(),
            tfidf_raw: tfidf_scores[best_idx],
            bm25_raw: bm25_scores[best_idx],
            tfidf_normalized: tfidf_normalized[best_idx],
            bm25_normalized: bm25_normalized[best_idx],
            tfidf_weight: weights.tfidf,
            bm25_weight: weights.bm25,
            fused_score: fused[best_idx],
            confidence: fused[best_idx] * 100.0,
        })
    }

    // ---------------------------------------------------------------
    // Teaching
    // ---------------------------------------------------------------

    /// Teach the engine the correct document for a query.
    ///
    /// The query is classified first so the correction records what the
    /// engine would answer right now; the correction then updates the
    /// feedback aggregates and evicts the stale cache entry.
    pub fn teach(&self, query: &str, correct_doc: &str) -> Result<TeachReceipt, ClassifyError> {
        let state = self.current_state()?;
        let correct_doc = correct_doc.replace('\\', "/");
        if !state.documents.iter().any(|d| d.doc_path == correct_doc) {
            return Err(ClassifyError::UnknownDocument(correct_doc));
        }

        let (classification, raw_confidence) = self.classify_inner(query, None)?;
        let outcome = self.feedback.record_correction(
            query,
            &classification.doc_path,
            &correct_doc,
            raw_confidence,
            ENGINE_ID,
        );
        self.cache.remove(SEARCH_PREFIX, query, ENGINE_ID);

        let mut message = if outcome.is_correct {
            format!(
                "confirmed {} (success rate {:.0}%)",
                correct_doc,
                outcome.success_rate * 100.0
            )
        } else {
            format!(
                "corrected {} -> {} (success rate {:.0}%)",
                classification.doc_path,
                correct_doc,
                outcome.success_rate * 100.0
            )
        };

        let retryable = !outcome.persisted && self.store.is_some();
        if retryable {
            message.push_str("; persistence deferred, will retry");
        }

        Ok(TeachReceipt {
            ok: true,
            message,
            retryable,
        })
    }

    // ---------------------------------------------------------------
    // Introspection and lifecycle
    // ---------------------------------------------------------------

    pub fn status(&self) -> StatusReport {
        let index = self.index.read().unwrap().clone();
        let (documents, vocabulary_size) = index
            .as_ref()
            .map(|state| (state.documents.len(), state.vectorizer.vocabulary_len()))
            .unwrap_or((0, 0));

        StatusReport {
            healthy: documents > 0,
            degraded_persistence: self.store_degraded.load(Ordering::Relaxed)
                || self.feedback.is_degraded(),
            documents,
            vocabulary_size,
            predictions_total: self.feedback.predictions_total(),
            corrections_total: self.feedback.corrections_total(),
            feedback: self.feedback.report(),
            engine_weights: self.feedback.engine_weights(),
            cache: self.cache.stats(),
        }
    }

    /// Retry any deferred feedback persistence. Call before shutdown.
    pub fn flush(&self) -> bool {
        self.feedback.flush()
    }
}
