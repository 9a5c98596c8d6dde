use ahash::AHashMap;
use rayon::prelude::*;

// Replace standard collections with ahash versions for better performance
type HashMap<K, V> = AHashMap<K, V>;

/// Parameters for the Okapi BM25 ranking function.
///
/// `k1` controls term-frequency saturation, `b` controls document length
/// normalization; both defaults are the standard values from the BM25
/// literature. `epsilon` floors the IDF so very common terms cannot go
/// negative, and a non-zero `delta` turns the scorer into the BM25+
/// variant (a flat bonus per matched term, which helps long documents).
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub epsilon: f64,
    pub delta: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
            delta: 0.0,
        }
    }
}

/// Okapi BM25 ranker over a fitted corpus.
///
/// The fitted state (term frequencies, lengths, IDFs) is cheap to build,
/// so it is always reconstructed from the documents rather than
/// persisted.
#[derive(Debug, Clone)]
pub struct Bm25 {
    params: Bm25Params,
    corpus_size: usize,
    avgdl: f64,
    doc_term_freqs: Vec<HashMap<String, usize>>,
    doc_lengths: Vec<usize>,
    idf: HashMap<String, f64>,
}

/// Computes the average document length.
pub fn compute_avgdl(lengths: &[usize]) -> f64 {
    if lengths.is_empty() {
        return 0.0;
    }
    let sum: f64 = lengths.iter().map(|&x| x as f64).sum();
    sum / lengths.len() as f64
}

impl Bm25 {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            corpus_size: 0,
            avgdl: 0.0,
            doc_term_freqs: Vec::new(),
            doc_lengths: Vec::new(),
            idf: HashMap::new(),
        }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn corpus_size(&self) -> usize {
        self.corpus_size
    }

    pub fn avgdl(&self) -> f64 {
        self.avgdl
    }

    /// Fit the ranker on a tokenized corpus: per-document term
    /// frequencies and lengths, plus the smoothed IDF
    /// `max(epsilon, ln((N - n + 0.5) / (n + 0.5) + 1))` per term.
    pub fn fit(&mut self, tokenized_docs: &[Vec<String>]) {
        self.corpus_size = tokenized_docs.len();
        self.doc_lengths = tokenized_docs.iter().map(|doc| doc.len()).collect();
        self.avgdl = compute_avgdl(&self.doc_lengths);

        self.doc_term_freqs = tokenized_docs
            .iter()
            .map(|doc| {
                let mut freqs: HashMap<String, usize> = HashMap::new();
                for token in doc {
                    *freqs.entry(token.clone()).or_insert(0) += 1;
                }
                freqs
            })
            .collect();

        // Document frequency per term
        let mut doc_count: HashMap<&str, usize> = HashMap::new();
        for freqs in &self.doc_term_freqs {
            for term in freqs.keys() {
                *doc_count.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let n = self.corpus_size as f64;
        self.idf = doc_count
            .into_iter()
            .map(|(term, n_q)| {
                let idf = ((n - n_q as f64 + 0.5) / (n_q as f64 + 0.5) + 1.0).ln();
                (term.to_string(), idf.max(self.params.epsilon))
            })
            .collect();
    }

    /// BM25 score of a tokenized query against a single fitted document.
    ///
    /// Query terms absent from the corpus vocabulary contribute nothing.
    fn score_document(&self, query_tokens: &[String], doc_idx: usize) -> f64 {
        let freqs = &self.doc_term_freqs[doc_idx];
        let doc_len = self.doc_lengths[doc_idx] as f64;
        let Bm25Params { k1, b, delta, .. } = self.params;

        let mut score = 0.0;
        for term in query_tokens {
            let Some(&idf) = self.idf.get(term.as_str()) else {
                continue;
            };
            let freq = *freqs.get(term.as_str()).unwrap_or(&0) as f64;
            if freq <= 0.0 {
                continue;
            }

            let tf_part =
                (freq * (k1 + 1.0)) / (freq + k1 * (1.0 - b + b * (doc_len / self.avgdl)));
            score += idf * (tf_part + delta);
        }
        score
    }

    /// Score a tokenized query against every fitted document.
    ///
    /// Documents are scored in parallel but collected in index order, so
    /// the result vector is deterministic.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f64> {
        (0..self.corpus_size)
            .collect::<Vec<_>>()
            .par_iter()
            .map(|&idx| self.score_document(query_tokens, idx))
            .collect()
    }
}
