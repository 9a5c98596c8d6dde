use ahash::AHashMap;

use crate::search::errors::ClassifyError;
use crate::search::tokenization;

// Replace standard collections with ahash versions for better performance
type HashMap<K, V> = AHashMap<K, V>;

/// Document-frequency bound that can be expressed as an absolute count or
/// as a ratio of the corpus size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DocFrequency {
    Count(usize),
    Ratio(f64),
}

impl DocFrequency {
    fn resolve(&self, n_docs: usize) -> usize {
        match *self {
            DocFrequency::Count(count) => count,
            DocFrequency::Ratio(ratio) => (ratio * n_docs as f64) as usize,
        }
    }
}

/// Settings for [`TfidfVectorizer`].
#[derive(Debug, Clone)]
pub struct TfidfOptions {
    /// Cap on vocabulary size; terms are kept by descending document
    /// frequency with lexicographic tie-breaks. `None` means unlimited.
    pub max_features: Option<usize>,
    /// Terms appearing in fewer documents than this are pruned.
    pub min_df: DocFrequency,
    /// Terms appearing in more documents than this are pruned.
    pub max_df: DocFrequency,
    /// Inclusive n-gram lengths emitted by the tokenizer.
    pub ngram_range: (usize, usize),
}

impl Default for TfidfOptions {
    fn default() -> Self {
        Self {
            max_features: Some(5000),
            min_df: DocFrequency::Count(1),
            max_df: DocFrequency::Ratio(1.0),
            ngram_range: (1, 2),
        }
    }
}

/// Term Frequency-Inverse Document Frequency vectorizer.
///
/// `fit` learns a vocabulary and per-term IDF values from a corpus;
/// `transform` turns documents into L2-normalized sparse-ish rows over
/// that vocabulary. Feature indices are assigned in sorted term order so
/// the same corpus always produces the same matrix.
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    options: TfidfOptions,
    vocabulary: HashMap<String, usize>,
    feature_names: Vec<String>,
    idf_values: Vec<f32>,
    n_docs: usize,
    fitted: bool,
}

impl TfidfVectorizer {
    pub fn new(options: TfidfOptions) -> Self {
        Self {
            options,
            vocabulary: HashMap::new(),
            feature_names: Vec::new(),
            idf_values: Vec::new(),
            n_docs: 0,
            fitted: false,
        }
    }

    /// Reconstruct a fitted vectorizer from a persisted vocabulary and its
    /// IDF values (as returned by the vector store).
    pub fn from_parts(
        options: TfidfOptions,
        feature_names: Vec<String>,
        idf_values: Vec<f32>,
        n_docs: usize,
    ) -> Self {
        let vocabulary = feature_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Self {
            options,
            vocabulary,
            feature_names,
            idf_values,
            n_docs,
            fitted: true,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Number of features in the fitted vocabulary.
    pub fn vocabulary_len(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn idf_values(&self) -> &[f32] {
        &self.idf_values
    }

    pub fn options(&self) -> &TfidfOptions {
        &self.options
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        tokenization::tokenize_ngrams(text, self.options.ngram_range)
    }

    /// Learn vocabulary and IDF values from the corpus.
    ///
    /// Terms are pruned by document frequency, capped at `max_features`,
    /// and indexed in sorted order. IDF uses the smoothed form
    /// `ln(N / df) + 1` so terms present in every document keep a
    /// non-zero weight.
    pub fn fit(&mut self, documents: &[String]) {
        let n_docs = documents.len();
        self.n_docs = n_docs;

        // Document frequency per term
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let mut unique: Vec<String> = self.tokenize(doc);
            unique.sort_unstable();
            unique.dedup();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let min_count = self.options.min_df.resolve(n_docs);
        let max_count = self.options.max_df.resolve(n_docs);

        let mut kept: Vec<(&String, usize)> = doc_freq
            .iter()
            .filter(|(_, &df)| df >= min_count && df <= max_count)
            .map(|(term, &df)| (term, df))
            .collect();

        // Cap vocabulary by document frequency, breaking ties
        // lexicographically so the cut is deterministic.
        if let Some(max_features) = self.options.max_features {
            if kept.len() > max_features {
                kept.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                kept.truncate(max_features);
            }
        }

        let mut feature_names: Vec<String> = kept.iter().map(|(term, _)| (*term).clone()).collect();
        feature_names.sort_unstable();

        self.vocabulary = feature_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        self.idf_values = feature_names
            .iter()
            .map(|term| {
                let df = doc_freq[term] as f64;
                ((n_docs as f64 / df).ln() + 1.0) as f32
            })
            .collect();

        self.feature_names = feature_names;
        self.fitted = true;
    }

    /// Transform documents into a row-major TF-IDF matrix.
    ///
    /// Each row has `vocabulary_len()` columns with
    /// `tf * idf` entries (`tf = count / total_tokens`) and is
    /// L2-normalized. A document with no in-vocabulary tokens stays the
    /// zero vector. Out-of-vocabulary tokens are silently ignored.
    pub fn transform(&self, documents: &[String]) -> Result<Vec<Vec<f32>>, ClassifyError> {
        if !self.fitted {
            return Err(ClassifyError::NotFitted);
        }

        documents.iter().map(|doc| self.transform_one(doc)).collect()
    }

    /// Transform a single document (used for queries).
    pub fn transform_one(&self, text: &str) -> Result<Vec<f32>, ClassifyError> {
        if !self.fitted {
            return Err(ClassifyError::NotFitted);
        }

        let n_features = self.feature_names.len();
        let mut row = vec![0.0f32; n_features];

        let tokens = self.tokenize(text);
        let total_terms = tokens.len();
        if total_terms == 0 {
            return Ok(row);
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }

        for (term, count) in counts {
            if let Some(&idx) = self.vocabulary.get(term) {
                let tf = count as f32 / total_terms as f32;
                row[idx] = tf * self.idf_values[idx];
            }
        }

        // L2-normalize; the zero vector stays zero.
        let norm = row.iter().map(|v| (*v as f64) * (*v as f64)).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut row {
                *value = (*value as f64 / norm) as f32;
            }
        }

        Ok(row)
    }

    pub fn fit_transform(&mut self, documents: &[String]) -> Result<Vec<Vec<f32>>, ClassifyError> {
        self.fit(documents);
        self.transform(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "the cat sat on the mat".to_string(),
            "the dog sat on the log".to_string(),
            "cats and dogs are animals".to_string(),
            "the mat was under the cat".to_string(),
        ]
    }

    fn l2_norm(row: &[f32]) -> f64 {
        row.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt()
    }

    #[test]
    fn test_rows_are_unit_length() {
        let mut vectorizer = TfidfVectorizer::new(TfidfOptions::default());
        let matrix = vectorizer.fit_transform(&corpus()).unwrap();

        for row in &matrix {
            let norm = l2_norm(row);
            assert!((norm - 1.0).abs() < 1e-6, "row norm was {norm}");
        }
    }

    #[test]
    fn test_empty_document_is_zero_vector() {
        let mut vectorizer = TfidfVectorizer::new(TfidfOptions::default());
        vectorizer.fit(&corpus());

        let row = vectorizer.transform_one("").unwrap();
        assert!(row.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let vectorizer = TfidfVectorizer::new(TfidfOptions::default());
        assert!(matches!(
            vectorizer.transform_one("cat"),
            Err(ClassifyError::NotFitted)
        ));
    }

    #[test]
    fn test_idf_monotonicity() {
        let mut vectorizer = TfidfVectorizer::new(TfidfOptions {
            ngram_range: (1, 1),
            ..TfidfOptions::default()
        });
        vectorizer.fit(&corpus());

        // "cat" appears in two documents, "dog" in one; rarer term gets
        // the strictly larger IDF.
        let names = vectorizer.feature_names();
        let idx_of = |term: &str| names.iter().position(|n| n == term).unwrap();
        let idf = vectorizer.idf_values();
        assert!(idf[idx_of("dog")] > idf[idx_of("cat")]);
    }

    #[test]
    fn test_out_of_vocabulary_tokens_ignored() {
        let mut vectorizer = TfidfVectorizer::new(TfidfOptions::default());
        vectorizer.fit(&corpus());

        let row = vectorizer.transform_one("zeppelin quux").unwrap();
        assert!(row.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_max_features_cap_is_deterministic() {
        let mut a = TfidfVectorizer::new(TfidfOptions {
            max_features: Some(5),
            ngram_range: (1, 1),
            ..TfidfOptions::default()
        });
        let mut b = a.clone();
        a.fit(&corpus());
        b.fit(&corpus());
        assert_eq!(a.feature_names(), b.feature_names());
        assert_eq!(a.vocabulary_len(), 5);
    }

    #[test]
    fn test_min_df_prunes_rare_terms() {
        let mut vectorizer = TfidfVectorizer::new(TfidfOptions {
            min_df: DocFrequency::Count(2),
            ngram_range: (1, 1),
            ..TfidfOptions::default()
        });
        vectorizer.fit(&corpus());

        // "dog" appears in one document only
        assert!(!vectorizer.feature_names().iter().any(|n| n == "dog"));
        assert!(vectorizer.feature_names().iter().any(|n| n == "cat"));
    }

    #[test]
    fn test_roundtrip_through_parts() {
        let mut fitted = TfidfVectorizer::new(TfidfOptions::default());
        fitted.fit(&corpus());

        let rebuilt = TfidfVectorizer::from_parts(
            TfidfOptions::default(),
            fitted.feature_names().to_vec(),
            fitted.idf_values().to_vec(),
            4,
        );

        let query = "cat on a mat";
        assert_eq!(
            fitted.transform_one(query).unwrap(),
            rebuilt.transform_one(query).unwrap()
        );
    }
}
