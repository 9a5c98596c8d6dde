/// Relative weights for combining TF-IDF cosine and BM25 score vectors.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub tfidf: f64,
    pub bm25: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            tfidf: 0.4,
            bm25: 0.6,
        }
    }
}

impl FusionWeights {
    /// Scale the weights so they sum to 1. Callers may pass any
    /// non-negative pair; a degenerate all-zero pair falls back to the
    /// defaults.
    pub fn normalized(self) -> Self {
        let total = self.tfidf + self.bm25;
        if total <= 0.0 {
            return Self::default();
        }
        Self {
            tfidf: self.tfidf / total,
            bm25: self.bm25 / total,
        }
    }
}

/// Min-max normalize scores into [0, 1].
///
/// A degenerate span (max - min below 1e-10, including single-element
/// and all-equal vectors) maps every entry to 1.0 so it neither favors
/// nor penalizes any document.
pub fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max - min < 1e-10 {
        return vec![1.0; scores.len()];
    }

    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Fuse two score vectors: independent min-max normalization followed by
/// a convex combination under the (renormalized) weights. The result
/// lies in [0, 1].
pub fn fuse(tfidf_scores: &[f64], bm25_scores: &[f64], weights: FusionWeights) -> Vec<f64> {
    debug_assert_eq!(tfidf_scores.len(), bm25_scores.len());

    let weights = weights.normalized();
    let tfidf_normalized = min_max_normalize(tfidf_scores);
    let bm25_normalized = min_max_normalize(bm25_scores);

    tfidf_normalized
        .iter()
        .zip(bm25_normalized.iter())
        .map(|(t, b)| weights.tfidf * t + weights.bm25 * b)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_maps_to_unit_interval() {
        let normalized = min_max_normalize(&[2.0, 4.0, 8.0]);
        assert_eq!(normalized[0], 0.0);
        assert_eq!(normalized[2], 1.0);
        assert!(normalized.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_degenerate_span_emits_ones() {
        assert_eq!(min_max_normalize(&[0.5, 0.5, 0.5]), vec![1.0, 1.0, 1.0]);
        assert_eq!(min_max_normalize(&[3.7]), vec![1.0]);
    }

    #[test]
    fn test_fused_scores_stay_in_unit_interval() {
        let fused = fuse(&[0.1, 0.9, 0.4], &[12.0, 3.0, 7.5], FusionWeights::default());
        assert!(fused.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_weights_renormalize() {
        let weights = FusionWeights {
            tfidf: 2.0,
            bm25: 3.0,
        }
        .normalized();
        assert!((weights.tfidf - 0.4).abs() < 1e-12);
        assert!((weights.bm25 - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_bm25_weight_dominates_on_disagreement() {
        // TF-IDF prefers doc 0, BM25 prefers doc 1; the default weights
        // lean on BM25.
        let fused = fuse(&[1.0, 0.0], &[0.0, 1.0], FusionWeights::default());
        assert!(fused[1] > fused[0]);
    }
}
