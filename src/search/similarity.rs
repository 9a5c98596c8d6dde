use rayon::prelude::*;

/// Cosine similarity of a query vector against every row of a row-major
/// matrix.
///
/// Zero-norm rows (and a zero-norm query) produce a score of 0.0 rather
/// than NaN. Rows are scored in parallel but collected in index order.
pub fn cosine_scores(query: &[f32], matrix: &[Vec<f32>]) -> Vec<f64> {
    let query_norm = l2_norm(query);
    if query_norm == 0.0 {
        return vec![0.0; matrix.len()];
    }

    matrix
        .par_iter()
        .map(|row| {
            let row_norm = l2_norm(row);
            if row_norm == 0.0 {
                return 0.0;
            }
            let dot: f64 = query
                .iter()
                .zip(row.iter())
                .map(|(a, b)| *a as f64 * *b as f64)
                .sum();
            dot / (query_norm * row_norm)
        })
        .collect()
}

/// Index of the highest score; exact ties resolve to the lowest index.
pub fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Top-k `(index, score)` pairs sorted by descending score; equal scores
/// keep ascending index order.
pub fn top_k(scores: &[f64], k: usize) -> Vec<(usize, f64)> {
    let mut indexed: Vec<(usize, f64)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    indexed.truncate(k);
    indexed
}

fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|v| (*v as f64) * (*v as f64))
        .sum::<f64>()
        .sqrt()
}
