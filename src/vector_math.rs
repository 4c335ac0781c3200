use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView1};

/// Scale `vector` to unit length in place and return its original norm.
/// Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) -> f32 {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

pub fn normalized(vector: &[f32]) -> Vec<f32> {
    let mut out = vector.to_vec();
    l2_normalize(&mut out);
    out
}

/// Inner product of every row of `matrix` with `query`.
pub fn inner_products(matrix: &Array2<f32>, query: &[f32]) -> Array1<f32> {
    matrix.dot(&ArrayView1::from(query))
}

/// Indices of the `k` highest scores, best first; equal scores keep ascending index order.
pub fn rank_descending(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&left, &right| {
        scores[right]
            .partial_cmp(&scores[left])
            .unwrap_or(Ordering::Equal)
            .then(left.cmp(&right))
    });
    order.truncate(k);
    order.into_iter().map(|idx| (idx, scores[idx])).collect()
}
