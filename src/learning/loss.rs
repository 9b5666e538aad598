//! Cross-entropy loss over next-character scores.

use ndarray::Array2;

/// Row-wise softmax cross-entropy.
///
/// `scores` is `[batch, vocab]`, `targets[b]` the correct code for row `b`.
/// Returns `(scale · Σ_b −log p_b[target_b], scale · (softmax − one_hot))`,
/// i.e. the scaled loss and its gradient with respect to `scores`.
pub fn softmax_cross_entropy(
    scores: &Array2<f32>,
    targets: &[usize],
    scale: f32,
) -> (f32, Array2<f32>) {
    let mut grad = Array2::zeros(scores.raw_dim());
    let mut loss = 0.0f32;

    for ((row, mut g_row), &target) in scores.outer_iter().zip(grad.outer_iter_mut()).zip(targets) {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exp = row.mapv(|v| (v - max).exp());
        let sum = exp.sum();
        loss += sum.ln() + max - row[target];

        g_row.assign(&(exp / sum));
        g_row[target] -= 1.0;
    }

    grad.mapv_inplace(|v| v * scale);
    (loss * scale, grad)
}
