// ============================================================
// Layer 5 — Losses
// ============================================================
// The three terms of the meta-learning objective:
//
//   task_loss              cross entropy on class logits
//
//   global_alignment_loss  class RELATIONSHIPS should not depend
//                          on the domain. For each class c we take
//                          the average temperature-softened softmax
//                          of all samples labelled c (row c of the
//                          "soft confusion matrix"), then compare
//                          two domains row by row with a symmetric
//                          KL divergence:
//
//                            ½ Σ_c' (p_c' − q_c')(log p_c' − log q_c')
//
//                          averaged over classes present in both.
//
//   triplet_loss           batch-hard triplet loss on metric
//                          embeddings: for each anchor, the farthest
//                          same-class sample must be closer than the
//                          nearest other-class sample by `margin`.
//
// Masks that depend only on labels are built on the host; the
// tensors that carry gradient stay on the device.
//
// Reference: Dou et al. (2019) MASF
//            Hinton et al. (2015) Distilling the Knowledge in a Neural Network
//            Hermans et al. (2017) In Defense of the Triplet Loss

use burn::{nn::loss::CrossEntropyLossConfig, prelude::*, tensor::activation::softmax};

/// Floor applied to probabilities before taking logs
const PROB_EPS: f32 = 1e-8;

/// Added to non-negative pairs so they never win the min search
const FAR_AWAY: f32 = 1e12;

/// Mean cross entropy of `logits` [N, C] against class indices [N].
pub fn task_loss<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, targets)
}

/// Number of rows of `logits` whose argmax equals the target.
pub fn correct_count<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns shape [batch, 1] — flatten to [batch]
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

// ─── Soft confusion matrix ────────────────────────────────────────────────────
/// Per-class mean of softened predictions for one domain.
pub struct SoftConfusion<B: Backend> {
    /// Row c = mean softmax(logits / τ) over samples labelled c — [C, C]
    pub matrix: Tensor<B, 2>,

    /// Whether class c had any samples (rows for absent classes are zero)
    pub present: Vec<bool>,
}

pub fn soft_confusion<B: Backend>(
    logits:      Tensor<B, 2>,
    labels:      &[usize],
    num_classes: usize,
    temperature: f64,
) -> SoftConfusion<B> {
    let device = logits.device();
    let n      = labels.len();

    let mut counts = vec![0usize; num_classes];
    for &l in labels {
        counts[l] += 1;
    }

    // W[n, c] = 1 / count_c where sample n has label c, so Wᵀ·P
    // averages the probability rows of each class.
    let mut weights = vec![0.0f32; n * num_classes];
    for (row, &l) in labels.iter().enumerate() {
        weights[row * num_classes + l] = 1.0 / counts[l] as f32;
    }
    let weights = Tensor::<B, 1>::from_floats(weights.as_slice(), &device)
        .reshape([n, num_classes]);

    let probs  = softmax(logits.div_scalar(temperature), 1);
    let matrix = weights.transpose().matmul(probs);

    SoftConfusion {
        matrix,
        present: counts.iter().map(|&c| c > 0).collect(),
    }
}

/// Symmetric KL between two domains' soft confusion matrices,
/// averaged over the classes both domains contain. Zero if none.
pub fn global_alignment_loss<B: Backend>(a: &SoftConfusion<B>, b: &SoftConfusion<B>) -> Tensor<B, 1> {
    let device = a.matrix.device();

    let shared: Vec<f32> = a
        .present
        .iter()
        .zip(&b.present)
        .map(|(&x, &y)| if x && y { 1.0 } else { 0.0 })
        .collect();
    let num_shared: f32 = shared.iter().sum();
    if num_shared == 0.0 {
        return Tensor::zeros([1], &device);
    }

    let p = a.matrix.clone().clamp_min(PROB_EPS);
    let q = b.matrix.clone().clamp_min(PROB_EPS);

    // KL(p‖q) + KL(q‖p) = Σ (p − q)(log p − log q)
    let per_class = (p.clone() - q.clone())
        .mul(p.log() - q.log())
        .sum_dim(1)
        .mul_scalar(0.5);

    let mask = Tensor::<B, 1>::from_floats(shared.as_slice(), &device)
        .reshape([shared.len(), 1]);

    per_class.mul(mask).sum().div_scalar(num_shared)
}

// ─── Triplet loss ─────────────────────────────────────────────────────────────
/// Batch-hard triplet loss over `embeddings` [N, D].
///
/// Anchors without at least one positive and one negative are
/// ignored; if no anchor qualifies the loss is zero.
pub fn triplet_loss<B: Backend>(embeddings: Tensor<B, 2>, labels: &[usize], margin: f64) -> Tensor<B, 1> {
    let device = embeddings.device();
    let n      = labels.len();

    let mut positive = vec![0.0f32; n * n];
    let mut not_negative = vec![0.0f32; n * n];
    let mut valid = vec![0.0f32; n];

    for i in 0..n {
        let mut has_pos = false;
        let mut has_neg = false;
        for j in 0..n {
            if labels[i] == labels[j] {
                not_negative[i * n + j] = FAR_AWAY;
                if i != j {
                    positive[i * n + j] = 1.0;
                    has_pos = true;
                }
            } else {
                has_neg = true;
            }
        }
        if has_pos && has_neg {
            valid[i] = 1.0;
        }
    }

    let num_valid: f32 = valid.iter().sum();
    if num_valid == 0.0 {
        return Tensor::zeros([1], &device);
    }

    // ‖a − b‖² = ‖a‖² + ‖b‖² − 2·a·b
    let sq   = embeddings.clone().powf_scalar(2.0).sum_dim(1);
    let gram = embeddings.clone().matmul(embeddings.transpose());
    let dist = (sq.clone() + sq.transpose() - gram.mul_scalar(2.0)).clamp_min(0.0);

    let to_matrix = |v: Vec<f32>| Tensor::<B, 1>::from_floats(v.as_slice(), &device).reshape([n, n]);

    let hardest_pos = dist.clone().mul(to_matrix(positive)).max_dim(1);
    let hardest_neg = dist.add(to_matrix(not_negative)).min_dim(1);

    let valid = Tensor::<B, 1>::from_floats(valid.as_slice(), &device).reshape([n, 1]);

    (hardest_pos - hardest_neg)
        .add_scalar(margin)
        .clamp_min(0.0)
        .mul(valid)
        .sum()
        .div_scalar(num_valid)
}
