// ============================================================
// Layer 4 — Splitters
// ============================================================
// Two kinds of split live here:
//
//   split_train_val  — carves a validation set out of a domain's
//                      training list when no crossval list exists.
//
//   meta_partition   — the per-iteration split of SOURCE DOMAINS
//                      into meta-train and meta-test groups. This
//                      is what simulates domain shift inside a
//                      single training step: the inner update only
//                      sees meta-train domains, and the
//                      regularisers judge the updated weights on
//                      domains the update never saw.
//
// Both use Fisher-Yates via rand::seq::SliceRandom and take the
// RNG from the caller so a seeded run is reproducible.
//
// Reference: rand crate documentation
//            Li et al. (2018) MLDG, Dou et al. (2019) MASF

use anyhow::{bail, Result};
use rand::{seq::SliceRandom, Rng};

/// Randomly shuffle `samples` and split into (train, validation).
///
/// `train_fraction` is the proportion kept for training, e.g. 0.9.
pub fn split_train_val<T, R: Rng>(
    mut samples:    Vec<T>,
    train_fraction: f64,
    rng:            &mut R,
) -> (Vec<T>, Vec<T>) {
    samples.shuffle(rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;

    // Clamp to valid range to avoid panics on tiny datasets
    let split_at = split_at.min(total);

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        samples.len(),
        val.len(),
        (samples.len() * 100) / total.max(1),
        (val.len()     * 100) / total.max(1),
    );

    (samples, val)
}

/// Source domains for one meta-learning iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaPartition {
    /// Domains used for the inner (task) update
    pub meta_train: Vec<usize>,

    /// Held-out domains the updated weights are judged on
    pub meta_test: Vec<usize>,
}

/// Randomly assign `meta_test_count` of the `sources` to meta-test
/// and the rest to meta-train.
pub fn meta_partition<R: Rng>(
    sources:         &[usize],
    meta_test_count: usize,
    rng:             &mut R,
) -> Result<MetaPartition> {
    if sources.len() < 2 {
        bail!(
            "Meta-learning needs at least 2 source domains, got {}",
            sources.len()
        );
    }
    if meta_test_count == 0 || meta_test_count >= sources.len() {
        bail!(
            "meta_test_count must be in 1..={}, got {}",
            sources.len() - 1,
            meta_test_count
        );
    }

    let mut order = sources.to_vec();
    order.shuffle(rng);
    let meta_train = order.split_off(meta_test_count);

    Ok(MetaPartition { meta_train, meta_test: order })
}
