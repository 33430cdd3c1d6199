// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the k-fold list files on disk and the
// image tensors the meta-learner consumes.
//
//   {domain}_{split}_kfold.txt
//       │
//       ▼
//   ListFileLoader    → ImageRecord per line (path, label, domain)
//       │
//       ├──► splitter::split_train_val   (validation fallback)
//       │
//       ▼
//   DomainStream      → endless shuffled batches per source domain
//   DomainDataset     → Burn Dataset for evaluation sets
//       │
//       ▼
//   ImageBatcher      → decode + ImagePreprocessor + stack
//       │
//       ▼
//   ImageBatch        → [N,3,S,S] images, targets, labels
//
// splitter::meta_partition picks meta-train / meta-test domains
// for each iteration.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads `{domain}_{split}_kfold.txt` file lists
pub mod loader;

/// Decodes, resizes, augments and normalises images
pub mod preprocessor;

/// Implements Burn's Dataset trait over image records
pub mod dataset;

/// Implements Burn's Batcher trait to create image tensor batches
pub mod batcher;

/// Endless per-domain record streams for meta-training
pub mod sampler;

/// Train/validation splits and meta-train/meta-test partitions
pub mod splitter;

