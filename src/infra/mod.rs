// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence used by both the trainer and the
// evaluate command:
//
//   checkpoint.rs — Saving and loading feature-network weights
//                   with Burn's gzip MessagePack recorder, plus the JSON
//                   pointers (latest / best) and the TrainConfig
//                   needed to rebuild the network.
//
//   metrics.rs    — Appends evaluation-point metrics (losses,
//                   validation and target accuracy) to a CSV.
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

