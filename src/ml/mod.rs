// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Networks, losses and the meta-learning procedure. Data and
// infra layers hand tensors and records in; nothing here reads
// list files or parses CLI flags.
//
// What's in this layer:
//
//   model.rs     — FeatureNet (AlexNet-style conv stack + fc6/fc7
//                  features + fc8 classifier) and MetricNet (the
//                  two-layer embedding head used by the local loss)
//
//   losses.rs    — Cross entropy, soft confusion matrices with the
//                  global alignment loss, batch-hard triplet loss
//
//   meta.rs      — The inner update: clipped SGD fast weights that
//                  stay connected to the original parameters
//
//   trainer.rs   — One meta step (inner update, meta-test losses,
//                  two Adam updates) and the full iteration loop
//                  with evaluation, metrics and checkpoints
//
//   evaluator.rs — Loss / accuracy over a whole dataset in
//                  inference mode
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Krizhevsky et al. (2012) AlexNet
//            Dou et al. (2019) MASF

/// Feature network, classifier and metric embedding head
pub mod model;

/// Task, global alignment and triplet losses
pub mod losses;

/// First-order inner update (fast weights)
pub mod meta;

/// Meta-training loop with validation and checkpointing
pub mod trainer;

/// Dataset-level loss and accuracy
pub mod evaluator;
