// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Wires the layers together for the two things a user can do:
// meta-train on the source domains, or score a saved
// checkpoint on the target domain.
//
// What lives here:
//   - TrainConfig, the one serialisable record of a run
//   - deciding where validation data comes from
//   - choosing the backend and handing records to Layer 5
//
// What does not: tensor math (Layer 5), list parsing and
// image decoding (Layer 4), file formats of checkpoints and
// metrics (Layer 6).
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The meta-training workflow
pub mod train_use_case;

// Target-domain evaluation of a saved checkpoint
pub mod evaluate_use_case;
