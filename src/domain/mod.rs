// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits that describe the experiment:
// which image belongs to which domain, which domain is held
// out as the target, and where labelled images come from.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Keeping this layer free of tensors means the partitioning
// logic can be unit tested without a device.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A single labelled image tagged with its domain
pub mod record;

// Source/target domain bookkeeping
pub mod split;

// Core abstractions (traits) that other layers implement
pub mod traits;
