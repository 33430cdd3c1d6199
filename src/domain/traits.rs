// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer asks for records by domain and split
// without knowing whether they come from PACS-style k-fold
// text lists or anywhere else.
//
// Implementations:
//   - ListFileLoader → `{domain}_{split}_kfold.txt` files
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::record::ImageRecord;

/// Which portion of a domain's data to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSplit {
    Train,
    CrossVal,
    Test,
}

impl DataSplit {
    /// The tag used in list file names
    pub fn tag(self) -> &'static str {
        match self {
            DataSplit::Train => "train",
            DataSplit::CrossVal => "crossval",
            DataSplit::Test => "test",
        }
    }
}

// ─── RecordSource ─────────────────────────────────────────────────────────────
/// Anything that can enumerate the labelled images of one domain.
pub trait RecordSource {
    /// Load every record of `split` for the domain named `domain`.
    /// `domain_index` is stamped onto each returned record.
    fn load(&self, domain: &str, domain_index: usize, split: DataSplit) -> Result<Vec<ImageRecord>>;

    /// Whether `split` exists for `domain` at all.
    /// Used to fall back to carving validation out of the train list.
    fn has_split(&self, domain: &str, split: DataSplit) -> bool;
}
