// ============================================================
// Layer 3 — ImageRecord Domain Type
// ============================================================
// One line of a domain file list, resolved to an absolute
// image path. Pixels are not loaded here: a record is cheap to
// clone and shuffle, and the image is decoded only when the
// record lands in a batch.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A labelled image belonging to one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Full path to the image (dataroot already joined)
    pub path: PathBuf,

    /// Class index in `0..num_classes`
    pub label: usize,

    /// Index into `DomainSplit::domains`
    pub domain: usize,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>, label: usize, domain: usize) -> Self {
        Self {
            path: path.into(),
            label,
            domain,
        }
    }
}
