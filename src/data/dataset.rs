use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::record::ImageRecord;

/// One decoded, preprocessed image.
/// `pixels` is BGR, channel-major, mean-centred: [3 × size × size].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    pub pixels: Vec<f32>,
    pub label:  usize,
    pub domain: usize,
}

/// The records of one or more domains.
/// Images stay on disk until the batcher decodes them.
pub struct DomainDataset {
    records: Vec<ImageRecord>,
}

impl DomainDataset {
    pub fn new(records: Vec<ImageRecord>) -> Self { Self { records } }

    /// Number of records per class, indexed by label
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        for r in &self.records {
            if let Some(c) = counts.get_mut(r.label) {
                *c += 1;
            }
        }
        counts
    }
}

impl Dataset<ImageRecord> for DomainDataset {
    fn get(&self, index: usize) -> Option<ImageRecord> {
        self.records.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_counts() {
        let ds = DomainDataset::new(vec![
            ImageRecord::new("a", 0, 0),
            ImageRecord::new("b", 2, 0),
            ImageRecord::new("c", 2, 1),
        ]);
        assert_eq!(ds.class_counts(3), vec![1, 0, 2]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.get(1).map(|r| r.label), Some(2));
        assert!(ds.get(3).is_none());
    }
}
