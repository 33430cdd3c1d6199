// ============================================================
// Layer 4 — Per-Domain Batch Streams
// ============================================================
// Meta-training draws one batch from EVERY source domain on
// every iteration, and the domains have different sizes. A
// plain epoch-based DataLoader would run dry on the smallest
// domain first, so each domain gets its own endless stream:
//
//   records: [r0 r1 r2 r3 r4]   batch_size = 2
//   batches: [r3 r0] [r4 r2] [r1 | r2 r4] ...
//                               └─ epoch boundary: reshuffle
//
// A batch may straddle an epoch boundary. Every record is seen
// exactly once per epoch.
//
// Reference: rand crate documentation (SliceRandom, StdRng)

use anyhow::{bail, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::record::ImageRecord;

pub struct DomainStream {
    records:    Vec<ImageRecord>,
    batch_size: usize,
    cursor:     usize,
    epochs:     usize,
    rng:        StdRng,
}

impl DomainStream {
    pub fn new(mut records: Vec<ImageRecord>, batch_size: usize, seed: u64) -> Result<Self> {
        if records.is_empty() {
            bail!("Cannot stream batches from a domain with no records");
        }
        if batch_size == 0 {
            bail!("batch_size must be positive");
        }

        let mut rng = StdRng::seed_from_u64(seed);
        records.shuffle(&mut rng);

        Ok(Self { records, batch_size, cursor: 0, epochs: 0, rng })
    }

    /// The next `batch_size` records, wrapping (and reshuffling) as needed.
    pub fn next_batch(&mut self) -> Vec<ImageRecord> {
        let mut batch = Vec::with_capacity(self.batch_size);

        while batch.len() < self.batch_size {
            if self.cursor == self.records.len() {
                self.records.shuffle(&mut self.rng);
                self.cursor  = 0;
                self.epochs += 1;
            }

            let take = (self.batch_size - batch.len()).min(self.records.len() - self.cursor);
            batch.extend_from_slice(&self.records[self.cursor..self.cursor + take]);
            self.cursor += take;
        }

        batch
    }

    /// How many full passes over the domain have finished
    pub fn epochs_completed(&self) -> usize {
        self.epochs
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
