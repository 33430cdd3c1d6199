// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<ImageRecord>
// into device tensors.
//
// Unlike a batcher over pre-tokenised samples, this one does
// real work: every record is decoded from disk and run through
// the ImagePreprocessor before stacking. When Burn's DataLoader
// drives it with several workers, decoding happens in parallel.
//
// How batching works here:
//   Input:  Vec of N ImageRecords
//   Output: ImageBatch with
//             images  [N, 3, S, S]
//             targets [N]       (class indices)
//             labels / domains  (host copies)
//
// A file that fails to decode, or whose label is outside
// 0..num_classes, is skipped with a warning, so a
// batch can be smaller than requested. If nothing in the chunk
// decodes, the DataLoader path yields None and the fallible
// `try_batch` path returns an error.
//
// Reference: Burn Book §4 (Batcher)

use anyhow::{bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::ImageSample;
use crate::data::preprocessor::ImagePreprocessor;
use crate::domain::record::ImageRecord;

// ─── ImageBatch ───────────────────────────────────────────────────────────────
/// A batch of images from a single domain (or an evaluation set),
/// ready for the forward pass.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Preprocessed images — shape: [batch_size, 3, size, size]
    pub images: Tensor<B, 4>,

    /// Ground truth classes — shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,

    /// Host copy of the labels, used to build loss masks
    pub labels: Vec<usize>,

    /// Host copy of each sample's domain index
    pub domains: Vec<usize>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    /// The device to create tensors on
    pub device: B::Device,
    preprocessor: ImagePreprocessor,
    num_classes:  usize,

    /// Hands out one augmentation seed per batch; shared by clones
    seeds: Arc<Mutex<StdRng>>,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, preprocessor: ImagePreprocessor, num_classes: usize) -> Self {
        Self {
            device,
            preprocessor,
            num_classes,
            seeds: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Make augmentation reproducible: batches requested in the
    /// same order get the same flips.
    pub fn with_seed(self, seed: u64) -> Self {
        Self { seeds: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))), ..self }
    }

    fn batch_rng(&self) -> StdRng {
        let mut seeds = self.seeds.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        StdRng::seed_from_u64(seeds.gen())
    }

    /// Decode every record, dropping (and logging) the ones that fail.
    pub fn decode(&self, items: Vec<ImageRecord>) -> Vec<ImageSample> {
        let mut rng = self.batch_rng();
        items
            .into_iter()
            .filter(|record| {
                let ok = record.label < self.num_classes;
                if !ok {
                    tracing::warn!(
                        "Skipping '{}': label {} outside 0..{}",
                        record.path.display(),
                        record.label,
                        self.num_classes
                    );
                }
                ok
            })
            .filter_map(|record| match self.preprocessor.load(&record.path, &mut rng) {
                Ok(pixels) => Some(ImageSample {
                    pixels,
                    label:  record.label,
                    domain: record.domain,
                }),
                Err(e) => {
                    tracing::warn!("Skipping '{}': {:#}", record.path.display(), e);
                    None
                }
            })
            .collect()
    }

    /// Stack decoded samples into tensors.
    ///
    /// Callers must pass at least one sample; every sample must
    /// come from this batcher's preprocessor so lengths agree.
    pub fn stack(&self, samples: &[ImageSample]) -> ImageBatch<B> {
        let batch_size = samples.len();
        let size       = self.preprocessor.image_size();

        // ── Flatten pixels ────────────────────────────────────────────────────
        // [s1_c0..., s1_c1..., s1_c2..., s2_c0..., ...] → [N, 3, S, S]
        let mut pixels = Vec::with_capacity(batch_size * self.preprocessor.pixels_per_image());
        for s in samples {
            pixels.extend_from_slice(&s.pixels);
        }

        let labels:  Vec<usize> = samples.iter().map(|s| s.label).collect();
        let domains: Vec<usize> = samples.iter().map(|s| s.domain).collect();

        let targets: Vec<i32> = labels.iter().map(|&l| l as i32).collect();

        // ── Create tensors ────────────────────────────────────────────────────
        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), &self.device)
            .reshape([batch_size, 3, size, size]);

        let targets = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device);

        ImageBatch { images, targets, labels, domains }
    }

    /// Decode and stack, failing if no image in `items` could be used.
    pub fn try_batch(&self, items: Vec<ImageRecord>) -> Result<ImageBatch<B>> {
        let requested = items.len();
        let samples   = self.decode(items);
        if samples.is_empty() {
            bail!("None of the {requested} images in this batch could be decoded");
        }
        Ok(self.stack(&samples))
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
// Lets the evaluator hand ImageBatcher to Burn's DataLoader.
impl<B: Backend> Batcher<ImageRecord, Option<ImageBatch<B>>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageRecord>) -> Option<ImageBatch<B>> {
        let samples = self.decode(items);
        if samples.is_empty() {
            None
        } else {
            Some(self.stack(&samples))
        }
    }
}
