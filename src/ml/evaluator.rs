// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Classification loss and accuracy of a model over a whole
// dataset (source validation lists or the target test list).
//
// Runs on a plain (non-autodiff) backend: callers pass
// `model.valid()`, which also disables dropout. Decoding is
// spread over Burn DataLoader workers.

use burn::{data::dataloader::DataLoaderBuilder, prelude::*};
use serde::{Deserialize, Serialize};

use crate::data::{batcher::ImageBatcher, dataset::DomainDataset};
use crate::ml::losses::{correct_count, task_loss};
use crate::ml::model::FeatureNet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    /// Mean cross entropy per sample
    pub loss:     f64,
    /// Fraction of samples classified correctly, in [0, 1]
    pub accuracy: f64,
    /// Samples that decoded and were scored
    pub samples:  usize,
}

pub struct Evaluator<B: Backend> {
    batcher:     ImageBatcher<B>,
    batch_size:  usize,
    num_workers: usize,
}

impl<B: Backend> Evaluator<B> {
    pub fn new(batcher: ImageBatcher<B>, batch_size: usize, num_workers: usize) -> Self {
        Self { batcher, batch_size, num_workers }
    }

    pub fn evaluate(&self, model: &FeatureNet<B>, dataset: DomainDataset) -> EvalReport {
        let mut builder = DataLoaderBuilder::new(self.batcher.clone()).batch_size(self.batch_size);
        // zero workers would split the dataset into zero parts
        if self.num_workers > 0 {
            builder = builder.num_workers(self.num_workers);
        }
        let loader = builder.build(dataset);

        let mut loss_sum = 0.0f64;
        let mut correct  = 0usize;
        let mut samples  = 0usize;

        for batch in loader.iter().flatten() {
            let n      = batch.len();
            let logits = model.forward(batch.images).logits;

            let loss: f64 = task_loss(logits.clone(), batch.targets.clone())
                .into_scalar()
                .elem::<f64>();

            loss_sum += loss * n as f64;
            correct  += correct_count(logits, batch.targets);
            samples  += n;
        }

        if samples == 0 {
            tracing::warn!("Evaluation set produced no decodable images");
            return EvalReport { loss: f64::NAN, accuracy: 0.0, samples: 0 };
        }

        EvalReport {
            loss:     loss_sum / samples as f64,
            accuracy: correct as f64 / samples as f64,
            samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::{ImagePreprocessor, Mode};
    use crate::domain::record::ImageRecord;
    use crate::ml::model::FeatureNetConfig;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};

    type TB = NdArray<f32>;

    #[test]
    fn test_reports_every_decodable_sample() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = Vec::new();
        for i in 0..5 {
            let path = dir.path().join(format!("{i}.png"));
            RgbImage::from_pixel(70, 70, Rgb([i as u8 * 40, 0, 0])).save(&path).unwrap();
            records.push(ImageRecord::new(path, i % 3, 0));
        }
        records.push(ImageRecord::new(dir.path().join("missing.png"), 0, 0));

        let device  = Default::default();
        let model: FeatureNet<TB> = FeatureNetConfig::new(3, 67, 8, 0.0).init(&device).unwrap();
        let batcher = ImageBatcher::new(device, ImagePreprocessor::new(67, Mode::Inference), 3);

        let report = Evaluator::new(batcher.clone(), 2, 1).evaluate(&model, DomainDataset::new(records.clone()));

        assert_eq!(report.samples, 5);
        assert!(report.loss.is_finite());
        assert!((0.0..=1.0).contains(&report.accuracy));

        // no worker threads: batches are decoded on the calling thread
        let inline = Evaluator::new(batcher, 2, 0).evaluate(&model, DomainDataset::new(records));
        assert_eq!(inline.samples, 5);
        assert_eq!(inline.accuracy, report.accuracy);
    }
}
