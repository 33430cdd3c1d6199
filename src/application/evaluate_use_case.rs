// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores a trained checkpoint on the target domain's test list:
//
//   1. Read train_config.json   → architecture + data paths
//   2. Rebuild FeatureNet on a plain (non-autodiff) backend
//   3. Load best or latest weights
//   4. Load {target}_test_kfold.txt and run the Evaluator
//
// The metric head is not needed here; only the classifier is
// checkpointed.

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::*,
};

use crate::application::train_use_case::{BackendKind, TrainConfig};
use crate::data::{
    batcher::ImageBatcher,
    dataset::DomainDataset,
    loader::ListFileLoader,
    preprocessor::{ImagePreprocessor, Mode},
};
use crate::domain::{
    record::ImageRecord,
    split::DomainSplit,
    traits::{DataSplit, RecordSource},
};
use crate::infra::checkpoint::{CheckpointKind, CheckpointManager};
use crate::ml::{
    evaluator::{EvalReport, Evaluator},
    model::FeatureNet,
};

/// Result of evaluating one checkpoint.
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub domain: String,
    pub report: EvalReport,
}

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    which:          CheckpointKind,
    /// Overrides the backend recorded at training time
    backend:        Option<BackendKind>,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: String, which: CheckpointKind, backend: Option<BackendKind>) -> Self {
        Self { checkpoint_dir, which, backend }
    }

    pub fn execute(&self) -> Result<TargetReport> {
        let ckpt = CheckpointManager::new(self.checkpoint_dir.clone())?;
        let cfg  = ckpt.load_config()?;

        let split  = DomainSplit::new(cfg.domains.clone(), &cfg.target_domain)?;
        let loader = ListFileLoader::new(&cfg.list_dir, &cfg.dataroot, cfg.num_classes);
        let records = loader.load(split.target_name(), split.target(), DataSplit::Test)?;
        if records.is_empty() {
            bail!("Test list of target domain '{}' is empty", split.target_name());
        }
        tracing::info!(
            "Evaluating on {} test images of '{}'",
            records.len(),
            split.target_name()
        );

        let report = match self.backend.unwrap_or(cfg.backend) {
            BackendKind::Wgpu => {
                evaluate_on::<Wgpu>(&cfg, &ckpt, self.which, records, WgpuDevice::default())?
            }
            BackendKind::NdArray => {
                evaluate_on::<NdArray>(&cfg, &ckpt, self.which, records, NdArrayDevice::default())?
            }
        };
        if report.samples == 0 {
            bail!("No test image of '{}' could be decoded", split.target_name());
        }

        Ok(TargetReport { domain: split.target_name().to_string(), report })
    }
}

fn evaluate_on<B: Backend>(
    cfg:     &TrainConfig,
    ckpt:    &CheckpointManager,
    which:   CheckpointKind,
    records: Vec<ImageRecord>,
    device:  B::Device,
) -> Result<EvalReport> {
    let model: FeatureNet<B> = cfg.feature_net_config().init(&device)?;
    let model = ckpt.load_model(model, which, &device)?;

    let batcher = ImageBatcher::<B>::new(
        device,
        ImagePreprocessor::new(cfg.image_size, Mode::Inference),
        cfg.num_classes,
    );
    let evaluator = Evaluator::new(batcher, cfg.batch_size, cfg.num_workers);

    Ok(evaluator.evaluate(&model, DomainDataset::new(records)))
}
