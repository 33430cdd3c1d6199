// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores feature-network weights using Burn's
// NamedMpkGzFileRecorder (MessagePack + gzip, half precision).
//
// File layout:
//   checkpoints/
//     model_iter_200.mpk.gz   ← weights at the newest evaluation
//                               point; the previous one is removed
//                               once latest.json moves on
//     latest.json             ← number of the newest iteration
//     best.mpk.gz             ← weights with the best source
//                               validation accuracy so far
//     best.json               ← iteration + accuracies of best
//     train_config.json       ← hyperparameters; evaluation
//                               rebuilds the network from this
//
// Only the classifier is checkpointed. The metric head exists
// to shape features during training and is not needed to
// predict.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{HalfPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::FeatureNet;

const RECORD_EXTENSION: &str = ".mpk.gz";

/// Half precision halves the size of an AlexNet record
type CheckpointRecorder = NamedMpkGzFileRecorder<HalfPrecisionSettings>;

/// Which saved weights to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    Latest,
    Best,
}

/// Contents of best.json
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestRecord {
    pub iteration:       usize,
    pub val_accuracy:    f64,
    pub target_accuracy: f64,
}

/// Manages saving and loading of model checkpoints.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager, creating the directory if needed.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save weights for `iteration` and point latest.json at them.
    pub fn save_model<B: Backend>(&self, model: &FeatureNet<B>, iteration: usize) -> Result<()> {
        let previous = self.latest_iteration().ok();
        self.record(model, self.iteration_path(iteration))?;

        let latest_path = self.dir.join("latest.json");
        fs::write(&latest_path, serde_json::to_string(&iteration)?)
            .with_context(|| "Failed to write latest.json")?;

        // only after latest.json points at the new record
        if let Some(prev) = previous.filter(|&p| p != iteration) {
            let stale = self.dir.join(format!("model_iter_{prev}{RECORD_EXTENSION}"));
            if let Err(e) = fs::remove_file(&stale) {
                tracing::warn!("Could not remove old checkpoint '{}': {}", stale.display(), e);
            }
        }

        tracing::debug!("Saved checkpoint: iteration {}", iteration);
        Ok(())
    }

    fn iteration_path(&self, iteration: usize) -> PathBuf {
        self.dir.join(format!("model_iter_{iteration}"))
    }

    /// Overwrite the best-so-far weights and their summary.
    pub fn save_best<B: Backend>(&self, model: &FeatureNet<B>, best: &BestRecord) -> Result<()> {
        self.record(model, self.dir.join("best"))?;

        let path = self.dir.join("best.json");
        fs::write(&path, serde_json::to_string_pretty(best)?)
            .with_context(|| "Failed to write best.json")?;

        tracing::info!(
            "New best model at iteration {} (val_acc={:.4}, target_acc={:.4})",
            best.iteration,
            best.val_accuracy,
            best.target_accuracy
        );
        Ok(())
    }

    /// Load the latest or best weights into `model`.
    ///
    /// The model must already have the architecture the
    /// checkpoint was written with (see `load_config`).
    pub fn load_model<B: Backend>(
        &self,
        model:  FeatureNet<B>,
        kind:   CheckpointKind,
        device: &B::Device,
    ) -> Result<FeatureNet<B>> {
        let path = match kind {
            CheckpointKind::Latest => {
                let iteration = self.latest_iteration()?;
                tracing::info!("Loading checkpoint from iteration {}", iteration);
                self.iteration_path(iteration)
            }
            CheckpointKind::Best => {
                let best = self.best_record()?;
                tracing::info!("Loading best checkpoint (iteration {})", best.iteration);
                self.dir.join("best")
            }
        };
        load_record(model, path, device)
    }

    /// Save the training configuration to JSON.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    /// Load the training configuration from JSON.
    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");

        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. \
                 Make sure you have run 'train' before 'evaluate'.",
                path.display()
            )
        })?;

        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }

    /// Iteration number stored in latest.json.
    pub fn latest_iteration(&self) -> Result<usize> {
        let path = self.dir.join("latest.json");

        let s = fs::read_to_string(&path)
            .with_context(|| "Cannot find 'latest.json'. Have you run 'train' first?")?;

        Ok(serde_json::from_str::<usize>(&s)?)
    }

    /// Summary stored in best.json.
    pub fn best_record(&self) -> Result<BestRecord> {
        let path = self.dir.join("best.json");

        let s = fs::read_to_string(&path)
            .with_context(|| "Cannot find 'best.json'. Have you run 'train' first?")?;

        Ok(serde_json::from_str(&s)?)
    }

    fn record<B: Backend>(&self, model: &FeatureNet<B>, path: PathBuf) -> Result<()> {
        CheckpointRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))
    }
}

/// Load weights from an explicit record path (with or without
/// the `.mpk.gz` suffix). Used to warm-start training.
pub fn load_record<B: Backend>(
    model:  FeatureNet<B>,
    path:   impl AsRef<Path>,
    device: &B::Device,
) -> Result<FeatureNet<B>> {
    let path = strip_record_extension(path.as_ref());

    let record = CheckpointRecorder::new()
        .load(path.clone(), device)
        .with_context(|| {
            format!(
                "Cannot load checkpoint '{}{}'. Have you trained the model first?",
                path.display(),
                RECORD_EXTENSION
            )
        })?;

    Ok(model.load_record(record))
}

/// The recorder appends its own extension, so `best.mpk.gz`
/// has to be passed as `best`.
fn strip_record_extension(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_suffix(RECORD_EXTENSION)) {
        Some(stem) => PathBuf::from(stem),
        None => path.to_path_buf(),
    }
}
