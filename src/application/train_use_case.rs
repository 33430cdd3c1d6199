// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full meta-training pipeline in order:
//
//   Step 1: Validate the configuration      (Layer 2)
//   Step 2: Resolve target / source domains (Layer 3 - domain)
//   Step 3: Load source training lists      (Layer 4 - data)
//   Step 4: Load or carve out validation    (Layer 4 - data)
//   Step 5: Load the target test list       (Layer 4 - data)
//   Step 6: Save config + open metrics log  (Layer 6 - infra)
//   Step 7: Run the meta-training loop      (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{bail, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::{dataset::DomainDataset, loader::ListFileLoader, splitter::split_train_val};
use crate::domain::{
    split::DomainSplit,
    traits::{DataSplit, RecordSource},
};
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::{
    model::{FeatureNetConfig, MetricNetConfig},
    trainer::{run_training, TrainSummary, TrainingData},
};

/// Which Burn backend runs the networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU through wgpu
    Wgpu,
    /// CPU ndarray
    NdArray,
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Serialisable so evaluation can rebuild the exact network
// from train_config.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    // ── data ──
    pub dataroot:          String,
    pub list_dir:          String,
    pub domains:           Vec<String>,
    pub target_domain:     String,
    pub num_classes:       usize,
    pub image_size:        usize,
    pub batch_size:        usize,
    pub val_fraction:      f64,

    // ── optimisation ──
    pub iterations:        usize,
    pub inner_lr:          f64,
    pub outer_lr:          f64,
    pub metric_lr:         f64,
    pub clip_value:        f64,
    pub meta_test_domains: usize,

    // ── losses ──
    pub margin:            f64,
    pub global_weight:     f64,
    pub local_weight:      f64,
    pub temperature:       f64,

    // ── architecture ──
    pub feature_dim:       usize,
    pub metric_hidden:     usize,
    pub embed_dim:         usize,
    pub dropout:           f64,

    // ── run ──
    pub print_interval:    usize,
    pub eval_interval:     usize,
    pub num_workers:       usize,
    pub seed:              u64,
    pub backend:           BackendKind,
    pub checkpoint_dir:    String,
    pub init_checkpoint:   Option<String>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataroot:          "data/PACS/kfold".to_string(),
            list_dir:          "data/PACS/lists".to_string(),
            domains:           ["art_painting", "cartoon", "photo", "sketch"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            target_domain:     "art_painting".to_string(),
            num_classes:       7,
            image_size:        227,
            batch_size:        64,
            val_fraction:      0.1,

            iterations:        10_000,
            inner_lr:          1e-5,
            outer_lr:          1e-5,
            metric_lr:         1e-5,
            clip_value:        2.0,
            meta_test_domains: 1,

            margin:            10.0,
            global_weight:     1.0,
            local_weight:      0.005,
            temperature:       2.0,

            feature_dim:       4096,
            metric_hidden:     256,
            embed_dim:         128,
            dropout:           0.5,

            print_interval:    10,
            eval_interval:     100,
            num_workers:       4,
            seed:              42,
            backend:           BackendKind::Wgpu,
            checkpoint_dir:    "checkpoints".to_string(),
            init_checkpoint:   None,
        }
    }
}

impl TrainConfig {
    /// Reject settings that would only fail (or silently misbehave)
    /// after data loading has started.
    pub fn validate(&self) -> Result<()> {
        let split = DomainSplit::new(self.domains.clone(), &self.target_domain)?;
        let num_sources = split.sources().len();

        if self.meta_test_domains == 0 || self.meta_test_domains >= num_sources {
            bail!(
                "meta_test_domains must be between 1 and {} (one fewer than the {} source domains), got {}",
                num_sources - 1,
                num_sources,
                self.meta_test_domains
            );
        }
        if self.num_classes < 2 {
            bail!("num_classes must be at least 2, got {}", self.num_classes);
        }
        if self.batch_size == 0 {
            bail!("batch_size must be positive");
        }
        if self.iterations == 0 {
            bail!("iterations must be positive");
        }
        if self.print_interval == 0 || self.eval_interval == 0 {
            bail!("print_interval and eval_interval must be positive");
        }
        if self.feature_dim == 0 || self.metric_hidden == 0 || self.embed_dim == 0 {
            bail!("feature_dim, metric_hidden and embed_dim must be positive");
        }

        for (name, lr) in [
            ("inner_lr", self.inner_lr),
            ("outer_lr", self.outer_lr),
            ("metric_lr", self.metric_lr),
        ] {
            if !(lr > 0.0 && lr.is_finite()) {
                bail!("{name} must be a positive number, got {lr}");
            }
        }
        if !(self.clip_value > 0.0) {
            bail!("clip_value must be positive, got {}", self.clip_value);
        }
        if !(self.temperature > 0.0) {
            bail!("temperature must be positive, got {}", self.temperature);
        }
        if self.margin < 0.0 || self.global_weight < 0.0 || self.local_weight < 0.0 {
            bail!("margin, global_weight and local_weight must not be negative");
        }
        if !(self.val_fraction > 0.0 && self.val_fraction < 1.0) {
            bail!("val_fraction must be in (0, 1), got {}", self.val_fraction);
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        if self.num_workers == 0 {
            bail!("num_workers must be at least 1");
        }

        // also rejects image sizes the conv stack cannot handle
        self.feature_net_config().flatten_size()?;
        Ok(())
    }

    pub fn feature_net_config(&self) -> FeatureNetConfig {
        FeatureNetConfig::new(self.num_classes, self.image_size, self.feature_dim, self.dropout)
    }

    pub fn metric_net_config(&self) -> MetricNetConfig {
        MetricNetConfig::new(self.feature_dim, self.metric_hidden, self.embed_dim)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainSummary> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Domains ───────────────────────────────────────────────────
        let split = DomainSplit::new(cfg.domains.clone(), &cfg.target_domain)?;
        tracing::info!(
            "Domains {:?}: target '{}', sources {:?}",
            split.domains(),
            split.target_name(),
            split.sources().iter().map(|&d| split.name(d)).collect::<Vec<_>>()
        );

        let loader = ListFileLoader::new(&cfg.list_dir, &cfg.dataroot, cfg.num_classes);
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        // ── Steps 3 + 4: Source train / validation lists ──────────────────────
        // A domain without a crossval list gives up a slice of its
        // training list for validation instead.
        let mut sources    = Vec::new();
        let mut validation = Vec::new();

        for d in split.sources() {
            let name  = split.name(d);
            let train = loader.load(name, d, DataSplit::Train)?;

            let train = if loader.has_split(name, DataSplit::CrossVal) {
                validation.extend(loader.load(name, d, DataSplit::CrossVal)?);
                train
            } else {
                let (train, val) = split_train_val(train, 1.0 - cfg.val_fraction, &mut rng);
                tracing::warn!(
                    "No crossval list for '{}'; holding out {} of its training images",
                    name,
                    val.len()
                );
                validation.extend(val);
                train
            };

            tracing::info!("Loaded {} training images for '{}'", train.len(), name);
            sources.push((d, train));
        }

        if validation.is_empty() {
            bail!("No validation images: add crossval lists or raise val_fraction");
        }

        // ── Step 5: Target test list ──────────────────────────────────────────
        let target_test = loader.load(split.target_name(), split.target(), DataSplit::Test)?;
        if target_test.is_empty() {
            bail!("Test list of target domain '{}' is empty", split.target_name());
        }
        tracing::info!(
            "Split: {} validation, {} target test images",
            validation.len(),
            target_test.len()
        );
        tracing::debug!(
            "Target class counts: {:?}",
            DomainDataset::new(target_test.clone()).class_counts(cfg.num_classes)
        );

        // ── Step 6: Persist config, open metrics log ──────────────────────────
        let ckpt_manager = CheckpointManager::new(cfg.checkpoint_dir.clone())?;
        ckpt_manager.save_config(cfg)?;
        tracing::info!("Checkpoints and metrics go to '{}'", ckpt_manager.dir().display());
        let metrics = MetricsLogger::new(cfg.checkpoint_dir.clone())?;

        // ── Step 7: Meta-training loop (Layer 5) ──────────────────────────────
        let data = TrainingData { split, sources, validation, target_test };
        run_training(cfg, data, &ckpt_manager, &metrics)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::{fs, path::Path};

    #[test]
    fn test_defaults_are_valid() {
        TrainConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_settings() {
        let bad = [
            TrainConfig { target_domain: "clipart".into(), ..Default::default() },
            TrainConfig { domains: vec!["a".into(), "b".into()], target_domain: "a".into(), ..Default::default() },
            TrainConfig { meta_test_domains: 3, ..Default::default() },
            TrainConfig { meta_test_domains: 0, ..Default::default() },
            TrainConfig { inner_lr: 0.0, ..Default::default() },
            TrainConfig { batch_size: 0, ..Default::default() },
            TrainConfig { val_fraction: 1.0, ..Default::default() },
            TrainConfig { image_size: 32, ..Default::default() },
            TrainConfig { eval_interval: 0, ..Default::default() },
            TrainConfig { num_workers: 0, ..Default::default() },
        ];
        for cfg in bad {
            assert!(cfg.validate().is_err(), "{cfg:?} should be rejected");
        }
    }

    /// Writes six images and train/test lists per domain under
    /// `root`; returns (dataroot, list_dir).
    fn write_fixture(root: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let lists = root.join("lists");
        let data  = root.join("kfold");
        fs::create_dir_all(&lists).unwrap();

        for (d, domain) in ["a", "b", "c"].iter().enumerate() {
            fs::create_dir_all(data.join(domain)).unwrap();
            let mut lines = String::new();
            for i in 0..6 {
                let rel = format!("{domain}/{i}.png");
                RgbImage::from_pixel(68, 68, Rgb([(i * 40) as u8, (d * 90) as u8, 7]))
                    .save(data.join(&rel))
                    .unwrap();
                lines.push_str(&format!("{rel} {}\n", i % 2));
            }
            fs::write(lists.join(format!("{domain}_train_kfold.txt")), &lines).unwrap();
            fs::write(lists.join(format!("{domain}_test_kfold.txt")), &lines).unwrap();
        }
        // only "b" has a crossval list; "a" falls back to a held-out slice
        fs::write(lists.join("b_crossval_kfold.txt"), "b/0.png 0\nb/1.png 1\n").unwrap();

        (data, lists)
    }

    fn fixture_config(data: &Path, lists: &Path, ckpt: &Path) -> TrainConfig {
        TrainConfig {
            dataroot:       data.to_str().unwrap().to_string(),
            list_dir:       lists.to_str().unwrap().to_string(),
            domains:        vec!["a".into(), "b".into(), "c".into()],
            target_domain:  "c".into(),
            num_classes:    2,
            image_size:     67,
            batch_size:     2,
            val_fraction:   0.5,
            iterations:     1,
            feature_dim:    8,
            metric_hidden:  4,
            embed_dim:      4,
            dropout:        0.0,
            num_workers:    1,
            backend:        BackendKind::NdArray,
            checkpoint_dir: ckpt.to_str().unwrap().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_execute_from_list_files() {
        let root = tempfile::tempdir().unwrap();
        let (data, lists) = write_fixture(root.path());
        let ckpt = root.path().join("ckpt");
        let cfg  = fixture_config(&data, &lists, &ckpt);

        let summary = TrainUseCase::new(cfg).execute().unwrap();

        assert_eq!(summary.iterations, 1);
        // 3 held out from "a" + 2 crossval images of "b"
        assert_eq!(summary.last_val.unwrap().samples, 5);
        assert_eq!(summary.last_target.unwrap().samples, 6);
        assert!(ckpt.join("train_config.json").exists());
        assert!(ckpt.join("metrics.csv").exists());
    }

    #[test]
    fn test_empty_target_test_list_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let (data, lists) = write_fixture(root.path());
        fs::write(lists.join("c_test_kfold.txt"), "").unwrap();

        let ckpt = root.path().join("ckpt");
        let err  = TrainUseCase::new(fixture_config(&data, &lists, &ckpt)).execute().unwrap_err();
        assert!(err.to_string().contains("'c'"), "{err:#}");
        // rejected before anything is written
        assert!(!ckpt.join("train_config.json").exists());
    }

    #[test]
    fn test_config_json_round_trip_keeps_backend() {
        let cfg  = TrainConfig { backend: BackendKind::NdArray, ..Default::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"ndarray\""));

        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.backend, BackendKind::NdArray);
        assert_eq!(back.domains, cfg.domains);
    }
}
