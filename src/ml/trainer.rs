// ============================================================
// Layer 5 — Meta-Training Loop
// ============================================================
// One iteration of model-agnostic domain generalisation:
//
//   1. Split the source domains into meta-train / meta-test
//   2. Draw one batch from every source domain
//   3. Task loss on meta-train with θ; its gradient gives
//      the fast weights θ' = θ − α·clip(∇θ)
//   4. Global loss: soft confusion matrices of every
//      (meta-train, meta-test) pair under θ' must agree
//   5. Local loss: triplet loss on MetricNet embeddings of
//      θ' features from every source batch
//   6. total = task + β1·global + β2·local, one backward pass,
//      Adam step for the classifier and for the metric head
//
// Key Burn insight:
//   - Training runs on Autodiff<Wgpu> (or Autodiff<NdArray>)
//   - model.valid() gives the model on the inner backend with
//     dropout off; evaluation batchers use that backend too
//   - GradientsParams::from_module pulls each network's share
//     out of ONE set of gradients, so two optimisers can step
//     with different learning rates
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam
//            Dou et al. (2019) Domain Generalization via
//            Model-Agnostic Learning of Semantic Features

use anyhow::{bail, Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, SeedableRng};
use std::collections::BTreeMap;

use crate::application::train_use_case::{BackendKind, TrainConfig};
use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    dataset::DomainDataset,
    preprocessor::{ImagePreprocessor, Mode},
    sampler::DomainStream,
    splitter::{meta_partition, MetaPartition},
};
use crate::domain::{record::ImageRecord, split::DomainSplit};
use crate::infra::{
    checkpoint::{load_record, BestRecord, CheckpointManager},
    metrics::{IterationMetrics, MetricsLogger},
};
use crate::ml::{
    evaluator::{EvalReport, Evaluator},
    losses::{global_alignment_loss, soft_confusion, task_loss, triplet_loss},
    meta::inner_update,
    model::{FeatureNet, MetricNet},
};

pub type WgpuTrainBackend    = Autodiff<Wgpu>;
pub type NdArrayTrainBackend = Autodiff<NdArray>;

// ─── Step hyperparameters ────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy)]
pub struct MetaStepConfig {
    pub inner_lr:      f64,
    pub outer_lr:      f64,
    pub metric_lr:     f64,
    pub margin:        f64,
    pub global_weight: f64,
    pub local_weight:  f64,
    pub temperature:   f64,
    pub clip_value:    f64,
    pub num_classes:   usize,
}

impl From<&TrainConfig> for MetaStepConfig {
    fn from(cfg: &TrainConfig) -> Self {
        Self {
            inner_lr:      cfg.inner_lr,
            outer_lr:      cfg.outer_lr,
            metric_lr:     cfg.metric_lr,
            margin:        cfg.margin,
            global_weight: cfg.global_weight,
            local_weight:  cfg.local_weight,
            temperature:   cfg.temperature,
            clip_value:    cfg.clip_value,
            num_classes:   cfg.num_classes,
        }
    }
}

/// Scalar values of the loss terms of one step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepLosses {
    pub task:   f64,
    pub global: f64,
    pub local:  f64,
    pub total:  f64,
}

fn mean<B: Backend>(terms: Vec<Tensor<B, 1>>) -> Tensor<B, 1> {
    Tensor::cat(terms, 0).mean()
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f64 {
    t.clone().into_scalar().elem::<f64>()
}

fn batch_for<'a, B: Backend>(
    batches: &'a BTreeMap<usize, ImageBatch<B>>,
    domain:  usize,
) -> Result<&'a ImageBatch<B>> {
    let batch = batches
        .get(&domain)
        .with_context(|| format!("No batch drawn for source domain {domain}"))?;
    if let Some(other) = batch.domains.iter().find(|&&d| d != domain) {
        bail!("Batch for source domain {domain} holds a sample of domain {other}");
    }
    Ok(batch)
}

/// Mean task loss of `model` over the meta-train batches.
fn meta_train_task_loss<B: Backend>(
    model:      &FeatureNet<B>,
    batches:    &BTreeMap<usize, ImageBatch<B>>,
    meta_train: &[usize],
) -> Result<Tensor<B, 1>> {
    let mut terms = Vec::with_capacity(meta_train.len());
    for &d in meta_train {
        let batch  = batch_for(batches, d)?;
        let logits = model.forward(batch.images.clone()).logits;
        terms.push(task_loss(logits, batch.targets.clone()));
    }
    Ok(mean(terms))
}

/// Run one meta-learning iteration and return the updated networks.
pub fn meta_step<B, OM, OE>(
    model:        FeatureNet<B>,
    metric:       MetricNet<B>,
    batches:      &BTreeMap<usize, ImageBatch<B>>,
    partition:    &MetaPartition,
    cfg:          &MetaStepConfig,
    model_optim:  &mut OM,
    metric_optim: &mut OE,
) -> Result<(FeatureNet<B>, MetricNet<B>, StepLosses)>
where
    B:  AutodiffBackend,
    OM: Optimizer<FeatureNet<B>, B>,
    OE: Optimizer<MetricNet<B>, B>,
{
    // ── Inner update (meta-train) ─────────────────────────────────────────────
    // Backward consumes the graph, so the task loss that enters the
    // outer objective is recomputed below.
    let inner_loss  = meta_train_task_loss(&model, batches, &partition.meta_train)?;
    let inner_grads = GradientsParams::from_grads(inner_loss.backward(), &model);
    let fast        = inner_update::<B, _>(model.clone(), &inner_grads, cfg.inner_lr, cfg.clip_value);

    let task = meta_train_task_loss(&model, batches, &partition.meta_train)?;

    // ── Fast-weight forward on every source domain ────────────────────────────
    let mut confusions = BTreeMap::new();
    let mut features   = Vec::with_capacity(batches.len());
    let mut labels     = Vec::new();

    for &d in partition.meta_train.iter().chain(&partition.meta_test) {
        let batch  = batch_for(batches, d)?;
        let output = fast.forward(batch.images.clone());

        confusions.insert(
            d,
            soft_confusion(output.logits, &batch.labels, cfg.num_classes, cfg.temperature),
        );
        features.push(output.features);
        labels.extend_from_slice(&batch.labels);
    }

    // ── Global class-relationship alignment ───────────────────────────────────
    let mut pair_losses = Vec::new();
    for i in &partition.meta_train {
        for j in &partition.meta_test {
            pair_losses.push(global_alignment_loss(&confusions[i], &confusions[j]));
        }
    }
    let global = mean(pair_losses);

    // ── Local cohesion / separation ───────────────────────────────────────────
    let embeddings = metric.forward(Tensor::cat(features, 0));
    let local      = triplet_loss(embeddings, &labels, cfg.margin);

    let losses = StepLosses {
        task:   scalar(&task),
        global: scalar(&global),
        local:  scalar(&local),
        total:  0.0,
    };
    let total = task
        + global.mul_scalar(cfg.global_weight)
        + local.mul_scalar(cfg.local_weight);
    let losses = StepLosses { total: scalar(&total), ..losses };

    if !losses.total.is_finite() {
        bail!(
            "Meta-objective diverged (task={}, global={}, local={})",
            losses.task,
            losses.global,
            losses.local
        );
    }

    // ── Outer update ──────────────────────────────────────────────────────────
    let mut grads      = total.backward();
    let model_grads    = GradientsParams::from_module(&mut grads, &model);
    let metric_grads   = GradientsParams::from_module(&mut grads, &metric);

    let model  = model_optim.step(cfg.outer_lr, model, model_grads);
    let metric = metric_optim.step(cfg.metric_lr, metric, metric_grads);

    Ok((model, metric, losses))
}

// ─── Full training run ───────────────────────────────────────────────────────
/// Records the use case has gathered for a run.
pub struct TrainingData {
    pub split:       DomainSplit,
    /// Training records of each source domain, keyed by domain index
    pub sources:     Vec<(usize, Vec<ImageRecord>)>,
    /// Held-out source records used for model selection
    pub validation:  Vec<ImageRecord>,
    /// Test records of the target domain
    pub target_test: Vec<ImageRecord>,
}

#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub iterations:  usize,
    pub best:        Option<BestRecord>,
    pub last_val:    Option<EvalReport>,
    pub last_target: Option<EvalReport>,
}

pub fn run_training(
    cfg:          &TrainConfig,
    data:         TrainingData,
    ckpt_manager: &CheckpointManager,
    metrics:      &MetricsLogger,
) -> Result<TrainSummary> {
    match cfg.backend {
        BackendKind::Wgpu => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_loop::<WgpuTrainBackend>(cfg, data, ckpt_manager, metrics, device)
        }
        BackendKind::NdArray => {
            let device = NdArrayDevice::default();
            tracing::info!("Using NdArray (CPU) device");
            train_loop::<NdArrayTrainBackend>(cfg, data, ckpt_manager, metrics, device)
        }
    }
}

/// Running sums of step losses between two evaluation points
#[derive(Default)]
struct LossWindow {
    task:   f64,
    global: f64,
    local:  f64,
    steps:  usize,
}

impl LossWindow {
    fn add(&mut self, l: &StepLosses) {
        self.task   += l.task;
        self.global += l.global;
        self.local  += l.local;
        self.steps  += 1;
    }

    fn means(&self) -> (f64, f64, f64) {
        let n = self.steps.max(1) as f64;
        (self.task / n, self.global / n, self.local / n)
    }
}

fn train_loop<B: AutodiffBackend>(
    cfg:          &TrainConfig,
    data:         TrainingData,
    ckpt_manager: &CheckpointManager,
    metrics:      &MetricsLogger,
    device:       B::Device,
) -> Result<TrainSummary> {
    B::seed(cfg.seed);

    // ── Build networks ────────────────────────────────────────────────────────
    let mut model: FeatureNet<B> = cfg.feature_net_config().init(&device)?;
    if let Some(path) = &cfg.init_checkpoint {
        model = load_record(model, path, &device)?;
        tracing::info!("Warm-started feature network from '{}'", path);
    }
    let mut metric: MetricNet<B> = cfg.metric_net_config().init(&device);
    tracing::info!(
        "Networks ready: image_size={}, feature_dim={}, embed_dim={}",
        cfg.image_size,
        cfg.feature_dim,
        cfg.embed_dim
    );

    // ── Adam optimisers, gradients clipped by value ───────────────────────────
    let adam = AdamConfig::new()
        .with_epsilon(1e-8)
        .with_grad_clipping(Some(GradientClippingConfig::Value(cfg.clip_value as f32)));
    let mut model_optim  = adam.init::<B, FeatureNet<B>>();
    let mut metric_optim = adam.init::<B, MetricNet<B>>();

    let step_cfg = MetaStepConfig::from(cfg);

    // ── Batchers ──────────────────────────────────────────────────────────────
    let train_batcher = ImageBatcher::<B>::new(
        device.clone(),
        ImagePreprocessor::new(cfg.image_size, Mode::Training),
        cfg.num_classes,
    )
    .with_seed(cfg.seed);
    let evaluator = Evaluator::<B::InnerBackend>::new(
        ImageBatcher::new(
            device.clone(),
            ImagePreprocessor::new(cfg.image_size, Mode::Inference),
            cfg.num_classes,
        ),
        cfg.batch_size,
        cfg.num_workers,
    );

    // ── One endless stream per source domain ──────────────────────────────────
    let mut streams = BTreeMap::new();
    for (d, records) in data.sources {
        let stream = DomainStream::new(records, cfg.batch_size, cfg.seed.wrapping_add(d as u64))
            .with_context(|| format!("Source domain '{}'", data.split.name(d)))?;
        tracing::info!("Source '{}': {} images", data.split.name(d), stream.len());
        streams.insert(d, stream);
    }
    let sources: Vec<usize> = streams.keys().copied().collect();

    let mut rng     = StdRng::seed_from_u64(cfg.seed);
    let mut window  = LossWindow::default();
    let mut summary = TrainSummary { iterations: 0, best: None, last_val: None, last_target: None };

    // ── Iteration loop ────────────────────────────────────────────────────────
    for iteration in 1..=cfg.iterations {
        let partition = meta_partition(&sources, cfg.meta_test_domains, &mut rng)?;

        let mut batches = BTreeMap::new();
        for (&d, stream) in streams.iter_mut() {
            let batch = train_batcher
                .try_batch(stream.next_batch())
                .with_context(|| format!("Source domain '{}'", data.split.name(d)))?;
            batches.insert(d, batch);
        }

        let (m, e, losses) = meta_step(
            model,
            metric,
            &batches,
            &partition,
            &step_cfg,
            &mut model_optim,
            &mut metric_optim,
        )
        .with_context(|| format!("Iteration {iteration}"))?;
        model  = m;
        metric = e;

        window.add(&losses);
        summary.iterations = iteration;

        if iteration % cfg.print_interval == 0 {
            tracing::info!(
                "Iter {:>6} | task={:.4} | global={:.4} | local={:.4} | total={:.4}",
                iteration,
                losses.task,
                losses.global,
                losses.local,
                losses.total,
            );
        }

        if iteration % cfg.eval_interval != 0 && iteration != cfg.iterations {
            continue;
        }

        // ── Evaluation point ──────────────────────────────────────────────────
        // model.valid() → FeatureNet<B::InnerBackend>, dropout disabled
        let model_valid = model.valid();
        let val    = evaluator.evaluate(&model_valid, DomainDataset::new(data.validation.clone()));
        let target = evaluator.evaluate(&model_valid, DomainDataset::new(data.target_test.clone()));
        if val.samples == 0 || target.samples == 0 {
            bail!(
                "Iteration {iteration}: no decodable images in the {} set",
                if val.samples == 0 { "validation" } else { "target test" }
            );
        }

        let (task, global, local) = window.means();
        window = LossWindow::default();

        for (&d, stream) in &streams {
            tracing::debug!(
                "'{}': {} epochs completed",
                data.split.name(d),
                stream.epochs_completed()
            );
        }

        println!(
            "Iter {:>6}/{} | task={:.4} | global={:.4} | local={:.4} | val_acc={:.1}% | {}_acc={:.1}%",
            iteration,
            cfg.iterations,
            task,
            global,
            local,
            val.accuracy * 100.0,
            data.split.target_name(),
            target.accuracy * 100.0,
        );

        let row = IterationMetrics::new(iteration, task, global, local, val.accuracy, target.accuracy);
        metrics.log(&row)?;
        ckpt_manager.save_model(&model, iteration)?;

        if row.is_improvement(summary.best.map(|b| b.val_accuracy)) {
            let best = BestRecord {
                iteration,
                val_accuracy:    val.accuracy,
                target_accuracy: target.accuracy,
            };
            ckpt_manager.save_best(&model, &best)?;
            summary.best = Some(best);
        }

        summary.last_val    = Some(val);
        summary.last_target = Some(target);
    }

    if let Some(best) = summary.best {
        tracing::info!(
            "Training complete! Best val_acc={:.4} at iteration {} ({} acc there: {:.4})",
            best.val_accuracy,
            best.iteration,
            data.split.target_name(),
            best.target_accuracy
        );
    } else {
        tracing::info!("Training complete!");
    }
    Ok(summary)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::ImageSample;
    use crate::ml::model::{FeatureNetConfig, MetricNetConfig};
    use burn::optim::SgdConfig;
    use image::{Rgb, RgbImage};
    use rand::Rng;

    type TB = NdArrayTrainBackend;

    const SIZE: usize = 67;

    fn step_cfg() -> MetaStepConfig {
        MetaStepConfig {
            inner_lr:      1e-3,
            outer_lr:      1e-3,
            metric_lr:     1e-3,
            // wide enough that every anchor violates it
            margin:        1e4,
            global_weight: 1.0,
            local_weight:  0.005,
            temperature:   2.0,
            clip_value:    2.0,
            num_classes:   3,
        }
    }

    fn synthetic_batch(domain: usize, labels: &[usize], seed: u64) -> ImageBatch<TB> {
        let mut rng = StdRng::seed_from_u64(seed);
        let samples: Vec<ImageSample> = labels
            .iter()
            .map(|&label| ImageSample {
                pixels: (0..3 * SIZE * SIZE).map(|_| rng.gen_range(-100.0..100.0)).collect(),
                label,
                domain,
            })
            .collect();
        ImageBatcher::<TB>::new(
            Default::default(),
            ImagePreprocessor::new(SIZE, Mode::Training),
            3,
        )
        .stack(&samples)
    }

    fn weights(m: &FeatureNet<TB>) -> Vec<f32> {
        m.fc8.weight.val().inner().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_meta_step_updates_both_networks() {
        TB::seed(7);
        let device = Default::default();
        let model: FeatureNet<TB> = FeatureNetConfig::new(3, SIZE, 8, 0.0).init(&device).unwrap();
        let metric: MetricNet<TB> = MetricNetConfig::new(8, 6, 4).init(&device);

        let mut batches = BTreeMap::new();
        batches.insert(0, synthetic_batch(0, &[0, 0, 1, 2], 1));
        batches.insert(1, synthetic_batch(1, &[0, 1, 1, 2], 2));
        batches.insert(2, synthetic_batch(2, &[2, 0, 1, 1], 3));
        let partition = MetaPartition { meta_train: vec![0, 2], meta_test: vec![1] };

        let mut model_optim  = AdamConfig::new().init::<TB, FeatureNet<TB>>();
        let mut metric_optim = AdamConfig::new().init::<TB, MetricNet<TB>>();

        let before_model  = weights(&model);
        let before_metric = metric.fc1.weight.val().inner().into_data().to_vec::<f32>().unwrap();

        let (model, metric, losses) = meta_step(
            model,
            metric,
            &batches,
            &partition,
            &step_cfg(),
            &mut model_optim,
            &mut metric_optim,
        )
        .unwrap();

        assert!(losses.task > 0.0);
        assert!(losses.global >= 0.0);
        assert!(losses.local >= 0.0);
        let expected = losses.task + losses.global + 0.005 * losses.local;
        assert!((losses.total - expected).abs() < 1e-3 * expected.max(1.0));

        assert_ne!(weights(&model), before_model);
        let after_metric = metric.fc1.weight.val().inner().into_data().to_vec::<f32>().unwrap();
        assert_ne!(after_metric, before_metric);
    }

    #[test]
    fn test_meta_step_requires_a_batch_per_domain() {
        let device = Default::default();
        let model: FeatureNet<TB> = FeatureNetConfig::new(3, SIZE, 8, 0.0).init(&device).unwrap();
        let metric: MetricNet<TB> = MetricNetConfig::new(8, 6, 4).init(&device);

        let mut batches = BTreeMap::new();
        batches.insert(0, synthetic_batch(0, &[0, 1], 1));
        let partition = MetaPartition { meta_train: vec![0], meta_test: vec![1] };

        let result = meta_step(
            model,
            metric,
            &batches,
            &partition,
            &step_cfg(),
            &mut AdamConfig::new().init::<TB, FeatureNet<TB>>(),
            &mut AdamConfig::new().init::<TB, MetricNet<TB>>(),
        );
        assert!(result.is_err());
    }

    fn three_domain_batches() -> BTreeMap<usize, ImageBatch<TB>> {
        let mut batches = BTreeMap::new();
        batches.insert(0, synthetic_batch(0, &[0, 0, 1, 2], 1));
        batches.insert(1, synthetic_batch(1, &[0, 1, 1, 2], 2));
        batches.insert(2, synthetic_batch(2, &[2, 0, 1, 1], 3));
        batches
    }

    fn fc6_weights(m: &FeatureNet<TB>) -> Vec<f32> {
        m.fc6.weight.val().inner().into_data().to_vec::<f32>().unwrap()
    }

    // Plain SGD so the step is proportional to the gradient.
    fn sgd_step(
        model:  FeatureNet<TB>,
        metric: MetricNet<TB>,
        cfg:    &MetaStepConfig,
    ) -> (FeatureNet<TB>, StepLosses) {
        let partition = MetaPartition { meta_train: vec![0, 2], meta_test: vec![1] };
        let (model, _, losses) = meta_step(
            model,
            metric,
            &three_domain_batches(),
            &partition,
            cfg,
            &mut SgdConfig::new().init::<TB, FeatureNet<TB>>(),
            &mut SgdConfig::new().init::<TB, MetricNet<TB>>(),
        )
        .unwrap();
        (model, losses)
    }

    #[test]
    fn test_regularisers_reach_the_feature_network() {
        TB::seed(11);
        let device = Default::default();
        let model: FeatureNet<TB> = FeatureNetConfig::new(3, SIZE, 8, 0.0).init(&device).unwrap();
        let metric: MetricNet<TB> = MetricNetConfig::new(8, 6, 4).init(&device);

        let task_only = MetaStepConfig { global_weight: 0.0, local_weight: 0.0, ..step_cfg() };
        let combined  = MetaStepConfig { global_weight: 1.0, local_weight: 1.0, ..step_cfg() };

        let (a, la) = sgd_step(model.clone(), metric.clone(), &task_only);
        let (b, lb) = sgd_step(model, metric, &combined);

        // same θ, same batches: only the regularisers differ
        assert!((la.task - lb.task).abs() < 1e-6);
        assert!(lb.global > 0.0);
        assert!(lb.local > 0.0);
        assert_ne!(fc6_weights(&a), fc6_weights(&b));
    }

    #[test]
    fn test_meta_step_rejects_mixed_domain_batch() {
        let device = Default::default();
        let model: FeatureNet<TB> = FeatureNetConfig::new(3, SIZE, 8, 0.0).init(&device).unwrap();
        let metric: MetricNet<TB> = MetricNetConfig::new(8, 6, 4).init(&device);

        let mut batches = three_domain_batches();
        // domain 2 samples filed under domain 1
        batches.insert(1, synthetic_batch(2, &[0, 1, 1, 2], 2));
        let partition = MetaPartition { meta_train: vec![0, 2], meta_test: vec![1] };

        let result = meta_step(
            model,
            metric,
            &batches,
            &partition,
            &step_cfg(),
            &mut AdamConfig::new().init::<TB, FeatureNet<TB>>(),
            &mut AdamConfig::new().init::<TB, MetricNet<TB>>(),
        );
        let err = result.err().unwrap();
        assert!(format!("{err:#}").contains("domain 1"), "{err:#}");
    }

    fn write_domain(dir: &std::path::Path, domain: usize, count: usize) -> Vec<ImageRecord> {
        (0..count)
            .map(|i| {
                let path  = dir.join(format!("d{domain}_{i}.png"));
                let shade = (i * 37 + domain * 80) as u8;
                RgbImage::from_pixel(70, 70, Rgb([shade, 255 - shade, 90])).save(&path).unwrap();
                ImageRecord::new(path, i % 3, domain)
            })
            .collect()
    }

    #[test]
    fn test_run_training_writes_checkpoints_and_metrics() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = dir.path().join("ckpt");

        let cfg = TrainConfig {
            domains:           vec!["a".into(), "b".into(), "c".into()],
            target_domain:     "c".into(),
            num_classes:       3,
            image_size:        SIZE,
            batch_size:        3,
            iterations:        2,
            inner_lr:          1e-3,
            outer_lr:          1e-3,
            metric_lr:         1e-3,
            feature_dim:       8,
            metric_hidden:     6,
            embed_dim:         4,
            dropout:           0.0,
            print_interval:    1,
            eval_interval:     1,
            num_workers:       1,
            backend:           BackendKind::NdArray,
            checkpoint_dir:    ckpt.to_str().unwrap().to_string(),
            ..TrainConfig::default()
        };
        cfg.validate().unwrap();

        let data = || TrainingData {
            split:       DomainSplit::new(cfg.domains.clone(), &cfg.target_domain).unwrap(),
            sources:     vec![(0, write_domain(dir.path(), 0, 4)), (1, write_domain(dir.path(), 1, 5))],
            validation:  write_domain(dir.path(), 0, 2),
            target_test: write_domain(dir.path(), 2, 3),
        };

        let ckpt_manager = CheckpointManager::new(cfg.checkpoint_dir.clone()).unwrap();
        let metrics      = MetricsLogger::new(cfg.checkpoint_dir.clone()).unwrap();

        let summary = run_training(&cfg, data(), &ckpt_manager, &metrics).unwrap();

        assert_eq!(summary.iterations, 2);
        assert!(summary.best.is_some());
        assert_eq!(summary.last_target.unwrap().samples, 3);
        assert_eq!(ckpt_manager.latest_iteration().unwrap(), 2);
        assert!(ckpt.join("best.mpk.gz").exists());

        let csv = std::fs::read_to_string(metrics.csv_path()).unwrap();
        assert_eq!(csv.lines().count(), 3);

        // warm start a second run from the first run's best record
        let warm_dir = dir.path().join("warm");
        let warm_cfg = TrainConfig {
            iterations:      1,
            checkpoint_dir:  warm_dir.to_str().unwrap().to_string(),
            init_checkpoint: Some(ckpt.join("best.mpk.gz").to_str().unwrap().to_string()),
            ..cfg.clone()
        };
        let warm_ckpt    = CheckpointManager::new(warm_cfg.checkpoint_dir.clone()).unwrap();
        let warm_metrics = MetricsLogger::new(warm_cfg.checkpoint_dir.clone()).unwrap();
        let warm = run_training(&warm_cfg, data(), &warm_ckpt, &warm_metrics).unwrap();
        assert_eq!(warm.iterations, 1);
        assert!(warm_dir.join("model_iter_1.mpk.gz").exists());

        let missing_cfg = TrainConfig {
            init_checkpoint: Some(dir.path().join("nowhere.mpk.gz").to_str().unwrap().to_string()),
            ..warm_cfg.clone()
        };
        assert!(run_training(&missing_cfg, data(), &warm_ckpt, &warm_metrics).is_err());
    }

    #[test]
    fn test_run_training_rejects_undecodable_target() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            domains:        vec!["a".into(), "b".into(), "c".into()],
            target_domain:  "c".into(),
            num_classes:    3,
            image_size:     SIZE,
            batch_size:     2,
            iterations:     1,
            feature_dim:    8,
            metric_hidden:  6,
            embed_dim:      4,
            dropout:        0.0,
            num_workers:    1,
            backend:        BackendKind::NdArray,
            checkpoint_dir: dir.path().join("ckpt").to_str().unwrap().to_string(),
            ..TrainConfig::default()
        };

        let broken: Vec<ImageRecord> = (0..2)
            .map(|i| {
                let path = dir.path().join(format!("broken_{i}.png"));
                std::fs::write(&path, b"not an image").unwrap();
                ImageRecord::new(path, 0, 2)
            })
            .collect();
        let data = TrainingData {
            split:       DomainSplit::new(cfg.domains.clone(), &cfg.target_domain).unwrap(),
            sources:     vec![(0, write_domain(dir.path(), 0, 3)), (1, write_domain(dir.path(), 1, 3))],
            validation:  write_domain(dir.path(), 0, 2),
            target_test: broken,
        };

        let ckpt_manager = CheckpointManager::new(cfg.checkpoint_dir.clone()).unwrap();
        let metrics      = MetricsLogger::new(cfg.checkpoint_dir.clone()).unwrap();
        let err = run_training(&cfg, data, &ckpt_manager, &metrics).unwrap_err();
        assert!(err.to_string().contains("target test"), "{err:#}");
        assert!(ckpt_manager.latest_iteration().is_err());
    }
}
