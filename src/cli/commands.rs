// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `evaluate`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, enums)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::train_use_case::{BackendKind, TrainConfig};
use crate::infra::checkpoint::CheckpointKind;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Meta-train a classifier on the source domains
    Train(TrainArgs),

    /// Score a trained checkpoint on the target domain's test list
    Evaluate(EvaluateArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    /// GPU via wgpu
    Wgpu,
    /// CPU via ndarray
    Ndarray,
}

impl From<BackendArg> for BackendKind {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Wgpu    => BackendKind::Wgpu,
            BackendArg::Ndarray => BackendKind::NdArray,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhichArg {
    /// Weights with the best source validation accuracy
    Best,
    /// Weights from the last evaluation point
    Latest,
}

impl From<WhichArg> for CheckpointKind {
    fn from(w: WhichArg) -> Self {
        match w {
            WhichArg::Best   => CheckpointKind::Best,
            WhichArg::Latest => CheckpointKind::Latest,
        }
    }
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Root the image paths in the list files are relative to
    #[arg(long, default_value = "data/PACS/kfold")]
    pub dataroot: String,

    /// Directory holding {domain}_{train|crossval|test}_kfold.txt
    #[arg(long, default_value = "data/PACS/lists")]
    pub list_dir: String,

    /// Every domain in the dataset, comma separated
    #[arg(long, value_delimiter = ',', default_value = "art_painting,cartoon,photo,sketch")]
    pub domains: Vec<String>,

    /// The unseen domain; all others are sources
    #[arg(long, default_value = "art_painting")]
    pub target_domain: String,

    #[arg(long, default_value_t = 7)]
    pub num_classes: usize,

    /// Side length images are resized to (at least 67)
    #[arg(long, default_value_t = 227)]
    pub image_size: usize,

    /// Images drawn from EACH source domain per iteration
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Number of meta-learning iterations
    #[arg(long, default_value_t = 10_000)]
    pub iterations: usize,

    /// Step size of the inner (meta-train) update
    #[arg(long, default_value_t = 1e-5)]
    pub inner_lr: f64,

    /// Adam learning rate for the feature network
    #[arg(long, default_value_t = 1e-5)]
    pub outer_lr: f64,

    /// Adam learning rate for the metric embedding head
    #[arg(long, default_value_t = 1e-5)]
    pub metric_lr: f64,

    /// Triplet loss margin
    #[arg(long, default_value_t = 10.0)]
    pub margin: f64,

    /// Weight of the global class-alignment loss
    #[arg(long, default_value_t = 1.0)]
    pub global_weight: f64,

    /// Weight of the local triplet loss
    #[arg(long, default_value_t = 0.005)]
    pub local_weight: f64,

    /// Softmax temperature of the soft confusion matrix
    #[arg(long, default_value_t = 2.0)]
    pub temperature: f64,

    /// Gradients are clipped to [-clip, clip]
    #[arg(long, default_value_t = 2.0)]
    pub clip_value: f64,

    /// Source domains held out as meta-test each iteration
    #[arg(long, default_value_t = 1)]
    pub meta_test_domains: usize,

    /// Width of fc6 / fc7
    #[arg(long, default_value_t = 4096)]
    pub feature_dim: usize,

    #[arg(long, default_value_t = 256)]
    pub metric_hidden: usize,

    #[arg(long, default_value_t = 128)]
    pub embed_dim: usize,

    #[arg(long, default_value_t = 0.5)]
    pub dropout: f64,

    /// Share of a training list held out when a domain has no crossval list
    #[arg(long, default_value_t = 0.1)]
    pub val_fraction: f64,

    #[arg(long, default_value_t = 10)]
    pub print_interval: usize,

    /// Evaluate, log metrics and checkpoint every N iterations
    #[arg(long, default_value_t = 100)]
    pub eval_interval: usize,

    /// DataLoader threads used for evaluation
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,

    /// Directory to save checkpoints, config and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Start the feature network from these weights (e.g. best.mpk.gz)
    #[arg(long)]
    pub init_checkpoint: Option<String>,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            dataroot:          a.dataroot,
            list_dir:          a.list_dir,
            domains:           a.domains,
            target_domain:     a.target_domain,
            num_classes:       a.num_classes,
            image_size:        a.image_size,
            batch_size:        a.batch_size,
            val_fraction:      a.val_fraction,
            iterations:        a.iterations,
            inner_lr:          a.inner_lr,
            outer_lr:          a.outer_lr,
            metric_lr:         a.metric_lr,
            clip_value:        a.clip_value,
            meta_test_domains: a.meta_test_domains,
            margin:            a.margin,
            global_weight:     a.global_weight,
            local_weight:      a.local_weight,
            temperature:       a.temperature,
            feature_dim:       a.feature_dim,
            metric_hidden:     a.metric_hidden,
            embed_dim:         a.embed_dim,
            dropout:           a.dropout,
            print_interval:    a.print_interval,
            eval_interval:     a.eval_interval,
            num_workers:       a.num_workers,
            seed:              a.seed,
            backend:           a.backend.into(),
            checkpoint_dir:    a.checkpoint_dir,
            init_checkpoint:   a.init_checkpoint,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = WhichArg::Best)]
    pub which: WhichArg,

    /// Defaults to the backend used for training
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,
}
