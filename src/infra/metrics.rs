// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records meta-training metrics to a CSV file at every
// evaluation point.
//
// Metrics recorded per row:
//   - iteration:   meta-training iteration number
//   - task_loss:   mean cross entropy on meta-train domains (θ)
//   - global_loss: mean symmetric KL between soft confusion
//                  matrices of meta-train / meta-test domains (θ')
//   - local_loss:  mean triplet loss on metric embeddings (θ')
//   - val_acc:     accuracy on held-out source validation data
//   - target_acc:  accuracy on the unseen target domain
//
// Losses are averaged over the iterations since the previous row.
//
// Output file: checkpoints/metrics.csv
//
//   iteration,task_loss,global_loss,local_loss,val_acc,target_acc
//   100,1.812300,0.041200,3.901000,0.412000,0.356000
//   200,1.503100,0.033900,3.115000,0.498000,0.421000
//
// How to read the metrics:
//   - val_acc is the model-selection signal; target_acc must
//     never be used to pick a checkpoint
//   - global_loss near zero means the domains already agree on
//     how classes relate to each other
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

pub const CSV_HEADER: &str = "iteration,task_loss,global_loss,local_loss,val_acc,target_acc";

/// One row of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationMetrics {
    pub iteration:   usize,
    pub task_loss:   f64,
    pub global_loss: f64,
    pub local_loss:  f64,
    pub val_acc:     f64,
    pub target_acc:  f64,
}

impl IterationMetrics {
    pub fn new(
        iteration:   usize,
        task_loss:   f64,
        global_loss: f64,
        local_loss:  f64,
        val_acc:     f64,
        target_acc:  f64,
    ) -> Self {
        Self { iteration, task_loss, global_loss, local_loss, val_acc, target_acc }
    }

    /// Returns true if this row beats the previous best validation accuracy
    pub fn is_improvement(&self, best_val_acc: Option<f64>) -> bool {
        best_val_acc.map_or(true, |best| self.val_acc > best)
    }
}

/// Appends metric rows to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create a new MetricsLogger.
    /// Writes the CSV header if the file doesn't exist yet, so
    /// resumed runs append to the same log.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{CSV_HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one row
    pub fn log(&self, m: &IterationMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.iteration,
            m.task_loss,
            m.global_loss,
            m.local_loss,
            m.val_acc,
            m.target_acc,
        )?;

        tracing::debug!(
            "Logged iteration {} metrics: val_acc={:.4}, target_acc={:.4}",
            m.iteration,
            m.val_acc,
            m.target_acc,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}
