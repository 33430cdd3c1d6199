// ============================================================
// Layer 4 — File List Loader
// ============================================================
// Reads the per-domain k-fold list files that describe the
// dataset. Each domain has up to three lists:
//
//   lists/
//     art_painting_train_kfold.txt
//     art_painting_crossval_kfold.txt
//     art_painting_test_kfold.txt
//     cartoon_train_kfold.txt
//     ...
//
// Every non-blank line is an image path relative to the
// dataroot followed by an integer class label:
//
//   art_painting/dog/pic_001.jpg 0
//   art_painting/dog/pic_002.jpg 0
//
// The label is taken from the LAST whitespace-separated token,
// so an image path that contains spaces still parses.
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (Reading a File)

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::record::ImageRecord;
use crate::domain::traits::{DataSplit, RecordSource};

/// Loads domain records from `{list_dir}/{domain}_{split}_kfold.txt`.
/// Implements the RecordSource trait from Layer 3.
pub struct ListFileLoader {
    /// Directory holding the list files
    list_dir: PathBuf,

    /// Directory the image paths in the lists are relative to
    dataroot: PathBuf,

    /// Labels must be strictly below this
    num_classes: usize,
}

impl ListFileLoader {
    pub fn new(
        list_dir: impl Into<PathBuf>,
        dataroot: impl Into<PathBuf>,
        num_classes: usize,
    ) -> Self {
        Self {
            list_dir: list_dir.into(),
            dataroot: dataroot.into(),
            num_classes,
        }
    }

    /// Path of the list file for one domain and split
    pub fn list_path(&self, domain: &str, split: DataSplit) -> PathBuf {
        self.list_dir
            .join(format!("{}_{}_kfold.txt", domain, split.tag()))
    }

    /// Parse list file contents. Split out from `load` so the
    /// parsing rules can be tested without touching disk.
    fn parse(&self, source: &Path, contents: &str, domain_index: usize) -> Result<Vec<ImageRecord>> {
        let mut records = Vec::new();

        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some((rel_path, label)) = line.rsplit_once(char::is_whitespace) else {
                bail!(
                    "{}:{}: expected '<image path> <label>', got '{}'",
                    source.display(),
                    line_no + 1,
                    line
                );
            };

            let label: usize = label.parse().with_context(|| {
                format!(
                    "{}:{}: label '{}' is not a non-negative integer",
                    source.display(),
                    line_no + 1,
                    label
                )
            })?;

            if label >= self.num_classes {
                bail!(
                    "{}:{}: label {} out of range for {} classes",
                    source.display(),
                    line_no + 1,
                    label,
                    self.num_classes
                );
            }

            records.push(ImageRecord::new(
                self.dataroot.join(rel_path.trim_end()),
                label,
                domain_index,
            ));
        }

        Ok(records)
    }
}

impl RecordSource for ListFileLoader {
    fn load(&self, domain: &str, domain_index: usize, split: DataSplit) -> Result<Vec<ImageRecord>> {
        let path = self.list_path(domain, split);

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read file list '{}'", path.display()))?;

        let records = self.parse(&path, &contents, domain_index)?;

        tracing::debug!(
            "Loaded {} {} records for domain '{}'",
            records.len(),
            split.tag(),
            domain
        );

        Ok(records)
    }

    fn has_split(&self, domain: &str, split: DataSplit) -> bool {
        self.list_path(domain, split).is_file()
    }
}
