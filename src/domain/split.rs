// ============================================================
// Layer 3 — DomainSplit Domain Type
// ============================================================
// Names every domain in the dataset and marks one of them as
// the unseen target. All remaining domains are sources: they
// are the only data the meta-learner is allowed to train on.
//
// Example (PACS, target = sketch):
//   domains = [art_painting, cartoon, photo, sketch]
//   target  = 3
//   sources = [0, 1, 2]

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSplit {
    domains: Vec<String>,
    target: usize,
}

impl DomainSplit {
    /// Build a split from the full domain list and the target name.
    ///
    /// Fails if the target is unknown, a name repeats, or fewer
    /// than two source domains remain (meta-train and meta-test
    /// each need at least one).
    pub fn new(domains: Vec<String>, target: &str) -> Result<Self> {
        for (i, d) in domains.iter().enumerate() {
            if domains[..i].contains(d) {
                bail!("Domain '{d}' is listed more than once");
            }
        }

        let Some(target) = domains.iter().position(|d| d == target) else {
            bail!(
                "Target domain '{}' is not one of the configured domains {:?}",
                target,
                domains
            );
        };

        if domains.len() < 3 {
            bail!(
                "Need at least two source domains besides the target, got {:?}",
                domains
            );
        }

        Ok(Self { domains, target })
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn name(&self, index: usize) -> &str {
        &self.domains[index]
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn target_name(&self) -> &str {
        &self.domains[self.target]
    }

    /// Indices of every domain except the target, in list order
    pub fn sources(&self) -> Vec<usize> {
        (0..self.domains.len()).filter(|&i| i != self.target).collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn pacs() -> Vec<String> {
        ["art_painting", "cartoon", "photo", "sketch"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_sources_exclude_target() {
        let split = DomainSplit::new(pacs(), "photo").unwrap();
        assert_eq!(split.target(), 2);
        assert_eq!(split.sources(), vec![0, 1, 3]);
        assert_eq!(split.target_name(), "photo");
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        assert!(DomainSplit::new(pacs(), "clipart").is_err());
    }

    #[test]
    fn test_too_few_sources_is_rejected() {
        let domains = vec!["a".to_string(), "b".to_string()];
        assert!(DomainSplit::new(domains, "a").is_err());
    }

    #[test]
    fn test_duplicate_domain_is_rejected() {
        let domains = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert!(DomainSplit::new(domains, "b").is_err());
    }
}
