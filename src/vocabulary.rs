use std::{fs, path::Path};

use anyhow::{Context, Result, bail};

/// Ordered class labels; entry `i` names classifier output `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelVocabulary {
    labels: Vec<String>,
}

impl LabelVocabulary {
    /// One label per line. Lines are trimmed and blank lines skipped, the
    /// remaining order is the training-time class order.
    pub fn parse(text: &str) -> Result<Self> {
        let labels: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        if labels.is_empty() {
            bail!("label vocabulary is empty");
        }

        Ok(Self { labels })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read labels from {}", path.display()))?;
        let vocabulary = Self::parse(&text)
            .with_context(|| format!("invalid label file {}", path.display()))?;
        log::info!(
            "loaded {} labels from {}",
            vocabulary.len(),
            path.display()
        );
        Ok(vocabulary)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}
