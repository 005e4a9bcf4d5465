//! Core type definitions shared by the dataset and training crates.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ordered class names; a label is the position of its name.
///
/// Built from the sorted subdirectory names of a dataset root, so two roots
/// with the same class folders always produce the same mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassIndex {
    names: Vec<String>,
}

impl ClassIndex {
    /// Creates an index from names already in label order
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Name for a label, if the label is in range
    pub fn name(&self, label: usize) -> Option<&str> {
        self.names.get(label).map(String::as_str)
    }

    /// Label for a class name
    pub fn label_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Fails with a configuration error unless `other` has the same classes in
    /// the same order.
    pub fn ensure_matches(&self, other: &ClassIndex, context: &str) -> Result<()> {
        if self.names == other.names {
            return Ok(());
        }

        let missing: Vec<&str> = self
            .names
            .iter()
            .filter(|n| !other.names.contains(n))
            .map(String::as_str)
            .collect();
        let extra: Vec<&str> = other
            .names
            .iter()
            .filter(|n| !self.names.contains(n))
            .map(String::as_str)
            .collect();

        Err(Error::Config(format!(
            "Class set mismatch in {context}: expected {:?}, found {:?} \
             (missing {:?}, unexpected {:?})",
            self.names, other.names, missing, extra
        )))
    }
}

/// Represents an image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label (index)
    pub label: usize,
    /// Class name the label refers to
    pub class_name: String,
}

impl ImageSample {
    pub fn new(path: PathBuf, label: usize, class_name: impl Into<String>) -> Self {
        Self {
            path,
            label,
            class_name: class_name.into(),
        }
    }
}

/// Data split type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataSplit {
    /// Training data
    Train,
    /// Validation data
    Validation,
    /// Test data
    Test,
}

impl std::fmt::Display for DataSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSplit::Train => write!(f, "train"),
            DataSplit::Validation => write!(f, "validation"),
            DataSplit::Test => write!(f, "test"),
        }
    }
}
