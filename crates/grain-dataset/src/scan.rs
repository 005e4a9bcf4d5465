//! Directory scanning for `<root>/<class_name>/<image_file>` trees.
//!
//! Class directories and image files are visited in sorted order, so the
//! same tree always yields the same class index and sample order.

use grain_core::{ClassIndex, Error, ImageSample, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions accepted as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

/// Result of scanning a dataset root
#[derive(Debug, Clone)]
pub struct ScannedDataset {
    /// Root that was scanned
    pub root: PathBuf,
    /// Classes found, in label order
    pub class_index: ClassIndex,
    /// Samples grouped by class, each group sorted by path
    pub samples: Vec<ImageSample>,
}

impl ScannedDataset {
    /// Number of samples per class, in label order
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.class_index.len()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }
}

/// Checks if a path has an image extension
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Scans a dataset root. Every immediate subdirectory is a class; its images
/// are collected recursively.
///
/// A missing root, a root without class directories or a class directory
/// without images is a configuration error.
pub fn scan_dataset(root: &Path) -> Result<ScannedDataset> {
    if !root.exists() {
        return Err(Error::Config(format!(
            "Dataset directory does not exist: {}",
            root.display()
        )));
    }
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "Dataset path is not a directory: {}",
            root.display()
        )));
    }

    let mut class_dirs = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            class_dirs.push(path);
        }
    }
    class_dirs.sort();

    if class_dirs.is_empty() {
        return Err(Error::Config(format!(
            "No class subdirectories found in {}",
            root.display()
        )));
    }

    let mut names = Vec::with_capacity(class_dirs.len());
    let mut samples = Vec::new();

    for (label, class_dir) in class_dirs.iter().enumerate() {
        let name = class_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                Error::Config(format!("Invalid class directory: {}", class_dir.display()))
            })?;

        let images = scan_images(class_dir)?;
        if images.is_empty() {
            return Err(Error::Config(format!(
                "Class directory contains no images: {}",
                class_dir.display()
            )));
        }

        tracing::debug!("Class {} ({}): {} images", label, name, images.len());
        samples.extend(
            images
                .into_iter()
                .map(|path| ImageSample::new(path, label, name.clone())),
        );
        names.push(name);
    }

    Ok(ScannedDataset {
        root: root.to_path_buf(),
        class_index: ClassIndex::new(names),
        samples,
    })
}

/// Recursively collects image files below `dir`, sorted by path
pub fn scan_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if entry.file_type().is_file() && is_image_file(entry.path()) {
            images.push(entry.into_path());
        }
    }

    images.sort();
    Ok(images)
}
