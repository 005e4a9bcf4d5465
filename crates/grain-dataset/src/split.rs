//! Train/validation split of a single dataset root.
//!
//! The split is per class and positional: for a class with `n` images sorted
//! by path, the first `floor(fraction * n)` images are held out for
//! validation and the rest are used for training. No randomness is involved,
//! so the same tree and fraction always give the same partitions.

use grain_core::{ClassIndex, Error, ImageSample, Result};

use crate::scan::ScannedDataset;

/// Train and validation partitions of one root, sharing one class index
#[derive(Debug, Clone)]
pub struct ValidationSplit {
    pub class_index: ClassIndex,
    pub train: Vec<ImageSample>,
    pub validation: Vec<ImageSample>,
    pub fraction: f64,
}

impl ValidationSplit {
    /// Splits a scanned dataset. The fraction must lie strictly between 0
    /// and 1, and both partitions must end up non-empty.
    pub fn from_scan(scanned: ScannedDataset, fraction: f64) -> Result<Self> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(Error::Config(format!(
                "Validation fraction must lie strictly between 0 and 1, got {fraction}"
            )));
        }

        let mut by_class: Vec<Vec<ImageSample>> = vec![Vec::new(); scanned.class_index.len()];
        for sample in scanned.samples {
            by_class[sample.label].push(sample);
        }

        let mut train = Vec::new();
        let mut validation = Vec::new();

        for class_samples in by_class {
            let n_val = (class_samples.len() as f64 * fraction).floor() as usize;
            let mut samples = class_samples.into_iter();
            validation.extend(samples.by_ref().take(n_val));
            train.extend(samples);
        }

        if train.is_empty() || validation.is_empty() {
            return Err(Error::Config(format!(
                "Validation fraction {fraction} leaves an empty partition in {} \
                 ({} train, {} validation)",
                scanned.root.display(),
                train.len(),
                validation.len()
            )));
        }

        Ok(Self {
            class_index: scanned.class_index,
            train,
            validation,
            fraction,
        })
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len()
    }
}

impl std::fmt::Display for ValidationSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.total().max(1) as f64;
        writeln!(f, "Dataset Split:")?;
        writeln!(f, "  Classes: {}", self.class_index.len())?;
        writeln!(f, "  Total images: {}", self.total())?;
        writeln!(
            f,
            "  Training: {} ({:.1}%)",
            self.train.len(),
            100.0 * self.train.len() as f64 / total
        )?;
        writeln!(
            f,
            "  Validation: {} ({:.1}%)",
            self.validation.len(),
            100.0 * self.validation.len() as f64 / total
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scanned(per_class: &[usize]) -> ScannedDataset {
        let names: Vec<String> = (0..per_class.len()).map(|i| format!("class_{i}")).collect();
        let samples = per_class
            .iter()
            .enumerate()
            .flat_map(|(label, &n)| {
                let name = names[label].clone();
                (0..n).map(move |i| {
                    let path = PathBuf::from(format!("{name}/{i:03}.png"));
                    ImageSample::new(path, label, name.clone())
                })
            })
            .collect();

        ScannedDataset {
            root: PathBuf::from("/data/rice"),
            class_index: ClassIndex::new(names),
            samples,
        }
    }

    #[test]
    fn test_two_classes_hundred_each() {
        let split = ValidationSplit::from_scan(scanned(&[100, 100]), 0.2).unwrap();
        assert_eq!(split.train.len(), 160);
        assert_eq!(split.validation.len(), 40);

        let val_per_class = split.validation.iter().filter(|s| s.label == 0).count();
        assert_eq!(val_per_class, 20);
    }

    #[test]
    fn test_validation_takes_leading_files() {
        let split = ValidationSplit::from_scan(scanned(&[10]), 0.2).unwrap();
        assert_eq!(split.validation[0].path, PathBuf::from("class_0/000.png"));
        assert_eq!(split.validation[1].path, PathBuf::from("class_0/001.png"));
        assert_eq!(split.train[0].path, PathBuf::from("class_0/002.png"));
    }

    #[test]
    fn test_ratio_converges() {
        for n in [50usize, 500, 5000] {
            let split = ValidationSplit::from_scan(scanned(&[n, n, n]), 0.3).unwrap();
            let ratio = split.validation.len() as f64 / split.total() as f64;
            assert!((ratio - 0.3).abs() <= 1.0 / n as f64, "n={n} ratio={ratio}");
            assert!(!split.train.is_empty());
        }
    }

    #[test]
    fn test_partitions_are_disjoint() {
        let split = ValidationSplit::from_scan(scanned(&[7, 13]), 0.25).unwrap();
        for sample in &split.validation {
            assert!(!split.train.contains(sample));
        }
        assert_eq!(split.total(), 20);
    }

    #[test]
    fn test_invalid_fraction() {
        assert!(ValidationSplit::from_scan(scanned(&[10]), 0.0).is_err());
        assert!(ValidationSplit::from_scan(scanned(&[10]), 1.0).is_err());
        assert!(ValidationSplit::from_scan(scanned(&[10]), -0.5).is_err());
    }

    #[test]
    fn test_too_small_for_validation() {
        let result = ValidationSplit::from_scan(scanned(&[2, 3]), 0.2);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
