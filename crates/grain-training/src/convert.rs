//! Re-serialization between model formats with prediction verification.

use std::path::{Path, PathBuf};

use burn::tensor::{backend::Backend, Tensor, TensorData};
use grain_core::{Error, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::loss::argmax_rows;
use crate::persistence::{ModelFormat, SavedModel};

/// Largest tolerated absolute difference between probabilities
pub const TOLERANCE: f32 = 1e-6;
pub const PROBE_SAMPLES: usize = 4;
pub const PROBE_SEED: u64 = 42;

/// Outcome of a verified conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub source: PathBuf,
    pub source_format: ModelFormat,
    pub destination: PathBuf,
    pub target_format: ModelFormat,
    pub probe_samples: usize,
    pub max_abs_diff: f32,
}

impl std::fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) -> {} ({}), max |diff| over {} probe images: {:.2e}",
            self.source.display(),
            self.source_format,
            self.destination.display(),
            self.target_format,
            self.probe_samples,
            self.max_abs_diff
        )
    }
}

/// Seeded uniform [0, 1) images, `[samples, 3, image_size, image_size]`
pub fn probe_batch<B: Backend>(
    samples: usize,
    image_size: usize,
    seed: u64,
    device: &B::Device,
) -> Tensor<B, 4> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let values: Vec<f32> = (0..samples * 3 * image_size * image_size)
        .map(|_| rng.gen::<f32>())
        .collect();
    Tensor::from_data(TensorData::new(values, [samples, 3, image_size, image_size]), device)
}

/// Largest absolute probability difference between two models on `images`.
///
/// Fails when it exceeds [`TOLERANCE`] or any predicted class differs.
pub fn compare_predictions<B: Backend>(
    expected: &SavedModel<B>,
    actual: &SavedModel<B>,
    images: Tensor<B, 4>,
) -> Result<f32> {
    let to_vec = |t: Tensor<B, 2>| {
        t.into_data()
            .to_vec::<f32>()
            .map_err(|e| Error::Model(format!("Failed to read probabilities: {e:?}")))
    };
    let expected_probs = to_vec(expected.predict(images.clone()))?;
    let actual_probs = to_vec(actual.predict(images))?;

    if expected_probs.len() != actual_probs.len() {
        return Err(Error::Serialization(format!(
            "Converted model produced {} probabilities, expected {}",
            actual_probs.len(),
            expected_probs.len()
        )));
    }

    let max_abs_diff = expected_probs
        .iter()
        .zip(&actual_probs)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);

    let num_classes = expected.manifest.classifier.num_classes;
    let same_argmax =
        argmax_rows(&expected_probs, num_classes) == argmax_rows(&actual_probs, num_classes);
    if max_abs_diff > TOLERANCE || !same_argmax {
        return Err(Error::Serialization(format!(
            "Converted model predictions differ (max |diff| = {max_abs_diff:e})"
        )));
    }
    Ok(max_abs_diff)
}

/// Loads `source`, writes it to `destination` as `format`, reloads the
/// result and checks that both give the same predictions on a probe batch.
pub fn convert<B: Backend>(
    source: &Path,
    destination: &Path,
    format: ModelFormat,
    device: &B::Device,
) -> Result<ConversionReport> {
    let source_format = ModelFormat::detect(source)?;
    let target = format.resolve_path(destination);
    if target == source {
        return Err(Error::Config(format!(
            "Source and destination are the same: {}",
            source.display()
        )));
    }

    info!("Converting {} ({}) to {}", source.display(), source_format, format);
    let original = SavedModel::<B>::load(source, device)?;
    let destination = original.save(&target, format)?;
    let reloaded = SavedModel::<B>::load(&destination, device)?;

    if reloaded.manifest.class_names != original.manifest.class_names {
        return Err(Error::Serialization("Class names changed during conversion".to_string()));
    }

    let image_size = original.manifest.image_size();
    let images = probe_batch::<B>(PROBE_SAMPLES, image_size, PROBE_SEED, device);
    let max_abs_diff = compare_predictions(&original, &reloaded, images)?;

    Ok(ConversionReport {
        source: source.to_path_buf(),
        source_format,
        destination,
        target_format: format,
        probe_samples: PROBE_SAMPLES,
        max_abs_diff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::FeatureExtractorConfig;
    use crate::model::ClassifierConfig;
    use burn_ndarray::NdArray;
    use grain_core::ClassIndex;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn write_archive(dir: &Path) -> PathBuf {
        let extractor = FeatureExtractorConfig::new().with_width_multiplier(0.35);
        let config = ClassifierConfig::new(2, extractor).with_image_size(32);
        let model = config.init::<TestBackend>(&Default::default());
        let classes = ClassIndex::new(vec!["Arborio".to_string(), "Basmati".to_string()]);
        SavedModel::new(model, config, &classes)
            .save(&dir.join("rice.mpk"), ModelFormat::Archive)
            .unwrap()
    }

    #[test]
    fn test_probe_batch_is_seeded() {
        let device = Default::default();
        let a = probe_batch::<TestBackend>(2, 8, 1, &device).into_data();
        let b = probe_batch::<TestBackend>(2, 8, 1, &device).into_data();
        let c = probe_batch::<TestBackend>(2, 8, 2, &device).into_data();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_archive_to_bundle() {
        let temp_dir = TempDir::new().unwrap();
        let archive = write_archive(temp_dir.path());

        let report = convert::<TestBackend>(
            &archive,
            &temp_dir.path().join("rice_saved_model"),
            ModelFormat::Bundle,
            &Default::default(),
        )
        .unwrap();

        assert_eq!(report.source_format, ModelFormat::Archive);
        assert_eq!(report.target_format, ModelFormat::Bundle);
        assert!(report.destination.join("manifest.json").is_file());
        assert!(report.max_abs_diff <= TOLERANCE);
    }

    #[test]
    fn test_bundle_back_to_archive() {
        let temp_dir = TempDir::new().unwrap();
        let archive = write_archive(temp_dir.path());
        let bundle = temp_dir.path().join("bundle");
        convert::<TestBackend>(&archive, &bundle, ModelFormat::Bundle, &Default::default())
            .unwrap();

        let report = convert::<TestBackend>(
            &bundle,
            &temp_dir.path().join("copy"),
            ModelFormat::Archive,
            &Default::default(),
        )
        .unwrap();

        assert_eq!(report.destination, temp_dir.path().join("copy.mpk"));
        assert!(report.destination.is_file());
    }

    #[test]
    fn test_different_models_fail_comparison() {
        let device = Default::default();
        let extractor = FeatureExtractorConfig::new().with_width_multiplier(0.35);
        let config = ClassifierConfig::new(2, extractor).with_image_size(32);
        let classes = ClassIndex::new(vec!["Arborio".to_string(), "Basmati".to_string()]);
        let a = SavedModel::new(config.init::<TestBackend>(&device), config.clone(), &classes);
        let b = SavedModel::new(config.init::<TestBackend>(&device), config, &classes);

        let images = probe_batch::<TestBackend>(2, 32, PROBE_SEED, &device);
        assert!(matches!(
            compare_predictions(&a, &b, images),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_same_destination_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let archive = write_archive(temp_dir.path());

        let result =
            convert::<TestBackend>(&archive, &archive, ModelFormat::Archive, &Default::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
