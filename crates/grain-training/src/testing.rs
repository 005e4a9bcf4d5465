//! Fixtures shared by the unit tests of this crate.

use std::fs;
use std::path::{Path, PathBuf};

use grain_core::{DataConfig, OutputConfig, PipelineConfig};
use image::{Rgb, RgbImage};

/// Writes `<parent>/<name>/<class>/<class>_<i>.png`, each class in its own colour
pub fn write_class_tree(parent: &Path, name: &str, classes: &[&str], per_class: usize) -> PathBuf {
    let root = parent.join(name);
    for (label, class) in classes.iter().enumerate() {
        let dir = root.join(class);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let base = (40 + label * 160).min(255) as u8;
            let image = RgbImage::from_fn(16, 16, |x, y| {
                let jitter = ((x + y + i as u32) % 8) as u8;
                Rgb([base.saturating_add(jitter), 96, 255 - base])
            });
            image.save(dir.join(format!("{class}_{i:03}.png"))).unwrap();
        }
    }
    root
}

/// Small images and batches so the tests stay fast
pub fn small_data_config(train_dir: &Path, test_dir: &Path) -> DataConfig {
    DataConfig {
        train_dir: train_dir.to_path_buf(),
        test_dir: test_dir.to_path_buf(),
        image_size: 32,
        batch_size: 4,
        ..DataConfig::default()
    }
}

/// Full pipeline configuration rooted in `dir`
pub fn small_pipeline_config(
    dir: &Path,
    train_dir: &Path,
    test_dir: &Path,
    extractor: &Path,
) -> PipelineConfig {
    let mut config = PipelineConfig {
        data: small_data_config(train_dir, test_dir),
        output: OutputConfig {
            output_dir: dir.join("output"),
            model_path: dir.join("rice.mpk"),
            cache_dir: dir.join("cache"),
        },
        ..PipelineConfig::default()
    };
    config.model.width_multiplier = 0.35;
    config.model.extractor_source = extractor.display().to_string();
    config.training.epochs = 2;
    config
}
