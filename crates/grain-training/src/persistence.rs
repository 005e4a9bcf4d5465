//! On-disk model formats.
//!
//! - [`ModelFormat::Archive`]: one `.mpk` file (named MessagePack, full
//!   precision) holding the JSON manifest and the classifier record.
//! - [`ModelFormat::Bundle`]: a directory with `manifest.json` and
//!   `weights.bin` (binary record, full precision).
//!
//! Both carry a [`ModelManifest`] that is enough to rebuild the classifier
//! before its weights are loaded.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use burn::{
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder},
    tensor::{backend::Backend, Tensor},
};
use chrono::{DateTime, Utc};
use grain_core::{ClassIndex, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::extractor::ExtractorKind;
use crate::model::{Classifier, ClassifierConfig, ClassifierRecord};

pub const FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
/// Bundle weights file stem; the recorder appends `.bin`
pub const WEIGHTS_STEM: &str = "weights";

/// Supported artifact layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Archive,
    Bundle,
}

impl ModelFormat {
    /// A directory is a bundle, an `.mpk` file is an archive
    pub fn detect(path: &Path) -> Result<Self> {
        if path.is_dir() {
            if path.join(MANIFEST_FILE).is_file() {
                Ok(ModelFormat::Bundle)
            } else {
                Err(Error::Serialization(format!(
                    "{} is a directory without {MANIFEST_FILE}",
                    path.display()
                )))
            }
        } else if path.is_file() {
            if path.extension().is_some_and(|ext| ext == "mpk") {
                Ok(ModelFormat::Archive)
            } else {
                Err(Error::Serialization(format!(
                    "{} is not a model archive (archives end in .mpk)",
                    path.display()
                )))
            }
        } else {
            Err(Error::Serialization(format!("No saved model at {}", path.display())))
        }
    }

    /// Where a model saved at `path` actually lands
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match self {
            ModelFormat::Archive => path.with_extension("mpk"),
            ModelFormat::Bundle => path.to_path_buf(),
        }
    }
}

impl FromStr for ModelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "archive" | "a" | "mpk" => Ok(ModelFormat::Archive),
            "bundle" | "b" | "dir" => Ok(ModelFormat::Bundle),
            other => Err(Error::Config(format!(
                "Unknown model format '{other}' (archive, bundle)"
            ))),
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFormat::Archive => write!(f, "archive"),
            ModelFormat::Bundle => write!(f, "bundle"),
        }
    }
}

/// Resolves component names stored in manifests
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    components: Vec<ExtractorKind>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self {
            components: ExtractorKind::ALL.to_vec(),
        }
    }
}

impl ComponentRegistry {
    pub fn names(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.as_str()).collect()
    }

    pub fn resolve(&self, name: &str) -> Result<ExtractorKind> {
        self.components
            .iter()
            .copied()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| {
                Error::Serialization(format!(
                    "Unknown component '{name}' (registered: {})",
                    self.names().join(", ")
                ))
            })
    }
}

/// Everything needed to rebuild a classifier before loading its weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    /// Registered extractor component name
    pub extractor: String,
    pub classifier: ClassifierConfig,
    pub class_names: Vec<String>,
}

impl ModelManifest {
    pub fn new(classifier: ClassifierConfig, classes: &ClassIndex) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            extractor: ExtractorKind::MobileNetV2.to_string(),
            classifier,
            class_names: classes.names().to_vec(),
        }
    }

    pub fn image_size(&self) -> usize {
        self.classifier.image_size
    }

    pub fn class_index(&self) -> ClassIndex {
        ClassIndex::new(self.class_names.clone())
    }

    /// Checks the version, the component name and the class count
    pub fn validate(&self, registry: &ComponentRegistry) -> Result<ExtractorKind> {
        if self.format_version != FORMAT_VERSION {
            return Err(Error::Serialization(format!(
                "Unsupported format version {} (expected {FORMAT_VERSION})",
                self.format_version
            )));
        }
        let kind = registry.resolve(&self.extractor)?;
        if self.class_names.len() != self.classifier.num_classes {
            return Err(Error::Serialization(format!(
                "Manifest lists {} class names for {} outputs",
                self.class_names.len(),
                self.classifier.num_classes
            )));
        }
        Ok(kind)
    }

    fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Serialization(format!("Invalid manifest: {e}")))
    }
}

/// Record stored in an archive file
#[derive(Record)]
pub struct ArchiveRecord<B: Backend> {
    pub manifest: String,
    pub model: ClassifierRecord<B>,
}

/// A classifier together with its manifest
#[derive(Debug, Clone)]
pub struct SavedModel<B: Backend> {
    pub manifest: ModelManifest,
    pub model: Classifier<B>,
}

impl<B: Backend> SavedModel<B> {
    pub fn new(model: Classifier<B>, config: ClassifierConfig, classes: &ClassIndex) -> Self {
        Self {
            manifest: ModelManifest::new(config, classes),
            model,
        }
    }

    pub fn class_index(&self) -> ClassIndex {
        self.manifest.class_index()
    }

    /// Class probabilities for a `[N, 3, H, W]` batch
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.model.forward(images)
    }

    /// Saves under `format`, returning the path actually written
    pub fn save(&self, path: &Path, format: ModelFormat) -> Result<PathBuf> {
        let target = format.resolve_path(path);
        match format {
            ModelFormat::Archive => self.save_archive(&target)?,
            ModelFormat::Bundle => self.save_bundle(&target)?,
        }
        info!("Saved {} model to {}", format, target.display());
        Ok(target)
    }

    /// Loads either format, detected from the path
    pub fn load(path: &Path, device: &B::Device) -> Result<Self> {
        let registry = ComponentRegistry::default();
        let saved = match ModelFormat::detect(path)? {
            ModelFormat::Archive => Self::load_archive(path, &registry, device)?,
            ModelFormat::Bundle => Self::load_bundle(path, &registry, device)?,
        };
        saved.check_shapes(device)?;
        debug!(
            "Loaded model with {} classes from {}",
            saved.manifest.class_names.len(),
            path.display()
        );
        Ok(saved)
    }

    fn save_archive(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let record = ArchiveRecord {
            manifest: serde_json::to_string(&self.manifest)?,
            model: self.model.clone().into_record(),
        };
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        Recorder::<B>::record(&recorder, record, path.to_path_buf())
            .map_err(|e| {
                Error::Serialization(format!("Failed to write {}: {e:?}", path.display()))
            })?;
        Ok(())
    }

    fn save_bundle(&self, dir: &Path) -> Result<()> {
        if dir.is_file() {
            return Err(Error::Serialization(format!(
                "Cannot write a bundle over the file {}",
                dir.display()
            )));
        }
        fs::create_dir_all(dir)?;
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&self.manifest)?)?;

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(dir.join(WEIGHTS_STEM), &recorder)
            .map_err(|e| {
                Error::Serialization(format!(
                    "Failed to write weights in {}: {e:?}",
                    dir.display()
                ))
            })?;
        Ok(())
    }

    fn load_archive(path: &Path, registry: &ComponentRegistry, device: &B::Device) -> Result<Self> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let record: ArchiveRecord<B> = Recorder::<B>::load(&recorder, path.to_path_buf(), device)
            .map_err(|e| {
                Error::Serialization(format!("Failed to read {}: {e:?}", path.display()))
            })?;

        let manifest = ModelManifest::from_json(&record.manifest)?;
        manifest.validate(registry)?;
        let model = manifest.classifier.init::<B>(device).load_record(record.model);

        Ok(Self { manifest, model })
    }

    fn load_bundle(dir: &Path, registry: &ComponentRegistry, device: &B::Device) -> Result<Self> {
        let manifest = ModelManifest::from_json(&fs::read_to_string(dir.join(MANIFEST_FILE))?)?;
        manifest.validate(registry)?;

        let weights = dir.join(WEIGHTS_STEM).with_extension("bin");
        if !weights.is_file() {
            return Err(Error::Serialization(format!("Missing weights file {}", weights.display())));
        }

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let model = manifest
            .classifier
            .init::<B>(device)
            .load_file(dir.join(WEIGHTS_STEM), &recorder, device)
            .map_err(|e| {
                Error::Serialization(format!(
                    "Failed to read weights in {}: {e:?}",
                    dir.display()
                ))
            })?;

        Ok(Self { manifest, model })
    }

    /// Compares the loaded weights with a classifier freshly built from the manifest
    fn check_shapes(&self, device: &B::Device) -> Result<()> {
        let expected = self.manifest.classifier.init::<B>(device);

        if let Some(mismatch) = self
            .model
            .extractor
            .layout_mismatch(&expected.extractor.conv_shapes())
        {
            return Err(Error::Serialization(format!(
                "Extractor weights do not match the manifest (width multiplier {}): {mismatch}",
                self.manifest.classifier.extractor.width_multiplier
            )));
        }

        let [d_input, d_output] = self.model.head.weight.val().dims();
        let [expected_input, expected_output] = expected.head.weight.val().dims();
        if d_input != expected_input || d_output != expected_output {
            return Err(Error::Serialization(format!(
                "Weights have shape [{d_input}, {d_output}] \
                 but the manifest describes [{expected_input}, {expected_output}]"
            )));
        }

        if self.model.num_params() != expected.num_params() {
            return Err(Error::Serialization(format!(
                "Weights hold {} parameters but the manifest describes {}",
                self.model.num_params(),
                expected.num_params()
            )));
        }
        Ok(())
    }
}
