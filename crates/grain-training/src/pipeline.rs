//! End-to-end training run: data loaders, model assembly, optimization,
//! evaluation, reporting and persistence.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use grain_core::{
    save_toml_config, ClassificationReport, Error, PipelineConfig, Result, TrainingHistory,
};
use grain_dataset::FolderLoader;
use serde::Serialize;
use tracing::info;

use crate::evaluator::{EvaluationSummary, Evaluator};
use crate::extractor::FeatureExtractorConfig;
use crate::hub::{ExtractorReference, PretrainedHub};
use crate::model::{ClassifierConfig, ModelSummary};
use crate::persistence::{ComponentRegistry, ModelFormat, SavedModel};
use crate::reporting::{save_history_charts, save_json, save_sample_grid};
use crate::trainer::Trainer;

/// Results of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub summary: ModelSummary,
    pub history: TrainingHistory,
    pub validation: EvaluationSummary,
    pub test: EvaluationSummary,
    pub report: ClassificationReport,
    pub model_path: PathBuf,
    pub artifacts: Vec<PathBuf>,
}

/// Validated configuration ready to run
pub struct Pipeline {
    config: PipelineConfig,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        ComponentRegistry::default()
            .resolve(&config.model.extractor)
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            config,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run<B: AutodiffBackend>(&self, device: &B::Device) -> Result<PipelineOutcome> {
        let config = &self.config;
        let data = &config.data;
        let output_dir = &config.output.output_dir;

        // 1. Data loaders
        let loader = FolderLoader::new(data.clone(), config.seed)?;
        let (mut train, mut validation) = loader.split_generators(&data.train_dir)?;
        let mut test = loader.test_generator(&data.test_dir, train.class_index())?;
        let class_index = train.class_index().clone();

        if let Some(expected) = config.model.num_classes {
            if expected != class_index.len() {
                return Err(Error::Config(format!(
                    "Configured {expected} classes but {} contains {}: {:?}",
                    data.train_dir.display(),
                    class_index.len(),
                    class_index.names()
                )));
            }
        }
        info!(
            "Found {} train, {} validation and {} test images in {} classes",
            train.len(),
            validation.len(),
            test.len(),
            class_index.len()
        );

        // 2. Model assembly
        let hub = PretrainedHub::new(&config.output.cache_dir);
        let weights = hub.fetch(&ExtractorReference::parse(&config.model.extractor_source))?;
        let extractor_config =
            FeatureExtractorConfig::new().with_width_multiplier(config.model.width_multiplier);
        let extractor = extractor_config.load_pretrained::<B>(&weights, device)?;

        let classifier_config = ClassifierConfig::new(class_index.len(), extractor_config)
            .with_image_size(data.image_size);
        let model = classifier_config.assemble(extractor, device);
        let summary = model.summary();
        info!("Model assembled\n{}", summary);

        // 3. Optimization loop
        let trainer = Trainer::<B>::new(config.training.clone(), device.clone())
            .with_progress(self.show_progress);
        let (model, history) = trainer.fit(model, &mut train, &mut validation)?;

        // 4. Evaluation
        let model = model.valid();
        let evaluator = Evaluator::<B::InnerBackend>::new(device.clone());

        let validation_summary = evaluator.evaluate(&model, &mut validation)?;
        info!("Validation Accuracy: {:.2}%", validation_summary.accuracy * 100.0);

        let (test_summary, predictions) = evaluator.evaluate_with_predictions(&model, &mut test)?;
        info!("Test Accuracy: {:.2}%", test_summary.accuracy * 100.0);
        let report = predictions.report(&class_index)?;

        // 5. Reporting
        fs::create_dir_all(output_dir)?;
        let mut artifacts = Vec::new();

        let charts = save_history_charts(&history, output_dir)?;
        artifacts.push(charts.accuracy);
        artifacts.push(charts.loss);

        train.reset();
        let first_batch = train.next_batch()?;
        artifacts.push(save_sample_grid(
            &first_batch,
            &class_index,
            data.image_size,
            data.rescale,
            output_dir,
        )?);

        let history_path = output_dir.join("history.json");
        history.save_json(&history_path)?;
        artifacts.push(history_path);

        let report_path = output_dir.join("classification_report.json");
        report.save_json(&report_path)?;
        artifacts.push(report_path);

        let evaluation_path = output_dir.join("evaluation.json");
        save_json(&[validation_summary, test_summary], &evaluation_path)?;
        artifacts.push(evaluation_path);

        let config_path = output_dir.join("config.toml");
        save_toml_config(config, &config_path)?;
        artifacts.push(config_path);

        // 6. Persistence
        let model_path = SavedModel::new(model, classifier_config, &class_index)
            .save(&config.output.model_path, ModelFormat::Archive)?;

        Ok(PipelineOutcome {
            summary,
            history,
            validation: validation_summary,
            test: test_summary,
            report,
            model_path,
            artifacts,
        })
    }
}

/// Writes a freshly initialized extractor record usable as `extractor_source`
pub fn export_extractor<B: Backend>(
    width_multiplier: f64,
    path: &Path,
    device: &B::Device,
) -> Result<PathBuf> {
    let config = FeatureExtractorConfig::new().with_width_multiplier(width_multiplier);
    let path = config.init::<B>(device).save_pretrained(path)?;
    info!(
        "Exported MobileNetV2 extractor (alpha {}, {} features) to {}",
        width_multiplier,
        config.feature_dim(),
        path.display()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{small_pipeline_config, write_class_tree};
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn fixture(temp_dir: &TempDir) -> PipelineConfig {
        let train = write_class_tree(temp_dir.path(), "train", &["Arborio", "Basmati"], 10);
        let test = write_class_tree(temp_dir.path(), "test", &["Arborio", "Basmati"], 4);
        let extractor = temp_dir.path().join("mobilenet");
        let extractor = export_extractor::<NdArray>(0.35, &extractor, &Default::default()).unwrap();
        small_pipeline_config(temp_dir.path(), &train, &test, &extractor)
    }

    #[test]
    fn test_full_run() {
        let temp_dir = TempDir::new().unwrap();
        let config = fixture(&temp_dir);

        let outcome = Pipeline::new(config.clone())
            .unwrap()
            .run::<TestBackend>(&Default::default())
            .unwrap();

        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.validation.samples, 4);
        assert_eq!(outcome.test.samples, 8);
        assert_eq!(outcome.report.total_support(), 8);
        assert_eq!(outcome.report.class("Arborio").unwrap().support, 4);
        assert_eq!(outcome.summary.trainable_params, 1280 * 2 + 2);

        for artifact in &outcome.artifacts {
            assert!(artifact.exists(), "missing {}", artifact.display());
        }
        let output_dir = &config.output.output_dir;
        assert!(output_dir.join("accuracy.svg").is_file());
        assert!(output_dir.join("loss.svg").is_file());
        assert!(output_dir.join("samples.svg").is_file());
        assert!(output_dir.join("samples/sample_3.png").is_file());

        let saved = SavedModel::<NdArray>::load(&outcome.model_path, &Default::default()).unwrap();
        assert_eq!(saved.manifest.class_names, vec!["Arborio", "Basmati"]);
        assert_eq!(saved.manifest.image_size(), 32);
    }

    #[test]
    fn test_missing_pretrained_extractor() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = fixture(&temp_dir);
        config.model.extractor_source = temp_dir.path().join("absent.mpk").display().to_string();

        let result = Pipeline::new(config).unwrap().run::<TestBackend>(&Default::default());
        assert!(matches!(result, Err(Error::Retrieval(_))));
    }

    #[test]
    fn test_test_classes_must_match() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = fixture(&temp_dir);
        config.data.test_dir =
            write_class_tree(temp_dir.path(), "other", &["Arborio", "Jasmine"], 2);

        let result = Pipeline::new(config).unwrap().run::<TestBackend>(&Default::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_configured_class_count_must_match() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = fixture(&temp_dir);
        config.model.num_classes = Some(5);

        let result = Pipeline::new(config).unwrap().run::<TestBackend>(&Default::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_extractor_name() {
        let mut config = PipelineConfig::default();
        config.model.extractor = "resnet50".to_string();
        assert!(matches!(Pipeline::new(config), Err(Error::Config(_))));
    }
}
