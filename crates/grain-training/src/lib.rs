//! Model assembly, training, evaluation and persistence for grain classification.
//!
//! This crate provides:
//! - A MobileNetV2 feature extractor and retrieval of its pretrained weights
//! - The frozen-extractor + dense softmax classifier
//! - The training loop, evaluation and classification reports
//! - SVG/PNG/JSON run artefacts
//! - Two model formats and a verified converter between them

pub mod convert;
pub mod evaluator;
pub mod extractor;
pub mod hub;
pub mod loss;
pub mod model;
pub mod persistence;
pub mod pipeline;
pub mod reporting;
pub mod trainer;

#[cfg(test)]
mod testing;

pub use convert::{convert, ConversionReport};
pub use evaluator::{EvaluationSummary, Evaluator, Predictions};
pub use extractor::{ExtractorKind, FeatureExtractor, FeatureExtractorConfig};
pub use hub::{ExtractorReference, PretrainedHub};
pub use model::{Classifier, ClassifierConfig, ModelSummary};
pub use persistence::{ComponentRegistry, ModelFormat, ModelManifest, SavedModel};
pub use pipeline::{export_extractor, Pipeline, PipelineOutcome};
pub use reporting::{save_history_charts, save_sample_grid};
pub use trainer::Trainer;
