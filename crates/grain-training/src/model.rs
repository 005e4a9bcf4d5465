//! Classifier assembly: a frozen pretrained feature extractor followed by a
//! trainable dense softmax layer.

use std::fmt;

use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::extractor::{ExtractorKind, FeatureExtractor, FeatureExtractorConfig};

/// Configuration needed to rebuild a classifier before loading its weights
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Feature extractor settings
    pub extractor: FeatureExtractorConfig,

    /// Square input edge length in pixels
    #[config(default = "224")]
    pub image_size: usize,
}

impl ClassifierConfig {
    /// Randomly initialized classifier, used as the target when loading records
    pub fn init<B: Backend>(&self, device: &B::Device) -> Classifier<B> {
        Classifier {
            extractor: self.extractor.init(device),
            head: LinearConfig::new(self.extractor.feature_dim(), self.num_classes).init(device),
        }
    }

    /// Stacks a pretrained extractor, frozen, under a fresh dense head
    pub fn assemble<B: Backend>(
        &self,
        extractor: FeatureExtractor<B>,
        device: &B::Device,
    ) -> Classifier<B> {
        let head = LinearConfig::new(extractor.feature_dim(), self.num_classes).init(device);
        Classifier {
            extractor: extractor.no_grad(),
            head,
        }
    }
}

/// Image classifier producing class probabilities
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    pub extractor: FeatureExtractor<B>,
    pub head: Linear<B>,
}

impl<B: Backend> Classifier<B> {
    /// Pooled extractor features [batch_size, feature_dim]
    pub fn features(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.extractor.forward(images)
    }

    /// Unnormalized class scores [batch_size, num_classes]
    pub fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.features(images))
    }

    /// Class probabilities [batch_size, num_classes], each row summing to 1
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.logits(images), 1)
    }

    pub fn num_classes(&self) -> usize {
        let [_, d_output] = self.head.weight.val().dims();
        d_output
    }

    pub fn feature_dim(&self) -> usize {
        self.extractor.feature_dim()
    }

    pub fn summary(&self) -> ModelSummary {
        let frozen_params = self.extractor.num_params();
        let trainable_params = self.head.num_params();
        ModelSummary {
            extractor: ExtractorKind::MobileNetV2.to_string(),
            feature_dim: self.feature_dim(),
            num_classes: self.num_classes(),
            total_params: frozen_params + trainable_params,
            trainable_params,
            frozen_params,
        }
    }
}

/// Layer overview with parameter counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub extractor: String,
    pub feature_dim: usize,
    pub num_classes: usize,
    pub total_params: usize,
    pub trainable_params: usize,
    pub frozen_params: usize,
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<24} {:<18} {:>12}", "Layer", "Output Shape", "Param #")?;
        writeln!(f, "{}", "=".repeat(56))?;
        writeln!(
            f,
            "{:<24} {:<18} {:>12}",
            format!("{} (frozen)", self.extractor),
            format!("(None, {})", self.feature_dim),
            self.frozen_params
        )?;
        writeln!(
            f,
            "{:<24} {:<18} {:>12}",
            "dense (softmax)",
            format!("(None, {})", self.num_classes),
            self.trainable_params
        )?;
        writeln!(f, "{}", "=".repeat(56))?;
        writeln!(f, "Total params: {}", self.total_params)?;
        writeln!(f, "Trainable params: {}", self.trainable_params)?;
        write!(f, "Non-trainable params: {}", self.frozen_params)
    }
}
