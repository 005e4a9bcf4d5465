//! MobileNetV2 feature extractor.
//!
//! Produces a pooled feature vector per image: stem convolution, seventeen
//! inverted-residual blocks, a 1x1 expansion to the last channel width and
//! global average pooling. No classification layer is included.
//!
//! Architecture (width multiplier 1.0, 224x224 input):
//! - Stem: Conv 3x3, stride 2, 32 filters
//! - Inverted residual stages (expansion, channels, repeats, stride):
//!   (1,16,1,1) (6,24,2,2) (6,32,3,2) (6,64,4,2) (6,96,3,1) (6,160,3,2) (6,320,1,1)
//! - Head: Conv 1x1 to 1280, global average pooling

use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{backend::Backend, Tensor},
};
use grain_core::Error;

/// (expansion, output channels, repeats, first stride)
const INVERTED_RESIDUAL_SETTINGS: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

/// Feature extractor architectures that saved models may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    MobileNetV2,
}

impl ExtractorKind {
    pub const ALL: [ExtractorKind; 1] = [ExtractorKind::MobileNetV2];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorKind::MobileNetV2 => "mobilenet_v2",
        }
    }
}

impl std::fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the MobileNetV2 feature extractor
#[derive(Config, Debug, PartialEq)]
pub struct FeatureExtractorConfig {
    /// Width multiplier (alpha) applied to every layer's channel count
    #[config(default = "1.0")]
    pub width_multiplier: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,
}

/// Rounds a channel count to a multiple of 8 without losing more than 10%
fn make_divisible(value: f64, divisor: usize) -> usize {
    let divisor_f = divisor as f64;
    let rounded = ((value + divisor_f / 2.0) / divisor_f).floor() as usize * divisor;
    let mut channels = rounded.max(divisor);
    if (channels as f64) < 0.9 * value {
        channels += divisor;
    }
    channels
}

impl FeatureExtractorConfig {
    /// Channels after the stem convolution
    pub fn stem_channels(&self) -> usize {
        make_divisible(32.0 * self.width_multiplier, 8)
    }

    /// Length of the produced feature vector
    pub fn feature_dim(&self) -> usize {
        make_divisible(1280.0 * self.width_multiplier.max(1.0), 8)
    }

    /// Initialize a randomly weighted extractor
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureExtractor<B> {
        let stem_channels = self.stem_channels();
        let stem = ConvBn::new(self.in_channels, stem_channels, 3, 2, 1, true, device);

        let mut blocks = Vec::new();
        let mut in_channels = stem_channels;
        for (expansion, channels, repeats, stride) in INVERTED_RESIDUAL_SETTINGS {
            let out_channels = make_divisible(channels as f64 * self.width_multiplier, 8);
            for i in 0..repeats {
                let stride = if i == 0 { stride } else { 1 };
                blocks.push(InvertedResidual::new(
                    in_channels,
                    out_channels,
                    stride,
                    expansion,
                    device,
                ));
                in_channels = out_channels;
            }
        }

        let head = ConvBn::new(in_channels, self.feature_dim(), 1, 1, 0, true, device);
        let pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        FeatureExtractor {
            stem,
            blocks,
            head,
            pool,
            feature_dim: self.feature_dim(),
        }
    }

    /// Loads pretrained weights from a full-precision named MessagePack record
    pub fn load_pretrained<B: Backend>(
        &self,
        path: &Path,
        device: &B::Device,
    ) -> grain_core::Result<FeatureExtractor<B>> {
        if !path.is_file() {
            return Err(Error::Retrieval(format!(
                "Pretrained extractor not found: {}",
                path.display()
            )));
        }

        let template = self.init::<B>(device);
        let expected = template.conv_shapes();
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let extractor = template
            .load_file(path.to_path_buf(), &recorder, device)
            .map_err(|e| {
                Error::Retrieval(format!(
                    "Failed to load pretrained extractor {}: {e:?}",
                    path.display()
                ))
            })?;

        if let Some(mismatch) = extractor.layout_mismatch(&expected) {
            return Err(Error::Retrieval(format!(
                "Pretrained extractor {} does not match width multiplier {}: {mismatch}",
                path.display(),
                self.width_multiplier
            )));
        }
        Ok(extractor)
    }
}

/// Convolution, batch norm and optional ReLU6
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    relu6: bool,
}

impl<B: Backend> ConvBn<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        relu6: bool,
        device: &B::Device,
    ) -> Self {
        Self::grouped(in_channels, out_channels, kernel_size, stride, padding, 1, relu6, device)
    }

    #[allow(clippy::too_many_arguments)]
    fn grouped(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        groups: usize,
        relu6: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn, relu6 }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        if self.relu6 {
            x.clamp(0.0, 6.0)
        } else {
            x
        }
    }
}

/// Expansion 1x1, depthwise 3x3, linear projection 1x1, with a skip
/// connection when the shape is preserved
#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    pub expand: Option<ConvBn<B>>,
    pub depthwise: ConvBn<B>,
    pub project: ConvBn<B>,
    use_residual: bool,
}

impl<B: Backend> InvertedResidual<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        expansion: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expansion;
        let expand =
            (expansion != 1).then(|| ConvBn::new(in_channels, hidden, 1, 1, 0, true, device));
        let depthwise = ConvBn::grouped(hidden, hidden, 3, stride, 1, hidden, true, device);
        let project = ConvBn::new(hidden, out_channels, 1, 1, 0, false, device);

        Self {
            expand,
            depthwise,
            project,
            use_residual: stride == 1 && in_channels == out_channels,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => expand.forward(input.clone()),
            None => input.clone(),
        };
        let x = self.depthwise.forward(x);
        let x = self.project.forward(x);

        if self.use_residual {
            x + input
        } else {
            x
        }
    }
}

/// MobileNetV2 backbone returning `[batch, feature_dim]` feature vectors
#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    pub stem: ConvBn<B>,
    pub blocks: Vec<InvertedResidual<B>>,
    pub head: ConvBn<B>,
    pub pool: AdaptiveAvgPool2d,
    feature_dim: usize,
}

impl<B: Backend> FeatureExtractor<B> {
    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width], values in [0, 1]
    ///
    /// # Returns
    /// * Feature tensor of shape [batch_size, feature_dim]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.head.forward(x);
        let x = self.pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Writes the weights as a full-precision named MessagePack record
    pub fn save_pretrained(&self, path: &Path) -> grain_core::Result<PathBuf> {
        let path = path.with_extension("mpk");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.clone()
            .save_file(path.clone(), &recorder)
            .map_err(|e| {
                Error::Serialization(format!("Failed to save extractor {}: {e:?}", path.display()))
            })?;
        Ok(path)
    }

    /// Convolution weight shapes `[out, in / groups, k, k]` in layer order
    pub fn conv_shapes(&self) -> Vec<[usize; 4]> {
        let mut shapes = vec![self.stem.conv.weight.val().dims()];
        for block in &self.blocks {
            if let Some(expand) = &block.expand {
                shapes.push(expand.conv.weight.val().dims());
            }
            shapes.push(block.depthwise.conv.weight.val().dims());
            shapes.push(block.project.conv.weight.val().dims());
        }
        shapes.push(self.head.conv.weight.val().dims());
        shapes
    }

    /// Describes the first convolution whose loaded shape differs from `expected`
    pub fn layout_mismatch(&self, expected: &[[usize; 4]]) -> Option<String> {
        let actual = self.conv_shapes();
        if actual.len() != expected.len() {
            return Some(format!("{} convolutions, expected {}", actual.len(), expected.len()));
        }
        actual
            .iter()
            .zip(expected)
            .position(|(a, e)| a != e)
            .map(|layer| {
                format!(
                    "layer {layer} has shape {:?}, expected {:?}",
                    actual[layer], expected[layer]
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn small() -> FeatureExtractorConfig {
        FeatureExtractorConfig::new().with_width_multiplier(0.35)
    }

    #[test]
    fn test_make_divisible() {
        assert_eq!(make_divisible(32.0, 8), 32);
        assert_eq!(make_divisible(11.2, 8), 16);
        assert_eq!(make_divisible(5.6, 8), 8);
        assert_eq!(make_divisible(1280.0, 8), 1280);
    }

    #[test]
    fn test_feature_dims() {
        assert_eq!(FeatureExtractorConfig::new().feature_dim(), 1280);
        assert_eq!(small().feature_dim(), 1280);
        assert_eq!(FeatureExtractorConfig::new().with_width_multiplier(1.4).feature_dim(), 1792);
        assert_eq!(small().stem_channels(), 16);
    }

    #[test]
    fn test_block_count() {
        let device = Default::default();
        let extractor = small().init::<TestBackend>(&device);
        assert_eq!(extractor.blocks.len(), 17);
        assert!(extractor.blocks[0].expand.is_none());
        assert!(extractor.blocks[1].expand.is_some());
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let extractor = small().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let features = extractor.forward(input);

        assert_eq!(features.dims(), [2, 1280]);
    }

    #[test]
    fn test_save_and_load_pretrained() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let extractor = small().init::<TestBackend>(&device);

        let path = extractor.save_pretrained(&temp_dir.path().join("mobilenet")).unwrap();
        assert_eq!(path.extension().unwrap(), "mpk");

        let loaded = small().load_pretrained::<TestBackend>(&path, &device).unwrap();
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let expected = extractor.forward(input.clone()).into_data();
        let actual = loaded.forward(input).into_data();
        expected.assert_approx_eq(&actual, 5);
    }

    #[test]
    fn test_load_pretrained_rejects_other_width() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let path = small()
            .init::<TestBackend>(&device)
            .save_pretrained(&temp_dir.path().join("mobilenet"))
            .unwrap();

        // 0.35 and 0.5 both end in a 1280-channel head
        let wider = FeatureExtractorConfig::new().with_width_multiplier(0.5);
        assert_eq!(wider.feature_dim(), small().feature_dim());
        let result = wider.load_pretrained::<TestBackend>(&path, &device);
        assert!(matches!(result, Err(Error::Retrieval(_))));
    }

    #[test]
    fn test_load_missing_is_retrieval_error() {
        let device = Default::default();
        let missing = Path::new("/nonexistent/mobilenet.mpk");
        let result = small().load_pretrained::<TestBackend>(missing, &device);
        assert!(matches!(result, Err(Error::Retrieval(_))));
    }

    #[test]
    fn test_extractor_kind_name() {
        assert_eq!(ExtractorKind::MobileNetV2.to_string(), "mobilenet_v2");
    }
}
