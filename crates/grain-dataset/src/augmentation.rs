//! Pluggable augmentation policies.
//!
//! A policy transforms a decoded image before it is resized and rescaled.
//! The reference configuration uses [`NoAugmentation`]; [`RandomAugmentation`]
//! draws flips, quarter-turn rotations, brightness and zoom from an
//! [`AugmentationConfig`].

use grain_core::AugmentationConfig;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Transform applied to every image a generator loads
pub trait AugmentationPolicy: Send + Sync {
    fn apply(&self, image: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage;

    /// Short name for logging
    fn name(&self) -> &str;
}

/// Identity policy: images are only rescaled by the preprocessor
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAugmentation;

impl AugmentationPolicy for NoAugmentation {
    fn apply(&self, image: DynamicImage, _rng: &mut ChaCha8Rng) -> DynamicImage {
        image
    }

    fn name(&self) -> &str {
        "rescale-only"
    }
}

/// Random transforms driven by an [`AugmentationConfig`]
#[derive(Debug, Clone)]
pub struct RandomAugmentation {
    config: AugmentationConfig,
}

impl RandomAugmentation {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Rotates by the quarter turn nearest to `angle` degrees
    fn rotate(image: DynamicImage, angle: f32) -> DynamicImage {
        let quarter_turns = (angle / 90.0).round() as i32;
        match quarter_turns.rem_euclid(4) {
            1 => image.rotate90(),
            2 => image.rotate180(),
            3 => image.rotate270(),
            _ => image,
        }
    }

    fn adjust_brightness(image: &DynamicImage, factor: f32) -> DynamicImage {
        let rgb = image.to_rgb8();
        let adjusted = ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
            let pixel = rgb.get_pixel(x, y);
            Rgb([
                (pixel[0] as f32 * factor).clamp(0.0, 255.0) as u8,
                (pixel[1] as f32 * factor).clamp(0.0, 255.0) as u8,
                (pixel[2] as f32 * factor).clamp(0.0, 255.0) as u8,
            ])
        });
        DynamicImage::ImageRgb8(adjusted)
    }

    /// Zoom in (factor > 1) by cropping a random window and resizing it back
    fn zoom(image: DynamicImage, factor: f32, rng: &mut ChaCha8Rng) -> DynamicImage {
        if factor <= 1.0 {
            return image;
        }
        let (width, height) = image.dimensions();
        let crop_width = ((width as f32 / factor) as u32).max(1);
        let crop_height = ((height as f32 / factor) as u32).max(1);

        let x = rng.gen_range(0..=(width - crop_width));
        let y = rng.gen_range(0..=(height - crop_height));

        image
            .crop_imm(x, y, crop_width, crop_height)
            .resize_exact(width, height, image::imageops::FilterType::Triangle)
    }
}

impl AugmentationPolicy for RandomAugmentation {
    fn apply(&self, image: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let mut augmented = image;

        if self.config.horizontal_flip && rng.gen_bool(0.5) {
            augmented = augmented.fliph();
        }

        if self.config.vertical_flip && rng.gen_bool(0.5) {
            augmented = augmented.flipv();
        }

        if self.config.rotation_range > 0.0 {
            let angle = rng.gen_range(-self.config.rotation_range..=self.config.rotation_range);
            augmented = Self::rotate(augmented, angle);
        }

        let (lo, hi) = self.config.brightness_range;
        if lo != hi {
            let factor = rng.gen_range(lo..=hi);
            augmented = Self::adjust_brightness(&augmented, factor);
        }

        let (lo, hi) = self.config.zoom_range;
        if lo != hi {
            let factor = rng.gen_range(lo..=hi);
            augmented = Self::zoom(augmented, factor, rng);
        }

        augmented
    }

    fn name(&self) -> &str {
        "random"
    }
}

/// Builds the policy described by a config
pub fn policy_from_config(config: &AugmentationConfig) -> Arc<dyn AugmentationPolicy> {
    if config.is_identity() {
        Arc::new(NoAugmentation)
    } else {
        Arc::new(RandomAugmentation::new(config.clone()))
    }
}

/// Named augmentation presets
pub struct AugmentationPresets;

impl AugmentationPresets {
    /// Rescale only
    pub fn none() -> AugmentationConfig {
        AugmentationConfig::default()
    }

    /// Flips and mild brightness changes; grains have no canonical orientation
    pub fn light() -> AugmentationConfig {
        AugmentationConfig {
            horizontal_flip: true,
            vertical_flip: true,
            rotation_range: 0.0,
            brightness_range: (0.9, 1.1),
            zoom_range: (1.0, 1.0),
        }
    }

    pub fn medium() -> AugmentationConfig {
        AugmentationConfig {
            horizontal_flip: true,
            vertical_flip: true,
            rotation_range: 90.0,
            brightness_range: (0.8, 1.2),
            zoom_range: (1.0, 1.15),
        }
    }

    /// Looks up a preset by name
    pub fn by_name(name: &str) -> Option<AugmentationConfig> {
        match name {
            "none" => Some(Self::none()),
            "light" => Some(Self::light()),
            "medium" => Some(Self::medium()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn create_test_image() -> DynamicImage {
        let img = ImageBuffer::from_fn(40, 20, |x, y| {
            if x < 20 && y < 10 {
                Rgb([255u8, 0u8, 0u8])
            } else if x >= 20 && y < 10 {
                Rgb([0u8, 255u8, 0u8])
            } else {
                Rgb([0u8, 0u8, 255u8])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_no_augmentation_is_identity() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let image = create_test_image();
        let out = NoAugmentation.apply(image.clone(), &mut rng);
        assert_eq!(out.to_rgb8(), image.to_rgb8());
    }

    #[test]
    fn test_policy_from_default_config() {
        let policy = policy_from_config(&AugmentationConfig::default());
        assert_eq!(policy.name(), "rescale-only");

        let policy = policy_from_config(&AugmentationPresets::light());
        assert_eq!(policy.name(), "random");
    }

    #[test]
    fn test_quarter_turn_rotation() {
        let image = create_test_image();
        let rotated = RandomAugmentation::rotate(image.clone(), 80.0);
        assert_eq!(rotated.dimensions(), (20, 40));

        let unrotated = RandomAugmentation::rotate(image.clone(), 30.0);
        assert_eq!(unrotated.dimensions(), (40, 20));

        let negative = RandomAugmentation::rotate(image, -90.0);
        assert_eq!(negative.dimensions(), (20, 40));
    }

    #[test]
    fn test_brightness_adjustment() {
        let image = create_test_image();
        let darker = RandomAugmentation::adjust_brightness(&image, 0.5);
        assert_eq!(darker.to_rgb8().get_pixel(0, 0)[0], 127);
        assert_eq!(darker.dimensions(), image.dimensions());
    }

    #[test]
    fn test_zoom_keeps_dimensions() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let image = create_test_image();
        let zoomed = RandomAugmentation::zoom(image.clone(), 1.5, &mut rng);
        assert_eq!(zoomed.dimensions(), image.dimensions());
    }

    #[test]
    fn test_random_augmentation_is_seeded() {
        let policy = RandomAugmentation::new(AugmentationPresets::medium());
        let image = create_test_image();

        let mut rng_a = ChaCha8Rng::seed_from_u64(11);
        let mut rng_b = ChaCha8Rng::seed_from_u64(11);
        let a = policy.apply(image.clone(), &mut rng_a);
        let b = policy.apply(image, &mut rng_b);
        assert_eq!(a.to_rgb8(), b.to_rgb8());
    }

    #[test]
    fn test_presets_by_name() {
        assert!(AugmentationPresets::by_name("none").unwrap().is_identity());
        assert!(AugmentationPresets::by_name("light").unwrap().horizontal_flip);
        assert!(AugmentationPresets::by_name("heavy").is_none());
    }
}
