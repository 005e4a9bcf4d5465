//! Image preprocessing: decode, resize, rescale, CHW layout.

use std::path::Path;

use grain_core::{Error, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};

/// Resizes images to a square target and rescales pixel values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
    /// Side of the square output image
    pub image_size: usize,
    /// Multiplier applied to raw 0-255 values (1/255 maps into [0, 1])
    pub rescale: f32,
}

impl Preprocessor {
    pub fn new(image_size: usize, rescale: f32) -> Self {
        Self { image_size, rescale }
    }

    /// Decodes an image file
    pub fn open(&self, path: &Path) -> Result<DynamicImage> {
        ImageReader::open(path)
            .map_err(|e| Error::Image(format!("Failed to open image {}: {e}", path.display())))?
            .with_guessed_format()
            .map_err(|e| Error::Image(format!("Failed to read image {}: {e}", path.display())))?
            .decode()
            .map_err(|e| Error::Image(format!("Failed to decode image {}: {e}", path.display())))
    }

    /// Resizes to `image_size x image_size` RGB
    pub fn resize(&self, image: &DynamicImage) -> RgbImage {
        let side = self.image_size as u32;
        if image.width() == side && image.height() == side {
            return image.to_rgb8();
        }
        image
            .resize_exact(side, side, FilterType::Triangle)
            .to_rgb8()
    }

    /// Converts a resized RGB image to a flattened CHW float array
    pub fn to_chw(&self, image: &RgbImage) -> Vec<f32> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let plane = width * height;
        let mut data = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for channel in 0..3 {
                data[channel * plane + offset] = pixel[channel] as f32 * self.rescale;
            }
        }

        data
    }

    /// Resize + rescale in one step
    pub fn process(&self, image: &DynamicImage) -> Vec<f32> {
        self.to_chw(&self.resize(image))
    }

    /// Number of floats produced per image
    pub fn item_len(&self) -> usize {
        3 * self.image_size * self.image_size
    }
}

/// Inverse of [`Preprocessor::to_chw`], used for sample previews
pub fn chw_to_rgb(data: &[f32], image_size: usize, rescale: f32) -> Result<RgbImage> {
    let plane = image_size * image_size;
    if data.len() != 3 * plane {
        return Err(Error::Image(format!(
            "Expected {} values for a {image_size}x{image_size} image, got {}",
            3 * plane,
            data.len()
        )));
    }

    let side = image_size as u32;
    Ok(RgbImage::from_fn(side, side, |x, y| {
        let offset = y as usize * image_size + x as usize;
        let value = |channel: usize| {
            (data[channel * plane + offset] / rescale)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        image::Rgb([value(0), value(1), value(2)])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x * 20) as u8, (y * 20) as u8, 255u8])
        }))
    }

    #[test]
    fn test_values_rescaled_into_unit_range() {
        let preprocessor = Preprocessor::new(8, 1.0 / 255.0);
        let data = preprocessor.process(&gradient(12, 6));

        assert_eq!(data.len(), preprocessor.item_len());
        assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_chw_layout() {
        let preprocessor = Preprocessor::new(4, 1.0);
        let data = preprocessor.process(&gradient(4, 4));

        // Blue plane is constant 255, red plane follows x
        assert!(data[32..48].iter().all(|&v| v == 255.0));
        assert_eq!(data[1], 20.0);
        assert_eq!(data[16 + 4], 20.0);
    }

    #[test]
    fn test_chw_to_rgb_inverts_rescale() {
        let preprocessor = Preprocessor::new(4, 1.0 / 255.0);
        let original = gradient(4, 4);
        let data = preprocessor.process(&original);

        let restored = chw_to_rgb(&data, 4, 1.0 / 255.0).unwrap();
        assert_eq!(restored, original.to_rgb8());
    }

    #[test]
    fn test_chw_to_rgb_rejects_wrong_length() {
        assert!(chw_to_rgb(&[0.0; 10], 4, 1.0).is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let preprocessor = Preprocessor::new(4, 1.0);
        let result = preprocessor.open(Path::new("/nonexistent/grain.png"));
        assert!(matches!(result, Err(Error::Image(_))));
    }
}
