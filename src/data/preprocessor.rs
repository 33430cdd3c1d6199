// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns an image file into the flat float buffer the network
// consumes. Steps (applied in order):
//
//   1. Decode (PNG / JPEG / ...) and force 3-channel RGB
//   2. Resize to image_size × image_size (bilinear)
//   3. Training only: random horizontal flip augmentation
//   4. Subtract the ImageNet per-channel mean
//   5. Reorder channels RGB → BGR and lay out as CHW
//
// The BGR order and mean values match the convention of
// Caffe-trained AlexNet weights, so a warm start from such
// weights sees the input distribution it expects.
//
// Augmentation probabilities:
//   P(augment)          = 0.5
//   P(flip | augment)   = 0.25
//   P(mirror | flip)    = 0.5   (a random left-right flip)
//
// Reference: image crate documentation (imageops)
//            Krizhevsky et al. (2012) AlexNet

use anyhow::{Context, Result};
use image::{imageops, imageops::FilterType, RgbImage};
use rand::Rng;
use std::path::Path;

/// ImageNet channel means in RGB order
pub const IMAGENET_MEAN: [f32; 3] = [123.68, 116.779, 103.939];

const AUGMENT_PROB: f64 = 0.5;
const FLIP_PROB: f64 = 0.25;

/// Training applies augmentation; inference never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Training,
    Inference,
}

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    image_size: u32,
    mode: Mode,
}

impl ImagePreprocessor {
    pub fn new(image_size: usize, mode: Mode) -> Self {
        Self {
            image_size: image_size as u32,
            mode,
        }
    }

    pub fn image_size(&self) -> usize {
        self.image_size as usize
    }

    /// Number of floats produced per image (3 × size × size)
    pub fn pixels_per_image(&self) -> usize {
        3 * self.image_size() * self.image_size()
    }

    /// Decode the file at `path` and preprocess it.
    pub fn load<R: Rng>(&self, path: &Path, rng: &mut R) -> Result<Vec<f32>> {
        let img = image::open(path)
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?
            .to_rgb8();
        Ok(self.process(&img, rng))
    }

    /// Preprocess an already decoded RGB image.
    pub fn process<R: Rng>(&self, img: &RgbImage, rng: &mut R) -> Vec<f32> {
        let resized = if img.dimensions() == (self.image_size, self.image_size) {
            img.clone()
        } else {
            imageops::resize(img, self.image_size, self.image_size, FilterType::Triangle)
        };

        let resized = match self.mode {
            Mode::Training if self.should_flip(rng) => imageops::flip_horizontal(&resized),
            _ => resized,
        };

        to_bgr_chw(&resized)
    }

    fn should_flip<R: Rng>(&self, rng: &mut R) -> bool {
        rng.gen_bool(AUGMENT_PROB) && rng.gen_bool(FLIP_PROB) && rng.gen_bool(0.5)
    }
}

/// Mean-centre and convert an RGB image to a BGR, channel-major buffer.
fn to_bgr_chw(img: &RgbImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut out = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = (y * w + x) as usize;
        for rgb in 0..3 {
            // RGB channel `rgb` lands in BGR plane `2 - rgb`
            out[(2 - rgb) * plane + offset] = pixel[rgb] as f32 - IMAGENET_MEAN[rgb];
        }
    }

    out
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_output_length() {
        let p   = ImagePreprocessor::new(8, Mode::Inference);
        let img = RgbImage::from_pixel(20, 10, Rgb([0, 0, 0]));
        let out = p.process(&img, &mut StdRng::seed_from_u64(0));
        assert_eq!(out.len(), p.pixels_per_image());
        assert_eq!(out.len(), 3 * 8 * 8);
    }

    #[test]
    fn test_mean_subtracted_in_bgr_order() {
        let p   = ImagePreprocessor::new(2, Mode::Inference);
        let img = RgbImage::from_pixel(2, 2, Rgb([200, 100, 50]));
        let out = p.process(&img, &mut StdRng::seed_from_u64(0));

        // plane 0 = blue, plane 1 = green, plane 2 = red
        assert!((out[0] - (50.0 - 103.939)).abs() < 1e-4);
        assert!((out[4] - (100.0 - 116.779)).abs() < 1e-4);
        assert!((out[8] - (200.0 - 123.68)).abs() < 1e-4);
    }

    #[test]
    fn test_inference_never_flips() {
        let p = ImagePreprocessor::new(2, Mode::Inference);
        let mut img = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        img.put_pixel(0, 0, Rgb([255, 255, 255]));

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let out = p.process(&img, &mut rng);
            // top-left stays bright in the blue plane
            assert!(out[0] > 0.0);
            assert!(out[1] < 0.0);
        }
    }

    #[test]
    fn test_training_sometimes_flips() {
        let p = ImagePreprocessor::new(2, Mode::Training);
        let mut img = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        img.put_pixel(0, 0, Rgb([255, 255, 255]));

        let mut rng = StdRng::seed_from_u64(3);
        let flipped = (0..2000)
            .filter(|_| p.process(&img, &mut rng)[1] > 0.0)
            .count();

        // expected rate 1/16 → ~125 of 2000
        assert!(flipped > 50 && flipped < 250, "flipped {flipped} times");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let p = ImagePreprocessor::new(4, Mode::Inference);
        let r = p.load(Path::new("/definitely/not/here.png"), &mut StdRng::seed_from_u64(0));
        assert!(r.is_err());
    }
}
