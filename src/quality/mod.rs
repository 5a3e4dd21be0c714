//! Admission gate in front of the super-resolution call.

use image::DynamicImage;
use imageproc::filter::laplacian_filter;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Crops with an intensity standard deviation below this are low contrast.
    pub min_contrast: f64,
    /// Crops with a Laplacian variance below this are blurred.
    pub min_sharpness: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_contrast: 50.0,
            min_sharpness: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityReport {
    pub contrast: f64,
    pub sharpness: f64,
}

impl QualityReport {
    pub fn needs_enhancement(&self, thresholds: &QualityThresholds) -> bool {
        self.contrast < thresholds.min_contrast || self.sharpness < thresholds.min_sharpness
    }
}

pub fn measure(image: &DynamicImage) -> QualityReport {
    let gray = image.to_luma8();
    let contrast = variance(gray.pixels().map(|p| f64::from(p.0[0]))).sqrt();
    let laplacian = laplacian_filter(&gray);
    let sharpness = variance(laplacian.pixels().map(|p| f64::from(p.0[0])));
    QualityReport {
        contrast,
        sharpness,
    }
}

pub fn should_enhance(image: &DynamicImage, thresholds: &QualityThresholds) -> bool {
    measure(image).needs_enhancement(thresholds)
}

// Welford population variance, 0 for an empty image.
fn variance(values: impl Iterator<Item = f64>) -> f64 {
    let mut count = 0u64;
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for value in values {
        count += 1;
        let delta = value - mean;
        mean += delta / count as f64;
        m2 += delta * (value - mean);
    }
    if count == 0 {
        0.0
    } else {
        m2 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn checkerboard(size: u32, cell: u32) -> DynamicImage {
        let img = GrayImage::from_fn(size, size, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_flat_image_needs_enhancement() {
        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 32, Luma([128u8])));
        let report = measure(&flat);
        assert_eq!(report.contrast, 0.0);
        assert_eq!(report.sharpness, 0.0);
        assert!(should_enhance(&flat, &QualityThresholds::default()));
    }

    #[test]
    fn test_sharp_high_contrast_image_passes() {
        let board = checkerboard(64, 4);
        let report = measure(&board);
        assert!(report.contrast > 120.0, "contrast {}", report.contrast);
        assert!(report.sharpness > 1000.0, "sharpness {}", report.sharpness);
        assert!(!should_enhance(&board, &QualityThresholds::default()));
    }

    #[test]
    fn test_either_threshold_triggers() {
        let thresholds = QualityThresholds::default();
        let blurry = QualityReport {
            contrast: 80.0,
            sharpness: 20.0,
        };
        let dull = QualityReport {
            contrast: 10.0,
            sharpness: 500.0,
        };
        let clear = QualityReport {
            contrast: 80.0,
            sharpness: 500.0,
        };
        assert!(blurry.needs_enhancement(&thresholds));
        assert!(dull.needs_enhancement(&thresholds));
        assert!(!clear.needs_enhancement(&thresholds));
    }
}
