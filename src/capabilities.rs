//! Narrow interfaces to the heavyweight model components.
//!
//! Implementations are blocking and may take seconds per call; the pipeline
//! runs them on the blocking pool under a timeout.

use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates of the frame it was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Grows the box by `margin` on every side and clamps it to the frame.
    ///
    /// Returns `(x, y, width, height)`, or `None` when nothing of the box lies
    /// inside the frame.
    pub fn crop_rect(&self, margin: u32, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        let margin = margin as f32;
        let x1 = (self.x1.min(self.x2) - margin).max(0.0).floor() as u32;
        let y1 = (self.y1.min(self.y2) - margin).max(0.0).floor() as u32;
        let x2 = ((self.x1.max(self.x2) + margin).max(0.0).ceil() as u32).min(frame_width);
        let y2 = ((self.y1.max(self.y2) + margin).max(0.0).ceil() as u32).min(frame_height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// One detector output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateBox {
    pub label: String,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub confidence: f32,
}

/// One OCR line and its vertical position in the crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToken {
    pub text: String,
    pub top: f32,
}

pub trait Detector: Send + Sync {
    fn locate_plates(&self, image: &DynamicImage) -> Result<Vec<PlateBox>>;
}

pub trait Enhancer: Send + Sync {
    fn upscale(&self, region: &DynamicImage, factor: u32) -> Result<DynamicImage>;
}

pub trait OcrEngine: Send + Sync {
    fn read(&self, region: &DynamicImage) -> Result<Vec<RawToken>>;
}

/// Model components built once at startup and shared by every pipeline call.
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn Detector>,
    pub enhancer: Arc<dyn Enhancer>,
    pub ocr: Arc<dyn OcrEngine>,
}

impl Collaborators {
    pub fn new(
        detector: Arc<dyn Detector>,
        enhancer: Arc<dyn Enhancer>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self {
            detector,
            enhancer,
            ocr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_rect_applies_margin_and_clamps() {
        let bbox = BoundingBox::new(5.0, 20.0, 50.0, 40.0);
        assert_eq!(bbox.crop_rect(10, 55, 100), Some((0, 10, 55, 40)));
    }

    #[test]
    fn test_crop_rect_normalizes_swapped_corners() {
        let bbox = BoundingBox::new(30.0, 30.0, 10.0, 10.0);
        assert_eq!(bbox.crop_rect(0, 100, 100), Some((10, 10, 20, 20)));
    }

    #[test]
    fn test_crop_rect_outside_frame() {
        let bbox = BoundingBox::new(200.0, 200.0, 220.0, 230.0);
        assert_eq!(bbox.crop_rect(0, 100, 100), None);
    }
}
