use image::DynamicImage;
use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};
use tokio::time::{Duration, Instant};

use crate::settings::FrameGateSettings;

pub fn compute_phash(image: &DynamicImage) -> ImageHash {
    frame_hasher().hash_image(image)
}

pub fn compute_hamming_distance(lhs: &ImageHash, rhs: &ImageHash) -> u32 {
    lhs.dist(rhs)
}

fn frame_hasher() -> Hasher {
    HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher()
}

/// Skips frames that look like the last processed one.
///
/// A parked car in front of a fixed camera yields near-identical frames for
/// minutes; only a visible change or an elapsed cooldown lets one through.
pub struct FrameGate {
    settings: FrameGateSettings,
    last_hash: Option<ImageHash>,
    last_admitted: Option<Instant>,
}

impl FrameGate {
    pub fn new(settings: FrameGateSettings) -> Self {
        Self {
            settings,
            last_hash: None,
            last_admitted: None,
        }
    }

    pub fn admit(&mut self, image: &DynamicImage) -> bool {
        self.admit_at(image, Instant::now())
    }

    pub fn admit_at(&mut self, image: &DynamicImage, now: Instant) -> bool {
        if !self.settings.enabled {
            return true;
        }

        let hash = compute_phash(image);
        let admitted = match &self.last_hash {
            None => true,
            Some(previous) => {
                compute_hamming_distance(&hash, previous) >= self.settings.change_threshold
                    || self.cooldown_elapsed(now)
            }
        };

        if admitted {
            self.last_hash = Some(hash);
            self.last_admitted = Some(now);
        }
        admitted
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        let cooldown = Duration::from_secs(self.settings.cooldown_secs);
        self.last_admitted
            .map(|at| now.saturating_duration_since(at) >= cooldown)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn ramp(rising: bool) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(64, 64, |x, _| {
            let v = (x * 4) as u8;
            Luma([if rising { v } else { 255 - v }])
        }))
    }

    #[test]
    fn test_first_frame_is_admitted() {
        let mut gate = FrameGate::new(FrameGateSettings::default());
        assert!(gate.admit(&ramp(true)));
    }

    #[test]
    fn test_unchanged_frame_waits_for_cooldown() {
        let mut gate = FrameGate::new(FrameGateSettings::default());
        let start = Instant::now();
        assert!(gate.admit_at(&ramp(true), start));
        assert!(!gate.admit_at(&ramp(true), start + Duration::from_secs(5)));
        assert!(gate.admit_at(&ramp(true), start + Duration::from_secs(21)));
    }

    #[test]
    fn test_changed_frame_is_admitted_immediately() {
        let mut gate = FrameGate::new(FrameGateSettings::default());
        let start = Instant::now();
        assert!(gate.admit_at(&ramp(true), start));
        assert!(gate.admit_at(&ramp(false), start + Duration::from_secs(1)));
        assert!(compute_hamming_distance(&compute_phash(&ramp(true)), &compute_phash(&ramp(false))) >= 8);
    }

    #[test]
    fn test_disabled_gate_admits_everything() {
        let mut gate = FrameGate::new(FrameGateSettings {
            enabled: false,
            ..FrameGateSettings::default()
        });
        let start = Instant::now();
        assert!(gate.admit_at(&ramp(true), start));
        assert!(gate.admit_at(&ramp(true), start));
    }
}
