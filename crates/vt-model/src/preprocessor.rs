use serde::{Deserialize, Serialize};

pub const VIDEOMAE_BASE: &str = "MCG-NJU/videomae-base";
pub const DEFAULT_FRAMES_PER_VIDEO: usize = 8;

/// Frame preprocessing contract the dataset was produced under.
///
/// Clips arrive already resized, rescaled, and normalized; this struct
/// records the expected geometry so a mismatched dataset is rejected before
/// any trial runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePreprocessor {
    pub image_processor: String,
    pub size: usize,
    pub channels: usize,
    pub num_frames: usize,
    pub rescale_factor: f64,
    pub image_mean: [f64; 3],
    pub image_std: [f64; 3],
}

impl FramePreprocessor {
    /// The videomae-base processor: 224x224 RGB, 1/255 rescale, ImageNet
    /// normalization.
    pub fn videomae_base(num_frames: usize) -> Self {
        Self {
            image_processor: VIDEOMAE_BASE.to_string(),
            size: 224,
            channels: 3,
            num_frames,
            rescale_factor: 1.0 / 255.0,
            image_mean: [0.485, 0.456, 0.406],
            image_std: [0.229, 0.224, 0.225],
        }
    }

    /// Flattened element count of one clip under this contract.
    pub fn expected_elements(&self) -> usize {
        self.num_frames * self.channels * self.size * self.size
    }

    pub fn matches(&self, frames: usize, channels: usize, height: usize, width: usize) -> bool {
        self.num_frames == frames
            && self.channels == channels
            && self.size == height
            && self.size == width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_videomae_geometry() {
        let pre = FramePreprocessor::videomae_base(DEFAULT_FRAMES_PER_VIDEO);
        assert_eq!(pre.expected_elements(), 8 * 3 * 224 * 224);
        assert!(pre.matches(8, 3, 224, 224));
        assert!(!pre.matches(16, 3, 224, 224));
        assert!(!pre.matches(8, 3, 224, 196));
    }
}
