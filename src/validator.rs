use crate::bitmap::Bitmap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Top-left `sample_window` square, or the whole bitmap when smaller.
    #[default]
    TopLeft,
    /// Evenly strided grid over the whole bitmap with the same sample budget.
    Grid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub sample_window: u32,
    pub white_threshold: u8,
    pub min_content_ratio: f32,
    pub sampling: SamplingMode,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            sample_window: 200,
            white_threshold: 245,
            min_content_ratio: 0.005,
            sampling: SamplingMode::TopLeft,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub accepted: bool,
    pub content_ratio: f32,
    pub sampled_pixels: u64,
}

/// Rejects bitmaps that look like a failed (blank) capture.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    config: ValidatorConfig,
}

impl ContentValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn validate(&self, bitmap: &Bitmap) -> Verdict {
        let window = self.config.sample_window.max(1);
        let (sampled, content) = match self.config.sampling {
            SamplingMode::TopLeft => {
                let w = bitmap.width().min(window);
                let h = bitmap.height().min(window);
                self.count(bitmap, (0..h).flat_map(|y| (0..w).map(move |x| (x, y))))
            }
            SamplingMode::Grid => {
                let xs = grid_axis(bitmap.width(), window);
                let ys = grid_axis(bitmap.height(), window);
                self.count(
                    bitmap,
                    ys.iter().flat_map(|&y| xs.iter().map(move |&x| (x, y))),
                )
            }
        };
        if sampled == 0 {
            return Verdict {
                accepted: false,
                content_ratio: 0.0,
                sampled_pixels: 0,
            };
        }
        let content_ratio = (content as f64 / sampled as f64) as f32;
        Verdict {
            accepted: content_ratio > self.config.min_content_ratio,
            content_ratio,
            sampled_pixels: sampled,
        }
    }

    fn count(&self, bitmap: &Bitmap, points: impl Iterator<Item = (u32, u32)>) -> (u64, u64) {
        let threshold = self.config.white_threshold;
        let mut sampled = 0u64;
        let mut content = 0u64;
        for (x, y) in points {
            let Some([r, g, b, a]) = bitmap.pixel(x, y) else {
                continue;
            };
            sampled += 1;
            if a > 0 && (r < threshold || g < threshold || b < threshold) {
                content += 1;
            }
        }
        (sampled, content)
    }
}

/// Up to `budget` coordinates spread over `len`, each at the center of its
/// stride.
fn grid_axis(len: u32, budget: u32) -> Vec<u32> {
    if len == 0 {
        return Vec::new();
    }
    let count = len.min(budget);
    (0..count)
        .map(|i| {
            let pos = (i as u64 * 2 + 1) * len as u64 / (count as u64 * 2);
            pos.min(len as u64 - 1) as u32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_ink(width: u32, height: u32, ink: &[(u32, u32)]) -> Bitmap {
        let mut pixels = Bitmap::filled(width, height, [255, 255, 255, 255])
            .pixels()
            .to_vec();
        for &(x, y) in ink {
            let idx = ((y * width + x) * 4) as usize;
            pixels[idx..idx + 4].copy_from_slice(&[25, 118, 210, 255]);
        }
        Bitmap::from_rgba(width, height, pixels).unwrap()
    }

    #[test]
    fn blank_and_transparent_bitmaps_are_rejected() {
        let validator = ContentValidator::new(ValidatorConfig::default());
        assert!(!validator.validate(&Bitmap::filled(300, 300, [255, 255, 255, 255])).accepted);
        assert!(!validator.validate(&Bitmap::filled(300, 300, [0, 0, 0, 0])).accepted);
        assert!(!validator.validate(&Bitmap::filled(0, 0, [0, 0, 0, 255])).accepted);
    }

    #[test]
    fn one_percent_ink_is_accepted() {
        let validator = ContentValidator::new(ValidatorConfig::default());
        // 10x10 window, one inked pixel = 1%.
        let bitmap = with_ink(10, 10, &[(3, 3)]);
        let verdict = validator.validate(&bitmap);
        assert!(verdict.accepted);
        assert_eq!(verdict.sampled_pixels, 100);
        assert!((verdict.content_ratio - 0.01).abs() < 1e-6);
    }

    #[test]
    fn ratio_at_the_floor_is_rejected() {
        let validator = ContentValidator::new(ValidatorConfig {
            min_content_ratio: 0.01,
            ..ValidatorConfig::default()
        });
        let verdict = validator.validate(&with_ink(10, 10, &[(0, 0)]));
        assert!(!verdict.accepted);
    }

    #[test]
    fn acceptance_is_monotonic_in_ink() {
        let validator = ContentValidator::new(ValidatorConfig::default());
        let mut ink = Vec::new();
        let mut was_accepted = false;
        for i in 0..40u32 {
            ink.push((i % 20, i / 20));
            let accepted = validator.validate(&with_ink(20, 20, &ink)).accepted;
            assert!(accepted || !was_accepted);
            was_accepted = accepted;
        }
        assert!(was_accepted);
    }

    #[test]
    fn top_left_misses_ink_in_the_far_corner_but_grid_sees_it() {
        let mut ink = Vec::new();
        for y in 300..400 {
            for x in 300..400 {
                ink.push((x, y));
            }
        }
        let bitmap = with_ink(400, 400, &ink);
        let top_left = ContentValidator::new(ValidatorConfig::default());
        assert!(!top_left.validate(&bitmap).accepted);
        let grid = ContentValidator::new(ValidatorConfig {
            sampling: SamplingMode::Grid,
            ..ValidatorConfig::default()
        });
        let verdict = grid.validate(&bitmap);
        assert!(verdict.accepted);
        assert_eq!(verdict.sampled_pixels, 200 * 200);
    }

    #[test]
    fn grid_axis_spreads_samples() {
        assert_eq!(grid_axis(4, 2), vec![1, 3]);
        assert_eq!(grid_axis(3, 10), vec![0, 1, 2]);
        assert!(grid_axis(0, 10).is_empty());
    }
}
