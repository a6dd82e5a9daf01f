//! Rotated BRIEF descriptors and descriptor matching.

pub mod matcher;

pub use matcher::{hamming_distance, match_descriptors};

use align_core::{DESCRIPTOR_BYTES, Descriptor, GrayImage, Keypoint};
use imageproc::filter::gaussian_blur_f32;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Number of intensity comparisons per descriptor.
pub const N_PAIRS: usize = DESCRIPTOR_BYTES * 8;

/// Radius of the disc the sampling pairs are drawn from. Any rotation of the
/// pattern stays inside a 31-pixel patch.
pub const PATTERN_RADIUS: i32 = 13;

/// Seed of the built-in sampling pattern. Descriptors are only comparable
/// when computed with the same pattern.
pub const PATTERN_SEED: u64 = 0x0b1e_f5ee_d000_0256;

pub struct BriefGenerator {
    pattern: Vec<(f32, f32, f32, f32)>,
    blur_sigma: f32,
}

impl BriefGenerator {
    pub fn new(blur_sigma: f32) -> Self {
        Self::with_seed(blur_sigma, PATTERN_SEED)
    }

    /// Generator with a pattern drawn from `seed`.
    pub fn with_seed(blur_sigma: f32, seed: u64) -> Self {
        Self {
            pattern: Self::sampling_pattern(seed),
            blur_sigma,
        }
    }

    /// 256 point pairs drawn uniformly from a disc, the two points of a pair distinct.
    pub fn sampling_pattern(seed: u64) -> Vec<(f32, f32, f32, f32)> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let r2 = PATTERN_RADIUS * PATTERN_RADIUS;
        let mut point = move || loop {
            let x = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            let y = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            if x * x + y * y <= r2 {
                return (x, y);
            }
        };

        let mut pattern = Vec::with_capacity(N_PAIRS);
        while pattern.len() < N_PAIRS {
            let (x1, y1) = point();
            let (x2, y2) = point();
            if (x1, y1) != (x2, y2) {
                pattern.push((x1 as f32, y1 as f32, x2 as f32, y2 as f32));
            }
        }
        pattern
    }

    pub fn pattern(&self) -> &[(f32, f32, f32, f32)] {
        &self.pattern
    }

    /// Gaussian-smooth every pyramid level before sampling.
    pub fn blur_levels(&self, pyramid: &[GrayImage]) -> Vec<GrayImage> {
        pyramid
            .par_iter()
            .map(|level| {
                if self.blur_sigma > 0.0 {
                    gaussian_blur_f32(level, self.blur_sigma)
                } else {
                    level.clone()
                }
            })
            .collect()
    }

    /// One descriptor per keypoint, in keypoint order.
    ///
    /// `pyramid` holds the unsmoothed level images the keypoints were detected
    /// on; level `i` is downscaled by `scale_factor^i`. Keypoint coordinates
    /// are in level-0 pixels and are mapped onto their own octave.
    pub fn generate_descriptors(&self, pyramid: &[GrayImage], scale_factor: f32, kps: &[Keypoint]) -> Vec<Descriptor> {
        let smoothed = self.blur_levels(pyramid);

        kps.par_iter()
            .map(|kp| {
                let octave = (kp.octave as usize).min(smoothed.len().saturating_sub(1));
                let Some(img) = smoothed.get(octave) else {
                    return [0u8; DESCRIPTOR_BYTES];
                };
                let scale = scale_factor.powi(octave as i32);
                let cx = (kp.x + 0.5) / scale - 0.5;
                let cy = (kp.y + 0.5) / scale - 0.5;
                self.describe(img, cx, cy, kp.angle)
            })
            .collect()
    }

    /// Descriptor of the patch centred on `(cx, cy)` rotated by `angle`.
    pub fn describe(&self, img: &GrayImage, cx: f32, cy: f32, angle: f32) -> Descriptor {
        let (s, c) = angle.sin_cos();
        let mut d = [0u8; DESCRIPTOR_BYTES];

        for (i, &(dx1, dy1, dx2, dy2)) in self.pattern.iter().enumerate() {
            // Apply rotation and translation for subpixel coordinates
            let (rx1, ry1) = (cx + c * dx1 - s * dy1, cy + s * dx1 + c * dy1);
            let (rx2, ry2) = (cx + c * dx2 - s * dy2, cy + s * dx2 + c * dy2);

            let val1 = bilinear_sample(img, rx1, ry1);
            let val2 = bilinear_sample(img, rx2, ry2);

            let bit = (val1 < val2) as u8;
            d[i / 8] |= bit << (i % 8);
        }
        d
    }
}

/// Bilinear interpolation for subpixel sampling, clamped to the image.
pub fn bilinear_sample(img: &GrayImage, x: f32, y: f32) -> f32 {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w == 0 || h == 0 {
        return 0.0;
    }
    let raw = img.as_raw();

    let x0 = x.floor();
    let y0 = y.floor();

    // Clamp to image bounds for boundary samples
    if x0 < 0.0 || y0 < 0.0 || x0 + 1.0 >= w as f32 || y0 + 1.0 >= h as f32 {
        let cx = x.round().clamp(0.0, (w - 1) as f32) as usize;
        let cy = y.round().clamp(0.0, (h - 1) as f32) as usize;
        return raw[cy * w + cx] as f32;
    }

    let dx = x - x0;
    let dy = y - y0;
    let (x0, y0) = (x0 as usize, y0 as usize);

    let p00 = raw[y0 * w + x0] as f32;
    let p10 = raw[y0 * w + x0 + 1] as f32;
    let p01 = raw[(y0 + 1) * w + x0] as f32;
    let p11 = raw[(y0 + 1) * w + x0 + 1] as f32;

    let top = p00 * (1.0 - dx) + p10 * dx;
    let bottom = p01 * (1.0 - dx) + p11 * dx;

    top * (1.0 - dy) + bottom * dy
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn checker(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let v = ((x * 37 + y * 91) ^ (x * y)) % 251;
            Luma([v as u8])
        })
    }

    fn keypoint(x: f32, y: f32, angle: f32, octave: u8) -> Keypoint {
        Keypoint { x, y, angle, response: 1.0, octave, size: 31.0 }
    }

    #[test]
    fn test_pattern_shape() {
        let pattern = BriefGenerator::sampling_pattern(PATTERN_SEED);
        assert_eq!(pattern.len(), N_PAIRS);
        let r = PATTERN_RADIUS as f32;
        for &(x1, y1, x2, y2) in &pattern {
            assert!(x1 * x1 + y1 * y1 <= r * r);
            assert!(x2 * x2 + y2 * y2 <= r * r);
            assert!((x1, y1) != (x2, y2));
        }
    }

    #[test]
    fn test_pattern_is_seeded() {
        assert_eq!(BriefGenerator::sampling_pattern(7), BriefGenerator::sampling_pattern(7));
        assert_ne!(BriefGenerator::sampling_pattern(7), BriefGenerator::sampling_pattern(8));
    }

    #[test]
    fn test_one_descriptor_per_keypoint() {
        let generator = BriefGenerator::new(2.0);
        let img = checker(80, 80);
        let kps = vec![
            keypoint(30.0, 30.0, 0.0, 0),
            keypoint(40.5, 35.25, 1.0, 0),
            keypoint(50.0, 45.0, -2.0, 0),
        ];
        let descriptors = generator.generate_descriptors(&[img], 1.2, &kps);
        assert_eq!(descriptors.len(), kps.len());
        assert_ne!(descriptors[0], descriptors[1]);
    }

    #[test]
    fn test_uniform_patch_gives_zero_descriptor() {
        let generator = BriefGenerator::new(2.0);
        let img = GrayImage::from_pixel(64, 64, Luma([77]));
        let d = generator.describe(&img, 32.0, 32.0, 0.3);
        assert_eq!(d, [0u8; DESCRIPTOR_BYTES]);
    }

    #[test]
    fn test_translation_invariance() {
        let generator = BriefGenerator::new(1.5);
        let big = checker(120, 120);
        let shifted = image::imageops::crop_imm(&big, 10, 6, 100, 100).to_image();

        let a = generator.describe(&generator.blur_levels(&[big.clone()])[0], 50.0, 40.0, 0.7);
        let b_full = generator.blur_levels(&[shifted]);
        let b = generator.describe(&b_full[0], 40.0, 34.0, 0.7);
        assert!(hamming_distance(&a, &b) <= 8);
    }

    #[test]
    fn test_rotation_changes_descriptor() {
        let generator = BriefGenerator::new(1.0);
        let img = checker(80, 80);
        let a = generator.describe(&img, 40.0, 40.0, 0.0);
        let b = generator.describe(&img, 40.0, 40.0, std::f32::consts::FRAC_PI_2);
        assert!(hamming_distance(&a, &b) > 0);
    }

    #[test]
    fn test_octave_coordinates_are_mapped() {
        let generator = BriefGenerator::new(1.0);
        let base = checker(100, 100);
        let level1 = image::imageops::resize(&base, 50, 50, image::imageops::FilterType::Triangle);
        let pyramid = vec![base, level1.clone()];

        // Level-0 (39.5, 39.5) is level-1 (19.5, 19.5) at scale 2
        let kp = keypoint(39.5, 39.5, 0.4, 1);
        let descriptors = generator.generate_descriptors(&pyramid, 2.0, &[kp]);
        let direct = generator.describe(&generator.blur_levels(&[level1])[0], 19.5, 19.5, 0.4);
        assert_eq!(descriptors[0], direct);
    }

    #[test]
    fn test_bilinear_sample() {
        let img = GrayImage::from_fn(4, 4, |x, _| Luma([(x * 10) as u8]));
        assert!((bilinear_sample(&img, 1.5, 1.0) - 15.0).abs() < 1e-4);
        assert_eq!(bilinear_sample(&img, -3.0, 1.0), 0.0);
        assert_eq!(bilinear_sample(&img, 10.0, 1.0), 30.0);
    }
}
