//! Deterministic synthetic scenes for tests and benchmarks.

use crate::types::RasterImage;
use image::{imageops, Rgb};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Overlapping random rectangles on a mid-grey background.
///
/// Rectangle corners give dense, well distributed FAST corners and the
/// random colours keep neighbouring descriptors distinct.
pub fn textured_scene(width: u32, height: u32, seed: u64) -> RasterImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut img = RasterImage::from_pixel(width, height, Rgb([128, 128, 128]));
    let n_rects = (width as usize * height as usize) / 600;

    for _ in 0..n_rects {
        let w = rng.random_range(6..48u32).min(width);
        let h = rng.random_range(6..48u32).min(height);
        let x0 = rng.random_range(0..=width - w);
        let y0 = rng.random_range(0..=height - h);
        let color = Rgb([rng.random(), rng.random(), rng.random()]);
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                img.put_pixel(x, y, color);
            }
        }
    }
    img
}

/// View of `scene` starting at `(x, y)`, copied into a new image.
pub fn crop(scene: &RasterImage, x: u32, y: u32, width: u32, height: u32) -> RasterImage {
    imageops::crop_imm(scene, x, y, width, height).to_image()
}

/// Uniform image without any corner.
pub fn solid(width: u32, height: u32, value: u8) -> RasterImage {
    RasterImage::from_pixel(width, height, Rgb([value, value, value]))
}
