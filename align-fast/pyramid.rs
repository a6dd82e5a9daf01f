use crate::error::{FastError, FastResult};
use crate::types::ScaleLevel;
use image::GrayImage;
use image::imageops::{self, FilterType};
use rayon::prelude::*;

/// Image pyramid operations for multi-scale feature detection
pub struct ImagePyramid;

impl ImagePyramid {
    /// Generate up to `n_levels` scale levels, stopping once a level would be
    /// smaller than `min_size` on either side.
    pub fn generate_scale_levels(
        width: usize,
        height: usize,
        n_levels: usize,
        scale_factor: f32,
        min_size: usize,
    ) -> FastResult<Vec<ScaleLevel>> {
        if n_levels == 0 || !(scale_factor > 1.0) || !scale_factor.is_finite() {
            return Err(FastError::InvalidPyramid { levels: n_levels, scale_factor });
        }

        let mut levels = Vec::with_capacity(n_levels);
        for level in 0..n_levels {
            let scale = Self::level_scale(scale_factor, level);
            let scaled_width = ((width as f32) / scale).round() as usize;
            let scaled_height = ((height as f32) / scale).round() as usize;

            if scaled_width < min_size || scaled_height < min_size {
                break;
            }

            levels.push(ScaleLevel {
                level,
                scale,
                width: scaled_width,
                height: scaled_height,
            });
        }

        Ok(levels)
    }

    /// Nominal downscale of `level` relative to level 0.
    #[inline]
    pub fn level_scale(scale_factor: f32, level: usize) -> f32 {
        scale_factor.powi(level as i32)
    }

    /// Build image pyramid from base image.
    ///
    /// Every level is resampled straight from the base image with a triangle
    /// filter, whose support widens with the downscale ratio.
    pub fn build_image_pyramid(img: &GrayImage, scale_levels: &[ScaleLevel]) -> Vec<GrayImage> {
        scale_levels
            .par_iter()
            .map(|scale_level| {
                if scale_level.level == 0 {
                    img.clone()
                } else {
                    imageops::resize(
                        img,
                        scale_level.width as u32,
                        scale_level.height as u32,
                        FilterType::Triangle,
                    )
                }
            })
            .collect()
    }
}
