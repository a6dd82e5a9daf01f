use crate::corner_detection::CornerDetector;
use crate::error::{FastError, FastResult};
use crate::pyramid::ImagePyramid;
use crate::refinement::KeypointRefinement;
use crate::types::{ScaleLevel, ScoredKeypoint};
use align_core::{Keypoint, OrbConfig};
use image::GrayImage;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Keypoints of one image together with the pyramid they were found on.
///
/// Descriptor extraction samples the same level images, so they travel with
/// the keypoints.
#[derive(Debug, Clone)]
pub struct Detection {
    pub keypoints: Vec<Keypoint>,
    pub pyramid: Vec<GrayImage>,
    pub scale_levels: Vec<ScaleLevel>,
}

/// Main FAST corner detector with multi-scale capability
pub struct FastDetector {
    cfg: OrbConfig,
    w: usize,
    h: usize,
    scale_levels: Vec<ScaleLevel>,
    extents: Vec<i32>,
}

impl FastDetector {
    /// Creates a new FAST detector with validation
    pub fn new(cfg: OrbConfig, width: usize, height: usize) -> FastResult<Self> {
        if width == 0 || height == 0 {
            return Err(FastError::InvalidImageSize { width, height });
        }

        // 0 would accept every pixel, >127 overflows the ring comparison range
        if cfg.threshold == 0 || cfg.threshold > 127 {
            return Err(FastError::InvalidThreshold(cfg.threshold));
        }

        if cfg.patch_size % 2 == 0 || cfg.patch_size < 7 {
            return Err(FastError::InvalidPatchSize {
                patch_size: cfg.patch_size,
                min_image_dim: width.min(height),
            });
        }

        // Every keypoint needs a full descriptor patch around it
        let min_size = Self::min_image_size(cfg.patch_size);
        if width < min_size || height < min_size {
            return Err(FastError::ImageTooSmall { width, height, min_size });
        }

        let scale_levels = ImagePyramid::generate_scale_levels(
            width,
            height,
            cfg.n_levels,
            cfg.scale_factor,
            min_size,
        )?;
        let extents = KeypointRefinement::circle_extents(cfg.patch_size / 2);

        Ok(Self {
            cfg,
            w: width,
            h: height,
            scale_levels,
            extents,
        })
    }

    /// Distance from the level border below which keypoints are discarded.
    pub fn edge_margin(patch_size: usize) -> usize {
        patch_size / 2 + 1
    }

    /// Smallest side length that still leaves room for one keypoint.
    pub fn min_image_size(patch_size: usize) -> usize {
        2 * Self::edge_margin(patch_size) + 1
    }

    fn validate_image(&self, img: &GrayImage) -> FastResult<()> {
        let (width, height) = (img.width() as usize, img.height() as usize);
        if (width, height) != (self.w, self.h) {
            return Err(FastError::UnexpectedDimensions {
                expected_width: self.w,
                expected_height: self.h,
                width,
                height,
            });
        }
        Ok(())
    }

    /// Detect keypoints across all pyramid levels.
    ///
    /// Keypoints are in level-0 coordinates, sorted by response descending with
    /// ties broken by (octave, y, x), and capped at the configured feature count.
    pub fn detect(&self, img: &GrayImage) -> FastResult<Detection> {
        self.validate_image(img)?;

        let pyramid = ImagePyramid::build_image_pyramid(img, &self.scale_levels);
        let quotas = self.level_quotas();

        let per_level: Vec<Vec<Keypoint>> = self
            .scale_levels
            .par_iter()
            .zip(pyramid.par_iter())
            .zip(quotas.par_iter())
            .map(|((scale_level, level_img), &quota)| self.detect_at_level(level_img, scale_level, quota))
            .collect();

        let mut keypoints: Vec<Keypoint> = per_level.into_iter().flatten().collect();
        rank_keypoints(&mut keypoints);
        keypoints.truncate(self.cfg.n_features);

        log::debug!(
            "detected {} keypoints over {} pyramid levels ({}x{})",
            keypoints.len(),
            self.scale_levels.len(),
            self.w,
            self.h
        );

        Ok(Detection {
            keypoints,
            pyramid,
            scale_levels: self.scale_levels.clone(),
        })
    }

    /// Detect keypoints, discarding the pyramid.
    pub fn detect_keypoints(&self, img: &GrayImage) -> FastResult<Vec<Keypoint>> {
        Ok(self.detect(img)?.keypoints)
    }

    /// Per-level keypoint budget, proportional to level area.
    pub fn level_quotas(&self) -> Vec<usize> {
        let total: usize = self.scale_levels.iter().map(ScaleLevel::area).sum();
        if total == 0 {
            return vec![0; self.scale_levels.len()];
        }
        self.scale_levels
            .iter()
            .map(|level| (self.cfg.n_features * level.area()).div_ceil(total))
            .collect()
    }

    /// FAST corners of one level after non-maximum suppression, scored by
    /// Harris response and ordered best first. Coordinates are level-local.
    pub fn detect_keypoints_with_response(&self, img: &GrayImage, scale_level: &ScaleLevel) -> Vec<ScoredKeypoint> {
        let scores = CornerDetector::fast_score_map(img, self.cfg.threshold);
        self.rank_candidates(img, &scores, scale_level)
    }

    fn rank_candidates(&self, img: &GrayImage, scores: &[f32], scale_level: &ScaleLevel) -> Vec<ScoredKeypoint> {
        let margin = Self::edge_margin(self.cfg.patch_size);
        let mut scored: Vec<ScoredKeypoint> =
            CornerDetector::non_maximum_suppression(scores, scale_level.width, scale_level.height, margin)
                .into_par_iter()
                .map(|(x, y, fast_score)| ScoredKeypoint {
                    x,
                    y,
                    fast_score,
                    response: CornerDetector::harris_response(img, x, y),
                })
                .collect();

        scored.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
        scored
    }

    /// Detect, refine and orient up to `quota` keypoints on one level.
    pub fn detect_at_level(&self, img: &GrayImage, scale_level: &ScaleLevel, quota: usize) -> Vec<Keypoint> {
        let scores = CornerDetector::fast_score_map(img, self.cfg.threshold);
        let mut scored = self.rank_candidates(img, &scores, scale_level);
        scored.truncate(quota);

        let size = self.cfg.patch_size as f32 * scale_level.scale;
        scored
            .into_iter()
            .map(|sk| {
                let (rx, ry) =
                    KeypointRefinement::refine_subpixel(&scores, scale_level.width, scale_level.height, sk.x, sk.y);
                let angle = KeypointRefinement::compute_orientation(img, sk.x, sk.y, &self.extents);
                let (x, y) = scale_level.to_base(rx, ry);
                Keypoint {
                    x,
                    y,
                    angle,
                    response: sk.response,
                    octave: scale_level.level as u8,
                    size,
                }
            })
            .collect()
    }

    /// Get scale levels for this detector
    pub fn scale_levels(&self) -> &[ScaleLevel] {
        &self.scale_levels
    }

    /// Get detector configuration
    pub fn config(&self) -> &OrbConfig {
        &self.cfg
    }

    /// Get image dimensions
    pub fn dimensions(&self) -> (usize, usize) {
        (self.w, self.h)
    }
}

/// Sort by response descending; ties by (octave, y, x) ascending.
pub fn rank_keypoints(keypoints: &mut [Keypoint]) {
    keypoints.sort_by(compare_keypoints);
}

fn compare_keypoints(a: &Keypoint, b: &Keypoint) -> Ordering {
    b.response
        .total_cmp(&a.response)
        .then(a.octave.cmp(&b.octave))
        .then(a.y.total_cmp(&b.y))
        .then(a.x.total_cmp(&b.x))
}
