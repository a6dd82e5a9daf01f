//! High-level alignment library: ORB feature extraction and the pipeline that
//! aligns a sequence of images onto the first one.

pub mod pipeline;

pub use align_brief::{BriefGenerator, hamming_distance, match_descriptors};
pub use align_core::{
    self, AlignConfig, AlignError, AlignResult, AlignedImage, Correspondence, Descriptor, FeatureSet,
    GrayImage, Keypoint, OrbConfig, OverlapRect, PairResult, PairStatus, RasterImage, SimilarityTransform,
    Stage, ValidityMask,
};
pub use align_fast::{FastDetector, FastError, FastResult};
pub use align_ransac::{RansacResult, estimate_similarity};
pub use align_warp::{resolve_overlap, warp};
pub use pipeline::{Aligner, AlignerBuilder, AlignmentOutput};

use align_core::MIN_KEYPOINTS;

/// High-level ORB feature extractor that combines FAST corner detection with BRIEF descriptors
pub struct OrbExtractor {
    cfg: OrbConfig,
    brief_generator: BriefGenerator,
}

impl OrbExtractor {
    pub fn new(cfg: OrbConfig) -> Self {
        let brief_generator = BriefGenerator::new(cfg.blur_sigma);
        Self { cfg, brief_generator }
    }

    /// Detect keypoints and generate descriptors in one step
    pub fn detect_and_describe(&self, img: &GrayImage) -> FastResult<(Vec<Keypoint>, Vec<Descriptor>)> {
        let (w, h) = img.dimensions();
        let detector = FastDetector::new(self.cfg.clone(), w as usize, h as usize)?;
        let detection = detector.detect(img)?;
        let descriptors =
            self.brief_generator
                .generate_descriptors(&detection.pyramid, self.cfg.scale_factor, &detection.keypoints);
        Ok((detection.keypoints, descriptors))
    }

    /// Up to `n_features` keypoints with their descriptors, best first.
    pub fn extract(&self, img: &GrayImage) -> AlignResult<FeatureSet> {
        self.extract_at_least(img, 0)
    }

    /// Like [`extract`](Self::extract), failing with `InsufficientFeatures`
    /// when fewer than `required` keypoints survive. Images too small for a
    /// descriptor patch count as zero keypoints.
    pub fn extract_at_least(&self, img: &GrayImage, required: usize) -> AlignResult<FeatureSet> {
        let (keypoints, descriptors) = self
            .detect_and_describe(img)
            .map_err(|err| err.into_align_error(required))?;
        FeatureSet::from_pairs(keypoints.into_iter().zip(descriptors)).require(required)
    }

    /// Get extractor configuration
    pub fn config(&self) -> &OrbConfig {
        &self.cfg
    }
}

/// Extract up to `feature_count` ORB features from a grayscale image.
///
/// Fails with `InsufficientFeatures` when fewer than eight keypoints survive.
pub fn detect(image: &GrayImage, feature_count: usize) -> AlignResult<FeatureSet> {
    OrbExtractor::new(OrbConfig::with_features(feature_count)).extract_at_least(image, MIN_KEYPOINTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::synthetic;
    use image::imageops;

    #[test]
    fn test_detect_returns_index_aligned_features() {
        let scene = synthetic::textured_scene(240, 180, 21);
        let gray = imageops::grayscale(&scene);
        let features = detect(&gray, 300).unwrap();

        assert!(features.len() >= MIN_KEYPOINTS);
        assert!(features.len() <= 300);
        assert_eq!(features.keypoints().len(), features.descriptors().len());
        for pair in features.keypoints().windows(2) {
            assert!(pair[0].response >= pair[1].response);
        }
    }

    #[test]
    fn test_solid_image_has_insufficient_features() {
        let gray = imageops::grayscale(&synthetic::solid(120, 90, 140));
        let err = detect(&gray, 500).unwrap_err();
        assert!(matches!(err, AlignError::InsufficientFeatures { found: 0, required: 8 }));
    }

    #[test]
    fn test_tiny_image_has_insufficient_features() {
        let gray = GrayImage::new(12, 12);
        let err = detect(&gray, 500).unwrap_err();
        assert!(matches!(err, AlignError::InsufficientFeatures { found: 0, .. }));
    }

    #[test]
    fn test_empty_image_has_insufficient_features() {
        let err = detect(&GrayImage::new(0, 0), 500).unwrap_err();
        assert!(matches!(err, AlignError::InsufficientFeatures { found: 0, required: 8 }));
    }

    #[test]
    fn test_configured_floor_is_reported() {
        let extractor = OrbExtractor::new(OrbConfig::default());
        let err = extractor.extract_at_least(&GrayImage::new(12, 12), 30).unwrap_err();
        assert!(matches!(err, AlignError::InsufficientFeatures { found: 0, required: 30 }));

        let gray = imageops::grayscale(&synthetic::solid(120, 90, 40));
        let err = extractor.extract_at_least(&gray, 30).unwrap_err();
        assert!(matches!(err, AlignError::InsufficientFeatures { found: 0, required: 30 }));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let gray = imageops::grayscale(&synthetic::textured_scene(200, 160, 5));
        let extractor = OrbExtractor::new(OrbConfig::with_features(200));
        let a = extractor.extract(&gray).unwrap();
        let b = extractor.extract(&gray).unwrap();
        assert_eq!(a.keypoints(), b.keypoints());
        assert_eq!(a.descriptors(), b.descriptors());
    }

    #[test]
    fn test_features_match_across_translation() {
        let scene = synthetic::textured_scene(300, 240, 8);
        let a = imageops::grayscale(&synthetic::crop(&scene, 10, 10, 240, 180));
        let b = imageops::grayscale(&synthetic::crop(&scene, 30, 22, 240, 180));
        let fa = detect(&a, 400).unwrap();
        let fb = detect(&b, 400).unwrap();

        let matches = match_descriptors(fa.descriptors(), fb.descriptors(), 0.75);
        assert!(matches.len() >= 20, "only {} matches", matches.len());
        let consistent = matches
            .iter()
            .filter(|m| {
                let (ax, ay) = fa.keypoints()[m.ref_idx].position();
                let (bx, by) = fb.keypoints()[m.cand_idx].position();
                ((bx + 20.0) - ax).abs() < 2.0 && ((by + 12.0) - ay).abs() < 2.0
            })
            .count();
        assert!(consistent * 10 >= matches.len() * 7, "{consistent} of {} consistent", matches.len());
    }
}
