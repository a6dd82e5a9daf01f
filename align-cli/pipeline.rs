//! Alignment pipeline: reference features first, then every candidate on a
//! dedicated worker pool, then the common overlap of everything that aligned.

use crate::OrbExtractor;
use align_brief::match_descriptors;
use align_core::{
    AlignConfig, AlignError, AlignResult, AlignedImage, FeatureSet, Keypoint, OverlapRect, PairResult,
    PairStatus, RansacConfig, RasterImage, SimilarityTransform, Stage, ValidityMask, build_thread_pool,
};
use align_ransac::estimate_similarity;
use align_warp::{resolve_overlap, warp};
use image::imageops;
use rayon::prelude::*;

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct AlignmentOutput {
    /// One entry per candidate, in input order.
    pub pairs: Vec<PairResult>,
    /// The reference followed by every candidate that aligned, in input order.
    pub aligned: Vec<AlignedImage>,
    /// Region valid in every aligned image, in reference coordinates.
    pub overlap: OverlapRect,
    pub reference_keypoints: Vec<Keypoint>,
    /// Sorted indices into `reference_keypoints` that matched at least one candidate.
    pub matched_reference: Vec<usize>,
}

impl AlignmentOutput {
    /// Crop every aligned image to the common overlap, on the calling thread.
    pub fn crop_all(&self) -> Vec<RasterImage> {
        log::debug!("stage {:?}: {} images to {:?}", Stage::Cropping, self.aligned.len(), self.overlap);
        let cropped: Vec<RasterImage> = self.aligned.iter().map(|a| self.overlap.crop(a.image())).collect();
        log::debug!("stage {:?}", Stage::Done);
        cropped
    }

    pub fn aligned_count(&self) -> usize {
        self.pairs.iter().filter(|p| p.is_aligned()).count()
    }

    pub fn matched_reference_keypoints(&self) -> impl Iterator<Item = &Keypoint> {
        self.matched_reference.iter().map(|&i| &self.reference_keypoints[i])
    }

    /// Transform of the candidate at input position `index`, if it aligned.
    pub fn transform_for(&self, index: usize) -> Option<&SimilarityTransform> {
        self.aligned.iter().find(|a| a.index() == index).map(AlignedImage::transform)
    }
}

struct CandidateOutcome {
    pair: PairResult,
    aligned: Option<AlignedImage>,
    matched_reference: Vec<usize>,
}

impl CandidateOutcome {
    fn skipped(mut pair: PairResult, stage: Stage, reason: String) -> Self {
        log::warn!("candidate {} skipped at {:?}: {}", pair.index, stage, reason);
        pair.status = PairStatus::Skipped { stage, reason };
        Self {
            pair,
            aligned: None,
            matched_reference: Vec::new(),
        }
    }
}

/// Candidate-local failures become a skip; everything else aborts the run.
macro_rules! stage {
    ($expr:expr, $pair:ident, $stage:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) if err.is_candidate_local() => {
                return Ok(CandidateOutcome::skipped($pair, $stage, err.to_string()));
            }
            Err(err) => return Err(err),
        }
    };
}

/// Aligns image sequences onto their first image.
pub struct Aligner {
    config: AlignConfig,
    extractor: OrbExtractor,
    pool: rayon::ThreadPool,
}

impl Aligner {
    pub fn new(config: AlignConfig) -> AlignResult<Self> {
        config.validate()?;
        let pool = build_thread_pool(config.n_threads)?;
        let extractor = OrbExtractor::new(config.orb.clone());
        log::debug!("{}", config.summary());
        Ok(Self {
            config,
            extractor,
            pool,
        })
    }

    pub fn builder() -> AlignerBuilder {
        AlignerBuilder::new()
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    /// Align `images[1..]` onto `images[0]`.
    ///
    /// Fails when fewer than two images are given, when the reference yields
    /// too few features, when no candidate aligns or when the aligned images
    /// share no overlap. Candidates that fail individually are reported in
    /// `pairs` and left out of `aligned`.
    pub fn align(&self, images: &[RasterImage]) -> AlignResult<AlignmentOutput> {
        log::debug!("stage {:?}: {} images", Stage::Loading, images.len());
        if images.len() < 2 {
            return Err(AlignError::TooFewImages(images.len()));
        }
        self.pool.install(|| self.run(images))
    }

    fn run(&self, images: &[RasterImage]) -> AlignResult<AlignmentOutput> {
        let reference = &images[0];
        let canvas = reference.dimensions();

        log::debug!("stage {:?}: {}x{}", Stage::ReferenceFeatureExtraction, canvas.0, canvas.1);
        let ref_features = self.extract(reference)?;
        log::info!("reference: {} keypoints", ref_features.len());

        let outcomes: Vec<CandidateOutcome> = images[1..]
            .par_iter()
            .enumerate()
            .map(|(i, image)| self.align_candidate(i + 1, image, &ref_features, canvas))
            .collect::<AlignResult<_>>()?;

        let attempted = outcomes.len();
        let mut pairs = Vec::with_capacity(attempted);
        let mut aligned = vec![AlignedImage::reference(reference.clone())];
        let mut matched_reference = Vec::new();
        for outcome in outcomes {
            pairs.push(outcome.pair);
            aligned.extend(outcome.aligned);
            matched_reference.extend(outcome.matched_reference);
        }
        matched_reference.sort_unstable();
        matched_reference.dedup();

        if aligned.len() == 1 {
            return Err(AlignError::NoCandidatesAligned { attempted });
        }
        log::info!("{} of {} candidates aligned", aligned.len() - 1, attempted);

        log::debug!("stage {:?}", Stage::OverlapComputation);
        let masks: Vec<&ValidityMask> = aligned.iter().map(AlignedImage::mask).collect();
        let overlap = resolve_overlap(&masks, self.config.overlap.erosion_radius)?;
        log::info!(
            "common overlap {}x{} at ({}, {})",
            overlap.width,
            overlap.height,
            overlap.x,
            overlap.y
        );

        Ok(AlignmentOutput {
            pairs,
            aligned,
            overlap,
            reference_keypoints: ref_features.keypoints().to_vec(),
            matched_reference,
        })
    }

    fn extract(&self, image: &RasterImage) -> AlignResult<FeatureSet> {
        let gray = imageops::grayscale(image);
        self.extractor.extract_at_least(&gray, self.config.min_keypoints)
    }

    fn align_candidate(
        &self,
        index: usize,
        image: &RasterImage,
        ref_features: &FeatureSet,
        canvas: (u32, u32),
    ) -> AlignResult<CandidateOutcome> {
        let mut pair = PairResult {
            index,
            ref_keypoints: ref_features.len(),
            cand_keypoints: 0,
            correspondences: 0,
            inliers: 0,
            transform: None,
            status: PairStatus::Aligned,
        };

        log::debug!("candidate {index}: stage {:?}", Stage::FeatureExtraction);
        let features = stage!(self.extract(image), pair, Stage::FeatureExtraction);
        pair.cand_keypoints = features.len();

        log::debug!("candidate {index}: stage {:?}", Stage::Matching);
        let matches = match_descriptors(ref_features.descriptors(), features.descriptors(), self.config.matching.ratio);
        pair.correspondences = matches.len();
        let needed = self.config.ransac.min_inliers;
        if matches.len() < needed {
            let reason = format!("{} correspondences, need at least {needed}", matches.len());
            return Ok(CandidateOutcome::skipped(pair, Stage::Matching, reason));
        }

        log::debug!("candidate {index}: stage {:?}", Stage::TransformEstimation);
        let (cand_points, ref_points): (Vec<_>, Vec<_>) = matches
            .iter()
            .map(|m| {
                (
                    features.keypoints()[m.cand_idx].position(),
                    ref_features.keypoints()[m.ref_idx].position(),
                )
            })
            .unzip();
        let ransac = self.ransac_config_for(index);
        let estimate = stage!(
            estimate_similarity(&cand_points, &ref_points, &ransac),
            pair,
            Stage::TransformEstimation
        );
        pair.inliers = estimate.inlier_count();
        pair.transform = Some(estimate.transform);

        log::debug!("candidate {index}: stage {:?}", Stage::Warping);
        let (warped, mask) = stage!(warp(image, &estimate.transform, canvas), pair, Stage::Warping);
        let aligned = AlignedImage::new(index, warped, mask, estimate.transform)?;

        let (tx, ty) = estimate.transform.translation();
        log::info!(
            "candidate {index}: {} keypoints, {} matches, {} inliers, scale {:.4}, rotation {:.2} deg, shift ({:.1}, {:.1})",
            pair.cand_keypoints,
            pair.correspondences,
            pair.inliers,
            estimate.transform.scale(),
            estimate.transform.rotation().to_degrees(),
            tx,
            ty
        );

        Ok(CandidateOutcome {
            pair,
            aligned: Some(aligned),
            matched_reference: matches.iter().map(|m| m.ref_idx).collect(),
        })
    }

    /// Each candidate gets its own stream so results do not depend on scheduling.
    fn ransac_config_for(&self, index: usize) -> RansacConfig {
        RansacConfig {
            seed: self.config.ransac.seed.map(|s| s.wrapping_add(index as u64)),
            ..self.config.ransac.clone()
        }
    }
}

/// Fluent construction of an [`Aligner`].
#[derive(Debug, Clone, Default)]
pub struct AlignerBuilder {
    config: AlignConfig,
}

impl AlignerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: AlignConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fast_preset(self) -> Self {
        self.config(AlignConfig::fast_preset())
    }

    pub fn precise_preset(self) -> Self {
        self.config(AlignConfig::precise_preset())
    }

    pub fn features(mut self, n_features: usize) -> Self {
        self.config.orb.n_features = n_features;
        self
    }

    pub fn fast_threshold(mut self, threshold: u8) -> Self {
        self.config.orb.threshold = threshold;
        self
    }

    pub fn ratio(mut self, ratio: f32) -> Self {
        self.config.matching.ratio = ratio;
        self
    }

    pub fn erosion_radius(mut self, radius: u8) -> Self {
        self.config.overlap.erosion_radius = radius;
        self
    }

    pub fn threads(mut self, n_threads: usize) -> Self {
        self.config.n_threads = n_threads;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.ransac.seed = Some(seed);
        self
    }

    pub fn ransac_threshold(mut self, threshold: f64) -> Self {
        self.config.ransac.threshold = threshold;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.ransac.max_iterations = max_iterations;
        self
    }

    pub fn min_inliers(mut self, min_inliers: usize) -> Self {
        self.config.ransac.min_inliers = min_inliers;
        self
    }

    pub fn min_keypoints(mut self, min_keypoints: usize) -> Self {
        self.config.min_keypoints = min_keypoints;
        self
    }

    pub fn build_config(self) -> AlignConfig {
        self.config
    }

    pub fn build(self) -> AlignResult<Aligner> {
        Aligner::new(self.config)
    }
}
