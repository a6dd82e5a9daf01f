//! RANSAC (Random Sample Consensus) for robust similarity estimation.
//!
//! Minimal samples are two correspondences solved in closed form. The best
//! hypothesis (most inliers) is kept, the iteration budget shrinks as the
//! inlier ratio improves, and the winner is refitted by least squares over
//! its inliers.

pub mod transforms;

pub use transforms::{fit_similarity, similarity_from_pair};

use align_core::{AlignError, AlignResult, RansacConfig, SimilarityTransform};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Correspondences per minimal sample.
pub const SAMPLE_SIZE: usize = 2;

/// Upper bound on refit / re-count rounds after sampling.
const MAX_REFINEMENTS: usize = 5;

/// Result of RANSAC estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct RansacResult {
    /// Best transformation found, candidate → reference.
    pub transform: SimilarityTransform,
    /// Indices of inlier correspondences, ascending.
    pub inliers: Vec<usize>,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Final inlier ratio.
    pub inlier_ratio: f64,
}

impl RansacResult {
    pub fn inlier_count(&self) -> usize {
        self.inliers.len()
    }

    /// Per-correspondence inlier flags for `n` correspondences.
    pub fn inlier_mask(&self, n: usize) -> Vec<bool> {
        let mut mask = vec![false; n];
        for &i in &self.inliers {
            if let Some(flag) = mask.get_mut(i) {
                *flag = true;
            }
        }
        mask
    }
}

/// Estimate the similarity mapping `cand_points[i]` onto `ref_points[i]`.
///
/// Fails with `EstimationFailed` when the inputs differ in length, hold fewer
/// than two correspondences, never yield a non-degenerate sample, or the best
/// model keeps fewer than `config.min_inliers` inliers.
pub fn estimate_similarity(
    cand_points: &[(f64, f64)],
    ref_points: &[(f64, f64)],
    config: &RansacConfig,
) -> AlignResult<RansacResult> {
    let n = cand_points.len();
    if n != ref_points.len() {
        return Err(AlignError::EstimationFailed(format!(
            "{n} candidate points but {} reference points",
            ref_points.len()
        )));
    }
    if n < SAMPLE_SIZE {
        return Err(AlignError::EstimationFailed(format!(
            "{n} correspondences, need at least {SAMPLE_SIZE}"
        )));
    }

    let mut rng: ChaCha8Rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    };

    let mut best_transform: Option<SimilarityTransform> = None;
    let mut best_inliers: Vec<usize> = Vec::new();

    let max_iter = config.max_iterations;
    let mut needed = max_iter;
    let mut iterations = 0;

    while iterations < needed {
        iterations += 1;

        let (i, j) = random_pair(&mut rng, n);
        let Some(model) = similarity_from_pair(cand_points[i], cand_points[j], ref_points[i], ref_points[j]) else {
            continue;
        };

        let inliers = count_inliers(cand_points, ref_points, &model, config.threshold);
        if inliers.len() > best_inliers.len() {
            best_inliers = inliers;
            best_transform = Some(model);

            // Adaptive iteration count based on inlier ratio
            let inlier_ratio = best_inliers.len() as f64 / n as f64;
            needed = adaptive_iterations(inlier_ratio, SAMPLE_SIZE, config.confidence).min(max_iter);
        }
    }

    let Some(mut transform) = best_transform else {
        return Err(AlignError::EstimationFailed(format!(
            "no non-degenerate sample among {n} correspondences"
        )));
    };

    if best_inliers.len() < config.min_inliers {
        return Err(AlignError::EstimationFailed(format!(
            "best model has {} inliers, need at least {}",
            best_inliers.len(),
            config.min_inliers
        )));
    }

    // Least-squares refit on the inliers, repeated until the inlier set settles.
    // The minimal-sample model survives only when the fit is degenerate.
    for _ in 0..MAX_REFINEMENTS {
        let inlier_cand: Vec<(f64, f64)> = best_inliers.iter().map(|&i| cand_points[i]).collect();
        let inlier_ref: Vec<(f64, f64)> = best_inliers.iter().map(|&i| ref_points[i]).collect();
        let Some(refined) = fit_similarity(&inlier_cand, &inlier_ref) else {
            break;
        };
        transform = refined;

        let refreshed = count_inliers(cand_points, ref_points, &transform, config.threshold);
        if refreshed == best_inliers || refreshed.len() < config.min_inliers {
            break;
        }
        best_inliers = refreshed;
    }

    let inlier_ratio = best_inliers.len() as f64 / n as f64;
    log::debug!(
        "RANSAC kept {}/{} inliers after {} iterations (scale {:.4}, rotation {:.4} rad)",
        best_inliers.len(),
        n,
        iterations,
        transform.scale(),
        transform.rotation()
    );

    Ok(RansacResult {
        transform,
        inliers: best_inliers,
        iterations,
        inlier_ratio,
    })
}

/// Two distinct indices in `0..n`, uniformly.
fn random_pair<R: Rng>(rng: &mut R, n: usize) -> (usize, usize) {
    debug_assert!(n >= 2, "cannot sample 2 indices from {n}");
    let i = rng.random_range(0..n);
    let mut j = rng.random_range(0..n - 1);
    if j >= i {
        j += 1;
    }
    (i, j)
}

/// Indices whose reprojection error is within `threshold` pixels.
pub fn count_inliers(
    cand_points: &[(f64, f64)],
    ref_points: &[(f64, f64)],
    transform: &SimilarityTransform,
    threshold: f64,
) -> Vec<usize> {
    let threshold_sq = threshold * threshold;
    cand_points
        .iter()
        .zip(ref_points)
        .enumerate()
        .filter_map(|(i, (&c, &(rx, ry)))| {
            let (px, py) = transform.apply(c);
            let (dx, dy) = (px - rx, py - ry);
            (dx * dx + dy * dy <= threshold_sq).then_some(i)
        })
        .collect()
}

/// Compute adaptive iteration count for early termination.
pub fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    if inlier_ratio <= 0.0 || inlier_ratio >= 1.0 {
        return 1;
    }

    // N = log(1 - confidence) / log(1 - w^n)
    // where w = inlier_ratio, n = sample_size
    let w_n = inlier_ratio.powi(sample_size as i32);
    if w_n >= 1.0 {
        return 1;
    }

    let log_conf = (1.0 - confidence).ln();
    let log_outlier = (1.0 - w_n).ln();

    if log_outlier >= 0.0 {
        return usize::MAX;
    }

    (log_conf / log_outlier).ceil().max(1.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};

    fn seeded(seed: u64) -> RansacConfig {
        RansacConfig {
            seed: Some(seed),
            ..RansacConfig::default()
        }
    }

    fn grid_points(n: usize) -> Vec<(f64, f64)> {
        (0..n)
            .map(|i| (((i * 37) % 97) as f64 * 8.0, ((i * 53) % 89) as f64 * 6.0))
            .collect()
    }

    #[test]
    fn test_adaptive_iterations() {
        // ln(0.005) / ln(0.75) = 18.4
        assert_eq!(adaptive_iterations(0.5, 2, 0.995), 19);
        assert_eq!(adaptive_iterations(1.0, 2, 0.995), 1);
        assert_eq!(adaptive_iterations(0.0, 2, 0.995), 1);
        assert!(adaptive_iterations(0.1, 2, 0.995) > adaptive_iterations(0.5, 2, 0.995));
    }

    #[test]
    fn test_exact_recovery() {
        let known = SimilarityTransform::new(1.1, 0.3, 12.0, -7.0);
        let cand = grid_points(30);
        let refp: Vec<(f64, f64)> = cand.iter().map(|&p| known.apply(p)).collect();

        let result = estimate_similarity(&cand, &refp, &seeded(1)).unwrap();
        assert_eq!(result.inlier_count(), 30);
        assert!((result.inlier_ratio - 1.0).abs() < 1e-12);
        let (a, b, tx, ty) = result.transform.params();
        let (ka, kb, ktx, kty) = known.params();
        assert!((a - ka).abs() < 1e-9 && (b - kb).abs() < 1e-9);
        assert!((tx - ktx).abs() < 1e-6 && (ty - kty).abs() < 1e-6);
        // A perfect sample terminates immediately
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_outliers_rejected() {
        let known = SimilarityTransform::new(0.95, -0.2, 40.0, 25.0);
        let cand = grid_points(60);
        let refp: Vec<(f64, f64)> = cand
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let (x, y) = known.apply(p);
                if i < 40 {
                    (x, y)
                } else {
                    let push = 30.0 + (i % 7) as f64 * 11.0;
                    (x + push, y - push * 0.5)
                }
            })
            .collect();

        let result = estimate_similarity(&cand, &refp, &seeded(2)).unwrap();
        assert_eq!(result.inliers, (0..40).collect::<Vec<_>>());
        assert!((result.transform.scale() - 0.95).abs() < 1e-9);

        let mask = result.inlier_mask(60);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 40);
        assert!(!mask[45]);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let known = SimilarityTransform::new(1.0, 0.1, 3.0, 4.0);
        let cand = grid_points(50);
        let refp: Vec<(f64, f64)> = cand
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let (x, y) = known.apply(p);
                if i % 3 == 0 { (x + 100.0, y) } else { (x, y) }
            })
            .collect();

        let first = estimate_similarity(&cand, &refp, &seeded(9)).unwrap();
        let second = estimate_similarity(&cand, &refp, &seeded(9)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_length_mismatch_fails() {
        let err = estimate_similarity(&[(0.0, 0.0), (1.0, 1.0)], &[(0.0, 0.0)], &seeded(0)).unwrap_err();
        assert!(matches!(err, AlignError::EstimationFailed(_)));
    }

    #[test]
    fn test_too_few_points_fails() {
        let err = estimate_similarity(&[(0.0, 0.0)], &[(1.0, 1.0)], &seeded(0)).unwrap_err();
        assert!(matches!(err, AlignError::EstimationFailed(_)));
        assert!(estimate_similarity(&[], &[], &seeded(0)).is_err());
    }

    #[test]
    fn test_coincident_points_fail() {
        let cand = vec![(5.0, 5.0); 10];
        let refp = vec![(7.0, 7.0); 10];
        let err = estimate_similarity(&cand, &refp, &seeded(0)).unwrap_err();
        assert!(matches!(err, AlignError::EstimationFailed(ref msg) if msg.contains("non-degenerate")));
    }

    #[test]
    fn test_inlier_floor() {
        let cand = vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)];
        let refp: Vec<(f64, f64)> = cand.iter().map(|&(x, y)| (x + 1.0, y + 1.0)).collect();
        let err = estimate_similarity(&cand, &refp, &seeded(0)).unwrap_err();
        assert!(matches!(err, AlignError::EstimationFailed(ref msg) if msg.contains("3 inliers")));

        let lenient = RansacConfig {
            min_inliers: 3,
            ..seeded(0)
        };
        assert!(estimate_similarity(&cand, &refp, &lenient).is_ok());
    }

    #[test]
    fn test_noisy_translation_is_refined_for_every_seed() {
        // Sub-pixel keypoint jitter at a 99% inlier ratio: sampling stops after a
        // couple of iterations, so accuracy has to come from the refit.
        let mut noise = ChaCha8Rng::seed_from_u64(77);
        let cand: Vec<(f64, f64)> = (0..400)
            .map(|i| (((i * 37) % 101) as f64 * 7.5, ((i * 53) % 97) as f64 * 6.0))
            .collect();
        let refp: Vec<(f64, f64)> = cand
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                if i % 100 == 0 {
                    return (x + 60.0, y - 45.0);
                }
                let jx: f64 = noise.random_range(-0.9..0.9);
                let jy: f64 = noise.random_range(-0.9..0.9);
                (x + 10.0 + jx, y + 5.0 + jy)
            })
            .collect();

        for seed in 0..40 {
            let result = estimate_similarity(&cand, &refp, &seeded(seed)).unwrap();
            let (tx, ty) = result.transform.translation();
            assert!((tx - 10.0).abs() < 0.25, "seed {seed}: tx {tx}");
            assert!((ty - 5.0).abs() < 0.25, "seed {seed}: ty {ty}");
            assert!((result.transform.scale() - 1.0).abs() < 1e-3, "seed {seed}");
            assert!(result.transform.rotation().abs() < 1e-3, "seed {seed}");
            assert_eq!(result.inlier_count(), 396, "seed {seed}");
        }
    }

    #[test]
    fn test_final_model_is_least_squares_fit() {
        // Every location is observed twice with offsets 0.8 and 1.2. Any
        // minimal sample lands on 0.8, 1.2 or a skewed mix; only the
        // least-squares fit over all inliers averages to exactly 1.0.
        let cand: Vec<(f64, f64)> = (0..60)
            .map(|i| (((i / 2) % 10) as f64 * 40.0, ((i / 2) / 10) as f64 * 40.0))
            .collect();
        let refp: Vec<(f64, f64)> = cand
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| (x + if i % 2 == 0 { 0.8 } else { 1.2 }, y))
            .collect();

        let result = estimate_similarity(&cand, &refp, &seeded(3)).unwrap();
        assert_eq!(result.inlier_count(), 60);
        let (tx, ty) = result.transform.translation();
        assert!((tx - 1.0).abs() < 1e-9, "tx {tx}");
        assert!(ty.abs() < 1e-9, "ty {ty}");
        assert!((result.transform.scale() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unseeded_run_still_recovers() {
        let known = SimilarityTransform::translation_only(50.0, 30.0);
        let cand = grid_points(20);
        let refp: Vec<(f64, f64)> = cand.iter().map(|&p| known.apply(p)).collect();
        let result = estimate_similarity(&cand, &refp, &RansacConfig::default()).unwrap();
        let (tx, ty) = result.transform.translation();
        assert!((tx - 50.0).abs() < 1e-6 && (ty - 30.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn recovers_known_similarity(
            scale in 0.5f64..2.0,
            angle in -3.1f64..3.1,
            tx in -100.0f64..100.0,
            ty in -100.0f64..100.0,
            seed in any::<u64>(),
        ) {
            let known = SimilarityTransform::new(scale, angle, tx, ty);
            let cand = grid_points(12);
            let refp: Vec<(f64, f64)> = cand.iter().map(|&p| known.apply(p)).collect();

            let result = estimate_similarity(&cand, &refp, &seeded(seed)).unwrap();
            prop_assert_eq!(result.inlier_count(), 12);
            prop_assert!((result.transform.scale() - scale).abs() < 1e-6);
            let mut d_angle = result.transform.rotation() - angle;
            if d_angle > std::f64::consts::PI { d_angle -= 2.0 * std::f64::consts::PI; }
            if d_angle < -std::f64::consts::PI { d_angle += 2.0 * std::f64::consts::PI; }
            prop_assert!(d_angle.abs() < 1e-6);
            let (rtx, rty) = result.transform.translation();
            prop_assert!((rtx - tx).abs() < 1e-5 && (rty - ty).abs() < 1e-5);
        }
    }
}
