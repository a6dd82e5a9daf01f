//! Closed-form similarity solvers.
//!
//! Points are `(x, y)` pairs; every solver maps candidate points onto
//! reference points.

use align_core::SimilarityTransform;

/// Squared candidate span below which a two-point sample is degenerate.
const MIN_SPAN_SQ: f64 = 1e-6;

type Point = (f64, f64);

/// Exact similarity through two correspondences.
///
/// Treating points as complex numbers, `a + ib = (r1 - r0) / (c1 - c0)`.
/// Returns `None` when the candidate points coincide or the reference points
/// collapse onto each other.
pub fn similarity_from_pair(c0: Point, c1: Point, r0: Point, r1: Point) -> Option<SimilarityTransform> {
    let (dcx, dcy) = (c1.0 - c0.0, c1.1 - c0.1);
    let (drx, dry) = (r1.0 - r0.0, r1.1 - r0.1);

    let span = dcx * dcx + dcy * dcy;
    if span < MIN_SPAN_SQ {
        return None;
    }

    let a = (drx * dcx + dry * dcy) / span;
    let b = (dry * dcx - drx * dcy) / span;
    if a * a + b * b < 1e-12 {
        return None;
    }

    let tx = r0.0 - (a * c0.0 - b * c0.1);
    let ty = r0.1 - (b * c0.0 + a * c0.1);
    let model = SimilarityTransform::from_params(a, b, tx, ty);
    model.is_finite().then_some(model)
}

fn centroid(points: &[Point]) -> Point {
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    (sx / n, sy / n)
}

/// Least-squares similarity (Procrustes) over all correspondences.
///
/// Returns `None` for fewer than two points or when the candidate points have
/// no spread.
pub fn fit_similarity(cand_points: &[Point], ref_points: &[Point]) -> Option<SimilarityTransform> {
    if cand_points.len() < 2 || cand_points.len() != ref_points.len() {
        return None;
    }

    let cand_centroid = centroid(cand_points);
    let ref_centroid = centroid(ref_points);

    let mut num_a = 0.0;
    let mut num_b = 0.0;
    let mut cand_var = 0.0;
    for (c, r) in cand_points.iter().zip(ref_points) {
        let (cx, cy) = (c.0 - cand_centroid.0, c.1 - cand_centroid.1);
        let (rx, ry) = (r.0 - ref_centroid.0, r.1 - ref_centroid.1);
        num_a += cx * rx + cy * ry;
        num_b += cx * ry - cy * rx;
        cand_var += cx * cx + cy * cy;
    }

    if cand_var < 1e-10 {
        return None;
    }

    let a = num_a / cand_var;
    let b = num_b / cand_var;
    if a * a + b * b < 1e-12 {
        return None;
    }

    let tx = ref_centroid.0 - (a * cand_centroid.0 - b * cand_centroid.1);
    let ty = ref_centroid.1 - (b * cand_centroid.0 + a * cand_centroid.1);
    let model = SimilarityTransform::from_params(a, b, tx, ty);
    model.is_finite().then_some(model)
}
