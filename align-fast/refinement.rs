use image::GrayImage;

/// Subpixel refinement and orientation computation
pub struct KeypointRefinement;

impl KeypointRefinement {
    /// Refine a score-map maximum to subpixel accuracy using quadratic surface fitting.
    ///
    /// Returns the refined `(x, y)`; the offset is clamped to half a pixel and
    /// degenerate fits keep the integer position.
    pub fn refine_subpixel(scores: &[f32], width: usize, height: usize, x: usize, y: usize) -> (f32, f32) {
        let (fx, fy) = (x as f32, y as f32);

        if x < 1 || y < 1 || x + 1 >= width || y + 1 >= height {
            return (fx, fy);
        }

        let s = |dx: i32, dy: i32| scores[(y as i32 + dy) as usize * width + (x as i32 + dx) as usize];

        // Fit f(x,y) = Ax² + By² + Cxy + Dx + Ey + F with finite differences
        let dx = (s(1, 0) - s(-1, 0)) / 2.0;
        let dy = (s(0, 1) - s(0, -1)) / 2.0;
        let dxx = s(1, 0) - 2.0 * s(0, 0) + s(-1, 0);
        let dyy = s(0, 1) - 2.0 * s(0, 0) + s(0, -1);
        let dxy = (s(1, 1) - s(-1, 1) - s(1, -1) + s(-1, -1)) / 4.0;

        let det = dxx * dyy - dxy * dxy;
        if det.abs() < 1e-6 {
            return (fx, fy);
        }

        let offset_x = (-(dyy * dx - dxy * dy) / det).clamp(-0.5, 0.5);
        let offset_y = (-(dxx * dy - dxy * dx) / det).clamp(-0.5, 0.5);

        (fx + offset_x, fy + offset_y)
    }

    /// Half-widths of the circular patch, one entry per row offset `0..=radius`.
    pub fn circle_extents(radius: usize) -> Vec<i32> {
        let r2 = (radius * radius) as f64;
        (0..=radius)
            .map(|v| (r2 - (v * v) as f64).sqrt().floor() as i32)
            .collect()
    }

    /// Orientation by the intensity centroid of a circular patch of `radius`
    /// around `(x, y)`, in radians with y pointing down.
    ///
    /// Returns 0.0 when the patch does not fit or carries no moment.
    pub fn compute_orientation(img: &GrayImage, x: usize, y: usize, extents: &[i32]) -> f32 {
        let radius = extents.len().saturating_sub(1);
        let width = img.width() as usize;
        let height = img.height() as usize;
        if x < radius || y < radius || x + radius >= width || y + radius >= height {
            return 0.0;
        }

        let raw = img.as_raw();
        let mut m10 = 0i64;
        let mut m01 = 0i64;

        for (v, &umax) in extents.iter().enumerate() {
            let v = v as i32;
            for dv in [v, -v].into_iter().take(if v == 0 { 1 } else { 2 }) {
                let row = (y as i32 + dv) as usize * width;
                for du in -umax..=umax {
                    let val = raw[row + (x as i32 + du) as usize] as i64;
                    m10 += du as i64 * val;
                    m01 += dv as i64 * val;
                }
            }
        }

        if m10 == 0 && m01 == 0 {
            0.0
        } else {
            (m01 as f32).atan2(m10 as f32)
        }
    }
}
