use crate::utils::has_consecutive_bits;
use image::GrayImage;
use rayon::prelude::*;

/// Corner detection algorithms (FAST and Harris)
pub struct CornerDetector;

impl CornerDetector {
    /// FAST circle offsets for corner detection
    pub const FAST_OFFSETS: [(i32, i32); 16] = [
        (0, -3), (1, -3), (2, -2), (3, -1),
        (3, 0), (3, 1), (2, 2), (1, 3),
        (0, 3), (-1, 3), (-2, 2), (-3, 1),
        (-3, 0), (-3, -1), (-2, -2), (-1, -3),
    ];

    /// Contiguous arc length required on the circle (FAST-9).
    pub const ARC_LENGTH: usize = 9;

    /// Radius of the Bresenham circle.
    pub const CIRCLE_RADIUS: usize = 3;

    pub const HARRIS_K: f64 = 0.04;

    /// Half-width of the Harris structure-tensor window (7x7).
    pub const HARRIS_RADIUS: i32 = 3;

    /// FAST score for every pixel of a level, zero where the pixel is no corner.
    pub fn fast_score_map(img: &GrayImage, threshold: u8) -> Vec<f32> {
        let width = img.width() as usize;
        let height = img.height() as usize;
        let border = Self::CIRCLE_RADIUS;
        let mut scores = vec![0.0f32; width * height];

        if width <= 2 * border || height <= 2 * border {
            return scores;
        }

        let raw = img.as_raw();
        scores
            .par_chunks_mut(width)
            .enumerate()
            .skip(border)
            .take(height - 2 * border)
            .for_each(|(y, row)| {
                for (x, score) in row.iter_mut().enumerate().take(width - border).skip(border) {
                    *score = Self::corner_score(raw, width, x, y, threshold);
                }
            });

        scores
    }

    /// Score of a FAST-9 corner at `(x, y)`: the summed excess over the
    /// threshold on the winning side, or 0.0 when no arc qualifies.
    ///
    /// The caller guarantees a 3-pixel border around `(x, y)`.
    pub fn corner_score(raw: &[u8], width: usize, x: usize, y: usize, threshold: u8) -> f32 {
        let center = raw[y * width + x] as i32;
        let t = threshold as i32;
        let ring = |i: usize| {
            let (dx, dy) = Self::FAST_OFFSETS[i];
            let px = (x as i32 + dx) as usize;
            let py = (y as i32 + dy) as usize;
            raw[py * width + px] as i32
        };

        // Any 9-pixel arc covers at least two compass points
        let mut bright_compass = 0;
        let mut dark_compass = 0;
        for i in [0, 4, 8, 12] {
            let v = ring(i);
            if v > center + t {
                bright_compass += 1;
            } else if v < center - t {
                dark_compass += 1;
            }
        }
        if bright_compass < 2 && dark_compass < 2 {
            return 0.0;
        }

        let mut bright_mask = 0u16;
        let mut dark_mask = 0u16;
        let mut bright_sum = 0i32;
        let mut dark_sum = 0i32;
        for i in 0..16 {
            let v = ring(i);
            if v > center + t {
                bright_mask |= 1 << i;
                bright_sum += v - center - t;
            } else if v < center - t {
                dark_mask |= 1 << i;
                dark_sum += center - t - v;
            }
        }

        let bright = has_consecutive_bits(bright_mask, Self::ARC_LENGTH);
        let dark = has_consecutive_bits(dark_mask, Self::ARC_LENGTH);
        match (bright, dark) {
            (true, true) => bright_sum.max(dark_sum) as f32,
            (true, false) => bright_sum as f32,
            (false, true) => dark_sum as f32,
            (false, false) => 0.0,
        }
    }

    /// 3x3 non-maximum suppression over a score map.
    ///
    /// Only pixels at least `margin` away from every edge are considered.
    /// Among equal neighbouring scores the first one in raster order wins.
    /// Results come back in raster order.
    pub fn non_maximum_suppression(
        scores: &[f32],
        width: usize,
        height: usize,
        margin: usize,
    ) -> Vec<(usize, usize, f32)> {
        let margin = margin.max(1);
        if width <= 2 * margin || height <= 2 * margin {
            return Vec::new();
        }

        (margin..height - margin)
            .into_par_iter()
            .flat_map_iter(|y| {
                (margin..width - margin).filter_map(move |x| {
                    let s = scores[y * width + x];
                    (s > 0.0 && Self::is_local_maximum(scores, width, x, y, s)).then_some((x, y, s))
                })
            })
            .collect()
    }

    fn is_local_maximum(scores: &[f32], width: usize, x: usize, y: usize, s: f32) -> bool {
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let n = scores[(y as i32 + dy) as usize * width + (x as i32 + dx) as usize];
                let earlier = dy < 0 || (dy == 0 && dx < 0);
                if n > s || (earlier && n == s) {
                    return false;
                }
            }
        }
        true
    }

    /// Harris corner response `det(M) - k * trace(M)^2` over a 7x7 window of
    /// Sobel gradients. Returns 0.0 when the window does not fit.
    pub fn harris_response(img: &GrayImage, x: usize, y: usize) -> f32 {
        let width = img.width() as usize;
        let height = img.height() as usize;
        let reach = Self::HARRIS_RADIUS as usize + 1;
        if x < reach || y < reach || x + reach >= width || y + reach >= height {
            return 0.0;
        }

        let raw = img.as_raw();
        let mut ixx = 0.0f64;
        let mut ixy = 0.0f64;
        let mut iyy = 0.0f64;

        for dy in -Self::HARRIS_RADIUS..=Self::HARRIS_RADIUS {
            for dx in -Self::HARRIS_RADIUS..=Self::HARRIS_RADIUS {
                let nx = (x as i32 + dx) as usize;
                let ny = (y as i32 + dy) as usize;
                let (gx, gy) = Self::compute_gradients(raw, width, nx, ny);
                ixx += gx * gx;
                ixy += gx * gy;
                iyy += gy * gy;
            }
        }

        let det = ixx * iyy - ixy * ixy;
        let trace = ixx + iyy;
        (det - Self::HARRIS_K * trace * trace) as f32
    }

    /// Compute image gradients using Sobel operator
    fn compute_gradients(raw: &[u8], width: usize, x: usize, y: usize) -> (f64, f64) {
        let p = |px: usize, py: usize| raw[py * width + px] as i32;

        // Sobel X kernel: [-1, 0, 1; -2, 0, 2; -1, 0, 1]
        let gx = p(x + 1, y - 1) + 2 * p(x + 1, y) + p(x + 1, y + 1)
            - p(x - 1, y - 1) - 2 * p(x - 1, y) - p(x - 1, y + 1);

        // Sobel Y kernel: [-1, -2, -1; 0, 0, 0; 1, 2, 1]
        let gy = p(x - 1, y + 1) + 2 * p(x, y + 1) + p(x + 1, y + 1)
            - p(x - 1, y - 1) - 2 * p(x, y - 1) - p(x + 1, y - 1);

        (gx as f64 / 8.0, gy as f64 / 8.0)
    }
}
