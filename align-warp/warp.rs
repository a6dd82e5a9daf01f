use align_core::{AlignError, AlignResult, RasterImage, SimilarityTransform, ValidityMask};
use rayon::prelude::*;

/// Resample `image` into a `canvas`-sized frame through `transform`
/// (source → canvas coordinates).
///
/// Every canvas pixel is inverse-mapped into the source. Colour is bilinear
/// with out-of-bounds neighbours contributing black; the validity mask uses
/// the same mapping with nearest-neighbour sampling and is 255 where the
/// nearest source pixel exists, 0 elsewhere.
pub fn warp(
    image: &RasterImage,
    transform: &SimilarityTransform,
    canvas: (u32, u32),
) -> AlignResult<(RasterImage, ValidityMask)> {
    let inverse = transform
        .inverse()
        .filter(SimilarityTransform::is_finite)
        .ok_or_else(|| AlignError::DegenerateTransform(format!("{transform:?} has no inverse")))?;

    let (cw, ch) = canvas;
    let mut colour = RasterImage::new(cw, ch);
    let mut mask = ValidityMask::new(cw, ch);
    if cw == 0 || ch == 0 {
        return Ok((colour, mask));
    }

    let src = Source::new(image);
    let row_len = cw as usize;

    colour
        .par_chunks_mut(row_len * 3)
        .zip(mask.par_chunks_mut(row_len))
        .enumerate()
        .for_each(|(y, (colour_row, mask_row))| {
            for x in 0..row_len {
                let (sx, sy) = inverse.apply((x as f64, y as f64));
                colour_row[x * 3..x * 3 + 3].copy_from_slice(&src.bilinear(sx, sy));
                mask_row[x] = if src.contains_nearest(sx, sy) { 255 } else { 0 };
            }
        });

    Ok((colour, mask))
}

struct Source<'a> {
    raw: &'a [u8],
    width: i64,
    height: i64,
}

impl<'a> Source<'a> {
    fn new(image: &'a RasterImage) -> Self {
        Self {
            raw: image.as_raw(),
            width: image.width() as i64,
            height: image.height() as i64,
        }
    }

    #[inline]
    fn pixel(&self, x: i64, y: i64) -> [f64; 3] {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return [0.0; 3];
        }
        let i = ((y * self.width + x) * 3) as usize;
        [self.raw[i] as f64, self.raw[i + 1] as f64, self.raw[i + 2] as f64]
    }

    fn bilinear(&self, x: f64, y: f64) -> [u8; 3] {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let p00 = self.pixel(x0, y0);
        let p10 = self.pixel(x0 + 1, y0);
        let p01 = self.pixel(x0, y0 + 1);
        let p11 = self.pixel(x0 + 1, y0 + 1);

        let mut out = [0u8; 3];
        for c in 0..3 {
            let top = p00[c] * (1.0 - fx) + p10[c] * fx;
            let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
            out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
        out
    }

    #[inline]
    fn contains_nearest(&self, x: f64, y: f64) -> bool {
        let (nx, ny) = (x.round(), y.round());
        nx >= 0.0 && ny >= 0.0 && nx < self.width as f64 && ny < self.height as f64
    }
}
