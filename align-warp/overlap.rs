use align_core::{AlignError, AlignResult, OverlapRect, ValidityMask};
use image::{Luma, imageops};
use imageproc::distance_transform::Norm;
use imageproc::morphology::erode;
use imageproc::region_labelling::{Connectivity, connected_components};

/// Pixel-wise AND of equally sized masks; the result is 255 or 0.
pub fn combine_masks(masks: &[&ValidityMask]) -> AlignResult<ValidityMask> {
    let Some((first, rest)) = masks.split_first() else {
        return Err(AlignError::NoOverlap("no masks to combine".into()));
    };

    let (width, height) = first.dimensions();
    let mut combined = ValidityMask::from_fn(width, height, |x, y| {
        if first.get_pixel(x, y)[0] > 0 { Luma([255]) } else { Luma([0]) }
    });

    for mask in rest {
        if mask.dimensions() != (width, height) {
            return Err(AlignError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                width: mask.width(),
                height: mask.height(),
            });
        }
        for (out, &m) in combined.iter_mut().zip(mask.as_raw()) {
            if m == 0 {
                *out = 0;
            }
        }
    }

    Ok(combined)
}

/// Erode with a `(2r+1) x (2r+1)` square. Pixels beyond the mask edge count
/// as background, so a fully valid mask shrinks by `r` on every side.
pub fn erode_mask(mask: &ValidityMask, radius: u8) -> ValidityMask {
    if radius == 0 {
        return mask.clone();
    }

    let (width, height) = mask.dimensions();
    let mut padded = ValidityMask::new(width + 2, height + 2);
    imageops::replace(&mut padded, mask, 1, 1);

    let eroded = erode(&padded, Norm::LInf, radius);
    imageops::crop_imm(&eroded, 1, 1, width, height).to_image()
}

/// Bounding box and pixel count of the largest 8-connected foreground
/// component. Equal areas resolve to the component labelled first in raster
/// order.
pub fn largest_component(mask: &ValidityMask) -> Option<(OverlapRect, u64)> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let n_labels = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    if n_labels == 0 {
        return None;
    }

    #[derive(Clone, Copy)]
    struct Extent {
        area: u64,
        min_x: u32,
        min_y: u32,
        max_x: u32,
        max_y: u32,
    }

    let mut extents = vec![
        Extent {
            area: 0,
            min_x: u32::MAX,
            min_y: u32::MAX,
            max_x: 0,
            max_y: 0,
        };
        n_labels + 1
    ];

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        let e = &mut extents[label];
        e.area += 1;
        e.min_x = e.min_x.min(x);
        e.min_y = e.min_y.min(y);
        e.max_x = e.max_x.max(x);
        e.max_y = e.max_y.max(y);
    }

    let mut best: Option<Extent> = None;
    for e in extents.iter().skip(1).filter(|e| e.area > 0) {
        if best.is_none_or(|b| e.area > b.area) {
            best = Some(*e);
        }
    }

    best.map(|e| {
        let rect = OverlapRect {
            x: e.min_x,
            y: e.min_y,
            width: e.max_x - e.min_x + 1,
            height: e.max_y - e.min_y + 1,
        };
        (rect, e.area)
    })
}

/// Rectangle valid in every mask: AND the masks, erode by `erosion_radius`,
/// keep the largest 8-connected component and take its bounding box.
pub fn resolve_overlap(masks: &[&ValidityMask], erosion_radius: u8) -> AlignResult<OverlapRect> {
    let combined = combine_masks(masks)?;
    let valid = combined.as_raw().iter().filter(|&&v| v > 0).count();
    log::debug!(
        "combined {} masks: {} of {} pixels valid",
        masks.len(),
        valid,
        combined.as_raw().len()
    );
    if valid == 0 {
        return Err(AlignError::NoOverlap("combined mask is empty".into()));
    }

    let eroded = erode_mask(&combined, erosion_radius);
    let (rect, area) = largest_component(&eroded).ok_or_else(|| {
        AlignError::NoOverlap(format!("nothing left after erosion with radius {erosion_radius}"))
    })?;

    if rect.width == 0 || rect.height == 0 {
        return Err(AlignError::NoOverlap(format!("degenerate bounding box {rect:?}")));
    }

    log::debug!(
        "largest component covers {area} pixels, bounding box {}x{} at ({}, {})",
        rect.width,
        rect.height,
        rect.x,
        rect.y
    );
    Ok(rect)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(width: u32, height: u32) -> ValidityMask {
        ValidityMask::from_pixel(width, height, Luma([255]))
    }

    fn rect_mask(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> ValidityMask {
        ValidityMask::from_fn(width, height, |x, y| {
            if x >= x0 && x < x1 && y >= y0 && y < y1 { Luma([255]) } else { Luma([0]) }
        })
    }

    #[test]
    fn test_full_masks_without_erosion() {
        let (a, b) = (full(40, 30), full(40, 30));
        let rect = resolve_overlap(&[&a, &b], 0).unwrap();
        assert_eq!(rect, OverlapRect { x: 0, y: 0, width: 40, height: 30 });
    }

    #[test]
    fn test_erosion_insets_by_radius() {
        let a = full(40, 30);
        let rect = resolve_overlap(&[&a], 2).unwrap();
        assert_eq!(rect, OverlapRect { x: 2, y: 2, width: 36, height: 26 });
    }

    #[test]
    fn test_intersection_of_shifted_masks() {
        let a = full(100, 80);
        let b = rect_mask(100, 80, 10, 5, 100, 80);
        let c = rect_mask(100, 80, 0, 0, 90, 70);
        let rect = resolve_overlap(&[&a, &b, &c], 0).unwrap();
        assert_eq!(rect, OverlapRect { x: 10, y: 5, width: 80, height: 65 });

        let rect = resolve_overlap(&[&a, &b, &c], 3).unwrap();
        assert_eq!(rect, OverlapRect { x: 13, y: 8, width: 74, height: 59 });
    }

    #[test]
    fn test_largest_component_wins() {
        let mut mask = rect_mask(50, 50, 2, 2, 8, 8);
        for y in 20..40 {
            for x in 25..45 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let rect = resolve_overlap(&[&mask], 0).unwrap();
        assert_eq!(rect, OverlapRect { x: 25, y: 20, width: 20, height: 20 });
    }

    #[test]
    fn test_equal_components_pick_first_in_raster_order() {
        let mut mask = rect_mask(30, 30, 20, 2, 25, 7);
        for y in 15..20 {
            for x in 2..7 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let (rect, area) = largest_component(&mask).unwrap();
        assert_eq!(area, 25);
        assert_eq!((rect.x, rect.y), (20, 2));
    }

    #[test]
    fn test_diagonal_pixels_connect() {
        let mut mask = ValidityMask::new(10, 10);
        for i in 2..7 {
            mask.put_pixel(i, i, Luma([255]));
        }
        let (rect, area) = largest_component(&mask).unwrap();
        assert_eq!(area, 5);
        assert_eq!(rect, OverlapRect { x: 2, y: 2, width: 5, height: 5 });
    }

    #[test]
    fn test_disjoint_masks_have_no_overlap() {
        let a = rect_mask(40, 40, 0, 0, 20, 40);
        let b = rect_mask(40, 40, 20, 0, 40, 40);
        assert!(matches!(resolve_overlap(&[&a, &b], 0), Err(AlignError::NoOverlap(_))));
    }

    #[test]
    fn test_erosion_can_consume_everything() {
        let a = rect_mask(40, 40, 10, 10, 14, 14);
        assert!(matches!(resolve_overlap(&[&a], 3), Err(AlignError::NoOverlap(_))));
    }

    #[test]
    fn test_no_masks() {
        assert!(matches!(resolve_overlap(&[], 0), Err(AlignError::NoOverlap(_))));
    }

    #[test]
    fn test_dimension_mismatch() {
        let (a, b) = (full(40, 30), full(30, 40));
        assert!(matches!(
            resolve_overlap(&[&a, &b], 0),
            Err(AlignError::DimensionMismatch { expected_width: 40, width: 30, .. })
        ));
    }

    #[test]
    fn test_combine_normalises_values() {
        let a = ValidityMask::from_pixel(3, 3, Luma([7]));
        let combined = combine_masks(&[&a]).unwrap();
        assert!(combined.pixels().all(|p| p[0] == 255));
    }
}
