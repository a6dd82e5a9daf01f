/// Utility functions for corner detection algorithms

/// Whether the 16-bit circular mask holds at least `min_count` consecutive set bits.
///
/// Each bit stands for one pixel of the Bresenham circle; runs may wrap from
/// bit 15 back to bit 0.
pub fn has_consecutive_bits(mask: u16, min_count: usize) -> bool {
    if min_count > 16 || min_count == 0 {
        return false;
    }
    if mask == u16::MAX {
        return true;
    }

    // A run of n bits survives n-1 AND-ed rotations
    let mut test_mask = mask;
    for i in 1..min_count as u32 {
        test_mask &= mask.rotate_left(i);
        if test_mask == 0 {
            return false;
        }
    }

    test_mask != 0
}

/// Pack a circular array of flags into a bitmask, bit `i` for entry `i`.
pub fn pack_flags(pixels: &[bool; 16]) -> u16 {
    pixels
        .iter()
        .enumerate()
        .filter(|&(_, &set)| set)
        .fold(0u16, |mask, (i, _)| mask | (1 << i))
}

/// Reference run-length scan, kept for cross-checking the bitmask path.
#[cfg(test)]
fn has_consecutive_pixels_scan(pixels: &[bool; 16], min_count: usize) -> bool {
    if min_count > 16 || min_count == 0 {
        return false;
    }

    let mut current = 0;
    for i in 0..(16 * 2) {
        if pixels[i % 16] {
            current += 1;
            if current >= min_count {
                return true;
            }
        } else {
            current = 0;
        }
    }
    false
}
