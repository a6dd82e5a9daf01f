use align_core::{Correspondence, Descriptor};
use rayon::prelude::*;

/// Number of differing bits between two descriptors.
#[inline]
pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// The two smallest distances from `query` into `train`, with the index of the nearest.
///
/// Equal distances keep the lower train index as nearest.
fn two_nearest(query: &Descriptor, train: &[Descriptor]) -> Option<(usize, u32, u32)> {
    if train.len() < 2 {
        return None;
    }

    let mut best_distance = u32::MAX;
    let mut second_best_distance = u32::MAX;
    let mut best_idx = 0;

    for (idx, candidate) in train.iter().enumerate() {
        let distance = hamming_distance(query, candidate);
        if distance < best_distance {
            second_best_distance = best_distance;
            best_distance = distance;
            best_idx = idx;
        } else if distance < second_best_distance {
            second_best_distance = distance;
        }
    }

    Some((best_idx, best_distance, second_best_distance))
}

/// Brute-force k=2 matching with Lowe's ratio test.
///
/// For every reference descriptor the nearest and second-nearest candidate
/// descriptors are found; the nearest is accepted when
/// `best < ratio * second`. Output is ordered by reference index and several
/// reference descriptors may map to the same candidate. With fewer than two
/// candidate descriptors nothing is accepted.
pub fn match_descriptors(reference: &[Descriptor], candidate: &[Descriptor], ratio: f32) -> Vec<Correspondence> {
    if candidate.len() < 2 {
        log::debug!("matching skipped: {} candidate descriptors", candidate.len());
        return Vec::new();
    }

    let matches: Vec<Correspondence> = reference
        .par_iter()
        .enumerate()
        .filter_map(|(ref_idx, query)| {
            let (cand_idx, best, second) = two_nearest(query, candidate)?;
            ((best as f32) < ratio * second as f32).then_some(Correspondence {
                ref_idx,
                cand_idx,
                distance: best,
            })
        })
        .collect();

    log::debug!(
        "{} of {} reference descriptors passed the ratio test ({ratio})",
        matches.len(),
        reference.len()
    );
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_descriptors(n: usize, seed: u64) -> Vec<Descriptor> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let mut d = [0u8; 32];
                rng.fill(&mut d[..]);
                d
            })
            .collect()
    }

    fn flip_bits(d: &Descriptor, bits: &[usize]) -> Descriptor {
        let mut out = *d;
        for &b in bits {
            out[b / 8] ^= 1 << (b % 8);
        }
        out
    }

    #[test]
    fn test_hamming_distance() {
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        assert_eq!(hamming_distance(&a, &b), 0);
        b[0] = 0b1011;
        b[31] = 0xff;
        assert_eq!(hamming_distance(&a, &b), 11);
        assert_eq!(hamming_distance(&[0xff; 32], &a), 256);
    }

    #[test]
    fn test_perturbed_copies_match_their_source() {
        let reference = random_descriptors(50, 1);
        let mut candidate: Vec<Descriptor> = reference.iter().map(|d| flip_bits(d, &[3, 100, 200])).collect();
        candidate.reverse();

        let matches = match_descriptors(&reference, &candidate, 0.75);
        assert_eq!(matches.len(), 50);
        for m in &matches {
            assert_eq!(m.cand_idx, 49 - m.ref_idx);
            assert_eq!(m.distance, 3);
        }
        // Ordered by reference index
        assert!(matches.windows(2).all(|w| w[0].ref_idx < w[1].ref_idx));
    }

    #[test]
    fn test_ambiguous_matches_rejected() {
        let base = random_descriptors(1, 2)[0];
        let reference = vec![base];
        // Two equally distant candidates fail the ratio test
        let candidate = vec![flip_bits(&base, &[1, 2]), flip_bits(&base, &[5, 6])];
        assert!(match_descriptors(&reference, &candidate, 0.75).is_empty());
    }

    #[test]
    fn test_single_candidate_never_matches() {
        let reference = random_descriptors(5, 3);
        let candidate = vec![reference[0]];
        assert!(match_descriptors(&reference, &candidate, 0.75).is_empty());
        assert!(match_descriptors(&reference, &[], 0.75).is_empty());
    }

    #[test]
    fn test_many_to_one_allowed() {
        let target = random_descriptors(1, 4)[0];
        let far = [!target[0]; 32];
        let reference = vec![flip_bits(&target, &[0]), flip_bits(&target, &[9])];
        let candidate = vec![far, target];
        let matches = match_descriptors(&reference, &candidate, 0.75);
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.cand_idx == 1));
    }

    #[test]
    fn test_zero_distance_with_distinct_second() {
        let reference = random_descriptors(3, 5);
        let candidate = random_descriptors(3, 5);
        let matches = match_descriptors(&reference, &candidate, 0.75);
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|m| m.distance == 0 && m.cand_idx == m.ref_idx));
    }

    proptest! {
        #[test]
        fn matching_is_deterministic(seed in any::<u64>(), n_ref in 1usize..40, n_cand in 0usize..40) {
            let reference = random_descriptors(n_ref, seed);
            let candidate = random_descriptors(n_cand, seed.wrapping_add(1));
            let first = match_descriptors(&reference, &candidate, 0.8);
            let second = match_descriptors(&reference, &candidate, 0.8);
            prop_assert_eq!(&first, &second);
            for m in &first {
                prop_assert!(m.ref_idx < n_ref && m.cand_idx < n_cand);
                prop_assert_eq!(m.distance, hamming_distance(&reference[m.ref_idx], &candidate[m.cand_idx]));
            }
        }
    }
}
