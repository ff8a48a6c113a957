//! Top-k nearest neighbor selection.

use std::cmp::Ordering;

/// Orders candidates by distance, then by original row index.
///
/// The index tiebreak makes the key total, so selection is deterministic
/// even though it uses unstable partitioning: among equal distances the
/// lower row index always wins.
#[inline]
fn by_distance_then_index(a: &(f64, usize), b: &(f64, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

/// Selects the `k_eff` nearest neighbors from a distance array.
///
/// Partitions around the `k_eff`-th key with `select_nth_unstable_by`, then
/// sorts only the kept prefix, so the cost is `O(n + k log k)`.
///
/// Writes results into caller-provided buffers:
/// - `pairs`: scratch buffer for (distance, index) pairs
/// - `nn_indices`: original row indices of the k nearest neighbors, ascending by distance
/// - `nn_dists`: their distances
///
/// # Panics
///
/// Debug-asserts that `k_eff >= 1` and `k_eff <= distances.len()`.
pub(crate) fn select_k_nearest(
    distances: &[f64],
    k_eff: usize,
    pairs: &mut Vec<(f64, usize)>,
    nn_indices: &mut Vec<usize>,
    nn_dists: &mut Vec<f64>,
) {
    debug_assert!(k_eff >= 1);
    debug_assert!(k_eff <= distances.len());

    pairs.clear();
    pairs.extend(distances.iter().copied().enumerate().map(|(i, d)| (d, i)));

    if k_eff < pairs.len() {
        pairs.select_nth_unstable_by(k_eff - 1, by_distance_then_index);
        pairs.truncate(k_eff);
    }
    pairs.sort_unstable_by(by_distance_then_index);

    nn_indices.clear();
    nn_dists.clear();
    for &(d, idx) in pairs.iter() {
        nn_indices.push(idx);
        nn_dists.push(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to avoid repeating buffer setup in every test.
    fn run(distances: &[f64], k_eff: usize) -> (Vec<usize>, Vec<f64>) {
        let mut pairs = Vec::new();
        let mut nn_indices = Vec::new();
        let mut nn_dists = Vec::new();
        select_k_nearest(distances, k_eff, &mut pairs, &mut nn_indices, &mut nn_dists);
        (nn_indices, nn_dists)
    }

    #[test]
    fn test_k1_closest() {
        let (indices, dists) = run(&[3.0, 1.0, 2.0], 1);
        assert_eq!(indices, vec![1]);
        assert_eq!(dists, vec![1.0]);
    }

    #[test]
    fn test_k_equals_n_all_sorted() {
        let (indices, dists) = run(&[2.0, 1.0, 3.0, 0.0], 4);
        assert_eq!(indices, vec![3, 1, 0, 2]);
        assert_eq!(dists, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        let (indices, dists) = run(&[2.0, 2.0, 1.0, 2.0], 3);
        assert_eq!(indices, vec![2, 0, 1]);
        assert_eq!(dists, vec![1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_ties_across_partition_boundary() {
        // Many equal keys straddle the k-th position; the lowest indices must win.
        let distances = vec![5.0; 100];
        let (indices, _) = run(&distances, 7);
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_partial_matches_full_sort() {
        let distances: Vec<f64> = (0..500).map(|i| ((i * 7919) % 211) as f64 * 0.5).collect();
        let mut expected: Vec<(f64, usize)> =
            distances.iter().copied().enumerate().map(|(i, d)| (d, i)).collect();
        expected.sort_by(by_distance_then_index);

        for k in [1, 2, 10, 211, 499, 500] {
            let (indices, dists) = run(&distances, k);
            let want_idx: Vec<usize> = expected[..k].iter().map(|p| p.1).collect();
            let want_d: Vec<f64> = expected[..k].iter().map(|p| p.0).collect();
            assert_eq!(indices, want_idx, "k = {k}");
            assert_eq!(dists, want_d, "k = {k}");
        }
    }

    #[test]
    fn test_single_candidate() {
        let (indices, dists) = run(&[7.0], 1);
        assert_eq!(indices, vec![0]);
        assert_eq!(dists, vec![7.0]);
    }

    #[test]
    fn test_buffer_clearing() {
        let mut pairs = Vec::new();
        let mut nn_indices = Vec::new();
        let mut nn_dists = Vec::new();

        select_k_nearest(&[3.0, 1.0, 2.0], 2, &mut pairs, &mut nn_indices, &mut nn_dists);
        assert_eq!(nn_indices.len(), 2);

        // Buffers from the first call must not leak into the second.
        select_k_nearest(&[5.0, 4.0], 1, &mut pairs, &mut nn_indices, &mut nn_dists);
        assert_eq!(nn_indices, vec![1]);
        assert_eq!(nn_dists, vec![4.0]);
    }
}
