//! Scalar distance functions.
//!
//! Two evaluation paths are provided for every metric:
//!
//! - **Reference**: a single accumulator walked left to right. This is the
//!   formula every backend is measured against, and the one device lanes run.
//! - **Unrolled**: four independent accumulators combined as
//!   `(a0 + a1) + (a2 + a3)`, then the tail. Faster, and still
//!   deterministic, but the reduction order differs from the reference path,
//!   so the two agree within floating-point rounding rather than bit for bit.

use crate::metric::DistanceMetric;

/// Which scalar evaluation path to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Evaluation {
    /// Single accumulator, left to right.
    Reference,
    /// Four-way unrolled accumulation.
    #[default]
    Unrolled,
}

/// Euclidean distance, reference path.
///
/// # Panics
///
/// Debug-asserts that `query.len() == point.len()`.
#[inline]
pub fn euclidean(query: &[f64], point: &[f64]) -> f64 {
    debug_assert_eq!(query.len(), point.len());
    let mut acc = 0.0;
    for (&q, &p) in query.iter().zip(point) {
        let d = q - p;
        acc += d * d;
    }
    acc.sqrt()
}

/// Manhattan distance, reference path.
///
/// # Panics
///
/// Debug-asserts that `query.len() == point.len()`.
#[inline]
pub fn manhattan(query: &[f64], point: &[f64]) -> f64 {
    debug_assert_eq!(query.len(), point.len());
    let mut acc = 0.0;
    for (&q, &p) in query.iter().zip(point) {
        acc += (q - p).abs();
    }
    acc
}

/// Euclidean distance, unrolled path.
#[inline]
pub fn euclidean_unrolled(query: &[f64], point: &[f64]) -> f64 {
    unrolled_sum(query, point, |d| d * d).sqrt()
}

/// Manhattan distance, unrolled path.
#[inline]
pub fn manhattan_unrolled(query: &[f64], point: &[f64]) -> f64 {
    unrolled_sum(query, point, f64::abs)
}

#[inline(always)]
fn unrolled_sum(query: &[f64], point: &[f64], term: impl Fn(f64) -> f64) -> f64 {
    debug_assert_eq!(query.len(), point.len());
    let q_chunks = query.chunks_exact(4);
    let p_chunks = point.chunks_exact(4);
    let q_tail = q_chunks.remainder();
    let p_tail = p_chunks.remainder();

    let mut acc = [0.0f64; 4];
    for (q, p) in q_chunks.zip(p_chunks) {
        acc[0] += term(q[0] - p[0]);
        acc[1] += term(q[1] - p[1]);
        acc[2] += term(q[2] - p[2]);
        acc[3] += term(q[3] - p[3]);
    }
    let mut sum = (acc[0] + acc[1]) + (acc[2] + acc[3]);
    for (&q, &p) in q_tail.iter().zip(p_tail) {
        sum += term(q - p);
    }
    sum
}

/// Distance between one query and one point for the given metric and path.
#[inline]
pub fn distance(metric: DistanceMetric, evaluation: Evaluation, query: &[f64], point: &[f64]) -> f64 {
    match (metric, evaluation) {
        (DistanceMetric::Euclidean, Evaluation::Reference) => euclidean(query, point),
        (DistanceMetric::Manhattan, Evaluation::Reference) => manhattan(query, point),
        (DistanceMetric::Euclidean, Evaluation::Unrolled) => euclidean_unrolled(query, point),
        (DistanceMetric::Manhattan, Evaluation::Unrolled) => manhattan_unrolled(query, point),
    }
}

/// Computes the distance from `query` to every row of a flat row-major matrix.
///
/// ```text
/// out[i] = metric(query, data[i × n_dims .. (i + 1) × n_dims])
/// ```
///
/// # Panics
///
/// Debug-asserts that `data.len() % n_dims == 0`, `query.len() == n_dims`,
/// and `out.len() == data.len() / n_dims`.
pub fn distances_into(
    data: &[f64],
    n_dims: usize,
    query: &[f64],
    metric: DistanceMetric,
    evaluation: Evaluation,
    out: &mut [f64],
) {
    debug_assert!(n_dims > 0);
    debug_assert_eq!(data.len() % n_dims, 0);
    debug_assert_eq!(query.len(), n_dims);
    debug_assert_eq!(out.len(), data.len() / n_dims);

    // Hoist the dispatch out of the row loop.
    let f: fn(&[f64], &[f64]) -> f64 = match (metric, evaluation) {
        (DistanceMetric::Euclidean, Evaluation::Reference) => euclidean,
        (DistanceMetric::Manhattan, Evaluation::Reference) => manhattan,
        (DistanceMetric::Euclidean, Evaluation::Unrolled) => euclidean_unrolled,
        (DistanceMetric::Manhattan, Evaluation::Unrolled) => manhattan_unrolled,
    };
    for (o, row) in out.iter_mut().zip(data.chunks_exact(n_dims)) {
        *o = f(query, row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_euclidean_hand_computed() {
        // 3-4-5 triangle
        assert_abs_diff_eq!(euclidean(&[0.0, 0.0], &[3.0, 4.0]), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(euclidean_unrolled(&[0.0, 0.0], &[3.0, 4.0]), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_manhattan_hand_computed() {
        // |1-2| + |1-2| = 2, |1-10| + |1-10| = 18
        assert_abs_diff_eq!(manhattan(&[1.0, 1.0], &[2.0, 2.0]), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(manhattan(&[1.0, 1.0], &[10.0, 10.0]), 18.0, epsilon = 1e-12);
    }

    #[test]
    fn test_identical_inputs_are_exactly_zero() {
        let v = [0.25, 0.5, 0.75, 1.0, 0.125, 0.0, 0.9];
        assert_eq!(euclidean(&v, &v), 0.0);
        assert_eq!(manhattan(&v, &v), 0.0);
        assert_eq!(euclidean_unrolled(&v, &v), 0.0);
        assert_eq!(manhattan_unrolled(&v, &v), 0.0);
    }

    #[test]
    fn test_unrolled_handles_tails() {
        // Lengths 1..=9 cover empty-chunk, exact-chunk and tail cases.
        for len in 1..=9 {
            let q: Vec<f64> = (0..len).map(|i| i as f64 * 0.3).collect();
            let p: Vec<f64> = (0..len).map(|i| 1.0 - i as f64 * 0.1).collect();
            assert_relative_eq!(euclidean(&q, &p), euclidean_unrolled(&q, &p), max_relative = 1e-12);
            assert_relative_eq!(manhattan(&q, &p), manhattan_unrolled(&q, &p), max_relative = 1e-12);
        }
    }

    #[test]
    fn test_reference_is_reproducible() {
        let q: Vec<f64> = (0..97).map(|i| (i as f64).sin()).collect();
        let p: Vec<f64> = (0..97).map(|i| (i as f64).cos()).collect();
        let first = euclidean(&q, &p);
        for _ in 0..10 {
            assert_eq!(euclidean(&q, &p).to_bits(), first.to_bits());
        }
    }

    #[test]
    fn test_paths_agree_within_tolerance() {
        let q: Vec<f64> = (0..1000).map(|i| ((i * 7919) % 1000) as f64 / 1000.0).collect();
        let p: Vec<f64> = (0..1000).map(|i| ((i * 104_729) % 1000) as f64 / 1000.0).collect();
        for metric in DistanceMetric::ALL {
            let reference = distance(metric, Evaluation::Reference, &q, &p);
            let unrolled = distance(metric, Evaluation::Unrolled, &q, &p);
            assert_relative_eq!(reference, unrolled, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_distances_into_rows() {
        // candidates (0,0), (3,4), (1,1); query (0,0)
        let data = [0.0, 0.0, 3.0, 4.0, 1.0, 1.0];
        let mut out = [0.0; 3];
        distances_into(
            &data,
            2,
            &[0.0, 0.0],
            DistanceMetric::Euclidean,
            Evaluation::Reference,
            &mut out,
        );
        assert_abs_diff_eq!(out[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[1], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[2], 2.0_f64.sqrt(), epsilon = 1e-12);

        distances_into(
            &data,
            2,
            &[0.0, 0.0],
            DistanceMetric::Manhattan,
            Evaluation::Unrolled,
            &mut out,
        );
        assert_abs_diff_eq!(out[1], 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[2], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_distances_non_negative() {
        let data: Vec<f64> = (0..60).map(|i| (i as f64 * 0.37).sin()).collect();
        let query = [-0.5, 0.2, 0.9];
        let mut out = vec![0.0; 20];
        for metric in DistanceMetric::ALL {
            distances_into(&data, 3, &query, metric, Evaluation::Unrolled, &mut out);
            assert!(out.iter().all(|&d| d >= 0.0));
        }
    }
}
