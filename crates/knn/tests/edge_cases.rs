//! Edge case integration tests.

use approx::assert_abs_diff_eq;
use cadenza_knn::{
    DistanceMetric, FeatureMatrix, HostLanes, KNeighbors, KnnConfig, ParallelKNeighbors,
    ScalarKNeighbors,
};

fn engines(config: &KnnConfig) -> Vec<Box<dyn KNeighbors>> {
    vec![
        Box::new(ScalarKNeighbors::new(config).unwrap()),
        Box::new(ParallelKNeighbors::new(HostLanes::probe(Some(2)).unwrap(), config).unwrap()),
    ]
}

/// k > n: truncated to n.
#[test]
fn k_greater_than_n() {
    for mut e in engines(&KnnConfig::new(50)) {
        e.fit_rows(vec![vec![3.0], vec![1.0], vec![2.0]]).unwrap();
        let r = e.predict(&[0.0]).unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.indices(), &[1, 2, 0]);
    }
}

/// k = n: every candidate, sorted.
#[test]
fn k_equals_n() {
    for mut e in engines(&KnnConfig::new(5)) {
        e.fit_rows((0..5).map(|i| vec![i as f64]).collect()).unwrap();
        let r = e.predict(&[4.2]).unwrap();
        assert_eq!(r.indices(), &[4, 3, 2, 1, 0]);
    }
}

/// Single candidate: always the answer.
#[test]
fn single_candidate() {
    for mut e in engines(&KnnConfig::new(10)) {
        e.fit_rows(vec![vec![99.0, -3.0]]).unwrap();
        let r = e.predict(&[0.0, 0.0]).unwrap();
        assert_eq!(r.indices(), &[0]);
    }
}

/// Equal distances are ordered by row.
#[test]
fn ties_ordered_by_row() {
    // Eight points on a circle of radius 1 around the query, plus the centre.
    let mut rows = vec![
        vec![1.0, 0.0],
        vec![0.0, 1.0],
        vec![-1.0, 0.0],
        vec![0.0, -1.0],
    ];
    rows.push(vec![0.0, 0.0]);
    rows.extend([
        vec![1.0, 0.0],
        vec![0.0, 1.0],
        vec![-1.0, 0.0],
        vec![0.0, -1.0],
    ]);
    for mut e in engines(&KnnConfig::new(6)) {
        e.fit_rows(rows.clone()).unwrap();
        let r = e.predict(&[0.0, 0.0]).unwrap();
        assert_eq!(r.indices(), &[4, 0, 1, 2, 3, 5], "{}", e.backend());
    }
}

/// A second fit replaces the first, including its width.
#[test]
fn refit_replaces_data() {
    for mut e in engines(&KnnConfig::new(1)) {
        e.fit_rows(vec![vec![0.0], vec![10.0]]).unwrap();
        assert_eq!(e.predict(&[9.0]).unwrap().indices(), &[1]);

        e.fit_rows(vec![vec![9.0, 9.0], vec![0.0, 0.0], vec![5.0, 5.0]])
            .unwrap();
        assert_eq!(e.n_dims(), Some(2));
        assert_eq!(e.n_candidates(), Some(3));
        assert_eq!(e.predict(&[1.0, 1.0]).unwrap().indices(), &[1]);
        assert!(e.predict(&[9.0]).is_err());
    }
}

/// Switching the metric changes the ranking.
#[test]
fn metric_switch_changes_ranking() {
    // Euclidean prefers the diagonal point, Manhattan the axis point.
    let rows = vec![vec![3.0, 0.0], vec![1.8, 1.8]];
    for mut e in engines(&KnnConfig::new(1)) {
        e.fit_rows(rows.clone()).unwrap();
        assert_eq!(e.predict(&[0.0, 0.0]).unwrap().indices(), &[1]);
        e.set_metric(DistanceMetric::Manhattan);
        assert_eq!(e.metric(), DistanceMetric::Manhattan);
        assert_eq!(e.predict(&[0.0, 0.0]).unwrap().indices(), &[0]);
    }
}

/// High dimension with a tail that is not a multiple of four.
#[test]
fn wide_rows() {
    let d = 1027;
    let data: Vec<f64> = (0..3 * d).map(|i| (i % 11) as f64 * 0.125).collect();
    let matrix = FeatureMatrix::from_flat(data, d).unwrap();
    let query = matrix.row(2).to_vec();
    for mut e in engines(&KnnConfig::new(1)) {
        e.fit(matrix.clone()).unwrap();
        let r = e.predict(&query).unwrap();
        assert_eq!(r.indices()[0], 2);
        assert_abs_diff_eq!(r.distances()[0], 0.0);
    }
}

/// Engines can be shared across threads.
#[test]
fn concurrent_predict() {
    let rows: Vec<Vec<f64>> = (0..500).map(|i| vec![i as f64, (i % 3) as f64]).collect();
    for mut e in engines(&KnnConfig::new(3)) {
        e.fit_rows(rows.clone()).unwrap();
        let e = &*e;
        std::thread::scope(|s| {
            for t in 0..4 {
                s.spawn(move || {
                    let row = t * 100;
                    let q = [row as f64, (row % 3) as f64];
                    let r = e.predict(&q).unwrap();
                    assert_eq!(r.indices()[0], row);
                });
            }
        });
    }
}
