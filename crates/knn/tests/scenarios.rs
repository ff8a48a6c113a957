//! Known-answer queries, run against every engine.

use approx::assert_abs_diff_eq;
use cadenza_knn::{
    DistanceMetric, HostLanes, KNeighbors, KnnConfig, ParallelKNeighbors, ScalarKNeighbors,
};

fn engines(config: &KnnConfig) -> Vec<Box<dyn KNeighbors>> {
    vec![
        Box::new(ScalarKNeighbors::new(config).unwrap()),
        Box::new(ParallelKNeighbors::new(HostLanes::probe(Some(2)).unwrap(), config).unwrap()),
    ]
}

#[test]
fn scenario_a_tie_goes_to_lower_index() {
    for mut e in engines(&KnnConfig::new(2)) {
        e.fit_rows(vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![5.0, 5.0],
        ])
        .unwrap();
        let r = e.predict(&[0.0, 0.0]).unwrap();
        assert_eq!(r.indices(), &[0, 1], "{}", e.backend());
        assert_abs_diff_eq!(r.distances()[0], 0.0);
        assert_abs_diff_eq!(r.distances()[1], 1.0, epsilon = 1e-12);
    }
}

#[test]
fn scenario_b_single_nearest() {
    for mut e in engines(&KnnConfig::new(1)) {
        e.fit_rows(vec![vec![0.0, 0.0], vec![3.0, 4.0]]).unwrap();
        let r = e.predict(&[0.0, 0.0]).unwrap();
        assert_eq!(r.indices(), &[0], "{}", e.backend());
        assert_eq!(r.distances(), &[0.0]);
    }
}

#[test]
fn scenario_c_manhattan() {
    let config = KnnConfig::new(3).with_metric(DistanceMetric::Manhattan);
    for mut e in engines(&config) {
        e.fit_rows(vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![10.0, 10.0]])
            .unwrap();
        let r = e.predict(&[1.0, 1.0]).unwrap();
        assert_eq!(r.indices(), &[0, 1, 2], "{}", e.backend());
        assert_abs_diff_eq!(r.distances()[0], 0.0);
        assert_abs_diff_eq!(r.distances()[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r.distances()[2], 18.0, epsilon = 1e-12);
    }
}

#[test]
fn self_query_is_distance_zero() {
    let rows: Vec<Vec<f64>> = (0..40)
        .map(|i| vec![i as f64 * 0.1, (i % 7) as f64, (i * i % 13) as f64 * 0.3])
        .collect();
    for mut e in engines(&KnnConfig::new(1)) {
        e.fit_rows(rows.clone()).unwrap();
        for (i, row) in rows.iter().enumerate() {
            let r = e.predict(row).unwrap();
            assert_eq!(r.nearest(), Some((i, 0.0)), "{} row {i}", e.backend());
        }
    }
}

#[test]
fn exactly_k_ascending_non_negative() {
    let rows: Vec<Vec<f64>> = (0..100)
        .map(|i| vec![((i * 37) % 101) as f64 / 101.0, ((i * 53) % 97) as f64 / 97.0])
        .collect();
    for metric in DistanceMetric::ALL {
        for mut e in engines(&KnnConfig::new(8).with_metric(metric)) {
            e.fit_rows(rows.clone()).unwrap();
            let r = e.predict(&[0.5, 0.5]).unwrap();
            assert_eq!(r.len(), 8);
            assert!(r.distances().iter().all(|&d| d >= 0.0));
            assert!(r.distances().windows(2).all(|w| w[0] <= w[1]));
        }
    }
}

#[test]
fn labels_follow_neighbors() {
    for mut e in engines(&KnnConfig::new(2)) {
        let matrix = cadenza_knn::FeatureMatrix::from_rows(vec![
            vec![0.1, 0.9],
            vec![0.8, 0.2],
            vec![0.15, 0.85],
        ])
        .unwrap();
        let labels = vec![
            "Naima".to_string(),
            "Giant Steps".to_string(),
            "Countdown".to_string(),
        ];
        e.fit_labeled(matrix, labels).unwrap();
        let r = e.predict(&[0.1, 0.9]).unwrap();
        assert_eq!(r.indices(), &[0, 2]);
        assert_eq!(
            r.labels().unwrap(),
            &["Naima".to_string(), "Countdown".to_string()]
        );
    }
}
