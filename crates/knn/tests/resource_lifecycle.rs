//! Device memory is released on every exit path.

use cadenza_knn::device::{DistanceKernel, compute_distances, launch};
use cadenza_knn::{
    Device, DeviceError, DistanceMetric, FeatureMatrix, HostLanes, KNeighbors, KnnConfig,
    MemoryUsage, ParallelKNeighbors,
};

fn lanes() -> HostLanes {
    HostLanes::probe(Some(2)).unwrap()
}

#[test]
fn released_after_successful_predictions() {
    let mut engine = ParallelKNeighbors::new(lanes(), &KnnConfig::new(3)).unwrap();
    engine
        .fit_rows((0..600).map(|i| vec![i as f64, 1.0]).collect())
        .unwrap();
    for q in 0..10 {
        engine.predict(&[q as f64 * 50.0, 1.0]).unwrap();
        assert_eq!(engine.device().memory_usage(), MemoryUsage::default());
    }
}

#[test]
fn released_after_failed_launch() {
    let device = lanes();
    let kernel = DistanceKernel::new(4, 2, DistanceMetric::Euclidean);
    {
        // Dataset for three rows, kernel expects four.
        let data = device.upload(&[0.0; 6]).unwrap();
        let query = device.stage_broadcast(&[0.0, 0.0]).unwrap();
        let out = device.alloc(4).unwrap();
        assert_eq!(device.memory_usage().buffers, 3);
        let err = launch(&device, &kernel, &data, &query, out).err();
        assert!(matches!(err, Some(DeviceError::Launch { .. })));
    }
    assert_eq!(device.memory_usage(), MemoryUsage::default());
}

#[test]
fn released_after_error_mid_call() {
    let device = lanes();
    let matrix = FeatureMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
    // Query width disagrees with the matrix: upload and staging succeed,
    // the launch is rejected.
    let err = compute_distances(&device, &matrix, &[0.0, 0.0, 0.0], DistanceMetric::Euclidean)
        .unwrap_err();
    assert!(matches!(err, DeviceError::Launch { .. }));
    assert_eq!(device.memory_usage(), MemoryUsage::default());
}

#[test]
fn in_flight_output_is_tracked_until_read() {
    let device = lanes();
    let kernel = DistanceKernel::new(2, 1, DistanceMetric::Manhattan);
    let data = device.upload(&[1.0, 5.0]).unwrap();
    let query = device.stage_broadcast(&[2.0]).unwrap();
    let out = device.alloc(2).unwrap();

    let in_flight = launch(&device, &kernel, &data, &query, out).unwrap();
    assert_eq!(device.memory_usage().buffers, 3);
    let distances = in_flight.synchronize().unwrap().copy_to_host().unwrap();
    assert_eq!(distances, vec![1.0, 3.0]);
    assert_eq!(device.memory_usage().buffers, 2);

    drop(query);
    drop(data);
    assert_eq!(device.memory_usage(), MemoryUsage::default());
}
