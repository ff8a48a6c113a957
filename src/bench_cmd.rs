//! Bench command: time the selected backend against the scalar reference.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, info_span};

use cadenza_knn::{
    Evaluation, FeatureMatrix, KNeighbors, Neighbors, ScalarKNeighbors, select_backend,
};

use crate::cli::BenchArgs;
use crate::config::CadenzaConfig;
use crate::convert;

/// Disagreement between two runs over the same queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    /// Queries whose neighbor index sets differ.
    pub mismatched: usize,
    /// Largest absolute difference between paired distances.
    pub max_deviation: f64,
}

/// Compares `candidate` results against `reference`, query by query.
pub fn compare(reference: &[Neighbors], candidate: &[Neighbors]) -> Comparison {
    let mut mismatched = 0;
    let mut max_deviation: f64 = 0.0;
    for (r, c) in reference.iter().zip(candidate) {
        let mut ri = r.indices().to_vec();
        let mut ci = c.indices().to_vec();
        ri.sort_unstable();
        ci.sort_unstable();
        if ri != ci {
            mismatched += 1;
        }
        for (a, b) in r.distances().iter().zip(c.distances()) {
            max_deviation = max_deviation.max((a - b).abs());
        }
    }
    Comparison {
        mismatched,
        max_deviation,
    }
}

fn run_queries(
    engine: &dyn KNeighbors,
    queries: &[Vec<f64>],
) -> Result<(Vec<Neighbors>, Duration)> {
    let start = Instant::now();
    let results = queries
        .iter()
        .map(|q| engine.predict(q))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("{} backend failed", engine.backend()))?;
    Ok((results, start.elapsed()))
}

/// Run the benchmark.
pub fn run(args: BenchArgs) -> Result<()> {
    let _cmd = info_span!("bench").entered();
    let mut config = CadenzaConfig::load(args.config.as_deref())?;
    if let Some(n) = args.candidates {
        config.bench.n_candidates = n;
    }
    if let Some(d) = args.dims {
        config.bench.n_dims = d;
    }
    if let Some(q) = args.queries {
        config.bench.n_queries = q;
    }
    if let Some(s) = args.seed {
        config.bench.seed = s;
    }
    if let Some(k) = args.k {
        config.search.k = k;
    }
    if let Some(m) = args.metric {
        config.search.metric = m;
    }
    let matrix_len = convert::validate_bench(&config.bench)?;
    let knn = convert::build_knn_config(&config.search, &config.backend)?;
    let bench = &config.bench;

    let mut rng = StdRng::seed_from_u64(bench.seed);
    let data: Vec<f64> = (0..matrix_len)
        .map(|_| rng.random::<f64>())
        .collect();
    let matrix = FeatureMatrix::from_flat(data, bench.n_dims)?;
    let queries: Vec<Vec<f64>> = (0..bench.n_queries)
        .map(|_| (0..bench.n_dims).map(|_| rng.random::<f64>()).collect())
        .collect();
    info!(
        n = bench.n_candidates,
        d = bench.n_dims,
        queries = bench.n_queries,
        seed = bench.seed,
        "generated benchmark data"
    );

    let reference_config = knn.clone().with_evaluation(Evaluation::Reference);
    let mut reference = ScalarKNeighbors::new(&reference_config)?;
    reference.fit(matrix.clone())?;

    let mut selection = select_backend(&knn)?;
    for failure in selection.failures() {
        println!("probe failed: {failure}");
    }
    selection.engine_mut().fit(matrix)?;
    let engine = selection.into_engine();

    let (want, reference_time) = run_queries(&reference, &queries)?;
    let (got, engine_time) = run_queries(engine.as_ref(), &queries)?;
    let comparison = compare(&want, &got);

    println!(
        "{} candidates x {} dims, {} queries, k = {}, {}",
        bench.n_candidates,
        bench.n_dims,
        bench.n_queries,
        knn.k(),
        knn.metric()
    );
    println!("reference (scalar): {reference_time:?}");
    println!("{}: {engine_time:?}", engine.backend());
    println!(
        "mismatched queries: {} / {}",
        comparison.mismatched, bench.n_queries
    );
    println!("max distance deviation: {:e}", comparison.max_deviation);
    info!(
        backend = %engine.backend(),
        mismatched = comparison.mismatched,
        max_deviation = comparison.max_deviation,
        "benchmark finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use cadenza_knn::KnnConfig;

    use super::*;

    fn results(rows: Vec<Vec<f64>>, queries: &[Vec<f64>], k: usize) -> Vec<Neighbors> {
        let mut engine = ScalarKNeighbors::new(&KnnConfig::new(k)).unwrap();
        engine.fit_rows(rows).unwrap();
        queries.iter().map(|q| engine.predict(q).unwrap()).collect()
    }

    #[test]
    fn test_identical_runs_agree() {
        let rows = vec![vec![0.0], vec![1.0], vec![2.0]];
        let queries = vec![vec![0.1], vec![1.9]];
        let a = results(rows.clone(), &queries, 2);
        let b = results(rows, &queries, 2);
        assert_eq!(
            compare(&a, &b),
            Comparison {
                mismatched: 0,
                max_deviation: 0.0
            }
        );
    }

    #[test]
    fn test_counts_mismatched_queries() {
        let queries = vec![vec![0.0], vec![5.0]];
        let a = results(vec![vec![0.0], vec![5.0]], &queries, 1);
        let b = results(vec![vec![5.0], vec![0.0]], &queries, 1);
        let c = compare(&a, &b);
        assert_eq!(c.mismatched, 2);
        assert_eq!(c.max_deviation, 0.0);
    }
}
