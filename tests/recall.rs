use hnsw_index::config::IndexParams;
use hnsw_index::distance::SquaredEuclidean;
use hnsw_index::index::Hnsw;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

fn random_vectors(seed: u64, count: usize, dim: usize) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| rng.gen_range(0.0..255.0)).collect())
        .collect()
}

/// Recall of approximate search against the exact brute-force baseline,
/// averaged over several query points, should stay well above chance on a
/// modest uniform-random dataset.
#[test]
fn recall_against_brute_force_baseline() {
    let k = 10;
    let ef = 2 * k;
    let dim = 128;
    let n = 1000;

    let vectors = random_vectors(42, n, dim);
    let mut iter = vectors.into_iter();
    let seed_point = iter.next().unwrap();

    let index = Hnsw::new(
        IndexParams::new(32, 2000),
        seed_point,
        SquaredEuclidean,
    )
    .unwrap();
    for v in iter {
        index.add(&v).unwrap();
    }

    let queries = random_vectors(43, 20, dim);
    let mut total_recall = 0.0;

    for query in &queries {
        let approx: HashSet<u64> = index
            .search(query, ef as u64, k as u64)
            .unwrap()
            .iter()
            .map(|item| item.node)
            .collect();
        let exact: HashSet<u64> = index
            .search_brute(query, k as u64)
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let overlap = approx.intersection(&exact).count();
        total_recall += overlap as f64 / k as f64;
    }

    let mean_recall = total_recall / queries.len() as f64;
    assert!(
        mean_recall >= 0.8,
        "mean recall {mean_recall} fell below the 0.8 floor"
    );
}
