//! Baseline vs adaptive search
//!
//! Builds one seeded index per size, dumps it, and loads it into a baseline
//! searcher and an adaptive searcher backed by a fixed early-stop model.
//!
//! ```bash
//! cargo bench -p omega-benches --bench search
//! cargo bench -p omega-benches --bench search -- adaptive
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use omega_core::predictor::{CalibrationPoint, ModelArtifact, MODEL_VERSION};
use omega_core::{
    FileStorage, HnswContext, IndexBuilder, IndexMeta, IndexSearcher, Metric, OmegaBuilder,
    OmegaSearcher, Params, SearchMode, VectorHolder,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tempfile::TempDir;

const DIM: usize = 64;
const INDEX_SIZES: &[usize] = &[1_000, 10_000];
const K_VALUES: &[usize] = &[10, 50];

fn random_vectors(count: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..DIM).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect())
        .collect()
}

/// Model that leans on the fraction of recent accepted candidates
fn bench_model() -> ModelArtifact {
    ModelArtifact {
        version: MODEL_VERSION,
        weights: vec![0.0, 0.2, -6.0, 0.5, 1.0, 0.0],
        bias: 1.0,
        predict_interval: 4,
        min_hops: 16,
        calibration: vec![
            CalibrationPoint {
                target_recall: 0.8,
                threshold: 0.4,
            },
            CalibrationPoint {
                target_recall: 0.99,
                threshold: 0.8,
            },
        ],
    }
}

fn load(storage: &FileStorage, name: &str, model_dir: Option<&Path>) -> OmegaSearcher {
    let mut params = Params::new();
    if let Some(dir) = model_dir {
        params
            .insert("omega.enabled", true)
            .insert("omega.min_vector_threshold", 0u32)
            .insert("omega.target_recall", 0.9f32)
            .insert("omega.model_dir", dir.to_string_lossy().into_owned());
    }
    let mut searcher = OmegaSearcher::new();
    searcher.init(&params).unwrap();
    searcher.load(storage, name).unwrap();
    searcher
}

fn bench_search(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path().join("indexes")).unwrap();
    let model_dir = temp_dir.path().join("model");
    bench_model().save(&model_dir).unwrap();
    let queries = random_vectors(64, 7);

    let mut group = c.benchmark_group("search");
    group.sample_size(30);

    for &size in INDEX_SIZES {
        let name = format!("random_{size}");
        let pairs = random_vectors(size, 42)
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i as u64, v));
        let holder = VectorHolder::from_pairs(DIM, pairs).unwrap();
        let mut params = Params::new();
        params.insert("hnsw.seed", 42u64);
        let mut builder = OmegaBuilder::new();
        builder
            .init(&IndexMeta::new(DIM, Metric::SquaredEuclidean), &params)
            .unwrap();
        builder.train(&holder).unwrap();
        builder.build(&holder).unwrap();
        builder.dump(&storage, &name).unwrap();

        let baseline = load(&storage, &name, None);
        let adaptive = load(&storage, &name, Some(&model_dir));
        assert_eq!(adaptive.mode(), Some(SearchMode::Adaptive));

        for &k in K_VALUES {
            for (label, searcher) in [("baseline", &baseline), ("adaptive", &adaptive)] {
                group.bench_with_input(
                    BenchmarkId::new(format!("{label}_{size}"), k),
                    &k,
                    |b, &k| {
                        let mut ctx = HnswContext::new(k);
                        let mut query_idx = 0;
                        b.iter(|| {
                            let query = &queries[query_idx % queries.len()];
                            query_idx += 1;
                            searcher.search(black_box(query), &mut ctx).unwrap();
                            black_box(ctx.result().len())
                        })
                    },
                );
            }
        }
    }

    group.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
