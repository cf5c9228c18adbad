//! End-to-end tests: build, dump, load and search through the searchers

use omega_core::predictor::{CalibrationPoint, ModelArtifact, MODEL_VERSION};
use omega_core::search::search_graph;
use omega_core::storage::compression::Codec;
use omega_core::{
    FileStorage, HnswContext, HnswGraph, HnswSearcher, IndexBuilder, IndexMeta, IndexSearcher,
    Metric, NodeId, OmegaBuilder, OmegaError, OmegaSearcher, Params, PredictorModel,
    PredictorSession, ProximityGraph, QueryDistance, Result, SearchContext, SearchMode,
    SessionParams, SessionStats, VectorHolder,
};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 16;

/// 1000 vectors, vector i is the constant vector of value i
fn constant_vectors() -> VectorHolder {
    VectorHolder::from_pairs(DIM, (0..1000u64).map(|i| (i, vec![i as f32; DIM]))).unwrap()
}

fn build_and_dump(storage: &FileStorage, name: &str, metric: Metric) {
    let data = constant_vectors();
    let mut params = Params::new();
    params.insert("hnsw.seed", 2024u64);

    let mut builder = OmegaBuilder::new();
    builder.init(&IndexMeta::new(DIM, metric), &params).unwrap();
    builder.train(&data).unwrap();
    builder.build(&data).unwrap();
    builder.dump(storage, name).unwrap();
}

fn omega_params(enabled: bool, recall: f32, threshold: u32, model_dir: Option<&Path>) -> Params {
    let mut params = Params::new();
    params
        .insert("omega.enabled", enabled)
        .insert("omega.target_recall", recall)
        .insert("omega.min_vector_threshold", threshold);
    if let Some(dir) = model_dir {
        params.insert("omega.model_dir", dir.to_string_lossy().into_owned());
    }
    params
}

fn loaded_omega(storage: &FileStorage, name: &str, params: &Params) -> OmegaSearcher {
    let mut searcher = OmegaSearcher::new();
    searcher.init(params).unwrap();
    searcher.load(storage, name).unwrap();
    searcher
}

fn artifact_with_bias(bias: f32) -> ModelArtifact {
    ModelArtifact {
        version: MODEL_VERSION,
        weights: vec![0.0; 6],
        bias,
        predict_interval: 2,
        min_hops: 4,
        calibration: vec![
            CalibrationPoint {
                target_recall: 0.5,
                threshold: 0.5,
            },
            CalibrationPoint {
                target_recall: 1.0,
                threshold: 0.9,
            },
        ],
    }
}

fn setup() -> (TempDir, FileStorage) {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::with_codec(temp_dir.path().join("indexes"), Codec::Gzip).unwrap();
    build_and_dump(&storage, "constant", Metric::SquaredEuclidean);
    (temp_dir, storage)
}

#[test]
fn test_constant_vectors_sorted_ascending() {
    let (_dir, storage) = setup();
    let searcher = loaded_omega(&storage, "constant", &Params::new());

    let mut ctx = HnswContext::new(50);
    searcher.search(&[0.0; DIM], &mut ctx).unwrap();

    let keys: Vec<u64> = ctx.result().iter().map(|n| n.key).collect();
    assert_eq!(keys, (0..50).collect::<Vec<u64>>());
    for (i, hit) in ctx.result().iter().enumerate() {
        assert_eq!(hit.score, (DIM * i * i) as f32);
    }
}

#[test]
fn test_threshold_at_rank_25() {
    let (_dir, storage) = setup();
    let searcher = loaded_omega(&storage, "constant", &Params::new());

    let mut ctx = HnswContext::new(50);
    searcher.search(&[0.0; DIM], &mut ctx).unwrap();
    let unfiltered = ctx.result().to_vec();
    let threshold = unfiltered[25].score;

    ctx.set_threshold(threshold);
    searcher.search(&[0.0; DIM], &mut ctx).unwrap();
    assert!(ctx.result().len() < 50);
    assert_eq!(ctx.result().len(), 26);
    assert!(ctx.result().iter().all(|n| n.score <= threshold));

    ctx.reset_threshold();
    searcher.search(&[0.0; DIM], &mut ctx).unwrap();
    assert_eq!(ctx.result(), unfiltered.as_slice());
}

#[test]
fn test_disabled_config_values_do_not_matter() {
    let (_dir, storage) = setup();
    let model_dir = TempDir::new().unwrap();
    artifact_with_bias(10.0).save(model_dir.path()).unwrap();

    let a = loaded_omega(&storage, "constant", &omega_params(false, 0.6, 0, Some(model_dir.path())));
    let b = loaded_omega(&storage, "constant", &omega_params(false, 0.99, 50_000, None));
    assert_eq!(a.mode(), Some(SearchMode::Baseline));
    assert_eq!(b.mode(), Some(SearchMode::Baseline));

    let mut baseline = HnswSearcher::new();
    baseline.init(&Params::new()).unwrap();
    baseline.load(&storage, "constant").unwrap();

    for query in [[0.0; DIM], [333.3; DIM], [999.0; DIM], [-5.0; DIM]] {
        let mut ra = HnswContext::new(20);
        let mut rb = HnswContext::new(20);
        let mut rc = HnswContext::new(20);
        a.search(&query, &mut ra).unwrap();
        b.search(&query, &mut rb).unwrap();
        baseline.search(&query, &mut rc).unwrap();
        assert_eq!(ra.result(), rb.result());
        assert_eq!(ra.result(), rc.result());

        // repeated queries are bit-identical
        a.search(&query, &mut rb).unwrap();
        assert_eq!(ra.result(), rb.result());
    }
}

#[test]
fn test_adaptive_mode_with_learned_model() {
    let (_dir, storage) = setup();
    let eager = TempDir::new().unwrap();
    artifact_with_bias(10.0).save(eager.path()).unwrap();
    let patient = TempDir::new().unwrap();
    artifact_with_bias(-10.0).save(patient.path()).unwrap();

    let stopping = loaded_omega(&storage, "constant", &omega_params(true, 0.95, 100, Some(eager.path())));
    let never = loaded_omega(&storage, "constant", &omega_params(true, 0.95, 100, Some(patient.path())));
    assert_eq!(stopping.mode(), Some(SearchMode::Adaptive));
    assert_eq!(never.mode(), Some(SearchMode::Adaptive));

    let baseline = loaded_omega(&storage, "constant", &Params::new());
    let query = [500.0; DIM];

    let mut expected = HnswContext::new(10);
    baseline.search(&query, &mut expected).unwrap();

    // a session that never stops only observes
    let mut observed = HnswContext::new(10);
    never.search(&query, &mut observed).unwrap();
    assert_eq!(observed.result(), expected.result());
    assert!(!observed.stats().early_stopped);
    assert!(observed.stats().estimated_ground_truth.is_some());

    let mut stopped = HnswContext::new(10);
    stopping.search(&query, &mut stopped).unwrap();
    assert!(stopped.stats().early_stopped);
    assert!(!stopped.result().is_empty());
    assert!(stopped.stats().hops <= expected.stats().hops);
    for pair in stopped.result().windows(2) {
        assert!(pair[0].score <= pair[1].score);
    }
    assert_eq!(stopping.stats().adaptive_queries, 1);
}

#[test]
fn test_huge_topk_adaptive_matches_baseline() {
    let (_dir, storage) = setup();
    let model_dir = TempDir::new().unwrap();
    artifact_with_bias(-10.0).save(model_dir.path()).unwrap();

    let adaptive = loaded_omega(&storage, "constant", &omega_params(true, 0.95, 0, Some(model_dir.path())));
    let baseline = loaded_omega(&storage, "constant", &Params::new());
    assert_eq!(adaptive.mode(), Some(SearchMode::Adaptive));

    let mut expected = HnswContext::new(4_000_000_000);
    baseline.search(&[250.0; DIM], &mut expected).unwrap();
    let mut ctx = HnswContext::new(4_000_000_000);
    adaptive.search(&[250.0; DIM], &mut ctx).unwrap();

    assert!(!expected.result().is_empty());
    assert_eq!(ctx.result(), expected.result());
    assert_eq!(adaptive.stats().adaptive_queries, 1);
}

#[test]
fn test_below_threshold_uses_baseline() {
    let (_dir, storage) = setup();
    let model_dir = TempDir::new().unwrap();
    artifact_with_bias(10.0).save(model_dir.path()).unwrap();

    let searcher = loaded_omega(&storage, "constant", &omega_params(true, 0.95, 1001, Some(model_dir.path())));
    assert_eq!(searcher.mode(), Some(SearchMode::Baseline));
}

#[test]
fn test_unparseable_model_falls_back() {
    let (_dir, storage) = setup();
    let model_dir = TempDir::new().unwrap();
    std::fs::write(model_dir.path().join("omega_model.json"), b"{ not json").unwrap();

    let searcher = loaded_omega(&storage, "constant", &omega_params(true, 0.95, 0, Some(model_dir.path())));
    assert_eq!(searcher.mode(), Some(SearchMode::Baseline));

    let mut ctx = searcher.create_context();
    searcher.search(&[3.0; DIM], &mut ctx).unwrap();
    assert_eq!(ctx.result()[0].key, 3);
}

#[test]
fn test_inner_product_scores_descend() {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path()).unwrap();
    build_and_dump(&storage, "ip", Metric::InnerProduct);

    let searcher = loaded_omega(&storage, "ip", &Params::new());
    let mut ctx = HnswContext::new(10);
    searcher.search(&[1.0; DIM], &mut ctx).unwrap();

    assert_eq!(ctx.result().len(), 10);
    assert_eq!(ctx.result()[0].key, 999);
    for pair in ctx.result().windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let mut exact = HnswContext::new(10);
    searcher.search_bruteforce(&[1.0; DIM], &mut exact).unwrap();
    assert_eq!(exact.result()[0].key, 999);
}

/// Counts sessions created and dropped
struct CountingModel {
    created: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

struct CountingSession {
    dropped: Arc<AtomicU64>,
}

impl Drop for CountingSession {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

impl PredictorSession for CountingSession {
    fn set_dist_start(&mut self, _distance: f32) {}
    fn report_visit(&mut self, _node: NodeId, _distance: f32, _accepted: bool) {}
    fn report_hop(&mut self) {}
    fn should_predict(&mut self) -> bool {
        false
    }
    fn should_stop(&mut self) -> bool {
        false
    }
    fn stats(&self) -> SessionStats {
        SessionStats::default()
    }
}

impl PredictorModel for CountingModel {
    fn load(&mut self, _dir: &Path) -> Result<()> {
        Ok(())
    }
    fn is_loaded(&self) -> bool {
        true
    }
    fn create_session(&self, _params: SessionParams) -> Option<Box<dyn PredictorSession + '_>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(CountingSession {
            dropped: Arc::clone(&self.dropped),
        }))
    }
}

#[test]
fn test_sessions_released_on_every_path() {
    let (_dir, storage) = setup();
    let created = Arc::new(AtomicU64::new(0));
    let dropped = Arc::new(AtomicU64::new(0));

    let (c, d) = (Arc::clone(&created), Arc::clone(&dropped));
    let mut searcher = OmegaSearcher::with_model_factory(Box::new(move || -> Box<dyn PredictorModel> {
        Box::new(CountingModel {
            created: Arc::clone(&c),
            dropped: Arc::clone(&d),
        })
    }));
    searcher
        .init(&omega_params(true, 0.9, 0, Some(Path::new("/unused"))))
        .unwrap();
    searcher.load(&storage, "constant").unwrap();
    assert_eq!(searcher.mode(), Some(SearchMode::Adaptive));

    let mut ctx = HnswContext::new(5);
    searcher.search(&[1.0; DIM], &mut ctx).unwrap();
    searcher.search(&[2.0; DIM], &mut ctx).unwrap();
    assert!(matches!(
        searcher.search(&[1.0; 3], &mut ctx),
        Err(OmegaError::DimensionMismatch { .. })
    ));

    // the mismatched query is rejected before a session exists
    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(dropped.load(Ordering::SeqCst), 2);
    let stats = searcher.stats();
    assert_eq!(stats.queries, 2);
    assert_eq!(stats.adaptive_queries, 2);
}

/// Graph whose vector store fails for one node
struct FlakyGraph {
    inner: HnswGraph,
    broken: NodeId,
}

impl ProximityGraph for FlakyGraph {
    fn node_count(&self) -> usize {
        self.inner.node_count()
    }
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
    fn metric(&self) -> Metric {
        self.inner.metric()
    }
    fn entry_point(&self) -> NodeId {
        self.inner.entry_point()
    }
    fn max_level(&self) -> usize {
        self.inner.max_level()
    }
    fn neighbors(&self, level: usize, node: NodeId) -> &[NodeId] {
        self.inner.neighbors(level, node)
    }
    fn fetch_vectors<'g>(&'g self, ids: &[NodeId], out: &mut Vec<&'g [f32]>) -> Result<()> {
        if ids.contains(&self.broken) {
            return Err(OmegaError::VectorFetch {
                node: self.broken,
                reason: "disk read failed".to_string(),
            });
        }
        self.inner.fetch_vectors(ids, out)
    }
    fn key(&self, node: NodeId) -> u64 {
        self.inner.key(node)
    }
}

#[test]
fn test_fetch_failure_aborts_query() {
    let data = constant_vectors();
    let mut builder = OmegaBuilder::new();
    let mut params = Params::new();
    params.insert("hnsw.seed", 5u64);
    builder.init(&IndexMeta::new(DIM, Metric::SquaredEuclidean), &params).unwrap();
    builder.train(&data).unwrap();
    builder.build(&data).unwrap();
    let graph = builder.into_graph().unwrap();

    // node 0 is the answer for a zero query, so the search must reach it
    let flaky = FlakyGraph {
        inner: graph,
        broken: 0,
    };
    let query = [0.0; DIM];
    let dist = QueryDistance::new(Metric::SquaredEuclidean, &query, DIM).unwrap();

    let mut ctx = HnswContext::new(5);
    let previous = vec![omega_core::Neighbor { key: 77, score: 1.0 }];
    ctx.publish(previous.clone(), Default::default());

    let err = search_graph(&flaky, &dist, &mut ctx, 50, None).unwrap_err();
    assert!(matches!(err, OmegaError::VectorFetch { node: 0, .. }));
    assert_eq!(ctx.result(), previous.as_slice());
}

#[test]
fn test_concurrent_queries_share_searcher() {
    let (_dir, storage) = setup();
    let searcher = Arc::new(loaded_omega(&storage, "constant", &Params::new()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let searcher = Arc::clone(&searcher);
            std::thread::spawn(move || {
                let mut ctx = HnswContext::new(3);
                let value = (t * 100) as f32;
                searcher.search(&[value; DIM], &mut ctx).unwrap();
                ctx.result()[0].key
            })
        })
        .collect();

    for (t, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), (t * 100) as u64);
    }
}
