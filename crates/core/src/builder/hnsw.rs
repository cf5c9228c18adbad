//! HNSW index builder

use super::{out_of_sequence, BuildState, BuilderStats, IndexBuilder, IndexMeta, VectorHolder};
use crate::config::{HnswConfig, Params};
use crate::index::HnswGraph;
use crate::storage::FileStorage;
use crate::{OmegaError, Result};
use std::time::Instant;
use tracing::info;

/// Builds an [`HnswGraph`] from a [`VectorHolder`]
#[derive(Debug)]
pub struct HnswBuilder {
    state: BuildState,
    meta: Option<IndexMeta>,
    config: HnswConfig,
    graph: Option<HnswGraph>,
    stats: BuilderStats,
}

impl Default for HnswBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HnswBuilder {
    pub fn new() -> Self {
        Self {
            state: BuildState::Init,
            meta: None,
            config: HnswConfig::default(),
            graph: None,
            stats: BuilderStats::default(),
        }
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// The built graph, once [`IndexBuilder::build`] succeeded
    pub fn graph(&self) -> Option<&HnswGraph> {
        self.graph.as_ref()
    }

    /// Take the built graph out, for in-memory use
    pub fn into_graph(self) -> Option<HnswGraph> {
        self.graph
    }

    fn check_holder(&self, holder: &VectorHolder) -> Result<IndexMeta> {
        let meta = self
            .meta
            .ok_or_else(|| OmegaError::InvalidState("builder has no index meta".to_string()))?;
        if holder.dimension() != meta.dimension {
            return Err(OmegaError::DimensionMismatch {
                expected: meta.dimension,
                actual: holder.dimension(),
            });
        }
        Ok(meta)
    }
}

impl IndexBuilder for HnswBuilder {
    fn init(&mut self, meta: &IndexMeta, params: &Params) -> Result<()> {
        if self.state != BuildState::Init {
            return Err(out_of_sequence("hnsw builder", "init", self.state));
        }
        meta.validate()?;
        self.config = HnswConfig::from_params(params)?;
        self.meta = Some(*meta);
        self.state = BuildState::Inited;
        Ok(())
    }

    fn train(&mut self, holder: &VectorHolder) -> Result<()> {
        if self.state != BuildState::Inited {
            return Err(out_of_sequence("hnsw builder", "train", self.state));
        }
        let start = Instant::now();
        self.check_holder(holder)?;

        // nothing to learn for a plain graph beyond validating the input
        self.stats.trained_count = holder.len();
        self.stats.trained_ms = start.elapsed().as_millis() as u64;
        self.state = BuildState::Trained;
        Ok(())
    }

    fn build(&mut self, holder: &VectorHolder) -> Result<()> {
        if self.state != BuildState::Trained {
            return Err(out_of_sequence("hnsw builder", "build", self.state));
        }
        let meta = self.check_holder(holder)?;
        let start = Instant::now();

        let mut graph = HnswGraph::new(meta.dimension, meta.metric, self.config.clone());
        for (key, vector) in holder.iter() {
            graph.insert(key, vector)?;
        }

        self.stats.built_count = graph.len();
        self.stats.built_ms = start.elapsed().as_millis() as u64;
        info!(
            vectors = graph.len(),
            dimension = meta.dimension,
            metric = %meta.metric,
            m = self.config.m,
            ef_construction = self.config.ef_construction,
            elapsed_ms = self.stats.built_ms,
            "graph built"
        );
        self.graph = Some(graph);
        self.state = BuildState::Built;
        Ok(())
    }

    fn dump(&mut self, storage: &FileStorage, name: &str) -> Result<()> {
        let graph = match (&self.graph, self.state) {
            (Some(graph), BuildState::Built) => graph,
            _ => return Err(out_of_sequence("hnsw builder", "dump", self.state)),
        };
        let start = Instant::now();
        let metadata = storage.save_index(name, graph)?;
        self.stats.dumped_count = metadata.vector_count;
        self.stats.dumped_ms = start.elapsed().as_millis() as u64;
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        *self = Self::new();
        Ok(())
    }

    fn state(&self) -> BuildState {
        self.state
    }

    fn stats(&self) -> BuilderStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;
    use crate::search::HnswContext;
    use crate::searcher::{HnswSearcher, IndexSearcher};
    use tempfile::TempDir;

    fn holder(count: u64, dim: usize) -> VectorHolder {
        VectorHolder::from_pairs(
            dim,
            (0..count).map(|k| (k, vec![k as f32; dim])),
        )
        .unwrap()
    }

    fn seeded_params() -> Params {
        let mut params = Params::new();
        params.insert("hnsw.seed", 17u64);
        params
    }

    #[test]
    fn test_full_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        let data = holder(300, 4);

        let mut builder = HnswBuilder::new();
        builder
            .init(&IndexMeta::new(4, Metric::SquaredEuclidean), &seeded_params())
            .unwrap();
        builder.train(&data).unwrap();
        builder.build(&data).unwrap();
        builder.dump(&storage, "built").unwrap();

        let stats = builder.stats();
        assert_eq!(stats.trained_count, 300);
        assert_eq!(stats.built_count, 300);
        assert_eq!(stats.dumped_count, 300);

        let mut searcher = HnswSearcher::new();
        searcher.init(&Params::new()).unwrap();
        searcher.load(&storage, "built").unwrap();
        let mut ctx = HnswContext::new(3);
        searcher.search(&[10.0; 4], &mut ctx).unwrap();
        let keys: Vec<u64> = ctx.result().iter().map(|n| n.key).collect();
        assert_eq!(keys[0], 10);
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_out_of_order_steps() {
        let data = holder(10, 4);
        let mut builder = HnswBuilder::new();
        assert!(matches!(builder.train(&data), Err(OmegaError::InvalidState(_))));
        assert!(matches!(builder.build(&data), Err(OmegaError::InvalidState(_))));

        builder
            .init(&IndexMeta::new(4, Metric::Cosine), &Params::new())
            .unwrap();
        assert!(builder.build(&data).is_err());
        assert!(builder
            .init(&IndexMeta::new(4, Metric::Cosine), &Params::new())
            .is_err());

        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        assert!(builder.dump(&storage, "x").is_err());

        builder.cleanup().unwrap();
        assert_eq!(builder.state(), BuildState::Init);
    }

    #[test]
    fn test_dimension_checked_against_meta() {
        let mut builder = HnswBuilder::new();
        builder
            .init(&IndexMeta::new(8, Metric::SquaredEuclidean), &Params::new())
            .unwrap();
        assert!(matches!(
            builder.train(&holder(5, 4)),
            Err(OmegaError::DimensionMismatch { expected: 8, actual: 4 })
        ));
        assert_eq!(builder.state(), BuildState::Inited);
    }

    #[test]
    fn test_same_seed_same_graph() {
        let data = holder(200, 4);
        let build = || {
            let mut builder = HnswBuilder::new();
            builder
                .init(&IndexMeta::new(4, Metric::SquaredEuclidean), &seeded_params())
                .unwrap();
            builder.train(&data).unwrap();
            builder.build(&data).unwrap();
            builder.into_graph().unwrap()
        };
        assert_eq!(build().to_parts(), build().to_parts());
    }
}
