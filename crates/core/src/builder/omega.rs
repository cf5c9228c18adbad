//! Builder for indexes searched by [`crate::OmegaSearcher`]
//!
//! The index is a plain HNSW graph; this builder delegates each step to an
//! [`HnswBuilder`] through [`IndexBuilder`] and keeps its own state so that
//! a failed inner step leaves it where it was.

use super::{out_of_sequence, BuildState, BuilderStats, HnswBuilder, IndexBuilder, IndexMeta, VectorHolder};
use crate::config::{OmegaConfig, Params};
use crate::index::HnswGraph;
use crate::storage::FileStorage;
use crate::Result;
use tracing::info;

#[derive(Debug, Default)]
pub struct OmegaBuilder {
    inner: HnswBuilder,
    omega: OmegaConfig,
    state: BuildState,
}

impl OmegaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Early-stop options read at init
    pub fn omega_config(&self) -> &OmegaConfig {
        &self.omega
    }

    pub fn graph(&self) -> Option<&HnswGraph> {
        self.inner.graph()
    }

    pub fn into_graph(self) -> Option<HnswGraph> {
        self.inner.into_graph()
    }
}

impl IndexBuilder for OmegaBuilder {
    fn init(&mut self, meta: &IndexMeta, params: &Params) -> Result<()> {
        if self.state != BuildState::Init {
            return Err(out_of_sequence("omega builder", "init", self.state));
        }
        let omega = OmegaConfig::from_params(params)?;
        self.inner.init(meta, params)?;
        self.omega = omega;
        self.state = BuildState::Inited;
        info!(
            dimension = meta.dimension,
            metric = %meta.metric,
            omega_enabled = self.omega.enabled,
            "omega builder initialized"
        );
        Ok(())
    }

    fn train(&mut self, holder: &VectorHolder) -> Result<()> {
        if self.state != BuildState::Inited {
            return Err(out_of_sequence("omega builder", "train", self.state));
        }
        self.inner.train(holder)?;
        self.state = BuildState::Trained;
        Ok(())
    }

    fn build(&mut self, holder: &VectorHolder) -> Result<()> {
        if self.state != BuildState::Trained {
            return Err(out_of_sequence("omega builder", "build", self.state));
        }
        self.inner.build(holder)?;
        self.state = BuildState::Built;
        info!(vectors = holder.len(), "omega builder build completed");
        Ok(())
    }

    fn dump(&mut self, storage: &FileStorage, name: &str) -> Result<()> {
        if self.state != BuildState::Built {
            return Err(out_of_sequence("omega builder", "dump", self.state));
        }
        self.inner.dump(storage, name)?;
        info!(name, "omega builder dump completed");
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        if self.state == BuildState::Init {
            return Ok(());
        }
        self.inner.cleanup()?;
        self.omega = OmegaConfig::default();
        self.state = BuildState::Init;
        Ok(())
    }

    fn state(&self) -> BuildState {
        self.state
    }

    fn stats(&self) -> BuilderStats {
        self.inner.stats()
    }
}
