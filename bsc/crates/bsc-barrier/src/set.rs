//! Barrier Set - the collector capability handed to the compiler
//!
//! Built once from a [`BarrierConfig`] and a [`BarrierLayout`], validated, and then
//! passed explicitly to every compilation. It owns the classification policy and
//! drives insertion and lowering.

use bsc_ir::Graph;
use bsc_lir::LirFunction;

use crate::config::{BarrierConfig, CollectorKind, ConfigError};
use crate::counters::BarrierCounters;
use crate::error::Result;
use crate::insert::{Inserter, InsertionStats};
use crate::layout::BarrierLayout;
use crate::lower::Lowering;
use crate::policy::BarrierPolicy;

#[derive(Debug, Clone)]
pub struct BarrierSet {
    config: BarrierConfig,
    layout: BarrierLayout,
    policy: BarrierPolicy,
}

/// Result of compiling one unit
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub lir: LirFunction,
    pub stats: InsertionStats,
}

impl BarrierSet {
    pub fn new(config: BarrierConfig, layout: BarrierLayout) -> Result<Self> {
        config.validate()?;
        if config.collector != CollectorKind::Epsilon
            && config.post_write_barriers
            && layout.card_table_address.is_none()
        {
            return Err(ConfigError::MissingCardTable.into());
        }
        let policy = BarrierPolicy::from_config(&config);
        log::debug!("barrier set {:?}: {:?}", config.collector, policy);
        Ok(Self {
            config,
            layout,
            policy,
        })
    }

    pub fn kind(&self) -> CollectorKind {
        self.config.collector
    }

    pub fn config(&self) -> &BarrierConfig {
        &self.config
    }

    pub fn layout(&self) -> &BarrierLayout {
        &self.layout
    }

    pub fn policy(&self) -> &BarrierPolicy {
        &self.policy
    }

    /// Classify every access of `graph` and splice in barrier nodes
    pub fn insert_barriers(&self, graph: &mut Graph) -> Result<InsertionStats> {
        Inserter::new(&self.policy).run(graph)
    }

    /// Lower an instrumented graph, replacing every barrier with its fragment
    pub fn lower(&self, graph: &mut Graph, counters: &BarrierCounters) -> Result<LirFunction> {
        Lowering::new(&self.config, &self.layout, counters).run(graph)
    }

    /// Insertion followed by lowering
    pub fn compile(&self, graph: &mut Graph, counters: &BarrierCounters) -> Result<CompiledUnit> {
        let stats = self.insert_barriers(graph)?;
        let lir = self.lower(graph, counters)?;
        Ok(CompiledUnit { lir, stats })
    }
}
