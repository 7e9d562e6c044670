//! Simulator - compile and run units against one runtime
//!
//! Pairs a [`BarrierSet`] with the [`Runtime`] whose layout it was built for, so
//! compiled code and runtime always agree on offsets, tables and encoding.

use std::sync::Arc;

use bsc_barrier::{BarrierConfig, BarrierCounters, BarrierSet, CompiledUnit};
use bsc_ir::Graph;
use bsc_lir::LirFunction;

use crate::config::HeapConfig;
use crate::error::Result;
use crate::interp::{Execution, Interpreter};
use crate::runtime::Runtime;
use crate::thread::MutatorThread;

#[derive(Debug)]
pub struct Simulator {
    runtime: Arc<Runtime>,
    barrier_set: BarrierSet,
    counters: BarrierCounters,
}

impl Simulator {
    pub fn new(config: BarrierConfig, heap: HeapConfig) -> Result<Self> {
        let runtime = Runtime::new(heap, config.compress_encoding)?;
        let barrier_set = BarrierSet::new(config, runtime.layout().clone())?;
        Ok(Self {
            runtime: Arc::new(runtime),
            barrier_set,
            counters: BarrierCounters::new(),
        })
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn barrier_set(&self) -> &BarrierSet {
        &self.barrier_set
    }

    /// Counters every unit compiled by this simulator reports to
    pub fn counters(&self) -> &BarrierCounters {
        &self.counters
    }

    pub fn compile(&self, graph: &mut Graph) -> Result<CompiledUnit> {
        Ok(self.barrier_set.compile(graph, &self.counters)?)
    }

    pub fn attach_thread(&self) -> Result<MutatorThread> {
        self.runtime.attach_thread()
    }

    pub fn execute(&self, thread: MutatorThread, func: &LirFunction, args: &[u64]) -> Result<Execution> {
        Interpreter::new(&self.runtime, thread).run(func, args)
    }
}
