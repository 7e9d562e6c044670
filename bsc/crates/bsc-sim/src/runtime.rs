//! Simulated collector runtime
//!
//! Drives the collector phases compiled barriers observe, and implements the
//! runtime routines their slow paths call.
//!
//! Collection Cycle:
//! ```text
//!   Idle ──▶ Marking ──▶ WeakRoots ──▶ Evacuation ──▶ UpdateRefs ──▶ Idle
//!              │                          ▲
//!              └──────────────────────────┘ (finish_marking, then start_evacuation)
//! ```
//!
//! | Phase      | gc-state bits                  | SATB marking active |
//! |------------|--------------------------------|---------------------|
//! | Idle       | none                           | no                  |
//! | Marking    | MARKING                        | yes                 |
//! | WeakRoots  | WEAK_ROOTS                     | no                  |
//! | Evacuation | HAS_FORWARDED, EVACUATION      | no                  |
//! | UpdateRefs | HAS_FORWARDED, UPDATE_REFS     | no                  |
//!
//! Every transition republishes the state into all attached thread blocks.

use std::fmt;

use bsc_barrier::{BarrierLayout, GcStateFlags};
use bsc_ir::{ClassRef, ReferenceStrength};
use bsc_lir::{CompressEncoding, ForeignCall, Width};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{HeapConfig, HEAP_BASE};
use crate::error::{Result, SimError};
use crate::heap::{Evacuation, Heap};
use crate::satb::SatbQueueSet;
use crate::stats::RuntimeStats;
use crate::thread::{barrier_layout, MutatorThread};
use crate::trace::{TraceRecord, TraceSink};

/// Encoding used for narrow references when none is configured
pub const DEFAULT_ENCODING: CompressEncoding = CompressEncoding::new(0, 3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Marking,
    WeakRoots,
    Evacuation,
    UpdateRefs,
}

impl Phase {
    pub fn gc_state(self) -> GcStateFlags {
        match self {
            Phase::Idle => GcStateFlags::STABLE,
            Phase::Marking => GcStateFlags::MARKING,
            Phase::WeakRoots => GcStateFlags::WEAK_ROOTS,
            Phase::Evacuation => GcStateFlags::HAS_FORWARDED | GcStateFlags::EVACUATION,
            Phase::UpdateRefs => GcStateFlags::HAS_FORWARDED | GcStateFlags::UPDATE_REFS,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Marking => "marking",
            Phase::WeakRoots => "weak-roots",
            Phase::Evacuation => "evacuation",
            Phase::UpdateRefs => "update-refs",
        })
    }
}

#[derive(Debug)]
struct CollectorState {
    phase: Phase,
    gc_state: GcStateFlags,
    marking: bool,
}

pub struct Runtime {
    heap: Heap,
    layout: BarrierLayout,
    encoding: CompressEncoding,
    satb: SatbQueueSet,
    collector: Mutex<CollectorState>,
    threads: Mutex<Vec<MutatorThread>>,
    stats: RuntimeStats,
    trace: TraceSink,
}

impl Runtime {
    pub fn new(config: HeapConfig, encoding: Option<CompressEncoding>) -> Result<Self> {
        let encoding = encoding.unwrap_or(DEFAULT_ENCODING);
        let layout = barrier_layout(&config);
        let last = config.heap_end() - 8;
        if !encoding.can_encode(HEAP_BASE) || !encoding.can_encode(last) {
            return Err(SimError::Config(format!(
                "heap [{:#x}, {:#x}] not encodable with base {:#x} shift {}",
                HEAP_BASE, last, encoding.base, encoding.shift
            )));
        }
        let heap = Heap::new(config)?;
        Ok(Self {
            heap,
            layout,
            encoding,
            satb: SatbQueueSet::new(),
            collector: Mutex::new(CollectorState {
                phase: Phase::Idle,
                gc_state: GcStateFlags::STABLE,
                marking: false,
            }),
            threads: Mutex::new(Vec::new()),
            stats: RuntimeStats::new(),
            trace: TraceSink::new(),
        })
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Layout compiled code must be built against
    pub fn layout(&self) -> &BarrierLayout {
        &self.layout
    }

    pub fn encoding(&self) -> CompressEncoding {
        self.encoding
    }

    pub fn satb_queue(&self) -> &SatbQueueSet {
        &self.satb
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }

    pub fn trace_sink(&self) -> &TraceSink {
        &self.trace
    }

    pub fn phase(&self) -> Phase {
        self.collector.lock().phase
    }

    pub fn gc_state(&self) -> GcStateFlags {
        self.collector.lock().gc_state
    }

    /// Attach a mutator thread, initialized with the current state
    pub fn attach_thread(&self) -> Result<MutatorThread> {
        let collector = self.collector.lock();
        let mut threads = self.threads.lock();
        let max = self.heap.config().max_threads;
        if threads.len() >= max {
            return Err(SimError::ThreadLimit { max });
        }
        let thread = MutatorThread::new(threads.len(), self.heap.config());
        thread.initialize(&self.heap, collector.gc_state, collector.marking)?;
        threads.push(thread);
        log::debug!("attached thread {} (block {:#x})", thread.id, thread.tls);
        Ok(thread)
    }

    pub fn threads(&self) -> Vec<MutatorThread> {
        self.threads.lock().clone()
    }

    /// ========================================================================
    /// PHASE CONTROL
    /// ========================================================================

    fn transition(&self, collector: &mut CollectorState, phase: Phase, marking: bool) -> Result<()> {
        let gc_state = phase.gc_state();
        log::info!(
            "phase {} -> {} (gc-state {:#04x})",
            collector.phase,
            phase,
            gc_state.bits()
        );
        collector.phase = phase;
        collector.gc_state = gc_state;
        collector.marking = marking;
        for thread in self.threads.lock().iter() {
            thread.publish(&self.heap, gc_state, marking)?;
        }
        Ok(())
    }

    fn expect_phase(collector: &CollectorState, allowed: &[Phase], operation: &'static str) -> Result<()> {
        if allowed.contains(&collector.phase) {
            Ok(())
        } else {
            Err(SimError::InvalidPhase {
                phase: collector.phase,
                operation,
            })
        }
    }

    /// Begin a cycle: bump the collection count and activate SATB marking
    pub fn start_marking(&self) -> Result<u64> {
        let mut collector = self.collector.lock();
        Self::expect_phase(&collector, &[Phase::Idle], "start marking")?;
        let cycle = self.heap.increment_collections()?;
        self.heap.clear_marks();
        self.transition(&mut collector, Phase::Marking, true)?;
        Ok(cycle)
    }

    /// Flush every thread buffer, mark everything logged and enter weak-root
    /// processing. Returns the number of objects newly marked from SATB entries.
    pub fn finish_marking(&self) -> Result<usize> {
        let mut collector = self.collector.lock();
        Self::expect_phase(&collector, &[Phase::Marking], "finish marking")?;
        for thread in self.threads.lock().iter() {
            self.flush_buffer(thread)?;
        }
        let mut marked = 0;
        for buffer in self.satb.drain() {
            for obj in buffer {
                if self.heap.mark(obj) {
                    marked += 1;
                }
            }
        }
        log::debug!("marking finished: {} objects marked from SATB buffers", marked);
        self.transition(&mut collector, Phase::WeakRoots, false)?;
        Ok(marked)
    }

    /// Select the collection set and start evacuating
    pub fn start_evacuation(&self, regions: &[usize]) -> Result<()> {
        let mut collector = self.collector.lock();
        Self::expect_phase(&collector, &[Phase::Idle, Phase::WeakRoots], "start evacuation")?;
        self.heap.add_to_collection_set(regions)?;
        self.transition(&mut collector, Phase::Evacuation, false)
    }

    /// Collector-side evacuation of whatever mutators have not copied yet
    pub fn evacuate_collection_set(&self) -> Result<usize> {
        {
            let collector = self.collector.lock();
            Self::expect_phase(&collector, &[Phase::Evacuation], "evacuate")?;
        }
        let mut copied = 0;
        for obj in self.heap.unforwarded_in_collection_set()? {
            if let Evacuation::Copied(_) = self.heap.evacuate(obj)? {
                RuntimeStats::bump(&self.stats.objects_evacuated);
                copied += 1;
            }
        }
        log::debug!("collector evacuated {} objects", copied);
        Ok(copied)
    }

    pub fn start_update_refs(&self) -> Result<()> {
        let mut collector = self.collector.lock();
        Self::expect_phase(&collector, &[Phase::Evacuation], "update references")?;
        self.transition(&mut collector, Phase::UpdateRefs, false)
    }

    /// Drop the collection set and return to idle
    pub fn finish_cycle(&self) -> Result<()> {
        let mut collector = self.collector.lock();
        Self::expect_phase(
            &collector,
            &[Phase::WeakRoots, Phase::Evacuation, Phase::UpdateRefs],
            "finish the cycle",
        )?;
        self.heap.clear_collection_set()?;
        self.transition(&mut collector, Phase::Idle, false)
    }

    /// ========================================================================
    /// RUNTIME ROUTINES
    /// ========================================================================

    /// Dispatch a routine called from compiled code
    pub fn call(&self, thread: &MutatorThread, routine: ForeignCall, args: &[u64]) -> Result<Option<u64>> {
        let expected = routine.signature().args.len();
        if args.len() != expected {
            return Err(SimError::trap(format!(
                "{} called with {} arguments, expected {}",
                routine,
                args.len(),
                expected
            )));
        }
        match routine {
            ForeignCall::SatbEnqueue => {
                self.satb_enqueue(thread, args[0])?;
                Ok(None)
            }
            ForeignCall::LoadReferenceBarrier { strength, narrow } => self
                .load_reference_barrier(strength, narrow, args[0], args[1])
                .map(Some),
            ForeignCall::VerifyOop => self.verify_oop(args[0]).map(Some),
            ForeignCall::NewInstance => self.new_instance(args[0], args[1]).map(Some),
        }
    }

    /// Log `pre_val` when the thread's buffer is full, handing the full buffer
    /// to the queue set first
    pub fn satb_enqueue(&self, thread: &MutatorThread, pre_val: u64) -> Result<()> {
        RuntimeStats::bump(&self.stats.satb_enqueue_calls);
        if pre_val == 0 || !thread.marking_active(&self.heap)? {
            RuntimeStats::bump(&self.stats.satb_entries_dropped);
            log::trace!("thread {}: dropped {:#x}, marking inactive", thread.id, pre_val);
            return Ok(());
        }
        let mut index = thread.satb_index(&self.heap)?;
        if index == 0 {
            let flushed = self.flush_buffer(thread)?;
            log::debug!("thread {}: SATB buffer full, handed over {} entries", thread.id, flushed);
            index = thread.satb_capacity;
        }
        index -= 8;
        self.heap.write_u64(thread.satb_buffer + index, pre_val)?;
        thread.set_satb_index(&self.heap, index)
    }

    /// Hand a thread's logged entries to the queue set and empty its buffer
    fn flush_buffer(&self, thread: &MutatorThread) -> Result<usize> {
        let entries = thread.satb_entries(&self.heap)?;
        let count = entries.len();
        if count > 0 {
            self.satb.enqueue_completed(entries);
            RuntimeStats::bump(&self.stats.satb_buffers_completed);
        }
        thread.set_satb_index(&self.heap, thread.satb_capacity)?;
        Ok(count)
    }

    /// Slow path of the load-reference barrier
    ///
    /// Weak and phantom loads of an unmarked object while weak roots are being
    /// processed return null. Otherwise a collection-set object is evacuated (or
    /// its existing copy found), the field is healed with a CAS from the old to the
    /// new reference, and the copy is returned.
    pub fn load_reference_barrier(
        &self,
        strength: ReferenceStrength,
        narrow: bool,
        obj: u64,
        field: u64,
    ) -> Result<u64> {
        RuntimeStats::bump(&self.stats.lrb_calls);
        if obj == 0 {
            return Ok(0);
        }
        let gc_state = self.gc_state();
        if !strength.is_strong() && gc_state.contains(GcStateFlags::WEAK_ROOTS) && !self.is_live(obj)? {
            RuntimeStats::bump(&self.stats.references_cleared);
            log::debug!("{:?} load of unreachable {:#x} cleared", strength, obj);
            return Ok(0);
        }
        if !self.heap.in_collection_set(obj) {
            return Ok(obj);
        }

        let to = match self.heap.evacuate(obj)? {
            Evacuation::Copied(to) => {
                RuntimeStats::bump(&self.stats.objects_evacuated);
                to
            }
            Evacuation::AlreadyForwarded(to) => to,
        };
        if field != 0 {
            let (width, old, new) = if narrow {
                (
                    Width::W32,
                    u64::from(self.encoding.compress(obj)),
                    u64::from(self.encoding.compress(to)),
                )
            } else {
                (Width::W64, obj, to)
            };
            if self.heap.compare_and_swap(field, width, old, new)? {
                RuntimeStats::bump(&self.stats.fields_healed);
            }
        }
        log::debug!("load_reference_barrier: {:#x} -> {:#x} (field {:#x})", obj, to, field);
        Ok(to)
    }

    fn is_live(&self, obj: u64) -> Result<bool> {
        Ok(self.heap.is_marked(obj) || self.heap.is_marked(self.heap.resolve(obj)?))
    }

    /// Trap unless `value` is null or a heap object
    pub fn verify_oop(&self, value: u64) -> Result<u64> {
        RuntimeStats::bump(&self.stats.oops_verified);
        if value == 0 || self.heap.is_object(value) {
            Ok(value)
        } else {
            log::error!("verify_oop: {:#x} is not an object", value);
            Err(SimError::trap(format!("verify_oop: {:#x} is not an object", value)))
        }
    }

    /// Allocate an instance; objects allocated while marking are born marked
    pub fn new_instance(&self, klass: u64, size: u64) -> Result<u64> {
        RuntimeStats::bump(&self.stats.allocations);
        let size = u32::try_from(size).map_err(|_| SimError::OutOfMemory { requested: size })?;
        let obj = self.heap.allocate(ClassRef(klass), size)?;
        if self.collector.lock().marking {
            self.heap.mark(obj);
        }
        Ok(obj)
    }

    /// Record a trace event from compiled code
    pub fn trace(&self, thread: &MutatorThread, event: &'static str, fields: Vec<(&'static str, u64)>) {
        self.trace.emit(TraceRecord {
            thread: thread.id,
            event,
            fields: fields.into_iter().collect(),
        });
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("phase", &self.phase())
            .field("heap", &self.heap)
            .finish()
    }
}
