use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use crate::error::{Error, Result};
use crate::memory::planner::{create_planner, Block, MemoryPlanner, MemoryPlans, PlannerKind};
use crate::tensor::TensorId;

/// Liveness bookkeeping around one planning strategy.
///
/// Enforces the claim/release protocol for a cycle: one claim per
/// identifier, releases only for live identifiers, no events after
/// `allocate`, offsets only after `allocate`.
pub struct RegionAllocator {
    kind: PlannerKind,
    alignment: usize,
    planner: Box<dyn MemoryPlanner>,
    live: BTreeMap<TensorId, usize>,
    claimed: BTreeSet<TensorId>,
    live_bytes: usize,
    max_live_bytes: usize,
    plans: Option<MemoryPlans>,
}

impl RegionAllocator {
    /// `alignment` must be a non-zero power of two
    pub fn new(kind: PlannerKind, alignment: usize) -> Self {
        Self {
            kind,
            alignment,
            planner: create_planner(kind, alignment),
            live: BTreeMap::new(),
            claimed: BTreeSet::new(),
            live_bytes: 0,
            max_live_bytes: 0,
            plans: None,
        }
    }

    pub fn kind(&self) -> PlannerKind {
        self.kind
    }

    pub fn claim(&mut self, id: TensorId, size: usize) -> Result<()> {
        if self.plans.is_some() {
            return Err(Error::PlanFinalized(id));
        }
        if self.claimed.contains(&id) {
            return Err(Error::DoubleClaim(id));
        }
        let live_bytes = self
            .live_bytes
            .checked_add(size)
            .ok_or(Error::RegionOverflow { tensor: id, size })?;

        trace!("claim {} ({} bytes) with {}", id, size, self.kind);
        self.planner.claim(id, size);
        self.claimed.insert(id);
        self.live.insert(id, size);
        self.live_bytes = live_bytes;
        self.max_live_bytes = self.max_live_bytes.max(live_bytes);
        Ok(())
    }

    pub fn release(&mut self, id: TensorId) -> Result<()> {
        if self.plans.is_some() {
            return Err(Error::PlanFinalized(id));
        }
        let size = self.live.remove(&id).ok_or(Error::NotLive(id))?;

        trace!("release {} ({} bytes)", id, size);
        self.planner.release(id);
        self.live_bytes -= size;
        Ok(())
    }

    /// Finalize the cycle and return the required region size
    pub fn allocate(&mut self) -> Result<usize> {
        if self.plans.is_some() {
            return Err(Error::AlreadyAllocated);
        }
        let plans = self.planner.finalize();
        let capacity = plans.capacity();
        self.plans = Some(plans);
        Ok(capacity)
    }

    pub fn offset_of(&self, id: TensorId) -> Result<Block> {
        let plans = self.plans.as_ref().ok_or(Error::NotAllocated)?;
        plans.get(id).ok_or(Error::NotPlanned(id))
    }

    pub fn plans(&self) -> Option<&MemoryPlans> {
        self.plans.as_ref()
    }

    pub fn is_allocated(&self) -> bool {
        self.plans.is_some()
    }

    /// Region size of the finalized plan
    pub fn capacity(&self) -> Option<usize> {
        self.plans.as_ref().map(MemoryPlans::capacity)
    }

    /// Largest number of bytes live at one point of the cycle, the floor for
    /// any strategy's capacity
    pub fn lower_bound(&self) -> usize {
        self.max_live_bytes
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: TensorId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn claimed_count(&self) -> usize {
        self.claimed.len()
    }

    /// Drop all cycle state and start over with a fresh planner
    pub fn reset(&mut self) {
        self.planner = create_planner(self.kind, self.alignment);
        self.live.clear();
        self.claimed.clear();
        self.live_bytes = 0;
        self.max_live_bytes = 0;
        self.plans = None;
    }
}
