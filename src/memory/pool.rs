use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::config::PlannerOptions;
use crate::error::{Error, Result};
use crate::memory::allocator::{create_default_allocator, MemoryAllocator, MemoryBlock};
use crate::memory::planner::{Block, PlannerKind};
use crate::memory::region::RegionAllocator;
use crate::registry::TensorCategory;
use crate::report::{PlanEntry, PlanReport};
use crate::tensor::{BufferPtr, TensorId};

/// Result of one pool allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationSummary {
    /// Planned region size
    pub capacity: usize,
    /// Whether the previous backing block was large enough to keep
    pub reused: bool,
    pub generation: u64,
}

/// Point-in-time counters of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub category: TensorCategory,
    pub planned_capacity: Option<usize>,
    pub backing_size: usize,
    pub lower_bound: usize,
    pub live_tensors: usize,
    pub claimed_tensors: usize,
    pub generation: u64,
    pub acquisitions: usize,
}

/// Planner plus the single contiguous allocation backing one category
pub struct CategoryMemoryPool {
    category: TensorCategory,
    buffer_alignment: usize,
    region: RegionAllocator,
    allocator: Box<dyn MemoryAllocator>,
    block: Option<MemoryBlock>,
    buffers: BTreeMap<TensorId, BufferPtr>,
    generation: u64,
}

impl CategoryMemoryPool {
    /// Create a pool backed by the system allocator
    pub fn new(category: TensorCategory, options: &PlannerOptions) -> Result<Self> {
        Self::with_allocator(category, options, create_default_allocator(options.memory_limit_bytes))
    }

    /// Create a pool backed by `allocator`
    pub fn with_allocator(
        category: TensorCategory,
        options: &PlannerOptions,
        allocator: Box<dyn MemoryAllocator>,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            category,
            buffer_alignment: options.buffer_alignment,
            region: RegionAllocator::new(options.strategy, options.offset_alignment),
            allocator,
            block: None,
            buffers: BTreeMap::new(),
            generation: 0,
        })
    }

    pub fn category(&self) -> TensorCategory {
        self.category
    }

    pub fn strategy(&self) -> PlannerKind {
        self.region.kind()
    }

    pub fn claim_plan(&mut self, id: TensorId, size: usize) -> Result<()> {
        self.region.claim(id, size)
    }

    pub fn release_plan(&mut self, id: TensorId) -> Result<()> {
        self.region.release(id)
    }

    /// Finalize the plan, acquire backing memory and resolve every planned
    /// tensor's address. At most one acquisition happens per call.
    pub fn allocate(&mut self) -> Result<AllocationSummary> {
        let capacity = self.region.allocate()?;
        let reused = self.ensure_block(capacity)?;

        let block = self.block.as_ref().ok_or(Error::NotAllocated)?;
        let plans = self.region.plans().ok_or(Error::NotAllocated)?;

        let mut buffers = BTreeMap::new();
        for (id, planned) in plans.iter() {
            let ptr = block.ptr_at(planned.offset).ok_or_else(|| {
                Error::InvalidLayout(format!(
                    "{} tensor {} at offset {} lies outside a {} byte region",
                    self.category, id, planned.offset, block.size()
                ))
            })?;
            buffers.insert(id, BufferPtr::new(ptr));
        }

        self.buffers = buffers;
        self.generation += 1;
        Ok(AllocationSummary {
            capacity,
            reused,
            generation: self.generation,
        })
    }

    /// Make sure the backing block holds `capacity` bytes. Returns true when
    /// the existing block was kept.
    fn ensure_block(&mut self, capacity: usize) -> Result<bool> {
        if let Some(block) = &self.block {
            if block.size() >= capacity {
                debug!(
                    "{} pool reuses {} byte block for {} byte plan",
                    self.category, block.size(), capacity
                );
                return Ok(true);
            }
        }

        self.release_block();
        let block = self.allocator.allocate(capacity, self.buffer_alignment)?;
        debug!(
            "{} pool acquired {} bytes at {:p}",
            self.category,
            block.size(),
            block.ptr().as_ptr()
        );
        self.block = Some(block);
        Ok(false)
    }

    fn release_block(&mut self) {
        if let Some(block) = self.block.take() {
            debug!("{} pool released {} bytes", self.category, block.size());
            self.allocator.deallocate(block);
        }
    }

    /// Absolute address of a planned tensor in the current cycle
    pub fn get_buffer(&self, id: TensorId) -> Result<BufferPtr> {
        if !self.region.is_allocated() {
            return Err(Error::NotAllocated);
        }
        self.buffers.get(&id).copied().ok_or(Error::NotPlanned(id))
    }

    /// Planned byte range of a tensor in the current cycle
    pub fn offset_of(&self, id: TensorId) -> Result<Block> {
        self.region.offset_of(id)
    }

    /// Resolved addresses in ascending identifier order
    pub fn buffers(&self) -> impl Iterator<Item = (TensorId, BufferPtr)> + '_ {
        self.buffers.iter().map(|(id, ptr)| (*id, *ptr))
    }

    pub fn is_allocated(&self) -> bool {
        self.region.is_allocated()
    }

    pub fn is_live(&self, id: TensorId) -> bool {
        self.region.is_live(id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new planning cycle. The backing block is kept for reuse;
    /// addresses from the previous cycle become invalid.
    pub fn begin_cycle(&mut self) {
        self.region.reset();
        self.buffers.clear();
    }

    /// Start a new cycle and give the backing block back to the allocator
    pub fn release_memory(&mut self) {
        self.begin_cycle();
        self.release_block();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            category: self.category,
            planned_capacity: self.region.capacity(),
            backing_size: self.block.as_ref().map_or(0, MemoryBlock::size),
            lower_bound: self.region.lower_bound(),
            live_tensors: self.region.live_count(),
            claimed_tensors: self.region.claimed_count(),
            generation: self.generation,
            acquisitions: self.allocator.allocation_count(),
        }
    }

    /// Snapshot of the allocated plan
    pub fn report(&self) -> Result<PlanReport> {
        let plans = self.region.plans().ok_or(Error::NotAllocated)?;
        let entries = plans
            .iter()
            .map(|(id, block)| PlanEntry {
                tensor: id,
                offset: block.offset,
                size: block.size,
            })
            .collect();

        Ok(PlanReport {
            category: self.category,
            strategy: self.strategy(),
            capacity: plans.capacity(),
            lower_bound: self.region.lower_bound(),
            generation: self.generation,
            entries,
        })
    }
}

impl Drop for CategoryMemoryPool {
    fn drop(&mut self) {
        self.release_block();
    }
}
