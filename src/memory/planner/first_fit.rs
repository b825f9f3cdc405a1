use std::collections::BTreeMap;

use super::{align_up, Block, MemoryPlanner, MemoryPlans, PlannerKind};
use crate::tensor::TensorId;

/// Greedy first-fit over the gaps between live blocks.
///
/// Free space is never stored explicitly: the gaps between live blocks,
/// walked in offset order, are the free list, so a release coalesces with
/// its neighbours simply by removing the block.
#[derive(Debug)]
pub struct FirstFitPlanner {
    alignment: usize,
    capacity: usize,
    /// Live blocks keyed by (offset, id)
    live: BTreeMap<(usize, TensorId), usize>,
    blocks: BTreeMap<TensorId, Block>,
}

impl FirstFitPlanner {
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment,
            capacity: 0,
            live: BTreeMap::new(),
            blocks: BTreeMap::new(),
        }
    }
}

impl MemoryPlanner for FirstFitPlanner {
    fn claim(&mut self, id: TensorId, size: usize) {
        let mut offset: usize = 0;
        for (&(claimed_offset, _), &claimed_size) in &self.live {
            if offset.saturating_add(size) <= claimed_offset {
                break;
            }
            let claimed_end = claimed_offset.saturating_add(claimed_size);
            offset = offset.max(align_up(claimed_end, self.alignment));
        }

        let block = Block::new(offset, size);
        self.capacity = self.capacity.max(block.end());
        self.live.insert((offset, id), size);
        self.blocks.insert(id, block);
    }

    fn release(&mut self, id: TensorId) {
        if let Some(block) = self.blocks.get(&id) {
            self.live.remove(&(block.offset, id));
        }
    }

    fn finalize(&mut self) -> MemoryPlans {
        self.live.clear();
        MemoryPlans::new(std::mem::take(&mut self.blocks), self.capacity)
    }

    fn kind(&self) -> PlannerKind {
        PlannerKind::FirstFit
    }
}
