use std::collections::BTreeMap;

use super::{align_up, Block, MemoryPlanner, MemoryPlans, PlannerKind};
use crate::tensor::TensorId;

/// Places every claim after everything claimed before it
#[derive(Debug)]
pub struct BumpPlanner {
    alignment: usize,
    capacity: usize,
    blocks: BTreeMap<TensorId, Block>,
}

impl BumpPlanner {
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment,
            capacity: 0,
            blocks: BTreeMap::new(),
        }
    }
}

impl MemoryPlanner for BumpPlanner {
    fn claim(&mut self, id: TensorId, size: usize) {
        let offset = align_up(self.capacity, self.alignment);
        let block = Block::new(offset, size);
        self.capacity = block.end();
        self.blocks.insert(id, block);
    }

    fn release(&mut self, _id: TensorId) {}

    fn finalize(&mut self) -> MemoryPlans {
        MemoryPlans::new(std::mem::take(&mut self.blocks), self.capacity)
    }

    fn kind(&self) -> PlannerKind {
        PlannerKind::Bump
    }
}
