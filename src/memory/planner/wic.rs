use std::collections::{BTreeMap, BTreeSet};

use super::{align_up, Block, MemoryPlanner, MemoryPlans, PlannerKind};
use crate::tensor::TensorId;

/// Weighted interference coloring.
///
/// Claims and releases only build the interference graph (which tensors are
/// live together). Offsets are assigned in `finalize`, largest tensor first,
/// each at the lowest offset free of its already placed neighbours.
#[derive(Debug)]
pub struct WicPlanner {
    alignment: usize,
    live: BTreeSet<TensorId>,
    /// Claims in submission order
    claims: Vec<(TensorId, usize)>,
    interference: BTreeMap<TensorId, BTreeSet<TensorId>>,
}

impl WicPlanner {
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment,
            live: BTreeSet::new(),
            claims: Vec::new(),
            interference: BTreeMap::new(),
        }
    }

    fn place(&self, size: usize, neighbours: &mut [Block]) -> usize {
        neighbours.sort_by_key(|block| (block.offset, block.size));

        let mut offset: usize = 0;
        for block in neighbours.iter() {
            if offset.saturating_add(size) <= block.offset {
                break;
            }
            offset = offset.max(align_up(block.end(), self.alignment));
        }
        offset
    }
}

impl MemoryPlanner for WicPlanner {
    fn claim(&mut self, id: TensorId, size: usize) {
        let mut neighbours = BTreeSet::new();
        for &other in &self.live {
            neighbours.insert(other);
            self.interference.entry(other).or_default().insert(id);
        }
        self.interference.entry(id).or_default().extend(neighbours);
        self.live.insert(id);
        self.claims.push((id, size));
    }

    fn release(&mut self, id: TensorId) {
        self.live.remove(&id);
    }

    fn finalize(&mut self) -> MemoryPlans {
        let mut order = std::mem::take(&mut self.claims);
        // Stable: equal sizes keep claim order
        order.sort_by(|a, b| b.1.cmp(&a.1));

        let mut blocks: BTreeMap<TensorId, Block> = BTreeMap::new();
        let mut capacity: usize = 0;
        for (id, size) in order {
            let mut neighbours: Vec<Block> = self
                .interference
                .get(&id)
                .map(|others| others.iter().filter_map(|other| blocks.get(other).copied()).collect())
                .unwrap_or_default();

            let block = Block::new(self.place(size, &mut neighbours), size);
            capacity = capacity.max(block.end());
            blocks.insert(id, block);
        }

        self.live.clear();
        self.interference.clear();
        MemoryPlans::new(blocks, capacity)
    }

    fn kind(&self) -> PlannerKind {
        PlannerKind::Wic
    }
}
