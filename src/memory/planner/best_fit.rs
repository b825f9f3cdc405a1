use std::collections::BTreeMap;

use super::{align_up, Block, MemoryPlanner, MemoryPlans, PlannerKind};
use crate::tensor::TensorId;

/// Picks the tightest free gap inside the current region, appending at the
/// tail only when no gap fits.
#[derive(Debug)]
pub struct BestFitPlanner {
    alignment: usize,
    capacity: usize,
    /// Live blocks keyed by (offset, id)
    live: BTreeMap<(usize, TensorId), usize>,
    blocks: BTreeMap<TensorId, Block>,
}

impl BestFitPlanner {
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment,
            capacity: 0,
            live: BTreeMap::new(),
            blocks: BTreeMap::new(),
        }
    }

    fn choose_offset(&self, size: usize) -> usize {
        // (gap length, gap start) of the best candidate so far
        let mut best: Option<(usize, usize)> = None;
        let mut consider = |start: usize, end: usize| {
            if end < start {
                return;
            }
            let len = end - start;
            if len >= size && best.map_or(true, |(best_len, _)| len < best_len) {
                best = Some((len, start));
            }
        };

        let mut cursor: usize = 0;
        for (&(offset, _), &claimed_size) in &self.live {
            consider(cursor, offset);
            let claimed_end = offset.saturating_add(claimed_size);
            cursor = cursor.max(align_up(claimed_end, self.alignment));
        }
        consider(cursor, self.capacity);

        best.map_or(cursor, |(_, start)| start)
    }
}

impl MemoryPlanner for BestFitPlanner {
    fn claim(&mut self, id: TensorId, size: usize) {
        let offset = self.choose_offset(size);
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
        PlannerKind::BestFit
    }
}
