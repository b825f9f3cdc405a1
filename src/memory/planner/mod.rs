//! Offset assignment strategies.
//!
//! A planner observes claim/release events in execution order and assigns
//! every claimed tensor a byte range inside one region, so that tensors
//! live at the same time never share bytes. Strategies are selected by name
//! through [`PlannerKind`] and built by [`create_planner`].
//!
//! Planners trust their input: duplicate claims and unmatched releases are
//! rejected one level up by [`RegionAllocator`](crate::memory::RegionAllocator).

mod best_fit;
mod bump;
mod first_fit;
mod wic;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::Error;
use crate::tensor::TensorId;

pub use best_fit::BestFitPlanner;
pub use bump::BumpPlanner;
pub use first_fit::FirstFitPlanner;
pub use wic::WicPlanner;

/// Byte range assigned to one tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub offset: usize,
    pub size: usize,
}

impl Block {
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.size)
    }

    /// Whether two ranges share at least one byte. Empty ranges share none.
    pub fn overlaps(&self, other: &Block) -> bool {
        if self.size == 0 || other.size == 0 {
            return false;
        }
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Final placement of every tensor claimed in a cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryPlans {
    blocks: BTreeMap<TensorId, Block>,
    capacity: usize,
}

impl MemoryPlans {
    pub fn new(blocks: BTreeMap<TensorId, Block>, capacity: usize) -> Self {
        Self { blocks, capacity }
    }

    pub fn get(&self, id: TensorId) -> Option<Block> {
        self.blocks.get(&id).copied()
    }

    /// Region size required by the plan
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Placements in ascending identifier order
    pub fn iter(&self) -> impl Iterator<Item = (TensorId, Block)> + '_ {
        self.blocks.iter().map(|(id, block)| (*id, *block))
    }
}

/// Offset assignment strategy
pub trait MemoryPlanner: Send {
    /// Tensor `id` becomes live now and needs `size` bytes
    fn claim(&mut self, id: TensorId, size: usize);

    /// Tensor `id` is dead from now on
    fn release(&mut self, id: TensorId);

    /// Finish the cycle and return the placement of every claimed tensor
    fn finalize(&mut self) -> MemoryPlans;

    fn kind(&self) -> PlannerKind;
}

/// Name-keyed selector of planning strategies
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
    Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(try_from = "String", into = "String")]
pub enum PlannerKind {
    /// Never reuses memory; useful to rule out aliasing bugs
    #[strum(to_string = "Bump", serialize = "no-reuse")]
    Bump,
    /// Lowest free offset that fits
    #[default]
    #[strum(to_string = "FirstFit", serialize = "first-fit", serialize = "first_fit")]
    FirstFit,
    /// Smallest free gap that fits
    #[strum(to_string = "BestFit", serialize = "best-fit", serialize = "best_fit")]
    BestFit,
    /// Weighted interference coloring, placed at allocation time
    #[strum(to_string = "WIC", serialize = "weighted-interference")]
    Wic,
}

impl TryFrom<String> for PlannerKind {
    type Error = Error;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse().map_err(|_| Error::UnknownPlanner(name))
    }
}

impl From<PlannerKind> for String {
    fn from(kind: PlannerKind) -> Self {
        kind.to_string()
    }
}

impl PlannerKind {
    /// Parse a strategy name, case-insensitively
    pub fn from_name(name: &str) -> crate::error::Result<Self> {
        name.parse().map_err(|_| Error::UnknownPlanner(name.to_string()))
    }

    /// Whether freed ranges can be handed to later claims
    pub fn reuses_memory(&self) -> bool {
        !matches!(self, PlannerKind::Bump)
    }
}

/// Build a planner of the given kind. `alignment` must be a power of two.
pub fn create_planner(kind: PlannerKind, alignment: usize) -> Box<dyn MemoryPlanner> {
    match kind {
        PlannerKind::Bump => Box::new(BumpPlanner::new(alignment)),
        PlannerKind::FirstFit => Box::new(FirstFitPlanner::new(alignment)),
        PlannerKind::BestFit => Box::new(BestFitPlanner::new(alignment)),
        PlannerKind::Wic => Box::new(WicPlanner::new(alignment)),
    }
}

pub(crate) fn align_up(offset: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    offset.saturating_add(alignment - 1) & !(alignment - 1)
}
