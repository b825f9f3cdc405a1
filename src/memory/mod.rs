pub mod allocator;
pub mod planner;
pub mod pool;
pub mod region;

pub use allocator::{
    MemoryAllocator,
    MemoryBlock,
    SystemAllocator,
    create_default_allocator,
};

pub use planner::{
    MemoryPlanner,
    MemoryPlans,
    PlannerKind,
    Block,
    BumpPlanner,
    FirstFitPlanner,
    BestFitPlanner,
    WicPlanner,
    create_planner,
};

pub use pool::{
    CategoryMemoryPool,
    AllocationSummary,
    PoolStats,
};

pub use region::RegionAllocator;
