pub mod config;
pub mod error;
pub mod manager;
pub mod memory;
pub mod observer;
pub mod registry;
pub mod report;
pub mod tensor;

// Re-export commonly used types
pub use config::PlannerOptions;
pub use error::{Error, Result};
pub use manager::TensorManager;
pub use memory::{AllocationSummary, Block, CategoryMemoryPool, PlannerKind, PoolStats, RegionAllocator};
pub use observer::{BindingEvent, BindingObserver, LogObserver, NullObserver};
pub use registry::{TensorCategory, TensorRegistry};
pub use report::{PlanEntry, PlanReport};
pub use tensor::{Binding, BufferPtr, DataType, Tensor, TensorId};
