use log::{debug, log_enabled, Level};

use crate::registry::TensorCategory;
use crate::tensor::{BufferPtr, TensorId};

/// A tensor received its buffer for the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingEvent {
    pub category: TensorCategory,
    pub tensor: TensorId,
    pub offset: usize,
    pub size: usize,
    pub buffer: BufferPtr,
    pub generation: u64,
}

/// Sink for buffer assignments made by the tensor manager
pub trait BindingObserver: Send + Sync {
    fn tensor_bound(&self, event: &BindingEvent);

    /// A pool finished its allocation for a cycle
    fn pool_allocated(&self, _category: TensorCategory, _capacity: usize, _reused: bool) {}
}

/// Writes assignments to the `log` facade at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl BindingObserver for LogObserver {
    fn tensor_bound(&self, event: &BindingEvent) {
        if log_enabled!(Level::Debug) {
            debug!(
                "{:>17} {} : {:p}",
                event.category.label(),
                event.tensor,
                event.buffer.as_ptr()
            );
        }
    }

    fn pool_allocated(&self, category: TensorCategory, capacity: usize, reused: bool) {
        debug!(
            "{} tensors planned into {} bytes ({})",
            category,
            capacity,
            if reused { "reused block" } else { "new block" }
        );
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl BindingObserver for NullObserver {
    fn tensor_bound(&self, _event: &BindingEvent) {}
}
