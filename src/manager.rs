use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::PlannerOptions;
use crate::error::{Error, Result};
use crate::memory::{AllocationSummary, CategoryMemoryPool, PoolStats};
use crate::observer::{BindingEvent, BindingObserver, LogObserver};
use crate::registry::{TensorCategory, TensorRegistry};
use crate::report::PlanReport;
use crate::tensor::{Binding, Tensor, TensorId};

/// Plans, allocates and binds tensor memory for one backend instance.
///
/// Each category has its own pool behind its own mutex, so categories can be
/// driven from different threads. Within a category, claims and releases
/// must arrive in execution order from a single scheduler.
pub struct TensorManager {
    registry: Arc<TensorRegistry>,
    pools: [Mutex<CategoryMemoryPool>; TensorCategory::COUNT],
    observer: Arc<dyn BindingObserver>,
}

impl TensorManager {
    /// Create a manager with one pool per category
    pub fn new(registry: Arc<TensorRegistry>, options: PlannerOptions) -> Result<Self> {
        let pool = |category| CategoryMemoryPool::new(category, &options).map(Mutex::new);
        Ok(Self {
            registry,
            pools: [
                pool(TensorCategory::NonConst)?,
                pool(TensorCategory::Trainable)?,
                pool(TensorCategory::Derivative)?,
                pool(TensorCategory::Gradient)?,
            ],
            observer: Arc::new(LogObserver),
        })
    }

    /// Create a manager whose pools use the planner registered under `planner_id`
    pub fn with_planner(registry: Arc<TensorRegistry>, planner_id: &str) -> Result<Self> {
        Self::new(registry, PlannerOptions::for_planner(planner_id)?)
    }

    /// Replace the default log observer
    pub fn with_observer(mut self, observer: Arc<dyn BindingObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &Arc<TensorRegistry> {
        &self.registry
    }

    fn pool(&self, category: TensorCategory) -> Result<MutexGuard<'_, CategoryMemoryPool>> {
        self.pools[category.index()]
            .lock()
            .map_err(|_| Error::LockPoisoned(format!("{} memory pool", category)))
    }

    fn static_tensor(&self, category: TensorCategory, id: TensorId) -> Result<Arc<Tensor>> {
        let tensor = self.registry.get(category, id)?;
        if tensor.is_dynamic() {
            return Err(Error::DynamicTensor(category, id));
        }
        Ok(tensor)
    }

    /// Start the liveness window of a tensor
    pub fn claim_plan(&self, category: TensorCategory, id: TensorId) -> Result<()> {
        let tensor = self.static_tensor(category, id)?;
        self.pool(category)?.claim_plan(id, tensor.total_size())
    }

    /// End the liveness window of a tensor
    pub fn release_plan(&self, category: TensorCategory, id: TensorId) -> Result<()> {
        self.static_tensor(category, id)?;
        self.pool(category)?.release_plan(id)
    }

    /// Allocate the category's pool and bind every tensor planned in this
    /// cycle. Tensors not planned in the cycle keep their binding.
    pub fn allocate_tensors(&self, category: TensorCategory) -> Result<AllocationSummary> {
        let mut pool = self.pool(category)?;
        let summary = pool.allocate()?;

        let mut bindings = Vec::new();
        for (id, buffer) in pool.buffers() {
            let tensor = self.registry.get(category, id)?;
            let block = pool.offset_of(id)?;
            bindings.push((tensor, id, block, buffer));
        }

        self.observer
            .pool_allocated(category, summary.capacity, summary.reused);
        for (tensor, id, block, buffer) in bindings {
            tensor.set_buffer(buffer, summary.generation);
            self.observer.tensor_bound(&BindingEvent {
                category,
                tensor: id,
                offset: block.offset,
                size: block.size,
                buffer,
                generation: summary.generation,
            });
        }

        Ok(summary)
    }

    /// Start a new planning cycle for a category. Every tensor of the
    /// category loses its binding; the backing block is kept for reuse.
    pub fn begin_cycle(&self, category: TensorCategory) -> Result<()> {
        let mut pool = self.pool(category)?;
        pool.begin_cycle();
        self.unbind_all(category)
    }

    /// Drop a category's bindings and give its backing memory back
    pub fn free_tensors(&self, category: TensorCategory) -> Result<()> {
        let mut pool = self.pool(category)?;
        pool.release_memory();
        self.unbind_all(category)
    }

    fn unbind_all(&self, category: TensorCategory) -> Result<()> {
        for (_, tensor) in self.registry.tensors(category)? {
            tensor.unbind();
        }
        Ok(())
    }

    /// Bound buffer of a tensor, valid until the category's next cycle
    pub fn buffer(&self, category: TensorCategory, id: TensorId) -> Result<NonNull<u8>> {
        let tensor = self.registry.get(category, id)?;
        let pool = self.pool(category)?;

        match tensor.binding() {
            Binding::Bound { buffer, generation } => {
                if !pool.is_allocated() || generation != pool.generation() {
                    return Err(Error::StaleBinding(category, id));
                }
                Ok(buffer.as_non_null())
            }
            Binding::Unbound => {
                // Surface why there is no binding
                pool.get_buffer(id)?;
                Err(Error::NotPlanned(id))
            }
        }
    }

    pub fn stats(&self, category: TensorCategory) -> Result<PoolStats> {
        Ok(self.pool(category)?.stats())
    }

    pub fn plan_report(&self, category: TensorCategory) -> Result<PlanReport> {
        self.pool(category)?.report()
    }

    pub fn claim_non_const_plan(&self, id: TensorId) -> Result<()> {
        self.claim_plan(TensorCategory::NonConst, id)
    }

    pub fn release_non_const_plan(&self, id: TensorId) -> Result<()> {
        self.release_plan(TensorCategory::NonConst, id)
    }

    pub fn allocate_non_const_tensors(&self) -> Result<AllocationSummary> {
        self.allocate_tensors(TensorCategory::NonConst)
    }

    pub fn claim_trainable_plan(&self, id: TensorId) -> Result<()> {
        self.claim_plan(TensorCategory::Trainable, id)
    }

    pub fn release_trainable_plan(&self, id: TensorId) -> Result<()> {
        self.release_plan(TensorCategory::Trainable, id)
    }

    pub fn allocate_trainable_tensors(&self) -> Result<AllocationSummary> {
        self.allocate_tensors(TensorCategory::Trainable)
    }

    pub fn claim_derivative_plan(&self, id: TensorId) -> Result<()> {
        self.claim_plan(TensorCategory::Derivative, id)
    }

    pub fn release_derivative_plan(&self, id: TensorId) -> Result<()> {
        self.release_plan(TensorCategory::Derivative, id)
    }

    pub fn allocate_derivative_tensors(&self) -> Result<AllocationSummary> {
        self.allocate_tensors(TensorCategory::Derivative)
    }

    pub fn claim_gradient_plan(&self, id: TensorId) -> Result<()> {
        self.claim_plan(TensorCategory::Gradient, id)
    }

    pub fn release_gradient_plan(&self, id: TensorId) -> Result<()> {
        self.release_plan(TensorCategory::Gradient, id)
    }

    pub fn allocate_gradient_tensors(&self) -> Result<AllocationSummary> {
        self.allocate_tensors(TensorCategory::Gradient)
    }
}
