use std::sync::{Arc, Mutex};

use anyhow::Result;
use rayon::prelude::*;
use strum::IntoEnumIterator;

use train_memory_planner::{
    BindingEvent, BindingObserver, DataType, Error, NullObserver, PlanReport, PlannerKind,
    PlannerOptions, Tensor, TensorCategory, TensorId, TensorManager, TensorRegistry,
};

/// Collects binding events for inspection
#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<BindingEvent>>,
    pools: Mutex<Vec<(TensorCategory, usize, bool)>>,
}

impl BindingObserver for RecordingObserver {
    fn tensor_bound(&self, event: &BindingEvent) {
        self.events.lock().unwrap().push(*event);
    }

    fn pool_allocated(&self, category: TensorCategory, capacity: usize, reused: bool) {
        self.pools.lock().unwrap().push((category, capacity, reused));
    }
}

// Helper to register a small two-layer training graph
fn create_registry() -> Arc<TensorRegistry> {
    let registry = Arc::new(TensorRegistry::new());

    // Forward activations
    for (raw, size) in [(0, 100), (1, 200), (2, 100), (3, 64)] {
        registry.register(TensorCategory::NonConst, TensorId(raw), Tensor::new(size)).unwrap();
    }
    registry.register(TensorCategory::NonConst, TensorId(9), Tensor::dynamic()).unwrap();

    // Weights and their gradients
    for raw in [10, 11] {
        registry
            .register(TensorCategory::Trainable, TensorId(raw), Tensor::with_shape(&[8, 8], DataType::Float32).unwrap())
            .unwrap();
        registry
            .register(TensorCategory::Gradient, TensorId(raw), Tensor::with_shape(&[8, 8], DataType::Float32).unwrap())
            .unwrap();
    }

    // Backward derivatives of the activations
    for (raw, size) in [(1, 200), (2, 100), (3, 64)] {
        registry.register(TensorCategory::Derivative, TensorId(raw), Tensor::new(size)).unwrap();
    }

    registry
}

fn run_forward(manager: &TensorManager) -> Result<()> {
    manager.claim_non_const_plan(TensorId(0))?;
    manager.claim_non_const_plan(TensorId(1))?;
    manager.release_non_const_plan(TensorId(0))?;
    manager.claim_non_const_plan(TensorId(2))?;
    manager.release_non_const_plan(TensorId(1))?;
    manager.release_non_const_plan(TensorId(2))?;
    Ok(())
}

fn addr(manager: &TensorManager, category: TensorCategory, raw: u32) -> usize {
    manager.buffer(category, TensorId(raw)).unwrap().as_ptr() as usize
}

#[test]
fn test_training_step_binds_every_category() -> Result<()> {
    let registry = create_registry();
    let observer = Arc::new(RecordingObserver::default());
    let manager = TensorManager::new(registry.clone(), PlannerOptions::new())?.with_observer(observer.clone());

    // Parameters persist for the whole step
    manager.claim_trainable_plan(TensorId(10))?;
    manager.claim_trainable_plan(TensorId(11))?;
    manager.allocate_trainable_tensors()?;

    run_forward(&manager)?;
    let summary = manager.allocate_non_const_tensors()?;
    assert_eq!(summary.capacity, 300);

    manager.claim_derivative_plan(TensorId(2))?;
    manager.claim_derivative_plan(TensorId(1))?;
    manager.release_derivative_plan(TensorId(2))?;
    manager.release_derivative_plan(TensorId(1))?;
    manager.allocate_derivative_tensors()?;

    manager.claim_gradient_plan(TensorId(11))?;
    manager.claim_gradient_plan(TensorId(10))?;
    manager.allocate_gradient_tensors()?;

    // A and B overlap in time, C reuses A's bytes
    let a = addr(&manager, TensorCategory::NonConst, 0);
    let b = addr(&manager, TensorCategory::NonConst, 1);
    let c = addr(&manager, TensorCategory::NonConst, 2);
    assert_eq!(b, a + 100);
    assert_eq!(c, a);

    // Live-together parameters never share bytes
    let w0 = addr(&manager, TensorCategory::Trainable, 10);
    let w1 = addr(&manager, TensorCategory::Trainable, 11);
    assert!(w0.abs_diff(w1) >= 256);

    // Never claimed: untouched
    let unclaimed = registry.get_non_const_tensor(TensorId(3))?;
    assert!(!unclaimed.is_bound());
    assert!(matches!(
        manager.buffer(TensorCategory::NonConst, TensorId(3)),
        Err(Error::NotPlanned(_))
    ));
    assert!(!registry.get_derivative_tensor(TensorId(3))?.is_bound());

    let events = observer.events.lock().unwrap();
    assert_eq!(events.len(), 2 + 3 + 2 + 2);
    assert!(events.iter().all(|event| event.generation == 1));
    let pools = observer.pools.lock().unwrap();
    assert_eq!(pools.len(), 4);
    assert_eq!(pools[1], (TensorCategory::NonConst, 300, false));
    Ok(())
}

#[test]
fn test_categories_do_not_share_storage() -> Result<()> {
    let registry = create_registry();
    let manager = TensorManager::new(registry, PlannerOptions::new())?.with_observer(Arc::new(NullObserver));

    manager.claim_non_const_plan(TensorId(1))?;
    manager.claim_derivative_plan(TensorId(1))?;
    manager.allocate_non_const_tensors()?;
    manager.allocate_derivative_tensors()?;

    let activation = addr(&manager, TensorCategory::NonConst, 1);
    let derivative = addr(&manager, TensorCategory::Derivative, 1);
    assert!(activation.abs_diff(derivative) >= 200);
    Ok(())
}

#[test]
fn test_misuse_is_fatal() -> Result<()> {
    let manager = TensorManager::new(create_registry(), PlannerOptions::new())?.with_observer(Arc::new(NullObserver));

    let err = manager.claim_non_const_plan(TensorId(9)).unwrap_err();
    assert!(matches!(err, Error::DynamicTensor(TensorCategory::NonConst, _)));
    assert!(err.is_precondition_violation());

    let err = manager.release_non_const_plan(TensorId(0)).unwrap_err();
    assert!(matches!(err, Error::NotLive(_)));

    manager.claim_non_const_plan(TensorId(0))?;
    let err = manager.claim_non_const_plan(TensorId(0)).unwrap_err();
    assert!(matches!(err, Error::DoubleClaim(_)));

    let err = manager.claim_non_const_plan(TensorId(77)).unwrap_err();
    assert!(matches!(err, Error::UnknownTensor(..)));

    manager.allocate_non_const_tensors()?;
    assert!(matches!(manager.allocate_non_const_tensors(), Err(Error::AlreadyAllocated)));
    assert!(matches!(manager.claim_non_const_plan(TensorId(1)), Err(Error::PlanFinalized(_))));
    Ok(())
}

#[test]
fn test_oversized_claims_do_not_corrupt_accounting() -> Result<()> {
    let registry = Arc::new(TensorRegistry::new());
    registry.register(TensorCategory::NonConst, TensorId(0), Tensor::new(usize::MAX))?;
    registry.register(TensorCategory::NonConst, TensorId(1), Tensor::new(1))?;
    let manager = TensorManager::new(registry, PlannerOptions::new())?.with_observer(Arc::new(NullObserver));

    manager.claim_non_const_plan(TensorId(0))?;
    let err = manager.claim_non_const_plan(TensorId(1)).unwrap_err();
    assert!(matches!(err, Error::RegionOverflow { .. }));
    assert!(err.is_resource_exhaustion());

    manager.release_non_const_plan(TensorId(0))?;
    assert!(matches!(manager.release_non_const_plan(TensorId(1)), Err(Error::NotLive(_))));
    assert_eq!(manager.stats(TensorCategory::NonConst)?.live_tensors, 0);
    Ok(())
}

#[test]
fn test_cycles_rebind_and_reuse_backing_memory() -> Result<()> {
    let registry = create_registry();
    let manager = TensorManager::new(registry.clone(), PlannerOptions::new())?.with_observer(Arc::new(NullObserver));

    run_forward(&manager)?;
    manager.allocate_non_const_tensors()?;
    let first = addr(&manager, TensorCategory::NonConst, 1);

    manager.begin_cycle(TensorCategory::NonConst)?;
    assert!(!registry.get_non_const_tensor(TensorId(1))?.is_bound());
    assert!(matches!(
        manager.buffer(TensorCategory::NonConst, TensorId(1)),
        Err(Error::NotAllocated)
    ));

    // Same order next iteration: same addresses, no new acquisition
    run_forward(&manager)?;
    let summary = manager.allocate_non_const_tensors()?;
    assert!(summary.reused);
    assert_eq!(summary.generation, 2);
    assert_eq!(addr(&manager, TensorCategory::NonConst, 1), first);
    assert_eq!(manager.stats(TensorCategory::NonConst)?.acquisitions, 1);

    // A bigger plan needs one new acquisition
    manager.begin_cycle(TensorCategory::NonConst)?;
    for raw in [0, 1, 2, 3] {
        manager.claim_non_const_plan(TensorId(raw))?;
    }
    let summary = manager.allocate_non_const_tensors()?;
    assert!(!summary.reused);
    assert_eq!(summary.capacity, 464);
    assert_eq!(manager.stats(TensorCategory::NonConst)?.acquisitions, 2);
    Ok(())
}

#[test]
fn test_begin_cycle_leaves_other_categories_bound() -> Result<()> {
    let registry = create_registry();
    let manager = TensorManager::new(registry.clone(), PlannerOptions::new())?.with_observer(Arc::new(NullObserver));

    manager.claim_trainable_plan(TensorId(10))?;
    manager.allocate_trainable_tensors()?;
    run_forward(&manager)?;
    manager.allocate_non_const_tensors()?;

    manager.begin_cycle(TensorCategory::NonConst)?;
    assert!(registry.get_trainable_tensor(TensorId(10))?.is_bound());
    assert!(manager.buffer(TensorCategory::Trainable, TensorId(10)).is_ok());

    manager.free_tensors(TensorCategory::Trainable)?;
    assert!(!registry.get_trainable_tensor(TensorId(10))?.is_bound());
    assert_eq!(manager.stats(TensorCategory::Trainable)?.backing_size, 0);
    Ok(())
}

#[test]
fn test_strategy_selected_by_name() -> Result<()> {
    let events = |manager: &TensorManager| -> Result<()> {
        manager.claim_non_const_plan(TensorId(0))?;
        manager.release_non_const_plan(TensorId(0))?;
        manager.claim_non_const_plan(TensorId(2))?;
        Ok(())
    };

    let reuse = TensorManager::with_planner(create_registry(), "first-fit")?.with_observer(Arc::new(NullObserver));
    events(&reuse)?;
    assert_eq!(reuse.allocate_non_const_tensors()?.capacity, 100);

    let no_reuse = TensorManager::with_planner(create_registry(), "Bump")?.with_observer(Arc::new(NullObserver));
    events(&no_reuse)?;
    assert_eq!(no_reuse.allocate_non_const_tensors()?.capacity, 200);
    assert_eq!(no_reuse.plan_report(TensorCategory::NonConst)?.strategy, PlannerKind::Bump);

    assert!(matches!(
        TensorManager::with_planner(create_registry(), "optimal"),
        Err(Error::UnknownPlanner(_))
    ));
    Ok(())
}

#[test]
fn test_memory_limit_fails_allocation() -> Result<()> {
    let options = PlannerOptions::new().set_memory_limit(Some(256));
    let manager = TensorManager::new(create_registry(), options)?.with_observer(Arc::new(NullObserver));

    run_forward(&manager)?;
    let err = manager.allocate_non_const_tensors().unwrap_err();
    assert!(err.is_resource_exhaustion());
    assert!(matches!(err, Error::OutOfMemory { requested: 300, limit: 256 }));
    assert!(!manager.registry().get_non_const_tensor(TensorId(0))?.is_bound());
    Ok(())
}

#[test]
fn test_categories_planned_from_parallel_threads() -> Result<()> {
    let registry = Arc::new(TensorRegistry::new());
    for category in TensorCategory::iter() {
        for raw in 0..64 {
            registry.register(category, TensorId(raw), Tensor::new(32 + raw as usize))?;
        }
    }
    let manager = TensorManager::new(registry.clone(), PlannerOptions::new().set_strategy(PlannerKind::Wic))?
        .with_observer(Arc::new(NullObserver));

    let categories: Vec<TensorCategory> = TensorCategory::iter().collect();
    categories.par_iter().try_for_each(|&category| -> train_memory_planner::Result<()> {
        for raw in 0..64 {
            manager.claim_plan(category, TensorId(raw))?;
            if raw >= 2 {
                manager.release_plan(category, TensorId(raw - 2))?;
            }
        }
        manager.allocate_tensors(category)?;
        Ok(())
    })?;

    let reports: Vec<PlanReport> = TensorCategory::iter()
        .map(|category| manager.plan_report(category))
        .collect::<train_memory_planner::Result<_>>()?;
    for report in &reports {
        assert_eq!(report.entries.len(), 64);
        assert_eq!(report.capacity, reports[0].capacity);
        assert!(report.capacity >= report.lower_bound);
    }
    Ok(())
}

#[test]
fn test_report_export() -> Result<()> {
    let manager = TensorManager::new(create_registry(), PlannerOptions::new())?.with_observer(Arc::new(NullObserver));
    run_forward(&manager)?;
    manager.allocate_non_const_tensors()?;

    let report = manager.plan_report(TensorCategory::NonConst)?;
    assert_eq!(report.unshared_bytes(), 400);
    assert_eq!(report.lower_bound, 300);

    let dir = tempfile::tempdir()?;
    let json_path = dir.path().join("plan.json");
    let csv_path = dir.path().join("plan.csv");
    report.save_json(&json_path)?;
    report.save_csv(&csv_path)?;

    let parsed: PlanReport = serde_json::from_str(&std::fs::read_to_string(&json_path)?)?;
    assert_eq!(parsed, report);

    let csv = std::fs::read_to_string(&csv_path)?;
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.starts_with("category,tensor,offset,size,end"));
    Ok(())
}
