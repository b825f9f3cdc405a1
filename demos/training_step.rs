use std::sync::Arc;

use train_memory_planner::{
    error::Result, DataType, PlannerKind, PlannerOptions, Tensor, TensorCategory, TensorId,
    TensorManager, TensorRegistry,
};

// Three dense layers: weights, activations, their derivatives and gradients
fn create_mock_model() -> Result<Arc<TensorRegistry>> {
    let registry = Arc::new(TensorRegistry::new());
    let batch = 32;
    let widths = [784, 256, 128, 10];

    for layer in 0..3 {
        let id = TensorId(layer as u32);
        let (fan_in, fan_out) = (widths[layer], widths[layer + 1]);

        registry.register(
            TensorCategory::Trainable,
            id,
            Tensor::with_shape(&[fan_in, fan_out], DataType::Float32)?,
        )?;
        registry.register(
            TensorCategory::Gradient,
            id,
            Tensor::with_shape(&[fan_in, fan_out], DataType::Float32)?,
        )?;
        registry.register(
            TensorCategory::NonConst,
            id,
            Tensor::with_shape(&[batch, fan_out], DataType::Float32)?,
        )?;
        registry.register(
            TensorCategory::Derivative,
            id,
            Tensor::with_shape(&[batch, fan_out], DataType::Float32)?,
        )?;
    }

    Ok(registry)
}

fn plan_step(manager: &TensorManager) -> Result<()> {
    // Parameters and gradients stay live for the whole step
    for layer in 0..3 {
        manager.claim_trainable_plan(TensorId(layer))?;
        manager.claim_gradient_plan(TensorId(layer))?;
    }

    // Forward: each activation is read by the next layer, then kept for backward
    for layer in 0..3 {
        manager.claim_non_const_plan(TensorId(layer))?;
    }
    for layer in 0..3 {
        manager.release_non_const_plan(TensorId(layer))?;
    }

    // Backward: a derivative dies once the previous layer's one exists
    for layer in (0..3).rev() {
        manager.claim_derivative_plan(TensorId(layer))?;
        if layer < 2 {
            manager.release_derivative_plan(TensorId(layer + 1))?;
        }
    }
    manager.release_derivative_plan(TensorId(0))?;

    manager.allocate_trainable_tensors()?;
    manager.allocate_gradient_tensors()?;
    manager.allocate_non_const_tensors()?;
    manager.allocate_derivative_tensors()?;
    Ok(())
}

fn main() -> Result<()> {
    let registry = create_mock_model()?;

    for kind in [PlannerKind::Bump, PlannerKind::FirstFit, PlannerKind::Wic] {
        let manager = TensorManager::new(registry.clone(), PlannerOptions::new().set_strategy(kind))?;
        plan_step(&manager)?;

        println!("{} planner:", kind);
        for category in [TensorCategory::NonConst, TensorCategory::Derivative] {
            let report = manager.plan_report(category)?;
            println!(
                "  {:<10} {:>8} bytes (lower bound {:>8}, {:.1}% efficient)",
                category,
                report.capacity,
                report.lower_bound,
                report.efficiency() * 100.0
            );
        }

        let weights = manager.buffer(TensorCategory::Trainable, TensorId(0))?;
        println!("  layer 0 weights at {:p}", weights.as_ptr());

        // Next iteration reuses the same backing blocks
        for category in [TensorCategory::NonConst, TensorCategory::Derivative] {
            manager.begin_cycle(category)?;
        }
        manager.free_tensors(TensorCategory::Trainable)?;
        manager.free_tensors(TensorCategory::Gradient)?;
    }

    Ok(())
}
