use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{Error, Result};
use crate::tensor::{Tensor, TensorId};

/// Independent memory domain of a training backend
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum TensorCategory {
    /// Activations and other non-constant forward tensors
    #[strum(to_string = "non-const", serialize = "nonconst", serialize = "activation")]
    NonConst,
    /// Trainable parameters, persistent across iterations
    #[strum(to_string = "trainable", serialize = "parameter")]
    Trainable,
    /// Backward-pass derivatives
    #[strum(to_string = "derivative")]
    Derivative,
    /// Parameter gradients
    #[strum(to_string = "gradient")]
    Gradient,
}

impl TensorCategory {
    pub const COUNT: usize = 4;

    pub(crate) fn index(&self) -> usize {
        match self {
            TensorCategory::NonConst => 0,
            TensorCategory::Trainable => 1,
            TensorCategory::Derivative => 2,
            TensorCategory::Gradient => 3,
        }
    }

    /// Label used when logging buffer assignments
    pub fn label(&self) -> &'static str {
        match self {
            TensorCategory::NonConst => "TENSOR",
            TensorCategory::Trainable => "TRAINABLE TENSOR",
            TensorCategory::Derivative => "DERIVATIVE TENSOR",
            TensorCategory::Gradient => "GRADIENT TENSOR",
        }
    }
}

type TensorMap = BTreeMap<TensorId, Arc<Tensor>>;

/// Owns tensor objects, partitioned by category
#[derive(Debug, Default)]
pub struct TensorRegistry {
    tensors: [RwLock<TensorMap>; TensorCategory::COUNT],
}

impl TensorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, category: TensorCategory) -> Result<RwLockReadGuard<'_, TensorMap>> {
        self.tensors[category.index()]
            .read()
            .map_err(|_| Error::LockPoisoned(format!("{} tensor registry", category)))
    }

    fn write(&self, category: TensorCategory) -> Result<RwLockWriteGuard<'_, TensorMap>> {
        self.tensors[category.index()]
            .write()
            .map_err(|_| Error::LockPoisoned(format!("{} tensor registry", category)))
    }

    /// Register a tensor under `id` in `category`
    pub fn register(&self, category: TensorCategory, id: TensorId, tensor: Tensor) -> Result<Arc<Tensor>> {
        let mut map = self.write(category)?;
        if map.contains_key(&id) {
            return Err(Error::DuplicateTensor(category, id));
        }

        let tensor = Arc::new(tensor);
        map.insert(id, tensor.clone());
        Ok(tensor)
    }

    /// Look up a tensor. A miss means the scheduler and the registry disagree.
    pub fn get(&self, category: TensorCategory, id: TensorId) -> Result<Arc<Tensor>> {
        self.read(category)?
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownTensor(category, id))
    }

    pub fn contains(&self, category: TensorCategory, id: TensorId) -> Result<bool> {
        Ok(self.read(category)?.contains_key(&id))
    }

    /// Identifiers of one category in ascending order
    pub fn ids(&self, category: TensorCategory) -> Result<Vec<TensorId>> {
        Ok(self.read(category)?.keys().copied().collect())
    }

    /// Snapshot of one category in ascending identifier order
    pub fn tensors(&self, category: TensorCategory) -> Result<Vec<(TensorId, Arc<Tensor>)>> {
        Ok(self
            .read(category)?
            .iter()
            .map(|(id, tensor)| (*id, tensor.clone()))
            .collect())
    }

    pub fn len(&self, category: TensorCategory) -> Result<usize> {
        Ok(self.read(category)?.len())
    }

    pub fn is_empty(&self, category: TensorCategory) -> Result<bool> {
        Ok(self.read(category)?.is_empty())
    }

    pub fn get_non_const_tensor(&self, id: TensorId) -> Result<Arc<Tensor>> {
        self.get(TensorCategory::NonConst, id)
    }

    pub fn get_trainable_tensor(&self, id: TensorId) -> Result<Arc<Tensor>> {
        self.get(TensorCategory::Trainable, id)
    }

    pub fn get_derivative_tensor(&self, id: TensorId) -> Result<Arc<Tensor>> {
        self.get(TensorCategory::Derivative, id)
    }

    pub fn get_gradient_tensor(&self, id: TensorId) -> Result<Arc<Tensor>> {
        self.get(TensorCategory::Gradient, id)
    }
}
