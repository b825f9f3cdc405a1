use thiserror::Error;

use crate::registry::TensorCategory;
use crate::tensor::TensorId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Tensor {1} is not registered as a {0} tensor")]
    UnknownTensor(TensorCategory, TensorId),

    #[error("Tensor {1} is already registered as a {0} tensor")]
    DuplicateTensor(TensorCategory, TensorId),

    #[error("Dynamic {0} tensor {1} cannot take part in static planning")]
    DynamicTensor(TensorCategory, TensorId),

    #[error("Tensor {0} is already claimed in the current planning cycle")]
    DoubleClaim(TensorId),

    #[error("Tensor {0} is released without a live claim")]
    NotLive(TensorId),

    #[error("Tensor {0} was not claimed in the current planning cycle")]
    NotPlanned(TensorId),

    #[error("Plan has not been allocated yet")]
    NotAllocated,

    #[error("Plan for the current cycle is already allocated")]
    AlreadyAllocated,

    #[error("Plan is finalized; begin a new cycle before claiming or releasing tensor {0}")]
    PlanFinalized(TensorId),

    #[error("Buffer of {0} tensor {1} belongs to an earlier planning cycle")]
    StaleBinding(TensorCategory, TensorId),

    #[error("Memory limit of {limit} bytes exceeded by allocation of {requested} bytes")]
    OutOfMemory { requested: usize, limit: usize },

    #[error("Failed to allocate memory: size={size}, alignment={alignment}")]
    AllocationFailed { size: usize, alignment: usize },

    #[error("Invalid memory layout: {0}")]
    InvalidLayout(String),

    #[error("Live bytes overflow the address space when claiming tensor {tensor} ({size} bytes)")]
    RegionOverflow { tensor: TensorId, size: usize },

    #[error("Invalid tensor shape: {0}")]
    InvalidShape(String),

    #[error("Unknown memory planner: {0}")]
    UnknownPlanner(String),

    #[error("Invalid planner configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to lock {0}")]
    LockPoisoned(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// True for scheduler or graph-construction bugs, as opposed to
    /// resource exhaustion or configuration problems.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            Error::UnknownTensor(..)
                | Error::DuplicateTensor(..)
                | Error::DynamicTensor(..)
                | Error::DoubleClaim(_)
                | Error::NotLive(_)
                | Error::NotPlanned(_)
                | Error::NotAllocated
                | Error::AlreadyAllocated
                | Error::PlanFinalized(_)
                | Error::StaleBinding(..)
                | Error::InvalidShape(_)
        )
    }

    /// True when the backing allocation could not be made.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            Error::OutOfMemory { .. }
                | Error::AllocationFailed { .. }
                | Error::InvalidLayout(_)
                | Error::RegionOverflow { .. }
        )
    }
}
