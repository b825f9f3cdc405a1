use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::memory::PlannerKind;

/// Options shared by the category memory pools of one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerOptions {
    /// Offset assignment strategy
    pub strategy: PlannerKind,
    /// Every planned offset is a multiple of this
    pub offset_alignment: usize,
    /// Alignment of each pool's backing allocation
    pub buffer_alignment: usize,
    /// Cap on each pool's backing allocation (None = no limit)
    pub memory_limit_bytes: Option<usize>,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            strategy: PlannerKind::FirstFit,
            offset_alignment: 1,
            buffer_alignment: 64,
            memory_limit_bytes: None,
        }
    }
}

impl PlannerOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for the strategy registered under `name`
    pub fn for_planner(name: &str) -> Result<Self> {
        Ok(Self::default().set_strategy(PlannerKind::from_name(name)?))
    }

    /// Set the planning strategy
    pub fn set_strategy(mut self, strategy: PlannerKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the offset alignment
    pub fn set_offset_alignment(mut self, alignment: usize) -> Self {
        self.offset_alignment = alignment;
        self
    }

    /// Set the backing buffer alignment
    pub fn set_buffer_alignment(mut self, alignment: usize) -> Self {
        self.buffer_alignment = alignment;
        self
    }

    /// Set the per-pool memory limit
    pub fn set_memory_limit(mut self, memory_limit_bytes: Option<usize>) -> Self {
        self.memory_limit_bytes = memory_limit_bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.offset_alignment.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "offset_alignment must be a power of two, got {}",
                self.offset_alignment
            )));
        }
        if !self.buffer_alignment.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "buffer_alignment must be a power of two, got {}",
                self.buffer_alignment
            )));
        }
        if self.offset_alignment > self.buffer_alignment {
            return Err(Error::InvalidConfig(format!(
                "offset_alignment {} exceeds buffer_alignment {}",
                self.offset_alignment, self.buffer_alignment
            )));
        }
        Ok(())
    }

    /// Parse and validate options from JSON; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
