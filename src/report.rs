use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::PlannerKind;
use crate::registry::TensorCategory;
use crate::tensor::TensorId;

/// Placement of one tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub tensor: TensorId,
    pub offset: usize,
    pub size: usize,
}

/// Allocated plan of one category, for inspection and export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub category: TensorCategory,
    pub strategy: PlannerKind,
    /// Region size the plan needs
    pub capacity: usize,
    /// Largest number of bytes live at once
    pub lower_bound: usize,
    pub generation: u64,
    pub entries: Vec<PlanEntry>,
}

#[derive(Serialize)]
struct CsvRow {
    category: TensorCategory,
    tensor: u32,
    offset: usize,
    size: usize,
    end: usize,
}

impl PlanReport {
    /// Fraction of the region that is strictly needed (1.0 = optimal)
    pub fn efficiency(&self) -> f64 {
        if self.capacity == 0 {
            1.0
        } else {
            self.lower_bound as f64 / self.capacity as f64
        }
    }

    /// Sum of tensor sizes if nothing were shared
    pub fn unshared_bytes(&self) -> usize {
        self.entries.iter().map(|entry| entry.size).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One row per tensor, ordered by offset
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|entry| (entry.offset, entry.tensor));

        let mut csv = csv::Writer::from_writer(writer);
        for entry in entries {
            csv.serialize(CsvRow {
                category: self.category,
                tensor: entry.tensor.value(),
                offset: entry.offset,
                size: entry.size,
                end: entry.offset + entry.size,
            })?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(self.to_json()?.as_bytes())?;
        Ok(())
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write_csv(File::create(path)?)
    }
}
