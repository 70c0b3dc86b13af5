use serde::{Deserialize, Serialize};

use crate::states::{CellState, Phase};

/// A snapshot of the lattice and every living cell at a given step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Simulation step at which the snapshot was taken.
    pub step: u32,
    /// Lattice dimensions as `[length, width, height]`.
    pub dimensions: [usize; 3],
    /// Number of living cells.
    pub cell_count: u32,
    /// Total number of non-background voxels.
    pub occupied_volume: u64,
    /// Flips accepted since the start of the run.
    pub accepted_flips: u64,
    pub cells: Vec<CellRecord>,
    /// Owner id of every voxel, x fastest then y then z. Background is 0.
    #[serde(skip_serializing_if = "Option::is_none")] // Don't write "lattice": null
    pub lattice: Option<Vec<u32>>,
}

/// Per-cell view written into snapshots and the final CSV table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CellRecord {
    pub id: u32,
    pub parent: u32,
    pub population: String,
    pub state: CellState,
    pub phase: Phase,
    pub volume: u32,
    pub surface: u32,
    pub height: u32,
    pub centroid: [f64; 3],
    pub target_volume: f64,
    pub target_surface: f64,
    pub age: u32,
    pub divisions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nucleus_volume: Option<u32>,
}
