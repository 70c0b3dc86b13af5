//! Cellular Potts Model engine.
//!
//! Cells are connected voxel clusters on a fixed lattice. Their shapes evolve
//! through Metropolis voxel reassignment driven by a configurable Hamiltonian,
//! while a per-cell behavioral module grows, divides and kills them.

pub mod cell;
pub mod connectivity;
pub mod error;
pub mod frontier;
pub mod hamiltonian;
pub mod lattice;
pub mod location;
pub mod module;
pub mod population;
pub mod potts;
pub mod simulation;

pub use cell::Cell;
pub use error::PottsError;
pub use hamiltonian::{EnergyContext, Flip, Hamiltonian, HamiltonianTerm, RegionFlip};
pub use lattice::{CellId, Lattice, Voxel, BACKGROUND};
pub use location::{convert_surface, Location};
pub use module::{Module, ModuleEvent};
pub use population::Population;
pub use potts::{metropolis_accepts, Potts, SweepStats};
pub use simulation::{CellSeed, Simulation, StepStats};
