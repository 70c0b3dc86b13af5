pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod states;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    ConnectivityCheck, InitialConditions, LatticeConfig, ModuleConfig, NeighborhoodKind, OutputConfig,
    PopulationConfig, PottsConfig, RandomSeedingConfig, SeedConfig, SeedShape, SimulationConfig, TermKind,
    TimingConfig, UpdateScheme,
};
pub use sim_params::{ModuleParams, NucleusParams, PopulationParams, SimParams, SubstrateParams};
pub use snapshot::{CellRecord, Snapshot};
pub use states::{CellState, Phase, Region};
pub use vecmath::Vec3;
