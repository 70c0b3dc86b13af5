use potts_common::{CellRecord, CellState, NeighborhoodKind, Phase, PopulationParams, SimParams};
use rand::rngs::StdRng;

use crate::error::PottsError;
use crate::lattice::CellId;
use crate::location::{convert_surface, Location};
use crate::module::{Module, ModuleEvent, ModuleInput, Targets};

/// A simulated cell: identity, size targets, one location and one behavioral module.
#[derive(Debug, Clone)]
pub struct Cell {
    pub id: CellId,
    /// Id of the dividing cell this one came from; 0 for seeded cells.
    pub parent: CellId,
    /// Index into the population table.
    pub population: usize,
    pub age: u32,
    pub divisions: u32,
    pub critical_volume: f64,
    pub critical_height: f64,
    pub critical_nucleus_volume: Option<f64>,
    pub targets: Targets,
    pub target_surface: f64,
    pub target_nucleus_surface: Option<f64>,
    pub location: Location,
    pub module: Module,
}

impl Cell {
    pub fn new(
        id: CellId,
        parent: CellId,
        population: usize,
        params: &PopulationParams,
        location: Location,
        target_volume: f64,
        module: Module,
    ) -> Self {
        let critical_nucleus_volume = params.nucleus.as_ref().map(|n| n.critical_volume);
        Cell {
            id,
            parent,
            population,
            age: 0,
            divisions: 0,
            critical_volume: params.critical_volume,
            critical_height: params.critical_height,
            critical_nucleus_volume,
            targets: Targets { volume: target_volume, nucleus_volume: critical_nucleus_volume },
            target_surface: 0.0,
            target_nucleus_surface: None,
            location,
            module,
        }
    }

    pub fn state(&self) -> CellState {
        self.module.state()
    }

    pub fn phase(&self) -> Phase {
        self.module.phase()
    }

    pub fn target_volume(&self) -> f64 {
        self.targets.volume
    }

    /// Recomputes target surfaces from target volumes.
    pub fn update_target_surfaces(&mut self, is_2d: bool, neighborhood: NeighborhoodKind) {
        self.target_surface = convert_surface(self.targets.volume, self.critical_height, is_2d, neighborhood);
        self.target_nucleus_surface = self
            .targets
            .nucleus_volume
            .map(|v| convert_surface(v, self.critical_height, is_2d, neighborhood));
    }

    /// Puts targets back to critical values, as after a division.
    pub fn reset_targets(&mut self, is_2d: bool, neighborhood: NeighborhoodKind) {
        self.targets.volume = self.critical_volume;
        self.targets.nucleus_volume = self.critical_nucleus_volume;
        self.update_target_surfaces(is_2d, neighborhood);
    }

    /// Ages the cell by one step and advances its module.
    pub fn step(
        &mut self,
        params: &SimParams,
        substrate: f64,
        rng: &mut StdRng,
    ) -> Result<ModuleEvent, PottsError> {
        self.age += 1;
        let input = ModuleInput {
            volume: self.location.volume() as f64,
            critical_volume: self.critical_volume,
            critical_nucleus_volume: self.critical_nucleus_volume,
            age: self.age,
            substrate,
        };
        let module_params = &params.population(self.population).module;
        let event = self
            .module
            .step(&mut self.targets, &input, module_params, rng)
            .map_err(|e| PottsError::SamplingExhaustion { cell: self.id, reason: e.to_string() })?;
        self.update_target_surfaces(params.is_2d, params.neighborhood);
        Ok(event)
    }

    /// Snapshot view of this cell.
    pub fn record(&self, params: &SimParams) -> CellRecord {
        CellRecord {
            id: self.id,
            parent: self.parent,
            population: params.population(self.population).name.clone(),
            state: self.state(),
            phase: self.phase(),
            volume: self.location.volume(),
            surface: self.location.surface(),
            height: self.location.height(),
            centroid: self.location.centroid().to_array(),
            target_volume: self.targets.volume,
            target_surface: self.target_surface,
            age: self.age,
            divisions: self.divisions,
            nucleus_volume: self.location.nucleus().map(|n| n.volume()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{neighborhood_offsets, Voxel};
    use potts_common::SimulationConfig;
    use rand::SeedableRng;

    const CONFIG: &str = r#"
        [lattice]
        length = 10
        width = 10

        [potts]
        temperature = 1.0
        seed = 1

        [timing]
        total_steps = 1

        [[populations]]
        name = "a"
        critical_volume = 8.0
        [populations.nucleus]
        critical_volume = 2.0
    "#;

    fn cell(rng: &mut StdRng) -> (Cell, SimParams) {
        let params = SimulationConfig::from_toml_str(CONFIG).unwrap().get_sim_params();
        let offsets = neighborhood_offsets(params.neighborhood, true);
        let voxels = (0..4).map(|x| Voxel::new(x, 0, 0));
        let location = Location::from_voxels(voxels, &offsets).unwrap();
        let module = Module::new(CellState::Proliferative, &params.population(0).module, rng).unwrap();
        let mut cell = Cell::new(1, 0, 0, params.population(0), location, 8.0, module);
        cell.update_target_surfaces(true, params.neighborhood);
        (cell, params)
    }

    #[test]
    fn reset_restores_critical_targets_and_surfaces() {
        let mut rng = StdRng::seed_from_u64(1);
        let (mut cell, params) = cell(&mut rng);
        assert!(cell.target_surface > 0.0);
        cell.targets = Targets { volume: 16.0, nucleus_volume: Some(4.0) };
        cell.update_target_surfaces(true, params.neighborhood);
        let grown_surface = cell.target_surface;
        cell.reset_targets(true, params.neighborhood);
        assert_eq!(cell.target_volume(), 8.0);
        assert_eq!(cell.targets.nucleus_volume, Some(2.0));
        assert!(cell.target_surface < grown_surface);
    }

    #[test]
    fn zero_targets_give_zero_surfaces() {
        let mut rng = StdRng::seed_from_u64(2);
        let (mut cell, params) = cell(&mut rng);
        cell.targets = Targets { volume: 0.0, nucleus_volume: Some(0.0) };
        cell.update_target_surfaces(true, params.neighborhood);
        assert_eq!(cell.target_surface, 0.0);
        assert_eq!(cell.target_nucleus_surface, Some(0.0));
    }

    #[test]
    fn step_ages_and_records() {
        let mut rng = StdRng::seed_from_u64(3);
        let (mut cell, params) = cell(&mut rng);
        cell.step(&params, 1.0, &mut rng).unwrap();
        let record = cell.record(&params);
        assert_eq!(record.age, 1);
        assert_eq!(record.volume, 4);
        assert_eq!(record.population, "a");
        assert_eq!(record.centroid, [1.5, 0.0, 0.0]);
    }
}
