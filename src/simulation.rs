use std::collections::BTreeSet;

use log::{debug, info, trace, warn};
use potts_common::{
    CellState, RandomSeedingConfig, Region, SeedShape, SimParams, SimulationConfig, Snapshot,
};
use rand::prelude::*;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::cell::Cell;
use crate::connectivity::is_connected;
use crate::error::PottsError;
use crate::lattice::{CellId, Lattice, Voxel, BACKGROUND};
use crate::location::{split_voxels, Location};
use crate::module::{apply_state_targets, Module, ModuleEvent};
use crate::population::Population;
use crate::potts::{verify_consistency, Potts, SweepStats};

/// One initial cell: population name, voxels and optional overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSeed {
    pub population: String,
    pub voxels: Vec<Voxel>,
    /// Defaults to the population's critical volume.
    pub target_volume: Option<f64>,
    /// Defaults to the population's initial state.
    pub state: Option<CellState>,
}

/// What happened during one simulation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepStats {
    pub sweep: SweepStats,
    pub divisions: u32,
    pub removals: u32,
    pub frozen: u32,
}

/// A running Cellular Potts simulation.
///
/// [`Simulation::advance`] is the only mutation point; everything else reads.
pub struct Simulation {
    config: SimulationConfig,
    params: SimParams,
    lattice: Lattice,
    cells: Population,
    potts: Potts,
    /// Single RNG stream for sequential sweeps, module timers and divisions.
    rng: StdRng,
    current_step: u32,
    accepted_flips: u64,
}

impl Simulation {
    /// Builds a simulation from a configuration, seeding cells from its initial conditions.
    pub fn new(config: SimulationConfig) -> Result<Self, PottsError> {
        config.validate().map_err(|e| PottsError::configuration(e.to_string()))?;
        let mut rng = StdRng::seed_from_u64(config.potts.seed);
        let seeds = initial_seeds(&config, &mut rng)?;
        Self::build(config, seeds, rng)
    }

    /// Builds a simulation from explicit seeds, ignoring the configured initial conditions.
    pub fn with_seeds(config: SimulationConfig, seeds: Vec<CellSeed>) -> Result<Self, PottsError> {
        config.validate().map_err(|e| PottsError::configuration(e.to_string()))?;
        let rng = StdRng::seed_from_u64(config.potts.seed);
        Self::build(config, seeds, rng)
    }

    fn build(config: SimulationConfig, seeds: Vec<CellSeed>, mut rng: StdRng) -> Result<Self, PottsError> {
        let params = config.get_sim_params();
        let mut lattice = Lattice::new(params.length, params.width, params.height, params.neighborhood);
        let mut cells = Population::new();
        let offsets = lattice.offsets().to_vec();

        for (i, seed) in seeds.into_iter().enumerate() {
            let population = params
                .population_index(&seed.population)
                .ok_or_else(|| PottsError::configuration(format!("seed {} uses unknown population '{}'", i, seed.population)))?;
            let voxels: BTreeSet<Voxel> = seed.voxels.iter().copied().collect();
            if voxels.is_empty() {
                return Err(PottsError::configuration(format!("seed {} has no voxels", i)));
            }
            for voxel in &voxels {
                if !lattice.contains(*voxel) {
                    return Err(PottsError::configuration(format!("seed {} voxel {:?} lies outside the lattice", i, voxel)));
                }
                let occupant = lattice.occupant_at(*voxel);
                if occupant != BACKGROUND {
                    return Err(PottsError::configuration(format!(
                        "seed {} overlaps cell {} at {:?}",
                        i, occupant, voxel
                    )));
                }
            }
            if !is_connected(&voxels, &offsets) {
                return Err(PottsError::configuration(format!("seed {} is not connected", i)));
            }

            let id = cells.allocate_id();
            for voxel in &voxels {
                lattice.set_occupant(*voxel, id, Some(Region::Default));
            }
            let location = Location::from_voxels(voxels.iter().copied(), &offsets)?;
            let population_params = params.population(population);
            let state = seed.state.unwrap_or(population_params.initial_state);
            let module = start_module(id, state, &params, population, &mut rng);
            let target_volume = seed.target_volume.unwrap_or(population_params.critical_volume);

            let mut cell = Cell::new(id, BACKGROUND, population, population_params, location, target_volume, module);
            if state.is_terminal() {
                apply_state_targets(state, &mut cell.targets, cell.critical_volume);
            }
            assign_nucleus(&mut cell, &mut lattice)?;
            cell.update_target_surfaces(params.is_2d, params.neighborhood);
            cells.insert(cell);
        }

        let potts = Potts::new(&params, &lattice, &cells);
        info!(
            "Seeded {} cells over {} voxels on a {:?} lattice",
            cells.len(),
            lattice.occupied_volume(),
            lattice.dimensions()
        );

        let sim = Simulation { config, params, lattice, cells, potts, rng, current_step: 0, accepted_flips: 0 };
        if sim.params.check_invariants {
            sim.verify_invariants()?;
        }
        Ok(sim)
    }

    /// Runs `steps` simulation steps and returns what happened in each.
    pub fn advance(&mut self, steps: u32) -> Result<Vec<StepStats>, PottsError> {
        let mut history = Vec::with_capacity(steps as usize);
        for _ in 0..steps {
            history.push(self.step()?);
        }
        Ok(history)
    }

    /// One step: a Monte Carlo sweep, then every cell's module.
    fn step(&mut self) -> Result<StepStats, PottsError> {
        let started = std::time::Instant::now();
        let mut stats = StepStats::default();

        // --- 1. Monte Carlo sweep ---
        stats.sweep = self.potts.step(&mut self.lattice, &mut self.cells, &self.params, &mut self.rng, self.current_step)?;
        self.accepted_flips += stats.sweep.accepted;

        // --- 2. Cells that lost their last voxel ---
        for id in self.cells.ids() {
            if self.cells.get(id).is_some_and(|c| c.location.is_empty()) {
                self.remove_cell(id)?;
                stats.removals += 1;
            }
        }

        // --- 3. Modules, in id order ---
        let mut events = Vec::new();
        for id in self.cells.ids() {
            let Some(substrate) = self.cells.get(id).map(|c| substrate_under(&self.params, c)) else {
                continue;
            };
            let Some(cell) = self.cells.get_mut(id) else {
                continue;
            };
            match cell.step(&self.params, substrate, &mut self.rng) {
                Ok(ModuleEvent::None) => {}
                Ok(event) => events.push((id, event)),
                Err(PottsError::SamplingExhaustion { cell: failed, reason }) => {
                    warn!("Freezing cell {} in state {}: {}", failed, cell.state().name(), reason);
                    cell.module.freeze();
                    stats.frozen += 1;
                }
                Err(e) => return Err(e),
            }
        }

        // --- 4. Divisions and removals ---
        for (id, event) in events {
            match event {
                ModuleEvent::Divide => {
                    if self.divide(id)? {
                        stats.divisions += 1;
                    }
                }
                ModuleEvent::Remove => {
                    self.remove_cell(id)?;
                    stats.removals += 1;
                }
                ModuleEvent::None => {}
            }
        }

        if self.params.check_invariants {
            self.verify_invariants()?;
        }

        debug!(
            "Step {}: attempts={}, accepted={}, blocked={}, divisions={}, removals={}, cells={}",
            self.current_step,
            stats.sweep.attempts,
            stats.sweep.accepted,
            stats.sweep.rejected_connectivity,
            stats.divisions,
            stats.removals,
            self.cells.len()
        );
        trace!("Step {} took {:?}", self.current_step, started.elapsed());
        self.current_step += 1;
        Ok(stats)
    }

    /// Splits a cell in two. Returns `false` when the cell was too small and only restarted its cycle.
    fn divide(&mut self, id: CellId) -> Result<bool, PottsError> {
        let offsets = self.lattice.offsets().to_vec();
        let is_2d = self.params.is_2d;
        let neighborhood = self.params.neighborhood;
        let Some(parent) = self.cells.get(id) else {
            return Ok(false);
        };
        let population = parent.population;
        let touched: Vec<Voxel> = parent.location.voxels().iter().copied().collect();

        let Some((kept, split_off)) = split_voxels(&parent.location, &offsets, is_2d, &mut self.rng) else {
            warn!("Cell {} is too small to divide ({} voxels); restarting its cycle", id, parent.location.volume());
            let module = start_module(id, CellState::Proliferative, &self.params, population, &mut self.rng);
            if let Some(parent) = self.cells.get_mut(id) {
                parent.module = module;
                parent.reset_targets(is_2d, neighborhood);
            }
            return Ok(false);
        };

        let daughter_id = self.cells.allocate_id();
        let parent_module = start_module(id, CellState::Proliferative, &self.params, population, &mut self.rng);
        let daughter_module = start_module(daughter_id, CellState::Proliferative, &self.params, population, &mut self.rng);

        // --- Hand the split-off half to the daughter ---
        let parent = self
            .cells
            .get_mut(id)
            .ok_or_else(|| PottsError::invariant(format!("dividing cell {} vanished", id)))?;
        for voxel in &split_off {
            parent.location.remove(*voxel, &offsets)?;
            self.lattice.set_occupant(*voxel, daughter_id, Some(Region::Default));
        }
        parent.module = parent_module;
        parent.divisions += 1;
        parent.reset_targets(is_2d, neighborhood);
        assign_nucleus(parent, &mut self.lattice)?;
        let divisions = parent.divisions;

        let location = Location::from_voxels(split_off.iter().copied(), &offsets)?;
        let mut daughter = Cell::new(
            daughter_id,
            id,
            population,
            self.params.population(population),
            location,
            self.params.population(population).critical_volume,
            daughter_module,
        );
        daughter.divisions = divisions;
        daughter.reset_targets(is_2d, neighborhood);
        assign_nucleus(&mut daughter, &mut self.lattice)?;
        self.potts.register(&daughter);
        self.cells.insert(daughter);

        self.potts.refresh(&self.lattice, touched);
        debug!("Cell {} divided: kept {} voxels, daughter {} got {}", id, kept.len(), daughter_id, split_off.len());
        Ok(true)
    }

    /// Returns a cell's voxels to background and forgets the cell.
    fn remove_cell(&mut self, id: CellId) -> Result<(), PottsError> {
        let Some(cell) = self.cells.remove(id) else {
            return Ok(());
        };
        let voxels: Vec<Voxel> = cell.location.voxels().iter().copied().collect();
        for voxel in &voxels {
            if self.lattice.occupant_at(*voxel) != id {
                return Err(PottsError::invariant(format!("removed cell {} did not own {:?}", id, voxel)));
            }
            self.lattice.set_occupant(*voxel, BACKGROUND, None);
        }
        self.potts.deregister(id);
        self.potts.refresh(&self.lattice, voxels.iter().copied());
        debug!("Removed cell {} in state {} ({} voxels freed)", id, cell.state().name(), voxels.len());
        Ok(())
    }

    /// Re-checks lattice ownership, location geometry and connectivity from scratch.
    pub fn verify_invariants(&self) -> Result<(), PottsError> {
        verify_consistency(&self.lattice, &self.cells)
    }

    /// Copies the current state into a serializable snapshot.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            step: self.current_step,
            dimensions: self.lattice.dimensions(),
            cell_count: self.cells.len() as u32,
            occupied_volume: self.lattice.occupied_volume(),
            accepted_flips: self.accepted_flips,
            cells: self.cells.iter().map(|c| c.record(&self.params)).collect(),
            lattice: Some(self.lattice.ids().to_vec()),
        }
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn accepted_flips(&self) -> u64 {
        self.accepted_flips
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn cells(&self) -> &Population {
        &self.cells
    }
}

/// Starts a module, freezing it with a warning when its first timer cannot be drawn.
fn start_module(id: CellId, state: CellState, params: &SimParams, population: usize, rng: &mut StdRng) -> Module {
    match Module::new(state, &params.population(population).module, rng) {
        Ok(module) => module,
        Err(e) => {
            warn!("Freezing cell {} in state {}: {}", id, state.name(), e);
            Module::frozen(state)
        }
    }
}

/// Regrows a cell's nucleus around its center and mirrors the regions on the lattice.
fn assign_nucleus(cell: &mut Cell, lattice: &mut Lattice) -> Result<(), PottsError> {
    let offsets = lattice.offsets().to_vec();
    for voxel in cell.location.clear_nucleus() {
        lattice.set_region(voxel, Region::Default);
    }
    if let Some(target) = cell.critical_nucleus_volume {
        let size = target.round().max(0.0) as u32;
        for voxel in cell.location.grow_nucleus(size, &offsets)? {
            lattice.set_region(voxel, Region::Nucleus);
        }
    }
    Ok(())
}

/// Substrate available under a cell's lowest layer, at its centroid column.
fn substrate_under(params: &SimParams, cell: &Cell) -> f64 {
    let x = cell.location.centroid().x.round() as i64;
    let z = cell.location.shape().lowest_layer().unwrap_or(0) as i64;
    params.substrate.concentration_at(x) * params.substrate.height_factor(z)
}

/// Turns the configured initial conditions into seeds.
fn initial_seeds(config: &SimulationConfig, rng: &mut StdRng) -> Result<Vec<CellSeed>, PottsError> {
    let dims = [config.lattice.length as i64, config.lattice.width as i64, config.lattice.height as i64];
    let mut seeds: Vec<CellSeed> = config
        .initial_conditions
        .cells
        .iter()
        .map(|seed| CellSeed {
            population: seed.population.clone(),
            voxels: shape_voxels(&seed.shape, dims),
            target_volume: seed.target_volume,
            state: seed.state,
        })
        .collect();
    if let Some(random) = &config.initial_conditions.random {
        seeds.extend(place_random_seeds(random, dims, &seeds, rng));
    }
    Ok(seeds)
}

fn shape_voxels(shape: &SeedShape, dims: [i64; 3]) -> Vec<Voxel> {
    match shape {
        SeedShape::Box { min, max } => {
            let mut voxels = Vec::new();
            for z in min[2]..=max[2] {
                for y in min[1]..=max[1] {
                    for x in min[0]..=max[0] {
                        voxels.push(Voxel::new(x as i32, y as i32, z as i32));
                    }
                }
            }
            voxels
        }
        SeedShape::Sphere { center, radius } => {
            let center = [center[0] as i64, center[1] as i64, center[2] as i64];
            ball_voxels(center, *radius, dims)
        }
        SeedShape::Voxels { voxels } => voxels.iter().map(|v| Voxel::new(v[0] as i32, v[1] as i32, v[2] as i32)).collect(),
    }
}

/// Lattice voxels within `radius` of `center`, clipped to the lattice. Flat in 2D.
fn ball_voxels(center: [i64; 3], radius: f64, dims: [i64; 3]) -> Vec<Voxel> {
    let reach = radius.max(0.0).floor() as i64;
    let r2 = radius * radius;
    let z_reach = if dims[2] == 1 { 0 } else { reach };
    let mut voxels = Vec::new();
    for z in (center[2] - z_reach).max(0)..=(center[2] + z_reach).min(dims[2] - 1) {
        for y in (center[1] - reach).max(0)..=(center[1] + reach).min(dims[1] - 1) {
            for x in (center[0] - reach).max(0)..=(center[0] + reach).min(dims[0] - 1) {
                let d = [x - center[0], y - center[1], z - center[2]];
                if ((d[0] * d[0] + d[1] * d[1] + d[2] * d[2]) as f64) <= r2 {
                    voxels.push(Voxel::new(x as i32, y as i32, z as i32));
                }
            }
        }
    }
    voxels
}

/// Scatters round seeds by jittered grid sampling, skipping bins that touch explicit seeds.
fn place_random_seeds(
    random: &RandomSeedingConfig,
    dims: [i64; 3],
    explicit: &[CellSeed],
    rng: &mut StdRng,
) -> Vec<CellSeed> {
    let reach = random.radius.ceil() as i64;
    // One voxel of slack for jitter plus one of spacing between neighbors.
    let bin = 2 * reach + 2;
    let cols = dims[0] / bin;
    let rows = dims[1] / bin;
    let taken: BTreeSet<Voxel> = explicit.iter().flat_map(|s| s.voxels.iter().copied()).collect();

    let mut bins: Vec<(i64, i64)> = (0..cols).flat_map(|ix| (0..rows).map(move |iy| (ix, iy))).collect();
    bins.shuffle(rng);

    let z = (dims[2] - 1) / 2;
    let mut seeds = Vec::with_capacity(random.count as usize);
    for (ix, iy) in bins {
        if seeds.len() == random.count as usize {
            break;
        }
        let cx = ix * bin + reach + rng.random_range(0..=1);
        let cy = iy * bin + reach + rng.random_range(0..=1);
        let voxels = ball_voxels([cx, cy, z], random.radius, dims);
        if voxels.is_empty() || voxels.iter().any(|v| taken.contains(v)) {
            continue;
        }
        seeds.push(CellSeed {
            population: random.population.clone(),
            voxels,
            target_volume: random.target_volume,
            state: None,
        });
    }
    if seeds.len() < random.count as usize {
        warn!(
            "Only {} of {} random seeds fit on the lattice (radius {})",
            seeds.len(),
            random.count,
            random.radius
        );
    }
    seeds
}
