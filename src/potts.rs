//! Monte Carlo voxel reassignment.
//!
//! One step performs `round(mcs × occupied volume)` attempts. Each attempt
//! picks an interface voxel, proposes a new owner (or region) from its
//! neighbors, rejects proposals that would break a cell apart, and accepts
//! the rest with the Metropolis rule.

use std::collections::BTreeSet;

use potts_common::{ConnectivityCheck, Region, SimParams, UpdateScheme};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

use crate::cell::Cell;
use crate::connectivity::{removal_keeps_global_connectivity, removal_keeps_local_connectivity};
use crate::error::PottsError;
use crate::frontier::Frontier;
use crate::hamiltonian::{EnergyContext, Flip, Hamiltonian, RegionFlip};
use crate::lattice::{CellId, Lattice, Voxel, BACKGROUND};
use crate::population::Population;

/// Counters of one Monte Carlo step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub attempts: u64,
    pub accepted: u64,
    pub rejected_connectivity: u64,
    pub rejected_energy: u64,
    /// Attempts whose voxel had no distinct owner or region to propose.
    pub noop: u64,
}

/// A proposed change at one voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Move {
    Id(Flip),
    Region(RegionFlip),
}

impl Move {
    fn voxel(&self) -> Voxel {
        match self {
            Move::Id(flip) => flip.voxel,
            Move::Region(flip) => flip.voxel,
        }
    }
}

/// Result of evaluating one attempt against frozen state.
enum Outcome {
    Noop,
    Blocked,
    Rejected,
    Accepted(Move),
}

/// Metropolis acceptance for an energy change at temperature `temperature`, given a uniform draw `r` in [0, 1).
///
/// Non-positive changes are always accepted. At zero temperature every
/// positive change is rejected.
pub fn metropolis_accepts(delta: f64, temperature: f64, r: f64) -> bool {
    if delta <= 0.0 {
        return true;
    }
    if temperature <= 0.0 {
        return false;
    }
    r < (-delta / temperature).exp()
}

/// Number of attempts in one step.
pub fn attempts_per_step(mcs: f64, occupied_volume: u64) -> u64 {
    (mcs * occupied_volume as f64).round().max(0.0) as u64
}

/// The Potts engine: Hamiltonian terms plus the set of voxels worth sampling.
#[derive(Debug)]
pub struct Potts {
    hamiltonian: Hamiltonian,
    frontier: Frontier,
}

impl Potts {
    /// Builds the configured terms and registers every existing cell.
    pub fn new(params: &SimParams, lattice: &Lattice, cells: &Population) -> Self {
        let mut hamiltonian = Hamiltonian::from_params(params);
        for cell in cells.iter() {
            hamiltonian.register(cell);
        }
        Potts { hamiltonian, frontier: Frontier::from_lattice(lattice) }
    }

    pub fn hamiltonian(&self) -> &Hamiltonian {
        &self.hamiltonian
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn register(&mut self, cell: &Cell) {
        self.hamiltonian.register(cell);
    }

    pub fn deregister(&mut self, id: CellId) {
        self.hamiltonian.deregister(id);
    }

    /// Re-evaluates frontier membership around voxels changed outside a sweep.
    pub fn refresh<I: IntoIterator<Item = Voxel>>(&mut self, lattice: &Lattice, voxels: I) {
        for voxel in voxels {
            self.frontier.refresh_around(lattice, voxel);
        }
    }

    /// Runs one Monte Carlo step under the configured update scheme.
    pub fn step(
        &mut self,
        lattice: &mut Lattice,
        cells: &mut Population,
        params: &SimParams,
        rng: &mut StdRng,
        step: u32,
    ) -> Result<SweepStats, PottsError> {
        let attempts = attempts_per_step(params.mcs, lattice.occupied_volume());
        let stats = match params.update_scheme {
            UpdateScheme::Sequential => self.sequential(lattice, cells, params, rng, attempts)?,
            UpdateScheme::Checkerboard => self.checkerboard(lattice, cells, params, step, attempts)?,
        };
        if params.check_invariants {
            verify_consistency(lattice, cells)?;
        }
        Ok(stats)
    }

    fn sequential(
        &mut self,
        lattice: &mut Lattice,
        cells: &mut Population,
        params: &SimParams,
        rng: &mut StdRng,
        attempts: u64,
    ) -> Result<SweepStats, PottsError> {
        let mut stats = SweepStats::default();
        let uses_regions = params.uses_regions();
        for _ in 0..attempts {
            stats.attempts += 1;
            if self.frontier.is_empty() {
                stats.noop += 1;
                continue;
            }
            let slot = rng.random_range(0..self.frontier.len());
            let voxel = lattice.voxel_at(self.frontier.get(slot));
            let outcome = attempt(&self.hamiltonian, voxel, lattice, cells, params, uses_regions, rng);
            if let Outcome::Accepted(mv) = &outcome {
                self.commit(mv, lattice, cells, params)?;
            }
            stats.tally(&outcome);
        }
        Ok(stats)
    }

    /// Color epochs of mutually non-interacting voxels, evaluated in parallel and committed in attempt order.
    fn checkerboard(
        &mut self,
        lattice: &mut Lattice,
        cells: &mut Population,
        params: &SimParams,
        step: u32,
        attempts: u64,
    ) -> Result<SweepStats, PottsError> {
        let mut stats = SweepStats::default();
        let is_2d = lattice.is_2d();
        let colors: u64 = if is_2d { 9 } else { 27 };
        let uses_regions = params.uses_regions();

        for color in 0..colors {
            let share = attempts / colors + u64::from(color < attempts % colors);
            if share == 0 {
                continue;
            }
            let mut members: Vec<usize> = self
                .frontier
                .iter()
                .filter(|index| lattice.voxel_at(*index).color(is_2d) as u64 == color)
                .collect();
            members.sort_unstable();
            stats.attempts += share;
            if members.is_empty() {
                stats.noop += share;
                continue;
            }

            // --- Evaluate against frozen state (parallel) ---
            let outcomes: Vec<Outcome> = {
                let hamiltonian = &self.hamiltonian;
                let frozen_lattice: &Lattice = lattice;
                let frozen_cells: &Population = cells;
                let members = &members;
                (0..share as usize)
                    .into_par_iter()
                    .map(|i| {
                        let mut rng = StdRng::seed_from_u64(attempt_seed(params.seed, step, color, i as u64));
                        let index = members[rng.random_range(0..members.len())];
                        let voxel = frozen_lattice.voxel_at(index);
                        attempt(hamiltonian, voxel, frozen_lattice, frozen_cells, params, uses_regions, &mut rng)
                    })
                    .collect()
            };

            // --- Commit (serial) ---
            let mut touched = BTreeSet::new();
            for outcome in outcomes {
                match outcome {
                    Outcome::Accepted(mv) => {
                        if !touched.insert(mv.voxel()) {
                            stats.noop += 1;
                        } else if !guard(&mv, lattice, cells, params) {
                            stats.rejected_connectivity += 1;
                        } else {
                            self.commit(&mv, lattice, cells, params)?;
                            stats.accepted += 1;
                        }
                    }
                    other => stats.tally(&other),
                }
            }
        }
        Ok(stats)
    }

    /// Applies an accepted move to the terms, the lattice, both locations and the frontier.
    fn commit(&mut self, mv: &Move, lattice: &mut Lattice, cells: &mut Population, params: &SimParams) -> Result<(), PottsError> {
        match *mv {
            Move::Id(flip) => {
                self.hamiltonian.accept(&flip, &EnergyContext::new(lattice, cells, params));
                lattice.set_occupant(flip.voxel, flip.target, Some(Region::Default));
                let offsets = lattice.offsets();
                if let Some(source) = cells.get_mut(flip.source) {
                    source.location.remove(flip.voxel, offsets)?;
                }
                if let Some(target) = cells.get_mut(flip.target) {
                    target.location.add(flip.voxel, offsets)?;
                }
            }
            Move::Region(flip) => {
                lattice.set_region(flip.voxel, flip.target);
                let offsets = lattice.offsets();
                let cell = cells
                    .get_mut(flip.cell)
                    .ok_or_else(|| PottsError::invariant(format!("region flip on missing cell {}", flip.cell)))?;
                cell.location.assign_region(flip.voxel, flip.target, offsets)?;
            }
        }
        self.frontier.refresh_around(lattice, mv.voxel());
        Ok(())
    }
}

impl SweepStats {
    fn tally(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Noop => self.noop += 1,
            Outcome::Blocked => self.rejected_connectivity += 1,
            Outcome::Rejected => self.rejected_energy += 1,
            Outcome::Accepted(_) => self.accepted += 1,
        }
    }
}

/// SplitMix64 finalizer.
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of one checkerboard attempt, mixing each coordinate in turn.
fn attempt_seed(seed: u64, step: u32, color: u64, attempt: u64) -> u64 {
    let mut h = splitmix64(seed);
    h = splitmix64(h ^ step as u64);
    h = splitmix64(h ^ color);
    splitmix64(h ^ attempt)
}

/// One attempt at `voxel`: propose, guard, price, draw.
fn attempt(
    hamiltonian: &Hamiltonian,
    voxel: Voxel,
    lattice: &Lattice,
    cells: &Population,
    params: &SimParams,
    uses_regions: bool,
    rng: &mut StdRng,
) -> Outcome {
    let Some(mv) = propose(voxel, lattice, cells, params, uses_regions, rng) else {
        return Outcome::Noop;
    };
    let r = rng.random::<f64>();
    if !guard(&mv, lattice, cells, params) {
        return Outcome::Blocked;
    }
    let ctx = EnergyContext::new(lattice, cells, params);
    let delta = match &mv {
        Move::Id(flip) => hamiltonian.delta(flip, &ctx),
        Move::Region(flip) => hamiltonian.delta_region(flip, &ctx),
    };
    if metropolis_accepts(delta, params.temperature, r) {
        Outcome::Accepted(mv)
    } else {
        Outcome::Rejected
    }
}

/// Picks an owner or region change for `voxel` from its neighbors.
fn propose(
    voxel: Voxel,
    lattice: &Lattice,
    cells: &Population,
    params: &SimParams,
    uses_regions: bool,
    rng: &mut StdRng,
) -> Option<Move> {
    let owner = lattice.occupant_at(voxel);
    let mut owners: Vec<CellId> = Vec::new();
    for neighbor in lattice.neighbors_of(voxel) {
        let other = lattice.occupant_at(neighbor);
        if other != owner && !owners.contains(&other) {
            owners.push(other);
        }
    }

    let region_move = if uses_regions {
        let regions = region_targets(voxel, owner, lattice, cells, params);
        let coin = rng.random::<bool>();
        if !regions.is_empty() && (coin || owners.is_empty()) {
            Some(regions)
        } else {
            None
        }
    } else {
        None
    };

    if let Some(regions) = region_move {
        let target = regions[rng.random_range(0..regions.len())];
        let source = lattice.region_at(voxel).unwrap_or(Region::Default);
        return Some(Move::Region(RegionFlip { voxel, cell: owner, source, target }));
    }
    if owners.is_empty() {
        return None;
    }
    let target = owners[rng.random_range(0..owners.len())];
    Some(Move::Id(Flip { voxel, source: owner, target }))
}

/// Regions of the same cell, other than the voxel's own, found among its neighbors.
fn region_targets(voxel: Voxel, owner: CellId, lattice: &Lattice, cells: &Population, params: &SimParams) -> Vec<Region> {
    let has_nucleus = cells
        .population_of(owner)
        .is_some_and(|p| params.population(p).nucleus.is_some());
    if owner == BACKGROUND || !has_nucleus {
        return Vec::new();
    }
    let current = lattice.region_at(voxel);
    let mut regions = Vec::new();
    for neighbor in lattice.neighbors_of(voxel) {
        if lattice.occupant_at(neighbor) != owner {
            continue;
        }
        if let Some(region) = lattice.region_at(neighbor) {
            if Some(region) != current && !regions.contains(&region) {
                regions.push(region);
            }
        }
    }
    regions
}

fn keeps_connected<F>(params: &SimParams, lattice: &Lattice, voxels: &BTreeSet<Voxel>, voxel: Voxel, member: F) -> bool
where
    F: Fn(Voxel) -> bool,
{
    match params.connectivity {
        ConnectivityCheck::Local => removal_keeps_local_connectivity(lattice, voxel, member),
        ConnectivityCheck::Global => removal_keeps_global_connectivity(voxels, voxel, lattice.offsets()),
    }
}

/// Whether a move keeps every location (and nucleus) a single connected component.
///
/// A cell's last voxel may only go once its target volume has dropped to zero.
fn guard(mv: &Move, lattice: &Lattice, cells: &Population, params: &SimParams) -> bool {
    let is_nuclear = |v: Voxel, id: CellId| lattice.occupant_at(v) == id && lattice.region_at(v) == Some(Region::Nucleus);
    match *mv {
        Move::Id(flip) => {
            let Some(cell) = cells.get(flip.source) else {
                return true;
            };
            let location = &cell.location;
            if location.volume() <= 1 {
                return cell.target_volume() <= 0.0;
            }
            if !keeps_connected(params, lattice, location.voxels(), flip.voxel, |n| lattice.occupant_at(n) == flip.source) {
                return false;
            }
            match location.nucleus() {
                Some(nucleus) if nucleus.contains(&flip.voxel) => {
                    if nucleus.volume() <= 1 && cell.target_volume() > 0.0 {
                        return false;
                    }
                    keeps_connected(params, lattice, nucleus.voxels(), flip.voxel, |n| is_nuclear(n, flip.source))
                }
                _ => true,
            }
        }
        Move::Region(flip) => match (flip.source, flip.target) {
            (Region::Nucleus, Region::Default) => {
                let Some(nucleus) = cells.get(flip.cell).and_then(|c| c.location.nucleus()) else {
                    return false;
                };
                nucleus.volume() > 1
                    && keeps_connected(params, lattice, nucleus.voxels(), flip.voxel, |n| is_nuclear(n, flip.cell))
            }
            _ => true,
        },
    }
}

/// Checks that the lattice and every location agree voxel for voxel and that each location is connected.
pub fn verify_consistency(lattice: &Lattice, cells: &Population) -> Result<(), PottsError> {
    let offsets = lattice.offsets();
    for cell in cells.iter() {
        for voxel in cell.location.voxels() {
            let occupant = lattice.occupant_at(*voxel);
            if occupant != cell.id {
                return Err(PottsError::invariant(format!(
                    "cell {} claims voxel {:?} but the lattice says {}",
                    cell.id, voxel, occupant
                )));
            }
            if lattice.region_at(*voxel) != cell.location.region_of(voxel) {
                return Err(PottsError::invariant(format!("cell {}: region of voxel {:?} disagrees", cell.id, voxel)));
            }
        }
        cell.location.verify(offsets).map_err(|e| match e {
            PottsError::InvariantViolation(message) => PottsError::invariant(format!("cell {}: {}", cell.id, message)),
            other => other,
        })?;
    }
    let owned = cells.total_volume();
    let occupied = lattice.occupied_volume();
    if owned != occupied {
        return Err(PottsError::invariant(format!(
            "{} voxels are occupied but cells own {}",
            occupied, owned
        )));
    }
    Ok(())
}
