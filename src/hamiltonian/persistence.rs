use std::collections::BTreeMap;

use potts_common::{TermKind, Vec3};

use super::{EnergyContext, Flip, HamiltonianTerm};
use crate::cell::Cell;
use crate::lattice::{CellId, Voxel};

/// Rewards flips that move a cell along its recent direction of motion.
///
/// Each cell carries a unit persistence vector that relaxes toward the
/// displacement of every accepted flip at the population's decay rate.
#[derive(Debug, Default, Clone)]
pub struct PersistenceTerm {
    vectors: BTreeMap<CellId, Vec3>,
}

impl PersistenceTerm {
    pub fn vector(&self, id: CellId) -> Vec3 {
        self.vectors.get(&id).copied().unwrap_or_else(Vec3::zero)
    }

    /// Unit direction of centroid displacement caused by adding (`change = 1`) or removing `voxel`.
    fn displacement(cell: &Cell, voxel: Voxel, change: f64) -> Vec3 {
        let volume = cell.location.volume() as f64 + change;
        if volume <= 0.0 {
            return Vec3::zero();
        }
        let position = Vec3::new(voxel.x as f64, voxel.y as f64, voxel.z as f64);
        ((position - cell.location.centroid()) * change / volume).normalize_or_zero()
    }

    fn energy(&self, cell: &Cell, voxel: Voxel, change: f64, ctx: &EnergyContext) -> f64 {
        let lambda = ctx.params.population(cell.population).lambda_persistence;
        let alignment = self.vector(cell.id).dot(Self::displacement(cell, voxel, change));
        -lambda * alignment * cell.location.surface() as f64
    }

    fn relax(&mut self, cell: &Cell, voxel: Voxel, change: f64, ctx: &EnergyContext) {
        let decay = ctx.params.population(cell.population).persistence_decay;
        let displacement = Self::displacement(cell, voxel, change);
        let current = self.vector(cell.id);
        let updated = (current * (1.0 - decay) + displacement * decay).normalize_or_zero();
        self.vectors.insert(cell.id, updated);
    }
}

impl HamiltonianTerm for PersistenceTerm {
    fn kind(&self) -> TermKind {
        TermKind::Persistence
    }

    fn delta(&self, flip: &Flip, ctx: &EnergyContext) -> f64 {
        let mut delta = 0.0;
        if let Some(source) = ctx.cell(flip.source) {
            delta += self.energy(source, flip.voxel, -1.0, ctx);
        }
        if let Some(target) = ctx.cell(flip.target) {
            delta += self.energy(target, flip.voxel, 1.0, ctx);
        }
        delta
    }

    fn accept(&mut self, flip: &Flip, ctx: &EnergyContext) {
        if let Some(source) = ctx.cell(flip.source) {
            self.relax(source, flip.voxel, -1.0, ctx);
        }
        if let Some(target) = ctx.cell(flip.target) {
            self.relax(target, flip.voxel, 1.0, ctx);
        }
    }

    fn register(&mut self, cell: &Cell) {
        self.vectors.insert(cell.id, Vec3::zero());
    }

    fn deregister(&mut self, id: CellId) {
        self.vectors.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::lattice::BACKGROUND;

    #[test]
    fn fresh_cells_feel_no_persistence() {
        let mut world = World::new();
        world.place(1, &[v(3, 3), v(3, 4)], 4.0);
        let mut term = PersistenceTerm::default();
        term.register(world.cells.get(1).unwrap());
        let ctx = world.ctx();
        let flip = Flip { voxel: v(4, 3), source: BACKGROUND, target: 1 };
        assert_eq!(term.delta(&flip, &ctx), 0.0);
    }

    #[test]
    fn accepted_flips_bias_later_moves_in_the_same_direction() {
        let mut world = World::new();
        world.place(1, &[v(3, 3), v(3, 4)], 4.0);
        let mut term = PersistenceTerm::default();
        term.register(world.cells.get(1).unwrap());

        let east = Flip { voxel: v(4, 3), source: BACKGROUND, target: 1 };
        term.accept(&east, &world.ctx());
        let vector = term.vector(1);
        assert!(vector.x > 0.0);
        assert!((vector.length() - 1.0).abs() < 1e-12);

        let ctx = world.ctx();
        let again_east = Flip { voxel: v(4, 4), source: BACKGROUND, target: 1 };
        let west = Flip { voxel: v(2, 3), source: BACKGROUND, target: 1 };
        assert!(term.delta(&again_east, &ctx) < 0.0);
        assert!(term.delta(&west, &ctx) > 0.0);

        term.deregister(1);
        assert_eq!(term.vector(1), Vec3::zero());
    }
}
