use potts_common::{Region, TermKind};

use super::{EnergyContext, Flip, HamiltonianTerm, RegionFlip};
use crate::lattice::{CellId, Voxel};

/// Contact energy between unlike neighbors.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdhesionTerm;

impl AdhesionTerm {
    /// Contact energy `voxel` would carry if owned by `id`.
    fn energy_at(voxel: Voxel, id: CellId, ctx: &EnergyContext) -> f64 {
        let population = ctx.cells.population_of(id);
        ctx.lattice
            .neighbors_of(voxel)
            .filter_map(|n| {
                let other = ctx.lattice.occupant_at(n);
                (other != id).then(|| ctx.params.adhesion_between(population, ctx.cells.population_of(other)))
            })
            .sum()
    }

    /// Contact energy between `voxel` tagged `region` and the other region of the same cell.
    fn region_energy_at(voxel: Voxel, cell: CellId, region: Region, ctx: &EnergyContext) -> f64 {
        let Some(j) = ctx
            .cells
            .population_of(cell)
            .and_then(|p| ctx.params.population(p).nucleus.as_ref())
            .map(|n| n.adhesion)
        else {
            return 0.0;
        };
        let unlike = ctx
            .lattice
            .neighbors_of(voxel)
            .filter(|n| ctx.lattice.occupant_at(*n) == cell && ctx.lattice.region_at(*n) != Some(region))
            .count();
        j * unlike as f64
    }
}

impl HamiltonianTerm for AdhesionTerm {
    fn kind(&self) -> TermKind {
        TermKind::Adhesion
    }

    fn delta(&self, flip: &Flip, ctx: &EnergyContext) -> f64 {
        Self::energy_at(flip.voxel, flip.target, ctx) - Self::energy_at(flip.voxel, flip.source, ctx)
    }

    fn delta_region(&self, flip: &RegionFlip, ctx: &EnergyContext) -> f64 {
        Self::region_energy_at(flip.voxel, flip.cell, flip.target, ctx)
            - Self::region_energy_at(flip.voxel, flip.cell, flip.source, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::lattice::BACKGROUND;

    #[test]
    fn extending_into_medium_pays_for_new_contacts() {
        let mut world = World::new();
        world.place(1, &[v(3, 3)], 4.0);
        let ctx = world.ctx();
        // Target side sees three medium neighbors, source side one cell neighbor.
        let flip = Flip { voxel: v(4, 3), source: BACKGROUND, target: 1 };
        assert_eq!(AdhesionTerm.delta(&flip, &ctx), 30.0 - 10.0);
    }

    #[test]
    fn cell_cell_contacts_use_matrix_entry() {
        let mut world = World::new();
        world.place(1, &[v(2, 3)], 4.0);
        world.place(2, &[v(3, 3)], 4.0);
        let ctx = world.ctx();
        // Cell 2 hands its only voxel to cell 1: contacts 1-2 disappear, 3 medium contacts stay medium-facing.
        let flip = Flip { voxel: v(3, 3), source: 2, target: 1 };
        let before = 4.0 + 3.0 * 10.0;
        let after = 3.0 * 10.0;
        assert_eq!(AdhesionTerm.delta(&flip, &ctx), after - before);
    }

    #[test]
    fn region_flip_uses_nuclear_adhesion() {
        let mut world = World::new();
        world.place(1, &[v(2, 3), v(3, 3), v(4, 3)], 4.0);
        let ctx = world.ctx();
        let flip = RegionFlip { voxel: v(3, 3), cell: 1, source: Region::Default, target: Region::Nucleus };
        // Becoming nuclear creates two cytoplasm contacts.
        assert_eq!(AdhesionTerm.delta_region(&flip, &ctx), 2.0 * 7.0);
    }
}
