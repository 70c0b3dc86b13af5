use potts_common::TermKind;

use super::{EnergyContext, Flip, HamiltonianTerm};
use crate::lattice::{CellId, Voxel};

/// Attraction to the substrate below the bottom layer, decaying with height.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstrateTerm;

impl SubstrateTerm {
    /// Mean concentration over the 3x3 column footprint centered on `voxel`.
    ///
    /// Columns outside the lattice contribute no substrate.
    pub fn footprint(voxel: Voxel, ctx: &EnergyContext) -> f64 {
        let mut total = 0.0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let column = Voxel::new(voxel.x + dx, voxel.y + dy, 0);
                if ctx.lattice.contains(column) {
                    total += ctx.params.substrate.concentration_at(column.x as i64);
                }
            }
        }
        total / 9.0
    }

    fn energy_at(voxel: Voxel, id: CellId, ctx: &EnergyContext) -> f64 {
        let Some(cell) = ctx.cell(id) else {
            return 0.0;
        };
        let sigma = ctx.params.population(cell.population).substrate_adhesion;
        if sigma == 0.0 {
            return 0.0;
        }
        -sigma * Self::footprint(voxel, ctx) * ctx.params.substrate.height_factor(voxel.z as i64)
    }
}

impl HamiltonianTerm for SubstrateTerm {
    fn kind(&self) -> TermKind {
        TermKind::Substrate
    }

    fn delta(&self, flip: &Flip, ctx: &EnergyContext) -> f64 {
        Self::energy_at(flip.voxel, flip.target, ctx) - Self::energy_at(flip.voxel, flip.source, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::lattice::BACKGROUND;

    #[test]
    fn interior_footprint_sees_full_concentration() {
        let mut world = World::new();
        world.place(1, &[v(3, 3)], 4.0);
        let ctx = world.ctx();
        assert_eq!(SubstrateTerm::footprint(v(3, 3), &ctx), 1.0);
        // σ = 2: moving onto the substrate lowers the energy.
        let flip = Flip { voxel: v(4, 3), source: BACKGROUND, target: 1 };
        assert_eq!(SubstrateTerm.delta(&flip, &ctx), -2.0);
    }

    #[test]
    fn corners_see_partial_footprint() {
        let world = World::new();
        let ctx = world.ctx();
        assert!((SubstrateTerm::footprint(v(0, 0), &ctx) - 4.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn contact_decays_with_height() {
        let mut world = World::with_height(4);
        world.place(1, &[Voxel::new(3, 3, 0)], 4.0);
        let ctx = world.ctx();
        let low = Flip { voxel: Voxel::new(4, 3, 0), source: BACKGROUND, target: 1 };
        let high = Flip { voxel: Voxel::new(3, 3, 1), source: BACKGROUND, target: 1 };
        assert!(SubstrateTerm.delta(&high, &ctx) > SubstrateTerm.delta(&low, &ctx));
    }
}
