use potts_common::{Region, TermKind};

use super::{quadratic_change, EnergyContext, Flip, HamiltonianTerm, RegionFlip};
use crate::cell::Cell;

/// Quadratic penalty on deviation from target volume, for the cell and its nucleus.
#[derive(Debug, Default, Clone, Copy)]
pub struct VolumeTerm;

impl VolumeTerm {
    fn cell_change(cell: &Cell, change: f64, ctx: &EnergyContext) -> f64 {
        let lambda = ctx.params.population(cell.population).lambda_volume;
        quadratic_change(lambda, cell.location.volume() as f64, cell.targets.volume, change)
    }

    fn nucleus_change(cell: &Cell, change: f64, ctx: &EnergyContext) -> f64 {
        let params = ctx.params.population(cell.population);
        match (params.nucleus.as_ref(), cell.location.nucleus(), cell.targets.nucleus_volume) {
            (Some(nucleus), Some(shape), Some(target)) => {
                quadratic_change(nucleus.lambda_volume, shape.volume() as f64, target, change)
            }
            _ => 0.0,
        }
    }
}

impl HamiltonianTerm for VolumeTerm {
    fn kind(&self) -> TermKind {
        TermKind::Volume
    }

    fn delta(&self, flip: &Flip, ctx: &EnergyContext) -> f64 {
        let mut delta = 0.0;
        if let Some(source) = ctx.cell(flip.source) {
            delta += Self::cell_change(source, -1.0, ctx);
            if ctx.is_nuclear(flip.voxel, flip.source) {
                delta += Self::nucleus_change(source, -1.0, ctx);
            }
        }
        if let Some(target) = ctx.cell(flip.target) {
            delta += Self::cell_change(target, 1.0, ctx);
        }
        delta
    }

    fn delta_region(&self, flip: &RegionFlip, ctx: &EnergyContext) -> f64 {
        let Some(cell) = ctx.cell(flip.cell) else {
            return 0.0;
        };
        match (flip.source, flip.target) {
            (Region::Default, Region::Nucleus) => Self::nucleus_change(cell, 1.0, ctx),
            (Region::Nucleus, Region::Default) => Self::nucleus_change(cell, -1.0, ctx),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::lattice::BACKGROUND;

    #[test]
    fn gain_and_loss_follow_closed_form() {
        let mut world = World::new();
        world.place(1, &[v(3, 3), v(3, 4)], 4.0);
        let ctx = world.ctx();
        // λ = 2, V = 2, T = 4.
        let gain = Flip { voxel: v(4, 3), source: BACKGROUND, target: 1 };
        assert_eq!(VolumeTerm.delta(&gain, &ctx), 2.0 * (1.0 + 2.0 * (2.0 - 4.0)));
        let loss = Flip { voxel: v(3, 4), source: 1, target: BACKGROUND };
        assert_eq!(VolumeTerm.delta(&loss, &ctx), 2.0 * (1.0 - 2.0 * (2.0 - 4.0)));
    }

    #[test]
    fn nucleus_volume_counts_for_region_flips() {
        let mut world = World::new();
        world.place(1, &[v(2, 3), v(3, 3), v(4, 3)], 4.0);
        world.make_nuclear(1, v(3, 3));
        let ctx = world.ctx();
        // Nucleus λ = 5, volume 1, target 1.
        let grow = RegionFlip { voxel: v(2, 3), cell: 1, source: Region::Default, target: Region::Nucleus };
        assert_eq!(VolumeTerm.delta_region(&grow, &ctx), 5.0);
        let shrink = RegionFlip { voxel: v(3, 3), cell: 1, source: Region::Nucleus, target: Region::Default };
        assert_eq!(VolumeTerm.delta_region(&shrink, &ctx), 5.0);
    }
}
