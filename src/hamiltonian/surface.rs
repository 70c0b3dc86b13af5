use potts_common::{Region, TermKind};

use super::{quadratic_change, EnergyContext, Flip, HamiltonianTerm, RegionFlip};
use crate::cell::Cell;
use crate::lattice::{CellId, Voxel};

/// Quadratic penalty on deviation from target surface, for the cell and its nucleus.
#[derive(Debug, Default, Clone, Copy)]
pub struct SurfaceTerm;

impl SurfaceTerm {
    /// Surface change of `id` if it gained (`sign = 1`) or lost (`sign = -1`) `voxel`.
    fn surface_change(voxel: Voxel, id: CellId, sign: i64, ctx: &EnergyContext) -> i64 {
        let same = ctx.lattice.neighbors_of(voxel).filter(|n| ctx.lattice.occupant_at(*n) == id).count() as i64;
        let total = ctx.lattice.offsets().len() as i64;
        sign * (total - 2 * same)
    }

    /// Nucleus surface change of `id` if its nucleus gained or lost `voxel`.
    fn nucleus_surface_change(voxel: Voxel, id: CellId, sign: i64, ctx: &EnergyContext) -> i64 {
        let same = ctx.lattice.neighbors_of(voxel).filter(|n| ctx.is_nuclear(*n, id)).count() as i64;
        let total = ctx.lattice.offsets().len() as i64;
        sign * (total - 2 * same)
    }

    fn cell_change(cell: &Cell, change: i64, ctx: &EnergyContext) -> f64 {
        let lambda = ctx.params.population(cell.population).lambda_surface;
        quadratic_change(lambda, cell.location.surface() as f64, cell.target_surface, change as f64)
    }

    fn nucleus_change(cell: &Cell, change: i64, ctx: &EnergyContext) -> f64 {
        let params = ctx.params.population(cell.population);
        match (params.nucleus.as_ref(), cell.location.nucleus(), cell.target_nucleus_surface) {
            (Some(nucleus), Some(shape), Some(target)) => {
                quadratic_change(nucleus.lambda_surface, shape.surface() as f64, target, change as f64)
            }
            _ => 0.0,
        }
    }
}

impl HamiltonianTerm for SurfaceTerm {
    fn kind(&self) -> TermKind {
        TermKind::Surface
    }

    fn delta(&self, flip: &Flip, ctx: &EnergyContext) -> f64 {
        let mut delta = 0.0;
        if let Some(source) = ctx.cell(flip.source) {
            let change = Self::surface_change(flip.voxel, flip.source, -1, ctx);
            delta += Self::cell_change(source, change, ctx);
            if ctx.is_nuclear(flip.voxel, flip.source) {
                let change = Self::nucleus_surface_change(flip.voxel, flip.source, -1, ctx);
                delta += Self::nucleus_change(source, change, ctx);
            }
        }
        if let Some(target) = ctx.cell(flip.target) {
            let change = Self::surface_change(flip.voxel, flip.target, 1, ctx);
            delta += Self::cell_change(target, change, ctx);
        }
        delta
    }

    fn delta_region(&self, flip: &RegionFlip, ctx: &EnergyContext) -> f64 {
        let Some(cell) = ctx.cell(flip.cell) else {
            return 0.0;
        };
        let sign = match (flip.source, flip.target) {
            (Region::Default, Region::Nucleus) => 1,
            (Region::Nucleus, Region::Default) => -1,
            _ => return 0.0,
        };
        let change = Self::nucleus_surface_change(flip.voxel, flip.cell, sign, ctx);
        Self::nucleus_change(cell, change, ctx)
    }
}
