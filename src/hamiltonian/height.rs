use potts_common::TermKind;

use super::{EnergyContext, Flip, HamiltonianTerm};
use crate::cell::Cell;

/// Quadratic penalty on a cell's z extent around its critical height.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeightTerm;

impl HeightTerm {
    fn energy(cell: &Cell, height: u32, ctx: &EnergyContext) -> f64 {
        let lambda = ctx.params.population(cell.population).lambda_height;
        let d = height as f64 - cell.critical_height;
        lambda * d * d
    }
}

impl HamiltonianTerm for HeightTerm {
    fn kind(&self) -> TermKind {
        TermKind::Height
    }

    fn delta(&self, flip: &Flip, ctx: &EnergyContext) -> f64 {
        let z = flip.voxel.z;
        let mut delta = 0.0;
        if let Some(source) = ctx.cell(flip.source) {
            let shape = source.location.shape();
            delta += Self::energy(source, shape.height_without(z), ctx) - Self::energy(source, shape.height(), ctx);
        }
        if let Some(target) = ctx.cell(flip.target) {
            let shape = target.location.shape();
            delta += Self::energy(target, shape.height_with(z), ctx) - Self::energy(target, shape.height(), ctx);
        }
        delta
    }
}
