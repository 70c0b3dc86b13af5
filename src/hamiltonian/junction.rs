use potts_common::TermKind;

use super::{EnergyContext, Flip, HamiltonianTerm};
use crate::lattice::{CellId, Voxel, BACKGROUND};

/// Penalizes in-plane exposure to the medium, pulling sheets of cells laterally together.
#[derive(Debug, Default, Clone, Copy)]
pub struct JunctionTerm;

impl JunctionTerm {
    fn energy_at(voxel: Voxel, id: CellId, ctx: &EnergyContext) -> f64 {
        let Some(cell) = ctx.cell(id) else {
            return 0.0;
        };
        let lambda = ctx.params.population(cell.population).lambda_junction;
        let exposed = ctx
            .lattice
            .offsets()
            .iter()
            .filter(|d| d[2] == 0)
            .filter(|d| ctx.lattice.occupant_at(voxel.offset(**d)) == BACKGROUND)
            .count();
        lambda * exposed as f64
    }
}

impl HamiltonianTerm for JunctionTerm {
    fn kind(&self) -> TermKind {
        TermKind::Junction
    }

    fn delta(&self, flip: &Flip, ctx: &EnergyContext) -> f64 {
        Self::energy_at(flip.voxel, flip.target, ctx) - Self::energy_at(flip.voxel, flip.source, ctx)
    }
}
