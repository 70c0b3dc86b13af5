//! Energy terms of the Potts Hamiltonian.
//!
//! Every term answers one question: how much would the total energy change
//! if this voxel were handed from one owner to another. Terms read only the
//! candidate voxel's neighborhood and cell-level quantities, so a delta costs
//! O(neighborhood) regardless of lattice size.

mod adhesion;
mod height;
mod junction;
mod persistence;
mod substrate;
mod surface;
mod volume;

pub use adhesion::AdhesionTerm;
pub use height::HeightTerm;
pub use junction::JunctionTerm;
pub use persistence::PersistenceTerm;
pub use substrate::SubstrateTerm;
pub use surface::SurfaceTerm;
pub use volume::VolumeTerm;

use potts_common::{Region, SimParams, TermKind};

use crate::cell::Cell;
use crate::lattice::{CellId, Lattice, Voxel, BACKGROUND};
use crate::population::Population;

/// Proposed reassignment of one voxel between owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flip {
    pub voxel: Voxel,
    pub source: CellId,
    pub target: CellId,
}

/// Proposed change of region of one voxel inside a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionFlip {
    pub voxel: Voxel,
    pub cell: CellId,
    pub source: Region,
    pub target: Region,
}

/// Read-only view of the state a delta is evaluated against.
#[derive(Clone, Copy)]
pub struct EnergyContext<'a> {
    pub lattice: &'a Lattice,
    pub cells: &'a Population,
    pub params: &'a SimParams,
}

impl<'a> EnergyContext<'a> {
    pub fn new(lattice: &'a Lattice, cells: &'a Population, params: &'a SimParams) -> Self {
        EnergyContext { lattice, cells, params }
    }

    /// The cell behind an owner id; `None` for background.
    #[inline]
    pub fn cell(&self, id: CellId) -> Option<&'a Cell> {
        if id == BACKGROUND {
            None
        } else {
            self.cells.get(id)
        }
    }

    /// Whether `voxel` belongs to the nucleus of `id`.
    #[inline]
    pub fn is_nuclear(&self, voxel: Voxel, id: CellId) -> bool {
        id != BACKGROUND
            && self.lattice.occupant_at(voxel) == id
            && self.lattice.region_at(voxel) == Some(Region::Nucleus)
    }
}

/// One additive contribution to the Hamiltonian.
pub trait HamiltonianTerm: Send + Sync {
    fn kind(&self) -> TermKind;

    /// Energy change of reassigning `flip.voxel` from `flip.source` to `flip.target`.
    fn delta(&self, flip: &Flip, ctx: &EnergyContext) -> f64;

    /// Energy change of a region flip. Terms without region semantics contribute nothing.
    fn delta_region(&self, _flip: &RegionFlip, _ctx: &EnergyContext) -> f64 {
        0.0
    }

    /// Called with the pre-flip state once a flip has been accepted.
    fn accept(&mut self, _flip: &Flip, _ctx: &EnergyContext) {}

    fn register(&mut self, _cell: &Cell) {}

    fn deregister(&mut self, _id: CellId) {}
}

/// Ordered collection of active terms.
pub struct Hamiltonian {
    terms: Vec<Box<dyn HamiltonianTerm>>,
}

impl std::fmt::Debug for Hamiltonian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

impl Hamiltonian {
    pub fn new(terms: Vec<Box<dyn HamiltonianTerm>>) -> Self {
        Hamiltonian { terms }
    }

    /// Builds the configured terms in configuration order.
    pub fn from_params(params: &SimParams) -> Self {
        let terms = params.terms.iter().map(|kind| build_term(*kind)).collect();
        Hamiltonian { terms }
    }

    pub fn kinds(&self) -> Vec<TermKind> {
        self.terms.iter().map(|t| t.kind()).collect()
    }

    pub fn delta(&self, flip: &Flip, ctx: &EnergyContext) -> f64 {
        self.terms.iter().map(|t| t.delta(flip, ctx)).sum()
    }

    pub fn delta_region(&self, flip: &RegionFlip, ctx: &EnergyContext) -> f64 {
        self.terms.iter().map(|t| t.delta_region(flip, ctx)).sum()
    }

    pub fn accept(&mut self, flip: &Flip, ctx: &EnergyContext) {
        for term in &mut self.terms {
            term.accept(flip, ctx);
        }
    }

    pub fn register(&mut self, cell: &Cell) {
        for term in &mut self.terms {
            term.register(cell);
        }
    }

    pub fn deregister(&mut self, id: CellId) {
        for term in &mut self.terms {
            term.deregister(id);
        }
    }
}

fn build_term(kind: TermKind) -> Box<dyn HamiltonianTerm> {
    match kind {
        TermKind::Adhesion => Box::new(AdhesionTerm),
        TermKind::Volume => Box::new(VolumeTerm),
        TermKind::Surface => Box::new(SurfaceTerm),
        TermKind::Height => Box::new(HeightTerm),
        TermKind::Persistence => Box::new(PersistenceTerm::default()),
        TermKind::Junction => Box::new(JunctionTerm),
        TermKind::Substrate => Box::new(SubstrateTerm),
    }
}

/// `λ·((x + change − target)² − (x − target)²)`, the delta of a quadratic constraint.
#[inline]
pub(crate) fn quadratic_change(lambda: f64, current: f64, target: f64, change: f64) -> f64 {
    let before = current - target;
    let after = current + change - target;
    lambda * (after * after - before * before)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn quadratic_change_matches_expansion() {
        // λ(1 ± 2(V − T)) for unit changes.
        assert_eq!(quadratic_change(2.0, 5.0, 3.0, 1.0), 2.0 * (1.0 + 2.0 * 2.0));
        assert_eq!(quadratic_change(2.0, 5.0, 3.0, -1.0), 2.0 * (1.0 - 2.0 * 2.0));
    }

    #[test]
    fn hamiltonian_sums_terms_in_order() {
        let mut world = World::new();
        world.place(1, &[v(3, 3), v(3, 4)], 4.0);
        let hamiltonian = Hamiltonian::from_params(&world.params);
        assert_eq!(hamiltonian.kinds(), world.params.terms);

        let flip = Flip { voxel: v(4, 3), source: BACKGROUND, target: 1 };
        let ctx = world.ctx();
        let expected: f64 = [
            AdhesionTerm.delta(&flip, &ctx),
            VolumeTerm.delta(&flip, &ctx),
            SurfaceTerm.delta(&flip, &ctx),
            HeightTerm.delta(&flip, &ctx),
            PersistenceTerm::default().delta(&flip, &ctx),
            JunctionTerm.delta(&flip, &ctx),
            SubstrateTerm.delta(&flip, &ctx),
        ]
        .iter()
        .sum();
        assert!((hamiltonian.delta(&flip, &ctx) - expected).abs() < 1e-12);
    }
}
