//! Voxel ownership grid.
//!
//! The lattice is the single source of truth for which cell owns a voxel.
//! Coordinates outside the lattice resolve to background and never wrap.

use potts_common::{NeighborhoodKind, Region};
use std::ops::RangeInclusive;

/// Identifier of a cell. `BACKGROUND` (0) marks the medium.
pub type CellId = u32;

/// Owner id of unoccupied voxels.
pub const BACKGROUND: CellId = 0;

/// Integer lattice coordinate. 2D lattices use `z == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Voxel {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Voxel {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Voxel { x, y, z }
    }

    #[inline]
    pub fn offset(&self, delta: [i32; 3]) -> Self {
        Voxel::new(self.x + delta[0], self.y + delta[1], self.z + delta[2])
    }

    /// Chebyshev distance, used to bound local neighborhoods.
    #[inline]
    pub fn chebyshev(&self, other: &Voxel) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs()).max((self.z - other.z).abs())
    }

    /// Checkerboard color: voxels sharing a color are at least three apart on some axis.
    #[inline]
    pub fn color(&self, is_2d: bool) -> usize {
        let c = (self.x.rem_euclid(3) + 3 * self.y.rem_euclid(3)) as usize;
        if is_2d {
            c
        } else {
            c + 9 * self.z.rem_euclid(3) as usize
        }
    }
}

/// Neighbor offsets of a relation, in a fixed order.
pub fn neighborhood_offsets(kind: NeighborhoodKind, is_2d: bool) -> Vec<[i32; 3]> {
    let z_range: RangeInclusive<i32> = if is_2d { 0..=0 } else { -1..=1 };
    let mut offsets = Vec::new();
    for dz in z_range {
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                let manhattan = dx.abs() + dy.abs() + dz.abs();
                let keep = match kind {
                    NeighborhoodKind::VonNeumann => manhattan == 1,
                    NeighborhoodKind::Moore => manhattan > 0,
                };
                if keep {
                    offsets.push([dx, dy, dz]);
                }
            }
        }
    }
    offsets
}

/// Fixed-size lattice of owner ids with an optional region tag per voxel.
#[derive(Debug, Clone)]
pub struct Lattice {
    length: usize,
    width: usize,
    height: usize,
    ids: Vec<CellId>,
    regions: Vec<Option<Region>>,
    offsets: Vec<[i32; 3]>,
}

impl Lattice {
    /// Creates an empty (all background) lattice.
    pub fn new(length: usize, width: usize, height: usize, neighborhood: NeighborhoodKind) -> Self {
        let size = length * width * height;
        Lattice {
            length,
            width,
            height,
            ids: vec![BACKGROUND; size],
            regions: vec![None; size],
            offsets: neighborhood_offsets(neighborhood, height == 1),
        }
    }

    pub fn dimensions(&self) -> [usize; 3] {
        [self.length, self.width, self.height]
    }

    pub fn is_2d(&self) -> bool {
        self.height == 1
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }

    /// Offsets of the configured neighbor relation.
    pub fn offsets(&self) -> &[[i32; 3]] {
        &self.offsets
    }

    #[inline]
    pub fn contains(&self, voxel: Voxel) -> bool {
        voxel.x >= 0
            && voxel.y >= 0
            && voxel.z >= 0
            && (voxel.x as usize) < self.length
            && (voxel.y as usize) < self.width
            && (voxel.z as usize) < self.height
    }

    /// Flat index, x fastest then y then z.
    #[inline]
    pub fn index_of(&self, voxel: Voxel) -> Option<usize> {
        if self.contains(voxel) {
            Some(voxel.x as usize + self.length * (voxel.y as usize + self.width * voxel.z as usize))
        } else {
            None
        }
    }

    #[inline]
    pub fn voxel_at(&self, index: usize) -> Voxel {
        let x = index % self.length;
        let y = (index / self.length) % self.width;
        let z = index / (self.length * self.width);
        Voxel::new(x as i32, y as i32, z as i32)
    }

    /// Owner of a voxel; background outside the lattice.
    #[inline]
    pub fn occupant_at(&self, voxel: Voxel) -> CellId {
        self.index_of(voxel).map_or(BACKGROUND, |i| self.ids[i])
    }

    /// Region tag of a voxel; `None` for background and outside the lattice.
    #[inline]
    pub fn region_at(&self, voxel: Voxel) -> Option<Region> {
        self.index_of(voxel).and_then(|i| self.regions[i])
    }

    /// Neighbors under the configured relation, including out-of-range ones.
    pub fn neighbors_of(&self, voxel: Voxel) -> impl Iterator<Item = Voxel> + '_ {
        self.offsets.iter().map(move |d| voxel.offset(*d))
    }

    /// Reassigns a voxel. Reserved for the engine; out-of-range writes are ignored.
    pub(crate) fn set_occupant(&mut self, voxel: Voxel, id: CellId, region: Option<Region>) {
        if let Some(i) = self.index_of(voxel) {
            self.ids[i] = id;
            self.regions[i] = if id == BACKGROUND { None } else { region };
        }
    }

    pub(crate) fn set_region(&mut self, voxel: Voxel, region: Region) {
        if let Some(i) = self.index_of(voxel) {
            if self.ids[i] != BACKGROUND {
                self.regions[i] = Some(region);
            }
        }
    }

    /// Read-only view of the id array.
    pub fn ids(&self) -> &[CellId] {
        &self.ids
    }

    /// Number of non-background voxels.
    pub fn occupied_volume(&self) -> u64 {
        self.ids.iter().filter(|&&id| id != BACKGROUND).count() as u64
    }

    /// Whether a voxel touches a different owner, or a different region of the same cell.
    pub fn is_interface(&self, voxel: Voxel) -> bool {
        let id = self.occupant_at(voxel);
        let region = self.region_at(voxel);
        self.neighbors_of(voxel).any(|n| {
            let other = self.occupant_at(n);
            other != id || (id != BACKGROUND && self.region_at(n) != region)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighborhood_cardinality() {
        assert_eq!(neighborhood_offsets(NeighborhoodKind::VonNeumann, true).len(), 4);
        assert_eq!(neighborhood_offsets(NeighborhoodKind::VonNeumann, false).len(), 6);
        assert_eq!(neighborhood_offsets(NeighborhoodKind::Moore, true).len(), 8);
        assert_eq!(neighborhood_offsets(NeighborhoodKind::Moore, false).len(), 26);
    }

    #[test]
    fn out_of_range_reads_background() {
        let mut lattice = Lattice::new(4, 3, 1, NeighborhoodKind::VonNeumann);
        lattice.set_occupant(Voxel::new(0, 0, 0), 7, Some(Region::Default));
        assert_eq!(lattice.occupant_at(Voxel::new(0, 0, 0)), 7);
        assert_eq!(lattice.occupant_at(Voxel::new(-1, 0, 0)), BACKGROUND);
        assert_eq!(lattice.occupant_at(Voxel::new(4, 0, 0)), BACKGROUND);
        assert_eq!(lattice.occupant_at(Voxel::new(0, 0, 1)), BACKGROUND);
        assert_eq!(lattice.region_at(Voxel::new(0, -1, 0)), None);

        // No wrapping: writes outside the lattice are dropped.
        lattice.set_occupant(Voxel::new(-1, 0, 0), 9, Some(Region::Default));
        assert_eq!(lattice.occupant_at(Voxel::new(3, 0, 0)), BACKGROUND);
        assert_eq!(lattice.occupied_volume(), 1);
    }

    #[test]
    fn index_round_trips_through_voxel() {
        let lattice = Lattice::new(5, 4, 3, NeighborhoodKind::Moore);
        for index in [0, 7, 23, 59] {
            let voxel = lattice.voxel_at(index);
            assert_eq!(lattice.index_of(voxel), Some(index));
        }
        assert_eq!(lattice.index_of(Voxel::new(5, 0, 0)), None);
    }

    #[test]
    fn neighbors_keep_fixed_cardinality_at_edges() {
        let lattice = Lattice::new(3, 3, 1, NeighborhoodKind::VonNeumann);
        let corner: Vec<Voxel> = lattice.neighbors_of(Voxel::new(0, 0, 0)).collect();
        assert_eq!(corner.len(), 4);
        assert_eq!(corner.iter().filter(|v| lattice.contains(**v)).count(), 2);
    }

    #[test]
    fn background_clears_region_and_interface_tracks_owners() {
        let mut lattice = Lattice::new(3, 3, 1, NeighborhoodKind::VonNeumann);
        let center = Voxel::new(1, 1, 0);
        lattice.set_occupant(center, 1, Some(Region::Nucleus));
        assert_eq!(lattice.region_at(center), Some(Region::Nucleus));
        assert!(lattice.is_interface(center));
        assert!(lattice.is_interface(Voxel::new(1, 0, 0)));
        assert!(!lattice.is_interface(Voxel::new(0, 0, 0)));

        lattice.set_occupant(center, BACKGROUND, Some(Region::Nucleus));
        assert_eq!(lattice.region_at(center), None);
    }

    #[test]
    fn colors_separate_interacting_voxels() {
        let a = Voxel::new(1, 1, 0);
        for dx in -2..=2 {
            for dy in -2..=2 {
                let b = Voxel::new(1 + dx, 1 + dy, 0);
                if b != a && a.color(true) == b.color(true) {
                    assert!(a.chebyshev(&b) >= 3);
                }
            }
        }
    }
}
