//! Voxel sets owned by cells, with incrementally maintained geometry.
//!
//! A `Location` never points back at its cell or the lattice; callers pass the
//! lattice's neighbor offsets whenever surface bookkeeping is needed.

use std::collections::{BTreeMap, BTreeSet};

use potts_common::{NeighborhoodKind, Region, Vec3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::connectivity::{components, is_connected, removal_keeps_global_connectivity};
use crate::error::PottsError;
use crate::lattice::Voxel;

/// Maximum relative size difference between the two halves of a division.
const BALANCE_DIFFERENCE: f64 = 0.05;

/// Diameters within this fraction of the longest one are split candidates.
const DIAMETER_TOLERANCE: f64 = 0.9;

/// Fitted correction of the 3D surface estimate.
const SURFACE_FIT_A: f64 = 0.79295247;
const SURFACE_FIT_N: f64 = 0.50931200;
const SURFACE_FIT_B: f64 = -1.54292969;

/// A voxel set with its volume, surface, height and centroid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    voxels: BTreeSet<Voxel>,
    surface: i64,
    /// Voxel count per z layer, for the height.
    layers: BTreeMap<i32, u32>,
    sum: [i64; 3],
}

impl Shape {
    pub fn from_voxels<I: IntoIterator<Item = Voxel>>(voxels: I, offsets: &[[i32; 3]]) -> Result<Self, PottsError> {
        let mut shape = Shape::default();
        for voxel in voxels {
            shape.add(voxel, offsets)?;
        }
        Ok(shape)
    }

    pub fn voxels(&self) -> &BTreeSet<Voxel> {
        &self.voxels
    }

    pub fn contains(&self, voxel: &Voxel) -> bool {
        self.voxels.contains(voxel)
    }

    pub fn volume(&self) -> u32 {
        self.voxels.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Number of (voxel, neighbor) pairs whose neighbor lies outside the set.
    pub fn surface(&self) -> u32 {
        self.surface.max(0) as u32
    }

    /// Extent along z in layers; 0 when empty.
    pub fn height(&self) -> u32 {
        match (self.layers.keys().next(), self.layers.keys().next_back()) {
            (Some(low), Some(high)) => (high - low + 1) as u32,
            _ => 0,
        }
    }

    pub fn centroid(&self) -> Vec3 {
        if self.voxels.is_empty() {
            return Vec3::zero();
        }
        let n = self.voxels.len() as f64;
        Vec3::new(self.sum[0] as f64 / n, self.sum[1] as f64 / n, self.sum[2] as f64 / n)
    }

    pub fn lowest_layer(&self) -> Option<i32> {
        self.layers.keys().next().copied()
    }

    /// Surface change if `voxel` joined the set.
    pub fn surface_change_on_add(&self, voxel: Voxel, offsets: &[[i32; 3]]) -> i64 {
        offsets
            .iter()
            .map(|d| if self.voxels.contains(&voxel.offset(*d)) { -1 } else { 1 })
            .sum()
    }

    /// Surface change if `voxel` left the set.
    pub fn surface_change_on_remove(&self, voxel: Voxel, offsets: &[[i32; 3]]) -> i64 {
        -self.surface_change_on_add(voxel, offsets)
    }

    /// Height the set would have with `z` added.
    pub fn height_with(&self, z: i32) -> u32 {
        match (self.layers.keys().next(), self.layers.keys().next_back()) {
            (Some(low), Some(high)) => ((*high).max(z) - (*low).min(z) + 1) as u32,
            _ => 1,
        }
    }

    /// Height the set would have with one voxel of layer `z` removed.
    pub fn height_without(&self, z: i32) -> u32 {
        if self.layers.get(&z).copied().unwrap_or(0) > 1 {
            return self.height();
        }
        let mut remaining = self.layers.keys().filter(|layer| **layer != z);
        match remaining.next() {
            Some(low) => {
                let high = remaining.last().unwrap_or(low);
                (high - low + 1) as u32
            }
            None => 0,
        }
    }

    pub fn add(&mut self, voxel: Voxel, offsets: &[[i32; 3]]) -> Result<(), PottsError> {
        if self.voxels.contains(&voxel) {
            return Err(PottsError::invariant(format!("voxel {:?} added twice", voxel)));
        }
        self.surface += self.surface_change_on_add(voxel, offsets);
        self.voxels.insert(voxel);
        *self.layers.entry(voxel.z).or_insert(0) += 1;
        self.sum[0] += voxel.x as i64;
        self.sum[1] += voxel.y as i64;
        self.sum[2] += voxel.z as i64;
        Ok(())
    }

    pub fn remove(&mut self, voxel: Voxel, offsets: &[[i32; 3]]) -> Result<(), PottsError> {
        if !self.voxels.remove(&voxel) {
            return Err(PottsError::invariant(format!("voxel {:?} removed but not present", voxel)));
        }
        self.surface += self.surface_change_on_remove(voxel, offsets);
        if let Some(count) = self.layers.get_mut(&voxel.z) {
            *count -= 1;
            if *count == 0 {
                self.layers.remove(&voxel.z);
            }
        }
        self.sum[0] -= voxel.x as i64;
        self.sum[1] -= voxel.y as i64;
        self.sum[2] -= voxel.z as i64;
        Ok(())
    }
}

/// The voxels of one cell plus its optional nucleus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    shape: Shape,
    nucleus: Option<Shape>,
}

impl Location {
    pub fn from_voxels<I: IntoIterator<Item = Voxel>>(voxels: I, offsets: &[[i32; 3]]) -> Result<Self, PottsError> {
        Ok(Location { shape: Shape::from_voxels(voxels, offsets)?, nucleus: None })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn nucleus(&self) -> Option<&Shape> {
        self.nucleus.as_ref()
    }

    pub fn voxels(&self) -> &BTreeSet<Voxel> {
        self.shape.voxels()
    }

    pub fn contains(&self, voxel: &Voxel) -> bool {
        self.shape.contains(voxel)
    }

    pub fn volume(&self) -> u32 {
        self.shape.volume()
    }

    pub fn surface(&self) -> u32 {
        self.shape.surface()
    }

    pub fn height(&self) -> u32 {
        self.shape.height()
    }

    pub fn centroid(&self) -> Vec3 {
        self.shape.centroid()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }

    /// Region a voxel of this location belongs to.
    pub fn region_of(&self, voxel: &Voxel) -> Option<Region> {
        if !self.shape.contains(voxel) {
            None
        } else if self.nucleus.as_ref().is_some_and(|n| n.contains(voxel)) {
            Some(Region::Nucleus)
        } else {
            Some(Region::Default)
        }
    }

    /// Adds a voxel to the cytoplasm.
    pub fn add(&mut self, voxel: Voxel, offsets: &[[i32; 3]]) -> Result<(), PottsError> {
        self.shape.add(voxel, offsets)
    }

    /// Removes a voxel, from the nucleus as well if it belonged there.
    pub fn remove(&mut self, voxel: Voxel, offsets: &[[i32; 3]]) -> Result<(), PottsError> {
        self.shape.remove(voxel, offsets)?;
        if let Some(nucleus) = self.nucleus.as_mut() {
            if nucleus.contains(&voxel) {
                nucleus.remove(voxel, offsets)?;
            }
        }
        Ok(())
    }

    /// Moves an owned voxel between cytoplasm and nucleus.
    pub fn assign_region(&mut self, voxel: Voxel, region: Region, offsets: &[[i32; 3]]) -> Result<(), PottsError> {
        if !self.shape.contains(&voxel) {
            return Err(PottsError::invariant(format!("region change of unowned voxel {:?}", voxel)));
        }
        match region {
            Region::Nucleus => self.nucleus.get_or_insert_with(Shape::default).add(voxel, offsets),
            Region::Default => match self.nucleus.as_mut() {
                Some(nucleus) => nucleus.remove(voxel, offsets),
                None => Err(PottsError::invariant(format!("voxel {:?} is not nuclear", voxel))),
            },
        }
    }

    /// Drops the nucleus; every voxel becomes cytoplasm.
    pub fn clear_nucleus(&mut self) -> Vec<Voxel> {
        self.nucleus
            .take()
            .map(|n| n.voxels().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Grows a connected nucleus of `size` voxels best-first from the voxel nearest the centroid.
    ///
    /// Returns the voxels that became nuclear. At least one cytoplasm voxel is kept.
    pub fn grow_nucleus(&mut self, size: u32, offsets: &[[i32; 3]]) -> Result<Vec<Voxel>, PottsError> {
        self.clear_nucleus();
        let size = size.min(self.volume().saturating_sub(1)) as usize;
        if size == 0 {
            return Ok(Vec::new());
        }
        let center = self.centroid();
        let distance = |v: &Voxel| Vec3::new(v.x as f64, v.y as f64, v.z as f64).distance_squared(center);
        let nearest = |candidates: &BTreeSet<Voxel>| {
            candidates
                .iter()
                .copied()
                .min_by(|a, b| distance(a).total_cmp(&distance(b)).then(a.cmp(b)))
        };

        let mut chosen = BTreeSet::new();
        let mut candidates = BTreeSet::new();
        if let Some(start) = nearest(self.shape.voxels()) {
            candidates.insert(start);
        }
        while chosen.len() < size {
            let Some(next) = nearest(&candidates) else { break };
            candidates.remove(&next);
            chosen.insert(next);
            for d in offsets {
                let n = next.offset(*d);
                if self.shape.contains(&n) && !chosen.contains(&n) {
                    candidates.insert(n);
                }
            }
        }
        self.nucleus = Some(Shape::from_voxels(chosen.iter().copied(), offsets)?);
        Ok(chosen.into_iter().collect())
    }

    /// Rebuilds surface bookkeeping from scratch and compares it with the incremental values.
    pub fn verify(&self, offsets: &[[i32; 3]]) -> Result<(), PottsError> {
        let rebuilt = Shape::from_voxels(self.voxels().iter().copied(), offsets)?;
        if rebuilt != self.shape {
            return Err(PottsError::invariant("incremental geometry drifted from the voxel set"));
        }
        if !is_connected(self.voxels(), offsets) {
            return Err(PottsError::invariant("location is not a single connected component"));
        }
        Ok(())
    }
}

/// Target surface of a compact cell of the given volume and height.
///
/// 3D uses a fitted estimate of a cylinder-like cell; 2D uses the lattice
/// perimeter of a digitized disc. Moore neighborhoods count every extra contact.
pub fn convert_surface(volume: f64, height: f64, is_2d: bool, neighborhood: NeighborhoodKind) -> f64 {
    if volume <= 0.0 {
        return 0.0;
    }
    let scale = match (neighborhood, is_2d) {
        (NeighborhoodKind::VonNeumann, _) => 1.0,
        (NeighborhoodKind::Moore, true) => 2.0,
        (NeighborhoodKind::Moore, false) => 26.0 / 6.0,
    };
    let base = if is_2d {
        (8.0 * (volume / std::f64::consts::PI).sqrt()).ceil()
    } else {
        let vh = volume * height;
        let estimate = 2.0 * volume / height + 2.0 * std::f64::consts::PI.sqrt() * vh.sqrt();
        let correction = SURFACE_FIT_A * vh.powf(SURFACE_FIT_N) + SURFACE_FIT_B;
        (estimate + correction).ceil()
    };
    base * scale
}

/// Direction along which a diameter is measured and across which a cell is cut.
fn split_directions(is_2d: bool) -> Vec<[i32; 3]> {
    let mut directions = vec![[1, 0, 0], [0, 1, 0], [1, 1, 0], [1, -1, 0]];
    if !is_2d {
        directions.extend([[0, 0, 1], [0, 1, 1], [0, 1, -1], [1, 0, 1], [1, 0, -1]]);
    }
    directions
}

/// Diameter (in voxel steps) of the line through `center` along `direction`.
fn diameter(voxels: &BTreeSet<Voxel>, center: Voxel, direction: [i32; 3]) -> i32 {
    let mut low = i32::MAX;
    let mut high = i32::MIN;
    for v in voxels {
        let d = [v.x - center.x, v.y - center.y, v.z - center.z];
        // Integer multiple t of the direction, if the voxel lies on the line.
        let t = direction
            .iter()
            .zip(d.iter())
            .find(|(dir, _)| **dir != 0)
            .map(|(dir, delta)| delta / dir);
        if let Some(t) = t {
            if (0..3).all(|i| direction[i] * t == d[i]) {
                low = low.min(t);
                high = high.max(t);
            }
        }
    }
    if low > high {
        0
    } else {
        high - low + 1
    }
}

/// Divides a location's voxels into two connected, roughly equal halves.
///
/// The cut is perpendicular to the longest diameter through the rounded
/// centroid; voxels on the cutting plane all fall on one side chosen at random.
/// Halves are then reconnected and balanced. Returns `(kept, split_off)`, or
/// `None` for locations too small to divide.
pub fn split_voxels(
    location: &Location,
    offsets: &[[i32; 3]],
    is_2d: bool,
    rng: &mut StdRng,
) -> Option<(BTreeSet<Voxel>, BTreeSet<Voxel>)> {
    let voxels = location.voxels();
    if voxels.len() < 2 {
        return None;
    }
    let c = location.centroid();
    let center = Voxel::new(c.x.round() as i32, c.y.round() as i32, c.z.round() as i32);

    // --- Choose cut direction ---
    let directions = split_directions(is_2d);
    let diameters: Vec<i32> = directions.iter().map(|d| diameter(voxels, center, *d)).collect();
    let longest = diameters.iter().copied().max().unwrap_or(0);
    let candidates: Vec<usize> = (0..directions.len())
        .filter(|&i| longest > 0 && diameters[i] as f64 >= DIAMETER_TOLERANCE * longest as f64)
        .collect();
    let direction = match candidates.len() {
        0 => directions[0],
        n => directions[candidates[rng.random_range(0..n)]],
    };

    // --- Plane bisection ---
    let plane_side = rng.random::<bool>();
    let mut first = BTreeSet::new();
    let mut second = BTreeSet::new();
    for v in voxels {
        let projection = direction[0] * (v.x - center.x) + direction[1] * (v.y - center.y) + direction[2] * (v.z - center.z);
        let in_first = match projection.signum() {
            -1 => true,
            1 => false,
            _ => plane_side,
        };
        if in_first {
            first.insert(*v);
        } else {
            second.insert(*v);
        }
    }

    connect_halves(&mut first, &mut second, offsets);
    connect_halves(&mut second, &mut first, offsets);
    balance_halves(&mut first, &mut second, offsets, rng);

    if first.is_empty() || second.is_empty() {
        return None;
    }
    if rng.random::<bool>() {
        Some((first, second))
    } else {
        Some((second, first))
    }
}

/// Keeps the largest component of `half` and hands the rest to `other`.
fn connect_halves(half: &mut BTreeSet<Voxel>, other: &mut BTreeSet<Voxel>, offsets: &[[i32; 3]]) {
    let mut parts = components(half, offsets);
    if parts.len() <= 1 {
        return;
    }
    let keep = parts.remove(0);
    for part in parts {
        other.extend(part);
    }
    *half = keep;
}

/// Moves boundary voxels from the larger half until sizes differ by at most the balance tolerance.
fn balance_halves(first: &mut BTreeSet<Voxel>, second: &mut BTreeSet<Voxel>, offsets: &[[i32; 3]], rng: &mut StdRng) {
    loop {
        let total = first.len() + second.len();
        let allowed = (total as f64 * BALANCE_DIFFERENCE).ceil() as usize;
        let (large, small) = if first.len() >= second.len() { (&mut *first, &mut *second) } else { (&mut *second, &mut *first) };
        if large.len() - small.len() <= allowed.max(1) {
            return;
        }
        let mut movable: Vec<Voxel> = large
            .iter()
            .copied()
            .filter(|v| small.is_empty() || offsets.iter().any(|d| small.contains(&v.offset(*d))))
            .collect();
        movable.shuffle(rng);
        let choice = movable
            .into_iter()
            .find(|v| removal_keeps_global_connectivity(large, *v, offsets));
        match choice {
            Some(v) => {
                large.remove(&v);
                small.insert(v);
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::neighborhood_offsets;
    use rand::SeedableRng;

    fn von_neumann() -> Vec<[i32; 3]> {
        neighborhood_offsets(NeighborhoodKind::VonNeumann, true)
    }

    fn square(side: i32) -> Vec<Voxel> {
        let mut voxels = Vec::new();
        for x in 0..side {
            for y in 0..side {
                voxels.push(Voxel::new(x, y, 0));
            }
        }
        voxels
    }

    #[test]
    fn incremental_geometry_matches_square() {
        let offsets = von_neumann();
        let location = Location::from_voxels(square(3), &offsets).unwrap();
        assert_eq!(location.volume(), 9);
        assert_eq!(location.surface(), 12);
        assert_eq!(location.height(), 1);
        assert_eq!(location.centroid(), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn remove_and_add_update_surface() {
        let offsets = von_neumann();
        let mut location = Location::from_voxels(square(2), &offsets).unwrap();
        assert_eq!(location.surface(), 8);

        let corner = Voxel::new(1, 1, 0);
        assert_eq!(location.shape().surface_change_on_remove(corner, &offsets), 0);
        location.remove(corner, &offsets).unwrap();
        assert_eq!(location.surface(), 8);
        assert_eq!(location.volume(), 3);

        let outside = Voxel::new(2, 0, 0);
        assert_eq!(location.shape().surface_change_on_add(outside, &offsets), 2);
        location.add(outside, &offsets).unwrap();
        assert_eq!(location.surface(), 10);
        location.verify(&offsets).unwrap();
    }

    #[test]
    fn double_add_is_an_invariant_violation() {
        let offsets = von_neumann();
        let mut location = Location::from_voxels(square(1), &offsets).unwrap();
        assert!(matches!(location.add(Voxel::new(0, 0, 0), &offsets), Err(PottsError::InvariantViolation(_))));
        assert!(location.remove(Voxel::new(4, 4, 0), &offsets).is_err());
    }

    #[test]
    fn height_tracks_layers() {
        let offsets = neighborhood_offsets(NeighborhoodKind::VonNeumann, false);
        let column = [Voxel::new(0, 0, 0), Voxel::new(0, 0, 1), Voxel::new(0, 0, 2), Voxel::new(1, 0, 0)];
        let mut location = Location::from_voxels(column, &offsets).unwrap();
        assert_eq!(location.height(), 3);
        assert_eq!(location.shape().height_with(4), 5);
        assert_eq!(location.shape().height_without(2), 2);
        assert_eq!(location.shape().height_without(0), 3);
        location.remove(Voxel::new(0, 0, 2), &offsets).unwrap();
        assert_eq!(location.height(), 2);
    }

    #[test]
    fn nucleus_grows_from_center_and_stays_connected() {
        let offsets = von_neumann();
        let mut location = Location::from_voxels(square(5), &offsets).unwrap();
        let nuclear = location.grow_nucleus(5, &offsets).unwrap();
        assert_eq!(nuclear.len(), 5);
        assert!(nuclear.contains(&Voxel::new(2, 2, 0)));
        let nucleus = location.nucleus().unwrap();
        assert!(is_connected(nucleus.voxels(), &offsets));
        assert_eq!(location.region_of(&Voxel::new(2, 2, 0)), Some(Region::Nucleus));
        assert_eq!(location.region_of(&Voxel::new(0, 0, 0)), Some(Region::Default));

        // Removing a nuclear voxel shrinks both shapes.
        location.remove(Voxel::new(2, 2, 0), &offsets).unwrap();
        assert_eq!(location.nucleus().unwrap().volume(), 4);
        assert_eq!(location.volume(), 24);
    }

    #[test]
    fn region_assignment_moves_voxels_between_shapes() {
        let offsets = von_neumann();
        let mut location = Location::from_voxels(square(3), &offsets).unwrap();
        location.assign_region(Voxel::new(1, 1, 0), Region::Nucleus, &offsets).unwrap();
        assert_eq!(location.nucleus().unwrap().volume(), 1);
        location.assign_region(Voxel::new(1, 1, 0), Region::Default, &offsets).unwrap();
        assert_eq!(location.nucleus().unwrap().volume(), 0);
        assert!(location.assign_region(Voxel::new(5, 5, 0), Region::Nucleus, &offsets).is_err());
    }

    #[test]
    fn split_produces_balanced_connected_halves() {
        let offsets = von_neumann();
        let mut bar = Vec::new();
        for x in 0..10 {
            for y in 0..4 {
                bar.push(Voxel::new(x, y, 0));
            }
        }
        let location = Location::from_voxels(bar, &offsets).unwrap();
        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (kept, split_off) = split_voxels(&location, &offsets, true, &mut rng).unwrap();
            assert_eq!(kept.len() + split_off.len(), 40);
            assert!(kept.is_disjoint(&split_off));
            assert!(is_connected(&kept, &offsets));
            assert!(is_connected(&split_off, &offsets));
            let difference = kept.len().abs_diff(split_off.len());
            assert!(difference <= 2, "unbalanced split {} vs {}", kept.len(), split_off.len());
        }
    }

    #[test]
    fn single_voxel_cannot_split() {
        let offsets = von_neumann();
        let location = Location::from_voxels(square(1), &offsets).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(split_voxels(&location, &offsets, true, &mut rng).is_none());
    }

    #[test]
    fn surface_targets_grow_with_volume() {
        let small = convert_surface(25.0, 1.0, true, NeighborhoodKind::VonNeumann);
        let large = convert_surface(100.0, 1.0, true, NeighborhoodKind::VonNeumann);
        assert!(small > 0.0 && large > small);
        assert_eq!(convert_surface(0.0, 1.0, true, NeighborhoodKind::VonNeumann), 0.0);
        let moore = convert_surface(25.0, 1.0, true, NeighborhoodKind::Moore);
        assert_eq!(moore, 2.0 * small);
        assert!(convert_surface(100.0, 4.0, false, NeighborhoodKind::VonNeumann) > 0.0);
    }
}
