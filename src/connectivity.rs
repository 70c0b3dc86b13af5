//! Connectivity guards.
//!
//! A voxel may leave a cell only if the cell stays one connected component
//! under the lattice's neighbor relation. The local test floods the 3x3(x3)
//! box around the voxel: if every neighbor that remains in the cell can reach
//! the others without leaving the box, no global path can break either.

use std::collections::{BTreeSet, VecDeque};

use crate::lattice::{Lattice, Voxel};

/// Local test: removing `voxel` keeps the members around it connected.
///
/// `member` decides which voxels belong to the component being guarded.
pub fn removal_keeps_local_connectivity<F>(lattice: &Lattice, voxel: Voxel, member: F) -> bool
where
    F: Fn(Voxel) -> bool,
{
    let offsets = lattice.offsets();
    let links: Vec<Voxel> = offsets
        .iter()
        .map(|d| voxel.offset(*d))
        .filter(|n| member(*n))
        .collect();
    if links.len() <= 1 {
        return true;
    }

    // Flood from the first link through member voxels inside the box.
    let mut seen: Vec<Voxel> = vec![links[0]];
    let mut queue = VecDeque::from([links[0]]);
    while let Some(current) = queue.pop_front() {
        for d in offsets {
            let next = current.offset(*d);
            if next == voxel || next.chebyshev(&voxel) > 1 || seen.contains(&next) || !member(next) {
                continue;
            }
            seen.push(next);
            queue.push_back(next);
        }
    }
    links.iter().all(|l| seen.contains(l))
}

/// Global test: `voxels` minus `removed` is a single component (or empty).
pub fn removal_keeps_global_connectivity(
    voxels: &BTreeSet<Voxel>,
    removed: Voxel,
    offsets: &[[i32; 3]],
) -> bool {
    let start = match voxels.iter().find(|v| **v != removed) {
        Some(v) => *v,
        None => return true,
    };
    let remaining = voxels.len() - usize::from(voxels.contains(&removed));
    let mut seen = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        for d in offsets {
            let next = current.offset(*d);
            if next != removed && voxels.contains(&next) && seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen.len() == remaining
}

/// Splits a voxel set into connected components, largest first.
///
/// Ties in size keep the order of their smallest voxel, so the result is deterministic.
pub fn components(voxels: &BTreeSet<Voxel>, offsets: &[[i32; 3]]) -> Vec<BTreeSet<Voxel>> {
    let mut unvisited = voxels.clone();
    let mut found = Vec::new();
    while let Some(start) = unvisited.pop_first() {
        let mut component = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for d in offsets {
                let next = current.offset(*d);
                if unvisited.remove(&next) {
                    component.insert(next);
                    queue.push_back(next);
                }
            }
        }
        found.push(component);
    }
    found.sort_by(|a, b| b.len().cmp(&a.len()));
    found
}

/// Whether a voxel set forms exactly one component. Empty sets count as connected.
pub fn is_connected(voxels: &BTreeSet<Voxel>, offsets: &[[i32; 3]]) -> bool {
    components(voxels, offsets).len() <= 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::neighborhood_offsets;
    use potts_common::{NeighborhoodKind, Region};

    fn paint(lattice: &mut Lattice, id: u32, voxels: &[(i32, i32)]) {
        for (x, y) in voxels {
            lattice.set_occupant(Voxel::new(*x, *y, 0), id, Some(Region::Default));
        }
    }

    #[test]
    fn bridge_voxel_cannot_be_removed() {
        let mut lattice = Lattice::new(5, 5, 1, NeighborhoodKind::VonNeumann);
        // A horizontal bar: removing the middle splits it.
        paint(&mut lattice, 1, &[(1, 2), (2, 2), (3, 2)]);
        let owned = |v: Voxel| lattice.occupant_at(v) == 1;
        assert!(!removal_keeps_local_connectivity(&lattice, Voxel::new(2, 2, 0), owned));
        assert!(removal_keeps_local_connectivity(&lattice, Voxel::new(1, 2, 0), owned));
    }

    #[test]
    fn corner_of_a_block_can_be_removed() {
        let mut lattice = Lattice::new(5, 5, 1, NeighborhoodKind::VonNeumann);
        paint(&mut lattice, 1, &[(1, 1), (2, 1), (1, 2), (2, 2)]);
        let owned = |v: Voxel| lattice.occupant_at(v) == 1;
        assert!(removal_keeps_local_connectivity(&lattice, Voxel::new(1, 1, 0), owned));
    }

    #[test]
    fn local_check_is_conservative_for_rings() {
        let mut lattice = Lattice::new(6, 6, 1, NeighborhoodKind::VonNeumann);
        // A ring: the two sides of (1,2) reconnect only outside its box.
        let ring = [(1, 1), (2, 1), (3, 1), (3, 2), (3, 3), (2, 3), (1, 3), (1, 2)];
        paint(&mut lattice, 1, &ring);
        let owned = |v: Voxel| lattice.occupant_at(v) == 1;
        let voxel = Voxel::new(1, 2, 0);
        assert!(!removal_keeps_local_connectivity(&lattice, voxel, owned));

        let set: BTreeSet<Voxel> = ring.iter().map(|(x, y)| Voxel::new(*x, *y, 0)).collect();
        assert!(removal_keeps_global_connectivity(&set, voxel, lattice.offsets()));
    }

    #[test]
    fn moore_neighborhood_connects_diagonals() {
        let mut lattice = Lattice::new(5, 5, 1, NeighborhoodKind::Moore);
        paint(&mut lattice, 1, &[(1, 1), (2, 2), (3, 3)]);
        let owned = |v: Voxel| lattice.occupant_at(v) == 1;
        assert!(!removal_keeps_local_connectivity(&lattice, Voxel::new(2, 2, 0), owned));
        assert!(removal_keeps_local_connectivity(&lattice, Voxel::new(3, 3, 0), owned));

        let diagonal: BTreeSet<Voxel> = [(1, 1), (2, 2)].iter().map(|(x, y)| Voxel::new(*x, *y, 0)).collect();
        assert!(is_connected(&diagonal, lattice.offsets()));
        assert!(!is_connected(&diagonal, &neighborhood_offsets(NeighborhoodKind::VonNeumann, true)));
    }

    #[test]
    fn components_are_sorted_by_size() {
        let offsets = neighborhood_offsets(NeighborhoodKind::VonNeumann, true);
        let voxels: BTreeSet<Voxel> = [(0, 0), (5, 5), (5, 6), (6, 6)]
            .iter()
            .map(|(x, y)| Voxel::new(*x, *y, 0))
            .collect();
        let parts = components(&voxels, &offsets);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 3);
        assert!(parts[1].contains(&Voxel::new(0, 0, 0)));
    }
}
