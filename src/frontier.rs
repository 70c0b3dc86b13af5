use std::cmp::max;

use crate::lattice::{Lattice, Voxel};

const ABSENT: usize = usize::MAX;

/// Indexed set of interface voxels, the only voxels where a flip can change anything.
///
/// Add and remove are O(1) through swap-remove; sampling picks a slot uniformly.
#[derive(Debug, Clone)]
pub struct Frontier {
    members: Vec<usize>,
    slot_of: Box<[usize]>,
}

impl Frontier {
    pub fn new(lattice_size: usize) -> Self {
        let initial_capacity = max(lattice_size / 10, 128);
        Self {
            members: Vec::with_capacity(initial_capacity),
            slot_of: vec![ABSENT; lattice_size].into_boxed_slice(),
        }
    }

    /// Builds the frontier of an existing lattice.
    pub fn from_lattice(lattice: &Lattice) -> Self {
        let mut frontier = Frontier::new(lattice.size());
        for index in 0..lattice.size() {
            if lattice.is_interface(lattice.voxel_at(index)) {
                frontier.insert(index);
            }
        }
        frontier
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.slot_of[index] != ABSENT
    }

    /// Lattice index stored at a slot.
    #[inline]
    pub fn get(&self, slot: usize) -> usize {
        self.members[slot]
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied()
    }

    #[inline]
    pub fn insert(&mut self, index: usize) {
        if self.slot_of[index] != ABSENT {
            return;
        }
        self.slot_of[index] = self.members.len();
        self.members.push(index);
    }

    #[inline]
    pub fn remove(&mut self, index: usize) {
        let slot = self.slot_of[index];
        if slot == ABSENT {
            return;
        }
        self.slot_of[index] = ABSENT;
        if let Some(last) = self.members.pop() {
            if slot != self.members.len() {
                self.members[slot] = last;
                self.slot_of[last] = slot;
            }
        }
    }

    /// Re-evaluates a voxel and its neighbors after it changed owner or region.
    pub fn refresh_around(&mut self, lattice: &Lattice, voxel: Voxel) {
        self.refresh(lattice, voxel);
        for neighbor in lattice.neighbors_of(voxel) {
            self.refresh(lattice, neighbor);
        }
    }

    fn refresh(&mut self, lattice: &Lattice, voxel: Voxel) {
        if let Some(index) = lattice.index_of(voxel) {
            if lattice.is_interface(voxel) {
                self.insert(index);
            } else {
                self.remove(index);
            }
        }
    }
}
