use std::collections::BTreeMap;

use crate::cell::Cell;
use crate::lattice::{CellId, BACKGROUND};

/// All living cells, keyed by id. Iteration is in ascending id order.
#[derive(Debug, Clone)]
pub struct Population {
    cells: BTreeMap<CellId, Cell>,
    next_id: CellId,
}

impl Default for Population {
    fn default() -> Self {
        Population { cells: BTreeMap::new(), next_id: BACKGROUND + 1 }
    }
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a fresh id. Ids are never reused within a run.
    pub fn allocate_id(&mut self) -> CellId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, cell: Cell) {
        self.next_id = self.next_id.max(cell.id + 1);
        self.cells.insert(cell.id, cell);
    }

    pub fn remove(&mut self, id: CellId) -> Option<Cell> {
        self.cells.remove(&id)
    }

    #[inline]
    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<CellId> {
        self.cells.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Population index of an owner; `None` for background or unknown ids.
    #[inline]
    pub fn population_of(&self, id: CellId) -> Option<usize> {
        self.cells.get(&id).map(|c| c.population)
    }

    /// Sum of all location volumes.
    pub fn total_volume(&self) -> u64 {
        self.cells.values().map(|c| c.location.volume() as u64).sum()
    }
}
