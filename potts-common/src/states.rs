use serde::{Deserialize, Serialize};

/// Behavioral state of a cell.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Proliferative,
    Quiescent,
    Apoptotic,
    Necrotic,
    Autotic,
}

impl CellState {
    /// Terminal states shrink the cell away and never leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, CellState::Apoptotic | CellState::Necrotic | CellState::Autotic)
    }

    pub fn name(self) -> &'static str {
        match self {
            CellState::Proliferative => "proliferative",
            CellState::Quiescent => "quiescent",
            CellState::Apoptotic => "apoptotic",
            CellState::Necrotic => "necrotic",
            CellState::Autotic => "autotic",
        }
    }
}

impl Default for CellState {
    fn default() -> Self {
        CellState::Proliferative
    }
}

/// Phase of the behavioral module inside a state.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Gap 1, growing toward the first size checkpoint.
    ProliferativeG1,
    /// DNA synthesis.
    ProliferativeS,
    /// Gap 2, growing toward the division size.
    ProliferativeG2,
    /// Mitosis, ends with division.
    ProliferativeM,
    Quiescent,
    ApoptoticEarly,
    ApoptoticLate,
    Necrotic,
    Autotic,
}

impl Phase {
    /// The state a phase belongs to.
    pub fn state(self) -> CellState {
        match self {
            Phase::ProliferativeG1
            | Phase::ProliferativeS
            | Phase::ProliferativeG2
            | Phase::ProliferativeM => CellState::Proliferative,
            Phase::Quiescent => CellState::Quiescent,
            Phase::ApoptoticEarly | Phase::ApoptoticLate => CellState::Apoptotic,
            Phase::Necrotic => CellState::Necrotic,
            Phase::Autotic => CellState::Autotic,
        }
    }

    /// Entry phase of a state.
    pub fn entry(state: CellState) -> Self {
        match state {
            CellState::Proliferative => Phase::ProliferativeG1,
            CellState::Quiescent => Phase::Quiescent,
            CellState::Apoptotic => Phase::ApoptoticEarly,
            CellState::Necrotic => Phase::Necrotic,
            CellState::Autotic => Phase::Autotic,
        }
    }
}

/// Sub-cellular region tag of an occupied voxel.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// Cytoplasm.
    Default,
    Nucleus,
}
