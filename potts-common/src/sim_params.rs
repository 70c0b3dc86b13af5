use serde::{Deserialize, Serialize};

use crate::config::{ConnectivityCheck, NeighborhoodKind, TermKind, UpdateScheme};
use crate::states::CellState;

/// Simulation parameters derived from the configuration, used during every Monte Carlo step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Lattice
    pub length: usize,
    pub width: usize,
    pub height: usize,
    pub is_2d: bool,
    pub neighborhood: NeighborhoodKind,
    pub connectivity: ConnectivityCheck,

    // Potts engine
    pub temperature: f64,
    pub mcs: f64,
    pub seed: u64,
    pub update_scheme: UpdateScheme,
    pub check_invariants: bool,
    /// Hamiltonian terms in summation order.
    pub terms: Vec<TermKind>,

    // Populations
    pub populations: Vec<PopulationParams>,
    /// Symmetric contact energies. Index 0 is the medium, index `p + 1` is population `p`.
    pub adhesion: Vec<Vec<f64>>,
    pub substrate: SubstrateParams,
}

impl SimParams {
    /// Contact energy between two owner types; `None` is the medium.
    pub fn adhesion_between(&self, a: Option<usize>, b: Option<usize>) -> f64 {
        let ia = a.map_or(0, |p| p + 1);
        let ib = b.map_or(0, |p| p + 1);
        self.adhesion[ia][ib]
    }

    /// Looks up a population index by name.
    pub fn population_index(&self, name: &str) -> Option<usize> {
        self.populations.iter().position(|p| p.name == name)
    }

    pub fn population(&self, index: usize) -> &PopulationParams {
        &self.populations[index]
    }

    pub fn uses_regions(&self) -> bool {
        self.populations.iter().any(|p| p.nucleus.is_some())
    }
}

/// Per-population coefficients of the Hamiltonian and the behavioral module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationParams {
    pub name: String,
    pub initial_state: CellState,
    pub critical_volume: f64,
    pub critical_height: f64,

    pub lambda_volume: f64,
    pub lambda_surface: f64,
    pub lambda_height: f64,
    pub lambda_persistence: f64,
    pub persistence_decay: f64,
    pub lambda_junction: f64,
    pub substrate_adhesion: f64,

    pub nucleus: Option<NucleusParams>,
    pub module: ModuleParams,
}

/// Coefficients of the optional nuclear region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NucleusParams {
    pub critical_volume: f64,
    pub lambda_volume: f64,
    pub lambda_surface: f64,
    /// Contact energy between nucleus and cytoplasm of the same cell.
    pub adhesion: f64,
}

/// Transition rates (per simulation step) of the behavioral module.
///
/// Rates come from mean durations, so an infinite duration is a zero rate and
/// a zero duration an infinite one; neither can produce a finite timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleParams {
    pub rate_g1: f64,
    pub rate_s: f64,
    pub rate_g2: f64,
    pub rate_m: f64,
    pub rate_checkpoint: f64,
    /// Per-step probability of leaving G1 for apoptosis.
    pub basal_apoptosis_rate: f64,
    pub rate_quiescence: f64,
    pub rate_apoptosis_early: f64,
    pub rate_apoptosis_late: f64,
    pub rate_necrosis: f64,
    pub rate_autosis: f64,
    /// G1 cells below this fraction of their target volume become quiescent.
    pub contact_inhibition_ratio: f64,
    /// Quiescent cells seeing less substrate than this become necrotic.
    pub necrosis_threshold: f64,
    /// Consecutive failed checkpoints before autosis; 0 disables it.
    pub max_arrests: u32,
    /// Age (in steps) after which the next expired timer triggers apoptosis.
    pub max_age: Option<u32>,
}

/// Substrate field lying under the bottom lattice layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstrateParams {
    pub concentration: f64,
    pub gradient_x: f64,
    /// Height at which the substrate contact has decayed to `threshold_fraction`.
    pub height_threshold: f64,
    pub threshold_fraction: f64,
}

impl SubstrateParams {
    /// Substrate concentration at lattice column `x`, never negative.
    pub fn concentration_at(&self, x: i64) -> f64 {
        (self.concentration + self.gradient_x * x as f64).max(0.0)
    }

    /// Attenuation of substrate contact with height above the bottom layer.
    pub fn height_factor(&self, z: i64) -> f64 {
        if z <= 0 {
            return 1.0;
        }
        if self.height_threshold <= 0.0 {
            return 0.0;
        }
        (self.threshold_fraction.ln() * z as f64 / self.height_threshold).exp()
    }
}

/// Converts a duration into a per-step rate.
pub fn rate_from_duration(duration: f64) -> f64 {
    if duration.is_infinite() {
        0.0
    } else if duration <= 0.0 {
        f64::INFINITY
    } else {
        1.0 / duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_convert_to_rates() {
        assert_eq!(rate_from_duration(4.0), 0.25);
        assert_eq!(rate_from_duration(f64::INFINITY), 0.0);
        assert!(rate_from_duration(0.0).is_infinite());
    }

    #[test]
    fn substrate_decays_to_threshold_fraction() {
        let substrate = SubstrateParams {
            concentration: 1.0,
            gradient_x: -0.1,
            height_threshold: 4.0,
            threshold_fraction: 0.01,
        };
        assert_eq!(substrate.height_factor(0), 1.0);
        assert!((substrate.height_factor(4) - 0.01).abs() < 1e-12);
        assert!((substrate.concentration_at(5) - 0.5).abs() < 1e-12);
        assert_eq!(substrate.concentration_at(20), 0.0);
    }
}
