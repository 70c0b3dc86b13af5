use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::sim_params::{
    rate_from_duration, ModuleParams, NucleusParams, PopulationParams, SimParams, SubstrateParams,
};
use crate::states::CellState;

/// Key used in adhesion tables for contact with the medium.
pub const MEDIUM_KEY: &str = "medium";

/// Voxel neighborhood used for candidate owners, surfaces, contacts and connectivity.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NeighborhoodKind {
    /// Face neighbors: 4 in 2D, 6 in 3D.
    #[default]
    VonNeumann,
    /// Face, edge and corner neighbors: 8 in 2D, 26 in 3D.
    Moore,
}

/// How the engine proves that removing a voxel keeps its owner connected.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityCheck {
    /// Flood fill restricted to the 3x3(x3) box around the voxel.
    #[default]
    Local,
    /// Flood fill over the whole location.
    Global,
}

/// Order in which flip attempts are drawn and committed.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpdateScheme {
    /// One attempt at a time, single RNG stream.
    #[default]
    Sequential,
    /// Color classes of non-interacting voxels evaluated in parallel.
    Checkerboard,
}

/// Hamiltonian contributions that can be switched on by name.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    Adhesion,
    Volume,
    Surface,
    Height,
    Persistence,
    Junction,
    Substrate,
}

// Configuration for the lattice geometry
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LatticeConfig {
    pub length: u32,
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub neighborhood: NeighborhoodKind,
    #[serde(default)]
    pub connectivity: ConnectivityCheck,
}

// Configuration for the Monte Carlo engine
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PottsConfig {
    pub temperature: f64,
    /// Flip attempts per step, as a multiple of the occupied volume.
    #[serde(default = "default_mcs")]
    pub mcs: f64,
    pub seed: u64,
    #[serde(default)]
    pub update_scheme: UpdateScheme,
    #[serde(default = "default_terms")]
    pub terms: Vec<TermKind>,
    /// Re-verify every location after each step. Slow.
    #[serde(default)]
    pub check_invariants: bool,
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub total_steps: u32,
    #[serde(default = "default_record_interval")]
    pub record_interval_steps: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SubstrateConfig {
    #[serde(default = "default_concentration")]
    pub concentration: f64,
    #[serde(default)]
    pub gradient_x: f64,
    #[serde(default = "default_height_threshold")]
    pub height_threshold: f64,
    #[serde(default = "default_threshold_fraction")]
    pub threshold_fraction: f64,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        SubstrateConfig {
            concentration: default_concentration(),
            gradient_x: 0.0,
            height_threshold: default_height_threshold(),
            threshold_fraction: default_threshold_fraction(),
        }
    }
}

/// Weights of the Hamiltonian terms for one population. Unset weights are zero.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct LambdaConfig {
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub surface: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub persistence: f64,
    #[serde(default)]
    pub junction: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct NucleusConfig {
    pub critical_volume: f64,
    #[serde(default)]
    pub lambda_volume: f64,
    #[serde(default)]
    pub lambda_surface: f64,
    #[serde(default)]
    pub adhesion: f64,
}

/// Mean durations (in steps) and thresholds of the behavioral module.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModuleConfig {
    #[serde(default = "default_duration_g1")]
    pub duration_g1: f64,
    #[serde(default = "default_duration_s")]
    pub duration_s: f64,
    #[serde(default = "default_duration_g2")]
    pub duration_g2: f64,
    #[serde(default = "default_duration_m")]
    pub duration_m: f64,
    #[serde(default = "default_duration_checkpoint")]
    pub duration_checkpoint: f64,
    #[serde(default)]
    pub basal_apoptosis_rate: f64,
    #[serde(default = "default_duration_quiescence")]
    pub duration_quiescence: f64,
    #[serde(default = "default_duration_apoptosis_early")]
    pub duration_apoptosis_early: f64,
    #[serde(default = "default_duration_apoptosis_late")]
    pub duration_apoptosis_late: f64,
    #[serde(default = "default_duration_necrosis")]
    pub duration_necrosis: f64,
    #[serde(default = "default_duration_autosis")]
    pub duration_autosis: f64,
    #[serde(default = "default_contact_inhibition_ratio")]
    pub contact_inhibition_ratio: f64,
    #[serde(default)]
    pub necrosis_threshold: f64,
    #[serde(default)]
    pub max_arrests: u32,
    #[serde(default)]
    pub max_age: Option<u32>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        ModuleConfig {
            duration_g1: default_duration_g1(),
            duration_s: default_duration_s(),
            duration_g2: default_duration_g2(),
            duration_m: default_duration_m(),
            duration_checkpoint: default_duration_checkpoint(),
            basal_apoptosis_rate: 0.0,
            duration_quiescence: default_duration_quiescence(),
            duration_apoptosis_early: default_duration_apoptosis_early(),
            duration_apoptosis_late: default_duration_apoptosis_late(),
            duration_necrosis: default_duration_necrosis(),
            duration_autosis: default_duration_autosis(),
            contact_inhibition_ratio: default_contact_inhibition_ratio(),
            necrosis_threshold: 0.0,
            max_arrests: 0,
            max_age: None,
        }
    }
}

// One cell population (cell type)
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PopulationConfig {
    pub name: String,
    pub critical_volume: f64,
    #[serde(default = "default_critical_height")]
    pub critical_height: f64,
    #[serde(default)]
    pub initial_state: CellState,
    #[serde(default)]
    pub lambdas: LambdaConfig,
    /// Contact energies keyed by `"medium"` or a population name.
    #[serde(default)]
    pub adhesion: BTreeMap<String, f64>,
    #[serde(default = "default_persistence_decay")]
    pub persistence_decay: f64,
    #[serde(default)]
    pub substrate_adhesion: f64,
    #[serde(default)]
    pub nucleus: Option<NucleusConfig>,
    #[serde(default)]
    pub module: ModuleConfig,
}

/// Geometry of an explicitly placed seed cell.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeedShape {
    /// Inclusive axis-aligned box.
    Box { min: [u32; 3], max: [u32; 3] },
    /// Voxels whose centers lie within `radius` of `center`.
    Sphere { center: [u32; 3], radius: f64 },
    Voxels { voxels: Vec<[u32; 3]> },
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SeedConfig {
    pub population: String,
    pub shape: SeedShape,
    /// Defaults to the population's critical volume.
    #[serde(default)]
    pub target_volume: Option<f64>,
    /// Defaults to the population's initial state.
    #[serde(default)]
    pub state: Option<CellState>,
}

/// Randomly scattered round seeds, placed by jittered grid sampling.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RandomSeedingConfig {
    pub population: String,
    pub count: u32,
    pub radius: f64,
    #[serde(default)]
    pub target_volume: Option<f64>,
}

// Initial conditions for the simulation, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct InitialConditions {
    #[serde(default)]
    pub cells: Vec<SeedConfig>,
    #[serde(default)]
    pub random: Option<RandomSeedingConfig>,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_stats: bool,
    #[serde(default = "default_true")]
    pub save_final_cells: bool,
    /// Include the full id lattice in every recorded snapshot.
    #[serde(default = "default_true")]
    pub save_lattice_in_snapshot: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: "potts".to_string(),
            save_stats: true,
            save_final_cells: true,
            save_lattice_in_snapshot: true,
            format: None,
        }
    }
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub lattice: LatticeConfig,
    pub potts: PottsConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub substrate: SubstrateConfig,
    pub populations: Vec<PopulationConfig>,
    #[serde(default)]
    pub initial_conditions: InitialConditions,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks coefficients and dimensions for consistency.
    pub fn validate(&self) -> Result<()> {
        // --- Lattice ---
        let lattice = &self.lattice;
        if lattice.length == 0 || lattice.width == 0 || lattice.height == 0 {
            anyhow::bail!(
                "lattice dimensions must be positive, got {}x{}x{}",
                lattice.length, lattice.width, lattice.height
            );
        }

        // --- Engine ---
        let potts = &self.potts;
        if !potts.temperature.is_finite() || potts.temperature < 0.0 {
            anyhow::bail!("temperature must be finite and non-negative, got {}", potts.temperature);
        }
        if !potts.mcs.is_finite() || potts.mcs < 0.0 {
            anyhow::bail!("mcs must be finite and non-negative, got {}", potts.mcs);
        }
        let mut seen_terms = HashSet::new();
        for term in &potts.terms {
            if !seen_terms.insert(*term) {
                anyhow::bail!("Hamiltonian term {:?} listed twice", term);
            }
        }

        // --- Substrate ---
        let substrate = &self.substrate;
        check_non_negative("substrate.concentration", substrate.concentration)?;
        check_finite("substrate.gradient_x", substrate.gradient_x)?;
        check_non_negative("substrate.height_threshold", substrate.height_threshold)?;
        if !(substrate.threshold_fraction > 0.0 && substrate.threshold_fraction <= 1.0) {
            anyhow::bail!("substrate.threshold_fraction must lie in (0, 1]");
        }

        // --- Populations ---
        if self.populations.is_empty() {
            anyhow::bail!("at least one population must be configured");
        }
        let mut names = HashSet::new();
        for population in &self.populations {
            if population.name == MEDIUM_KEY {
                anyhow::bail!("'{}' is reserved and cannot name a population", MEDIUM_KEY);
            }
            if !names.insert(population.name.as_str()) {
                anyhow::bail!("duplicate population name '{}'", population.name);
            }
        }
        for population in &self.populations {
            let name = &population.name;
            if !(population.critical_volume.is_finite() && population.critical_volume > 0.0) {
                anyhow::bail!("population '{}': critical_volume must be positive", name);
            }
            if !(population.critical_height.is_finite() && population.critical_height > 0.0) {
                anyhow::bail!("population '{}': critical_height must be positive", name);
            }
            let lambdas = &population.lambdas;
            for (label, value) in [
                ("lambdas.volume", lambdas.volume),
                ("lambdas.surface", lambdas.surface),
                ("lambdas.height", lambdas.height),
                ("lambdas.persistence", lambdas.persistence),
                ("lambdas.junction", lambdas.junction),
                ("substrate_adhesion", population.substrate_adhesion),
            ] {
                check_non_negative(&format!("population '{}': {}", name, label), value)?;
            }
            if !(0.0..=1.0).contains(&population.persistence_decay) {
                anyhow::bail!("population '{}': persistence_decay must lie in [0, 1]", name);
            }
            for (key, value) in &population.adhesion {
                if key != MEDIUM_KEY && !names.contains(key.as_str()) {
                    anyhow::bail!("population '{}': adhesion refers to unknown population '{}'", name, key);
                }
                check_finite(&format!("population '{}': adhesion.{}", name, key), *value)?;
            }
            if let Some(nucleus) = &population.nucleus {
                if !(nucleus.critical_volume > 0.0 && nucleus.critical_volume < population.critical_volume) {
                    anyhow::bail!(
                        "population '{}': nucleus critical_volume must be positive and below the cell's",
                        name
                    );
                }
                check_non_negative(&format!("population '{}': nucleus.lambda_volume", name), nucleus.lambda_volume)?;
                check_non_negative(&format!("population '{}': nucleus.lambda_surface", name), nucleus.lambda_surface)?;
                check_finite(&format!("population '{}': nucleus.adhesion", name), nucleus.adhesion)?;
            }
            let module = &population.module;
            for (label, value) in [
                ("duration_g1", module.duration_g1),
                ("duration_s", module.duration_s),
                ("duration_g2", module.duration_g2),
                ("duration_m", module.duration_m),
                ("duration_checkpoint", module.duration_checkpoint),
                ("duration_quiescence", module.duration_quiescence),
                ("duration_apoptosis_early", module.duration_apoptosis_early),
                ("duration_apoptosis_late", module.duration_apoptosis_late),
                ("duration_necrosis", module.duration_necrosis),
                ("duration_autosis", module.duration_autosis),
            ] {
                // Infinite durations are allowed here and surface as sampling exhaustion.
                if value.is_nan() || value < 0.0 {
                    anyhow::bail!("population '{}': module.{} must be non-negative", name, label);
                }
            }
            if !(0.0..=1.0).contains(&module.basal_apoptosis_rate) {
                anyhow::bail!("population '{}': module.basal_apoptosis_rate must lie in [0, 1]", name);
            }
            check_non_negative(&format!("population '{}': module.contact_inhibition_ratio", name), module.contact_inhibition_ratio)?;
            check_non_negative(&format!("population '{}': module.necrosis_threshold", name), module.necrosis_threshold)?;
        }

        // --- Seeds ---
        for seed in &self.initial_conditions.cells {
            if !names.contains(seed.population.as_str()) {
                anyhow::bail!("seed refers to unknown population '{}'", seed.population);
            }
            if let Some(target) = seed.target_volume {
                check_non_negative("seed target_volume", target)?;
            }
        }
        if let Some(random) = &self.initial_conditions.random {
            if !names.contains(random.population.as_str()) {
                anyhow::bail!("random seeding refers to unknown population '{}'", random.population);
            }
            if !(random.radius.is_finite() && random.radius > 0.0) {
                anyhow::bail!("random seeding radius must be positive");
            }
        }

        Ok(())
    }

    pub fn is_2d(&self) -> bool {
        self.lattice.height == 1
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let populations: Vec<PopulationParams> = self
            .populations
            .iter()
            .map(|population| PopulationParams {
                name: population.name.clone(),
                initial_state: population.initial_state,
                critical_volume: population.critical_volume,
                critical_height: population.critical_height,
                lambda_volume: population.lambdas.volume,
                lambda_surface: population.lambdas.surface,
                lambda_height: population.lambdas.height,
                lambda_persistence: population.lambdas.persistence,
                persistence_decay: population.persistence_decay,
                lambda_junction: population.lambdas.junction,
                substrate_adhesion: population.substrate_adhesion,
                nucleus: population.nucleus.as_ref().map(|nucleus| NucleusParams {
                    critical_volume: nucleus.critical_volume,
                    lambda_volume: nucleus.lambda_volume,
                    lambda_surface: nucleus.lambda_surface,
                    adhesion: nucleus.adhesion,
                }),
                module: module_params(&population.module),
            })
            .collect();

        SimParams {
            // Lattice
            length: self.lattice.length as usize,
            width: self.lattice.width as usize,
            height: self.lattice.height as usize,
            is_2d: self.is_2d(),
            neighborhood: self.lattice.neighborhood,
            connectivity: self.lattice.connectivity,
            // Engine
            temperature: self.potts.temperature,
            mcs: self.potts.mcs,
            seed: self.potts.seed,
            update_scheme: self.potts.update_scheme,
            check_invariants: self.potts.check_invariants,
            terms: self.potts.terms.clone(),
            // Populations
            adhesion: self.adhesion_matrix(),
            populations,
            substrate: SubstrateParams {
                concentration: self.substrate.concentration,
                gradient_x: self.substrate.gradient_x,
                height_threshold: self.substrate.height_threshold,
                threshold_fraction: self.substrate.threshold_fraction,
            },
        }
    }

    /// Builds the symmetric contact-energy matrix with the medium at index 0.
    ///
    /// Cell-cell energies average both populations' entries; cell-medium
    /// energies come from the cell's own `"medium"` entry.
    fn adhesion_matrix(&self) -> Vec<Vec<f64>> {
        let n = self.populations.len();
        let mut matrix = vec![vec![0.0; n + 1]; n + 1];
        let lookup = |population: &PopulationConfig, key: &str| population.adhesion.get(key).copied().unwrap_or(0.0);

        for (i, a) in self.populations.iter().enumerate() {
            let medium = lookup(a, MEDIUM_KEY);
            matrix[i + 1][0] = medium;
            matrix[0][i + 1] = medium;
            for (j, b) in self.populations.iter().enumerate() {
                matrix[i + 1][j + 1] = (lookup(a, &b.name) + lookup(b, &a.name)) / 2.0;
            }
        }
        matrix
    }
}

fn module_params(module: &ModuleConfig) -> ModuleParams {
    ModuleParams {
        rate_g1: rate_from_duration(module.duration_g1),
        rate_s: rate_from_duration(module.duration_s),
        rate_g2: rate_from_duration(module.duration_g2),
        rate_m: rate_from_duration(module.duration_m),
        rate_checkpoint: rate_from_duration(module.duration_checkpoint),
        basal_apoptosis_rate: module.basal_apoptosis_rate,
        rate_quiescence: rate_from_duration(module.duration_quiescence),
        rate_apoptosis_early: rate_from_duration(module.duration_apoptosis_early),
        rate_apoptosis_late: rate_from_duration(module.duration_apoptosis_late),
        rate_necrosis: rate_from_duration(module.duration_necrosis),
        rate_autosis: rate_from_duration(module.duration_autosis),
        contact_inhibition_ratio: module.contact_inhibition_ratio,
        necrosis_threshold: module.necrosis_threshold,
        max_arrests: module.max_arrests,
        max_age: module.max_age,
    }
}

fn check_finite(label: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        anyhow::bail!("{} must be finite, got {}", label, value);
    }
    Ok(())
}

fn check_non_negative(label: &str, value: f64) -> Result<()> {
    check_finite(label, value)?;
    if value < 0.0 {
        anyhow::bail!("{} must be non-negative, got {}", label, value);
    }
    Ok(())
}

// Default functions for optional fields
fn default_height() -> u32 {
    1
}

fn default_mcs() -> f64 {
    1.0
}

fn default_terms() -> Vec<TermKind> {
    vec![TermKind::Adhesion, TermKind::Volume, TermKind::Surface]
}

fn default_record_interval() -> u32 {
    10
}

fn default_concentration() -> f64 {
    1.0
}

fn default_height_threshold() -> f64 {
    3.0
}

fn default_threshold_fraction() -> f64 {
    0.01
}

fn default_critical_height() -> f64 {
    1.0
}

fn default_persistence_decay() -> f64 {
    0.1
}

fn default_true() -> bool {
    true
}

fn default_duration_g1() -> f64 {
    16.0
}

fn default_duration_s() -> f64 {
    8.0
}

fn default_duration_g2() -> f64 {
    4.0
}

fn default_duration_m() -> f64 {
    2.0
}

fn default_duration_checkpoint() -> f64 {
    4.0
}

fn default_duration_quiescence() -> f64 {
    20.0
}

fn default_duration_apoptosis_early() -> f64 {
    6.0
}

fn default_duration_apoptosis_late() -> f64 {
    60.0
}

fn default_duration_necrosis() -> f64 {
    60.0
}

fn default_duration_autosis() -> f64 {
    60.0
}

fn default_contact_inhibition_ratio() -> f64 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [lattice]
        length = 20
        width = 20

        [potts]
        temperature = 10.0
        seed = 7

        [timing]
        total_steps = 5

        [[populations]]
        name = "epithelial"
        critical_volume = 25.0
        [populations.lambdas]
        volume = 5.0
        surface = 1.0
        [populations.adhesion]
        medium = 12.0
        epithelial = 4.0
        stromal = 8.0

        [[populations]]
        name = "stromal"
        critical_volume = 16.0
        [populations.adhesion]
        medium = 6.0
        epithelial = 2.0

        [[initial_conditions.cells]]
        population = "epithelial"
        shape = { kind = "box", min = [2, 2, 0], max = [6, 6, 0] }
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = SimulationConfig::from_toml_str(MINIMAL).unwrap();
        assert!(config.is_2d());
        assert_eq!(config.lattice.neighborhood, NeighborhoodKind::VonNeumann);
        assert_eq!(config.lattice.connectivity, ConnectivityCheck::Local);
        assert_eq!(config.potts.mcs, 1.0);
        assert_eq!(config.potts.terms, default_terms());
        assert_eq!(config.output.base_filename, "potts");
        assert_eq!(config.populations[1].initial_state, CellState::Proliferative);
        assert_eq!(
            config.initial_conditions.cells[0].shape,
            SeedShape::Box { min: [2, 2, 0], max: [6, 6, 0] }
        );
    }

    #[test]
    fn adhesion_matrix_is_symmetric_with_medium_first() {
        let params = SimulationConfig::from_toml_str(MINIMAL).unwrap().get_sim_params();
        assert_eq!(params.adhesion_between(None, None), 0.0);
        assert_eq!(params.adhesion_between(Some(0), None), 12.0);
        assert_eq!(params.adhesion_between(None, Some(1)), 6.0);
        assert_eq!(params.adhesion_between(Some(0), Some(0)), 4.0);
        assert_eq!(params.adhesion_between(Some(0), Some(1)), 5.0);
        assert_eq!(params.adhesion_between(Some(1), Some(0)), 5.0);
        assert_eq!(params.population_index("stromal"), Some(1));
        assert!(!params.uses_regions());
    }

    #[test]
    fn module_durations_become_rates() {
        let params = SimulationConfig::from_toml_str(MINIMAL).unwrap().get_sim_params();
        let module = &params.population(0).module;
        assert_eq!(module.rate_g1, 1.0 / default_duration_g1());
        assert_eq!(module.rate_m, 1.0 / default_duration_m());
    }

    #[test]
    fn rejects_unknown_adhesion_partner() {
        let broken = MINIMAL.replace("stromal = 8.0", "fibroblast = 8.0");
        let err = SimulationConfig::from_toml_str(&broken).unwrap_err();
        assert!(err.to_string().contains("fibroblast"));
    }

    #[test]
    fn rejects_unknown_term_and_bad_dimensions() {
        let unknown_term = MINIMAL.replace("seed = 7", "seed = 7\nterms = [\"gravity\"]");
        assert!(SimulationConfig::from_toml_str(&unknown_term).is_err());

        let flat = MINIMAL.replace("width = 20", "width = 0");
        assert!(SimulationConfig::from_toml_str(&flat).is_err());

        let cold = MINIMAL.replace("temperature = 10.0", "temperature = -1.0");
        assert!(SimulationConfig::from_toml_str(&cold).is_err());
    }

    #[test]
    fn rejects_duplicate_populations_and_oversized_nucleus() {
        let duplicate = MINIMAL.replace("name = \"stromal\"", "name = \"epithelial\"");
        assert!(SimulationConfig::from_toml_str(&duplicate).is_err());

        let nucleus = format!(
            "{}\n[populations.nucleus]\ncritical_volume = 40.0\n",
            MINIMAL.split("[[initial_conditions.cells]]").next().unwrap()
        );
        assert!(SimulationConfig::from_toml_str(&nucleus).is_err());
    }

    #[test]
    fn seeds_must_name_known_populations() {
        let broken = MINIMAL.replace("population = \"epithelial\"", "population = \"ghost\"");
        assert!(SimulationConfig::from_toml_str(&broken).is_err());
    }
}
