//! Per-cell behavioral state machine.
//!
//! Each phase owns one timer drawn from an exponential waiting time whose rate
//! comes from the population's module parameters. Timers count down once per
//! simulation step; when one expires the transition function inspects the
//! cell's size, age and surroundings and picks the next phase.

use potts_common::{CellState, ModuleParams, Phase};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Exp};

/// Target size (in critical volumes) that growth aims for before division.
pub const DIVISION_SIZE: f64 = 2.0;

/// Volume (in critical volumes) a G1 cell needs to enter S.
pub const G1_CHECKPOINT: f64 = 1.8;

/// Volume (in critical volumes) a G2 cell needs to enter mitosis.
pub const G2_CHECKPOINT: f64 = 1.9;

/// Volume (in critical volumes) a quiescent cell needs to re-enter the cycle.
pub const QUIESCENCE_EXIT: f64 = 0.9;

/// What the engine must do after a module step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleEvent {
    None,
    Divide,
    Remove,
}

/// Everything the transition function may look at.
#[derive(Debug, Clone, Copy)]
pub struct ModuleInput {
    pub volume: f64,
    pub critical_volume: f64,
    pub critical_nucleus_volume: Option<f64>,
    pub age: u32,
    /// Substrate available under the cell.
    pub substrate: f64,
}

/// Size targets a module steers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Targets {
    pub volume: f64,
    pub nucleus_volume: Option<f64>,
}

/// A rate that cannot produce a finite waiting time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingExhausted {
    pub phase: Phase,
    pub rate: f64,
}

impl std::fmt::Display for SamplingExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rate {} of phase {:?} cannot produce a finite timer", self.rate, self.phase)
    }
}

/// Draws a waiting time in whole steps (at least one) from an exponential distribution.
pub fn sample_timer(rate: f64, phase: Phase, rng: &mut StdRng) -> Result<u32, SamplingExhausted> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(SamplingExhausted { phase, rate });
    }
    let exp = Exp::new(rate).map_err(|_| SamplingExhausted { phase, rate })?;
    let wait: f64 = exp.sample(rng);
    if !wait.is_finite() {
        return Err(SamplingExhausted { phase, rate });
    }
    Ok(wait.ceil().clamp(1.0, u32::MAX as f64) as u32)
}

/// Rate of the timer that governs a phase.
fn phase_rate(phase: Phase, params: &ModuleParams) -> f64 {
    match phase {
        Phase::ProliferativeG1 => params.rate_g1,
        Phase::ProliferativeS => params.rate_s,
        Phase::ProliferativeG2 => params.rate_g2,
        Phase::ProliferativeM => params.rate_m,
        Phase::Quiescent => params.rate_quiescence,
        Phase::ApoptoticEarly => params.rate_apoptosis_early,
        Phase::ApoptoticLate => params.rate_apoptosis_late,
        Phase::Necrotic => params.rate_necrosis,
        Phase::Autotic => params.rate_autosis,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    phase: Phase,
    /// Steps left before the current timer expires.
    timer: u32,
    /// Consecutive failed growth checkpoints.
    arrests: u32,
    frozen: bool,
}

impl Module {
    /// Starts a module at the entry phase of `state` with a fresh timer.
    pub fn new(state: CellState, params: &ModuleParams, rng: &mut StdRng) -> Result<Self, SamplingExhausted> {
        let phase = Phase::entry(state);
        let timer = sample_timer(phase_rate(phase, params), phase, rng)?;
        Ok(Module { phase, timer, arrests: 0, frozen: false })
    }

    /// A module that never advances.
    pub fn frozen(state: CellState) -> Self {
        Module { phase: Phase::entry(state), timer: 0, arrests: 0, frozen: true }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> CellState {
        self.phase.state()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Advances one simulation step.
    ///
    /// Growth phases adjust `targets` continuously. On an error the module is
    /// left unchanged so the caller can freeze it.
    pub fn step(
        &mut self,
        targets: &mut Targets,
        input: &ModuleInput,
        params: &ModuleParams,
        rng: &mut StdRng,
    ) -> Result<ModuleEvent, SamplingExhausted> {
        if self.frozen {
            return Ok(ModuleEvent::None);
        }
        if self.state().is_terminal() && input.volume <= 0.0 {
            return Ok(ModuleEvent::Remove);
        }

        // --- Continuous behavior ---
        match self.phase {
            Phase::ProliferativeG1 => {
                if params.basal_apoptosis_rate > 0.0 && rng.random::<f64>() < params.basal_apoptosis_rate {
                    self.enter(Phase::ApoptoticEarly, targets, input, params, rng)?;
                    return Ok(ModuleEvent::None);
                }
                grow(targets, input.critical_volume, params.rate_g1);
            }
            Phase::ProliferativeS => grow_nucleus(targets, input.critical_nucleus_volume, params.rate_s),
            Phase::ProliferativeG2 => grow(targets, input.critical_volume, params.rate_g2),
            _ => {}
        }

        self.timer = self.timer.saturating_sub(1);
        if self.timer > 0 {
            return Ok(ModuleEvent::None);
        }

        // --- Timer expired ---
        let senescent = params.max_age.is_some_and(|max| input.age >= max);
        match self.phase {
            Phase::ProliferativeG1 | Phase::Quiescent if senescent => {
                self.enter(Phase::ApoptoticEarly, targets, input, params, rng)?;
            }
            Phase::ProliferativeG1 => {
                if input.volume >= G1_CHECKPOINT * input.critical_volume {
                    self.arrests = 0;
                    self.enter(Phase::ProliferativeS, targets, input, params, rng)?;
                } else if input.volume < params.contact_inhibition_ratio * targets.volume {
                    self.enter(Phase::Quiescent, targets, input, params, rng)?;
                } else {
                    self.arrest(targets, input, params, rng)?;
                }
            }
            Phase::ProliferativeS => {
                self.enter(Phase::ProliferativeG2, targets, input, params, rng)?;
            }
            Phase::ProliferativeG2 => {
                if input.volume >= G2_CHECKPOINT * input.critical_volume {
                    self.arrests = 0;
                    self.enter(Phase::ProliferativeM, targets, input, params, rng)?;
                } else {
                    self.arrest(targets, input, params, rng)?;
                }
            }
            Phase::ProliferativeM => return Ok(ModuleEvent::Divide),
            Phase::Quiescent => {
                if input.substrate < params.necrosis_threshold {
                    self.enter(Phase::Necrotic, targets, input, params, rng)?;
                } else if input.volume >= QUIESCENCE_EXIT * input.critical_volume {
                    self.enter(Phase::ProliferativeG1, targets, input, params, rng)?;
                } else {
                    self.timer = sample_timer(params.rate_quiescence, self.phase, rng)?;
                }
            }
            Phase::ApoptoticEarly => {
                self.enter(Phase::ApoptoticLate, targets, input, params, rng)?;
            }
            // Removal waits until the lattice has eroded the cell to nothing.
            Phase::ApoptoticLate | Phase::Necrotic | Phase::Autotic => {
                self.timer = sample_timer(phase_rate(self.phase, params), self.phase, rng)?;
            }
        }
        Ok(ModuleEvent::None)
    }

    /// Switches phase, drawing the new timer first so a failed draw leaves the module untouched.
    fn enter(
        &mut self,
        phase: Phase,
        targets: &mut Targets,
        input: &ModuleInput,
        params: &ModuleParams,
        rng: &mut StdRng,
    ) -> Result<(), SamplingExhausted> {
        let timer = sample_timer(phase_rate(phase, params), phase, rng)?;
        let state_changed = phase.state() != self.state();
        self.phase = phase;
        self.timer = timer;
        if state_changed {
            apply_state_targets(phase.state(), targets, input.critical_volume);
        }
        Ok(())
    }

    /// Holds the cell at a failed checkpoint, or sends it into autosis after too many failures.
    fn arrest(
        &mut self,
        targets: &mut Targets,
        input: &ModuleInput,
        params: &ModuleParams,
        rng: &mut StdRng,
    ) -> Result<(), SamplingExhausted> {
        self.arrests += 1;
        if params.max_arrests > 0 && self.arrests >= params.max_arrests {
            return self.enter(Phase::Autotic, targets, input, params, rng);
        }
        self.timer = sample_timer(params.rate_checkpoint, self.phase, rng)?;
        Ok(())
    }
}

/// Raises the target volume toward the division size.
fn grow(targets: &mut Targets, critical_volume: f64, rate: f64) {
    if !rate.is_finite() {
        return;
    }
    let limit = DIVISION_SIZE * critical_volume;
    targets.volume = (targets.volume + critical_volume * rate).min(limit.max(targets.volume));
}

/// Raises the nucleus target toward the division size while DNA is replicated.
fn grow_nucleus(targets: &mut Targets, critical_nucleus_volume: Option<f64>, rate: f64) {
    if !rate.is_finite() {
        return;
    }
    if let (Some(critical), Some(nucleus)) = (critical_nucleus_volume, targets.nucleus_volume.as_mut()) {
        let limit = DIVISION_SIZE * critical;
        *nucleus = (*nucleus + critical * rate).min(limit.max(*nucleus));
    }
}

/// Size targets that come with entering a state.
pub fn apply_state_targets(state: CellState, targets: &mut Targets, critical_volume: f64) {
    match state {
        CellState::Apoptotic | CellState::Necrotic | CellState::Autotic => {
            targets.volume = 0.0;
            if let Some(nucleus) = targets.nucleus_volume.as_mut() {
                *nucleus = 0.0;
            }
        }
        CellState::Quiescent | CellState::Proliferative => {
            targets.volume = critical_volume;
        }
    }
}
