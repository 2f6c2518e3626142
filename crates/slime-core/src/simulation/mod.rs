mod diffusion;
pub mod metrics;
mod movement;

pub use metrics::*;
pub use movement::{mask_direction, species_affinity, FOREIGN_TRAIL_PENALTY};

use crate::agent::{Agent, AgentStore};
use crate::config::{EdgeMode, SimConfig, SimConfigError};
use crate::spawn::initialize_agents;
use crate::species::{random_colors, random_table, SpeciesSettings};
use crate::trail::TrailField;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Frames slower than this drop one step per frame.
pub const SLOW_FRAME_SECONDS: f32 = 1.0 / 20.0;
/// Frames faster than this gain one step per frame.
pub const FAST_FRAME_SECONDS: f32 = 1.0 / 75.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationState {
    Uninitialized,
    Running,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExperimentError {
    #[error("simulation is not attached")]
    NotAttached,
    #[error("sample_every must be positive")]
    InvalidSampleEvery,
    #[error("restart_every must be positive")]
    InvalidRestartEvery,
    #[error("delta_seconds must be finite and positive (got {0})")]
    InvalidDeltaSeconds(f32),
    #[error("frames ({actual}) exceed supported maximum ({max})")]
    TooManyFrames { max: usize, actual: usize },
    #[error(transparent)]
    Config(#[from] SimConfigError),
}

/// Immutable per-step inputs shared by both stages.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StepParams {
    pub delta_seconds: f32,
    pub trail_weight: f32,
    pub decay_rate: f32,
    pub diffuse_rate: f32,
    pub edge_mode: EdgeMode,
    pub width: usize,
    pub height: usize,
}

impl StepParams {
    fn new(config: &SimConfig, trail: &TrailField, delta_seconds: f32) -> Self {
        Self {
            delta_seconds,
            trail_weight: config.trail_weight,
            decay_rate: config.decay_rate,
            diffuse_rate: config.diffuse_rate,
            edge_mode: config.edge_mode,
            width: trail.width(),
            height: trail.height(),
        }
    }
}

/// Everything that exists only between attach and detach.
#[derive(Debug)]
struct RuntimeState {
    agents: AgentStore,
    trail: TrailField,
    species: Vec<SpeciesSettings>,
    colors: Vec<[f32; 4]>,
    /// Window size seen at attach; field dimensions fall back to it.
    window: (u32, u32),
}

impl RuntimeState {
    fn step_movement_phase(&mut self, params: &StepParams) {
        let (view, deposits) = self.trail.sensing_view();
        movement::run(
            self.agents.as_mut_slice(),
            &self.species,
            view,
            deposits,
            params,
        );
        self.trail.commit_deposits();
    }

    fn step_diffusion_phase(&mut self, params: &StepParams) {
        let (src, dst) = self.trail.split_for_diffusion();
        diffusion::run(src, dst, params);
        self.trail.swap();
    }

    fn step(&mut self, params: &StepParams) -> StepTimings {
        let total_start = Instant::now();

        let t0 = Instant::now();
        self.step_movement_phase(params);
        let movement_us = t0.elapsed().as_micros() as u64;

        let t1 = Instant::now();
        self.step_diffusion_phase(params);
        let diffusion_us = t1.elapsed().as_micros() as u64;

        StepTimings {
            movement_us,
            diffusion_us,
            total_us: total_start.elapsed().as_micros() as u64,
        }
    }
}

pub struct Simulation {
    config: SimConfig,
    state: SimulationState,
    runtime: Option<RuntimeState>,
    rng: ChaCha12Rng,
    steps_per_frame: u32,
    frame_index: u64,
    step_index: u64,
    restarts: usize,
}

impl Simulation {
    pub const MAX_RUN_FRAMES: usize = 1_000_000;

    pub fn new(config: SimConfig) -> Self {
        Self::try_new(config).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(config: SimConfig) -> Result<Self, SimConfigError> {
        config.validate()?;
        Ok(Self {
            rng: ChaCha12Rng::seed_from_u64(config.seed),
            steps_per_frame: config.steps_per_frame,
            config,
            state: SimulationState::Uninitialized,
            runtime: None,
            frame_index: 0,
            step_index: 0,
            restarts: 0,
        })
    }

    /// Allocate storage for a `window_width x window_height` surface and
    /// spawn the first population. Re-attaching drops the previous run.
    pub fn attach(&mut self, window_width: u32, window_height: u32) -> Result<(), SimConfigError> {
        let (width, height) = self.config.resolve_dimensions(window_width, window_height);
        SimConfig::validate_dimensions(width, height)?;
        if self.runtime.is_some() {
            warn!("attach called while attached; dropping previous run");
            self.detach();
        }

        self.rng = ChaCha12Rng::seed_from_u64(self.config.seed);
        let species = if self.config.species.is_empty() {
            random_table(
                &mut self.rng,
                self.config.num_species,
                self.config.max_speed,
                self.config.max_turn_speed,
            )
        } else {
            self.config.species.clone()
        };
        let colors = random_colors(&mut self.rng, species.len(), self.config.reduce_saturation);
        let mut agents = AgentStore::with_capacity(self.config.agent_capacity);
        agents.replace(initialize_agents(
            &self.config,
            &colors,
            species.len(),
            (width, height),
            &mut self.rng,
        ))?;

        info!(
            width,
            height,
            agents = agents.len(),
            species = species.len(),
            spawn_mode = ?self.config.spawn_mode,
            "simulation attached"
        );
        self.config.species = species.clone();
        self.runtime = Some(RuntimeState {
            agents,
            trail: TrailField::new(width as usize, height as usize),
            species,
            colors,
            window: (window_width, window_height),
        });
        self.steps_per_frame = self.config.steps_per_frame;
        self.frame_index = 0;
        self.step_index = 0;
        self.restarts = 0;
        self.state = self.resting_state();
        Ok(())
    }

    /// Release agents and trail buffers.
    pub fn detach(&mut self) {
        if self.runtime.take().is_some() {
            info!(frames = self.frame_index, steps = self.step_index, "simulation detached");
        }
        self.state = SimulationState::Uninitialized;
    }

    /// Advance one frame. Skipped (with `steps_run == 0`) while paused or
    /// detached, and for a non-finite or non-positive delta.
    pub fn tick(&mut self, delta_seconds: f32) -> FrameReport {
        if self.state != SimulationState::Running {
            return FrameReport::skipped(self.steps_per_frame);
        }
        if !(delta_seconds.is_finite() && delta_seconds > 0.0) {
            warn!(delta_seconds, "ignoring tick with invalid frame delta");
            return FrameReport::skipped(self.steps_per_frame);
        }
        if self.config.auto_adjust_steps {
            self.adjust_steps_per_frame(delta_seconds);
        }
        let Some(runtime) = self.runtime.as_mut() else {
            return FrameReport::skipped(self.steps_per_frame);
        };

        let params = StepParams::new(&self.config, &runtime.trail, delta_seconds);
        let mut report = FrameReport::skipped(self.steps_per_frame);
        for _ in 0..self.steps_per_frame {
            report.record_step(&runtime.step(&params));
        }
        self.frame_index += 1;
        self.step_index += u64::from(report.steps_run);
        report
    }

    fn adjust_steps_per_frame(&mut self, delta_seconds: f32) {
        let previous = self.steps_per_frame;
        let adjusted = if delta_seconds > SLOW_FRAME_SECONDS {
            previous.saturating_sub(1)
        } else if delta_seconds < FAST_FRAME_SECONDS {
            previous + 1
        } else {
            previous
        };
        self.steps_per_frame =
            adjusted.clamp(SimConfig::MIN_STEPS_PER_FRAME, SimConfig::MAX_STEPS_PER_FRAME);
        if self.steps_per_frame != previous {
            debug!(
                delta_seconds,
                from = previous,
                to = self.steps_per_frame,
                "adjusted steps per frame"
            );
        }
    }

    /// Re-spawn the population into a cleared field.
    ///
    /// Unless `preserve_species` is set the species table and colours are
    /// regenerated first; either way `config().species` ends up holding the
    /// live table. The trail buffers are reused when the field size is
    /// unchanged. Nothing changes if the new population does not fit the
    /// allocated store.
    pub fn restart(&mut self) -> Result<(), SimConfigError> {
        let Some(runtime) = self.runtime.as_mut() else {
            warn!("restart ignored: simulation is not attached");
            return Ok(());
        };
        let (width, height) = self
            .config
            .resolve_dimensions(runtime.window.0, runtime.window.1);
        SimConfig::validate_dimensions(width, height)?;

        let (species, colors) = if self.config.preserve_species {
            (runtime.species.clone(), runtime.colors.clone())
        } else {
            let species = random_table(
                &mut self.rng,
                self.config.num_species,
                self.config.max_speed,
                self.config.max_turn_speed,
            );
            let colors =
                random_colors(&mut self.rng, species.len(), self.config.reduce_saturation);
            (species, colors)
        };
        runtime.agents.replace(initialize_agents(
            &self.config,
            &colors,
            species.len(),
            (width, height),
            &mut self.rng,
        ))?;
        self.config.species = species.clone();
        runtime.species = species;
        runtime.colors = colors;
        if (runtime.trail.width(), runtime.trail.height()) == (width as usize, height as usize) {
            runtime.trail.clear();
        } else {
            runtime.trail = TrailField::new(width as usize, height as usize);
        }

        self.restarts += 1;
        info!(
            width,
            height,
            agents = runtime.agents.len(),
            species = runtime.species.len(),
            preserve_species = self.config.preserve_species,
            "simulation restarted"
        );
        self.state = self.resting_state();
        Ok(())
    }

    fn check_config(&self, config: &SimConfig) -> Result<(), SimConfigError> {
        config.validate()?;
        let Some(runtime) = self.runtime.as_ref() else {
            return Ok(());
        };
        if config.num_agents > runtime.agents.capacity() {
            return Err(SimConfigError::BufferCapacityExceeded {
                capacity: runtime.agents.capacity(),
                requested: config.num_agents,
            });
        }
        if config.species.is_empty() {
            // The live table stays; it must still fit the new speed limits.
            config.validate_species(&runtime.species)?;
        } else if config.species.len() != runtime.species.len() {
            // Live agents index the current table; its length cannot change mid-run.
            return Err(SimConfigError::InvalidSpeciesCount {
                count: config.species.len(),
            });
        }
        let (width, height) = config.resolve_dimensions(runtime.window.0, runtime.window.1);
        SimConfig::validate_dimensions(width, height)
    }

    /// Replace the configuration.
    ///
    /// Trail, steps-per-frame, species and pause settings apply at once;
    /// agent count, spawn mode and field size apply on the next restart.
    /// An empty species table keeps the live one. A rejected config leaves
    /// the simulation untouched.
    pub fn apply_config(&mut self, mut config: SimConfig) -> Result<(), SimConfigError> {
        if let Err(err) = self.check_config(&config) {
            warn!(error = %err, "rejected configuration");
            return Err(err);
        }
        if config.steps_per_frame != self.config.steps_per_frame {
            self.steps_per_frame = config.steps_per_frame;
        }
        if let Some(runtime) = self.runtime.as_mut() {
            if config.species.is_empty() {
                config.species = runtime.species.clone();
            } else {
                runtime.species = config.species.clone();
            }
        }
        self.config = config;
        if self.state != SimulationState::Uninitialized {
            self.state = self.resting_state();
        }
        debug!("configuration applied");
        Ok(())
    }

    pub fn pause(&mut self) {
        self.config.paused = true;
        if self.state == SimulationState::Running {
            self.state = SimulationState::Paused;
        }
    }

    pub fn resume(&mut self) {
        self.config.paused = false;
        if self.state == SimulationState::Paused {
            self.state = SimulationState::Running;
        }
    }

    fn resting_state(&self) -> SimulationState {
        if self.config.paused {
            SimulationState::Paused
        } else {
            SimulationState::Running
        }
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Active species table; empty while detached.
    pub fn species(&self) -> &[SpeciesSettings] {
        self.runtime
            .as_ref()
            .map(|r| r.species.as_slice())
            .unwrap_or(&[])
    }

    pub fn species_colors(&self) -> &[[f32; 4]] {
        self.runtime
            .as_ref()
            .map(|r| r.colors.as_slice())
            .unwrap_or(&[])
    }

    pub fn agents(&self) -> &[Agent] {
        self.runtime
            .as_ref()
            .map(|r| r.agents.as_slice())
            .unwrap_or(&[])
    }

    /// The field to present. `None` while detached.
    pub fn trail(&self) -> Option<&TrailField> {
        self.runtime.as_ref().map(|r| &r.trail)
    }

    pub fn steps_per_frame(&self) -> u32 {
        self.steps_per_frame
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    /// Drive `frames` ticks at a fixed frame delta and sample metrics.
    pub fn run_frames(
        &mut self,
        frames: usize,
        delta_seconds: f32,
        sample_every: usize,
    ) -> Result<RunSummary, ExperimentError> {
        self.run_frames_with_restarts(frames, delta_seconds, sample_every, None)
    }

    /// Like `run_frames`, restarting after every `restart_every` frames.
    pub fn run_frames_with_restarts(
        &mut self,
        frames: usize,
        delta_seconds: f32,
        sample_every: usize,
        restart_every: Option<usize>,
    ) -> Result<RunSummary, ExperimentError> {
        if self.runtime.is_none() {
            return Err(ExperimentError::NotAttached);
        }
        if sample_every == 0 {
            return Err(ExperimentError::InvalidSampleEvery);
        }
        if restart_every == Some(0) {
            return Err(ExperimentError::InvalidRestartEvery);
        }
        if !(delta_seconds.is_finite() && delta_seconds > 0.0) {
            return Err(ExperimentError::InvalidDeltaSeconds(delta_seconds));
        }
        if frames > Self::MAX_RUN_FRAMES {
            return Err(ExperimentError::TooManyFrames {
                max: Self::MAX_RUN_FRAMES,
                actual: frames,
            });
        }

        let steps_before = self.step_index;
        let restarts_before = self.restarts;
        let estimated_samples = if frames == 0 {
            0
        } else {
            ((frames - 1) / sample_every) + 1
        };
        let mut samples = Vec::with_capacity(estimated_samples);
        for frame in 1..=frames {
            self.tick(delta_seconds);
            if frame % sample_every == 0 || frame == frames {
                samples.push(self.collect_frame_metrics());
            }
            if let Some(every) = restart_every {
                if frame % every == 0 && frame < frames {
                    self.restart()?;
                }
            }
        }
        Ok(RunSummary {
            schema_version: 1,
            frames,
            sample_every,
            delta_seconds,
            total_steps: self.step_index - steps_before,
            final_steps_per_frame: self.steps_per_frame,
            samples,
            restarts: self.restarts - restarts_before,
        })
    }
}
