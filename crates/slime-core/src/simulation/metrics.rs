use super::Simulation;
use serde::{Deserialize, Serialize};

/// Wall-clock time spent in each stage, summed over the steps of a frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepTimings {
    pub movement_us: u64,
    pub diffusion_us: u64,
    pub total_us: u64,
}

impl StepTimings {
    fn accumulate(&mut self, other: &StepTimings) {
        self.movement_us += other.movement_us;
        self.diffusion_us += other.diffusion_us;
        self.total_us += other.total_us;
    }
}

/// What a single `tick` did. `steps_run == 0` means the tick was skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub steps_run: u32,
    pub steps_per_frame: u32,
    pub timings: StepTimings,
}

impl FrameReport {
    pub(crate) fn skipped(steps_per_frame: u32) -> Self {
        Self {
            steps_run: 0,
            steps_per_frame,
            timings: StepTimings::default(),
        }
    }

    pub(crate) fn record_step(&mut self, timings: &StepTimings) {
        self.steps_run += 1;
        self.timings.accumulate(timings);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct FrameMetrics {
    pub frame: u64,
    pub steps_per_frame: u32,
    pub agent_count: usize,
    /// Per-channel sum over the whole field.
    pub trail_total: [f64; 4],
    pub trail_max: [f32; 4],
    /// Fraction of cells with any non-zero channel.
    pub coverage: f32,
}

fn default_schema_version() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub frames: usize,
    pub sample_every: usize,
    pub delta_seconds: f32,
    pub total_steps: u64,
    pub final_steps_per_frame: u32,
    pub samples: Vec<FrameMetrics>,
    #[serde(default)]
    pub restarts: usize,
}

impl Simulation {
    /// Snapshot of the current field. Empty metrics while detached.
    pub fn collect_frame_metrics(&self) -> FrameMetrics {
        let Some(runtime) = self.runtime.as_ref() else {
            return FrameMetrics {
                frame: self.frame_index,
                steps_per_frame: self.steps_per_frame,
                ..FrameMetrics::default()
            };
        };

        let cells = runtime.trail.current();
        let mut trail_total = [0.0f64; 4];
        let mut trail_max = [0.0f32; 4];
        let mut covered = 0usize;
        for cell in cells {
            for channel in 0..4 {
                trail_total[channel] += cell[channel] as f64;
                trail_max[channel] = trail_max[channel].max(cell[channel]);
            }
            if cell.iter().any(|&v| v > 0.0) {
                covered += 1;
            }
        }

        FrameMetrics {
            frame: self.frame_index,
            steps_per_frame: self.steps_per_frame,
            agent_count: runtime.agents.len(),
            trail_total,
            trail_max,
            coverage: covered as f32 / cells.len().max(1) as f32,
        }
    }
}
