//! Agent-based slime mould simulation on a double-buffered trail field.

pub mod agent;
pub mod config;
pub mod simulation;
pub mod spawn;
pub mod species;
pub mod trail;

pub use agent::{Agent, AgentStore};
pub use config::{EdgeMode, SimConfig, SimConfigError, SpawnMode};
pub use simulation::{ExperimentError, FrameReport, RunSummary, Simulation, SimulationState};
pub use species::SpeciesSettings;
pub use trail::TrailField;
