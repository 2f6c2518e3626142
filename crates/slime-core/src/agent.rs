use crate::config::SimConfigError;
use std::f32::consts::TAU;

/// Wrap an angle into `[0, 2π)`.
pub(crate) fn normalize_heading(heading: f32) -> f32 {
    let wrapped = heading.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// One simulated particle. Layout matches the 32-byte GPU agent record.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Agent {
    /// Radians, normalised to `[0, 2π)` after every step.
    pub heading: f32,
    /// Integer species id stored as f32 for a uniform record layout.
    pub species_index: f32,
    pub position: [f32; 2],
    pub species_mask: [f32; 4],
}

impl Agent {
    pub fn new(heading: f32, position: [f32; 2], species_index: usize, species_mask: [f32; 4]) -> Self {
        Self {
            heading,
            species_index: species_index as f32,
            position,
            species_mask,
        }
    }

    pub fn species(&self) -> usize {
        self.species_index as usize
    }
}

/// Flat agent storage with a capacity ceiling fixed at allocation.
#[derive(Clone, Debug)]
pub struct AgentStore {
    agents: Vec<Agent>,
    capacity: usize,
}

impl AgentStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            agents: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Replace the whole population. Nothing is touched on error.
    pub fn replace(&mut self, agents: Vec<Agent>) -> Result<(), SimConfigError> {
        if agents.len() > self.capacity {
            return Err(SimConfigError::BufferCapacityExceeded {
                capacity: self.capacity,
                requested: agents.len(),
            });
        }
        self.agents.clear();
        self.agents.extend_from_slice(&agents);
        Ok(())
    }

    pub fn as_slice(&self) -> &[Agent] {
        &self.agents
    }

    pub fn as_mut_slice(&mut self) -> &mut [Agent] {
        &mut self.agents
    }
}
