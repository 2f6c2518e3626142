use crate::species::SpeciesSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnMode {
    /// Uniform position anywhere in the field, random heading.
    Random,
    /// Every agent starts at the field centre.
    Point,
    /// Disk of radius `0.5 * height`, headings pointing at the centre.
    InwardCircle,
    /// Disk of radius `0.15 * height`, random headings.
    #[default]
    RandomCircle,
}

/// What happens to an agent that steps past the field edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMode {
    /// Clamp back inside and reflect the heading across the crossed axis.
    #[default]
    Bounce,
    /// Toroidal wrap for movement and sensing.
    Wrap,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Deterministic seed for species generation and spawning.
    pub seed: u64,
    pub num_agents: usize,
    /// Fixed ceiling the agent store is allocated for at attach time.
    pub agent_capacity: usize,
    /// Species generated on a non-preserving restart.
    pub num_species: usize,
    pub spawn_mode: SpawnMode,
    pub edge_mode: EdgeMode,
    pub force_white_color: bool,
    pub reduce_saturation: bool,
    pub paused: bool,
    pub auto_adjust_steps: bool,
    /// Upper bound for randomly generated species move speed.
    pub max_speed: f32,
    /// Upper bound for randomly generated species turn speed.
    pub max_turn_speed: f32,
    pub preserve_species: bool,
    pub steps_per_frame: u32,
    pub trail_weight: f32,
    pub decay_rate: f32,
    pub diffuse_rate: f32,
    /// Field width override; defaults to the window width.
    pub width: Option<u32>,
    /// Field height override; defaults to the window height.
    pub height: Option<u32>,
    /// Active species table. Generated at attach when empty.
    pub species: Vec<SpeciesSettings>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_agents: 100_000,
            agent_capacity: 1_000_000,
            num_species: 3,
            spawn_mode: SpawnMode::RandomCircle,
            edge_mode: EdgeMode::Bounce,
            force_white_color: false,
            reduce_saturation: true,
            paused: false,
            auto_adjust_steps: true,
            max_speed: 128.0,
            max_turn_speed: 4.0,
            preserve_species: false,
            steps_per_frame: 7,
            trail_weight: 10.0,
            decay_rate: 0.15,
            diffuse_rate: 1.2,
            width: None,
            height: None,
            species: vec![
                SpeciesSettings {
                    move_speed: 14.0,
                    turn_speed: 1.0,
                    sensor_angle_degrees: 30.0,
                    sensor_offset_dst: 24.0,
                    sensor_size: 3.0,
                },
                SpeciesSettings {
                    move_speed: 14.0,
                    turn_speed: 2.0,
                    sensor_angle_degrees: 30.0,
                    sensor_offset_dst: 12.0,
                    sensor_size: 2.0,
                },
                SpeciesSettings {
                    move_speed: 6.0,
                    turn_speed: 4.0,
                    sensor_angle_degrees: 45.0,
                    sensor_offset_dst: 36.0,
                    sensor_size: 4.0,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimConfigError {
    #[error("num_agents must be positive (got {0})")]
    InvalidAgentCount(usize),
    #[error("species count must be within [1, {max}] (got {count})", max = SimConfig::MAX_SPECIES)]
    InvalidSpeciesCount { count: usize },
    #[error(
        "field dimensions must be within [1, {max}] (got {width}x{height})",
        max = SimConfig::MAX_FIELD_DIMENSION
    )]
    InvalidFieldDimensions { width: u32, height: u32 },
    #[error("num_agents ({requested}) exceeds agent store capacity ({capacity})")]
    BufferCapacityExceeded { capacity: usize, requested: usize },
    #[error("steps_per_frame must be within [{min}, {max}] (got {0})", min = SimConfig::MIN_STEPS_PER_FRAME, max = SimConfig::MAX_STEPS_PER_FRAME)]
    InvalidStepsPerFrame(u32),
    #[error("{name} is out of range (got {value})")]
    InvalidParameter { name: &'static str, value: f32 },
    #[error("species {index}: {field} is out of range (got {value})")]
    InvalidSpeciesSettings {
        index: usize,
        field: &'static str,
        value: f32,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
}

fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), SimConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SimConfigError::InvalidParameter { name, value })
    }
}

impl SimConfig {
    pub const MAX_SPECIES: usize = 20;
    pub const MAX_AGENT_CAPACITY: usize = 10_000_000;
    pub const MAX_FIELD_DIMENSION: u32 = 16_384;
    pub const MIN_STEPS_PER_FRAME: u32 = 1;
    pub const MAX_STEPS_PER_FRAME: u32 = 16;
    pub const MAX_TRAIL_WEIGHT: f32 = 15.0;
    pub const MAX_DECAY_RATE: f32 = 4.0;
    pub const MAX_DIFFUSE_RATE: f32 = 2.0;
    pub const MAX_SENSOR_ANGLE_DEGREES: f32 = 90.0;
    pub const MAX_SENSOR_OFFSET: f32 = 36.0;
    pub const MAX_SENSOR_SIZE: f32 = 4.0;

    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SimConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SimConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimConfigError> {
        if self.num_agents == 0 {
            return Err(SimConfigError::InvalidAgentCount(self.num_agents));
        }
        if self.agent_capacity == 0 || self.agent_capacity > Self::MAX_AGENT_CAPACITY {
            return Err(SimConfigError::BufferCapacityExceeded {
                capacity: Self::MAX_AGENT_CAPACITY,
                requested: self.agent_capacity,
            });
        }
        if self.num_agents > self.agent_capacity {
            return Err(SimConfigError::BufferCapacityExceeded {
                capacity: self.agent_capacity,
                requested: self.num_agents,
            });
        }
        if !(1..=Self::MAX_SPECIES).contains(&self.num_species) {
            return Err(SimConfigError::InvalidSpeciesCount {
                count: self.num_species,
            });
        }
        if self.species.len() > Self::MAX_SPECIES {
            return Err(SimConfigError::InvalidSpeciesCount {
                count: self.species.len(),
            });
        }
        // Unset overrides fall back to the window size, checked at attach.
        let (width, height) = self.resolve_dimensions(1, 1);
        Self::validate_dimensions(width, height)?;
        if !(Self::MIN_STEPS_PER_FRAME..=Self::MAX_STEPS_PER_FRAME).contains(&self.steps_per_frame)
        {
            return Err(SimConfigError::InvalidStepsPerFrame(self.steps_per_frame));
        }
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return Err(SimConfigError::InvalidParameter {
                name: "max_speed",
                value: self.max_speed,
            });
        }
        if !(self.max_turn_speed.is_finite() && self.max_turn_speed > 0.0) {
            return Err(SimConfigError::InvalidParameter {
                name: "max_turn_speed",
                value: self.max_turn_speed,
            });
        }
        check_range("trail_weight", self.trail_weight, 0.0, Self::MAX_TRAIL_WEIGHT)?;
        check_range("decay_rate", self.decay_rate, 0.0, Self::MAX_DECAY_RATE)?;
        check_range("diffuse_rate", self.diffuse_rate, 0.0, Self::MAX_DIFFUSE_RATE)?;

        self.validate_species(&self.species)
    }

    /// Range-check a species table against this config's speed limits.
    pub fn validate_species(&self, species: &[SpeciesSettings]) -> Result<(), SimConfigError> {
        for (index, s) in species.iter().enumerate() {
            let fields = [
                ("move_speed", s.move_speed, self.max_speed),
                ("turn_speed", s.turn_speed, self.max_turn_speed),
                (
                    "sensor_angle_degrees",
                    s.sensor_angle_degrees,
                    Self::MAX_SENSOR_ANGLE_DEGREES,
                ),
                ("sensor_offset_dst", s.sensor_offset_dst, Self::MAX_SENSOR_OFFSET),
                ("sensor_size", s.sensor_size, Self::MAX_SENSOR_SIZE),
            ];
            for (field, value, max) in fields {
                if !(value.is_finite() && (0.0..=max).contains(&value)) {
                    return Err(SimConfigError::InvalidSpeciesSettings {
                        index,
                        field,
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn validate_dimensions(width: u32, height: u32) -> Result<(), SimConfigError> {
        let valid = |d: u32| (1..=Self::MAX_FIELD_DIMENSION).contains(&d);
        if valid(width) && valid(height) {
            Ok(())
        } else {
            Err(SimConfigError::InvalidFieldDimensions { width, height })
        }
    }

    /// Field size: configured overrides win over the window size.
    pub fn resolve_dimensions(&self, window_width: u32, window_height: u32) -> (u32, u32) {
        (
            self.width.unwrap_or(window_width),
            self.height.unwrap_or(window_height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SimConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_agents() {
        let config = SimConfig {
            num_agents: 0,
            ..SimConfig::default()
        };
        assert_eq!(config.validate(), Err(SimConfigError::InvalidAgentCount(0)));
    }

    #[test]
    fn rejects_species_count_outside_range() {
        for count in [0, 21] {
            let config = SimConfig {
                num_species: count,
                ..SimConfig::default()
            };
            assert_eq!(
                config.validate(),
                Err(SimConfigError::InvalidSpeciesCount { count })
            );
        }
    }

    #[test]
    fn rejects_zero_width_override() {
        let config = SimConfig {
            width: Some(0),
            height: Some(64),
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimConfigError::InvalidFieldDimensions { width: 0, .. })
        ));
    }

    #[test]
    fn rejects_agents_above_capacity() {
        let config = SimConfig {
            num_agents: 11,
            agent_capacity: 10,
            ..SimConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(SimConfigError::BufferCapacityExceeded {
                capacity: 10,
                requested: 11
            })
        );
    }

    #[test]
    fn rejects_out_of_range_rates() {
        let config = SimConfig {
            decay_rate: 4.5,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimConfigError::InvalidParameter {
                name: "decay_rate",
                ..
            })
        ));
    }

    #[test]
    fn rejects_species_faster_than_max_speed() {
        let mut config = SimConfig::default();
        config.species[1].move_speed = config.max_speed + 1.0;
        assert!(matches!(
            config.validate(),
            Err(SimConfigError::InvalidSpeciesSettings {
                index: 1,
                field: "move_speed",
                ..
            })
        ));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = SimConfig::from_json_str(r#"{"num_agents": 500, "spawn_mode": "inward_circle"}"#)
            .expect("valid json config");
        assert_eq!(config.num_agents, 500);
        assert_eq!(config.spawn_mode, SpawnMode::InwardCircle);
        assert_eq!(config.steps_per_frame, SimConfig::default().steps_per_frame);
        assert_eq!(config.species.len(), 3);
    }

    #[test]
    fn json_parse_errors_are_reported() {
        assert!(matches!(
            SimConfig::from_json_str("{not json"),
            Err(SimConfigError::Parse(_))
        ));
    }

    #[test]
    fn overrides_win_over_window_size() {
        let config = SimConfig {
            width: Some(320),
            ..SimConfig::default()
        };
        assert_eq!(config.resolve_dimensions(1280, 720), (320, 720));
    }
}
