use rand::Rng;
use serde::{Deserialize, Serialize};

/// Per-species movement and sensing parameters, addressed by species index.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct SpeciesSettings {
    pub move_speed: f32,
    pub turn_speed: f32,
    pub sensor_angle_degrees: f32,
    pub sensor_offset_dst: f32,
    /// Sensor radius in grid cells.
    pub sensor_size: f32,
}

impl SpeciesSettings {
    /// Draw one species within the random-restart bounds.
    ///
    /// Speeds are continuous in `[0, max)`; the sensor geometry is drawn as
    /// whole numbers: angle in `[1, 89]`, offset in `[0, 36]`, size in `[1, 4]`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, max_speed: f32, max_turn_speed: f32) -> Self {
        Self {
            move_speed: rng.random::<f32>() * max_speed,
            turn_speed: rng.random::<f32>() * max_turn_speed,
            sensor_angle_degrees: rng.random_range(0..90u32).max(1) as f32,
            sensor_offset_dst: rng.random_range(0..37u32) as f32,
            sensor_size: rng.random_range(0..5u32).max(1) as f32,
        }
    }

    pub fn sensor_angle_radians(&self) -> f32 {
        self.sensor_angle_degrees.to_radians()
    }
}

pub fn random_table<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    max_speed: f32,
    max_turn_speed: f32,
) -> Vec<SpeciesSettings> {
    (0..count)
        .map(|_| SpeciesSettings::random(rng, max_speed, max_turn_speed))
        .collect()
}

/// One RGBA colour per species; alpha is always 1.
///
/// Halving the channels (`reduce_saturation`) keeps overlapping trails of
/// different species from summing to white.
pub fn random_colors<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    reduce_saturation: bool,
) -> Vec<[f32; 4]> {
    let scale = if reduce_saturation { 0.5 } else { 1.0 };
    (0..count)
        .map(|_| {
            [
                rng.random::<f32>() * scale,
                rng.random::<f32>() * scale,
                rng.random::<f32>() * scale,
                1.0,
            ]
        })
        .collect()
}
