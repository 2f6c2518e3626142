use crate::agent::{normalize_heading, Agent};
use crate::config::{SimConfig, SpawnMode};
use rand::Rng;
use std::f32::consts::TAU;

/// Spawned agents stay this far inside the far field edges.
pub(crate) const EDGE_INSET: f32 = 1e-3;

const INWARD_CIRCLE_RADIUS: f32 = 0.5;
const RANDOM_CIRCLE_RADIUS: f32 = 0.15;

/// Uniform point inside the unit disk (polar sampling).
fn inside_unit_disk<R: Rng + ?Sized>(rng: &mut R) -> [f32; 2] {
    let theta = rng.random::<f32>() * TAU;
    let r = rng.random::<f32>().sqrt();
    [r * theta.cos(), r * theta.sin()]
}

pub(crate) fn clamp_to_field(position: [f32; 2], width: f32, height: f32) -> [f32; 2] {
    [
        position[0].clamp(0.0, width - EDGE_INSET),
        position[1].clamp(0.0, height - EDGE_INSET),
    ]
}

/// Build a fresh population for `config.num_agents` agents.
///
/// `colors` holds one mask per species; agents pick species uniformly from
/// `[0, species_count)` unless `force_white_color` is set, in which case all
/// of them use species 0 with a white mask.
pub fn initialize_agents<R: Rng + ?Sized>(
    config: &SimConfig,
    colors: &[[f32; 4]],
    species_count: usize,
    dimensions: (u32, u32),
    rng: &mut R,
) -> Vec<Agent> {
    debug_assert!(
        config.force_white_color || (species_count > 0 && colors.len() >= species_count),
        "every spawnable species needs a colour"
    );
    let width = dimensions.0 as f32;
    let height = dimensions.1 as f32;
    let centre = [width / 2.0, height / 2.0];

    let mut agents = Vec::with_capacity(config.num_agents);
    for _ in 0..config.num_agents {
        let random_heading = rng.random::<f32>() * TAU;
        let (position, heading) = match config.spawn_mode {
            SpawnMode::Random => (
                [rng.random::<f32>() * width, rng.random::<f32>() * height],
                random_heading,
            ),
            SpawnMode::Point => (centre, random_heading),
            SpawnMode::InwardCircle => {
                let offset = inside_unit_disk(rng);
                let scale = height * INWARD_CIRCLE_RADIUS;
                let position = [centre[0] + offset[0] * scale, centre[1] + offset[1] * scale];
                let to_centre = [centre[0] - position[0], centre[1] - position[1]];
                let heading = if to_centre[0] == 0.0 && to_centre[1] == 0.0 {
                    0.0
                } else {
                    normalize_heading(to_centre[1].atan2(to_centre[0]))
                };
                (position, heading)
            }
            SpawnMode::RandomCircle => {
                let offset = inside_unit_disk(rng);
                let scale = height * RANDOM_CIRCLE_RADIUS;
                (
                    [centre[0] + offset[0] * scale, centre[1] + offset[1] * scale],
                    random_heading,
                )
            }
        };

        let (species, mask) = if config.force_white_color {
            (0, [1.0; 4])
        } else {
            let species = rng.random_range(0..species_count);
            (species, colors[species])
        };
        agents.push(Agent::new(
            heading,
            clamp_to_field(position, width, height),
            species,
            mask,
        ));
    }
    agents
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    const MODES: [SpawnMode; 4] = [
        SpawnMode::Random,
        SpawnMode::Point,
        SpawnMode::InwardCircle,
        SpawnMode::RandomCircle,
    ];

    fn config(mode: SpawnMode, num_agents: usize) -> SimConfig {
        SimConfig {
            num_agents,
            spawn_mode: mode,
            ..SimConfig::default()
        }
    }

    #[test]
    fn every_mode_spawns_inside_the_field() {
        let colors = vec![[0.5, 0.25, 0.1, 1.0]; 3];
        // Portrait and landscape: the inward circle is sized by height.
        for dims in [(200, 100), (100, 200), (1, 1)] {
            for mode in MODES {
                let mut rng = ChaCha12Rng::seed_from_u64(5);
                let agents = initialize_agents(&config(mode, 2_000), &colors, 3, dims, &mut rng);
                assert_eq!(agents.len(), 2_000);
                for a in &agents {
                    assert!(
                        (0.0..dims.0 as f32).contains(&a.position[0])
                            && (0.0..dims.1 as f32).contains(&a.position[1]),
                        "{mode:?} {dims:?}: {:?} out of bounds",
                        a.position
                    );
                    assert!((0.0..TAU).contains(&a.heading));
                }
            }
        }
    }

    #[test]
    fn point_mode_starts_at_centre() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let agents = initialize_agents(&config(SpawnMode::Point, 10), &[[1.0; 4]], 1, (64, 32), &mut rng);
        assert!(agents.iter().all(|a| a.position == [32.0, 16.0]));
    }

    #[test]
    fn inward_circle_headings_point_at_centre() {
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let agents = initialize_agents(
            &config(SpawnMode::InwardCircle, 500),
            &[[1.0; 4]],
            1,
            (400, 400),
            &mut rng,
        );
        for a in agents {
            let to_centre = [200.0 - a.position[0], 200.0 - a.position[1]];
            let len = (to_centre[0].powi(2) + to_centre[1].powi(2)).sqrt();
            if len < 1e-3 {
                continue;
            }
            let dot = (a.heading.cos() * to_centre[0] + a.heading.sin() * to_centre[1]) / len;
            assert!(dot > 0.999, "heading {} does not face centre", a.heading);
        }
    }

    #[test]
    fn random_circle_stays_within_radius() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let agents = initialize_agents(
            &config(SpawnMode::RandomCircle, 1_000),
            &[[1.0; 4]],
            1,
            (1000, 1000),
            &mut rng,
        );
        for a in agents {
            let dx = a.position[0] - 500.0;
            let dy = a.position[1] - 500.0;
            assert!((dx * dx + dy * dy).sqrt() <= 150.0 + 1e-2);
        }
    }

    #[test]
    fn force_white_uses_species_zero() {
        let mut cfg = config(SpawnMode::Random, 100);
        cfg.force_white_color = true;
        let mut rng = ChaCha12Rng::seed_from_u64(4);
        let agents = initialize_agents(&cfg, &[[0.1, 0.2, 0.3, 1.0]; 3], 3, (50, 50), &mut rng);
        assert!(agents
            .iter()
            .all(|a| a.species() == 0 && a.species_mask == [1.0; 4]));
    }

    #[test]
    fn species_masks_match_palette() {
        let colors = [[0.1, 0.0, 0.0, 1.0], [0.0, 0.2, 0.0, 1.0], [0.0, 0.0, 0.3, 1.0]];
        let mut rng = ChaCha12Rng::seed_from_u64(6);
        let agents = initialize_agents(&config(SpawnMode::Random, 300), &colors, 3, (50, 50), &mut rng);
        let mut seen = [false; 3];
        for a in agents {
            assert!(a.species() < 3);
            assert_eq!(a.species_mask, colors[a.species()]);
            seen[a.species()] = true;
        }
        assert!(seen.iter().all(|&s| s), "all species should be drawn");
    }

    #[test]
    fn same_seed_same_population() {
        let colors = vec![[0.3, 0.3, 0.3, 1.0]; 2];
        let run = || {
            let mut rng = ChaCha12Rng::seed_from_u64(77);
            initialize_agents(&config(SpawnMode::RandomCircle, 256), &colors, 2, (128, 96), &mut rng)
        };
        assert_eq!(run(), run());
    }
}
