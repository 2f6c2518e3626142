//! Movement & sensing stage: one parallel task per agent.
//!
//! Agents sense the trail snapshot as it was before this step, steer, move,
//! handle the field edge and deposit into the shared accumulator. An agent
//! only ever writes its own record, so processing order is unobservable.

use super::StepParams;
use crate::agent::{normalize_heading, Agent};
use crate::config::EdgeMode;
use crate::spawn::{clamp_to_field, EDGE_INSET};
use crate::species::SpeciesSettings;
use crate::trail::{Cell, DepositAccumulator, TrailView};
use rayon::prelude::*;
use std::f32::consts::PI;

/// Weight of foreign-hued trail against own-hued trail when sensing.
pub const FOREIGN_TRAIL_PENALTY: f32 = 1.0;

const INV_SQRT_3: f32 = 0.577_350_26;

/// Unit RGB direction of a species mask; white for a (near) black mask.
pub fn mask_direction(mask: &[f32; 4]) -> [f32; 3] {
    let norm = (mask[0] * mask[0] + mask[1] * mask[1] + mask[2] * mask[2]).sqrt();
    if norm > 1e-6 {
        [mask[0] / norm, mask[1] / norm, mask[2] / norm]
    } else {
        [INV_SQRT_3; 3]
    }
}

/// How attractive a cell is to an agent whose hue is `direction`.
///
/// The trail colour is split into the component along the agent's own hue
/// and the remainder; the remainder is foreign trail and counts against.
pub fn species_affinity(cell: &Cell, direction: &[f32; 3]) -> f32 {
    let own = cell[0] * direction[0] + cell[1] * direction[1] + cell[2] * direction[2];
    let foreign = [
        cell[0] - own * direction[0],
        cell[1] - own * direction[1],
        cell[2] - own * direction[2],
    ];
    let foreign_len =
        (foreign[0] * foreign[0] + foreign[1] * foreign[1] + foreign[2] * foreign[2]).sqrt();
    own - FOREIGN_TRAIL_PENALTY * foreign_len
}

/// Mean affinity over the square of radius `sensor_size` around the sensor.
fn sense(
    trail: &TrailView<'_>,
    edge_mode: EdgeMode,
    agent: &Agent,
    direction: &[f32; 3],
    sensor_angle: f32,
    species: &SpeciesSettings,
) -> f32 {
    let sensor_x = agent.position[0] + sensor_angle.cos() * species.sensor_offset_dst;
    let sensor_y = agent.position[1] + sensor_angle.sin() * species.sensor_offset_dst;
    let cx = sensor_x.floor() as i64;
    let cy = sensor_y.floor() as i64;
    let radius = species.sensor_size.max(0.0) as i64;

    let mut sum = 0.0f32;
    let mut count = 0u32;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let cell = match edge_mode {
                EdgeMode::Bounce => trail.get(cx + dx, cy + dy),
                EdgeMode::Wrap => Some(trail.get_wrapped(cx + dx, cy + dy)),
            };
            if let Some(cell) = cell {
                sum += species_affinity(cell, direction);
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Signed heading change from the three sensor readings.
///
/// Forward wins ties; equal side readings above forward are a tie too and
/// leave the heading alone.
fn steering(forward: f32, left: f32, right: f32, max_turn: f32) -> f32 {
    if forward >= left && forward >= right {
        0.0
    } else if left > right {
        max_turn
    } else if right > left {
        -max_turn
    } else {
        0.0
    }
}

/// Move one agent and return its new position and heading.
pub(crate) fn advance_agent(
    agent: &Agent,
    species: &SpeciesSettings,
    trail: &TrailView<'_>,
    params: &StepParams,
) -> ([f32; 2], f32) {
    let dt = params.delta_seconds;
    let direction = mask_direction(&agent.species_mask);
    let sensor_angle = species.sensor_angle_radians();

    let forward = sense(trail, params.edge_mode, agent, &direction, agent.heading, species);
    let left = sense(
        trail,
        params.edge_mode,
        agent,
        &direction,
        agent.heading + sensor_angle,
        species,
    );
    let right = sense(
        trail,
        params.edge_mode,
        agent,
        &direction,
        agent.heading - sensor_angle,
        species,
    );
    let max_turn = (species.turn_speed * dt).min(sensor_angle);
    let mut heading = agent.heading + steering(forward, left, right, max_turn);

    let distance = species.move_speed * dt;
    let mut position = [
        agent.position[0] + heading.cos() * distance,
        agent.position[1] + heading.sin() * distance,
    ];

    let width = params.width as f32;
    let height = params.height as f32;
    match params.edge_mode {
        EdgeMode::Bounce => {
            if position[0] < 0.0 || position[0] > width - EDGE_INSET {
                heading = PI - heading;
            }
            if position[1] < 0.0 || position[1] > height - EDGE_INSET {
                heading = -heading;
            }
            position = clamp_to_field(position, width, height);
        }
        EdgeMode::Wrap => {
            position = [wrap_coord(position[0], width), wrap_coord(position[1], height)];
        }
    }
    (position, normalize_heading(heading))
}

fn wrap_coord(value: f32, extent: f32) -> f32 {
    let wrapped = value.rem_euclid(extent);
    if wrapped >= extent {
        0.0
    } else {
        wrapped
    }
}

/// Run the stage for every agent. Deposits land in `deposits`, not in the
/// snapshot being sensed.
pub(crate) fn run(
    agents: &mut [Agent],
    species: &[SpeciesSettings],
    trail: TrailView<'_>,
    deposits: &DepositAccumulator,
    params: &StepParams,
) {
    let deposit_scale = params.trail_weight * params.delta_seconds;
    agents.par_iter_mut().for_each(|agent| {
        debug_assert!(
            agent.species() < species.len(),
            "agent species index must address the species table"
        );
        let settings = &species[agent.species()];
        let (position, heading) = advance_agent(agent, settings, &trail, params);
        agent.position = position;
        agent.heading = heading;

        let mask = agent.species_mask;
        deposits.add(
            trail.cell_index_at(position),
            [
                mask[0] * deposit_scale,
                mask[1] * deposit_scale,
                mask[2] * deposit_scale,
                mask[3] * deposit_scale,
            ],
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trail::TrailField;

    fn params(width: usize, height: usize, dt: f32) -> StepParams {
        StepParams {
            delta_seconds: dt,
            trail_weight: 1.0,
            decay_rate: 0.0,
            diffuse_rate: 0.0,
            edge_mode: EdgeMode::Bounce,
            width,
            height,
        }
    }

    fn species(move_speed: f32, turn_speed: f32) -> SpeciesSettings {
        SpeciesSettings {
            move_speed,
            turn_speed,
            sensor_angle_degrees: 45.0,
            sensor_offset_dst: 5.0,
            sensor_size: 1.0,
        }
    }

    #[test]
    fn own_trail_attracts_and_foreign_trail_repels() {
        let red = mask_direction(&[0.5, 0.0, 0.0, 1.0]);
        assert!(species_affinity(&[2.0, 0.0, 0.0, 2.0], &red) > 0.0);
        assert!(species_affinity(&[0.0, 2.0, 0.0, 2.0], &red) < 0.0);
        assert_eq!(species_affinity(&[0.0; 4], &red), 0.0);
    }

    #[test]
    fn black_mask_senses_as_white() {
        let white = mask_direction(&[0.0, 0.0, 0.0, 1.0]);
        assert!(species_affinity(&[1.0, 1.0, 1.0, 1.0], &white) > 1.7);
    }

    #[test]
    fn steering_prefers_forward_and_breaks_ties_straight() {
        assert_eq!(steering(1.0, 1.0, 1.0, 0.5), 0.0);
        assert_eq!(steering(2.0, 1.0, 1.5, 0.5), 0.0);
        assert_eq!(steering(0.0, 1.0, 0.5, 0.5), 0.5);
        assert_eq!(steering(0.0, 0.5, 1.0, 0.5), -0.5);
        assert_eq!(steering(0.0, 1.0, 1.0, 0.5), 0.0);
    }

    #[test]
    fn agent_turns_toward_stronger_left_trail() {
        let field = TrailField::new(64, 64);
        let mut cells = field.current().to_vec();
        // Left sensor of an agent at (32, 32) heading +x sits near (35.5, 35.5).
        for y in 34..=37 {
            for x in 34..=37 {
                cells[y * 64 + x] = [1.0, 1.0, 1.0, 1.0];
            }
        }
        let view = TrailView {
            cells: &cells,
            width: 64,
            height: 64,
        };
        let agent = Agent::new(0.0, [32.0, 32.0], 0, [1.0; 4]);
        let (_, heading) = advance_agent(&agent, &species(0.0, 1.0), &view, &params(64, 64, 0.1));
        assert!((heading - 0.1).abs() < 1e-6, "turned by turn_speed * dt, got {heading}");
    }

    #[test]
    fn turn_never_exceeds_sensor_angle() {
        let mut cells = vec![[0.0f32; 4]; 64 * 64];
        for y in 34..=37 {
            for x in 34..=37 {
                cells[y * 64 + x] = [1.0; 4];
            }
        }
        let view = TrailView {
            cells: &cells,
            width: 64,
            height: 64,
        };
        let agent = Agent::new(0.0, [32.0, 32.0], 0, [1.0; 4]);
        let (_, heading) = advance_agent(&agent, &species(0.0, 100.0), &view, &params(64, 64, 1.0));
        assert!((heading - std::f32::consts::FRAC_PI_4).abs() < 1e-5);
    }

    /// Paint a 4x4 block with its corner at `(x0, y0)` on a 64x64 grid.
    fn paint(cells: &mut [Cell], x0: usize, y0: usize, value: Cell) {
        for y in y0..y0 + 4 {
            for x in x0..x0 + 4 {
                cells[y * 64 + x] = value;
            }
        }
    }

    #[test]
    fn coloured_agent_prefers_its_own_hue() {
        // Agent at (32, 32) heading +x: left sensor block near (35, 35),
        // right sensor block near (35, 28), forward near (37, 32).
        let agent = Agent::new(0.0, [32.0, 32.0], 0, [0.5, 0.0, 0.0, 1.0]);
        let p = params(64, 64, 0.1);

        // Same red trail on both sides, but the right side is also green.
        // More total trail on the right must not win over pure own hue.
        let mut cells = vec![[0.0f32; 4]; 64 * 64];
        paint(&mut cells, 34, 34, [1.0, 0.0, 0.0, 1.0]);
        paint(&mut cells, 34, 26, [1.0, 1.0, 0.0, 2.0]);
        let view = TrailView {
            cells: &cells,
            width: 64,
            height: 64,
        };
        let (_, heading) = advance_agent(&agent, &species(0.0, 1.0), &view, &p);
        assert!((heading - 0.1).abs() < 1e-6, "expected a left turn, got {heading}");

        // Mirror: own hue on the right, mixed trail on the left.
        let mut cells = vec![[0.0f32; 4]; 64 * 64];
        paint(&mut cells, 34, 34, [1.0, 1.0, 0.0, 2.0]);
        paint(&mut cells, 34, 26, [1.0, 0.0, 0.0, 1.0]);
        let view = TrailView {
            cells: &cells,
            width: 64,
            height: 64,
        };
        let (_, heading) = advance_agent(&agent, &species(0.0, 1.0), &view, &p);
        let expected = std::f32::consts::TAU - 0.1;
        assert!((heading - expected).abs() < 1e-5, "expected a right turn, got {heading}");
    }

    #[test]
    fn bounce_reflects_heading_and_clamps() {
        let view_cells = vec![[0.0f32; 4]; 10 * 10];
        let view = TrailView {
            cells: &view_cells,
            width: 10,
            height: 10,
        };
        // Straight into the right edge.
        let agent = Agent::new(0.0, [9.0, 5.0], 0, [1.0; 4]);
        let (pos, heading) = advance_agent(&agent, &species(50.0, 0.0), &view, &params(10, 10, 1.0));
        assert!((0.0..10.0).contains(&pos[0]) && (0.0..10.0).contains(&pos[1]));
        assert!((heading - PI).abs() < 1e-6, "reflected across x, got {heading}");

        // Straight into the top edge (negative y).
        let agent = Agent::new(1.5 * PI, [5.0, 1.0], 0, [1.0; 4]);
        let (pos, heading) = advance_agent(&agent, &species(50.0, 0.0), &view, &params(10, 10, 1.0));
        assert_eq!(pos[1], 0.0);
        assert!((heading - 0.5 * PI).abs() < 1e-5, "reflected across y, got {heading}");
    }

    #[test]
    fn wrap_mode_wraps_position() {
        let view_cells = vec![[0.0f32; 4]; 10 * 10];
        let view = TrailView {
            cells: &view_cells,
            width: 10,
            height: 10,
        };
        let mut p = params(10, 10, 1.0);
        p.edge_mode = EdgeMode::Wrap;
        let agent = Agent::new(0.0, [9.0, 5.0], 0, [1.0; 4]);
        let (pos, heading) = advance_agent(&agent, &species(3.0, 0.0), &view, &p);
        assert!((pos[0] - 2.0).abs() < 1e-5);
        assert_eq!(heading, 0.0);
    }

    #[test]
    fn run_deposits_scaled_mask_at_new_cell() {
        let mut field = TrailField::new(20, 20);
        let mut agents = vec![Agent::new(0.0, [10.0, 10.0], 0, [0.5, 0.25, 0.0, 1.0])];
        let mut p = params(20, 20, 0.5);
        p.trail_weight = 4.0;
        {
            let (view, deposits) = field.sensing_view();
            run(&mut agents, &[species(2.0, 0.0)], view, deposits, &p);
        }
        field.commit_deposits();
        assert_eq!(agents[0].position, [11.0, 10.0]);
        assert_eq!(field.get(11, 10), [1.0, 0.5, 0.0, 2.0]);
    }
}
