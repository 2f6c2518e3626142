use slime_core::{SimConfig, Simulation};
use std::time::{Duration, Instant};

fn main() {
    let num_agents = 250_000;
    let (width, height) = (1280, 720);
    println!("Benchmarking {num_agents} agents on a {width}x{height} field");

    let config = SimConfig {
        num_agents,
        steps_per_frame: 1,
        auto_adjust_steps: false,
        seed: 42,
        ..SimConfig::default()
    };
    let mut sim = Simulation::new(config);
    if let Err(e) = sim.attach(width, height) {
        eprintln!("attach failed: {e}");
        std::process::exit(1);
    }

    // Warm up so the trail is populated before timing.
    for _ in 0..10 {
        sim.tick(1.0 / 60.0);
    }

    let frames = 100;
    let mut movement = Duration::ZERO;
    let mut diffusion = Duration::ZERO;
    let start = Instant::now();
    for _ in 0..frames {
        let report = sim.tick(1.0 / 60.0);
        movement += Duration::from_micros(report.timings.movement_us);
        diffusion += Duration::from_micros(report.timings.diffusion_us);
    }
    let elapsed = start.elapsed();

    println!("Time for {frames} steps: {elapsed:?}");
    println!("Avg time per step: {:?}", elapsed / frames);
    println!("  movement & sensing: {:?}", movement / frames);
    println!("  diffusion & decay:  {:?}", diffusion / frames);
}
