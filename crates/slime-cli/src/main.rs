use anyhow::{Context, Result};
use clap::Parser;
use slime_core::{SimConfig, Simulation};
use std::path::PathBuf;
use tracing::info;

/// Run the slime mould simulation headless and print a JSON run summary.
#[derive(Parser, Debug)]
#[command(name = "slime", version, about)]
struct Cli {
    /// Number of frames to simulate.
    #[arg(long, default_value_t = 600)]
    frames: usize,

    /// Fixed frame delta in seconds.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    delta: f32,

    /// JSON config file; missing fields take defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Override the number of agents.
    #[arg(long)]
    agents: Option<usize>,

    /// Field width, also used as the window width.
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Field height, also used as the window height.
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Record metrics every N frames (the last frame is always sampled).
    #[arg(long, default_value_t = 60)]
    sample_every: usize,

    /// Restart the population every N frames.
    #[arg(long)]
    restart_every: Option<usize>,

    /// Pretty-print the summary.
    #[arg(long)]
    pretty: bool,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<SimConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            SimConfig::from_json_str(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(agents) = cli.agents {
        config.num_agents = agents;
        config.agent_capacity = config.agent_capacity.max(agents);
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let mut sim = Simulation::try_new(config).context("creating simulation")?;
    sim.attach(cli.width, cli.height)
        .context("attaching simulation")?;
    info!(
        frames = cli.frames,
        delta = cli.delta,
        agents = sim.agents().len(),
        "running headless"
    );

    let summary = sim
        .run_frames_with_restarts(cli.frames, cli.delta, cli.sample_every, cli.restart_every)
        .context("running frames")?;
    info!(
        total_steps = summary.total_steps,
        final_steps_per_frame = summary.final_steps_per_frame,
        "run complete"
    );
    sim.detach();

    let json = if cli.pretty {
        serde_json::to_string_pretty(&summary)?
    } else {
        serde_json::to_string(&summary)?
    };
    println!("{json}");
    Ok(())
}
