use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use glam::Vec3;
use orrery_common::UniverseId;
use orrery_kernel::{ObjectDescriptor, ShapeKind, Simulation, WorldConfig};
use orrery_sync::SyncChannel;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orrery-cli", about = "CLI tool for orrery simulations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and crate info
    Info,
    /// Run a scenario headless and print final positions as JSON
    Simulate {
        /// World config (.yaml/.yml or .json); defaults when absent
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// JSON array of object descriptors
        #[arg(short, long)]
        objects: PathBuf,
        /// Number of frames to run
        #[arg(short, long, default_value = "120")]
        frames: u32,
        /// Frame rate of the synthetic clock
        #[arg(long, default_value = "60")]
        fps: f64,
        /// Parameter events, one JSON object per line
        #[arg(short, long, requires = "universe")]
        events: Option<PathBuf>,
        /// Universe the simulation belongs to
        #[arg(short, long, requires = "events")]
        universe: Option<UniverseId>,
        /// Frame boundary at which the events arrive
        #[arg(long, default_value = "1")]
        events_at: u32,
    },
    /// Drop a ball onto a floor and print its height over time
    DropTest {
        /// Starting height of the ball's centre
        #[arg(long, default_value = "10")]
        height: f32,
        /// Number of frames to run
        #[arg(short, long, default_value = "180")]
        frames: u32,
        /// Print every Nth frame
        #[arg(long, default_value = "10")]
        every: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info => {
            println!("orrery-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", orrery_common::crate_info());
            println!("kernel: {}", orrery_kernel::crate_info());
            println!("sync: {}", orrery_sync::crate_info());
            println!("{}", Simulation::new().summary());
        }
        Commands::Simulate {
            config,
            objects,
            frames,
            fps,
            events,
            universe,
            events_at,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => WorldConfig::default(),
            };
            let objects = parse_objects(&read(&objects)?)?;
            let events = match events {
                Some(path) => parse_events(&read(&path)?),
                None => Vec::new(),
            };
            let sim = simulate(config, &objects, frames, fps, universe.zip(Some(events)), events_at)?;
            tracing::info!("{}", sim.summary());
            println!("{}", serde_json::to_string_pretty(&sim.object_positions())?);
        }
        Commands::DropTest {
            height,
            frames,
            every,
        } => {
            let objects = [
                ObjectDescriptor::new("floor", ShapeKind::Plane, &[])
                    .rotated(Vec3::new(-std::f32::consts::FRAC_PI_2, 0.0, 0.0))
                    .fixed(),
                ObjectDescriptor::new("ball", ShapeKind::Sphere, &[1.0])
                    .at(Vec3::new(0.0, height, 0.0)),
            ];
            let mut sim = Simulation::new();
            sim.initialize(WorldConfig::default())?;
            for desc in &objects {
                sim.add_object(desc)?;
            }

            println!("Drop test: height={height}, frames={frames}");
            let frame = Duration::from_secs_f64(1.0 / 60.0);
            let t0 = Instant::now();
            sim.start_at(t0);
            for i in 1..=frames {
                sim.step_at(t0 + frame * i);
                if i % every.max(1) == 0 || i == frames {
                    let y = sim
                        .object_transform(&"ball".into())
                        .map_or(f32::NAN, |pose| pose.position.y);
                    println!("frame={i:4} t={:.3}s y={y:.3}", frame.as_secs_f64() * f64::from(i));
                }
            }
            println!("{}", sim.summary());
        }
    }

    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn load_config(path: &Path) -> anyhow::Result<WorldConfig> {
    let text = read(path)?;
    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let config: WorldConfig = if yaml {
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    } else {
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    };
    config.validate()?;
    Ok(config)
}

fn parse_objects(text: &str) -> anyhow::Result<Vec<ObjectDescriptor>> {
    serde_json::from_str(text).context("parsing object list")
}

fn parse_events(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Run `frames` frames on a synthetic clock. Events, when present, are handed
/// to the transport before frame boundary `events_at` and pumped there.
fn simulate(
    config: WorldConfig,
    objects: &[ObjectDescriptor],
    frames: u32,
    fps: f64,
    events: Option<(UniverseId, Vec<String>)>,
    events_at: u32,
) -> anyhow::Result<Simulation> {
    if !(fps.is_finite() && fps > 0.0) {
        bail!("frame rate must be positive, got {fps}");
    }
    let mut sim = Simulation::new();
    sim.initialize(config)?;
    for desc in objects {
        sim.add_object(desc)
            .with_context(|| format!("adding object {}", desc.id))?;
    }

    let (universe, events) = events.unzip();
    let mut sync = universe.map(SyncChannel::connect);
    let mut events = events.unwrap_or_default();

    let frame = Duration::from_secs_f64(1.0 / fps);
    let t0 = Instant::now();
    sim.start_at(t0);
    for i in 1..=frames {
        if let Some((channel, transport)) = sync.as_mut() {
            if i == events_at {
                for raw in events.drain(..) {
                    transport.deliver(raw);
                }
            }
            for applied in channel.pump(&mut sim) {
                tracing::info!(frame = i, category = %applied.category, "parameters applied");
            }
        }
        sim.step_at(t0 + frame * i);
    }
    if let Some((channel, _)) = &sync {
        tracing::debug!(stats = ?channel.stats(), "sync channel");
    }
    Ok(sim)
}
