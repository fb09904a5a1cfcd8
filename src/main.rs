use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sdkguard::config::{LoggingConfig, SdkConfig};
use sdkguard::simulation::{Simulation, SimulationReport, TrafficProfile};

/// Replay synthetic request traffic against the client-side rate limiter.
#[derive(Debug, Parser)]
#[command(name = "sdkguard-sim", version, about)]
struct Cli {
    /// YAML configuration file (SDKGUARD__* environment variables override it)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Simulated seconds of traffic
    #[arg(long, default_value_t = 360)]
    duration: u64,

    /// Stop the load at the first trip and measure how long recovery takes
    #[arg(long)]
    cease_on_trip: bool,

    /// Run with the rate limiter switched off
    #[arg(long)]
    disable: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    profile: ProfileCommand,
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    /// The same number of requests every second
    Constant {
        #[arg(long)]
        per_second: u32,
    },
    /// One burst, then a constant trickle
    Burst {
        #[arg(long)]
        size: u32,
        #[arg(long, default_value_t = 0)]
        then_per_second: u32,
    },
    /// A fixed burst every few seconds
    PeriodicBursts {
        #[arg(long)]
        size: u32,
        #[arg(long)]
        every_secs: u32,
    },
    /// A sine wave around a base rate
    Undulating {
        #[arg(long)]
        base: f64,
        #[arg(long)]
        amplitude: f64,
        #[arg(long, default_value_t = 60)]
        period_secs: u32,
    },
    /// A random rate around a mean
    Jitter {
        #[arg(long)]
        mean: u32,
        #[arg(long)]
        spread: u32,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

impl From<ProfileCommand> for TrafficProfile {
    fn from(command: ProfileCommand) -> Self {
        match command {
            ProfileCommand::Constant { per_second } => TrafficProfile::Constant { per_second },
            ProfileCommand::Burst {
                size,
                then_per_second,
            } => TrafficProfile::Burst {
                size,
                then_per_second,
            },
            ProfileCommand::PeriodicBursts { size, every_secs } => {
                TrafficProfile::PeriodicBursts { size, every_secs }
            }
            ProfileCommand::Undulating {
                base,
                amplitude,
                period_secs,
            } => TrafficProfile::Undulating {
                base,
                amplitude,
                period_secs,
            },
            ProfileCommand::Jitter { mean, spread, seed } => {
                TrafficProfile::Jitter { mean, spread, seed }
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = SdkConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    info!("Starting Sdkguard rate limiter simulation");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if cli.disable {
        config.rate_limiter.enabled = false;
    }

    let mut simulation = Simulation::new(config.rate_limiter, cli.profile.into(), cli.duration);
    if cli.cease_on_trip {
        simulation = simulation.cease_on_trip();
    }

    let report = simulation.run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(())
}

/// Install the global subscriber; `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_summary(report: &SimulationReport) {
    println!("requests sent:      {}", report.requests_sent);
    println!("requests rejected:  {}", report.requests_rejected);
    match report.first_trip_at_secs {
        Some(sec) => println!("first trip at:      {}s", sec),
        None => println!("first trip at:      never"),
    }
    if let Some(secs) = report.recovered_after_secs {
        println!("recovered after:    {}s", secs);
    }
    println!(
        "final window:       {} requests ({} in tripwire frame, peak bucket {})",
        report.final_stats.requests_in_moving_window,
        report.final_stats.requests_in_tripwire_window,
        report.final_stats.max_requests_in_single_bucket
    );
    println!("rate limited:       {}", report.final_stats.is_rate_limited);
}
