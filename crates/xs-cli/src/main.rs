//! xsec CLI

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod cmd_event_loop;
mod cmd_extract;
mod exit;

use exit::{Failure, Status};

#[derive(Parser)]
#[command(name = "xsec")]
#[command(about = "xsec - differential cross sections from systematic-universe event loops")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill histograms from simulation and data in every systematic universe
    EventLoop {
        /// Analysis configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Reconstructed simulation (columnar JSON)
        #[arg(long)]
        mc: PathBuf,

        /// Truth simulation for the efficiency denominator. Defaults to `--mc`.
        #[arg(long)]
        truth: Option<PathBuf>,

        /// Recorded data (columnar JSON)
        #[arg(long)]
        data: PathBuf,

        /// Simulated POT. Defaults to the exposure stored in the MC file.
        #[arg(long)]
        mc_pot: Option<f64>,

        /// Recorded POT. Defaults to the exposure stored in the data file.
        #[arg(long)]
        data_pot: Option<f64>,

        /// Keep only the central value and a minimal flux band
        #[arg(long)]
        skip_systematics: bool,

        /// Output for simulation histograms
        #[arg(long, default_value = "runEventLoopMC.json")]
        mc_out: PathBuf,

        /// Output for data histograms
        #[arg(long, default_value = "runEventLoopData.json")]
        data_out: PathBuf,
    },

    /// Extract cross sections from event-loop histograms
    Extract {
        /// Extraction configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Data histograms written by `event-loop`
        #[arg(long)]
        data: PathBuf,

        /// MC histograms written by `event-loop`
        #[arg(long)]
        mc: PathBuf,

        /// Override the unfolding iteration count
        #[arg(long)]
        iterations: Option<usize>,

        /// Number of playlists merged into the inputs
        #[arg(long)]
        playlists: Option<u32>,

        /// Directory for `<material>_<observable>_crossSection.json`
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Threads (0 = auto). Use 1 for deterministic scheduling.
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Print version
    Version,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            if e.use_stderr() {
                return ExitCode::from(Status::BadCmdLine as u8);
            }
            return ExitCode::SUCCESS;
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::EventLoop {
            config,
            mc,
            truth,
            data,
            mc_pot,
            data_pot,
            skip_systematics,
            mc_out,
            data_out,
        } => cmd_event_loop::run(cmd_event_loop::Args {
            config,
            truth: truth.unwrap_or_else(|| mc.clone()),
            mc,
            data,
            mc_pot,
            data_pot,
            skip_systematics,
            mc_out,
            data_out,
        }),
        Commands::Extract { config, data, mc, iterations, playlists, output_dir, threads } => {
            cmd_extract::run(cmd_extract::Args {
                config,
                data,
                mc,
                iterations,
                playlists,
                output_dir,
                threads,
            })
        }
        Commands::Version => {
            println!("xsec {}", xs_core::VERSION);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure { code, error }) => {
            tracing::error!("{error:#}");
            ExitCode::from(code)
        }
    }
}
