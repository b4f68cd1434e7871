use clap::{Args, Parser, Subcommand, ValueHint};
use env_logger::Builder;
use log::{LevelFilter, error, info};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

mod analyzer;
mod common;
mod simulation;

use analyzer::AnalysisError;
use common::config::{ConfigError, ExperimentConfig};
use common::scene::load_scene;
use simulation::{SimulationEngine, SimulationOutcome, export_outcome};

#[derive(Parser)]
#[command(name = "echo-ranging-simulator", version, about = "Ray-based echo ranging simulation and timing analysis")]
struct Cli {
    /// Experiment configuration (TOML). Defaults apply when omitted.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the simulation and write detections and particle statistics.
    Simulate(SimulateArgs),
    /// Analyze the files of a previous run.
    Analyze(AnalyzeArgs),
    /// Simulate, then analyze the in-memory results.
    Run(SimulateArgs),
}

#[derive(Args)]
struct SimulateArgs {
    /// Scene file (JSON) with the surface and the sensors.
    #[arg(long, value_hint = ValueHint::FilePath)]
    scene: PathBuf,

    /// Stop after this many wall-clock seconds, keeping what was simulated so far.
    #[arg(long)]
    time_limit: Option<u64>,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Detections file; overrides the configured path.
    #[arg(long, value_hint = ValueHint::FilePath)]
    detections: Option<PathBuf>,

    /// Particle statistics file; overrides the configured path.
    #[arg(long, value_hint = ValueHint::FilePath)]
    particle_stats: Option<PathBuf>,
}

#[derive(Debug)]
enum AppError {
    Config(ConfigError),
    Analysis(AnalysisError),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Analysis(e) => write!(f, "{}", e),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<AnalysisError> for AppError {
    fn from(e: AnalysisError) -> Self {
        AppError::Analysis(e)
    }
}

fn load_config(path: Option<&Path>) -> Result<ExperimentConfig, ConfigError> {
    match path {
        Some(path) => ExperimentConfig::load(path),
        None => {
            info!("No configuration file given, using defaults");
            Ok(ExperimentConfig::default())
        }
    }
}

/// Raise `cancel` after `seconds` of wall-clock time.
fn spawn_time_limit(seconds: u64, cancel: Arc<AtomicBool>) {
    let spawned = thread::Builder::new().name("time-limit".to_string()).spawn(move || {
        thread::sleep(Duration::from_secs(seconds));
        cancel.store(true, Ordering::Relaxed);
    });
    if let Err(e) = spawned {
        log::warn!("Failed to start time limit thread, running without limit: {}", e);
    }
}

fn simulate(config: &ExperimentConfig, args: &SimulateArgs) -> Result<SimulationOutcome, AppError> {
    let scene = load_scene(&args.scene)?;
    let engine = SimulationEngine::new(&scene, config.simulation.clone())?.with_trace(config.output.trace_path.clone());

    let cancel = Arc::new(AtomicBool::new(false));
    if let Some(seconds) = args.time_limit {
        spawn_time_limit(seconds, cancel.clone());
    }
    let outcome = engine.run(Some(cancel.as_ref()));
    if outcome.aborted {
        log::warn!("Time limit reached after {} frames, results are partial", outcome.frames_run);
    }

    export_outcome(&outcome, &config.output.detections_path, &config.output.particle_stats_path);
    print!("{}", analyzer::report::format_reception_summary(&outcome.particle_stats.statistics));
    Ok(outcome)
}

fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Simulate(args) => {
            simulate(&config, &args)?;
        }
        Command::Analyze(args) => {
            let detections = args.detections.unwrap_or_else(|| config.output.detections_path.clone());
            let particle_stats = args.particle_stats.unwrap_or_else(|| config.output.particle_stats_path.clone());
            analyzer::analyze_files(&detections, &particle_stats, &config.analysis)?;
        }
        Command::Run(args) => {
            let outcome = simulate(&config, &args)?;
            let summary = analyzer::statistics::analyze(&outcome.detections, Some(&outcome.particle_stats.statistics), &config.analysis)
                .map_err(AnalysisError::from)?;
            analyzer::report::print_report(&summary);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("echo_ranging_simulator"), LevelFilter::Debug)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    info!("Starting up");

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
