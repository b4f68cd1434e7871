//! Experiment configuration loaded from a TOML file.
//!
//! The scene (surface and sensors) lives in a separate JSON file, see
//! `common::scene`. This file only carries the medium, timing, output and
//! analysis parameters. Every field has a default so a partial file works.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Error type for configuration failures. Fatal before any frame runs.
#[derive(Debug)]
pub enum ConfigError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse configuration: {}", msg),
            ConfigError::ValidationError(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Time stepping and propagation medium parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    /// Number of frames, including the first (t = 0) and the last (t = total_time).
    pub frames: usize,
    /// Simulated duration covered by the frames (s).
    pub total_time: f64,
    /// Outbound propagation speed (world units per second).
    pub speed_of_sound: f64,
    /// Fraction of speed lost on the return leg, in [0, 1).
    pub loss_fraction: f64,
    /// Half-angle of the uniform random perturbation applied to reflections (deg).
    pub dispersion_deg: f64,
    /// Radius around a sensor within which a returning ray counts as an echo.
    pub detection_tolerance: f64,
    /// Record ray positions every N frames. 0 disables the trace.
    pub trace_every_frames: usize,
    /// Rewrite the trace file after this many recorded frames.
    pub trace_flush_interval: usize,
    /// Seed for the dispersion RNG. Drawn from entropy when absent.
    pub seed: Option<u64>,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            frames: 300,
            total_time: 5.0,
            // Ten times slower than air so echoes span several frames.
            speed_of_sound: 34.3,
            loss_fraction: 0.2,
            dispersion_deg: 5.0,
            detection_tolerance: 1.0,
            trace_every_frames: 0,
            trace_flush_interval: 60,
            seed: None,
        }
    }
}

impl SimulationParameters {
    /// Simulated time of a frame: `frame / (frames - 1) * total_time`.
    pub fn global_time(&self, frame: usize) -> f64 {
        frame as f64 / (self.frames - 1) as f64 * self.total_time
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.frames < 2 {
            return Err(format!("frames must be at least 2, got {}", self.frames));
        }
        if !(self.total_time > 0.0) {
            return Err(format!("total_time must be positive, got {}", self.total_time));
        }
        if !(self.speed_of_sound > 0.0) {
            return Err(format!("speed_of_sound must be positive, got {}", self.speed_of_sound));
        }
        if !(0.0..1.0).contains(&self.loss_fraction) {
            return Err(format!("loss_fraction must be in [0, 1), got {}", self.loss_fraction));
        }
        if !(self.dispersion_deg >= 0.0) || !self.dispersion_deg.is_finite() {
            return Err(format!("dispersion_deg must be non-negative, got {}", self.dispersion_deg));
        }
        if !(self.detection_tolerance > 0.0) {
            return Err(format!("detection_tolerance must be positive, got {}", self.detection_tolerance));
        }
        if self.trace_every_frames > 0 && self.trace_flush_interval == 0 {
            return Err("trace_flush_interval must be positive when tracing is enabled".to_string());
        }
        Ok(())
    }
}

/// Destination files for the run artifacts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    pub detections_path: PathBuf,
    pub particle_stats_path: PathBuf,
    pub trace_path: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            detections_path: PathBuf::from("detections.json"),
            particle_stats_path: PathBuf::from("particle_stats.json"),
            trace_path: PathBuf::from("trace.json"),
        }
    }
}

/// Tunable constants of the timing correction pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisParameters {
    /// Speed used to convert times to distances (m/s).
    pub speed_of_sound: f64,
    /// Share of the most deviant samples dropped before averaging (%).
    pub outlier_percentage: f64,
    /// Fraction of the accumulated offset removed from the origin group.
    pub origin_calibration_weight: f64,
    /// Fraction of the accumulated offset removed from every other group.
    pub lateral_calibration_weight: f64,
    /// Divisor of the raw (first pass) distance.
    pub raw_distance_divisor: f64,
    /// Divisor of the corrected (second pass) distance.
    ///
    /// Differs from `raw_distance_divisor` on purpose: the two were calibrated
    /// separately and have not been reconciled.
    pub final_distance_divisor: f64,
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        Self {
            speed_of_sound: 343.0,
            outlier_percentage: 30.0,
            origin_calibration_weight: 0.78,
            lateral_calibration_weight: 1.0,
            raw_distance_divisor: 2.0,
            final_distance_divisor: 20.0,
        }
    }
}

impl AnalysisParameters {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.speed_of_sound > 0.0) {
            return Err(format!("analysis speed_of_sound must be positive, got {}", self.speed_of_sound));
        }
        if !(0.0..100.0).contains(&self.outlier_percentage) {
            return Err(format!("outlier_percentage must be in [0, 100), got {}", self.outlier_percentage));
        }
        if !(self.raw_distance_divisor > 0.0) || !(self.final_distance_divisor > 0.0) {
            return Err("distance divisors must be positive".to_string());
        }
        if !self.origin_calibration_weight.is_finite() || !self.lateral_calibration_weight.is_finite() {
            return Err("calibration weights must be finite".to_string());
        }
        Ok(())
    }
}

/// Root of the experiment TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub simulation: SimulationParameters,
    pub output: OutputPaths,
    pub analysis: AnalysisParameters,
}

impl ExperimentConfig {
    /// Load and validate the configuration from a TOML file.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("{}", config_path.display()))
            .map_err(|e| ConfigError::FileReadError(format!("{:#}", e)))?;

        let config = Self::from_toml_str(&content)?;
        log::info!("Loaded experiment configuration from {}", config_path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ExperimentConfig = toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate().map_err(ConfigError::ValidationError)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.simulation.validate()?;
        self.analysis.validate()
    }
}
