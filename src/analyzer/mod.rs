//! Offline analysis of a simulation run.
//!
//! Provides functionality for:
//! - Loading the persisted detections and particle statistics
//! - The two-pass timing correction and region-weighted distance estimate
//! - Printing per-group and final statistics

pub mod loader;
pub mod report;
pub mod statistics;
pub mod types;

use std::path::Path;

use crate::common::config::AnalysisParameters;

pub use types::AnalysisError;
use types::AnalysisSummary;

/// Analyze the files of a previous run and print the results.
///
/// A missing or unreadable particle statistics file only skips the weighted
/// average and the inclination estimate.
pub fn analyze_files(detections_path: &Path, particle_stats_path: &Path, params: &AnalysisParameters) -> Result<AnalysisSummary, AnalysisError> {
    let detections = loader::load_detections(detections_path)?;
    let reception = match loader::load_reception_summary(particle_stats_path) {
        Ok(reception) => Some(reception),
        Err(e) => {
            log::warn!("{}; skipping the weighted average", e);
            None
        }
    };

    let summary = statistics::analyze(&detections, reception.as_ref(), params)?;
    report::print_report(&summary);
    Ok(summary)
}
