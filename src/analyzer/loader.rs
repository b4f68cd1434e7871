//! Readers for the files written by a simulation run.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::simulation::types::{DetectionEvent, ReceptionSummary};

use super::types::AnalysisError;

/// The analyzer only needs the aggregate block of the particle statistics.
#[derive(Deserialize)]
struct ParticleStatsFile {
    statistics: ReceptionSummary,
}

fn read_file(path: &Path) -> Result<String, AnalysisError> {
    fs::read_to_string(path)
        .with_context(|| format!("{}", path.display()))
        .map_err(|e| AnalysisError::LoadError(format!("{:#}", e)))
}

/// Load the detection log.
pub fn load_detections(path: &Path) -> Result<Vec<DetectionEvent>, AnalysisError> {
    let data = read_file(path)?;
    let detections = parse_detections(&data).map_err(|e| match e {
        AnalysisError::LoadError(msg) => AnalysisError::LoadError(format!("{}: {}", path.display(), msg)),
        other => other,
    })?;
    log::info!("Loaded {} detections from {}", detections.len(), path.display());
    Ok(detections)
}

pub fn parse_detections(data: &str) -> Result<Vec<DetectionEvent>, AnalysisError> {
    serde_json::from_str(data)
        .context("Invalid detections JSON")
        .map_err(|e| AnalysisError::LoadError(format!("{:#}", e)))
}

/// Load the reception summary (`statistics` block) of a particle statistics file.
pub fn load_reception_summary(path: &Path) -> Result<ReceptionSummary, AnalysisError> {
    let data = read_file(path)?;
    let summary = parse_reception_summary(&data)?;
    log::info!("Loaded reception statistics from {}", path.display());
    Ok(summary)
}

pub fn parse_reception_summary(data: &str) -> Result<ReceptionSummary, AnalysisError> {
    let file: ParticleStatsFile = serde_json::from_str(data)
        .context("Invalid particle statistics JSON")
        .map_err(|e| AnalysisError::LoadError(format!("{:#}", e)))?;
    Ok(file.statistics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_persisted_detections() {
        let data = r#"[
            {"sensor_receptor": 1, "sensor_emissor": 0, "emissor_coords": [-2, 0], "angulo": 81.5, "tempo_ms": 1011.19},
            {"sensor_receptor": 0, "sensor_emissor": 1, "emissor_coords": [0.0, 0.0], "angulo": 90.0, "tempo_ms": 580.0}
        ]"#;
        let detections = parse_detections(data).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].receiver_id, 1);
        assert_eq!(detections[0].emitter_coords, [-2.0, 0.0]);
        assert_eq!(detections[1].response_time_ms, 580.0);
    }

    #[test]
    fn reads_only_the_statistics_block() {
        let data = r#"{
            "0": {"emitted": 13, "received": {"1": 2}, "coordinates": {"x": -2.0, "y": 0.0}},
            "statistics": {
                "total_received": 10,
                "left": {"count": 4, "percentage": 40.0},
                "center": {"count": 2, "percentage": 20.0},
                "right": {"count": 4, "percentage": 40.0}
            }
        }"#;
        let summary = parse_reception_summary(data).unwrap();
        assert_eq!(summary.total_received, 10);
        assert_eq!(summary.center.percentage, 20.0);
        assert_eq!(summary.right.count, 4);
    }

    #[test]
    fn malformed_or_missing_input_is_a_load_error() {
        assert!(matches!(parse_detections("{"), Err(AnalysisError::LoadError(_))));
        assert!(matches!(parse_reception_summary("{}"), Err(AnalysisError::LoadError(_))));
        let missing = std::env::temp_dir().join("echo_ranging_definitely_missing.json");
        assert!(matches!(load_detections(&missing), Err(AnalysisError::LoadError(_))));
    }
}
