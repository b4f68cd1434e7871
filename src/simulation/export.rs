//! Persistence of run results.
//!
//! Both writers return errors instead of handling them; the caller logs a
//! warning and keeps the in-memory results.

use anyhow::Context;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::engine::SimulationOutcome;
use super::types::{DetectionEvent, ParticleStatsReport};

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).with_context(|| format!("Failed to serialize {}", path.display()))?;
    writer.flush().with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn save_detections(path: &Path, detections: &[DetectionEvent]) -> anyhow::Result<()> {
    write_json(path, detections)?;
    log::info!("Saved {} detections to {}", detections.len(), path.display());
    Ok(())
}

pub fn save_particle_stats(path: &Path, report: &ParticleStatsReport) -> anyhow::Result<()> {
    write_json(path, report)?;
    log::info!("Saved particle statistics to {}", path.display());
    Ok(())
}

/// Write both result files. Failures are logged and counted, never fatal.
///
/// # Returns
///
/// Number of files that could not be written.
pub fn export_outcome(outcome: &SimulationOutcome, detections_path: &Path, particle_stats_path: &Path) -> usize {
    let mut failures = 0;
    if let Err(e) = save_detections(detections_path, &outcome.detections) {
        log::warn!("Error saving detections: {:#}", e);
        failures += 1;
    }
    if let Err(e) = save_particle_stats(particle_stats_path, &outcome.particle_stats) {
        log::warn!("Error saving particle statistics: {:#}", e);
        failures += 1;
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Point;
    use crate::simulation::types::ParticleStats;
    use std::collections::BTreeMap;

    fn outcome() -> SimulationOutcome {
        let mut sensors = BTreeMap::new();
        let mut center = ParticleStats::new(Point::new(0.0, 0.0), [0]);
        center.received.insert(0, 1);
        sensors.insert(1, center);
        sensors.insert(0, ParticleStats::new(Point::new(-2.0, 0.0), [1]));
        SimulationOutcome {
            detections: vec![DetectionEvent {
                receiver_id: 1,
                emitter_id: 0,
                emitter_coords: [-2.0, 0.0],
                angle_deg: 81.5,
                response_time_ms: 1011.19,
            }],
            particle_stats: ParticleStatsReport::new(sensors),
            frames_run: 3,
            aborted: false,
        }
    }

    #[test]
    fn writes_both_files() {
        let dir = std::env::temp_dir();
        let detections_path = dir.join(format!("echo_ranging_export_det_{}.json", std::process::id()));
        let stats_path = dir.join(format!("echo_ranging_export_stats_{}.json", std::process::id()));

        assert_eq!(export_outcome(&outcome(), &detections_path, &stats_path), 0);

        let detections: Vec<DetectionEvent> = serde_json::from_str(&std::fs::read_to_string(&detections_path).unwrap()).unwrap();
        assert_eq!(detections, outcome().detections);

        let stats: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&stats_path).unwrap()).unwrap();
        assert_eq!(stats["1"]["received"]["0"], 1);
        assert_eq!(stats["statistics"]["center"]["count"], 1);

        let _ = std::fs::remove_file(detections_path);
        let _ = std::fs::remove_file(stats_path);
    }

    #[test]
    fn write_failures_are_counted_not_fatal() {
        let missing = std::env::temp_dir().join("echo_ranging_no_such_dir").join("x").join("out.json");
        assert_eq!(export_outcome(&outcome(), &missing, &missing), 2);
    }
}
