//! Type definitions for the simulation.
//!
//! Contains the records produced by a run:
//! - Emission groups (rays fired by one sensor at one instant)
//! - Detection events (append-only echo log)
//! - Per-sensor particle counters and their left/center/right aggregate

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::types::{Point, Region, round_to};

use super::ray::Ray;

/// Live emission group count above which the engine warns once about growth.
/// Groups are never pruned, so memory and per-frame cost grow with the run.
pub const EMISSION_GROUP_WARNING_THRESHOLD: usize = 10_000;

/// Batch of rays fired by one sensor at one emission instant.
#[derive(Debug, Clone)]
pub struct EmissionGroup {
    pub sensor_id: u32,
    pub rays: Vec<Ray>,
    /// Simulated time of the emission (s).
    pub emission_time: f64,
}

/// One echo registered by a sensor. Field names match the persisted format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    #[serde(rename = "sensor_receptor")]
    pub receiver_id: u32,
    #[serde(rename = "sensor_emissor")]
    pub emitter_id: u32,
    #[serde(rename = "emissor_coords")]
    pub emitter_coords: [f64; 2],
    /// Emission angle (deg, one decimal).
    #[serde(rename = "angulo")]
    pub angle_deg: f64,
    /// Response time (ms, two decimals).
    #[serde(rename = "tempo_ms")]
    pub response_time_ms: f64,
}

impl DetectionEvent {
    pub fn new(receiver_id: u32, ray: &Ray, response_time_s: f64) -> Self {
        Self {
            receiver_id,
            emitter_id: ray.emitter_id,
            emitter_coords: ray.origin.to_array(),
            angle_deg: round_to(ray.emission_angle_deg, 1),
            response_time_ms: round_to(response_time_s * 1000.0, 2),
        }
    }
}

/// Emission and reception counters of one sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticleStats {
    /// Rays emitted by this sensor.
    pub emitted: u64,
    /// Echoes received, keyed by emitting sensor ID.
    pub received: BTreeMap<u32, u64>,
    pub coordinates: Point,
}

impl ParticleStats {
    pub fn new(coordinates: Point, sensor_ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            emitted: 0,
            received: sensor_ids.into_iter().map(|id| (id, 0)).collect(),
            coordinates,
        }
    }

    pub fn total_received(&self) -> u64 {
        self.received.values().sum()
    }
}

/// Count and share of echoes received in one region.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionCount {
    pub count: u64,
    /// Share of all received echoes (%, two decimals).
    pub percentage: f64,
}

/// Reception totals grouped by the receiving sensor's region.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReceptionSummary {
    pub total_received: u64,
    #[serde(default)]
    pub left: RegionCount,
    #[serde(default)]
    pub center: RegionCount,
    #[serde(default)]
    pub right: RegionCount,
}

impl ReceptionSummary {
    pub fn from_stats(stats: &BTreeMap<u32, ParticleStats>) -> Self {
        let (mut left, mut center, mut right) = (0, 0, 0);
        for sensor_stats in stats.values() {
            let received = sensor_stats.total_received();
            match Region::from_x(sensor_stats.coordinates.x) {
                Region::Left => left += received,
                Region::Center => center += received,
                Region::Right => right += received,
            }
        }

        let total = left + center + right;
        let share = |count: u64| {
            let percentage = if total > 0 { count as f64 / total as f64 * 100.0 } else { 0.0 };
            RegionCount {
                count,
                percentage: round_to(percentage, 2),
            }
        };

        Self {
            total_received: total,
            left: share(left),
            center: share(center),
            right: share(right),
        }
    }

    pub fn region(&self, region: Region) -> &RegionCount {
        match region {
            Region::Left => &self.left,
            Region::Center => &self.center,
            Region::Right => &self.right,
        }
    }
}

/// Persisted particle statistics: one entry per sensor plus the aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct ParticleStatsReport {
    #[serde(flatten)]
    pub sensors: BTreeMap<u32, ParticleStats>,
    pub statistics: ReceptionSummary,
}

impl ParticleStatsReport {
    pub fn new(sensors: BTreeMap<u32, ParticleStats>) -> Self {
        let statistics = ReceptionSummary::from_stats(&sensors);
        Self { sensors, statistics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(x: f64, received: &[(u32, u64)]) -> ParticleStats {
        let mut s = ParticleStats::new(Point::new(x, 0.0), [0, 1, 2]);
        for (id, count) in received {
            s.received.insert(*id, *count);
        }
        s
    }

    #[test]
    fn summary_groups_by_receiver_region() {
        let mut map = BTreeMap::new();
        map.insert(0, stats(-2.0, &[(1, 2), (2, 2)]));
        map.insert(1, stats(0.0, &[(0, 1), (2, 1)]));
        map.insert(2, stats(2.0, &[(0, 3)]));

        let summary = ReceptionSummary::from_stats(&map);
        assert_eq!(summary.total_received, 9);
        assert_eq!(summary.left.count, 4);
        assert_eq!(summary.center.count, 2);
        assert_eq!(summary.right.count, 3);
        assert_eq!(summary.left.percentage, 44.44);
        assert_eq!(summary.center.percentage, 22.22);
        assert_eq!(summary.right.percentage, 33.33);
        assert_eq!(summary.region(Region::Right).count, 3);
    }

    #[test]
    fn summary_without_receptions_has_zero_shares() {
        let mut map = BTreeMap::new();
        map.insert(0, stats(-2.0, &[]));
        let summary = ReceptionSummary::from_stats(&map);
        assert_eq!(summary.total_received, 0);
        assert_eq!(summary.left.percentage, 0.0);
    }

    #[test]
    fn report_serializes_sensor_keys_and_statistics_block() {
        let mut map = BTreeMap::new();
        map.insert(0, stats(-2.0, &[(1, 1)]));
        let json = serde_json::to_value(ParticleStatsReport::new(map)).unwrap();
        assert_eq!(json["0"]["emitted"], 0);
        assert_eq!(json["0"]["received"]["1"], 1);
        assert_eq!(json["0"]["coordinates"]["x"], -2.0);
        assert_eq!(json["statistics"]["total_received"], 1);
        assert_eq!(json["statistics"]["left"]["percentage"], 100.0);
    }

    #[test]
    fn detection_event_uses_persisted_field_names() {
        let event = DetectionEvent {
            receiver_id: 1,
            emitter_id: 0,
            emitter_coords: [-2.0, 0.0],
            angle_deg: 81.5,
            response_time_ms: 1011.19,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sensor_receptor"], 1);
        assert_eq!(json["sensor_emissor"], 0);
        assert_eq!(json["emissor_coords"][0], -2.0);
        assert_eq!(json["angulo"], 81.5);
        assert_eq!(json["tempo_ms"], 1011.19);
    }
}
