//! Scene loading, parsing, and validation logic.
//!
//! A scene describes the reflecting surface (an open polyline) and the
//! sensors that emit and receive rays. It is read from JSON:
//!
//! ```text
//! {
//!   "surface": [[-10, 5], [-1, 5], [0, 13], [1, 5], [10, 5]],
//!   "sensors": [
//!     { "sensor_id": 0, "position": [-2, 0], "rotation_deg": 90,
//!       "emission_range_deg": [60, 120], "emission_step_deg": 5,
//!       "frequency": 8.0, "color": "red", "initial_delay": 0.095 }
//!   ]
//! }
//! ```

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::config::ConfigError;

/// Upper bound on the rays one sensor may emit per firing.
pub const MAX_FAN_RAYS: usize = 10_000;

/// Per-sensor configuration record.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub sensor_id: u32,
    pub position: [f64; 2],
    /// Central emission direction (deg, counter-clockwise from +x).
    pub rotation_deg: f64,
    /// Total angular span as a (low, high) pair; only its width is used.
    pub emission_range_deg: [f64; 2],
    pub emission_step_deg: f64,
    /// Emissions per second.
    pub frequency: f64,
    #[serde(default = "default_color")]
    pub color: String,
    /// Time of the first emission (s).
    #[serde(default)]
    pub initial_delay: f64,
}

fn default_color() -> String {
    "blue".to_string()
}

impl SensorConfig {
    /// Half of the configured emission span (deg).
    pub fn half_range_deg(&self) -> f64 {
        (self.emission_range_deg[1] - self.emission_range_deg[0]) / 2.0
    }
}

/// Root structure representing the entire scene.
#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    /// Ordered vertices of the reflecting polyline.
    pub surface: Vec<[f64; 2]>,
    pub sensors: Vec<SensorConfig>,
}

/// Load and parse a scene from a file.
///
/// # Returns
///
/// Parsed and validated Scene or a `ConfigError`.
pub fn load_scene(path: &Path) -> Result<Scene, ConfigError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("{}", path.display()))
        .map_err(|e| ConfigError::FileReadError(format!("{:#}", e)))?;

    let scene = parse_scene(&data)?;
    log::info!(
        "Loaded scene from {}: {} surface points, {} sensors",
        path.display(),
        scene.surface.len(),
        scene.sensors.len()
    );
    Ok(scene)
}

/// Parse and validate a scene from its JSON text.
pub fn parse_scene(data: &str) -> Result<Scene, ConfigError> {
    let scene: Scene = serde_json::from_str(data)
        .context("Invalid JSON format")
        .map_err(|e| ConfigError::ParseError(format!("{:#}", e)))?;

    validate_scene(&scene).map_err(ConfigError::ValidationError)?;
    Ok(scene)
}

/// Validate scene geometry and sensor parameters.
///
/// Rejects inputs that would make the simulation meaningless or undefined:
/// - Fewer than 2 surface vertices, or non-finite coordinates
/// - No sensors, or duplicate sensor IDs
/// - Non-positive frequency or angular step
/// - Negative initial delay or a reversed emission range
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    if scene.surface.len() < 2 {
        return Err(format!("Surface needs at least 2 points, got {}", scene.surface.len()));
    }
    for (idx, p) in scene.surface.iter().enumerate() {
        if !p[0].is_finite() || !p[1].is_finite() {
            return Err(format!("Surface point {} has non-finite coordinates", idx));
        }
    }

    if scene.sensors.is_empty() {
        return Err("Scene must contain at least one sensor".to_string());
    }

    let mut sensor_ids = HashSet::new();
    for sensor in &scene.sensors {
        if !sensor_ids.insert(sensor.sensor_id) {
            return Err(format!("Duplicate sensor_id found: {}", sensor.sensor_id));
        }
        validate_sensor(sensor)?;
    }

    Ok(())
}

/// Validate a single sensor record.
pub fn validate_sensor(sensor: &SensorConfig) -> Result<(), String> {
    let id = sensor.sensor_id;
    if !sensor.position[0].is_finite() || !sensor.position[1].is_finite() || !sensor.rotation_deg.is_finite() {
        return Err(format!("Sensor {} has non-finite position or rotation", id));
    }
    if !(sensor.emission_step_deg > 0.0) {
        return Err(format!("Sensor {} emission_step_deg must be positive, got {}", id, sensor.emission_step_deg));
    }
    if !(sensor.frequency > 0.0) || !sensor.frequency.is_finite() {
        return Err(format!("Sensor {} frequency must be positive, got {}", id, sensor.frequency));
    }
    if !(sensor.initial_delay >= 0.0) {
        return Err(format!("Sensor {} initial_delay must be non-negative, got {}", id, sensor.initial_delay));
    }
    if !sensor.emission_range_deg[0].is_finite() || !sensor.emission_range_deg[1].is_finite() {
        return Err(format!(
            "Sensor {} emission_range_deg ({}, {}) must be finite",
            id, sensor.emission_range_deg[0], sensor.emission_range_deg[1]
        ));
    }
    if !(sensor.emission_range_deg[1] >= sensor.emission_range_deg[0]) {
        return Err(format!(
            "Sensor {} emission_range_deg ({}, {}) is reversed",
            id, sensor.emission_range_deg[0], sensor.emission_range_deg[1]
        ));
    }
    let fan_size = (2.0 * sensor.half_range_deg() / sensor.emission_step_deg).floor() + 1.0;
    if !(fan_size <= MAX_FAN_RAYS as f64) {
        return Err(format!(
            "Sensor {} emission_range_deg / emission_step_deg gives {} rays per emission, more than {}",
            id, fan_size, MAX_FAN_RAYS
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"{
        "surface": [[10, 5], [1, 5], [0, 13], [-1, 5], [-10, 5]],
        "sensors": [
            { "sensor_id": 0, "position": [-2, 0], "rotation_deg": 90, "emission_range_deg": [60, 120],
              "emission_step_deg": 5, "frequency": 8.0, "color": "red", "initial_delay": 0.095 },
            { "sensor_id": 1, "position": [0, 0], "rotation_deg": 90, "emission_range_deg": [60, 120],
              "emission_step_deg": 5, "frequency": 6.0 }
        ]
    }"#;

    #[test]
    fn parses_valid_scene_with_defaults() {
        let scene = parse_scene(SCENE).unwrap();
        assert_eq!(scene.surface.len(), 5);
        assert_eq!(scene.sensors.len(), 2);
        assert_eq!(scene.sensors[1].color, "blue");
        assert_eq!(scene.sensors[1].initial_delay, 0.0);
        assert_eq!(scene.sensors[0].half_range_deg(), 30.0);
    }

    #[test]
    fn rejects_short_surface() {
        let data = r#"{ "surface": [[0, 5]], "sensors": [] }"#;
        match parse_scene(data) {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("at least 2 points")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_sensor_parameters() {
        let base = parse_scene(SCENE).unwrap();

        let mut zero_freq = base.clone();
        zero_freq.sensors[0].frequency = 0.0;
        assert!(validate_scene(&zero_freq).unwrap_err().contains("frequency"));

        let mut zero_step = base.clone();
        zero_step.sensors[1].emission_step_deg = 0.0;
        assert!(validate_scene(&zero_step).unwrap_err().contains("emission_step_deg"));

        let mut duplicate = base.clone();
        duplicate.sensors[1].sensor_id = 0;
        assert!(validate_scene(&duplicate).unwrap_err().contains("Duplicate"));

        let mut negative_delay = base;
        negative_delay.sensors[0].initial_delay = -1.0;
        assert!(validate_scene(&negative_delay).unwrap_err().contains("initial_delay"));
    }

    #[test]
    fn rejects_unbounded_emission_fans() {
        let base = parse_scene(SCENE).unwrap();

        let mut huge_span = base.clone();
        huge_span.sensors[0].emission_range_deg = [0.0, 1e300];
        assert!(validate_scene(&huge_span).unwrap_err().contains("rays per emission"));

        let mut infinite_span = base.clone();
        infinite_span.sensors[0].emission_range_deg = [0.0, f64::INFINITY];
        assert!(validate_scene(&infinite_span).unwrap_err().contains("must be finite"));

        let mut nan_span = base.clone();
        nan_span.sensors[1].emission_range_deg = [f64::NAN, 10.0];
        assert!(validate_scene(&nan_span).unwrap_err().contains("must be finite"));

        let mut tiny_step = base.clone();
        tiny_step.sensors[0].emission_range_deg = [0.0, 360.0];
        tiny_step.sensors[0].emission_step_deg = 1e-6;
        assert!(validate_scene(&tiny_step).unwrap_err().contains("rays per emission"));

        // Exactly at the limit is still accepted.
        let mut at_limit = base;
        at_limit.sensors[0].emission_range_deg = [0.0, (MAX_FAN_RAYS - 1) as f64];
        at_limit.sensors[0].emission_step_deg = 1.0;
        assert!(validate_scene(&at_limit).is_ok());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(parse_scene("{ not json"), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn bundled_scene_is_valid() {
        let scene = parse_scene(include_str!("../../scenes/default_scene.json")).unwrap();
        assert_eq!(scene.sensors.len(), 3);
        assert_eq!(scene.sensors[1].frequency, 6.0);
        assert_eq!(scene.surface[2], [0.0, 13.0]);
    }
}
