//! Directional sensor: emits fans of rays and receives echoes.

use crate::common::config::ConfigError;
use crate::common::scene::{SensorConfig, validate_sensor};
use crate::common::types::Point;

use super::geometry::{RectPos, point_in_rect};
use super::ray::{Ray, RayParameters};

/// Default footprint of a sensor (world units).
pub const SENSOR_WIDTH: f64 = 0.6;
pub const SENSOR_HEIGHT: f64 = 0.3;

/// Tolerance on the last fan angle so a span that is an exact multiple of the
/// step keeps its upper bound despite floating point error.
const FAN_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct Sensor {
    pub sensor_id: u32,
    pub position: Point,
    /// Central emission direction (deg).
    pub facing_deg: f64,
    pub half_range_deg: f64,
    pub step_deg: f64,
    /// Emissions per second.
    pub frequency: f64,
    pub color: String,
    pub width: f64,
    pub height: f64,
    /// Simulated time of the next emission; advanced by the scheduler.
    pub next_emission_time: f64,
}

impl Sensor {
    pub fn from_config(config: &SensorConfig) -> Result<Self, ConfigError> {
        validate_sensor(config).map_err(ConfigError::ValidationError)?;
        Ok(Self {
            sensor_id: config.sensor_id,
            position: Point::from(config.position),
            facing_deg: config.rotation_deg,
            half_range_deg: config.half_range_deg(),
            step_deg: config.emission_step_deg,
            frequency: config.frequency,
            color: config.color.clone(),
            width: SENSOR_WIDTH,
            height: SENSOR_HEIGHT,
            next_emission_time: config.initial_delay,
        })
    }

    /// Time between two emissions (s).
    pub fn period(&self) -> f64 {
        1.0 / self.frequency
    }

    /// Emission angles from `facing - half_range` to `facing + half_range`,
    /// both ends included when the span is a multiple of the step.
    pub fn fan_angles(&self) -> Vec<f64> {
        let min_angle = self.facing_deg - self.half_range_deg;
        let span = 2.0 * self.half_range_deg;
        let steps = (span / self.step_deg + FAN_EPSILON).floor() as usize;
        (0..=steps).map(|i| min_angle + i as f64 * self.step_deg).collect()
    }

    /// Build one ray per fan angle. The rays are not propagated yet.
    pub fn emit_rays(&self, params: &RayParameters) -> Vec<Ray> {
        let rays: Vec<Ray> = self
            .fan_angles()
            .into_iter()
            .map(|angle| Ray::new(self.sensor_id, self.position, angle, self.color.clone(), *params))
            .collect();
        log::debug!("Sensor {}: emitted {} rays", self.sensor_id, rays.len());
        rays
    }

    /// Whether `point` lies inside the sensor's rectangular footprint.
    ///
    /// Not used for echo detection, which relies on a radius test.
    #[allow(dead_code)]
    pub fn contains(&self, point: &Point) -> bool {
        point_in_rect(
            point,
            &RectPos {
                center: self.position,
                width: self.width,
                height: self.height,
            },
        )
    }
}
