//! A single emitted pulse.
//!
//! The echo geometry of a ray is solved analytically once, right after
//! emission (`Ray::propagate`). The frame loop afterwards only samples
//! positions with `Ray::position_at_time`, which never touches the echo state.

use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::common::types::{Point, Vector};

use super::geometry::{Segment, Surface, reflect, rotate};

/// Medium properties shared by every ray of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayParameters {
    /// Outbound speed (world units per second).
    pub speed: f64,
    /// Fraction of speed lost on the return leg.
    pub loss_fraction: f64,
    /// Half-angle of the random reflection perturbation (deg).
    pub dispersion_deg: f64,
}

impl RayParameters {
    /// Speed on the return leg: `speed * (1 - loss_fraction)`.
    pub fn return_speed(&self) -> f64 {
        self.speed * (1.0 - self.loss_fraction)
    }
}

/// Leg of the trajectory a sampled position lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Out,
    Return,
}

/// Collision and return leg of a ray that hit the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Echo {
    pub collision_point: Point,
    pub hit_segment: Segment,
    /// Outbound travel time (s).
    pub t_out: f64,
    /// Unit direction of the return leg, dispersion included.
    pub reflection_direction: Vector,
    /// Return travel time (s).
    pub t_return: f64,
}

impl Echo {
    /// Total time from emission to the echo: `t_out + t_return` (s).
    pub fn response_time(&self) -> f64 {
        self.t_out + self.t_return
    }
}

/// Outcome of `Ray::propagate`. Decided once and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Propagation {
    /// `propagate` has not run yet.
    Pending,
    /// No surface in the way: the ray stays on its outbound leg forever.
    Escaped,
    Echo(Echo),
}

#[derive(Debug, Clone)]
pub struct Ray {
    pub emitter_id: u32,
    pub origin: Point,
    pub emission_angle_deg: f64,
    /// Unit vector of the outbound leg.
    pub direction: Vector,
    /// Cosmetic tag inherited from the emitting sensor.
    pub color: String,
    params: RayParameters,
    propagation: Propagation,
    detected_by: BTreeSet<u32>,
}

impl Ray {
    pub fn new(emitter_id: u32, origin: Point, emission_angle_deg: f64, color: String, params: RayParameters) -> Self {
        Self {
            emitter_id,
            origin,
            emission_angle_deg,
            direction: Vector::from_angle_deg(emission_angle_deg),
            color,
            params,
            propagation: Propagation::Pending,
            detected_by: BTreeSet::new(),
        }
    }

    /// Resolve the collision with `surface` and the return leg.
    ///
    /// The dispersion angle is drawn here, once, uniformly from
    /// `[-dispersion_deg, +dispersion_deg]`. Calling this again is a no-op.
    pub fn propagate<R: Rng + ?Sized>(&mut self, surface: &Surface, rng: &mut R) {
        if self.propagation != Propagation::Pending {
            log::warn!(
                "Ray {:.1}° of sensor {} already propagated, keeping the first outcome",
                self.emission_angle_deg,
                self.emitter_id
            );
            return;
        }

        let Some(hit) = surface.ray_intersection(&self.origin, &self.direction) else {
            self.propagation = Propagation::Escaped;
            return;
        };
        let Some(normal) = hit.segment.normal_facing(&self.direction) else {
            // Zero-length segments can't be crossed by a non-parallel ray.
            self.propagation = Propagation::Escaped;
            return;
        };

        let distance_out = (hit.point - self.origin).length();
        let t_out = distance_out / self.params.speed;

        let ideal = reflect(&self.direction, &normal);
        let delta_deg = if self.params.dispersion_deg > 0.0 {
            Uniform::new_inclusive(-self.params.dispersion_deg, self.params.dispersion_deg).sample(rng)
        } else {
            0.0
        };
        let reflection_direction = rotate(&ideal, delta_deg).normalize().unwrap_or(ideal);

        // The echo travels back over the outbound distance at the reduced speed.
        let t_return = distance_out / self.params.return_speed();

        self.propagation = Propagation::Echo(Echo {
            collision_point: hit.point,
            hit_segment: hit.segment,
            t_out,
            reflection_direction,
            t_return,
        });
    }

    pub fn echo(&self) -> Option<&Echo> {
        match &self.propagation {
            Propagation::Echo(echo) => Some(echo),
            _ => None,
        }
    }

    pub fn has_collision(&self) -> bool {
        self.echo().is_some()
    }

    /// Position `t_local` seconds after emission, and the leg it lies on.
    ///
    /// Pure: any number of calls, in any order, leave the ray unchanged.
    pub fn position_at_time(&self, t_local: f64) -> (Point, Phase) {
        match self.echo() {
            Some(echo) if t_local > echo.t_out => {
                let t_prime = t_local - echo.t_out;
                (echo.collision_point + echo.reflection_direction * (self.params.return_speed() * t_prime), Phase::Return)
            }
            _ => (self.origin + self.direction * (self.params.speed * t_local), Phase::Out),
        }
    }

    pub fn is_detected_by(&self, sensor_id: u32) -> bool {
        self.detected_by.contains(&sensor_id)
    }

    /// Register an echo at `sensor_id`. Returns `false` if it was already registered.
    pub fn mark_detected(&mut self, sensor_id: u32) -> bool {
        self.detected_by.insert(sensor_id)
    }
}
