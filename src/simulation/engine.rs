//! Time-stepped simulation engine.
//!
//! Each frame runs three phases:
//! - Emission: every sensor whose `next_emission_time` has been reached fires
//!   a fan of rays; each ray's echo geometry is solved right away
//! - Position update: every emission group (groups are never pruned) samples
//!   its rays at `global_time - emission_time`
//! - Detection: returning rays within `detection_tolerance` of a sensor other
//!   than their emitter register one echo per (ray, sensor) pair
//!
//! All mutable state is owned by the engine and touched only by the frame loop.
//! The optional trace recorder is the only part that leaves the loop thread.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::common::config::{ConfigError, SimulationParameters};
use crate::common::scene::{Scene, validate_scene};
use crate::common::types::Point;

use super::geometry::{Surface, distance2};
use super::ray::{Phase, RayParameters};
use super::recorder::TraceRecorder;
use super::sensor::Sensor;
use super::types::{DetectionEvent, EMISSION_GROUP_WARNING_THRESHOLD, EmissionGroup, ParticleStats, ParticleStatsReport};

/// Everything a finished (or aborted) run hands to the persistence boundary.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    /// Append-only echo log, in detection order.
    pub detections: Vec<DetectionEvent>,
    pub particle_stats: ParticleStatsReport,
    pub frames_run: usize,
    /// True when the run stopped on the cancellation flag.
    pub aborted: bool,
}

pub struct SimulationEngine {
    surface: Surface,
    sensors: Vec<Sensor>,
    params: SimulationParameters,
    ray_params: RayParameters,
    groups: Vec<EmissionGroup>,
    detections: Vec<DetectionEvent>,
    particle_stats: BTreeMap<u32, ParticleStats>,
    recorder: TraceRecorder,
    rng: StdRng,
    frame: usize,
    growth_warned: bool,
}

impl SimulationEngine {
    /// Build an engine from a scene. Any configuration problem is reported
    /// here, before a single frame runs.
    pub fn new(scene: &Scene, params: SimulationParameters) -> Result<Self, ConfigError> {
        validate_scene(scene).map_err(ConfigError::ValidationError)?;
        params.validate().map_err(ConfigError::ValidationError)?;

        let surface = Surface::new(scene.surface.iter().copied().map(Point::from).collect())?;
        let sensors = scene.sensors.iter().map(Sensor::from_config).collect::<Result<Vec<_>, _>>()?;

        // Every sensor lists every emitter, itself included; self-echoes are never counted.
        let sensor_ids: Vec<u32> = sensors.iter().map(|s| s.sensor_id).collect();
        let particle_stats = sensors
            .iter()
            .map(|sensor| (sensor.sensor_id, ParticleStats::new(sensor.position, sensor_ids.iter().copied())))
            .collect();

        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let ray_params = RayParameters {
            speed: params.speed_of_sound,
            loss_fraction: params.loss_fraction,
            dispersion_deg: params.dispersion_deg,
        };

        Ok(Self {
            surface,
            sensors,
            params,
            ray_params,
            groups: Vec::new(),
            detections: Vec::new(),
            particle_stats,
            recorder: TraceRecorder::disabled(),
            rng,
            frame: 0,
            growth_warned: false,
        })
    }

    /// Enable the position trace when `trace_every_frames > 0`.
    pub fn with_trace(mut self, trace_path: PathBuf) -> Self {
        self.recorder = TraceRecorder::new(trace_path, self.params.trace_every_frames, self.params.trace_flush_interval);
        self
    }

    /// Run every remaining frame, or stop early once `cancel` is set.
    /// An aborted run still returns what it accumulated.
    pub fn run(mut self, cancel: Option<&AtomicBool>) -> SimulationOutcome {
        log::info!(
            "Starting simulation: {} frames over {:.2} s, {} sensors, {} surface segments",
            self.params.frames,
            self.params.total_time,
            self.sensors.len(),
            self.surface.segments().len()
        );

        let mut aborted = false;
        while self.frame < self.params.frames {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                log::warn!("Simulation aborted at frame {}/{}", self.frame, self.params.frames);
                aborted = true;
                break;
            }
            self.step();
        }

        self.finish(aborted)
    }

    /// Advance one frame. Returns `false` once all frames have run.
    pub fn step(&mut self) -> bool {
        if self.frame >= self.params.frames {
            return false;
        }
        let global_time = self.params.global_time(self.frame);

        self.emit_due(global_time);
        self.sample_and_detect(global_time);
        self.recorder.end_frame(self.frame);

        log::debug!(
            "Frame {}/{} (t = {:.3} s): {} groups, {} detections",
            self.frame + 1,
            self.params.frames,
            global_time,
            self.groups.len(),
            self.detections.len()
        );
        self.frame += 1;
        true
    }

    /// Stop the run: flush the trace and hand over the results.
    pub fn finish(mut self, aborted: bool) -> SimulationOutcome {
        self.recorder.finish();

        let particle_stats = ParticleStatsReport::new(self.particle_stats);
        log::info!(
            "Simulation {}: {} frames, {} emission groups, {} detections, {} echoes received",
            if aborted { "aborted" } else { "finished" },
            self.frame,
            self.groups.len(),
            self.detections.len(),
            particle_stats.statistics.total_received
        );

        SimulationOutcome {
            detections: self.detections,
            particle_stats,
            frames_run: self.frame,
            aborted,
        }
    }

    fn emit_due(&mut self, global_time: f64) {
        for sensor in &mut self.sensors {
            if sensor.next_emission_time > global_time {
                continue;
            }

            let mut rays = sensor.emit_rays(&self.ray_params);
            for ray in &mut rays {
                ray.propagate(&self.surface, &mut self.rng);
                self.recorder.record_collision(ray);
            }
            let echoing = rays.iter().filter(|r| r.has_collision()).count();
            log::debug!(
                "Sensor {} fired {} rays at t = {:.3} s ({} hit the surface)",
                sensor.sensor_id,
                rays.len(),
                global_time,
                echoing
            );

            if let Some(stats) = self.particle_stats.get_mut(&sensor.sensor_id) {
                stats.emitted += rays.len() as u64;
            }
            self.groups.push(EmissionGroup {
                sensor_id: sensor.sensor_id,
                rays,
                emission_time: global_time,
            });
            sensor.next_emission_time += sensor.period();
        }

        if !self.growth_warned && self.groups.len() > EMISSION_GROUP_WARNING_THRESHOLD {
            log::warn!(
                "{} emission groups alive; groups are never pruned, so each frame keeps getting slower",
                self.groups.len()
            );
            self.growth_warned = true;
        }
    }

    fn sample_and_detect(&mut self, global_time: f64) {
        let recording = self.recorder.is_recording(self.frame);
        let tolerance2 = self.params.detection_tolerance * self.params.detection_tolerance;

        for group in &mut self.groups {
            let emitter_id = group.sensor_id;
            let t_local = global_time - group.emission_time;
            for ray in &mut group.rays {
                let (position, phase) = ray.position_at_time(t_local);
                if recording {
                    self.recorder.record_position(ray, t_local, position, phase);
                }
                if phase != Phase::Return {
                    continue;
                }
                let Some(response_time) = ray.echo().map(|echo| echo.response_time()) else {
                    continue;
                };

                for sensor in &self.sensors {
                    if sensor.sensor_id == emitter_id || ray.is_detected_by(sensor.sensor_id) {
                        continue;
                    }
                    if distance2(&position, &sensor.position) >= tolerance2 {
                        continue;
                    }

                    ray.mark_detected(sensor.sensor_id);
                    let event = DetectionEvent::new(sensor.sensor_id, ray, response_time);
                    log::debug!(
                        "Sensor {} received {} echo from sensor {} ({:.1}°, {:.2} ms)",
                        event.receiver_id,
                        ray.color,
                        event.emitter_id,
                        event.angle_deg,
                        event.response_time_ms
                    );
                    if let Some(stats) = self.particle_stats.get_mut(&sensor.sensor_id) {
                        *stats.received.entry(emitter_id).or_insert(0) += 1;
                    }
                    self.detections.push(event);
                }
            }
        }
    }
}
