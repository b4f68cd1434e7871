//! Optional trace of ray positions and collisions.
//!
//! The recorder is owned by the engine. Records are buffered per frame and
//! shipped to a dedicated writer thread, which rewrites the trace file every
//! `flush_interval` recorded frames and once more when the recorder finishes
//! or is dropped. Write failures are logged and never stop the simulation.

use anyhow::Context;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};

use crate::common::types::Point;

use super::ray::{Phase, Ray};

/// One entry of the trace file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TraceRecord {
    Position {
        angle_deg: f64,
        phase: Phase,
        position: [f64; 2],
        /// Time since emission (s).
        time: f64,
    },
    Collision {
        angle_deg: f64,
        collision_point: [f64; 2],
        t_out: f64,
    },
}

enum WriterCommand {
    Append(Vec<TraceRecord>),
    Flush,
}

/// Outcome of the writer thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceSummary {
    pub records: usize,
    pub writes: usize,
    pub failed_writes: usize,
}

pub struct TraceRecorder {
    every_frames: usize,
    flush_interval: usize,
    recorded_frames: usize,
    pending: Vec<TraceRecord>,
    sender: Option<Sender<WriterCommand>>,
    writer: Option<JoinHandle<TraceSummary>>,
}

impl TraceRecorder {
    /// A recorder that never records.
    pub fn disabled() -> Self {
        Self {
            every_frames: 0,
            flush_interval: 0,
            recorded_frames: 0,
            pending: Vec::new(),
            sender: None,
            writer: None,
        }
    }

    /// Start a recorder writing to `path` every `every_frames` frames.
    /// `every_frames == 0` yields a disabled recorder.
    pub fn new(path: PathBuf, every_frames: usize, flush_interval: usize) -> Self {
        if every_frames == 0 {
            return Self::disabled();
        }

        let (sender, receiver) = channel();
        let spawned = thread::Builder::new()
            .name("trace-writer".to_string())
            .spawn(move || writer_loop(&path, receiver));

        match spawned {
            Ok(handle) => Self {
                every_frames,
                flush_interval: flush_interval.max(1),
                recorded_frames: 0,
                pending: Vec::new(),
                sender: Some(sender),
                writer: Some(handle),
            },
            Err(e) => {
                log::warn!("Failed to start trace writer, tracing disabled: {}", e);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Whether positions of `frame` go into the trace.
    pub fn is_recording(&self, frame: usize) -> bool {
        self.is_enabled() && frame % self.every_frames == 0
    }

    pub fn record_position(&mut self, ray: &Ray, t_local: f64, position: Point, phase: Phase) {
        if !self.is_enabled() {
            return;
        }
        self.pending.push(TraceRecord::Position {
            angle_deg: ray.emission_angle_deg,
            phase,
            position: position.to_array(),
            time: t_local,
        });
    }

    pub fn record_collision(&mut self, ray: &Ray) {
        if !self.is_enabled() {
            return;
        }
        if let Some(echo) = ray.echo() {
            self.pending.push(TraceRecord::Collision {
                angle_deg: ray.emission_angle_deg,
                collision_point: echo.collision_point.to_array(),
                t_out: echo.t_out,
            });
        }
    }

    /// Hand the frame's records to the writer; request a file rewrite every
    /// `flush_interval` recorded frames.
    pub fn end_frame(&mut self, frame: usize) {
        let Some(sender) = &self.sender else {
            return;
        };
        if !self.pending.is_empty() {
            let batch = std::mem::take(&mut self.pending);
            if sender.send(WriterCommand::Append(batch)).is_err() {
                log::warn!("Trace writer is gone, dropping trace records");
            }
        }
        if frame % self.every_frames == 0 {
            self.recorded_frames += 1;
            if self.recorded_frames % self.flush_interval == 0 {
                let _ = sender.send(WriterCommand::Flush);
            }
        }
    }

    /// Ship the remaining records, write the file one last time and wait
    /// for the writer to exit.
    pub fn finish(&mut self) -> Option<TraceSummary> {
        let sender = self.sender.take()?;
        if !self.pending.is_empty() {
            let _ = sender.send(WriterCommand::Append(std::mem::take(&mut self.pending)));
        }
        // Closing the channel makes the writer do its final write.
        drop(sender);

        let handle = self.writer.take()?;
        match handle.join() {
            Ok(summary) => {
                log::info!(
                    "Trace finished: {} records, {} writes ({} failed)",
                    summary.records,
                    summary.writes,
                    summary.failed_writes
                );
                Some(summary)
            }
            Err(_) => {
                log::warn!("Trace writer thread panicked");
                None
            }
        }
    }
}

impl Drop for TraceRecorder {
    fn drop(&mut self) {
        self.finish();
    }
}

fn writer_loop(path: &Path, receiver: Receiver<WriterCommand>) -> TraceSummary {
    let mut records: Vec<TraceRecord> = Vec::new();
    let mut summary = TraceSummary::default();

    let write = |records: &[TraceRecord], summary: &mut TraceSummary| {
        summary.writes += 1;
        if let Err(e) = write_trace(path, records) {
            summary.failed_writes += 1;
            log::warn!("Error saving trace data: {:#}", e);
        }
    };

    while let Ok(command) = receiver.recv() {
        match command {
            WriterCommand::Append(batch) => records.extend(batch),
            WriterCommand::Flush => write(&records, &mut summary),
        }
    }

    write(&records, &mut summary);
    summary.records = records.len();
    summary
}

/// Rewrite the whole trace file as a JSON array.
pub fn write_trace(path: &Path, records: &[TraceRecord]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records).with_context(|| format!("Failed to serialize trace to {}", path.display()))?;
    writer.flush().with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::geometry::Surface;
    use crate::simulation::ray::RayParameters;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("echo_ranging_{}_{}.json", name, std::process::id()))
    }

    fn echoing_ray() -> Ray {
        let surface = Surface::new(vec![Point::new(-10.0, 5.0), Point::new(10.0, 5.0)]).unwrap();
        let mut ray = Ray::new(
            0,
            Point::new(0.0, 0.0),
            90.0,
            "red".to_string(),
            RayParameters {
                speed: 10.0,
                loss_fraction: 0.0,
                dispersion_deg: 0.0,
            },
        );
        ray.propagate(&surface, &mut StdRng::seed_from_u64(3));
        ray
    }

    #[test]
    fn disabled_recorder_records_nothing() {
        let mut recorder = TraceRecorder::new(temp_path("disabled"), 0, 10);
        assert!(!recorder.is_enabled());
        assert!(!recorder.is_recording(0));
        recorder.record_collision(&echoing_ray());
        recorder.end_frame(0);
        assert!(recorder.finish().is_none());
    }

    #[test]
    fn records_every_nth_frame_and_writes_on_finish() {
        let path = temp_path("every_nth");
        let ray = echoing_ray();
        let mut recorder = TraceRecorder::new(path.clone(), 2, 100);
        recorder.record_collision(&ray);
        for frame in 0..5 {
            let t_local = frame as f64 * 0.25;
            if recorder.is_recording(frame) {
                let (pos, phase) = ray.position_at_time(t_local);
                recorder.record_position(&ray, t_local, pos, phase);
            }
            recorder.end_frame(frame);
        }
        let summary = recorder.finish().unwrap();
        // Frames 0, 2, 4 plus one collision record.
        assert_eq!(summary.records, 4);
        assert_eq!(summary.failed_writes, 0);

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let entries = written.as_array().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0]["collision_point"][1], 5.0);
        assert_eq!(entries[1]["phase"], "out");
        assert_eq!(entries[3]["phase"], "return");
        assert_eq!(entries[3]["time"], 1.0);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn unwritable_path_is_reported_not_fatal() {
        let path = std::env::temp_dir().join("echo_ranging_missing_dir").join("nested").join("trace.json");
        let mut recorder = TraceRecorder::new(path, 1, 1);
        recorder.record_collision(&echoing_ray());
        recorder.end_frame(0);
        let summary = recorder.finish().unwrap();
        assert!(summary.failed_writes >= 1);
        assert_eq!(summary.records, 1);
    }
}
