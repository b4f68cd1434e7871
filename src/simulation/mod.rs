//! Echo-ranging simulation core.
//!
//! ## Module Organization
//!
//! - `geometry`: Surface polyline, ray/segment intersection, reflection
//! - `ray`: One emitted pulse, solved once and sampled every frame
//! - `sensor`: Emission fans and sensor footprint
//! - `engine`: Frame loop with emission scheduling and echo detection
//! - `recorder`: Optional position/collision trace written off-thread
//! - `export`: Persisted detections and particle statistics
//! - `types`: Records produced by a run

pub mod engine;
pub mod export;
pub mod geometry;
pub mod ray;
pub mod recorder;
pub mod sensor;
pub mod types;

pub use engine::{SimulationEngine, SimulationOutcome};
pub use export::export_outcome;
