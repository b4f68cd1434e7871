//! Type definitions specific to the analyzer module.

use std::fmt;

use crate::common::types::{Point, Region};
use crate::simulation::types::ReceptionSummary;

/// Detections sharing receiver, emitter and emitter position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupKey {
    pub receiver_id: u32,
    pub emitter_id: u32,
    pub emitter_coords: [f64; 2],
}

impl GroupKey {
    /// True for the reference group whose emitter sits at the origin.
    pub fn is_origin(&self) -> bool {
        Point::from(self.emitter_coords).is_origin()
    }

    /// Region of the emitter, by the sign of its x coordinate.
    pub fn region(&self) -> Region {
        Region::from_x(self.emitter_coords[0])
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R{}_E{}_({}, {})",
            self.receiver_id, self.emitter_id, self.emitter_coords[0], self.emitter_coords[1]
        )
    }
}

/// Response times (ms) of one group, in detection order.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionGroup {
    pub key: GroupKey,
    pub times_ms: Vec<f64>,
}

/// Detections split into groups, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedDetections {
    pub groups: Vec<DetectionGroup>,
    /// Every response time whose emitter sits at the origin.
    pub origin_times_ms: Vec<f64>,
}

/// First pass result for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupReport {
    pub key: GroupKey,
    pub filtered_mean_ms: f64,
    pub origin_mean_ms: f64,
    /// `filtered_mean_ms - origin_mean_ms`; `None` for the origin group.
    pub time_difference_ms: Option<f64>,
    pub raw_distance_m: f64,
    /// Raw distance with this group's own time difference removed.
    pub corrected_distance_m: Option<f64>,
    /// `|x|` of the emitter.
    pub minor_leg_m: f64,
    /// `sqrt(raw² - minor²)`, 0 when the raw distance is not longer than the minor leg.
    pub major_leg_m: f64,
    pub samples_used: usize,
}

/// Output of the first pass. `offset_ms` feeds the second pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FirstPass {
    pub reports: Vec<GroupReport>,
    /// Sum of the time differences of every non-origin group.
    pub offset_ms: f64,
}

/// Second pass result for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalGroupReport {
    pub key: GroupKey,
    pub corrected_mean_ms: f64,
    pub final_distance_m: f64,
}

/// Everything the analysis prints.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSummary {
    pub first_pass: FirstPass,
    pub finals: Vec<FinalGroupReport>,
    /// Reception shares, when the particle statistics were available.
    pub reception: Option<ReceptionSummary>,
    pub weighted_distance_m: Option<f64>,
    pub inclination_deg: Option<f64>,
}

/// Invalid input to the statistics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum DataError {
    /// No detections to analyze at all.
    NoDetections,
    /// Outlier filtering or averaging on an empty sample set.
    EmptySamples { group: String },
    /// Every weight of the weighted average is zero.
    ZeroTotalWeight,
}

impl DataError {
    /// Attach the name of the group the failure belongs to.
    pub fn in_group(self, group: impl fmt::Display) -> Self {
        match self {
            DataError::EmptySamples { .. } => DataError::EmptySamples { group: group.to_string() },
            other => other,
        }
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::NoDetections => write!(f, "No detections to analyze"),
            DataError::EmptySamples { group } => write!(f, "Group {} has no samples", group),
            DataError::ZeroTotalWeight => write!(f, "Weighted average is undefined: total weight is zero"),
        }
    }
}

impl std::error::Error for DataError {}

/// Failure of the offline analysis entry point.
#[derive(Debug)]
pub enum AnalysisError {
    LoadError(String),
    DataError(DataError),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::LoadError(msg) => write!(f, "Failed to load analysis input: {}", msg),
            AnalysisError::DataError(e) => write!(f, "Statistics failed: {}", e),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl From<DataError> for AnalysisError {
    fn from(e: DataError) -> Self {
        AnalysisError::DataError(e)
    }
}
