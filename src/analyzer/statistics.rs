//! Two-pass timing correction pipeline.
//!
//! - Detections are grouped by (receiver, emitter, emitter coordinates)
//! - Pass 1 converts each group's filtered mean to a raw distance and sums the
//!   time differences of the non-origin groups against the origin group
//! - Pass 2 removes that offset (weighted per group kind) and converts again
//! - The final distances are averaged, weighted by how rarely each region
//!   receives echoes, and the reception shares give an inclination estimate
//!
//! Pass 1 must finish before pass 2 starts: the offset is only complete once
//! every group has been seen, so it is returned from one and passed to the other.

use std::cmp::Ordering;

use crate::common::config::AnalysisParameters;
use crate::common::types::Region;
use crate::simulation::types::{DetectionEvent, ReceptionSummary};

use super::types::{AnalysisSummary, DataError, DetectionGroup, FinalGroupReport, FirstPass, GroupKey, GroupReport, GroupedDetections};

const ORIGIN_GROUP: &str = "origin (0, 0)";

/// Group response times by (receiver, emitter, emitter coordinates).
/// Groups keep the order in which they first appear.
pub fn group_detections(detections: &[DetectionEvent]) -> GroupedDetections {
    let mut grouped = GroupedDetections::default();
    for event in detections {
        let key = GroupKey {
            receiver_id: event.receiver_id,
            emitter_id: event.emitter_id,
            emitter_coords: event.emitter_coords,
        };
        match grouped.groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.times_ms.push(event.response_time_ms),
            None => grouped.groups.push(DetectionGroup {
                key,
                times_ms: vec![event.response_time_ms],
            }),
        }
        if key.is_origin() {
            grouped.origin_times_ms.push(event.response_time_ms);
        }
    }
    grouped
}

/// Drop the `floor(percentage / 100 * n)` samples farthest from the mean.
///
/// The mean is summed over the sorted samples and samples are ranked by
/// (deviation, value), so the result does not depend on the input order.
/// The survivors come back in that ranking order.
pub fn filter_outliers(samples: &[f64], percentage: f64) -> Result<Vec<f64>, DataError> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let center = mean(&sorted)?;
    let mut ranked: Vec<(f64, f64)> = sorted.iter().map(|v| ((v - center).abs(), *v)).collect();
    ranked.sort_by(|a, b| match a.0.total_cmp(&b.0) {
        Ordering::Equal => a.1.total_cmp(&b.1),
        other => other,
    });

    let remove = ((percentage / 100.0) * samples.len() as f64).floor() as usize;
    ranked.truncate(samples.len().saturating_sub(remove));
    Ok(ranked.into_iter().map(|(_, v)| v).collect())
}

pub fn mean(samples: &[f64]) -> Result<f64, DataError> {
    if samples.is_empty() {
        return Err(DataError::EmptySamples { group: "unnamed".to_string() });
    }
    Ok(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Mean of the samples left after outlier filtering, and how many were left.
fn filtered_mean(samples: &[f64], percentage: f64, group: impl std::fmt::Display) -> Result<(f64, usize), DataError> {
    let kept = filter_outliers(samples, percentage).map_err(|e| e.in_group(&group))?;
    let value = mean(&kept).map_err(|e| e.in_group(&group))?;
    Ok((value, kept.len()))
}

/// Milliseconds to a distance: `ms / 1000 * speed / divisor`.
fn ms_to_distance(ms: f64, speed: f64, divisor: f64) -> f64 {
    ms / 1000.0 * speed / divisor
}

/// Longer leg of a right triangle, 0 when the hypotenuse is not the longest side.
fn major_leg(hypotenuse: f64, minor: f64) -> f64 {
    if hypotenuse <= minor {
        0.0
    } else {
        (hypotenuse * hypotenuse - minor * minor).sqrt()
    }
}

/// Pass 1: raw distances plus the offset accumulated over every non-origin group.
pub fn first_pass(grouped: &GroupedDetections, params: &AnalysisParameters) -> Result<FirstPass, DataError> {
    if grouped.groups.is_empty() {
        return Err(DataError::NoDetections);
    }
    let (origin_mean_ms, _) = filtered_mean(&grouped.origin_times_ms, params.outlier_percentage, ORIGIN_GROUP)?;

    let mut offset_ms = 0.0;
    let mut reports = Vec::with_capacity(grouped.groups.len());
    for group in &grouped.groups {
        let (filtered_mean_ms, samples_used) = filtered_mean(&group.times_ms, params.outlier_percentage, group.key)?;
        let raw_distance_m = ms_to_distance(filtered_mean_ms, params.speed_of_sound, params.raw_distance_divisor);
        let minor_leg_m = group.key.emitter_coords[0].abs();

        let (time_difference_ms, corrected_distance_m) = if group.key.is_origin() {
            (None, None)
        } else {
            let diff = filtered_mean_ms - origin_mean_ms;
            offset_ms += diff;
            let corrected = raw_distance_m - ms_to_distance(diff, params.speed_of_sound, params.raw_distance_divisor);
            (Some(diff), Some(corrected))
        };

        reports.push(GroupReport {
            key: group.key,
            filtered_mean_ms,
            origin_mean_ms,
            time_difference_ms,
            raw_distance_m,
            corrected_distance_m,
            minor_leg_m,
            major_leg_m: major_leg(raw_distance_m, minor_leg_m),
            samples_used,
        });
    }

    log::debug!("First pass over {} groups: accumulated offset {:.4} ms", reports.len(), offset_ms);
    Ok(FirstPass { reports, offset_ms })
}

/// Pass 2: remove `offset_ms` from every group's filtered mean and convert
/// with the final divisor.
pub fn second_pass(grouped: &GroupedDetections, offset_ms: f64, params: &AnalysisParameters) -> Result<Vec<FinalGroupReport>, DataError> {
    grouped
        .groups
        .iter()
        .map(|group| {
            let (filtered_mean_ms, _) = filtered_mean(&group.times_ms, params.outlier_percentage, group.key)?;
            let weight = if group.key.is_origin() {
                params.origin_calibration_weight
            } else {
                params.lateral_calibration_weight
            };
            let corrected_mean_ms = filtered_mean_ms - offset_ms * weight;
            Ok(FinalGroupReport {
                key: group.key,
                corrected_mean_ms,
                final_distance_m: ms_to_distance(corrected_mean_ms, params.speed_of_sound, params.final_distance_divisor),
            })
        })
        .collect()
}

/// Weight of a region: `1 - reception_percentage / 100`.
pub fn region_weight(reception: &ReceptionSummary, region: Region) -> f64 {
    1.0 - reception.region(region).percentage / 100.0
}

/// Average of the final distances, each weighted by its emitter's region.
pub fn weighted_distance(finals: &[FinalGroupReport], reception: &ReceptionSummary) -> Result<f64, DataError> {
    let mut weight_sum = 0.0;
    let mut weighted_sum = 0.0;
    for report in finals {
        let weight = region_weight(reception, report.key.region());
        weight_sum += weight;
        weighted_sum += report.final_distance_m * weight;
    }
    if weight_sum <= 0.0 {
        return Err(DataError::ZeroTotalWeight);
    }
    Ok(weighted_sum / weight_sum)
}

/// Surface inclination heuristic: `(right - left) + 0.5 * center`, on percentages.
pub fn inclination(reception: &ReceptionSummary) -> f64 {
    (reception.right.percentage - reception.left.percentage) + 0.5 * reception.center.percentage
}

/// Run the whole pipeline. Without reception shares the weighted average and
/// the inclination are skipped.
pub fn analyze(detections: &[DetectionEvent], reception: Option<&ReceptionSummary>, params: &AnalysisParameters) -> Result<AnalysisSummary, DataError> {
    let grouped = group_detections(detections);
    let first_pass = first_pass(&grouped, params)?;
    let finals = second_pass(&grouped, first_pass.offset_ms, params)?;

    let (weighted_distance_m, inclination_deg) = match reception {
        Some(reception) => (Some(weighted_distance(&finals, reception)?), Some(inclination(reception))),
        None => (None, None),
    };

    log::info!(
        "Analyzed {} detections in {} groups (offset {:.4} ms)",
        detections.len(),
        finals.len(),
        first_pass.offset_ms
    );

    Ok(AnalysisSummary {
        first_pass,
        finals,
        reception: reception.copied(),
        weighted_distance_m,
        inclination_deg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::RegionCount;

    fn event(receiver_id: u32, emitter_id: u32, x: f64, response_time_ms: f64) -> DetectionEvent {
        DetectionEvent {
            receiver_id,
            emitter_id,
            emitter_coords: [x, 0.0],
            angle_deg: 90.0,
            response_time_ms,
        }
    }

    fn reception(left: f64, center: f64, right: f64) -> ReceptionSummary {
        let count = |p: f64| RegionCount {
            count: p as u64,
            percentage: p,
        };
        ReceptionSummary {
            total_received: (left + center + right) as u64,
            left: count(left),
            center: count(center),
            right: count(right),
        }
    }

    fn final_report(x: f64, final_distance_m: f64) -> FinalGroupReport {
        FinalGroupReport {
            key: GroupKey {
                receiver_id: 1,
                emitter_id: 0,
                emitter_coords: [x, 0.0],
            },
            corrected_mean_ms: 0.0,
            final_distance_m,
        }
    }

    fn three_groups() -> Vec<DetectionEvent> {
        vec![
            event(0, 1, 0.0, 100.0),
            event(1, 0, -2.0, 110.0),
            event(0, 1, 0.0, 102.0),
            event(1, 2, 2.0, 105.0),
            event(1, 0, -2.0, 112.0),
        ]
    }

    #[test]
    fn grouping_keeps_first_appearance_order() {
        let grouped = group_detections(&three_groups());
        assert_eq!(grouped.groups.len(), 3);
        assert!(grouped.groups[0].key.is_origin());
        assert_eq!(grouped.groups[0].times_ms, vec![100.0, 102.0]);
        assert_eq!(grouped.groups[1].key.emitter_coords, [-2.0, 0.0]);
        assert_eq!(grouped.groups[1].times_ms, vec![110.0, 112.0]);
        assert_eq!(grouped.origin_times_ms, vec![100.0, 102.0]);
        assert_eq!(grouped.groups[2].key.to_string(), "R1_E2_(2, 0)");
    }

    #[test]
    fn outlier_filter_drops_most_deviant_share() {
        let samples = [14.0, 10.0, 100.0, 12.0, 13.0, 11.0, 15.0, 16.0, 17.0, 18.0];
        let kept = filter_outliers(&samples, 30.0).unwrap();
        assert_eq!(kept.len(), 7);
        for dropped in [100.0, 10.0, 11.0] {
            assert!(!kept.contains(&dropped));
        }

        let mut reversed = samples;
        reversed.reverse();
        assert_eq!(filter_outliers(&reversed, 30.0).unwrap(), kept);
    }

    fn permutations(values: &[f64]) -> Vec<Vec<f64>> {
        if values.len() <= 1 {
            return vec![values.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..values.len() {
            let mut rest = values.to_vec();
            let first = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, first);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn outlier_filter_ignores_input_order() {
        for (samples, percentage) in [(vec![0.1, 0.2, 0.3], 34.0), (vec![0.1, 0.7, 0.2, 0.3], 30.0), (vec![1.0, 2.0, 3.0, 4.0], 50.0)] {
            let expected = filter_outliers(&samples, percentage).unwrap();
            for order in permutations(&samples) {
                assert_eq!(filter_outliers(&order, percentage).unwrap(), expected, "order {:?}", order);
            }
        }
    }

    #[test]
    fn outlier_filter_breaks_ties_by_value() {
        assert_eq!(filter_outliers(&[3.0, 1.0], 50.0).unwrap(), vec![1.0]);
        assert_eq!(filter_outliers(&[5.0], 30.0).unwrap(), vec![5.0]);
    }

    #[test]
    fn empty_samples_are_a_data_error() {
        assert!(matches!(filter_outliers(&[], 30.0), Err(DataError::EmptySamples { .. })));
        assert!(mean(&[]).is_err());
    }

    #[test]
    fn missing_origin_group_is_reported_by_name() {
        let grouped = group_detections(&[event(1, 0, -2.0, 110.0)]);
        let err = first_pass(&grouped, &AnalysisParameters::default()).unwrap_err();
        assert_eq!(err, DataError::EmptySamples { group: ORIGIN_GROUP.to_string() });
        assert!(err.to_string().contains("origin"));

        assert_eq!(first_pass(&GroupedDetections::default(), &AnalysisParameters::default()), Err(DataError::NoDetections));
    }

    #[test]
    fn first_pass_accumulates_offset_over_lateral_groups() {
        let params = AnalysisParameters::default();
        let pass = first_pass(&group_detections(&three_groups()), &params).unwrap();

        // Lateral means 111 and 105 against an origin mean of 101.
        assert!((pass.offset_ms - 14.0).abs() < 1e-9);

        let origin = &pass.reports[0];
        assert_eq!(origin.time_difference_ms, None);
        assert_eq!(origin.corrected_distance_m, None);
        assert_eq!(origin.minor_leg_m, 0.0);
        assert!((origin.major_leg_m - origin.raw_distance_m).abs() < 1e-12);

        let left = &pass.reports[1];
        assert!((left.filtered_mean_ms - 111.0).abs() < 1e-9);
        assert!((left.origin_mean_ms - 101.0).abs() < 1e-9);
        assert!((left.time_difference_ms.unwrap() - 10.0).abs() < 1e-9);
        assert!((left.raw_distance_m - 19.0365).abs() < 1e-9);
        assert!((left.corrected_distance_m.unwrap() - (19.0365 - 1.715)).abs() < 1e-9);
        assert_eq!(left.minor_leg_m, 2.0);
        assert!((left.major_leg_m.powi(2) + 4.0 - left.raw_distance_m.powi(2)).abs() < 1e-9);
        assert_eq!(left.samples_used, 2);
    }

    #[test]
    fn second_pass_applies_offset_with_group_weights() {
        let params = AnalysisParameters::default();
        let grouped = group_detections(&three_groups());
        let finals = second_pass(&grouped, 14.0, &params).unwrap();

        // Origin: 101 - 14 * 0.78; lateral groups lose the full 14 ms.
        assert!((finals[0].corrected_mean_ms - 90.08).abs() < 1e-9);
        assert!((finals[1].corrected_mean_ms - 97.0).abs() < 1e-9);
        assert!((finals[2].corrected_mean_ms - 91.0).abs() < 1e-9);
        assert!((finals[0].final_distance_m - 90.08 / 1000.0 * 343.0 / 20.0).abs() < 1e-12);
        assert!((finals[1].final_distance_m - 1.66355).abs() < 1e-9);
    }

    #[test]
    fn divisors_are_independent() {
        let params = AnalysisParameters {
            final_distance_divisor: 2.0,
            ..Default::default()
        };
        let grouped = group_detections(&three_groups());
        let finals = second_pass(&grouped, 0.0, &params).unwrap();
        let pass = first_pass(&grouped, &params).unwrap();
        assert!((finals[1].final_distance_m - pass.reports[1].raw_distance_m).abs() < 1e-12);
    }

    #[test]
    fn weighted_average_matches_hand_computation() {
        let reception = reception(40.0, 20.0, 40.0);
        assert!((region_weight(&reception, Region::Left) - 0.6).abs() < 1e-12);
        assert!((region_weight(&reception, Region::Center) - 0.8).abs() < 1e-12);
        assert!((region_weight(&reception, Region::Right) - 0.6).abs() < 1e-12);

        let finals = [final_report(-2.0, 12.5), final_report(0.0, 20.0), final_report(2.0, 31.0)];
        // (12.5 * 0.6 + 20 * 0.8 + 31 * 0.6) / (0.6 + 0.8 + 0.6) = 42.1 / 2.0
        let value = weighted_distance(&finals, &reception).unwrap();
        assert!((value - 21.05).abs() < 1e-4);
    }

    #[test]
    fn zero_total_weight_is_a_data_error() {
        let reception = reception(100.0, 0.0, 0.0);
        let finals = [final_report(-2.0, 12.5), final_report(-1.0, 3.0)];
        assert_eq!(weighted_distance(&finals, &reception), Err(DataError::ZeroTotalWeight));
        assert_eq!(weighted_distance(&[], &reception), Err(DataError::ZeroTotalWeight));
    }

    #[test]
    fn inclination_heuristic() {
        assert!((inclination(&reception(40.0, 20.0, 40.0)) - 10.0).abs() < 1e-12);
        assert!((inclination(&reception(10.0, 30.0, 60.0)) - 65.0).abs() < 1e-12);
    }

    #[test]
    fn analyze_without_reception_skips_weighting() {
        let params = AnalysisParameters::default();
        let summary = analyze(&three_groups(), None, &params).unwrap();
        assert_eq!(summary.finals.len(), 3);
        assert_eq!(summary.weighted_distance_m, None);
        assert_eq!(summary.inclination_deg, None);

        let with = analyze(&three_groups(), Some(&reception(40.0, 20.0, 40.0)), &params).unwrap();
        assert!(with.weighted_distance_m.is_some());
        assert_eq!(with.inclination_deg, Some(10.0));
    }
}
