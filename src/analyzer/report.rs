//! Console output of the analysis.

use std::fmt::Write;

use crate::simulation::types::ReceptionSummary;

use super::types::AnalysisSummary;

/// Reception totals per region, as printed after a run and by the analyzer.
pub fn format_reception_summary(reception: &ReceptionSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Total particles received: {}", reception.total_received);
    let _ = writeln!(out, "Left (x < 0): {} ({:.2}%)", reception.left.count, reception.left.percentage);
    let _ = writeln!(out, "Center (x = 0): {} ({:.2}%)", reception.center.count, reception.center.percentage);
    let _ = writeln!(out, "Right (x > 0): {} ({:.2}%)", reception.right.count, reception.right.percentage);
    out
}

pub fn format_report(summary: &AnalysisSummary) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "\nPer-group statistics:");
    for report in &summary.first_pass.reports {
        let _ = writeln!(out, "\n{}:", report.key);
        let _ = writeln!(out, "  filtered_mean_ms: {:.4}", report.filtered_mean_ms);
        let _ = writeln!(out, "  origin_mean_ms: {:.4}", report.origin_mean_ms);
        if let Some(diff) = report.time_difference_ms {
            let _ = writeln!(out, "  time_difference_ms: {:.4}", diff);
        }
        let _ = writeln!(out, "  raw_distance_m: {:.4}", report.raw_distance_m);
        if let Some(corrected) = report.corrected_distance_m {
            let _ = writeln!(out, "  corrected_distance_m: {:.4}", corrected);
        }
        let _ = writeln!(out, "  minor_leg_m: {:.4}", report.minor_leg_m);
        let _ = writeln!(out, "  major_leg_m: {:.4}", report.major_leg_m);
        let _ = writeln!(out, "  samples_used: {}", report.samples_used);
    }
    let _ = writeln!(out, "\nAccumulated offset: {:.4} ms", summary.first_pass.offset_ms);

    let _ = writeln!(out, "\nFinal per-group statistics:");
    for report in &summary.finals {
        let _ = writeln!(out, "\n{}:", report.key);
        let _ = writeln!(out, "  final_mean_ms: {:.4}", report.corrected_mean_ms);
        let _ = writeln!(out, "  final_distance_m: {:.4}", report.final_distance_m);
    }

    match &summary.reception {
        Some(reception) => {
            let _ = writeln!(out);
            out.push_str(&format_reception_summary(reception));
        }
        None => {
            let _ = writeln!(out, "\nNo reception statistics available.");
        }
    }
    if let Some(distance) = summary.weighted_distance_m {
        let _ = writeln!(out, "\nWeighted final distance: {:.4} m", distance);
    }
    if let Some(inclination) = summary.inclination_deg {
        let _ = writeln!(out, "Surface inclination: {:.2} degrees", inclination);
    }
    out
}

pub fn print_report(summary: &AnalysisSummary) {
    print!("{}", format_report(summary));
}
