use super::TimingBreakdown;
use crate::lattice::{CentroidList, Pattern};
use crate::params::{FitMode, Interpolation, ResampleMode, ResidualMode};
use serde::Serialize;

/// Lattice as indexed by the sorter (or loaded from disk).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatticeSummary {
    pub pattern: Pattern,
    pub rows: usize,
    pub cols: usize,
    /// `[vertical, horizontal]` pitch in pixels.
    pub pitch: [f64; 2],
    pub hex_odd: bool,
}

impl LatticeSummary {
    pub fn of(list: &CentroidList) -> Self {
        let g = list.geometry();
        Self {
            pattern: g.pattern,
            rows: list.rows(),
            cols: list.cols(),
            pitch: g.pitch,
            hex_odd: g.hex_odd,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitSummary {
    pub mode: FitMode,
    pub residual: ResidualMode,
    pub rmse_px: f64,
    pub iterations: usize,
    /// Row-major ideal-to-sensor homography.
    pub homography: [[f64; 3]; 3],
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationReport {
    /// Micro-image diameter `M` used for extraction.
    pub diameter: usize,
    /// `true` when `M` came from the configuration instead of the estimator.
    pub diameter_configured: bool,
    /// Scale-space diameter before the lattice spacing was measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coarse_diameter: Option<usize>,
    pub candidates: usize,
    pub refined: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lattice: Option<LatticeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitSummary>,
    /// Why the grid fit was skipped, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit_fallback: Option<String>,
    /// Loaded from a previous run instead of recomputed.
    pub cached: bool,
    pub timings: TimingBreakdown,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentReport {
    pub lattice: LatticeSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_deg: Option<f64>,
    pub requested_patch: usize,
    pub patch: usize,
    pub interpolation: Interpolation,
    pub mode: ResampleMode,
    /// `[height, width, channels]` of the aligned light field.
    pub shape: [usize; 3],
    pub timings: TimingBreakdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::grid_gen;

    #[test]
    fn calibration_report_serializes_camel_case() {
        let positions: Vec<[f64; 2]> = grid_gen(3, 4, Pattern::Rectangular, false, false)
            .iter()
            .map(|m| [m.y * 10.0, m.x * 10.0])
            .collect();
        let list = CentroidList::from_positions(&positions, 3, 4, Pattern::Rectangular).unwrap();
        let report = CalibrationReport {
            diameter: 10,
            lattice: Some(LatticeSummary::of(&list)),
            ..CalibrationReport::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["diameter"], 10);
        assert_eq!(json["lattice"]["pattern"], "rec");
        assert_eq!(json["lattice"]["hexOdd"], false);
        assert!(json.get("fit").is_none());
        assert!(json["timings"]["stages"].as_array().unwrap().is_empty());
    }
}
