mod common;

use common::synthetic::{color_sensor, white_sensor, LatticeSpec};
use lfp_align::alignment::{stretched_cols, ResamplingEngine};
use lfp_align::params::{Interpolation, ResampleMode, ResampleParams};
use lfp_align::{CancelToken, CentroidList, Progress};

fn truth(spec: &LatticeSpec) -> CentroidList {
    CentroidList::from_positions(&spec.centers(), spec.rows, spec.cols, spec.pattern).unwrap()
}

fn engine(mn: usize, interpolation: Interpolation, mode: ResampleMode) -> ResamplingEngine {
    ResamplingEngine::new(ResampleParams {
        patch_size: mn,
        interpolation,
        mode,
    })
}

#[test]
fn output_shape_follows_lattice_and_patch_size() {
    common::init_logging();
    let rect = LatticeSpec::rect(6, 7, 12.0);
    let hex = LatticeSpec::hex(6, 7, 12.0, true);
    let token = CancelToken::new();
    let progress = Progress::silent(&token);
    for mn in [3, 5, 7] {
        for (spec, mode, cols) in [
            (rect, ResampleMode::Standard, 7),
            (hex, ResampleMode::Standard, stretched_cols(7)),
            (hex, ResampleMode::HexAlternate, stretched_cols(7)),
        ] {
            let lf = engine(mn, Interpolation::Cubic, mode)
                .resample(&white_sensor(&spec), &truth(&spec), &progress)
                .unwrap()
                .unwrap();
            assert_eq!(lf.patch, mn);
            assert_eq!(lf.shape(), (6 * mn, cols * mn, 1), "{:?} {mode:?} mn {mn}", spec.pattern);
        }
    }
}

#[test]
fn every_channel_is_resampled() {
    let spec = LatticeSpec::hex(5, 6, 14.0, false);
    let token = CancelToken::new();
    let lf = engine(5, Interpolation::Linear, ResampleMode::Standard)
        .resample(&color_sensor(&spec), &truth(&spec), &Progress::silent(&token))
        .unwrap()
        .unwrap();
    assert_eq!(lf.shape(), (25, stretched_cols(6) * 5, 3));
    let max: Vec<f32> = lf.planes.iter().map(|p| p.max_value()).collect();
    assert!(max[0] > max[1] && max[1] > max[2], "{max:?}");
    assert!((max[1] / max[0] - 0.8).abs() < 1e-3);
}

#[test]
fn oversized_and_even_patches_are_adjusted() {
    let spec = LatticeSpec::rect(4, 5, 10.0);
    let token = CancelToken::new();
    let progress = Progress::silent(&token);
    let list = truth(&spec);
    let image = white_sensor(&spec);
    let even = engine(6, Interpolation::Nearest, ResampleMode::Standard)
        .resample(&image, &list, &progress)
        .unwrap()
        .unwrap();
    assert_eq!(even.patch, 5);
    let oversized = engine(15, Interpolation::Quintic, ResampleMode::Standard)
        .resample(&image, &list, &progress)
        .unwrap()
        .unwrap();
    assert_eq!(oversized.patch, 9);
    assert_eq!(oversized.shape(), (36, 45, 1));
}

#[test]
fn rectangular_patches_copy_the_sensor_at_integer_centres() {
    let mut spec = LatticeSpec::rect(3, 4, 12.0);
    spec.origin = [20.0, 18.0];
    let token = CancelToken::new();
    let image = white_sensor(&spec);
    let lf = engine(5, Interpolation::Cubic, ResampleMode::Standard)
        .resample(&image, &truth(&spec), &Progress::silent(&token))
        .unwrap()
        .unwrap();
    let plane = &image.planes()[0];
    for c in spec.centers() {
        let (row, col) = (((c[0] - 20.0) / 12.0) as usize, ((c[1] - 18.0) / 12.0) as usize);
        let mi = lf.micro_image(row, col, 0);
        for i in 0..5 {
            for j in 0..5 {
                let expected = plane.get(c[1] as usize + j - 2, c[0] as usize + i - 2);
                assert!((mi.get(j, i) - expected).abs() < 1e-5);
            }
        }
    }
}

#[test]
fn cancelled_resampling_returns_none() {
    let spec = LatticeSpec::hex(5, 5, 12.0, true);
    let token = CancelToken::new();
    token.cancel();
    let out = engine(5, Interpolation::Cubic, ResampleMode::Standard)
        .resample(&white_sensor(&spec), &truth(&spec), &Progress::silent(&token))
        .unwrap();
    assert!(out.is_none());
}
