mod common;

use common::synthetic::{white_sensor, LatticeSpec};
use lfp_align::image::io::save_planes_u16;
use lfp_align::params::{FitMode, ResampleMode};
use lfp_align::persist::CalibrationStore;
use lfp_align::{Aligner, CalibrationOutcome, Calibrator, CancelToken, CentroidList, Pattern, PipelineParams, Progress};

fn calibrate(spec: &LatticeSpec, params: PipelineParams) -> CalibrationOutcome {
    let token = CancelToken::new();
    Calibrator::new(params)
        .unwrap()
        .calibrate(&white_sensor(spec), &Progress::silent(&token))
        .unwrap()
        .expect("not cancelled")
}

fn params_with_diameter(diameter: usize) -> PipelineParams {
    let mut params = PipelineParams::default();
    params.pitch.diameter = Some(diameter);
    params
}

fn max_position_error(spec: &LatticeSpec, outcome: &CalibrationOutcome) -> f64 {
    outcome
        .centroids
        .positions()
        .iter()
        .zip(spec.centers())
        .map(|(p, t)| (p[0] - t[0]).hypot(p[1] - t[1]))
        .fold(0.0, f64::max)
}

#[test]
fn rectangular_white_image_calibrates() {
    common::init_logging();
    let spec = LatticeSpec::rect(15, 15, 12.0);
    let outcome = calibrate(&spec, params_with_diameter(12));
    let list = &outcome.centroids;
    assert_eq!(list.pattern(), Pattern::Rectangular);
    assert_eq!((list.rows(), list.cols()), (15, 15));
    let err = max_position_error(&spec, &outcome);
    assert!(err < 0.5, "max centre error {err}");
    let pitch = list.geometry().mean_pitch();
    assert!((pitch - 12.0).abs() < 0.2, "pitch {pitch}");

    let report = &outcome.report;
    assert!(report.diameter_configured);
    assert_eq!(report.diameter, 12);
    assert!(report.candidates >= 225);
    assert_eq!(report.refined, report.candidates);
    assert!(report.fit.is_some());
    assert!(outcome.response.is_some());
}

#[test]
fn hexagonal_white_image_calibrates() {
    common::init_logging();
    let spec = LatticeSpec::hex(13, 15, 14.0, false);
    let outcome = calibrate(&spec, params_with_diameter(14));
    let list = &outcome.centroids;
    assert_eq!(list.pattern(), Pattern::Hexagonal);
    assert_eq!((list.rows(), list.cols()), (13, 15));
    assert!(!list.geometry().hex_odd);
    let err = max_position_error(&spec, &outcome);
    assert!(err < 0.5, "max centre error {err}");
}

#[test]
fn unfitted_lattice_is_kept_when_fit_is_off() {
    let spec = LatticeSpec::rect(8, 9, 12.0);
    let mut params = params_with_diameter(12);
    params.fit.mode = FitMode::Off;
    let outcome = calibrate(&spec, params);
    assert!(outcome.report.fit.is_none());
    assert!(outcome.report.fit_fallback.is_none());
    assert_eq!((outcome.centroids.rows(), outcome.centroids.cols()), (8, 9));
}

#[test]
fn rectangular_alignment_centres_every_micro_image() {
    common::init_logging();
    let spec = LatticeSpec::rect(10, 12, 12.0);
    let outcome = calibrate(&spec, params_with_diameter(12));
    let mut params = PipelineParams::default();
    params.resample.patch_size = 9;
    let token = CancelToken::new();
    let aligned = Aligner::new(params)
        .unwrap()
        .align(&white_sensor(&spec), &outcome.centroids, &Progress::silent(&token))
        .unwrap()
        .unwrap();
    let lf = &aligned.light_field;
    assert_eq!(lf.shape(), (90, 108, 1));
    assert_eq!(aligned.report.shape, [90, 108, 1]);
    assert!(aligned.report.rotation_deg.is_none());
    for row in 0..10 {
        for col in 0..12 {
            let mi = lf.micro_image(row, col, 0);
            let centre = mi.get(4, 4);
            assert!(centre > 0.9, "({row}, {col}) centre {centre}");
            assert!(mi.get(0, 4) < centre && mi.get(8, 4) < centre);
        }
    }
}

#[test]
fn hexagonal_alignment_is_stretched_to_a_square_grid() {
    let spec = LatticeSpec::hex(9, 10, 14.0, false);
    let outcome = calibrate(&spec, params_with_diameter(14));
    for mode in [ResampleMode::Standard, ResampleMode::HexAlternate] {
        let mut params = PipelineParams::default();
        params.resample.patch_size = 7;
        params.resample.mode = mode;
        params.rotate.enabled = true;
        let token = CancelToken::new();
        let aligned = Aligner::new(params)
            .unwrap()
            .align(&white_sensor(&spec), &outcome.centroids, &Progress::silent(&token))
            .unwrap()
            .unwrap();
        let lf = &aligned.light_field;
        assert_eq!(lf.shape(), (9 * 7, 12 * 7, 1));
        let rotation = aligned.report.rotation_deg.unwrap();
        assert!(rotation.abs() < 0.1, "rotation {rotation}");
        assert!(lf.planes[0].data.iter().all(|v| v.is_finite()));
        assert!(lf.planes[0].max_value() > 0.9);
    }
}

#[test]
fn cached_calibration_round_trips_through_the_store() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let white_path = dir.path().join("white.png");
    let spec = LatticeSpec::rect(9, 11, 12.0);
    let white = common::synthetic::white_image(&spec);
    save_planes_u16(std::slice::from_ref(&white), &white_path).unwrap();

    let store = CalibrationStore::for_white_image(&white_path);
    assert!(store.path().ends_with("white.lfcal.json"));
    let calibrator = Calibrator::new(params_with_diameter(12)).unwrap();
    let token = CancelToken::new();
    let progress = Progress::silent(&token);

    let first = calibrator
        .calibrate_cached(&white_path, &store, false, None, &progress)
        .unwrap()
        .unwrap();
    assert!(!first.report.cached);
    assert!(store.exists());

    let second = calibrator
        .calibrate_cached(&white_path, &store, false, None, &progress)
        .unwrap()
        .unwrap();
    assert!(second.report.cached);
    assert!(second.response.is_none());
    assert_eq!(second.centroids.rows(), first.centroids.rows());
    assert_eq!(second.centroids.cols(), first.centroids.cols());
    for (a, b) in first.centroids.positions().iter().zip(second.centroids.positions()) {
        assert!((a[0] - b[0]).abs() < 1e-9 && (a[1] - b[1]).abs() < 1e-9);
    }

    let forced = calibrator
        .calibrate_cached(&white_path, &store, true, None, &progress)
        .unwrap()
        .unwrap();
    assert!(!forced.report.cached);
}

#[test]
fn stale_stored_lattice_is_recalibrated() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let white_path = dir.path().join("white.png");
    let spec = LatticeSpec::rect(9, 11, 12.0);
    save_planes_u16(std::slice::from_ref(&common::synthetic::white_image(&spec)), &white_path).unwrap();

    let store = CalibrationStore::for_white_image(&white_path);
    let stale: Vec<[f64; 2]> = LatticeSpec::rect(5, 6, 12.0).centers();
    store
        .save(&CentroidList::from_positions(&stale, 5, 6, Pattern::Rectangular).unwrap())
        .unwrap();

    let calibrator = Calibrator::new(params_with_diameter(12)).unwrap();
    let token = CancelToken::new();
    let progress = Progress::silent(&token);

    let unchecked = calibrator
        .calibrate_cached(&white_path, &store, false, None, &progress)
        .unwrap()
        .unwrap();
    assert!(unchecked.report.cached);
    assert_eq!((unchecked.centroids.rows(), unchecked.centroids.cols()), (5, 6));

    let fresh = calibrator
        .calibrate_cached(&white_path, &store, false, Some((9, 11)), &progress)
        .unwrap()
        .unwrap();
    assert!(!fresh.report.cached);
    assert_eq!((fresh.centroids.rows(), fresh.centroids.cols()), (9, 11));

    let reused = calibrator
        .calibrate_cached(&white_path, &store, false, Some((9, 11)), &progress)
        .unwrap()
        .unwrap();
    assert!(reused.report.cached);

    let mismatched = calibrator
        .calibrate_cached(&white_path, &store, false, Some((10, 11)), &progress)
        .unwrap()
        .unwrap();
    assert!(!mismatched.report.cached);
}
