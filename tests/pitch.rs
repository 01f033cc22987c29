mod common;

use common::init_logging;
use common::synthetic::{white_image, LatticeSpec};
use lfp_align::calibration::PitchEstimator;
use lfp_align::params::PitchParams;
use lfp_align::{CancelToken, Progress};

fn diameter_of(spec: &LatticeSpec) -> usize {
    let token = CancelToken::new();
    PitchEstimator::new(PitchParams::default())
        .estimate(&white_image(spec), &Progress::silent(&token))
        .expect("not cancelled")
        .diameter
}

#[test]
fn reference_pitches_are_recovered_exactly() {
    init_logging();
    for (pitch, n) in [(141, 8), (52, 12), (18, 20), (6, 40)] {
        let spec = LatticeSpec::rect(n, n, pitch as f64);
        assert_eq!(diameter_of(&spec), pitch, "rectangular pitch {pitch}");
    }
}

#[test]
fn hexagonal_pitches_are_recovered_exactly() {
    init_logging();
    for (pitch, n) in [(52, 12), (18, 20)] {
        let spec = LatticeSpec::hex(n, n, pitch as f64, false);
        assert_eq!(diameter_of(&spec), pitch, "hexagonal pitch {pitch}");
    }
}

#[test]
fn scale_space_alone_stays_near_the_pitch() {
    let token = CancelToken::new();
    let params = PitchParams {
        refine_lattice: false,
        ..PitchParams::default()
    };
    let estimator = PitchEstimator::new(params);
    let mut previous = 0;
    for (pitch, n) in [(6, 40), (18, 20), (52, 12)] {
        let est = estimator
            .estimate(&white_image(&LatticeSpec::rect(n, n, pitch as f64)), &Progress::silent(&token))
            .unwrap();
        assert!(est.spacing.is_none());
        assert_eq!(est.diameter, est.coarse_diameter);
        let ratio = est.diameter as f64 / pitch as f64;
        assert!(ratio > 0.7 && ratio < 1.3, "pitch {pitch}: coarse {}", est.diameter);
        assert!(est.diameter > previous);
        previous = est.diameter;
    }
}
