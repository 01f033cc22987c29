mod common;

use common::synthetic::{white_sensor, LatticeSpec};
use lfp_align::{Aligner, Calibrator, CancelToken, PipelineParams, Progress, StatusSink};
use std::cell::Cell;

/// Cancels the job after `trip_after` progress events and counts anything
/// reported afterwards.
struct TripSink {
    token: CancelToken,
    trip_after: usize,
    events: Cell<usize>,
    after_trip: Cell<usize>,
}

impl TripSink {
    fn new(token: &CancelToken, trip_after: usize) -> Self {
        Self {
            token: token.clone(),
            trip_after,
            events: Cell::new(0),
            after_trip: Cell::new(0),
        }
    }

    fn record(&self) {
        if self.token.is_cancelled() {
            self.after_trip.set(self.after_trip.get() + 1);
            return;
        }
        self.events.set(self.events.get() + 1);
        if self.events.get() >= self.trip_after {
            self.token.cancel();
        }
    }
}

impl StatusSink for TripSink {
    fn report_status(&self, _message: &str) {
        self.record();
    }

    fn report_progress(&self, _percent: Option<f32>) {
        self.record();
    }
}

fn params() -> PipelineParams {
    let mut params = PipelineParams::default();
    params.pitch.diameter = Some(12);
    params
}

#[test]
fn calibration_stops_silently_at_every_trip_point() {
    common::init_logging();
    let white = white_sensor(&LatticeSpec::rect(12, 12, 12.0));
    let calibrator = Calibrator::new(params()).unwrap();
    for trip_after in [1, 3, 10, 60] {
        let token = CancelToken::new();
        let sink = TripSink::new(&token, trip_after);
        let progress = Progress::new(&token, &sink);
        let outcome = calibrator.calibrate(&white, &progress).unwrap();
        assert!(outcome.is_none(), "trip after {trip_after} still finished");
        assert_eq!(sink.after_trip.get(), 0);
    }
}

#[test]
fn cancelled_token_short_circuits_alignment() {
    let spec = LatticeSpec::rect(8, 8, 12.0);
    let token = CancelToken::new();
    let calibration = Calibrator::new(params())
        .unwrap()
        .calibrate(&white_sensor(&spec), &Progress::silent(&token))
        .unwrap()
        .unwrap();

    let mut align_params = params();
    align_params.rotate.enabled = true;
    let aligner = Aligner::new(align_params).unwrap();
    token.cancel();
    let outcome = aligner
        .align(&white_sensor(&spec), &calibration.centroids, &Progress::silent(&token))
        .unwrap();
    assert!(outcome.is_none());

    token.reset();
    let outcome = aligner
        .align(&white_sensor(&spec), &calibration.centroids, &Progress::silent(&token))
        .unwrap();
    assert!(outcome.is_some());
}
