use lfp_align::config::{load_config, AlignConfig, CalibrateConfig, OutputConfig};
use lfp_align::image::io::{load_sensor_image, save_plane_png, write_json_file};
use lfp_align::persist::save_light_field;
use lfp_align::{Aligner, CalibrationOutcome, Calibrator, CancelToken, LogStatus, Progress};
use std::env;
use std::path::Path;

fn usage() -> String {
    "Usage: lfp_align <calibrate|align> <config.json>".to_string()
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1);
    let command = args.next().ok_or_else(usage)?;
    let config_path = args.next().ok_or_else(usage)?;
    let token = CancelToken::new();
    let progress = Progress::new(&token, &LogStatus);
    match command.as_str() {
        "calibrate" => calibrate(Path::new(&config_path), &progress),
        "align" => align(Path::new(&config_path), &progress),
        _ => Err(usage()),
    }
}

fn write_debug(output: &OutputConfig, outcome: &CalibrationOutcome) -> Result<(), String> {
    if let (Some(dir), Some(response)) = (&output.debug_dir, &outcome.response) {
        save_plane_png(response, &dir.join("log_response.png")).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn calibrate(config_path: &Path, progress: &Progress) -> Result<(), String> {
    let config: CalibrateConfig = load_config(config_path).map_err(|e| e.to_string())?;
    let calibrator = Calibrator::new(config.params.clone()).map_err(|e| e.to_string())?;
    let store = config.store();
    let outcome = calibrator
        .calibrate_cached(&config.white_image, &store, config.force, config.expected_lattice(), progress)
        .map_err(|e| e.to_string())?
        .ok_or("Calibration interrupted")?;
    write_debug(&config.output, &outcome)?;
    if let Some(path) = &config.output.report_json {
        write_json_file(path, &outcome.report).map_err(|e| e.to_string())?;
    }
    println!(
        "calibrated {}x{} {} lattice -> {}",
        outcome.centroids.rows(),
        outcome.centroids.cols(),
        outcome.centroids.pattern().as_str(),
        store.path().display()
    );
    Ok(())
}

fn align(config_path: &Path, progress: &Progress) -> Result<(), String> {
    let config: AlignConfig = load_config(config_path).map_err(|e| e.to_string())?;
    let calibrator = Calibrator::new(config.params.clone()).map_err(|e| e.to_string())?;
    let calibration = calibrator
        .calibrate_cached(&config.white_image, &config.store(), false, config.expected_lattice(), progress)
        .map_err(|e| e.to_string())?
        .ok_or("Calibration interrupted")?;
    write_debug(&config.output, &calibration)?;

    let capture = load_sensor_image(&config.light_field).map_err(|e| e.to_string())?;
    let aligner = Aligner::new(config.params.clone()).map_err(|e| e.to_string())?;
    let outcome = aligner
        .align(&capture, &calibration.centroids, progress)
        .map_err(|e| e.to_string())?
        .ok_or("Alignment interrupted")?;
    save_light_field(&outcome.light_field, &config.output_image).map_err(|e| e.to_string())?;
    if let Some(path) = &config.output.report_json {
        write_json_file(path, &outcome.report).map_err(|e| e.to_string())?;
    }
    let [h, w, c] = outcome.report.shape;
    println!("aligned {h}x{w}x{c} -> {}", config.output_image.display());
    Ok(())
}
