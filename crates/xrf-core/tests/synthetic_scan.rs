use xrf_core::common::FitRunConfig;
use xrf_core::domain::{EnergyRange, FittingRoutineKind};
use xrf_core::fitting::generate_element_models;
use xrf_core::overrides::ParamsOverride;
use xrf_core::pipeline::{AnalysisJob, ScanVolume};
use xrf_core::stream::{CollectingSink, StreamBlock};

const CHANNELS: usize = 2048;
const HEIGHT: usize = 4;
const WIDTH: usize = 5;

const OVERRIDE: &str = "\
ELEMENTS_TO_FIT: Fe, Cu
CAL_OFFSET_[E_OFFSET]: 0.0
CAL_SLOPE_[E_LINEAR]: 0.01
CAL_QUAD_[E_QUADRATIC]: 0.0
FWHM_OFFSET: 0.12
FWHM_FANOPRIME: 0.114
MIN_ENERGY_TO_FIT: 2.0
MAX_ENERGY_TO_FIT: 12.0
";

fn injected(row: usize, col: usize) -> (f64, f64) {
    let fe = 500.0 + 137.0 * row as f64 + 41.0 * col as f64;
    let cu = 90.0 + 13.0 * (row * WIDTH + col) as f64;
    (fe, cu)
}

fn synthetic_volume(overrides: &ParamsOverride) -> ScanVolume {
    let model = overrides.fit_model();
    let elements = overrides.elements();
    let full = EnergyRange::full(CHANNELS).expect("full range");
    let curves = generate_element_models(&model, &elements, full);
    let fe = curves.get("Fe").expect("Fe curve");
    let cu = curves.get("Cu").expect("Cu curve");

    let mut spectra = Vec::with_capacity(HEIGHT * WIDTH);
    for row in 0..HEIGHT {
        for col in 0..WIDTH {
            let (fe_amount, cu_amount) = injected(row, col);
            spectra.push(
                fe.iter()
                    .zip(cu)
                    .map(|(fe_value, cu_value)| fe_amount * fe_value + cu_amount * cu_value)
                    .collect(),
            );
        }
    }
    ScanVolume {
        height: HEIGHT,
        width: WIDTH,
        detector: 1,
        spectra,
    }
}

fn assert_relative(expected: f64, actual: f64, tolerance: f64, context: &str) {
    let scale = expected.abs().max(1.0);
    assert!(
        (expected - actual).abs() <= tolerance * scale,
        "{context}: expected {expected}, got {actual}"
    );
}

#[test]
fn nnls_pipeline_recovers_injected_intensities_for_every_pixel() {
    let overrides = ParamsOverride::parse(OVERRIDE);
    let volume = synthetic_volume(&overrides);
    let config = FitRunConfig {
        routine: FittingRoutineKind::Nnls,
        workers: 3,
        ..FitRunConfig::default()
    };
    let job = AnalysisJob::new(&overrides, &config, CHANNELS).expect("job should initialise");
    assert_eq!(job.energy_range(), EnergyRange::new(200, 1200).expect("window"));

    let sink = CollectingSink::new();
    let report = job.run(&volume, Some(&sink)).expect("scan should fit");

    assert_eq!(report.summary.pixels, HEIGHT * WIDTH);
    assert_eq!(report.summary.converged, HEIGHT * WIDTH);
    for row in 0..HEIGHT {
        for col in 0..WIDTH {
            let (fe, cu) = injected(row, col);
            let context = format!("pixel ({row}, {col})");
            assert_relative(fe, report.maps.value("Fe", row, col).expect("Fe"), 1.0e-6, &context);
            assert_relative(cu, report.maps.value("Cu", row, col).expect("Cu"), 1.0e-6, &context);
            assert!(report.maps.value("NUM_ITR", row, col).expect("NUM_ITR") >= 2.0);
        }
    }

    let window = job.energy_range();
    let measured: f64 = volume
        .spectra
        .iter()
        .map(|spectrum| spectrum[window.min..=window.max].iter().sum::<f64>())
        .sum();
    let fitted: f64 = report.integrated.fitted.iter().sum();
    assert_relative(measured, fitted, 1.0e-6, "integrated model");
    assert!(report.integrated.background.iter().all(|value| *value == 0.0));

    let records = sink.into_records();
    assert_eq!(records.len(), HEIGHT * WIDTH);
    let last = StreamBlock::decode(&records[HEIGHT * WIDTH - 1].encode()).expect("decode");
    assert_eq!((last.row, last.col, last.detector), (3, 4, 1));
    let counts = &last.fitting_blocks[0].counts;
    assert_eq!(counts[0].0, "Fe");
    assert_eq!(counts[1].0, "Cu");
    assert_relative(injected(3, 4).0, counts[0].1, 1.0e-6, "streamed Fe");
}

#[test]
fn svd_pipeline_agrees_with_nnls_on_representable_data() {
    let overrides = ParamsOverride::parse(OVERRIDE);
    let volume = synthetic_volume(&overrides);
    let config = FitRunConfig {
        routine: FittingRoutineKind::Svd,
        workers: 2,
        ..FitRunConfig::default()
    };
    let report = AnalysisJob::new(&overrides, &config, CHANNELS)
        .expect("job should initialise")
        .run(&volume, None)
        .expect("scan should fit");

    for row in 0..HEIGHT {
        for col in 0..WIDTH {
            let (fe, cu) = injected(row, col);
            let context = format!("pixel ({row}, {col})");
            assert_relative(fe, report.maps.value("Fe", row, col).expect("Fe"), 1.0e-6, &context);
            assert_relative(cu, report.maps.value("Cu", row, col).expect("Cu"), 1.0e-6, &context);
        }
    }
}

#[test]
fn spectra_shorter_than_the_fit_window_abort_the_run() {
    let overrides = ParamsOverride::parse(OVERRIDE);
    let mut volume = synthetic_volume(&overrides);
    for spectrum in &mut volume.spectra {
        spectrum.truncate(1000);
    }
    let job = AnalysisJob::new(&overrides, &FitRunConfig::default(), CHANNELS).expect("job");
    let error = job.run(&volume, None).expect_err("short spectra should abort");
    assert_eq!(error.placeholder(), "RUN.FIT_WINDOW");
}
