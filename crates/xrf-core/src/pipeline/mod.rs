//! Row-parallel fitting of a whole scan.

mod maps;

pub use maps::{ElementMap, ElementMaps};

use crate::common::FitRunConfig;
use crate::domain::{EnergyRange, OptimizerOutcome, XrfError, XrfResult};
use crate::fitting::{
    ElementsToFit, FitModel, FitOutcome, FitRoutine, IntegratedSpectra, SpectraAccumulator,
    generate_fit_routine,
};
use crate::overrides::ParamsOverride;
use crate::stream::{StreamBlock, StreamSink};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Row-major spectra of one detector over a `height x width` scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanVolume {
    pub height: usize,
    pub width: usize,
    #[serde(default)]
    pub detector: u32,
    pub spectra: Vec<Vec<f64>>,
}

impl ScanVolume {
    pub fn validate(&self) -> XrfResult<()> {
        let pixels = self.height * self.width;
        if pixels == 0 {
            return Err(XrfError::input_validation(
                "INPUT.SCAN_GEOMETRY",
                format!("scan {}x{} has no pixels", self.height, self.width),
            ));
        }
        if self.spectra.len() != pixels {
            return Err(XrfError::input_validation(
                "INPUT.SCAN_GEOMETRY",
                format!(
                    "scan {}x{} needs {} spectra, found {}",
                    self.height,
                    self.width,
                    pixels,
                    self.spectra.len()
                ),
            ));
        }
        let channels = self.channels();
        if channels == 0 {
            return Err(XrfError::input_validation(
                "INPUT.SCAN_SPECTRA",
                "scan spectra have no channels",
            ));
        }
        if let Some(index) = self.spectra.iter().position(|spectrum| spectrum.len() != channels) {
            return Err(XrfError::input_validation(
                "INPUT.SCAN_SPECTRA",
                format!(
                    "spectrum at row {} col {} has {} channels, expected {}",
                    index / self.width,
                    index % self.width,
                    self.spectra[index].len(),
                    channels
                ),
            ));
        }
        Ok(())
    }

    pub fn channels(&self) -> usize {
        self.spectra.first().map_or(0, Vec::len)
    }

    pub fn spectrum(&self, row: usize, col: usize) -> Option<&[f64]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.spectra.get(row * self.width + col).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub pixels: usize,
    pub converged: usize,
    pub exhausted: usize,
    pub failed: usize,
}

impl ScanSummary {
    fn record(&mut self, status: OptimizerOutcome) {
        self.pixels += 1;
        match status {
            OptimizerOutcome::Converged => self.converged += 1,
            OptimizerOutcome::Exhausted => self.exhausted += 1,
            OptimizerOutcome::Failed => self.failed += 1,
        }
    }
}

/// Fits every pixel of `volume` with an initialised `routine` on `workers`
/// threads. Rows are handed to workers whole; a structural error in any pixel
/// aborts the run.
pub fn fit_scan(
    volume: &ScanVolume,
    routine: &dyn FitRoutine,
    model: &FitModel,
    elements: &ElementsToFit,
    workers: usize,
    sink: Option<&dyn StreamSink>,
) -> XrfResult<(ElementMaps, ScanSummary)> {
    volume.validate()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|error| {
            XrfError::internal(
                "RUN.WORKER_POOL",
                format!("failed to build worker pool: {error}"),
            )
        })?;

    let rows: Vec<Vec<FitOutcome>> = pool.install(|| {
        (0..volume.height)
            .into_par_iter()
            .map(|row| fit_row(volume, row, routine, model, elements, sink))
            .collect::<XrfResult<Vec<_>>>()
    })?;

    let mut maps = ElementMaps::new(volume.height, volume.width, elements);
    let mut summary = ScanSummary::default();
    for (row, outcomes) in rows.iter().enumerate() {
        for (col, outcome) in outcomes.iter().enumerate() {
            maps.record(row, col, outcome);
            summary.record(outcome.status);
        }
    }

    tracing::info!(
        routine = %routine.kind(),
        pixels = summary.pixels,
        converged = summary.converged,
        exhausted = summary.exhausted,
        failed = summary.failed,
        workers,
        "scan fit complete"
    );
    Ok((maps, summary))
}

fn fit_row(
    volume: &ScanVolume,
    row: usize,
    routine: &dyn FitRoutine,
    model: &FitModel,
    elements: &ElementsToFit,
    sink: Option<&dyn StreamSink>,
) -> XrfResult<Vec<FitOutcome>> {
    let mut outcomes = Vec::with_capacity(volume.width);
    for col in 0..volume.width {
        let index = row * volume.width + col;
        let outcome = routine.fit_spectra(model, &volume.spectra[index], elements)?;
        if let Some(sink) = sink {
            let mut record = StreamBlock::new(
                volume.detector,
                row as u32,
                col as u32,
                volume.height as u32,
                volume.width as u32,
            );
            record.push_outcome(routine.kind(), &outcome);
            sink.publish(record);
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanFitReport {
    pub energy_range: EnergyRange,
    pub summary: ScanSummary,
    pub maps: ElementMaps,
    pub integrated: IntegratedSpectra,
}

/// Everything built once per dataset before the worker pool starts.
pub struct AnalysisJob {
    model: FitModel,
    elements: ElementsToFit,
    energy_range: EnergyRange,
    accumulator: Arc<SpectraAccumulator>,
    routine: Box<dyn FitRoutine>,
    workers: usize,
}

impl AnalysisJob {
    pub fn new(
        overrides: &ParamsOverride,
        config: &FitRunConfig,
        channels: usize,
    ) -> XrfResult<Self> {
        let model = overrides.fit_model();
        let elements = overrides.elements();
        if elements.is_empty() {
            return Err(XrfError::input_validation(
                "INPUT.ELEMENTS_TO_FIT",
                "no known elements to fit",
            ));
        }
        let energy_range = overrides.energy_range(channels)?;
        let accumulator = Arc::new(SpectraAccumulator::new(energy_range.count()));
        let routine = generate_fit_routine(
            config.routine,
            config.max_iterations,
            Arc::clone(&accumulator),
        );
        routine.initialize(&model, &elements, energy_range)?;
        tracing::debug!(
            routine = %config.routine,
            elements = ?elements.names(),
            window = %energy_range,
            "analysis job initialised"
        );

        Ok(Self {
            model,
            elements,
            energy_range,
            accumulator,
            routine,
            workers: config.resolved_workers(),
        })
    }

    pub fn energy_range(&self) -> EnergyRange {
        self.energy_range
    }

    pub fn elements(&self) -> &ElementsToFit {
        &self.elements
    }

    pub fn run(&self, volume: &ScanVolume, sink: Option<&dyn StreamSink>) -> XrfResult<ScanFitReport> {
        let (maps, summary) = fit_scan(
            volume,
            self.routine.as_ref(),
            &self.model,
            &self.elements,
            self.workers,
            sink,
        )?;
        Ok(ScanFitReport {
            energy_range: self.energy_range,
            summary,
            maps,
            integrated: self.accumulator.snapshot(),
        })
    }
}
