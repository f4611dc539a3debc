//! Batch conversion.
//!
//! [`BatchOrchestrator`] runs every input through the pixel pipeline and, for
//! TIFF inputs when geo handling is enabled, the georeferencing pass:
//!
//! ```text
//! input.tif ──► ImageTransformEngine ──► out/0.5x-input.png
//!                                          │  (enable_reproject + preserve_geospatial)
//!                                          ▼
//!               extract geo metadata ─► scale ─► warp ─► out/0.5x-input.tif
//!                                                         (intermediate .png removed)
//! ```
//!
//! ## Workers
//!
//! The file list is split up front into contiguous chunks, one per worker, and
//! each chunk runs on a dedicated rayon pool sized by
//! [`effective_workers`]. Outcomes are returned in input order.
//!
//! ## Failures
//!
//! A file that cannot be converted produces exactly one error log entry naming
//! it and a [`FileOutcome::Skipped`]; the run continues. Geo problems after a
//! successful pixel conversion are logged and the pixel output is kept.
//!
//! ## Progress
//!
//! [`Progress`] is shared with the caller and updated after every file. An
//! optional channel receives [`ProcessEvent`]s for live display.

use crate::config::{ConfigError, ProcessingOptions, effective_workers};
use crate::geo::{GeoError, GeoTransformEngine, update_geo_metadata_scale};
use crate::imaging::{ImageBackend, ImageTransformEngine, ImagingError, RustBackend, display_name};
use crate::logger::AsyncLogger;
use crate::scan::is_tiff_path;
use crate::types::{BatchReport, FileOutcome};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Imaging(#[from] ImagingError),
    #[error("{0}")]
    Geo(#[from] GeoError),
    #[error("Invalid options: {0}")]
    Config(#[from] ConfigError),
    #[error("Worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("A batch is already running")]
    AlreadyRunning,
}

/// Progress event sent to an optional listener during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    RunStarted { total: usize, workers: usize },
    /// `index` is the 1-based position of the file in the input list.
    FileFinished {
        index: usize,
        total: usize,
        outcome: FileOutcome,
    },
    RunFinished {
        produced: usize,
        total: usize,
        elapsed: Duration,
    },
}

/// Completed/total counters for the current run.
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl Progress {
    fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    /// Mark one file done; returns the new completed count.
    fn increment(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Completed share in percent; 0 before any run.
    pub fn percent(&self) -> f64 {
        percent(self.completed(), self.total())
    }
}

fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64 * 100.0
    }
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct BatchOrchestrator<B: ImageBackend = RustBackend> {
    images: ImageTransformEngine<B>,
    geo: GeoTransformEngine,
    logger: Arc<AsyncLogger>,
    progress: Arc<Progress>,
    running: AtomicBool,
    events: Option<Sender<ProcessEvent>>,
}

impl BatchOrchestrator<RustBackend> {
    pub fn new(logger: Arc<AsyncLogger>) -> Self {
        Self::with_backend(RustBackend::new(), logger)
    }
}

impl<B: ImageBackend> BatchOrchestrator<B> {
    pub fn with_backend(backend: B, logger: Arc<AsyncLogger>) -> Self {
        Self {
            images: ImageTransformEngine::with_backend(backend, Arc::clone(&logger)),
            geo: GeoTransformEngine::new(Arc::clone(&logger)),
            logger,
            progress: Arc::new(Progress::default()),
            running: AtomicBool::new(false),
            events: None,
        }
    }

    /// Send [`ProcessEvent`]s to `events` during runs.
    pub fn with_events(mut self, events: Sender<ProcessEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn images(&self) -> &ImageTransformEngine<B> {
        &self.images
    }

    fn emit(&self, event: ProcessEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    /// Convert `files` into `output_dir`, returning the produced paths in
    /// input order. Files that failed are absent; their errors are in the log.
    pub fn run(&self, files: &[PathBuf], output_dir: &Path, options: &ProcessingOptions) -> Vec<PathBuf> {
        match self.run_detailed(files, output_dir, options) {
            Ok(report) => report.produced(),
            Err(e) => {
                self.logger.error(format!("Batch not started - {e}"));
                Vec::new()
            }
        }
    }

    /// Like [`run`](Self::run) but returns one outcome per input.
    ///
    /// Errors are returned only when the run could not start: invalid
    /// options, an output directory that cannot be created, or another run
    /// in progress on this orchestrator.
    pub fn run_detailed(
        &self,
        files: &[PathBuf],
        output_dir: &Path,
        options: &ProcessingOptions,
    ) -> Result<BatchReport, BatchError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(BatchError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        options.validate()?;
        if files.is_empty() {
            self.logger.warning("No files selected");
            return Ok(BatchReport::default());
        }
        std::fs::create_dir_all(output_dir)?;

        let total = files.len();
        let workers = effective_workers(options.max_workers, total);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        let chunk_size = total.div_ceil(workers);

        self.progress.reset(total);
        self.logger.info(format!("Total images: {total}"));
        self.emit(ProcessEvent::RunStarted { total, workers });
        let started = Instant::now();

        let chunks: Vec<Vec<FileOutcome>> = pool.install(|| {
            files
                .par_chunks(chunk_size)
                .enumerate()
                .map(|(chunk, paths)| {
                    paths
                        .iter()
                        .enumerate()
                        .map(|(i, path)| {
                            let index = chunk * chunk_size + i + 1;
                            self.process_one(index, total, path, output_dir, options)
                        })
                        .collect()
                })
                .collect()
        });
        let report = BatchReport::from(chunks.into_iter().flatten().collect::<Vec<_>>());

        let elapsed = started.elapsed();
        self.logger.success("All completed");
        self.logger
            .info(format!("Processing time: {:.2}s", elapsed.as_secs_f64()));
        self.emit(ProcessEvent::RunFinished {
            produced: total - report.failure_count(),
            total,
            elapsed,
        });
        Ok(report)
    }

    fn process_one(
        &self,
        index: usize,
        total: usize,
        path: &Path,
        output_dir: &Path,
        options: &ProcessingOptions,
    ) -> FileOutcome {
        let outcome = match self.convert(path, output_dir, options) {
            Ok(output) => FileOutcome::Produced {
                source: path.to_path_buf(),
                output,
            },
            Err(e) => {
                self.logger
                    .error(format!("Processing error {} - {e}", display_name(path)));
                FileOutcome::Skipped {
                    source: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        };

        let completed = self.progress.increment();
        self.logger.info(format!(
            "[{completed}/{total}] completed ({:.2}%)",
            percent(completed, total)
        ));
        self.emit(ProcessEvent::FileFinished {
            index,
            total,
            outcome: outcome.clone(),
        });
        outcome
    }

    fn convert(&self, path: &Path, output_dir: &Path, options: &ProcessingOptions) -> Result<PathBuf, BatchError> {
        let output = self.images.try_process(path, output_dir, options)?;
        if !options.geo.enable_reproject || !is_tiff_path(path) {
            return Ok(output);
        }
        match self.georeference(path, &output, options) {
            Ok(Some(geo_output)) => Ok(geo_output),
            Ok(None) => Ok(output),
            Err(BatchError::Geo(e)) => {
                self.geo.log_geo_error(path, "Geo save error", &e);
                Ok(output)
            }
            Err(e) => {
                self.logger
                    .error(format!("Geo save error {} - {e}", display_name(path)));
                Ok(output)
            }
        }
    }

    /// Geo pass for one converted TIFF. Returns the georeferenced output when
    /// one was written.
    fn georeference(
        &self,
        source: &Path,
        output: &Path,
        options: &ProcessingOptions,
    ) -> Result<Option<PathBuf>, BatchError> {
        let geo = &options.geo;
        let metadata = self
            .geo
            .try_extract_geo_metadata(source, &geo.target_crs, geo.source_override())?;
        if !geo.preserve_geospatial {
            return Ok(None);
        }

        let metadata = update_geo_metadata_scale(metadata, options.scale_ratio);
        let pixels = self.images.backend().load(output)?;
        let warped = self.geo.try_georeference(&pixels, &metadata)?;

        let extension = geo.geo_driver.native_extension().trim_start_matches('.');
        let geo_output = output.with_extension(extension);
        self.geo
            .try_save_with_geospatial(&warped, &geo_output, &metadata)?;
        self.logger.success(format!(
            "Saved with CRS {}: {}",
            metadata.crs,
            display_name(&geo_output)
        ));

        if geo_output != output {
            let _ = std::fs::remove_file(output);
        }
        Ok(Some(geo_output))
    }
}
