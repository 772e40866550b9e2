//! Two-date change-detection orchestration
//!
//! The two per-time-point jobs (load → correct → mask → indices → write) run
//! concurrently on a bounded worker pool. The orchestrator waits for both at
//! a single barrier, bounded by the configured job timeout, before comparing
//! and classifying.

use crate::config::PipelineConfig;
use crate::core::{
    ChangeComparator, ClassifierParams, CloudShadowMasker, DarkObjectCorrector, DarkObjectParams,
    DeforestationClassifier, IndexCalculator,
};
use crate::io::{ArtifactManifest, BandReader, Quicklook, RasterWriter};
use crate::types::{
    BandPair, ChangeRaster, ClassificationResult, IndexRaster, JobRequest, JobStage,
    PipelineStage, TimePoint, VegError, VegResult,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

pub const CLASSIFICATION_FILE: &str = "classification.json";

/// Shared flag that asks running jobs to stop at their next stage boundary
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that is cancelled when either it or `self` is cancelled.
    /// Cancelling the child leaves `self` untouched.
    pub fn child(&self) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.cancelled)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .map_or(false, |p| p.load(Ordering::SeqCst))
    }
}

/// Indices produced by one time point
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub time_point: TimePoint,
    pub ndvi: IndexRaster,
    pub savi: IndexRaster,
    pub artifacts: Vec<PathBuf>,
}

/// Everything a successful run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub classification: ClassificationResult,
    pub old: JobOutput,
    pub new: JobOutput,
    pub ndvi_change: ChangeRaster,
    pub savi_change: ChangeRaster,
    pub manifest: ArtifactManifest,
}

/// One time point's work, from band loading to index artifacts
pub struct PipelineJob {
    pub time_point: TimePoint,
    pub id: String,
    pub red_path: PathBuf,
    pub nir_path: PathBuf,
    pub output_dir: PathBuf,
    config: Arc<PipelineConfig>,
    cancel: CancellationToken,
}

impl PipelineJob {
    pub fn new(
        time_point: TimePoint,
        id: &str,
        config: Arc<PipelineConfig>,
        cancel: CancellationToken,
    ) -> Self {
        let input_dir = config.input_folder.join(id);
        Self {
            time_point,
            id: id.to_string(),
            red_path: input_dir.join(&config.red_band_file),
            nir_path: input_dir.join(&config.nir_band_file),
            output_dir: config.output_folder.join(id),
            config,
            cancel,
        }
    }

    fn fail(&self, stage: JobStage, source: VegError) -> VegError {
        VegError::Job {
            stage,
            time_point: self.time_point,
            id: self.id.clone(),
            source: Box::new(source),
        }
    }

    fn checkpoint(&self, stage: JobStage) -> VegResult<()> {
        if self.cancel.is_cancelled() {
            log::info!("{} job cancelled before {}", self.time_point, stage);
            return Err(self.fail(stage, VegError::Cancelled));
        }
        Ok(())
    }

    /// Run the stages strictly in order
    pub fn execute(self) -> VegResult<JobOutput> {
        let start = Instant::now();
        log::info!("Starting {} job for {}", self.time_point, self.id);

        self.checkpoint(JobStage::Loading)?;
        let bands = self
            .load()
            .map_err(|e| self.fail(JobStage::Loading, e))?;

        self.checkpoint(JobStage::Correcting)?;
        let corrector = DarkObjectCorrector::new(DarkObjectParams {
            percentile: self.config.dark_object_percentile,
        });
        let red = corrector
            .correct(&bands.red)
            .map_err(|e| self.fail(JobStage::Correcting, e))?;
        let nir = corrector
            .correct(&bands.nir)
            .map_err(|e| self.fail(JobStage::Correcting, e))?;

        self.checkpoint(JobStage::Masking)?;
        let (red, nir) = CloudShadowMasker::new(self.config.cloud_shadow_threshold)
            .mask(&red, &nir)
            .map_err(|e| self.fail(JobStage::Masking, e))?;

        self.checkpoint(JobStage::Indices)?;
        let (ndvi, savi) = IndexCalculator::new(self.config.soil_adjustment)
            .indices(&red, &nir, self.time_point)
            .map_err(|e| self.fail(JobStage::Indices, e))?;

        self.checkpoint(JobStage::Writing)?;
        let artifacts = self
            .write(&ndvi, &savi)
            .map_err(|e| self.fail(JobStage::Writing, e))?;

        log::info!(
            "{} job for {} completed in {:.2}s",
            self.time_point,
            self.id,
            start.elapsed().as_secs_f64()
        );

        Ok(JobOutput {
            time_point: self.time_point,
            ndvi,
            savi,
            artifacts,
        })
    }

    fn load(&self) -> VegResult<BandPair> {
        let red = BandReader::read_band(&self.red_path)?;
        let nir = BandReader::read_band(&self.nir_path)?;
        Ok(BandPair { red, nir })
    }

    fn write(&self, ndvi: &IndexRaster, savi: &IndexRaster) -> VegResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(4);
        for raster in [ndvi, savi] {
            let tif = self
                .output_dir
                .join(format!("{}.TIF", raster.kind.file_stem()));
            let png = tif.with_extension("png");
            RasterWriter::write_index(&tif, raster)?;
            Quicklook::save_png(&raster.data, &png)?;
            written.push(tif);
            written.push(png);
        }
        Ok(written)
    }
}

/// Drives a run through the pipeline state machine
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    pool: rayon::ThreadPool,
    cancel: CancellationToken,
    stage: PipelineStage,
}

impl Orchestrator {
    /// Build an orchestrator with a worker pool sized to the available
    /// parallelism (capped by `max_workers`).
    pub fn new(config: Arc<PipelineConfig>) -> VegResult<Self> {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        let workers = config.max_workers.map_or(available, |m| m.min(available)).max(1);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("forestwatch-worker-{}", i))
            .build()
            .map_err(|e| VegError::WorkerPool(format!("Failed to build thread pool: {:?}", e)))?;

        log::debug!("Worker pool: {} threads", workers);

        Ok(Self {
            config,
            pool,
            cancel: CancellationToken::new(),
            stage: PipelineStage::Idle,
        })
    }

    /// Load configuration from a JSON file and build an orchestrator
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> VegResult<Self> {
        let config = PipelineConfig::from_file(path)?;
        Self::new(Arc::new(config))
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token that cancels the current run when triggered from another thread.
    /// Cancellation is sticky: later runs on this orchestrator fail too.
    /// Job failures and timeouts only stop the run they belong to.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn transition(&mut self, next: PipelineStage) {
        log::info!("Pipeline stage: {} -> {}", self.stage, next);
        self.stage = next;
    }

    /// Run both time points, compare, classify, and persist artifacts.
    ///
    /// On any failure the orchestrator ends in `Failed` and no
    /// classification is produced.
    pub fn run(&mut self, request: &JobRequest) -> VegResult<RunOutcome> {
        let start = Instant::now();
        match self.run_stages(request) {
            Ok(outcome) => {
                self.transition(PipelineStage::Done);
                log::info!(
                    "Processing completed in {:.2} seconds",
                    start.elapsed().as_secs_f64()
                );
                Ok(outcome)
            }
            Err(e) => {
                log::error!("Run failed during {}: {}", self.stage, e);
                self.transition(PipelineStage::Failed);
                Err(e)
            }
        }
    }

    fn run_stages(&mut self, request: &JobRequest) -> VegResult<RunOutcome> {
        self.transition(PipelineStage::LoadingConfig);
        self.config.validate()?;
        if request.old.is_empty() || request.new.is_empty() {
            return Err(VegError::Config(
                "Both time-point identifiers must be non-empty".to_string(),
            ));
        }
        self.prepare_output_dirs(request)?;

        self.transition(PipelineStage::ComputingIndices);
        let (old, new) = self.compute_indices(request)?;

        self.transition(PipelineStage::Comparing);
        let (ndvi_change, savi_change) = self.pool.install(|| {
            rayon::join(
                || ChangeComparator::compare(&old.ndvi, &new.ndvi),
                || ChangeComparator::compare(&old.savi, &new.savi),
            )
        });
        let (ndvi_change, savi_change) = (ndvi_change?, savi_change?);

        let mut manifest =
            ArtifactManifest::new(&self.config.output_folder, &request.old, &request.new);
        for path in old.artifacts.iter().chain(new.artifacts.iter()) {
            manifest.record(path);
        }
        for change in [&ndvi_change, &savi_change] {
            let tif = self
                .config
                .output_folder
                .join(format!("{}_change.TIF", change.kind.file_stem()));
            let png = tif.with_extension("png");
            RasterWriter::write_change(&tif, change)?;
            Quicklook::save_png(&change.data, &png)?;
            manifest.record(&tif);
            manifest.record(&png);
        }

        self.transition(PipelineStage::Classifying);
        let classification = DeforestationClassifier::new(ClassifierParams {
            ndvi_threshold: self.config.ndvi_threshold,
            savi_threshold: self.config.savi_threshold,
            alert_threshold: self.config.deforestation_alert_threshold,
        })
        .classify(&ndvi_change, &savi_change)?;

        let record_path = self.config.output_folder.join(CLASSIFICATION_FILE);
        let json = serde_json::to_string_pretty(&classification)?;
        std::fs::write(&record_path, json).map_err(|e| VegError::io(&record_path, e))?;
        manifest.record(&record_path);
        manifest.save()?;

        Ok(RunOutcome {
            classification,
            old,
            new,
            ndvi_change,
            savi_change,
            manifest,
        })
    }

    /// Output directories exist before the jobs fan out
    fn prepare_output_dirs(&self, request: &JobRequest) -> VegResult<()> {
        for dir in [
            self.config.output_folder.clone(),
            self.config.output_folder.join(&request.old),
            self.config.output_folder.join(&request.new),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| VegError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Fan out both jobs and wait at the barrier
    fn compute_indices(&self, request: &JobRequest) -> VegResult<(JobOutput, JobOutput)> {
        if self.cancel.is_cancelled() {
            return Err(VegError::Cancelled);
        }

        let run_token = self.cancel.child();
        let jobs = [TimePoint::Old, TimePoint::New].map(|time_point| {
            let job = PipelineJob::new(
                time_point,
                request.id(time_point),
                Arc::clone(&self.config),
                run_token.clone(),
            );
            (time_point, move || job.execute())
        });

        self.join_jobs(jobs, &run_token)
    }

    /// Run both jobs on the pool and collect their results before the
    /// deadline. A failure or timeout cancels `run_token` so the sibling
    /// stops early.
    fn join_jobs<F>(
        &self,
        jobs: [(TimePoint, F); 2],
        run_token: &CancellationToken,
    ) -> VegResult<(JobOutput, JobOutput)>
    where
        F: FnOnce() -> VegResult<JobOutput> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<(TimePoint, VegResult<JobOutput>)>();
        for (time_point, job) in jobs {
            let tx = tx.clone();
            self.pool.spawn(move || {
                let result = job();
                // Receiver gone means the barrier already gave up
                let _ = tx.send((time_point, result));
            });
        }
        drop(tx);

        let timeout = self.config.job_timeout();
        let deadline = Instant::now() + timeout;
        let mut old = None;
        let mut new = None;
        let mut first_error: Option<VegError> = None;

        for _ in 0..2 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (time_point, result) = match rx.recv_timeout(remaining) {
                Ok(msg) => msg,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    log::error!("Jobs did not finish within {:?}, cancelling", timeout);
                    run_token.cancel();
                    return Err(VegError::Timeout { after: timeout });
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(VegError::WorkerPool(
                        "Worker exited without reporting a result".to_string(),
                    ));
                }
            };

            match result {
                Ok(output) => match time_point {
                    TimePoint::Old => old = Some(output),
                    TimePoint::New => new = Some(output),
                },
                Err(e) => {
                    log::error!("{} job failed: {}", time_point, e);
                    if first_error.is_none() {
                        // Stop the sibling early; its result is discarded
                        run_token.cancel();
                        first_error = Some(e);
                    }
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(VegError::Cancelled);
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        match (old, new) {
            (Some(old), Some(new)) => Ok((old, new)),
            _ => Err(VegError::WorkerPool(
                "Barrier released without both job results".to_string(),
            )),
        }
    }
}

/// Convenience wrapper: load `config_path`, run `request`, return the result
pub fn run_from_config_file<P: AsRef<Path>>(
    config_path: P,
    request: &JobRequest,
) -> VegResult<RunOutcome> {
    Orchestrator::from_config_file(config_path)?.run(request)
}
