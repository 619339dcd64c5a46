//! Multi-Source Validator
//!
//! Orchestrates a complete fusion run:
//!
//! 1. Load every inventory concurrently (a failed source is logged, counted and
//!    skipped)
//! 2. Fail fast when no source yielded any ground truth
//! 3. Run the detection pipeline across tiles on the blocking pool (or accept
//!    a prepared batch)
//! 4. Fail fast when nothing was detected
//! 5. Match detections against the ground-truth union, absorb corroboration,
//!    score and classify
//! 6. Summarize, with per-category failure counts and a run status

use super::classifier::Classifier;
use super::corroboration::assemble_records;
use super::matcher::SpatialMatcher;
use super::scorer::ConfidenceScorer;
use super::statistics::{FailureCounts, Summary};
use crate::annotation::ContextLayers;
use crate::detection::{DetectionBatch, DetectionPipeline};
use crate::error::{EmptyInputKind, FusionError, Result};
use crate::geodesy::{GeoPoint, LocalMetricFrame};
use crate::inventory::InventorySource;
use crate::raster::{Detector, RasterTile};
use crate::run_context::RunContext;
use crate::types::{ClassifiedAsset, Detection, GroundTruthAsset, Tier};
use futures::future::join_all;
use polesight_common::{EventBus, FusionEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every tile, layer and source contributed
    Success,
    /// Output produced with reduced coverage; see [`FailureCounts`]
    PartialFailure,
    /// No output: the run aborted
    Fatal,
}

impl RunStatus {
    pub fn of(result: &Result<FusionRun>) -> RunStatus {
        match result {
            Ok(run) => run.status,
            Err(_) => RunStatus::Fatal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::Fatal => "fatal",
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct FusionRun {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub assets: Vec<ClassifiedAsset>,
    /// Detections dropped by the plausibility filter, with their reasons
    pub filtered: Vec<Detection>,
    pub summary: Summary,
    pub failures: FailureCounts,
}

impl FusionRun {
    pub fn tier(&self, tier: Tier) -> impl Iterator<Item = &ClassifiedAsset> {
        self.assets.iter().filter(move |a| a.tier == tier)
    }
}

/// Ground truth gathered from every inventory
#[derive(Debug, Clone, Default)]
pub struct LoadedInventories {
    pub assets: Vec<GroundTruthAsset>,
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
    /// Invalid rows dropped across every loaded inventory
    pub rejected: usize,
}

pub struct MultiSourceValidator {
    ctx: RunContext,
    events: Option<EventBus>,
}

impl MultiSourceValidator {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx, events: None }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Full pipeline: detect on `tiles`, then fuse with `inventories`
    ///
    /// Detection (rayon across tiles) runs under `spawn_blocking`.
    ///
    /// # Errors
    /// `EmptyInput` when no source yields ground truth or nothing is detected,
    /// `Internal` when the detection task panics.
    pub async fn run(
        &self,
        tiles: &[Arc<dyn RasterTile>],
        detector: &Arc<dyn Detector>,
        layers: &Arc<ContextLayers>,
        inventories: &[Arc<dyn InventorySource>],
    ) -> Result<FusionRun> {
        info!(run_id = %self.ctx.run_id, tiles = tiles.len(), sources = inventories.len(), "Fusion run starting");
        let loaded = self.load_inventories(inventories).await;
        if loaded.assets.is_empty() {
            return Err(self.fatal(FusionError::EmptyInput {
                kind: EmptyInputKind::GroundTruth,
            }));
        }

        let batch = self.detect(tiles, detector, layers).await?;
        self.fuse(batch, loaded)
    }

    async fn detect(
        &self,
        tiles: &[Arc<dyn RasterTile>],
        detector: &Arc<dyn Detector>,
        layers: &Arc<ContextLayers>,
    ) -> Result<DetectionBatch> {
        let ctx = self.ctx.clone();
        let events = self.events.clone();
        let tiles = tiles.to_vec();
        let detector = Arc::clone(detector);
        let layers = Arc::clone(layers);

        debug!(run_id = %ctx.run_id, tiles = tiles.len(), "Starting detection in spawn_blocking");
        tokio::task::spawn_blocking(move || {
            let mut pipeline = DetectionPipeline::new(&ctx, &layers);
            if let Some(bus) = &events {
                pipeline = pipeline.with_events(bus);
            }
            pipeline.run(&tiles, detector.as_ref())
        })
        .await
        .map_err(|e| self.fatal(FusionError::Internal(format!("Detection task panicked: {}", e))))
    }

    /// Fuse an already-detected batch with `inventories`
    pub async fn validate(
        &self,
        batch: DetectionBatch,
        inventories: &[Arc<dyn InventorySource>],
    ) -> Result<FusionRun> {
        let loaded = self.load_inventories(inventories).await;
        self.fuse(batch, loaded)
    }

    /// Load every inventory concurrently
    pub async fn load_inventories(&self, inventories: &[Arc<dyn InventorySource>]) -> LoadedInventories {
        let results = join_all(inventories.iter().map(|source| source.load())).await;

        let mut out = LoadedInventories::default();
        for (source, result) in inventories.iter().zip(results) {
            let name = source.name().to_string();
            match result {
                Ok(report) => {
                    info!(source = %name, records = report.assets.len(), rejected = report.rejected, "Inventory loaded");
                    if report.rejected > 0 {
                        warn!(source = %name, rejected = report.rejected, "Inventory rows rejected as invalid");
                    }
                    self.emit(FusionEvent::SourceLoaded {
                        run_id: self.ctx.run_id,
                        source: name.clone(),
                        records: report.assets.len(),
                        rejected: report.rejected,
                    });
                    out.rejected += report.rejected;
                    out.assets.extend(report.assets);
                    out.loaded.push(name);
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "Inventory failed to load, continuing without it");
                    self.emit(FusionEvent::SourceFailed {
                        run_id: self.ctx.run_id,
                        source: name.clone(),
                        error: e.to_string(),
                    });
                    out.failed.push(name);
                }
            }
        }
        out
    }

    /// Match, score, classify and summarize
    pub fn fuse(&self, batch: DetectionBatch, inventories: LoadedInventories) -> Result<FusionRun> {
        if inventories.assets.is_empty() {
            return Err(self.fatal(FusionError::EmptyInput {
                kind: EmptyInputKind::GroundTruth,
            }));
        }
        if batch.detections.is_empty() && batch.filtered.is_empty() {
            return Err(self.fatal(FusionError::EmptyInput {
                kind: EmptyInputKind::Detections,
            }));
        }

        let config = self.ctx.config();
        let points: Vec<GeoPoint> = batch
            .detections
            .iter()
            .map(|d| d.location)
            .chain(inventories.assets.iter().map(|a| a.location))
            .collect();
        let frame = LocalMetricFrame::around(&points).ok_or(FusionError::EmptyInput {
            kind: EmptyInputKind::Detections,
        })?;

        let matcher = SpatialMatcher::new(frame, config.matching.max_distance_m);
        let mut records = assemble_records(&batch.detections, &inventories.assets, &matcher);

        let scorer = ConfidenceScorer::new(config.scoring.clone(), config.matching.clone());
        for record in &mut records {
            scorer.score_record(record, self.ctx.reference_date);
        }

        let classifier = Classifier::new(config.classifier.clone(), config.matching.max_distance_m);
        let assets = classifier.classify_all(records);

        let failures = FailureCounts {
            tiles_failed: batch.tiles_failed.len(),
            windows_failed: batch.scan.windows_failed,
            detector_failures: batch.scan.detector_failures,
            projection_failures: batch.projection_failures,
            geometry_errors: batch.geometry_errors,
            records_rejected: inventories.rejected,
            missing_layers: batch.missing_layers.clone(),
            sources_failed: inventories.failed,
        };
        let summary = Summary::from_run(&assets, &batch.filtered, inventories.loaded);
        let status = if failures.is_degraded() {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        };

        info!(
            run_id = %self.ctx.run_id,
            status = status.as_str(),
            summary = %summary.display_string(),
            "Fusion run complete"
        );
        if status == RunStatus::PartialFailure {
            warn!(run_id = %self.ctx.run_id, failures = %failures.display_string(), "Run completed with reduced coverage");
        }
        self.emit(FusionEvent::RunCompleted {
            run_id: self.ctx.run_id,
            assets: summary.total_assets,
            verified: summary.verified,
            review: summary.review,
            new_or_missing: summary.new_or_missing,
            degraded: status == RunStatus::PartialFailure,
        });

        Ok(FusionRun {
            run_id: self.ctx.run_id,
            status,
            assets,
            filtered: batch.filtered,
            summary,
            failures,
        })
    }

    fn fatal(&self, err: FusionError) -> FusionError {
        error!(run_id = %self.ctx.run_id, error = %err, "Fusion run aborted");
        self.emit(FusionEvent::RunFailed {
            run_id: self.ctx.run_id,
            error: err.to_string(),
        });
        err
    }

    fn emit(&self, event: FusionEvent) {
        if let Some(bus) = &self.events {
            bus.emit_lossy(event);
        }
    }
}
