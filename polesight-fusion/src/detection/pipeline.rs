//! Per-tile detection pipeline
//!
//! scan → geo-reference → deduplicate → annotate → filter, one tile per rayon
//! task. Tiles share nothing mutable: each worker owns its scanner and
//! deduplicator and reads the context layers by reference. Results are merged
//! in input tile order, so the batch is deterministic.

use super::dedup::DetectionDeduplicator;
use super::georef::GeoReferencer;
use super::scanner::{ScanStats, TileScanner};
use crate::annotation::{ContextAnnotator, ContextLayers};
use crate::geodesy::{GeoPoint, LocalMetricFrame};
use crate::raster::{Detector, RasterTile};
use crate::run_context::RunContext;
use crate::types::{Detection, PixelCoord};
use crate::validators::{FilterOutcome, PlausibilityFilter};
use polesight_common::{EventBus, FusionEvent};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of processing one tile
#[derive(Debug, Clone, Default)]
pub struct TileReport {
    pub tile_id: String,
    pub detections: Vec<Detection>,
    pub filtered: Vec<Detection>,
    pub scan: ScanStats,
    pub projection_failures: usize,
    pub duplicates_removed: usize,
    /// Set when the tile could not be processed at all
    pub failure: Option<String>,
}

/// Merged detection output for a run
#[derive(Debug, Clone, Default)]
pub struct DetectionBatch {
    /// Detections that passed (or, in lenient mode, were annotated by) the filter
    pub detections: Vec<Detection>,
    /// Detections dropped by the plausibility filter
    pub filtered: Vec<Detection>,
    pub scan: ScanStats,
    pub tiles_processed: usize,
    pub tiles_failed: Vec<String>,
    pub projection_failures: usize,
    pub duplicates_removed: usize,
    pub geometry_errors: usize,
    pub missing_layers: Vec<String>,
}

impl DetectionBatch {
    /// Batch of already-detected, already-filtered detections
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            ..Self::default()
        }
    }

    fn absorb(&mut self, report: TileReport) {
        self.tiles_processed += 1;
        self.scan += report.scan;
        self.projection_failures += report.projection_failures;
        self.duplicates_removed += report.duplicates_removed;
        if report.failure.is_some() {
            self.tiles_failed.push(report.tile_id);
        }
        self.detections.extend(report.detections);
        self.filtered.extend(report.filtered);
    }
}

/// Frame centred on the union of the tiles' footprints
///
/// Tiles whose corners fail to geo-reference are ignored; `None` when none can.
pub fn area_of_interest(tiles: &[Arc<dyn RasterTile>], ctx: &RunContext) -> Option<LocalMetricFrame> {
    let corners: Vec<GeoPoint> = tiles
        .iter()
        .filter_map(|tile| {
            GeoReferencer::for_tile(tile.as_ref(), &ctx.config().georef)
                .ok()
                .map(|georef| (tile, georef))
        })
        .flat_map(|(tile, georef)| {
            let (w, h) = (tile.width() as f64, tile.height() as f64);
            [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)]
                .into_iter()
                .filter_map(move |(x, y)| georef.pixel_to_geo(PixelCoord { x, y }).ok())
        })
        .collect();
    LocalMetricFrame::around(&corners)
}

pub struct DetectionPipeline<'a> {
    ctx: &'a RunContext,
    layers: &'a ContextLayers,
    filter: PlausibilityFilter,
    events: Option<&'a EventBus>,
}

impl<'a> DetectionPipeline<'a> {
    pub fn new(ctx: &'a RunContext, layers: &'a ContextLayers) -> Self {
        Self {
            ctx,
            layers,
            filter: PlausibilityFilter::new(ctx.config().filter.clone()),
            events: None,
        }
    }

    pub fn with_events(mut self, events: &'a EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Process every tile in parallel and merge in tile order
    pub fn run(&self, tiles: &[Arc<dyn RasterTile>], detector: &dyn Detector) -> DetectionBatch {
        let reports: Vec<TileReport> = tiles
            .par_iter()
            .map(|tile| self.process_tile(tile.as_ref(), detector))
            .collect();

        let mut batch = DetectionBatch {
            geometry_errors: self.layers.stats().geometry_errors,
            missing_layers: self.layers.missing_layers(),
            ..DetectionBatch::default()
        };
        for report in reports {
            batch.absorb(report);
        }

        info!(
            run_id = %self.ctx.run_id,
            tiles = batch.tiles_processed,
            tiles_failed = batch.tiles_failed.len(),
            detections = batch.detections.len(),
            filtered = batch.filtered.len(),
            duplicates = batch.duplicates_removed,
            "Detection stage complete"
        );
        batch
    }

    pub fn process_tile(&self, tile: &dyn RasterTile, detector: &dyn Detector) -> TileReport {
        let config = self.ctx.config();
        let tile_id = tile.tile_id().to_string();
        let mut report = TileReport {
            tile_id: tile_id.clone(),
            ..TileReport::default()
        };

        let georef = match GeoReferencer::for_tile(tile, &config.georef) {
            Ok(georef) => georef,
            Err(e) => {
                warn!(tile_id = %tile_id, error = %e, "Tile cannot be geo-referenced, skipping");
                report.failure = Some(e.to_string());
                self.emit(FusionEvent::TileFailed {
                    run_id: self.ctx.run_id,
                    tile_id,
                    error: e.to_string(),
                });
                return report;
            }
        };

        let scanner = TileScanner::new(tile, detector, &config.scan);
        let mut candidates = scanner.scan();
        let mut located = Vec::new();
        for candidate in candidates.by_ref() {
            let pixel = candidate.bbox.center();
            match georef.pixel_to_geo(pixel) {
                Ok(location) => located.push(Detection {
                    id: Detection::derive_id(&tile_id, &pixel),
                    location,
                    pixel,
                    bbox: candidate.bbox,
                    confidence: candidate.confidence,
                    class_label: candidate.class_label,
                    tile_id: tile_id.clone(),
                    context: Default::default(),
                    filter_reasons: Vec::new(),
                }),
                Err(e) => {
                    warn!(tile_id = %tile_id, error = %e, "Candidate failed to geo-reference, skipping");
                    report.projection_failures += 1;
                }
            }
        }
        report.scan = candidates.stats();

        if report.scan.windows_total > 0 && report.scan.windows_failed == report.scan.windows_total {
            let error = format!("all {} windows failed to read", report.scan.windows_total);
            warn!(tile_id = %tile_id, "{}", error);
            report.failure = Some(error.clone());
            self.emit(FusionEvent::TileFailed {
                run_id: self.ctx.run_id,
                tile_id,
                error,
            });
            return report;
        }

        let reference_lat = georef
            .pixel_to_geo(PixelCoord {
                x: tile.width() as f64 / 2.0,
                y: tile.height() as f64 / 2.0,
            })
            .map(|p| p.lat)
            .ok()
            .or_else(|| located.first().map(|d| d.location.lat))
            .unwrap_or(0.0);
        let mut dedup = DetectionDeduplicator::new(config.dedup.threshold_m, reference_lat);
        for detection in located {
            dedup.offer(detection);
        }
        report.duplicates_removed = dedup.duplicates();

        let annotator = ContextAnnotator::new(self.layers, &config.context);
        for detection in dedup.into_accepted() {
            let annotated = annotator.annotate(detection, tile);
            match self.filter.apply(annotated) {
                FilterOutcome::Accepted(d) => report.detections.push(d),
                FilterOutcome::Dropped(d) => report.filtered.push(d),
            }
        }

        info!(
            tile_id = %tile_id,
            windows = report.scan.windows_total,
            blank = report.scan.windows_blank,
            failed = report.scan.windows_failed,
            detections = report.detections.len(),
            filtered = report.filtered.len(),
            duplicates = report.duplicates_removed,
            "Tile processed"
        );
        self.emit(FusionEvent::TileScanned {
            run_id: self.ctx.run_id,
            tile_id,
            detections: report.detections.len(),
            filtered: report.filtered.len(),
        });
        report
    }

    fn emit(&self, event: FusionEvent) {
        if let Some(bus) = self.events {
            bus.emit_lossy(event);
        }
    }
}
