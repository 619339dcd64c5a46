//! Sliding-window tile scanner
//!
//! Produces a lazy, finite, restartable sequence of detection candidates for
//! one tile. Each call to [`TileScanner::scan`] starts a fresh pass.
//!
//! # Per-window steps
//! 1. Read all bands (read failure → log, count, skip)
//! 2. Skip near-blank windows (every band's std-dev below threshold)
//! 3. Invoke the detector (detector failure → log, count, skip)
//! 4. Drop boxes touching an interior window border; boxes touching a border
//!    that is also the tile boundary are kept
//! 5. Translate window-local boxes into tile-global pixel coordinates

use crate::raster::{Detector, PixelWindow, RasterTile, RawDetection};
use crate::types::BoundingBox;
use polesight_common::config::ScanConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::AddAssign;
use tracing::{debug, warn};

/// A detector box placed in tile-global pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub tile_id: String,
    /// Window that produced the candidate
    pub window: PixelWindow,
    /// Tile-global bounding box
    pub bbox: BoundingBox,
    pub confidence: Option<f32>,
    pub class_label: String,
}

/// Per-scan counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub windows_total: usize,
    pub windows_blank: usize,
    pub windows_failed: usize,
    pub detector_failures: usize,
    pub candidates: usize,
    pub edge_discarded: usize,
    pub low_confidence_discarded: usize,
    pub class_discarded: usize,
    pub invalid_discarded: usize,
}

impl AddAssign for ScanStats {
    fn add_assign(&mut self, other: Self) {
        self.windows_total += other.windows_total;
        self.windows_blank += other.windows_blank;
        self.windows_failed += other.windows_failed;
        self.detector_failures += other.detector_failures;
        self.candidates += other.candidates;
        self.edge_discarded += other.edge_discarded;
        self.low_confidence_discarded += other.low_confidence_discarded;
        self.class_discarded += other.class_discarded;
        self.invalid_discarded += other.invalid_discarded;
    }
}

/// Sliding-window scanner over one tile
#[derive(Clone, Copy)]
pub struct TileScanner<'a> {
    tile: &'a dyn RasterTile,
    detector: &'a dyn Detector,
    config: &'a ScanConfig,
}

impl<'a> TileScanner<'a> {
    pub fn new(tile: &'a dyn RasterTile, detector: &'a dyn Detector, config: &'a ScanConfig) -> Self {
        Self {
            tile,
            detector,
            config,
        }
    }

    /// Window layout covering every pixel of the tile
    ///
    /// Offsets advance by the stride; a final window sits flush with the far
    /// edge. A tile smaller than the window yields one clipped window per axis.
    pub fn window_layout(&self) -> Vec<PixelWindow> {
        let cols = axis_offsets(self.tile.width(), self.config.window_size, self.config.stride);
        let rows = axis_offsets(self.tile.height(), self.config.window_size, self.config.stride);
        let win_w = self.config.window_size.min(self.tile.width());
        let win_h = self.config.window_size.min(self.tile.height());

        rows.iter()
            .flat_map(|&row| {
                cols.iter()
                    .map(move |&col| PixelWindow::new(col, row, win_w, win_h))
            })
            .collect()
    }

    /// Start a fresh scan pass
    pub fn scan(&self) -> ScanIter<'a> {
        ScanIter {
            scanner: *self,
            windows: self.window_layout(),
            next_window: 0,
            pending: VecDeque::new(),
            stats: ScanStats::default(),
        }
    }

    fn accepts_class(&self, label: &str) -> bool {
        self.config.accepted_classes.is_empty()
            || self
                .config
                .accepted_classes
                .iter()
                .any(|c| c.eq_ignore_ascii_case(label))
    }

    /// True when the box touches a window border that is interior to the tile
    fn touches_interior_border(&self, window: &PixelWindow, bbox: &BoundingBox) -> bool {
        let margin = self.config.edge_margin_px;
        let left = bbox.x_min <= margin && window.col_off > 0;
        let top = bbox.y_min <= margin && window.row_off > 0;
        let right = bbox.x_max >= window.width as f64 - margin
            && window.col_off + window.width < self.tile.width();
        let bottom = bbox.y_max >= window.height as f64 - margin
            && window.row_off + window.height < self.tile.height();
        left || top || right || bottom
    }
}

fn axis_offsets(len: usize, window: usize, stride: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    if len <= window {
        return vec![0];
    }
    let last = len - window;
    let mut offsets: Vec<usize> = (0..=last).step_by(stride.max(1)).collect();
    if offsets.last() != Some(&last) {
        offsets.push(last);
    }
    offsets
}

/// Lazy candidate iterator for one scan pass
pub struct ScanIter<'a> {
    scanner: TileScanner<'a>,
    windows: Vec<PixelWindow>,
    next_window: usize,
    pending: VecDeque<Candidate>,
    stats: ScanStats,
}

impl<'a> ScanIter<'a> {
    /// Counters accumulated so far in this pass
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    fn process_window(&mut self, window: PixelWindow) {
        let scanner = self.scanner;
        let tile_id = scanner.tile.tile_id();
        self.stats.windows_total += 1;

        let pixels = match scanner.tile.read_window(&window) {
            Ok(pixels) => pixels,
            Err(e) => {
                warn!(tile_id, window = %window, error = %e, "Window read failed, skipping");
                self.stats.windows_failed += 1;
                return;
            }
        };

        if pixels.max_band_stddev() < scanner.config.blank_stddev_threshold {
            debug!(tile_id, window = %window, "Blank window skipped");
            self.stats.windows_blank += 1;
            return;
        }

        let raw = match scanner.detector.infer(&pixels) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(tile_id, window = %window, error = %e, "Detector failed, skipping window");
                self.stats.detector_failures += 1;
                return;
            }
        };

        for det in raw {
            if let Some(candidate) = self.accept(window, det) {
                self.stats.candidates += 1;
                self.pending.push_back(candidate);
            }
        }
    }

    fn accept(&mut self, window: PixelWindow, det: RawDetection) -> Option<Candidate> {
        let scanner = self.scanner;
        if !det.bbox.is_valid() {
            self.stats.invalid_discarded += 1;
            return None;
        }
        if !scanner.accepts_class(&det.class_label) {
            self.stats.class_discarded += 1;
            return None;
        }
        if let Some(conf) = det.confidence {
            if conf < scanner.config.min_detector_confidence {
                self.stats.low_confidence_discarded += 1;
                return None;
            }
        }
        if scanner.touches_interior_border(&window, &det.bbox) {
            debug!(
                tile_id = scanner.tile.tile_id(),
                window = %window,
                "Box touches interior window border, left to neighbouring window"
            );
            self.stats.edge_discarded += 1;
            return None;
        }

        Some(Candidate {
            tile_id: scanner.tile.tile_id().to_string(),
            window,
            bbox: det
                .bbox
                .translate(window.col_off as f64, window.row_off as f64),
            confidence: det.confidence,
            class_label: det.class_label,
        })
    }
}

impl<'a> Iterator for ScanIter<'a> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        loop {
            if let Some(candidate) = self.pending.pop_front() {
                return Some(candidate);
            }
            let window = *self.windows.get(self.next_window)?;
            self.next_window += 1;
            self.process_window(window);
        }
    }
}
