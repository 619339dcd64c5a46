// Detection pipeline tests over synthetic tiles
//
// Covers geo-referencing round trips, deduplication distance behaviour, the
// window edge policy, blank-window skipping and read-failure isolation.

mod helpers;

use helpers::*;
use polesight_common::{EventBus, FusionEvent};
use polesight_fusion::detection::dedup::deduplicate;
use polesight_fusion::detection::{DetectionPipeline, TileScanner};
use polesight_fusion::geodesy::{haversine_m, Crs, GeoPoint, GeoTransform, LocalMetricFrame};
use polesight_fusion::raster::{InMemoryRaster, PixelWindow, RasterTile, RasterWindow};
use polesight_fusion::types::{BoundingBox, PixelCoord};
use polesight_fusion::{Detection, FusionError, Result};
use std::sync::Arc;

fn top_left() -> GeoPoint {
    GeoPoint::new(-33.8688, 151.2093).unwrap()
}

fn detection_at(scene: &Scene, col: f64, row: f64) -> Detection {
    let pixel = PixelCoord { x: col, y: row };
    Detection {
        id: Detection::derive_id(&scene.tile_id, &pixel),
        location: scene.location_of(col, row),
        pixel,
        bbox: BoundingBox::new(col - 3.5, row - 3.5, col + 3.5, row + 3.5),
        confidence: Some(0.8),
        class_label: "pole".to_string(),
        tile_id: scene.tile_id.clone(),
        context: Default::default(),
        filter_reasons: Vec::new(),
    }
}

/// Wraps a tile and fails reads of selected windows
struct FlakyTile {
    inner: InMemoryRaster,
    fails: fn(&PixelWindow) -> bool,
}

impl RasterTile for FlakyTile {
    fn tile_id(&self) -> &str {
        self.inner.tile_id()
    }
    fn width(&self) -> usize {
        self.inner.width()
    }
    fn height(&self) -> usize {
        self.inner.height()
    }
    fn band_count(&self) -> usize {
        self.inner.band_count()
    }
    fn transform(&self) -> GeoTransform {
        self.inner.transform()
    }
    fn crs(&self) -> Crs {
        self.inner.crs()
    }
    fn read_window(&self, window: &PixelWindow) -> Result<RasterWindow> {
        if (self.fails)(window) {
            return Err(FusionError::ReadFailure(format!("simulated I/O error at {}", window)));
        }
        self.inner.read_window(window)
    }
}

// ================================================================================================
// Geo-referencing
// ================================================================================================

#[test]
fn pixel_geo_round_trip_across_tile() {
    let scene = Scene::new("tile_rt", top_left());
    let georef = scene.georeferencer();

    for row in (0..=256).step_by(32) {
        for col in (0..=256).step_by(32) {
            let pixel = PixelCoord {
                x: col as f64 + 0.25,
                y: row as f64 + 0.75,
            };
            let geo = georef.pixel_to_geo(pixel).unwrap();
            let back = georef.geo_to_pixel(&geo).unwrap();
            assert!(
                (back.x - pixel.x).abs() < 1e-3 && (back.y - pixel.y).abs() < 1e-3,
                "({}, {}) came back as ({}, {})",
                pixel.x,
                pixel.y,
                back.x,
                back.y
            );
        }
    }
}

#[test]
fn neighbouring_pixels_are_half_a_metre_apart() {
    let scene = Scene::new("tile_px", top_left());
    let a = scene.location_of(100.5, 100.5);
    let east = scene.location_of(101.5, 100.5);
    let south = scene.location_of(100.5, 101.5);
    assert!((haversine_m(&a, &east) - PIXEL_SIZE_M).abs() < 0.01);
    assert!((haversine_m(&a, &south) - PIXEL_SIZE_M).abs() < 0.01);
    assert!(south.lat < a.lat);
    assert!(east.lon > a.lon);
}

// ================================================================================================
// Deduplication
// ================================================================================================

#[test]
fn dedup_merges_only_pairs_within_threshold() {
    let scene = Scene::new("tile_dd", top_left());
    let frame = LocalMetricFrame::centered_on(scene.location_of(128.0, 128.0));
    let threshold = test_config().dedup.threshold_m;

    for separation_px in [2.0, 6.0, 10.0, 11.0, 13.0, 20.0, 40.0] {
        let first = detection_at(&scene, 60.0, 60.0);
        let second = detection_at(&scene, 60.0 + separation_px, 60.0);
        let separation_m = frame.distance_m(&first.location, &second.location);

        let (kept, removed) = deduplicate(vec![first.clone(), second], threshold);
        if separation_m < threshold - 0.05 {
            assert_eq!((kept.len(), removed), (1, 1), "{} m apart", separation_m);
            assert_eq!(kept[0].id, first.id);
        } else if separation_m > threshold + 0.05 {
            assert_eq!((kept.len(), removed), (2, 0), "{} m apart", separation_m);
        }
    }
}

#[test]
fn dedup_keeps_first_of_a_cluster() {
    let scene = Scene::new("tile_cluster", top_left());
    let cluster: Vec<Detection> = (0..5)
        .map(|i| detection_at(&scene, 50.0 + i as f64, 50.0))
        .collect();
    let far = detection_at(&scene, 200.0, 200.0);
    let mut input = cluster.clone();
    input.push(far.clone());

    let (kept, removed) = deduplicate(input, test_config().dedup.threshold_m);
    assert_eq!(removed, 4);
    assert_eq!(
        kept.iter().map(|d| d.id).collect::<Vec<_>>(),
        vec![cluster[0].id, far.id]
    );
}

// ================================================================================================
// Scanning
// ================================================================================================

#[test]
fn box_on_interior_window_border_is_left_to_neighbour() {
    let mut scene = Scene::new("tile_edge", top_left());
    // Column 127 sits at the right border of the first window and well inside
    // the window starting at 96
    scene.place_pole(PoleSpec::at(127, 60));
    let config = test_config();
    let detector = MarkerDetector::default();

    let mut scan = TileScanner::new(scene.raster(), &detector, &config.scan).scan();
    let candidates: Vec<_> = scan.by_ref().collect();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].window.col_off, 96);
    assert_eq!(candidates[0].bbox.center().x, 127.5);
    assert_eq!(scan.stats().edge_discarded, 1);
}

#[test]
fn box_on_tile_border_is_kept() {
    let mut scene = Scene::new("tile_border", top_left());
    scene.place_pole(PoleSpec::at(1, 60));
    let config = test_config();
    let detector = MarkerDetector::default();

    let mut scan = TileScanner::new(scene.raster(), &detector, &config.scan).scan();
    let candidates: Vec<_> = scan.by_ref().collect();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].bbox.center().x, 1.5);
    assert_eq!(scan.stats().edge_discarded, 0);
}

#[test]
fn uniform_tile_is_all_blank_windows() {
    let scene = Scene::new("tile_seed", top_left());
    let source = scene.raster();
    let n = TILE_PX * TILE_PX;
    let blank = InMemoryRaster::new(
        "tile_blank",
        TILE_PX,
        TILE_PX,
        source.transform(),
        source.crs(),
        vec![vec![80.0; n]; 4],
    )
    .unwrap();
    let config = test_config();
    let detector = MarkerDetector::default();

    let mut scan = TileScanner::new(&blank, &detector, &config.scan).scan();
    assert_eq!(scan.by_ref().count(), 0);
    let stats = scan.stats();
    assert_eq!(stats.windows_total, 9);
    assert_eq!(stats.windows_blank, 9);
    assert_eq!(stats.windows_failed, 0);
}

#[test]
fn window_read_failures_are_counted_and_isolated() {
    let mut scene = Scene::new("tile_flaky", top_left());
    scene.place_pole(PoleSpec::at(40, 40));
    scene.place_pole(PoleSpec::at(200, 200));
    let layers = scene.layers(Some(120.5), &[]);
    let ctx = run_context(test_config());
    let flaky: Arc<dyn RasterTile> = Arc::new(FlakyTile {
        inner: scene.raster().clone(),
        fails: |w| w.col_off == 128,
    });

    let batch = DetectionPipeline::new(&ctx, &layers).run(&[flaky], &MarkerDetector::default());

    assert_eq!(batch.scan.windows_total, 9);
    assert_eq!(batch.scan.windows_failed, 3);
    assert!(batch.tiles_failed.is_empty());
    // Column 200 is only covered by windows starting at 96 and 128
    assert_eq!(batch.detections.len(), 2);
}

#[test]
fn tile_with_every_window_failing_is_marked_failed() {
    let mut scene = Scene::new("tile_dead", top_left());
    scene.place_pole(PoleSpec::at(40, 40));
    let layers = scene.layers(Some(40.5), &[]);
    let ctx = run_context(test_config());
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let dead: Arc<dyn RasterTile> = Arc::new(FlakyTile {
        inner: scene.raster().clone(),
        fails: |_| true,
    });
    let healthy = scene.tile();

    let batch = DetectionPipeline::new(&ctx, &layers)
        .with_events(&bus)
        .run(&[dead, healthy], &MarkerDetector::default());

    assert_eq!(batch.tiles_processed, 2);
    assert_eq!(batch.tiles_failed, vec!["tile_dead".to_string()]);
    assert_eq!(batch.detections.len(), 1);

    let mut failed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let FusionEvent::TileFailed { tile_id, .. } = event {
            failed.push(tile_id);
        }
    }
    assert_eq!(failed, vec!["tile_dead".to_string()]);
}
