//! Fusion configuration model and TOML resolution
//!
//! Configuration is resolved in priority order:
//! 1. Explicit path argument (highest priority)
//! 2. `POLESIGHT_CONFIG` environment variable
//! 3. User config file (`<config_dir>/polesight/fusion.toml`)
//! 4. Compiled defaults (fallback)
//!
//! Every section carries `#[serde(default)]`, so a TOML file only needs to name
//! the values it overrides.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "POLESIGHT_CONFIG";

/// Tolerance used when checking that scoring weights sum to one
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Complete fusion engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub scan: ScanConfig,
    pub georef: GeorefConfig,
    pub dedup: DedupConfig,
    pub context: ContextConfig,
    pub filter: FilterConfig,
    pub matching: MatchingConfig,
    pub scoring: ScoringConfig,
    pub classifier: ClassifierConfig,
    pub logging: LoggingConfig,
}

/// Sliding-window scan parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Window edge length in pixels
    pub window_size: usize,
    /// Step between window origins in pixels
    pub stride: usize,
    /// A window whose every band has a standard deviation below this is blank
    pub blank_stddev_threshold: f64,
    /// Boxes within this many pixels of an interior window border are discarded
    pub edge_margin_px: f64,
    /// Candidates with a detector confidence below this are discarded
    pub min_detector_confidence: f32,
    /// Class labels accepted from the detector (empty = accept all)
    pub accepted_classes: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window_size: 640,
            stride: 512,
            blank_stddev_threshold: 2.0,
            edge_margin_px: 2.0,
            min_detector_confidence: 0.25,
            accepted_classes: vec!["pole".to_string()],
        }
    }
}

/// Geo-referencing calibration (systematic bias correction, degrees)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeorefConfig {
    pub calibration_lat_deg: f64,
    pub calibration_lon_deg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Detections closer than this (metres) are duplicates of one object
    pub threshold_m: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { threshold_m: 6.0 }
    }
}

/// Auxiliary-layer sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Zero-based band index of the red channel
    pub red_band: usize,
    /// Zero-based band index of the near-infrared channel
    pub nir_band: usize,
    /// Buffer around water polygons (metres)
    pub water_buffer_m: f64,
    /// Radius of the ground-sample ring around a detection (metres)
    pub ground_sample_radius_m: f64,
    /// Number of samples on the ground ring
    pub ground_sample_count: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            red_band: 0,
            nir_band: 3,
            water_buffer_m: 2.0,
            ground_sample_radius_m: 5.0,
            ground_sample_count: 8,
        }
    }
}

/// Plausibility rule thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Strict mode drops violating detections; lenient mode annotates them
    pub strict: bool,
    pub max_road_distance_m: f64,
    pub ndvi_min: f64,
    pub ndvi_max: f64,
    pub min_surface_elevation_m: f64,
    pub min_height_above_ground_m: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            strict: true,
            max_road_distance_m: 120.0,
            ndvi_min: -0.1,
            ndvi_max: 0.45,
            min_surface_elevation_m: -5.0,
            min_height_above_ground_m: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Hard nearest-neighbor cutoff (metres)
    pub max_distance_m: f64,
    /// Matches at or under this distance get a full proximity score
    pub proximity_full_score_m: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_distance_m: 10.0,
            proximity_full_score_m: 2.0,
        }
    }
}

/// Weights and conservative defaults for combined confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub detector_weight: f64,
    pub recency_weight: f64,
    pub proximity_weight: f64,
    /// Used when a record has no detector confidence
    pub default_detector_confidence: f64,
    /// Used when a record has no ground-truth age
    pub default_recency_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            detector_weight: 0.40,
            recency_weight: 0.30,
            proximity_weight: 0.30,
            default_detector_confidence: 0.0,
            default_recency_weight: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum combined confidence for Verified
    pub verified_threshold: f64,
    /// Verified requires a match distance strictly below this (metres)
    pub verified_max_distance_m: f64,
    /// Source identifier contributed by aerial detections
    pub detection_source: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            verified_threshold: 0.75,
            verified_max_distance_m: 5.0,
            detection_source: "aerial_detection".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl FusionConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FusionConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file
    ///
    /// # Errors
    /// `Io` when the file cannot be read, `Config` when it does not parse or
    /// validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            warn!("Cannot read fusion config {}: {}", path.display(), e);
            Error::Io(e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve configuration following the documented priority order
    ///
    /// An explicitly named file (argument or environment variable) must load.
    /// The user config file is optional: if it is absent, compiled defaults are used.
    pub fn resolve(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            info!("Loading fusion config from {}", path.display());
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                info!("Loading fusion config from {} ({})", path, CONFIG_ENV_VAR);
                return Self::load(Path::new(&path));
            }
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                info!("Loading fusion config from {}", path.display());
                return Self::load(&path);
            }
        }

        warn!("No fusion config file found, using compiled defaults");
        Ok(Self::default())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let scan = &self.scan;
        if scan.window_size == 0 {
            return Err(Error::Config("scan.window_size must be positive".to_string()));
        }
        if scan.stride == 0 || scan.stride > scan.window_size {
            return Err(Error::Config(format!(
                "scan.stride must be in 1..={} (got {})",
                scan.window_size, scan.stride
            )));
        }
        if !(0.0..=1.0).contains(&scan.min_detector_confidence) {
            return Err(Error::Config(format!(
                "scan.min_detector_confidence out of range: {}",
                scan.min_detector_confidence
            )));
        }

        require_positive("dedup.threshold_m", self.dedup.threshold_m)?;
        require_positive("matching.max_distance_m", self.matching.max_distance_m)?;
        require_positive(
            "classifier.verified_max_distance_m",
            self.classifier.verified_max_distance_m,
        )?;
        require_positive("filter.max_road_distance_m", self.filter.max_road_distance_m)?;
        if self.context.water_buffer_m < 0.0 || self.context.ground_sample_radius_m <= 0.0 {
            return Err(Error::Config(
                "context buffers must be non-negative and the ground ring radius positive"
                    .to_string(),
            ));
        }
        if self.context.ground_sample_count == 0 {
            return Err(Error::Config(
                "context.ground_sample_count must be positive".to_string(),
            ));
        }
        if self.matching.proximity_full_score_m < 0.0
            || self.matching.proximity_full_score_m >= self.matching.max_distance_m
        {
            return Err(Error::Config(format!(
                "matching.proximity_full_score_m must be in [0, {})",
                self.matching.max_distance_m
            )));
        }
        if self.filter.ndvi_min > self.filter.ndvi_max {
            return Err(Error::Config(format!(
                "filter NDVI band is inverted: [{}, {}]",
                self.filter.ndvi_min, self.filter.ndvi_max
            )));
        }

        let s = &self.scoring;
        for (name, weight) in [
            ("scoring.detector_weight", s.detector_weight),
            ("scoring.recency_weight", s.recency_weight),
            ("scoring.proximity_weight", s.proximity_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(Error::Config(format!("{} out of range: {}", name, weight)));
            }
        }
        let sum = s.detector_weight + s.recency_weight + s.proximity_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::Config(format!(
                "scoring weights must sum to 1 (got {:.6})",
                sum
            )));
        }
        for (name, value) in [
            ("scoring.default_detector_confidence", s.default_detector_confidence),
            ("scoring.default_recency_weight", s.default_recency_weight),
            ("classifier.verified_threshold", self.classifier.verified_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{} out of range: {}", name, value)));
            }
        }
        if self.classifier.detection_source.trim().is_empty() {
            return Err(Error::Config(
                "classifier.detection_source must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{} must be positive (got {})", name, value)))
    }
}

/// Default per-user configuration path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("polesight").join("fusion.toml"))
}
