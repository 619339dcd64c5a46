//! Fusion stage
//!
//! # Components
//! 1. **matcher** - bidirectional nearest-neighbor matching in a local metric frame
//! 2. **corroboration** - record assembly and cross-inventory absorption
//! 3. **scorer** - combined confidence from detector, recency and proximity
//! 4. **classifier** - Verified / Review / NewOrMissing tiers and review ranking
//! 5. **statistics** - run summary and failure counts
//! 6. **validator** - multi-source orchestration and run status

pub mod classifier;
pub mod corroboration;
pub mod matcher;
pub mod scorer;
pub mod statistics;
pub mod validator;

pub use classifier::Classifier;
pub use corroboration::assemble_records;
pub use matcher::{MatchPair, SpatialMatcher};
pub use scorer::ConfidenceScorer;
pub use statistics::{DistanceStats, FailureCounts, Summary};
pub use validator::{FusionRun, LoadedInventories, MultiSourceValidator, RunStatus};
