//! Progress event types for fusion runs
//!
//! Provides the FusionEvent enum and an EventBus built on a tokio broadcast
//! channel. Emission is fire-and-forget for the engine: a run never fails
//! because nobody is listening.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Fusion run progress events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FusionEvent {
    /// A tile finished scanning, deduplication and filtering
    TileScanned {
        run_id: Uuid,
        tile_id: String,
        /// Detections that survived deduplication and filtering
        detections: usize,
        /// Detections dropped by the plausibility filter
        filtered: usize,
    },

    /// A tile could not be processed at all
    TileFailed {
        run_id: Uuid,
        tile_id: String,
        error: String,
    },

    /// A ground-truth inventory loaded
    SourceLoaded {
        run_id: Uuid,
        source: String,
        records: usize,
        /// Rows dropped as invalid
        rejected: usize,
    },

    /// A ground-truth inventory failed to load (run continues degraded)
    SourceFailed {
        run_id: Uuid,
        source: String,
        error: String,
    },

    /// Classification finished
    RunCompleted {
        run_id: Uuid,
        assets: usize,
        verified: usize,
        review: usize,
        new_or_missing: usize,
        /// True when some tiles, windows, layers or sources failed
        degraded: bool,
    },

    /// The run aborted with a fatal error
    RunFailed { run_id: Uuid, error: String },
}

impl FusionEvent {
    /// Run identifier carried by every event
    pub fn run_id(&self) -> Uuid {
        match self {
            FusionEvent::TileScanned { run_id, .. }
            | FusionEvent::TileFailed { run_id, .. }
            | FusionEvent::SourceLoaded { run_id, .. }
            | FusionEvent::SourceFailed { run_id, .. }
            | FusionEvent::RunCompleted { run_id, .. }
            | FusionEvent::RunFailed { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast bus for fusion events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FusionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<FusionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FusionEvent,
    ) -> Result<usize, broadcast::error::SendError<FusionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: FusionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
