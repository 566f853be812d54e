//! Chunk demand scheduling with single-in-flight backpressure.
//!
//! Converts a viewport (center world coordinate + zoom) into a bounded,
//! deduplicated FIFO of chunk fetches. At most one request is outstanding
//! at a time, so throughput is bounded by round-trip latency rather than
//! queue depth. The scheduler is a pure state machine: callers dispatch
//! the coordinates it hands out and report the outcome back.

use crate::protocol::{ChunkCoord, CHUNK_SIZE};
use std::collections::{HashSet, VecDeque};

/// Safety ceiling on the visible half-extent, in chunks per axis.
const MAX_VISIBLE_CHUNKS: i32 = 16;

/// Viewport dimensions in pixels, supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

/// Lifecycle of a chunk coordinate within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Never seen by the scheduler.
    Unrequested,
    /// Waiting in the request queue.
    Queued,
    /// Request sent, response outstanding.
    Pending,
    /// Pixel data received.
    Loaded,
}

/// FIFO chunk scheduler with O(1) membership checks.
///
/// A coordinate lives in at most one of {queue, pending, loaded}.
#[derive(Debug, Default)]
pub struct ChunkScheduler {
    queue: VecDeque<ChunkCoord>,
    queued: HashSet<ChunkCoord>,
    pending: HashSet<ChunkCoord>,
    loaded: HashSet<ChunkCoord>,
    in_flight: bool,
}

impl ChunkScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue every chunk visible from the given camera state that is not
    /// already queued, pending, or loaded. Returns the number enqueued.
    ///
    /// The visible half-extent per axis is
    /// `max(1, (viewport_dim / zoom) / 16 + 1)`, clamped to 16 chunks.
    pub fn enqueue_visible(
        &mut self,
        center_x: i32,
        center_y: i32,
        zoom: f32,
        viewport: Viewport,
    ) -> usize {
        let center = ChunkCoord::from_world(center_x, center_y);
        let half_x = visible_half_extent(viewport.width, zoom);
        let half_y = visible_half_extent(viewport.height, zoom);

        let mut added = 0;
        for y in (center.y - half_y)..=(center.y + half_y) {
            for x in (center.x - half_x)..=(center.x + half_x) {
                let coord = ChunkCoord { x, y };
                if self.state(coord) == ChunkState::Unrequested {
                    self.queue.push_back(coord);
                    self.queued.insert(coord);
                    added += 1;
                }
            }
        }
        added
    }

    /// Pop the next coordinate to request, marking it pending and raising
    /// the in-flight flag.
    ///
    /// Returns `None` when a request is already outstanding, the queue is
    /// empty, or the popped coordinate turned out to be loaded/pending
    /// already (a race from a prior update). In the stale case the entry is
    /// discarded without retrying the next one; the caller's next event
    /// drives the retry.
    pub fn next_request(&mut self) -> Option<ChunkCoord> {
        if self.in_flight {
            return None;
        }
        let coord = self.queue.pop_front()?;
        self.queued.remove(&coord);
        if self.loaded.contains(&coord) || self.pending.contains(&coord) {
            return None;
        }
        self.pending.insert(coord);
        self.in_flight = true;
        Some(coord)
    }

    /// Undo a dispatch that failed at the transport, so the coordinate can
    /// be re-queued later.
    pub fn rollback(&mut self, coord: ChunkCoord) {
        self.pending.remove(&coord);
        self.in_flight = false;
    }

    /// Record a received chunk. Clears the in-flight flag and returns true
    /// when the queue holds more work to dispatch.
    pub fn mark_loaded(&mut self, coord: ChunkCoord) -> bool {
        self.pending.remove(&coord);
        self.loaded.insert(coord);
        self.in_flight = false;
        !self.queue.is_empty()
    }

    /// Lifecycle state of a coordinate.
    pub fn state(&self, coord: ChunkCoord) -> ChunkState {
        if self.loaded.contains(&coord) {
            ChunkState::Loaded
        } else if self.pending.contains(&coord) {
            ChunkState::Pending
        } else if self.queued.contains(&coord) {
            ChunkState::Queued
        } else {
            ChunkState::Unrequested
        }
    }

    /// Whether a request is currently outstanding.
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Number of queued coordinates.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Drop all state; the scheduler has no memory across sessions.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.queued.clear();
        self.pending.clear();
        self.loaded.clear();
        self.in_flight = false;
    }
}

/// Visible half-extent in chunks for one viewport axis.
///
/// Clamped in floating point so degenerate zooms (zero, subnormal, NaN)
/// cannot overflow the integer conversion.
fn visible_half_extent(viewport_dim: u32, zoom: f32) -> i32 {
    let chunks = (viewport_dim as f32 / zoom) / CHUNK_SIZE as f32 + 1.0;
    // clamp passes NaN through; the cast turns it into 0, so floor at 1.
    (chunks.clamp(1.0, MAX_VISIBLE_CHUNKS as f32) as i32).max(1)
}
