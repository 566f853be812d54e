//! Last-known state of remote players, keyed by player id.

use crate::protocol::{PlayerId, PlayerUpdate, Rgb};
use std::collections::HashMap;

/// Snapshot of one remote player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerRecord {
    /// World x position.
    pub x: i32,
    /// World y position.
    pub y: i32,
    /// Cursor color.
    pub color: Rgb,
    /// Selected tool id.
    pub tool: u8,
}

/// Mapping from player id to last-known state.
///
/// Mutated only by decoded `WorldUpdate` frames; readers get cloned
/// snapshots so the render thread never observes a partial update.
#[derive(Debug, Default)]
pub struct PlayerTable {
    players: HashMap<PlayerId, PlayerRecord>,
}

impl PlayerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one decoded world update, skipping this client's own id.
    pub fn apply_update(
        &mut self,
        own_id: PlayerId,
        players: &[PlayerUpdate],
        disconnects: &[PlayerId],
    ) {
        for p in players {
            if p.id == own_id {
                continue;
            }
            self.players.insert(
                p.id,
                PlayerRecord {
                    x: p.x,
                    y: p.y,
                    color: p.color,
                    tool: p.tool,
                },
            );
        }
        for id in disconnects {
            self.players.remove(id);
        }
    }

    /// Look up a single player.
    pub fn get(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    /// Number of tracked players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether no players are tracked.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Cloned snapshot for the render thread.
    pub fn snapshot(&self) -> HashMap<PlayerId, PlayerRecord> {
        self.players.clone()
    }

    /// Drop all players (session reset).
    pub fn clear(&mut self) {
        self.players.clear();
    }
}
