//! Interpolation.
//!
//! The server sends discrete snapshots on its broadcast cadence.
//! The client renders at its own rate and interpolates bodies between the
//! last two snapshots.

use std::collections::VecDeque;

use arena_shared::{
    math::Vec2,
    net::ClientId,
    snapshot::{NpcState, PlayerState, WorldSnapshot},
};

/// Buffered snapshot history for interpolation.
#[derive(Default)]
pub struct SnapshotBuffer {
    history: VecDeque<WorldSnapshot>,
    max: usize,
}

impl SnapshotBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            history: VecDeque::new(),
            max,
        }
    }

    /// Stores a snapshot. Datagrams can arrive out of order; stale ones are dropped.
    pub fn push(&mut self, snap: WorldSnapshot) -> bool {
        if let Some(last) = self.history.back() {
            if snap.tick <= last.tick {
                return false;
            }
        }
        self.history.push_back(snap);
        while self.history.len() > self.max {
            self.history.pop_front();
        }
        true
    }

    /// Returns the number of buffered snapshots.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns true if no snapshots are buffered.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    fn last_two(&self) -> Option<(&WorldSnapshot, &WorldSnapshot)> {
        let n = self.history.len();
        if n < 2 {
            return None;
        }
        Some((&self.history[n - 2], &self.history[n - 1]))
    }

    /// Interpolated position of a player.
    ///
    /// `alpha` should be in $[0,1]$ where 0 = older snapshot, 1 = newer.
    /// A player who respawned between the two snapshots snaps to the newer
    /// position instead of sliding across the map.
    pub fn interp_player(&self, id: ClientId, alpha: f32) -> Option<Vec2> {
        let (a, b) = self.last_two()?;
        let pa = find_player(a, id)?;
        let pb = find_player(b, id)?;
        if pb.size < pa.size && pb.position.distance(pa.position) > pa.size * 4.0 {
            return Some(pb.position);
        }
        Some(pa.position.lerp(pb.position, alpha))
    }

    /// Interpolated position of an NPC slot.
    pub fn interp_npc(&self, index: usize, alpha: f32) -> Option<Vec2> {
        let (a, b) = self.last_two()?;
        let pa = find_npc(a, index)?.position;
        let pb = find_npc(b, index)?.position;
        Some(pa.lerp(pb, alpha))
    }

    pub fn last_snapshot(&self) -> Option<&WorldSnapshot> {
        self.history.back()
    }
}

/// Convenience: find a player in a snapshot.
pub fn find_player(snap: &WorldSnapshot, id: ClientId) -> Option<&PlayerState> {
    snap.player(id)
}

/// Convenience: find an NPC slot in a snapshot.
pub fn find_npc(snap: &WorldSnapshot, index: usize) -> Option<&NpcState> {
    snap.npcs.iter().find(|n| n.index == index)
}
