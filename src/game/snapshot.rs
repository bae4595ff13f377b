//! Snapshot building and delivery.
//!
//! Every tick the whole world goes to every connection. There is no delta
//! compression and no interest management, so bandwidth grows with
//! crafts × projectiles × connections.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::ws::protocol::{ServerMsg, WorldSnapshot};

use super::craft::CraftId;
use super::world::World;

/// Where the simulation sends its output
pub trait Outbox {
    /// Deliver to every connection
    fn broadcast(&mut self, msg: ServerMsg);

    /// Deliver to one connection only
    fn send_to(&mut self, craft_id: CraftId, msg: ServerMsg);
}

/// Builds full-world snapshot messages
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub fn build(tick: u64, world: &World) -> ServerMsg {
        ServerMsg::Snapshot(WorldSnapshot {
            tick,
            crafts: world.crafts.clone(),
            projectiles: world.projectiles.clone(),
        })
    }
}

/// Snapshot volume stats for debugging
#[derive(Debug, Default)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub avg_crafts_per_snapshot: f32,
    pub avg_projectiles_per_snapshot: f32,
}

impl SnapshotStats {
    pub fn record(&mut self, craft_count: usize, projectile_count: usize) {
        self.total_snapshots += 1;

        // Running average
        let n = self.total_snapshots as f32;
        self.avg_crafts_per_snapshot =
            self.avg_crafts_per_snapshot * ((n - 1.0) / n) + (craft_count as f32 / n);
        self.avg_projectiles_per_snapshot =
            self.avg_projectiles_per_snapshot * ((n - 1.0) / n) + (projectile_count as f32 / n);
    }
}

/// Per-connection outbound channels for targeted messages
#[derive(Clone, Default)]
pub struct Connections {
    senders: Arc<DashMap<CraftId, mpsc::Sender<ServerMsg>>>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, craft_id: CraftId, tx: mpsc::Sender<ServerMsg>) {
        self.senders.insert(craft_id, tx);
    }

    pub fn unregister(&self, craft_id: &CraftId) {
        self.senders.remove(craft_id);
    }

    /// Number of open connections
    pub fn count(&self) -> usize {
        self.senders.len()
    }

    /// Queue a message for one connection without waiting
    pub fn try_send(&self, craft_id: &CraftId, msg: ServerMsg) {
        let Some(tx) = self.senders.get(craft_id).map(|entry| entry.value().clone()) else {
            debug!(craft_id = %craft_id, "No connection for targeted message");
            return;
        };

        match tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(craft_id = %craft_id, "Outbound queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(craft_id = %craft_id, "Outbound queue closed");
            }
        }
    }
}

/// Outbox backed by a broadcast channel plus per-connection queues
pub struct ChannelOutbox {
    snapshot_tx: broadcast::Sender<ServerMsg>,
    connections: Connections,
}

impl ChannelOutbox {
    pub fn new(snapshot_tx: broadcast::Sender<ServerMsg>, connections: Connections) -> Self {
        Self {
            snapshot_tx,
            connections,
        }
    }
}

impl Outbox for ChannelOutbox {
    fn broadcast(&mut self, msg: ServerMsg) {
        // No subscribers is not an error
        let _ = self.snapshot_tx.send(msg);
    }

    fn send_to(&mut self, craft_id: CraftId, msg: ServerMsg) {
        self.connections.try_send(&craft_id, msg);
    }
}
