//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::game::combat::{HitResult, Projectile};
use crate::game::craft::{ControlUpdate, Craft, CraftId};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Full client-owned craft state (sent every client step)
    Update(ControlUpdate),

    /// Request to fire a projectile
    Fire,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        /// Id of the craft this connection controls
        craft_id: CraftId,
        server_time: u64,
    },

    /// Full world state (sent every tick)
    Snapshot(WorldSnapshot),

    /// Sent to the victim of a hit only
    Hit {
        shooter_id: CraftId,
        victim_id: CraftId,
        /// Shooter's kill count, null if the shooter has left
        kill_count: Option<u32>,
        death_count: u32,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl From<HitResult> for ServerMsg {
    fn from(hit: HitResult) -> Self {
        ServerMsg::Hit {
            shooter_id: hit.shooter_id,
            victim_id: hit.victim_id,
            kill_count: hit.kill_count,
            death_count: hit.death_count,
        }
    }
}

/// Entire world as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Server tick number
    pub tick: u64,
    pub crafts: HashMap<CraftId, Craft>,
    pub projectiles: Vec<Projectile>,
}
