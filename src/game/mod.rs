//! Game simulation modules

pub mod collision;
pub mod combat;
pub mod craft;
pub mod geometry;
pub mod kinematics;
pub mod simulation;
pub mod snapshot;
pub mod world;

pub use simulation::{GameServer, WorldHandle};

use crate::ws::protocol::ClientMsg;
use craft::CraftId;

/// Input received from a connection task
#[derive(Debug, Clone)]
pub struct CraftInput {
    pub craft_id: CraftId,
    pub event: InputEvent,
    pub received_at: u64,
}

/// What happened on the connection
#[derive(Debug, Clone)]
pub enum InputEvent {
    /// Connection opened; register a craft
    Connected { name: String },
    /// Parsed client message
    Message(ClientMsg),
    /// Connection closed; remove the craft
    Disconnected,
}
