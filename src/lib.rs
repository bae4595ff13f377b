//! # Space Shooter Server
//!
//! Authoritative world simulation for a multiplayer arcade space shooter.
//!
//! ```text
//! game/        - World state and the fixed-rate tick
//! ├── geometry     - Bearings, affine matrices, hitbox triangles
//! ├── craft        - Craft record and control update validation
//! ├── kinematics   - Per-step craft motion (run by clients)
//! ├── combat       - Projectiles, firing rules, hit resolution
//! ├── collision    - Projectile vs hitbox tests
//! ├── snapshot     - Snapshot building and the outbox
//! └── simulation   - Tick driver and server task
//! client/      - Prediction and snapshot merge for a client
//! ws/          - WebSocket transport and wire protocol
//! http/        - Router: entry page, health, upgrade
//! ```

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
