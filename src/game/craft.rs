//! Craft record and validation of client-reported motion

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::kinematics::normalize_bearing;

/// Craft identity: the id of the connection controlling it
pub type CraftId = Uuid;

/// Longest accepted display name, in characters
pub const MAX_NAME_CHARS: usize = 8;
/// Largest accepted coordinate magnitude
pub const WORLD_LIMIT: f64 = 1.0e7;
/// Largest accepted linear velocity (the motion model tops out near 81)
pub const MAX_LINEAR_VELOCITY: f64 = 100.0;
/// Largest accepted rotational velocity magnitude (the motion model tops out near 12.5)
pub const MAX_ROTATIONAL_VELOCITY: f64 = 20.0;

/// Authoritative craft record.
///
/// Motion fields are owned by the controlling client and overwritten on every
/// accepted update. Color and all counters are owned by the server.
/// `fire_cooldown` and `invincibility` only ever count down, except when a
/// shot is accepted or a hit is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Craft {
    pub id: CraftId,
    pub name: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
    /// Bearing in degrees, `[0, 360)`
    pub orientation: f64,
    pub linear_velocity: f64,
    pub rotational_velocity: f64,
    pub fire_cooldown: u32,
    pub invincibility: u32,
    pub kills: u32,
    pub deaths: u32,
}

impl Craft {
    pub fn new(id: CraftId, name: String, color: String, orientation: f64) -> Self {
        Self {
            id,
            name,
            color,
            x: 0.0,
            y: 0.0,
            orientation: normalize_bearing(orientation),
            linear_velocity: 0.0,
            rotational_velocity: 0.0,
            fire_cooldown: 0,
            invincibility: 0,
            kills: 0,
            deaths: 0,
        }
    }

    /// Overwrite the client-owned fields with a validated update
    pub fn apply_update(&mut self, update: ValidUpdate) {
        let ValidUpdate(update) = update;
        self.name = update.name;
        self.x = update.x;
        self.y = update.y;
        self.orientation = update.orientation;
        self.linear_velocity = update.linear_velocity;
        self.rotational_velocity = update.rotational_velocity;
    }

    /// One tick of counter decay, floored at zero
    pub fn decay_counters(&mut self) {
        self.fire_cooldown = self.fire_cooldown.saturating_sub(1);
        self.invincibility = self.invincibility.saturating_sub(1);
    }

    pub fn is_invincible(&self) -> bool {
        self.invincibility > 0
    }
}

/// Client-reported craft state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlUpdate {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub orientation: f64,
    pub linear_velocity: f64,
    pub rotational_velocity: f64,
}

impl ControlUpdate {
    /// Client-owned fields of an existing record
    pub fn from_craft(craft: &Craft) -> Self {
        Self {
            name: craft.name.clone(),
            x: craft.x,
            y: craft.y,
            orientation: craft.orientation,
            linear_velocity: craft.linear_velocity,
            rotational_velocity: craft.rotational_velocity,
        }
    }

    /// Check shape and numeric ranges before the update may touch the world
    pub fn validate(self) -> Result<ValidUpdate, CraftUpdateError> {
        for (field, value) in [
            ("x", self.x),
            ("y", self.y),
            ("orientation", self.orientation),
            ("linear_velocity", self.linear_velocity),
            ("rotational_velocity", self.rotational_velocity),
        ] {
            if !value.is_finite() {
                return Err(CraftUpdateError::NotFinite(field));
            }
        }

        if self.x.abs() > WORLD_LIMIT || self.y.abs() > WORLD_LIMIT {
            return Err(CraftUpdateError::OutOfBounds {
                x: self.x,
                y: self.y,
            });
        }

        if !(0.0..360.0).contains(&self.orientation) {
            return Err(CraftUpdateError::Orientation(self.orientation));
        }

        if !(0.0..=MAX_LINEAR_VELOCITY).contains(&self.linear_velocity) {
            return Err(CraftUpdateError::LinearVelocity(self.linear_velocity));
        }

        if self.rotational_velocity.abs() > MAX_ROTATIONAL_VELOCITY {
            return Err(CraftUpdateError::RotationalVelocity(
                self.rotational_velocity,
            ));
        }

        if self.name.chars().count() > MAX_NAME_CHARS {
            return Err(CraftUpdateError::NameTooLong);
        }

        if self.name.chars().any(char::is_control) {
            return Err(CraftUpdateError::NameCharacters);
        }

        Ok(ValidUpdate(self))
    }
}

/// A control update that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidUpdate(ControlUpdate);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CraftUpdateError {
    #[error("{0} is not a finite number")]
    NotFinite(&'static str),

    #[error("position ({x}, {y}) is outside the world")]
    OutOfBounds { x: f64, y: f64 },

    #[error("orientation {0} is outside [0, 360)")]
    Orientation(f64),

    #[error("linear velocity {0} is out of range")]
    LinearVelocity(f64),

    #[error("rotational velocity {0} is out of range")]
    RotationalVelocity(f64),

    #[error("name is longer than {} characters", MAX_NAME_CHARS)]
    NameTooLong,

    #[error("name contains control characters")]
    NameCharacters,
}

/// Clean up a requested display name, falling back to `default`
pub fn sanitize_name(requested: Option<&str>, default: &str) -> String {
    let cleaned: String = requested
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        default.to_string()
    } else {
        cleaned.to_string()
    }
}
