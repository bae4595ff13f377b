//! Combat system - firing, projectiles, hit resolution

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::util::time::SIMULATION_TPS;

use super::craft::{Craft, CraftId};
use super::geometry::heading;
use super::world::World;

/// Ticks a projectile lives after spawning
pub const PROJECTILE_LIFETIME: u32 = 29;
/// Added to the owner's linear velocity at spawn
pub const PROJECTILE_SPEED_BOOST: f64 = 30.0;
/// Firing is refused at or above this linear velocity (warp cruise)
pub const FIRE_SPEED_CEILING: f64 = 41.0;
/// Ticks between accepted shots
pub const FIRE_COOLDOWN_TICKS: u32 = 45;
/// Ticks of immunity after being hit (one second)
pub const INVINCIBILITY_TICKS: u32 = SIMULATION_TPS;

/// Live projectile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub owner: CraftId,
    pub color: String,
    pub x: f64,
    pub y: f64,
    /// Bearing in degrees, copied from the owner
    pub orientation: f64,
    pub velocity: f64,
    pub lifetime: u32,
}

impl Projectile {
    /// Spawn at the owner's muzzle, already one step ahead
    pub fn spawn(owner: &Craft) -> Self {
        let mut projectile = Self {
            owner: owner.id,
            color: owner.color.clone(),
            x: owner.x,
            y: owner.y,
            orientation: owner.orientation,
            velocity: owner.linear_velocity + PROJECTILE_SPEED_BOOST,
            lifetime: PROJECTILE_LIFETIME,
        };
        projectile.advance();
        projectile
    }

    /// Move one step along the heading at constant velocity
    pub fn advance(&mut self) {
        let (dx, dy) = heading(self.orientation);
        self.x += dx * self.velocity;
        self.y += dy * self.velocity;
    }

    pub fn is_expired(&self) -> bool {
        self.lifetime == 0
    }
}

/// Reasons a fire request is refused
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FireError {
    #[error("craft is not registered")]
    UnknownCraft,

    #[error("weapon cooling down for {remaining} more ticks")]
    CoolingDown { remaining: u32 },

    #[error("linear velocity {velocity} is too high to fire")]
    TooFast { velocity: f64 },
}

/// Outcome of a resolved hit, delivered to the victim only
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub shooter_id: CraftId,
    pub victim_id: CraftId,
    /// Shooter's updated kill count, `None` if the shooter has left
    pub kill_count: Option<u32>,
    pub death_count: u32,
}

/// Combat rules over the world store
pub struct CombatSystem;

impl CombatSystem {
    /// Check whether a craft may fire right now
    pub fn can_fire(craft: &Craft) -> Result<(), FireError> {
        if craft.fire_cooldown > 0 {
            return Err(FireError::CoolingDown {
                remaining: craft.fire_cooldown,
            });
        }
        if craft.linear_velocity >= FIRE_SPEED_CEILING {
            return Err(FireError::TooFast {
                velocity: craft.linear_velocity,
            });
        }
        Ok(())
    }

    /// Validate a fire request and spawn the projectile.
    ///
    /// A refused request leaves the world untouched.
    pub fn fire(world: &mut World, shooter_id: CraftId) -> Result<(), FireError> {
        let shooter = world
            .craft_mut(&shooter_id)
            .ok_or(FireError::UnknownCraft)?;
        Self::can_fire(shooter)?;

        shooter.fire_cooldown = FIRE_COOLDOWN_TICKS;
        let projectile = Projectile::spawn(shooter);
        debug!(
            craft_id = %shooter_id,
            x = projectile.x,
            y = projectile.y,
            velocity = projectile.velocity,
            "Projectile fired"
        );
        world.projectiles.push(projectile);
        Ok(())
    }

    pub fn advance_projectiles(projectiles: &mut [Projectile]) {
        for projectile in projectiles.iter_mut() {
            projectile.advance();
        }
    }

    /// Count every lifetime down by one and drop the expired ones
    pub fn expire_projectiles(projectiles: &mut Vec<Projectile>) {
        for projectile in projectiles.iter_mut() {
            projectile.lifetime = projectile.lifetime.saturating_sub(1);
        }
        projectiles.retain(|p| !p.is_expired());
    }

    /// Apply a confirmed hit of projectile `index` on `victim_id`.
    ///
    /// Returns `None` when the projectile or victim no longer exists.
    pub fn resolve_hit(world: &mut World, index: usize, victim_id: CraftId) -> Option<HitResult> {
        let Some(victim) = world.crafts.get_mut(&victim_id) else {
            warn!(craft_id = %victim_id, "Hit on a craft that is no longer registered");
            return None;
        };
        let projectile = world.projectiles.get_mut(index)?;

        // Expires on this tick's expiry pass
        projectile.lifetime = 1;
        let shooter_id = projectile.owner;

        victim.invincibility = INVINCIBILITY_TICKS;
        victim.deaths += 1;
        let death_count = victim.deaths;

        let kill_count = world.crafts.get_mut(&shooter_id).map(|shooter| {
            shooter.kills += 1;
            shooter.kills
        });

        Some(HitResult {
            shooter_id,
            victim_id,
            kill_count,
            death_count,
        })
    }
}
