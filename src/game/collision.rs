//! Projectile vs craft hit detection.
//!
//! Naive O(projectiles × crafts); no spatial index at the player counts we run.

use std::collections::HashMap;

use super::combat::Projectile;
use super::craft::{Craft, CraftId};
use super::geometry::{craft_hitbox, point_in_triangle, Point};

pub struct CollisionDetector;

impl CollisionDetector {
    /// Whether `craft` may be hit by `projectile` at all
    pub fn is_eligible(projectile: &Projectile, craft: &Craft) -> bool {
        craft.id != projectile.owner && !craft.is_invincible()
    }

    /// Whether the projectile's position lies strictly inside the craft hitbox
    pub fn hits(projectile: &Projectile, craft: &Craft) -> bool {
        craft_hitbox(craft)
            .map(|hitbox| point_in_triangle(Point::new(projectile.x, projectile.y), &hitbox))
            .unwrap_or(false)
    }

    /// First eligible craft the projectile is inside of.
    ///
    /// Scanning stops at the first confirmed hit, so a projectile overlapping
    /// several crafts still credits exactly one.
    pub fn first_hit(
        projectile: &Projectile,
        crafts: &HashMap<CraftId, Craft>,
    ) -> Option<CraftId> {
        crafts
            .values()
            .filter(|craft| Self::is_eligible(projectile, craft))
            .find(|craft| Self::hits(projectile, craft))
            .map(|craft| craft.id)
    }
}
