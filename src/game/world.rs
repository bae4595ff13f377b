//! World state store: crafts keyed by connection id plus live projectiles

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

use super::combat::Projectile;
use super::craft::{Craft, CraftId};

/// Name given to crafts until their client reports one
pub const DEFAULT_CRAFT_NAME: &str = "Joe";

/// The whole simulated world (owned by the simulation task)
pub struct World {
    pub crafts: HashMap<CraftId, Craft>,
    pub projectiles: Vec<Projectile>,
    rng: ChaCha8Rng,
}

impl World {
    pub fn new(seed: u64) -> Self {
        Self {
            crafts: HashMap::new(),
            projectiles: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Register a craft for a new connection with a random color and orientation.
    ///
    /// Returns `None` if the id is already registered.
    pub fn spawn_craft(&mut self, id: CraftId, name: String) -> Option<&Craft> {
        if self.crafts.contains_key(&id) {
            return None;
        }

        let color = format!("#{:06x}", self.rng.gen_range(0..=0xff_ffffu32));
        let orientation = self.rng.gen_range(0.0..360.0);
        Some(
            self.crafts
                .entry(id)
                .or_insert_with(|| Craft::new(id, name, color, orientation)),
        )
    }

    pub fn remove_craft(&mut self, id: &CraftId) -> Option<Craft> {
        self.crafts.remove(id)
    }

    pub fn craft(&self, id: &CraftId) -> Option<&Craft> {
        self.crafts.get(id)
    }

    pub fn craft_mut(&mut self, id: &CraftId) -> Option<&mut Craft> {
        self.crafts.get_mut(id)
    }

    pub fn craft_count(&self) -> usize {
        self.crafts.len()
    }
}
