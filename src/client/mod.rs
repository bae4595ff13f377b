//! # Client-Side Prediction
//!
//! The client owns its craft's motion; the server owns everything else.
//!
//! ```text
//! snapshot ──► seed (first) / merge (later) ──► step ──► update [+ fire]
//!                                   ▲
//! hit ──────────────────────────────┘ counters, local invincibility
//! ```
//!
//! Merge rule: every snapshot after the first replaces the whole world except
//! the local craft, which keeps its predicted record.

use crate::game::combat::{CombatSystem, FIRE_COOLDOWN_TICKS, INVINCIBILITY_TICKS};
use crate::game::craft::{ControlUpdate, Craft, CraftId};
use crate::game::kinematics::{Controls, Kinematics, MotionTuning};
use crate::ws::protocol::{ClientMsg, ServerMsg, WorldSnapshot};

/// A client's view of the world: the last snapshot with its own craft predicted.
pub struct PredictedWorld {
    craft_id: CraftId,
    name: String,
    tuning: MotionTuning,
    /// Merged world; `None` until the first snapshot arrives
    world: Option<WorldSnapshot>,
}

impl PredictedWorld {
    pub fn new(craft_id: CraftId, name: String) -> Self {
        Self {
            craft_id,
            name,
            tuning: MotionTuning::default(),
            world: None,
        }
    }

    pub fn world(&self) -> Option<&WorldSnapshot> {
        self.world.as_ref()
    }

    /// The locally predicted record of this client's craft
    pub fn local(&self) -> Option<&Craft> {
        self.world.as_ref()?.crafts.get(&self.craft_id)
    }

    fn local_mut(&mut self) -> Option<&mut Craft> {
        self.world.as_mut()?.crafts.get_mut(&self.craft_id)
    }

    /// Feed a server message into the local view
    pub fn handle(&mut self, msg: ServerMsg) {
        match msg {
            ServerMsg::Snapshot(snapshot) => self.apply_snapshot(snapshot),
            ServerMsg::Hit {
                shooter_id,
                victim_id,
                kill_count,
                death_count,
            } => self.apply_hit(shooter_id, victim_id, kill_count, death_count),
            ServerMsg::Welcome { .. } | ServerMsg::Pong { .. } => {}
        }
    }

    /// Seed from the first snapshot, merge every later one
    pub fn apply_snapshot(&mut self, mut snapshot: WorldSnapshot) {
        match self.local().cloned() {
            Some(local) => {
                snapshot.crafts.insert(self.craft_id, local);
            }
            None => {
                if let Some(craft) = snapshot.crafts.get_mut(&self.craft_id) {
                    craft.name = self.name.clone();
                }
            }
        }
        self.world = Some(snapshot);
    }

    /// Record a hit notification
    pub fn apply_hit(
        &mut self,
        shooter_id: CraftId,
        victim_id: CraftId,
        kill_count: Option<u32>,
        death_count: u32,
    ) {
        let Some(world) = self.world.as_mut() else {
            return;
        };

        if let Some(victim) = world.crafts.get_mut(&victim_id) {
            victim.deaths = death_count;
            victim.invincibility = INVINCIBILITY_TICKS;
        }
        if let (Some(kills), Some(shooter)) = (kill_count, world.crafts.get_mut(&shooter_id)) {
            shooter.kills = kills;
        }
    }

    /// Advance the local view by one client step and return what to send.
    ///
    /// Other crafts coast on their last known velocities until the next
    /// snapshot replaces them.
    pub fn step(&mut self, controls: &Controls) -> Vec<ClientMsg> {
        let mut outgoing = Vec::new();
        let craft_id = self.craft_id;
        let tuning = self.tuning;

        let Some(world) = self.world.as_mut() else {
            return outgoing;
        };

        for (id, craft) in world.crafts.iter_mut() {
            let input = if *id == craft_id {
                *controls
            } else {
                Controls::default()
            };
            Kinematics::step(craft, &input, &tuning);
            craft.decay_counters();
        }

        if let Some(local) = self.local_mut() {
            // Same rule the server applies to the fire request
            if controls.fire && CombatSystem::can_fire(local).is_ok() {
                local.fire_cooldown = FIRE_COOLDOWN_TICKS;
                outgoing.push(ClientMsg::Fire);
            }
            outgoing.push(ClientMsg::Update(ControlUpdate::from_craft(local)));
        }

        outgoing
    }
}
