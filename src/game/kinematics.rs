//! Craft motion model.
//!
//! Clients integrate this locally to predict their own craft; the server
//! stores whatever record the client reports and never re-runs it.

use serde::{Deserialize, Serialize};

use super::craft::Craft;
use super::geometry::heading;

/// Motion tuning, in world units and degrees per step
#[derive(Debug, Clone, Copy)]
pub struct MotionTuning {
    /// Rotational velocity past which rotate acceleration halves
    pub rotation_soft_cap: f64,
    pub rotation_accel: f64,
    pub rotation_accel_capped: f64,
    pub rotation_decay: f64,
    /// Velocity above which the craft is in warp
    pub warp_threshold: f64,
    /// Velocity above which thrust drops to `thrust_capped`
    pub velocity_ceiling: f64,
    pub thrust: f64,
    pub thrust_warp: f64,
    pub thrust_capped: f64,
    pub reverse_thrust: f64,
    pub linear_decay: f64,
    /// Rotational velocity limit while in warp
    pub warp_rotation_limit: f64,
}

impl Default for MotionTuning {
    fn default() -> Self {
        Self {
            rotation_soft_cap: 12.0,
            rotation_accel: 0.5,
            rotation_accel_capped: 0.25,
            rotation_decay: 0.25,
            warp_threshold: 41.0,
            velocity_ceiling: 80.0,
            thrust: 0.3,
            thrust_warp: 1.2,
            thrust_capped: 0.15,
            reverse_thrust: 0.5,
            linear_decay: 0.15,
            warp_rotation_limit: 2.0,
        }
    }
}

/// Control intent held during one step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    pub rotate_left: bool,
    pub rotate_right: bool,
    pub thrust_forward: bool,
    pub thrust_backward: bool,
    pub fire: bool,
}

/// Motion integration for crafts
pub struct Kinematics;

impl Kinematics {
    /// Advance a craft by one step under the given controls.
    ///
    /// Only motion fields change; counters are left to the caller.
    pub fn step(craft: &mut Craft, controls: &Controls, tuning: &MotionTuning) {
        let mut rot = craft.rotational_velocity;
        let mut lin = craft.linear_velocity;

        if controls.rotate_right {
            rot += if rot < tuning.rotation_soft_cap {
                tuning.rotation_accel
            } else {
                tuning.rotation_accel_capped
            };
        }
        if controls.rotate_left {
            rot -= if rot > -tuning.rotation_soft_cap {
                tuning.rotation_accel
            } else {
                tuning.rotation_accel_capped
            };
        }

        if controls.thrust_forward {
            lin += if lin >= tuning.velocity_ceiling {
                tuning.thrust_capped
            } else if lin > tuning.warp_threshold {
                tuning.thrust_warp
            } else {
                tuning.thrust
            };
        }
        if controls.thrust_backward {
            lin -= tuning.reverse_thrust;
        }

        if lin > tuning.warp_threshold && rot.abs() > tuning.warp_rotation_limit {
            rot = tuning.warp_rotation_limit.copysign(rot);
        }

        // Drag
        lin = (lin - tuning.linear_decay).max(0.0);
        rot = if rot.abs() <= tuning.rotation_decay {
            0.0
        } else {
            rot - tuning.rotation_decay.copysign(rot)
        };

        craft.linear_velocity = lin;
        craft.rotational_velocity = rot;
        craft.orientation = normalize_bearing(craft.orientation + rot);

        let (dx, dy) = heading(craft.orientation);
        craft.x += dx * lin;
        craft.y += dy * lin;
    }
}

/// Wrap a bearing into `[0, 360)`
pub fn normalize_bearing(bearing: f64) -> f64 {
    let wrapped = bearing.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
