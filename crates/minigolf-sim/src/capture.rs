use std::collections::{BTreeMap, BTreeSet};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use minigolf_core::player::PlayerId;

use crate::config::CaptureConfig;
use crate::geometry::HoleGeometry;
use crate::math::{distance_xz, horizontal};
use crate::world::{ALL_GROUPS, BodyId, DEFAULT_GROUP, PhysicsWorld};

/// Collision group for balls inside the cup. Their mask is empty.
pub const CUP_GROUP: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HolePhase {
    #[default]
    Outside,
    /// Past the rim and dropping, collisions off.
    Entering,
    /// Pinned at the bottom of the cup until the next hole.
    Settled,
}

/// Ball-in-hole state machine for every local ball.
pub struct HoleCaptureMachine {
    config: CaptureConfig,
    phases: BTreeMap<BodyId, HolePhase>,
    /// (player, hole index) pairs already reported.
    scored: BTreeSet<(PlayerId, usize)>,
}

impl HoleCaptureMachine {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            phases: BTreeMap::new(),
            scored: BTreeSet::new(),
        }
    }

    pub fn phase(&self, ball: BodyId) -> HolePhase {
        self.phases.get(&ball).copied().unwrap_or_default()
    }

    /// Put a ball back in play with normal collisions.
    pub fn reset(&mut self, world: &mut PhysicsWorld, ball: BodyId) {
        self.phases.insert(ball, HolePhase::Outside);
        world.set_filter(ball, DEFAULT_GROUP, ALL_GROUPS);
    }

    /// Where a captured ball is held.
    pub fn pin_position(&self, geometry: &HoleGeometry) -> Vec3 {
        Vec3::new(geometry.cup.x, self.config.settle_depth, geometry.cup.z)
    }

    /// Advance the machine for one ball after the world step. Returns true
    /// the first time this player settles on `hole_index`.
    pub fn update(
        &mut self,
        world: &mut PhysicsWorld,
        geometry: &HoleGeometry,
        ball: BodyId,
        player_id: PlayerId,
        hole_index: usize,
    ) -> bool {
        let Some(body) = world.body(ball) else {
            return false;
        };
        let position = body.position;
        let velocity = body.linear_velocity;
        let distance = distance_xz(position, geometry.cup);
        let radius = geometry.cup_radius;

        match self.phase(ball) {
            HolePhase::Outside => {
                if distance < radius && position.y > 0.0 && position.y < self.config.entry_max_height
                {
                    self.phases.insert(ball, HolePhase::Entering);
                    world.set_filter(ball, CUP_GROUP, 0);
                    if velocity.y > self.config.entry_kick_speed / 2.0 {
                        world.set_linear_velocity(
                            ball,
                            Vec3::new(velocity.x, self.config.entry_kick_speed, velocity.z),
                        );
                    }
                    tracing::debug!(player_id, distance, "Ball entering cup");
                    self.funnel(world, geometry, ball);
                }
                false
            },
            HolePhase::Entering => {
                if position.y <= 0.0 {
                    self.phases.insert(ball, HolePhase::Settled);
                    world.teleport(ball, self.pin_position(geometry));
                    let first = self.scored.insert((player_id, hole_index));
                    tracing::debug!(player_id, hole_index, first, "Ball settled in cup");
                    first
                } else if distance >= radius {
                    self.reset(world, ball);
                    tracing::debug!(player_id, distance, "Ball escaped cup rim");
                    false
                } else {
                    self.funnel(world, geometry, ball);
                    false
                }
            },
            HolePhase::Settled => {
                let pin = self.pin_position(geometry);
                world.teleport(ball, pin);
                false
            },
        }
    }

    /// Damp horizontal motion and draw the ball toward the cup centre.
    fn funnel(&self, world: &mut PhysicsWorld, geometry: &HoleGeometry, ball: BodyId) {
        let Some(body) = world.body(ball) else {
            return;
        };
        let v = body.linear_velocity;
        let toward = horizontal(geometry.cup - body.position);
        let pulled = horizontal(v) * self.config.funnel_damping + toward * self.config.funnel_pull;
        world.set_linear_velocity(ball, Vec3::new(pulled.x, v.y, pulled.z));
    }

    pub fn has_scored(&self, player_id: PlayerId, hole_index: usize) -> bool {
        self.scored.contains(&(player_id, hole_index))
    }
}
