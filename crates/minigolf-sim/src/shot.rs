use std::collections::BTreeMap;

use glam::{Vec2, Vec3};

use minigolf_core::player::PlayerId;

use crate::capture::HolePhase;
use crate::config::ShotConfig;
use crate::error::ShotError;
use crate::math::horizontal_speed;
use crate::world::{BodyId, PhysicsWorld};

/// Effect state that changes how a shot is taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotModifiers {
    pub double_shot: bool,
    pub mulligan: bool,
    pub free_shot: bool,
    pub impulse_multiplier: f32,
}

impl Default for ShotModifiers {
    fn default() -> Self {
        Self {
            double_shot: false,
            mulligan: false,
            free_shot: false,
            impulse_multiplier: 1.0,
        }
    }
}

/// What an accepted shot did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShotOutcome {
    Struck {
        impulse: Vec3,
        /// False when a free shot absorbed the stroke.
        counted: bool,
    },
    /// The previous shot was undone instead.
    Mulligan { position: Vec3 },
}

impl ShotOutcome {
    pub fn counts_stroke(&self) -> bool {
        matches!(self, Self::Struck { counted: true, .. })
    }
}

/// Validates and applies strokes to local balls.
pub struct ShotController {
    config: ShotConfig,
    enabled: bool,
    last_shot: BTreeMap<PlayerId, Vec3>,
}

impl ShotController {
    pub fn new(config: ShotConfig) -> Self {
        Self {
            config,
            enabled: false,
            last_shot: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Where the player's most recent accepted shot was launched from.
    pub fn last_shot(&self, player_id: PlayerId) -> Option<Vec3> {
        self.last_shot.get(&player_id).copied()
    }

    pub fn set_last_shot(&mut self, player_id: PlayerId, position: Vec3) {
        self.last_shot.insert(player_id, position);
    }

    /// Forget every recorded launch point (new hole).
    pub fn clear(&mut self) {
        self.last_shot.clear();
    }

    /// Impulse for a unit-mass ball at `power` along the unit `direction`.
    pub fn impulse(&self, direction: Vec3, power: f32, multiplier: f32) -> Vec3 {
        direction
            * power.powf(self.config.power_exponent)
            * self.config.base_impulse
            * self.config.impulse_coefficient
            * multiplier
    }

    /// Strike `ball`. Nothing changes when an error is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn attempt(
        &mut self,
        world: &mut PhysicsWorld,
        ball: BodyId,
        player_id: PlayerId,
        phase: HolePhase,
        direction: Vec2,
        power: f32,
        mods: &ShotModifiers,
    ) -> Result<ShotOutcome, ShotError> {
        if !self.enabled {
            return Err(ShotError::Disabled);
        }
        if !power.is_finite() || !(0.0..=1.0).contains(&power) {
            return Err(ShotError::InvalidPower(power));
        }
        let aim = Vec3::new(direction.x, 0.0, direction.y)
            .try_normalize()
            .ok_or(ShotError::InvalidDirection)?;
        if phase != HolePhase::Outside {
            return Err(ShotError::BallSettled);
        }
        let body = world
            .body(ball)
            .ok_or(ShotError::UnknownPlayer(player_id))?;
        let position = body.position;
        let speed = horizontal_speed(body.linear_velocity);
        if speed > self.config.rest_speed && !mods.double_shot {
            return Err(ShotError::BallMoving { speed });
        }

        if mods.mulligan
            && let Some(previous) = self.last_shot(player_id)
        {
            world.teleport(ball, previous);
            tracing::debug!(player_id, ?previous, "Mulligan returned ball");
            return Ok(ShotOutcome::Mulligan { position: previous });
        }

        self.last_shot.insert(player_id, position);
        let impulse = self.impulse(aim, power, mods.impulse_multiplier);
        world.apply_impulse(ball, impulse);
        let counted = !mods.free_shot;
        tracing::debug!(player_id, power, counted, "Shot accepted");
        Ok(ShotOutcome::Struck { impulse, counted })
    }
}
