use std::collections::BTreeMap;

use glam::Vec3;

use minigolf_core::player::PlayerId;

use crate::config::ElementConfig;
use crate::events::SimEvent;
use crate::geometry::{ElementTag, FanField, HoleGeometry};
use crate::roster::BallRoster;
use crate::world::{BodyId, ContactEvent, PhysicsWorld};

/// Element kinds that rate-limit their effect on a ball.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CooldownKind {
    BouncePad,
    Bumper,
    SpeedBoost,
    Wall,
}

/// Applies element responses to balls from the world's begin-contact log.
pub struct InteractionResolver {
    config: ElementConfig,
    /// Last trigger time per (ball, element kind), in simulated seconds.
    cooldowns: BTreeMap<(BodyId, CooldownKind), f64>,
    /// First world step whose contacts have not been dispatched yet.
    cursor: u64,
}

impl InteractionResolver {
    pub fn new(config: ElementConfig) -> Self {
        Self {
            config,
            cooldowns: BTreeMap::new(),
            cursor: 0,
        }
    }

    pub fn reset_cooldowns(&mut self) {
        self.cooldowns.clear();
    }

    /// Forget contacts recorded before the world's next step.
    pub fn skip_pending(&mut self, world: &PhysicsWorld) {
        self.cursor = world.current_step() + 1;
    }

    pub fn last_trigger(&self, ball: BodyId, kind: CooldownKind) -> Option<f64> {
        self.cooldowns.get(&(ball, kind)).copied()
    }

    /// Record a trigger at `now` unless one happened within `interval`.
    fn try_trigger(&mut self, ball: BodyId, kind: CooldownKind, now: f64, interval: f64) -> bool {
        match self.cooldowns.get(&(ball, kind)) {
            Some(&last) if now - last <= interval => false,
            _ => {
                self.cooldowns.insert((ball, kind), now);
                true
            },
        }
    }

    /// Handle every new contact since the last dispatch.
    pub fn dispatch(
        &mut self,
        world: &mut PhysicsWorld,
        geometry: &HoleGeometry,
        roster: &BallRoster,
        last_shot: impl Fn(PlayerId) -> Option<Vec3>,
        now: f64,
    ) -> Vec<SimEvent> {
        let contacts: Vec<ContactEvent> = world.contacts_since(self.cursor).cloned().collect();
        self.cursor = world.current_step() + 1;

        let mut events = Vec::new();
        for contact in contacts {
            // Ball-ball and ball-unknown contacts carry no element response.
            let Some(player_id) = roster.player_of(contact.a) else {
                continue;
            };
            let Some(tag) = geometry.tag(contact.b) else {
                continue;
            };
            if let Some(event) = self.resolve(world, &contact, player_id, tag, &last_shot, now) {
                events.push(event);
            }
        }
        events
    }

    fn resolve(
        &mut self,
        world: &mut PhysicsWorld,
        contact: &ContactEvent,
        player_id: PlayerId,
        tag: ElementTag,
        last_shot: &impl Fn(PlayerId) -> Option<Vec3>,
        now: f64,
    ) -> Option<SimEvent> {
        let ball = contact.a;
        let cooldown = self.config.trigger_cooldown;
        let velocity = world.body(ball)?.linear_velocity;
        match tag {
            ElementTag::BouncePad { strength } => {
                if !self.try_trigger(ball, CooldownKind::BouncePad, now, cooldown) {
                    return None;
                }
                world.set_linear_velocity(ball, Vec3::new(velocity.x, strength, velocity.z));
                Some(SimEvent::Bounce { player_id })
            },
            ElementTag::Bumper { strength } => {
                if !self.try_trigger(ball, CooldownKind::Bumper, now, cooldown) {
                    return None;
                }
                let center = world.body(contact.b)?.position;
                let position = world.body(ball)?.position;
                let radial = Vec3::new(position.x - center.x, 0.0, position.z - center.z)
                    .try_normalize()
                    .unwrap_or(Vec3::X);
                let speed = strength * self.config.bumper_speed_factor;
                let mut exit = radial * speed;
                exit.y = speed * self.config.bumper_lift;
                world.set_linear_velocity(ball, exit);
                Some(SimEvent::BumperHit { player_id })
            },
            ElementTag::SpeedBoost {
                direction,
                strength,
            } => {
                if !self.try_trigger(ball, CooldownKind::SpeedBoost, now, cooldown) {
                    return None;
                }
                let mut boosted = direction * strength;
                boosted.y = velocity.y.max(self.config.speed_boost_min_vy);
                world.set_linear_velocity(ball, boosted);
                Some(SimEvent::SpeedBoost { player_id })
            },
            ElementTag::Lava => {
                let position = last_shot(player_id)?;
                world.teleport(ball, position);
                Some(SimEvent::LavaReset {
                    player_id,
                    position,
                })
            },
            tag if tag.is_wall() => {
                if contact.speed <= self.config.wall_hit_min_speed {
                    return None;
                }
                if !self.try_trigger(ball, CooldownKind::Wall, now, self.config.wall_hit_cooldown) {
                    return None;
                }
                Some(SimEvent::WallHit {
                    player_id,
                    speed: contact.speed,
                })
            },
            _ => None,
        }
    }

    /// Push every collidable ball inside a fan corridor.
    pub fn apply_fan_forces(
        &self,
        world: &mut PhysicsWorld,
        geometry: &HoleGeometry,
        roster: &BallRoster,
    ) {
        if geometry.fans().is_empty() {
            return;
        }
        for (_, ball) in roster.iter() {
            let Some(body) = world.body(ball) else {
                continue;
            };
            // Balls dropping into the cup ignore everything, fans included.
            if body.mask == 0 {
                continue;
            }
            let position = body.position;
            let total: Vec3 = geometry
                .fans()
                .iter()
                .filter_map(|fan| {
                    fan_force(fan, position, self.config.fan_range, self.config.fan_radius)
                })
                .sum();
            if total != Vec3::ZERO {
                world.apply_force(ball, total);
            }
        }
    }
}

/// Force a fan exerts on a ball at `position`: full strength at the fan,
/// falling off linearly along the corridor and away from its axis.
pub fn fan_force(fan: &FanField, position: Vec3, range: f32, radius: f32) -> Option<Vec3> {
    let offset = position - fan.position;
    let along = offset.dot(fan.direction);
    if !(0.0..=range).contains(&along) {
        return None;
    }
    let perp = (offset - fan.direction * along).length();
    if perp > radius {
        return None;
    }
    let magnitude = fan.strength * (1.0 - along / range) * (1.0 - perp / radius);
    Some(fan.direction * magnitude)
}
