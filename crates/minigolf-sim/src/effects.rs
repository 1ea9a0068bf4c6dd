use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use minigolf_core::player::PlayerId;
use minigolf_core::powerup::{ActivePowerUp, PowerUpKind};

use crate::config::EffectConfig;
use crate::error::EffectError;
use crate::governor::GovernorMods;
use crate::shot::{ShotModifiers, ShotOutcome};
use crate::world::{ContactParams, Material, PhysicsWorld};

/// Power-up effects a player can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    SuperBoost,
    FeatherBall,
    SuperBounce,
    StickyBall,
    Mulligan,
    DoubleShot,
    FreeShot,
}

impl EffectKind {
    pub const ALL: [EffectKind; 7] = [
        Self::SuperBoost,
        Self::FeatherBall,
        Self::SuperBounce,
        Self::StickyBall,
        Self::Mulligan,
        Self::DoubleShot,
        Self::FreeShot,
    ];

    /// Wire identifier.
    pub fn id(&self) -> &'static str {
        match self {
            Self::SuperBoost => "super_boost",
            Self::FeatherBall => "feather_ball",
            Self::SuperBounce => "super_bounce",
            Self::StickyBall => "sticky_ball",
            Self::Mulligan => "mulligan",
            Self::DoubleShot => "double_shot",
            Self::FreeShot => "free_shot",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for EffectKind {
    type Err = EffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_boost" | "superBoost" => Ok(Self::SuperBoost),
            "feather_ball" | "featherBall" | "feather" => Ok(Self::FeatherBall),
            "super_bounce" | "superBounce" => Ok(Self::SuperBounce),
            "sticky_ball" | "stickyBall" | "sticky" => Ok(Self::StickyBall),
            "mulligan" => Ok(Self::Mulligan),
            "double_shot" | "doubleShot" => Ok(Self::DoubleShot),
            "free_shot" | "freeShot" => Ok(Self::FreeShot),
            other => Err(EffectError::UnknownEffect(other.to_string())),
        }
    }
}

impl PowerUpKind for EffectKind {
    fn duration(&self) -> f32 {
        match self {
            Self::SuperBoost => 8.0,
            Self::FeatherBall => 3.0,
            Self::SuperBounce => 8.0,
            Self::StickyBall => 8.0,
            Self::DoubleShot => 10.0,
            Self::Mulligan | Self::FreeShot => f32::INFINITY,
        }
    }

    /// Super boost and feather ball wait for the next shot.
    fn starts_on_activation(&self) -> bool {
        !matches!(self, Self::SuperBoost | Self::FeatherBall)
    }
}

pub type ActiveEffect = ActivePowerUp<EffectKind>;

/// Per-player effect sets and the world parameters they imply.
pub struct PowerupEffectEngine {
    config: EffectConfig,
    effects: BTreeMap<PlayerId, Vec<ActiveEffect>>,
    /// Players whose effects touch this world's constants.
    simulated: BTreeSet<PlayerId>,
    /// World parameters need recomputing at the next step boundary.
    dirty: bool,
}

impl PowerupEffectEngine {
    pub fn new(config: EffectConfig) -> Self {
        Self {
            config,
            effects: BTreeMap::new(),
            simulated: BTreeSet::new(),
            dirty: false,
        }
    }

    pub fn set_simulated(&mut self, player_id: PlayerId) {
        self.simulated.insert(player_id);
        self.dirty = true;
    }

    /// Give `player_id` an effect. Re-activating a kind replaces it.
    pub fn activate(&mut self, player_id: PlayerId, kind: EffectKind) {
        let set = self.effects.entry(player_id).or_default();
        set.retain(|e| e.kind != kind);
        set.push(ActivePowerUp::new(kind));
        self.dirty = true;
        tracing::debug!(player_id, effect = kind.id(), "Effect activated");
    }

    pub fn active(&self, player_id: PlayerId) -> &[ActiveEffect] {
        self.effects.get(&player_id).map_or(&[], Vec::as_slice)
    }

    fn find(&self, player_id: PlayerId, kind: EffectKind) -> Option<&ActiveEffect> {
        self.active(player_id).iter().find(|e| e.kind == kind)
    }

    pub fn is_active(&self, player_id: PlayerId, kind: EffectKind) -> bool {
        self.find(player_id, kind).is_some()
    }

    /// Whether `kind` is active and its lifetime has started.
    pub fn is_running(&self, player_id: PlayerId, kind: EffectKind) -> bool {
        self.find(player_id, kind).is_some_and(|e| e.running)
    }

    /// Age every effect by `dt` and drop the expired ones.
    /// Returns what expired, ordered by player then kind.
    pub fn tick(&mut self, dt: f32) -> Vec<(PlayerId, EffectKind)> {
        let mut expired = Vec::new();
        for (&player_id, set) in &mut self.effects {
            for effect in set.iter_mut() {
                effect.tick(dt);
            }
            let mut gone: Vec<EffectKind> = set
                .iter()
                .filter(|e| e.is_expired())
                .map(|e| e.kind)
                .collect();
            gone.sort();
            set.retain(|e| !e.is_expired());
            expired.extend(gone.into_iter().map(|k| (player_id, k)));
        }
        self.effects.retain(|_, set| !set.is_empty());
        if !expired.is_empty() {
            self.dirty = true;
            for (player_id, kind) in &expired {
                tracing::debug!(player_id, effect = kind.id(), "Effect expired");
            }
        }
        expired
    }

    pub fn shot_modifiers(&self, player_id: PlayerId) -> ShotModifiers {
        let armed_boost = self
            .find(player_id, EffectKind::SuperBoost)
            .is_some_and(|e| !e.running);
        ShotModifiers {
            double_shot: self.is_active(player_id, EffectKind::DoubleShot),
            mulligan: self.is_active(player_id, EffectKind::Mulligan),
            free_shot: self.is_active(player_id, EffectKind::FreeShot),
            impulse_multiplier: if armed_boost {
                self.config.super_boost_shot_multiplier
            } else {
                1.0
            },
        }
    }

    /// Consume one-shot effects and start armed timers after a shot.
    pub fn on_shot(&mut self, player_id: PlayerId, outcome: &ShotOutcome) {
        let Some(set) = self.effects.get_mut(&player_id) else {
            return;
        };
        match outcome {
            ShotOutcome::Mulligan { .. } => set.retain(|e| e.kind != EffectKind::Mulligan),
            ShotOutcome::Struck { counted, .. } => {
                if !counted {
                    set.retain(|e| e.kind != EffectKind::FreeShot);
                }
                for effect in set.iter_mut() {
                    if !effect.kind.starts_on_activation() {
                        effect.start();
                    }
                }
            },
        }
        self.effects.retain(|_, set| !set.is_empty());
        self.dirty = true;
    }

    pub fn governor_mods(&self, player_id: PlayerId) -> GovernorMods {
        GovernorMods {
            boost_after_effect: self.is_running(player_id, EffectKind::SuperBoost),
            super_bounce: self.is_active(player_id, EffectKind::SuperBounce),
        }
    }

    /// Force a recompute at the next `sync_world`.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        self.effects.clear();
        self.dirty = true;
    }

    /// Recompute contact restitutions and gravity from the active set of
    /// simulated players. Always starts from the world defaults.
    pub fn sync_world(&mut self, world: &mut PhysicsWorld, base_gravity: f32) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        world.restore_default_contacts();

        let simulated = |kind: EffectKind| {
            self.simulated
                .iter()
                .any(|&p| self.is_active(p, kind))
        };
        let mut factor = 1.0;
        if simulated(EffectKind::SuperBounce) {
            factor *= self.config.super_bounce_factor;
        }
        if simulated(EffectKind::StickyBall) {
            factor *= self.config.sticky_factor;
        }
        if factor != 1.0 {
            world.scale_ball_restitution(factor);
        }
        if simulated(EffectKind::SuperBoost) {
            let current = world.contact_params(Material::Ball, Material::Wall);
            world.set_contact_params(
                Material::Ball,
                Material::Wall,
                ContactParams::new(
                    current.friction,
                    self.config.super_boost_wall_restitution * factor,
                ),
            );
        }

        let feather = self
            .simulated
            .iter()
            .any(|&p| self.is_running(p, EffectKind::FeatherBall));
        let gravity = if feather {
            self.config.feather_gravity
        } else {
            base_gravity
        };
        if world.gravity().y != gravity {
            world.set_gravity_y(gravity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PhysicsConfig, SimConfig};
    use glam::Vec3;

    fn engine() -> PowerupEffectEngine {
        let mut engine = PowerupEffectEngine::new(SimConfig::default().effects);
        engine.set_simulated(1);
        engine
    }

    fn struck() -> ShotOutcome {
        ShotOutcome::Struck {
            impulse: Vec3::X,
            counted: true,
        }
    }

    fn restitution(world: &PhysicsWorld, b: Material) -> f32 {
        world.contact_params(Material::Ball, b).restitution
    }

    #[test]
    fn parses_wire_ids_and_aliases() {
        for kind in EffectKind::ALL {
            assert_eq!(kind.id().parse::<EffectKind>().unwrap(), kind);
        }
        assert_eq!("featherBall".parse::<EffectKind>().unwrap(), EffectKind::FeatherBall);
        assert_eq!("sticky".parse::<EffectKind>().unwrap(), EffectKind::StickyBall);
        assert!(matches!(
            "warp_drive".parse::<EffectKind>(),
            Err(EffectError::UnknownEffect(_))
        ));
    }

    #[test]
    fn super_boost_triples_one_shot_then_runs() {
        let mut engine = engine();
        engine.activate(1, EffectKind::SuperBoost);
        assert_eq!(engine.shot_modifiers(1).impulse_multiplier, 3.0);
        engine.tick(100.0);
        assert!(engine.is_active(1, EffectKind::SuperBoost), "armed boost must not age");

        engine.on_shot(1, &struck());
        assert_eq!(engine.shot_modifiers(1).impulse_multiplier, 1.0);
        assert!(engine.governor_mods(1).boost_after_effect);
        assert!(engine.tick(7.9).is_empty());
        assert_eq!(engine.tick(0.2), vec![(1, EffectKind::SuperBoost)]);
        assert!(!engine.governor_mods(1).boost_after_effect);
    }

    #[test]
    fn one_shot_effects_are_consumed() {
        let mut engine = engine();
        engine.activate(1, EffectKind::FreeShot);
        assert!(engine.shot_modifiers(1).free_shot);
        engine.on_shot(
            1,
            &ShotOutcome::Struck {
                impulse: Vec3::X,
                counted: false,
            },
        );
        assert!(!engine.shot_modifiers(1).free_shot);

        engine.activate(1, EffectKind::Mulligan);
        engine.on_shot(1, &ShotOutcome::Mulligan { position: Vec3::ZERO });
        assert!(!engine.is_active(1, EffectKind::Mulligan));
    }

    #[test]
    fn double_shot_times_out() {
        let mut engine = engine();
        engine.activate(1, EffectKind::DoubleShot);
        assert!(engine.shot_modifiers(1).double_shot);
        engine.tick(10.5);
        assert!(!engine.shot_modifiers(1).double_shot);
    }

    #[test]
    fn restitution_stacks_and_restores() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default());
        let ground = restitution(&world, Material::Ground);
        let mut engine = engine();

        engine.activate(1, EffectKind::SuperBounce);
        engine.sync_world(&mut world, -30.0);
        assert!((restitution(&world, Material::Ground) - ground * 2.5).abs() < 1e-6);

        engine.tick(2.0);
        engine.activate(1, EffectKind::StickyBall);
        engine.sync_world(&mut world, -30.0);
        assert!((restitution(&world, Material::Ground) - ground * 2.5 * 0.05).abs() < 1e-6);

        // Super bounce started first and expires first; sticky remains.
        let expired = engine.tick(6.0 + 1e-3);
        assert_eq!(expired, vec![(1, EffectKind::SuperBounce)]);
        engine.sync_world(&mut world, -30.0);
        assert!((restitution(&world, Material::Ground) - ground * 0.05).abs() < 1e-6);

        engine.tick(2.0);
        engine.sync_world(&mut world, -30.0);
        assert_eq!(restitution(&world, Material::Ground), ground);
        assert_eq!(
            world.contact_params(Material::Ball, Material::Wall),
            world.default_contact_params(Material::Ball, Material::Wall)
        );
    }

    #[test]
    fn super_boost_raises_wall_restitution_until_expiry() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default());
        let mut engine = engine();
        engine.activate(1, EffectKind::SuperBoost);
        engine.sync_world(&mut world, -30.0);
        assert_eq!(restitution(&world, Material::Wall), 3.0);
        engine.on_shot(1, &struck());
        engine.tick(8.5);
        engine.sync_world(&mut world, -30.0);
        assert_eq!(
            restitution(&world, Material::Wall),
            world.default_contact_params(Material::Ball, Material::Wall).restitution
        );
    }

    #[test]
    fn feather_lightens_gravity_after_shot() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default());
        let mut engine = engine();
        engine.activate(1, EffectKind::FeatherBall);
        engine.sync_world(&mut world, -30.0);
        assert_eq!(world.gravity().y, -30.0);
        engine.on_shot(1, &struck());
        engine.sync_world(&mut world, -30.0);
        assert_eq!(world.gravity().y, -8.0);
        engine.tick(3.1);
        engine.sync_world(&mut world, -30.0);
        assert_eq!(world.gravity().y, -30.0);
    }

    #[test]
    fn remote_effects_do_not_touch_world() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default());
        let ground = restitution(&world, Material::Ground);
        let mut engine = engine();
        engine.activate(2, EffectKind::SuperBounce);
        engine.sync_world(&mut world, -30.0);
        assert_eq!(restitution(&world, Material::Ground), ground);
        assert!(engine.is_active(2, EffectKind::SuperBounce));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn kind() -> impl Strategy<Value = EffectKind> {
            proptest::sample::select(EffectKind::ALL.to_vec())
        }

        proptest! {
            #[test]
            fn defaults_restored_when_all_expire(
                kinds in proptest::collection::vec(kind(), 1..8),
                shots in 0usize..3,
            ) {
                let mut world = PhysicsWorld::new(PhysicsConfig::default());
                let mut engine = engine();
                for k in &kinds {
                    engine.activate(1, *k);
                }
                for _ in 0..shots {
                    engine.on_shot(1, &struck());
                }
                engine.sync_world(&mut world, -30.0);
                // Drop one-shot effects and start armed timers, then outlive everything.
                engine.on_shot(1, &ShotOutcome::Struck { impulse: Vec3::X, counted: false });
                engine.on_shot(1, &ShotOutcome::Mulligan { position: Vec3::ZERO });
                engine.tick(20.0);
                engine.sync_world(&mut world, -30.0);
                for m in [Material::Ground, Material::Wall, Material::Ramp, Material::Ball] {
                    prop_assert_eq!(
                        world.contact_params(Material::Ball, m),
                        world.default_contact_params(Material::Ball, m)
                    );
                }
                prop_assert_eq!(world.gravity().y, -30.0);
            }
        }
    }
}
