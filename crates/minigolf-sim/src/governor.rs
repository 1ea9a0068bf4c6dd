use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_4;

use glam::{Quat, Vec3};

use minigolf_core::player::PlayerId;

use crate::capture::HolePhase;
use crate::config::BallConfig;
use crate::events::{RecoveryKind, SimEvent};
use crate::geometry::HoleGeometry;
use crate::math::{distance_xz, reflect};
use crate::roster::BallRoster;
use crate::world::{ALL_GROUPS, BodyId, Material, PhysicsWorld, RayFilter};

/// Height recovery rays are cast down from.
const RECOVERY_RAY_TOP: f32 = 20.0;
const RECOVERY_RAY_BOTTOM: f32 = -5.0;
/// Gap left between a recovered ball and the surface below it.
const RECOVERY_CLEARANCE: f32 = 0.05;
const SPIRAL_DIRECTIONS: u32 = 8;

/// Effect-driven adjustments for one ball.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GovernorMods {
    /// Super-boost after-effect: lower cap and extra damping.
    pub boost_after_effect: bool,
    pub super_bounce: bool,
}

/// Pose handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallPose {
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Debug, Clone, Copy)]
struct GovernorState {
    /// Position before the last world step.
    previous_position: Vec3,
    /// Speed before the last world step.
    pre_step_speed: f32,
    last_safe: Option<Vec3>,
    pose: BallPose,
}

impl GovernorState {
    fn at(position: Vec3) -> Self {
        Self {
            previous_position: position,
            pre_step_speed: 0.0,
            last_safe: None,
            pose: BallPose {
                position,
                rotation: Quat::IDENTITY,
            },
        }
    }
}

/// Post-step limits and recovery for local balls.
pub struct BallGovernor {
    config: BallConfig,
    states: BTreeMap<BodyId, GovernorState>,
}

impl BallGovernor {
    pub fn new(config: BallConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &BallConfig {
        &self.config
    }

    /// Start tracking `ball` from `position`, dropping any history.
    pub fn reset(&mut self, ball: BodyId, position: Vec3) {
        self.states.insert(ball, GovernorState::at(position));
    }

    /// The ball was moved outside the integrator; do not sweep across the jump.
    pub fn mark_teleported(&mut self, ball: BodyId, position: Vec3) {
        let state = self
            .states
            .entry(ball)
            .or_insert_with(|| GovernorState::at(position));
        state.previous_position = position;
        state.pre_step_speed = 0.0;
    }

    pub fn last_safe(&self, ball: BodyId) -> Option<Vec3> {
        self.states.get(&ball).and_then(|s| s.last_safe)
    }

    pub fn pose(&self, ball: BodyId) -> Option<BallPose> {
        self.states.get(&ball).map(|s| s.pose)
    }

    /// Snapshot every ball before the integrator runs.
    pub fn pre_step(&mut self, world: &PhysicsWorld, roster: &BallRoster) {
        for (_, ball) in roster.iter() {
            let Some(body) = world.body(ball) else {
                continue;
            };
            let state = self
                .states
                .entry(ball)
                .or_insert_with(|| GovernorState::at(body.position));
            state.previous_position = body.position;
            state.pre_step_speed = body.linear_velocity.length();
        }
    }

    pub fn speed_cap(&self, mods: GovernorMods) -> f32 {
        if mods.boost_after_effect {
            self.config.boosted_speed_cap
        } else {
            self.config.speed_cap
        }
    }

    /// Enforce limits on one ball after the world step.
    #[allow(clippy::too_many_arguments)]
    pub fn post_step(
        &mut self,
        world: &mut PhysicsWorld,
        geometry: &HoleGeometry,
        ball: BodyId,
        player_id: PlayerId,
        phase: HolePhase,
        mods: GovernorMods,
        last_shot: Option<Vec3>,
    ) -> Option<SimEvent> {
        let body = world.body(ball)?;
        let mut position = body.position;
        let original_velocity = body.linear_velocity;
        let mut velocity = original_velocity;
        let state = *self
            .states
            .entry(ball)
            .or_insert_with(|| GovernorState::at(position));

        // 1. Speed cap
        let cap = self.speed_cap(mods);
        let speed = velocity.length();
        if speed > cap {
            velocity *= cap / speed;
        }

        // 2. Tunneling sweep along the path the centre travelled this step.
        let mut swept = false;
        if state.pre_step_speed > self.config.sweep_speed && phase == HolePhase::Outside {
            let filter = RayFilter::new(ALL_GROUPS).excluding(ball).fixed_only();
            if let Some(hit) = world.raycast_first(state.previous_position, position, &filter) {
                position = hit.point + hit.normal * self.config.sweep_offset;
                if velocity.dot(hit.normal) < 0.0 {
                    velocity = reflect(velocity, hit.normal);
                }
                world.teleport(ball, position);
                swept = true;
                tracing::debug!(player_id, ?position, "Tunneling sweep corrected ball");
            }
        }

        // 3. Damping. Plain overspeed is already handled by the cap.
        let speed = velocity.length();
        if mods.boost_after_effect && speed > self.config.boost_damping_min_speed {
            velocity *= self.config.boost_damping;
        } else if mods.super_bounce {
            velocity *= self.config.bounce_damping;
        }
        // Writing wakes the body, so a resting ball is left alone.
        if swept || velocity != original_velocity {
            world.set_linear_velocity(ball, velocity);
        }

        let mut event = None;

        // 4. Off-map recovery
        let off_map = !geometry.contains_xz(position) || position.y < self.config.off_map_floor;
        if off_map && phase != HolePhase::Settled {
            let target = self.recovery_target(world, geometry, ball, last_shot);
            world.teleport(ball, target);
            position = target;
            tracing::debug!(player_id, ?target, "Recovered ball from off the map");
            event = Some(SimEvent::BallRecovered {
                player_id,
                position: target,
                kind: RecoveryKind::OffMap,
            });
        }

        // 5. Safety floor
        let in_cup_disc = distance_xz(position, geometry.cup) < geometry.cup_radius;
        if position.y < self.config.safety_floor && !in_cup_disc {
            position = Vec3::new(position.x, self.config.safety_respawn_height, position.z);
            world.teleport(ball, position);
            tracing::debug!(player_id, ?position, "Lifted ball above safety floor");
            event = Some(SimEvent::BallRecovered {
                player_id,
                position,
                kind: RecoveryKind::SafetyFloor,
            });
        }

        // 6. Last safe position
        let rotation = world.body(ball).map_or(Quat::IDENTITY, |b| b.rotation);
        let state = self
            .states
            .entry(ball)
            .or_insert_with(|| GovernorState::at(position));
        if event.is_some() {
            state.previous_position = position;
            state.pre_step_speed = 0.0;
        }
        if phase == HolePhase::Outside
            && geometry.contains_xz(position)
            && position.y >= self.config.safety_floor
        {
            state.last_safe = Some(position);
        }

        // 7. Render pose
        state.pose = BallPose { position, rotation };
        event
    }

    /// Pick a spot for an off-map ball: near the last shot, then the last
    /// safe position, then the hole start.
    fn recovery_target(
        &self,
        world: &PhysicsWorld,
        geometry: &HoleGeometry,
        ball: BodyId,
        last_shot: Option<Vec3>,
    ) -> Vec3 {
        if let Some(origin) = last_shot {
            if let Some(spot) = self.grounded_spot(world, geometry, ball, origin) {
                return spot;
            }
            for ring in 1..=self.config.recovery_rings {
                for k in 0..SPIRAL_DIRECTIONS {
                    let angle = k as f32 * FRAC_PI_4;
                    let candidate =
                        origin + Vec3::new(angle.cos(), 0.0, angle.sin()) * ring as f32;
                    if let Some(spot) = self.grounded_spot(world, geometry, ball, candidate) {
                        return spot;
                    }
                }
            }
        }
        if let Some(safe) = self.last_safe(ball) {
            return safe;
        }
        let r = self.config.radius;
        Vec3::new(geometry.start.x, geometry.start.y.max(0.0) + r, geometry.start.z)
    }

    /// Resting point above playable ground below `xz`, if a ball fits there.
    fn grounded_spot(
        &self,
        world: &PhysicsWorld,
        geometry: &HoleGeometry,
        ball: BodyId,
        xz: Vec3,
    ) -> Option<Vec3> {
        if !geometry.contains_xz(xz) {
            return None;
        }
        let filter = RayFilter::new(ALL_GROUPS).excluding(ball).fixed_only();
        let hit = world.raycast_first(
            Vec3::new(xz.x, RECOVERY_RAY_TOP, xz.z),
            Vec3::new(xz.x, RECOVERY_RAY_BOTTOM, xz.z),
            &filter,
        )?;
        let material = world.body(hit.body)?.material;
        if !matches!(material, Material::Ground | Material::Ramp) {
            return None;
        }
        let r = self.config.radius;
        let spot = hit.point + Vec3::Y * (r + RECOVERY_CLEARANCE);
        if world.sphere_overlaps_solid(spot, r, Some(ball)) {
            return None;
        }
        Some(spot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PhysicsConfig, SimConfig};
    use crate::geometry::GeometryBuilder;
    use crate::level::{CupDef, Extents, HoleDef, Level, Point3, Settings, WallDef};
    use crate::world::Body;

    const DT: f32 = 1.0 / 60.0;

    struct Rig {
        world: PhysicsWorld,
        geometry: HoleGeometry,
        governor: BallGovernor,
        roster: BallRoster,
        ball: BodyId,
    }

    impl Rig {
        fn new(hole: HoleDef) -> Self {
            let mut world = PhysicsWorld::new(PhysicsConfig::default());
            let ball = world.add_body(Body::ball(0.5, 1.0).with_position(Vec3::new(0.0, 0.5, 0.0)));
            let level = Level::single(hole, Settings::default());
            let geometry = GeometryBuilder::build(&mut world, &level, 0).unwrap();
            let mut roster = BallRoster::default();
            roster.insert(1, ball);
            Self {
                world,
                geometry,
                governor: BallGovernor::new(SimConfig::default().ball),
                roster,
                ball,
            }
        }

        fn place(&mut self, position: Vec3, velocity: Vec3) {
            self.world.teleport(self.ball, position);
            self.world.set_linear_velocity(self.ball, velocity);
            self.governor.reset(self.ball, position);
        }

        fn step(&mut self, mods: GovernorMods, last_shot: Option<Vec3>) -> Option<SimEvent> {
            self.governor.pre_step(&self.world, &self.roster);
            self.world.step(DT);
            self.governor.post_step(
                &mut self.world,
                &self.geometry,
                self.ball,
                1,
                HolePhase::Outside,
                mods,
                last_shot,
            )
        }

        fn body(&self) -> &crate::world::Body {
            self.world.body(self.ball).unwrap()
        }
    }

    fn open_hole() -> HoleDef {
        HoleDef::new(Vec3::new(0.0, 0.0, 20.0), CupDef::new(30.0, -30.0))
    }

    fn walled_hole() -> HoleDef {
        let mut hole = open_hole();
        hole.walls.push(WallDef {
            position: Point3::new(5.5, 2.0, 0.0),
            size: Extents::new(1.0, 4.0, 20.0),
            rotation_y: 0.0,
            boundary: false,
        });
        hole
    }

    #[test]
    fn speed_is_capped() {
        let mut rig = Rig::new(open_hole());
        rig.place(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.0, 0.0, -150.0));
        rig.step(GovernorMods::default(), None);
        assert!(rig.body().linear_velocity.length() <= 100.0 + 1e-3);
    }

    #[test]
    fn after_effect_lowers_cap() {
        let mut rig = Rig::new(open_hole());
        rig.place(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.0, 0.0, -150.0));
        let mods = GovernorMods {
            boost_after_effect: true,
            super_bounce: false,
        };
        rig.step(mods, None);
        assert!(rig.body().linear_velocity.length() <= 90.0);
    }

    #[test]
    fn ball_at_cap_is_not_damped() {
        let mut rig = Rig::new(open_hole());
        rig.place(Vec3::new(0.0, 10.0, 0.0), Vec3::new(100.0, 0.0, 0.0));
        rig.step(GovernorMods::default(), None);
        let speed = rig.body().linear_velocity.length();
        assert!((speed - 100.0).abs() < 1e-3, "speed={speed}");
    }

    #[test]
    fn resting_ball_is_left_asleep() {
        let mut rig = Rig::new(open_hole());
        rig.place(Vec3::new(0.0, 0.5, 0.0), Vec3::ZERO);
        for _ in 0..120 {
            rig.step(GovernorMods::default(), None);
        }
        assert!(rig.body().sleeping);
        let before = rig.body().position;
        rig.step(GovernorMods::default(), None);
        assert!(rig.body().sleeping);
        assert_eq!(rig.body().position, before);
    }

    #[test]
    fn fast_ball_cannot_tunnel_through_wall() {
        let mut rig = Rig::new(walled_hole());
        rig.place(Vec3::new(3.0, 0.5, 0.0), Vec3::new(200.0, 0.0, 0.0));
        rig.step(GovernorMods::default(), None);
        let body = rig.body();
        assert!((body.position.x - 4.4).abs() < 0.05, "x={}", body.position.x);
        assert!(body.linear_velocity.x < -50.0);
    }

    #[test]
    fn slow_ball_is_not_swept() {
        let mut rig = Rig::new(walled_hole());
        rig.place(Vec3::new(3.0, 0.5, 0.0), Vec3::new(10.0, 0.0, 0.0));
        rig.step(GovernorMods::default(), None);
        assert!(rig.body().position.x > 3.0);
        assert!(rig.body().linear_velocity.x > 0.0);
    }

    #[test]
    fn off_map_returns_to_last_shot() {
        let mut rig = Rig::new(open_hole());
        rig.place(Vec3::new(60.0, 0.5, 0.0), Vec3::ZERO);
        let event = rig.step(GovernorMods::default(), Some(Vec3::new(4.0, 0.5, 4.0)));
        let Some(SimEvent::BallRecovered { position, kind, .. }) = event else {
            panic!("expected recovery, got {event:?}");
        };
        assert_eq!(kind, RecoveryKind::OffMap);
        assert!((position.x - 4.0).abs() < 1e-4 && (position.z - 4.0).abs() < 1e-4);
        assert!((position.y - 0.55).abs() < 1e-3);
        assert_eq!(rig.body().linear_velocity, Vec3::ZERO);
    }

    #[test]
    fn recovery_spirals_away_from_blocked_last_shot() {
        let mut hole = open_hole();
        hole.walls.push(WallDef {
            position: Point3::new(4.0, 1.0, 4.0),
            size: Extents::new(1.0, 2.0, 1.0),
            rotation_y: 0.0,
            boundary: false,
        });
        let mut rig = Rig::new(hole);
        rig.place(Vec3::new(60.0, 0.5, 0.0), Vec3::ZERO);
        let event = rig.step(GovernorMods::default(), Some(Vec3::new(4.0, 0.5, 4.0)));
        let Some(SimEvent::BallRecovered { position, .. }) = event else {
            panic!("expected recovery, got {event:?}");
        };
        assert!(distance_xz(position, Vec3::new(4.0, 0.0, 4.0)) >= 1.0 - 1e-4);
        assert!(!rig.world.sphere_overlaps_solid(position, 0.5, Some(rig.ball)));
    }

    #[test]
    fn off_map_without_history_uses_start() {
        let mut rig = Rig::new(open_hole());
        rig.place(Vec3::new(0.0, 0.5, 70.0), Vec3::ZERO);
        rig.step(GovernorMods::default(), None);
        let p = rig.body().position;
        assert!((p.x - 0.0).abs() < 1e-4 && (p.z - 20.0).abs() < 1e-4, "p={p:?}");
    }

    #[test]
    fn last_safe_used_when_no_shot_recorded() {
        let mut rig = Rig::new(open_hole());
        rig.place(Vec3::new(7.0, 0.5, 7.0), Vec3::ZERO);
        rig.step(GovernorMods::default(), None);
        let safe = rig.governor.last_safe(rig.ball).unwrap();
        rig.world.teleport(rig.ball, Vec3::new(0.0, 0.5, 70.0));
        rig.step(GovernorMods::default(), None);
        assert!((rig.body().position - safe).length() < 0.1);
    }

    #[test]
    fn safety_floor_lifts_sunken_ball() {
        let mut rig = Rig::new(open_hole());
        rig.place(Vec3::new(2.0, -1.0, 2.0), Vec3::new(0.0, -1.0, 0.0));
        rig.world.set_filter(rig.ball, 1, 0);
        let event = rig.step(GovernorMods::default(), None);
        assert!(matches!(
            event,
            Some(SimEvent::BallRecovered {
                kind: RecoveryKind::SafetyFloor,
                ..
            })
        ));
        assert_eq!(rig.body().position.y, 1.0);
    }

    #[test]
    fn pose_follows_body() {
        let mut rig = Rig::new(open_hole());
        rig.place(Vec3::new(0.0, 0.5, 0.0), Vec3::new(3.0, 0.0, 0.0));
        rig.step(GovernorMods::default(), None);
        let pose = rig.governor.pose(rig.ball).unwrap();
        assert_eq!(pose.position, rig.body().position);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn capped_ball_stays_capped(
                vx in -400.0f32..400.0,
                vz in -400.0f32..400.0,
                steps in 1usize..10,
            ) {
                let mut rig = Rig::new(open_hole());
                rig.place(Vec3::new(0.0, 0.5, 0.0), Vec3::new(vx, 0.0, vz));
                for _ in 0..steps {
                    rig.step(GovernorMods::default(), None);
                    prop_assert!(rig.body().linear_velocity.length() <= 100.0 + 1e-2);
                }
            }

            #[test]
            fn swept_ball_never_overlaps_wall(
                x in 0.0f32..4.4,
                vx in 20.0f32..400.0,
            ) {
                let mut rig = Rig::new(walled_hole());
                rig.place(Vec3::new(x, 0.5, 0.0), Vec3::new(vx, 0.0, 0.0));
                rig.step(GovernorMods::default(), None);
                let p = rig.body().position;
                prop_assert!(p.x <= 4.5 + 2e-3, "x={}", p.x);
            }
        }
    }
}
