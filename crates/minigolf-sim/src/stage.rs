use glam::Vec3;

use minigolf_core::player::PlayerId;

use crate::capture::{HoleCaptureMachine, HolePhase};
use crate::config::SimConfig;
use crate::error::LevelError;
use crate::events::SimEvent;
use crate::geometry::{GeometryBuilder, HoleGeometry};
use crate::governor::{BallGovernor, GovernorMods};
use crate::interaction::InteractionResolver;
use crate::level::Level;
use crate::roster::BallRoster;
use crate::shot::ShotController;
use crate::world::{Body, BodyId, PhysicsWorld};

/// What one fixed step produced.
#[derive(Debug, Default)]
pub struct StepReport {
    pub events: Vec<SimEvent>,
    /// Players whose ball settled in the cup for the first time this hole.
    pub scored: Vec<PlayerId>,
}

/// The physics world plus every per-step component that acts on it.
pub struct Stage {
    pub world: PhysicsWorld,
    pub geometry: Option<HoleGeometry>,
    pub resolver: InteractionResolver,
    pub governor: BallGovernor,
    pub capture: HoleCaptureMachine,
    pub shots: ShotController,
    pub roster: BallRoster,
    hole_index: usize,
}

impl Stage {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            world: PhysicsWorld::new(config.physics.clone()),
            geometry: None,
            resolver: InteractionResolver::new(config.elements.clone()),
            governor: BallGovernor::new(config.ball.clone()),
            capture: HoleCaptureMachine::new(config.capture.clone()),
            shots: ShotController::new(config.shot.clone()),
            roster: BallRoster::default(),
            hole_index: 0,
        }
    }

    pub fn hole_index(&self) -> usize {
        self.hole_index
    }

    /// Create a ball for a locally simulated player.
    pub fn add_ball(&mut self, player_id: PlayerId) -> BodyId {
        let ball = self.governor.config();
        let body = self.world.add_body(Body::ball(ball.radius, ball.mass));
        self.roster.insert(player_id, body);
        body
    }

    pub fn ball_of(&self, player_id: PlayerId) -> Option<BodyId> {
        self.roster.body_of(player_id)
    }

    pub fn phase_of(&self, player_id: PlayerId) -> HolePhase {
        self.ball_of(player_id)
            .map_or(HolePhase::Outside, |b| self.capture.phase(b))
    }

    /// Replace the loaded hole with hole `index` of `level`. The new hole is
    /// built before the old one is removed, so a failure leaves the world as
    /// it was.
    pub fn load_hole(&mut self, level: &Level, index: usize) -> Result<(), LevelError> {
        let geometry = GeometryBuilder::build(&mut self.world, level, index)?;
        if let Some(old) = self.geometry.replace(geometry) {
            old.teardown(&mut self.world);
        }
        self.hole_index = index;
        self.resolver.reset_cooldowns();
        self.resolver.skip_pending(&self.world);
        self.shots.clear();
        self.reset_balls();
        Ok(())
    }

    /// Put every ball back at the start, side by side, with collisions on.
    pub fn reset_balls(&mut self) {
        let Some(geometry) = self.geometry.as_ref() else {
            return;
        };
        let start = geometry.start;
        let config = self.governor.config().clone();
        let balls: Vec<BodyId> = self.roster.iter().map(|(_, b)| b).collect();
        let centre = (balls.len() as f32 - 1.0) / 2.0;
        for (i, ball) in balls.into_iter().enumerate() {
            let offset = (i as f32 - centre) * config.spawn_spacing;
            let position = Vec3::new(
                start.x + offset,
                start.y.max(config.spawn_height),
                start.z,
            );
            self.world.teleport(ball, position);
            self.capture.reset(&mut self.world, ball);
            self.governor.reset(ball, position);
        }
        self.world.wake_all();
    }

    /// Run one fixed step of the whole pipeline.
    pub fn step(
        &mut self,
        dt: f32,
        now: f64,
        mods: impl Fn(PlayerId) -> GovernorMods,
    ) -> StepReport {
        let mut report = StepReport::default();
        let Some(geometry) = self.geometry.as_ref() else {
            return report;
        };

        self.resolver
            .apply_fan_forces(&mut self.world, geometry, &self.roster);
        self.governor.pre_step(&self.world, &self.roster);
        self.world.step(dt);

        let shots = &self.shots;
        let contact_events = self.resolver.dispatch(
            &mut self.world,
            geometry,
            &self.roster,
            |p| shots.last_shot(p),
            now,
        );
        for event in &contact_events {
            if let SimEvent::LavaReset {
                player_id,
                position,
            } = event
                && let Some(ball) = self.roster.body_of(*player_id)
            {
                self.governor.mark_teleported(ball, *position);
            }
        }
        report.events.extend(contact_events);

        let balls: Vec<(PlayerId, BodyId)> = self.roster.iter().collect();
        for (player_id, ball) in balls {
            let phase = self.capture.phase(ball);
            if let Some(event) = self.governor.post_step(
                &mut self.world,
                geometry,
                ball,
                player_id,
                phase,
                mods(player_id),
                self.shots.last_shot(player_id),
            ) {
                report.events.push(event);
            }
            if self
                .capture
                .update(&mut self.world, geometry, ball, player_id, self.hole_index)
            {
                report.scored.push(player_id);
            }
        }
        report
    }
}
