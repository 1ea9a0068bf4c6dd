pub mod capture;
pub mod config;
pub mod coordinator;
pub mod effects;
pub mod error;
pub mod events;
pub mod geometry;
pub mod governor;
pub mod interaction;
pub mod level;
pub mod math;
pub mod replica;
pub mod roster;
pub mod scoring;
pub mod shot;
pub mod stage;
pub mod world;

use glam::{Quat, Vec2, Vec3};

use minigolf_core::net::messages::MatchMessage;
use minigolf_core::player::{MAX_PLAYERS, MIN_PLAYERS, Player, PlayerId};

use capture::HolePhase;
use config::SimConfig;
use coordinator::LevelCoordinator;
use effects::{EffectKind, PowerupEffectEngine};
use error::{EffectError, ShotError, SimError};
use events::SimEvent;
use geometry::HoleGeometry;
use governor::BallPose;
use level::Level;
use replica::{RemoteReplica, ReplicaSet};
use scoring::Scorecard;
use shot::ShotOutcome;
use stage::Stage;
use world::{BodyId, PhysicsWorld};

/// The minigolf match: local ball physics, hole progression, effects and
/// remote replicas, advanced by a fixed-step accumulator.
pub struct Simulation {
    config: SimConfig,
    players: Vec<Player>,
    stage: Stage,
    coordinator: Option<LevelCoordinator>,
    effects: PowerupEffectEngine,
    replicas: ReplicaSet,
    /// Simulated seconds since creation. Stops while paused.
    clock: f64,
    accumulator: f32,
    step_count: u64,
    paused: bool,
}

impl Simulation {
    pub fn new(players: Vec<Player>, config: SimConfig) -> Result<Self, SimError> {
        if players.len() < MIN_PLAYERS {
            return Err(SimError::NoPlayers);
        }
        if players.len() > MAX_PLAYERS {
            return Err(SimError::TooManyPlayers(players.len()));
        }

        let mut stage = Stage::new(&config);
        let mut effects = PowerupEffectEngine::new(config.effects.clone());
        for player in players.iter().filter(|p| p.is_local) {
            stage.add_ball(player.id);
            effects.set_simulated(player.id);
        }
        let replicas = ReplicaSet::new(
            config.replica.clone(),
            players.iter().filter(|p| !p.is_local).map(|p| p.id),
        );

        Ok(Self {
            config,
            players,
            stage,
            coordinator: None,
            effects,
            replicas,
            clock: 0.0,
            accumulator: 0.0,
            step_count: 0,
            paused: false,
        })
    }

    /// Load the first hole of `level` and reset every ball to its start.
    pub fn start(&mut self, level: Level) -> Result<Vec<SimEvent>, SimError> {
        let ids = self.players.iter().map(|p| p.id).collect();
        let (coordinator, event) =
            LevelCoordinator::start(level, ids, self.config.flow.clone(), &mut self.stage)?;
        self.coordinator = Some(coordinator);
        self.effects.clear();
        self.accumulator = 0.0;
        Ok(vec![event])
    }

    /// Advance by a measured frame delta, running up to `max_substeps`
    /// fixed steps. Time beyond that is dropped.
    pub fn frame(&mut self, dt: f32) -> Vec<SimEvent> {
        let mut events = Vec::new();
        if self.paused || !dt.is_finite() || dt <= 0.0 {
            return events;
        }
        let fixed = self.config.physics.fixed_dt;
        self.accumulator += dt;
        let mut steps = 0;
        while self.accumulator >= fixed && steps < self.config.physics.max_substeps {
            self.accumulator -= fixed;
            events.extend(self.step());
            steps += 1;
        }
        if self.accumulator >= fixed {
            tracing::debug!(
                dropped = self.accumulator,
                "Frame exceeded substep budget, dropping time"
            );
            self.accumulator = 0.0;
        }
        events
    }

    /// Run exactly one fixed step.
    pub fn step(&mut self) -> Vec<SimEvent> {
        let mut events = Vec::new();
        if self.paused {
            return events;
        }
        let dt = self.config.physics.fixed_dt;
        self.clock += dt as f64;
        self.step_count += 1;

        for (player_id, effect) in self.effects.tick(dt) {
            events.push(SimEvent::EffectExpired { player_id, effect });
        }
        let base_gravity = self
            .stage
            .geometry
            .as_ref()
            .map_or(self.config.physics.default_gravity, |g| g.gravity);
        self.effects.sync_world(&mut self.stage.world, base_gravity);

        let effects = &self.effects;
        let report = self
            .stage
            .step(dt, self.clock, |p| effects.governor_mods(p));
        events.extend(report.events);

        if let Some(coordinator) = self.coordinator.as_mut() {
            let hole_index = coordinator.current_hole();
            let hole_position = self.stage.geometry.as_ref().map_or(Vec3::ZERO, |g| g.cup);
            for player_id in report.scored {
                let strokes = coordinator.scorecard().strokes(player_id, hole_index);
                tracing::debug!(player_id, hole_index, strokes, "Player scored");
                events.push(SimEvent::Scored {
                    player_id,
                    hole_index,
                    strokes,
                    hole_position,
                });
                coordinator.on_scored(player_id);
            }
            let flow = coordinator.tick(dt, &mut self.stage);
            if flow
                .iter()
                .any(|e| matches!(e, SimEvent::HoleLoaded { .. }))
            {
                self.effects.mark_dirty();
            }
            events.extend(flow);
        }

        self.replicas.step();

        if self.step_count % u64::from(self.config.flow.broadcast_interval_steps.max(1)) == 0 {
            for (player_id, ball) in self.stage.roster.iter() {
                let Some(body) = self.stage.world.body(ball) else {
                    continue;
                };
                if body.linear_velocity.length() > self.config.flow.broadcast_min_speed {
                    events.push(SimEvent::PositionUpdate {
                        player_id,
                        position: body.position,
                        rotation: body.rotation,
                        timestamp: self.clock,
                    });
                }
            }
        }
        events
    }

    /// Strike a local player's ball. Returns the `ShotAccepted` event.
    pub fn attempt_shot(
        &mut self,
        player_id: PlayerId,
        direction: Vec2,
        power: f32,
    ) -> Result<SimEvent, SimError> {
        let coordinator = self.coordinator.as_mut().ok_or(SimError::NotStarted)?;
        let ball = self
            .stage
            .ball_of(player_id)
            .ok_or(ShotError::UnknownPlayer(player_id))?;
        let mods = self.effects.shot_modifiers(player_id);
        let phase = self.stage.capture.phase(ball);
        let outcome = self
            .stage
            .shots
            .attempt(
                &mut self.stage.world,
                ball,
                player_id,
                phase,
                direction,
                power,
                &mods,
            )
            .inspect_err(|e| tracing::debug!(player_id, "Shot rejected: {e}"))?;

        let hole = coordinator.current_hole();
        let counted = outcome.counts_stroke();
        let strokes = if counted {
            coordinator.scorecard_mut().record_stroke(player_id, hole)
        } else {
            coordinator.scorecard().strokes(player_id, hole)
        };
        if let ShotOutcome::Mulligan { position } = outcome {
            self.stage.governor.mark_teleported(ball, position);
        }
        self.effects.on_shot(player_id, &outcome);
        Ok(SimEvent::ShotAccepted {
            player_id,
            strokes,
            counted,
            mulligan: matches!(outcome, ShotOutcome::Mulligan { .. }),
        })
    }

    /// Apply a power-up effect by wire id. Returns `EffectActivated`.
    pub fn activate_effect(
        &mut self,
        player_id: PlayerId,
        effect_id: &str,
    ) -> Result<SimEvent, SimError> {
        let effect: EffectKind = effect_id.parse()?;
        if !self.players.iter().any(|p| p.id == player_id) {
            return Err(EffectError::UnknownPlayer(player_id).into());
        }
        self.effects.activate(player_id, effect);
        Ok(SimEvent::EffectActivated { player_id, effect })
    }

    /// Feed a remote player's broadcast pose. Returns false if it was dropped.
    pub fn update_remote(
        &mut self,
        player_id: PlayerId,
        position: Vec3,
        rotation: Quat,
        timestamp: f64,
    ) -> bool {
        self.replicas
            .update_target(player_id, position, rotation, timestamp)
    }

    /// Skip the grace period and move on once every player has scored.
    pub fn advance(&mut self) -> Result<SimEvent, SimError> {
        let coordinator = self.coordinator.as_mut().ok_or(SimError::NotStarted)?;
        let event = coordinator.advance(&mut self.stage)?;
        self.effects.mark_dirty();
        Ok(event)
    }

    /// Route an inbound wire message to the matching entry point.
    pub fn apply_message(&mut self, message: MatchMessage) -> Result<Vec<SimEvent>, SimError> {
        match message {
            MatchMessage::Shot(shot) => {
                Ok(vec![self.attempt_shot(shot.player_id, shot.direction, shot.power)?])
            },
            MatchMessage::EffectApply(apply) => Ok(vec![
                self.activate_effect(apply.target_player_id, &apply.effect_id)?,
            ]),
            MatchMessage::PositionUpdate(update) => {
                self.update_remote(
                    update.player_id,
                    update.position,
                    update.rotation,
                    update.timestamp,
                );
                Ok(Vec::new())
            },
            MatchMessage::Scored(scored) => {
                let coordinator = self.coordinator.as_mut().ok_or(SimError::NotStarted)?;
                if !self.replicas.is_remote(scored.player_id) {
                    return Ok(Vec::new());
                }
                let hole = scored.hole_index as usize;
                coordinator
                    .scorecard_mut()
                    .set_strokes(scored.player_id, hole, scored.strokes);
                if hole == coordinator.current_hole() {
                    coordinator.on_scored(scored.player_id);
                }
                Ok(Vec::new())
            },
            MatchMessage::MatchComplete(_) => Ok(Vec::new()),
        }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // ---- Host hooks ----

    /// Move a local ball, e.g. when restoring a saved position.
    pub fn place_ball(&mut self, player_id: PlayerId, position: Vec3, velocity: Vec3) -> bool {
        let Some(ball) = self.stage.ball_of(player_id) else {
            return false;
        };
        self.stage.world.teleport(ball, position);
        self.stage.world.set_linear_velocity(ball, velocity);
        self.stage.governor.mark_teleported(ball, position);
        true
    }

    /// Push a local ball from outside the simulation.
    pub fn apply_impulse(&mut self, player_id: PlayerId, impulse: Vec3) -> bool {
        let Some(ball) = self.stage.ball_of(player_id) else {
            return false;
        };
        self.stage.world.apply_impulse(ball, impulse);
        true
    }

    pub fn set_last_shot_position(&mut self, player_id: PlayerId, position: Vec3) {
        self.stage.shots.set_last_shot(player_id, position);
    }

    // ---- Accessors ----

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.stage.world
    }

    pub fn geometry(&self) -> Option<&HoleGeometry> {
        self.stage.geometry.as_ref()
    }

    pub fn effects(&self) -> &PowerupEffectEngine {
        &self.effects
    }

    pub fn scorecard(&self) -> Option<&Scorecard> {
        self.coordinator.as_ref().map(LevelCoordinator::scorecard)
    }

    pub fn current_hole(&self) -> Option<usize> {
        self.coordinator.as_ref().map(LevelCoordinator::current_hole)
    }

    pub fn is_complete(&self) -> bool {
        self.coordinator
            .as_ref()
            .is_some_and(LevelCoordinator::is_complete)
    }

    pub fn shots_enabled(&self) -> bool {
        self.stage.shots.is_enabled()
    }

    pub fn last_shot_position(&self, player_id: PlayerId) -> Option<Vec3> {
        self.stage.shots.last_shot(player_id)
    }

    pub fn phase(&self, player_id: PlayerId) -> HolePhase {
        self.stage.phase_of(player_id)
    }

    pub fn ball_id(&self, player_id: PlayerId) -> Option<BodyId> {
        self.stage.ball_of(player_id)
    }

    pub fn ball_position(&self, player_id: PlayerId) -> Option<Vec3> {
        let ball = self.stage.ball_of(player_id)?;
        self.stage.world.body(ball).map(|b| b.position)
    }

    pub fn ball_velocity(&self, player_id: PlayerId) -> Option<Vec3> {
        let ball = self.stage.ball_of(player_id)?;
        self.stage.world.body(ball).map(|b| b.linear_velocity)
    }

    /// Render pose of a local ball after the last step.
    pub fn ball_pose(&self, player_id: PlayerId) -> Option<BallPose> {
        let ball = self.stage.ball_of(player_id)?;
        self.stage.governor.pose(ball)
    }

    pub fn replica(&self, player_id: PlayerId) -> Option<&RemoteReplica> {
        self.replicas.get(player_id)
    }
}
