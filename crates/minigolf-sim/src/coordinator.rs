use std::collections::BTreeSet;

use minigolf_core::player::PlayerId;

use crate::config::FlowConfig;
use crate::error::{AdvanceError, LevelError};
use crate::events::SimEvent;
use crate::level::Level;
use crate::scoring::Scorecard;
use crate::stage::Stage;

/// Drives hole progression for the whole match.
pub struct LevelCoordinator {
    config: FlowConfig,
    level: Level,
    current: usize,
    /// Players who finished the current hole.
    scored: BTreeSet<PlayerId>,
    /// Every participant, local and remote, in join order.
    players: Vec<PlayerId>,
    /// Seconds until the next hole loads.
    advance_timer: Option<f32>,
    /// Seconds until shots are accepted on a fresh hole.
    settle_timer: Option<f32>,
    complete: bool,
    scorecard: Scorecard,
}

impl LevelCoordinator {
    /// Load the first hole into `stage` and lock shots for the settle delay.
    pub fn start(
        level: Level,
        players: Vec<PlayerId>,
        config: FlowConfig,
        stage: &mut Stage,
    ) -> Result<(Self, SimEvent), LevelError> {
        stage.load_hole(&level, 0)?;
        let pars = level.holes.iter().map(|h| h.par).collect();
        let scorecard = Scorecard::new(players.iter().copied(), pars);
        let mut coordinator = Self {
            config,
            level,
            current: 0,
            scored: BTreeSet::new(),
            players,
            advance_timer: None,
            settle_timer: None,
            complete: false,
            scorecard,
        };
        let event = coordinator.begin_hole(stage);
        Ok((coordinator, event))
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn current_hole(&self) -> usize {
        self.current
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn scorecard(&self) -> &Scorecard {
        &self.scorecard
    }

    pub fn scorecard_mut(&mut self) -> &mut Scorecard {
        &mut self.scorecard
    }

    pub fn has_scored(&self, player_id: PlayerId) -> bool {
        self.scored.contains(&player_id)
    }

    /// Whether the grace period before the next hole is running.
    pub fn advance_pending(&self) -> bool {
        self.advance_timer.is_some()
    }

    /// Note that a player finished the current hole.
    pub fn on_scored(&mut self, player_id: PlayerId) {
        if self.complete || !self.players.contains(&player_id) {
            return;
        }
        if !self.scored.insert(player_id) {
            return;
        }
        if self.scored.len() == self.players.len() && self.advance_timer.is_none() {
            tracing::debug!(
                hole = self.current,
                grace = self.config.advance_grace,
                "All players scored, advancing after grace"
            );
            self.advance_timer = Some(self.config.advance_grace);
        }
    }

    /// Run the settle and grace timers.
    pub fn tick(&mut self, dt: f32, stage: &mut Stage) -> Vec<SimEvent> {
        if let Some(t) = self.settle_timer.as_mut() {
            *t -= dt;
            if *t <= 0.0 {
                self.settle_timer = None;
                stage.shots.set_enabled(true);
            }
        }

        let mut events = Vec::new();
        if let Some(t) = self.advance_timer.as_mut() {
            *t -= dt;
            if *t <= 0.0 {
                self.advance_timer = None;
                match self.advance(stage) {
                    Ok(event) => events.push(event),
                    Err(e) => tracing::warn!("Hole advance failed: {e}"),
                }
            }
        }
        events
    }

    /// Move to the next hole, or finish the match after the last one.
    /// Fails without changing anything unless every player has scored.
    pub fn advance(&mut self, stage: &mut Stage) -> Result<SimEvent, AdvanceError> {
        if self.complete {
            return Err(AdvanceError::MatchComplete);
        }
        if self.scored.len() < self.players.len() {
            return Err(AdvanceError::HoleNotComplete {
                scored: self.scored.len(),
                total: self.players.len(),
            });
        }
        self.advance_timer = None;

        let next = self.current + 1;
        if next >= self.level.hole_count() {
            self.complete = true;
            stage.shots.set_enabled(false);
            let totals = self.scorecard.totals();
            tracing::info!(?totals, "Match complete");
            return Ok(SimEvent::MatchComplete { totals });
        }

        stage.load_hole(&self.level, next)?;
        self.current = next;
        Ok(self.begin_hole(stage))
    }

    fn begin_hole(&mut self, stage: &mut Stage) -> SimEvent {
        self.scored.clear();
        stage.shots.set_enabled(false);
        self.settle_timer = Some(self.config.settle_delay);
        let (number, par) = stage
            .geometry
            .as_ref()
            .map_or((self.current as u32 + 1, 0), |g| (g.number, g.par));
        tracing::info!(hole = self.current, number, par, "Hole loaded");
        SimEvent::HoleLoaded {
            hole_index: self.current,
            number,
            par,
        }
    }
}
