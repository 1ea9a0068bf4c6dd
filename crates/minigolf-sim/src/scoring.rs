use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use minigolf_core::player::PlayerId;

/// How a hole's stroke count compares to par.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreLabel {
    HoleInOne,
    /// Strokes under par beyond eagle.
    UnderPar(u32),
    Eagle,
    Birdie,
    Par,
    Bogey,
    DoubleBogey,
    /// Strokes over par beyond double bogey.
    OverPar(u32),
}

impl ScoreLabel {
    pub fn for_strokes(strokes: u32, par: u32) -> Self {
        if strokes == 1 {
            return Self::HoleInOne;
        }
        let diff = strokes as i64 - par as i64;
        match diff {
            0 => Self::Par,
            -1 => Self::Birdie,
            -2 => Self::Eagle,
            1 => Self::Bogey,
            2 => Self::DoubleBogey,
            d if d < 0 => Self::UnderPar(d.unsigned_abs() as u32),
            d => Self::OverPar(d as u32),
        }
    }
}

impl fmt::Display for ScoreLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HoleInOne => write!(f, "Hole in one!"),
            Self::UnderPar(n) => write!(f, "-{n}"),
            Self::Eagle => write!(f, "Eagle"),
            Self::Birdie => write!(f, "Birdie"),
            Self::Par => write!(f, "Par"),
            Self::Bogey => write!(f, "Bogey"),
            Self::DoubleBogey => write!(f, "Double bogey"),
            Self::OverPar(n) => write!(f, "+{n}"),
        }
    }
}

/// Strokes per player per hole. The current hole's count is live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pars: Vec<u32>,
    /// Join order.
    order: Vec<PlayerId>,
    strokes: BTreeMap<PlayerId, Vec<u32>>,
}

impl Scorecard {
    pub fn new(players: impl IntoIterator<Item = PlayerId>, pars: Vec<u32>) -> Self {
        let order: Vec<PlayerId> = players.into_iter().collect();
        let strokes = order.iter().map(|&p| (p, vec![0; pars.len()])).collect();
        Self {
            pars,
            order,
            strokes,
        }
    }

    pub fn hole_count(&self) -> usize {
        self.pars.len()
    }

    pub fn par(&self, hole: usize) -> Option<u32> {
        self.pars.get(hole).copied()
    }

    pub fn total_par(&self) -> u32 {
        self.pars.iter().sum()
    }

    /// Add one stroke; returns the new count for the hole.
    pub fn record_stroke(&mut self, player_id: PlayerId, hole: usize) -> u32 {
        match self
            .strokes
            .get_mut(&player_id)
            .and_then(|holes| holes.get_mut(hole))
        {
            Some(count) => {
                *count += 1;
                *count
            },
            None => 0,
        }
    }

    /// Overwrite a hole's count, as reported by a remote player.
    pub fn set_strokes(&mut self, player_id: PlayerId, hole: usize, strokes: u32) {
        if let Some(count) = self
            .strokes
            .get_mut(&player_id)
            .and_then(|holes| holes.get_mut(hole))
        {
            *count = strokes;
        }
    }

    pub fn strokes(&self, player_id: PlayerId, hole: usize) -> u32 {
        self.strokes
            .get(&player_id)
            .and_then(|holes| holes.get(hole))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self, player_id: PlayerId) -> u32 {
        self.strokes
            .get(&player_id)
            .map_or(0, |holes| holes.iter().sum())
    }

    /// Running totals in join order.
    pub fn totals(&self) -> Vec<(PlayerId, u32)> {
        self.order.iter().map(|&p| (p, self.total(p))).collect()
    }

    pub fn label(&self, player_id: PlayerId, hole: usize) -> Option<ScoreLabel> {
        let par = self.par(hole)?;
        let strokes = self.strokes(player_id, hole);
        (strokes > 0).then(|| ScoreLabel::for_strokes(strokes, par))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hole_in_one_beats_any_par() {
        assert_eq!(ScoreLabel::for_strokes(1, 3), ScoreLabel::HoleInOne);
        // Par 2 hole-in-one is still a hole-in-one, not a birdie
        assert_eq!(ScoreLabel::for_strokes(1, 2), ScoreLabel::HoleInOne);
    }

    #[test]
    fn labels_relative_to_par() {
        assert_eq!(ScoreLabel::for_strokes(3, 5), ScoreLabel::Eagle);
        assert_eq!(ScoreLabel::for_strokes(3, 4), ScoreLabel::Birdie);
        assert_eq!(ScoreLabel::for_strokes(4, 4), ScoreLabel::Par);
        assert_eq!(ScoreLabel::for_strokes(5, 4), ScoreLabel::Bogey);
        assert_eq!(ScoreLabel::for_strokes(6, 4), ScoreLabel::DoubleBogey);
        assert_eq!(ScoreLabel::for_strokes(9, 4), ScoreLabel::OverPar(5));
        assert_eq!(ScoreLabel::for_strokes(2, 6), ScoreLabel::UnderPar(4));
    }

    #[test]
    fn display() {
        assert_eq!(ScoreLabel::OverPar(3).to_string(), "+3");
        assert_eq!(ScoreLabel::DoubleBogey.to_string(), "Double bogey");
    }

    #[test]
    fn strokes_accumulate_per_hole() {
        let mut card = Scorecard::new([7, 3], vec![3, 4]);
        assert_eq!(card.record_stroke(7, 0), 1);
        assert_eq!(card.record_stroke(7, 0), 2);
        assert_eq!(card.record_stroke(7, 1), 1);
        card.set_strokes(3, 0, 5);
        assert_eq!(card.strokes(7, 0), 2);
        assert_eq!(card.total(7), 3);
        assert_eq!(card.totals(), vec![(7, 3), (3, 5)]);
        assert_eq!(card.total_par(), 7);
        assert_eq!(card.label(7, 0), Some(ScoreLabel::Birdie));
    }

    #[test]
    fn unknown_player_or_hole_is_ignored() {
        let mut card = Scorecard::new([1], vec![3]);
        assert_eq!(card.record_stroke(9, 0), 0);
        assert_eq!(card.record_stroke(1, 4), 0);
        card.set_strokes(1, 4, 2);
        assert_eq!(card.total(1), 0);
        assert_eq!(card.label(1, 0), None, "no label before any stroke");
    }
}
