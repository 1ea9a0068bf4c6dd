use std::fmt;

use minigolf_core::player::PlayerId;

/// Rejection of level data. Raised before any body is created.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelError {
    Parse(String),
    MissingField(String),
    UnknownElement { hole: u32, kind: String },
    InvalidHoleRadius { hole: u32, radius: f32 },
    InvalidPar { hole: u32, par: u32 },
    TooFewWalls { hole: u32, found: usize },
    NoHoles,
    HoleIndexOutOfRange(usize),
}

impl LevelError {
    /// Map a serde_json failure, pulling out the field name when one is missing.
    pub(crate) fn from_json(err: serde_json::Error) -> Self {
        let msg = err.to_string();
        if let Some(rest) = msg.strip_prefix("missing field `")
            && let Some(end) = rest.find('`')
        {
            return Self::MissingField(rest[..end].to_string());
        }
        Self::Parse(msg)
    }
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "level parse error: {e}"),
            Self::MissingField(name) => write!(f, "missing required field `{name}`"),
            Self::UnknownElement { hole, kind } => {
                write!(f, "hole {hole}: unknown element kind `{kind}`")
            },
            Self::InvalidHoleRadius { hole, radius } => {
                write!(f, "hole {hole}: cup radius {radius} (expected 1.2)")
            },
            Self::InvalidPar { hole, par } => write!(f, "hole {hole}: par {par} outside 1..=10"),
            Self::TooFewWalls { hole, found } => {
                write!(f, "hole {hole}: {found} boundary walls (need at least 4)")
            },
            Self::NoHoles => write!(f, "level has no holes"),
            Self::HoleIndexOutOfRange(i) => write!(f, "hole index {i} out of range"),
        }
    }
}

impl std::error::Error for LevelError {}

/// Why a shot was refused. State is left untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum ShotError {
    BallMoving { speed: f32 },
    BallSettled,
    Disabled,
    UnknownPlayer(PlayerId),
    InvalidPower(f32),
    InvalidDirection,
}

impl fmt::Display for ShotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BallMoving { speed } => write!(f, "ball still moving ({speed:.2} u/s)"),
            Self::BallSettled => write!(f, "ball is already in the cup"),
            Self::Disabled => write!(f, "shots are disabled"),
            Self::UnknownPlayer(id) => write!(f, "no local ball for player {id}"),
            Self::InvalidPower(p) => write!(f, "shot power {p} outside 0..=1"),
            Self::InvalidDirection => write!(f, "shot direction has no horizontal component"),
        }
    }
}

impl std::error::Error for ShotError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    UnknownEffect(String),
    UnknownPlayer(PlayerId),
}

impl fmt::Display for EffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEffect(id) => write!(f, "unknown effect `{id}`"),
            Self::UnknownPlayer(id) => write!(f, "unknown player {id}"),
        }
    }
}

impl std::error::Error for EffectError {}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceError {
    /// Not every player has scored on the current hole.
    HoleNotComplete { scored: usize, total: usize },
    MatchComplete,
    /// The next hole failed validation; the current hole stays loaded.
    Level(LevelError),
}

impl fmt::Display for AdvanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HoleNotComplete { scored, total } => {
                write!(f, "hole not complete ({scored}/{total} scored)")
            },
            Self::MatchComplete => write!(f, "match already complete"),
            Self::Level(e) => write!(f, "cannot load next hole: {e}"),
        }
    }
}

impl std::error::Error for AdvanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Level(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LevelError> for AdvanceError {
    fn from(e: LevelError) -> Self {
        Self::Level(e)
    }
}

/// Errors from [`crate::Simulation`] entry points.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    NoPlayers,
    TooManyPlayers(usize),
    NotStarted,
    Level(LevelError),
    Shot(ShotError),
    Effect(EffectError),
    Advance(AdvanceError),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPlayers => write!(f, "a match needs at least one player"),
            Self::TooManyPlayers(n) => write!(
                f,
                "{n} players exceeds the maximum of {}",
                minigolf_core::player::MAX_PLAYERS
            ),
            Self::NotStarted => write!(f, "simulation has not been started"),
            Self::Level(e) => write!(f, "{e}"),
            Self::Shot(e) => write!(f, "{e}"),
            Self::Effect(e) => write!(f, "{e}"),
            Self::Advance(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Level(e) => Some(e),
            Self::Shot(e) => Some(e),
            Self::Effect(e) => Some(e),
            Self::Advance(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LevelError> for SimError {
    fn from(e: LevelError) -> Self {
        Self::Level(e)
    }
}

impl From<ShotError> for SimError {
    fn from(e: ShotError) -> Self {
        Self::Shot(e)
    }
}

impl From<EffectError> for SimError {
    fn from(e: EffectError) -> Self {
        Self::Effect(e)
    }
}

impl From<AdvanceError> for SimError {
    fn from(e: AdvanceError) -> Self {
        Self::Advance(e)
    }
}
