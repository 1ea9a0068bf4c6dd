use serde::{Deserialize, Serialize};

/// Unique identifier for a player in a match.
pub type PlayerId = u64;

/// Smallest number of players a match can be started with.
pub const MIN_PLAYERS: usize = 1;
/// Largest number of concurrent players a match supports.
pub const MAX_PLAYERS: usize = 4;

/// A participant in a match.
///
/// Only local players own a simulated ball; remote players are driven by
/// position broadcasts and exist in the core purely as replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub is_local: bool,
}

impl Player {
    pub fn local(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_local: true,
        }
    }

    pub fn remote(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_local: false,
        }
    }
}
