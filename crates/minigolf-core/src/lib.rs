pub mod net;
pub mod player;
pub mod powerup;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::player::{Player, PlayerId};

    /// Create `n` local test players with sequential IDs starting at 1.
    pub fn make_players(n: usize) -> Vec<Player> {
        (0..n)
            .map(|i| Player::local(i as PlayerId + 1, format!("Player{}", i + 1)))
            .collect()
    }

    /// Create one local player (id 1) followed by `remote` remote players.
    pub fn make_mixed_players(remote: usize) -> Vec<Player> {
        let mut players = make_players(1);
        players.extend(
            (0..remote).map(|i| Player::remote(i as PlayerId + 2, format!("Remote{}", i + 1))),
        );
        players
    }
}
