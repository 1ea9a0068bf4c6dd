use std::collections::BTreeMap;

use minigolf_core::player::PlayerId;

use crate::world::BodyId;

/// Which body belongs to which player. Only locally simulated players have one.
#[derive(Debug, Clone, Default)]
pub struct BallRoster {
    by_player: BTreeMap<PlayerId, BodyId>,
    by_body: BTreeMap<BodyId, PlayerId>,
    /// Join order, used for start offsets.
    order: Vec<PlayerId>,
}

impl BallRoster {
    pub fn insert(&mut self, player: PlayerId, body: BodyId) {
        if let Some(old) = self.by_player.insert(player, body) {
            self.by_body.remove(&old);
        } else {
            self.order.push(player);
        }
        self.by_body.insert(body, player);
    }

    pub fn body_of(&self, player: PlayerId) -> Option<BodyId> {
        self.by_player.get(&player).copied()
    }

    pub fn player_of(&self, body: BodyId) -> Option<PlayerId> {
        self.by_body.get(&body).copied()
    }

    pub fn contains_body(&self, body: BodyId) -> bool {
        self.by_body.contains_key(&body)
    }

    /// `(player, body)` pairs in join order.
    pub fn iter(&self) -> impl Iterator<Item = (PlayerId, BodyId)> + '_ {
        self.order
            .iter()
            .filter_map(|p| self.by_player.get(p).map(|&b| (*p, b)))
    }

    pub fn len(&self) -> usize {
        self.by_player.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_player.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_both_ways_in_join_order() {
        let mut roster = BallRoster::default();
        roster.insert(7, BodyId(0));
        roster.insert(3, BodyId(1));
        assert_eq!(roster.body_of(3), Some(BodyId(1)));
        assert_eq!(roster.player_of(BodyId(0)), Some(7));
        let order: Vec<_> = roster.iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec![7, 3]);
    }

    #[test]
    fn reinsert_replaces_body() {
        let mut roster = BallRoster::default();
        roster.insert(1, BodyId(0));
        roster.insert(1, BodyId(5));
        assert_eq!(roster.len(), 1);
        assert!(!roster.contains_body(BodyId(0)));
        assert_eq!(roster.player_of(BodyId(5)), Some(1));
    }
}
