use std::collections::BTreeMap;

use glam::{Quat, Vec3};

use minigolf_core::player::PlayerId;

use crate::config::ReplicaConfig;

/// Smoothed pose of a ball simulated by another peer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteReplica {
    pub position: Vec3,
    pub rotation: Quat,
    target_position: Vec3,
    target_rotation: Quat,
    /// Sender time of the newest accepted update.
    timestamp: f64,
}

impl RemoteReplica {
    fn snapped(position: Vec3, rotation: Quat, timestamp: f64) -> Self {
        Self {
            position,
            rotation,
            target_position: position,
            target_rotation: rotation,
            timestamp,
        }
    }

    pub fn target(&self) -> (Vec3, Quat) {
        (self.target_position, self.target_rotation)
    }

    fn step(&mut self, t: f32) {
        self.position = self.position.lerp(self.target_position, t);
        self.rotation = self.rotation.slerp(self.target_rotation, t);
    }
}

/// Replicas for every remote player.
pub struct ReplicaSet {
    config: ReplicaConfig,
    /// `None` until the first update arrives.
    replicas: BTreeMap<PlayerId, Option<RemoteReplica>>,
}

impl ReplicaSet {
    pub fn new(config: ReplicaConfig, remote: impl IntoIterator<Item = PlayerId>) -> Self {
        Self {
            config,
            replicas: remote.into_iter().map(|p| (p, None)).collect(),
        }
    }

    pub fn is_remote(&self, player_id: PlayerId) -> bool {
        self.replicas.contains_key(&player_id)
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&RemoteReplica> {
        self.replicas.get(&player_id).and_then(Option::as_ref)
    }

    /// Accept a broadcast pose. Returns false for unknown players,
    /// non-finite poses and updates no newer than the last one.
    pub fn update_target(
        &mut self,
        player_id: PlayerId,
        position: Vec3,
        rotation: Quat,
        timestamp: f64,
    ) -> bool {
        let Some(slot) = self.replicas.get_mut(&player_id) else {
            tracing::debug!(player_id, "Position update for unknown remote player");
            return false;
        };
        if !position.is_finite() || !rotation.is_finite() || !timestamp.is_finite() {
            return false;
        }
        let rotation = if rotation.length_squared() > f32::EPSILON {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };
        match slot {
            None => *slot = Some(RemoteReplica::snapped(position, rotation, timestamp)),
            Some(replica) => {
                if timestamp <= replica.timestamp {
                    return false;
                }
                replica.target_position = position;
                replica.target_rotation = rotation;
                replica.timestamp = timestamp;
            },
        }
        true
    }

    /// Move every replica part of the way to its target.
    pub fn step(&mut self) {
        let t = self.config.lerp;
        for replica in self.replicas.values_mut().flatten() {
            replica.step(t);
        }
    }
}
