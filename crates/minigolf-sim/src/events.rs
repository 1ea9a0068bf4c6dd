use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use minigolf_core::net::messages::{
    MatchCompleteMsg, MatchMessage, PositionUpdateMsg, ScoredMsg,
};
use minigolf_core::player::PlayerId;

use crate::effects::EffectKind;

/// Why a ball was moved by the governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryKind {
    /// Left the play area or fell below the map.
    OffMap,
    /// Sank below the ground outside the cup.
    SafetyFloor,
}

/// Everything observable that happened during a frame, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    HoleLoaded {
        hole_index: usize,
        number: u32,
        par: u32,
    },
    ShotAccepted {
        player_id: PlayerId,
        /// Strokes on the current hole after this shot.
        strokes: u32,
        /// False for free shots and mulligans.
        counted: bool,
        mulligan: bool,
    },
    WallHit {
        player_id: PlayerId,
        speed: f32,
    },
    Bounce {
        player_id: PlayerId,
    },
    BumperHit {
        player_id: PlayerId,
    },
    SpeedBoost {
        player_id: PlayerId,
    },
    LavaReset {
        player_id: PlayerId,
        position: Vec3,
    },
    EffectActivated {
        player_id: PlayerId,
        effect: EffectKind,
    },
    EffectExpired {
        player_id: PlayerId,
        effect: EffectKind,
    },
    BallRecovered {
        player_id: PlayerId,
        position: Vec3,
        kind: RecoveryKind,
    },
    Scored {
        player_id: PlayerId,
        hole_index: usize,
        strokes: u32,
        hole_position: Vec3,
    },
    PositionUpdate {
        player_id: PlayerId,
        position: Vec3,
        rotation: Quat,
        timestamp: f64,
    },
    MatchComplete {
        totals: Vec<(PlayerId, u32)>,
    },
}

impl SimEvent {
    /// The wire message peers need for this event, if any.
    pub fn to_message(&self) -> Option<MatchMessage> {
        match self {
            Self::Scored {
                player_id,
                hole_index,
                strokes,
                hole_position,
            } => Some(MatchMessage::Scored(ScoredMsg {
                player_id: *player_id,
                hole_index: *hole_index as u32,
                strokes: *strokes,
                hole_position: *hole_position,
            })),
            Self::PositionUpdate {
                player_id,
                position,
                rotation,
                timestamp,
            } => Some(MatchMessage::PositionUpdate(PositionUpdateMsg {
                player_id: *player_id,
                position: *position,
                rotation: *rotation,
                timestamp: *timestamp,
            })),
            Self::MatchComplete { totals } => Some(MatchMessage::MatchComplete(MatchCompleteMsg {
                totals: totals.clone(),
            })),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minigolf_core::net::messages::MessageType;

    #[test]
    fn local_only_events_have_no_message() {
        assert!(SimEvent::Bounce { player_id: 1 }.to_message().is_none());
        assert!(
            SimEvent::HoleLoaded {
                hole_index: 0,
                number: 1,
                par: 3
            }
            .to_message()
            .is_none()
        );
    }

    #[test]
    fn scored_maps_to_wire() {
        let msg = SimEvent::Scored {
            player_id: 2,
            hole_index: 4,
            strokes: 3,
            hole_position: Vec3::new(0.0, 0.0, -25.0),
        }
        .to_message()
        .unwrap();
        assert_eq!(msg.message_type(), MessageType::Scored);
        let MatchMessage::Scored(scored) = msg else {
            panic!("expected scored message");
        };
        assert_eq!(scored.hole_index, 4);
        assert_eq!(scored.strokes, 3);
    }
}
