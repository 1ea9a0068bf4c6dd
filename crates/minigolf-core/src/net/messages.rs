use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::player::PlayerId;

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Inputs consumed by the simulation
    Shot = 0x01,
    EffectApply = 0x02,

    // Outputs produced by the simulation
    PositionUpdate = 0x10,
    Scored = 0x11,
    MatchComplete = 0x12,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Shot),
            0x02 => Some(Self::EffectApply),
            0x10 => Some(Self::PositionUpdate),
            0x11 => Some(Self::Scored),
            0x12 => Some(Self::MatchComplete),
            _ => None,
        }
    }
}

/// A player striking their ball.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotMsg {
    pub player_id: PlayerId,
    /// Aim on the XZ plane (x, z). Need not be normalized.
    pub direction: Vec2,
    /// Stroke power in `0.0..=1.0`.
    pub power: f32,
}

/// Request to apply a power-up effect to a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectApplyMsg {
    pub target_player_id: PlayerId,
    pub effect_id: String,
}

/// Pose broadcast for a ball.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdateMsg {
    pub player_id: PlayerId,
    pub position: Vec3,
    pub rotation: Quat,
    /// Sender's simulated time in seconds.
    pub timestamp: f64,
}

/// A ball settled in the cup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMsg {
    pub player_id: PlayerId,
    pub hole_index: u32,
    pub strokes: u32,
    pub hole_position: Vec3,
}

/// Terminal message once every player finished the last hole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCompleteMsg {
    /// Total strokes per player, in join order.
    pub totals: Vec<(PlayerId, u32)>,
}

/// Every message the simulation consumes or produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchMessage {
    Shot(ShotMsg),
    EffectApply(EffectApplyMsg),
    PositionUpdate(PositionUpdateMsg),
    Scored(ScoredMsg),
    MatchComplete(MatchCompleteMsg),
}

impl MatchMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Shot(_) => MessageType::Shot,
            Self::EffectApply(_) => MessageType::EffectApply,
            Self::PositionUpdate(_) => MessageType::PositionUpdate,
            Self::Scored(_) => MessageType::Scored,
            Self::MatchComplete(_) => MessageType::MatchComplete,
        }
    }
}
