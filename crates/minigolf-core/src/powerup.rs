use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Trait for power-up kind enums.
pub trait PowerUpKind: Clone + Copy + PartialEq + Serialize + DeserializeOwned {
    /// Lifetime in seconds once the timer runs. Use `f32::INFINITY` for
    /// effects that last until consumed.
    fn duration(&self) -> f32;

    /// Whether the lifetime starts on activation. Kinds returning `false`
    /// stay armed until [`ActivePowerUp::start`] is called.
    fn starts_on_activation(&self) -> bool {
        true
    }
}

/// Active power-up effect on a player, generic over the kind enum.
///
/// Lifetimes are stored as remaining time rather than deadlines, so an
/// effect only ages while its owner keeps ticking it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ActivePowerUp<K: PowerUpKind> {
    pub kind: K,
    pub remaining: f32,
    pub running: bool,
}

impl<K: PowerUpKind> ActivePowerUp<K> {
    pub fn new(kind: K) -> Self {
        if kind.starts_on_activation() {
            Self {
                remaining: kind.duration(),
                running: true,
                kind,
            }
        } else {
            Self {
                remaining: f32::INFINITY,
                running: false,
                kind,
            }
        }
    }

    /// Start the lifetime of an armed effect. No-op when already running.
    pub fn start(&mut self) {
        if !self.running {
            self.running = true;
            self.remaining = self.kind.duration();
        }
    }

    pub fn tick(&mut self, dt: f32) {
        if self.running && self.remaining.is_finite() {
            self.remaining -= dt;
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining <= 0.0
    }
}
