use serde::{Deserialize, Serialize};

/// Rigid-body world parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Fixed integration step (seconds).
    pub fixed_dt: f32,
    /// Maximum fixed steps taken per rendered frame.
    pub max_substeps: u32,
    pub solver_iterations: u32,
    pub solver_tolerance: f32,
    /// Gravity used when a map does not specify one.
    pub default_gravity: f32,
    /// Allowed gravity range; map values outside are clamped.
    pub min_gravity: f32,
    pub max_gravity: f32,
    /// Approach speeds below this resolve without bounce.
    pub restitution_threshold: f32,
    pub ground_friction: f32,
    pub ground_restitution: f32,
    pub wall_friction: f32,
    pub wall_restitution: f32,
    pub ramp_friction: f32,
    pub ramp_restitution: f32,
    pub ball_friction: f32,
    pub ball_restitution: f32,
    /// Speed under which a touching body counts as resting.
    pub sleep_speed: f32,
    /// Seconds of rest before a body sleeps.
    pub sleep_delay: f32,
    /// Deceleration of a supported ball as a fraction of gravity.
    pub rolling_resistance: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            max_substeps: 10,
            solver_iterations: 20,
            solver_tolerance: 1e-3,
            default_gravity: -30.0,
            min_gravity: -50.0,
            max_gravity: -10.0,
            restitution_threshold: 1.0,
            ground_friction: 0.6,
            ground_restitution: 0.5,
            wall_friction: 0.0,
            wall_restitution: 0.95,
            ramp_friction: 0.8,
            ramp_restitution: 0.1,
            ball_friction: 0.1,
            ball_restitution: 0.8,
            sleep_speed: 0.05,
            sleep_delay: 1.0,
            rolling_resistance: 0.04,
        }
    }
}

/// Per-ball limits enforced after each step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BallConfig {
    pub radius: f32,
    pub mass: f32,
    pub speed_cap: f32,
    /// Cap while the super-boost after-effect runs.
    pub boosted_speed_cap: f32,
    /// Pre-step speed above which the tunneling sweep runs.
    pub sweep_speed: f32,
    /// Distance a swept ball is placed off the struck surface.
    pub sweep_offset: f32,
    pub boost_damping: f32,
    pub boost_damping_min_speed: f32,
    pub bounce_damping: f32,
    /// Below this height a ball counts as off the map.
    pub off_map_floor: f32,
    /// Below this height a ball outside the cup is lifted back up.
    pub safety_floor: f32,
    pub safety_respawn_height: f32,
    /// Minimum drop height when balls are placed at a start point.
    pub spawn_height: f32,
    /// Lateral spacing between balls at the start point.
    pub spawn_spacing: f32,
    /// Rings searched around the last-shot position during recovery.
    pub recovery_rings: u32,
}

impl Default for BallConfig {
    fn default() -> Self {
        Self {
            radius: 0.5,
            mass: 1.0,
            speed_cap: 100.0,
            boosted_speed_cap: 90.0,
            sweep_speed: 20.0,
            sweep_offset: 0.6,
            boost_damping: 0.995,
            boost_damping_min_speed: 5.0,
            bounce_damping: 0.992,
            off_map_floor: -2.0,
            safety_floor: -0.5,
            safety_respawn_height: 1.0,
            spawn_height: 3.0,
            spawn_spacing: 1.2,
            recovery_rings: 5,
        }
    }
}

/// Active element tuning shared by every hole.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementConfig {
    /// Minimum interval between triggers of one element kind on one ball (seconds).
    pub trigger_cooldown: f64,
    pub wall_hit_cooldown: f64,
    pub wall_hit_min_speed: f32,
    /// Bumper exit speed is `strength * bumper_speed_factor`.
    pub bumper_speed_factor: f32,
    /// Fraction of the bumper exit speed applied upward.
    pub bumper_lift: f32,
    pub speed_boost_min_vy: f32,
    pub fan_range: f32,
    pub fan_radius: f32,
}

impl Default for ElementConfig {
    fn default() -> Self {
        Self {
            trigger_cooldown: 0.5,
            wall_hit_cooldown: 0.1,
            wall_hit_min_speed: 3.0,
            bumper_speed_factor: 4.0,
            bumper_lift: 0.15,
            speed_boost_min_vy: 2.0,
            fan_range: 12.0,
            fan_radius: 3.0,
        }
    }
}

/// Ball-in-hole behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Ball centre must be below this height to drop in.
    pub entry_max_height: f32,
    /// Downward speed given to a ball entering the cup.
    pub entry_kick_speed: f32,
    /// Height a settled ball is pinned at.
    pub settle_depth: f32,
    /// Horizontal velocity retained per step while entering.
    pub funnel_damping: f32,
    /// Pull toward the cup centre per unit of offset (units/s).
    pub funnel_pull: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            entry_max_height: 0.8,
            entry_kick_speed: -2.0,
            settle_depth: -1.5,
            funnel_damping: 0.5,
            funnel_pull: 4.0,
        }
    }
}

/// Stroke tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotConfig {
    /// Horizontal speed at or below which a ball may be struck.
    pub rest_speed: f32,
    pub base_impulse: f32,
    pub impulse_coefficient: f32,
    pub power_exponent: f32,
}

impl Default for ShotConfig {
    fn default() -> Self {
        Self {
            rest_speed: 0.5,
            // Full power launches a unit-mass ball at 50 units/s.
            base_impulse: 50.0 / 15.0,
            impulse_coefficient: 15.0,
            power_exponent: 1.5,
        }
    }
}

/// Hole progression timing and broadcast cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Delay between the last player scoring and the next hole (seconds).
    pub advance_grace: f32,
    /// Delay after a hole loads before shots are accepted (seconds).
    pub settle_delay: f32,
    /// Fixed steps between position broadcasts.
    pub broadcast_interval_steps: u32,
    pub broadcast_min_speed: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            advance_grace: 3.0,
            settle_delay: 1.0,
            broadcast_interval_steps: 3,
            broadcast_min_speed: 0.05,
        }
    }
}

/// Power-up magnitudes. Lifetimes are fixed per effect kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Ball-wall restitution while super boost is active.
    pub super_boost_wall_restitution: f32,
    pub super_boost_shot_multiplier: f32,
    pub feather_gravity: f32,
    pub super_bounce_factor: f32,
    pub sticky_factor: f32,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            super_boost_wall_restitution: 3.0,
            super_boost_shot_multiplier: 3.0,
            feather_gravity: -8.0,
            super_bounce_factor: 2.5,
            sticky_factor: 0.05,
        }
    }
}

/// Remote ball smoothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Fraction of the remaining distance a replica covers per step.
    pub lerp: f32,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self { lerp: 0.5 }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub physics: PhysicsConfig,
    pub ball: BallConfig,
    pub elements: ElementConfig,
    pub capture: CaptureConfig,
    pub shot: ShotConfig,
    pub effects: EffectConfig,
    pub flow: FlowConfig,
    pub replica: ReplicaConfig,
}

impl SimConfig {
    /// Load config from a TOML file. Falls back to defaults if the file is missing
    /// or unparseable.
    pub fn load() -> Self {
        let path = std::env::var("MINIGOLF_SIM_CONFIG")
            .unwrap_or_else(|_| "config/sim.toml".to_string());
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_toml(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse {path}: {e}, using defaults");
                SimConfig::default()
            }),
            Err(_) => SimConfig::default(),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
