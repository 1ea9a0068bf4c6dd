use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::LevelError;

/// The only cup radius a level may use.
pub const CANONICAL_HOLE_RADIUS: f32 = 1.2;
pub const MIN_PAR: u32 = 1;
pub const MAX_PAR: u32 = 10;
/// Explicitly authored boundaries need at least this many walls.
pub const MIN_BOUNDARY_WALLS: usize = 4;

/// `{x, y, z}` as stored in level JSON. Missing components read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<Point3> for Vec3 {
    fn from(p: Point3) -> Self {
        Vec3::new(p.x, p.y, p.z)
    }
}

impl From<Vec3> for Point3 {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Box size. `y` is optional so each element can supply its own default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extents {
    pub x: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    pub z: f32,
}

impl Extents {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y: Some(y), z }
    }

    /// Full size with `default_y` filling a missing height.
    pub fn resolve(&self, default_y: f32) -> Vec3 {
        Vec3::new(self.x, self.y.unwrap_or(default_y), self.z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WallDef {
    pub position: Point3,
    pub size: Extents,
    #[serde(default)]
    pub rotation_y: f32,
    /// Perimeter wall; renderers may hide it.
    #[serde(default)]
    pub boundary: bool,
}

impl WallDef {
    pub const DEFAULT_HEIGHT: f32 = 2.0;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RampDef {
    pub position: Point3,
    pub size: Extents,
    #[serde(default)]
    pub rotation_y: f32,
    /// Tilt about the ramp's own Z axis, in degrees.
    #[serde(default, alias = "tilt")]
    pub angle: f32,
}

impl RampDef {
    pub const DEFAULT_THICKNESS: f32 = 0.5;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanDef {
    pub position: Point3,
    #[serde(default)]
    pub rotation_y: f32,
    /// Pitch about the fan's local X axis after yaw, in degrees.
    #[serde(default)]
    pub rotation_x: f32,
    #[serde(default = "FanDef::default_strength")]
    pub strength: f32,
}

impl FanDef {
    fn default_strength() -> f32 {
        10.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BouncePadDef {
    pub position: Point3,
    #[serde(default = "BouncePadDef::default_strength")]
    pub strength: f32,
    #[serde(default = "BouncePadDef::default_radius")]
    pub radius: f32,
}

impl BouncePadDef {
    fn default_strength() -> f32 {
        20.0
    }

    fn default_radius() -> f32 {
        1.5
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BumperDef {
    pub position: Point3,
    #[serde(default = "BumperDef::default_strength")]
    pub strength: f32,
    #[serde(default = "BumperDef::default_radius")]
    pub radius: f32,
}

impl BumperDef {
    fn default_strength() -> f32 {
        15.0
    }

    fn default_radius() -> f32 {
        1.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedBoostDef {
    pub position: Point3,
    #[serde(default)]
    pub rotation_y: f32,
    #[serde(default = "SpeedBoostDef::default_strength")]
    pub strength: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Extents>,
}

impl SpeedBoostDef {
    pub const DEFAULT_SIZE: Vec3 = Vec3::new(2.0, 0.2, 3.0);

    fn default_strength() -> f32 {
        30.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LavaDef {
    pub position: Point3,
    pub size: Extents,
}

impl LavaDef {
    pub const DEFAULT_DEPTH: f32 = 0.2;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinnerDef {
    pub position: Point3,
    pub size: Extents,
    /// Angular speed about Y in radians per second.
    #[serde(default = "SpinnerDef::default_speed")]
    pub speed: f32,
}

impl SpinnerDef {
    pub const DEFAULT_HEIGHT: f32 = 1.0;

    fn default_speed() -> f32 {
        2.0
    }
}

/// Cup position. `radius` defaults to the canonical value when omitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CupDef {
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    pub z: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
}

impl CupDef {
    pub fn new(x: f32, z: f32) -> Self {
        Self {
            x,
            y: 0.0,
            z,
            radius: None,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn radius(&self) -> f32 {
        self.radius.unwrap_or(CANONICAL_HOLE_RADIUS)
    }
}

/// One hole of a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoleDef {
    #[serde(default)]
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub par: u32,
    pub start_point: Point3,
    pub hole: CupDef,
    #[serde(default)]
    pub walls: Vec<WallDef>,
    #[serde(default)]
    pub ramps: Vec<RampDef>,
    /// Consumed by the power-up inventory, not the simulation.
    #[serde(default)]
    pub powerup_spawns: Vec<serde_json::Value>,
    #[serde(default)]
    pub fans: Vec<FanDef>,
    #[serde(default)]
    pub bounce_pads: Vec<BouncePadDef>,
    #[serde(default)]
    pub bumpers: Vec<BumperDef>,
    #[serde(default)]
    pub speed_boosts: Vec<SpeedBoostDef>,
    #[serde(default)]
    pub lava: Vec<LavaDef>,
    #[serde(default)]
    pub spinners: Vec<SpinnerDef>,
    /// Keys this version does not recognise.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl HoleDef {
    /// An empty par-3 hole.
    pub fn new(start: Vec3, cup: CupDef) -> Self {
        Self {
            number: 0,
            name: None,
            par: 3,
            start_point: start.into(),
            hole: cup,
            walls: Vec::new(),
            ramps: Vec::new(),
            powerup_spawns: Vec::new(),
            fans: Vec::new(),
            bounce_pads: Vec::new(),
            bumpers: Vec::new(),
            speed_boosts: Vec::new(),
            lava: Vec::new(),
            spinners: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Array-valued keys that are not element kinds this version builds.
    pub fn unknown_elements(&self) -> impl Iterator<Item = &str> {
        self.extra
            .iter()
            .filter(|(_, v)| v.is_array())
            .map(|(k, _)| k.as_str())
    }

    pub fn boundary_wall_count(&self) -> usize {
        self.walls.iter().filter(|w| w.boundary).count()
    }

    /// Checks that apply to every hole regardless of parse mode.
    pub fn validate(&self) -> Result<(), LevelError> {
        let radius = self.hole.radius();
        if (radius - CANONICAL_HOLE_RADIUS).abs() > 1e-4 {
            return Err(LevelError::InvalidHoleRadius {
                hole: self.number,
                radius,
            });
        }
        if !(MIN_PAR..=MAX_PAR).contains(&self.par) {
            return Err(LevelError::InvalidPar {
                hole: self.number,
                par: self.par,
            });
        }
        let boundary = self.boundary_wall_count();
        if boundary > 0 && boundary < MIN_BOUNDARY_WALLS {
            return Err(LevelError::TooFewWalls {
                hole: self.number,
                found: boundary,
            });
        }
        Ok(())
    }
}

/// Map-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// 24-bit RGB.
    pub sky_color: u32,
    pub ground_color: u32,
    pub gravity: f32,
    /// Side of the square play area.
    pub level_size: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sky_color: 0x87CEEB,
            ground_color: 0x2E8B57,
            gravity: -30.0,
            level_size: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Reject unknown element arrays instead of skipping them.
    pub strict: bool,
}

/// An ordered set of holes with shared settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "levels", alias = "holes")]
    pub holes: Vec<HoleDef>,
    #[serde(default)]
    pub settings: Settings,
}

impl Level {
    pub fn new(name: impl Into<String>, holes: Vec<HoleDef>, settings: Settings) -> Self {
        let mut level = Self {
            name: name.into(),
            holes,
            settings,
        };
        level.number_holes();
        level
    }

    /// A level holding just `hole`.
    pub fn single(hole: HoleDef, settings: Settings) -> Self {
        Self::new(hole.name.clone().unwrap_or_default(), vec![hole], settings)
    }

    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        Self::from_json_with(json, ParseOptions::default())
    }

    /// Parse either a multi-hole map or a single hole with its fields inlined,
    /// then validate every hole.
    pub fn from_json_with(json: &str, options: ParseOptions) -> Result<Self, LevelError> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(LevelError::from_json)?;
        let is_map = value.get("levels").is_some() || value.get("holes").is_some();
        let mut level = if is_map {
            serde_json::from_value::<Level>(value).map_err(LevelError::from_json)?
        } else {
            let settings = match value.get("settings") {
                Some(s) => serde_json::from_value(s.clone()).map_err(LevelError::from_json)?,
                None => Settings::default(),
            };
            let hole: HoleDef = serde_json::from_value(value).map_err(LevelError::from_json)?;
            Level {
                name: hole.name.clone().unwrap_or_default(),
                holes: vec![hole],
                settings,
            }
        };
        if level.holes.is_empty() {
            return Err(LevelError::NoHoles);
        }
        level.number_holes();
        for hole in &level.holes {
            if options.strict
                && let Some(kind) = hole.unknown_elements().next()
            {
                return Err(LevelError::UnknownElement {
                    hole: hole.number,
                    kind: kind.to_string(),
                });
            }
            hole.validate()?;
        }
        Ok(level)
    }

    pub fn hole(&self, index: usize) -> Result<&HoleDef, LevelError> {
        self.holes
            .get(index)
            .ok_or(LevelError::HoleIndexOutOfRange(index))
    }

    pub fn hole_count(&self) -> usize {
        self.holes.len()
    }

    pub fn total_par(&self) -> u32 {
        self.holes.iter().map(|h| h.par).sum()
    }

    /// Holes are numbered from 1 when the data leaves them unnumbered.
    fn number_holes(&mut self) {
        for (i, hole) in self.holes.iter_mut().enumerate() {
            if hole.number == 0 {
                hole.number = i as u32 + 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: &str = r#"{
        "name": "Test Map",
        "levels": [
            {
                "number": 1,
                "par": 2,
                "startPoint": {"x": 0, "y": 0, "z": 20},
                "hole": {"x": 0, "y": 0, "z": -20, "radius": 1.2},
                "walls": [
                    {"position": {"x": 5, "y": 1, "z": 0}, "size": {"x": 1, "z": 10}, "rotationY": 90}
                ],
                "ramps": [
                    {"position": {"x": 0, "y": 0, "z": 5}, "size": {"x": 4, "z": 6}, "angle": 15}
                ],
                "powerupSpawns": [{"x": 1, "y": 0, "z": 1}],
                "fans": [{"position": {"x": 0, "y": 1, "z": 0}, "rotationY": 180, "strength": 12}],
                "bouncePads": [{"position": {"x": -3, "y": 0, "z": 0}}],
                "bumpers": [{"position": {"x": 3, "y": 0, "z": 0}, "strength": 18}],
                "speedBoosts": [{"position": {"x": 0, "y": 0, "z": 10}, "rotationY": 0}]
            },
            {
                "par": 4,
                "startPoint": {"x": 0, "y": 0, "z": 0},
                "hole": {"x": 10, "z": 10},
                "lava": [{"position": {"x": 0, "y": 0, "z": 5}, "size": {"x": 4, "z": 2}}],
                "spinners": [{"position": {"x": 5, "y": 0.5, "z": 5}, "size": {"x": 6, "z": 0.5}, "speed": 1.5}]
            }
        ],
        "settings": {"skyColor": 8900331, "groundColor": 3050327, "gravity": -25, "levelSize": 80}
    }"#;

    #[test]
    fn parses_multi_hole_map() {
        let level = Level::from_json(MAP).unwrap();
        assert_eq!(level.name, "Test Map");
        assert_eq!(level.hole_count(), 2);
        assert_eq!(level.total_par(), 6);
        assert_eq!(level.settings.gravity, -25.0);
        assert_eq!(level.settings.level_size, 80.0);

        let first = &level.holes[0];
        assert_eq!(first.walls[0].size.resolve(WallDef::DEFAULT_HEIGHT).y, 2.0);
        assert_eq!(first.walls[0].rotation_y, 90.0);
        assert_eq!(first.ramps[0].angle, 15.0);
        assert_eq!(first.fans[0].strength, 12.0);
        assert_eq!(first.bounce_pads[0].strength, 20.0);
        assert_eq!(first.bounce_pads[0].radius, 1.5);
        assert_eq!(first.bumpers[0].strength, 18.0);
        assert_eq!(first.bumpers[0].radius, 1.0);
        assert_eq!(first.speed_boosts[0].strength, 30.0);
        assert_eq!(first.powerup_spawns.len(), 1);

        let second = &level.holes[1];
        assert_eq!(second.number, 2, "unnumbered holes are numbered by position");
        assert_eq!(second.hole.radius(), CANONICAL_HOLE_RADIUS);
        assert_eq!(second.lava[0].size.resolve(LavaDef::DEFAULT_DEPTH).y, 0.2);
        assert_eq!(second.spinners[0].speed, 1.5);
    }

    #[test]
    fn holes_key_is_accepted() {
        let json = MAP.replace("\"levels\"", "\"holes\"");
        assert_eq!(Level::from_json(&json).unwrap().hole_count(), 2);
    }

    #[test]
    fn single_inlined_hole() {
        let json = r#"{
            "name": "Solo",
            "par": 3,
            "startPoint": {"x": 0, "y": 0, "z": 10},
            "hole": {"x": 0, "y": 0, "z": -10},
            "settings": {"gravity": -20}
        }"#;
        let level = Level::from_json(json).unwrap();
        assert_eq!(level.hole_count(), 1);
        assert_eq!(level.name, "Solo");
        assert_eq!(level.holes[0].number, 1);
        assert_eq!(level.settings.gravity, -20.0);
        assert_eq!(level.settings.level_size, 100.0);
    }

    #[test]
    fn ramp_tilt_alias() {
        let json = r#"{"position": {"x": 0, "y": 0, "z": 0}, "size": {"x": 2, "z": 2}, "tilt": 20}"#;
        let ramp: RampDef = serde_json::from_str(json).unwrap();
        assert_eq!(ramp.angle, 20.0);
        assert_eq!(ramp.size.resolve(RampDef::DEFAULT_THICKNESS).y, 0.5);
    }

    #[test]
    fn wrong_radius_rejected() {
        let json = MAP.replace("\"radius\": 1.2", "\"radius\": 1.5");
        assert!(matches!(
            Level::from_json(&json),
            Err(LevelError::InvalidHoleRadius { hole: 1, .. })
        ));
    }

    #[test]
    fn par_out_of_range_rejected() {
        let json = MAP.replace("\"par\": 4", "\"par\": 11");
        assert_eq!(
            Level::from_json(&json),
            Err(LevelError::InvalidPar { hole: 2, par: 11 })
        );
    }

    #[test]
    fn missing_start_point_is_named() {
        let json = r#"{"par": 3, "hole": {"x": 0, "z": 0}}"#;
        assert_eq!(
            Level::from_json(json),
            Err(LevelError::MissingField("startPoint".to_string()))
        );
    }

    #[test]
    fn empty_level_rejected() {
        assert_eq!(
            Level::from_json(r#"{"levels": []}"#),
            Err(LevelError::NoHoles)
        );
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            Level::from_json("{\"levels\": ["),
            Err(LevelError::Parse(_))
        ));
    }

    #[test]
    fn partial_boundary_rejected() {
        let json = r#"{
            "par": 3,
            "startPoint": {"x": 0, "y": 0, "z": 10},
            "hole": {"x": 0, "y": 0, "z": -10},
            "walls": [
                {"position": {"x": 50, "y": 1, "z": 0}, "size": {"x": 1, "z": 100}, "boundary": true},
                {"position": {"x": -50, "y": 1, "z": 0}, "size": {"x": 1, "z": 100}, "boundary": true}
            ]
        }"#;
        assert_eq!(
            Level::from_json(json),
            Err(LevelError::TooFewWalls { hole: 1, found: 2 })
        );
    }

    #[test]
    fn unknown_elements_skipped_unless_strict() {
        let json = r#"{
            "par": 3,
            "startPoint": {"x": 0, "y": 0, "z": 10},
            "hole": {"x": 0, "y": 0, "z": -10},
            "windmills": [{"position": {"x": 0, "y": 0, "z": 0}}],
            "description": "not an element"
        }"#;
        let level = Level::from_json(json).unwrap();
        let unknown: Vec<_> = level.holes[0].unknown_elements().collect();
        assert_eq!(unknown, vec!["windmills"]);

        let strict = Level::from_json_with(json, ParseOptions { strict: true });
        assert_eq!(
            strict,
            Err(LevelError::UnknownElement {
                hole: 1,
                kind: "windmills".to_string()
            })
        );
    }

    #[test]
    fn hole_lookup_out_of_range() {
        let level = Level::from_json(MAP).unwrap();
        assert!(level.hole(1).is_ok());
        assert_eq!(level.hole(2), Err(LevelError::HoleIndexOutOfRange(2)));
    }
}
