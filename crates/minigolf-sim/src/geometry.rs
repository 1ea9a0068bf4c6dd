use std::collections::BTreeMap;

use glam::{Quat, Vec3};

use crate::config::PhysicsConfig;
use crate::error::LevelError;
use crate::level::{LavaDef, Level, RampDef, Settings, SpeedBoostDef, SpinnerDef, WallDef};
use crate::math::{yaw, yaw_direction, yaw_pitch_direction, yaw_tilt};
use crate::world::{Body, BodyId, Material, PhysicsWorld, Shape};

/// Generated boundary walls.
const BOUNDARY_THICKNESS: f32 = 1.0;
const BOUNDARY_HEIGHT: f32 = 2.0;
const PAD_HALF_HEIGHT: f32 = 0.2;
const BUMPER_HALF_HEIGHT: f32 = 0.75;
const FAN_HOUSING_RADIUS: f32 = 0.75;

/// What a body in the world stands for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementTag {
    Ground,
    Wall { boundary: bool },
    Ramp,
    Spinner,
    BouncePad { strength: f32 },
    Bumper { strength: f32 },
    SpeedBoost { direction: Vec3, strength: f32 },
    Lava,
    /// Index into [`HoleGeometry::fans`].
    Fan(usize),
}

impl ElementTag {
    pub fn is_wall(&self) -> bool {
        matches!(self, Self::Wall { .. } | Self::Spinner)
    }
}

/// A fan's force corridor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FanField {
    pub position: Vec3,
    /// Unit blow direction.
    pub direction: Vec3,
    pub strength: f32,
}

/// Bodies and metadata for the hole currently in the world.
#[derive(Debug, Clone)]
pub struct HoleGeometry {
    pub number: u32,
    pub par: u32,
    pub start: Vec3,
    pub cup: Vec3,
    pub cup_radius: f32,
    /// Level gravity after clamping.
    pub gravity: f32,
    /// Half the side of the square play area.
    pub half_extent: f32,
    tags: BTreeMap<BodyId, ElementTag>,
    fans: Vec<FanField>,
    skipped: Vec<String>,
}

impl HoleGeometry {
    pub fn tag(&self, id: BodyId) -> Option<ElementTag> {
        self.tags.get(&id).copied()
    }

    pub fn tags(&self) -> impl Iterator<Item = (BodyId, ElementTag)> + '_ {
        self.tags.iter().map(|(&id, &tag)| (id, tag))
    }

    pub fn fans(&self) -> &[FanField] {
        &self.fans
    }

    /// Element kinds present in the data but not built.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn body_count(&self) -> usize {
        self.tags.len()
    }

    /// Inside the bounded play area on the XZ plane.
    pub fn contains_xz(&self, p: Vec3) -> bool {
        p.x.abs() <= self.half_extent && p.z.abs() <= self.half_extent
    }

    /// Remove every body this hole created.
    pub fn teardown(self, world: &mut PhysicsWorld) {
        for id in self.tags.keys() {
            world.remove_body(*id);
        }
    }
}

/// Turns a hole description into world bodies.
pub struct GeometryBuilder<'a> {
    world: &'a mut PhysicsWorld,
    tags: BTreeMap<BodyId, ElementTag>,
}

impl<'a> GeometryBuilder<'a> {
    /// Validate hole `index` of `level` and populate `world` with its bodies.
    /// Nothing is created when validation fails.
    pub fn build(
        world: &'a mut PhysicsWorld,
        level: &Level,
        index: usize,
    ) -> Result<HoleGeometry, LevelError> {
        let hole = level.hole(index)?;
        hole.validate()?;
        let gravity = clamp_gravity(&level.settings, world.config());
        world.set_gravity_y(gravity);

        let mut builder = GeometryBuilder {
            world,
            tags: BTreeMap::new(),
        };
        builder.ground();
        if hole.boundary_wall_count() == 0 {
            builder.boundary(level.settings.level_size);
        }
        for wall in &hole.walls {
            builder.wall(wall);
        }
        for ramp in &hole.ramps {
            builder.ramp(ramp);
        }
        for spinner in &hole.spinners {
            builder.spinner(spinner);
        }
        for pad in &hole.bounce_pads {
            builder.sensor(
                Shape::Cylinder {
                    radius: pad.radius,
                    half_height: PAD_HALF_HEIGHT,
                },
                pad.position.into(),
                Quat::IDENTITY,
                ElementTag::BouncePad {
                    strength: pad.strength,
                },
            );
        }
        for bumper in &hole.bumpers {
            builder.sensor(
                Shape::Cylinder {
                    radius: bumper.radius,
                    half_height: BUMPER_HALF_HEIGHT,
                },
                bumper.position.into(),
                Quat::IDENTITY,
                ElementTag::Bumper {
                    strength: bumper.strength,
                },
            );
        }
        for boost in &hole.speed_boosts {
            builder.speed_boost(boost);
        }
        for lava in &hole.lava {
            builder.lava(lava);
        }
        let mut fans = Vec::with_capacity(hole.fans.len());
        for fan in &hole.fans {
            let position: Vec3 = fan.position.into();
            builder.sensor(
                Shape::Sphere {
                    radius: FAN_HOUSING_RADIUS,
                },
                position,
                Quat::IDENTITY,
                ElementTag::Fan(fans.len()),
            );
            fans.push(FanField {
                position,
                direction: yaw_pitch_direction(fan.rotation_y, fan.rotation_x),
                strength: fan.strength,
            });
        }

        let skipped: Vec<String> = hole.unknown_elements().map(str::to_string).collect();
        for kind in &skipped {
            tracing::warn!(hole = hole.number, kind = %kind, "Skipping unknown element kind");
        }

        let tags = builder.tags;
        tracing::debug!(
            hole = hole.number,
            bodies = tags.len(),
            gravity,
            "Built hole geometry"
        );
        Ok(HoleGeometry {
            number: hole.number,
            par: hole.par,
            start: hole.start_point.into(),
            cup: hole.hole.position(),
            cup_radius: hole.hole.radius(),
            gravity,
            half_extent: level.settings.level_size / 2.0,
            tags,
            fans,
            skipped,
        })
    }

    fn insert(&mut self, body: Body, tag: ElementTag) -> BodyId {
        let id = self.world.add_body(body);
        self.tags.insert(id, tag);
        id
    }

    fn ground(&mut self) {
        self.insert(Body::fixed(Shape::Ground, Material::Ground), ElementTag::Ground);
    }

    /// Four walls just outside the square play area.
    fn boundary(&mut self, level_size: f32) {
        let half = level_size / 2.0;
        let offset = half + BOUNDARY_THICKNESS / 2.0;
        let span = level_size + 2.0 * BOUNDARY_THICKNESS;
        let y = BOUNDARY_HEIGHT / 2.0;
        let walls = [
            (Vec3::new(offset, y, 0.0), Vec3::new(BOUNDARY_THICKNESS, BOUNDARY_HEIGHT, span)),
            (Vec3::new(-offset, y, 0.0), Vec3::new(BOUNDARY_THICKNESS, BOUNDARY_HEIGHT, span)),
            (Vec3::new(0.0, y, offset), Vec3::new(span, BOUNDARY_HEIGHT, BOUNDARY_THICKNESS)),
            (Vec3::new(0.0, y, -offset), Vec3::new(span, BOUNDARY_HEIGHT, BOUNDARY_THICKNESS)),
        ];
        for (center, size) in walls {
            self.insert(
                Body::fixed(
                    Shape::Cuboid {
                        half_extents: size / 2.0,
                    },
                    Material::Wall,
                )
                .with_position(center),
                ElementTag::Wall { boundary: true },
            );
        }
    }

    fn wall(&mut self, wall: &WallDef) {
        let size = wall.size.resolve(WallDef::DEFAULT_HEIGHT);
        self.insert(
            Body::fixed(
                Shape::Cuboid {
                    half_extents: size / 2.0,
                },
                Material::Wall,
            )
            .with_position(wall.position.into())
            .with_rotation(yaw(wall.rotation_y)),
            ElementTag::Wall {
                boundary: wall.boundary,
            },
        );
    }

    fn ramp(&mut self, ramp: &RampDef) {
        let size = ramp.size.resolve(RampDef::DEFAULT_THICKNESS);
        self.insert(
            Body::fixed(
                Shape::Cuboid {
                    half_extents: size / 2.0,
                },
                Material::Ramp,
            )
            .with_position(ramp.position.into())
            .with_rotation(yaw_tilt(ramp.rotation_y, ramp.angle)),
            ElementTag::Ramp,
        );
    }

    fn spinner(&mut self, spinner: &SpinnerDef) {
        let size = spinner.size.resolve(SpinnerDef::DEFAULT_HEIGHT);
        self.insert(
            Body::kinematic(
                Shape::Cuboid {
                    half_extents: size / 2.0,
                },
                Material::Wall,
            )
            .with_position(spinner.position.into())
            .with_angular_velocity(Vec3::new(0.0, spinner.speed, 0.0)),
            ElementTag::Spinner,
        );
    }

    fn speed_boost(&mut self, boost: &SpeedBoostDef) {
        let size = boost
            .size
            .map_or(SpeedBoostDef::DEFAULT_SIZE, |s| {
                s.resolve(SpeedBoostDef::DEFAULT_SIZE.y)
            });
        self.sensor(
            Shape::Cuboid {
                half_extents: size / 2.0,
            },
            boost.position.into(),
            yaw(boost.rotation_y),
            ElementTag::SpeedBoost {
                direction: yaw_direction(boost.rotation_y),
                strength: boost.strength,
            },
        );
    }

    fn lava(&mut self, lava: &LavaDef) {
        let size = lava.size.resolve(LavaDef::DEFAULT_DEPTH);
        self.sensor(
            Shape::Cuboid {
                half_extents: size / 2.0,
            },
            lava.position.into(),
            Quat::IDENTITY,
            ElementTag::Lava,
        );
    }

    fn sensor(&mut self, shape: Shape, position: Vec3, rotation: Quat, tag: ElementTag) {
        self.insert(
            Body::sensor(shape)
                .with_position(position)
                .with_rotation(rotation),
            tag,
        );
    }
}

fn clamp_gravity(settings: &Settings, config: &PhysicsConfig) -> f32 {
    let gravity = settings.gravity;
    let clamped = gravity.clamp(config.min_gravity, config.max_gravity);
    if clamped != gravity {
        tracing::warn!(gravity, clamped, "Level gravity outside allowed range, clamping");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{BouncePadDef, BumperDef, CupDef, Extents, FanDef, HoleDef, Point3};

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(PhysicsConfig::default())
    }

    fn plain_hole() -> HoleDef {
        HoleDef::new(Vec3::new(0.0, 0.0, 20.0), CupDef::new(0.0, -20.0))
    }

    fn count(geometry: &HoleGeometry, pred: impl Fn(ElementTag) -> bool) -> usize {
        geometry.tags().filter(|(_, t)| pred(*t)).count()
    }

    #[test]
    fn empty_hole_gets_ground_and_boundary() {
        let mut w = world();
        let level = Level::single(plain_hole(), Settings::default());
        let geometry = GeometryBuilder::build(&mut w, &level, 0).unwrap();
        assert_eq!(count(&geometry, |t| t == ElementTag::Ground), 1);
        assert_eq!(
            count(&geometry, |t| t == ElementTag::Wall { boundary: true }),
            4
        );
        assert_eq!(w.body_count(), 5);
        assert_eq!(geometry.half_extent, 50.0);
        assert_eq!(w.gravity().y, -30.0);
    }

    #[test]
    fn boundary_walls_enclose_play_area() {
        let mut w = world();
        let settings = Settings {
            level_size: 60.0,
            ..Settings::default()
        };
        let level = Level::single(plain_hole(), settings);
        let geometry = GeometryBuilder::build(&mut w, &level, 0).unwrap();
        let mut inner_faces: Vec<f32> = geometry
            .tags()
            .filter(|(_, t)| *t == ElementTag::Wall { boundary: true })
            .filter_map(|(id, _)| w.body(id))
            .map(|b| {
                let Shape::Cuboid { half_extents } = b.shape else {
                    return f32::NAN;
                };
                let p = b.position;
                if p.x.abs() > p.z.abs() {
                    p.x.abs() - half_extents.x
                } else {
                    p.z.abs() - half_extents.z
                }
            })
            .collect();
        inner_faces.dedup();
        assert_eq!(inner_faces, vec![30.0]);
    }

    #[test]
    fn authored_boundary_suppresses_generated_walls() {
        let mut hole = plain_hole();
        for (x, z) in [(10.0, 0.0), (-10.0, 0.0), (0.0, 10.0), (0.0, -10.0)] {
            hole.walls.push(WallDef {
                position: Point3::new(x, 1.0, z),
                size: Extents::new(1.0, 2.0, 20.0),
                rotation_y: if x == 0.0 { 90.0 } else { 0.0 },
                boundary: true,
            });
        }
        let mut w = world();
        let level = Level::single(hole, Settings::default());
        let geometry = GeometryBuilder::build(&mut w, &level, 0).unwrap();
        assert_eq!(
            count(&geometry, |t| matches!(t, ElementTag::Wall { .. })),
            4
        );
    }

    #[test]
    fn elements_become_tagged_sensors() {
        let mut hole = plain_hole();
        hole.bounce_pads.push(BouncePadDef {
            position: Point3::new(-3.0, 0.0, 0.0),
            strength: 20.0,
            radius: 1.5,
        });
        hole.bumpers.push(BumperDef {
            position: Point3::new(3.0, 0.0, 0.0),
            strength: 15.0,
            radius: 1.0,
        });
        hole.fans.push(FanDef {
            position: Point3::new(0.0, 1.0, 0.0),
            rotation_y: 90.0,
            rotation_x: 0.0,
            strength: 10.0,
        });
        let mut w = world();
        let level = Level::single(hole, Settings::default());
        let geometry = GeometryBuilder::build(&mut w, &level, 0).unwrap();

        for (id, tag) in geometry.tags() {
            let body = w.body(id).unwrap();
            let expect_sensor = matches!(
                tag,
                ElementTag::BouncePad { .. } | ElementTag::Bumper { .. } | ElementTag::Fan(_)
            );
            assert_eq!(body.sensor, expect_sensor, "{tag:?}");
        }
        assert_eq!(geometry.fans().len(), 1);
        assert!((geometry.fans()[0].direction - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn spinner_is_kinematic_solid() {
        let mut hole = plain_hole();
        hole.spinners.push(SpinnerDef {
            position: Point3::new(5.0, 0.5, 5.0),
            size: Extents {
                x: 6.0,
                y: None,
                z: 0.5,
            },
            speed: 1.5,
        });
        let mut w = world();
        let level = Level::single(hole, Settings::default());
        let geometry = GeometryBuilder::build(&mut w, &level, 0).unwrap();
        let (id, _) = geometry
            .tags()
            .find(|(_, t)| *t == ElementTag::Spinner)
            .unwrap();
        let body = w.body(id).unwrap();
        assert!(!body.sensor);
        assert_eq!(body.kind, crate::world::BodyKind::Kinematic);
        assert_eq!(body.angular_velocity.y, 1.5);
    }

    #[test]
    fn invalid_hole_creates_nothing() {
        let mut hole = plain_hole();
        hole.hole.radius = Some(2.0);
        let mut w = world();
        let level = Level::single(hole, Settings::default());
        assert!(matches!(
            GeometryBuilder::build(&mut w, &level, 0),
            Err(LevelError::InvalidHoleRadius { .. })
        ));
        assert_eq!(w.body_count(), 0);
    }

    #[test]
    fn gravity_is_clamped() {
        let mut w = world();
        let settings = Settings {
            gravity: -200.0,
            ..Settings::default()
        };
        let level = Level::single(plain_hole(), settings);
        let geometry = GeometryBuilder::build(&mut w, &level, 0).unwrap();
        assert_eq!(geometry.gravity, -50.0);
        assert_eq!(w.gravity().y, -50.0);
    }

    #[test]
    fn unknown_kinds_are_skipped() {
        let mut hole = plain_hole();
        hole.extra
            .insert("windmills".to_string(), serde_json::json!([{}]));
        let mut w = world();
        let level = Level::single(hole, Settings::default());
        let geometry = GeometryBuilder::build(&mut w, &level, 0).unwrap();
        assert_eq!(geometry.skipped(), ["windmills".to_string()]);
    }

    #[test]
    fn teardown_removes_every_body() {
        let mut w = world();
        let keep = w.add_body(Body::ball(0.5, 1.0));
        let level = Level::single(plain_hole(), Settings::default());
        let geometry = GeometryBuilder::build(&mut w, &level, 0).unwrap();
        geometry.teardown(&mut w);
        assert_eq!(w.body_count(), 1);
        assert!(w.body(keep).is_some());
    }

    fn ramp_world(position: Point3, size: Extents, angle: f32) -> (PhysicsWorld, BodyId) {
        let mut hole = plain_hole();
        hole.ramps.push(RampDef {
            position,
            size,
            rotation_y: 0.0,
            angle,
        });
        let mut w = world();
        let level = Level::single(hole, Settings::default());
        let geometry = GeometryBuilder::build(&mut w, &level, 0).unwrap();
        let (ramp, _) = geometry
            .tags()
            .find(|(_, t)| *t == ElementTag::Ramp)
            .unwrap();
        assert_eq!(w.body(ramp).unwrap().material, Material::Ramp);
        (w, ramp)
    }

    #[test]
    fn ball_sliding_on_ramp_feels_ramp_friction() {
        // Flat ramp with its top face at y = 0.6, clear of the ground.
        let (mut w, _) = ramp_world(
            Point3::new(0.0, 0.5, 0.0),
            Extents::new(6.0, 0.2, 6.0),
            0.0,
        );
        let ball = w.add_body(Body::ball(0.5, 1.0).with_position(Vec3::new(0.0, 1.1, 0.0)));
        w.set_linear_velocity(ball, Vec3::new(5.0, 0.0, 0.0));
        w.step(1.0 / 60.0);
        // One step of sliding: friction * gravity * dt plus rolling resistance.
        // Ramp friction 0.8 gives about 0.42, ground friction 0.6 would give 0.32.
        let lost = 5.0 - w.body(ball).unwrap().linear_velocity.x;
        assert!((lost - 0.42).abs() < 0.03, "lost={lost}");
    }

    #[test]
    fn ball_dropped_on_tilted_ramp_barely_bounces() {
        let (mut w, ramp) = ramp_world(
            Point3::new(0.0, 1.0, 0.0),
            Extents::new(8.0, 0.2, 6.0),
            20.0,
        );
        let ball = w.add_body(Body::ball(0.5, 1.0).with_position(Vec3::new(0.0, 3.0, 0.0)));
        let dt = 1.0 / 60.0;
        let gravity_step = w.gravity() * dt;

        let mut bounce = None;
        for _ in 0..120 {
            let before = w.body(ball).unwrap().linear_velocity;
            w.step(dt);
            let touched = w
                .contacts_since(w.current_step())
                .find(|c| c.a == ball && c.b == ramp)
                .cloned();
            if let Some(contact) = touched {
                let after = w.body(ball).unwrap().linear_velocity;
                bounce = Some((contact.normal, before + gravity_step, after));
                break;
            }
        }

        let (normal, incoming, outgoing) = bounce.expect("ball never reached the ramp");
        assert!(normal.y > 0.9 && normal.y < 0.95, "normal={normal:?}");
        let approach = -incoming.dot(normal);
        let rebound = outgoing.dot(normal);
        assert!(approach > 5.0, "approach={approach}");
        // Ramp restitution is 0.1; ground would return half the approach.
        assert!(rebound >= 0.0 && rebound < 0.15 * approach, "rebound={rebound}");
    }
}
