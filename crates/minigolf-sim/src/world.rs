use std::collections::{BTreeMap, BTreeSet};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::PhysicsConfig;

/// Collision group every body starts in.
pub const DEFAULT_GROUP: u32 = 1;
/// Mask that collides with every group.
pub const ALL_GROUPS: u32 = u32::MAX;

/// Contact log entries older than this many steps are discarded.
const CONTACT_LOG_STEPS: u64 = 120;
const EPSILON: f32 = 1e-6;

/// Handle to a body owned by a [`PhysicsWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    /// Moved by gravity, forces and contacts.
    Dynamic,
    /// Never moves.
    Static,
    /// Moved by its own velocities; pushes dynamic bodies but is never pushed.
    Kinematic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere { radius: f32 },
    Cuboid { half_extents: Vec3 },
    /// Upright cylinder along the body's local Y axis.
    Cylinder { radius: f32, half_height: f32 },
    /// Half-space below the body's Y position.
    Ground,
}

/// Surface materials. Contact parameters are looked up per material pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Material {
    Ground,
    Ball,
    Wall,
    Ramp,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactParams {
    pub friction: f32,
    pub restitution: f32,
}

impl ContactParams {
    pub const fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction,
            restitution,
        }
    }
}

/// Pairwise contact parameters keyed by unordered material pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactTable {
    pairs: BTreeMap<(Material, Material), ContactParams>,
    fallback: ContactParams,
}

impl ContactTable {
    pub fn from_config(config: &PhysicsConfig) -> Self {
        let mut table = Self {
            pairs: BTreeMap::new(),
            fallback: ContactParams::new(0.3, 0.3),
        };
        table.set(
            Material::Ball,
            Material::Ground,
            ContactParams::new(config.ground_friction, config.ground_restitution),
        );
        table.set(
            Material::Ball,
            Material::Wall,
            ContactParams::new(config.wall_friction, config.wall_restitution),
        );
        table.set(
            Material::Ball,
            Material::Ramp,
            ContactParams::new(config.ramp_friction, config.ramp_restitution),
        );
        table.set(
            Material::Ball,
            Material::Ball,
            ContactParams::new(config.ball_friction, config.ball_restitution),
        );
        table
    }

    fn key(a: Material, b: Material) -> (Material, Material) {
        if a <= b { (a, b) } else { (b, a) }
    }

    pub fn get(&self, a: Material, b: Material) -> ContactParams {
        self.pairs
            .get(&Self::key(a, b))
            .copied()
            .unwrap_or(self.fallback)
    }

    pub fn set(&mut self, a: Material, b: Material, params: ContactParams) {
        self.pairs.insert(Self::key(a, b), params);
    }

    /// Multiply the restitution of every pair accepted by `filter`.
    pub fn scale_restitution(
        &mut self,
        factor: f32,
        filter: impl Fn(Material, Material) -> bool,
    ) {
        for (&(a, b), params) in self.pairs.iter_mut() {
            if filter(a, b) {
                params.restitution *= factor;
            }
        }
    }
}

/// A rigid body. Only spheres are simulated dynamically; every other shape
/// is static, kinematic, or a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub kind: BodyKind,
    pub shape: Shape,
    pub material: Material,
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub inv_mass: f32,
    /// Inverse of the (isotropic) moment of inertia. Zero for non-spheres.
    pub inv_inertia: f32,
    /// Sensors report overlaps but exert no contact response.
    pub sensor: bool,
    pub group: u32,
    pub mask: u32,
    pub sleeping: bool,
    force: Vec3,
    rest_time: f32,
}

impl Body {
    fn base(kind: BodyKind, shape: Shape, material: Material) -> Self {
        Self {
            kind,
            shape,
            material,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            inv_mass: 0.0,
            inv_inertia: 0.0,
            sensor: false,
            group: DEFAULT_GROUP,
            mask: ALL_GROUPS,
            sleeping: false,
            force: Vec3::ZERO,
            rest_time: 0.0,
        }
    }

    pub fn ball(radius: f32, mass: f32) -> Self {
        let mut body = Self::base(BodyKind::Dynamic, Shape::Sphere { radius }, Material::Ball);
        if mass > 0.0 {
            body.inv_mass = 1.0 / mass;
            // Solid sphere: I = 2/5 m r^2.
            let inertia = 0.4 * mass * radius * radius;
            body.inv_inertia = if inertia > 0.0 { 1.0 / inertia } else { 0.0 };
        }
        body
    }

    pub fn fixed(shape: Shape, material: Material) -> Self {
        Self::base(BodyKind::Static, shape, material)
    }

    pub fn kinematic(shape: Shape, material: Material) -> Self {
        Self::base(BodyKind::Kinematic, shape, material)
    }

    pub fn sensor(shape: Shape) -> Self {
        let mut body = Self::base(BodyKind::Static, shape, Material::Ground);
        body.sensor = true;
        body
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == BodyKind::Dynamic
    }

    pub fn mass(&self) -> f32 {
        if self.inv_mass > 0.0 {
            1.0 / self.inv_mass
        } else {
            0.0
        }
    }

    /// Velocity of a point on this body, including rotation.
    pub fn point_velocity(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.position)
    }

    fn wake(&mut self) {
        self.sleeping = false;
        self.rest_time = 0.0;
    }

    fn collides_with(&self, other: &Body) -> bool {
        (self.group & other.mask) != 0 && (other.group & self.mask) != 0
    }
}

/// A new touch between a dynamic body (`a`) and another body (`b`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactEvent {
    pub step: u64,
    pub a: BodyId,
    pub b: BodyId,
    pub sensor: bool,
    /// Unit normal pointing from `b` toward `a`.
    pub normal: Vec3,
    /// Speed of `a` when the touch began, before contact response.
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyId,
    pub point: Vec3,
    pub normal: Vec3,
    /// Fraction of the segment travelled before the hit.
    pub fraction: f32,
}

/// Which bodies a ray may hit. Sensors never stop rays.
#[derive(Debug, Clone, Copy)]
pub struct RayFilter {
    pub mask: u32,
    pub exclude: Option<BodyId>,
    /// Skip dynamic bodies (only static and kinematic geometry).
    pub fixed_only: bool,
}

impl RayFilter {
    pub fn new(mask: u32) -> Self {
        Self {
            mask,
            exclude: None,
            fixed_only: false,
        }
    }

    pub fn excluding(mut self, id: BodyId) -> Self {
        self.exclude = Some(id);
        self
    }

    pub fn fixed_only(mut self) -> Self {
        self.fixed_only = true;
        self
    }
}

/// Overlap between a sphere and a shape.
#[derive(Debug, Clone, Copy)]
struct Penetration {
    /// Unit normal pointing from the shape toward the sphere centre.
    normal: Vec3,
    depth: f32,
    point: Vec3,
}

#[derive(Debug, Clone)]
struct Manifold {
    a: BodyId,
    b: BodyId,
    normal: Vec3,
    point: Vec3,
    params: ContactParams,
    target_normal_velocity: f32,
    normal_impulse: f32,
    friction_impulse: f32,
}

/// Owns every rigid body and advances them with a fixed-step
/// sequential-impulse solver.
pub struct PhysicsWorld {
    config: PhysicsConfig,
    bodies: BTreeMap<BodyId, Body>,
    next_id: u32,
    gravity: Vec3,
    contacts: ContactTable,
    default_contacts: ContactTable,
    step_index: u64,
    touching: BTreeSet<(BodyId, BodyId)>,
    contact_log: Vec<ContactEvent>,
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Self {
        let contacts = ContactTable::from_config(&config);
        Self {
            gravity: Vec3::new(0.0, config.default_gravity, 0.0),
            default_contacts: contacts.clone(),
            contacts,
            config,
            bodies: BTreeMap::new(),
            next_id: 0,
            step_index: 0,
            touching: BTreeSet::new(),
            contact_log: Vec::new(),
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn add_body(&mut self, body: Body) -> BodyId {
        let id = BodyId(self.next_id);
        self.next_id += 1;
        self.bodies.insert(id, body);
        id
    }

    pub fn remove_body(&mut self, id: BodyId) -> Option<Body> {
        self.touching.retain(|&(a, b)| a != id && b != id);
        self.bodies.remove(&id)
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Body)> {
        self.bodies.iter().map(|(&id, body)| (id, body))
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity_y(&mut self, y: f32) {
        if self.gravity.y != y {
            self.gravity.y = y;
            self.wake_all();
        }
    }

    pub fn current_step(&self) -> u64 {
        self.step_index
    }

    // ---- Contact parameters ----

    pub fn contact_params(&self, a: Material, b: Material) -> ContactParams {
        self.contacts.get(a, b)
    }

    pub fn default_contact_params(&self, a: Material, b: Material) -> ContactParams {
        self.default_contacts.get(a, b)
    }

    pub fn set_contact_params(&mut self, a: Material, b: Material, params: ContactParams) {
        self.contacts.set(a, b, params);
    }

    /// Replace the defaults restored by [`Self::restore_default_contacts`].
    pub fn set_default_contact_params(&mut self, a: Material, b: Material, params: ContactParams) {
        self.default_contacts.set(a, b, params);
        self.contacts.set(a, b, params);
    }

    pub fn restore_default_contacts(&mut self) {
        self.contacts = self.default_contacts.clone();
    }

    pub fn scale_restitution(&mut self, a: Material, b: Material, factor: f32) {
        let key = ContactTable::key(a, b);
        self.contacts
            .scale_restitution(factor, |x, y| (x, y) == key);
    }

    /// Scale restitution of every pair that involves a ball.
    pub fn scale_ball_restitution(&mut self, factor: f32) {
        self.contacts
            .scale_restitution(factor, |x, y| x == Material::Ball || y == Material::Ball);
    }

    // ---- Body mutation (all of these wake the body) ----

    pub fn teleport(&mut self, id: BodyId, position: Vec3) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.position = position;
            body.linear_velocity = Vec3::ZERO;
            body.angular_velocity = Vec3::ZERO;
            body.force = Vec3::ZERO;
            body.wake();
        }
        self.touching.retain(|&(a, b)| a != id && b != id);
    }

    pub fn set_linear_velocity(&mut self, id: BodyId, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.linear_velocity = velocity;
            body.wake();
        }
    }

    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vec3) {
        if let Some(body) = self.bodies.get_mut(&id)
            && body.is_dynamic()
        {
            body.linear_velocity += impulse * body.inv_mass;
            body.wake();
        }
    }

    pub fn apply_force(&mut self, id: BodyId, force: Vec3) {
        if let Some(body) = self.bodies.get_mut(&id)
            && body.is_dynamic()
        {
            body.force += force;
            body.wake();
        }
    }

    pub fn set_filter(&mut self, id: BodyId, group: u32, mask: u32) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.group = group;
            body.mask = mask;
            body.wake();
        }
    }

    pub fn wake_all(&mut self) {
        for body in self.bodies.values_mut() {
            body.wake();
        }
    }

    // ---- Queries ----

    /// Begin-contact events recorded at or after `step`.
    pub fn contacts_since(&self, step: u64) -> impl Iterator<Item = &ContactEvent> {
        self.contact_log.iter().filter(move |c| c.step >= step)
    }

    /// First hit along the segment `from → to`.
    pub fn raycast_first(&self, from: Vec3, to: Vec3, filter: &RayFilter) -> Option<RayHit> {
        let delta = to - from;
        let mut best: Option<RayHit> = None;
        for (&id, body) in &self.bodies {
            if body.sensor
                || Some(id) == filter.exclude
                || (body.group & filter.mask) == 0
                || (filter.fixed_only && body.is_dynamic())
            {
                continue;
            }
            if let Some((t, normal)) = ray_shape(from, delta, body)
                && best.is_none_or(|b| t < b.fraction)
            {
                best = Some(RayHit {
                    body: id,
                    point: from + delta * t,
                    normal,
                    fraction: t,
                });
            }
        }
        best
    }

    /// Whether a sphere at `center` would overlap any solid body other than `exclude`.
    pub fn sphere_overlaps_solid(&self, center: Vec3, radius: f32, exclude: Option<BodyId>) -> bool {
        self.bodies.iter().any(|(&id, body)| {
            Some(id) != exclude
                && !body.sensor
                && body.shape != Shape::Ground
                && sphere_penetration(center, radius, body)
                    .is_some_and(|p| p.depth > self.config.solver_tolerance)
        })
    }

    // ---- Stepping ----

    /// Advance every body by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        self.step_index += 1;
        self.integrate(dt);
        let (mut manifolds, sensor_pairs) = self.detect();
        let pre_solve_speeds: BTreeMap<BodyId, f32> = manifolds
            .iter()
            .map(|m| m.a)
            .chain(sensor_pairs.iter().map(|p| p.0))
            .filter_map(|id| self.bodies.get(&id).map(|b| (id, b.linear_velocity.length())))
            .collect();
        self.solve_velocities(&mut manifolds);
        self.solve_positions(&manifolds);
        self.update_rolling_and_sleep(&manifolds, dt);
        self.record_contacts(&manifolds, &sensor_pairs, &pre_solve_speeds);
    }

    fn integrate(&mut self, dt: f32) {
        let gravity = self.gravity;
        for body in self.bodies.values_mut() {
            match body.kind {
                BodyKind::Dynamic => {
                    if body.sleeping {
                        continue;
                    }
                    body.linear_velocity += (gravity + body.force * body.inv_mass) * dt;
                    body.force = Vec3::ZERO;
                    body.position += body.linear_velocity * dt;
                },
                BodyKind::Kinematic => {
                    body.position += body.linear_velocity * dt;
                    if body.angular_velocity != Vec3::ZERO {
                        body.rotation = (Quat::from_scaled_axis(body.angular_velocity * dt)
                            * body.rotation)
                            .normalize();
                    }
                },
                BodyKind::Static => {},
            }
        }
    }

    fn detect(&mut self) -> (Vec<Manifold>, Vec<(BodyId, BodyId, Vec3)>) {
        let mut manifolds = Vec::new();
        let mut sensors = Vec::new();
        let mut woken = Vec::new();
        let threshold = self.config.restitution_threshold;

        for (&id, a) in &self.bodies {
            let Shape::Sphere { radius } = a.shape else {
                continue;
            };
            if !a.is_dynamic() {
                continue;
            }
            for (&other_id, other) in &self.bodies {
                if other_id == id || !a.collides_with(other) {
                    continue;
                }
                if a.sleeping {
                    // Sleeping balls are only disturbed by moving bodies.
                    let moving = other.kind == BodyKind::Kinematic
                        || (other.is_dynamic() && !other.sleeping);
                    if !moving || other.sensor {
                        continue;
                    }
                }
                // Ball pairs are resolved once, from the lower id.
                if other.is_dynamic() && (other_id < id || (a.sleeping && other.sleeping)) {
                    continue;
                }
                let Some(pen) = sphere_penetration(a.position, radius, other) else {
                    continue;
                };
                if a.sensor || other.sensor {
                    sensors.push((id, other_id, pen.normal));
                    continue;
                }
                if a.sleeping {
                    woken.push(id);
                }
                if other.is_dynamic() && other.sleeping {
                    woken.push(other_id);
                }
                let params = self.contacts.get(a.material, other.material);
                let relative = a.linear_velocity - other.point_velocity(pen.point);
                let approach = relative.dot(pen.normal);
                let target_normal_velocity = if approach < -threshold {
                    -params.restitution * approach
                } else {
                    0.0
                };
                manifolds.push(Manifold {
                    a: id,
                    b: other_id,
                    normal: pen.normal,
                    point: pen.point,
                    params,
                    target_normal_velocity,
                    normal_impulse: 0.0,
                    friction_impulse: 0.0,
                });
            }
        }
        for id in woken {
            if let Some(body) = self.bodies.get_mut(&id) {
                body.wake();
            }
        }
        (manifolds, sensors)
    }

    fn solve_velocities(&mut self, manifolds: &mut [Manifold]) {
        for _ in 0..self.config.solver_iterations {
            let mut largest = 0.0f32;
            for m in manifolds.iter_mut() {
                let (Some(a), Some(b)) = (self.bodies.get(&m.a), self.bodies.get(&m.b)) else {
                    continue;
                };
                let b_dynamic = b.is_dynamic();
                let inv_a = a.inv_mass;
                let inv_b = if b_dynamic { b.inv_mass } else { 0.0 };
                let w = inv_a + inv_b;
                if w <= 0.0 {
                    continue;
                }
                let inv_ia = a.inv_inertia;
                let inv_ib = if b_dynamic { b.inv_inertia } else { 0.0 };
                let ra = m.point - a.position;
                let rb = m.point - b.position;
                let mut va = a.linear_velocity;
                let mut wa = a.angular_velocity;
                let mut vb = b.linear_velocity;
                let mut wb = b.angular_velocity;

                // Normal. Sphere contact arms are parallel to the normal, so
                // spin does not enter this row.
                let vn = (va + wa.cross(ra) - vb - wb.cross(rb)).dot(m.normal);
                let previous = m.normal_impulse;
                m.normal_impulse = (previous + (m.target_normal_velocity - vn) / w).max(0.0);
                let jn = m.normal_impulse - previous;
                va += m.normal * jn * inv_a;
                vb -= m.normal * jn * inv_b;

                // Friction at the contact point. A ball already rolling has
                // no slip here and feels none.
                let relative = va + wa.cross(ra) - vb - wb.cross(rb);
                let tangent = relative - m.normal * relative.dot(m.normal);
                let tangent_speed = tangent.length();
                let mut jt = 0.0;
                if tangent_speed > EPSILON {
                    let dir = tangent / tangent_speed;
                    let arm_a = ra.cross(dir);
                    let arm_b = rb.cross(dir);
                    let wt = w + inv_ia * arm_a.length_squared() + inv_ib * arm_b.length_squared();
                    let budget = (m.params.friction * m.normal_impulse - m.friction_impulse).max(0.0);
                    jt = (tangent_speed / wt).min(budget);
                    va -= dir * jt * inv_a;
                    wa -= arm_a * jt * inv_ia;
                    vb += dir * jt * inv_b;
                    wb += arm_b * jt * inv_ib;
                    m.friction_impulse += jt;
                }

                largest = largest.max(jn.abs()).max(jt);
                if let Some(a) = self.bodies.get_mut(&m.a) {
                    a.linear_velocity = va;
                    a.angular_velocity = wa;
                }
                if b_dynamic && let Some(b) = self.bodies.get_mut(&m.b) {
                    b.linear_velocity = vb;
                    b.angular_velocity = wb;
                }
            }
            if largest < self.config.solver_tolerance {
                break;
            }
        }
    }

    fn solve_positions(&mut self, manifolds: &[Manifold]) {
        let tolerance = self.config.solver_tolerance;
        for _ in 0..self.config.solver_iterations {
            let mut deepest = 0.0f32;
            for m in manifolds {
                let (Some(a), Some(b)) = (self.bodies.get(&m.a), self.bodies.get(&m.b)) else {
                    continue;
                };
                let Shape::Sphere { radius } = a.shape else {
                    continue;
                };
                let Some(pen) = sphere_penetration(a.position, radius, b) else {
                    continue;
                };
                if pen.depth <= tolerance {
                    continue;
                }
                deepest = deepest.max(pen.depth);
                let inv_a = a.inv_mass;
                let inv_b = if b.is_dynamic() { b.inv_mass } else { 0.0 };
                let w = inv_a + inv_b;
                if w <= 0.0 {
                    continue;
                }
                let push = pen.normal * pen.depth;
                if let Some(a) = self.bodies.get_mut(&m.a) {
                    a.position += push * (inv_a / w);
                }
                if inv_b > 0.0
                    && let Some(b) = self.bodies.get_mut(&m.b)
                {
                    b.position -= push * (inv_b / w);
                }
            }
            if deepest <= tolerance {
                break;
            }
        }
    }

    /// Rolling resistance for supported balls, then sleep bookkeeping and
    /// orientation integration.
    fn update_rolling_and_sleep(&mut self, manifolds: &[Manifold], dt: f32) {
        let mut support: BTreeMap<BodyId, Vec3> = BTreeMap::new();
        for m in manifolds.iter().filter(|m| m.normal.y > 0.5) {
            support
                .entry(m.a)
                .and_modify(|n| {
                    if m.normal.y > n.y {
                        *n = m.normal;
                    }
                })
                .or_insert(m.normal);
        }
        let drop = self.config.rolling_resistance * self.gravity.length() * dt;
        let sleep_speed = self.config.sleep_speed;
        let sleep_delay = self.config.sleep_delay;
        for (id, body) in self.bodies.iter_mut() {
            if !body.is_dynamic() || body.sleeping {
                continue;
            }
            let Some(&normal) = support.get(id) else {
                body.rest_time = 0.0;
                integrate_rotation(body, dt);
                continue;
            };

            let v = body.linear_velocity;
            let tangent = v - normal * v.dot(normal);
            let speed = tangent.length();
            if speed <= drop {
                body.linear_velocity -= tangent;
                body.angular_velocity = Vec3::ZERO;
            } else {
                let keep = (speed - drop) / speed;
                body.linear_velocity -= tangent * (1.0 - keep);
                body.angular_velocity *= keep;
            }

            if body.linear_velocity.length() < sleep_speed {
                body.rest_time += dt;
                if body.rest_time >= sleep_delay {
                    body.sleeping = true;
                    body.linear_velocity = Vec3::ZERO;
                    body.angular_velocity = Vec3::ZERO;
                }
            } else {
                body.rest_time = 0.0;
            }
            integrate_rotation(body, dt);
        }
    }

    fn record_contacts(
        &mut self,
        manifolds: &[Manifold],
        sensors: &[(BodyId, BodyId, Vec3)],
        speeds: &BTreeMap<BodyId, f32>,
    ) {
        let step = self.step_index;
        let mut now_touching = BTreeSet::new();
        let pairs = manifolds
            .iter()
            .map(|m| (m.a, m.b, m.normal, false))
            .chain(sensors.iter().map(|&(a, b, n)| (a, b, n, true)));
        for (a, b, normal, sensor) in pairs {
            let key = (a, b);
            if !self.touching.contains(&key) && !now_touching.contains(&key) {
                self.contact_log.push(ContactEvent {
                    step,
                    a,
                    b,
                    sensor,
                    normal,
                    speed: speeds.get(&a).copied().unwrap_or(0.0),
                });
            }
            now_touching.insert(key);
        }
        // Sleeping bodies skip detection; keep their resting contacts alive.
        let asleep: BTreeSet<BodyId> = self
            .bodies
            .iter()
            .filter(|(_, b)| b.sleeping)
            .map(|(&id, _)| id)
            .collect();
        for &(a, b) in &self.touching {
            if asleep.contains(&a) {
                now_touching.insert((a, b));
            }
        }
        self.touching = now_touching;
        self.contact_log
            .retain(|c| c.step + CONTACT_LOG_STEPS > step);
    }
}

fn integrate_rotation(body: &mut Body, dt: f32) {
    if body.angular_velocity != Vec3::ZERO {
        body.rotation =
            (Quat::from_scaled_axis(body.angular_velocity * dt) * body.rotation).normalize();
    }
}

// ---- Narrow phase ----

fn sphere_penetration(center: Vec3, radius: f32, other: &Body) -> Option<Penetration> {
    match other.shape {
        Shape::Sphere { radius: other_radius } => {
            let d = center - other.position;
            let dist = d.length();
            let reach = radius + other_radius;
            if dist >= reach {
                return None;
            }
            let normal = if dist > EPSILON { d / dist } else { Vec3::Y };
            Some(Penetration {
                normal,
                depth: reach - dist,
                point: other.position + normal * other_radius,
            })
        },
        Shape::Cuboid { half_extents } => {
            let inv = other.rotation.inverse();
            let local = inv * (center - other.position);
            let closest = local.clamp(-half_extents, half_extents);
            let d = local - closest;
            let dist = d.length();
            let (normal_local, depth, point_local) = if dist > EPSILON {
                if dist >= radius {
                    return None;
                }
                (d / dist, radius - dist, closest)
            } else {
                // Centre inside the box: leave through the nearest face.
                let face = half_extents - local.abs();
                let axis = if face.x <= face.y && face.x <= face.z {
                    Vec3::X * local.x.signum()
                } else if face.y <= face.z {
                    Vec3::Y * local.y.signum()
                } else {
                    Vec3::Z * local.z.signum()
                };
                let face_depth = face.min_element();
                (axis, radius + face_depth, local + axis * face_depth)
            };
            Some(Penetration {
                normal: other.rotation * normal_local,
                depth,
                point: other.position + other.rotation * point_local,
            })
        },
        Shape::Cylinder {
            radius: cyl_radius,
            half_height,
        } => {
            let inv = other.rotation.inverse();
            let local = inv * (center - other.position);
            let radial = Vec3::new(local.x, 0.0, local.z);
            let radial_len = radial.length();
            let inside_radial = radial_len <= cyl_radius;
            let inside_height = local.y.abs() <= half_height;
            let (normal_local, depth, point_local) = if inside_radial && inside_height {
                let side = cyl_radius - radial_len;
                let cap = half_height - local.y.abs();
                if side < cap {
                    let n = if radial_len > EPSILON {
                        radial / radial_len
                    } else {
                        Vec3::X
                    };
                    (n, radius + side, local + n * side)
                } else {
                    let n = Vec3::Y * local.y.signum();
                    (n, radius + cap, local + n * cap)
                }
            } else {
                let clamped_radial = if inside_radial {
                    radial
                } else {
                    radial * (cyl_radius / radial_len)
                };
                let closest = Vec3::new(
                    clamped_radial.x,
                    local.y.clamp(-half_height, half_height),
                    clamped_radial.z,
                );
                let d = local - closest;
                let dist = d.length();
                if dist >= radius || dist <= EPSILON {
                    return None;
                }
                (d / dist, radius - dist, closest)
            };
            Some(Penetration {
                normal: other.rotation * normal_local,
                depth,
                point: other.position + other.rotation * point_local,
            })
        },
        Shape::Ground => {
            let height = center.y - other.position.y;
            if height >= radius {
                return None;
            }
            Some(Penetration {
                normal: Vec3::Y,
                depth: radius - height,
                point: Vec3::new(center.x, other.position.y, center.z),
            })
        },
    }
}

/// Entry fraction and surface normal of a segment `origin + t * delta`, `t ∈ [0, 1]`.
fn ray_shape(origin: Vec3, delta: Vec3, body: &Body) -> Option<(f32, Vec3)> {
    match body.shape {
        Shape::Sphere { radius } => {
            let m = origin - body.position;
            let a = delta.dot(delta);
            if a <= EPSILON {
                return None;
            }
            let b = m.dot(delta);
            let c = m.dot(m) - radius * radius;
            if c <= 0.0 {
                return None;
            }
            let disc = b * b - a * c;
            if disc < 0.0 {
                return None;
            }
            let t = (-b - disc.sqrt()) / a;
            if !(0.0..=1.0).contains(&t) {
                return None;
            }
            let normal = (origin + delta * t - body.position).normalize_or_zero();
            Some((t, normal))
        },
        Shape::Cuboid { half_extents } => {
            let inv = body.rotation.inverse();
            let o = inv * (origin - body.position);
            let d = inv * delta;
            let mut t_enter = f32::NEG_INFINITY;
            let mut t_exit = f32::INFINITY;
            let mut enter_normal = Vec3::ZERO;
            for axis in 0..3 {
                let (oa, da, ha) = (o[axis], d[axis], half_extents[axis]);
                if da.abs() < EPSILON {
                    if oa < -ha || oa > ha {
                        return None;
                    }
                    continue;
                }
                let mut t0 = (-ha - oa) / da;
                let mut t1 = (ha - oa) / da;
                let mut sign = -1.0;
                if t0 > t1 {
                    std::mem::swap(&mut t0, &mut t1);
                    sign = 1.0;
                }
                if t0 > t_enter {
                    t_enter = t0;
                    enter_normal = Vec3::ZERO;
                    enter_normal[axis] = sign;
                }
                t_exit = t_exit.min(t1);
                if t_enter > t_exit {
                    return None;
                }
            }
            // Rays starting inside a box do not report it.
            if t_enter < 0.0 || t_enter > 1.0 {
                return None;
            }
            Some((t_enter, body.rotation * enter_normal))
        },
        Shape::Cylinder {
            radius,
            half_height,
        } => {
            let inv = body.rotation.inverse();
            let o = inv * (origin - body.position);
            let d = inv * delta;
            let mut best: Option<(f32, Vec3)> = None;
            // Side wall
            let a = d.x * d.x + d.z * d.z;
            if a > EPSILON {
                let b = o.x * d.x + o.z * d.z;
                let c = o.x * o.x + o.z * o.z - radius * radius;
                let disc = b * b - a * c;
                if c > 0.0 && disc >= 0.0 {
                    let t = (-b - disc.sqrt()) / a;
                    let p = o + d * t;
                    if (0.0..=1.0).contains(&t) && p.y.abs() <= half_height {
                        best = Some((t, Vec3::new(p.x, 0.0, p.z).normalize_or_zero()));
                    }
                }
            }
            // Caps
            if d.y.abs() > EPSILON {
                for cap in [half_height, -half_height] {
                    let outside = if cap > 0.0 { o.y > cap } else { o.y < cap };
                    if !outside {
                        continue;
                    }
                    let t = (cap - o.y) / d.y;
                    let p = o + d * t;
                    if (0.0..=1.0).contains(&t)
                        && p.x * p.x + p.z * p.z <= radius * radius
                        && best.is_none_or(|(bt, _)| t < bt)
                    {
                        best = Some((t, Vec3::Y * cap.signum()));
                    }
                }
            }
            best.map(|(t, n)| (t, body.rotation * n))
        },
        Shape::Ground => {
            let top = body.position.y;
            if origin.y < top || delta.y >= 0.0 {
                return None;
            }
            let t = (top - origin.y) / delta.y;
            if t > 1.0 {
                return None;
            }
            Some((t, Vec3::Y))
        },
    }
}
