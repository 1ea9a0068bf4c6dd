use glam::{Quat, Vec3};

/// Rotation about +Y by `degrees`.
pub fn yaw(degrees: f32) -> Quat {
    Quat::from_rotation_y(degrees.to_radians())
}

/// Yaw about Y, then tilt about the body's own Z axis.
pub fn yaw_tilt(yaw_degrees: f32, tilt_degrees: f32) -> Quat {
    yaw(yaw_degrees) * Quat::from_rotation_z(tilt_degrees.to_radians())
}

/// Forward (−Z) direction after a yaw of `degrees`: `(−sin θ, 0, −cos θ)`.
pub fn yaw_direction(degrees: f32) -> Vec3 {
    let (s, c) = degrees.to_radians().sin_cos();
    Vec3::new(-s, 0.0, -c)
}

/// Forward (−Z) direction after yaw about Y then pitch about the local X axis.
pub fn yaw_pitch_direction(yaw_degrees: f32, pitch_degrees: f32) -> Vec3 {
    let rotation = yaw(yaw_degrees) * Quat::from_rotation_x(pitch_degrees.to_radians());
    (rotation * Vec3::NEG_Z).normalize_or_zero()
}

/// The XZ components of `v`.
pub fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

pub fn horizontal_speed(v: Vec3) -> f32 {
    v.x.hypot(v.z)
}

/// Distance between `a` and `b` ignoring height.
pub fn distance_xz(a: Vec3, b: Vec3) -> f32 {
    (a.x - b.x).hypot(a.z - b.z)
}

/// Reflect `v` across the plane with unit normal `n`.
pub fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn yaw_direction_matches_rotated_forward() {
        for deg in [0.0, 45.0, 90.0, 180.0, 270.0, -30.0] {
            assert!(approx(yaw_direction(deg), yaw(deg) * Vec3::NEG_Z), "deg={deg}");
        }
    }

    #[test]
    fn zero_yaw_points_down_negative_z() {
        assert!(approx(yaw_direction(0.0), Vec3::NEG_Z));
        assert!(approx(yaw_direction(90.0), Vec3::NEG_X));
    }

    #[test]
    fn pitch_raises_fan_direction() {
        let dir = yaw_pitch_direction(0.0, 90.0);
        assert!(approx(dir, Vec3::Y), "dir={dir:?}");
        let flat = yaw_pitch_direction(90.0, 0.0);
        assert!(approx(flat, Vec3::NEG_X));
    }

    #[test]
    fn tilt_is_applied_in_body_frame() {
        let r = yaw_tilt(90.0, 30.0);
        // Local +X of a yawed ramp points along world −Z before tilting.
        let up = r * Vec3::Y;
        assert!(up.y < 1.0 && up.y > 0.8);
        assert!(up.z.abs() > 0.4, "tilt should lean along world z, up={up:?}");
    }

    #[test]
    fn reflect_flips_normal_component() {
        let v = Vec3::new(10.0, 0.0, 3.0);
        let r = reflect(v, Vec3::NEG_X);
        assert!(approx(r, Vec3::new(-10.0, 0.0, 3.0)));
    }
}
