//! Geometry and movement helpers (Z-up, yaw in radians from +X towards +Y)

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Gravity acceleration (units/s^2)
pub const GRAVITY_Z: f32 = -980.0;

/// Axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl Aabb {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents: half_extents.abs(),
        }
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.half_extents
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.half_extents
    }

    /// Grow the box on every side
    pub fn expanded(&self, amount: f32) -> Self {
        Self::new(self.center, self.half_extents + Vec3::splat(amount.max(0.0)))
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        let d = (point - self.center).abs();
        d.x <= self.half_extents.x && d.y <= self.half_extents.y && d.z <= self.half_extents.z
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min(), self.max())
    }

    /// Distance along a normalized ray to the first contact, within `max_distance`.
    /// A ray starting inside the box hits at distance 0.
    pub fn ray_intersect(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32> {
        let min = self.min();
        let max = self.max();
        let mut t_enter = 0.0_f32;
        let mut t_exit = max_distance;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < 1e-8 {
                if o < min[axis] || o > max[axis] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let mut t0 = (min[axis] - o) * inv;
            let mut t1 = (max[axis] - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_enter = t_enter.max(t0);
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }

        Some(t_enter)
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.closest_point(center).distance_squared(center) <= radius * radius
    }
}

/// Distance along a normalized ray to a sphere surface, within `max_distance`
pub fn ray_sphere(origin: Vec3, direction: Vec3, max_distance: f32, center: Vec3, radius: f32) -> Option<f32> {
    let to_origin = origin - center;
    let b = to_origin.dot(direction);
    let c = to_origin.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }
    if b > 0.0 {
        return None;
    }

    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }

    let t = -b - discriminant.sqrt();
    (t <= max_distance).then_some(t.max(0.0))
}

/// Physics system for pawn movement and falloff math
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Horizontal facing vector for a yaw
    pub fn forward_2d(yaw: f32) -> Vec3 {
        Vec3::new(yaw.cos(), yaw.sin(), 0.0)
    }

    /// Right-hand strafe vector for a yaw
    pub fn right_2d(yaw: f32) -> Vec3 {
        Vec3::new(-yaw.sin(), yaw.cos(), 0.0)
    }

    /// Aim vector for yaw and pitch
    pub fn aim_direction(yaw: f32, pitch: f32) -> Vec3 {
        let (sin_pitch, cos_pitch) = pitch.sin_cos();
        Vec3::new(cos_pitch * yaw.cos(), cos_pitch * yaw.sin(), sin_pitch)
    }

    /// Direction with Z dropped, normalized. Zero if degenerate.
    pub fn safe_normal_2d(v: Vec3) -> Vec3 {
        Vec3::new(v.x, v.y, 0.0).normalize_or_zero()
    }

    pub fn yaw_of(direction: Vec3) -> f32 {
        direction.y.atan2(direction.x)
    }

    /// Rotate `current` towards `target` at `speed`, taking the short way round
    pub fn interp_yaw(current: f32, target: f32, dt: f32, speed: f32) -> f32 {
        if speed <= 0.0 {
            return target;
        }
        let delta = (target - current + std::f32::consts::PI).rem_euclid(std::f32::consts::TAU)
            - std::f32::consts::PI;
        current + delta * (dt * speed).clamp(0.0, 1.0)
    }

    /// Walk on the ground plane from move axes
    pub fn move_pawn(position: Vec3, yaw: f32, forward: f32, right: f32, speed: f32, dt: f32) -> Vec3 {
        let forward = forward.clamp(-1.0, 1.0);
        let right = right.clamp(-1.0, 1.0);

        let wish = Self::forward_2d(yaw) * forward + Self::right_2d(yaw) * right;
        let wish = if wish.length_squared() > 1.0 {
            wish.normalize()
        } else {
            wish
        };

        position + wish * speed * dt
    }

    /// Linear falloff: 1 at the center, 0 at the edge and beyond
    pub fn falloff_scale(distance: f32, radius: f32) -> f32 {
        if radius <= 0.0 {
            return 0.0;
        }
        (1.0 - distance / radius).max(0.0)
    }
}
