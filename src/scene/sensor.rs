//! Pinhole perspective sensor.

use crate::ad::{Dual, Scalar};
use crate::math::{DVec3, Frame, Vec2, Vec3};
use crate::ray::DRay;

/// Connection from a scene point to the sensor.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SensorConnection<T = f32> {
    /// Unit direction from the point toward the sensor.
    pub d: Vec3<T>,
    pub dist: T,
    /// Continuous film position in pixels.
    pub film_pos: Vec2,
    /// Importance times the sensor cosine over squared distance.
    pub weight: T,
}

/// Pinhole camera with a look-at frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PerspectiveSensor {
    /// Aperture position; differentiable.
    pub origin: DVec3,
    frame: Frame,
    width: u32,
    height: u32,
    tan_x: f32,
    tan_y: f32,
}

impl PerspectiveSensor {
    /// Camera at `origin` looking at `target`, with horizontal field of view
    /// `fov_x` in degrees.
    pub fn look_at(
        origin: Vec3,
        target: Vec3,
        up: Vec3,
        fov_x: f32,
        width: u32,
        height: u32,
    ) -> Self {
        let n = (target - origin).normalize();
        let s = n.cross(up).normalize();
        let t = s.cross(n);
        let tan_x = (0.5 * fov_x.to_radians()).tan();
        let tan_y = tan_x * height as f32 / width.max(1) as f32;
        Self {
            origin: origin.to_dual(),
            frame: Frame { s, t, n },
            width,
            height,
            tan_x,
            tan_y,
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Viewing direction.
    pub fn forward(&self) -> Vec3 {
        self.frame.n
    }

    /// Primary ray through film position `film_pos` (pixels, origin top-left).
    pub fn sample_ray(&self, film_pos: Vec2) -> DRay {
        let x = 2.0 * film_pos.x / self.width as f32 - 1.0;
        let y = 1.0 - 2.0 * film_pos.y / self.height as f32;
        let local = Vec3::new(x * self.tan_x, y * self.tan_y, 1.0).normalize();
        DRay::new(self.origin, self.frame.to_world(local).to_dual())
    }

    /// Detached connection from `p` to the sensor, or `None` outside the frustum.
    pub fn sample_direction(&self, p: Vec3) -> Option<SensorConnection> {
        self.connect(p, self.origin.value())
    }

    /// Attached connection from `p`; derivatives flow through `p` and the origin.
    pub fn sample_direction_attached(&self, p: DVec3) -> Option<SensorConnection<Dual>> {
        self.connect(p, self.origin)
    }

    fn connect<T: Scalar>(&self, p: Vec3<T>, origin: Vec3<T>) -> Option<SensorConnection<T>> {
        let frame: Frame<T> = self.frame.to();
        let delta = origin - p;
        let dist = delta.length();
        if dist.value() <= 0.0 {
            return None;
        }
        let d = delta / dist;
        let local = frame.to_local(-d);
        let cos = local.z;
        if cos.value() <= 0.0 {
            return None;
        }
        let x = (local.x / cos).value();
        let y = (local.y / cos).value();
        if x.abs() > self.tan_x || y.abs() > self.tan_y {
            return None;
        }
        let film_pos = Vec2::new(
            0.5 * (x / self.tan_x + 1.0) * self.width as f32,
            0.5 * (1.0 - y / self.tan_y) * self.height as f32,
        );
        // W = 1 / (A cos^4); weight = W cos / dist^2.
        let area = 4.0 * self.tan_x * self.tan_y;
        let weight = (cos * cos * cos * dist * dist * area).recip();
        Some(SensorConnection {
            d,
            dist,
            film_pos,
            weight,
        })
    }
}
