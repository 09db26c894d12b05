//! Rays with detached or attached origin and direction.

use crate::ad::{Dual, Scalar};
use crate::math::Vec3;

/// Ray `o + t d` for `t` in `(0, maxt)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray<T = f32> {
    pub o: Vec3<T>,
    pub d: Vec3<T>,
    pub maxt: f32,
    pub time: f32,
}

/// Ray whose origin and direction may depend on scene parameters.
pub type DRay = Ray<Dual>;

impl<T: Scalar> Ray<T> {
    /// Unbounded ray.
    pub fn new(o: Vec3<T>, d: Vec3<T>) -> Self {
        Self {
            o,
            d,
            maxt: f32::INFINITY,
            time: 0.0,
        }
    }

    /// Ray bounded to `(0, maxt)`.
    pub fn with_maxt(o: Vec3<T>, d: Vec3<T>, maxt: f32) -> Self {
        Self {
            o,
            d,
            maxt,
            time: 0.0,
        }
    }

    /// Point at parameter `t`.
    pub fn at(&self, t: T) -> Vec3<T> {
        self.o + self.d * t
    }

    /// Detached copy.
    pub fn value(&self) -> Ray<f32> {
        Ray {
            o: self.o.value(),
            d: self.d.value(),
            maxt: self.maxt,
            time: self.time,
        }
    }
}

impl Ray<f32> {
    /// Lift into an attached ray with zero tangents.
    pub fn to_dual(&self) -> DRay {
        Ray {
            o: self.o.to_dual(),
            d: self.d.to_dual(),
            maxt: self.maxt,
            time: self.time,
        }
    }
}
