//! Lightweight math types used across diffpt.
//!
//! `Vec3<T>` and `Frame<T>` are generic over [`Scalar`], so the same geometry code
//! runs on detached `f32` values and on attached [`Dual`] values.

use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use crate::ad::{Dual, Scalar};

pub const PI: f32 = core::f32::consts::PI;
pub const INV_PI: f32 = core::f32::consts::FRAC_1_PI;
pub const INV_FOUR_PI: f32 = 0.25 * core::f32::consts::FRAC_1_PI;

// Offset applied to spawned ray origins.
pub const RAY_EPSILON: f32 = 1.0e-4;

/// 2D float vector, used for film positions and 2D samples.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Construct a new 2D vector.
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// 3D vector over a scalar that may or may not carry derivatives.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Vec3<T = f32> {
    pub x: T,
    pub y: T,
    pub z: T,
}

/// Attached 3D vector.
pub type DVec3 = Vec3<Dual>;

impl Vec3<f32> {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Lift a detached vector into any scalar type (zero tangent).
    pub fn to<T: Scalar>(self) -> Vec3<T> {
        Vec3::new(T::from_f32(self.x), T::from_f32(self.y), T::from_f32(self.z))
    }

    /// Lift into an attached vector with zero tangent.
    pub fn to_dual(self) -> DVec3 {
        self.to::<Dual>()
    }

    /// Largest absolute component.
    pub fn max_abs(self) -> f32 {
        self.x.abs().max(self.y.abs()).max(self.z.abs())
    }
}

impl<T: Scalar> Vec3<T> {
    /// Construct a new 3D vector.
    pub const fn new(x: T, y: T, z: T) -> Self {
        Self { x, y, z }
    }

    pub fn splat(v: T) -> Self {
        Self::new(v, v, v)
    }

    pub fn zero() -> Self {
        Self::splat(T::from_f32(0.0))
    }

    /// Dot product.
    pub fn dot(self, other: Self) -> T {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product.
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Squared vector magnitude.
    pub fn length_squared(self) -> T {
        self.dot(self)
    }

    /// Vector magnitude.
    pub fn length(self) -> T {
        self.length_squared().sqrt()
    }

    /// Unit vector in the same direction; a zero vector is returned unchanged.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len.value() == 0.0 {
            self
        } else {
            self / len
        }
    }

    /// Scale by a detached factor.
    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    /// Component-wise product.
    pub fn hadamard(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    /// Primal values as a detached vector.
    pub fn value(self) -> Vec3<f32> {
        Vec3::new(self.x.value(), self.y.value(), self.z.value())
    }

    /// Same vector with derivatives dropped.
    pub fn detach(self) -> Self {
        Self::new(self.x.detach(), self.y.detach(), self.z.detach())
    }

    /// Read component by index (0, 1, 2).
    pub fn component(self, axis: usize) -> T {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

impl DVec3 {
    /// Per-component tangent in `slot`.
    pub fn grad(self, slot: usize) -> Vec3<f32> {
        Vec3::new(self.x.grad(slot), self.y.grad(slot), self.z.grad(slot))
    }
}

impl<T: Scalar> Add for Vec3<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl<T: Scalar> AddAssign for Vec3<T> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T: Scalar> Sub for Vec3<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl<T: Scalar> SubAssign for Vec3<T> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<T: Scalar> Neg for Vec3<T> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl<T: Scalar> Mul<T> for Vec3<T> {
    type Output = Self;

    fn mul(self, rhs: T) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl<T: Scalar> Div<T> for Vec3<T> {
    type Output = Self;

    fn div(self, rhs: T) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

/// Orthonormal frame with `n` as the local `z` axis.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Frame<T = f32> {
    pub s: Vec3<T>,
    pub t: Vec3<T>,
    pub n: Vec3<T>,
}

impl<T: Scalar> Frame<T> {
    /// Build a frame around a unit normal (Duff et al. 2017).
    pub fn from_normal(n: Vec3<T>) -> Self {
        let sign = 1.0f32.copysign(n.z.value());
        let a = (n.z + sign).recip() * -1.0;
        let b = n.x * n.y * a;
        let s = Vec3::new(n.x * n.x * a * sign + 1.0, b * sign, n.x * -sign);
        let t = Vec3::new(b, n.y * n.y * a + sign, -n.y);
        Self { s, t, n }
    }

    /// Express a world-space vector in this frame.
    pub fn to_local(&self, v: Vec3<T>) -> Vec3<T> {
        Vec3::new(v.dot(self.s), v.dot(self.t), v.dot(self.n))
    }

    /// Express a local vector in world space.
    pub fn to_world(&self, v: Vec3<T>) -> Vec3<T> {
        self.s * v.x + self.t * v.y + self.n * v.z
    }

    /// Frame with derivatives dropped.
    pub fn value(&self) -> Frame<f32> {
        Frame {
            s: self.s.value(),
            t: self.t.value(),
            n: self.n.value(),
        }
    }
}

impl Frame<f32> {
    /// Lift a detached frame into any scalar type.
    pub fn to<T: Scalar>(&self) -> Frame<T> {
        Frame {
            s: self.s.to(),
            t: self.t.to(),
            n: self.n.to(),
        }
    }
}

/// Mirror `v` about the local `z` axis.
pub fn reflect_local(v: Vec3<f32>) -> Vec3<f32> {
    Vec3::new(-v.x, -v.y, v.z)
}
