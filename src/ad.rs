//! Forward-mode dual numbers and reverse-mode gradient accumulation.
//!
//! A [`Dual`] carries a primal value and one tangent entry per enabled scalar
//! parameter. Plain `f32` values are the detached counterpart: anything typed as
//! `f32` cannot carry a derivative, which is how sampling code keeps random
//! decisions out of the differentiable value path.

use core::fmt::Debug;
use core::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Number of scalar parameters that can be differentiated at once.
pub const MAX_TANGENTS: usize = 8;

/// Fixed-capacity tangent vector, one entry per parameter slot.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Tangent(pub [f32; MAX_TANGENTS]);

impl Tangent {
    pub const ZERO: Self = Self([0.0; MAX_TANGENTS]);

    /// Unit tangent selecting a single slot.
    pub fn unit(slot: usize) -> Self {
        let mut t = Self::ZERO;
        if slot < MAX_TANGENTS {
            t.0[slot] = 1.0;
        }
        t
    }

    /// True when every slot is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&x| x == 0.0)
    }

    /// True when every slot is finite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|x| x.is_finite())
    }

    /// Slot-wise dot product.
    pub fn dot(&self, other: &Self) -> f32 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }

    /// `self += a * x`.
    pub fn axpy(&mut self, a: f32, x: &Tangent) {
        for (dst, src) in self.0.iter_mut().zip(x.0.iter()) {
            *dst += a * src;
        }
    }

    fn map(self, f: impl Fn(f32) -> f32) -> Self {
        let mut out = self;
        for x in out.0.iter_mut() {
            *x = f(*x);
        }
        out
    }

    fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        let mut out = self;
        for (x, y) in out.0.iter_mut().zip(other.0.iter()) {
            *x = f(*x, *y);
        }
        out
    }
}

impl Add for Tangent {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        self.zip(rhs, |a, b| a + b)
    }
}

impl AddAssign for Tangent {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Tangent {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.zip(rhs, |a, b| a - b)
    }
}

impl Mul<f32> for Tangent {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        self.map(|a| a * rhs)
    }
}

impl Neg for Tangent {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.map(|a| -a)
    }
}

/// Scalar with a primal value `v` and tangent `d`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Dual {
    pub v: f32,
    pub d: Tangent,
}

impl Dual {
    pub const ZERO: Self = Self::constant(0.0);
    pub const ONE: Self = Self::constant(1.0);

    /// Construct from a value and an explicit tangent.
    pub const fn new(v: f32, d: Tangent) -> Self {
        Self { v, d }
    }

    /// Construct a detached constant.
    pub const fn constant(v: f32) -> Self {
        Self {
            v,
            d: Tangent::ZERO,
        }
    }

    /// Construct a leaf that is differentiated through `slot`.
    pub fn variable(v: f32, slot: usize) -> Self {
        Self {
            v,
            d: Tangent::unit(slot),
        }
    }

    /// Primal value as a plain (detached) float.
    pub fn value(self) -> f32 {
        self.v
    }

    /// Same value with the tangent dropped.
    pub fn detach(self) -> Self {
        Self::constant(self.v)
    }

    /// Derivative with respect to the parameter in `slot`.
    pub fn grad(self, slot: usize) -> f32 {
        self.d.0.get(slot).copied().unwrap_or(0.0)
    }

    /// True when any tangent slot is non-zero.
    pub fn is_attached(self) -> bool {
        !self.d.is_zero()
    }

    /// True when the value and every tangent entry are finite.
    pub fn is_finite(self) -> bool {
        self.v.is_finite() && self.d.is_finite()
    }

    /// Value of `value_src` with the tangent of `grad_src`.
    pub fn replace_grad(value_src: f32, grad_src: Dual) -> Dual {
        Dual::new(value_src, grad_src.d)
    }

    /// `a / b`, or zero when `b` is exactly zero.
    pub fn safe_div(a: Dual, b: Dual) -> Dual {
        if b.v == 0.0 {
            Dual::ZERO
        } else {
            a / b
        }
    }

    /// Choose `a` when `cond` holds, `b` otherwise.
    pub fn select(cond: bool, a: Dual, b: Dual) -> Dual {
        if cond {
            a
        } else {
            b
        }
    }

    pub fn sqrt(self) -> Self {
        let s = self.v.sqrt();
        if s == 0.0 {
            return Self::constant(0.0);
        }
        Self::new(s, self.d * (0.5 / s))
    }

    pub fn exp(self) -> Self {
        let e = self.v.exp();
        Self::new(e, self.d * e)
    }

    pub fn ln(self) -> Self {
        Self::new(self.v.ln(), self.d * self.v.recip())
    }

    pub fn powf(self, e: f32) -> Self {
        let p = self.v.powf(e);
        if self.v == 0.0 {
            return Self::constant(p);
        }
        Self::new(p, self.d * (e * self.v.powf(e - 1.0)))
    }

    pub fn abs(self) -> Self {
        if self.v < 0.0 {
            -self
        } else {
            self
        }
    }

    pub fn recip(self) -> Self {
        let r = self.v.recip();
        Self::new(r, self.d * (-r * r))
    }

    pub fn min(self, other: Self) -> Self {
        if other.v < self.v {
            other
        } else {
            self
        }
    }

    pub fn max(self, other: Self) -> Self {
        if other.v > self.v {
            other
        } else {
            self
        }
    }
}

impl From<f32> for Dual {
    fn from(v: f32) -> Self {
        Self::constant(v)
    }
}

impl Add for Dual {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.v + rhs.v, self.d + rhs.d)
    }
}

impl Sub for Dual {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.v - rhs.v, self.d - rhs.d)
    }
}

impl Mul for Dual {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        let d = self.d.zip(rhs.d, |a, b| a * rhs.v + self.v * b);
        Self::new(self.v * rhs.v, d)
    }
}

impl Div for Dual {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        let inv = rhs.v.recip();
        let q = self.v * inv;
        let d = self.d.zip(rhs.d, |a, b| (a - q * b) * inv);
        Self::new(q, d)
    }
}

impl Neg for Dual {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.v, -self.d)
    }
}

impl Add<f32> for Dual {
    type Output = Self;

    fn add(self, rhs: f32) -> Self::Output {
        Self::new(self.v + rhs, self.d)
    }
}

impl Sub<f32> for Dual {
    type Output = Self;

    fn sub(self, rhs: f32) -> Self::Output {
        Self::new(self.v - rhs, self.d)
    }
}

impl Mul<f32> for Dual {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.v * rhs, self.d * rhs)
    }
}

impl Div<f32> for Dual {
    type Output = Self;

    fn div(self, rhs: f32) -> Self::Output {
        let inv = rhs.recip();
        Self::new(self.v * inv, self.d * inv)
    }
}

impl Add<Dual> for f32 {
    type Output = Dual;

    fn add(self, rhs: Dual) -> Self::Output {
        rhs + self
    }
}

impl Sub<Dual> for f32 {
    type Output = Dual;

    fn sub(self, rhs: Dual) -> Self::Output {
        Dual::new(self - rhs.v, -rhs.d)
    }
}

impl Mul<Dual> for f32 {
    type Output = Dual;

    fn mul(self, rhs: Dual) -> Self::Output {
        rhs * self
    }
}

impl Div<Dual> for f32 {
    type Output = Dual;

    fn div(self, rhs: Dual) -> Self::Output {
        Dual::constant(self) / rhs
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for Dual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

/// Scalar type usable by the geometry code: either `f32` (detached) or [`Dual`].
pub trait Scalar:
    Copy
    + Debug
    + Default
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Add<f32, Output = Self>
    + Sub<f32, Output = Self>
    + Mul<f32, Output = Self>
    + Div<f32, Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
{
    fn from_f32(v: f32) -> Self;
    fn value(self) -> f32;
    fn detach(self) -> Self;
    fn sqrt(self) -> Self;
    fn abs(self) -> Self;
    fn exp(self) -> Self;
    fn powf(self, e: f32) -> Self;
    fn recip(self) -> Self;
}

impl Scalar for f32 {
    fn from_f32(v: f32) -> Self {
        v
    }

    fn value(self) -> f32 {
        self
    }

    fn detach(self) -> Self {
        self
    }

    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }

    fn abs(self) -> Self {
        f32::abs(self)
    }

    fn exp(self) -> Self {
        f32::exp(self)
    }

    fn powf(self, e: f32) -> Self {
        f32::powf(self, e)
    }

    fn recip(self) -> Self {
        f32::recip(self)
    }
}

impl Scalar for Dual {
    fn from_f32(v: f32) -> Self {
        Dual::constant(v)
    }

    fn value(self) -> f32 {
        self.v
    }

    fn detach(self) -> Self {
        Dual::detach(self)
    }

    fn sqrt(self) -> Self {
        Dual::sqrt(self)
    }

    fn abs(self) -> Self {
        Dual::abs(self)
    }

    fn exp(self) -> Self {
        Dual::exp(self)
    }

    fn powf(self, e: f32) -> Self {
        Dual::powf(self, e)
    }

    fn recip(self) -> Self {
        Dual::recip(self)
    }
}

/// Reverse-mode accumulator over the parameter slots.
///
/// `backward(value, adjoint)` adds `adjoint * d(value)/d(theta_k)` to slot `k`.
/// Sums are kept in `f64` so that merging per-worker accumulators does not
/// depend noticeably on the merge order.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct GradAccumulator {
    sums: [f64; MAX_TANGENTS],
}

impl GradAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Propagate `adjoint` through `value` into the parameter slots.
    pub fn backward(&mut self, value: Dual, adjoint: f32) {
        self.backward_tangent(&value.d, adjoint);
    }

    /// Propagate `adjoint` through an explicit tangent.
    pub fn backward_tangent(&mut self, tangent: &Tangent, adjoint: f32) {
        if adjoint == 0.0 || !tangent.is_finite() {
            return;
        }
        for (sum, &t) in self.sums.iter_mut().zip(tangent.0.iter()) {
            *sum += adjoint as f64 * t as f64;
        }
    }

    /// Combine two accumulators.
    pub fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.sums.iter_mut().zip(other.sums.iter()) {
            *a += *b;
        }
        self
    }

    /// Accumulated gradient for `slot`.
    pub fn slot(&self, slot: usize) -> f64 {
        self.sums.get(slot).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn product_and_quotient_rules() {
        let x = Dual::variable(3.0, 0);
        let y = Dual::variable(2.0, 1);
        let p = x * y;
        assert_relative_eq!(p.v, 6.0);
        assert_relative_eq!(p.grad(0), 2.0);
        assert_relative_eq!(p.grad(1), 3.0);

        let q = x / y;
        assert_relative_eq!(q.v, 1.5);
        assert_relative_eq!(q.grad(0), 0.5);
        assert_relative_eq!(q.grad(1), -0.75);
    }

    #[test]
    fn transcendental_derivatives() {
        let x = Dual::variable(0.5, 0);
        assert_relative_eq!(x.exp().grad(0), 0.5f32.exp(), epsilon = 1e-6);
        assert_relative_eq!(x.sqrt().grad(0), 0.5 / 0.5f32.sqrt(), epsilon = 1e-6);
        assert_relative_eq!(x.powf(3.0).grad(0), 3.0 * 0.25, epsilon = 1e-6);
        assert_relative_eq!(x.recip().grad(0), -4.0, epsilon = 1e-5);
    }

    #[test]
    fn replace_grad_keeps_value_and_foreign_tangent() {
        let attached = Dual::variable(4.0, 2) * 3.0;
        let spliced = Dual::replace_grad(7.0, attached);
        assert_eq!(spliced.v, 7.0);
        assert_eq!(spliced.grad(2), 3.0);
        assert!(!spliced.detach().is_attached());
    }

    #[test]
    fn safe_div_by_zero_is_zero() {
        let a = Dual::variable(1.0, 0);
        let r = Dual::safe_div(a, Dual::ZERO);
        assert_eq!(r, Dual::ZERO);
    }

    #[test]
    fn accumulator_matches_tangent_dot_adjoint() {
        let x = Dual::variable(2.0, 0);
        let y = Dual::variable(5.0, 3);
        let mut acc = GradAccumulator::new();
        acc.backward(x * y, 0.5);
        acc.backward(x, 2.0);
        assert_relative_eq!(acc.slot(0), 0.5 * 5.0 + 2.0);
        assert_relative_eq!(acc.slot(3), 0.5 * 2.0);
        let merged = acc.merge(acc);
        assert_relative_eq!(merged.slot(3), 2.0);
    }
}
