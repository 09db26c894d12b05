//! RGB radiance values, detached (`Color`) and attached (`Spectrum`).

use core::ops::{Add, AddAssign, Div, Mul, MulAssign, Sub};

use crate::ad::{Dual, Scalar};

/// Linear RGB triple.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rgb<T = f32> {
    pub r: T,
    pub g: T,
    pub b: T,
}

/// Detached RGB value.
pub type Color = Rgb<f32>;

/// RGB value carrying forward-mode tangents.
pub type Spectrum = Rgb<Dual>;

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub const WHITE: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    /// Lift into an attached spectrum with zero tangent.
    pub fn to_spectrum(self) -> Spectrum {
        Rgb::new(
            Dual::constant(self.r),
            Dual::constant(self.g),
            Dual::constant(self.b),
        )
    }

    /// True when every channel is finite.
    pub fn is_finite(self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }

    /// Channel-wise dot product, used to contract against an adjoint.
    pub fn dot(self, other: Self) -> f32 {
        self.r * other.r + self.g * other.g + self.b * other.b
    }
}

impl Spectrum {
    /// Value of `value_src` per channel, tangent of `grad_src` per channel.
    pub fn replace_grad(value_src: Color, grad_src: Spectrum) -> Spectrum {
        Rgb::new(
            Dual::replace_grad(value_src.r, grad_src.r),
            Dual::replace_grad(value_src.g, grad_src.g),
            Dual::replace_grad(value_src.b, grad_src.b),
        )
    }

    /// Per-channel `a / b`, zero where `b` is exactly zero.
    pub fn safe_div(self, b: Dual) -> Spectrum {
        self.map(|c| Dual::safe_div(c, b))
    }

    /// Per-channel tangent in `slot`.
    pub fn grad(self, slot: usize) -> Color {
        Rgb::new(self.r.grad(slot), self.g.grad(slot), self.b.grad(slot))
    }

    /// True when every value and tangent entry is finite.
    pub fn is_finite(self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }
}

impl<T: Scalar> Rgb<T> {
    pub const fn new(r: T, g: T, b: T) -> Self {
        Self { r, g, b }
    }

    pub fn splat(v: T) -> Self {
        Self::new(v, v, v)
    }

    pub fn zero() -> Self {
        Self::splat(T::from_f32(0.0))
    }

    pub fn map(self, f: impl Fn(T) -> T) -> Self {
        Self::new(f(self.r), f(self.g), f(self.b))
    }

    /// Largest channel value (detached).
    pub fn max_channel(self) -> f32 {
        self.r.value().max(self.g.value()).max(self.b.value())
    }

    /// Mean channel value (detached).
    pub fn mean(self) -> f32 {
        (self.r.value() + self.g.value() + self.b.value()) / 3.0
    }

    /// True when every channel value is exactly zero.
    pub fn is_black(self) -> bool {
        self.r.value() == 0.0 && self.g.value() == 0.0 && self.b.value() == 0.0
    }

    /// Primal values.
    pub fn value(self) -> Color {
        Rgb::new(self.r.value(), self.g.value(), self.b.value())
    }

    /// Same value with derivatives dropped.
    pub fn detach(self) -> Self {
        self.map(|c| c.detach())
    }

    /// Scale by a detached factor.
    pub fn scale(self, s: f32) -> Self {
        self.map(|c| c * s)
    }
}

impl<T: Scalar> Add for Rgb<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.r + rhs.r, self.g + rhs.g, self.b + rhs.b)
    }
}

impl<T: Scalar> AddAssign for Rgb<T> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T: Scalar> Sub for Rgb<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.r - rhs.r, self.g - rhs.g, self.b - rhs.b)
    }
}

impl<T: Scalar> Mul for Rgb<T> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::new(self.r * rhs.r, self.g * rhs.g, self.b * rhs.b)
    }
}

impl<T: Scalar> MulAssign for Rgb<T> {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<T: Scalar> Mul<T> for Rgb<T> {
    type Output = Self;

    fn mul(self, rhs: T) -> Self::Output {
        Self::new(self.r * rhs, self.g * rhs, self.b * rhs)
    }
}

impl<T: Scalar> Div<T> for Rgb<T> {
    type Output = Self;

    fn div(self, rhs: T) -> Self::Output {
        Self::new(self.r / rhs, self.g / rhs, self.b / rhs)
    }
}
