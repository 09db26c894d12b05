//! Warps from the unit square to common sampling domains.

use crate::math::{Vec2, Vec3, INV_FOUR_PI, INV_PI, PI};

/// Concentric mapping of the unit square onto the unit disk (Shirley-Chiu).
pub fn square_to_uniform_disk_concentric(u: Vec2) -> Vec2 {
    let x = 2.0 * u.x - 1.0;
    let y = 2.0 * u.y - 1.0;
    if x == 0.0 && y == 0.0 {
        return Vec2::ZERO;
    }
    let (r, phi) = if x.abs() > y.abs() {
        (x, (PI / 4.0) * (y / x))
    } else {
        (y, (PI / 2.0) - (PI / 4.0) * (x / y))
    };
    Vec2::new(r * phi.cos(), r * phi.sin())
}

/// Cosine-weighted hemisphere around `+z`.
pub fn square_to_cosine_hemisphere(u: Vec2) -> Vec3 {
    let p = square_to_uniform_disk_concentric(u);
    let z = (1.0 - p.x * p.x - p.y * p.y).max(0.0).sqrt();
    Vec3::new(p.x, p.y, z)
}

/// Density of [`square_to_cosine_hemisphere`] in solid angle.
pub fn square_to_cosine_hemisphere_pdf(v: Vec3) -> f32 {
    if v.z <= 0.0 {
        0.0
    } else {
        v.z * INV_PI
    }
}

/// Uniform direction on the unit sphere.
pub fn square_to_uniform_sphere(u: Vec2) -> Vec3 {
    let z = 1.0 - 2.0 * u.y;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u.x;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Density of [`square_to_uniform_sphere`] in solid angle.
pub fn square_to_uniform_sphere_pdf() -> f32 {
    INV_FOUR_PI
}

/// Uniform point on the unit square mapped to `[-1, 1]^2`.
pub fn square_to_centered_square(u: Vec2) -> Vec2 {
    Vec2::new(2.0 * u.x - 1.0, 2.0 * u.y - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{Pcg32, Sampler};

    #[test]
    fn cosine_hemisphere_stays_above_horizon() {
        let mut rng = Pcg32::new(0, 9);
        for _ in 0..1000 {
            let v = square_to_cosine_hemisphere(rng.next_2d());
            assert!(v.z >= 0.0);
            assert!((v.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn cosine_hemisphere_mean_cosine() {
        // E[cos] under p = cos/pi is 2/3.
        let mut rng = Pcg32::new(1, 9);
        let n = 200_000;
        let mut sum = 0.0f64;
        for _ in 0..n {
            sum += square_to_cosine_hemisphere(rng.next_2d()).z as f64;
        }
        let mean = sum / n as f64;
        assert!((mean - 2.0 / 3.0).abs() < 5e-3, "mean = {mean}");
    }

    #[test]
    fn uniform_sphere_is_unit_length() {
        let mut rng = Pcg32::new(2, 9);
        for _ in 0..1000 {
            let v = square_to_uniform_sphere(rng.next_2d());
            assert!((v.length() - 1.0).abs() < 1e-4);
        }
    }
}
