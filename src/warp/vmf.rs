//! von Mises-Fisher distribution around the local `+z` axis.

use crate::math::{Vec2, Vec3, PI};

/// Sample a direction concentrated around `+z` with concentration `kappa`.
pub fn square_to_von_mises_fisher(u: Vec2, kappa: f32) -> Vec3 {
    // Inverse CDF of the cosine, written to stay finite for large kappa.
    let w = 1.0 + (1.0 - u.x + u.x * (-2.0 * kappa).exp()).ln() / kappa;
    let w = w.clamp(-1.0, 1.0);
    let r = (1.0 - w * w).max(0.0).sqrt();
    let phi = 2.0 * PI * u.y;
    Vec3::new(r * phi.cos(), r * phi.sin(), w)
}

/// Density of [`square_to_von_mises_fisher`] in solid angle, given `cos_theta`
/// to the mean direction.
pub fn von_mises_fisher_pdf(cos_theta: f32, kappa: f32) -> f32 {
    let norm = kappa / (2.0 * PI * (1.0 - (-2.0 * kappa).exp()));
    norm * (kappa * (cos_theta - 1.0)).exp()
}
