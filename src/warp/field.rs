//! Harmonic warp field and its hand-written forward/backward propagation.

use crate::ad::{Dual, Tangent, MAX_TANGENTS};
use crate::config::ReparamConfig;
use crate::math::{DVec3, Frame, Vec3};
use crate::ray::{DRay, Ray};
use crate::sampler::Sampler;
use crate::scene::{RayFlags, SceneQuery};

use super::vmf::{square_to_von_mises_fisher, von_mises_fisher_pdf};

/// Largest magnitude kept for the analytic weight gradient.
const MAX_WEIGHT_GRAD: f32 = 1.0e10;
/// Weight denominators below this are treated as degenerate.
const MIN_WEIGHT_DENOM: f32 = 1.0e-4;
/// Lower bound for the normalization constant.
const MIN_NORMALIZATION: f32 = 1.0e-8;
/// Boundary-test value assigned to auxiliary rays that leave the scene.
const MISS_BOUNDARY: f32 = 1.0;

/// One auxiliary ray of the convolution.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WarpSample {
    /// Auxiliary direction (detached).
    pub omega: Vec3,
    /// Harmonic weight over the sampling density (detached).
    pub weight: f32,
    /// Derivative of `weight` with respect to the primal direction (detached).
    pub d_weight: Vec3,
    /// Unit vector from the ray origin to the auxiliary hit, attached to the
    /// hit shape; the primal direction on a miss.
    pub warp: DVec3,
}

/// Harmonic weight `1 / (D + B)^p / pdf` and its gradient with respect to `d`,
/// where `D = exp(kappa - kappa <d, omega>) - 1` and `B` is the boundary test.
pub fn harmonic_weight(
    d: Vec3,
    omega: Vec3,
    boundary: f32,
    pdf: f32,
    kappa: f32,
    power: f32,
) -> (f32, Vec3) {
    let cos = d.dot(omega);
    let falloff = (kappa - kappa * cos).exp() - 1.0;
    let denom = falloff + boundary;
    if !(denom > MIN_WEIGHT_DENOM) || !denom.is_finite() || pdf <= 0.0 {
        return (0.0, Vec3::ZERO);
    }
    let weight = denom.powf(-power) / pdf;
    let scale = (falloff + 1.0) * kappa * power * denom.powf(-power - 1.0);
    let scale = scale.clamp(-MAX_WEIGHT_GRAD, MAX_WEIGHT_GRAD) / pdf;
    let tangential = omega - d.scale(cos);
    (weight, tangential.scale(scale))
}

/// Warp field evaluated around one ray.
///
/// The primal outputs are fixed: the direction is the ray's own direction and the
/// divergence term is one. Only their derivatives depend on the auxiliary rays:
///
/// ```text
/// d'  = V / Z                 with V = sum w_i Y_i, Z = sum w_i
/// div = (sum <dw_i, Y_i> - <V / Z, dZ>) / Z
/// ```
///
/// where `w_i`, `dw_i`, `Z` and `dZ` are detached and `Y_i` is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct WarpField {
    direction: Vec3,
    samples: Vec<WarpSample>,
    z: f32,
    dz: Vec3,
    /// Per-slot derivative of the warped direction.
    dir_jacobian: [Vec3; MAX_TANGENTS],
    /// Per-slot derivative of the divergence.
    div_jacobian: [f32; MAX_TANGENTS],
}

impl WarpField {
    /// Trace `config.num_aux_rays` auxiliary rays around `ray` and build the field.
    pub fn evaluate<S, R>(scene: &S, rng: &mut R, ray: &DRay, config: &ReparamConfig) -> Self
    where
        S: SceneQuery + ?Sized,
        R: Sampler + ?Sized,
    {
        let direction = ray.d.value();
        let frame = Frame::from_normal(direction);
        let detached = ray.value();
        let mut samples = Vec::with_capacity(config.num_aux_rays as usize);
        let mut previous = Vec3::ZERO;
        for i in 0..config.num_aux_rays {
            let omega = if config.antithetic && i % 2 == 1 {
                // Mirror the previous direction about the mean direction.
                direction.scale(2.0 * direction.dot(previous)) - previous
            } else {
                let local = square_to_von_mises_fisher(rng.next_2d(), config.kappa);
                frame.to_world(local).normalize()
            };
            previous = omega;

            let pdf = von_mises_fisher_pdf(direction.dot(omega), config.kappa);
            let aux = DRay::with_maxt(ray.o, omega.to_dual(), ray.maxt);
            let si = scene.ray_intersect(&aux, RayFlags::FOLLOW_SHAPE);
            let aux_detached = Ray::with_maxt(detached.o, omega, ray.maxt);
            // Misses count as far from any silhouette.
            let boundary = if si.valid {
                scene.boundary_test(&aux_detached, &si)
            } else {
                MISS_BOUNDARY
            };
            let (weight, d_weight) =
                harmonic_weight(direction, omega, boundary, pdf, config.kappa, config.power);
            let warp = if si.valid {
                (si.p - ray.o).normalize()
            } else {
                ray.d
            };
            samples.push(WarpSample {
                omega,
                weight,
                d_weight,
                warp,
            });
        }
        Self::from_samples(direction, samples)
    }

    /// Build the field from precomputed auxiliary samples.
    pub fn from_samples(direction: Vec3, samples: Vec<WarpSample>) -> Self {
        let z_raw: f32 = samples.iter().map(|s| s.weight).sum();
        let z = z_raw.max(MIN_NORMALIZATION);
        let mut dz = Vec3::ZERO;
        for s in &samples {
            dz += s.d_weight;
        }
        let mut dir_jacobian = [Vec3::ZERO; MAX_TANGENTS];
        let mut div_jacobian = [0.0; MAX_TANGENTS];
        for k in 0..MAX_TANGENTS {
            let mut dv = Vec3::ZERO;
            let mut ddiv = 0.0;
            for s in &samples {
                let dy = s.warp.grad(k);
                dv += dy.scale(s.weight);
                ddiv += s.d_weight.dot(dy);
            }
            let ddir = dv.scale(1.0 / z);
            dir_jacobian[k] = ddir;
            div_jacobian[k] = (ddiv - ddir.dot(dz)) / z;
        }
        Self {
            direction,
            samples,
            z,
            dz,
            dir_jacobian,
            div_jacobian,
        }
    }

    /// Primal direction the field was evaluated around.
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn samples(&self) -> &[WarpSample] {
        &self.samples
    }

    /// Clamped normalization constant `Z`.
    pub fn normalization(&self) -> f32 {
        self.z
    }

    /// Warped direction `V / Z` (detached).
    pub fn warped_direction(&self) -> Vec3 {
        let mut v = Vec3::ZERO;
        for s in &self.samples {
            v += s.warp.value().scale(s.weight);
        }
        v.scale(1.0 / self.z)
    }

    /// Divergence value `(sum <dw_i, Y_i> - <V / Z, dZ>) / Z` (detached).
    pub fn divergence(&self) -> f32 {
        let mut div = 0.0;
        for s in &self.samples {
            div += s.d_weight.dot(s.warp.value());
        }
        (div - self.warped_direction().dot(self.dz)) / self.z
    }

    /// Forward mode: derivatives of the direction and divergence along the
    /// parameter-space direction `seed`.
    pub fn propagate_forward(&self, seed: &Tangent) -> (Vec3, f32) {
        let mut ddir = Vec3::ZERO;
        let mut ddiv = 0.0;
        for (k, &s) in seed.0.iter().enumerate() {
            if s != 0.0 {
                ddir += self.dir_jacobian[k].scale(s);
                ddiv += self.div_jacobian[k] * s;
            }
        }
        (ddir, ddiv)
    }

    /// Reverse mode: pull adjoints of the direction and divergence back to the
    /// parameter slots.
    pub fn propagate_backward(&self, dir_adjoint: Vec3, div_adjoint: f32) -> Tangent {
        let mut out = Tangent::ZERO;
        for k in 0..MAX_TANGENTS {
            out.0[k] = dir_adjoint.dot(self.dir_jacobian[k]) + div_adjoint * self.div_jacobian[k];
        }
        out
    }

    /// Attached outputs: the primal direction and a unit divergence factor, with
    /// tangents from [`WarpField::propagate_forward`] on every slot.
    pub fn attach(&self) -> (DVec3, Dual) {
        let mut tx = Tangent::ZERO;
        let mut ty = Tangent::ZERO;
        let mut tz = Tangent::ZERO;
        let mut tdiv = Tangent::ZERO;
        for k in 0..MAX_TANGENTS {
            let (ddir, ddiv) = self.propagate_forward(&Tangent::unit(k));
            tx.0[k] = ddir.x;
            ty.0[k] = ddir.y;
            tz.0[k] = ddir.z;
            tdiv.0[k] = ddiv;
        }
        let d = self.direction;
        let direction = DVec3::new(Dual::new(d.x, tx), Dual::new(d.y, ty), Dual::new(d.z, tz));
        (direction, Dual::new(1.0, tdiv))
    }
}

/// Reparameterize `ray` so that derivatives through its direction account for
/// moving silhouettes. Returns the direction to trace and the divergence factor
/// to multiply the path throughput with. Inactive lanes get the ray's own
/// direction and a constant factor of one.
pub fn reparameterize_ray<S, R>(
    scene: &S,
    rng: &mut R,
    ray: &DRay,
    config: &ReparamConfig,
    active: bool,
) -> (DVec3, Dual)
where
    S: SceneQuery + ?Sized,
    R: Sampler + ?Sized,
{
    if !active {
        return (ray.d, Dual::ONE);
    }
    WarpField::evaluate(scene, rng, ray, config).attach()
}
