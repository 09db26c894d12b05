//! Reference BSDFs.
//!
//! Directions are in the shading frame of the interaction. `sample` and `pdf` work on
//! detached values; `eval`, `eval_pdf` and `eval_delta` return attached values so
//! callers can splice derivatives onto a detached sampling weight.

use crate::ad::Dual;
use crate::color::{Color, Spectrum};
use crate::math::{reflect_local, DVec3, Vec2, Vec3, INV_PI};
use crate::sampling::{square_to_cosine_hemisphere, square_to_cosine_hemisphere_pdf};

use super::interaction::SurfaceInteraction;

/// Direction of transport along the path being built.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// Paths traced from the sensor.
    #[default]
    Radiance,
    /// Paths traced from emitters.
    Importance,
}

/// Per-query BSDF settings.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct BsdfContext {
    pub mode: TransportMode,
}

impl BsdfContext {
    pub fn new(mode: TransportMode) -> Self {
        Self { mode }
    }
}

/// Detached result of BSDF sampling.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BsdfSample {
    /// Sampled outgoing direction in the shading frame.
    pub wo: Vec3,
    pub pdf: f32,
    /// Relative index of refraction along `wo`.
    pub eta: f32,
    pub delta: bool,
}

/// Surface scattering models.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Bsdf {
    /// Lambertian reflector.
    Diffuse { reflectance: Spectrum },
    /// Perfect specular reflector.
    Mirror { specular: Spectrum },
}

impl Bsdf {
    pub fn diffuse(reflectance: Color) -> Self {
        Bsdf::Diffuse {
            reflectance: reflectance.to_spectrum(),
        }
    }

    pub fn mirror(specular: Color) -> Self {
        Bsdf::Mirror {
            specular: specular.to_spectrum(),
        }
    }

    /// True when every lobe is a Dirac delta.
    pub fn is_delta(&self) -> bool {
        matches!(self, Bsdf::Mirror { .. })
    }

    /// True when the BSDF has a lobe that next-event estimation can sample against.
    pub fn has_smooth(&self) -> bool {
        !self.is_delta()
    }

    /// Sample an outgoing direction. Returns the sample and its detached weight
    /// `eval / pdf`, or `None` when nothing is scattered.
    pub fn sample(
        &self,
        _ctx: &BsdfContext,
        si: &SurfaceInteraction,
        _sample1: f32,
        sample2: Vec2,
    ) -> Option<(BsdfSample, Color)> {
        let wi = si.wi.value();
        if wi.z <= 0.0 {
            return None;
        }
        match self {
            Bsdf::Diffuse { reflectance } => {
                let wo = square_to_cosine_hemisphere(sample2);
                let pdf = square_to_cosine_hemisphere_pdf(wo);
                if pdf <= 0.0 {
                    return None;
                }
                let bs = BsdfSample {
                    wo,
                    pdf,
                    eta: 1.0,
                    delta: false,
                };
                Some((bs, reflectance.value()))
            }
            Bsdf::Mirror { specular } => {
                let bs = BsdfSample {
                    wo: reflect_local(wi),
                    pdf: 1.0,
                    eta: 1.0,
                    delta: true,
                };
                Some((bs, specular.value()))
            }
        }
    }

    /// BSDF value times the outgoing cosine, attached. Zero for delta lobes.
    pub fn eval(&self, _ctx: &BsdfContext, si: &SurfaceInteraction, wo: DVec3) -> Spectrum {
        match self {
            Bsdf::Diffuse { reflectance } => {
                if si.wi.z.value() <= 0.0 || wo.z.value() <= 0.0 {
                    return Spectrum::zero();
                }
                *reflectance * (wo.z * INV_PI)
            }
            Bsdf::Mirror { .. } => Spectrum::zero(),
        }
    }

    /// Solid-angle density of [`Bsdf::sample`] producing `wo`.
    pub fn pdf(&self, _ctx: &BsdfContext, si: &SurfaceInteraction, wo: Vec3) -> f32 {
        match self {
            Bsdf::Diffuse { .. } => {
                if si.wi.z.value() <= 0.0 {
                    0.0
                } else {
                    square_to_cosine_hemisphere_pdf(wo)
                }
            }
            Bsdf::Mirror { .. } => 0.0,
        }
    }

    /// `eval` and `pdf` in one query; the pdf is detached.
    pub fn eval_pdf(
        &self,
        ctx: &BsdfContext,
        si: &SurfaceInteraction,
        wo: DVec3,
    ) -> (Spectrum, f32) {
        (self.eval(ctx, si, wo), self.pdf(ctx, si, wo.value()))
    }

    /// Attached weight of a delta-lobe sample. Zero for smooth lobes.
    pub fn eval_delta(&self, _ctx: &BsdfContext, si: &SurfaceInteraction, bs: &BsdfSample) -> Spectrum {
        match self {
            Bsdf::Mirror { specular } if bs.delta && si.wi.z.value() > 0.0 => *specular,
            _ => Spectrum::zero(),
        }
    }

    /// Albedo parameter, attached.
    pub fn albedo(&self) -> Spectrum {
        match self {
            Bsdf::Diffuse { reflectance } => *reflectance,
            Bsdf::Mirror { specular } => *specular,
        }
    }
}

/// Attached weight `eval(wo) / pdf` whose value is the detached sampling weight.
///
/// The sample direction and pdf stay frozen; only the integrand contributes a
/// derivative.
pub fn reattach_weight(weight: Color, eval: Spectrum, pdf: f32) -> Spectrum {
    Spectrum::replace_grad(weight, eval.safe_div(Dual::constant(pdf)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Frame;
    use approx::assert_relative_eq;

    fn facing_up() -> SurfaceInteraction {
        let n = Vec3::new(0.0, 0.0, 1.0).to_dual();
        SurfaceInteraction {
            valid: true,
            n,
            sh_frame: Frame::from_normal(n),
            wi: Vec3::new(0.0, 0.6, 0.8).to_dual(),
            ..Default::default()
        }
    }

    #[test]
    fn diffuse_reattached_weight_has_eval_derivative() {
        let rho = 0.6;
        let bsdf = Bsdf::Diffuse {
            reflectance: Spectrum::splat(Dual::variable(rho, 0)),
        };
        let ctx = BsdfContext::default();
        let si = facing_up();
        let (bs, weight) = bsdf
            .sample(&ctx, &si, 0.5, Vec2::new(0.3, 0.7))
            .unwrap();
        let eval = bsdf.eval(&ctx, &si, bs.wo.to_dual());
        let w = reattach_weight(weight, eval, bs.pdf);

        let naive = eval.value().r / bs.pdf;
        assert_relative_eq!(w.r.value(), naive, epsilon = 1e-5);
        assert_relative_eq!(w.r.value(), rho, epsilon = 1e-5);
        // d(eval)/d(rho) = cos / pi, divided by pdf = cos / pi gives 1.
        let expected = bs.wo.z * INV_PI / bs.pdf;
        assert_relative_eq!(w.r.grad(0), expected, epsilon = 1e-5);
        assert_relative_eq!(w.r.grad(0), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn back_facing_incidence_scatters_nothing() {
        let bsdf = Bsdf::diffuse(Color::WHITE);
        let mut si = facing_up();
        si.wi = Vec3::new(0.0, 0.0, -1.0).to_dual();
        let ctx = BsdfContext::default();
        assert!(bsdf.sample(&ctx, &si, 0.5, Vec2::new(0.5, 0.5)).is_none());
        assert_eq!(bsdf.pdf(&ctx, &si, Vec3::new(0.0, 0.0, 1.0)), 0.0);
    }

    #[test]
    fn mirror_reflects_and_reports_delta() {
        let bsdf = Bsdf::mirror(Color::new(0.9, 0.9, 0.9));
        let ctx = BsdfContext::default();
        let si = facing_up();
        let (bs, weight) = bsdf.sample(&ctx, &si, 0.1, Vec2::new(0.1, 0.2)).unwrap();
        assert!(bs.delta);
        assert_relative_eq!(bs.wo.y, -0.6, epsilon = 1e-6);
        assert_relative_eq!(bs.wo.z, 0.8, epsilon = 1e-6);
        assert_relative_eq!(weight.g, 0.9);
        assert!(bsdf.eval(&ctx, &si, bs.wo.to_dual()).is_black());
        assert_relative_eq!(bsdf.eval_delta(&ctx, &si, &bs).g.value(), 0.9);
    }
}
