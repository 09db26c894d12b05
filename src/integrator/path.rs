//! Differentiable unidirectional path tracer with next-event estimation.
//!
//! Every random decision is made on detached values. Derivatives enter only by
//! re-evaluating the integrand at the frozen sample and splicing its tangent onto
//! the detached sampling weight.

use rayon::prelude::*;

use crate::ad::Dual;
use crate::color::{Color, Spectrum};
use crate::config::{IntegratorConfig, ReparamConfig};
use crate::error::RenderResult;
use crate::math::{DVec3, Vec3};
use crate::ray::DRay;
use crate::sampler::{IndependentSampler, Pcg32, Sampler};
use crate::scene::{
    reattach_weight, Bsdf, BsdfContext, BsdfSample, DirectionSample, Interaction, RayFlags,
    SceneQuery, SurfaceInteraction, TransportMode,
};
use crate::warp::reparameterize_ray;

use super::lanes::LaneMask;

/// Upper bound of the roulette continuation probability.
const MAX_CONTINUATION: f32 = 0.95;

/// Detached geometry of the primary hit. Zero when the primary ray escaped.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Aovs {
    /// Distance along the primary ray.
    pub distance: f32,
    pub position: Vec3,
    /// Geometric normal.
    pub normal: Vec3,
}

/// Result of one path.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct PathSample {
    /// Radiance estimate, attached.
    pub radiance: Spectrum,
    /// 1 when the primary ray hit geometry, 0 otherwise.
    pub alpha: f32,
    pub aovs: Aovs,
    /// Number of segments traced.
    pub depth: u32,
}

/// Per-lane state carried from one bounce to the next.
#[derive(Debug, Copy, Clone)]
struct PathState {
    ray: DRay,
    radiance: Spectrum,
    beta: Spectrum,
    eta: f32,
    depth: u32,
    alpha: f32,
    aovs: Aovs,
    prev_it: Interaction,
    prev_bsdf_pdf: f32,
    prev_bsdf_delta: bool,
}

impl PathState {
    fn new(ray: DRay) -> Self {
        Self {
            ray,
            radiance: Spectrum::zero(),
            beta: Color::WHITE.to_spectrum(),
            eta: 1.0,
            depth: 0,
            alpha: 0.0,
            aovs: Aovs::default(),
            prev_it: Interaction::default(),
            prev_bsdf_pdf: 0.0,
            // The camera vertex cannot be reached by emitter sampling.
            prev_bsdf_delta: true,
        }
    }

    fn finish(&self) -> PathSample {
        PathSample {
            radiance: self.radiance,
            alpha: self.alpha,
            aovs: self.aovs,
            depth: self.depth,
        }
    }
}

/// Roulette decision for a path with largest throughput channel `beta_max` and
/// accumulated relative index of refraction `eta`. Returns the continuation
/// probability when the path survives.
pub fn russian_roulette(beta_max: f32, eta: f32, u: f32) -> Option<f32> {
    let q = (beta_max * eta * eta).min(MAX_CONTINUATION);
    if q > 0.0 && u < q {
        Some(q)
    } else {
        None
    }
}

/// Forward path tracer.
#[derive(Debug, Clone, PartialEq)]
pub struct PathIntegrator {
    config: IntegratorConfig,
}

impl PathIntegrator {
    /// Validate `config` and build the integrator.
    pub fn new(config: IntegratorConfig) -> RenderResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Trace one path per ray. `sampler` must hold one stream per ray; lanes
    /// inactive in `active` return a zero sample and consume no variates. Rays
    /// without a sampler stream also return a zero sample.
    pub fn sample<S>(
        &self,
        scene: &S,
        sampler: &mut IndependentSampler,
        rays: &[DRay],
        active: &LaneMask,
    ) -> Vec<PathSample>
    where
        S: SceneQuery + ?Sized,
    {
        let lanes = sampler.lanes_mut();
        let seeded = rays.len().min(lanes.len());
        if seeded < rays.len() {
            tracing::warn!(
                rays = rays.len(),
                lanes = lanes.len(),
                "sampler has fewer lanes than rays, unseeded rays return zero"
            );
        }
        let mut states: Vec<PathState> = rays.iter().map(|r| PathState::new(*r)).collect();
        let mut mask = LaneMask::from_flags(
            (0..rays.len())
                .map(|i| i < seeded && active.is_active(i))
                .collect(),
        );

        for bounce in 0..self.config.max_depth {
            if !mask.any() {
                break;
            }
            states[..seeded]
                .par_iter_mut()
                .zip(lanes[..seeded].par_iter_mut())
                .zip(mask.flags_mut())
                .for_each(|((state, rng), mut flag)| {
                    if flag.is_active() && !self.bounce(scene, state, rng) {
                        flag.deactivate();
                    }
                });
            tracing::debug!(bounce, active = mask.count(), "path bounce");
        }
        states.iter().map(PathState::finish).collect()
    }

    /// Advance one lane by one segment. Returns false when the path ends.
    fn bounce<S>(&self, scene: &S, state: &mut PathState, rng: &mut Pcg32) -> bool
    where
        S: SceneQuery + ?Sized,
    {
        let config = &self.config;
        let ctx = BsdfContext::new(TransportMode::Radiance);
        let si = scene.ray_intersect(&state.ray, RayFlags::default());
        if state.depth == 0 && si.valid {
            state.alpha = 1.0;
            state.aovs = Aovs {
                distance: si.t.value(),
                position: si.p.value(),
                normal: si.n.value(),
            };
        }

        // Emission found by the previous BSDF sample.
        if !(config.hide_emitters && state.depth == 0) {
            let emitted = scene.eval_emitter_direction(&si);
            if !emitted.is_black() {
                let mis = if state.prev_bsdf_delta {
                    1.0
                } else {
                    match scene.emitter_hit(&state.prev_it, &si, &state.ray.value()) {
                        Some(ds) => {
                            let pdf_em = scene.pdf_emitter_direction(&state.prev_it, &ds);
                            config.mis.weight(state.prev_bsdf_pdf, pdf_em)
                        }
                        None => 1.0,
                    }
                };
                state.radiance += state.beta * emitted.scale(mis);
            }
        }

        let active_next = state.depth + 1 < config.max_depth && si.valid;
        state.depth += 1;
        if !active_next {
            return false;
        }
        let Some(bsdf) = scene.bsdf(&si) else {
            return false;
        };

        // Next-event estimation.
        if bsdf.has_smooth() {
            let it = si.interaction();
            let (ds, em_weight) = scene.sample_emitter_direction(&it, rng.next_2d(), true);
            if ds.pdf > 0.0 && em_weight.max_channel() > 0.0 {
                let (wo, em_attached) = self.attach_emitter_sample(scene, rng, &si, &ds);
                let (bsdf_val, bsdf_pdf) = bsdf.eval_pdf(&ctx, &si, si.to_local(wo));
                let mis = if ds.delta {
                    1.0
                } else {
                    config.mis.weight(ds.pdf, bsdf_pdf)
                };
                let em_weight = Spectrum::replace_grad(em_weight, em_attached);
                state.radiance += state.beta * bsdf_val * em_weight.scale(mis);
            }
        }

        // BSDF sampling.
        let Some(next) = scatter(scene, rng, &si, bsdf, &ctx, config.reparam.as_ref()) else {
            return false;
        };
        let bs = next.sample;
        state.beta = state.beta * next.weight;
        state.eta *= bs.eta;
        state.prev_it = si.interaction();
        state.prev_bsdf_pdf = bs.pdf;
        state.prev_bsdf_delta = bs.delta;
        state.ray = si.spawn_ray(next.direction);

        let beta_max = state.beta.max_channel();
        if !(beta_max > 0.0) {
            return false;
        }
        if state.depth >= config.rr_depth {
            match russian_roulette(beta_max, state.eta, rng.next_1d()) {
                Some(q) => state.beta = state.beta.scale(1.0 / q),
                None => return false,
            }
        }
        true
    }

    /// Direction toward the sampled emitter and the attached emitter weight
    /// `Le / pdf`, whose derivative follows the emitter and shading point.
    fn attach_emitter_sample<S>(
        &self,
        scene: &S,
        rng: &mut Pcg32,
        si: &SurfaceInteraction,
        ds: &DirectionSample,
    ) -> (DVec3, Spectrum)
    where
        S: SceneQuery + ?Sized,
    {
        let inv_pdf = 1.0 / ds.pdf;
        let emitter_radiance = || {
            ds.emitter
                .map_or_else(Spectrum::zero, |i| scene.emitter_radiance(i))
        };

        if ds.delta {
            return (ds.d.to_dual(), emitter_radiance().scale(inv_pdf));
        }

        if let Some(reparam) = self.config.reparam.as_ref() {
            let ray = si.spawn_ray(ds.d.to_dual());
            let (direction, det) = reparameterize_ray(scene, rng, &ray, reparam, true);
            let radiance = if ds.dist.is_finite() {
                let em_ray = DRay::new(ray.o, direction);
                scene.eval_emitter_direction(&scene.ray_intersect(&em_ray, RayFlags::default()))
            } else {
                emitter_radiance()
            };
            return (direction, (radiance * det).scale(inv_pdf));
        }

        if !ds.dist.is_finite() {
            return (ds.d.to_dual(), emitter_radiance().scale(inv_pdf));
        }

        // Re-attach the sampled emitter point to its shape and account for the
        // change of the solid-angle Jacobian as both endpoints move.
        let ray = si.spawn_ray(ds.d.to_dual());
        let si_em = scene.ray_intersect(&ray, RayFlags::FOLLOW_SHAPE);
        if !si_em.valid || si_em.shape != ds.shape {
            return (ds.d.to_dual(), emitter_radiance().scale(inv_pdf));
        }
        let delta = si_em.p - si.p;
        let dist = delta.length();
        if dist.value() <= 0.0 {
            return (ds.d.to_dual(), Spectrum::zero());
        }
        let direction = delta / dist;
        let jacobian = si_em.n.dot(-direction).abs() / (dist * dist);
        let jacobian = Dual::safe_div(jacobian, Dual::constant(jacobian.value()));
        let radiance = scene.eval_emitter_direction(&si_em);
        (direction, (radiance * jacobian).scale(inv_pdf))
    }
}

/// Continuation of a path at a surface vertex.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Scatter {
    pub sample: BsdfSample,
    /// World-space direction of the next segment.
    pub direction: DVec3,
    /// Attached sampling weight; its value is the detached `eval / pdf`.
    pub weight: Spectrum,
}

/// Sample the BSDF at `si` and attach the sampling weight.
///
/// Delta lobes take the derivative of their attached weight. Smooth lobes freeze
/// the sampled world direction and re-evaluate the BSDF there, or evaluate it at
/// the reparameterized direction when `reparam` is set.
pub(crate) fn scatter<S, R>(
    scene: &S,
    rng: &mut R,
    si: &SurfaceInteraction,
    bsdf: &Bsdf,
    ctx: &BsdfContext,
    reparam: Option<&ReparamConfig>,
) -> Option<Scatter>
where
    S: SceneQuery + ?Sized,
    R: Sampler + ?Sized,
{
    let (bs, weight) = bsdf.sample(ctx, si, rng.next_1d(), rng.next_2d())?;
    let wo_world = si.sh_frame.value().to_world(bs.wo);
    let (direction, weight) = if bs.delta {
        let direction = si.to_world(bs.wo.to_dual());
        (direction, Spectrum::replace_grad(weight, bsdf.eval_delta(ctx, si, &bs)))
    } else if let Some(reparam) = reparam {
        let ray = si.spawn_ray(wo_world.to_dual());
        let (direction, det) = reparameterize_ray(scene, rng, &ray, reparam, true);
        let eval = bsdf.eval(ctx, si, si.to_local(direction)) * det;
        (direction, Spectrum::replace_grad(weight, eval.scale(1.0 / bs.pdf)))
    } else {
        let direction = wo_world.to_dual();
        let eval = bsdf.eval(ctx, si, si.to_local(direction));
        (direction, reattach_weight(weight, eval, bs.pdf))
    };
    Some(Scatter {
        sample: bs,
        direction,
        weight,
    })
}

/// Trace a single ray on its own sampler stream.
pub fn trace_single<S>(
    integrator: &PathIntegrator,
    scene: &S,
    seed: u64,
    ray: DRay,
) -> PathSample
where
    S: SceneQuery + ?Sized,
{
    let mut sampler = IndependentSampler::new();
    sampler.seed(seed, 1);
    let mask = LaneMask::all(1);
    integrator
        .sample(scene, &mut sampler, &[ray], &mask)
        .into_iter()
        .next()
        .unwrap_or_default()
}
