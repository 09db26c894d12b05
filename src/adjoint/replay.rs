use rayon::prelude::*;

use crate::ad::{Dual, GradAccumulator};
use crate::color::{Color, Spectrum};
use crate::config::IntegratorConfig;
use crate::error::{RenderError, RenderResult};
use crate::film::{Image, ImageBlock};
use crate::integrator::{russian_roulette, scatter};
use crate::math::{DVec3, Vec2, Vec3};
use crate::params::{Gradients, SceneParameters};
use crate::ray::DRay;
use crate::sampler::{IndependentSampler, Pcg32, Sampler};
use crate::scene::{
    Bsdf, BsdfContext, EmitterRaySample, Interaction, PerspectiveSensor, RayFlags, SceneQuery,
    SurfaceInteraction, TransportMode,
};

/// Primal image and parameter gradients of one backward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BackwardResult {
    /// Light-traced image of the primal pass.
    pub image: Image,
    /// Gradient of `sum(image_adjoint * image)` for every differentiated key.
    pub gradients: Gradients,
}

/// Light tracer whose replay pass turns an image-space adjoint into parameter
/// gradients.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjointIntegrator {
    config: IntegratorConfig,
}

impl AdjointIntegrator {
    /// Validate `config` and build the integrator.
    pub fn new(config: IntegratorConfig) -> RenderResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Light-trace the sensor's image with `spp` particles per pixel.
    pub fn render<S>(&self, scene: &S, seed: u64, spp: u32) -> RenderResult<Image>
    where
        S: SceneQuery + ?Sized,
    {
        let sensor = self.check(scene, spp)?;
        let span = tracing::info_span!("light_trace", spp, seed);
        let _guard = span.enter();
        Ok(self.primal_pass(scene, sensor, seed, spp as usize))
    }

    /// Propagate `image_adjoint` (the loss gradient per pixel and channel) back
    /// to the differentiated entries of `params`.
    ///
    /// The primal pass deposits the light-traced image. The replay pass reseeds
    /// every lane identically, retraces the same particles with derivatives and
    /// weights each contribution by the adjoint at the film position it lands on.
    pub fn render_backward<S>(
        &self,
        scene: &S,
        params: &SceneParameters,
        image_adjoint: &Image,
        seed: u64,
        spp: u32,
    ) -> RenderResult<BackwardResult>
    where
        S: SceneQuery + ?Sized,
    {
        let sensor = self.check(scene, spp)?;
        let (width, height) = sensor.resolution();
        let expected = sensor.pixel_count() * 3;
        if image_adjoint.width != width
            || image_adjoint.height != height
            || image_adjoint.pixels.len() != expected
        {
            return Err(RenderError::ImageSize {
                expected,
                got: image_adjoint.pixels.len(),
            });
        }
        let span = tracing::info_span!("render_backward", width, height, spp, seed);
        let _guard = span.enter();
        let spp = spp as usize;

        let image = {
            let _primal = tracing::debug_span!("primal").entered();
            self.primal_pass(scene, sensor, seed, spp)
        };
        let acc = {
            let _replay = tracing::debug_span!("replay").entered();
            self.replay_pass(scene, sensor, image_adjoint, seed, spp)
        };
        let mut gradients = params.gradients();
        gradients.absorb(&acc);
        Ok(BackwardResult { image, gradients })
    }

    fn check<'a, S>(&self, scene: &'a S, spp: u32) -> RenderResult<&'a PerspectiveSensor>
    where
        S: SceneQuery + ?Sized,
    {
        if scene.shape_count() == 0 {
            return Err(RenderError::EmptyScene);
        }
        if scene.emitter_count() == 0 {
            return Err(RenderError::NoParticleEmitter);
        }
        let sensor = scene.sensor().ok_or(RenderError::MissingSensor)?;
        if spp == 0 {
            return Err(RenderError::config("spp must be at least 1"));
        }
        Ok(sensor)
    }

    /// Seeded samplers for consecutive wavefronts covering `total` particles.
    fn wavefronts(&self, seed: u64, total: usize) -> impl Iterator<Item = IndependentSampler> {
        let size = self.config.wavefront_size;
        (0..total).step_by(size).map(move |start| {
            let mut sampler = IndependentSampler::new();
            sampler.seed_range(seed, start as u64, size.min(total - start));
            sampler
        })
    }

    fn primal_pass<S>(
        &self,
        scene: &S,
        sensor: &PerspectiveSensor,
        seed: u64,
        spp: usize,
    ) -> Image
    where
        S: SceneQuery + ?Sized,
    {
        let (width, height) = sensor.resolution();
        let inv_spp = 1.0 / spp as f32;
        let total = sensor.pixel_count() * spp;
        let mut image = ImageBlock::new(width, height);
        for mut sampler in self.wavefronts(seed, total) {
            let block = sampler
                .lanes_mut()
                .par_iter_mut()
                .fold(
                    || ImageBlock::new(width, height),
                    |mut block, rng| {
                        self.trace_particle(scene, sensor, rng, inv_spp, |pos, value| {
                            block.put(pos, value.value())
                        });
                        block
                    },
                )
                .reduce(|| ImageBlock::new(width, height), ImageBlock::merge);
            image = image.merge(block);
        }
        tracing::debug!(particles = total, "primal pass finished");
        image.to_image()
    }

    fn replay_pass<S>(
        &self,
        scene: &S,
        sensor: &PerspectiveSensor,
        image_adjoint: &Image,
        seed: u64,
        spp: usize,
    ) -> GradAccumulator
    where
        S: SceneQuery + ?Sized,
    {
        let inv_spp = 1.0 / spp as f32;
        let total = sensor.pixel_count() * spp;
        let mut acc = GradAccumulator::new();
        for mut sampler in self.wavefronts(seed, total) {
            let partial = sampler
                .lanes_mut()
                .par_iter_mut()
                .fold(GradAccumulator::new, |mut acc, rng| {
                    self.trace_particle(scene, sensor, rng, inv_spp, |pos, value| {
                        accumulate_splat(&mut acc, value, image_adjoint.read(pos));
                    });
                    acc
                })
                .reduce(GradAccumulator::new, GradAccumulator::merge);
            acc = acc.merge(partial);
        }
        tracing::debug!(particles = total, "replay pass finished");
        acc
    }

    /// Emit one particle and hand every sensor connection to `sink` as a film
    /// position and an attached contribution already divided by `spp`.
    fn trace_particle<S, F>(
        &self,
        scene: &S,
        sensor: &PerspectiveSensor,
        rng: &mut Pcg32,
        inv_spp: f32,
        mut sink: F,
    ) where
        S: SceneQuery + ?Sized,
        F: FnMut(Vec2, Spectrum),
    {
        let config = &self.config;
        let ctx = BsdfContext::new(TransportMode::Importance);
        let s_emitter = rng.next_1d();
        let s_position = rng.next_2d();
        let s_direction = rng.next_2d();
        let Some(ers) = scene.sample_emitter_ray(s_emitter, s_position, s_direction) else {
            return;
        };
        let emitted = scene.emitter_radiance(ers.emitter);

        let mut origin = ers.ray.o.to_dual();
        if let Some((p, n)) = scene.attach_position(&ers.position) {
            origin = p + (ers.ray.o - ers.position.p).to_dual();
            if !config.hide_emitters {
                if let Some((pos, value)) = connect_emission(scene, sensor, &ers, p, n, emitted) {
                    sink(pos, value.scale(inv_spp));
                }
            }
        }

        let mut ray = DRay::new(origin, ers.ray.d.to_dual());
        let mut beta = relative_weight(ers.weight, emitted);
        let mut eta = 1.0;
        for depth in 1..config.max_depth {
            let si = scene.ray_intersect(&ray, RayFlags::default());
            if !si.valid {
                break;
            }
            let Some(bsdf) = scene.bsdf(&si) else {
                break;
            };
            if bsdf.has_smooth() {
                if let Some((pos, value)) = connect_sensor(scene, sensor, &si, bsdf, &ctx) {
                    sink(pos, (beta * value).scale(inv_spp));
                }
            }
            if depth + 1 >= config.max_depth {
                break;
            }

            let Some(next) = scatter(scene, rng, &si, bsdf, &ctx, config.reparam.as_ref()) else {
                break;
            };
            let Some(correction) = shading_correction(&si, next.direction.value()) else {
                break;
            };
            beta = beta * next.weight.scale(correction);
            eta *= next.sample.eta;
            ray = si.spawn_ray(next.direction);

            let beta_max = beta.max_channel();
            if !(beta_max > 0.0) {
                break;
            }
            if depth >= config.rr_depth {
                match russian_roulette(beta_max, eta, rng.next_1d()) {
                    Some(q) => beta = beta.scale(1.0 / q),
                    None => break,
                }
            }
        }
    }
}

/// Contract one splat against its pixel adjoint. Splats the primal film would
/// reject leave no gradient either.
fn accumulate_splat(acc: &mut GradAccumulator, value: Spectrum, adjoint: Color) {
    if !value.is_finite() {
        return;
    }
    acc.backward(value.r, adjoint.r);
    acc.backward(value.g, adjoint.g);
    acc.backward(value.b, adjoint.b);
}

/// Detached `weight` carrying the relative derivative of `attached`.
fn relative_weight(weight: Color, attached: Spectrum) -> Spectrum {
    let channel = |w: f32, a: Dual| {
        if a.v != 0.0 {
            Dual::replace_grad(w, a * (w / a.v))
        } else {
            Dual::constant(w)
        }
    };
    Spectrum::new(
        channel(weight.r, attached.r),
        channel(weight.g, attached.g),
        channel(weight.b, attached.b),
    )
}

/// Connection of a surface emission vertex to the sensor.
fn connect_emission<S>(
    scene: &S,
    sensor: &PerspectiveSensor,
    ers: &EmitterRaySample,
    p: DVec3,
    n: DVec3,
    emitted: Spectrum,
) -> Option<(Vec2, Spectrum)>
where
    S: SceneQuery + ?Sized,
{
    let conn = sensor.sample_direction_attached(p)?;
    let cos = n.dot(conn.d);
    if cos.value() <= 0.0 {
        return None;
    }
    let ps = &ers.position;
    let shadow = Interaction::new(ps.p, ps.n).spawn_ray_to(sensor.origin.value());
    if scene.ray_test(&shadow) {
        return None;
    }
    Some((conn.film_pos, emitted * (cos * conn.weight * ers.position_weight)))
}

/// Connection of a scattering vertex to the sensor: BSDF toward the sensor times
/// the sensor weight, with the shading-normal correction of adjoint transport.
fn connect_sensor<S>(
    scene: &S,
    sensor: &PerspectiveSensor,
    si: &SurfaceInteraction,
    bsdf: &Bsdf,
    ctx: &BsdfContext,
) -> Option<(Vec2, Spectrum)>
where
    S: SceneQuery + ?Sized,
{
    let conn = sensor.sample_direction_attached(si.p)?;
    let correction = shading_correction(si, conn.d.value())?;
    let shadow = si.interaction().spawn_ray_to(sensor.origin.value());
    if scene.ray_test(&shadow) {
        return None;
    }
    let f = bsdf.eval(ctx, si, si.to_local(conn.d));
    Some((conn.film_pos, (f * conn.weight).scale(correction)))
}

/// Adjoint BSDF correction `|cos_i (n_g . wo) / (cos_o (n_g . wi))|` for an
/// outgoing world direction `wo`. `None` when either direction lies on opposite
/// sides of the geometric and shading normals.
fn shading_correction(si: &SurfaceInteraction, wo: Vec3) -> Option<f32> {
    let frame = si.sh_frame.value();
    let ng = si.n.value();
    let wi_local = si.wi.value();
    let wo_local = frame.to_local(wo);
    let wi_dot_ng = ng.dot(frame.to_world(wi_local));
    let wo_dot_ng = ng.dot(wo);
    if wi_dot_ng * wi_local.z <= 0.0 || wo_dot_ng * wo_local.z <= 0.0 {
        return None;
    }
    let correction = ((wi_local.z * wo_dot_ng) / (wo_local.z * wi_dot_ng)).abs();
    correction.is_finite().then_some(correction)
}
