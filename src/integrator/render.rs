use rayon::prelude::*;

use crate::ad::Dual;
use crate::error::{RenderError, RenderResult};
use crate::film::DiffImage;
use crate::math::Vec2;
use crate::ray::DRay;
use crate::sampler::{IndependentSampler, Sampler};
use crate::scene::SceneQuery;
use crate::warp::reparameterize_ray;

use super::lanes::LaneMask;
use super::path::PathIntegrator;

/// Camera sample of one lane: the pixel it belongs to, its primary ray and the
/// divergence factor of the primary reparameterization.
struct PrimarySample {
    pixel: usize,
    ray: DRay,
    det: Dual,
}

/// Render the sensor's image with `spp` jittered paths per pixel.
///
/// Lanes are numbered globally as `pixel * spp + sample` and keyed into the
/// sampler by that number, so the result does not depend on the wavefront size.
pub fn render<S>(
    scene: &S,
    integrator: &PathIntegrator,
    seed: u64,
    spp: u32,
) -> RenderResult<DiffImage>
where
    S: SceneQuery + ?Sized,
{
    let sensor = scene.sensor().ok_or(RenderError::MissingSensor)?;
    if spp == 0 {
        return Err(RenderError::config("spp must be at least 1"));
    }
    let (width, height) = sensor.resolution();
    let spp = spp as usize;
    let total = sensor.pixel_count() * spp;
    let span = tracing::info_span!("render", width, height, spp, seed);
    let _guard = span.enter();

    let config = integrator.config();
    let inv_spp = 1.0 / spp as f32;
    let mut image = DiffImage::new(width, height);
    let mut start = 0usize;
    let mut wavefronts = 0usize;
    while start < total {
        let n = config.wavefront_size.min(total - start);
        let mut sampler = IndependentSampler::new();
        sampler.seed_range(seed, start as u64, n);

        let primaries: Vec<PrimarySample> = sampler
            .lanes_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(i, rng)| {
                let pixel = (start + i) / spp;
                let x = (pixel % width as usize) as f32;
                let y = (pixel / width as usize) as f32;
                let jitter = rng.next_2d();
                let mut ray = sensor.sample_ray(Vec2::new(x + jitter.x, y + jitter.y));
                let det = match config.reparam.as_ref() {
                    Some(reparam) => {
                        let (d, det) = reparameterize_ray(scene, rng, &ray, reparam, true);
                        ray.d = d;
                        det
                    }
                    None => Dual::ONE,
                };
                PrimarySample { pixel, ray, det }
            })
            .collect();

        let rays: Vec<DRay> = primaries.iter().map(|p| p.ray).collect();
        let samples = integrator.sample(scene, &mut sampler, &rays, &LaneMask::all(n));
        for (primary, sample) in primaries.iter().zip(samples) {
            image.pixels[primary.pixel] += (sample.radiance * primary.det).scale(inv_spp);
        }
        start += n;
        wavefronts += 1;
    }
    tracing::debug!(wavefronts, lanes = total, "render finished");
    Ok(image)
}
