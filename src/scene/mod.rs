//! Scene query interface and a small analytic reference scene.
//!
//! The integrators only talk to [`SceneQuery`]. Sampling methods take and return
//! detached (`f32`) records; methods returning [`SurfaceInteraction`] or
//! [`Spectrum`] are attached and carry derivatives with respect to the scene
//! parameters.

mod basic;
mod bsdf;
mod emitter;
mod interaction;
mod sensor;
mod shape;

pub use basic::{BasicScene, EmitterEntry, ShapeEntry};
pub use bsdf::{reattach_weight, Bsdf, BsdfContext, BsdfSample, TransportMode};
pub use emitter::{BoundingSphere, Emitter};
pub use interaction::{
    DirectionSample, EmitterRaySample, Interaction, Measure, PositionSample, SurfaceInteraction,
};
pub use sensor::{PerspectiveSensor, SensorConnection};
pub use shape::{Rectangle, Shape, ShapeHit, Sphere};

use crate::color::{Color, Spectrum};
use crate::math::{DVec3, Vec2};
use crate::ray::{DRay, Ray};

/// Intersection options.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RayFlags {
    /// Return a hit point attached to the shape rather than to the ray.
    pub follow_shape: bool,
}

impl RayFlags {
    pub const FOLLOW_SHAPE: Self = Self { follow_shape: true };
}

/// Queries the integrators issue against a scene.
pub trait SceneQuery: Sync {
    /// Nearest intersection; invalid when the ray leaves the scene.
    fn ray_intersect(&self, ray: &DRay, flags: RayFlags) -> SurfaceInteraction;

    /// True when anything blocks `ray` within `(0, ray.maxt)`.
    fn ray_test(&self, ray: &Ray) -> bool;

    /// Sample a direction toward an emitter. The returned weight is the emitted
    /// radiance over the sampling density, zero when the sample failed or (with
    /// `test_visibility`) is occluded.
    fn sample_emitter_direction(
        &self,
        it: &Interaction,
        sample: Vec2,
        test_visibility: bool,
    ) -> (DirectionSample, Color);

    /// Density with which `sample_emitter_direction` would produce `ds`.
    fn pdf_emitter_direction(&self, it: &Interaction, ds: &DirectionSample) -> f32;

    /// Attached radiance leaving `si` toward the origin of its ray, or arriving
    /// from the environment when `si` is a miss.
    fn eval_emitter_direction(&self, si: &SurfaceInteraction) -> Spectrum;

    /// Direction record of the emitter found by `ray` (cast from `it`), if any.
    fn emitter_hit(
        &self,
        it: &Interaction,
        si: &SurfaceInteraction,
        ray: &Ray,
    ) -> Option<DirectionSample>;

    /// Attached emitted quantity of emitter `index`.
    fn emitter_radiance(&self, index: usize) -> Spectrum;

    fn bsdf(&self, si: &SurfaceInteraction) -> Option<&Bsdf>;

    /// Silhouette proximity of the hit shape as seen along `ray`; `+inf` on a miss.
    fn boundary_test(&self, ray: &Ray, si: &SurfaceInteraction) -> f32;

    /// Emit a particle from a light source.
    fn sample_emitter_ray(
        &self,
        sample_emitter: f32,
        sample_pos: Vec2,
        sample_dir: Vec2,
    ) -> Option<EmitterRaySample>;

    /// Attached position and normal of a detached surface position sample.
    fn attach_position(&self, ps: &PositionSample) -> Option<(DVec3, DVec3)>;

    fn sensor(&self) -> Option<&PerspectiveSensor>;

    fn shape_count(&self) -> usize;

    fn emitter_count(&self) -> usize;

    fn bounding_sphere(&self) -> BoundingSphere;
}
