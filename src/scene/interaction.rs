//! Surface interactions and sampling records.

use crate::ad::Dual;
use crate::math::{DVec3, Frame, Vec2, Vec3, RAY_EPSILON};
use crate::ray::{DRay, Ray};

/// Detached reference point: the previous path vertex or a shading point seen by
/// a sampling routine.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Interaction {
    pub p: Vec3,
    /// Geometric normal; zero for points not on a surface.
    pub n: Vec3,
}

impl Interaction {
    pub fn new(p: Vec3, n: Vec3) -> Self {
        Self { p, n }
    }

    /// Detached ray from this point toward `target`, stopping just short of it.
    pub fn spawn_ray_to(&self, target: Vec3) -> Ray {
        let o = offset_origin(self.p, self.n, target - self.p);
        let delta = target - o;
        let dist = delta.length();
        Ray::with_maxt(o, delta.normalize(), dist * (1.0 - 1.0e-4))
    }

    /// Detached ray leaving this point in direction `d`.
    pub fn spawn_ray(&self, d: Vec3) -> Ray {
        Ray::new(offset_origin(self.p, self.n, d), d)
    }
}

/// Shift `p` off the surface, to the side `d` points into.
fn offset_origin(p: Vec3, n: Vec3, d: Vec3) -> Vec3 {
    if n == Vec3::ZERO {
        return p;
    }
    let side = if d.dot(n) >= 0.0 { 1.0 } else { -1.0 };
    p + n.scale(RAY_EPSILON * side * (1.0 + p.max_abs()))
}

/// Ray-surface intersection; positions and normals may carry derivatives.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct SurfaceInteraction {
    pub valid: bool,
    pub t: Dual,
    pub p: DVec3,
    /// Geometric normal.
    pub n: DVec3,
    /// Shading frame.
    pub sh_frame: Frame<Dual>,
    /// Incident direction (toward the ray origin) in the shading frame.
    pub wi: DVec3,
    pub uv: Vec2,
    /// Shape-local coordinates of the hit, used to re-attach follow-shape hits.
    pub local: Vec3,
    pub shape: Option<usize>,
}

impl SurfaceInteraction {
    /// Record for a ray that left the scene.
    pub fn miss(ray: &DRay) -> Self {
        Self {
            valid: false,
            t: Dual::constant(f32::INFINITY),
            wi: -ray.d,
            ..Default::default()
        }
    }

    pub fn to_local(&self, v: DVec3) -> DVec3 {
        self.sh_frame.to_local(v)
    }

    pub fn to_world(&self, v: DVec3) -> DVec3 {
        self.sh_frame.to_world(v)
    }

    /// Detached reference point.
    pub fn interaction(&self) -> Interaction {
        Interaction::new(self.p.value(), self.n.value())
    }

    /// Next path segment: attached origin, direction as given.
    pub fn spawn_ray(&self, d: DVec3) -> DRay {
        let n = self.n.value();
        let side = if d.value().dot(n) >= 0.0 { 1.0 } else { -1.0 };
        let offset = n.scale(RAY_EPSILON * side * (1.0 + self.p.value().max_abs()));
        Ray::new(self.p + offset.to_dual(), d)
    }
}

/// Which measure a direction sample was drawn under.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Measure {
    /// A position on a surface, converted to solid angle at the reference point.
    #[default]
    Area,
    /// Directly in solid angle.
    SolidAngle,
    /// Degenerate (delta) distribution.
    Discrete,
}

/// Detached sample of a direction toward an emitter or sensor.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct DirectionSample {
    /// Sampled position (at infinity for directional sources).
    pub p: Vec3,
    /// Surface normal at `p`, zero for non-surface sources.
    pub n: Vec3,
    /// Shape-local coordinates of `p`.
    pub local: Vec3,
    /// Unit direction from the reference point to `p`.
    pub d: Vec3,
    pub dist: f32,
    /// Density in solid angle at the reference point (emitter selection included).
    pub pdf: f32,
    pub delta: bool,
    pub measure: Measure,
    pub emitter: Option<usize>,
    pub shape: Option<usize>,
}

/// Detached sample of a position on a surface.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct PositionSample {
    pub p: Vec3,
    pub n: Vec3,
    pub local: Vec3,
    /// Density in area measure.
    pub pdf: f32,
    pub shape: Option<usize>,
}

/// Detached particle emitted from a light source.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EmitterRaySample {
    pub ray: Ray,
    /// Flux weight of the particle (radiance over the joint position/direction pdf).
    pub weight: crate::color::Color,
    /// Positional weight (emitter selection and area pdf), for the emission vertex.
    pub position_weight: f32,
    pub position: PositionSample,
    pub emitter: usize,
}
