//! Linear-scan scene over analytic shapes.

use crate::color::{Color, Spectrum};
use crate::math::{DVec3, Vec2, Vec3};
use crate::params::{visit_scalar, visit_spectrum, visit_vec3, ParamVisitor, Traversable};
use crate::ray::{DRay, Ray};

use super::bsdf::Bsdf;
use super::emitter::{BoundingSphere, Emitter};
use super::interaction::{
    DirectionSample, EmitterRaySample, Interaction, Measure, PositionSample, SurfaceInteraction,
};
use super::sensor::PerspectiveSensor;
use super::shape::{Shape, ShapeHit};
use super::{RayFlags, SceneQuery};

/// A named shape with its material and optional area emitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeEntry {
    pub name: String,
    pub shape: Shape,
    pub bsdf: Bsdf,
    pub emitter: Option<usize>,
}

/// A named emitter.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterEntry {
    pub name: String,
    pub emitter: Emitter,
}

/// Scene without an acceleration structure; every query scans all shapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicScene {
    shapes: Vec<ShapeEntry>,
    emitters: Vec<EmitterEntry>,
    sensor: Option<PerspectiveSensor>,
    bsphere: BoundingSphere,
}

impl BasicScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shape; returns its index.
    pub fn add_shape(&mut self, name: impl Into<String>, shape: Shape, bsdf: Bsdf) -> usize {
        self.shapes.push(ShapeEntry {
            name: name.into(),
            shape,
            bsdf,
            emitter: None,
        });
        self.update_bounds();
        self.shapes.len() - 1
    }

    /// Turn shape `shape` into an area light named `<shape>.emitter`.
    pub fn add_area_emitter(&mut self, shape: usize, radiance: Color) -> usize {
        let name = match self.shapes.get(shape) {
            Some(entry) => format!("{}.emitter", entry.name),
            None => format!("shape{shape}.emitter"),
        };
        self.add_emitter(name, Emitter::area(shape, radiance))
    }

    /// Add an emitter; returns its index.
    pub fn add_emitter(&mut self, name: impl Into<String>, emitter: Emitter) -> usize {
        let index = self.emitters.len();
        if let Emitter::Area { shape, .. } = emitter {
            if let Some(entry) = self.shapes.get_mut(shape) {
                entry.emitter = Some(index);
            }
        }
        self.emitters.push(EmitterEntry {
            name: name.into(),
            emitter,
        });
        index
    }

    pub fn set_sensor(&mut self, sensor: PerspectiveSensor) {
        self.sensor = Some(sensor);
        self.update_bounds();
    }

    pub fn shapes(&self) -> &[ShapeEntry] {
        &self.shapes
    }

    pub fn emitters(&self) -> &[EmitterEntry] {
        &self.emitters
    }

    fn update_bounds(&mut self) {
        let mut bounds: Option<(Vec3, Vec3)> = None;
        let points = self
            .shapes
            .iter()
            .map(|s| s.shape.bounds())
            .chain(self.sensor.iter().map(|s| {
                let o = s.origin.value();
                (o, o)
            }));
        for (lo, hi) in points {
            bounds = Some(match bounds {
                None => (lo, hi),
                Some((a, b)) => (
                    Vec3::new(a.x.min(lo.x), a.y.min(lo.y), a.z.min(lo.z)),
                    Vec3::new(b.x.max(hi.x), b.y.max(hi.y), b.z.max(hi.z)),
                ),
            });
        }
        self.bsphere = match bounds {
            Some((lo, hi)) => BoundingSphere {
                center: (lo + hi).scale(0.5),
                radius: ((hi - lo).length() * 0.5).max(1.0e-3),
            },
            None => BoundingSphere::default(),
        };
    }

    fn nearest(&self, ray: &Ray) -> Option<(usize, ShapeHit)> {
        let mut best: Option<(usize, ShapeHit)> = None;
        for (i, entry) in self.shapes.iter().enumerate() {
            if let Some(hit) = entry.shape.intersect(ray) {
                if best.as_ref().map_or(true, |(_, b)| hit.t < b.t) {
                    best = Some((i, hit));
                }
            }
        }
        best
    }

    fn emitter_shape(&self, emitter: &Emitter) -> Option<(usize, &Shape)> {
        match emitter {
            Emitter::Area { shape, .. } => self.shapes.get(*shape).map(|e| (*shape, &e.shape)),
            _ => None,
        }
    }

    fn environment(&self) -> Option<usize> {
        self.emitters
            .iter()
            .position(|e| matches!(e.emitter, Emitter::Constant { .. }))
    }

    fn emitter_pmf(&self) -> f32 {
        if self.emitters.is_empty() {
            0.0
        } else {
            1.0 / self.emitters.len() as f32
        }
    }
}

/// Pick one of `n` items with `sample`, returning the index and the sample
/// rescaled to `[0, 1)`.
fn select(sample: f32, n: usize) -> (usize, f32) {
    let scaled = sample * n as f32;
    let index = (scaled as usize).min(n.saturating_sub(1));
    (index, (scaled - index as f32).clamp(0.0, 1.0 - f32::EPSILON))
}

impl SceneQuery for BasicScene {
    fn ray_intersect(&self, ray: &DRay, flags: RayFlags) -> SurfaceInteraction {
        match self.nearest(&ray.value()) {
            Some((index, hit)) => {
                self.shapes[index]
                    .shape
                    .interaction(ray, &hit, flags.follow_shape, index)
            }
            None => SurfaceInteraction::miss(ray),
        }
    }

    fn ray_test(&self, ray: &Ray) -> bool {
        self.shapes.iter().any(|e| e.shape.intersect(ray).is_some())
    }

    fn sample_emitter_direction(
        &self,
        it: &Interaction,
        sample: Vec2,
        test_visibility: bool,
    ) -> (DirectionSample, Color) {
        if self.emitters.is_empty() {
            return (DirectionSample::default(), Color::BLACK);
        }
        let (index, ux) = select(sample.x, self.emitters.len());
        let emitter = &self.emitters[index].emitter;
        let shape = self.emitter_shape(emitter);
        let Some((mut ds, weight)) = emitter.sample_direction(
            it,
            Vec2::new(ux, sample.y),
            shape.map(|(_, s)| s),
            &self.bsphere,
        ) else {
            return (DirectionSample::default(), Color::BLACK);
        };
        let pmf = self.emitter_pmf();
        ds.pdf *= pmf;
        ds.emitter = Some(index);
        ds.shape = shape.map(|(i, _)| i);
        let mut weight = weight.scale(1.0 / pmf);
        if test_visibility {
            let shadow = if ds.dist.is_finite() {
                it.spawn_ray_to(ds.p)
            } else {
                it.spawn_ray(ds.d)
            };
            if self.ray_test(&shadow) {
                weight = Color::BLACK;
            }
        }
        (ds, weight)
    }

    fn pdf_emitter_direction(&self, _it: &Interaction, ds: &DirectionSample) -> f32 {
        let Some(entry) = ds.emitter.and_then(|i| self.emitters.get(i)) else {
            return 0.0;
        };
        let shape = self.emitter_shape(&entry.emitter).map(|(_, s)| s);
        self.emitter_pmf() * entry.emitter.pdf_direction(ds, shape)
    }

    fn eval_emitter_direction(&self, si: &SurfaceInteraction) -> Spectrum {
        let emitter = if si.valid {
            si.shape
                .and_then(|i| self.shapes.get(i))
                .and_then(|e| e.emitter)
        } else {
            self.environment()
        };
        match emitter.and_then(|i| self.emitters.get(i)) {
            Some(entry) => entry.emitter.eval(si),
            None => Spectrum::zero(),
        }
    }

    fn emitter_hit(
        &self,
        it: &Interaction,
        si: &SurfaceInteraction,
        ray: &Ray,
    ) -> Option<DirectionSample> {
        if si.valid {
            let index = si.shape?;
            let emitter = self.shapes.get(index)?.emitter?;
            let p = si.p.value();
            Some(DirectionSample {
                p,
                n: si.n.value(),
                local: si.local,
                d: ray.d,
                dist: (p - it.p).length(),
                pdf: 0.0,
                delta: false,
                measure: Measure::Area,
                emitter: Some(emitter),
                shape: Some(index),
            })
        } else {
            let emitter = self.environment()?;
            Some(DirectionSample {
                d: ray.d,
                dist: f32::INFINITY,
                measure: Measure::SolidAngle,
                emitter: Some(emitter),
                ..Default::default()
            })
        }
    }

    fn emitter_radiance(&self, index: usize) -> Spectrum {
        self.emitters
            .get(index)
            .map_or_else(Spectrum::zero, |e| e.emitter.radiance())
    }

    fn bsdf(&self, si: &SurfaceInteraction) -> Option<&Bsdf> {
        if !si.valid {
            return None;
        }
        si.shape.and_then(|i| self.shapes.get(i)).map(|e| &e.bsdf)
    }

    fn boundary_test(&self, ray: &Ray, si: &SurfaceInteraction) -> f32 {
        match si.shape.and_then(|i| self.shapes.get(i)) {
            Some(entry) if si.valid => entry.shape.boundary_test(ray, si),
            _ => f32::INFINITY,
        }
    }

    fn sample_emitter_ray(
        &self,
        sample_emitter: f32,
        sample_pos: Vec2,
        sample_dir: Vec2,
    ) -> Option<EmitterRaySample> {
        if self.emitters.is_empty() {
            return None;
        }
        let (index, _) = select(sample_emitter, self.emitters.len());
        let emitter = &self.emitters[index].emitter;
        let shape = self.emitter_shape(emitter);
        let emitted =
            emitter.sample_ray(sample_pos, sample_dir, shape.map(|(_, s)| s), &self.bsphere)?;
        let inv_pmf = self.emitters.len() as f32;
        Some(EmitterRaySample {
            ray: emitted.ray,
            weight: emitted.weight.scale(inv_pmf),
            position_weight: emitted.position_weight * inv_pmf,
            position: PositionSample {
                shape: shape.map(|(i, _)| i),
                ..emitted.position
            },
            emitter: index,
        })
    }

    fn attach_position(&self, ps: &PositionSample) -> Option<(DVec3, DVec3)> {
        let entry = self.shapes.get(ps.shape?)?;
        Some(entry.shape.position_attached(ps.local))
    }

    fn sensor(&self) -> Option<&PerspectiveSensor> {
        self.sensor.as_ref()
    }

    fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    fn bounding_sphere(&self) -> BoundingSphere {
        self.bsphere
    }
}

impl Traversable for BasicScene {
    fn traverse(&mut self, visitor: &mut ParamVisitor<'_>) {
        for entry in &mut self.shapes {
            match &mut entry.shape {
                Shape::Rectangle(rect) => {
                    visit_vec3(visitor, &format!("{}.translation", entry.name), &mut rect.translation);
                }
                Shape::Sphere(sphere) => {
                    visit_vec3(visitor, &format!("{}.center", entry.name), &mut sphere.center);
                    visit_scalar(visitor, &format!("{}.radius", entry.name), &mut sphere.radius);
                }
            }
            match &mut entry.bsdf {
                Bsdf::Diffuse { reflectance } => {
                    visit_spectrum(visitor, &format!("{}.bsdf.reflectance", entry.name), reflectance);
                }
                Bsdf::Mirror { specular } => {
                    visit_spectrum(visitor, &format!("{}.bsdf.specular", entry.name), specular);
                }
            }
        }
        for entry in &mut self.emitters {
            match &mut entry.emitter {
                Emitter::Area { radiance, .. } | Emitter::Constant { radiance } => {
                    visit_spectrum(visitor, &format!("{}.radiance", entry.name), radiance);
                }
                Emitter::Directional { irradiance, .. } => {
                    visit_spectrum(visitor, &format!("{}.irradiance", entry.name), irradiance);
                }
            }
        }
        if let Some(sensor) = self.sensor.as_mut() {
            visit_vec3(visitor, "sensor.origin", &mut sensor.origin);
        }
    }

    fn parameters_changed(&mut self, keys: &[String]) {
        tracing::trace!(?keys, "refreshing scene bounds");
        self.update_bounds();
    }
}
