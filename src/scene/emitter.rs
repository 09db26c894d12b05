//! Light sources.
//!
//! Densities returned here exclude the emitter-selection probability; the scene
//! folds that in.

use crate::color::{Color, Spectrum};
use crate::math::{Frame, Vec2, Vec3, INV_FOUR_PI, PI};
use crate::ray::Ray;
use crate::sampling::{
    square_to_cosine_hemisphere, square_to_uniform_disk_concentric, square_to_uniform_sphere,
};

use super::interaction::{
    DirectionSample, Interaction, Measure, PositionSample, SurfaceInteraction,
};
use super::shape::Shape;

/// Sphere enclosing the scene, used to emit particles from infinite sources.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 1.0,
        }
    }
}

/// Emitter models.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Emitter {
    /// One-sided diffuse emission from the front of a shape.
    Area { shape: usize, radiance: Spectrum },
    /// Parallel light travelling along `direction`, with irradiance measured
    /// perpendicular to it.
    Directional { direction: Vec3, irradiance: Spectrum },
    /// Uniform environment.
    Constant { radiance: Spectrum },
}

/// Detached particle leaving an emitter, before emitter selection.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct EmittedRay {
    pub ray: Ray,
    pub weight: Color,
    pub position: PositionSample,
    pub position_weight: f32,
}

impl Emitter {
    pub fn area(shape: usize, radiance: Color) -> Self {
        Emitter::Area {
            shape,
            radiance: radiance.to_spectrum(),
        }
    }

    pub fn directional(direction: Vec3, irradiance: Color) -> Self {
        Emitter::Directional {
            direction: direction.normalize(),
            irradiance: irradiance.to_spectrum(),
        }
    }

    pub fn constant(radiance: Color) -> Self {
        Emitter::Constant {
            radiance: radiance.to_spectrum(),
        }
    }

    /// True for emitters that can only be reached by explicit sampling.
    pub fn is_delta(&self) -> bool {
        matches!(self, Emitter::Directional { .. })
    }

    /// True for emitters at infinity.
    pub fn is_infinite(&self) -> bool {
        matches!(self, Emitter::Directional { .. } | Emitter::Constant { .. })
    }

    /// Attached emitted quantity (radiance or irradiance).
    pub fn radiance(&self) -> Spectrum {
        match self {
            Emitter::Area { radiance, .. } | Emitter::Constant { radiance } => *radiance,
            Emitter::Directional { irradiance, .. } => *irradiance,
        }
    }

    /// Radiance leaving `si` toward the origin of the ray that found it, or
    /// arriving from the environment when `si` is a miss.
    pub fn eval(&self, si: &SurfaceInteraction) -> Spectrum {
        match self {
            Emitter::Area { radiance, .. } if si.valid && si.wi.z.value() > 0.0 => *radiance,
            Emitter::Constant { radiance } if !si.valid => *radiance,
            _ => Spectrum::zero(),
        }
    }

    /// Sample a direction from `it` toward this emitter.
    pub(crate) fn sample_direction(
        &self,
        it: &Interaction,
        u: Vec2,
        shape: Option<&Shape>,
        bsphere: &BoundingSphere,
    ) -> Option<(DirectionSample, Color)> {
        match self {
            Emitter::Area { radiance, .. } => {
                let shape = shape?;
                let ps = shape.sample_position(u);
                let delta = ps.p - it.p;
                let dist2 = delta.length_squared();
                if dist2 <= 0.0 {
                    return None;
                }
                let dist = dist2.sqrt();
                let d = delta.scale(1.0 / dist);
                let cos_l = ps.n.dot(-d);
                if cos_l <= 0.0 {
                    return None;
                }
                let pdf = ps.pdf * dist2 / cos_l;
                let ds = DirectionSample {
                    p: ps.p,
                    n: ps.n,
                    local: ps.local,
                    d,
                    dist,
                    pdf,
                    delta: false,
                    measure: Measure::Area,
                    emitter: None,
                    shape: None,
                };
                Some((ds, radiance.value() / pdf))
            }
            Emitter::Directional {
                direction,
                irradiance,
            } => {
                let d = -*direction;
                let ds = DirectionSample {
                    p: it.p + d.scale(2.0 * bsphere.radius + (it.p - bsphere.center).length()),
                    d,
                    dist: f32::INFINITY,
                    pdf: 1.0,
                    delta: true,
                    measure: Measure::Discrete,
                    ..Default::default()
                };
                Some((ds, irradiance.value()))
            }
            Emitter::Constant { radiance } => {
                let d = square_to_uniform_sphere(u);
                let pdf = INV_FOUR_PI;
                let ds = DirectionSample {
                    p: it.p + d.scale(2.0 * bsphere.radius + (it.p - bsphere.center).length()),
                    d,
                    dist: f32::INFINITY,
                    pdf,
                    delta: false,
                    measure: Measure::SolidAngle,
                    ..Default::default()
                };
                Some((ds, radiance.value() / pdf))
            }
        }
    }

    /// Solid-angle density of `sample_direction` producing `ds`.
    pub(crate) fn pdf_direction(&self, ds: &DirectionSample, shape: Option<&Shape>) -> f32 {
        match self {
            Emitter::Area { .. } => {
                let Some(shape) = shape else {
                    return 0.0;
                };
                let cos_l = ds.n.dot(-ds.d);
                if cos_l <= 0.0 {
                    return 0.0;
                }
                shape.pdf_position() * ds.dist * ds.dist / cos_l
            }
            Emitter::Directional { .. } => 0.0,
            Emitter::Constant { .. } => INV_FOUR_PI,
        }
    }

    /// Sample a particle: a position and an outgoing direction.
    pub(crate) fn sample_ray(
        &self,
        sample_pos: Vec2,
        sample_dir: Vec2,
        shape: Option<&Shape>,
        bsphere: &BoundingSphere,
    ) -> Option<EmittedRay> {
        match self {
            Emitter::Area { radiance, .. } => {
                let shape = shape?;
                let ps = shape.sample_position(sample_pos);
                let local = square_to_cosine_hemisphere(sample_dir);
                if local.z <= 0.0 {
                    return None;
                }
                let d = Frame::from_normal(ps.n).to_world(local);
                let ray = Interaction::new(ps.p, ps.n).spawn_ray(d);
                // Le cos / (pdf_area * cos / pi)
                let weight = radiance.value().scale(PI / ps.pdf);
                Some(EmittedRay {
                    ray,
                    weight,
                    position: ps,
                    position_weight: 1.0 / ps.pdf,
                })
            }
            Emitter::Directional {
                direction,
                irradiance,
            } => {
                let (o, disk_area) = disk_origin(*direction, -*direction, sample_pos, bsphere);
                Some(EmittedRay {
                    ray: Ray::new(o, *direction),
                    weight: irradiance.value().scale(disk_area),
                    position: PositionSample {
                        p: o,
                        n: *direction,
                        local: Vec3::ZERO,
                        pdf: 1.0 / disk_area,
                        shape: None,
                    },
                    position_weight: disk_area,
                })
            }
            Emitter::Constant { radiance } => {
                let toward_light = square_to_uniform_sphere(sample_dir);
                let d = -toward_light;
                let (o, disk_area) = disk_origin(d, toward_light, sample_pos, bsphere);
                Some(EmittedRay {
                    ray: Ray::new(o, d),
                    weight: radiance.value().scale(disk_area / INV_FOUR_PI),
                    position: PositionSample {
                        p: o,
                        n: d,
                        local: Vec3::ZERO,
                        pdf: 1.0 / disk_area,
                        shape: None,
                    },
                    position_weight: disk_area,
                })
            }
        }
    }
}

/// Point on the disk perpendicular to `d` that covers the bounding sphere, placed on
/// the sphere's `side` hemisphere. Returns the point and the disk area.
fn disk_origin(d: Vec3, side: Vec3, u: Vec2, bsphere: &BoundingSphere) -> (Vec3, f32) {
    let frame = Frame::from_normal(d);
    let q = square_to_uniform_disk_concentric(u);
    let r = bsphere.radius;
    let o = bsphere.center
        + side.scale(r)
        + frame.s.scale(q.x * r)
        + frame.t.scale(q.y * r);
    (o, PI * r * r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::shape::Rectangle;
    use approx::assert_relative_eq;

    #[test]
    fn area_direction_pdf_matches_sampling() {
        let shape = Shape::Rectangle(Rectangle::new(
            Vec3::new(0.0, 0.0, 3.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec2::new(0.5, 0.5),
        ));
        let emitter = Emitter::area(0, Color::splat(2.0));
        let it = Interaction::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let bsphere = BoundingSphere::default();
        let (ds, weight) = emitter
            .sample_direction(&it, Vec2::new(0.25, 0.8), Some(&shape), &bsphere)
            .unwrap();
        assert_relative_eq!(
            emitter.pdf_direction(&ds, Some(&shape)),
            ds.pdf,
            max_relative = 1e-5
        );
        assert_relative_eq!(weight.r * ds.pdf, 2.0, max_relative = 1e-5);
    }

    #[test]
    fn area_emission_is_one_sided() {
        let emitter = Emitter::area(0, Color::WHITE);
        let mut si = SurfaceInteraction {
            valid: true,
            wi: Vec3::new(0.0, 0.0, 1.0).to_dual(),
            ..Default::default()
        };
        assert_relative_eq!(emitter.eval(&si).g.value(), 1.0);
        si.wi = Vec3::new(0.0, 0.0, -1.0).to_dual();
        assert!(emitter.eval(&si).is_black());
    }

    #[test]
    fn directional_particles_carry_disk_flux() {
        let emitter = Emitter::directional(Vec3::new(0.0, 0.0, -1.0), Color::WHITE);
        let bsphere = BoundingSphere {
            center: Vec3::ZERO,
            radius: 2.0,
        };
        let particle = emitter
            .sample_ray(Vec2::new(0.5, 0.5), Vec2::ZERO, None, &bsphere)
            .unwrap();
        assert_relative_eq!(particle.weight.r, PI * 4.0, max_relative = 1e-5);
        assert!(particle.ray.o.z > 1.9);
        assert_relative_eq!(particle.ray.d.z, -1.0);
    }
}
