//! Analytic shapes: detached nearest-hit queries, attached interactions, follow-shape
//! re-attachment and silhouette boundary tests.

use crate::ad::Dual;
use crate::math::{DVec3, Frame, Vec2, Vec3, PI};
use crate::ray::{DRay, Ray};
use crate::sampling::{square_to_centered_square, square_to_uniform_sphere};

use super::interaction::{PositionSample, SurfaceInteraction};

/// Parallelogram spanning `[-1, 1]^2` in the local `z = 0` plane.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rectangle {
    /// World-space center; differentiable.
    pub translation: DVec3,
    /// Orientation; `frame.n` is the emitting/front side.
    pub frame: Frame,
    /// Half extents along `frame.s` and `frame.t`.
    pub half_size: Vec2,
}

impl Rectangle {
    /// Rectangle centered at `center` facing `normal`.
    pub fn new(center: Vec3, normal: Vec3, half_size: Vec2) -> Self {
        Self {
            translation: center.to_dual(),
            frame: Frame::from_normal(normal.normalize()),
            half_size,
        }
    }

    pub fn area(&self) -> f32 {
        4.0 * self.half_size.x * self.half_size.y
    }

    fn corners(&self) -> [Vec3; 4] {
        let c = self.translation.value();
        let s = self.frame.s.scale(self.half_size.x);
        let t = self.frame.t.scale(self.half_size.y);
        [c + s + t, c + s - t, c - s + t, c - s - t]
    }
}

/// Sphere with differentiable center and radius.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sphere {
    pub center: DVec3,
    pub radius: Dual,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center: center.to_dual(),
            radius: Dual::constant(radius),
        }
    }

    pub fn area(&self) -> f32 {
        let r = self.radius.value();
        4.0 * PI * r * r
    }
}

/// Shapes understood by [`BasicScene`](super::BasicScene).
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Shape {
    /// Planar rectangle.
    Rectangle(Rectangle),
    /// Sphere.
    Sphere(Sphere),
}

/// Detached nearest-hit record.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ShapeHit {
    pub t: f32,
    pub local: Vec3,
}

impl Shape {
    /// Detached ray intersection in `(0, ray.maxt)`.
    pub fn intersect(&self, ray: &Ray) -> Option<ShapeHit> {
        match self {
            Shape::Rectangle(rect) => {
                let n = rect.frame.n;
                let denom = ray.d.dot(n);
                if denom.abs() < 1.0e-12 {
                    return None;
                }
                let c = rect.translation.value();
                let t = (c - ray.o).dot(n) / denom;
                if !(t > 0.0 && t < ray.maxt) {
                    return None;
                }
                let rel = ray.at(t) - c;
                let u = rel.dot(rect.frame.s) / rect.half_size.x;
                let v = rel.dot(rect.frame.t) / rect.half_size.y;
                if u.abs() > 1.0 || v.abs() > 1.0 {
                    return None;
                }
                Some(ShapeHit {
                    t,
                    local: Vec3::new(u, v, 0.0),
                })
            }
            Shape::Sphere(sphere) => {
                let c = sphere.center.value();
                let r = sphere.radius.value();
                let oc = ray.o - c;
                let b = oc.dot(ray.d);
                let disc = b * b - (oc.dot(oc) - r * r);
                if disc < 0.0 {
                    return None;
                }
                let sq = disc.sqrt();
                let t = if -b - sq > 0.0 { -b - sq } else { -b + sq };
                if !(t > 0.0 && t < ray.maxt) {
                    return None;
                }
                Some(ShapeHit {
                    t,
                    local: (ray.at(t) - c).normalize(),
                })
            }
        }
    }

    /// Attached position and normal of the point with shape-local coordinates
    /// `local`. The point moves rigidly with the shape parameters.
    pub fn position_attached(&self, local: Vec3) -> (DVec3, DVec3) {
        match self {
            Shape::Rectangle(rect) => {
                let frame: Frame<Dual> = rect.frame.to();
                let p = rect.translation
                    + frame.s.scale(local.x * rect.half_size.x)
                    + frame.t.scale(local.y * rect.half_size.y);
                (p, frame.n)
            }
            Shape::Sphere(sphere) => {
                let n = local.to_dual();
                (sphere.center + n * sphere.radius, n)
            }
        }
    }

    /// Attached interaction for a detached hit of this shape.
    ///
    /// Without `follow_shape` the position is the intersection of the attached ray
    /// with the attached surface, so it slides along the surface as the ray moves.
    /// With `follow_shape` it is re-attached to the shape itself.
    pub fn interaction(
        &self,
        ray: &DRay,
        hit: &ShapeHit,
        follow_shape: bool,
        index: usize,
    ) -> SurfaceInteraction {
        let (t, p, n, sh_frame, uv) = match self {
            Shape::Rectangle(rect) => {
                let frame: Frame<Dual> = rect.frame.to();
                let (t, p) = if follow_shape {
                    let (p, _) = self.position_attached(hit.local);
                    ((p - ray.o).dot(ray.d), p)
                } else {
                    let t = (rect.translation - ray.o).dot(frame.n) / ray.d.dot(frame.n);
                    (t, ray.at(t))
                };
                let uv = Vec2::new(0.5 * (hit.local.x + 1.0), 0.5 * (hit.local.y + 1.0));
                (t, p, frame.n, frame, uv)
            }
            Shape::Sphere(sphere) => {
                let (t, p, n) = if follow_shape {
                    let (p, n) = self.position_attached(hit.local);
                    ((p - ray.o).dot(ray.d), p, n)
                } else {
                    let oc = ray.o - sphere.center;
                    let b = oc.dot(ray.d);
                    let disc = b * b - (oc.dot(oc) - sphere.radius * sphere.radius);
                    let sq = disc.max(Dual::ZERO).sqrt();
                    let near = -b - sq;
                    let far = -b + sq;
                    let t = if (near.value() - hit.t).abs() <= (far.value() - hit.t).abs() {
                        near
                    } else {
                        far
                    };
                    let p = ray.at(t);
                    (t, p, (p - sphere.center) / sphere.radius)
                };
                let l = hit.local;
                let phi = l.y.atan2(l.x);
                let phi = if phi < 0.0 { phi + 2.0 * PI } else { phi };
                let uv = Vec2::new(phi / (2.0 * PI), l.z.clamp(-1.0, 1.0).acos() / PI);
                (t, p, n, Frame::from_normal(n), uv)
            }
        };
        SurfaceInteraction {
            valid: true,
            t,
            p,
            n,
            sh_frame,
            wi: sh_frame.to_local(-ray.d),
            uv,
            local: hit.local,
            shape: Some(index),
        }
    }

    /// Detached proximity of a hit to this shape's silhouette as seen along
    /// `ray`: zero on the boundary, growing away from it.
    pub fn boundary_test(&self, ray: &Ray, si: &SurfaceInteraction) -> f32 {
        if !si.valid {
            return f32::INFINITY;
        }
        match self {
            Shape::Rectangle(_) => (1.0 - si.local.x.abs()).min(1.0 - si.local.y.abs()),
            Shape::Sphere(_) => si.n.value().dot(-ray.d).abs(),
        }
    }

    /// Uniform position sample, density in area measure.
    pub fn sample_position(&self, u: Vec2) -> PositionSample {
        match self {
            Shape::Rectangle(rect) => {
                let q = square_to_centered_square(u);
                let local = Vec3::new(q.x, q.y, 0.0);
                let (p, n) = self.position_attached(local);
                PositionSample {
                    p: p.value(),
                    n: n.value(),
                    local,
                    pdf: 1.0 / rect.area(),
                    shape: None,
                }
            }
            Shape::Sphere(sphere) => {
                let local = square_to_uniform_sphere(u);
                let (p, _) = self.position_attached(local);
                PositionSample {
                    p: p.value(),
                    n: local,
                    local,
                    pdf: 1.0 / sphere.area(),
                    shape: None,
                }
            }
        }
    }

    /// Density of [`Shape::sample_position`].
    pub fn pdf_position(&self) -> f32 {
        match self {
            Shape::Rectangle(rect) => 1.0 / rect.area(),
            Shape::Sphere(sphere) => 1.0 / sphere.area(),
        }
    }

    /// Axis-aligned bounds.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        match self {
            Shape::Rectangle(rect) => {
                let corners = rect.corners();
                let mut lo = corners[0];
                let mut hi = corners[0];
                for c in &corners[1..] {
                    lo = Vec3::new(lo.x.min(c.x), lo.y.min(c.y), lo.z.min(c.z));
                    hi = Vec3::new(hi.x.max(c.x), hi.y.max(c.y), hi.z.max(c.z));
                }
                (lo, hi)
            }
            Shape::Sphere(sphere) => {
                let c = sphere.center.value();
                let r = Vec3::new(1.0, 1.0, 1.0).scale(sphere.radius.value());
                (c - r, c + r)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_rect_at(z: f32) -> Shape {
        Shape::Rectangle(Rectangle::new(
            Vec3::new(0.0, 0.0, z),
            Vec3::new(0.0, 0.0, -1.0),
            Vec2::new(1.0, 1.0),
        ))
    }

    #[test]
    fn rectangle_hit_and_miss() {
        let shape = unit_rect_at(2.0);
        let hit = shape
            .intersect(&Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0)))
            .unwrap();
        assert_relative_eq!(hit.t, 2.0, epsilon = 1e-6);
        let miss = shape.intersect(&Ray::new(Vec3::ZERO, Vec3::new(0.8, 0.0, 0.6)));
        assert!(miss.is_none());
    }

    #[test]
    fn sphere_hit_from_outside_and_inside() {
        let shape = Shape::Sphere(Sphere::new(Vec3::new(0.0, 0.0, 5.0), 1.0));
        let outside = shape
            .intersect(&Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0)))
            .unwrap();
        assert_relative_eq!(outside.t, 4.0, epsilon = 1e-5);
        let inside = shape
            .intersect(&Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        assert_relative_eq!(inside.t, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn plain_hit_slides_while_follow_shape_hit_moves_with_shape() {
        let mut rect = Rectangle::new(
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec2::new(1.0, 1.0),
        );
        rect.translation.x = Dual::variable(0.0, 0);
        let shape = Shape::Rectangle(rect);
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let hit = shape.intersect(&ray).unwrap();

        let plain = shape.interaction(&ray.to_dual(), &hit, false, 0);
        assert_relative_eq!(plain.p.grad(0).x, 0.0);

        let follow = shape.interaction(&ray.to_dual(), &hit, true, 0);
        assert_relative_eq!(follow.p.grad(0).x, 1.0);
        assert_relative_eq!(follow.p.value().z, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn sphere_depth_tracks_radius() {
        let mut sphere = Sphere::new(Vec3::new(0.0, 0.0, 5.0), 1.0);
        sphere.radius = Dual::variable(1.0, 0);
        let shape = Shape::Sphere(sphere);
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let hit = shape.intersect(&ray).unwrap();
        let si = shape.interaction(&ray.to_dual(), &hit, false, 0);
        assert_relative_eq!(si.t.grad(0), -1.0, epsilon = 1e-5);
        assert_relative_eq!(si.n.value().z, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn boundary_test_vanishes_at_edges() {
        let shape = unit_rect_at(2.0);
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let hit = shape.intersect(&ray).unwrap();
        let si = shape.interaction(&ray.to_dual(), &hit, false, 0);
        assert_relative_eq!(shape.boundary_test(&ray, &si), 1.0, epsilon = 1e-6);

        let grazing = Ray::new(Vec3::ZERO, Vec3::new(0.999, 0.0, 2.0).normalize());
        let hit = shape.intersect(&grazing).unwrap();
        let si = shape.interaction(&grazing.to_dual(), &hit, false, 0);
        assert!(shape.boundary_test(&grazing, &si) < 1.0e-2);

        let miss = SurfaceInteraction::miss(&ray.to_dual());
        assert!(shape.boundary_test(&ray, &miss).is_infinite());
    }
}
