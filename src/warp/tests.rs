use super::field::harmonic_weight;
use super::*;
use crate::ad::{Dual, Tangent};
use crate::color::Color;
use crate::config::ReparamConfig;
use crate::math::{Vec2, Vec3};
use crate::params::SceneParameters;
use crate::ray::{DRay, Ray};
use crate::sampler::Pcg32;
use crate::scene::{BasicScene, Bsdf, Rectangle, Shape};
use approx::assert_relative_eq;

fn plane_scene() -> (BasicScene, SceneParameters) {
    let mut scene = BasicScene::new();
    let rect = Rectangle::new(
        Vec3::new(0.0, 0.0, 2.0),
        Vec3::new(0.0, 0.0, -1.0),
        Vec2::new(1.0, 1.0),
    );
    scene.add_shape("plane", Shape::Rectangle(rect), Bsdf::diffuse(Color::splat(0.5)));
    let mut params = SceneParameters::from_scene(&mut scene);
    params.enable_grad("plane.translation").unwrap();
    params.update(&mut scene).unwrap();
    (scene, params)
}

fn axis_ray() -> DRay {
    Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0)).to_dual()
}

#[test]
fn direction_follows_translated_plane() {
    let (scene, _) = plane_scene();
    let config = ReparamConfig {
        num_aux_rays: 8,
        kappa: 1.0e5,
        ..Default::default()
    };
    let mut rng = Pcg32::new(0, 11);
    let (d, det) = reparameterize_ray(&scene, &mut rng, &axis_ray(), &config, true);

    // A point attached to the plane at distance 2 moves the direction by 1/2.
    assert_eq!(d.value(), Vec3::new(0.0, 0.0, 1.0));
    assert_relative_eq!(d.x.grad(0), 0.5, epsilon = 1e-2);
    assert_relative_eq!(d.y.grad(1), 0.5, epsilon = 1e-2);
    assert_relative_eq!(d.z.grad(2), 0.0, epsilon = 1e-2);

    assert_eq!(det.value(), 1.0);
    assert_relative_eq!(det.grad(0), 0.0, epsilon = 1e-2);
}

#[test]
fn direction_derivative_matches_finite_differences() {
    // Re-project the plane hit of the primal direction after moving the plane by h.
    let h = 1.0e-3f32;
    let hit_dir = |tx: f32| {
        let p = Vec3::new(tx, 0.0, 2.0);
        p.normalize()
    };
    let fd = (hit_dir(h).x - hit_dir(-h).x) / (2.0 * h);

    let (scene, _) = plane_scene();
    let mut rng = Pcg32::new(3, 11);
    let field = WarpField::evaluate(&scene, &mut rng, &axis_ray(), &ReparamConfig::default());
    let (ddir, _) = field.propagate_forward(&Tangent::unit(0));
    assert_relative_eq!(ddir.x, fd, epsilon = 1e-2);
}

#[test]
fn forward_and_backward_are_adjoint() {
    let (scene, _) = plane_scene();
    let config = ReparamConfig {
        kappa: 50.0,
        antithetic: true,
        ..Default::default()
    };
    let ray = Ray::new(Vec3::ZERO, Vec3::new(0.45, 0.1, 1.0).normalize()).to_dual();
    let mut rng = Pcg32::new(5, 2);
    let field = WarpField::evaluate(&scene, &mut rng, &ray, &config);

    let seed = Tangent([0.3, -1.2, 0.7, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let dir_adj = Vec3::new(0.2, -0.4, 1.1);
    let div_adj = 0.9;
    let (ddir, ddiv) = field.propagate_forward(&seed);
    let lhs = dir_adj.dot(ddir) + div_adj * ddiv;
    let rhs = field.propagate_backward(dir_adj, div_adj).dot(&seed);
    assert_relative_eq!(lhs, rhs, epsilon = 1e-4, max_relative = 1e-4);
}

#[test]
fn antithetic_pairs_mirror_about_the_primal_direction() {
    let (scene, _) = plane_scene();
    let config = ReparamConfig {
        num_aux_rays: 4,
        kappa: 20.0,
        antithetic: true,
        ..Default::default()
    };
    let d = Vec3::new(0.0, 0.0, 1.0);
    let mut rng = Pcg32::new(9, 9);
    let field = WarpField::evaluate(&scene, &mut rng, &axis_ray(), &config);
    let samples = field.samples();
    assert_eq!(samples.len(), 4);
    for pair in samples.chunks(2) {
        let sum = pair[0].omega + pair[1].omega;
        assert_relative_eq!(sum.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(sum.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(pair[0].omega.dot(d), pair[1].omega.dot(d), epsilon = 1e-6);
    }
}

#[test]
fn inactive_lanes_pass_through() {
    let (scene, _) = plane_scene();
    let ray = DRay::new(
        Vec3::ZERO.to_dual(),
        Vec3::new(Dual::variable(0.0, 4), Dual::ZERO, Dual::ONE),
    );
    let mut rng = Pcg32::new(0, 0);
    let before = rng.clone();
    let (d, det) = reparameterize_ray(&scene, &mut rng, &ray, &ReparamConfig::default(), false);
    assert_eq!(d, ray.d);
    assert_eq!(det, Dual::ONE);
    assert_eq!(rng, before);
}

#[test]
fn missed_auxiliary_rays_keep_the_primal_tangent() {
    // Nothing in the scene is hit, so every warp vector is the primal direction.
    let scene = BasicScene::new();
    let ray = DRay::new(
        Vec3::ZERO.to_dual(),
        Vec3::new(Dual::variable(0.0, 1), Dual::ZERO, Dual::ONE),
    );
    let mut rng = Pcg32::new(1, 1);
    let (d, det) = reparameterize_ray(&scene, &mut rng, &ray, &ReparamConfig::default(), true);
    assert_relative_eq!(d.x.grad(1), 1.0, epsilon = 1e-4);
    assert_relative_eq!(det.grad(1), 0.0, epsilon = 1e-4);
}

#[test]
fn harmonic_weight_vanishes_on_boundary_and_degenerate_pdf() {
    let d = Vec3::new(0.0, 0.0, 1.0);
    let (w, dw) = harmonic_weight(d, d, 0.0, 1.0, 100.0, 3.0);
    assert_eq!(w, 0.0);
    assert_eq!(dw, Vec3::ZERO);
    let omega = Vec3::new(0.1, 0.0, 1.0).normalize();
    let (w, _) = harmonic_weight(d, omega, 0.5, 0.0, 100.0, 3.0);
    assert_eq!(w, 0.0);
    let (w, dw) = harmonic_weight(d, omega, 0.5, 2.0, 100.0, 3.0);
    assert!(w > 0.0);
    // The gradient is tangential to the primal direction.
    assert_relative_eq!(dw.dot(d), 0.0, epsilon = 1e-3);
}
