use super::*;
use crate::color::Color;
use crate::config::IntegratorConfig;
use crate::error::RenderError;
use crate::film::Image;
use crate::math::{Vec2, Vec3, PI};
use crate::params::SceneParameters;
use crate::scene::{BasicScene, Bsdf, Emitter, PerspectiveSensor, Rectangle, SceneQuery, Shape};
use approx::assert_relative_eq;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn integrator(max_depth: u32, rr_depth: u32) -> AdjointIntegrator {
    AdjointIntegrator::new(IntegratorConfig {
        max_depth,
        rr_depth,
        ..Default::default()
    })
    .unwrap()
}

const SUN_ELEVATION: f32 = 60.0;

fn sunlit_floor(rho: f32) -> BasicScene {
    let theta = SUN_ELEVATION.to_radians();
    let mut scene = BasicScene::new();
    scene.add_shape(
        "floor",
        Shape::Rectangle(Rectangle::new(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 1.0),
            Vec2::new(2.0, 2.0),
        )),
        Bsdf::diffuse(Color::splat(rho)),
    );
    scene.add_emitter(
        "sun",
        Emitter::directional(-Vec3::new(theta.sin(), 0.0, theta.cos()), Color::WHITE),
    );
    scene.set_sensor(PerspectiveSensor::look_at(
        Vec3::new(0.0, 0.0, 2.0),
        Vec3::ZERO,
        Vec3::new(0.0, 1.0, 0.0),
        60.0,
        1,
        1,
    ));
    scene
}

fn overhead_light(radiance: f32) -> BasicScene {
    let mut scene = BasicScene::new();
    let light = scene.add_shape(
        "light",
        Shape::Rectangle(Rectangle::new(
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec2::new(2.0, 2.0),
        )),
        Bsdf::diffuse(Color::BLACK),
    );
    scene.add_area_emitter(light, Color::splat(radiance));
    scene.set_sensor(PerspectiveSensor::look_at(
        Vec3::ZERO,
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(0.0, 1.0, 0.0),
        40.0,
        2,
        2,
    ));
    scene
}

#[test]
fn light_traced_floor_matches_closed_form() {
    init_tracing();
    let rho = 0.6;
    let scene = sunlit_floor(rho);
    let image = integrator(3, 2).render(&scene, 1, 200_000).unwrap();
    let expected = rho * SUN_ELEVATION.to_radians().cos() / PI;
    assert_relative_eq!(image.pixel(0, 0).r, expected, max_relative = 5e-2);
}

#[test]
fn replay_reproduces_the_primal_particles() {
    let rho = 0.6;
    let mut scene = sunlit_floor(rho);
    let mut params = SceneParameters::from_scene(&mut scene);
    params.enable_grad("sun.irradiance").unwrap();
    params.enable_grad("floor.bsdf.reflectance").unwrap();
    params.update(&mut scene).unwrap();

    let adjoint = Image::solid(1, 1, Color::WHITE);
    let result = integrator(3, 2)
        .render_backward(&scene, &params, &adjoint, 2, 50_000)
        .unwrap();
    let value = result.image.pixel(0, 0);
    assert!(value.r > 0.0);

    // The image is linear in the irradiance; the replayed derivative only
    // matches the primal value when both passes trace the same particles.
    let d_sun = result.gradients.get("sun.irradiance").unwrap();
    assert_relative_eq!(d_sun[0], value.r, max_relative = 1e-3);
    assert_relative_eq!(d_sun[2], value.b, max_relative = 1e-3);

    let d_rho = result.gradients.get("floor.bsdf.reflectance").unwrap();
    assert_relative_eq!(d_rho[1], value.g / rho, max_relative = 1e-3);
}

#[test]
fn directly_seen_area_light() {
    let mut scene = overhead_light(3.0);
    let mut params = SceneParameters::from_scene(&mut scene);
    params.enable_grad("light.emitter.radiance").unwrap();
    params.update(&mut scene).unwrap();

    let adjoint = Image::solid(2, 2, Color::new(1.0, 0.0, 0.0));
    let result = integrator(2, 1)
        .render_backward(&scene, &params, &adjoint, 3, 50_000)
        .unwrap();
    assert_relative_eq!(result.image.mean(), 3.0, max_relative = 5e-2);

    let total_red: f32 = (0..4).map(|i| result.image.pixel(i % 2, i / 2).r).sum();
    let grad = result.gradients.get("light.emitter.radiance").unwrap();
    assert_relative_eq!(grad[0], total_red / 3.0, max_relative = 1e-3);
    // Channels with a zero adjoint receive no gradient.
    assert_eq!(grad[1], 0.0);
    assert_eq!(grad[2], 0.0);
}

#[test]
fn primal_image_is_independent_of_the_pass_and_wavefront() {
    let scene = sunlit_floor(0.5);
    let params = SceneParameters::default();
    let small = AdjointIntegrator::new(IntegratorConfig {
        max_depth: 3,
        rr_depth: 2,
        wavefront_size: 333,
        ..Default::default()
    })
    .unwrap();
    let large = integrator(3, 2);
    let adjoint = Image::new(1, 1);

    let a = small.render(&scene, 7, 2_000).unwrap();
    let b = large
        .render_backward(&scene, &params, &adjoint, 7, 2_000)
        .unwrap();
    // Splats are summed in a scheduling-dependent order.
    for (x, y) in a.pixels.iter().zip(&b.image.pixels) {
        assert_relative_eq!(*x, *y, max_relative = 1e-4);
    }
    assert!(b.gradients.is_empty());
}

#[test]
fn rejects_bad_backward_requests() {
    let adjoint = Image::new(1, 1);
    let params = SceneParameters::default();
    let adjoint_pass = integrator(3, 2);

    let mut no_shapes = BasicScene::new();
    no_shapes.add_emitter("env", Emitter::constant(Color::WHITE));
    assert!(matches!(
        adjoint_pass.render_backward(&no_shapes, &params, &adjoint, 0, 1),
        Err(RenderError::EmptyScene)
    ));

    let mut dark = BasicScene::new();
    dark.add_shape(
        "floor",
        Shape::Rectangle(Rectangle::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0), Vec2::new(1.0, 1.0))),
        Bsdf::diffuse(Color::WHITE),
    );
    if let Some(sensor) = overhead_light(1.0).sensor() {
        dark.set_sensor(*sensor);
    }
    assert!(matches!(
        adjoint_pass.render(&dark, 0, 1),
        Err(RenderError::NoParticleEmitter)
    ));

    let mut blind = BasicScene::new();
    blind.add_shape(
        "floor",
        Shape::Rectangle(Rectangle::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0), Vec2::new(1.0, 1.0))),
        Bsdf::diffuse(Color::WHITE),
    );
    blind.add_emitter("env", Emitter::constant(Color::WHITE));
    assert!(matches!(
        adjoint_pass.render(&blind, 0, 1),
        Err(RenderError::MissingSensor)
    ));

    let scene = overhead_light(1.0);
    assert!(matches!(
        adjoint_pass.render_backward(&scene, &params, &adjoint, 0, 1),
        Err(RenderError::ImageSize { expected: 12, got: 3 })
    ));
    assert!(matches!(
        adjoint_pass.render(&scene, 0, 0),
        Err(RenderError::InvalidConfig(_))
    ));
}
