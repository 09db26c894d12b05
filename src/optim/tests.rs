use super::*;
use crate::color::Color;
use crate::config::IntegratorConfig;
use crate::error::ParamError;
use crate::integrator::{render, PathIntegrator};
use crate::math::{Vec2, Vec3};
use crate::scene::{BasicScene, Bsdf, Emitter, PerspectiveSensor, Rectangle, Shape};
use approx::assert_relative_eq;

fn record(key: &str, values: Vec<f32>) -> SceneParameters {
    let mut params = SceneParameters::new();
    params.insert(key, values);
    params
}

fn gradient(key: &str, values: Vec<f32>) -> Gradients {
    let mut grads = Gradients::default();
    grads.insert(key, values);
    grads
}

fn sgd(lr: f32, momentum: f32, mask_updates: bool) -> Sgd {
    Sgd::new(SgdConfig {
        lr,
        momentum,
        mask_updates,
    })
    .unwrap()
}

#[test]
fn sgd_follows_the_negative_gradient() {
    let mut params = record("x", vec![1.0, 2.0]);
    let mut opt = sgd(0.1, 0.0, false);
    opt.set("x", &mut params).unwrap();
    assert!(params.slots("x").is_some());

    opt.step(&gradient("x", vec![0.5, -1.0])).unwrap();
    let x = opt.get("x").unwrap();
    assert_relative_eq!(x[0], 0.95);
    assert_relative_eq!(x[1], 2.1);
}

#[test]
fn sgd_momentum_accumulates_velocity() {
    let mut params = record("x", vec![1.0]);
    let mut opt = sgd(0.1, 0.9, false);
    opt.set("x", &mut params).unwrap();
    opt.step(&gradient("x", vec![1.0])).unwrap();
    assert_relative_eq!(opt.get("x").unwrap()[0], 0.9);
    opt.step(&gradient("x", vec![1.0])).unwrap();
    assert_relative_eq!(opt.get("x").unwrap()[0], 0.71, epsilon = 1e-6);
}

#[test]
fn sgd_masked_entries_keep_value_and_velocity() {
    let mut params = record("x", vec![1.0, 1.0]);
    let mut opt = sgd(0.1, 0.5, true);
    opt.set("x", &mut params).unwrap();
    opt.step(&gradient("x", vec![1.0, 1.0])).unwrap();
    opt.step(&gradient("x", vec![0.0, 1.0])).unwrap();
    let x = opt.get("x").unwrap();
    assert_relative_eq!(x[0], 0.9);
    assert_relative_eq!(x[1], 0.75, epsilon = 1e-6);
    // The velocity of the masked entry survived the skipped step.
    opt.step(&gradient("x", vec![1.0, 0.0])).unwrap();
    assert_relative_eq!(opt.get("x").unwrap()[0], 0.75, epsilon = 1e-6);
}

#[test]
fn adam_first_step_has_the_learning_rate_magnitude() {
    let mut params = record("x", vec![1.0, 1.0]);
    let mut opt = Adam::new(AdamConfig::default()).unwrap();
    opt.set("x", &mut params).unwrap();
    opt.step(&gradient("x", vec![3.0, -0.01])).unwrap();
    let x = opt.get("x").unwrap();
    assert_relative_eq!(x[0], 0.99, epsilon = 1e-5);
    assert_relative_eq!(x[1], 1.01, epsilon = 1e-5);
    assert_eq!(opt.step_count("x"), Some(1));
}

#[test]
fn uniform_adam_shares_the_largest_second_moment() {
    let mut params = record("x", vec![1.0, 1.0]);
    let mut opt = Adam::new(AdamConfig {
        uniform: true,
        ..Default::default()
    })
    .unwrap();
    opt.set("x", &mut params).unwrap();
    opt.step(&gradient("x", vec![1.0, 0.1])).unwrap();
    let x = opt.get("x").unwrap();
    assert_relative_eq!(x[0], 0.99, epsilon = 1e-5);
    assert_relative_eq!(x[1], 0.999, epsilon = 1e-5);
}

#[test]
fn masked_adam_skips_unobserved_entries() {
    let mut params = record("x", vec![1.0, 1.0]);
    let mut opt = Adam::new(AdamConfig {
        mask_updates: true,
        ..Default::default()
    })
    .unwrap();
    opt.set("x", &mut params).unwrap();
    opt.step(&gradient("x", vec![0.0, 1.0])).unwrap();
    let x = opt.get("x").unwrap();
    assert_eq!(x[0], 1.0);
    assert_relative_eq!(x[1], 0.99, epsilon = 1e-5);
}

#[test]
fn resized_parameters_restart_their_state() {
    let mut params = record("tex", vec![0.5; 2]);
    let mut opt = Adam::new(AdamConfig::default()).unwrap();
    opt.set("tex", &mut params).unwrap();
    opt.step(&gradient("tex", vec![1.0; 2])).unwrap();
    opt.step(&gradient("tex", vec![1.0; 2])).unwrap();
    assert_eq!(opt.step_count("tex"), Some(2));

    params.insert("tex", vec![0.5; 4]);
    opt.set("tex", &mut params).unwrap();
    assert_eq!(opt.step_count("tex"), Some(0));
    opt.step(&gradient("tex", vec![1.0; 4])).unwrap();
    assert_eq!(opt.step_count("tex"), Some(1));
    assert_relative_eq!(opt.get("tex").unwrap()[3], 0.49, epsilon = 1e-5);

    opt.reset("tex").unwrap();
    assert_eq!(opt.step_count("tex"), Some(0));
}

#[test]
fn key_learning_rates_override_the_global_one() {
    let mut params = record("a", vec![0.0]);
    params.insert("b", vec![0.0]);
    let mut opt = sgd(1.0, 0.0, false);
    opt.set("a", &mut params).unwrap();
    opt.set("b", &mut params).unwrap();
    opt.set_key_learning_rate("b", 0.25).unwrap();
    opt.set_learning_rate(0.5).unwrap();

    let mut grads = gradient("a", vec![1.0]);
    grads.insert("b", vec![1.0]);
    opt.step(&grads).unwrap();
    assert_eq!(opt.get("a").unwrap()[0], -0.5);
    assert_eq!(opt.get("b").unwrap()[0], -0.25);
    assert_eq!(opt.learning_rate(), 0.5);
}

#[test]
fn update_writes_values_back() {
    let mut params = record("x", vec![1.0, 1.0]);
    let mut opt = sgd(0.5, 0.0, false);
    opt.set("x", &mut params).unwrap();
    opt.step(&gradient("x", vec![1.0, 2.0])).unwrap();
    opt.update(&mut params).unwrap();
    assert_eq!(params.get("x").unwrap(), &[0.5, 0.0]);
    assert!(params.slots("x").is_some());
}

#[test]
fn optimizer_errors_are_reported() {
    let mut params = record("x", vec![1.0]);
    let mut opt = sgd(0.1, 0.0, false);
    assert!(matches!(
        opt.set("y", &mut params),
        Err(ParamError::UnknownParameter(key)) if key == "y"
    ));
    opt.set("x", &mut params).unwrap();
    assert!(matches!(
        opt.step(&Gradients::default()),
        Err(ParamError::MissingGradient(key)) if key == "x"
    ));
    assert!(matches!(
        opt.step(&gradient("x", vec![1.0, 2.0])),
        Err(ParamError::LengthMismatch { expected: 1, got: 2, .. })
    ));
    assert_eq!(opt.get("x").unwrap(), &[1.0]);
    assert!(matches!(
        opt.set_learning_rate(0.0),
        Err(ParamError::NonPositiveLearningRate(_))
    ));
    assert!(matches!(
        Sgd::new(SgdConfig {
            momentum: 1.0,
            ..Default::default()
        }),
        Err(ParamError::InvalidHyperparameter { name: "momentum", .. })
    ));
    assert!(matches!(
        Adam::new(AdamConfig {
            beta_2: -0.1,
            ..Default::default()
        }),
        Err(ParamError::InvalidHyperparameter { name: "beta_2", .. })
    ));
}

#[test]
fn configs_load_from_json() {
    let config: AdamConfig = serde_json::from_str(r#"{ "lr": 0.05, "uniform": true }"#).unwrap();
    assert_eq!(config.lr, 0.05);
    assert!(config.uniform);
    assert_eq!(config.beta_1, 0.9);
}

fn sunlit_floor(rho: f32) -> BasicScene {
    let mut scene = BasicScene::new();
    scene.add_shape(
        "floor",
        Shape::Rectangle(Rectangle::new(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 1.0),
            Vec2::new(4.0, 4.0),
        )),
        Bsdf::diffuse(Color::splat(rho)),
    );
    scene.add_emitter(
        "sun",
        Emitter::directional(Vec3::new(0.0, 0.0, -1.0), Color::WHITE),
    );
    scene.set_sensor(PerspectiveSensor::look_at(
        Vec3::new(0.0, 0.0, 2.0),
        Vec3::ZERO,
        Vec3::new(0.0, 1.0, 0.0),
        30.0,
        2,
        2,
    ));
    scene
}

#[test]
fn adam_recovers_reflectance_from_a_target_image() {
    let key = "floor.bsdf.reflectance";
    let integrator = PathIntegrator::new(IntegratorConfig {
        max_depth: 2,
        rr_depth: 1,
        ..Default::default()
    })
    .unwrap();
    let target = render(&sunlit_floor(0.3), &integrator, 0, 4).unwrap().value();

    let mut scene = sunlit_floor(0.6);
    let mut params = SceneParameters::from_scene(&mut scene);
    let mut opt = Adam::new(AdamConfig {
        lr: 0.01,
        ..Default::default()
    })
    .unwrap();
    opt.set(key, &mut params).unwrap();
    params.update(&mut scene).unwrap();

    for it in 0..100 {
        let image = render(&scene, &integrator, it, 4).unwrap();
        let value = image.value();
        let residual: Vec<f32> = value
            .pixels
            .iter()
            .zip(&target.pixels)
            .map(|(a, b)| 2.0 * (a - b))
            .collect();
        let slots = params.slots(key).unwrap();
        let grad: Vec<f32> = slots
            .map(|slot| {
                let d = image.grad(slot);
                residual.iter().zip(&d.pixels).map(|(r, g)| r * g).sum::<f32>()
            })
            .collect();
        opt.step(&gradient(key, grad)).unwrap();
        opt.update(&mut params).unwrap();
        params.update(&mut scene).unwrap();
    }
    for &rho in opt.get(key).unwrap() {
        assert_relative_eq!(rho, 0.3, epsilon = 2e-2);
    }
}
