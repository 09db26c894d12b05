mod ad;
mod adjoint;
mod color;
mod config;
mod error;
mod film;
mod integrator;
mod math;
mod optim;
mod params;
mod ray;
mod sampler;
mod sampling;
mod scene;
mod warp;

pub use ad::{Dual, GradAccumulator, Scalar, Tangent, MAX_TANGENTS};
pub use adjoint::{AdjointIntegrator, BackwardResult};
pub use color::{Color, Rgb, Spectrum};
pub use config::{IntegratorConfig, MisHeuristic, ReparamConfig};
pub use error::{ParamError, ParamResult, RenderError, RenderResult};
pub use film::{DiffImage, Image, ImageBlock};
pub use integrator::{
    render, russian_roulette, trace_single, Aovs, LaneFlag, LaneMask, PathIntegrator,
    PathSample,
};
pub use math::{DVec3, Frame, Vec2, Vec3};
pub use optim::{Adam, AdamConfig, Optimizer, Sgd, SgdConfig};
pub use params::{Gradients, ParamVisitor, SceneParameters, Traversable};
pub use ray::{DRay, Ray};
pub use sampler::{IndependentSampler, Pcg32, Sampler};
pub use scene::{
    reattach_weight, BasicScene, BoundingSphere, Bsdf, BsdfContext, BsdfSample, DirectionSample,
    Emitter, EmitterEntry, EmitterRaySample, Interaction, Measure, PerspectiveSensor,
    PositionSample, RayFlags, Rectangle, SceneQuery, SensorConnection, Shape, ShapeEntry, ShapeHit,
    Sphere, SurfaceInteraction, TransportMode,
};
pub use warp::{reparameterize_ray, WarpField, WarpSample};
