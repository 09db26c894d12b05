//! Forward differentiable path tracing over wavefronts of lanes.

mod lanes;
mod path;
mod render;


pub use lanes::{LaneFlag, LaneMask};
pub use path::{russian_roulette, trace_single, Aovs, PathIntegrator, PathSample};
pub use render::render;

pub(crate) use path::scatter;
