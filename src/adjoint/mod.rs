//! Adjoint light tracing with path replay.
//!
//! Particles leave the emitters and are splatted onto the film wherever a
//! vertex connects to the sensor. Gradients are obtained by tracing every
//! particle twice from identical sampler streams: once to form the image and
//! once with derivatives, weighting each splat by the image adjoint.

mod replay;
#[cfg(test)]
mod tests;

pub use replay::{AdjointIntegrator, BackwardResult};
