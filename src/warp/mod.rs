//! Warp-field reparameterization of ray directions.
//!
//! Moving silhouettes make the integrand discontinuous in the ray direction, so
//! derivatives taken through a fixed direction miss the boundary term. A warp
//! field built from a few auxiliary rays around the primal direction moves the
//! direction along with the geometry it sees; its divergence compensates the
//! change of variables.

mod field;
mod vmf;

#[cfg(test)]
mod tests;

pub use field::{reparameterize_ray, WarpField, WarpSample};
