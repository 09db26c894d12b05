//! Integrator configuration, loadable from JSON and validated eagerly.

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Multiple importance sampling heuristic shared by the emitter-sampling and
/// BSDF-sampling strategies of one estimator.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisHeuristic {
    /// `w = a / (a + b)`.
    #[default]
    Balance,
    /// `w = a^2 / (a^2 + b^2)`.
    Power,
}

impl MisHeuristic {
    /// Weight of the strategy with density `pdf_a` against `pdf_b`.
    pub fn weight(self, pdf_a: f32, pdf_b: f32) -> f32 {
        let (a, b) = match self {
            MisHeuristic::Balance => (pdf_a, pdf_b),
            MisHeuristic::Power => (pdf_a * pdf_a, pdf_b * pdf_b),
        };
        let sum = a + b;
        if sum > 0.0 && sum.is_finite() {
            a / sum
        } else if a.is_infinite() && b.is_finite() {
            1.0
        } else {
            0.0
        }
    }
}

/// Warp-field reparameterization settings.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReparamConfig {
    /// Auxiliary rays traced per reparameterized ray.
    pub num_aux_rays: u32,
    /// Concentration of the von Mises-Fisher auxiliary distribution.
    pub kappa: f32,
    /// Exponent of the harmonic boundary weight.
    pub power: f32,
    /// Mirror every other auxiliary direction about the mean direction.
    pub antithetic: bool,
}

impl Default for ReparamConfig {
    fn default() -> Self {
        Self {
            num_aux_rays: 16,
            kappa: 1.0e5,
            power: 3.0,
            antithetic: false,
        }
    }
}

impl ReparamConfig {
    pub fn validate(&self) -> RenderResult<()> {
        if self.num_aux_rays == 0 {
            return Err(RenderError::config("reparam.num_aux_rays must be at least 1"));
        }
        if !(self.kappa.is_finite() && self.kappa > 0.0) {
            return Err(RenderError::config(format!(
                "reparam.kappa must be positive and finite, got {}",
                self.kappa
            )));
        }
        if !(self.power.is_finite() && self.power > 0.0) {
            return Err(RenderError::config(format!(
                "reparam.power must be positive and finite, got {}",
                self.power
            )));
        }
        Ok(())
    }
}

/// Settings shared by the forward path tracer and the adjoint replay.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Longest path length, counted in segments (1 = directly visible emission).
    pub max_depth: u32,
    /// Depth from which Russian roulette starts; must be below `max_depth`.
    pub rr_depth: u32,
    /// MIS heuristic.
    pub mis: MisHeuristic,
    /// Warp-field reparameterization; disabled when absent.
    pub reparam: Option<ReparamConfig>,
    /// Maximum number of lanes processed at once.
    pub wavefront_size: usize,
    /// Skip emission of directly visible emitters.
    pub hide_emitters: bool,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            rr_depth: 5,
            mis: MisHeuristic::Balance,
            reparam: None,
            wavefront_size: 1 << 16,
            hide_emitters: false,
        }
    }
}

impl IntegratorConfig {
    /// Parse and validate a JSON configuration; absent fields take defaults.
    pub fn from_json(raw: &str) -> RenderResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject nonsensical settings before any ray is traced.
    pub fn validate(&self) -> RenderResult<()> {
        if self.max_depth == 0 {
            return Err(RenderError::config("max_depth must be at least 1"));
        }
        if self.rr_depth == 0 {
            return Err(RenderError::config("rr_depth must be at least 1"));
        }
        if self.rr_depth >= self.max_depth {
            return Err(RenderError::config(format!(
                "rr_depth ({}) must be smaller than max_depth ({})",
                self.rr_depth, self.max_depth
            )));
        }
        if self.wavefront_size == 0 {
            return Err(RenderError::config("wavefront_size must be at least 1"));
        }
        if let Some(reparam) = self.reparam.as_ref() {
            reparam.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn balance_heuristic_weights() {
        let w1 = MisHeuristic::Balance.weight(0.3, 0.7);
        let w2 = MisHeuristic::Balance.weight(0.7, 0.3);
        assert_relative_eq!(w1, 0.3, epsilon = 1e-6);
        assert_relative_eq!(w1 + w2, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn power_heuristic_weights_sum_to_one() {
        let w1 = MisHeuristic::Power.weight(0.3, 0.7);
        let w2 = MisHeuristic::Power.weight(0.7, 0.3);
        assert_relative_eq!(w1, 0.09 / 0.58, epsilon = 1e-6);
        assert_relative_eq!(w1 + w2, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_pdfs_give_zero_weight() {
        assert_eq!(MisHeuristic::Balance.weight(0.0, 0.0), 0.0);
        assert_eq!(MisHeuristic::Balance.weight(f32::INFINITY, 1.0), 1.0);
    }

    #[test]
    fn json_overrides_defaults() {
        let config = IntegratorConfig::from_json(
            r#"{ "max_depth": 4, "rr_depth": 2, "mis": "power", "reparam": { "kappa": 1000.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.mis, MisHeuristic::Power);
        let reparam = config.reparam.unwrap();
        assert_eq!(reparam.kappa, 1000.0);
        assert_eq!(reparam.num_aux_rays, 16);
    }

    #[test]
    fn rejects_roulette_at_or_beyond_max_depth() {
        let config = IntegratorConfig {
            max_depth: 3,
            rr_depth: 3,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RenderError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_bad_reparam_constants() {
        let config = IntegratorConfig {
            reparam: Some(ReparamConfig {
                kappa: -1.0,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(IntegratorConfig::from_json("{ \"max_depth\": 0 }").is_err());
    }
}
