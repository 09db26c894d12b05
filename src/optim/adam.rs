use serde::{Deserialize, Serialize};

use crate::error::{ParamError, ParamResult};
use crate::params::{Gradients, SceneParameters};

use super::{check_decay, check_learning_rate, Optimizer, ParamTable};

/// Adam settings.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub lr: f32,
    pub beta_1: f32,
    pub beta_2: f32,
    pub epsilon: f32,
    /// Leave entries with a zero gradient untouched, moments included.
    pub mask_updates: bool,
    /// Normalize by the largest second moment of each parameter instead of the
    /// per-entry one.
    pub uniform: bool,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            lr: 1.0e-2,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1.0e-8,
            mask_updates: false,
            uniform: false,
        }
    }
}

/// Raw moments and step count of one parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Moments {
    t: u32,
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Moments {
    fn resize(&mut self, len: usize) {
        if self.m.len() != len {
            *self = Self {
                t: 0,
                m: vec![0.0; len],
                v: vec![0.0; len],
            };
        }
    }
}

/// Adam with bias-corrected step size
/// `lr_t = lr * sqrt(1 - beta_2^t) / (1 - beta_1^t)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Adam {
    config: AdamConfig,
    params: ParamTable<Moments>,
}

impl Adam {
    pub fn new(config: AdamConfig) -> ParamResult<Self> {
        check_learning_rate(config.lr)?;
        check_decay("beta_1", config.beta_1)?;
        check_decay("beta_2", config.beta_2)?;
        if !(config.epsilon > 0.0 && config.epsilon.is_finite()) {
            return Err(ParamError::InvalidHyperparameter {
                name: "epsilon",
                value: config.epsilon,
            });
        }
        Ok(Self {
            config,
            params: ParamTable::default(),
        })
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    /// Steps taken for `key` since it was tracked or last reset.
    pub fn step_count(&self, key: &str) -> Option<u32> {
        self.params.state(key).map(|m| m.t)
    }
}

impl Optimizer for Adam {
    fn set(&mut self, key: &str, params: &mut SceneParameters) -> ParamResult<()> {
        self.params.track(key, params)
    }

    fn get(&self, key: &str) -> Option<&[f32]> {
        self.params.get(key)
    }

    fn step(&mut self, grads: &Gradients) -> ParamResult<()> {
        let AdamConfig {
            lr,
            beta_1,
            beta_2,
            epsilon,
            mask_updates,
            uniform,
        } = self.config;
        for (key, tracked, grad) in self.params.with_gradients(grads)? {
            let moments = &mut tracked.state;
            moments.resize(grad.len());
            moments.t += 1;
            let t = moments.t as i32;
            let lr_t = tracked.lr.unwrap_or(lr) * (1.0 - beta_2.powi(t)).sqrt()
                / (1.0 - beta_1.powi(t));

            for ((m, v), &g) in moments.m.iter_mut().zip(moments.v.iter_mut()).zip(grad) {
                if mask_updates && g == 0.0 {
                    continue;
                }
                *m = beta_1 * *m + (1.0 - beta_1) * g;
                *v = beta_2 * *v + (1.0 - beta_2) * g * g;
            }
            let v_max = moments.v.iter().copied().fold(0.0f32, f32::max);
            for (((x, &m), &v), &g) in tracked
                .values
                .iter_mut()
                .zip(&moments.m)
                .zip(&moments.v)
                .zip(grad)
            {
                if mask_updates && g == 0.0 {
                    continue;
                }
                let v = if uniform { v_max } else { v };
                *x -= lr_t * m / (v.sqrt() + epsilon);
            }
            tracing::trace!(key, step = t, lr_t, "adam step");
        }
        Ok(())
    }

    fn update(&self, params: &mut SceneParameters) -> ParamResult<()> {
        self.params.write_back(params)
    }

    fn learning_rate(&self) -> f32 {
        self.config.lr
    }

    fn set_learning_rate(&mut self, lr: f32) -> ParamResult<()> {
        self.config.lr = check_learning_rate(lr)?;
        Ok(())
    }

    fn set_key_learning_rate(&mut self, key: &str, lr: f32) -> ParamResult<()> {
        self.params.set_learning_rate(key, lr)
    }

    fn reset(&mut self, key: &str) -> ParamResult<()> {
        self.params.reset(key)
    }
}
