use serde::{Deserialize, Serialize};

use crate::error::ParamResult;
use crate::params::{Gradients, SceneParameters};

use super::{check_decay, check_learning_rate, Optimizer, ParamTable};

/// Stochastic gradient descent settings.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgdConfig {
    pub lr: f32,
    /// Velocity decay; zero disables momentum.
    pub momentum: f32,
    /// Leave entries with a zero gradient untouched, velocity included.
    pub mask_updates: bool,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            lr: 1.0e-2,
            momentum: 0.0,
            mask_updates: false,
        }
    }
}

/// Gradient descent with optional momentum:
/// `v = momentum * v + g`, `x -= lr * v`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sgd {
    config: SgdConfig,
    params: ParamTable<Vec<f32>>,
}

impl Sgd {
    pub fn new(config: SgdConfig) -> ParamResult<Self> {
        check_learning_rate(config.lr)?;
        check_decay("momentum", config.momentum)?;
        Ok(Self {
            config,
            params: ParamTable::default(),
        })
    }

    pub fn config(&self) -> &SgdConfig {
        &self.config
    }
}

impl Optimizer for Sgd {
    fn set(&mut self, key: &str, params: &mut SceneParameters) -> ParamResult<()> {
        self.params.track(key, params)
    }

    fn get(&self, key: &str) -> Option<&[f32]> {
        self.params.get(key)
    }

    fn step(&mut self, grads: &Gradients) -> ParamResult<()> {
        let SgdConfig {
            lr,
            momentum,
            mask_updates,
        } = self.config;
        for (_, tracked, grad) in self.params.with_gradients(grads)? {
            let lr = tracked.lr.unwrap_or(lr);
            if momentum == 0.0 {
                for (x, &g) in tracked.values.iter_mut().zip(grad) {
                    if !(mask_updates && g == 0.0) {
                        *x -= lr * g;
                    }
                }
                continue;
            }
            let velocity = &mut tracked.state;
            if velocity.len() != grad.len() {
                *velocity = vec![0.0; grad.len()];
            }
            for ((x, v), &g) in tracked.values.iter_mut().zip(velocity.iter_mut()).zip(grad) {
                if mask_updates && g == 0.0 {
                    continue;
                }
                *v = momentum * *v + g;
                *x -= lr * *v;
            }
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
