//! First-order optimizers over named scene parameters.
//!
//! An optimizer owns a copy of every parameter it tracks. `step` advances the
//! copies from an evaluated gradient record and `update` writes them back into a
//! [`SceneParameters`] snapshot, from where they reach the scene.

mod adam;
mod sgd;
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use crate::error::{ParamError, ParamResult};
use crate::params::{Gradients, SceneParameters};

pub use adam::{Adam, AdamConfig};
pub use sgd::{Sgd, SgdConfig};

/// Gradient-based update rule over named parameter arrays.
pub trait Optimizer {
    /// Track `key`, copying its current values and enabling its gradients.
    /// Re-tracking a key whose length changed resets its optimizer state.
    fn set(&mut self, key: &str, params: &mut SceneParameters) -> ParamResult<()>;

    /// Current values of a tracked key.
    fn get(&self, key: &str) -> Option<&[f32]>;

    /// Advance every tracked key by one step. Every tracked key must have a
    /// gradient in `grads`.
    fn step(&mut self, grads: &Gradients) -> ParamResult<()>;

    /// Write the tracked values back into `params`.
    fn update(&self, params: &mut SceneParameters) -> ParamResult<()>;

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32) -> ParamResult<()>;

    /// Override the learning rate of a single tracked key.
    fn set_key_learning_rate(&mut self, key: &str, lr: f32) -> ParamResult<()>;

    /// Drop the optimizer state of `key`.
    fn reset(&mut self, key: &str) -> ParamResult<()>;
}

pub(crate) fn check_learning_rate(lr: f32) -> ParamResult<f32> {
    if lr > 0.0 && lr.is_finite() {
        Ok(lr)
    } else {
        Err(ParamError::NonPositiveLearningRate(lr))
    }
}

/// Checks that a decay rate lies in `[0, 1)`.
pub(crate) fn check_decay(name: &'static str, value: f32) -> ParamResult<f32> {
    if (0.0..1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ParamError::InvalidHyperparameter { name, value })
    }
}

/// One tracked parameter with its optimizer state.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tracked<S> {
    pub values: Vec<f32>,
    pub lr: Option<f32>,
    pub state: S,
}

/// Tracked parameters of one optimizer, keyed by name.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParamTable<S> {
    entries: BTreeMap<String, Tracked<S>>,
}

impl<S: Default> Default for ParamTable<S> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<S: Default> ParamTable<S> {
    pub fn track(&mut self, key: &str, params: &mut SceneParameters) -> ParamResult<()> {
        let values = params.get(key)?.to_vec();
        params.enable_grad(key)?;
        match self.entries.get_mut(key) {
            Some(tracked) => {
                if tracked.values.len() != values.len() {
                    tracing::debug!(key, len = values.len(), "parameter resized, state reset");
                    tracked.state = S::default();
                }
                tracked.values = values;
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    Tracked {
                        values,
                        lr: None,
                        state: S::default(),
                    },
                );
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&[f32]> {
        self.entries.get(key).map(|t| t.values.as_slice())
    }

    pub fn state(&self, key: &str) -> Option<&S> {
        self.entries.get(key).map(|t| &t.state)
    }

    fn tracked_mut(&mut self, key: &str) -> ParamResult<&mut Tracked<S>> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| ParamError::UnknownParameter(key.to_string()))
    }

    pub fn set_learning_rate(&mut self, key: &str, lr: f32) -> ParamResult<()> {
        let lr = check_learning_rate(lr)?;
        self.tracked_mut(key)?.lr = Some(lr);
        Ok(())
    }

    pub fn reset(&mut self, key: &str) -> ParamResult<()> {
        self.tracked_mut(key)?.state = S::default();
        Ok(())
    }

    /// Pair every tracked key with its gradient, checking presence and length
    /// before anything is modified.
    pub fn with_gradients<'g>(
        &mut self,
        grads: &'g Gradients,
    ) -> ParamResult<Vec<(&str, &mut Tracked<S>, &'g [f32])>> {
        for (key, tracked) in &self.entries {
            let grad = grads
                .get(key)
                .ok_or_else(|| ParamError::MissingGradient(key.clone()))?;
            if grad.len() != tracked.values.len() {
                return Err(ParamError::LengthMismatch {
                    key: key.clone(),
                    expected: tracked.values.len(),
                    got: grad.len(),
                });
            }
        }
        Ok(self
            .entries
            .iter_mut()
            .filter_map(|(key, tracked)| {
                grads.get(key).map(|grad| (key.as_str(), tracked, grad))
            })
            .collect())
    }

    pub fn write_back(&self, params: &mut SceneParameters) -> ParamResult<()> {
        for (key, tracked) in &self.entries {
            let resized = params.get(key)?.len() != tracked.values.len();
            if resized {
                params.insert(key.clone(), tracked.values.clone());
                params.enable_grad(key)?;
            } else {
                params.set(key, tracked.values.clone())?;
            }
        }
        Ok(())
    }
}
