//! Named differentiable parameters and their gradients.
//!
//! A [`Traversable`] scene exposes its differentiable leaves by key. A
//! [`SceneParameters`] record snapshots those leaves as plain `f32` arrays, lets
//! callers edit them, assigns forward-mode tangent slots to the leaves that should
//! be differentiated, and writes everything back with [`SceneParameters::update`].
//! Reverse-mode results come back as a [`Gradients`] record keyed the same way.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::ad::{Dual, GradAccumulator, MAX_TANGENTS};
use crate::color::Spectrum;
use crate::error::{ParamError, ParamResult};
use crate::math::DVec3;

/// Visitor over `(key, leaf)` pairs.
pub type ParamVisitor<'a> = dyn FnMut(&str, &mut [Dual]) + 'a;

/// Scene objects with named differentiable leaves.
pub trait Traversable {
    /// Call `visitor` once per leaf.
    fn traverse(&mut self, visitor: &mut ParamVisitor<'_>);

    /// Refresh derived state after the leaves named in `keys` were written.
    fn parameters_changed(&mut self, keys: &[String]);
}

/// Expose a vector as a three-element leaf.
pub fn visit_vec3(visitor: &mut ParamVisitor<'_>, key: &str, v: &mut DVec3) {
    let mut buf = [v.x, v.y, v.z];
    visitor(key, &mut buf);
    *v = DVec3::new(buf[0], buf[1], buf[2]);
}

/// Expose an RGB value as a three-element leaf.
pub fn visit_spectrum(visitor: &mut ParamVisitor<'_>, key: &str, s: &mut Spectrum) {
    let mut buf = [s.r, s.g, s.b];
    visitor(key, &mut buf);
    *s = Spectrum::new(buf[0], buf[1], buf[2]);
}

/// Expose a scalar as a one-element leaf.
pub fn visit_scalar(visitor: &mut ParamVisitor<'_>, key: &str, x: &mut Dual) {
    visitor(key, core::slice::from_mut(x));
}

#[derive(Debug, Clone, PartialEq)]
struct ParamEntry {
    values: Vec<f32>,
    slots: Option<Range<usize>>,
    dirty: bool,
}

/// Snapshot of a scene's differentiable leaves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneParameters {
    entries: BTreeMap<String, ParamEntry>,
}

impl SceneParameters {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every leaf of `scene`.
    pub fn from_scene<S: Traversable + ?Sized>(scene: &mut S) -> Self {
        let mut entries = BTreeMap::new();
        scene.traverse(&mut |key, leaf| {
            entries.insert(
                key.to_string(),
                ParamEntry {
                    values: leaf.iter().map(|x| x.value()).collect(),
                    slots: None,
                    dirty: false,
                },
            );
        });
        Self { entries }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current values of `key`.
    pub fn get(&self, key: &str) -> ParamResult<&[f32]> {
        self.entry(key).map(|e| e.values.as_slice())
    }

    /// Overwrite the values of an existing key; the length must not change.
    pub fn set(&mut self, key: &str, values: Vec<f32>) -> ParamResult<()> {
        let entry = self.entry_mut(key)?;
        if entry.values.len() != values.len() {
            return Err(ParamError::LengthMismatch {
                key: key.to_string(),
                expected: entry.values.len(),
                got: values.len(),
            });
        }
        entry.values = values;
        entry.dirty = true;
        Ok(())
    }

    /// Insert or replace a key, allowing its length to change. Gradient tracking
    /// of a replaced key is dropped.
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<f32>) {
        self.entries.insert(
            key.into(),
            ParamEntry {
                values,
                slots: None,
                dirty: true,
            },
        );
    }

    /// Assign tangent slots to every element of `key`. Returns the slot range.
    pub fn enable_grad(&mut self, key: &str) -> ParamResult<Range<usize>> {
        if let Some(slots) = self.entry(key)?.slots.clone() {
            return Ok(slots);
        }
        let start = self.slots_in_use();
        let entry = self.entry_mut(key)?;
        let end = start + entry.values.len();
        if end > MAX_TANGENTS {
            return Err(ParamError::TangentCapacity {
                requested: end,
                capacity: MAX_TANGENTS,
            });
        }
        entry.slots = Some(start..end);
        entry.dirty = true;
        Ok(start..end)
    }

    /// Stop differentiating `key`.
    pub fn disable_grad(&mut self, key: &str) -> ParamResult<()> {
        let entry = self.entry_mut(key)?;
        if entry.slots.take().is_some() {
            entry.dirty = true;
        }
        Ok(())
    }

    /// Tangent slots of `key`, if it is differentiated.
    pub fn slots(&self, key: &str) -> Option<Range<usize>> {
        self.entries.get(key).and_then(|e| e.slots.clone())
    }

    /// Keys that are currently differentiated.
    pub fn grad_enabled(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.slots.is_some())
            .map(|(k, _)| k.as_str())
    }

    fn slots_in_use(&self) -> usize {
        self.entries
            .values()
            .filter_map(|e| e.slots.as_ref().map(|r| r.end))
            .max()
            .unwrap_or(0)
    }

    /// Write modified leaves back into `scene`, seeding tangents for differentiated
    /// leaves, and notify the scene. Returns the keys that were written.
    pub fn update<S: Traversable + ?Sized>(&mut self, scene: &mut S) -> ParamResult<Vec<String>> {
        let mut changed = Vec::new();
        let mut failure = None;
        scene.traverse(&mut |key, leaf| {
            let Some(entry) = self.entries.get(key) else {
                return;
            };
            if !entry.dirty {
                return;
            }
            if entry.values.len() != leaf.len() {
                failure.get_or_insert(ParamError::LengthMismatch {
                    key: key.to_string(),
                    expected: leaf.len(),
                    got: entry.values.len(),
                });
                return;
            }
            for (i, (dst, &v)) in leaf.iter_mut().zip(entry.values.iter()).enumerate() {
                *dst = match &entry.slots {
                    Some(slots) => Dual::variable(v, slots.start + i),
                    None => Dual::constant(v),
                };
            }
            changed.push(key.to_string());
        });
        if let Some(err) = failure {
            return Err(err);
        }
        for key in &changed {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.dirty = false;
            }
        }
        if !changed.is_empty() {
            tracing::debug!(count = changed.len(), "scene parameters updated");
            scene.parameters_changed(&changed);
        }
        Ok(changed)
    }

    /// Zeroed gradient record for the differentiated keys.
    pub fn gradients(&self) -> Gradients {
        let mut grads = Gradients::default();
        for (key, entry) in &self.entries {
            if let Some(slots) = &entry.slots {
                grads.slots.insert(key.clone(), slots.clone());
                grads.values.insert(key.clone(), vec![0.0; slots.len()]);
            }
        }
        grads
    }

    /// Forward-mode derivative of `value` with respect to each element of `key`.
    pub fn forward_grad(&self, key: &str, value: Dual) -> ParamResult<Vec<f32>> {
        let entry = self.entry(key)?;
        Ok(match &entry.slots {
            Some(slots) => slots.clone().map(|s| value.grad(s)).collect(),
            None => vec![0.0; entry.values.len()],
        })
    }

    fn entry(&self, key: &str) -> ParamResult<&ParamEntry> {
        self.entries
            .get(key)
            .ok_or_else(|| ParamError::UnknownParameter(key.to_string()))
    }

    fn entry_mut(&mut self, key: &str) -> ParamResult<&mut ParamEntry> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| ParamError::UnknownParameter(key.to_string()))
    }
}

/// Reverse-mode gradients per parameter key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gradients {
    values: BTreeMap<String, Vec<f32>>,
    slots: BTreeMap<String, Range<usize>>,
}

impl Gradients {
    /// Add the slot sums of `acc` into the matching keys.
    pub fn absorb(&mut self, acc: &GradAccumulator) {
        for (key, slots) in &self.slots {
            if let Some(dst) = self.values.get_mut(key) {
                for (g, slot) in dst.iter_mut().zip(slots.clone()) {
                    *g += acc.slot(slot) as f32;
                }
            }
        }
    }

    /// Set the gradient of `key` directly.
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<f32>) {
        self.values.insert(key.into(), values);
    }

    pub fn get(&self, key: &str) -> Option<&[f32]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
