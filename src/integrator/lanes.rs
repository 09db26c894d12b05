use rayon::prelude::*;

/// Active-lane mask of a wavefront. Lanes can only be switched off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneMask {
    active: Vec<bool>,
}

impl LaneMask {
    /// Mask with `len` active lanes.
    pub fn all(len: usize) -> Self {
        Self {
            active: vec![true; len],
        }
    }

    /// Mask from explicit per-lane flags.
    pub fn from_flags(active: Vec<bool>) -> Self {
        Self { active }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of lanes still active.
    pub fn count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    pub fn any(&self) -> bool {
        self.active.iter().any(|&a| a)
    }

    /// False for lanes that were switched off and for lanes out of range.
    pub fn is_active(&self, lane: usize) -> bool {
        self.active.get(lane).copied().unwrap_or(false)
    }

    pub fn deactivate(&mut self, lane: usize) {
        if let Some(flag) = self.active.get_mut(lane) {
            *flag = false;
        }
    }

    /// Per-lane handles for data-parallel processing.
    pub fn flags_mut(&mut self) -> impl IndexedParallelIterator<Item = LaneFlag<'_>> + '_ {
        self.active.par_iter_mut().map(LaneFlag)
    }
}

/// Mutable view of one lane's flag that cannot re-activate the lane.
#[derive(Debug)]
pub struct LaneFlag<'a>(&'a mut bool);

impl LaneFlag<'_> {
    pub fn is_active(&self) -> bool {
        *self.0
    }

    pub fn deactivate(&mut self) {
        *self.0 = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lanes_only_turn_off() {
        let mut mask = LaneMask::all(4);
        assert_eq!(mask.count(), 4);
        mask.deactivate(1);
        mask.deactivate(9);
        assert!(!mask.is_active(1));
        assert!(!mask.is_active(9));
        assert_eq!(mask.count(), 3);
    }

    #[test]
    fn parallel_flags_write_back() {
        let mut mask = LaneMask::from_flags(vec![true, false, true, true]);
        mask.flags_mut().enumerate().for_each(|(i, mut flag)| {
            if i % 2 == 0 && flag.is_active() {
                flag.deactivate();
            }
        });
        assert_eq!(mask, LaneMask::from_flags(vec![false, false, false, true]));
        assert!(mask.any());
    }
}
