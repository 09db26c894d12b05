//! PCG-based random sequence sources.
//!
//! Every lane of a wavefront owns an independent [`Pcg32`] stream keyed by its
//! global lane index and the render seed. Cloning a sampler forks it by value, so
//! two passes seeded identically replay bit-identical sequences.

use crate::math::Vec2;

/// PCG32 default multiplier.
const PCG_MULT: u64 = 6364136223846793005;
/// PCG32 default increment base.
const PCG_INIT: u64 = 0x853c49e6748fea9b;

/// Uniform variates for one lane.
pub trait Sampler {
    /// Next uniform variate in `[0, 1)`.
    fn next_1d(&mut self) -> f32;

    /// Next pair of uniform variates in `[0, 1)^2`.
    fn next_2d(&mut self) -> Vec2 {
        let x = self.next_1d();
        let y = self.next_1d();
        Vec2::new(x, y)
    }
}

/// Small PCG32 RNG for deterministic per-lane sampling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

impl Pcg32 {
    /// Create a new RNG stream using a per-lane index and global seed.
    pub fn new(idx: u64, seed: u64) -> Self {
        let mut rng = Self {
            state: 0,
            inc: (idx.wrapping_add(1) << 1) | 1,
        };
        rng.next_u32();
        rng.state = rng.state.wrapping_add(PCG_INIT.wrapping_add(seed));
        rng.next_u32();
        rng
    }

    /// Generate the next 32-bit random value.
    pub fn next_u32(&mut self) -> u32 {
        let old = self.state;
        self.state = old.wrapping_mul(PCG_MULT).wrapping_add(self.inc | 1);
        let xorshifted = (((old >> 18) ^ old) >> 27) as u32;
        let rot = (old >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Generate a uniform float in the half-open interval [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        let u = self.next_u32();
        let bits = (u >> 9) | 0x3f800000;
        f32::from_bits(bits) - 1.0
    }
}

impl Sampler for Pcg32 {
    fn next_1d(&mut self) -> f32 {
        self.next_f32()
    }
}

/// Wavefront-level sampler: one independent stream per lane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndependentSampler {
    seed: u64,
    lanes: Vec<Pcg32>,
}

impl IndependentSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `wavefront_size` lanes numbered from zero.
    pub fn seed(&mut self, seed: u64, wavefront_size: usize) {
        self.seed_range(seed, 0, wavefront_size);
    }

    /// Seed `wavefront_size` lanes whose global indices start at `first_lane`.
    ///
    /// Large renders are split into several wavefronts; keying streams by the
    /// global lane index keeps the result independent of the split.
    pub fn seed_range(&mut self, seed: u64, first_lane: u64, wavefront_size: usize) {
        self.seed = seed;
        self.lanes = (0..wavefront_size as u64)
            .map(|i| Pcg32::new(first_lane + i, seed))
            .collect();
    }

    /// Seed value used by the last call to `seed`.
    pub fn current_seed(&self) -> u64 {
        self.seed
    }

    pub fn wavefront_size(&self) -> usize {
        self.lanes.len()
    }

    /// Per-lane streams, for data-parallel consumption.
    pub fn lanes_mut(&mut self) -> &mut [Pcg32] {
        &mut self.lanes
    }

    /// Consume the sampler and return its lane streams.
    pub fn into_lanes(self) -> Vec<Pcg32> {
        self.lanes
    }
}
