use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::distributions::{Alphanumeric, DistString};
use rand::prelude::*;
use rand_pcg::Pcg64;

/// Epsilon to compare floating point values for equality.
pub const EPSILON: f64 = 1e-12;

#[derive(Clone)]
pub struct SimulationState {
    clock: f64,
    tick: u64,
    rand: Pcg64,
}

impl SimulationState {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: 0.0,
            tick: 0,
            rand: Pcg64::seed_from_u64(seed),
        }
    }

    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn advance(&mut self, delta: f64) {
        debug_assert!(delta >= 0., "simulation clock cannot go backwards");
        self.clock += delta;
        self.tick += 1;
    }

    pub fn rand(&mut self) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rand.gen_range(range)
    }

    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        dist.sample(&mut self.rand)
    }

    pub fn random_string(&mut self, len: usize) -> String {
        Alphanumeric.sample_string(&mut self.rand, len)
    }
}
