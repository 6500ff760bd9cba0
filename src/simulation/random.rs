use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Source of the uniform draws used by the simulator and the sync job.
pub trait RandomSource {
    /// Uniform integer in `0..span`. `span` is always at least 1.
    fn draw(&mut self, span: u32) -> u32;
}

/// `RandomSource` backed by any `rand` generator.
#[derive(Debug)]
pub struct RngSource<R> {
    rng: R,
}

impl<R: Rng> RngSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngSource<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> RandomSource for RngSource<R> {
    fn draw(&mut self, span: u32) -> u32 {
        self.rng.gen_range(0..span.max(1))
    }
}

/// Replays a fixed list of draws, clamped into range. Falls back to 0 when exhausted.
#[derive(Debug, Default, Clone)]
pub struct ScriptedSource {
    draws: VecDeque<u32>,
}

impl ScriptedSource {
    pub fn new(draws: impl IntoIterator<Item = u32>) -> Self {
        Self {
            draws: draws.into_iter().collect(),
        }
    }
}

impl RandomSource for ScriptedSource {
    fn draw(&mut self, span: u32) -> u32 {
        let value = self.draws.pop_front().unwrap_or(0);
        value.min(span.saturating_sub(1))
    }
}
