// VecBench — vectors.rs
// Vector sources feeding the loader and the query bench.
// Author: d65v <https://github.com/d65v>

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::npy::NpySource;
use crate::{BenchConfig, Result};

// ── Source Trait ──────────────────────────────────────────────────────────────

/// A finite, single-pass stream of vectors of one fixed length.
pub trait VectorSource: Iterator<Item = Vec<f32>> {
    /// Length of every vector this source yields.
    fn dim(&self) -> usize;

    /// Pull up to `n` vectors. Shorter only when the source runs dry.
    fn next_batch(&mut self, n: usize) -> Vec<Vec<f32>> {
        let mut batch = Vec::with_capacity(n);
        while batch.len() < n {
            match self.next() {
                Some(v) => batch.push(v),
                None => break,
            }
        }
        batch
    }
}

// ── Random ────────────────────────────────────────────────────────────────────

/// Uniform random vectors with every component in `[0, 1)`.
pub struct RandomVectors<R = StdRng> {
    dim: usize,
    remaining: usize,
    rng: R,
}

impl RandomVectors<StdRng> {
    pub fn new(dim: usize, count: usize) -> Self {
        Self::with_rng(dim, count, StdRng::from_entropy())
    }

    pub fn seeded(dim: usize, count: usize, seed: u64) -> Self {
        Self::with_rng(dim, count, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> RandomVectors<R> {
    pub fn with_rng(dim: usize, count: usize, rng: R) -> Self {
        Self { dim, remaining: count, rng }
    }
}

impl<R: Rng> Iterator for RandomVectors<R> {
    type Item = Vec<f32>;

    fn next(&mut self) -> Option<Vec<f32>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let rng = &mut self.rng;
        Some((0..self.dim).map(|_| rng.gen::<f32>()).collect())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R: Rng> VectorSource for RandomVectors<R> {
    fn dim(&self) -> usize {
        self.dim
    }
}

// ── Precomputed ───────────────────────────────────────────────────────────────

/// Vectors supplied up front, e.g. real embeddings.
pub struct VecSource {
    dim: usize,
    inner: std::vec::IntoIter<Vec<f32>>,
}

impl VecSource {
    pub fn new(dim: usize, vectors: Vec<Vec<f32>>) -> Self {
        Self { dim, inner: vectors.into_iter() }
    }
}

impl Iterator for VecSource {
    type Item = Vec<f32>;

    fn next(&mut self) -> Option<Vec<f32>> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl VectorSource for VecSource {
    fn dim(&self) -> usize {
        self.dim
    }
}

// ── Construction From Config ──────────────────────────────────────────────────

/// Source for the bulk loader: the configured `.npy` file, else random data.
pub fn data_source(config: &BenchConfig) -> Result<Box<dyn VectorSource>> {
    if let Some(path) = &config.vectors_file {
        log::info!("Loading vectors from {}", path.display());
        return Ok(Box::new(NpySource::open(path)?));
    }
    Ok(match config.seed {
        Some(seed) => Box::new(RandomVectors::seeded(config.dim, config.num_vectors, seed)),
        None => Box::new(RandomVectors::new(config.dim, config.num_vectors)),
    })
}

/// Source for the query bench: always random, decorrelated from the data seed.
pub fn query_source(config: &BenchConfig) -> Box<dyn VectorSource> {
    match config.seed {
        Some(seed) => Box::new(RandomVectors::seeded(
            config.dim,
            config.num_searches,
            seed.wrapping_add(1),
        )),
        None => Box::new(RandomVectors::new(config.dim, config.num_searches)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
