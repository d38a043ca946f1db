//! Weighted random selection using Vose's alias method.
//!
//! Construction is O(n) over the candidate list; every draw afterwards is
//! O(1): one uniform index, one uniform real, one comparison.
//!
//! ```text
//! weights   a:1  b:3
//! prob      0.25 0.75   average = 0.5
//! table     probability = [0.5, 1.0], alias = [1, 1]
//! draw      i = 0 -> u <= 0.5 ? a : b
//!           i = 1 -> b
//! ```

use rand::Rng;

use crate::error::DnsError;

/// Read-only alias table over a fixed, ordered list of candidates.
///
/// Never mutated after [`WeightedSampler::build`]; a weight change produces
/// a new sampler.
#[derive(Debug, Clone)]
pub struct WeightedSampler {
    candidates: Vec<String>,
    probability: Vec<f64>,
    alias: Vec<usize>,
}

impl WeightedSampler {
    /// Build a sampler from `(candidate, weight)` pairs.
    ///
    /// Candidate order is taken from the iterator and fixed for the lifetime
    /// of the sampler. Fails with [`DnsError::InvalidDistribution`] when there
    /// are no candidates or the weights sum to zero.
    pub fn build<'a, I>(weights: I) -> Result<Self, DnsError>
    where
        I: IntoIterator<Item = (&'a str, u32)>,
    {
        let (candidates, weights): (Vec<String>, Vec<u32>) = weights
            .into_iter()
            .map(|(candidate, weight)| (candidate.to_string(), weight))
            .unzip();

        let n = candidates.len();
        let total: u64 = weights.iter().map(|&w| u64::from(w)).sum();
        if n == 0 || total == 0 {
            return Err(DnsError::InvalidDistribution);
        }

        let mut prob: Vec<f64> = weights
            .iter()
            .map(|&w| f64::from(w) / total as f64)
            .collect();

        let scale = n as f64;
        let average = 1.0 / scale;
        let mut small = Vec::with_capacity(n);
        let mut large = Vec::with_capacity(n);
        for (i, &p) in prob.iter().enumerate() {
            if p < average {
                small.push(i);
            } else {
                large.push(i);
            }
        }

        let mut probability = vec![0.0; n];
        let mut alias: Vec<usize> = (0..n).collect();

        while let (Some(&s), Some(&l)) = (small.last(), large.last()) {
            small.pop();
            large.pop();

            probability[s] = prob[s] * scale;
            alias[s] = l;

            prob[l] = prob[l] + prob[s] - average;
            if prob[l] < average {
                small.push(l);
            } else {
                large.push(l);
            }
        }

        // Leftovers are due to floating-point rounding; select them outright.
        for i in large.into_iter().chain(small) {
            probability[i] = 1.0;
        }

        Ok(Self {
            candidates,
            probability,
            alias,
        })
    }

    /// Draw one candidate using the thread-local RNG.
    pub fn sample(&self) -> &str {
        self.sample_with(&mut rand::thread_rng())
    }

    /// Draw one candidate using the given RNG.
    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        let i = rng.gen_range(0..self.candidates.len());
        let u: f64 = rng.gen();
        if u <= self.probability[i] {
            &self.candidates[i]
        } else {
            &self.candidates[self.alias[i]]
        }
    }
}
