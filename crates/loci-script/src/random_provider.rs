use rand::distr::{Distribution, StandardUniform, uniform::SampleUniform};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngExt, SeedableRng};
use std::cell::RefCell;
use std::ops::Range;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{LazyLock, Mutex};

/// The last seed installed with [set_seed], or the startup seed drawn from the
/// OS. Every stochastic draw in a simulation consults the one stream seeded
/// from this value, so replaying a script after `set_seed(n)` reproduces the
/// full trace of draws.
static LAST_SEED: AtomicI64 = AtomicI64::new(0);

static STARTUP_SEED: LazyLock<Mutex<i64>> = LazyLock::new(|| {
    let seed = SmallRng::from_rng(&mut rand::rng()).next_u64() as i64;
    LAST_SEED.store(seed, Ordering::Relaxed);
    Mutex::new(seed)
});

thread_local! {
    static TLS_RNG: RefCell<SmallRng> = RefCell::new({
        let seed = *STARTUP_SEED.lock().unwrap();
        SmallRng::seed_from_u64(seed as u64)
    });
}

pub fn with_rng<R>(f: impl FnOnce(&mut LociRand<'_>) -> R) -> R {
    TLS_RNG.with(|cell| {
        let mut rng = cell.borrow_mut();
        f(&mut LociRand::new(&mut rng))
    })
}

/// Fully resets the random stream to the given seed.
pub fn set_seed(seed: i64) {
    LazyLock::force(&STARTUP_SEED);
    LAST_SEED.store(seed, Ordering::Relaxed);
    TLS_RNG.with(|cell| {
        *cell.borrow_mut() = SmallRng::seed_from_u64(seed as u64);
    });
}

/// Returns the last seed set, or the seed chosen at startup.
pub fn get_seed() -> i64 {
    LazyLock::force(&STARTUP_SEED);
    LAST_SEED.load(Ordering::Relaxed)
}

///
/// For floating point types, the number will be in the range [0, 1).
/// For integer types, the number will be in the range [0, MAX).
#[inline(always)]
pub fn random<T>() -> T
where
    T: SampleUniform,
    StandardUniform: Distribution<T>,
{
    with_rng(|rng| rng.random())
}

/// Generates a random boolean with the given probability of being true.
#[inline(always)]
pub fn bool(prob: f64) -> bool {
    with_rng(|rng| rng.bool(prob))
}

/// Generates a random number of type T in the given range.
pub fn range<T>(range: Range<T>) -> T
where
    T: SampleUniform + PartialOrd,
{
    with_rng(|rng| rng.range(range))
}

/// Shuffles the given slice in place.
pub fn shuffle<T>(items: &mut [T]) {
    with_rng(|rng| rng.shuffle(items));
}

/// Generates a vector of indexes from the given range in random order.
pub fn shuffled_indices(range: Range<usize>) -> Vec<usize> {
    with_rng(|rng| rng.shuffled_indices(range))
}

pub fn sample_indices(range: Range<usize>, sample_size: usize) -> Vec<usize> {
    with_rng(|rng| rng.sample_indices(range, sample_size))
}

/// Generates a random number from a Gaussian distribution with the given mean
/// and standard deviation via the Box-Muller transform.
pub fn gaussian(mean: f64, std_dev: f64) -> f64 {
    with_rng(|rng| rng.gaussian(mean, std_dev))
}

/// Draws from an exponential distribution with the given mean.
pub fn exponential(mean: f64) -> f64 {
    with_rng(|rng| rng.exponential(mean))
}

/// Draws a Poisson count with the given rate.
pub fn poisson(lambda: f64) -> u64 {
    with_rng(|rng| rng.poisson(lambda))
}

/// Draws a Poisson count conditioned on being non-zero. `exp_neg_lambda` is
/// the precomputed `exp(-lambda)` so hot paths can avoid recomputing it.
pub fn poisson_nonzero(lambda: f64, exp_neg_lambda: f64) -> u64 {
    with_rng(|rng| rng.poisson_nonzero(lambda, exp_neg_lambda))
}

/// Draws a binomial count of successes out of `n` trials.
pub fn binomial(n: u64, prob: f64) -> u64 {
    with_rng(|rng| rng.binomial(n, prob))
}

/// Draws a geometric count of trials until first success (support starts at 1).
pub fn geometric(prob: f64) -> u64 {
    with_rng(|rng| rng.geometric(prob))
}

/// Draws from a gamma distribution parameterized by mean and shape.
pub fn gamma(mean: f64, shape: f64) -> f64 {
    with_rng(|rng| rng.gamma(mean, shape))
}

pub struct LociRand<'a>(&'a mut SmallRng);

impl<'a> LociRand<'a> {
    pub fn new(rng: &'a mut SmallRng) -> Self {
        LociRand(rng)
    }

    #[inline]
    pub fn random<T>(&mut self) -> T
    where
        T: SampleUniform,
        StandardUniform: Distribution<T>,
    {
        self.0.random()
    }

    #[inline]
    pub fn range<T>(&mut self, range: Range<T>) -> T
    where
        T: SampleUniform + PartialOrd,
    {
        self.0.random_range(range)
    }

    #[inline]
    pub fn bool(&mut self, prob: f64) -> bool {
        self.0.random_bool(prob.clamp(0.0, 1.0))
    }

    #[inline]
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.0);
    }

    #[inline]
    pub fn shuffled_indices(&mut self, range: Range<usize>) -> Vec<usize> {
        let mut indexes = range.collect::<Vec<usize>>();
        indexes.shuffle(&mut self.0);
        indexes
    }

    #[inline]
    pub fn sample_indices(&mut self, range: Range<usize>, sample_size: usize) -> Vec<usize> {
        let mut indexes = range.collect::<Vec<usize>>();
        indexes.shuffle(&mut self.0);
        indexes.truncate(sample_size);
        indexes
    }

    #[inline]
    pub fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1: f64 = self.0.random();
        let u2: f64 = self.0.random();
        let z0 = (-2.0 * u1.max(f64::MIN_POSITIVE).ln()).sqrt()
            * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z0
    }

    #[inline]
    pub fn exponential(&mut self, mean: f64) -> f64 {
        let u: f64 = self.0.random();
        -mean * (1.0 - u).ln()
    }

    /// Knuth multiplication, chunked so large rates do not underflow the
    /// running product.
    pub fn poisson(&mut self, lambda: f64) -> u64 {
        let mut remaining = lambda;
        let mut count = 0u64;
        while remaining > 500.0 {
            count += self.poisson_chunk(500.0);
            remaining -= 500.0;
        }
        count + self.poisson_chunk(remaining)
    }

    fn poisson_chunk(&mut self, lambda: f64) -> u64 {
        if lambda <= 0.0 {
            return 0;
        }
        let limit = (-lambda).exp();
        let mut product: f64 = self.0.random();
        let mut count = 0u64;
        while product > limit {
            count += 1;
            let u: f64 = self.0.random();
            product *= u;
        }
        count
    }

    /// Inverse-CDF draw of a Poisson conditioned on a non-zero count. The
    /// uniform is rescaled past the zero class, so the zero branch never has
    /// to be walked.
    pub fn poisson_nonzero(&mut self, lambda: f64, exp_neg_lambda: f64) -> u64 {
        let u: f64 = self.0.random();
        let mut cumulative = exp_neg_lambda;
        let mut term = exp_neg_lambda;
        let mut count = 0u64;
        let target = exp_neg_lambda + u * (1.0 - exp_neg_lambda);

        loop {
            count += 1;
            term *= lambda / count as f64;
            cumulative += term;
            if cumulative >= target || term < f64::MIN_POSITIVE {
                return count;
            }
        }
    }

    pub fn binomial(&mut self, n: u64, prob: f64) -> u64 {
        if prob <= 0.0 {
            return 0;
        }
        if prob >= 1.0 {
            return n;
        }
        let mut count = 0u64;
        for _ in 0..n {
            if self.0.random::<f64>() < prob {
                count += 1;
            }
        }
        count
    }

    #[inline]
    pub fn geometric(&mut self, prob: f64) -> u64 {
        let u: f64 = self.0.random();
        if prob >= 1.0 {
            return 1;
        }
        1 + ((1.0 - u).ln() / (1.0 - prob).ln()) as u64
    }

    /// Marsaglia-Tsang squeeze over the gaussian draw; shapes below one are
    /// boosted and corrected with the standard power-of-uniform step.
    pub fn gamma(&mut self, mean: f64, shape: f64) -> f64 {
        let scale = mean / shape;
        if shape < 1.0 {
            let u: f64 = self.0.random();
            return self.gamma_shape_ge_one(shape + 1.0) * u.powf(1.0 / shape) * scale;
        }
        self.gamma_shape_ge_one(shape) * scale
    }

    fn gamma_shape_ge_one(&mut self, shape: f64) -> f64 {
        let d = shape - 1.0 / 3.0;
        let c = 1.0 / (9.0 * d).sqrt();
        loop {
            let x = self.gaussian(0.0, 1.0);
            let v = (1.0 + c * x).powi(3);
            if v <= 0.0 {
                continue;
            }
            let u: f64 = self.0.random();
            if u < 1.0 - 0.0331 * x.powi(4) {
                return d * v;
            }
            if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
                return d * v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random() {
        for _ in 0..100 {
            let value: f64 = random();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn test_seed_replays_stream() {
        set_seed(42);
        let a: Vec<f64> = (0..10).map(|_| random()).collect();
        set_seed(42);
        let b: Vec<f64> = (0..10).map(|_| random()).collect();
        assert_eq!(a, b);
        assert_eq!(get_seed(), 42);
    }

    #[test]
    fn test_poisson_mean() {
        set_seed(7);
        let n = 20_000;
        let total: u64 = (0..n).map(|_| poisson(3.0)).sum();
        let mean = total as f64 / n as f64;
        assert!((mean - 3.0).abs() < 0.1, "poisson mean drifted: {}", mean);
    }

    #[test]
    fn test_poisson_nonzero_support() {
        set_seed(11);
        for _ in 0..1000 {
            assert!(poisson_nonzero(0.1, (-0.1f64).exp()) >= 1);
        }
    }

    #[test]
    fn test_binomial_bounds() {
        set_seed(3);
        for _ in 0..100 {
            let k = binomial(50, 0.25);
            assert!(k <= 50);
        }
        assert_eq!(binomial(10, 0.0), 0);
        assert_eq!(binomial(10, 1.0), 10);
    }

    #[test]
    fn test_geometric_support() {
        set_seed(5);
        for _ in 0..1000 {
            assert!(geometric(0.3) >= 1);
        }
    }

    #[test]
    fn test_gamma_positive() {
        set_seed(13);
        for _ in 0..1000 {
            assert!(gamma(1.0, 0.5) > 0.0);
            assert!(gamma(2.0, 3.0) > 0.0);
        }
    }
}
