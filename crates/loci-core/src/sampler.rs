use loci_error::{LociResult, ensure};
use loci_script::random_provider;

/// A weighted discrete sampler over indices, built once from a weight vector
/// and consulted many times. Draws walk the cumulative distribution with a
/// binary search against a single uniform.
#[derive(Debug, Clone)]
pub struct WeightedSampler {
    cumulative: Vec<f64>,
    total: f64,
}

impl WeightedSampler {
    pub fn new(weights: &[f64]) -> LociResult<Self> {
        ensure!(!weights.is_empty(), Domain: "a weighted sampler requires at least one weight");

        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total = 0.0;
        for &w in weights {
            ensure!(
                w >= 0.0 && w.is_finite(),
                Domain: "sampler weights must be finite and non-negative, not {}", w
            );
            total += w;
            cumulative.push(total);
        }
        ensure!(total > 0.0, Domain: "sampler weights must sum to a positive total");

        Ok(WeightedSampler { cumulative, total })
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn draw(&self) -> usize {
        let u: f64 = random_provider::random::<f64>() * self.total;
        self.cumulative
            .partition_point(|&c| c <= u)
            .min(self.cumulative.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_weights() {
        assert!(WeightedSampler::new(&[]).is_err());
        assert!(WeightedSampler::new(&[0.0, 0.0]).is_err());
        assert!(WeightedSampler::new(&[-1.0, 2.0]).is_err());
        assert!(WeightedSampler::new(&[1.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_draws_cover_support() {
        random_provider::set_seed(99);
        let sampler = WeightedSampler::new(&[1.0, 1.0, 1.0]).unwrap();
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[sampler.draw()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_zero_weight_excluded() {
        random_provider::set_seed(5);
        let sampler = WeightedSampler::new(&[0.0, 1.0]).unwrap();
        for _ in 0..100 {
            assert_eq!(sampler.draw(), 1);
        }
    }

    #[test]
    fn test_weighting_is_roughly_proportional() {
        random_provider::set_seed(42);
        let sampler = WeightedSampler::new(&[1.0, 9.0]).unwrap();
        let n = 10_000;
        let heavy = (0..n).filter(|_| sampler.draw() == 1).count();
        let share = heavy as f64 / n as f64;
        assert!((share - 0.9).abs() < 0.03, "share was {}", share);
    }
}
