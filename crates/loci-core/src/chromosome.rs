use crate::element::GenomicElement;
use crate::mutation::MutationType;
use crate::sampler::WeightedSampler;
use loci_error::{LociResult, ensure, loci_err};
use loci_script::random_provider;
use std::rc::Rc;

/// A piecewise-constant per-site rate map: `rates[i]` applies to positions
/// from the previous end (exclusive) through `ends[i]` (inclusive).
#[derive(Debug, Clone)]
pub struct RateMap {
    ends: Vec<u32>,
    rates: Vec<f64>,
}

impl RateMap {
    pub fn new(rates: Vec<f64>, ends: Vec<u32>) -> LociResult<Self> {
        ensure!(
            rates.len() == ends.len() && !rates.is_empty(),
            Simulation: "a rate map requires matching, non-empty rate and end vectors ({} vs {})",
            rates.len(), ends.len()
        );
        for window in ends.windows(2) {
            ensure!(
                window[0] < window[1],
                Simulation: "rate map ends must be strictly ascending"
            );
        }
        for &rate in &rates {
            ensure!(
                rate >= 0.0 && rate.is_finite(),
                Simulation: "rates must be finite and non-negative, not {}", rate
            );
        }
        Ok(RateMap { ends, rates })
    }

    pub fn uniform(rate: f64, last_position: u32) -> LociResult<Self> {
        RateMap::new(vec![rate], vec![last_position])
    }

    pub fn last_end(&self) -> u32 {
        *self.ends.last().unwrap()
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn ends(&self) -> &[u32] {
        &self.ends
    }

    /// Inclusive segments as `(start, end, rate)`.
    pub fn segments(&self) -> impl Iterator<Item = (u32, u32, f64)> + '_ {
        self.ends.iter().enumerate().map(|(i, &end)| {
            let start = if i == 0 { 0 } else { self.ends[i - 1] + 1 };
            (start, end, self.rates[i])
        })
    }

    /// Total rate integrated over the inclusive interval `[start, end]`.
    pub fn integrated(&self, start: u32, end: u32) -> f64 {
        let mut total = 0.0;
        for (seg_start, seg_end, rate) in self.segments() {
            let lo = seg_start.max(start);
            let hi = seg_end.min(end);
            if lo <= hi {
                total += rate * ((hi - lo) as f64 + 1.0);
            }
        }
        total
    }
}

/// The chromosome model: tiled genomic elements, mutation- and
/// recombination-rate maps, and gene conversion parameters, plus the caches
/// the per-meiosis kernel runs on (discrete samplers over element mutation
/// weights and recombination intervals, and the `exp(-rate)` scalars behind
/// the joint-zero fast path).
#[derive(Debug)]
pub struct Chromosome {
    elements: Vec<Rc<GenomicElement>>,
    mutation_rates: RateMap,
    recombination_rates: RateMap,
    pub gene_conversion_fraction: f64,
    pub gene_conversion_mean_length: f64,
    last_position: u32,

    element_sampler: Option<WeightedSampler>,
    recomb_sampler: Option<WeightedSampler>,
    recomb_intervals: Vec<(u32, u32)>,
    overall_mutation_rate: f64,
    overall_recombination_rate: f64,
    exp_neg_mu: f64,
    exp_neg_r: f64,
    prob_both_zero: f64,
}

impl Chromosome {
    /// A chromosome with no elements and zero rates; the kernel cannot draw
    /// from it, but a simulation with no genetics can still run its script
    /// blocks.
    pub fn empty() -> Self {
        Chromosome {
            elements: Vec::new(),
            mutation_rates: RateMap {
                ends: vec![0],
                rates: vec![0.0],
            },
            recombination_rates: RateMap {
                ends: vec![0],
                rates: vec![0.0],
            },
            gene_conversion_fraction: 0.0,
            gene_conversion_mean_length: 1.0,
            last_position: 0,
            element_sampler: None,
            recomb_sampler: None,
            recomb_intervals: Vec::new(),
            overall_mutation_rate: 0.0,
            overall_recombination_rate: 0.0,
            exp_neg_mu: 1.0,
            exp_neg_r: 1.0,
            prob_both_zero: 1.0,
        }
    }

    pub fn new(
        mut elements: Vec<Rc<GenomicElement>>,
        mutation_rates: RateMap,
        recombination_rates: RateMap,
        gene_conversion_fraction: f64,
        gene_conversion_mean_length: f64,
    ) -> LociResult<Self> {
        ensure!(
            !elements.is_empty(),
            Simulation: "a chromosome requires at least one genomic element"
        );
        ensure!(
            (0.0..=1.0).contains(&gene_conversion_fraction),
            Simulation: "the gene conversion fraction must lie in [0, 1], not {}",
            gene_conversion_fraction
        );
        ensure!(
            gene_conversion_mean_length >= 1.0,
            Simulation: "the mean gene conversion tract length must be at least 1, not {}",
            gene_conversion_mean_length
        );

        elements.sort_by_key(|e| e.start);
        for window in elements.windows(2) {
            ensure!(
                window[0].end < window[1].start,
                Simulation: "overlapping genomic elements at positions {} and {}",
                window[1].start, window[0].end
            );
        }
        let last_position = elements.last().unwrap().end;

        ensure!(
            mutation_rates.last_end() >= last_position,
            Simulation: "the mutation rate map does not cover the chromosome ({} < {})",
            mutation_rates.last_end(), last_position
        );
        ensure!(
            recombination_rates.last_end() >= last_position,
            Simulation: "inconsistent recombination map: it ends at {} but the chromosome ends at {}",
            recombination_rates.last_end(), last_position
        );

        let mut chromosome = Chromosome {
            elements,
            mutation_rates,
            recombination_rates,
            gene_conversion_fraction,
            gene_conversion_mean_length,
            last_position,
            element_sampler: None,
            recomb_sampler: None,
            recomb_intervals: Vec::new(),
            overall_mutation_rate: 0.0,
            overall_recombination_rate: 0.0,
            exp_neg_mu: 1.0,
            exp_neg_r: 1.0,
            prob_both_zero: 1.0,
        };
        chromosome.initialize_caches()?;
        Ok(chromosome)
    }

    fn initialize_caches(&mut self) -> LociResult<()> {
        let element_weights: Vec<f64> = self
            .elements
            .iter()
            .map(|e| self.mutation_rates.integrated(e.start, e.end))
            .collect();
        self.overall_mutation_rate = element_weights.iter().sum();
        self.element_sampler = if self.overall_mutation_rate > 0.0 {
            Some(WeightedSampler::new(&element_weights)?)
        } else {
            None
        };

        let mut interval_weights = Vec::new();
        self.recomb_intervals.clear();
        for (start, end, rate) in self.recombination_rates.segments() {
            let end = end.min(self.last_position);
            if start > end {
                break;
            }
            if rate > 0.0 {
                interval_weights.push(rate * ((end - start) as f64 + 1.0));
                self.recomb_intervals.push((start, end));
            }
        }
        self.overall_recombination_rate = interval_weights.iter().sum();
        self.recomb_sampler = if self.overall_recombination_rate > 0.0 {
            Some(WeightedSampler::new(&interval_weights)?)
        } else {
            None
        };

        self.exp_neg_mu = (-self.overall_mutation_rate).exp();
        self.exp_neg_r = (-self.overall_recombination_rate).exp();
        self.prob_both_zero = self.exp_neg_mu * self.exp_neg_r;
        Ok(())
    }

    pub fn elements(&self) -> &[Rc<GenomicElement>] {
        &self.elements
    }

    pub fn last_position(&self) -> u32 {
        self.last_position
    }

    pub fn overall_mutation_rate(&self) -> f64 {
        self.overall_mutation_rate
    }

    pub fn overall_recombination_rate(&self) -> f64 {
        self.overall_recombination_rate
    }

    pub fn mutation_rates(&self) -> &RateMap {
        &self.mutation_rates
    }

    pub fn recombination_rates(&self) -> &RateMap {
        &self.recombination_rates
    }

    /// The joint `(mutation count, breakpoint count)` draw for one meiosis.
    /// A single uniform settles the overwhelmingly common all-zero case and
    /// picks the branch among the three non-zero cases; non-zero counts come
    /// from truncated-nonzero Poisson draws.
    pub fn draw_event_counts(&self) -> (usize, usize) {
        let u: f64 = random_provider::random();
        if u < self.prob_both_zero {
            return (0, 0);
        }

        let p_mut_only = (1.0 - self.exp_neg_mu) * self.exp_neg_r;
        let p_rec_only = self.exp_neg_mu * (1.0 - self.exp_neg_r);
        let v = u - self.prob_both_zero;

        if v < p_mut_only {
            let k = random_provider::poisson_nonzero(self.overall_mutation_rate, self.exp_neg_mu);
            (k as usize, 0)
        } else if v < p_mut_only + p_rec_only {
            let k =
                random_provider::poisson_nonzero(self.overall_recombination_rate, self.exp_neg_r);
            (0, k as usize)
        } else {
            let k_mu =
                random_provider::poisson_nonzero(self.overall_mutation_rate, self.exp_neg_mu);
            let k_r =
                random_provider::poisson_nonzero(self.overall_recombination_rate, self.exp_neg_r);
            (k_mu as usize, k_r as usize)
        }
    }

    /// Draws `count` breakpoints, each uniform within a sampler-chosen
    /// recombination interval. With the configured probability a breakpoint
    /// is promoted to a gene-conversion tract: a geometric tract length is
    /// drawn and a paired breakpoint inserted. The result is sorted.
    pub fn draw_breakpoints(&self, count: usize) -> Vec<u32> {
        let Some(sampler) = &self.recomb_sampler else {
            return Vec::new();
        };

        let mut breakpoints = Vec::with_capacity(count);
        for _ in 0..count {
            let (start, end) = self.recomb_intervals[sampler.draw()];
            let position =
                random_provider::range(start as u64..end as u64 + 1) as u32;

            if self.gene_conversion_fraction > 0.0
                && random_provider::bool(self.gene_conversion_fraction)
            {
                let tract =
                    random_provider::geometric(1.0 / self.gene_conversion_mean_length) as u32;
                breakpoints.push(position);
                breakpoints.push(position.saturating_add(tract));
            } else {
                breakpoints.push(position);
            }
        }
        breakpoints.sort_unstable();
        breakpoints
    }

    /// Draws a mutation placement: an element by integrated mutation weight,
    /// a position uniform within it, and a mutation type by the element's
    /// type weights.
    pub fn draw_mutation_site(&self) -> LociResult<(u32, Rc<MutationType>)> {
        let sampler = self
            .element_sampler
            .as_ref()
            .ok_or_else(|| loci_err!(Simulation: "cannot draw mutations: the overall mutation rate is zero"))?;
        let element = &self.elements[sampler.draw()];
        let position =
            random_provider::range(element.start as u64..element.end as u64 + 1) as u32;
        let mutation_type = Rc::clone(element.element_type.draw_mutation_type());
        Ok((position, mutation_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::GenomicElementType;
    use crate::mutation::{Dfe, MutationType};

    fn element_type() -> Rc<GenomicElementType> {
        let m1 = Rc::new(MutationType::new(1, 0.5, Dfe::Fixed(0.0)).unwrap());
        Rc::new(GenomicElementType::new(1, vec![(m1, 1.0)]).unwrap())
    }

    fn chromosome(mu: f64, r: f64) -> Chromosome {
        let e = Rc::new(GenomicElement::new(element_type(), 0, 99_999).unwrap());
        Chromosome::new(
            vec![e],
            RateMap::uniform(mu, 99_999).unwrap(),
            RateMap::uniform(r, 99_999).unwrap(),
            0.0,
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_rate_map_integration() {
        let map = RateMap::new(vec![1e-7, 1e-8], vec![49_999, 99_999]).unwrap();
        let total = map.integrated(0, 99_999);
        let expected = 1e-7 * 50_000.0 + 1e-8 * 50_000.0;
        assert!((total - expected).abs() < 1e-12);
        assert!((map.integrated(50_000, 99_999) - 1e-8 * 50_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_rate_map_validation() {
        assert!(RateMap::new(vec![1e-7], vec![]).is_err());
        assert!(RateMap::new(vec![1e-7, 1e-8], vec![100, 100]).is_err());
        assert!(RateMap::new(vec![-1e-7], vec![100]).is_err());
    }

    #[test]
    fn test_overlapping_elements_rejected() {
        let et = element_type();
        let a = Rc::new(GenomicElement::new(Rc::clone(&et), 0, 100).unwrap());
        let b = Rc::new(GenomicElement::new(et, 100, 200).unwrap());
        let err = Chromosome::new(
            vec![a, b],
            RateMap::uniform(1e-7, 200).unwrap(),
            RateMap::uniform(1e-8, 200).unwrap(),
            0.0,
            1.0,
        )
        .unwrap_err();
        assert!(err.message().contains("overlapping"));
    }

    #[test]
    fn test_rate_map_must_cover_chromosome() {
        let e = Rc::new(GenomicElement::new(element_type(), 0, 1000).unwrap());
        let err = Chromosome::new(
            vec![e],
            RateMap::uniform(1e-7, 1000).unwrap(),
            RateMap::uniform(1e-8, 500).unwrap(),
            0.0,
            1.0,
        )
        .unwrap_err();
        assert!(err.message().contains("inconsistent recombination map"));
    }

    #[test]
    fn test_zero_rates_always_draw_zero_counts() {
        random_provider::set_seed(1);
        let c = chromosome(0.0, 0.0);
        for _ in 0..100 {
            assert_eq!(c.draw_event_counts(), (0, 0));
        }
        assert!(c.draw_mutation_site().is_err());
    }

    #[test]
    fn test_event_count_means() {
        random_provider::set_seed(7);
        let c = chromosome(1e-5, 2e-5);
        let n = 50_000;
        let mut mu_total = 0usize;
        let mut r_total = 0usize;
        for _ in 0..n {
            let (k_mu, k_r) = c.draw_event_counts();
            mu_total += k_mu;
            r_total += k_r;
        }
        let mu_mean = mu_total as f64 / n as f64;
        let r_mean = r_total as f64 / n as f64;
        assert!((mu_mean - 1.0).abs() < 0.05, "mu mean {}", mu_mean);
        assert!((r_mean - 2.0).abs() < 0.05, "r mean {}", r_mean);
    }

    #[test]
    fn test_breakpoints_in_range_and_sorted() {
        random_provider::set_seed(3);
        let c = chromosome(1e-7, 1e-5);
        let breakpoints = c.draw_breakpoints(50);
        assert_eq!(breakpoints.len(), 50);
        assert!(breakpoints.windows(2).all(|w| w[0] <= w[1]));
        assert!(breakpoints.iter().all(|&b| b <= 99_999));
    }

    #[test]
    fn test_gene_conversion_inserts_paired_breakpoints() {
        random_provider::set_seed(11);
        let e = Rc::new(GenomicElement::new(element_type(), 0, 99_999).unwrap());
        let c = Chromosome::new(
            vec![e],
            RateMap::uniform(1e-7, 99_999).unwrap(),
            RateMap::uniform(1e-5, 99_999).unwrap(),
            1.0,
            500.0,
        )
        .unwrap();
        assert_eq!(c.draw_breakpoints(10).len(), 20);
    }

    #[test]
    fn test_mutation_site_respects_element_bounds() {
        random_provider::set_seed(21);
        let c = chromosome(1e-7, 0.0);
        for _ in 0..100 {
            let (position, mutation_type) = c.draw_mutation_site().unwrap();
            assert!(position <= 99_999);
            assert_eq!(mutation_type.id, 1);
        }
    }
}
