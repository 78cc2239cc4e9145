use crate::genome::Genome;
use crate::sampler::WeightedSampler;
use loci_error::{LociResult, ensure, loci_err};

/// One subpopulation: two arrays of 2N genomes under the
/// child-becomes-parent swap discipline, a selfing fraction, migration
/// fractions by source id, and the fitness-weighted parent sampler rebuilt
/// each generation.
#[derive(Debug)]
pub struct Subpopulation {
    pub id: i64,
    size: usize,
    child_size: usize,
    selfing_fraction: f64,
    migration_fractions: Vec<(i64, f64)>,
    parent_genomes: Vec<Genome>,
    child_genomes: Vec<Genome>,
    fitness: Vec<f64>,
    sampler: Option<WeightedSampler>,
}

impl Subpopulation {
    pub fn new(id: i64, size: usize) -> LociResult<Self> {
        ensure!(id >= 0, Simulation: "subpopulation ids must be non-negative, not {}", id);
        ensure!(size > 0, Simulation: "subpopulation p{} requires a positive size", id);
        Ok(Subpopulation {
            id,
            size,
            child_size: size,
            selfing_fraction: 0.0,
            migration_fractions: Vec::new(),
            parent_genomes: vec![Genome::new(); 2 * size],
            child_genomes: vec![Genome::new(); 2 * size],
            fitness: Vec::new(),
            sampler: None,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn child_size(&self) -> usize {
        self.child_size
    }

    pub fn selfing_fraction(&self) -> f64 {
        self.selfing_fraction
    }

    pub fn set_selfing_fraction(&mut self, fraction: f64) -> LociResult<()> {
        ensure!(
            (0.0..=1.0).contains(&fraction),
            Domain: "the selfing fraction must lie in [0, 1], not {}", fraction
        );
        self.selfing_fraction = fraction;
        Ok(())
    }

    /// The new size takes effect for the next offspring generation.
    pub fn set_size(&mut self, size: usize) -> LociResult<()> {
        ensure!(size > 0, Domain: "subpopulation p{} requires a positive size", self.id);
        self.child_size = size;
        self.child_genomes = vec![Genome::new(); 2 * size];
        Ok(())
    }

    pub fn migration_fractions(&self) -> &[(i64, f64)] {
        &self.migration_fractions
    }

    pub fn set_migration_fractions(&mut self, fractions: Vec<(i64, f64)>) -> LociResult<()> {
        let mut total = 0.0;
        for &(source, fraction) in &fractions {
            ensure!(
                source != self.id,
                Simulation: "subpopulation p{} cannot receive migrants from itself", self.id
            );
            ensure!(
                (0.0..=1.0).contains(&fraction),
                Domain: "migration fractions must lie in [0, 1], not {}", fraction
            );
            total += fraction;
        }
        ensure!(
            total <= 1.0,
            Domain: "migration fractions into p{} sum to {}, which exceeds 1", self.id, total
        );
        self.migration_fractions = fractions;
        Ok(())
    }

    pub fn parent_genomes(&self) -> &[Genome] {
        &self.parent_genomes
    }

    pub fn parent_genomes_mut(&mut self) -> &mut [Genome] {
        &mut self.parent_genomes
    }

    pub fn child_genomes(&self) -> &[Genome] {
        &self.child_genomes
    }

    pub fn child_genomes_mut(&mut self) -> &mut [Genome] {
        &mut self.child_genomes
    }

    /// The two genomes of parent individual `index`.
    pub fn parent_pair(&self, index: usize) -> (&Genome, &Genome) {
        (
            &self.parent_genomes[2 * index],
            &self.parent_genomes[2 * index + 1],
        )
    }

    pub fn set_child_genome(&mut self, genome_index: usize, genome: Genome) {
        self.child_genomes[genome_index] = genome;
    }

    /// Installs this generation's fitness values and rebuilds the weighted
    /// parent sampler from them.
    pub fn update_fitness(&mut self, values: Vec<f64>) -> LociResult<()> {
        ensure!(
            values.len() == self.size,
            Shape: "fitness vector of size {} does not match subpopulation p{} of size {}",
            values.len(), self.id, self.size
        );
        self.sampler = Some(WeightedSampler::new(&values).map_err(
            |_| loci_err!(Simulation: "all fitness values in p{} are zero; no parent can be drawn", self.id),
        )?);
        self.fitness = values;
        Ok(())
    }

    pub fn cached_fitness(&self) -> &[f64] {
        &self.fitness
    }

    /// Draws a parent index by cached fitness.
    pub fn draw_parent(&self) -> LociResult<usize> {
        self.sampler
            .as_ref()
            .map(|s| s.draw())
            .ok_or_else(|| loci_err!(Simulation: "fitness has not been evaluated for p{}", self.id))
    }

    /// Publishes the children as the new parent generation. The old parent
    /// array becomes the scratch child array for the next generation.
    pub fn swap_generations(&mut self) {
        std::mem::swap(&mut self.parent_genomes, &mut self.child_genomes);
        self.size = self.child_size;
        self.child_genomes = vec![Genome::new(); 2 * self.child_size];
        self.fitness.clear();
        self.sampler = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{Dfe, Mutation, MutationType};
    use loci_script::random_provider;
    use std::rc::Rc;

    #[test]
    fn test_construction_validations() {
        assert!(Subpopulation::new(-1, 10).is_err());
        assert!(Subpopulation::new(1, 0).is_err());

        let sp = Subpopulation::new(1, 10).unwrap();
        assert_eq!(sp.parent_genomes().len(), 20);
        assert_eq!(sp.child_genomes().len(), 20);
    }

    #[test]
    fn test_migration_validation() {
        let mut sp = Subpopulation::new(1, 10).unwrap();
        assert!(sp.set_migration_fractions(vec![(1, 0.1)]).is_err());
        assert!(sp.set_migration_fractions(vec![(2, 0.7), (3, 0.7)]).is_err());
        assert!(sp.set_migration_fractions(vec![(2, 0.2), (3, 0.1)]).is_ok());
    }

    #[test]
    fn test_fitness_sampler_and_draws() {
        random_provider::set_seed(4);
        let mut sp = Subpopulation::new(1, 3).unwrap();
        assert!(sp.draw_parent().is_err());

        sp.update_fitness(vec![0.0, 1.0, 0.0]).unwrap();
        for _ in 0..50 {
            assert_eq!(sp.draw_parent().unwrap(), 1);
        }

        assert!(sp.update_fitness(vec![0.0, 0.0, 0.0]).is_err());
        assert!(sp.update_fitness(vec![1.0]).is_err());
    }

    #[test]
    fn test_swap_publishes_children() {
        let mutation_type = Rc::new(MutationType::new(1, 0.5, Dfe::Fixed(0.1)).unwrap());
        let m = Mutation::new(mutation_type, 5, 0.1, 1, 1);

        let mut sp = Subpopulation::new(1, 2).unwrap();
        sp.update_fitness(vec![1.0, 1.0]).unwrap();
        sp.set_child_genome(0, Genome::from_sorted(vec![m]));

        sp.swap_generations();
        assert_eq!(sp.parent_genomes()[0].len(), 1);
        assert!(sp.child_genomes().iter().all(Genome::is_empty));
        assert!(sp.draw_parent().is_err(), "fitness cache invalidated");
    }

    #[test]
    fn test_resize_applies_to_children() {
        let mut sp = Subpopulation::new(1, 4).unwrap();
        sp.set_size(6).unwrap();
        assert_eq!(sp.size(), 4, "parent generation unchanged");
        assert_eq!(sp.child_genomes().len(), 12);

        sp.swap_generations();
        assert_eq!(sp.size(), 6);
    }
}
