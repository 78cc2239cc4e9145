use crate::genome::Genome;
use crate::mutation::{MutRef, Mutation};
use crate::subpopulation::Subpopulation;
use hashbrown::{HashMap, HashSet};
use loci_error::{LociResult, ensure, loci_err};
use std::collections::BTreeMap;
use std::rc::Rc;

/// A mutation that reached frequency 1 and is now tracked outside genomes.
#[derive(Debug)]
pub struct Substitution {
    pub mutation: MutRef,
    pub fixation_generation: i64,
}

/// All subpopulations (ordered by id, which keeps dumps and census walks
/// deterministic) plus the substitutions registry.
#[derive(Debug, Default)]
pub struct Population {
    subpops: BTreeMap<i64, Subpopulation>,
    substitutions: Vec<Substitution>,
}

impl Population {
    pub fn new() -> Self {
        Population::default()
    }

    pub fn add_subpop(&mut self, subpop: Subpopulation) -> LociResult<()> {
        ensure!(
            !self.subpops.contains_key(&subpop.id),
            Simulation: "subpopulation p{} already exists", subpop.id
        );
        self.subpops.insert(subpop.id, subpop);
        Ok(())
    }

    pub fn remove_subpop(&mut self, id: i64) -> LociResult<()> {
        self.subpops
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| loci_err!(Simulation: "there is no subpopulation p{}", id))
    }

    pub fn get(&self, id: i64) -> LociResult<&Subpopulation> {
        self.subpops
            .get(&id)
            .ok_or_else(|| loci_err!(Simulation: "there is no subpopulation p{}", id))
    }

    pub fn get_mut(&mut self, id: i64) -> LociResult<&mut Subpopulation> {
        self.subpops
            .get_mut(&id)
            .ok_or_else(|| loci_err!(Simulation: "there is no subpopulation p{}", id))
    }

    pub fn ids(&self) -> Vec<i64> {
        self.subpops.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subpopulation> {
        self.subpops.values()
    }

    pub fn len(&self) -> usize {
        self.subpops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subpops.is_empty()
    }

    pub fn clear_subpops(&mut self) {
        self.subpops.clear();
    }

    pub fn substitutions(&self) -> &[Substitution] {
        &self.substitutions
    }

    /// Every distinct segregating mutation in parent genomes, in the
    /// deterministic scan order (subpops by id, genomes in order, mutations
    /// by position).
    pub fn segregating_mutations(&self) -> Vec<MutRef> {
        let mut seen: HashSet<*const Mutation> = HashSet::new();
        let mut out = Vec::new();
        for subpop in self.subpops.values() {
            for genome in subpop.parent_genomes() {
                for mutation in genome.mutations() {
                    if seen.insert(Rc::as_ptr(mutation)) {
                        out.push(Rc::clone(mutation));
                    }
                }
            }
        }
        out
    }

    /// Occurrence counts keyed by mutation identity, plus the total genome
    /// count, over parent or child genomes.
    pub fn census(&self, children: bool) -> (HashMap<*const Mutation, (MutRef, usize)>, usize) {
        let mut counts: HashMap<*const Mutation, (MutRef, usize)> = HashMap::new();
        let mut total_genomes = 0;
        for subpop in self.subpops.values() {
            let genomes = if children {
                subpop.child_genomes()
            } else {
                subpop.parent_genomes()
            };
            total_genomes += genomes.len();
            for genome in genomes {
                for mutation in genome.mutations() {
                    counts
                        .entry(Rc::as_ptr(mutation))
                        .or_insert_with(|| (Rc::clone(mutation), 0))
                        .1 += 1;
                }
            }
        }
        (counts, total_genomes)
    }

    /// Finds mutations at frequency 1 across all child genomes, strips them,
    /// and records them as substitutions. Returns how many fixed.
    pub fn remove_fixed(&mut self, generation: i64) -> usize {
        let (counts, total_genomes) = self.census(true);
        if total_genomes == 0 {
            return 0;
        }

        let fixed: HashSet<*const Mutation> = counts
            .iter()
            .filter(|(_, (_, count))| *count == total_genomes)
            .map(|(&ptr, _)| ptr)
            .collect();
        if fixed.is_empty() {
            return 0;
        }

        // Collect in the deterministic genome-scan order before stripping.
        let mut seen: HashSet<*const Mutation> = HashSet::new();
        let mut newly_fixed: Vec<MutRef> = Vec::with_capacity(fixed.len());
        for subpop in self.subpops.values() {
            for genome in subpop.child_genomes() {
                for mutation in genome.mutations() {
                    let ptr = Rc::as_ptr(mutation);
                    if fixed.contains(&ptr) && seen.insert(ptr) {
                        newly_fixed.push(Rc::clone(mutation));
                    }
                }
            }
        }

        for subpop in self.subpops.values_mut() {
            for genome in subpop.child_genomes_mut() {
                genome.retain(|m| !fixed.contains(&Rc::as_ptr(m)));
            }
        }

        newly_fixed.sort_by_key(|m| m.position);
        let count = newly_fixed.len();
        for mutation in newly_fixed {
            self.substitutions.push(Substitution {
                mutation,
                fixation_generation: generation,
            });
        }
        count
    }

    pub fn swap_all_generations(&mut self) {
        for subpop in self.subpops.values_mut() {
            subpop.swap_generations();
        }
    }

    /// Replaces the state of one subpopulation's parent genomes; used by the
    /// population loader.
    pub fn install_parent_genomes(&mut self, id: i64, genomes: Vec<Genome>) -> LociResult<()> {
        let subpop = self.get_mut(id)?;
        ensure!(
            genomes.len() == subpop.parent_genomes().len(),
            Simulation: "p{} expects {} genomes, but {} were supplied",
            id, subpop.parent_genomes().len(), genomes.len()
        );
        for (slot, genome) in subpop.parent_genomes_mut().iter_mut().zip(genomes) {
            *slot = genome;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{Dfe, MutationType};

    fn mutation(position: u32) -> MutRef {
        let mutation_type = Rc::new(MutationType::new(1, 0.5, Dfe::Fixed(0.0)).unwrap());
        Mutation::new(mutation_type, position, 0.0, 1, 1)
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut population = Population::new();
        population.add_subpop(Subpopulation::new(1, 5).unwrap()).unwrap();
        assert!(population.add_subpop(Subpopulation::new(1, 5).unwrap()).is_err());
        assert!(population.get(2).is_err());
        assert!(population.remove_subpop(1).is_ok());
        assert!(population.remove_subpop(1).is_err());
    }

    #[test]
    fn test_fixation_moves_to_substitutions() {
        let mut population = Population::new();
        population.add_subpop(Subpopulation::new(1, 2).unwrap()).unwrap();

        let fixed = mutation(100);
        let segregating = mutation(200);
        {
            let subpop = population.get_mut(1).unwrap();
            for i in 0..4 {
                let mut mutations = vec![Rc::clone(&fixed)];
                if i == 0 {
                    mutations.push(Rc::clone(&segregating));
                }
                subpop.set_child_genome(i, Genome::from_sorted(mutations));
            }
        }

        let n = population.remove_fixed(7);
        assert_eq!(n, 1);
        assert_eq!(population.substitutions().len(), 1);
        assert_eq!(population.substitutions()[0].fixation_generation, 7);
        assert_eq!(population.substitutions()[0].mutation.position, 100);

        // The fixed mutation is stripped; the segregating one remains.
        let subpop = population.get(1).unwrap();
        assert_eq!(subpop.child_genomes()[0].len(), 1);
        assert_eq!(subpop.child_genomes()[0].mutations()[0].position, 200);
        assert!(subpop.child_genomes()[1].is_empty());
    }

    #[test]
    fn test_segregating_scan_is_deterministic() {
        let mut population = Population::new();
        population.add_subpop(Subpopulation::new(2, 1).unwrap()).unwrap();
        population.add_subpop(Subpopulation::new(1, 1).unwrap()).unwrap();

        let a = mutation(300);
        let b = mutation(10);
        population
            .get_mut(1)
            .unwrap()
            .parent_genomes_mut()[0] = Genome::from_sorted(vec![Rc::clone(&a)]);
        population
            .get_mut(2)
            .unwrap()
            .parent_genomes_mut()[0] = Genome::from_sorted(vec![Rc::clone(&b)]);

        // p1 scans before p2 regardless of insertion order.
        let order: Vec<u32> = population
            .segregating_mutations()
            .iter()
            .map(|m| m.position)
            .collect();
        assert_eq!(order, vec![300, 10]);
    }
}
