use crate::mutation::MutRef;
use std::rc::Rc;

/// One haplotype carrier: a sequence of mutations kept strictly sorted by
/// position. Ties are permitted; within a tie, order is insertion sequence.
/// Once a genome has been published as a parent by the generation swap it is
/// never mutated again.
#[derive(Debug, Clone, Default)]
pub struct Genome {
    mutations: Vec<MutRef>,
}

impl Genome {
    pub fn new() -> Self {
        Genome {
            mutations: Vec::new(),
        }
    }

    /// The caller vouches that `mutations` is position-sorted.
    pub fn from_sorted(mutations: Vec<MutRef>) -> Self {
        debug_assert!(mutations.windows(2).all(|w| w[0].position <= w[1].position));
        Genome { mutations }
    }

    pub fn mutations(&self) -> &[MutRef] {
        &self.mutations
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn clear(&mut self) {
        self.mutations.clear();
    }

    pub fn contains(&self, mutation: &MutRef) -> bool {
        let start = self
            .mutations
            .partition_point(|m| m.position < mutation.position);
        self.mutations[start..]
            .iter()
            .take_while(|m| m.position == mutation.position)
            .any(|m| Rc::ptr_eq(m, mutation))
    }

    pub fn is_sorted(&self) -> bool {
        self.mutations
            .windows(2)
            .all(|w| w[0].position <= w[1].position)
    }

    pub fn retain(&mut self, f: impl FnMut(&MutRef) -> bool) {
        self.mutations.retain(f);
    }

    /// The offspring merge of the meiosis kernel: walks the two parental
    /// strands, switching strands at each breakpoint, then merges in the new
    /// mutations. Sortedness is preserved, and new mutations land after
    /// existing ones at equal positions.
    pub fn crossover(
        genome1: &Genome,
        genome2: &Genome,
        breakpoints: &[u32],
        new_mutations: &[MutRef],
    ) -> Genome {
        let strands = [genome1.mutations(), genome2.mutations()];
        let mut cursors = [0usize, 0usize];
        let mut current = 0usize;
        let mut merged: Vec<MutRef> =
            Vec::with_capacity(strands[0].len().max(strands[1].len()) + new_mutations.len());

        for &breakpoint in breakpoints {
            while cursors[current] < strands[current].len()
                && strands[current][cursors[current]].position < breakpoint
            {
                merged.push(Rc::clone(&strands[current][cursors[current]]));
                cursors[current] += 1;
            }
            let other = 1 - current;
            while cursors[other] < strands[other].len()
                && strands[other][cursors[other]].position < breakpoint
            {
                cursors[other] += 1;
            }
            current = other;
        }
        while cursors[current] < strands[current].len() {
            merged.push(Rc::clone(&strands[current][cursors[current]]));
            cursors[current] += 1;
        }

        if new_mutations.is_empty() {
            return Genome { mutations: merged };
        }

        let mut out = Vec::with_capacity(merged.len() + new_mutations.len());
        let mut i = 0;
        let mut j = 0;
        while i < merged.len() || j < new_mutations.len() {
            let take_new = match (merged.get(i), new_mutations.get(j)) {
                (Some(existing), Some(new)) => new.position < existing.position,
                (None, Some(_)) => true,
                _ => false,
            };
            if take_new {
                out.push(Rc::clone(&new_mutations[j]));
                j += 1;
            } else {
                out.push(Rc::clone(&merged[i]));
                i += 1;
            }
        }

        Genome { mutations: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{Dfe, Mutation, MutationType};

    fn mutation(position: u32) -> MutRef {
        let mutation_type = Rc::new(MutationType::new(1, 0.5, Dfe::Fixed(0.0)).unwrap());
        Mutation::new(mutation_type, position, 0.0, 1, 1)
    }

    fn genome(positions: &[u32]) -> Genome {
        Genome::from_sorted(positions.iter().map(|&p| mutation(p)).collect())
    }

    #[test]
    fn test_no_breakpoints_copies_first_strand() {
        let g1 = genome(&[5, 10, 20]);
        let g2 = genome(&[7, 30]);
        let child = Genome::crossover(&g1, &g2, &[], &[]);
        let positions: Vec<u32> = child.mutations().iter().map(|m| m.position).collect();
        assert_eq!(positions, vec![5, 10, 20]);
    }

    #[test]
    fn test_single_breakpoint_switches_strands() {
        let g1 = genome(&[5, 10, 20]);
        let g2 = genome(&[7, 15, 30]);
        let child = Genome::crossover(&g1, &g2, &[12], &[]);
        let positions: Vec<u32> = child.mutations().iter().map(|m| m.position).collect();
        assert_eq!(positions, vec![5, 10, 15, 30]);
        assert!(child.is_sorted());
    }

    #[test]
    fn test_paired_breakpoints_form_a_tract() {
        let g1 = genome(&[5, 10, 20, 40]);
        let g2 = genome(&[8, 15, 30]);
        let child = Genome::crossover(&g1, &g2, &[12, 25], &[]);
        let positions: Vec<u32> = child.mutations().iter().map(|m| m.position).collect();
        assert_eq!(positions, vec![5, 10, 15, 40]);
    }

    #[test]
    fn test_new_mutations_merge_after_existing_ties() {
        let g1 = genome(&[10, 20]);
        let g2 = Genome::new();
        let new = vec![mutation(10), mutation(15)];
        let child = Genome::crossover(&g1, &g2, &[], &new);
        let positions: Vec<u32> = child.mutations().iter().map(|m| m.position).collect();
        assert_eq!(positions, vec![10, 10, 15, 20]);
        // The pre-existing mutation at 10 precedes the new arrival.
        assert!(Rc::ptr_eq(&child.mutations()[0], &g1.mutations()[0]));
        assert!(child.is_sorted());
    }

    #[test]
    fn test_contains_uses_identity() {
        let m = mutation(42);
        let g = Genome::from_sorted(vec![Rc::clone(&m)]);
        assert!(g.contains(&m));
        assert!(!g.contains(&mutation(42)));
    }
}
