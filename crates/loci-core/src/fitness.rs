use crate::genome::Genome;
use crate::mutation::MutRef;
use loci_error::LociResult;
use std::rc::Rc;

/// Per-mutation hook applied to each site contribution: `(mutation,
/// homozygous, contribution) -> contribution`. The engine routes active
/// `fitness()` callbacks through this.
pub type FitnessHook<'a> = dyn FnMut(&MutRef, bool, f64) -> LociResult<f64> + 'a;

/// Diploid fitness as the product of per-site contributions over the two
/// genomes. A mutation present in both genomes (same type and identical
/// selection coefficient at the same position) contributes `1 + s`; present
/// in one, `1 + h*s`. Neutral mutations are skipped unless a hook is
/// installed. Duplicates at one position are matched pairwise in stable
/// order before the unmatched remainder is scored heterozygous. The result
/// is clamped at zero.
pub fn fitness_of(
    genome1: &Genome,
    genome2: &Genome,
    mut hook: Option<&mut FitnessHook<'_>>,
) -> LociResult<f64> {
    let a = genome1.mutations();
    let b = genome2.mutations();
    let mut i = 0;
    let mut j = 0;
    let mut fitness = 1.0f64;

    while i < a.len() || j < b.len() {
        let position = match (a.get(i), b.get(j)) {
            (Some(ma), Some(mb)) => ma.position.min(mb.position),
            (Some(ma), None) => ma.position,
            (None, Some(mb)) => mb.position,
            (None, None) => break,
        };

        let run_a_start = i;
        while i < a.len() && a[i].position == position {
            i += 1;
        }
        let run_b_start = j;
        while j < b.len() && b[j].position == position {
            j += 1;
        }
        let run_a = &a[run_a_start..i];
        let run_b = &b[run_b_start..j];

        let mut matched = vec![false; run_b.len()];
        for ma in run_a {
            let partner = run_b.iter().enumerate().find(|(k, mb)| {
                !matched[*k]
                    && Rc::ptr_eq(&ma.mutation_type, &mb.mutation_type)
                    && ma.selection_coeff == mb.selection_coeff
            });
            match partner {
                Some((k, _)) => {
                    matched[k] = true;
                    fitness *= contribution(ma, true, &mut hook)?;
                }
                None => fitness *= contribution(ma, false, &mut hook)?,
            }
        }
        for (k, mb) in run_b.iter().enumerate() {
            if !matched[k] {
                fitness *= contribution(mb, false, &mut hook)?;
            }
        }
    }

    Ok(fitness.max(0.0))
}

fn contribution(
    mutation: &MutRef,
    homozygous: bool,
    hook: &mut Option<&mut FitnessHook<'_>>,
) -> LociResult<f64> {
    let s = mutation.selection_coeff;
    if s == 0.0 && hook.is_none() {
        return Ok(1.0);
    }
    let base = if homozygous {
        1.0 + s
    } else {
        1.0 + mutation.mutation_type.dominance_coeff * s
    };
    match hook {
        Some(hook) => hook(mutation, homozygous, base),
        None => Ok(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{Dfe, Mutation, MutationType};

    fn mutation_with(s: f64, h: f64, position: u32) -> MutRef {
        let mutation_type = Rc::new(MutationType::new(1, h, Dfe::Fixed(s)).unwrap());
        Mutation::new(mutation_type, position, s, 1, 1)
    }

    #[test]
    fn test_heterozygote_and_homozygote() {
        let m = mutation_with(0.1, 0.5, 1000);

        let carrier = Genome::from_sorted(vec![Rc::clone(&m)]);
        let empty = Genome::new();
        let w = fitness_of(&carrier, &empty, None).unwrap();
        assert!((w - 1.05).abs() < 1e-12);

        let other = Genome::from_sorted(vec![Rc::clone(&m)]);
        let w = fitness_of(&carrier, &other, None).unwrap();
        assert!((w - 1.10).abs() < 1e-12);
    }

    #[test]
    fn test_neutral_mutations_skipped() {
        let m = mutation_with(0.0, 0.5, 10);
        let g = Genome::from_sorted(vec![m]);
        assert_eq!(fitness_of(&g, &Genome::new(), None).unwrap(), 1.0);
    }

    #[test]
    fn test_fitness_clamped_at_zero() {
        let m = mutation_with(-2.0, 1.0, 10);
        let g = Genome::from_sorted(vec![m]);
        assert_eq!(fitness_of(&g, &Genome::new(), None).unwrap(), 0.0);
    }

    #[test]
    fn test_duplicates_match_pairwise() {
        // Two distinct mutation objects at one position with the same type
        // and coefficient: the pair scores homozygous once, the surplus copy
        // heterozygous.
        let shared_type = Rc::new(MutationType::new(1, 0.5, Dfe::Fixed(0.1)).unwrap());
        let a1 = Mutation::new(Rc::clone(&shared_type), 50, 0.1, 1, 1);
        let a2 = Mutation::new(Rc::clone(&shared_type), 50, 0.1, 1, 1);
        let b1 = Mutation::new(Rc::clone(&shared_type), 50, 0.1, 1, 1);

        let g1 = Genome::from_sorted(vec![a1, a2]);
        let g2 = Genome::from_sorted(vec![b1]);
        let w = fitness_of(&g1, &g2, None).unwrap();
        let expected = 1.1 * 1.05;
        assert!((w - expected).abs() < 1e-12, "w = {}", w);
    }

    #[test]
    fn test_hook_overrides_contribution() {
        let m = mutation_with(0.1, 0.5, 10);
        let g = Genome::from_sorted(vec![m]);
        let mut hook = |_m: &MutRef, homozygous: bool, rel: f64| -> LociResult<f64> {
            assert!(!homozygous);
            assert!((rel - 1.05).abs() < 1e-12);
            Ok(2.0)
        };
        let w = fitness_of(&g, &Genome::new(), Some(&mut hook)).unwrap();
        assert_eq!(w, 2.0);
    }
}
