use crate::mutation::MutationType;
use crate::sampler::WeightedSampler;
use loci_error::{LociResult, ensure};
use std::rc::Rc;

/// A mutation-type mixture assigned to chromosome intervals: mutation types
/// with positive weights, plus a cached sampler over them.
#[derive(Debug)]
pub struct GenomicElementType {
    pub id: i64,
    mutation_types: Vec<(Rc<MutationType>, f64)>,
    sampler: WeightedSampler,
}

impl GenomicElementType {
    pub fn new(id: i64, mutation_types: Vec<(Rc<MutationType>, f64)>) -> LociResult<Self> {
        ensure!(id >= 0, Simulation: "genomic element type ids must be non-negative, not {}", id);
        ensure!(
            !mutation_types.is_empty(),
            Simulation: "genomic element type {} requires at least one mutation type", id
        );
        for (mutation_type, weight) in &mutation_types {
            ensure!(
                *weight > 0.0 && weight.is_finite(),
                Simulation: "mutation type {} in genomic element type {} requires a positive weight, not {}",
                mutation_type.id, id, weight
            );
        }

        let weights: Vec<f64> = mutation_types.iter().map(|(_, w)| *w).collect();
        let sampler = WeightedSampler::new(&weights)?;

        Ok(GenomicElementType {
            id,
            mutation_types,
            sampler,
        })
    }

    pub fn mutation_types(&self) -> &[(Rc<MutationType>, f64)] {
        &self.mutation_types
    }

    pub fn draw_mutation_type(&self) -> &Rc<MutationType> {
        &self.mutation_types[self.sampler.draw()].0
    }
}

/// A contiguous chromosome interval carrying one element type. Inclusive on
/// both ends.
#[derive(Debug, Clone)]
pub struct GenomicElement {
    pub element_type: Rc<GenomicElementType>,
    pub start: u32,
    pub end: u32,
}

impl GenomicElement {
    pub fn new(element_type: Rc<GenomicElementType>, start: u32, end: u32) -> LociResult<Self> {
        ensure!(
            start <= end,
            Simulation: "genomic element requires start <= end ({} vs {})", start, end
        );
        Ok(GenomicElement {
            element_type,
            start,
            end,
        })
    }

    pub fn length(&self) -> u64 {
        (self.end - self.start) as u64 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{Dfe, MutationType};

    fn mutation_type(id: i64) -> Rc<MutationType> {
        Rc::new(MutationType::new(id, 0.5, Dfe::Fixed(0.0)).unwrap())
    }

    #[test]
    fn test_weights_must_be_positive() {
        assert!(GenomicElementType::new(1, vec![]).is_err());
        assert!(GenomicElementType::new(1, vec![(mutation_type(1), 0.0)]).is_err());
        assert!(GenomicElementType::new(1, vec![(mutation_type(1), -1.0)]).is_err());
        assert!(GenomicElementType::new(1, vec![(mutation_type(1), 1.0)]).is_ok());
    }

    #[test]
    fn test_element_bounds() {
        let element_type = Rc::new(
            GenomicElementType::new(1, vec![(mutation_type(1), 1.0)]).unwrap(),
        );
        assert!(GenomicElement::new(Rc::clone(&element_type), 10, 9).is_err());

        let element = GenomicElement::new(element_type, 0, 999).unwrap();
        assert_eq!(element.length(), 1000);
    }
}
