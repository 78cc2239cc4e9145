use loci_error::{LociResult, ensure, loci_err};
use loci_script::random_provider;
use std::rc::Rc;

/// The selection-coefficient distribution of a [MutationType]. The script
/// variant holds an expression evaluated by the engine at draw time.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Dfe {
    Fixed(f64),
    Exponential { mean: f64 },
    Gamma { mean: f64, shape: f64 },
    Normal { mean: f64, sd: f64 },
    Script { source: String },
}

impl Dfe {
    /// Builds a DFE from the distribution code used by the scripting surface
    /// ("f", "e", "g", "n", "s") and its parameters.
    pub fn from_code(code: &str, params: &[f64], script: Option<String>) -> LociResult<Dfe> {
        let expect = |n: usize| -> LociResult<()> {
            ensure!(
                params.len() == n,
                Simulation: "distribution type '{}' requires {} parameter(s), but {} were supplied",
                code, n, params.len()
            );
            Ok(())
        };

        match code {
            "f" => {
                expect(1)?;
                Ok(Dfe::Fixed(params[0]))
            }
            "e" => {
                expect(1)?;
                Ok(Dfe::Exponential { mean: params[0] })
            }
            "g" => {
                expect(2)?;
                ensure!(params[1] > 0.0, Simulation: "gamma shape must be positive");
                Ok(Dfe::Gamma {
                    mean: params[0],
                    shape: params[1],
                })
            }
            "n" => {
                expect(2)?;
                ensure!(params[1] >= 0.0, Simulation: "normal sd must be non-negative");
                Ok(Dfe::Normal {
                    mean: params[0],
                    sd: params[1],
                })
            }
            "s" => {
                let source = script.ok_or_else(
                    || loci_err!(Simulation: "distribution type 's' requires a script expression"),
                )?;
                Ok(Dfe::Script { source })
            }
            other => Err(loci_err!(Simulation: "unknown distribution type '{}'", other)),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Dfe::Fixed(_) => "f",
            Dfe::Exponential { .. } => "e",
            Dfe::Gamma { .. } => "g",
            Dfe::Normal { .. } => "n",
            Dfe::Script { .. } => "s",
        }
    }

    pub fn params(&self) -> Vec<f64> {
        match self {
            Dfe::Fixed(s) => vec![*s],
            Dfe::Exponential { mean } => vec![*mean],
            Dfe::Gamma { mean, shape } => vec![*mean, *shape],
            Dfe::Normal { mean, sd } => vec![*mean, *sd],
            Dfe::Script { .. } => Vec::new(),
        }
    }

    /// Draws a selection coefficient, or `None` when the draw needs the
    /// scripting layer (the engine resolves those).
    pub fn draw(&self) -> Option<f64> {
        match self {
            Dfe::Fixed(s) => Some(*s),
            Dfe::Exponential { mean } => {
                // The mean carries the sign; deleterious DFEs use a negative
                // mean as in the scripting surface.
                Some(mean.signum() * random_provider::exponential(mean.abs()))
            }
            Dfe::Gamma { mean, shape } => {
                Some(mean.signum() * random_provider::gamma(mean.abs(), *shape))
            }
            Dfe::Normal { mean, sd } => Some(random_provider::gaussian(*mean, *sd)),
            Dfe::Script { .. } => None,
        }
    }
}

/// A class of mutations sharing a dominance coefficient and a
/// selection-coefficient distribution.
#[derive(Debug)]
pub struct MutationType {
    pub id: i64,
    pub dominance_coeff: f64,
    pub dfe: Dfe,
}

impl MutationType {
    pub fn new(id: i64, dominance_coeff: f64, dfe: Dfe) -> LociResult<Self> {
        ensure!(id >= 0, Simulation: "mutation type ids must be non-negative, not {}", id);
        Ok(MutationType {
            id,
            dominance_coeff,
            dfe,
        })
    }
}

/// One mutation: immutable after creation and shared by reference between
/// the genomes that carry it, the census, and script handles.
#[derive(Debug)]
pub struct Mutation {
    pub mutation_type: Rc<MutationType>,
    pub position: u32,
    pub selection_coeff: f64,
    pub subpop_of_origin: i64,
    pub generation_of_origin: i64,
}

pub type MutRef = Rc<Mutation>;

impl Mutation {
    pub fn new(
        mutation_type: Rc<MutationType>,
        position: u32,
        selection_coeff: f64,
        subpop_of_origin: i64,
        generation_of_origin: i64,
    ) -> MutRef {
        Rc::new(Mutation {
            mutation_type,
            position,
            selection_coeff,
            subpop_of_origin,
            generation_of_origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dfe_codes_round_trip() {
        let dfe = Dfe::from_code("g", &[-0.01, 0.3], None).unwrap();
        assert_eq!(dfe.code(), "g");
        assert_eq!(dfe.params(), vec![-0.01, 0.3]);

        assert!(Dfe::from_code("f", &[], None).is_err());
        assert!(Dfe::from_code("z", &[1.0], None).is_err());
        assert!(Dfe::from_code("s", &[], None).is_err());
    }

    #[test]
    fn test_fixed_draw() {
        let dfe = Dfe::Fixed(0.1);
        assert_eq!(dfe.draw(), Some(0.1));
    }

    #[test]
    fn test_signed_exponential_draws() {
        random_provider::set_seed(8);
        let deleterious = Dfe::Exponential { mean: -0.05 };
        for _ in 0..100 {
            assert!(deleterious.draw().unwrap() <= 0.0);
        }
    }

    #[test]
    fn test_script_dfe_defers() {
        let dfe = Dfe::from_code("s", &[], Some("rnorm(1, 0, 0.1);".to_string())).unwrap();
        assert!(dfe.draw().is_none());
    }
}
