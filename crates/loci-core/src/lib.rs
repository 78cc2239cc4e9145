pub mod bridge;
pub mod chromosome;
pub mod dump;
pub mod element;
pub mod engine;
pub mod fitness;
pub mod genome;
pub mod mutation;
pub mod population;
pub mod sampler;
pub mod script_block;
pub mod subpopulation;

pub use chromosome::{Chromosome, RateMap};
pub use element::{GenomicElement, GenomicElementType};
pub use engine::{SimState, Simulation, init_logging};
pub use fitness::fitness_of;
pub use genome::Genome;
pub use mutation::{Dfe, MutRef, Mutation, MutationType};
pub use population::{Population, Substitution};
pub use sampler::WeightedSampler;
pub use script_block::{EventKind, ScriptBlock, parse_script_blocks};
pub use subpopulation::Subpopulation;
