use crate::bridge;
use crate::chromosome::Chromosome;
use crate::dump;
use crate::element::{GenomicElement, GenomicElementType};
use crate::fitness;
use crate::genome::Genome;
use crate::mutation::{Dfe, MutRef, Mutation, MutationType};
use crate::population::Population;
use crate::sampler::WeightedSampler;
use crate::script_block::{EventKind, ScriptBlock, parse_script_blocks};
use loci_error::{LociResult, ensure, loci_err};
use loci_script::ast::{AstNode, optimize};
use loci_script::token::tokenize;
use loci_script::value::{Value, ValueKind};
use loci_script::{FunctionRegistry, Interpreter, Parser, Symbols, random_provider};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::rc::Rc;

/// Chromosome configuration accumulated by the initialize-phase host
/// functions, finalized into a [Chromosome] once the initialize blocks have
/// all run.
#[derive(Debug, Default)]
pub(crate) struct InitConfig {
    pub elements: Vec<Rc<GenomicElement>>,
    pub mutation_rate_spec: Option<(Vec<f64>, Option<Vec<u32>>)>,
    pub recombination_rate_spec: Option<(Vec<f64>, Option<Vec<u32>>)>,
    pub gene_conversion: Option<(f64, f64)>,
}

/// A script block registered from script (`registerEarlyEvent` and friends);
/// parsed and installed by the engine after the current interpreter call
/// returns.
pub(crate) struct PendingBlock {
    pub id: i64,
    pub kind: EventKind,
    pub start: i64,
    pub end: i64,
    pub source: String,
}

/// The engine-owned simulation state. This is what script callbacks see
/// through the host-object bridge while the engine drives the life cycle
/// around it.
pub struct SimState {
    pub chromosome: Chromosome,
    pub mutation_types: BTreeMap<i64, Rc<MutationType>>,
    pub element_types: BTreeMap<i64, Rc<GenomicElementType>>,
    pub population: Population,
    pub generation: i64,
    pub script_blocks: Vec<ScriptBlock>,
    pub finished: bool,
    pub(crate) next_block_id: i64,
    pub(crate) initializing: bool,
    pub(crate) init: InitConfig,
    pub(crate) pending_constants: Vec<(String, Value)>,
    pub(crate) pending_blocks: Vec<PendingBlock>,
}

impl SimState {
    fn new(script_blocks: Vec<ScriptBlock>) -> Self {
        let next_block_id = script_blocks.len() as i64;
        SimState {
            chromosome: Chromosome::empty(),
            mutation_types: BTreeMap::new(),
            element_types: BTreeMap::new(),
            population: Population::new(),
            generation: 1,
            script_blocks,
            finished: false,
            next_block_id,
            initializing: false,
            init: InitConfig::default(),
            pending_constants: Vec::new(),
            pending_blocks: Vec::new(),
        }
    }

    fn finalize_initialization(&mut self) -> LociResult<()> {
        if self.init.elements.is_empty() {
            ensure!(
                self.init.mutation_rate_spec.is_none()
                    && self.init.recombination_rate_spec.is_none(),
                Simulation: "rates were initialized but no genomic elements were defined"
            );
            return Ok(());
        }

        let elements = std::mem::take(&mut self.init.elements);
        let last_position = elements.iter().map(|e| e.end).max().unwrap();
        let mutation_rates = bridge::build_rate_map(
            self.init.mutation_rate_spec.take(),
            last_position,
            "Mutation",
        )?;
        let recombination_rates = bridge::build_rate_map(
            self.init.recombination_rate_spec.take(),
            last_position,
            "Recombination",
        )?;
        let (gc_fraction, gc_mean_length) = self.init.gene_conversion.take().unwrap_or((0.0, 1.0));

        self.chromosome = Chromosome::new(
            elements,
            mutation_rates,
            recombination_rates,
            gc_fraction,
            gc_mean_length,
        )?;
        Ok(())
    }
}

enum MateResult {
    Index(usize),
    Reject,
}

/// The embedder-facing simulation: parses a script into blocks, runs the
/// initialize phase, then advances generation by generation through the
/// early events / fitness / offspring / late events / substitution / swap
/// cycle.
pub struct Simulation {
    state: SimState,
    symbols: Symbols,
    functions: FunctionRegistry,
    last_generation: i64,
}

impl Simulation {
    pub fn new(script: &str) -> LociResult<Self> {
        init_logging();

        let mut functions = FunctionRegistry::base();
        bridge::register_host_functions(&mut functions);

        let blocks = parse_script_blocks(script, &functions)?;
        let last_generation = blocks
            .iter()
            .filter(|b| b.kind != EventKind::Initialize)
            .map(ScriptBlock::termination_bound)
            .max()
            .unwrap_or(0);

        let mut simulation = Simulation {
            state: SimState::new(blocks),
            symbols: Symbols::new(),
            functions,
            last_generation,
        };
        simulation.run_initialize()?;
        Ok(simulation)
    }

    fn run_initialize(&mut self) -> LociResult<()> {
        self.state.initializing = true;
        let bodies: Vec<Rc<Vec<AstNode>>> = self
            .state
            .script_blocks
            .iter()
            .filter(|b| b.kind == EventKind::Initialize)
            .map(|b| Rc::clone(&b.body))
            .collect();
        for body in bodies {
            self.run_body(&body, &[])?;
        }
        self.state.initializing = false;
        self.state.finalize_initialization()?;
        self.symbols
            .define_constant("sim", bridge::simulation_object())?;
        Ok(())
    }

    pub fn state(&self) -> &SimState {
        &self.state
    }

    pub fn generation(&self) -> i64 {
        self.state.generation
    }

    pub fn set_seed(&mut self, seed: i64) {
        random_provider::set_seed(seed);
    }

    pub fn get_seed(&self) -> i64 {
        random_provider::get_seed()
    }

    /// Evaluates a script string against the live simulation in the
    /// persistent global scope.
    pub fn evaluate(&mut self, source: &str) -> LociResult<Value> {
        let result = {
            let mut interp = Interpreter::new(&mut self.symbols, &self.functions, &mut self.state);
            interp.run(source)
        };
        let value = result?;
        self.drain_pending()?;
        Ok(value)
    }

    pub fn dump_population(&self, writer: &mut dyn Write) -> LociResult<()> {
        dump::write_population(&self.state, writer)
    }

    pub fn load_population(&mut self, reader: impl BufRead) -> LociResult<()> {
        dump::read_population(&mut self.state, reader)
    }

    /// Advances one full generation. Returns false once the simulation has
    /// terminated (the last registered block's bound has been passed or a
    /// script called `simulationFinished()`).
    pub fn run_one_generation(&mut self) -> LociResult<bool> {
        if self.state.finished || self.state.generation > self.last_generation {
            return Ok(false);
        }

        let generation = self.state.generation;
        tracing::debug!(generation, "starting generation");

        self.run_blocks(EventKind::Early, generation)?;
        self.update_all_fitness(generation)?;
        self.generate_all_offspring(generation)?;
        self.run_blocks(EventKind::Late, generation)?;

        let substituted = self.state.population.remove_fixed(generation);
        if substituted > 0 {
            tracing::debug!(generation, substituted, "mutations fixed");
        }
        self.state.population.swap_all_generations();
        self.state.generation += 1;

        tracing::info!(
            generation,
            subpopulations = self.state.population.len(),
            "generation complete"
        );
        Ok(!self.state.finished && self.state.generation <= self.last_generation)
    }

    fn run_blocks(&mut self, kind: EventKind, generation: i64) -> LociResult<()> {
        let bodies: Vec<Rc<Vec<AstNode>>> = self
            .state
            .script_blocks
            .iter()
            .filter(|b| b.kind == kind && b.applies(generation))
            .map(|b| Rc::clone(&b.body))
            .collect();
        for body in bodies {
            tracing::debug!(kind = kind.name(), generation, "running script block");
            self.run_body(&body, &[])?;
        }
        Ok(())
    }

    /// Runs a block body, then installs any constants or blocks the body
    /// registered. Plain events run directly in the persistent global scope;
    /// callback bindings (`mut`, `weights`, `childGenome1`, ...) live in a
    /// transient scope popped when the callback returns.
    fn run_body(&mut self, body: &Rc<Vec<AstNode>>, bindings: &[(&str, Value)]) -> LociResult<Value> {
        let scoped = !bindings.is_empty();
        if scoped {
            self.symbols.push_scope();
            for (name, value) in bindings {
                self.symbols.set_local(*name, value.clone());
            }
        }
        let result = {
            let mut interp = Interpreter::new(&mut self.symbols, &self.functions, &mut self.state);
            interp.eval_statements(body)
        };
        if scoped {
            self.symbols.pop_scope();
        }
        let value = result?;
        self.drain_pending()?;
        Ok(value)
    }

    fn drain_pending(&mut self) -> LociResult<()> {
        for (name, value) in std::mem::take(&mut self.state.pending_constants) {
            if !self.symbols.is_constant(&name) {
                self.symbols.define_constant(&name, value)?;
            }
        }
        for pending in std::mem::take(&mut self.state.pending_blocks) {
            let tokens = tokenize(&pending.source)?;
            let mut statements = Parser::new(tokens).parse_program()?;
            for statement in &mut statements {
                optimize(statement, &self.functions)?;
            }
            let block = ScriptBlock {
                id: pending.id,
                start: pending.start,
                end: pending.end,
                kind: pending.kind,
                mutation_type_id: None,
                subpop_id: None,
                body: Rc::new(statements),
                active: true,
            };
            self.last_generation = self.last_generation.max(block.termination_bound());
            self.state.script_blocks.push(block);
        }
        Ok(())
    }

    fn callbacks(
        &self,
        kind: EventKind,
        generation: i64,
        subpop_id: i64,
    ) -> Vec<ScriptBlock> {
        self.state
            .script_blocks
            .iter()
            .filter(|b| {
                b.kind == kind
                    && b.applies(generation)
                    && b.subpop_id.is_none_or(|s| s == subpop_id)
            })
            .cloned()
            .collect()
    }

    fn update_all_fitness(&mut self, generation: i64) -> LociResult<()> {
        for id in self.state.population.ids() {
            let hooks = self.callbacks(EventKind::Fitness, generation, id);

            let values = if hooks.is_empty() {
                let subpop = self.state.population.get(id)?;
                let mut out = Vec::with_capacity(subpop.size());
                for i in 0..subpop.size() {
                    let (genome1, genome2) = subpop.parent_pair(i);
                    out.push(fitness::fitness_of(genome1, genome2, None)?);
                }
                out
            } else {
                let pairs: Vec<(Genome, Genome)> = {
                    let subpop = self.state.population.get(id)?;
                    (0..subpop.size())
                        .map(|i| {
                            let (a, b) = subpop.parent_pair(i);
                            (a.clone(), b.clone())
                        })
                        .collect()
                };
                let mut out = Vec::with_capacity(pairs.len());
                for (genome1, genome2) in &pairs {
                    let mut hook = |mutation: &MutRef,
                                    homozygous: bool,
                                    contribution: f64|
                     -> LociResult<f64> {
                        self.apply_fitness_callbacks(&hooks, mutation, homozygous, contribution)
                    };
                    out.push(fitness::fitness_of(genome1, genome2, Some(&mut hook))?);
                }
                out
            };

            self.state.population.get_mut(id)?.update_fitness(values)?;
        }
        Ok(())
    }

    fn apply_fitness_callbacks(
        &mut self,
        blocks: &[ScriptBlock],
        mutation: &MutRef,
        homozygous: bool,
        contribution: f64,
    ) -> LociResult<f64> {
        let mut relative = contribution;
        for block in blocks {
            if let Some(type_id) = block.mutation_type_id {
                if type_id != mutation.mutation_type.id {
                    continue;
                }
            }
            let body = Rc::clone(&block.body);
            let bindings = [
                ("mut", bridge::mutation_object(mutation)),
                ("homozygous", Value::logical(homozygous)),
                ("relFitness", Value::float(relative)),
            ];
            let result = self.run_body(&body, &bindings)?;
            ensure!(
                result.count() == 1,
                Shape: "a fitness() callback must return a float singleton"
            );
            relative = result.float_at(0)?;
        }
        Ok(relative)
    }

    fn generate_all_offspring(&mut self, generation: i64) -> LociResult<()> {
        for target in self.state.population.ids() {
            let (child_count, fractions) = {
                let subpop = self.state.population.get(target)?;
                (subpop.child_size(), subpop.migration_fractions().to_vec())
            };

            // Realize migration: binomial incoming counts per source, the
            // migrants occupying the leading child slots.
            let mut plan: Vec<(i64, usize)> = Vec::new();
            let mut remaining = child_count;
            for (source, fraction) in fractions {
                self.state.population.get(source)?;
                let count =
                    (random_provider::binomial(child_count as u64, fraction) as usize).min(remaining);
                if count > 0 {
                    plan.push((source, count));
                    remaining -= count;
                }
            }
            plan.push((target, remaining));

            let mut slot = 0usize;
            for (source, count) in plan {
                for _ in 0..count {
                    self.generate_child(generation, target, source, slot)?;
                    slot += 1;
                }
            }
        }
        Ok(())
    }

    fn generate_child(
        &mut self,
        generation: i64,
        target: i64,
        source: i64,
        child_index: usize,
    ) -> LociResult<()> {
        let mate_blocks = self.callbacks(EventKind::MateChoice, generation, source);
        let modify_blocks = self.callbacks(EventKind::ModifyChild, generation, target);

        'attempt: loop {
            let parent1 = self.state.population.get(source)?.draw_parent()?;

            let selfing = self.state.population.get(source)?.selfing_fraction();
            let parent2 = if selfing > 0.0 && random_provider::bool(selfing) {
                parent1
            } else {
                match self.choose_mate(source, parent1, &mate_blocks)? {
                    MateResult::Index(index) => index,
                    MateResult::Reject => continue 'attempt,
                }
            };

            let genome1 = self.meiosis(generation, source, parent1)?;
            let genome2 = self.meiosis(generation, source, parent2)?;
            {
                let subpop = self.state.population.get_mut(target)?;
                subpop.set_child_genome(2 * child_index, genome1);
                subpop.set_child_genome(2 * child_index + 1, genome2);
            }

            for block in &modify_blocks {
                let body = Rc::clone(&block.body);
                let bindings = [
                    ("childGenome1", bridge::genome_object(target, true, 2 * child_index)),
                    ("childGenome2", bridge::genome_object(target, true, 2 * child_index + 1)),
                    ("sourceSubpop", bridge::subpop_object(source)),
                ];
                let verdict = self.run_body(&body, &bindings)?;
                ensure!(
                    verdict.count() == 1,
                    Shape: "a modifyChild() callback must return a logical singleton"
                );
                if !verdict.logical_at(0)? {
                    continue 'attempt;
                }
            }

            return Ok(());
        }
    }

    fn choose_mate(
        &mut self,
        source: i64,
        parent1: usize,
        blocks: &[ScriptBlock],
    ) -> LociResult<MateResult> {
        if blocks.is_empty() {
            return Ok(MateResult::Index(
                self.state.population.get(source)?.draw_parent()?,
            ));
        }

        let size = self.state.population.get(source)?.size();
        let mut weights =
            Value::float_vec(self.state.population.get(source)?.cached_fitness().to_vec());

        for block in blocks {
            let body = Rc::clone(&block.body);
            let bindings = [
                ("weights", weights.clone()),
                ("sourceSubpop", bridge::subpop_object(source)),
                ("parent1", Value::int(parent1 as i64)),
            ];
            let result = self.run_body(&body, &bindings)?;
            if result.is_null() {
                return Ok(MateResult::Reject);
            }
            if matches!(result.kind(), ValueKind::Float | ValueKind::Int) {
                ensure!(
                    result.count() == size,
                    Shape: "a mateChoice() callback must return weights for all {} parents", size
                );
                weights = Value::float_vec(result.float_values()?);
            }
        }

        let weights = weights.float_values()?;
        let sampler = WeightedSampler::new(&weights).map_err(
            |_| loci_err!(Simulation: "mateChoice() produced weights with no positive total"),
        )?;
        Ok(MateResult::Index(sampler.draw()))
    }

    /// One meiosis: the joint count fast path, breakpoints (with any
    /// recombination-callback rewrite), new mutations, and the merge.
    fn meiosis(&mut self, generation: i64, source: i64, parent: usize) -> LociResult<Genome> {
        let (mutation_count, breakpoint_count) = self.state.chromosome.draw_event_counts();
        let mut breakpoints = self.state.chromosome.draw_breakpoints(breakpoint_count);

        let recombination_blocks =
            self.callbacks(EventKind::Recombination, generation, source);
        for block in &recombination_blocks {
            let body = Rc::clone(&block.body);
            let bindings = [
                (
                    "breakpoints",
                    Value::int_vec(breakpoints.iter().map(|&b| b as i64).collect()),
                ),
                ("sourceSubpop", bridge::subpop_object(source)),
            ];
            let result = self.run_body(&body, &bindings)?;
            if result.kind() == ValueKind::Int {
                let mut replaced = Vec::with_capacity(result.count());
                for i in 0..result.count() {
                    let position = result.int_at(i)?;
                    let position = u32::try_from(position).map_err(
                        |_| loci_err!(Numeric: "breakpoint {} is outside the 32-bit range", position),
                    )?;
                    replaced.push(position);
                }
                replaced.sort_unstable();
                breakpoints = replaced;
            }
        }

        let mut new_mutations = Vec::with_capacity(mutation_count);
        for _ in 0..mutation_count {
            let (position, mutation_type) = self.state.chromosome.draw_mutation_site()?;
            let coeff = match mutation_type.dfe.draw() {
                Some(coeff) => coeff,
                None => self.draw_script_coeff(&mutation_type)?,
            };
            new_mutations.push(Mutation::new(
                mutation_type,
                position,
                coeff,
                source,
                generation,
            ));
        }
        new_mutations.sort_by_key(|m| m.position);

        let swap_strands = random_provider::bool(0.5);
        let subpop = self.state.population.get(source)?;
        let (genome1, genome2) = subpop.parent_pair(parent);
        let (first, second) = if swap_strands {
            (genome2, genome1)
        } else {
            (genome1, genome2)
        };
        Ok(Genome::crossover(first, second, &breakpoints, &new_mutations))
    }

    fn draw_script_coeff(&mut self, mutation_type: &Rc<MutationType>) -> LociResult<f64> {
        let Dfe::Script { source } = &mutation_type.dfe else {
            return Err(loci_err!(Internal: "draw_script_coeff on a non-script DFE"));
        };
        let source = source.clone();
        let value = self.evaluate(&source)?;
        ensure!(
            value.count() == 1,
            Shape: "the script DFE of m{} must produce a float singleton", mutation_type.id
        );
        value.float_at(0)
    }
}

/// Installs the process-wide tracing subscriber. Runs once, no matter how
/// many simulations are constructed, and yields to any subscriber the
/// embedder installed first. Generation progress logs at info and
/// script-block/fixation detail at debug; the `LOCI_LOG` environment
/// variable overrides the filter.
pub fn init_logging() {
    use std::sync::Once;
    static INSTALL: Once = Once::new();

    INSTALL.call_once(|| {
        use tracing_subscriber::EnvFilter;

        let filter =
            EnvFilter::try_from_env("LOCI_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
            .ok();
    });
}
