//! The host-object bridge: element classes for the simulation entities, the
//! [Host] implementation that dispatches property and method traffic onto
//! [SimState], and the initialize-phase host functions.
//!
//! Rc-shared entities (mutations, mutation types, element types) are exposed
//! through their shared handles directly; engine-owned entities
//! (subpopulations, genomes) are exposed through id/index handles resolved
//! against the simulation on every access, so a handle held across the
//! removal of its entity fails cleanly instead of dangling.

use crate::chromosome::RateMap;
use crate::dump;
use crate::element::{GenomicElement, GenomicElementType};
use crate::engine::{PendingBlock, SimState};
use crate::genome::Genome;
use crate::mutation::{Dfe, MutRef, Mutation, MutationType};
use crate::script_block::EventKind;
use crate::subpopulation::Subpopulation;
use loci_error::{LociResult, ensure, loci_bail, loci_err};
use loci_script::value::object::{ElementClass, ObjElem, ObjectValue};
use loci_script::value::{Value, ValueKind};
use loci_script::{FunctionRegistry, Host, Signature, TypeMask, random_provider};
use std::rc::Rc;
use std::sync::LazyLock;

pub static MUTATION_CLASS: LazyLock<ElementClass> = LazyLock::new(|| {
    ElementClass::new("Mutation")
        .read_only("position", TypeMask::INT)
        .read_only("selectionCoeff", TypeMask::FLOAT)
        .read_only("mutationType", TypeMask::OBJECT)
        .read_only("subpopID", TypeMask::INT)
        .read_only("originGeneration", TypeMask::INT)
});

pub static MUTATION_TYPE_CLASS: LazyLock<ElementClass> = LazyLock::new(|| {
    ElementClass::new("MutationType")
        .read_only("id", TypeMask::INT)
        .read_only("dominanceCoeff", TypeMask::FLOAT)
        .read_only("distributionType", TypeMask::STR)
        .read_only("distributionParams", TypeMask::FLOAT)
});

pub static GENOMIC_ELEMENT_TYPE_CLASS: LazyLock<ElementClass> = LazyLock::new(|| {
    ElementClass::new("GenomicElementType")
        .read_only("id", TypeMask::INT)
        .read_only("mutationTypes", TypeMask::OBJECT)
        .read_only("mutationFractions", TypeMask::FLOAT)
});

pub static GENOMIC_ELEMENT_CLASS: LazyLock<ElementClass> = LazyLock::new(|| {
    ElementClass::new("GenomicElement")
        .read_only("genomicElementType", TypeMask::OBJECT)
        .read_only("startPosition", TypeMask::INT)
        .read_only("endPosition", TypeMask::INT)
});

pub static CHROMOSOME_CLASS: LazyLock<ElementClass> = LazyLock::new(|| {
    ElementClass::new("Chromosome")
        .read_only("lastPosition", TypeMask::INT)
        .read_only("overallMutationRate", TypeMask::FLOAT)
        .read_only("overallRecombinationRate", TypeMask::FLOAT)
        .read_only("geneConversionFraction", TypeMask::FLOAT)
        .read_only("geneConversionMeanLength", TypeMask::FLOAT)
});

pub static GENOME_CLASS: LazyLock<ElementClass> = LazyLock::new(|| {
    ElementClass::new("Genome")
        .read_only("size", TypeMask::INT)
        .read_only("mutations", TypeMask::OBJECT)
        .method(
            Signature::new("containsMutation", TypeMask::LOGICAL)
                .singleton_arg("mut", TypeMask::OBJECT),
        )
});

pub static SUBPOP_CLASS: LazyLock<ElementClass> = LazyLock::new(|| {
    ElementClass::new("Subpopulation")
        .read_only("id", TypeMask::INT)
        .read_only("individualCount", TypeMask::INT)
        .read_only("selfingRate", TypeMask::FLOAT)
        .read_only("genomes", TypeMask::OBJECT)
        .method(
            Signature::new("setMigrationRates", TypeMask::NULL)
                .arg("sourceSubpops", TypeMask::OBJECT | TypeMask::INT)
                .arg("rates", TypeMask::NUMERIC),
        )
        .method(
            Signature::new("setSelfingRate", TypeMask::NULL)
                .singleton_arg("rate", TypeMask::NUMERIC),
        )
        .method(
            Signature::new("setSubpopulationSize", TypeMask::NULL)
                .singleton_arg("size", TypeMask::INT),
        )
});

pub static SUBSTITUTION_CLASS: LazyLock<ElementClass> = LazyLock::new(|| {
    ElementClass::new("Substitution")
        .read_only("position", TypeMask::INT)
        .read_only("selectionCoeff", TypeMask::FLOAT)
        .read_only("mutationType", TypeMask::OBJECT)
        .read_only("subpopID", TypeMask::INT)
        .read_only("originGeneration", TypeMask::INT)
        .read_only("fixationGeneration", TypeMask::INT)
});

pub static SIMULATION_CLASS: LazyLock<ElementClass> = LazyLock::new(|| {
    ElementClass::new("Simulation")
        .read_only("chromosome", TypeMask::OBJECT)
        .read_write("generation", TypeMask::INT)
        .read_only("mutations", TypeMask::OBJECT)
        .read_only("substitutions", TypeMask::OBJECT)
        .read_only("subpopulations", TypeMask::OBJECT)
        .method(
            Signature::new("addSubpop", TypeMask::OBJECT)
                .singleton_arg("subpopID", TypeMask::INT | TypeMask::STR)
                .singleton_arg("size", TypeMask::INT)
                .opt_singleton_arg("selfingRate", TypeMask::NUMERIC),
        )
        .method(
            Signature::new("addSubpopSplit", TypeMask::OBJECT)
                .singleton_arg("subpopID", TypeMask::INT | TypeMask::STR)
                .singleton_arg("size", TypeMask::INT)
                .singleton_arg("sourceSubpop", TypeMask::OBJECT | TypeMask::INT | TypeMask::STR),
        )
        .method(
            Signature::new("deregisterScriptBlock", TypeMask::NULL).arg("ids", TypeMask::INT),
        )
        .method(
            Signature::new("registerEarlyEvent", TypeMask::INT)
                .singleton_arg("source", TypeMask::STR)
                .opt_singleton_arg("start", TypeMask::INT)
                .opt_singleton_arg("end", TypeMask::INT),
        )
        .method(
            Signature::new("registerLateEvent", TypeMask::INT)
                .singleton_arg("source", TypeMask::STR)
                .opt_singleton_arg("start", TypeMask::INT)
                .opt_singleton_arg("end", TypeMask::INT),
        )
        .method(
            Signature::new("mutationFrequencies", TypeMask::FLOAT)
                .opt_arg("subpops", TypeMask::NULL | TypeMask::OBJECT),
        )
        .method(
            Signature::new("outputFull", TypeMask::NULL)
                .opt_singleton_arg("filePath", TypeMask::STR),
        )
        .method(
            Signature::new("readFromPopulationFile", TypeMask::NULL)
                .singleton_arg("filePath", TypeMask::STR),
        )
        .method(Signature::new("simulationFinished", TypeMask::NULL))
});

// Engine-owned entities are handed to scripts as resolvable handles.
pub(crate) struct SimulationHandle;
pub(crate) struct ChromosomeHandle;
pub(crate) struct SubpopHandle(pub i64);
pub(crate) struct GenomeHandle {
    pub subpop: i64,
    pub child: bool,
    pub index: usize,
}
pub(crate) struct SubstitutionHandle(pub usize);

pub(crate) fn simulation_object() -> Value {
    Value::object_elem(ObjElem::new(&SIMULATION_CLASS, Rc::new(SimulationHandle)))
}

pub(crate) fn chromosome_object() -> Value {
    Value::object_elem(ObjElem::new(&CHROMOSOME_CLASS, Rc::new(ChromosomeHandle)))
}

pub(crate) fn subpop_object(id: i64) -> Value {
    Value::object_elem(ObjElem::new(&SUBPOP_CLASS, Rc::new(SubpopHandle(id))))
}

pub(crate) fn genome_object(subpop: i64, child: bool, index: usize) -> Value {
    Value::object_elem(ObjElem::new(
        &GENOME_CLASS,
        Rc::new(GenomeHandle {
            subpop,
            child,
            index,
        }),
    ))
}

pub(crate) fn mutation_object(mutation: &MutRef) -> Value {
    Value::object_elem(ObjElem::new(
        &MUTATION_CLASS,
        Rc::clone(mutation) as Rc<dyn std::any::Any>,
    ))
}

pub(crate) fn mutation_type_object(mutation_type: &Rc<MutationType>) -> Value {
    Value::object_elem(ObjElem::new(
        &MUTATION_TYPE_CLASS,
        Rc::clone(mutation_type) as Rc<dyn std::any::Any>,
    ))
}

pub(crate) fn element_type_object(element_type: &Rc<GenomicElementType>) -> Value {
    Value::object_elem(ObjElem::new(
        &GENOMIC_ELEMENT_TYPE_CLASS,
        Rc::clone(element_type) as Rc<dyn std::any::Any>,
    ))
}

/// Registers the initialize-phase host functions into the registry so the
/// tree optimizer can resolve them.
pub fn register_host_functions(registry: &mut FunctionRegistry) {
    registry.register_host(
        Signature::new("initializeMutationType", TypeMask::OBJECT)
            .singleton_arg("id", TypeMask::INT | TypeMask::STR)
            .singleton_arg("dominanceCoeff", TypeMask::NUMERIC)
            .singleton_arg("distributionType", TypeMask::STR)
            .ellipsis(TypeMask::NUMERIC | TypeMask::STR),
    );
    registry.register_host(
        Signature::new("initializeGenomicElementType", TypeMask::OBJECT)
            .singleton_arg("id", TypeMask::INT | TypeMask::STR)
            .arg("mutationTypes", TypeMask::OBJECT | TypeMask::INT | TypeMask::STR)
            .arg("proportions", TypeMask::NUMERIC),
    );
    registry.register_host(
        Signature::new("initializeGenomicElement", TypeMask::NULL)
            .singleton_arg("genomicElementType", TypeMask::OBJECT | TypeMask::INT | TypeMask::STR)
            .singleton_arg("start", TypeMask::INT)
            .singleton_arg("end", TypeMask::INT),
    );
    registry.register_host(
        Signature::new("initializeMutationRate", TypeMask::NULL)
            .arg("rates", TypeMask::NUMERIC)
            .opt_arg("ends", TypeMask::INT),
    );
    registry.register_host(
        Signature::new("initializeRecombinationRate", TypeMask::NULL)
            .arg("rates", TypeMask::NUMERIC)
            .opt_arg("ends", TypeMask::INT),
    );
    registry.register_host(
        Signature::new("initializeGeneConversion", TypeMask::NULL)
            .singleton_arg("conversionFraction", TypeMask::NUMERIC)
            .singleton_arg("meanLength", TypeMask::NUMERIC),
    );
}

/// Accepts `7` or a prefixed spelling like `"m7"` / `"p7"` / `"g7"`.
pub(crate) fn parse_entity_id(value: &Value, prefix: char) -> LociResult<i64> {
    match value.kind() {
        ValueKind::Int => value.int_at(0),
        ValueKind::Str => {
            let text = value.string_at(0)?;
            let parsed = text
                .strip_prefix(prefix)
                .and_then(|rest| rest.parse::<i64>().ok());
            parsed.ok_or_else(
                || loci_err!(Domain: "'{}' is not a valid {}-prefixed identifier", text, prefix),
            )
        }
        kind => Err(loci_err!(Type: "an entity id cannot be of type {}", kind.name())),
    }
}

fn position_u32(value: i64) -> LociResult<u32> {
    u32::try_from(value)
        .map_err(|_| loci_err!(Domain: "position {} is outside the 32-bit non-negative range", value))
}

impl SimState {
    fn resolve_subpop_id(&self, value: &Value) -> LociResult<i64> {
        if value.kind() == ValueKind::Object {
            let elem = value.object_at(0)?;
            let handle = elem
                .downcast::<SubpopHandle>()
                .ok_or_else(|| loci_err!(Type: "expected a Subpopulation object"))?;
            return Ok(handle.0);
        }
        parse_entity_id(value, 'p')
    }

    fn resolve_genome<'a>(&'a self, handle: &GenomeHandle) -> LociResult<&'a Genome> {
        let subpop = self.population.get(handle.subpop)?;
        let genomes = if handle.child {
            subpop.child_genomes()
        } else {
            subpop.parent_genomes()
        };
        genomes.get(handle.index).ok_or_else(
            || loci_err!(Simulation: "genome index {} is stale for p{}", handle.index, handle.subpop),
        )
    }

    fn element_property(&mut self, elem: &ObjElem, name: &str) -> LociResult<Value> {
        match elem.class().name {
            "Mutation" => {
                let m = elem.downcast::<Mutation>().unwrap();
                Ok(match name {
                    "position" => Value::int(m.position as i64),
                    "selectionCoeff" => Value::float(m.selection_coeff),
                    "mutationType" => mutation_type_object(&m.mutation_type),
                    "subpopID" => Value::int(m.subpop_of_origin),
                    "originGeneration" => Value::int(m.generation_of_origin),
                    _ => loci_bail!(Internal: "unhandled Mutation property '{}'", name),
                })
            }
            "MutationType" => {
                let t = elem.downcast::<MutationType>().unwrap();
                Ok(match name {
                    "id" => Value::int(t.id),
                    "dominanceCoeff" => Value::float(t.dominance_coeff),
                    "distributionType" => Value::string(t.dfe.code()),
                    "distributionParams" => Value::float_vec(t.dfe.params()),
                    _ => loci_bail!(Internal: "unhandled MutationType property '{}'", name),
                })
            }
            "GenomicElementType" => {
                let t = elem.downcast::<GenomicElementType>().unwrap();
                match name {
                    "id" => Ok(Value::int(t.id)),
                    "mutationTypes" => {
                        let parts: Vec<Value> = t
                            .mutation_types()
                            .iter()
                            .map(|(mt, _)| mutation_type_object(mt))
                            .collect();
                        Value::concat(&parts)
                    }
                    "mutationFractions" => Ok(Value::float_vec(
                        t.mutation_types().iter().map(|(_, w)| *w).collect(),
                    )),
                    _ => loci_bail!(Internal: "unhandled GenomicElementType property '{}'", name),
                }
            }
            "GenomicElement" => {
                let e = elem.downcast::<GenomicElement>().unwrap();
                Ok(match name {
                    "genomicElementType" => element_type_object(&e.element_type),
                    "startPosition" => Value::int(e.start as i64),
                    "endPosition" => Value::int(e.end as i64),
                    _ => loci_bail!(Internal: "unhandled GenomicElement property '{}'", name),
                })
            }
            "Chromosome" => Ok(match name {
                "lastPosition" => Value::int(self.chromosome.last_position() as i64),
                "overallMutationRate" => Value::float(self.chromosome.overall_mutation_rate()),
                "overallRecombinationRate" => {
                    Value::float(self.chromosome.overall_recombination_rate())
                }
                "geneConversionFraction" => Value::float(self.chromosome.gene_conversion_fraction),
                "geneConversionMeanLength" => {
                    Value::float(self.chromosome.gene_conversion_mean_length)
                }
                _ => loci_bail!(Internal: "unhandled Chromosome property '{}'", name),
            }),
            "Genome" => {
                let handle = elem.downcast::<GenomeHandle>().unwrap();
                let genome = self.resolve_genome(&handle)?;
                match name {
                    "size" => Ok(Value::int(genome.len() as i64)),
                    "mutations" => {
                        let mut out = ObjectValue::new(&MUTATION_CLASS);
                        for m in genome.mutations() {
                            out.push(ObjElem::new(
                                &MUTATION_CLASS,
                                Rc::clone(m) as Rc<dyn std::any::Any>,
                            ))?;
                        }
                        Ok(Value::object(out))
                    }
                    _ => loci_bail!(Internal: "unhandled Genome property '{}'", name),
                }
            }
            "Subpopulation" => {
                let handle = elem.downcast::<SubpopHandle>().unwrap();
                let subpop = self.population.get(handle.0)?;
                match name {
                    "id" => Ok(Value::int(subpop.id)),
                    "individualCount" => Ok(Value::int(subpop.size() as i64)),
                    "selfingRate" => Ok(Value::float(subpop.selfing_fraction())),
                    "genomes" => {
                        let mut out = ObjectValue::new(&GENOME_CLASS);
                        for i in 0..subpop.parent_genomes().len() {
                            out.push(ObjElem::new(
                                &GENOME_CLASS,
                                Rc::new(GenomeHandle {
                                    subpop: handle.0,
                                    child: false,
                                    index: i,
                                }),
                            ))?;
                        }
                        Ok(Value::object(out))
                    }
                    _ => loci_bail!(Internal: "unhandled Subpopulation property '{}'", name),
                }
            }
            "Substitution" => {
                let handle = elem.downcast::<SubstitutionHandle>().unwrap();
                let substitution = self
                    .population
                    .substitutions()
                    .get(handle.0)
                    .ok_or_else(|| loci_err!(Simulation: "stale substitution reference"))?;
                let m = &substitution.mutation;
                Ok(match name {
                    "position" => Value::int(m.position as i64),
                    "selectionCoeff" => Value::float(m.selection_coeff),
                    "mutationType" => mutation_type_object(&m.mutation_type),
                    "subpopID" => Value::int(m.subpop_of_origin),
                    "originGeneration" => Value::int(m.generation_of_origin),
                    "fixationGeneration" => Value::int(substitution.fixation_generation),
                    _ => loci_bail!(Internal: "unhandled Substitution property '{}'", name),
                })
            }
            "Simulation" => match name {
                "chromosome" => Ok(chromosome_object()),
                "generation" => Ok(Value::int(self.generation)),
                "mutations" => {
                    let mut out = ObjectValue::new(&MUTATION_CLASS);
                    for m in self.population.segregating_mutations() {
                        out.push(ObjElem::new(&MUTATION_CLASS, m))?;
                    }
                    Ok(Value::object(out))
                }
                "substitutions" => {
                    let mut out = ObjectValue::new(&SUBSTITUTION_CLASS);
                    for i in 0..self.population.substitutions().len() {
                        out.push(ObjElem::new(&SUBSTITUTION_CLASS, Rc::new(SubstitutionHandle(i))))?;
                    }
                    Ok(Value::object(out))
                }
                "subpopulations" => {
                    let mut out = ObjectValue::new(&SUBPOP_CLASS);
                    for id in self.population.ids() {
                        out.push(ObjElem::new(&SUBPOP_CLASS, Rc::new(SubpopHandle(id))))?;
                    }
                    Ok(Value::object(out))
                }
                _ => loci_bail!(Internal: "unhandled Simulation property '{}'", name),
            },
            other => Err(loci_err!(Internal: "property access on unknown class '{}'", other)),
        }
    }

    fn element_method(
        &mut self,
        elem: &ObjElem,
        name: &str,
        args: &[Value],
    ) -> LociResult<Value> {
        match elem.class().name {
            "Genome" => {
                let handle = elem.downcast::<GenomeHandle>().unwrap();
                match name {
                    "containsMutation" => {
                        let target = args[0].object_at(0)?;
                        let mutation = target.downcast::<Mutation>().ok_or_else(
                            || loci_err!(Type: "containsMutation() requires a Mutation object"),
                        )?;
                        let genome = self.resolve_genome(&handle)?;
                        Ok(Value::logical(genome.contains(&mutation)))
                    }
                    _ => loci_bail!(Internal: "unhandled Genome method '{}'", name),
                }
            }
            "Subpopulation" => {
                let handle = elem.downcast::<SubpopHandle>().unwrap();
                match name {
                    "setMigrationRates" => self.set_migration_rates(handle.0, args),
                    "setSelfingRate" => {
                        let rate = args[0].float_at(0)?;
                        self.population.get_mut(handle.0)?.set_selfing_fraction(rate)?;
                        Ok(Value::null().into_invisible())
                    }
                    "setSubpopulationSize" => {
                        let size = args[0].int_at(0)?;
                        ensure!(size >= 0, Domain: "setSubpopulationSize() requires a non-negative size");
                        if size == 0 {
                            // Size zero removes the subpopulation; handles held
                            // by scripts become stale from here on.
                            self.population.remove_subpop(handle.0)?;
                        } else {
                            self.population.get_mut(handle.0)?.set_size(size as usize)?;
                        }
                        Ok(Value::null().into_invisible())
                    }
                    _ => loci_bail!(Internal: "unhandled Subpopulation method '{}'", name),
                }
            }
            "Simulation" => self.simulation_method(name, args),
            other => Err(loci_err!(Internal: "method call on unknown class '{}'", other)),
        }
    }

    fn set_migration_rates(&mut self, target: i64, args: &[Value]) -> LociResult<Value> {
        let sources = &args[0];
        let rates = &args[1];
        ensure!(
            sources.count() == rates.count(),
            Shape: "setMigrationRates() requires matching source and rate vectors ({} vs {})",
            sources.count(), rates.count()
        );

        let mut fractions = Vec::with_capacity(sources.count());
        for i in 0..sources.count() {
            let source_id = self.resolve_subpop_id(&sources.element(i)?)?;
            self.population.get(source_id)?;
            fractions.push((source_id, rates.float_at(i)?));
        }
        self.population
            .get_mut(target)?
            .set_migration_fractions(fractions)?;
        Ok(Value::null().into_invisible())
    }

    fn simulation_method(&mut self, name: &str, args: &[Value]) -> LociResult<Value> {
        match name {
            "addSubpop" => {
                let id = parse_entity_id(&args[0], 'p')?;
                let size = args[1].int_at(0)?;
                ensure!(size > 0, Domain: "addSubpop() requires a positive size");
                let mut subpop = Subpopulation::new(id, size as usize)?;
                if let Some(selfing) = args.get(2) {
                    subpop.set_selfing_fraction(selfing.float_at(0)?)?;
                }
                self.population.add_subpop(subpop)?;
                let object = subpop_object(id);
                self.pending_constants
                    .push((format!("p{}", id), object.clone()));
                Ok(object)
            }
            "addSubpopSplit" => {
                let id = parse_entity_id(&args[0], 'p')?;
                let size = args[1].int_at(0)?;
                ensure!(size > 0, Domain: "addSubpopSplit() requires a positive size");
                let source_id = self.resolve_subpop_id(&args[2])?;

                let source_size = self.population.get(source_id)?.size();
                let mut genomes = Vec::with_capacity(2 * size as usize);
                for _ in 0..size {
                    let parent = random_provider::range(0..source_size);
                    let (a, b) = self.population.get(source_id)?.parent_pair(parent);
                    genomes.push(a.clone());
                    genomes.push(b.clone());
                }

                self.population.add_subpop(Subpopulation::new(id, size as usize)?)?;
                self.population.install_parent_genomes(id, genomes)?;
                let object = subpop_object(id);
                self.pending_constants
                    .push((format!("p{}", id), object.clone()));
                Ok(object)
            }
            "deregisterScriptBlock" => {
                for i in 0..args[0].count() {
                    let id = args[0].int_at(i)?;
                    let block = self
                        .script_blocks
                        .iter_mut()
                        .find(|b| b.id == id)
                        .ok_or_else(|| loci_err!(Simulation: "there is no script block with id {}", id))?;
                    block.active = false;
                }
                Ok(Value::null().into_invisible())
            }
            "registerEarlyEvent" | "registerLateEvent" => {
                let kind = if name == "registerEarlyEvent" {
                    EventKind::Early
                } else {
                    EventKind::Late
                };
                let source = args[0].string_at(0)?;
                let start = args.get(1).map(|v| v.int_at(0)).transpose()?.unwrap_or(1);
                let end = args
                    .get(2)
                    .map(|v| v.int_at(0))
                    .transpose()?
                    .unwrap_or(i64::MAX);
                ensure!(
                    start >= 1 && end >= start,
                    Domain: "generation range {}:{} is not valid", start, end
                );

                let id = self.next_block_id;
                self.next_block_id += 1;
                self.pending_blocks.push(PendingBlock {
                    id,
                    kind,
                    start,
                    end,
                    source,
                });
                Ok(Value::int(id))
            }
            "mutationFrequencies" => {
                let ids = match args.first() {
                    Some(v) if !v.is_null() => {
                        let mut ids = Vec::with_capacity(v.count());
                        for i in 0..v.count() {
                            ids.push(self.resolve_subpop_id(&v.element(i)?)?);
                        }
                        ids
                    }
                    _ => self.population.ids(),
                };
                self.mutation_frequencies(&ids)
            }
            "outputFull" => {
                match args.first() {
                    Some(path) => {
                        let path = path.string_at(0)?;
                        let mut file = std::fs::File::create(&path)
                            .map_err(|e| loci_err!(Io: "cannot write '{}': {}", path, e))?;
                        dump::write_population(self, &mut file)?;
                    }
                    None => {
                        let stdout = std::io::stdout();
                        dump::write_population(self, &mut stdout.lock())?;
                    }
                }
                Ok(Value::null().into_invisible())
            }
            "readFromPopulationFile" => {
                let path = args[0].string_at(0)?;
                let file = std::fs::File::open(&path)
                    .map_err(|e| loci_err!(Io: "cannot read '{}': {}", path, e))?;
                dump::read_population(self, std::io::BufReader::new(file))?;
                Ok(Value::null().into_invisible())
            }
            "simulationFinished" => {
                self.finished = true;
                Ok(Value::null().into_invisible())
            }
            _ => loci_bail!(Internal: "unhandled Simulation method '{}'", name),
        }
    }

    fn mutation_frequencies(&self, ids: &[i64]) -> LociResult<Value> {
        let mut total_genomes = 0usize;
        let mut counts: hashbrown::HashMap<*const Mutation, usize> = hashbrown::HashMap::new();
        for &id in ids {
            let subpop = self.population.get(id)?;
            total_genomes += subpop.parent_genomes().len();
            for genome in subpop.parent_genomes() {
                for m in genome.mutations() {
                    *counts.entry(Rc::as_ptr(m)).or_insert(0) += 1;
                }
            }
        }

        let frequencies: Vec<f64> = self
            .population
            .segregating_mutations()
            .iter()
            .map(|m| {
                let count = counts.get(&Rc::as_ptr(m)).copied().unwrap_or(0);
                if total_genomes == 0 {
                    0.0
                } else {
                    count as f64 / total_genomes as f64
                }
            })
            .collect();
        Ok(Value::float_vec(frequencies))
    }

    fn initialize_function(&mut self, name: &str, args: &[Value]) -> LociResult<Value> {
        ensure!(
            self.initializing,
            Simulation: "{}() may only be called from an initialize() callback", name
        );

        match name {
            "initializeMutationType" => {
                let id = parse_entity_id(&args[0], 'm')?;
                ensure!(
                    !self.mutation_types.contains_key(&id),
                    Simulation: "duplicate mutation type id m{}", id
                );
                let dominance = args[1].float_at(0)?;
                let code = args[2].string_at(0)?;

                let mut params = Vec::new();
                let mut script = None;
                for arg in &args[3..] {
                    if arg.kind() == ValueKind::Str {
                        script = Some(arg.string_at(0)?);
                    } else {
                        params.push(arg.float_at(0)?);
                    }
                }
                let dfe = Dfe::from_code(&code, &params, script)?;
                let mutation_type = Rc::new(MutationType::new(id, dominance, dfe)?);
                self.mutation_types.insert(id, Rc::clone(&mutation_type));

                let object = mutation_type_object(&mutation_type);
                self.pending_constants
                    .push((format!("m{}", id), object.clone()));
                Ok(object)
            }
            "initializeGenomicElementType" => {
                let id = parse_entity_id(&args[0], 'g')?;
                ensure!(
                    !self.element_types.contains_key(&id),
                    Simulation: "duplicate genomic element type id g{}", id
                );
                let types_arg = &args[1];
                let proportions = &args[2];
                ensure!(
                    types_arg.count() == proportions.count(),
                    Shape: "initializeGenomicElementType() requires matching type and proportion vectors ({} vs {})",
                    types_arg.count(), proportions.count()
                );

                let mut mixture = Vec::with_capacity(types_arg.count());
                for i in 0..types_arg.count() {
                    let mutation_type = self.resolve_mutation_type(&types_arg.element(i)?)?;
                    mixture.push((mutation_type, proportions.float_at(i)?));
                }
                let element_type = Rc::new(GenomicElementType::new(id, mixture)?);
                self.element_types.insert(id, Rc::clone(&element_type));

                let object = element_type_object(&element_type);
                self.pending_constants
                    .push((format!("g{}", id), object.clone()));
                Ok(object)
            }
            "initializeGenomicElement" => {
                let element_type = self.resolve_element_type(&args[0])?;
                let start = position_u32(args[1].int_at(0)?)?;
                let end = position_u32(args[2].int_at(0)?)?;
                self.init
                    .elements
                    .push(Rc::new(GenomicElement::new(element_type, start, end)?));
                Ok(Value::null().into_invisible())
            }
            "initializeMutationRate" => {
                ensure!(
                    self.init.mutation_rate_spec.is_none(),
                    Simulation: "initializeMutationRate() may be called only once"
                );
                self.init.mutation_rate_spec = Some(rate_spec(args)?);
                Ok(Value::null().into_invisible())
            }
            "initializeRecombinationRate" => {
                ensure!(
                    self.init.recombination_rate_spec.is_none(),
                    Simulation: "initializeRecombinationRate() may be called only once"
                );
                self.init.recombination_rate_spec = Some(rate_spec(args)?);
                Ok(Value::null().into_invisible())
            }
            "initializeGeneConversion" => {
                let fraction = args[0].float_at(0)?;
                let mean_length = args[1].float_at(0)?;
                self.init.gene_conversion = Some((fraction, mean_length));
                Ok(Value::null().into_invisible())
            }
            other => Err(loci_err!(Internal: "unhandled host function '{}'", other)),
        }
    }

    fn resolve_mutation_type(&self, value: &Value) -> LociResult<Rc<MutationType>> {
        if value.kind() == ValueKind::Object {
            let elem = value.object_at(0)?;
            return elem
                .downcast::<MutationType>()
                .ok_or_else(|| loci_err!(Type: "expected a MutationType object"));
        }
        let id = parse_entity_id(value, 'm')?;
        self.mutation_types
            .get(&id)
            .cloned()
            .ok_or_else(|| loci_err!(Simulation: "there is no mutation type m{}", id))
    }

    fn resolve_element_type(&self, value: &Value) -> LociResult<Rc<GenomicElementType>> {
        if value.kind() == ValueKind::Object {
            let elem = value.object_at(0)?;
            return elem
                .downcast::<GenomicElementType>()
                .ok_or_else(|| loci_err!(Type: "expected a GenomicElementType object"));
        }
        let id = parse_entity_id(value, 'g')?;
        self.element_types
            .get(&id)
            .cloned()
            .ok_or_else(|| loci_err!(Simulation: "there is no genomic element type g{}", id))
    }
}

/// `(rates, optional ends)` as supplied to the rate initializers; the ends
/// default to the chromosome's last position at finalization time.
pub(crate) fn rate_spec(args: &[Value]) -> LociResult<(Vec<f64>, Option<Vec<u32>>)> {
    let rates = args[0].float_values()?;
    let ends = match args.get(1) {
        Some(v) => {
            let mut ends = Vec::with_capacity(v.count());
            for i in 0..v.count() {
                ends.push(position_u32(v.int_at(i)?)?);
            }
            Some(ends)
        }
        None => {
            ensure!(
                rates.len() == 1,
                Shape: "a rate map with multiple rates requires explicit ends"
            );
            None
        }
    };
    Ok((rates, ends))
}

pub(crate) fn build_rate_map(
    spec: Option<(Vec<f64>, Option<Vec<u32>>)>,
    last_position: u32,
    what: &str,
) -> LociResult<RateMap> {
    let (rates, ends) =
        spec.ok_or_else(|| loci_err!(Simulation: "initialize{}Rate() was never called", what))?;
    match ends {
        Some(ends) => RateMap::new(rates, ends),
        None => RateMap::uniform(rates[0], last_position),
    }
}

impl Host for SimState {
    fn get_property(&mut self, obj: &ObjectValue, name: &str) -> LociResult<Value> {
        let mut parts = Vec::with_capacity(obj.len());
        for elem in obj.elems() {
            parts.push(self.element_property(elem, name)?);
        }
        Value::concat(&parts)
    }

    fn set_property(&mut self, obj: &ObjectValue, name: &str, value: &Value) -> LociResult<()> {
        for elem in obj.elems() {
            match (elem.class().name, name) {
                ("Simulation", "generation") => {
                    let generation = value.int_at(0)?;
                    ensure!(generation >= 1, Domain: "the generation must be at least 1");
                    self.generation = generation;
                }
                (class, property) => {
                    loci_bail!(Internal: "unhandled writable property '{}' on class {}", property, class)
                }
            }
        }
        Ok(())
    }

    fn call_method(&mut self, obj: &ObjectValue, name: &str, args: &[Value]) -> LociResult<Value> {
        let mut parts = Vec::with_capacity(obj.len());
        for elem in obj.elems() {
            parts.push(self.element_method(elem, name, args)?);
        }
        if parts.len() == 1 {
            Ok(parts.pop().unwrap())
        } else {
            Value::concat(&parts)
        }
    }

    fn call_function(&mut self, name: &str, args: &[Value]) -> LociResult<Value> {
        self.initialize_function(name, args)
    }
}
