//! The line-oriented population dump format and its exact-inverse loader:
//! an `#OUT:` header, `Populations:`, `Mutations:` and `Genomes:` sections,
//! with `p`/`m`-prefixed ids and mutation indices in position order.

use crate::engine::SimState;
use crate::genome::Genome;
use crate::mutation::{MutRef, Mutation};
use crate::subpopulation::Subpopulation;
use hashbrown::HashMap;
use loci_error::{LociResult, ensure, loci_err};
use std::io::{BufRead, Write};
use std::rc::Rc;

pub fn write_population(state: &SimState, writer: &mut dyn Write) -> LociResult<()> {
    writeln!(writer, "#OUT: {} A", state.generation)?;

    writeln!(writer, "Populations:")?;
    for subpop in state.population.iter() {
        writeln!(
            writer,
            "p{} {} {}",
            subpop.id,
            subpop.size(),
            subpop.selfing_fraction()
        )?;
    }

    writeln!(writer, "Mutations:")?;
    let mutations = state.population.segregating_mutations();
    let (counts, _) = state.population.census(false);
    let mut index_of: HashMap<*const Mutation, usize> = HashMap::new();
    for (index, mutation) in mutations.iter().enumerate() {
        index_of.insert(Rc::as_ptr(mutation), index);
        let count = counts
            .get(&Rc::as_ptr(mutation))
            .map(|(_, count)| *count)
            .unwrap_or(0);
        writeln!(
            writer,
            "{} m{} {} {} p{} {} {}",
            index,
            mutation.mutation_type.id,
            mutation.position,
            mutation.selection_coeff,
            mutation.subpop_of_origin,
            mutation.generation_of_origin,
            count
        )?;
    }

    writeln!(writer, "Genomes:")?;
    for subpop in state.population.iter() {
        for (genome_index, genome) in subpop.parent_genomes().iter().enumerate() {
            write!(writer, "p{} {}", subpop.id, genome_index)?;
            for mutation in genome.mutations() {
                write!(writer, " {}", index_of[&Rc::as_ptr(mutation)])?;
            }
            writeln!(writer)?;
        }
    }

    Ok(())
}

/// Reads a dump produced by [write_population] back into the state,
/// replacing the subpopulations and their parent genomes. Mutation types are
/// resolved against the state's registry, so the same script must be in
/// effect.
pub fn read_population(state: &mut SimState, reader: impl BufRead) -> LociResult<()> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    let mut cursor = 0usize;

    let header = next_line(&lines, &mut cursor)?;
    let generation = parse_header(header)?;

    expect_section(&lines, &mut cursor, "Populations:")?;
    let mut populations: Vec<(i64, usize, f64)> = Vec::new();
    while cursor < lines.len() && lines[cursor] != "Mutations:" {
        let fields: Vec<&str> = lines[cursor].split_whitespace().collect();
        ensure!(fields.len() == 3, Simulation: "malformed population line '{}'", lines[cursor]);
        populations.push((
            parse_prefixed(fields[0], 'p')?,
            parse_number(fields[1])?,
            parse_float(fields[2])?,
        ));
        cursor += 1;
    }

    expect_section(&lines, &mut cursor, "Mutations:")?;
    let mut mutations: Vec<MutRef> = Vec::new();
    while cursor < lines.len() && lines[cursor] != "Genomes:" {
        let fields: Vec<&str> = lines[cursor].split_whitespace().collect();
        ensure!(fields.len() == 7, Simulation: "malformed mutation line '{}'", lines[cursor]);

        let index: usize = parse_number(fields[0])?;
        ensure!(
            index == mutations.len(),
            Simulation: "mutation indices must be consecutive; expected {}, found {}",
            mutations.len(), index
        );
        let type_id = parse_prefixed(fields[1], 'm')?;
        let mutation_type = state.mutation_types.get(&type_id).cloned().ok_or_else(
            || loci_err!(Simulation: "the population file references unknown mutation type m{}", type_id),
        )?;
        let position: u32 = parse_number(fields[2])?;
        let selection_coeff = parse_float(fields[3])?;
        let subpop_of_origin = parse_prefixed(fields[4], 'p')?;
        let generation_of_origin: i64 = parse_number(fields[5])?;
        // Field 6 is the occurrence count; it is implied by the genome
        // section and recomputed on demand.
        mutations.push(Mutation::new(
            mutation_type,
            position,
            selection_coeff,
            subpop_of_origin,
            generation_of_origin,
        ));
        cursor += 1;
    }

    expect_section(&lines, &mut cursor, "Genomes:")?;
    let mut genomes: HashMap<i64, Vec<Vec<MutRef>>> = HashMap::new();
    for (id, size, _) in &populations {
        genomes.insert(*id, vec![Vec::new(); 2 * size]);
    }
    while cursor < lines.len() {
        let fields: Vec<&str> = lines[cursor].split_whitespace().collect();
        ensure!(fields.len() >= 2, Simulation: "malformed genome line '{}'", lines[cursor]);

        let subpop_id = parse_prefixed(fields[0], 'p')?;
        let genome_index: usize = parse_number(fields[1])?;
        let slots = genomes.get_mut(&subpop_id).ok_or_else(
            || loci_err!(Simulation: "genome line references unknown subpopulation p{}", subpop_id),
        )?;
        ensure!(
            genome_index < slots.len(),
            Simulation: "genome index {} is out of range for p{}", genome_index, subpop_id
        );

        let mut carried = Vec::with_capacity(fields.len() - 2);
        for field in &fields[2..] {
            let index: usize = parse_number(field)?;
            let mutation = mutations.get(index).ok_or_else(
                || loci_err!(Simulation: "genome line references unknown mutation index {}", index),
            )?;
            carried.push(Rc::clone(mutation));
        }
        carried.sort_by_key(|m| m.position);
        slots[genome_index] = carried;
        cursor += 1;
    }

    // Rebuild the population only after the whole file parsed.
    state.population.clear_subpops();
    for (id, size, selfing) in populations {
        let mut subpop = Subpopulation::new(id, size)?;
        subpop.set_selfing_fraction(selfing)?;
        state.population.add_subpop(subpop)?;
        let built: Vec<Genome> = genomes
            .remove(&id)
            .unwrap()
            .into_iter()
            .map(Genome::from_sorted)
            .collect();
        state.population.install_parent_genomes(id, built)?;
    }
    state.generation = generation;

    Ok(())
}

fn next_line<'a>(lines: &'a [String], cursor: &mut usize) -> LociResult<&'a str> {
    let line = lines
        .get(*cursor)
        .ok_or_else(|| loci_err!(Simulation: "unexpected end of population file"))?;
    *cursor += 1;
    Ok(line)
}

fn expect_section(lines: &[String], cursor: &mut usize, name: &str) -> LociResult<()> {
    let line = next_line(lines, cursor)?;
    ensure!(
        line == name,
        Simulation: "expected section '{}' but found '{}'", name, line
    );
    Ok(())
}

fn parse_header(line: &str) -> LociResult<i64> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    ensure!(
        fields.len() >= 2 && fields[0] == "#OUT:",
        Simulation: "malformed population file header '{}'", line
    );
    parse_number(fields[1])
}

fn parse_prefixed(field: &str, prefix: char) -> LociResult<i64> {
    field
        .strip_prefix(prefix)
        .and_then(|rest| rest.parse::<i64>().ok())
        .ok_or_else(|| loci_err!(Simulation: "'{}' is not a valid {}-prefixed id", field, prefix))
}

fn parse_number<T: std::str::FromStr>(field: &str) -> LociResult<T> {
    field
        .parse::<T>()
        .map_err(|_| loci_err!(Simulation: "'{}' is not a valid number", field))
}

fn parse_float(field: &str) -> LociResult<f64> {
    field
        .parse::<f64>()
        .map_err(|_| loci_err!(Simulation: "'{}' is not a valid number", field))
}
