#[cfg(test)]
mod tests {
    use loci_core::Simulation;
    use std::io::Cursor;

    const SCRIPT: &str = r#"
        initialize() {
            initializeMutationRate(2e-5);
            initializeMutationType('m1', 0.5, 'f', 0.0);
            initializeMutationType('m2', 0.2, 'e', -0.01);
            initializeGenomicElementType('g1', c(m1, m2), c(8.0, 2.0));
            initializeGenomicElement(g1, 0, 49999);
            initializeRecombinationRate(1e-6);
        }
        1 {
            sim.addSubpop('p1', 25);
            sim.addSubpop('p2', 15);
        }
        1:30 late { x = 1; }
    "#;

    fn dump_string(sim: &Simulation) -> String {
        let mut out = Vec::new();
        sim.dump_population(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_dump_sections_in_order() {
        let mut sim = Simulation::new(SCRIPT).unwrap();
        sim.set_seed(100);
        for _ in 0..6 {
            sim.run_one_generation().unwrap();
        }

        let text = dump_string(&sim);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("#OUT: 7 A"));

        let populations = lines.iter().position(|l| *l == "Populations:").unwrap();
        let mutations = lines.iter().position(|l| *l == "Mutations:").unwrap();
        let genomes = lines.iter().position(|l| *l == "Genomes:").unwrap();
        assert!(populations < mutations && mutations < genomes);

        assert_eq!(lines[populations + 1], "p1 25 0");
        assert_eq!(lines[populations + 2], "p2 15 0");

        // One genome line per genome: 2*25 + 2*15.
        assert_eq!(lines.len() - genomes - 1, 80);
    }

    #[test]
    fn test_round_trip_is_exact() {
        let mut sim = Simulation::new(SCRIPT).unwrap();
        sim.set_seed(2024);
        for _ in 0..10 {
            sim.run_one_generation().unwrap();
        }

        let before = dump_string(&sim);
        sim.load_population(Cursor::new(before.as_bytes())).unwrap();
        let after = dump_string(&sim);
        assert_eq!(before, after);
    }

    #[test]
    fn test_load_into_fresh_simulation() {
        let mut source = Simulation::new(SCRIPT).unwrap();
        source.set_seed(7);
        for _ in 0..8 {
            source.run_one_generation().unwrap();
        }
        let dumped = dump_string(&source);

        let mut target = Simulation::new(SCRIPT).unwrap();
        target.load_population(Cursor::new(dumped.as_bytes())).unwrap();
        assert_eq!(dump_string(&target), dumped);
        assert_eq!(target.generation(), 9);

        // The loaded population can keep evolving.
        target.set_seed(8);
        assert!(target.run_one_generation().unwrap());
    }

    #[test]
    fn test_load_rejects_unknown_mutation_type() {
        let mut sim = Simulation::new(SCRIPT).unwrap();
        let bad = "#OUT: 5 A\nPopulations:\np1 1 0\nMutations:\n0 m9 10 0.1 p1 1 1\nGenomes:\np1 0 0\np1 1\n";
        let err = sim.load_population(Cursor::new(bad.as_bytes())).unwrap_err();
        assert!(err.message().contains("unknown mutation type"));
    }

    #[test]
    fn test_load_rejects_malformed_lines() {
        let mut sim = Simulation::new(SCRIPT).unwrap();
        let bad = "#OUT: 5 A\nPopulations:\np1 oops 0\nMutations:\nGenomes:\n";
        assert!(sim.load_population(Cursor::new(bad.as_bytes())).is_err());

        let bad = "Populations:\n";
        assert!(sim.load_population(Cursor::new(bad.as_bytes())).is_err());
    }
}
