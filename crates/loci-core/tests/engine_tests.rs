#[cfg(test)]
mod tests {
    use loci_core::{Genome, Simulation, init_logging};

    const WRIGHT_FISHER_SCRIPT: &str = r#"
        initialize() {
            initializeMutationRate(1e-5);
            initializeMutationType('m1', 0.5, 'f', 0.0);
            initializeGenomicElementType('g1', m1, 1.0);
            initializeGenomicElement(g1, 0, 99999);
            initializeRecombinationRate(1e-6);
        }
        1 {
            sim.addSubpop('p1', 40);
        }
        1:15 late {
            freqs = sim.mutationFrequencies(NULL);
        }
    "#;

    fn assert_population_invariants(sim: &Simulation) {
        let state = sim.state();
        let (counts, total_genomes) = state.population.census(false);
        for subpop in state.population.iter() {
            assert!(subpop.parent_genomes().iter().all(Genome::is_sorted));
        }
        for (_, (mutation, count)) in counts {
            assert!(
                count < total_genomes,
                "mutation at {} has frequency 1 but was not substituted",
                mutation.position
            );
        }
    }

    #[test]
    fn test_wright_fisher_run_to_termination() {
        let mut sim = Simulation::new(WRIGHT_FISHER_SCRIPT).unwrap();
        sim.set_seed(1234);

        let mut generations = 0;
        loop {
            let more = sim.run_one_generation().unwrap();
            generations += 1;
            assert_population_invariants(&sim);
            if !more {
                break;
            }
        }

        assert_eq!(generations, 15);
        assert_eq!(sim.generation(), 16);
        assert!(!sim.run_one_generation().unwrap());
        assert_eq!(sim.generation(), 16, "terminated engine does not advance");
    }

    #[test]
    fn test_logging_installs_once() {
        // Simulation::new installs the subscriber itself; explicit repeat
        // calls must neither panic nor reinstall.
        init_logging();
        init_logging();

        let mut sim = Simulation::new(WRIGHT_FISHER_SCRIPT).unwrap();
        sim.set_seed(3);
        assert!(sim.run_one_generation().unwrap());
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let mut first = Vec::new();
        let mut second = Vec::new();

        for output in [&mut first, &mut second] {
            let mut sim = Simulation::new(WRIGHT_FISHER_SCRIPT).unwrap();
            sim.set_seed(777);
            for _ in 0..10 {
                sim.run_one_generation().unwrap();
            }
            sim.dump_population(output).unwrap();
        }

        assert_eq!(
            String::from_utf8(first).unwrap(),
            String::from_utf8(second).unwrap()
        );
    }

    #[test]
    fn test_evaluate_reaches_live_entities() {
        let mut sim = Simulation::new(WRIGHT_FISHER_SCRIPT).unwrap();
        sim.set_seed(5);
        sim.run_one_generation().unwrap();

        assert_eq!(sim.evaluate("sim.generation;").unwrap().int_at(0).unwrap(), 2);
        assert_eq!(
            sim.evaluate("p1.individualCount;").unwrap().int_at(0).unwrap(),
            40
        );
        assert_eq!(
            sim.evaluate("size(p1.genomes);").unwrap().int_at(0).unwrap(),
            80
        );
        assert_eq!(
            sim.evaluate("sim.chromosome.lastPosition;").unwrap().int_at(0).unwrap(),
            99999
        );

        let frequencies = sim.evaluate("sim.mutationFrequencies(NULL);").unwrap();
        for f in frequencies.float_values().unwrap() {
            assert!((0.0..=1.0).contains(&f));
        }

        // Mutation objects expose their fields.
        let kinds = sim
            .evaluate("size(sim.mutations) == 0 | all(sim.mutations.position <= 99999);")
            .unwrap();
        assert!(kinds.logical_at(0).unwrap());
    }

    #[test]
    fn test_simulation_finished_stops_the_run() {
        let script = r#"
            initialize() {
                initializeMutationRate(1e-7);
                initializeMutationType('m1', 0.5, 'f', 0.0);
                initializeGenomicElementType('g1', m1, 1.0);
                initializeGenomicElement(g1, 0, 999);
                initializeRecombinationRate(1e-8);
            }
            1 { sim.addSubpop('p1', 10); }
            3 late { sim.simulationFinished(); }
            1:100 late { x = 1; }
        "#;

        let mut sim = Simulation::new(script).unwrap();
        sim.set_seed(9);
        assert!(sim.run_one_generation().unwrap());
        assert!(sim.run_one_generation().unwrap());
        assert!(!sim.run_one_generation().unwrap(), "finished in generation 3");
        assert!(!sim.run_one_generation().unwrap());
    }

    #[test]
    fn test_stale_subpop_reference_errors() {
        let mut sim = Simulation::new(WRIGHT_FISHER_SCRIPT).unwrap();
        sim.set_seed(11);
        sim.run_one_generation().unwrap();

        sim.evaluate("held = p1;").unwrap();
        assert_eq!(
            sim.evaluate("held.individualCount;").unwrap().int_at(0).unwrap(),
            40
        );

        // Size zero removes the subpopulation; the held reference is stale.
        sim.evaluate("p1.setSubpopulationSize(0);").unwrap();
        let err = sim.evaluate("held.individualCount;").unwrap_err();
        assert!(err.message().contains("no subpopulation"));
    }

    #[test]
    fn test_selfing_and_resize() {
        let mut sim = Simulation::new(WRIGHT_FISHER_SCRIPT).unwrap();
        sim.set_seed(21);
        sim.run_one_generation().unwrap();

        sim.evaluate("p1.setSelfingRate(0.5); p1.setSubpopulationSize(25);").unwrap();
        assert_eq!(
            sim.evaluate("p1.selfingRate;").unwrap().float_at(0).unwrap(),
            0.5
        );
        sim.run_one_generation().unwrap();
        assert_eq!(
            sim.evaluate("p1.individualCount;").unwrap().int_at(0).unwrap(),
            25
        );
    }

    #[test]
    fn test_migration_between_subpops() {
        let script = r#"
            initialize() {
                initializeMutationRate(1e-6);
                initializeMutationType('m1', 0.5, 'f', 0.0);
                initializeGenomicElementType('g1', m1, 1.0);
                initializeGenomicElement(g1, 0, 9999);
                initializeRecombinationRate(1e-7);
            }
            1 {
                sim.addSubpop('p1', 30);
                sim.addSubpop('p2', 30);
                p2.setMigrationRates(p1, 0.2);
            }
            1:8 late { x = 1; }
        "#;

        let mut sim = Simulation::new(script).unwrap();
        sim.set_seed(31);
        for _ in 0..8 {
            sim.run_one_generation().unwrap();
        }
        assert_eq!(
            sim.evaluate("size(sim.subpopulations);").unwrap().int_at(0).unwrap(),
            2
        );
    }

    #[test]
    fn test_add_subpop_split_copies_source_genomes() {
        let mut sim = Simulation::new(WRIGHT_FISHER_SCRIPT).unwrap();
        sim.set_seed(41);
        for _ in 0..5 {
            sim.run_one_generation().unwrap();
        }
        sim.evaluate("sim.addSubpopSplit('p3', 20, p1);").unwrap();
        assert_eq!(
            sim.evaluate("p3.individualCount;").unwrap().int_at(0).unwrap(),
            20
        );
    }

    #[test]
    fn test_fitness_callback_reweights() {
        let script = r#"
            initialize() {
                initializeMutationRate(1e-5);
                initializeMutationType('m1', 0.5, 'f', 0.1);
                initializeGenomicElementType('g1', m1, 1.0);
                initializeGenomicElement(g1, 0, 9999);
                initializeRecombinationRate(1e-7);
            }
            1 { sim.addSubpop('p1', 20); }
            fitness(m1) { return 1.0; }
            1:5 late { x = 1; }
        "#;

        let mut sim = Simulation::new(script).unwrap();
        sim.set_seed(51);
        for _ in 0..5 {
            sim.run_one_generation().unwrap();
        }
        assert_eq!(sim.generation(), 6, "callback path completed the run");
    }

    #[test]
    fn test_modify_child_callback_accepts() {
        let script = r#"
            initialize() {
                initializeMutationRate(1e-6);
                initializeMutationType('m1', 0.5, 'f', 0.0);
                initializeGenomicElementType('g1', m1, 1.0);
                initializeGenomicElement(g1, 0, 999);
                initializeRecombinationRate(1e-8);
            }
            1 { sim.addSubpop('p1', 10); }
            modifyChild() { return size(childGenome1.mutations) >= 0; }
            1:3 late { x = 1; }
        "#;

        let mut sim = Simulation::new(script).unwrap();
        sim.set_seed(61);
        for _ in 0..3 {
            sim.run_one_generation().unwrap();
        }
        assert_eq!(sim.generation(), 4);
    }

    #[test]
    fn test_register_and_deregister_events() {
        let mut sim = Simulation::new(WRIGHT_FISHER_SCRIPT).unwrap();
        sim.set_seed(71);
        sim.run_one_generation().unwrap();

        let id = sim
            .evaluate("sim.registerLateEvent('defineConstant(\"SAW\", sim.generation);', 3, 3);")
            .unwrap();
        let id = id.int_at(0).unwrap();
        sim.run_one_generation().unwrap();
        sim.run_one_generation().unwrap();
        assert_eq!(sim.evaluate("SAW;").unwrap().int_at(0).unwrap(), 3);

        sim.evaluate(&format!("sim.deregisterScriptBlock({});", id)).unwrap();
        assert!(sim.evaluate("sim.deregisterScriptBlock(99);").is_err());
    }

    #[test]
    fn test_script_errors_surface_with_positions() {
        let err = Simulation::new("1 { initializeMutationRate(1e-7); }")
            .and_then(|mut sim| {
                sim.run_one_generation()?;
                Ok(())
            })
            .unwrap_err();
        assert!(
            err.message().contains("initialize"),
            "unexpected error: {}",
            err
        );

        let mut sim = Simulation::new(WRIGHT_FISHER_SCRIPT).unwrap();
        let err = sim.evaluate("undefinedName + 1;").unwrap_err();
        assert_eq!(err.pos(), Some(0));
    }
}
