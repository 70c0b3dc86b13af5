use potts_common::SimulationConfig;
use potts_engine::{metropolis_accepts, Simulation, BACKGROUND};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TISSUE: &str = r#"
    [lattice]
    length = 30
    width = 30
    neighborhood = "{neighborhood}"
    connectivity = "{connectivity}"

    [potts]
    temperature = 8.0
    seed = 42
    update_scheme = "{scheme}"
    terms = ["adhesion", "volume", "surface", "persistence", "junction", "substrate"]

    [timing]
    total_steps = 40

    [[populations]]
    name = "epithelial"
    critical_volume = 16.0
    substrate_adhesion = 0.5
    [populations.lambdas]
    volume = 2.0
    surface = 0.5
    persistence = 1.0
    junction = 0.2
    [populations.adhesion]
    medium = 6.0
    epithelial = 2.0
    stromal = 4.0
    [populations.nucleus]
    critical_volume = 4.0
    lambda_volume = 2.0
    lambda_surface = 0.5
    adhesion = 1.0
    [populations.module]
    duration_g1 = 6.0
    duration_s = 2.0
    duration_g2 = 2.0
    duration_m = 1.0

    [[populations]]
    name = "stromal"
    critical_volume = 12.0
    [populations.lambdas]
    volume = 2.0
    surface = 0.5
    [populations.adhesion]
    medium = 5.0
    stromal = 3.0

    [[initial_conditions.cells]]
    population = "epithelial"
    shape = { kind = "box", min = [3, 3, 0], max = [6, 6, 0] }

    [[initial_conditions.cells]]
    population = "stromal"
    shape = { kind = "sphere", center = [15, 15, 0], radius = 2.0 }

    [initial_conditions.random]
    population = "epithelial"
    count = 6
    radius = 2.0
"#;

fn tissue(scheme: &str, neighborhood: &str, connectivity: &str) -> SimulationConfig {
    let text = TISSUE
        .replace("{scheme}", scheme)
        .replace("{neighborhood}", neighborhood)
        .replace("{connectivity}", connectivity);
    SimulationConfig::from_toml_str(&text).unwrap()
}

/// Every voxel has one owner, owners agree with locations, and locations are connected.
fn assert_consistent(sim: &Simulation) {
    sim.verify_invariants().unwrap();
    let snapshot = sim.snapshot();
    let lattice = snapshot.lattice.as_ref().unwrap();
    let owned: u64 = snapshot.cells.iter().map(|c| c.volume as u64).sum();
    let occupied = lattice.iter().filter(|&&id| id != BACKGROUND).count() as u64;
    assert_eq!(owned, occupied);
    assert_eq!(occupied, snapshot.occupied_volume);
    for record in &snapshot.cells {
        let painted = lattice.iter().filter(|&&id| id == record.id).count() as u32;
        assert_eq!(painted, record.volume, "cell {}", record.id);
    }
}

#[test]
fn sequential_runs_preserve_exclusivity_connectivity_and_conservation() {
    let mut sim = Simulation::new(tissue("sequential", "von_neumann", "local")).unwrap();
    assert!(sim.cell_count() >= 3);
    for _ in 0..40 {
        sim.advance(1).unwrap();
        assert_consistent(&sim);
    }
    assert!(sim.accepted_flips() > 0);
}

#[test]
fn checkerboard_runs_preserve_invariants() {
    let mut sim = Simulation::new(tissue("checkerboard", "von_neumann", "local")).unwrap();
    for _ in 0..40 {
        sim.advance(1).unwrap();
        assert_consistent(&sim);
    }
    assert!(sim.accepted_flips() > 0);
}

#[test]
fn moore_neighborhood_with_global_check_preserves_invariants() {
    let mut sim = Simulation::new(tissue("sequential", "moore", "global")).unwrap();
    for _ in 0..25 {
        sim.advance(1).unwrap();
        assert_consistent(&sim);
    }
}

#[test]
fn same_seed_same_history() {
    for scheme in ["sequential", "checkerboard"] {
        let mut a = Simulation::new(tissue(scheme, "von_neumann", "local")).unwrap();
        let mut b = Simulation::new(tissue(scheme, "von_neumann", "local")).unwrap();
        a.advance(20).unwrap();
        b.advance(20).unwrap();
        let (sa, sb) = (a.snapshot(), b.snapshot());
        assert_eq!(sa.lattice, sb.lattice, "{} lattices diverged", scheme);
        assert_eq!(sa.cells, sb.cells, "{} cells diverged", scheme);
        assert_eq!(sa.accepted_flips, sb.accepted_flips);
    }
}

#[test]
fn different_seeds_diverge() {
    let mut config = tissue("sequential", "von_neumann", "local");
    let mut a = Simulation::new(config.clone()).unwrap();
    config.potts.seed += 1;
    let mut b = Simulation::new(config).unwrap();
    a.advance(10).unwrap();
    b.advance(10).unwrap();
    assert_ne!(a.snapshot().lattice, b.snapshot().lattice);
}

#[test]
fn metropolis_acceptance_matches_boltzmann_factor() {
    let mut rng = StdRng::seed_from_u64(7);
    let (delta, temperature) = (1.0, 1.0);
    let trials = 100_000;
    let accepted = (0..trials)
        .filter(|_| metropolis_accepts(delta, temperature, rng.random::<f64>()))
        .count();
    let frequency = accepted as f64 / trials as f64;
    assert!((frequency - (-1.0f64).exp()).abs() < 0.01, "frequency {}", frequency);

    // Favorable moves are always taken; zero temperature never climbs.
    assert!((0..1000).all(|_| metropolis_accepts(-0.5, temperature, rng.random::<f64>())));
    assert!((0..1000).all(|_| !metropolis_accepts(0.5, 0.0, rng.random::<f64>())));
}

const DIVIDING: &str = r#"
    [lattice]
    length = 30
    width = 30

    [potts]
    temperature = 10.0
    seed = 8
    check_invariants = true

    [timing]
    total_steps = 300

    [[populations]]
    name = "cell"
    critical_volume = 9.0
    [populations.lambdas]
    volume = 5.0
    [populations.adhesion]
    medium = 2.0
    cell = 2.0
    [populations.module]
    duration_g1 = 4.0
    duration_s = 2.0
    duration_g2 = 2.0
    duration_m = 1.0
    duration_checkpoint = 2.0

    [[initial_conditions.cells]]
    population = "cell"
    shape = { kind = "box", min = [13, 13, 0], max = [15, 15, 0] }
"#;

#[test]
fn growing_cells_divide_into_connected_daughters() {
    let config = SimulationConfig::from_toml_str(DIVIDING).unwrap();
    let mut sim = Simulation::new(config).unwrap();
    let mut divided = false;
    for _ in 0..300 {
        let stats = sim.advance(1).unwrap()[0];
        if stats.divisions > 0 {
            divided = true;
            break;
        }
    }
    assert!(divided, "no division within 300 steps");
    assert!(sim.cell_count() >= 2);

    let snapshot = sim.snapshot();
    let daughter = snapshot.cells.iter().find(|c| c.parent != 0).unwrap();
    let parent = snapshot.cells.iter().find(|c| c.id == daughter.parent).unwrap();
    assert_eq!(parent.divisions, 1);
    assert_eq!(daughter.divisions, 1);
    assert_eq!(daughter.age, 0);
    assert_eq!(daughter.target_volume, 9.0);
    sim.verify_invariants().unwrap();
}

const LAYERED: &str = r#"
    [lattice]
    length = 12
    width = 12
    height = 5

    [potts]
    temperature = 6.0
    seed = 13
    update_scheme = "{scheme}"
    terms = ["adhesion", "volume", "surface", "height", "substrate"]
    check_invariants = true

    [timing]
    total_steps = 15

    [substrate]
    concentration = 1.0
    gradient_x = 0.05

    [[populations]]
    name = "cell"
    critical_volume = 27.0
    critical_height = 3.0
    substrate_adhesion = 1.0
    [populations.lambdas]
    volume = 1.0
    surface = 0.1
    height = 0.5
    [populations.adhesion]
    medium = 3.0
    cell = 1.0
    [populations.module]
    duration_g1 = inf

    [[initial_conditions.cells]]
    population = "cell"
    shape = { kind = "box", min = [2, 2, 0], max = [4, 4, 2] }

    [[initial_conditions.cells]]
    population = "cell"
    shape = { kind = "box", min = [6, 6, 0], max = [8, 8, 2] }
"#;

#[test]
fn three_dimensional_runs_preserve_invariants() {
    for scheme in ["sequential", "checkerboard"] {
        let config = SimulationConfig::from_toml_str(&LAYERED.replace("{scheme}", scheme)).unwrap();
        let mut sim = Simulation::new(config).unwrap();
        assert_eq!(sim.lattice().dimensions(), [12, 12, 5]);
        sim.advance(15).unwrap();
        assert_consistent(&sim);
        for cell in sim.cells().iter() {
            assert!(cell.location.height() >= 1);
        }
    }
}
