use rstest::*;

use crate::{
    prelude::{Config, Duration, Engine, Observer, SolutionOutput, Unit},
    tests::{
        add_baseline_pair, base_position, engine_with, init_logger, noiseless_engine,
        reference_epoch,
    },
};

#[fixture]
fn twin_engines() -> (Engine, Engine) {
    let mut first = engine_with(Config::default());
    let mut second = engine_with(Config::default());
    add_baseline_pair(&mut first);
    add_baseline_pair(&mut second);
    (first, second)
}

/// Identical configuration, identical inputs: every tick's output is
/// equal, perturbation draws included.
#[rstest]
fn twin_engines_reproduce(twin_engines: (Engine, Engine)) {
    init_logger();

    let (mut first, mut second) = twin_engines;
    let t0 = reference_epoch();

    for nth in 0..5_i64 {
        let t = t0 + (nth as f64) * Unit::Second;

        let a = first.tick(t);
        let b = second.tick(t);

        assert_eq!(a.epoch, b.epoch);
        assert_eq!(a.solutions, b.solutions, "tick #{} diverged", nth);
        assert_eq!(a.visibilities, b.visibilities);
    }
}

/// Re-propagating the same epoch twice returns bit identical states.
#[rstest]
fn snapshot_is_reproducible() {
    init_logger();

    let mut engine = noiseless_engine();
    engine.add_observer(Observer::standalone(1, base_position()));

    let t = reference_epoch() + Duration::from_seconds(3600.0);

    let first = engine.tick(t);
    let second = engine.tick(t);

    for state in first.snapshot.states() {
        let again = second.snapshot.state(state.sv).unwrap();
        assert_eq!(state, again, "{} state not reproducible", state.sv);
    }
}

/// With every error model off, two observers at the same location
/// see exactly the same observables and solve to exactly the same
/// position.
#[rstest]
fn disabled_models_are_transparent() {
    init_logger();

    let mut engine = noiseless_engine();
    engine.add_observer(Observer::standalone(1, base_position()));
    engine.add_observer(Observer::standalone(2, base_position()));

    let output = engine.tick(reference_epoch());

    let positions: Vec<_> = output
        .solutions
        .iter()
        .map(|s| match &s.result {
            Ok(SolutionOutput::Position(p)) => p.position_ecef_m,
            other => panic!("expected a standalone solution, got {:?}", other),
        })
        .collect();

    assert_eq!(positions[0], positions[1]);
}
