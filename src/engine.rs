//! Tick orchestration: time in, satellite states and solutions out.
use log::warn;

use std::collections::HashMap;

use crate::{
    bias::{BiasModel, BiasSuite},
    measurement::{self, PseudorangeMeasurement},
    prelude::{
        AmbiguityState, Config, ConstellationSet, CorrectionSet, Epoch, Error, LookAngles,
        Observer, ObserverId, PositionSolution, Role, RtkSolution, Snapshot, SV,
    },
    rtk, solver, visibility,
};

/// Forward time step (seconds) beyond which the driving clock is
/// considered to have jumped: differential state cannot be trusted
/// across it.
const MAX_FORWARD_STEP_S: f64 = 3600.0;

/// One observer/satellite sight line, republished every tick for
/// selection and display purposes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityRecord {
    /// Observing endpoint
    pub observer: ObserverId,
    /// Sighted [SV]
    pub sv: SV,
    /// [LookAngles] of the sight line
    pub angles: LookAngles,
    /// Whether the mask test passed
    pub visible: bool,
}

/// Either flavor of per-observer output.
#[derive(Debug, Clone, PartialEq)]
pub enum SolutionOutput {
    /// Standalone (base or standalone role) solution
    Position(PositionSolution),
    /// Differential (rover role) solution
    Rtk(RtkSolution),
}

/// One observer's outcome for one tick. Failures stay right here:
/// they never leak into another observer's processing.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverSolution {
    /// The endpoint this outcome belongs to
    pub observer: ObserverId,
    /// Solution, or the per-tick failure that prevented one
    pub result: Result<SolutionOutput, Error>,
}

/// Everything one tick produces, handed to collaborators as
/// immutable values.
#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    /// [Epoch] of the tick
    pub epoch: Epoch,
    /// Satellite states, fully built before publication
    pub snapshot: Snapshot,
    /// Per observer solutions, one entry per registered observer
    pub solutions: Vec<ObserverSolution>,
    /// Per observer/satellite sight lines
    pub visibilities: Vec<VisibilityRecord>,
}

/// The simulation core. Owns constellations, observers, differential
/// state and the error model suite; [Engine::tick] drives everything
/// from a single externally supplied clock.
///
/// Registry mutations happen between ticks only: a tick works on a
/// consistent snapshot from its first to its last observer.
pub struct Engine {
    cfg: Config,
    constellations: Vec<ConstellationSet>,
    observers: Vec<Observer>,
    suite: BiasSuite,
    /// per (rover, base) baseline ambiguity knowledge
    ambiguities: HashMap<(ObserverId, ObserverId), AmbiguityState>,
    /// per base station correction buffer, single writer
    corrections: HashMap<ObserverId, CorrectionSet>,
    last_epoch: Option<Epoch>,
}

impl Engine {
    /// Builds an [Engine] from a validated [Config].
    pub fn new(cfg: Config) -> Result<Self, Error> {
        cfg.validate()?;
        let suite = BiasSuite::new(cfg.bias.clone());
        Ok(Self {
            cfg,
            constellations: Vec::new(),
            observers: Vec::new(),
            suite,
            ambiguities: HashMap::new(),
            corrections: HashMap::new(),
            last_epoch: None,
        })
    }

    /// Registers one [ConstellationSet].
    pub fn add_constellation(&mut self, set: ConstellationSet) {
        self.constellations.push(set);
    }

    /// Mutable access to a registered set, for element replacement
    /// between ticks.
    pub fn constellation_mut(&mut self, name: &str) -> Option<&mut ConstellationSet> {
        self.constellations.iter_mut().find(|s| s.name == name)
    }

    /// Registers one [Observer]. Replaces a previous observer
    /// carrying the same id.
    pub fn add_observer(&mut self, observer: Observer) {
        if let Some(existing) = self.observers.iter_mut().find(|o| o.id == observer.id) {
            *existing = observer;
        } else {
            self.observers.push(observer);
        }
    }

    /// Removes one [Observer] and the differential state attached
    /// to it.
    pub fn remove_observer(&mut self, id: ObserverId) {
        self.observers.retain(|o| o.id != id);
        self.corrections.remove(&id);
        self.ambiguities
            .retain(|(rover, base), _| *rover != id && *base != id);
    }

    pub fn observers(&self) -> &[Observer] {
        &self.observers
    }

    /// Registers an external perturbation model with the suite.
    pub fn register_bias_model(&mut self, model: Box<dyn BiasModel>) {
        self.suite.register(model);
    }

    /// Current ambiguity knowledge of one rover/base baseline.
    pub fn ambiguity_state(&self, rover: ObserverId, base: ObserverId) -> Option<&AmbiguityState> {
        self.ambiguities.get(&(rover, base))
    }

    /// Runs one simulation tick at `epoch`.
    ///
    /// Ordering within the tick: propagation completes for the whole
    /// constellation before any measurement or solve runs; base
    /// stations update their correction buffers before any rover
    /// consumes a (copied) correction set.
    pub fn tick(&mut self, epoch: Epoch) -> TickOutput {
        // a jumping clock invalidates every baseline's knowledge
        if let Some(last) = self.last_epoch {
            if epoch < last || (epoch - last).to_seconds() > MAX_FORWARD_STEP_S {
                warn!("{}: time jump (last {}), differential state reset", epoch, last);
                self.ambiguities.clear();
                self.corrections.clear();
            }
        }
        self.last_epoch = Some(epoch);

        // propagation barrier: snapshot is complete before anything
        // downstream reads it
        let snapshot = Snapshot::build(epoch, &self.constellations);

        let observers = self.observers.clone();

        // per observer raw measurements and sight lines
        let mut measurements: HashMap<ObserverId, Vec<PseudorangeMeasurement>> = HashMap::new();
        let mut visibilities = Vec::new();

        for observer in &observers {
            for sv in snapshot.sv_sorted() {
                let state = match snapshot.state(sv) {
                    Some(state) => state,
                    None => continue,
                };
                if let Ok(angles) = visibility::look_angles(observer.position_ecef_m, state) {
                    visibilities.push(VisibilityRecord {
                        observer: observer.id,
                        sv,
                        angles,
                        visible: visibility::is_visible(&angles, self.cfg.mask_angle_deg),
                    });
                }
            }

            measurements.insert(
                observer.id,
                measurement::measure(observer, &snapshot, &self.cfg, &mut self.suite),
            );
        }

        // base update cycle: correction buffers refresh before any
        // rover reads them
        for observer in observers.iter().filter(|o| o.role == Role::Base) {
            if let Some(base_measurements) = measurements.get(&observer.id) {
                let set = rtk::corrections_from_base(
                    observer,
                    base_measurements,
                    &snapshot,
                    &self.cfg.bias,
                    self.corrections.get(&observer.id),
                );
                self.corrections.insert(observer.id, set);
            }
        }

        // per observer solving; failures are contained per entry
        let mut solutions = Vec::with_capacity(observers.len());

        for observer in &observers {
            let own = measurements.get(&observer.id).cloned().unwrap_or_default();

            let result = match observer.role {
                Role::Base | Role::Standalone => solver::solve(
                    &own,
                    &snapshot,
                    observer.position_ecef_m,
                    &self.cfg,
                )
                .map(SolutionOutput::Position),

                Role::Rover { base } => self.process_rover(
                    observer,
                    base,
                    &own,
                    &measurements,
                    &snapshot,
                ),
            };

            solutions.push(ObserverSolution {
                observer: observer.id,
                result,
            });
        }

        TickOutput {
            epoch,
            snapshot,
            solutions,
            visibilities,
        }
    }

    fn process_rover(
        &mut self,
        rover: &Observer,
        base_id: ObserverId,
        rover_measurements: &[PseudorangeMeasurement],
        measurements: &HashMap<ObserverId, Vec<PseudorangeMeasurement>>,
        snapshot: &Snapshot,
    ) -> Result<SolutionOutput, Error> {
        let base = self
            .observers
            .iter()
            .find(|o| o.id == base_id && o.role == Role::Base)
            .ok_or(Error::MissingBase(rover.id))?;

        let base_measurements = measurements
            .get(&base_id)
            .ok_or(Error::MissingBase(rover.id))?;

        // snapshot copy: the buffer may be rewritten next base cycle
        let corrections = self
            .corrections
            .get(&base_id)
            .cloned()
            .unwrap_or_default();

        let state = self
            .ambiguities
            .entry((rover.id, base_id))
            .or_default();

        rtk::process_epoch(
            rover,
            base,
            rover_measurements,
            base_measurements,
            &corrections,
            snapshot,
            &self.cfg,
            state,
        )
        .map(SolutionOutput::Rtk)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::{Constellation, Duration, SolutionKind, WalkerShell};
    use nalgebra::Vector3;
    use std::str::FromStr;

    fn t0() -> Epoch {
        Epoch::from_str("2020-06-25T00:00:00 GPST").unwrap()
    }

    fn engine_with_sky() -> Engine {
        let mut cfg = Config::default();
        cfg.bias = crate::prelude::BiasConfig::disabled();

        let mut engine = Engine::new(cfg).unwrap();
        let shell = WalkerShell::gps_like(t0());
        engine.add_constellation(
            ConstellationSet::from_walker("gps", Constellation::GPS, &shell).unwrap(),
        );
        engine
    }

    #[test]
    fn standalone_observer_solves() {
        let mut engine = engine_with_sky();
        engine.add_observer(Observer::standalone(1, Vector3::new(6_378_137.0, 0.0, 0.0)));

        let output = engine.tick(t0());

        assert_eq!(output.solutions.len(), 1);
        match &output.solutions[0].result {
            Ok(SolutionOutput::Position(solution)) => {
                assert_eq!(solution.kind, SolutionKind::Spp);
                let error =
                    (solution.position_ecef_m - Vector3::new(6_378_137.0, 0.0, 0.0)).norm();
                assert!(error < 1.0E-3, "noiseless solve error {}", error);
            },
            other => panic!("expected a standalone solution, got {:?}", other),
        }

        // sight lines republished for every propagated satellite
        assert_eq!(output.visibilities.len(), output.snapshot.len());
    }

    #[test]
    fn rover_reaches_fixed_with_live_base() {
        let mut engine = engine_with_sky();
        engine.add_observer(Observer::base(1, Vector3::new(6_378_137.0, 0.0, 0.0)));
        engine.add_observer(Observer::rover(2, Vector3::new(6_378_137.0, 1_000.0, 0.0), 1));

        let output = engine.tick(t0());
        let rover_result = &output.solutions[1].result;

        match rover_result {
            Ok(SolutionOutput::Rtk(solution)) => {
                assert_eq!(solution.solution.kind, SolutionKind::RtkFixed);
                assert!((solution.baseline_length_m - 1_000.0).abs() < 0.1);
            },
            other => panic!("expected an RTK solution, got {:?}", other),
        }

        assert!(engine.ambiguity_state(2, 1).unwrap().is_valid());
    }

    #[test]
    fn unlinked_rover_fails_alone() {
        let mut engine = engine_with_sky();
        engine.add_observer(Observer::rover(2, Vector3::new(6_378_137.0, 1_000.0, 0.0), 99));
        engine.add_observer(Observer::standalone(3, Vector3::new(6_378_137.0, 0.0, 0.0)));

        let output = engine.tick(t0());

        // the rover fails, its neighbor is untouched
        assert_eq!(output.solutions[0].result, Err(Error::MissingBase(2)));
        assert!(output.solutions[1].result.is_ok());
    }

    #[test]
    fn backward_jump_resets_differential_state() {
        let mut engine = engine_with_sky();
        engine.add_observer(Observer::base(1, Vector3::new(6_378_137.0, 0.0, 0.0)));
        engine.add_observer(Observer::rover(2, Vector3::new(6_378_137.0, 1_000.0, 0.0), 1));

        engine.tick(t0());
        assert!(engine.ambiguity_state(2, 1).is_some());

        // driving clock jumps backward: knowledge is dropped before
        // the new epoch is processed
        engine.tick(t0() - Duration::from_seconds(60.0));

        let state = engine.ambiguity_state(2, 1).unwrap();
        // state was re-created from scratch this tick
        assert!(state.is_valid());
    }

    #[test]
    fn empty_sky_yields_geometry_errors() {
        let mut cfg = Config::default();
        cfg.bias = crate::prelude::BiasConfig::disabled();
        let mut engine = Engine::new(cfg).unwrap();

        engine.add_observer(Observer::standalone(1, Vector3::new(6_378_137.0, 0.0, 0.0)));
        let output = engine.tick(t0());

        assert_eq!(
            output.solutions[0].result,
            Err(Error::NotEnoughMeasurements)
        );
    }
}
