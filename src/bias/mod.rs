//! Error model suite: synthetic perturbations applied to raw observables.
use rand::{rngs::SmallRng, SeedableRng};

use std::collections::HashMap;

use crate::{
    measurement::PseudorangeMeasurement,
    prelude::{BiasConfig, Epoch, ObserverId, SV},
};

mod atmosphere;
mod multipath;
mod receiver;

pub use multipath::Environment;

use receiver::ClockRandomWalk;

/// Per measurement context handed to every perturbation model.
#[derive(Debug, Copy, Clone)]
pub struct RuntimeParam {
    /// Sampling [Epoch]
    pub epoch: Epoch,
    /// Observing endpoint
    pub observer: ObserverId,
    /// Elevation in decimal degrees
    pub elevation_deg: f64,
    /// Azimuth in decimal degrees
    pub azimuth_deg: f64,
    /// Estimated C/N0 (dB-Hz)
    pub snr_dbhz: f64,
    /// Slant range (meters)
    pub range_m: f64,
    /// Observer geodetic coordinates: latitude and longitude in
    /// decimal degrees, altitude in meters
    pub apriori_geo: (f64, f64, f64),
}

/// Extension seam: collaborators register additional perturbation
/// models without this crate depending on their implementation.
pub trait BiasModel {
    /// Perturbs one raw measurement in place.
    fn perturb(&mut self, measurement: &mut PseudorangeMeasurement, prm: &RuntimeParam);
}

/// Owns the built-in perturbation models and any registered
/// extensions. Draws come from a seeded generator: identical
/// configuration and inputs reproduce identical perturbations.
pub struct BiasSuite {
    cfg: BiasConfig,
    rng: SmallRng,
    clocks: HashMap<ObserverId, ClockRandomWalk>,
    ambiguities: HashMap<(ObserverId, SV), i64>,
    extensions: Vec<Box<dyn BiasModel>>,
}

impl BiasSuite {
    /// Builds the suite from its configuration.
    pub fn new(cfg: BiasConfig) -> Self {
        let rng = SmallRng::seed_from_u64(cfg.seed);
        Self {
            cfg,
            rng,
            clocks: HashMap::new(),
            ambiguities: HashMap::new(),
            extensions: Vec::new(),
        }
    }

    /// Registers an external perturbation model, run after the
    /// built-in ones, in registration order.
    pub fn register(&mut self, model: Box<dyn BiasModel>) {
        self.extensions.push(model);
    }

    /// Each endpoint carries its own oscillator: the walk advances
    /// once per (observer, epoch), then holds for the whole tick.
    fn clock_offset_m(&mut self, observer: ObserverId, epoch: Epoch) -> f64 {
        let clock = self.clocks.entry(observer).or_default();
        if clock.last_epoch() != Some(epoch) {
            let dt_s = clock
                .last_epoch()
                .map(|last| (epoch - last).to_seconds().abs())
                .unwrap_or(0.0);
            clock.advance(&mut self.rng, dt_s, self.cfg.intensity, epoch);
        }
        clock.offset_m()
    }

    /// Applies every enabled model to one measurement. With all
    /// models disabled this leaves the measurement untouched, exactly.
    pub fn perturb(&mut self, measurement: &mut PseudorangeMeasurement, prm: &RuntimeParam) {
        if self.cfg.atmosphere {
            atmosphere::perturb(measurement, prm, self.cfg.intensity);
        }

        if self.cfg.multipath {
            multipath::perturb(
                measurement,
                prm,
                self.cfg.environment,
                self.cfg.intensity,
                &mut self.rng,
            );
        }

        if self.cfg.clock {
            let offset_m = self.clock_offset_m(prm.observer, prm.epoch);
            receiver::apply_clock(measurement, offset_m);
        }

        if self.cfg.receiver_noise {
            receiver::apply_noise(measurement, prm, self.cfg.intensity, &mut self.rng);
        }

        if self.cfg.synthesize_ambiguities {
            let rng = &mut self.rng;
            let ambiguity = *self
                .ambiguities
                .entry((prm.observer, measurement.sv))
                .or_insert_with(|| receiver::draw_ambiguity(rng));
            if let Some(phase) = measurement.carrier_phase_cycles.as_mut() {
                *phase += ambiguity as f64;
            }
        }

        for model in self.extensions.iter_mut() {
            model.perturb(measurement, prm);
        }
    }

    /// Synthesized integer ambiguity on this track, when enabled.
    pub fn ambiguity_cycles(&self, observer: ObserverId, sv: SV) -> Option<i64> {
        self.ambiguities.get(&(observer, sv)).copied()
    }
}

/// Modeled slant atmospheric components (ionospheric, tropospheric)
/// in meters, zero when the model is off. Base stations use this to
/// decompose their range corrections.
pub(crate) fn modeled_atmosphere(prm: &RuntimeParam, cfg: &BiasConfig) -> (f64, f64) {
    if cfg.atmosphere {
        atmosphere::components(prm, cfg.intensity)
    } else {
        (0.0, 0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::{BiasConfig, Constellation};
    use std::str::FromStr;

    fn raw_measurement() -> PseudorangeMeasurement {
        PseudorangeMeasurement {
            sv: SV::new(Constellation::GPS, 1),
            epoch: Epoch::from_str("2020-06-25T00:00:00 GPST").unwrap(),
            pseudo_range_m: 22_000_000.0,
            carrier_phase_cycles: Some(22_000_000.0 / crate::constants::L1_WAVELENGTH_M),
            snr_dbhz: 45.0,
            elevation_deg: 40.0,
            azimuth_deg: 120.0,
        }
    }

    fn prm(elevation_deg: f64) -> RuntimeParam {
        RuntimeParam {
            epoch: Epoch::from_str("2020-06-25T00:00:00 GPST").unwrap(),
            observer: 1,
            elevation_deg,
            azimuth_deg: 120.0,
            snr_dbhz: 45.0,
            range_m: 22_000_000.0,
            apriori_geo: (45.0, 7.0, 250.0),
        }
    }

    #[test]
    fn disabled_suite_is_neutral() {
        let mut suite = BiasSuite::new(BiasConfig::disabled());

        let raw = raw_measurement();
        let mut perturbed = raw;

        suite.perturb(&mut perturbed, &prm(40.0));

        // bit exact, not approximately equal
        assert_eq!(perturbed, raw);
    }

    #[test]
    fn atmosphere_grows_towards_horizon() {
        let mut cfg = BiasConfig::disabled();
        cfg.atmosphere = true;

        let mut suite = BiasSuite::new(cfg);

        let raw = raw_measurement();

        let mut high = raw;
        suite.perturb(&mut high, &prm(80.0));

        let mut low = raw;
        suite.perturb(&mut low, &prm(10.0));

        let high_error = high.pseudo_range_m - raw.pseudo_range_m;
        let low_error = low.pseudo_range_m - raw.pseudo_range_m;

        assert!(high_error > 0.0);
        assert!(
            low_error > high_error,
            "low elevation error {} not above high elevation error {}",
            low_error,
            high_error
        );
    }

    #[test]
    fn identical_seeds_reproduce() {
        let mut cfg = BiasConfig::default();
        cfg.seed = 17;

        let mut first = BiasSuite::new(cfg.clone());
        let mut second = BiasSuite::new(cfg);

        let mut a = raw_measurement();
        let mut b = raw_measurement();

        first.perturb(&mut a, &prm(40.0));
        second.perturb(&mut b, &prm(40.0));

        assert_eq!(a, b);
    }

    #[test]
    fn ambiguities_are_per_track() {
        let mut cfg = BiasConfig::disabled();
        cfg.synthesize_ambiguities = true;

        let mut suite = BiasSuite::new(cfg);

        let mut rover = raw_measurement();
        let mut base = raw_measurement();

        let mut rover_prm = prm(40.0);
        rover_prm.observer = 1;
        let mut base_prm = prm(40.0);
        base_prm.observer = 2;

        suite.perturb(&mut rover, &rover_prm);
        suite.perturb(&mut base, &base_prm);

        let rover_n = suite.ambiguity_cycles(1, rover.sv).unwrap();
        let base_n = suite.ambiguity_cycles(2, base.sv).unwrap();
        assert_ne!(rover_n, base_n);

        // stable on the next epoch: same track keeps its integer
        let mut rover_again = raw_measurement();
        suite.perturb(&mut rover_again, &rover_prm);
        assert_eq!(suite.ambiguity_cycles(1, rover.sv).unwrap(), rover_n);
    }

    #[test]
    fn extension_models_run() {
        struct FixedOffset {}

        impl BiasModel for FixedOffset {
            fn perturb(&mut self, m: &mut PseudorangeMeasurement, _: &RuntimeParam) {
                m.pseudo_range_m += 7.0;
            }
        }

        let mut suite = BiasSuite::new(BiasConfig::disabled());
        suite.register(Box::new(FixedOffset {}));

        let raw = raw_measurement();
        let mut perturbed = raw;
        suite.perturb(&mut perturbed, &prm(40.0));

        assert_eq!(perturbed.pseudo_range_m, raw.pseudo_range_m + 7.0);
    }
}
