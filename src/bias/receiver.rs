//! Receiver side perturbations: clock random walk, thermal noise,
//! synthesized carrier ambiguities.
use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::{
    bias::RuntimeParam,
    constants::L1_WAVELENGTH_M,
    measurement::{measurement_sigma_m, PseudorangeMeasurement},
};

/// Random walk intensity of the receiver clock (meters per √s).
const CLOCK_WALK_M_SQRT_S: f64 = 0.05;

/// One endpoint's clock offset, advanced once per tick and applied
/// identically to every measurement of that tick.
#[derive(Debug, Default)]
pub(crate) struct ClockRandomWalk {
    offset_m: f64,
    last_epoch: Option<crate::prelude::Epoch>,
}

impl ClockRandomWalk {
    pub fn advance(
        &mut self,
        rng: &mut SmallRng,
        dt_s: f64,
        intensity: f64,
        epoch: crate::prelude::Epoch,
    ) {
        let draw: f64 = rng.sample(StandardNormal);
        self.offset_m += draw * CLOCK_WALK_M_SQRT_S * dt_s.sqrt() * intensity;
        self.last_epoch = Some(epoch);
    }

    pub fn offset_m(&self) -> f64 {
        self.offset_m
    }

    pub fn last_epoch(&self) -> Option<crate::prelude::Epoch> {
        self.last_epoch
    }
}

/// A clock offset shifts code and carrier together: the solver's
/// clock column absorbs it without biasing the position.
pub(crate) fn apply_clock(measurement: &mut PseudorangeMeasurement, offset_m: f64) {
    measurement.pseudo_range_m += offset_m;
    if let Some(phase) = measurement.carrier_phase_cycles.as_mut() {
        *phase += offset_m / L1_WAVELENGTH_M;
    }
}

/// Zero mean thermal noise, σ scaled by signal quality. Carrier
/// tracking is two orders of magnitude quieter than code.
pub(crate) fn apply_noise(
    measurement: &mut PseudorangeMeasurement,
    prm: &RuntimeParam,
    intensity: f64,
    rng: &mut SmallRng,
) {
    let sigma_m = measurement_sigma_m(prm.snr_dbhz) * intensity;

    let code_draw: f64 = rng.sample(StandardNormal);
    measurement.pseudo_range_m += code_draw * sigma_m;

    if let Some(phase) = measurement.carrier_phase_cycles.as_mut() {
        let phase_draw: f64 = rng.sample(StandardNormal);
        *phase += phase_draw * sigma_m / 100.0 / L1_WAVELENGTH_M;
    }
}

/// One integer ambiguity per satellite track, drawn once on first
/// sight and stable afterwards.
pub(crate) fn draw_ambiguity(rng: &mut SmallRng) -> i64 {
    rng.random_range(-100_000..100_000)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn clock_walk_accumulates() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut clock = ClockRandomWalk::default();
        let t = crate::prelude::Epoch::default();

        assert_eq!(clock.offset_m(), 0.0);

        clock.advance(&mut rng, 1.0, 1.0, t);
        let first = clock.offset_m();

        clock.advance(&mut rng, 1.0, 1.0, t);
        assert_ne!(clock.offset_m(), first);
    }

    #[test]
    fn zero_intensity_walk_stays_put() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut clock = ClockRandomWalk::default();

        clock.advance(&mut rng, 1.0, 0.0, crate::prelude::Epoch::default());
        assert_eq!(clock.offset_m(), 0.0);
    }
}
