//! Environment dependent multipath noise.
use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::{
    bias::RuntimeParam,
    constants::L1_WAVELENGTH_M,
    measurement::PseudorangeMeasurement,
    prelude::Error,
};

#[cfg(feature = "serde")]
use serde::Deserialize;

/// Reflection environment class. Code noise grows strictly from
/// open sky to urban canyon.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub enum Environment {
    /// Unobstructed sky view
    #[default]
    OpenSky,
    /// Low rise surroundings, occasional reflections
    Suburban,
    /// Dense buildings, frequent reflections
    Urban,
    /// Street canyon, dominated by reflections
    UrbanCanyon,
}

impl Environment {
    /// 1-σ code multipath at mid elevation (meters).
    pub(crate) fn code_sigma_m(&self) -> f64 {
        match self {
            Self::OpenSky => 0.2,
            Self::Suburban => 0.6,
            Self::Urban => 1.5,
            Self::UrbanCanyon => 3.0,
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        let c = s.trim().to_lowercase();
        match c.as_str() {
            "open-sky" => Ok(Self::OpenSky),
            "suburban" => Ok(Self::Suburban),
            "urban" => Ok(Self::Urban),
            "urban-canyon" => Ok(Self::UrbanCanyon),
            _ => Err(Error::InvalidConfig(format!("unknown environment \"{}\"", c))),
        }
    }
}

/// Reflections hit hardest near the horizon.
fn elevation_factor(elevation_deg: f64) -> f64 {
    0.3 + (-elevation_deg.max(0.0) / 30.0).exp()
}

/// Draws zero mean multipath noise on code and, two orders of
/// magnitude smaller, on carrier phase.
pub(crate) fn perturb(
    measurement: &mut PseudorangeMeasurement,
    prm: &RuntimeParam,
    environment: Environment,
    intensity: f64,
    rng: &mut SmallRng,
) {
    let sigma_m = environment.code_sigma_m() * elevation_factor(prm.elevation_deg) * intensity;

    let code_draw: f64 = rng.sample(StandardNormal);
    measurement.pseudo_range_m += code_draw * sigma_m;

    if let Some(phase) = measurement.carrier_phase_cycles.as_mut() {
        let phase_draw: f64 = rng.sample(StandardNormal);
        *phase += phase_draw * sigma_m / 100.0 / L1_WAVELENGTH_M;
    }
}
