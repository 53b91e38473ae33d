//! Ionospheric and tropospheric delays, elevation mapped.
use crate::{
    bias::RuntimeParam,
    constants::{EARTH_SEMI_MAJOR_AXIS_WGS84_M, IONO_SHELL_HEIGHT_M, L1_WAVELENGTH_M},
    measurement::PseudorangeMeasurement,
};

use std::f64::consts::TAU;

/// Thin shell obliquity: slant over vertical delay ratio at the
/// ionospheric pierce point.
fn iono_obliquity(elevation_deg: f64) -> f64 {
    let chi = EARTH_SEMI_MAJOR_AXIS_WGS84_M * elevation_deg.to_radians().cos()
        / (EARTH_SEMI_MAJOR_AXIS_WGS84_M + IONO_SHELL_HEIGHT_M);
    1.0 / (1.0 - chi * chi).sqrt()
}

/// Slant ionospheric delay in meters of L1 code delay. Diurnal
/// vertical delay peaking at 14:00 local solar time, mapped to
/// the slant path.
fn iono_delay_m(prm: &RuntimeParam, intensity: f64) -> f64 {
    let (_, _, _, hh, mm, _, _) = prm.epoch.to_gregorian_utc();
    let (_, longitude_deg, _) = prm.apriori_geo;

    let local_hours =
        (hh as f64 + mm as f64 / 60.0 + longitude_deg / 15.0).rem_euclid(24.0);

    let diurnal = (TAU * (local_hours - 14.0) / 24.0).cos().max(0.0);
    let vertical_m = 1.5 + 3.5 * diurnal;

    intensity * vertical_m * iono_obliquity(prm.elevation_deg)
}

/// Slant tropospheric delay in meters. Zenith delay decays with
/// site altitude, mapped down to the horizon by the obliquity factor.
fn tropo_delay_m(prm: &RuntimeParam, intensity: f64) -> f64 {
    const ZENITH_SEA_LEVEL_M: f64 = 2.3;
    const SCALE_HEIGHT_M: f64 = 7163.0;

    let (_, _, altitude_m) = prm.apriori_geo;
    let zenith_m = ZENITH_SEA_LEVEL_M * (-altitude_m.max(0.0) / SCALE_HEIGHT_M).exp();

    let sin_elev = prm.elevation_deg.to_radians().sin();
    let mapping = 1.001 / (0.002001 + sin_elev * sin_elev).sqrt();

    intensity * zenith_m * mapping
}

/// Modeled slant components for one measurement context:
/// (ionospheric, tropospheric), meters of delay.
pub(crate) fn components(prm: &RuntimeParam, intensity: f64) -> (f64, f64) {
    (iono_delay_m(prm, intensity), tropo_delay_m(prm, intensity))
}

/// Applies both atmospheric contributions. The ionosphere delays the
/// code and advances the carrier by the same amount; the troposphere
/// delays both equally.
pub(crate) fn perturb(
    measurement: &mut PseudorangeMeasurement,
    prm: &RuntimeParam,
    intensity: f64,
) {
    let iono_m = iono_delay_m(prm, intensity);
    let tropo_m = tropo_delay_m(prm, intensity);

    measurement.pseudo_range_m += iono_m + tropo_m;

    if let Some(phase) = measurement.carrier_phase_cycles.as_mut() {
        *phase += (tropo_m - iono_m) / L1_WAVELENGTH_M;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::Epoch;
    use std::str::FromStr;

    fn prm(elevation_deg: f64) -> RuntimeParam {
        RuntimeParam {
            epoch: Epoch::from_str("2020-06-25T12:00:00 GPST").unwrap(),
            observer: 1,
            elevation_deg,
            azimuth_deg: 0.0,
            snr_dbhz: 45.0,
            range_m: 22_000_000.0,
            apriori_geo: (45.0, 7.0, 0.0),
        }
    }

    #[test]
    fn obliquity_unity_at_zenith() {
        assert!((iono_obliquity(90.0) - 1.0).abs() < 1.0E-9);
        assert!(iono_obliquity(5.0) > iono_obliquity(45.0));
    }

    #[test]
    fn delays_grow_towards_horizon() {
        for elevations in [(90.0, 45.0), (45.0, 15.0), (15.0, 5.0)] {
            assert!(iono_delay_m(&prm(elevations.1), 1.0) > iono_delay_m(&prm(elevations.0), 1.0));
            assert!(
                tropo_delay_m(&prm(elevations.1), 1.0) > tropo_delay_m(&prm(elevations.0), 1.0)
            );
        }
    }

    #[test]
    fn zenith_tropo_magnitude() {
        let delay = tropo_delay_m(&prm(90.0), 1.0);
        assert!((2.0..2.6).contains(&delay), "zenith delay {}", delay);
    }
}
