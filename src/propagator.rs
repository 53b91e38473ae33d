//! Perturbed two-body propagation of [OrbitalElements] to a [SatelliteState].
use log::warn;
use nalgebra::{Matrix3, Vector3};

use crate::{
    constants::{EARTH_GRAVITATION_MU_M3_S2, EARTH_J2, EARTH_SEMI_MAJOR_AXIS_WGS84_M},
    frames,
    prelude::{Epoch, Error, GeodeticCoords, OrbitalElements, SV},
};

use std::f64::consts::{PI, TAU};

/// Instantaneous kinematic state of one satellite. A pure function of
/// ([OrbitalElements], [Epoch]): identical inputs always reproduce the
/// same state, bit for bit.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SatelliteState {
    /// [SV] this state belongs to
    pub sv: SV,
    /// [Epoch] of the state
    pub epoch: Epoch,
    /// Inertial position (meters)
    pub position_eci_m: Vector3<f64>,
    /// Inertial velocity (m/s)
    pub velocity_eci_m_s: Vector3<f64>,
    /// Earth fixed position (meters)
    pub position_ecef_m: Vector3<f64>,
    /// Earth fixed velocity (m/s)
    pub velocity_ecef_m_s: Vector3<f64>,
    /// Geodetic coordinates of the sub-satellite state
    pub geodetic: GeodeticCoords,
    /// Kepler solver hit the iteration cap: this state is the best
    /// iterate, carried forward instead of being discarded.
    pub degraded: bool,
}

/// Solves Kepler's equation M = E - e sin(E) for the eccentric anomaly.
/// Newton-Raphson, bounded iteration. Returns the best iterate and
/// whether the tolerance was met.
fn solve_kepler(mean_anomaly_rad: f64, eccentricity: f64) -> (f64, bool) {
    const MAX_ITER: usize = 10;
    const TOL_RAD: f64 = 1.0E-8;

    let mut ea = if eccentricity < 0.8 {
        mean_anomaly_rad
    } else {
        PI
    };

    for _ in 0..MAX_ITER {
        let f = ea - eccentricity * ea.sin() - mean_anomaly_rad;
        let delta = f / (1.0 - eccentricity * ea.cos());
        ea -= delta;
        if delta.abs() < TOL_RAD {
            return (ea, true);
        }
    }

    (ea, false)
}

/// Rotation from the perifocal frame to the inertial frame (3-1-3).
fn perifocal_to_eci(raan_rad: f64, arg_perigee_rad: f64, inclination_rad: f64) -> Matrix3<f64> {
    let (sin_raan, cos_raan) = raan_rad.sin_cos();
    let (sin_argp, cos_argp) = arg_perigee_rad.sin_cos();
    let (sin_inc, cos_inc) = inclination_rad.sin_cos();

    Matrix3::new(
        cos_raan * cos_argp - sin_raan * sin_argp * cos_inc,
        -cos_raan * sin_argp - sin_raan * cos_argp * cos_inc,
        sin_raan * sin_inc,
        sin_raan * cos_argp + cos_raan * sin_argp * cos_inc,
        -sin_raan * sin_argp + cos_raan * cos_argp * cos_inc,
        -cos_raan * sin_inc,
        sin_argp * sin_inc,
        cos_argp * sin_inc,
        cos_inc,
    )
}

/// Advances `elements` to `t` and returns the resulting [SatelliteState].
///
/// Applies secular oblateness drift to the node and perigee, advances the
/// mean anomaly by mean motion, solves Kepler's equation and rotates the
/// perifocal state into the inertial, Earth fixed and geodetic frames.
/// Per-satellite propagation shares no mutable state: batches are safe to
/// fan out.
pub fn propagate(sv: SV, elements: &OrbitalElements, t: Epoch) -> Result<SatelliteState, Error> {
    elements.validate()?;

    let dt_s = (t - elements.epoch).to_seconds();

    let sma = elements.sma_m;
    let ecc = elements.eccentricity;
    let n = elements.mean_motion_rad_s();

    // secular J2 rates over the semi-latus rectum
    let p = sma * (1.0 - ecc * ecc);
    let j2_factor = EARTH_J2 * (EARTH_SEMI_MAJOR_AXIS_WGS84_M / p).powi(2) * n;
    let cos_inc = elements.inclination_rad.cos();

    let raan_dot = -1.5 * j2_factor * cos_inc;
    let arg_perigee_dot = 0.75 * j2_factor * (5.0 * cos_inc * cos_inc - 1.0);

    let raan = elements.raan_rad + raan_dot * dt_s;
    let arg_perigee = elements.arg_perigee_rad + arg_perigee_dot * dt_s;
    let mean_anomaly = (elements.mean_anomaly_rad + n * dt_s).rem_euclid(TAU);

    let (ecc_anomaly, converged) = solve_kepler(mean_anomaly, ecc);
    if !converged {
        warn!("{}({}): kepler iteration cap reached", t, sv);
    }

    let (sin_ea, cos_ea) = ecc_anomaly.sin_cos();

    // true anomaly and radius
    let true_anomaly =
        ((1.0 - ecc * ecc).sqrt() * sin_ea).atan2(cos_ea - ecc);
    let radius = sma * (1.0 - ecc * cos_ea);

    let (sin_nu, cos_nu) = true_anomaly.sin_cos();

    let r_perifocal = Vector3::new(radius * cos_nu, radius * sin_nu, 0.0);

    let v_factor = (EARTH_GRAVITATION_MU_M3_S2 / p).sqrt();
    let v_perifocal = Vector3::new(-v_factor * sin_nu, v_factor * (ecc + cos_nu), 0.0);

    let rot = perifocal_to_eci(raan, arg_perigee, elements.inclination_rad);
    let position_eci_m = rot * r_perifocal;
    let velocity_eci_m_s = rot * v_perifocal;

    let era_rad = frames::earth_rotation_angle_rad(t);
    let position_ecef_m = frames::eci_to_ecef(position_eci_m, era_rad)?;
    let velocity_ecef_m_s =
        frames::eci_velocity_to_ecef(position_eci_m, velocity_eci_m_s, era_rad)?;
    let geodetic = frames::ecef_to_geodetic(position_ecef_m)?;

    Ok(SatelliteState {
        sv,
        epoch: t,
        position_eci_m,
        velocity_eci_m_s,
        position_ecef_m,
        velocity_ecef_m_s,
        geodetic,
        degraded: !converged,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::{Constellation, Unit};
    use std::str::FromStr;

    fn t0() -> Epoch {
        Epoch::from_str("2020-06-25T00:00:00 GPST").unwrap()
    }

    fn circular_gps_orbit() -> OrbitalElements {
        OrbitalElements {
            sma_m: 26_560_000.0,
            eccentricity: 0.0,
            inclination_rad: 55.0_f64.to_radians(),
            raan_rad: 0.3,
            arg_perigee_rad: 0.0,
            mean_anomaly_rad: 1.2,
            epoch: t0(),
        }
    }

    #[test]
    fn kepler_convergence() {
        for (m, e) in [(0.0, 0.0), (1.0, 0.01), (3.0, 0.3), (5.5, 0.7)] {
            let (ea, converged) = solve_kepler(m, e);
            assert!(converged, "no convergence for M={} e={}", m, e);
            assert!(
                (ea - e * ea.sin() - m).abs() < 1.0E-7,
                "kepler residual too large for M={} e={}",
                m,
                e
            );
        }
    }

    #[test]
    fn deterministic_propagation() {
        let sv = SV::new(Constellation::GPS, 1);
        let elements = circular_gps_orbit();
        let t = t0() + 3600.0 * Unit::Second;

        let first = propagate(sv, &elements, t).unwrap();
        let second = propagate(sv, &elements, t).unwrap();

        // bit identical, not approximately equal
        assert_eq!(first, second);
    }

    #[test]
    fn circular_orbit_radius_preserved() {
        let sv = SV::new(Constellation::GPS, 1);
        let elements = circular_gps_orbit();

        // 6 hours of propagation
        let t = t0() + 6.0 * Unit::Hour;
        let state = propagate(sv, &elements, t).unwrap();

        let radius = state.position_eci_m.norm();
        assert!(
            (radius - 26_560_000.0).abs() < 1_000.0,
            "radius drifted to {}",
            radius
        );
        assert!(!state.degraded);
    }

    #[test]
    fn velocity_magnitude_is_circular_speed() {
        let sv = SV::new(Constellation::GPS, 7);
        let elements = circular_gps_orbit();

        let state = propagate(sv, &elements, t0() + 300.0 * Unit::Second).unwrap();

        let expected = (EARTH_GRAVITATION_MU_M3_S2 / 26_560_000.0_f64).sqrt();
        assert!(
            (state.velocity_eci_m_s.norm() - expected).abs() < 5.0,
            "velocity {} expected {}",
            state.velocity_eci_m_s.norm(),
            expected
        );
    }

    #[test]
    fn invalid_elements_rejected() {
        let sv = SV::new(Constellation::GPS, 1);
        let mut elements = circular_gps_orbit();
        elements.eccentricity = 1.5;

        assert_eq!(
            propagate(sv, &elements, t0()),
            Err(Error::InvalidEphemeris)
        );
    }
}
