//! Standalone position solving: weighted iterative least squares.
use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Vector3};

use crate::{
    frames,
    measurement::{measurement_sigma_m, PseudorangeMeasurement},
    prelude::{Config, Epoch, Error, GeodeticCoords, Snapshot},
};

mod dop;
pub use dop::DilutionOfPrecision;

/// Solution quality flag, published with every solution.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SolutionKind {
    /// Standalone pseudo range solution
    Spp,
    /// Code solution sharpened by differential corrections
    Dgps,
    /// Carrier solution, ambiguities still floating
    RtkFloat,
    /// Carrier solution, ambiguities fixed to integers
    RtkFixed,
}

impl std::fmt::Display for SolutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Spp => write!(f, "SPP"),
            Self::Dgps => write!(f, "DGPS"),
            Self::RtkFloat => write!(f, "RTK-FLOAT"),
            Self::RtkFixed => write!(f, "RTK-FIXED"),
        }
    }
}

/// A computed receiver position at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSolution {
    /// [Epoch] of the solution
    pub epoch: Epoch,
    /// Solved position, Earth fixed (meters)
    pub position_ecef_m: Vector3<f64>,
    /// Solved position, geodetic
    pub geodetic: GeodeticCoords,
    /// Receiver clock bias (meters of delay)
    pub clock_bias_m: f64,
    /// 1-σ accuracy estimate, East/North/Up (meters)
    pub accuracy_1sigma_m: Vector3<f64>,
    /// Quality flag
    pub kind: SolutionKind,
    /// Number of satellites that contributed
    pub satellites_used: usize,
    /// Dilution of precision figures
    pub dop: DilutionOfPrecision,
    /// Iteration cap reached before the correction norm dropped
    /// below the threshold: treat with reduced confidence.
    pub degraded: bool,
}

/// Applies the elevation mask, then keeps the best
/// `cfg.max_satellites` measurements: highest elevation first,
/// ties broken by ascending [SV](crate::prelude::SV) so selection
/// is deterministic.
pub(crate) fn select<'a>(
    measurements: &'a [PseudorangeMeasurement],
    cfg: &Config,
) -> Vec<&'a PseudorangeMeasurement> {
    let mut usable: Vec<&PseudorangeMeasurement> = measurements
        .iter()
        .filter(|m| m.elevation_deg >= 0.0 && m.elevation_deg > cfg.mask_angle_deg)
        .collect();

    usable.sort_by(|a, b| {
        b.elevation_deg
            .partial_cmp(&a.elevation_deg)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.sv.cmp(&b.sv))
    });

    usable.truncate(cfg.max_satellites);
    usable
}

/// Solves one standalone position from pseudo ranges and the tick's
/// satellite states, seeded at `seed_ecef_m`.
pub fn solve(
    measurements: &[PseudorangeMeasurement],
    snapshot: &Snapshot,
    seed_ecef_m: Vector3<f64>,
    cfg: &Config,
) -> Result<PositionSolution, Error> {
    let selected = select(measurements, cfg);
    solve_selected(&selected, snapshot, seed_ecef_m, cfg, SolutionKind::Spp)
}

/// Inner solving loop, shared with the differential processor
/// (which preselects and relabels the solution kind).
pub(crate) fn solve_selected(
    selected: &[&PseudorangeMeasurement],
    snapshot: &Snapshot,
    seed_ecef_m: Vector3<f64>,
    cfg: &Config,
    kind: SolutionKind,
) -> Result<PositionSolution, Error> {
    // pair each measurement with its propagated state, dropping
    // orphans (their satellite was excluded from this tick)
    let pairs: Vec<(&PseudorangeMeasurement, Vector3<f64>)> = selected
        .iter()
        .filter_map(|m| {
            snapshot
                .state(m.sv)
                .map(|state| (*m, state.position_ecef_m))
        })
        .collect();

    let size = pairs.len();
    if size < 4 {
        return Err(Error::NotEnoughMeasurements);
    }

    let mut position = seed_ecef_m;
    let mut clock_bias_m = 0.0_f64;
    let mut q = DMatrix::<f64>::zeros(4, 4);
    let mut geometry_normal = DMatrix::<f64>::zeros(4, 4);
    let mut converged = false;

    for nth in 0..cfg.solver.max_iterations {
        let mut h = DMatrix::<f64>::zeros(size, 4);
        let mut b = DVector::<f64>::zeros(size);
        let mut w = DVector::<f64>::zeros(size);

        for (i, (measurement, sat_position)) in pairs.iter().enumerate() {
            let los = sat_position - position;
            let range = los.norm();
            let unit = los / range;

            h[(i, 0)] = -unit[0];
            h[(i, 1)] = -unit[1];
            h[(i, 2)] = -unit[2];
            h[(i, 3)] = 1.0;

            let sigma = measurement_sigma_m(measurement.snr_dbhz);
            w[i] = 1.0 / (sigma * sigma);

            b[i] = measurement.pseudo_range_m - (range + clock_bias_m);
        }

        let w_mat = DMatrix::from_diagonal(&w);
        let ht = h.transpose();
        let normal = &ht * &w_mat * &h;
        geometry_normal = &ht * &h;

        // conditioning guard, before any inversion is attempted
        let singular = normal.clone().svd(false, false).singular_values;
        let (s_max, s_min) = (singular.max(), singular.min());
        if s_min <= 0.0 || s_max / s_min > cfg.solver.max_condition_number {
            return Err(Error::DegenerateGeometry);
        }

        q = normal.try_inverse().ok_or(Error::MatrixInversion)?;
        let dx = &q * (&ht * &w_mat * &b);

        let correction = Vector3::new(dx[0], dx[1], dx[2]);
        position += correction;
        clock_bias_m += dx[3];

        if correction.norm() < cfg.solver.convergence_m {
            debug!("{}: converged in {} iterations", snapshot.epoch, nth + 1);
            converged = true;
            break;
        }
    }

    if !converged {
        // solution is kept, flagged: never silently discarded
        warn!(
            "{}: {} after {} iterations",
            snapshot.epoch,
            Error::NumericalDivergence,
            cfg.solver.max_iterations
        );
    }

    let geodetic = frames::ecef_to_geodetic(position)?;
    let (lat_rad, long_rad) = (
        geodetic.latitude_deg.to_radians(),
        geodetic.longitude_deg.to_radians(),
    );

    // DOP is a property of the geometry alone, weights kept out
    let geometry_q = geometry_normal
        .try_inverse()
        .ok_or(Error::MatrixInversion)?;
    let dop = DilutionOfPrecision::new(&geometry_q, lat_rad, long_rad);

    // the weighted covariance already carries the measurement
    // variances: its diagonal is the accuracy estimate
    let q_enu = DilutionOfPrecision::q_enu(&q, lat_rad, long_rad);
    let accuracy_1sigma_m = Vector3::new(
        q_enu[(0, 0)].sqrt(),
        q_enu[(1, 1)].sqrt(),
        q_enu[(2, 2)].sqrt(),
    );

    Ok(PositionSolution {
        epoch: snapshot.epoch,
        position_ecef_m: position,
        geodetic,
        clock_bias_m,
        accuracy_1sigma_m,
        kind,
        satellites_used: size,
        dop,
        degraded: !converged,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::{Constellation, SatelliteState, SV};
    use std::str::FromStr;

    fn t0() -> Epoch {
        Epoch::from_str("2020-06-25T00:00:00 GPST").unwrap()
    }

    fn state_at(sv: SV, ecef: Vector3<f64>) -> SatelliteState {
        SatelliteState {
            sv,
            epoch: t0(),
            position_eci_m: ecef,
            velocity_eci_m_s: Vector3::zeros(),
            position_ecef_m: ecef,
            velocity_ecef_m_s: Vector3::zeros(),
            geodetic: GeodeticCoords::default(),
            degraded: false,
        }
    }

    /// Four satellites spread above the receiver, noiseless ranges.
    fn noiseless_scene(receiver: Vector3<f64>) -> (Snapshot, Vec<PseudorangeMeasurement>) {
        let altitude = 26_560_000.0_f64;
        let sat_positions = [
            Vector3::new(altitude, 0.0, 0.0),
            Vector3::new(altitude * 0.7, altitude * 0.6, 0.0),
            Vector3::new(altitude * 0.7, -altitude * 0.3, altitude * 0.5),
            Vector3::new(altitude * 0.8, 0.2 * altitude, -altitude * 0.5),
            Vector3::new(altitude * 0.6, -altitude * 0.5, -altitude * 0.3),
        ];

        let mut snapshot = Snapshot::default();
        snapshot.epoch = t0();
        let mut measurements = Vec::new();

        for (nth, sat_position) in sat_positions.iter().enumerate() {
            let sv = SV::new(Constellation::GPS, nth as u8 + 1);
            snapshot.insert_state(state_at(sv, *sat_position));

            let enu = crate::frames::ecef_to_enu(receiver, *sat_position).unwrap();
            let range = (sat_position - receiver).norm();

            measurements.push(PseudorangeMeasurement {
                sv,
                epoch: t0(),
                pseudo_range_m: range,
                carrier_phase_cycles: None,
                snr_dbhz: 45.0,
                elevation_deg: (enu[2] / enu.norm()).asin().to_degrees(),
                azimuth_deg: 0.0,
            });
        }

        (snapshot, measurements)
    }

    #[test]
    fn noiseless_recovery_within_1mm() {
        let receiver = Vector3::new(6_378_137.0, 0.0, 0.0);
        let (snapshot, measurements) = noiseless_scene(receiver);

        let cfg = Config::default();
        let seed = receiver + Vector3::new(10_000.0, -5_000.0, 8_000.0);

        let solution = solve(&measurements, &snapshot, seed, &cfg).unwrap();

        let error = (solution.position_ecef_m - receiver).norm();
        assert!(error < 1.0E-3, "position error {} above 1mm", error);
        assert!(!solution.degraded);
        assert_eq!(solution.kind, SolutionKind::Spp);

        assert!(solution.dop.gdop.is_finite());
        assert!(solution.dop.gdop > 0.0);
    }

    #[test]
    fn three_measurements_is_geometry_error() {
        let receiver = Vector3::new(6_378_137.0, 0.0, 0.0);
        let (snapshot, mut measurements) = noiseless_scene(receiver);
        measurements.truncate(3);

        let cfg = Config::default();
        let status = solve(&measurements, &snapshot, receiver, &cfg);

        assert_eq!(status, Err(Error::NotEnoughMeasurements));
    }

    #[test]
    fn collinear_geometry_rejected() {
        // all satellites stacked along one axis: unsolvable geometry
        let receiver = Vector3::new(6_378_137.0, 0.0, 0.0);

        let mut snapshot = Snapshot::default();
        snapshot.epoch = t0();
        let mut measurements = Vec::new();

        for nth in 0..5_u8 {
            let sv = SV::new(Constellation::GPS, nth + 1);
            let sat_position = Vector3::new(26_560_000.0 + nth as f64 * 1_000.0, 0.0, 0.0);
            snapshot.insert_state(state_at(sv, sat_position));

            measurements.push(PseudorangeMeasurement {
                sv,
                epoch: t0(),
                pseudo_range_m: (sat_position - receiver).norm(),
                carrier_phase_cycles: None,
                snr_dbhz: 45.0,
                elevation_deg: 90.0,
                azimuth_deg: 0.0,
            });
        }

        let cfg = Config::default();
        assert_eq!(
            solve(&measurements, &snapshot, receiver, &cfg),
            Err(Error::DegenerateGeometry)
        );
    }

    #[test]
    fn selection_is_deterministic() {
        let make = |prn: u8, elevation_deg: f64| PseudorangeMeasurement {
            sv: SV::new(Constellation::GPS, prn),
            epoch: t0(),
            pseudo_range_m: 22_000_000.0,
            carrier_phase_cycles: None,
            snr_dbhz: 45.0,
            elevation_deg,
            azimuth_deg: 0.0,
        };

        let measurements = vec![
            make(7, 40.0),
            make(3, 40.0),
            make(5, 80.0),
            make(9, 2.0),  // below mask
            make(1, -5.0), // below horizon
        ];

        let mut cfg = Config::default();
        cfg.max_satellites = 2;

        let selected = select(&measurements, &cfg);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].sv.prn, 5);
        // equal elevations tie broken by ascending SV
        assert_eq!(selected[1].sv.prn, 3);
    }
}
