//! Differential processing: base corrections, double differences,
//! integer ambiguity resolution.
use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Vector3};

use std::collections::BTreeMap;

use crate::{
    bias::{self, RuntimeParam},
    constants::L1_WAVELENGTH_M,
    frames,
    measurement::PseudorangeMeasurement,
    prelude::{
        BiasConfig, Config, Duration, Epoch, Error, Observer, ObserverId, PositionSolution,
        Snapshot, SolutionKind, SV,
    },
    solver::{self, DilutionOfPrecision},
};

mod double_diff;
mod lambda;

use double_diff::DoubleDifferences;

/// Nominal 1-σ East/North/Up accuracy class of a fixed solution (m)
const FIXED_ACCURACY_1SIGMA_M: Vector3<f64> = Vector3::new(0.01, 0.01, 0.02);

/// Nominal 1-σ East/North/Up accuracy class of a float solution (m)
const FLOAT_ACCURACY_1SIGMA_M: Vector3<f64> = Vector3::new(0.2, 0.2, 0.4);

/// Base station derived correction for one satellite: the gap
/// between the geometric and the observed range at a surveyed site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferentialCorrection {
    /// Corrected [SV]
    pub sv: SV,
    /// Correction to add to a measured pseudo range (meters)
    pub range_correction_m: f64,
    /// Correction drift, from successive base updates (m/s).
    /// Consumers extrapolate over the correction age with it.
    pub range_rate_correction_m_s: f64,
    /// Modeled ionospheric share of the correction (meters)
    pub iono_m: f64,
    /// Modeled tropospheric share of the correction (meters)
    pub tropo_m: f64,
    /// Generation [Epoch]
    pub generated_at: Epoch,
}

/// One base update cycle's corrections. Written by the base's update
/// cycle only; every consuming rover works on its own copy.
#[derive(Debug, Clone, Default)]
pub struct CorrectionSet {
    /// Producing base site
    pub base: ObserverId,
    /// Generation [Epoch] of the whole set
    pub generated_at: Epoch,
    corrections: BTreeMap<SV, DifferentialCorrection>,
}

impl CorrectionSet {
    /// Correction for one [SV], if the base tracked it.
    pub fn correction(&self, sv: SV) -> Option<&DifferentialCorrection> {
        self.corrections.get(&sv)
    }

    /// Iterates over the contained corrections, ascending [SV].
    pub fn iter(&self) -> impl Iterator<Item = &DifferentialCorrection> {
        self.corrections.values()
    }

    /// Set age relative to `now`.
    pub fn age(&self, now: Epoch) -> Duration {
        now - self.generated_at
    }

    pub fn len(&self) -> usize {
        self.corrections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }
}

/// Derives one [CorrectionSet] from the base site's measurements of
/// this tick. Passing the previous set lets the range rate component
/// be estimated from successive updates.
pub fn corrections_from_base(
    base: &Observer,
    measurements: &[PseudorangeMeasurement],
    snapshot: &Snapshot,
    bias_cfg: &BiasConfig,
    previous: Option<&CorrectionSet>,
) -> CorrectionSet {
    let generated_at = snapshot.epoch;
    let mut corrections = BTreeMap::new();

    let apriori_geo = frames::ecef_to_geodetic(base.position_ecef_m)
        .map(|geo| (geo.latitude_deg, geo.longitude_deg, geo.altitude_m))
        .unwrap_or_default();

    for measurement in measurements {
        let state = match snapshot.state(measurement.sv) {
            Some(state) => state,
            None => continue,
        };

        let geometric_m = (state.position_ecef_m - base.position_ecef_m).norm();
        let range_correction_m = geometric_m - measurement.pseudo_range_m;

        let range_rate_correction_m_s = previous
            .and_then(|set| {
                let prev = set.correction(measurement.sv)?;
                let dt_s = (generated_at - set.generated_at).to_seconds();
                if dt_s > 0.0 {
                    Some((range_correction_m - prev.range_correction_m) / dt_s)
                } else {
                    None
                }
            })
            .unwrap_or(0.0);

        let prm = RuntimeParam {
            epoch: generated_at,
            observer: base.id,
            elevation_deg: measurement.elevation_deg,
            azimuth_deg: measurement.azimuth_deg,
            snr_dbhz: measurement.snr_dbhz,
            range_m: measurement.pseudo_range_m,
            apriori_geo,
        };
        let (iono_m, tropo_m) = bias::modeled_atmosphere(&prm, bias_cfg);

        corrections.insert(
            measurement.sv,
            DifferentialCorrection {
                sv: measurement.sv,
                range_correction_m,
                range_rate_correction_m_s,
                iono_m,
                tropo_m,
                generated_at,
            },
        );
    }

    CorrectionSet {
        base: base.id,
        generated_at,
        corrections,
    }
}

/// Whether the baseline ambiguities are resolved to integers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AmbiguityStatus {
    /// Ambiguities still floating: decimeter-grade baseline
    Float,
    /// Ambiguities fixed to integers: centimeter-grade baseline
    Fixed,
}

/// Integer ambiguity knowledge for one rover/base baseline,
/// persisted across epochs while the satellite set and baseline
/// stay stable. A cycle slip, a common set change or a backward
/// time jump resets it to float.
#[derive(Debug, Clone, Default)]
pub struct AmbiguityState {
    reference: Option<SV>,
    sv_set: Vec<SV>,
    float_cycles: BTreeMap<SV, f64>,
    fixed_cycles: Option<BTreeMap<SV, i64>>,
    covariance: Option<DMatrix<f64>>,
    ratio: f64,
    valid: bool,
    last_epoch: Option<Epoch>,
    /// Phase minus geometry memory per satellite (cycles):
    /// a jump here reveals a cycle slip
    slip_memory: BTreeMap<SV, f64>,
    last_correction_epoch: Option<Epoch>,
}

impl AmbiguityState {
    /// Drops everything learned about this baseline: the next epoch
    /// starts over at float. Epoch bookkeeping survives the reset.
    pub fn reset(&mut self) {
        let last_epoch = self.last_epoch;
        let last_correction_epoch = self.last_correction_epoch;
        *self = Self::default();
        self.last_epoch = last_epoch;
        self.last_correction_epoch = last_correction_epoch;
    }

    pub fn status(&self) -> AmbiguityStatus {
        if self.fixed_cycles.is_some() {
            AmbiguityStatus::Fixed
        } else {
            AmbiguityStatus::Float
        }
    }

    /// A first valid double difference epoch has been processed.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Latest float estimates, per differenced [SV] (cycles).
    pub fn float_ambiguities(&self) -> &BTreeMap<SV, f64> {
        &self.float_cycles
    }

    /// Fixed integers, once a ratio test passed.
    pub fn fixed_ambiguities(&self) -> Option<&BTreeMap<SV, i64>> {
        self.fixed_cycles.as_ref()
    }
}

/// [PositionSolution] extended with baseline and ambiguity metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RtkSolution {
    /// The underlying solution, kind flagged per outcome
    pub solution: PositionSolution,
    /// Baseline from base to rover, Earth fixed (meters)
    pub baseline_m: Vector3<f64>,
    /// Baseline length (meters)
    pub baseline_length_m: f64,
    /// [AmbiguityStatus] this epoch ended on
    pub ambiguity: AmbiguityStatus,
    /// Age of the consumed corrections at solve time
    pub correction_age: Duration,
    /// Ratio of the last integer search, when one ran
    pub ratio: Option<f64>,
    /// Non fatal degradation hit while forming this solution:
    /// stale corrections, failed ratio test. Reported, never
    /// silently upgraded away.
    pub degradation: Option<Error>,
}

struct DdEntry {
    sv: SV,
    code_m: f64,
    phase_cycles: f64,
    elevation_deg: f64,
}

fn phase_entries(dd: &DoubleDifferences) -> Vec<DdEntry> {
    dd.inner
        .iter()
        .filter_map(|(sv, entry)| {
            entry.phase_cycles.map(|phase_cycles| DdEntry {
                sv: *sv,
                code_m: entry.code_m,
                phase_cycles,
                elevation_deg: entry.elevation_deg,
            })
        })
        .collect()
}

/// Double differenced geometric range and its gradient with respect
/// to the rover position.
fn dd_geometry(
    sv: SV,
    reference: SV,
    rover_position: Vector3<f64>,
    base_position: Vector3<f64>,
    snapshot: &Snapshot,
) -> Result<(f64, Vector3<f64>), Error> {
    let sat = snapshot.state(sv).ok_or(Error::MissingEphemeris(sv))?;
    let reference_sat = snapshot
        .state(reference)
        .ok_or(Error::MissingEphemeris(reference))?;

    let to_sat = sat.position_ecef_m - rover_position;
    let range = to_sat.norm();
    let unit = to_sat / range;

    let to_reference = reference_sat.position_ecef_m - rover_position;
    let reference_range = to_reference.norm();
    let reference_unit = to_reference / reference_range;

    let base_range = (sat.position_ecef_m - base_position).norm();
    let base_reference_range = (reference_sat.position_ecef_m - base_position).norm();

    let dd = (range - base_range) - (reference_range - base_reference_range);
    let gradient = reference_unit - unit;

    Ok((dd, gradient))
}

fn dd_code_sigma_m(elevation_deg: f64) -> f64 {
    0.6 / elevation_deg.to_radians().sin().max(0.1)
}

fn dd_phase_sigma_cycles(elevation_deg: f64) -> f64 {
    0.01 / elevation_deg.to_radians().sin().max(0.1)
}

struct FloatFit {
    position_ecef_m: Vector3<f64>,
    float_cycles: DVector<f64>,
    covariance: DMatrix<f64>,
    degraded: bool,
}

/// Estimates the rover position and float ambiguities over the code
/// and phase double differences, by iterative weighted least squares.
fn float_solution(
    entries: &[DdEntry],
    reference: SV,
    rover_seed: Vector3<f64>,
    base_position: Vector3<f64>,
    snapshot: &Snapshot,
    cfg: &Config,
) -> Result<FloatFit, Error> {
    let ndf = entries.len();
    let rows = 2 * ndf;
    let cols = 3 + ndf;

    let mut position = rover_seed;

    // seed each ambiguity from the phase/geometry gap
    let mut ambiguities = DVector::<f64>::zeros(ndf);
    for (k, entry) in entries.iter().enumerate() {
        let (geometry, _) = dd_geometry(entry.sv, reference, position, base_position, snapshot)?;
        ambiguities[k] = entry.phase_cycles - geometry / L1_WAVELENGTH_M;
    }

    let mut q = DMatrix::<f64>::zeros(cols, cols);
    let mut converged = false;

    for _ in 0..cfg.solver.max_iterations {
        let mut h = DMatrix::<f64>::zeros(rows, cols);
        let mut w = DVector::<f64>::zeros(rows);
        let mut b = DVector::<f64>::zeros(rows);

        for (k, entry) in entries.iter().enumerate() {
            let (geometry, gradient) =
                dd_geometry(entry.sv, reference, position, base_position, snapshot)?;

            let code_row = 2 * k;
            h[(code_row, 0)] = gradient[0];
            h[(code_row, 1)] = gradient[1];
            h[(code_row, 2)] = gradient[2];
            b[code_row] = entry.code_m - geometry;
            let code_sigma = dd_code_sigma_m(entry.elevation_deg);
            w[code_row] = 1.0 / (code_sigma * code_sigma);

            let phase_row = 2 * k + 1;
            h[(phase_row, 0)] = gradient[0] / L1_WAVELENGTH_M;
            h[(phase_row, 1)] = gradient[1] / L1_WAVELENGTH_M;
            h[(phase_row, 2)] = gradient[2] / L1_WAVELENGTH_M;
            h[(phase_row, 3 + k)] = 1.0;
            b[phase_row] =
                entry.phase_cycles - (geometry / L1_WAVELENGTH_M + ambiguities[k]);
            let phase_sigma = dd_phase_sigma_cycles(entry.elevation_deg);
            w[phase_row] = 1.0 / (phase_sigma * phase_sigma);
        }

        let w_mat = DMatrix::from_diagonal(&w);
        let ht = h.transpose();
        let normal = &ht * &w_mat * &h;

        let singular = normal.clone().svd(false, false).singular_values;
        let (s_max, s_min) = (singular.max(), singular.min());
        if s_min <= 0.0 || s_max / s_min > cfg.solver.max_condition_number {
            return Err(Error::DegenerateGeometry);
        }

        q = normal.try_inverse().ok_or(Error::MatrixInversion)?;
        let dx = &q * (&ht * &w_mat * &b);

        let correction = Vector3::new(dx[0], dx[1], dx[2]);
        position += correction;
        for k in 0..ndf {
            ambiguities[k] += dx[3 + k];
        }

        if correction.norm() < cfg.solver.convergence_m {
            converged = true;
            break;
        }
    }

    Ok(FloatFit {
        position_ecef_m: position,
        float_cycles: ambiguities,
        covariance: q.view((3, 3), (ndf, ndf)).into_owned(),
        degraded: !converged,
    })
}

/// Refines the rover position from phase only, ambiguities held at
/// their fixed integers. This is what makes the fixed solution
/// centimetric.
fn fixed_solution(
    entries: &[DdEntry],
    integers: &BTreeMap<SV, i64>,
    reference: SV,
    rover_seed: Vector3<f64>,
    base_position: Vector3<f64>,
    snapshot: &Snapshot,
    cfg: &Config,
) -> Result<(Vector3<f64>, bool), Error> {
    let rows = entries.len();
    if rows < 3 {
        return Err(Error::NotEnoughMeasurements);
    }

    let mut position = rover_seed;
    let mut converged = false;

    for _ in 0..cfg.solver.max_iterations {
        let mut h = DMatrix::<f64>::zeros(rows, 3);
        let mut w = DVector::<f64>::zeros(rows);
        let mut b = DVector::<f64>::zeros(rows);

        for (k, entry) in entries.iter().enumerate() {
            let n = *integers
                .get(&entry.sv)
                .ok_or(Error::AmbiguityResolution(0.0))? as f64;

            let (geometry, gradient) =
                dd_geometry(entry.sv, reference, position, base_position, snapshot)?;

            h[(k, 0)] = gradient[0];
            h[(k, 1)] = gradient[1];
            h[(k, 2)] = gradient[2];
            b[k] = (entry.phase_cycles - n) * L1_WAVELENGTH_M - geometry;

            let sigma_m = dd_phase_sigma_cycles(entry.elevation_deg) * L1_WAVELENGTH_M;
            w[k] = 1.0 / (sigma_m * sigma_m);
        }

        let w_mat = DMatrix::from_diagonal(&w);
        let ht = h.transpose();
        let normal = &ht * &w_mat * &h;

        let singular = normal.clone().svd(false, false).singular_values;
        let (s_max, s_min) = (singular.max(), singular.min());
        if s_min <= 0.0 || s_max / s_min > cfg.solver.max_condition_number {
            return Err(Error::DegenerateGeometry);
        }

        let q = normal.try_inverse().ok_or(Error::MatrixInversion)?;
        let dx = &q * (&ht * &w_mat * &b);

        let correction = Vector3::new(dx[0], dx[1], dx[2]);
        position += correction;

        if correction.norm() < cfg.solver.convergence_m {
            converged = true;
            break;
        }
    }

    Ok((position, !converged))
}

/// Wraps an RTK estimate into a [PositionSolution]. Receiver clocks
/// cancelled in the double differences, so no clock bias is reported.
fn build_solution(
    position: Vector3<f64>,
    kind: SolutionKind,
    used: &[SV],
    snapshot: &Snapshot,
    accuracy_1sigma_m: Vector3<f64>,
    degraded: bool,
) -> Result<PositionSolution, Error> {
    let geodetic = frames::ecef_to_geodetic(position)?;

    let mut h = DMatrix::<f64>::zeros(used.len(), 4);
    for (k, sv) in used.iter().enumerate() {
        let state = snapshot.state(*sv).ok_or(Error::MissingEphemeris(*sv))?;
        let los = state.position_ecef_m - position;
        let unit = los / los.norm();
        h[(k, 0)] = -unit[0];
        h[(k, 1)] = -unit[1];
        h[(k, 2)] = -unit[2];
        h[(k, 3)] = 1.0;
    }

    let normal = h.transpose() * &h;
    let q = normal.try_inverse().ok_or(Error::MatrixInversion)?;

    let dop = DilutionOfPrecision::new(
        &q,
        geodetic.latitude_deg.to_radians(),
        geodetic.longitude_deg.to_radians(),
    );

    Ok(PositionSolution {
        epoch: snapshot.epoch,
        position_ecef_m: position,
        geodetic,
        clock_bias_m: 0.0,
        accuracy_1sigma_m,
        kind,
        satellites_used: used.len(),
        dop,
        degraded,
    })
}

fn wrap(
    solution: PositionSolution,
    base_position: Vector3<f64>,
    ambiguity: AmbiguityStatus,
    correction_age: Duration,
    ratio: Option<f64>,
    degradation: Option<Error>,
) -> RtkSolution {
    let baseline_m = solution.position_ecef_m - base_position;
    RtkSolution {
        baseline_length_m: baseline_m.norm(),
        baseline_m,
        ambiguity,
        correction_age,
        ratio,
        degradation,
        solution,
    }
}

/// Watches the per satellite phase/geometry gap; a jump beyond the
/// configured threshold is a cycle slip and resets the ambiguities.
fn detect_cycle_slips(
    entries: &[DdEntry],
    reference: SV,
    rover_position: Vector3<f64>,
    base_position: Vector3<f64>,
    snapshot: &Snapshot,
    cfg: &Config,
    state: &mut AmbiguityState,
) {
    let mut slipped = false;

    let mut memory = BTreeMap::new();
    for entry in entries {
        let (geometry, _) = match dd_geometry(
            entry.sv,
            reference,
            rover_position,
            base_position,
            snapshot,
        ) {
            Ok(geometry) => geometry,
            Err(_) => continue,
        };

        let gap = entry.phase_cycles - geometry / L1_WAVELENGTH_M;
        if let Some(last) = state.slip_memory.get(&entry.sv) {
            if (gap - last).abs() > cfg.rtk.cycle_slip_threshold_cycles {
                warn!("{}({}): cycle slip detected", snapshot.epoch, entry.sv);
                slipped = true;
            }
        }
        memory.insert(entry.sv, gap);
    }

    if slipped && state.valid {
        state.reset();
    }
    state.slip_memory = memory;
}

/// Processes one differential epoch for a rover/base pair.
///
/// Stale (or out of order) corrections degrade to standalone solving,
/// flagged [SolutionKind::Spp]. Too little common carrier degrades to
/// [SolutionKind::Dgps]. Otherwise double differences are formed,
/// float ambiguities estimated, and integers searched; the ratio test
/// gates [SolutionKind::RtkFixed]: a failed test is reported and the
/// solution stays [SolutionKind::RtkFloat].
#[allow(clippy::too_many_arguments)]
pub fn process_epoch(
    rover: &Observer,
    base: &Observer,
    rover_measurements: &[PseudorangeMeasurement],
    base_measurements: &[PseudorangeMeasurement],
    corrections: &CorrectionSet,
    snapshot: &Snapshot,
    cfg: &Config,
    state: &mut AmbiguityState,
) -> Result<RtkSolution, Error> {
    let epoch = snapshot.epoch;

    if let Some(last) = state.last_epoch {
        if epoch < last {
            warn!("{}: backward time jump, ambiguities reset", epoch);
            state.reset();
        }
    }
    state.last_epoch = Some(epoch);

    // correction stream gating: monotonicity first, then age
    let mut rejection = None;
    if let Some(last) = state.last_correction_epoch {
        if corrections.generated_at < last {
            rejection = Some(Error::NonMonotonicCorrections);
        }
    }

    let age = corrections.age(epoch);

    if rejection.is_none() {
        state.last_correction_epoch = Some(corrections.generated_at);
        if age > cfg.rtk.max_correction_age {
            rejection = Some(Error::CorrectionStaleness(age, cfg.rtk.max_correction_age));
        }
    }

    if let Some(cause) = rejection {
        warn!("{}: {} - degrading to standalone", epoch, cause);
        let solution = solver::solve(rover_measurements, snapshot, rover.position_ecef_m, cfg)?;
        return Ok(wrap(
            solution,
            base.position_ecef_m,
            AmbiguityStatus::Float,
            age,
            None,
            Some(cause),
        ));
    }

    // corrections are fresh: apply them to the rover code, with the
    // rate component extrapolated over the age
    let age_s = age.to_seconds();
    let corrected: Vec<PseudorangeMeasurement> = rover_measurements
        .iter()
        .map(|measurement| {
            let mut corrected = *measurement;
            if let Some(correction) = corrections.correction(measurement.sv) {
                corrected.pseudo_range_m += correction.range_correction_m
                    + correction.range_rate_correction_m_s * age_s;
            }
            corrected
        })
        .collect();

    // double differences over the raw observables: clock terms
    // cancel there, corrections would only get in the way
    let dd = DoubleDifferences::form(rover_measurements, base_measurements);

    let dd = match dd {
        Some(dd) if dd.phase_ndf() >= 3 => dd,
        _ => {
            debug!("{}: not enough common carrier, DGPS only", epoch);
            let selected = solver::select(&corrected, cfg);
            let solution = solver::solve_selected(
                &selected,
                snapshot,
                rover.position_ecef_m,
                cfg,
                SolutionKind::Dgps,
            )?;
            return Ok(wrap(
                solution,
                base.position_ecef_m,
                AmbiguityStatus::Float,
                age,
                None,
                None,
            ));
        },
    };

    let entries = phase_entries(&dd);
    let sv_set = dd.phase_sv_sorted();

    if state.valid && (state.reference != Some(dd.reference) || state.sv_set != sv_set) {
        debug!("{}: common satellite set changed, ambiguities reset", epoch);
        state.reset();
    }

    detect_cycle_slips(
        &entries,
        dd.reference,
        rover.position_ecef_m,
        base.position_ecef_m,
        snapshot,
        cfg,
        state,
    );

    let mut used = sv_set.clone();
    used.push(dd.reference);

    // persisted integers survive while the set stays stable:
    // no re-search, straight to the precise baseline
    if let Some(integers) = state.fixed_cycles.clone() {
        let (position, degraded) = fixed_solution(
            &entries,
            &integers,
            dd.reference,
            rover.position_ecef_m,
            base.position_ecef_m,
            snapshot,
            cfg,
        )?;

        let solution = build_solution(
            position,
            SolutionKind::RtkFixed,
            &used,
            snapshot,
            FIXED_ACCURACY_1SIGMA_M,
            degraded,
        )?;

        return Ok(wrap(
            solution,
            base.position_ecef_m,
            AmbiguityStatus::Fixed,
            age,
            Some(state.ratio),
            None,
        ));
    }

    // float ambiguities and their covariance
    let float_fit = float_solution(
        &entries,
        dd.reference,
        rover.position_ecef_m,
        base.position_ecef_m,
        snapshot,
        cfg,
    )?;

    state.reference = Some(dd.reference);
    state.sv_set = sv_set.clone();
    state.float_cycles = sv_set
        .iter()
        .zip(float_fit.float_cycles.iter())
        .map(|(sv, n)| (*sv, *n))
        .collect();
    state.covariance = Some(float_fit.covariance.clone());
    state.valid = true;

    // integer search then ratio test: fixed status has to be earned
    let outcome = match lambda::resolve(&float_fit.float_cycles, &float_fit.covariance) {
        Ok(outcome) if outcome.ratio >= cfg.rtk.ratio_threshold => outcome,
        Ok(outcome) => {
            let cause = Error::AmbiguityResolution(outcome.ratio);
            debug!("{}: {} - staying float", epoch, cause);
            let solution = build_solution(
                float_fit.position_ecef_m,
                SolutionKind::RtkFloat,
                &used,
                snapshot,
                FLOAT_ACCURACY_1SIGMA_M,
                float_fit.degraded,
            )?;
            return Ok(wrap(
                solution,
                base.position_ecef_m,
                AmbiguityStatus::Float,
                age,
                Some(outcome.ratio),
                Some(cause),
            ));
        },
        Err(cause) => {
            debug!("{}: {} - staying float", epoch, cause);
            let solution = build_solution(
                float_fit.position_ecef_m,
                SolutionKind::RtkFloat,
                &used,
                snapshot,
                FLOAT_ACCURACY_1SIGMA_M,
                float_fit.degraded,
            )?;
            return Ok(wrap(
                solution,
                base.position_ecef_m,
                AmbiguityStatus::Float,
                age,
                None,
                Some(cause),
            ));
        },
    };

    let integers: BTreeMap<SV, i64> = sv_set
        .iter()
        .zip(outcome.integers.iter())
        .map(|(sv, n)| (*sv, *n))
        .collect();

    let (position, degraded) = fixed_solution(
        &entries,
        &integers,
        dd.reference,
        float_fit.position_ecef_m,
        base.position_ecef_m,
        snapshot,
        cfg,
    )?;

    debug!("{}: ambiguities fixed, ratio {:.1}", epoch, outcome.ratio);
    state.fixed_cycles = Some(integers);
    state.ratio = outcome.ratio;

    let solution = build_solution(
        position,
        SolutionKind::RtkFixed,
        &used,
        snapshot,
        FIXED_ACCURACY_1SIGMA_M,
        degraded,
    )?;

    Ok(wrap(
        solution,
        base.position_ecef_m,
        AmbiguityStatus::Fixed,
        age,
        Some(outcome.ratio),
        None,
    ))
}
