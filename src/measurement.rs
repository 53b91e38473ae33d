//! Synthetic signal observations, formed fresh every tick.
use crate::{
    bias::{BiasSuite, RuntimeParam},
    constants::L1_WAVELENGTH_M,
    prelude::{Config, Epoch, Observer, Snapshot, SV},
    visibility,
};

/// One satellite to observer range observation, L1, possibly perturbed
/// by the error model suite. Never persisted past the tick it was
/// generated on.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PseudorangeMeasurement {
    /// Observed [SV]
    pub sv: SV,
    /// Sampling [Epoch]
    pub epoch: Epoch,
    /// Pseudo range (meters)
    pub pseudo_range_m: f64,
    /// Ambiguous carrier phase, when tracked (L1 cycles)
    pub carrier_phase_cycles: Option<f64>,
    /// Estimated C/N0 (dB-Hz)
    pub snr_dbhz: f64,
    /// Elevation at sampling (decimal degrees)
    pub elevation_deg: f64,
    /// Azimuth at sampling (decimal degrees)
    pub azimuth_deg: f64,
}

/// 1-σ code noise for the given signal quality, used both for solver
/// weighting and receiver noise synthesis. 0.3 m at the 45 dB-Hz
/// reference, growing as the signal fades.
pub(crate) fn measurement_sigma_m(snr_dbhz: f64) -> f64 {
    const REFERENCE_SNR_DBHZ: f64 = 45.0;
    const FLOOR_M: f64 = 0.3;

    FLOOR_M * 10.0_f64.powf((REFERENCE_SNR_DBHZ - snr_dbhz) / 20.0)
}

/// Forms one [PseudorangeMeasurement] per satellite visible from
/// `observer`, perturbed by `suite`. Satellites are walked in
/// ascending [SV] order so perturbation draws are reproducible
/// for identical seeds and inputs.
pub fn measure(
    observer: &Observer,
    snapshot: &Snapshot,
    cfg: &Config,
    suite: &mut BiasSuite,
) -> Vec<PseudorangeMeasurement> {
    let mut measurements = Vec::new();

    let apriori_geo = match crate::frames::ecef_to_geodetic(observer.position_ecef_m) {
        Ok(geo) => (geo.latitude_deg, geo.longitude_deg, geo.altitude_m),
        Err(_) => return measurements,
    };

    for sv in snapshot.sv_sorted() {
        let state = match snapshot.state(sv) {
            Some(state) => state,
            None => continue,
        };

        let angles = match visibility::look_angles(observer.position_ecef_m, state) {
            Ok(angles) => angles,
            Err(_) => continue,
        };

        if !visibility::is_visible(&angles, cfg.mask_angle_deg) {
            continue;
        }

        let snr_dbhz = visibility::signal_strength_dbhz(&angles);

        let mut measurement = PseudorangeMeasurement {
            sv,
            epoch: snapshot.epoch,
            pseudo_range_m: angles.range_m,
            carrier_phase_cycles: Some(angles.range_m / L1_WAVELENGTH_M),
            snr_dbhz,
            elevation_deg: angles.elevation_deg,
            azimuth_deg: angles.azimuth_deg,
        };

        let prm = RuntimeParam {
            epoch: snapshot.epoch,
            observer: observer.id,
            elevation_deg: angles.elevation_deg,
            azimuth_deg: angles.azimuth_deg,
            snr_dbhz,
            range_m: angles.range_m,
            apriori_geo,
        };

        suite.perturb(&mut measurement, &prm);
        measurements.push(measurement);
    }

    measurements
}
