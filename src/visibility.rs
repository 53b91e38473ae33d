//! Look angles, visibility masking and signal quality estimation.
use nalgebra::Vector3;

use crate::{
    constants::L1_FREQUENCY_HZ,
    frames,
    prelude::{Error, SatelliteState},
};

/// Nominal L1 link budget (EIRP + antenna figures), tuned so a zenith
/// pass at GPS altitude lands near 45 dB-Hz.
const L1_LINK_BUDGET_DB: f64 = 224.0;

/// Observer to satellite geometry, from the observer topocentric frame.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct LookAngles {
    /// Azimuth, clockwise from north (decimal degrees, [0, 360))
    pub azimuth_deg: f64,
    /// Elevation above the local horizon (decimal degrees)
    pub elevation_deg: f64,
    /// Slant range (meters)
    pub range_m: f64,
    /// Range rate, positive receding (m/s)
    pub range_rate_m_s: f64,
}

/// Computes [LookAngles] between a fixed observer and one satellite state.
pub fn look_angles(
    observer_ecef_m: Vector3<f64>,
    state: &SatelliteState,
) -> Result<LookAngles, Error> {
    let enu = frames::ecef_to_enu(observer_ecef_m, state.position_ecef_m)?;
    let range_m = enu.norm();

    let elevation_deg = (enu[2] / range_m).asin().to_degrees();
    let azimuth_deg = enu[0].atan2(enu[1]).to_degrees().rem_euclid(360.0);

    // observer is static in the fixed frame: range rate is the
    // satellite velocity projected on the line of sight
    let los = (state.position_ecef_m - observer_ecef_m) / range_m;
    let range_rate_m_s = state.velocity_ecef_m_s.dot(&los);

    Ok(LookAngles {
        azimuth_deg,
        elevation_deg,
        range_m,
        range_rate_m_s,
    })
}

/// A satellite is visible iff its elevation exceeds the mask angle.
/// Below the horizon is never visible, whatever the mask says.
pub fn is_visible(angles: &LookAngles, mask_angle_deg: f64) -> bool {
    angles.elevation_deg >= 0.0 && angles.elevation_deg > mask_angle_deg
}

/// C/N0 estimate from a free space path loss budget, plus a mild
/// antenna roll-off towards the horizon. Monotonically decreasing in
/// range and increasing in elevation. Only ever used to weight
/// measurements, never as ground truth.
pub fn signal_strength_dbhz(angles: &LookAngles) -> f64 {
    let fspl_db =
        20.0 * angles.range_m.log10() + 20.0 * L1_FREQUENCY_HZ.log10() - 147.55;

    let rolloff_db = 3.0 * angles.elevation_deg.max(0.0).to_radians().sin();

    L1_LINK_BUDGET_DB - fspl_db + rolloff_db
}
