//! Stateless frame conversions: inertial, Earth fixed, geodetic, topocentric.
use nalgebra::{Matrix3, Vector3};

use crate::{
    constants::{
        EARTH_ANGULAR_VEL_RAD_S, EARTH_ECCENTRICITY_SQ_WGS84, EARTH_SEMI_MAJOR_AXIS_WGS84_M,
    },
    prelude::{Epoch, Error},
};

/// Geodetic coordinates on the WGS84 ellipsoid.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct GeodeticCoords {
    /// Latitude (decimal degrees)
    pub latitude_deg: f64,
    /// Longitude (decimal degrees)
    pub longitude_deg: f64,
    /// Height above the ellipsoid (meters)
    pub altitude_m: f64,
}

impl GeodeticCoords {
    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            altitude_m,
        }
    }
}

fn validated(v: Vector3<f64>) -> Result<Vector3<f64>, Error> {
    if v.iter().all(|c| c.is_finite()) {
        Ok(v)
    } else {
        Err(Error::NonFiniteInput)
    }
}

/// Earth rotation angle at `t`, in radians, accumulated from the
/// J2000 reference epoch. Purely a function of time: two calls with
/// the same [Epoch] return the same angle.
pub fn earth_rotation_angle_rad(t: Epoch) -> f64 {
    let j2000 = Epoch::from_gregorian_tai(2000, 1, 1, 12, 0, 0, 0);
    let dt_s = (t - j2000).to_seconds();
    (EARTH_ANGULAR_VEL_RAD_S * dt_s).rem_euclid(2.0 * std::f64::consts::PI)
}

/// Rotation matrix from inertial to Earth fixed frame, for the
/// given Earth rotation angle.
fn eci_to_ecef_matrix(era_rad: f64) -> Matrix3<f64> {
    let (sin_e, cos_e) = era_rad.sin_cos();
    Matrix3::new(
        cos_e, sin_e, 0.0, //
        -sin_e, cos_e, 0.0, //
        0.0, 0.0, 1.0,
    )
}

/// Converts an inertial position to the Earth fixed frame.
pub fn eci_to_ecef(r_eci_m: Vector3<f64>, era_rad: f64) -> Result<Vector3<f64>, Error> {
    let r = validated(r_eci_m)?;
    Ok(eci_to_ecef_matrix(era_rad) * r)
}

/// Converts an Earth fixed position to the inertial frame.
pub fn ecef_to_eci(r_ecef_m: Vector3<f64>, era_rad: f64) -> Result<Vector3<f64>, Error> {
    let r = validated(r_ecef_m)?;
    Ok(eci_to_ecef_matrix(era_rad).transpose() * r)
}

/// Converts an inertial velocity to the Earth fixed frame,
/// including the frame rotation (transport) term.
pub fn eci_velocity_to_ecef(
    r_eci_m: Vector3<f64>,
    v_eci_m_s: Vector3<f64>,
    era_rad: f64,
) -> Result<Vector3<f64>, Error> {
    let r = validated(r_eci_m)?;
    let v = validated(v_eci_m_s)?;
    let rot = eci_to_ecef_matrix(era_rad);
    let omega = Vector3::new(0.0, 0.0, EARTH_ANGULAR_VEL_RAD_S);
    Ok(rot * v - omega.cross(&(rot * r)))
}

/// Converts Earth fixed cartesian coordinates to geodetic coordinates
/// on the WGS84 ellipsoid (Bowring style iteration).
pub fn ecef_to_geodetic(r_ecef_m: Vector3<f64>) -> Result<GeodeticCoords, Error> {
    let r = validated(r_ecef_m)?;
    let (x, y, z) = (r[0], r[1], r[2]);

    let a = EARTH_SEMI_MAJOR_AXIS_WGS84_M;
    let e2 = EARTH_ECCENTRICITY_SQ_WGS84;

    let longitude = y.atan2(x);
    let p = (x * x + y * y).sqrt();

    // polar singularity
    if p < 1.0E-9 {
        let b = a * (1.0 - e2).sqrt();
        return Ok(GeodeticCoords::new(
            90.0_f64.copysign(z),
            longitude.to_degrees(),
            z.abs() - b,
        ));
    }

    let mut latitude = (z / (p * (1.0 - e2))).atan();
    let mut altitude = 0.0;

    for _ in 0..5 {
        let sin_lat = latitude.sin();
        let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        altitude = p / latitude.cos() - n;
        latitude = (z / (p * (1.0 - e2 * n / (n + altitude)))).atan();
    }

    Ok(GeodeticCoords::new(
        latitude.to_degrees(),
        longitude.to_degrees(),
        altitude,
    ))
}

/// Converts geodetic coordinates to Earth fixed cartesian coordinates.
pub fn geodetic_to_ecef(geo: GeodeticCoords) -> Result<Vector3<f64>, Error> {
    let lat = geo.latitude_deg.to_radians();
    let long = geo.longitude_deg.to_radians();

    if !lat.is_finite() || !long.is_finite() || !geo.altitude_m.is_finite() {
        return Err(Error::NonFiniteInput);
    }

    let a = EARTH_SEMI_MAJOR_AXIS_WGS84_M;
    let e2 = EARTH_ECCENTRICITY_SQ_WGS84;

    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_long, cos_long) = long.sin_cos();

    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();

    Ok(Vector3::new(
        (n + geo.altitude_m) * cos_lat * cos_long,
        (n + geo.altitude_m) * cos_lat * sin_long,
        (n * (1.0 - e2) + geo.altitude_m) * sin_lat,
    ))
}

/// Rotation from Earth fixed deltas to the local East/North/Up frame
/// at the given geodetic latitude and longitude.
pub(crate) fn enu_rotation(lat_rad: f64, long_rad: f64) -> Matrix3<f64> {
    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let (sin_long, cos_long) = long_rad.sin_cos();
    Matrix3::new(
        -sin_long,
        cos_long,
        0.0,
        -sin_lat * cos_long,
        -sin_lat * sin_long,
        cos_lat,
        cos_lat * cos_long,
        cos_lat * sin_long,
        sin_lat,
    )
}

/// Expresses `target` in the topocentric East/North/Up frame
/// centered on `observer` (both Earth fixed, meters).
pub fn ecef_to_enu(
    observer_ecef_m: Vector3<f64>,
    target_ecef_m: Vector3<f64>,
) -> Result<Vector3<f64>, Error> {
    let observer = validated(observer_ecef_m)?;
    let target = validated(target_ecef_m)?;

    let geo = ecef_to_geodetic(observer)?;
    let rot = enu_rotation(geo.latitude_deg.to_radians(), geo.longitude_deg.to_radians());

    Ok(rot * (target - observer))
}
