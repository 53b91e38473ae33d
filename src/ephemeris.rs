//! Keplerian orbital elements and synthetic constellation seeding.
use crate::{
    constants::{EARTH_GRAVITATION_MU_M3_S2, EARTH_SEMI_MAJOR_AXIS_WGS84_M},
    prelude::{Duration, Epoch, Error},
};

use std::f64::consts::TAU;

/// Keplerian description of one satellite orbit at a reference epoch.
/// Immutable once registered: superseding elements fully replace
/// the previous record, they are never merged.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OrbitalElements {
    /// Semi-major axis (meters)
    pub sma_m: f64,
    /// Eccentricity, in [0, 1)
    pub eccentricity: f64,
    /// Inclination (radians)
    pub inclination_rad: f64,
    /// Right ascension of the ascending node (radians)
    pub raan_rad: f64,
    /// Argument of perigee (radians)
    pub arg_perigee_rad: f64,
    /// Mean anomaly at epoch (radians)
    pub mean_anomaly_rad: f64,
    /// Reference [Epoch] of these elements
    pub epoch: Epoch,
}

impl OrbitalElements {
    /// Mean motion (rad/s)
    pub fn mean_motion_rad_s(&self) -> f64 {
        (EARTH_GRAVITATION_MU_M3_S2 / self.sma_m.powi(3)).sqrt()
    }

    /// Orbital period
    pub fn orbital_period(&self) -> Duration {
        Duration::from_seconds(TAU / self.mean_motion_rad_s())
    }

    /// Verifies these elements describe a closed Earth orbit.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sma_m <= EARTH_SEMI_MAJOR_AXIS_WGS84_M {
            return Err(Error::InvalidEphemeris);
        }

        if !(0.0..1.0).contains(&self.eccentricity) {
            return Err(Error::InvalidEphemeris);
        }

        for angle in [
            self.inclination_rad,
            self.raan_rad,
            self.arg_perigee_rad,
            self.mean_anomaly_rad,
        ] {
            if !angle.is_finite() {
                return Err(Error::InvalidEphemeris);
            }
        }

        Ok(())
    }
}

/// Walker style shell description, used to seed synthetic constellations
/// when no external ephemeris source is wired in.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkerShell {
    /// Orbital altitude above the ellipsoid (meters)
    pub altitude_m: f64,
    /// Inclination (decimal degrees)
    pub inclination_deg: f64,
    /// Number of orbital planes
    pub planes: u8,
    /// Satellites per plane
    pub per_plane: u8,
    /// Inter-plane phasing (decimal degrees)
    pub phasing_deg: f64,
    /// Eccentricity of every member orbit
    pub eccentricity: f64,
    /// Reference [Epoch] of the seeded elements
    pub epoch: Epoch,
}

impl WalkerShell {
    /// GPS like shell: 6 planes, 55° inclination, semi-synchronous altitude.
    pub fn gps_like(epoch: Epoch) -> Self {
        Self {
            altitude_m: 20_180_000.0,
            inclination_deg: 55.0,
            planes: 6,
            per_plane: 4,
            phasing_deg: 15.0,
            eccentricity: 0.001,
            epoch,
        }
    }

    /// Seeds one set of [OrbitalElements] per member, planes evenly
    /// spread in right ascension, slots evenly spread in mean anomaly.
    pub fn elements(&self) -> Vec<OrbitalElements> {
        let sma_m = EARTH_SEMI_MAJOR_AXIS_WGS84_M + self.altitude_m;
        let inclination_rad = self.inclination_deg.to_radians();

        let mut elements =
            Vec::with_capacity(self.planes as usize * self.per_plane as usize);

        for plane in 0..self.planes {
            let raan_rad = TAU * (plane as f64) / (self.planes as f64);
            let phasing_rad = self.phasing_deg.to_radians() * (plane as f64);

            for slot in 0..self.per_plane {
                let mean_anomaly_rad =
                    (TAU * (slot as f64) / (self.per_plane as f64) + phasing_rad).rem_euclid(TAU);

                elements.push(OrbitalElements {
                    sma_m,
                    eccentricity: self.eccentricity,
                    inclination_rad,
                    raan_rad,
                    arg_perigee_rad: 0.0,
                    mean_anomaly_rad,
                    epoch: self.epoch,
                });
            }
        }

        elements
    }
}
