#![doc = include_str!("../README.md")]

extern crate gnss_rs as gnss;

// private modules
mod bias;
mod cfg;
mod constants;
mod constellation;
mod engine;
mod ephemeris;
mod error;
mod frames;
mod measurement;
mod observer;
mod propagator;
mod rtk;
mod solver;
mod visibility;

#[cfg(test)]
mod tests;

// prelude
pub mod prelude {
    pub use crate::bias::{BiasModel, BiasSuite, Environment, RuntimeParam};
    pub use crate::cfg::{BiasConfig, Config, RtkOpts, SolverOpts};
    pub use crate::constellation::{ConstellationSet, Snapshot};
    pub use crate::engine::{
        Engine, ObserverSolution, SolutionOutput, TickOutput, VisibilityRecord,
    };
    pub use crate::ephemeris::{OrbitalElements, WalkerShell};
    pub use crate::error::Error;
    pub use crate::frames::{
        earth_rotation_angle_rad, ecef_to_eci, ecef_to_enu, ecef_to_geodetic, eci_to_ecef,
        eci_velocity_to_ecef, geodetic_to_ecef, GeodeticCoords,
    };
    pub use crate::measurement::{measure, PseudorangeMeasurement};
    pub use crate::observer::{Observer, ObserverId, Role};
    pub use crate::propagator::{propagate, SatelliteState};
    pub use crate::rtk::{
        corrections_from_base, process_epoch, AmbiguityState, AmbiguityStatus, CorrectionSet,
        DifferentialCorrection, RtkSolution,
    };
    pub use crate::solver::{solve, DilutionOfPrecision, PositionSolution, SolutionKind};
    pub use crate::visibility::{is_visible, look_angles, signal_strength_dbhz, LookAngles};
    // re-export
    pub use gnss::prelude::{Constellation, SV};
    pub use hifitime::{Duration, Epoch, TimeScale, Unit};
    pub use nalgebra::Vector3;
}
