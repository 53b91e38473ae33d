use thiserror::Error;

use crate::prelude::{Duration, ObserverId, SV};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Frame conversions reject vectors carrying NaN or infinite
    /// components before any arithmetic happens.
    #[error("non finite input vector")]
    NonFiniteInput,

    /// Orbital elements do not describe a closed Earth orbit
    /// (semi-major axis below surface, eccentricity out of [0, 1),
    /// or non finite angles).
    #[error("invalid orbital elements")]
    InvalidEphemeris,

    /// No orbital elements are registered for the requested satellite.
    /// The satellite is excluded from the tick, nothing else is affected.
    #[error("{0}: no orbital elements")]
    MissingEphemeris(SV),

    /// Fewer than 4 usable measurements: no solution is formed
    /// for this observer, this tick.
    #[error("not enough usable measurements")]
    NotEnoughMeasurements,

    /// The geometry matrix is too ill-conditioned to invert safely.
    /// Solving is abandoned rather than risking a fabricated solution.
    #[error("ill conditioned geometry")]
    DegenerateGeometry,

    #[error("failed to invert matrix")]
    MatrixInversion,

    /// Corrections aged beyond the configured limit. Non fatal:
    /// the rover falls back to standalone solving.
    #[error("corrections are {0} old (max {1})")]
    CorrectionStaleness(Duration, Duration),

    /// A correction set older than the last accepted one was offered.
    /// It is rejected, the previous set remains in effect.
    #[error("non monotonic correction set")]
    NonMonotonicCorrections,

    /// The ratio test did not clear the configured threshold.
    /// Non fatal: the solution is returned with float status.
    #[error("ambiguity resolution failed (ratio {0:.2})")]
    AmbiguityResolution(f64),

    /// Iteration cap reached without convergence. The best iterate
    /// is still returned, flagged as degraded.
    #[error("iteration cap reached without convergence")]
    NumericalDivergence,

    #[error("unknown observer #{0}")]
    UnknownObserver(ObserverId),

    /// A rover must be linked to a base site to process differentially.
    #[error("observer #{0} is not linked to any base")]
    MissingBase(ObserverId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
