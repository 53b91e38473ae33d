//! Positioning endpoints: base stations, rovers, standalone receivers.
use nalgebra::Vector3;

/// Observer identifier, unique within one [crate::prelude::Engine].
pub type ObserverId = u32;

/// Receiver role. A closed set: behavior is dispatched by matching,
/// a rover only holds the id of its reference site, resolved by
/// lookup at processing time, never owned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    /// Reference site with a surveyed position, generates corrections
    Base,
    /// Mobile receiver consuming corrections from its linked base
    Rover {
        /// Id of the linked [Role::Base] observer
        base: ObserverId,
    },
    /// Receiver solving standalone, no differential processing
    Standalone,
}

/// A positioning endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Observer {
    /// Identifier, referenced by rover linkage
    pub id: ObserverId,
    /// Ground truth position, Earth fixed (meters). In a simulation
    /// this is where synthetic measurements originate; solvers only
    /// ever use it as an initial seed.
    pub position_ecef_m: Vector3<f64>,
    /// [Role] of this endpoint
    pub role: Role,
}

impl Observer {
    pub fn base(id: ObserverId, position_ecef_m: Vector3<f64>) -> Self {
        Self {
            id,
            position_ecef_m,
            role: Role::Base,
        }
    }

    pub fn rover(id: ObserverId, position_ecef_m: Vector3<f64>, base: ObserverId) -> Self {
        Self {
            id,
            position_ecef_m,
            role: Role::Rover { base },
        }
    }

    pub fn standalone(id: ObserverId, position_ecef_m: Vector3<f64>) -> Self {
        Self {
            id,
            position_ecef_m,
            role: Role::Standalone,
        }
    }

    /// Linked base id, for rovers.
    pub fn base_link(&self) -> Option<ObserverId> {
        match self.role {
            Role::Rover { base } => Some(base),
            _ => None,
        }
    }
}
