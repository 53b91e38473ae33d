//! Engine configuration: every recognized option, with defaults.
#[cfg(feature = "serde")]
use serde::Deserialize;

use crate::prelude::{Duration, Environment, Error};

fn default_mask_angle_deg() -> f64 {
    5.0
}

fn default_max_satellites() -> usize {
    12
}

fn default_max_iterations() -> usize {
    10
}

fn default_convergence_m() -> f64 {
    1.0E-3
}

fn default_max_condition_number() -> f64 {
    1.0E10
}

fn default_max_correction_age() -> Duration {
    Duration::from_seconds(10.0)
}

fn default_ratio_threshold() -> f64 {
    3.0
}

fn default_cycle_slip_threshold_cycles() -> f64 {
    0.5
}

fn default_enabled() -> bool {
    true
}

fn default_intensity() -> f64 {
    1.0
}

fn default_seed() -> u64 {
    42
}

/// Least squares solver options.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct SolverOpts {
    /// Iteration cap of the solving loop. Reaching it flags the
    /// solution as degraded instead of discarding it.
    #[cfg_attr(feature = "serde", serde(default = "default_max_iterations"))]
    pub max_iterations: usize,
    /// Position correction norm below which iteration stops (meters)
    #[cfg_attr(feature = "serde", serde(default = "default_convergence_m"))]
    pub convergence_m: f64,
    /// Geometries whose normal matrix conditioning exceeds this are
    /// rejected before inversion is even attempted.
    #[cfg_attr(feature = "serde", serde(default = "default_max_condition_number"))]
    pub max_condition_number: f64,
}

impl Default for SolverOpts {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            convergence_m: default_convergence_m(),
            max_condition_number: default_max_condition_number(),
        }
    }
}

/// Differential processing options. The thresholds are tunables,
/// not physical constants: adjust them to the application.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct RtkOpts {
    /// Corrections older than this are rejected and the rover falls
    /// back to standalone solving.
    #[cfg_attr(feature = "serde", serde(default = "default_max_correction_age"))]
    pub max_correction_age: Duration,
    /// Minimal second-best over best residual ratio for an integer
    /// candidate to be accepted as fixed.
    #[cfg_attr(feature = "serde", serde(default = "default_ratio_threshold"))]
    pub ratio_threshold: f64,
    /// Double difference phase jump, in cycles, beyond which a cycle
    /// slip is declared and ambiguities reset to float.
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_cycle_slip_threshold_cycles")
    )]
    pub cycle_slip_threshold_cycles: f64,
}

impl Default for RtkOpts {
    fn default() -> Self {
        Self {
            max_correction_age: default_max_correction_age(),
            ratio_threshold: default_ratio_threshold(),
            cycle_slip_threshold_cycles: default_cycle_slip_threshold_cycles(),
        }
    }
}

/// Error model suite configuration: per model enable flags,
/// environment class and intensity scaling.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct BiasConfig {
    /// Ionospheric + tropospheric delays
    #[cfg_attr(feature = "serde", serde(default = "default_enabled"))]
    pub atmosphere: bool,
    /// Environment dependent multipath noise
    #[cfg_attr(feature = "serde", serde(default = "default_enabled"))]
    pub multipath: bool,
    /// Receiver clock random walk
    #[cfg_attr(feature = "serde", serde(default = "default_enabled"))]
    pub clock: bool,
    /// Signal quality scaled thermal noise
    #[cfg_attr(feature = "serde", serde(default = "default_enabled"))]
    pub receiver_noise: bool,
    /// Synthesize one stable integer carrier ambiguity per satellite
    /// track. Off by default: raw phase is then unambiguous truth.
    #[cfg_attr(feature = "serde", serde(default))]
    pub synthesize_ambiguities: bool,
    /// Reflection [Environment] for the multipath model
    #[cfg_attr(feature = "serde", serde(default))]
    pub environment: Environment,
    /// Global scaling of every perturbation magnitude
    #[cfg_attr(feature = "serde", serde(default = "default_intensity"))]
    pub intensity: f64,
    /// Seed of the perturbation draws: identical seed and inputs
    /// reproduce identical measurements.
    #[cfg_attr(feature = "serde", serde(default = "default_seed"))]
    pub seed: u64,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            atmosphere: default_enabled(),
            multipath: default_enabled(),
            clock: default_enabled(),
            receiver_noise: default_enabled(),
            synthesize_ambiguities: false,
            environment: Environment::default(),
            intensity: default_intensity(),
            seed: default_seed(),
        }
    }
}

impl BiasConfig {
    /// Every model off: measurements pass through untouched.
    pub fn disabled() -> Self {
        Self {
            atmosphere: false,
            multipath: false,
            clock: false,
            receiver_noise: false,
            synthesize_ambiguities: false,
            environment: Environment::default(),
            intensity: default_intensity(),
            seed: default_seed(),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct Config {
    /// Minimal elevation for a satellite to contribute (decimal
    /// degrees). Below the horizon is always excluded, whatever
    /// this is set to.
    #[cfg_attr(feature = "serde", serde(default = "default_mask_angle_deg"))]
    pub mask_angle_deg: f64,
    /// When more satellites than this are visible, the best
    /// elevations win (ties broken by ascending SV).
    #[cfg_attr(feature = "serde", serde(default = "default_max_satellites"))]
    pub max_satellites: usize,
    /// Solver customization
    #[cfg_attr(feature = "serde", serde(default))]
    pub solver: SolverOpts,
    /// Differential processing customization
    #[cfg_attr(feature = "serde", serde(default))]
    pub rtk: RtkOpts,
    /// Error model suite customization
    #[cfg_attr(feature = "serde", serde(default))]
    pub bias: BiasConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mask_angle_deg: default_mask_angle_deg(),
            max_satellites: default_max_satellites(),
            solver: SolverOpts::default(),
            rtk: RtkOpts::default(),
            bias: BiasConfig::default(),
        }
    }
}

impl Config {
    /// Rejects out of range values. Runs once at load time so
    /// per-tick code never revalidates.
    pub fn validate(&self) -> Result<(), Error> {
        if !(-90.0..=90.0).contains(&self.mask_angle_deg) {
            return Err(Error::InvalidConfig(format!(
                "mask angle {}° out of [-90, 90]",
                self.mask_angle_deg
            )));
        }

        if self.max_satellites < 4 {
            return Err(Error::InvalidConfig(
                "at least 4 satellites are required to solve".to_string(),
            ));
        }

        if self.solver.max_iterations == 0 {
            return Err(Error::InvalidConfig("iteration cap must be > 0".to_string()));
        }

        if self.solver.convergence_m <= 0.0 {
            return Err(Error::InvalidConfig(
                "convergence threshold must be > 0".to_string(),
            ));
        }

        if self.rtk.max_correction_age <= Duration::ZERO {
            return Err(Error::InvalidConfig(
                "correction max age must be > 0".to_string(),
            ));
        }

        if self.rtk.ratio_threshold < 1.0 {
            return Err(Error::InvalidConfig(
                "ratio threshold below 1.0 would accept any candidate".to_string(),
            ));
        }

        if self.bias.intensity < 0.0 {
            return Err(Error::InvalidConfig(
                "bias intensity must be >= 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());

        assert_eq!(cfg.mask_angle_deg, 5.0);
        assert_eq!(cfg.rtk.max_correction_age, Duration::from_seconds(10.0));
        assert_eq!(cfg.rtk.ratio_threshold, 3.0);
    }

    #[test]
    fn out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.mask_angle_deg = 95.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.max_satellites = 3;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.rtk.ratio_threshold = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    #[cfg(feature = "serde")]
    fn unknown_fields_rejected_at_load() {
        let content = serde_json::json!({
            "mask_angle_deg": 10.0,
            "unknown_option": true,
        });
        assert!(serde_json::from_value::<Config>(content).is_err());
    }

    #[test]
    #[cfg(feature = "serde")]
    fn partial_content_takes_defaults() {
        let content = serde_json::json!({
            "mask_angle_deg": 10.0,
        });
        let cfg: Config = serde_json::from_value(content).unwrap();
        assert_eq!(cfg.mask_angle_deg, 10.0);
        assert_eq!(cfg.max_satellites, default_max_satellites());
    }
}
