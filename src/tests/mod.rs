//! End to end scenarios, driven through the public [Engine] surface.
mod determinism;

use log::LevelFilter;
use std::str::FromStr;
use std::sync::Once;

use nalgebra::Vector3;

use crate::prelude::{
    BiasConfig, Config, Constellation, ConstellationSet, Engine, Epoch, Observer, WalkerShell,
};

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::builder()
            .is_test(true)
            .filter_level(LevelFilter::Debug)
            .init();
    });
}

/// Reference epoch shared by every scenario.
pub fn reference_epoch() -> Epoch {
    Epoch::from_str("2020-06-25T00:00:00 GPST").unwrap()
}

/// Greenwich equator reference site, on the ellipsoid.
pub const BASE_COORDS_ECEF_M: (f64, f64, f64) = (6_378_137.0, 0.0, 0.0);

/// One kilometer east of the reference site.
pub const ROVER_COORDS_ECEF_M: (f64, f64, f64) = (6_378_137.0, 1_000.0, 0.0);

pub fn base_position() -> Vector3<f64> {
    Vector3::new(BASE_COORDS_ECEF_M.0, BASE_COORDS_ECEF_M.1, BASE_COORDS_ECEF_M.2)
}

pub fn rover_position() -> Vector3<f64> {
    Vector3::new(
        ROVER_COORDS_ECEF_M.0,
        ROVER_COORDS_ECEF_M.1,
        ROVER_COORDS_ECEF_M.2,
    )
}

/// Engine over a GPS like shell, error models off: observables are
/// exact geometry.
pub fn noiseless_engine() -> Engine {
    let mut cfg = Config::default();
    cfg.bias = BiasConfig::disabled();
    engine_with(cfg)
}

/// Engine over a GPS like shell, with the given [Config].
pub fn engine_with(cfg: Config) -> Engine {
    let mut engine = Engine::new(cfg).unwrap();
    let shell = WalkerShell::gps_like(reference_epoch());
    engine.add_constellation(
        ConstellationSet::from_walker("gps", Constellation::GPS, &shell).unwrap(),
    );
    engine
}

/// Base + linked rover over the 1 km test baseline.
pub fn add_baseline_pair(engine: &mut Engine) {
    engine.add_observer(Observer::base(1, base_position()));
    engine.add_observer(Observer::rover(2, rover_position(), 1));
}
