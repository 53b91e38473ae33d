/// Earth angular velocity, in WGS84 frame rad/s
pub const EARTH_ANGULAR_VEL_RAD_S: f64 = 7.2921151467E-5;

/// Earth gravitational constant (m^3 s-2)
pub const EARTH_GRAVITATION_MU_M3_S2: f64 = 3.986004418E14;

/// WGS84 Earth Frame Ellipsoid semi-major axis (meters)
pub const EARTH_SEMI_MAJOR_AXIS_WGS84_M: f64 = 6378137.0_f64;

/// WGS84 Earth Frame Ellipsoid flattening
pub const EARTH_FLATTENING_WGS84: f64 = 1.0 / 298.257223563;

/// WGS84 first eccentricity squared
pub const EARTH_ECCENTRICITY_SQ_WGS84: f64 =
    EARTH_FLATTENING_WGS84 * (2.0 - EARTH_FLATTENING_WGS84);

/// Earth second zonal harmonic (oblateness)
pub const EARTH_J2: f64 = 1.08262668E-3;

/// Speed of light in m.s⁻¹
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// L1 carrier frequency (Hz)
pub const L1_FREQUENCY_HZ: f64 = 1_575.42E6;

/// L1 carrier wavelength (meters)
pub const L1_WAVELENGTH_M: f64 = SPEED_OF_LIGHT_M_S / L1_FREQUENCY_HZ;

/// Mean ionospheric shell height (meters), used by the obliquity mapping
pub const IONO_SHELL_HEIGHT_M: f64 = 350_000.0;
