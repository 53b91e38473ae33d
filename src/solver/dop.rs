use nalgebra::{DMatrix, Matrix3};

use crate::frames;

/// Dilution of precision figures, extracted from the inverted
/// normal matrix of a solve.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DilutionOfPrecision {
    /// Geometric DOP
    pub gdop: f64,

    /// Horizontal DOP
    pub hdop: f64,

    /// Vertical DOP
    pub vdop: f64,

    /// Temporal DOP
    pub tdop: f64,
}

impl DilutionOfPrecision {
    /// Position block of q rotated into the local East/North/Up frame.
    pub(crate) fn q_enu(q: &DMatrix<f64>, lat_rad: f64, long_rad: f64) -> Matrix3<f64> {
        let q_3 = Matrix3::new(
            q[(0, 0)],
            q[(0, 1)],
            q[(0, 2)],
            q[(1, 0)],
            q[(1, 1)],
            q[(1, 2)],
            q[(2, 0)],
            q[(2, 1)],
            q[(2, 2)],
        );

        let r = frames::enu_rotation(lat_rad, long_rad);
        r * q_3 * r.transpose()
    }

    /// Creates new [DilutionOfPrecision].
    ///
    /// ## Input
    /// - q = (HᵀWH)⁻¹ matrix, 4x4
    /// - geodetic latitude and longitude of the solved position (radians)
    pub(crate) fn new(q: &DMatrix<f64>, lat_rad: f64, long_rad: f64) -> Self {
        let q_enu = Self::q_enu(q, lat_rad, long_rad);

        Self {
            gdop: q.trace().sqrt(),
            tdop: q[(3, 3)].sqrt(),
            vdop: q_enu[(2, 2)].sqrt(),
            hdop: (q_enu[(0, 0)] + q_enu[(1, 1)]).sqrt(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn identity_normal_matrix() {
        let q = DMatrix::<f64>::identity(4, 4);
        let dop = DilutionOfPrecision::new(&q, 0.0, 0.0);

        assert!((dop.gdop - 2.0).abs() < 1.0E-9);
        assert!((dop.tdop - 1.0).abs() < 1.0E-9);
        assert!((dop.hdop - 2.0_f64.sqrt()).abs() < 1.0E-9);
        assert!((dop.vdop - 1.0).abs() < 1.0E-9);
    }
}
