//! Integer ambiguity resolution: decorrelation and lattice search.
use nalgebra::{DMatrix, DVector};

use crate::prelude::Error;

/// Outcome of one integer search over a float ambiguity vector.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IntegerOutcome {
    /// Best integer candidate, back in the original ambiguity space
    pub integers: DVector<i64>,

    /// Second best over best candidate residual ratio. The caller
    /// decides acceptance against its configured threshold.
    pub ratio: f64,
}

/// One recorded unimodular step: a[j] -= mu * a[i]. Being integer,
/// it can be undone exactly on integer candidates.
struct GaussStep {
    i: usize,
    j: usize,
    mu: f64,
}

/// Integer Gauss decorrelation sweeps over the covariance. Returns
/// the transformed float vector, covariance, and the recorded steps.
fn decorrelate(
    float: &DVector<f64>,
    q: &DMatrix<f64>,
) -> (DVector<f64>, DMatrix<f64>, Vec<GaussStep>) {
    let ndf = float.nrows();

    let mut a = float.clone();
    let mut qz = q.clone();
    let mut steps = Vec::new();

    for _ in 0..ndf {
        let mut changed = false;

        for i in 0..ndf {
            if qz[(i, i)] <= 0.0 {
                continue;
            }

            for j in 0..ndf {
                if i == j {
                    continue;
                }

                let mu = (qz[(j, i)] / qz[(i, i)]).round();
                if mu == 0.0 || !mu.is_finite() {
                    continue;
                }

                // qz <- T qz Tᵀ with T = I - mu e_j e_iᵀ
                for k in 0..ndf {
                    qz[(j, k)] -= mu * qz[(i, k)];
                }
                for k in 0..ndf {
                    qz[(k, j)] -= mu * qz[(k, i)];
                }

                a[j] -= mu * a[i];
                steps.push(GaussStep { i, j, mu });
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    (a, qz, steps)
}

/// Weighted squared distance of an integer candidate to the float
/// estimate.
fn residual(a: &DVector<f64>, z: &DVector<f64>, q_inv: &DMatrix<f64>) -> f64 {
    let d = a - z;
    (d.transpose() * q_inv * &d)[(0, 0)]
}

/// Searches the integer lattice nearest the decorrelated float
/// estimate: plain rounding, every single component neighbor, and
/// the paired neighbors of the two most ambiguous components.
fn candidates(a: &DVector<f64>) -> Vec<DVector<f64>> {
    let ndf = a.nrows();
    let rounded = a.map(|v| v.round());

    let mut set = vec![rounded.clone()];

    for k in 0..ndf {
        for step in [-1.0, 1.0] {
            let mut candidate = rounded.clone();
            candidate[k] += step;
            set.push(candidate);
        }
    }

    // two components the rounding is least sure about
    let mut by_fraction: Vec<usize> = (0..ndf).collect();
    by_fraction.sort_by(|&lhs, &rhs| {
        let f = |k: usize| (a[k] - a[k].round()).abs();
        f(rhs)
            .partial_cmp(&f(lhs))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if ndf >= 2 {
        let (first, second) = (by_fraction[0], by_fraction[1]);
        for first_step in [-1.0, 1.0] {
            for second_step in [-1.0, 1.0] {
                let mut candidate = rounded.clone();
                candidate[first] += first_step;
                candidate[second] += second_step;
                set.push(candidate);
            }
        }
    }

    set
}

/// Resolves integer ambiguities nearest to `float`, with covariance
/// `q`. Returns the best candidate and the ratio the caller gates
/// acceptance on. Never upgrades on its own: ratio evaluation is
/// the caller's decision.
pub(crate) fn resolve(float: &DVector<f64>, q: &DMatrix<f64>) -> Result<IntegerOutcome, Error> {
    let ndf = float.nrows();
    if ndf == 0 || q.nrows() != ndf || q.ncols() != ndf {
        return Err(Error::AmbiguityResolution(0.0));
    }

    let (a, qz, steps) = decorrelate(float, q);

    let qz_inv = qz.try_inverse().ok_or(Error::MatrixInversion)?;

    let mut best: Option<(f64, DVector<f64>)> = None;
    let mut second_best: Option<f64> = None;

    for candidate in candidates(&a) {
        let s = residual(&a, &candidate, &qz_inv);

        match &best {
            Some((s_best, z_best)) => {
                if candidate == *z_best {
                    continue;
                }
                if s < *s_best {
                    second_best = Some(*s_best);
                    best = Some((s, candidate));
                } else if second_best.map_or(true, |s_2nd| s < s_2nd) {
                    second_best = Some(s);
                }
            },
            None => {
                best = Some((s, candidate));
            },
        }
    }

    let (s_best, z_best) = best.ok_or(Error::AmbiguityResolution(0.0))?;
    let s_second = second_best.ok_or(Error::AmbiguityResolution(0.0))?;

    let ratio = s_second / s_best.max(1.0E-12);

    // undo the unimodular steps, in reverse, to return to the
    // original ambiguity space
    let mut integers = z_best;
    for step in steps.iter().rev() {
        let correction = step.mu * integers[step.i];
        integers[step.j] += correction;
    }

    Ok(IntegerOutcome {
        integers: integers.map(|v| v.round() as i64),
        ratio,
    })
}
