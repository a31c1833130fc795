//! # Linear solver and uncertainty propagation
//!
//! Solves the posterior normal equations `M·x = V` and inverts `M` to obtain the parameter
//! covariance.
//!
//! ## Procedure
//!
//! 1. Dimension and finiteness checks on `M` and `V`.
//! 2. `M` is symmetrized, `(M + Mᵗ)/2`.
//! 3. The singular values of `M` give its condition number `s_max / s_min`. A zero or
//!    non-finite smallest value, or a condition number above the configured bound, is a
//!    [`InversionError::SingularSystem`]: the pixel does not carry enough independent
//!    observations.
//! 4. Cholesky factorization gives `x` and `M⁻¹`. If it breaks down (round-off on a nearly
//!    semi-definite matrix), the SVD pseudo-inverse is used instead. Accumulated
//!    information is positive semi-definite, so a negative eigenvalue beyond round-off is an
//!    [`InversionError::NumericAnomaly`].
//! 5. A covariance with NaN entries or a non-positive diagonal is rejected as singular.
//!
//! All arithmetic is `f64`.
use nalgebra::{Cholesky, DMatrix, DVector, Dyn, SymmetricEigen, SVD};
use std::fmt;

use crate::inversion_errors::InversionError;
use crate::normal_equations::symmetrize;

/// Factorization that produced the solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMethod {
    Cholesky,
    PseudoInverse,
}

impl fmt::Display for SolveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveMethod::Cholesky => write!(f, "cholesky"),
            SolveMethod::PseudoInverse => write!(f, "svd pseudo-inverse"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolvedSystem {
    pub parameters: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub method: SolveMethod,
    pub condition_number: f64,
}

/// Condition number `s_max / s_min` of a symmetric matrix (infinite when singular).
pub fn condition_number(m: &DMatrix<f64>) -> f64 {
    let s = SVD::new(symmetrize(m), false, false).singular_values;
    let s_max = s.max();
    let s_min = s.min();
    if s_min > 0.0 {
        s_max / s_min
    } else {
        f64::INFINITY
    }
}

/// Reject a symmetric matrix with an eigenvalue below `−n·ε·max|λ|`.
fn ensure_semi_definite(m: &DMatrix<f64>) -> Result<(), InversionError> {
    let eigenvalues = SymmetricEigen::new(m.clone()).eigenvalues;
    let scale = eigenvalues.iter().fold(0.0f64, |acc, l| acc.max(l.abs()));
    let tolerance = m.nrows() as f64 * f64::EPSILON * scale;
    let lowest = eigenvalues.min();
    if lowest < -tolerance {
        return Err(InversionError::NumericAnomaly(format!(
            "information matrix is indefinite (eigenvalue {lowest:.3e})"
        )));
    }
    Ok(())
}

/// Solve `M·x = V` and return `x` with the covariance `M⁻¹`.
///
/// Arguments
/// -----------------
/// * `m`: information matrix (`N × N`, symmetric positive definite for a solvable pixel).
/// * `v`: right-hand side (`N`).
/// * `max_condition`: largest accepted condition number of `m`.
///
/// Return
/// ----------
/// * `Ok(SolvedSystem)` with the parameters, their covariance and the factorization used.
/// * `Err(InversionError::SingularSystem)` for rank-deficient or ill-conditioned systems.
/// * `Err(InversionError::DimensionMismatch)` / `Err(InversionError::NumericAnomaly)` for
///   malformed input or an indefinite `m`.
pub fn solve_normal_equations(
    m: &DMatrix<f64>,
    v: &DVector<f64>,
    max_condition: f64,
) -> Result<SolvedSystem, InversionError> {
    let n = v.len();
    if m.shape() != (n, n) {
        return Err(InversionError::DimensionMismatch {
            what: "information matrix",
            expected: n,
            found: m.nrows(),
        });
    }
    if n == 0 {
        return Err(InversionError::SingularSystem("empty system".into()));
    }
    if m.iter().chain(v.iter()).any(|x| !x.is_finite()) {
        return Err(InversionError::NumericAnomaly(
            "non-finite entries in normal equations".into(),
        ));
    }

    let m = symmetrize(m);
    let condition = condition_number(&m);
    if !condition.is_finite() || condition > max_condition {
        return Err(InversionError::SingularSystem(format!(
            "condition number {condition:.3e} exceeds {max_condition:.3e}"
        )));
    }

    let (parameters, covariance, method) = match Cholesky::<f64, Dyn>::new(m.clone()) {
        Some(ch) => (ch.solve(v), ch.inverse(), SolveMethod::Cholesky),
        None => {
            ensure_semi_definite(&m)?;
            let pinv = SVD::new(m, true, true)
                .pseudo_inverse(f64::EPSILON)
                .map_err(|e| InversionError::SingularSystem(e.to_string()))?;
            (&pinv * v, pinv, SolveMethod::PseudoInverse)
        }
    };

    if covariance.iter().any(|x| x.is_nan()) || covariance.diagonal().iter().any(|&d| d <= 0.0) {
        return Err(InversionError::SingularSystem(
            "covariance has NaN or non-positive diagonal entries".into(),
        ));
    }
    if parameters.iter().any(|x| !x.is_finite()) {
        return Err(InversionError::NumericAnomaly(
            "non-finite parameters after solve".into(),
        ));
    }

    Ok(SolvedSystem {
        parameters,
        covariance,
        method,
        condition_number: condition,
    })
}

#[cfg(test)]
mod solver_tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd(n: usize) -> DMatrix<f64> {
        let a = DMatrix::from_fn(n, n, |i, j| 1.0 / (1.0 + i as f64 + 2.0 * j as f64));
        a.transpose() * &a + DMatrix::identity(n, n)
    }

    #[test]
    fn test_round_trip() {
        let m = spd(9);
        let x0 = DVector::from_fn(9, |i, _| 0.1 * (i as f64 + 1.0));
        let v = &m * &x0;
        let solved = solve_normal_equations(&m, &v, 1e12).unwrap();
        assert_eq!(solved.method, SolveMethod::Cholesky);
        assert_relative_eq!(solved.parameters, x0, max_relative = 1e-10);
        assert_relative_eq!(&solved.covariance * &m, DMatrix::identity(9, 9), epsilon = 1e-9);
    }

    #[test]
    fn test_rank_deficient_is_singular() {
        let k = DMatrix::from_row_slice(2, 3, &[1.0, 0.2, 0.1, 1.0, 0.3, 0.2]);
        let m = k.transpose() * &k;
        let v = DVector::from_vec(vec![1.0, 0.2, 0.1]);
        assert!(matches!(
            solve_normal_equations(&m, &v, 1e12),
            Err(InversionError::SingularSystem(_))
        ));
        assert!(matches!(
            solve_normal_equations(&DMatrix::zeros(3, 3), &v, 1e12),
            Err(InversionError::SingularSystem(_))
        ));
    }

    #[test]
    fn test_condition_threshold() {
        let m = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 1e-8]));
        let v = DVector::from_vec(vec![1.0, 1.0]);
        assert!(solve_normal_equations(&m, &v, 1e6).is_err());
        assert!(solve_normal_equations(&m, &v, 1e9).is_ok());
        assert_relative_eq!(condition_number(&m), 1e8, max_relative = 1e-12);
    }

    #[test]
    fn test_indefinite_is_anomaly() {
        // I − (11/3)·J has eigenvalues 1, 1, −10: well conditioned but not a covariance
        let m = DMatrix::identity(3, 3) - DMatrix::from_element(3, 3, 11.0 / 3.0);
        let v = DVector::from_vec(vec![0.1, 0.2, 0.3]);
        assert!(condition_number(&m) < 1e12);
        assert!(matches!(
            solve_normal_equations(&m, &v, 1e12),
            Err(InversionError::NumericAnomaly(_))
        ));
    }

    #[test]
    fn test_malformed_input() {
        let v = DVector::from_vec(vec![1.0, 1.0]);
        assert!(matches!(
            solve_normal_equations(&DMatrix::identity(3, 3), &v, 1e12),
            Err(InversionError::DimensionMismatch { .. })
        ));
        let mut m = DMatrix::identity(2, 2);
        m[(0, 1)] = f64::NAN;
        assert!(matches!(
            solve_normal_equations(&m, &v, 1e12),
            Err(InversionError::NumericAnomaly(_))
        ));
    }
}
