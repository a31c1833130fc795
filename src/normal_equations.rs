//! # Weighted normal equations
//!
//! [`NormalEquations`] is the additive core shared by daily and full accumulators:
//!
//! ```text
//! M = Σ Kᵗ C⁻¹ K      (N × N, symmetric positive semi-definite)
//! V = Σ Kᵗ C⁻¹ ρ      (N)
//! E = Σ ρᵗ C⁻¹ ρ      (scalar, constant term of the residual sum)
//! n = Σ 1             (weighted number of samples)
//! ```
//!
//! The all-zero system is the additive identity and stands for "no data". Combining
//! operations return new values and leave their inputs untouched.
//!
//! The module also holds the row-major upper-triangle packing used to exchange symmetric
//! matrices with output records (`N(N+1)/2` values).
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::inversion_errors::InversionError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalEquations {
    m: DMatrix<f64>,
    v: DVector<f64>,
    e: f64,
    weighted_samples: f64,
}

impl NormalEquations {
    /// The additive identity for `n_params` unknowns.
    pub fn zeros(n_params: usize) -> Self {
        NormalEquations {
            m: DMatrix::zeros(n_params, n_params),
            v: DVector::zeros(n_params),
            e: 0.0,
            weighted_samples: 0.0,
        }
    }

    /// Assemble a system from its parts, checking that `m` is square and matches `v`.
    pub fn from_parts(
        m: DMatrix<f64>,
        v: DVector<f64>,
        e: f64,
        weighted_samples: f64,
    ) -> Result<Self, InversionError> {
        if m.nrows() != m.ncols() {
            return Err(InversionError::DimensionMismatch {
                what: "information matrix columns",
                expected: m.nrows(),
                found: m.ncols(),
            });
        }
        if v.len() != m.nrows() {
            return Err(InversionError::DimensionMismatch {
                what: "right-hand side",
                expected: m.nrows(),
                found: v.len(),
            });
        }
        Ok(NormalEquations {
            m,
            v,
            e,
            weighted_samples,
        })
    }

    #[inline]
    pub fn n_params(&self) -> usize {
        self.v.len()
    }

    #[inline]
    pub fn m(&self) -> &DMatrix<f64> {
        &self.m
    }

    #[inline]
    pub fn v(&self) -> &DVector<f64> {
        &self.v
    }

    #[inline]
    pub fn e(&self) -> f64 {
        self.e
    }

    #[inline]
    pub fn weighted_samples(&self) -> f64 {
        self.weighted_samples
    }

    /// True when no sample contributed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weighted_samples <= 0.0
    }

    /// Fold one observation with kernel matrix `k`, inverse band covariance `c_inv` and
    /// reflectances `rho` into the system.
    pub(crate) fn add_observation(
        &mut self,
        k: &DMatrix<f64>,
        c_inv: &DMatrix<f64>,
        rho: &DVector<f64>,
    ) {
        let kt_cinv = k.transpose() * c_inv;
        self.m += &kt_cinv * k;
        self.v += &kt_cinv * rho;
        self.e += (rho.transpose() * c_inv * rho)[(0, 0)];
        self.weighted_samples += 1.0;
    }

    /// Return `self + weight · other` as a new system.
    pub fn add_scaled(&self, other: &NormalEquations, weight: f64) -> Result<Self, InversionError> {
        self.check_same_size(other)?;
        Ok(NormalEquations {
            m: &self.m + &other.m * weight,
            v: &self.v + &other.v * weight,
            e: self.e + weight * other.e,
            weighted_samples: self.weighted_samples + weight * other.weighted_samples,
        })
    }

    /// Return `self + other` as a new system.
    pub fn combine(&self, other: &NormalEquations) -> Result<Self, InversionError> {
        self.add_scaled(other, 1.0)
    }

    fn check_same_size(&self, other: &NormalEquations) -> Result<(), InversionError> {
        if self.n_params() != other.n_params() {
            return Err(InversionError::DimensionMismatch {
                what: "normal equations",
                expected: self.n_params(),
                found: other.n_params(),
            });
        }
        Ok(())
    }
}

/// `(a + aᵗ) / 2`.
pub fn symmetrize(a: &DMatrix<f64>) -> DMatrix<f64> {
    (a + a.transpose()) * 0.5
}

/// Pack the upper triangle of a square matrix row by row.
///
/// Return
/// ----------
/// * `n(n+1)/2` values: `a[0][0], a[0][1], …, a[0][n-1], a[1][1], …, a[n-1][n-1]`.
pub fn pack_upper(a: &DMatrix<f64>) -> Vec<f64> {
    let n = a.nrows();
    let mut out = Vec::with_capacity(n * (n + 1) / 2);
    for i in 0..n {
        for j in i..a.ncols() {
            out.push(a[(i, j)]);
        }
    }
    out
}

/// Rebuild a full symmetric `n × n` matrix from its packed upper triangle.
///
/// See also
/// ------------
/// * [`pack_upper`] – Inverse operation.
pub fn unpack_upper(packed: &[f64], n: usize) -> Result<DMatrix<f64>, InversionError> {
    let expected = n * (n + 1) / 2;
    if packed.len() != expected {
        return Err(InversionError::DimensionMismatch {
            what: "packed upper triangle",
            expected,
            found: packed.len(),
        });
    }
    let mut a = DMatrix::zeros(n, n);
    let mut values = packed.iter();
    for i in 0..n {
        for j in i..n {
            if let Some(&x) = values.next() {
                a[(i, j)] = x;
                a[(j, i)] = x;
            }
        }
    }
    Ok(a)
}

#[cfg(test)]
mod normal_equations_tests {
    use super::*;
    use approx::assert_relative_eq;

    fn one_sample() -> NormalEquations {
        let mut ne = NormalEquations::zeros(3);
        let k = DMatrix::from_row_slice(1, 3, &[1.0, 0.2, 0.1]);
        let c_inv = DMatrix::from_element(1, 1, 1.0e4);
        let rho = DVector::from_element(1, 0.2);
        ne.add_observation(&k, &c_inv, &rho);
        ne
    }

    #[test]
    fn test_add_observation_terms() {
        let ne = one_sample();
        assert_relative_eq!(ne.m()[(0, 0)], 1.0e4, epsilon = 1e-9);
        assert_relative_eq!(ne.m()[(1, 2)], 1.0e4 * 0.2 * 0.1, epsilon = 1e-9);
        assert_relative_eq!(ne.m()[(2, 1)], ne.m()[(1, 2)], epsilon = 0.0);
        assert_relative_eq!(ne.v()[1], 1.0e4 * 0.2 * 0.2, epsilon = 1e-9);
        assert_relative_eq!(ne.e(), 1.0e4 * 0.04, epsilon = 1e-9);
        assert_eq!(ne.weighted_samples(), 1.0);
    }

    #[test]
    fn test_zero_is_identity() {
        let ne = one_sample();
        let sum = ne.combine(&NormalEquations::zeros(3)).unwrap();
        assert_eq!(sum, ne);
        assert!(NormalEquations::zeros(3).is_empty());
    }

    #[test]
    fn test_add_scaled_and_mismatch() {
        let ne = one_sample();
        let half = NormalEquations::zeros(3).add_scaled(&ne, 0.5).unwrap();
        assert_relative_eq!(half.m()[(0, 0)], 0.5e4, epsilon = 1e-9);
        assert_relative_eq!(half.weighted_samples(), 0.5, epsilon = 0.0);

        assert!(matches!(
            ne.combine(&NormalEquations::zeros(9)),
            Err(InversionError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_pack_unpack_upper() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 2.0, 4.0, 5.0, 3.0, 5.0, 6.0]);
        let packed = pack_upper(&a);
        assert_eq!(packed, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(unpack_upper(&packed, 3).unwrap(), a);
        assert!(unpack_upper(&packed, 4).is_err());
        assert_eq!(pack_upper(&DMatrix::<f64>::zeros(9, 9)).len(), 45);
    }
}
