//! # Quality metrics
//!
//! Pure functions of the solved system, the observation system and the prior:
//!
//! * **entropy** – `−Σ ln Lᵢᵢ + N·sqrt(ln(2πe))` with `L` the Cholesky factor of the
//!   information matrix, i.e. `0.5·ln det(covariance)` plus the constant of the legacy products;
//! * **relative entropy** – prior entropy minus posterior entropy when a prior was applied,
//!   [`NO_DATA`] otherwise;
//! * **goodness of fit** – weighted residual sum `Σ (ρ − Kx)ᵗ C⁻¹ (ρ − Kx)`, computed as
//!   `E − 2·xᵗV + xᵗMx` on the observation-only system for both prior paths;
//! * **weighted number of samples** and **days to closest sample**, carried through.
//!
//! Entropy on a non positive-definite matrix and a negative or NaN goodness of fit are
//! reported as [`InversionError::NumericAnomaly`] instead of leaking NaN into the output.
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use std::f64::consts::{E, PI};

use crate::accumulation::full::FullAccumulator;
use crate::constants::NO_DATA;
use crate::inversion_errors::InversionError;
use crate::normal_equations::{symmetrize, NormalEquations};
use crate::posterior::PosteriorSystem;
use crate::solver::SolvedSystem;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityMetrics {
    pub entropy: f64,
    pub relative_entropy: f64,
    pub weighted_samples: f64,
    pub days_to_closest_sample: i32,
    pub goodness_of_fit: f64,
}

/// Entropy of a Gaussian with information matrix `information`.
///
/// Return
/// ----------
/// * `Err(InversionError::NumericAnomaly)` when `information` is not positive definite
///   (`det ≤ 0`, indefinite or non-finite).
pub fn entropy(information: &DMatrix<f64>) -> Result<f64, InversionError> {
    let n = information.nrows();
    if information.iter().any(|x| !x.is_finite()) {
        return Err(InversionError::NumericAnomaly(
            "entropy of a non-finite matrix".into(),
        ));
    }
    let ch = Cholesky::<f64, Dyn>::new(symmetrize(information)).ok_or_else(|| {
        InversionError::NumericAnomaly("entropy of a matrix that is not positive definite".into())
    })?;
    // ln det(M⁻¹) = −2·Σ ln Lᵢᵢ
    let log_det_cov: f64 = -2.0 * ch.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>();
    let h = 0.5 * log_det_cov + n as f64 * (2.0 * PI * E).ln().sqrt();
    if !h.is_finite() {
        return Err(InversionError::NumericAnomaly(format!(
            "non-finite entropy {h}"
        )));
    }
    Ok(h)
}

/// Information gained over the prior, or [`NO_DATA`] when no prior was applied.
#[inline]
pub fn relative_entropy(entropy: f64, prior_entropy: Option<f64>) -> f64 {
    prior_entropy.map_or(NO_DATA, |p| p - entropy)
}

/// Weighted residual sum of `parameters` against the observation system.
///
/// Arguments
/// -----------------
/// * `observations`: observation-only normal equations (with the E-term).
/// * `parameters`: solved parameter vector.
/// * `tolerance`: negative values down to `−tolerance·max(E, 1)` are rounding and clamp to 0.
///
/// Return
/// ----------
/// * `Ok(0.0)` when the system holds no samples.
/// * `Ok(gof ≥ 0)` otherwise.
/// * `Err(InversionError::NumericAnomaly)` for NaN or a clearly negative value.
pub fn goodness_of_fit(
    observations: &NormalEquations,
    parameters: &DVector<f64>,
    tolerance: f64,
) -> Result<f64, InversionError> {
    if observations.is_empty() {
        return Ok(0.0);
    }
    let x = parameters;
    let gof = observations.e() - 2.0 * x.dot(observations.v()) + x.dot(&(observations.m() * x));
    if gof.is_nan() {
        return Err(InversionError::NumericAnomaly("goodness of fit is NaN".into()));
    }
    if gof >= 0.0 {
        return Ok(gof);
    }
    if gof >= -tolerance * observations.e().max(1.0) {
        return Ok(0.0);
    }
    Err(InversionError::NumericAnomaly(format!(
        "negative goodness of fit {gof:.6e}"
    )))
}

/// Compute every metric of a solved pixel.
///
/// See also
/// ------------
/// * [`entropy`], [`relative_entropy`], [`goodness_of_fit`].
pub fn compute_quality(
    posterior: &PosteriorSystem,
    full: &FullAccumulator,
    solved: &SolvedSystem,
    gof_tolerance: f64,
) -> Result<QualityMetrics, InversionError> {
    let entropy_post = entropy(&posterior.m)?;
    let prior_entropy = posterior
        .prior_information
        .as_ref()
        .map(entropy)
        .transpose()?;

    Ok(QualityMetrics {
        entropy: entropy_post,
        relative_entropy: relative_entropy(entropy_post, prior_entropy),
        weighted_samples: full.weighted_samples(),
        days_to_closest_sample: full.days_to_closest_sample_or_sentinel(),
        goodness_of_fit: goodness_of_fit(full.system(), &solved.parameters, gof_tolerance)?,
    })
}

#[cfg(test)]
mod quality_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_entropy_of_diagonal_information() {
        let m = DMatrix::from_diagonal(&DVector::from_vec(vec![4.0, 16.0, 1.0]));
        let expected = 0.5 * (1.0f64 / 64.0).ln() + 3.0 * (2.0 * PI * E).ln().sqrt();
        assert_relative_eq!(entropy(&m).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_entropy_rejects_singular() {
        let m = DMatrix::from_diagonal(&DVector::from_vec(vec![4.0, 0.0, 1.0]));
        assert!(matches!(
            entropy(&m),
            Err(InversionError::NumericAnomaly(_))
        ));
    }

    #[test]
    fn test_entropy_rejects_indefinite() {
        // singular values (4, 1, 1) are positive, the determinant is not
        let m = DMatrix::from_diagonal(&DVector::from_vec(vec![4.0, -1.0, 1.0]));
        assert!(matches!(
            entropy(&m),
            Err(InversionError::NumericAnomaly(_))
        ));
    }

    #[test]
    fn test_entropy_of_correlated_information() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 2.0]);
        let expected = -0.5 * 7.0f64.ln() + 2.0 * (2.0 * PI * E).ln().sqrt();
        assert_relative_eq!(entropy(&m).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_more_information_lowers_entropy() {
        let prior = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 1.0]));
        let post = &prior + DMatrix::from_row_slice(2, 2, &[3.0, 1.0, 1.0, 2.0]);
        let h_prior = entropy(&prior).unwrap();
        let h_post = entropy(&post).unwrap();
        assert!(relative_entropy(h_post, Some(h_prior)) > 0.0);
        assert_eq!(relative_entropy(h_post, None), NO_DATA);
    }

    #[test]
    fn test_goodness_of_fit_is_residual_sum() {
        // one band, kernels [1, 0.2, 0.1] and [1, 0.3, 0.2], weights 1e4
        let rows = [([1.0, 0.2, 0.1], 0.20), ([1.0, 0.3, 0.2], 0.25)];
        let mut m = DMatrix::zeros(3, 3);
        let mut v = DVector::zeros(3);
        let mut e = 0.0;
        for (k, rho) in rows {
            let k = DVector::from_vec(k.to_vec());
            m += &k * k.transpose() * 1e4;
            v += &k * (rho * 1e4);
            e += rho * rho * 1e4;
        }
        let ne = NormalEquations::from_parts(m, v, e, 2.0).unwrap();
        let x = DVector::from_vec(vec![0.1, 0.3, 0.2]);
        let r1 = 0.20 - (0.1 + 0.06 + 0.02);
        let r2 = 0.25 - (0.1 + 0.09 + 0.04);
        let expected = 1e4 * (r1 * r1 + r2 * r2);
        assert_relative_eq!(
            goodness_of_fit(&ne, &x, 1e-9).unwrap(),
            expected,
            epsilon = 1e-9
        );
        assert_eq!(goodness_of_fit(&NormalEquations::zeros(3), &x, 1e-9).unwrap(), 0.0);
    }

    #[test]
    fn test_goodness_of_fit_negative_is_anomaly() {
        // inconsistent E-term: cannot come from real observations
        let ne = NormalEquations::from_parts(DMatrix::identity(1, 1), DVector::from_vec(vec![1.0]), 0.0, 1.0)
            .unwrap();
        let x = DVector::from_vec(vec![1.0]);
        assert!(matches!(
            goodness_of_fit(&ne, &x, 1e-9),
            Err(InversionError::NumericAnomaly(_))
        ));
    }
}
