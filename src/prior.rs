//! # Prior BRDF parameters
//!
//! A prior is a Gaussian belief about the BRDF parameters of a pixel, taken from an external
//! climatology: a mean vector, a covariance matrix, the number of samples behind it and a
//! validity mask.
//!
//! ## Schemas
//!
//! Climatologies come in two layouts, both normalized into [`PriorParameters`] by
//! [`PriorParameters::from_record`]:
//!
//! * [`PriorRecord::MeanSd`] – per-parameter mean and standard deviation. A zero SD on a
//!   positive mean is replaced by [`PRIOR_FALLBACK_SD`]; every SD is then multiplied by the
//!   prior scale factor and capped at [`PRIOR_MAX_SD`]. The covariance is `diag(sd²)`.
//! * [`PriorRecord::Covariance`] – mean plus the packed upper triangle of a full covariance.
//!
//! ## Information form
//!
//! [`PriorParameters::information_form`] returns `(C⁻¹, C⁻¹·mean)`, ready to be added to the
//! observation normal equations. It fails with [`InversionError::InvalidPrior`] when the prior
//! is masked, has no samples, contains non-finite values, or when its covariance is not
//! positive definite. The caller then inverts without a prior.
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use crate::constants::{PRIOR_FALLBACK_SD, PRIOR_MAX_SD};
use crate::inversion_errors::InversionError;
use crate::normal_equations::{symmetrize, unpack_upper};

/// Prior record as delivered by a climatology reader, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum PriorRecord {
    MeanSd {
        mean: Vec<f64>,
        sd: Vec<f64>,
        n_samples: f64,
        valid: bool,
    },
    Covariance {
        mean: Vec<f64>,
        covariance_upper: Vec<f64>,
        n_samples: f64,
        valid: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorParameters {
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    n_samples: f64,
    valid: bool,
}

/// Prior expressed as information matrix and information vector.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorInformation {
    pub m: DMatrix<f64>,
    pub v: DVector<f64>,
}

impl PriorParameters {
    /// Build a prior from a mean vector and a full covariance.
    pub fn new(
        mean: DVector<f64>,
        covariance: DMatrix<f64>,
        n_samples: f64,
        valid: bool,
    ) -> Result<Self, InversionError> {
        let n = mean.len();
        if covariance.shape() != (n, n) {
            return Err(InversionError::DimensionMismatch {
                what: "prior covariance",
                expected: n,
                found: covariance.nrows().max(covariance.ncols()),
            });
        }
        Ok(PriorParameters {
            mean,
            covariance,
            n_samples,
            valid,
        })
    }

    /// Normalize the per-parameter mean/SD layout.
    ///
    /// Arguments
    /// -----------------
    /// * `mean`, `sd`: per-parameter mean and standard deviation, band-major.
    /// * `n_samples`: number of samples behind the climatology.
    /// * `valid`: validity mask of the prior pixel.
    /// * `scale_factor`: factor applied to every SD before the cap at [`PRIOR_MAX_SD`].
    pub fn from_mean_sd(
        mean: &[f64],
        sd: &[f64],
        n_samples: f64,
        valid: bool,
        scale_factor: f64,
    ) -> Result<Self, InversionError> {
        if sd.len() != mean.len() {
            return Err(InversionError::DimensionMismatch {
                what: "prior standard deviations",
                expected: mean.len(),
                found: sd.len(),
            });
        }
        let variances = mean.iter().zip(sd).map(|(&m, &s)| {
            let s = if m > 0.0 && s == 0.0 { PRIOR_FALLBACK_SD } else { s };
            let scaled = (s * scale_factor).min(PRIOR_MAX_SD);
            scaled * scaled
        });
        let covariance = DMatrix::from_diagonal(&DVector::from_iterator(mean.len(), variances));
        PriorParameters::new(DVector::from_vec(mean.to_vec()), covariance, n_samples, valid)
    }

    /// Normalize the mean + packed covariance layout.
    pub fn from_packed_covariance(
        mean: &[f64],
        covariance_upper: &[f64],
        n_samples: f64,
        valid: bool,
    ) -> Result<Self, InversionError> {
        let covariance = unpack_upper(covariance_upper, mean.len())?;
        PriorParameters::new(DVector::from_vec(mean.to_vec()), covariance, n_samples, valid)
    }

    /// Normalize either schema. `scale_factor` only applies to [`PriorRecord::MeanSd`].
    pub fn from_record(record: &PriorRecord, scale_factor: f64) -> Result<Self, InversionError> {
        match record {
            PriorRecord::MeanSd {
                mean,
                sd,
                n_samples,
                valid,
            } => PriorParameters::from_mean_sd(mean, sd, *n_samples, *valid, scale_factor),
            PriorRecord::Covariance {
                mean,
                covariance_upper,
                n_samples,
                valid,
            } => PriorParameters::from_packed_covariance(mean, covariance_upper, *n_samples, *valid),
        }
    }

    #[inline]
    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    #[inline]
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    #[inline]
    pub fn n_samples(&self) -> f64 {
        self.n_samples
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn n_params(&self) -> usize {
        self.mean.len()
    }

    /// Information matrix `C⁻¹` and vector `C⁻¹·mean` of the prior.
    ///
    /// Return
    /// ----------
    /// * `Ok(PriorInformation)` for a usable prior.
    /// * `Err(InversionError::InvalidPrior)` when the prior is masked, empty, non-finite or
    ///   its covariance is not positive definite.
    pub fn information_form(&self) -> Result<PriorInformation, InversionError> {
        if !self.valid {
            return Err(InversionError::InvalidPrior("prior pixel masked".into()));
        }
        if !(self.n_samples > 0.0) {
            return Err(InversionError::InvalidPrior(format!(
                "no samples behind prior (n_samples = {})",
                self.n_samples
            )));
        }
        if self.mean.iter().chain(self.covariance.iter()).any(|x| !x.is_finite()) {
            return Err(InversionError::InvalidPrior("non-finite prior entries".into()));
        }

        let ch = Cholesky::<f64, Dyn>::new(symmetrize(&self.covariance)).ok_or_else(|| {
            InversionError::InvalidPrior("covariance is not positive definite".into())
        })?;
        let m = ch.inverse();
        let v = &m * &self.mean;
        Ok(PriorInformation { m, v })
    }
}

#[cfg(test)]
mod prior_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_sd_scaling_and_cap() {
        let prior = PriorParameters::from_mean_sd(
            &[0.1, 0.02, 0.0],
            &[0.001, 0.0, 0.05],
            12.0,
            true,
            30.0,
        )
        .unwrap();
        let c = prior.covariance();
        assert_relative_eq!(c[(0, 0)], 0.03 * 0.03, epsilon = 1e-15);
        // zero SD on a positive mean becomes 1.0, then capped after scaling
        assert_relative_eq!(c[(1, 1)], 1.0, epsilon = 1e-15);
        assert_relative_eq!(c[(2, 2)], 1.0, epsilon = 1e-15);
        assert_eq!(c[(0, 1)], 0.0);
    }

    #[test]
    fn test_information_form() {
        let prior =
            PriorParameters::from_mean_sd(&[0.1, 0.2, 0.3], &[0.01, 0.02, 0.02], 5.0, true, 1.0)
                .unwrap();
        let info = prior.information_form().unwrap();
        assert_relative_eq!(info.m[(0, 0)], 1.0e4, epsilon = 1e-6);
        assert_relative_eq!(info.v[2], 0.3 / 4.0e-4, epsilon = 1e-6);
    }

    #[test]
    fn test_invalid_priors() {
        let masked =
            PriorParameters::from_mean_sd(&[0.1, 0.2, 0.3], &[0.1; 3], 5.0, false, 1.0).unwrap();
        assert!(matches!(
            masked.information_form(),
            Err(InversionError::InvalidPrior(_))
        ));

        let empty =
            PriorParameters::from_mean_sd(&[0.1, 0.2, 0.3], &[0.1; 3], 0.0, true, 1.0).unwrap();
        assert!(empty.information_form().is_err());

        let singular = PriorParameters::new(
            DVector::from_vec(vec![-0.1, 0.2]),
            DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]),
            3.0,
            true,
        )
        .unwrap();
        assert!(singular.information_form().is_err());
    }

    #[test]
    fn test_singular_covariance_in_unit_range_is_rejected() {
        // means and SDs inside (0, 1] do not rescue a singular covariance
        let prior = PriorParameters::new(
            DVector::from_vec(vec![0.1, 0.2]),
            DMatrix::from_row_slice(2, 2, &[0.25, 0.25, 0.25, 0.25]),
            3.0,
            true,
        )
        .unwrap();
        assert!(matches!(
            prior.information_form(),
            Err(InversionError::InvalidPrior(_))
        ));
    }

    #[test]
    fn test_packed_record() {
        let record = PriorRecord::Covariance {
            mean: vec![0.1, 0.2],
            covariance_upper: vec![0.04, 0.01, 0.09],
            n_samples: 4.0,
            valid: true,
        };
        let prior = PriorParameters::from_record(&record, 30.0).unwrap();
        assert_eq!(prior.covariance()[(1, 0)], 0.01);
        assert_eq!(prior.covariance()[(1, 1)], 0.09);

        let bad = PriorRecord::Covariance {
            mean: vec![0.1, 0.2],
            covariance_upper: vec![0.04, 0.01],
            n_samples: 4.0,
            valid: true,
        };
        assert!(PriorParameters::from_record(&bad, 30.0).is_err());
    }
}
