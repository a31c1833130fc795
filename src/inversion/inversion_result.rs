//! # Inversion result
//!
//! This module defines [`InversionResult`], the record produced for one pixel and one snow
//! mode, and [`InversionOutcome`], which pairs it with the provenance of the prior and the
//! reason of a failure.
//!
//! ## No-data record
//!
//! A pixel that cannot be inverted still yields a complete record: every floating-point
//! field is [`NO_DATA`] (`-9999.0`) and `days_to_closest_sample` is [`NO_DATA_DAYS`] (`-1`).
//! Downstream writers therefore never see NaN, and [`InversionResult::is_no_data`] tells the
//! two apart.
//!
//! ## Features
//!
//! - [`InversionResult::packed_covariance`] – upper triangle, row-major (`N(N+1)/2` values).
//! - [`InversionResult::band_parameters`] – the three kernel weights of one band.
//! - `Display` – compact one-liner, or a per-band table with `{:#}`.
//!
//! ## See also
//!
//! - [`crate::inversion::pixel::PixelInversion`] – producer of these records.
//! - [`crate::merge::merge_snow_modes`] – combines a snow and a no-snow record.
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{SnowMode, BAND_NAMES, N_KERNELS, NO_DATA, NO_DATA_DAYS};
use crate::inversion::pixel::InversionStage;
use crate::inversion_errors::InversionError;
use crate::normal_equations::pack_upper;
use crate::posterior::PriorUsage;

/// BRDF parameters and quality metrics of one pixel.
///
/// Fields
/// -----------------
/// * `parameters` – kernel weights, band-major (`3b + k`).
/// * `covariance` – `N × N` parameter covariance.
/// * `entropy` – `0.5·ln det(covariance)` plus the Gaussian constant.
/// * `relative_entropy` – prior entropy minus `entropy`; [`NO_DATA`] without a prior.
/// * `weighted_samples` – temporally weighted number of observations.
/// * `days_to_closest_sample` – distance in days to the nearest day with data, `-1` if none.
/// * `goodness_of_fit` – weighted residual sum of the observations.
/// * `snow_mode` – retrieval mode the record belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InversionResult {
    pub parameters: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub entropy: f64,
    pub relative_entropy: f64,
    pub weighted_samples: f64,
    pub days_to_closest_sample: i32,
    pub goodness_of_fit: f64,
    pub snow_mode: SnowMode,
}

impl InversionResult {
    /// The no-data record for a parameter vector of size `n_params`.
    pub fn no_data(n_params: usize, snow_mode: SnowMode) -> Self {
        InversionResult {
            parameters: DVector::from_element(n_params, NO_DATA),
            covariance: DMatrix::from_element(n_params, n_params, NO_DATA),
            entropy: NO_DATA,
            relative_entropy: NO_DATA,
            weighted_samples: NO_DATA,
            days_to_closest_sample: NO_DATA_DAYS,
            goodness_of_fit: NO_DATA,
            snow_mode,
        }
    }

    /// True for the record produced by [`InversionResult::no_data`].
    pub fn is_no_data(&self) -> bool {
        self.entropy == NO_DATA && self.parameters.iter().all(|&p| p == NO_DATA)
    }

    #[inline]
    pub fn n_params(&self) -> usize {
        self.parameters.len()
    }

    /// Upper triangle of the covariance, row-major.
    pub fn packed_covariance(&self) -> Vec<f64> {
        pack_upper(&self.covariance)
    }

    /// Kernel weights `[f_iso, f_vol, f_geo]` of band `band`, if it exists.
    pub fn band_parameters(&self, band: usize) -> Option<[f64; N_KERNELS]> {
        let start = band * N_KERNELS;
        let slice = self.parameters.as_slice().get(start..start + N_KERNELS)?;
        Some([slice[0], slice[1], slice[2]])
    }
}

impl fmt::Display for InversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_no_data() {
            return write!(f, "InversionResult(no data, mode={})", self.snow_mode);
        }
        if f.alternate() {
            writeln!(f, "BRDF inversion result ({})", self.snow_mode)?;
            writeln!(f, "  {:<8} {:>12} {:>12} {:>12}", "band", "f_iso", "f_vol", "f_geo")?;
            let n_bands = self.n_params() / N_KERNELS;
            for b in 0..n_bands {
                let name = BAND_NAMES
                    .get(b)
                    .map_or_else(|| format!("b{b}"), |n| n.to_string());
                if let Some([iso, vol, geo]) = self.band_parameters(b) {
                    writeln!(f, "  {name:<8} {iso:>12.6} {vol:>12.6} {geo:>12.6}")?;
                }
            }
            writeln!(f, "  entropy          = {:.6}", self.entropy)?;
            writeln!(f, "  relative_entropy = {:.6}", self.relative_entropy)?;
            writeln!(f, "  weighted_samples = {:.4}", self.weighted_samples)?;
            writeln!(f, "  closest_sample   = {} d", self.days_to_closest_sample)?;
            write!(f, "  goodness_of_fit  = {:.6e}", self.goodness_of_fit)
        } else {
            write!(
                f,
                "InversionResult(mode={}, N={}, H={:.4}, dH={:.4}, n={:.3}, days={}, gof={:.3e})",
                self.snow_mode,
                self.n_params(),
                self.entropy,
                self.relative_entropy,
                self.weighted_samples,
                self.days_to_closest_sample,
                self.goodness_of_fit,
            )
        }
    }
}

/// Result of a pixel inversion together with how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionOutcome {
    pub result: InversionResult,
    pub prior_usage: PriorUsage,
    /// `None` on success.
    pub failure: Option<InversionError>,
    /// [`InversionStage::Done`] or [`InversionStage::Failed`].
    pub stage: InversionStage,
}

impl InversionOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    #[inline]
    pub fn error(&self) -> Option<&InversionError> {
        self.failure.as_ref()
    }

    /// Convert into a `Result`, dropping the no-data record on failure.
    pub fn into_result(self) -> Result<InversionResult, InversionError> {
        match self.failure {
            None => Ok(self.result),
            Some(err) => Err(err),
        }
    }
}
