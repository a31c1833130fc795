//! # Reflectance observations
//!
//! One [`Observation`] is a single acquisition over one pixel: a broadband reflectance per
//! band, the volumetric and geometric kernel values computed from the sun/view geometry,
//! a per-band measurement uncertainty and, optionally, the correlations between band errors.
//!
//! Records are produced by an external reader and are immutable once built. Providers that
//! deliver single precision go through [`BandSample::from_f32`] so every later sum runs in `f64`.
//!
//! ## Usability
//!
//! [`Observation::rejection`] reports why a record must not contribute to the normal equations:
//! a cleared validity flag, a snow flag outside the retrieval mode, a reflectance equal to `0`,
//! `±9999` or non-finite, a non-positive uncertainty, or a band covariance that is not
//! positive definite. Rejected records are skipped, never reported as errors.
//!
//! ## See also
//! * [`crate::accumulation::daily::DailyAccumulator`] – folds usable observations of one day.
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::constants::{
    n_params, DayOfYear, SnowMode, WindowDay, DAYS_PER_YEAR, NO_DATA, N_KERNELS,
    REFLECTANCE_FILL,
};

/// Reflectance, kernels and uncertainty of one band in one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSample {
    pub reflectance: f64,
    pub kvol: f64,
    pub kgeo: f64,
    /// Standard deviation of the reflectance.
    pub sigma: f64,
}

impl BandSample {
    pub fn new(reflectance: f64, kvol: f64, kgeo: f64, sigma: f64) -> Self {
        BandSample {
            reflectance,
            kvol,
            kgeo,
            sigma,
        }
    }

    /// Widen a single-precision sample.
    pub fn from_f32(reflectance: f32, kvol: f32, kgeo: f32, sigma: f32) -> Self {
        BandSample {
            reflectance: f64::from(reflectance),
            kvol: f64::from(kvol),
            kgeo: f64::from(kgeo),
            sigma: f64::from(sigma),
        }
    }

    fn has_usable_reflectance(&self) -> bool {
        let r = self.reflectance;
        r.is_finite() && r != 0.0 && r != NO_DATA && r != REFLECTANCE_FILL
    }

    fn has_usable_kernels(&self) -> bool {
        self.kvol.is_finite() && self.kgeo.is_finite()
    }
}

/// Why an observation was left out of the accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    FlaggedInvalid,
    SnowModeMismatch,
    BadReflectance,
    BadKernels,
    BadUncertainty,
    BadCorrelation,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rejection::FlaggedInvalid => "flagged invalid",
            Rejection::SnowModeMismatch => "snow flag outside retrieval mode",
            Rejection::BadReflectance => "zero, fill or non-finite reflectance",
            Rejection::BadKernels => "non-finite kernel value",
            Rejection::BadUncertainty => "non-positive or non-finite uncertainty",
            Rejection::BadCorrelation => "malformed band correlations or covariance not positive definite",
        };
        f.write_str(s)
    }
}

/// One multi-band reflectance acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub year: i32,
    pub doy: DayOfYear,
    pub bands: SmallVec<[BandSample; 3]>,
    /// Correlation coefficients of band errors in upper-triangle order
    /// `(0,1), (0,2), …, (1,2), …`. Empty means uncorrelated.
    #[serde(default)]
    pub correlations: SmallVec<[f64; 3]>,
    #[serde(default)]
    pub snow: bool,
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl Observation {
    /// Build a valid, snow-free, uncorrelated observation.
    pub fn new<I>(year: i32, doy: DayOfYear, bands: I) -> Self
    where
        I: IntoIterator<Item = BandSample>,
    {
        Observation {
            year,
            doy,
            bands: bands.into_iter().collect(),
            correlations: SmallVec::new(),
            snow: false,
            valid: true,
        }
    }

    pub fn with_correlations<I>(mut self, correlations: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        self.correlations = correlations.into_iter().collect();
        self
    }

    pub fn with_snow(mut self, snow: bool) -> Self {
        self.snow = snow;
        self
    }

    pub fn with_validity(mut self, valid: bool) -> Self {
        self.valid = valid;
        self
    }

    #[inline]
    pub fn n_bands(&self) -> usize {
        self.bands.len()
    }

    /// Day index of this acquisition on the window axis of `target_year`.
    ///
    /// Day 0 is January 1st of the target year; days of the previous year are negative.
    #[inline]
    pub fn window_day(&self, target_year: i32) -> WindowDay {
        window_day(self.year, self.doy, target_year)
    }

    /// Reason this observation must be skipped in `mode`, or `None` when it is usable.
    ///
    /// The band covariance is not checked here; see [`Observation::band_covariance`].
    pub fn rejection(&self, mode: SnowMode) -> Option<Rejection> {
        if !self.valid {
            return Some(Rejection::FlaggedInvalid);
        }
        if !mode.accepts(self.snow) {
            return Some(Rejection::SnowModeMismatch);
        }
        if !self.bands.iter().all(BandSample::has_usable_reflectance) {
            return Some(Rejection::BadReflectance);
        }
        if !self.bands.iter().all(BandSample::has_usable_kernels) {
            return Some(Rejection::BadKernels);
        }
        if !self
            .bands
            .iter()
            .all(|b| b.sigma.is_finite() && b.sigma > 0.0)
        {
            return Some(Rejection::BadUncertainty);
        }
        None
    }

    /// Kernel design matrix `K` (`n_bands × 3·n_bands`).
    ///
    /// Row `b` holds `1, kvol_b, kgeo_b` in columns `3b..3b+3` and zeros elsewhere.
    pub fn kernel_matrix(&self) -> DMatrix<f64> {
        let nb = self.n_bands();
        let mut k = DMatrix::zeros(nb, n_params(nb));
        for (b, band) in self.bands.iter().enumerate() {
            k[(b, N_KERNELS * b)] = 1.0;
            k[(b, N_KERNELS * b + 1)] = band.kvol;
            k[(b, N_KERNELS * b + 2)] = band.kgeo;
        }
        k
    }

    /// Reflectance vector `ρ` (length `n_bands`).
    pub fn reflectances(&self) -> DVector<f64> {
        DVector::from_iterator(self.n_bands(), self.bands.iter().map(|b| b.reflectance))
    }

    /// Band error covariance `C`, with `σ²` on the diagonal and `corr·σᵢ·σⱼ` off it.
    ///
    /// Return
    /// ----------
    /// * `Err(Rejection::BadCorrelation)` when the correlation list is neither empty nor
    ///   `n(n−1)/2` long.
    pub fn band_covariance(&self) -> Result<DMatrix<f64>, Rejection> {
        let nb = self.n_bands();
        let n_pairs = nb * nb.saturating_sub(1) / 2;
        if !self.correlations.is_empty() && self.correlations.len() != n_pairs {
            return Err(Rejection::BadCorrelation);
        }

        let mut c = DMatrix::zeros(nb, nb);
        let mut corr = self.correlations.iter().copied();
        for i in 0..nb {
            c[(i, i)] = self.bands[i].sigma * self.bands[i].sigma;
            for j in (i + 1)..nb {
                let r = corr.next().unwrap_or(0.0);
                let cij = r * self.bands[i].sigma * self.bands[j].sigma;
                c[(i, j)] = cij;
                c[(j, i)] = cij;
            }
        }
        Ok(c)
    }

    /// Inverse band covariance `C⁻¹`, or [`Rejection::BadCorrelation`] when the correlations
    /// are malformed or `C` is not positive definite.
    pub fn inverse_band_covariance(&self) -> Result<DMatrix<f64>, Rejection> {
        Cholesky::<f64, Dyn>::new(self.band_covariance()?)
            .map(|ch| ch.inverse())
            .ok_or(Rejection::BadCorrelation)
    }
}

/// Day index of `(year, doy)` on the window axis of `target_year`.
#[inline]
pub fn window_day(year: i32, doy: DayOfYear, target_year: i32) -> WindowDay {
    (year - target_year) * DAYS_PER_YEAR + doy as i32 - 1
}

#[cfg(test)]
mod observation_tests {
    use super::*;
    use approx::assert_relative_eq;

    fn three_band() -> Observation {
        Observation::new(
            2005,
            121,
            [
                BandSample::new(0.05, 0.1, -1.2, 0.01),
                BandSample::new(0.30, 0.2, -1.1, 0.02),
                BandSample::new(0.15, 0.3, -1.0, 0.04),
            ],
        )
    }

    #[test]
    fn test_kernel_matrix_layout() {
        let k = three_band().kernel_matrix();
        assert_eq!(k.shape(), (3, 9));
        assert_eq!(k[(0, 0)], 1.0);
        assert_eq!(k[(1, 3)], 1.0);
        assert_eq!(k[(2, 6)], 1.0);
        assert_eq!(k[(1, 4)], 0.2);
        assert_eq!(k[(2, 8)], -1.0);
        assert_eq!(k[(0, 3)], 0.0);
    }

    #[test]
    fn test_band_covariance_with_correlations() {
        let obs = three_band().with_correlations([0.5, 0.0, -0.25]);
        let c = obs.band_covariance().unwrap();
        assert_relative_eq!(c[(0, 0)], 1e-4, epsilon = 1e-15);
        assert_relative_eq!(c[(0, 1)], 0.5 * 0.01 * 0.02, epsilon = 1e-15);
        assert_relative_eq!(c[(1, 0)], c[(0, 1)], epsilon = 0.0);
        assert_eq!(c[(0, 2)], 0.0);
        assert_relative_eq!(c[(1, 2)], -0.25 * 0.02 * 0.04, epsilon = 1e-15);

        let inv = obs.inverse_band_covariance().unwrap();
        let id = &c * &inv;
        assert_relative_eq!(id, DMatrix::identity(3, 3), epsilon = 1e-9);
    }

    #[test]
    fn test_correlation_list_length() {
        assert!(three_band().band_covariance().is_ok());
        for short_or_long in [vec![0.5], vec![0.5, 0.0], vec![0.5, 0.0, 0.1, 0.2]] {
            let obs = three_band().with_correlations(short_or_long);
            assert_eq!(obs.band_covariance(), Err(Rejection::BadCorrelation));
            assert_eq!(obs.inverse_band_covariance(), Err(Rejection::BadCorrelation));
        }
        let single = Observation::new(2005, 1, [BandSample::new(0.2, 0.1, 0.1, 0.01)]);
        assert!(single.with_correlations([0.3]).band_covariance().is_err());
    }

    #[test]
    fn test_rejections() {
        assert_eq!(three_band().rejection(SnowMode::NoSnow), None);
        assert_eq!(
            three_band().rejection(SnowMode::Snow),
            Some(Rejection::SnowModeMismatch)
        );
        assert_eq!(
            three_band().with_validity(false).rejection(SnowMode::NoSnow),
            Some(Rejection::FlaggedInvalid)
        );

        let mut fill = three_band();
        fill.bands[1].reflectance = REFLECTANCE_FILL;
        assert_eq!(fill.rejection(SnowMode::NoSnow), Some(Rejection::BadReflectance));

        let mut zero_sd = three_band();
        zero_sd.bands[2].sigma = 0.0;
        assert_eq!(
            zero_sd.rejection(SnowMode::NoSnow),
            Some(Rejection::BadUncertainty)
        );

        let degenerate = three_band().with_correlations([1.5, 0.0, 0.0]);
        assert_eq!(
            degenerate.inverse_band_covariance(),
            Err(Rejection::BadCorrelation)
        );
    }

    #[test]
    fn test_window_day_and_f32_widening() {
        assert_eq!(window_day(2005, 1, 2005), 0);
        assert_eq!(window_day(2004, 276, 2005), -90);
        assert_eq!(window_day(2006, 90, 2005), 454);

        let s = BandSample::from_f32(0.1, 0.2, 0.3, 0.01);
        assert_eq!(s.reflectance, f64::from(0.1f32));
    }
}
