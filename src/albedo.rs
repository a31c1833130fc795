//! # BRDF to albedo
//!
//! Integrates the kernel model of an [`InversionResult`] into broadband albedo, per band:
//!
//! ```text
//! black-sky (θ) = f0 + f1·(g0 + g1·θ² + g2·θ³)_vol + f2·(g0 + g1·θ² + g2·θ³)_geo
//! white-sky     = f0 + 0.189184·f1 − 1.377622·f2
//! ```
//!
//! Uncertainties are propagated through the same linear maps: with `u` the integration
//! vector of a band, `σ = min(1, sqrt(uᵗ C u))`, and the inter-band correlations are
//! `α_ij = Σ_ij / sqrt(Σ_ii Σ_jj)` with `Σ = U C Uᵗ`.
//!
//! The solar zenith angle used for black-sky albedo is the local-noon angle of the retrieval
//! date, see [`noon_solar_zenith`].
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::constants::{
    DayOfYear, BSA_GEO_POLY, BSA_VOL_POLY, DAYS_PER_YEAR, N_KERNELS, NO_DATA, NO_DATA_DAYS,
    WSA_GEO, WSA_VOL,
};
use crate::inversion::inversion_result::InversionResult;

/// Solar zenith angle (radians) at local solar noon.
///
/// Arguments
/// -----------------
/// * `latitude_deg`: geodetic latitude in degrees.
/// * `doy`: day of year, 1-based.
///
/// Return
/// ----------
/// * `acos(sin φ·sin δ + cos φ·cos δ)` with the declination
///   `δ = −23.45°·cos(2π/365·(doy + 10))`.
pub fn noon_solar_zenith(latitude_deg: f64, doy: DayOfYear) -> f64 {
    let phi = latitude_deg.to_radians();
    let delta = -23.45f64.to_radians()
        * (2.0 * PI / DAYS_PER_YEAR as f64 * (doy as f64 + 10.0)).cos();
    // hour angle is zero at noon
    (phi.sin() * delta.sin() + phi.cos() * delta.cos())
        .clamp(-1.0, 1.0)
        .acos()
}

/// Black-sky integration weights `[1, vol(θ), geo(θ)]`.
pub fn black_sky_weights(sza_rad: f64) -> [f64; N_KERNELS] {
    let poly = |g: [f64; 3]| g[0] + g[1] * sza_rad.powi(2) + g[2] * sza_rad.powi(3);
    [1.0, poly(BSA_VOL_POLY), poly(BSA_GEO_POLY)]
}

/// White-sky integration weights `[1, vol, geo]`.
pub const WHITE_SKY_WEIGHTS: [f64; N_KERNELS] = [1.0, WSA_VOL, WSA_GEO];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbedoResult {
    pub bsa: Vec<f64>,
    pub wsa: Vec<f64>,
    pub bsa_sigma: Vec<f64>,
    pub wsa_sigma: Vec<f64>,
    /// Inter-band correlations of black-sky albedo, pairs `(0,1), (0,2), (1,2), …`.
    pub bsa_alpha: Vec<f64>,
    pub wsa_alpha: Vec<f64>,
    pub weighted_samples: f64,
    /// `exp(relative_entropy / N)`.
    pub relative_entropy_mask: f64,
    pub goodness_of_fit: f64,
    pub days_to_closest_sample: i32,
    pub sza_deg: f64,
}

/// `U`: one row per band, `weights` placed on the band's three parameters.
fn integration_matrix(n_bands: usize, weights: &[f64; N_KERNELS]) -> DMatrix<f64> {
    let mut u = DMatrix::zeros(n_bands, n_bands * N_KERNELS);
    for b in 0..n_bands {
        for (k, w) in weights.iter().enumerate() {
            u[(b, b * N_KERNELS + k)] = *w;
        }
    }
    u
}

fn covariance_is_usable(c: &DMatrix<f64>) -> bool {
    c.iter().all(|x| x.is_finite() && *x != NO_DATA) && c.diagonal().iter().all(|&d| d > 0.0)
}

fn sigmas(sigma: &DMatrix<f64>) -> Vec<f64> {
    sigma
        .diagonal()
        .iter()
        .map(|&var| {
            if var >= 0.0 {
                var.sqrt().min(1.0)
            } else {
                NO_DATA
            }
        })
        .collect()
}

fn alphas(sigma: &DMatrix<f64>) -> Vec<f64> {
    let n = sigma.nrows();
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in i + 1..n {
            let denom = (sigma[(i, i)] * sigma[(j, j)]).sqrt();
            out.push(if denom > 0.0 {
                sigma[(i, j)] / denom
            } else {
                NO_DATA
            });
        }
    }
    out
}

impl AlbedoResult {
    /// Albedo of an inverted pixel at solar zenith angle `sza_rad`.
    ///
    /// A no-data inversion gives no-data albedo. A covariance that is not usable (non-finite
    /// or non-positive diagonal) leaves albedo computed and turns sigmas and alphas to
    /// no-data.
    pub fn from_inversion(result: &InversionResult, sza_rad: f64) -> Self {
        let n_params = result.n_params();
        let n_bands = n_params / N_KERNELS;
        let no_data = |n: usize| vec![NO_DATA; n];
        let n_pairs = n_bands * n_bands.saturating_sub(1) / 2;

        let u_bsa = integration_matrix(n_bands, &black_sky_weights(sza_rad));
        let u_wsa = integration_matrix(n_bands, &WHITE_SKY_WEIGHTS);

        let params_ok = !result.is_no_data()
            && n_params % N_KERNELS == 0
            && result.parameters.iter().all(|p| p.is_finite());
        let (bsa, wsa) = if params_ok {
            let f: &DVector<f64> = &result.parameters;
            (
                (&u_bsa * f).iter().copied().collect(),
                (&u_wsa * f).iter().copied().collect(),
            )
        } else {
            (no_data(n_bands), no_data(n_bands))
        };

        let (bsa_sigma, wsa_sigma, bsa_alpha, wsa_alpha) =
            if params_ok && covariance_is_usable(&result.covariance) {
                let c = &result.covariance;
                let s_bsa = &u_bsa * c * u_bsa.transpose();
                let s_wsa = &u_wsa * c * u_wsa.transpose();
                (sigmas(&s_bsa), sigmas(&s_wsa), alphas(&s_bsa), alphas(&s_wsa))
            } else {
                (
                    no_data(n_bands),
                    no_data(n_bands),
                    no_data(n_pairs),
                    no_data(n_pairs),
                )
            };

        let valid = |x: f64| x.is_finite() && x != NO_DATA;
        let relative_entropy_mask = if valid(result.relative_entropy) && n_params > 0 {
            (result.relative_entropy / n_params as f64).exp()
        } else {
            NO_DATA
        };

        AlbedoResult {
            bsa,
            wsa,
            bsa_sigma,
            wsa_sigma,
            bsa_alpha,
            wsa_alpha,
            weighted_samples: result.weighted_samples,
            relative_entropy_mask,
            goodness_of_fit: result.goodness_of_fit,
            days_to_closest_sample: if params_ok {
                result.days_to_closest_sample
            } else {
                NO_DATA_DAYS
            },
            sza_deg: sza_rad.to_degrees(),
        }
    }
}

#[cfg(test)]
mod albedo_tests {
    use super::*;
    use crate::constants::SnowMode;
    use approx::assert_relative_eq;

    fn inverted(params: Vec<f64>, cov: DMatrix<f64>) -> InversionResult {
        let mut r = InversionResult::no_data(params.len(), SnowMode::NoSnow);
        r.parameters = DVector::from_vec(params);
        r.covariance = cov;
        r.entropy = -10.0;
        r.relative_entropy = 9.0;
        r.weighted_samples = 4.0;
        r.days_to_closest_sample = 2;
        r.goodness_of_fit = 0.5;
        r
    }

    #[test]
    fn test_noon_zenith() {
        // declination is −23.45° at doy 355
        assert_relative_eq!(noon_solar_zenith(0.0, 355).to_degrees(), 23.45, epsilon = 1e-9);
        assert_relative_eq!(noon_solar_zenith(-23.45, 355), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_albedo_values() {
        let r = inverted(
            vec![0.3, 0.1, 0.02, 0.4, 0.2, 0.03],
            DMatrix::identity(6, 6) * 1e-4,
        );
        let a = AlbedoResult::from_inversion(&r, 0.0);
        assert_relative_eq!(a.wsa[0], 0.3 + 0.1 * WSA_VOL + 0.02 * WSA_GEO, epsilon = 1e-12);
        assert_relative_eq!(
            a.bsa[1],
            0.4 + 0.2 * BSA_VOL_POLY[0] + 0.03 * BSA_GEO_POLY[0],
            epsilon = 1e-12
        );
        let expected_sigma = (1e-4 * (1.0 + WSA_VOL * WSA_VOL + WSA_GEO * WSA_GEO)).sqrt();
        assert_relative_eq!(a.wsa_sigma[0], expected_sigma, epsilon = 1e-12);
        // block-diagonal covariance: uncorrelated bands
        assert_eq!(a.wsa_alpha, vec![0.0]);
        assert_relative_eq!(a.relative_entropy_mask, (9.0f64 / 6.0).exp(), epsilon = 1e-12);
        assert_eq!(a.days_to_closest_sample, 2);
    }

    #[test]
    fn test_no_data_propagates() {
        let a = AlbedoResult::from_inversion(&InversionResult::no_data(9, SnowMode::Snow), 0.5);
        assert!(a.bsa.iter().chain(&a.wsa).all(|&x| x == NO_DATA));
        assert_eq!(a.bsa_alpha.len(), 3);
        assert_eq!(a.relative_entropy_mask, NO_DATA);
        assert_eq!(a.days_to_closest_sample, NO_DATA_DAYS);

        let r = inverted(vec![0.3, 0.1, 0.02], DMatrix::zeros(3, 3));
        let a = AlbedoResult::from_inversion(&r, 0.5);
        assert!(a.bsa[0] != NO_DATA);
        assert_eq!(a.bsa_sigma, vec![NO_DATA]);
        assert!(a.bsa_alpha.is_empty());
    }
}
