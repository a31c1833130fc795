#![allow(dead_code)]

use albedo_inversion::observation::{BandSample, Observation};
use approx::assert_relative_eq;
use nalgebra::DVector;

/// Kernel rows and reflectances of the three-observation single-band scenario.
pub const SCENARIO_KERNELS: [(f64, f64); 3] = [(0.2, 0.1), (0.3, 0.2), (0.1, 0.3)];
pub const SCENARIO_REFLECTANCES: [f64; 3] = [0.20, 0.22, 0.19];

/// Three single-band observations on January 1st 2005, σ = 0.01.
pub fn scenario_observations() -> Vec<Observation> {
    SCENARIO_KERNELS
        .iter()
        .zip(SCENARIO_REFLECTANCES)
        .map(|(&(kvol, kgeo), rho)| {
            Observation::new(2005, 1, [BandSample::new(rho, kvol, kgeo, 0.01)])
        })
        .collect()
}

/// Deterministic, well-spread (kvol, kgeo) pair for the `i`-th acquisition.
pub fn geometry(i: usize) -> (f64, f64) {
    let t = i as f64;
    (
        0.05 + 0.25 * (0.7 * t).sin().abs(),
        -1.2 + 0.9 * (0.3 * t + 0.4).cos().abs(),
    )
}

/// Noise-free observations of a model with band-major parameters `truth`, one per doy.
pub fn synthetic_observations<I>(truth: &[f64], year: i32, doys: I, sigma: f64) -> Vec<Observation>
where
    I: IntoIterator<Item = u32>,
{
    let n_bands = truth.len() / 3;
    doys.into_iter()
        .enumerate()
        .map(|(i, doy)| {
            let (kvol, kgeo) = geometry(i);
            let bands = (0..n_bands).map(|b| {
                let f = &truth[3 * b..3 * b + 3];
                BandSample::new(f[0] + kvol * f[1] + kgeo * f[2], kvol, kgeo, sigma)
            });
            Observation::new(year, doy, bands)
        })
        .collect()
}

/// Plausible three-band parameters (VIS, NIR, SW).
pub fn three_band_truth() -> Vec<f64> {
    vec![0.06, 0.03, 0.01, 0.30, 0.15, 0.03, 0.18, 0.08, 0.02]
}

pub fn assert_vector_close(actual: &DVector<f64>, expected: &[f64], max_relative: f64) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert_relative_eq!(*a, *e, max_relative = max_relative, epsilon = 1e-12);
    }
}
