//! # Snow / no-snow merge
//!
//! A pixel is inverted twice, once per [`SnowMode`]. [`merge_snow_modes`] turns the two
//! records into one:
//!
//! * when either mode has weighted samples, every field is the sample-weighted mean
//!   `p_snow·x_snow + p_no_snow·x_no_snow` with `p = n / (n_snow + n_no_snow)`;
//! * otherwise the record with the lower entropy is kept (snow on ties), or the only one
//!   with a valid entropy;
//! * otherwise the merge is the no-data record.
//!
//! A field that is no-data in a record with a positive weight stays no-data in the merge.
use nalgebra::{DMatrix, DVector};

use crate::constants::{SnowMode, NO_DATA, NO_DATA_DAYS};
use crate::inversion::inversion_result::InversionResult;
use crate::inversion_errors::InversionError;

/// Merged record and the share of snow samples behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedResult {
    /// `snow_mode` of the merged record is the dominant mode.
    pub result: InversionResult,
    /// `n_snow / (n_snow + n_no_snow)`; 1.0 or 0.0 when one record was selected, NO_DATA
    /// when neither was usable.
    pub snow_fraction: f64,
}

fn is_valid(x: f64) -> bool {
    x.is_finite() && x != NO_DATA
}

fn samples(r: &InversionResult) -> f64 {
    if is_valid(r.weighted_samples) {
        r.weighted_samples.max(0.0)
    } else {
        0.0
    }
}

fn blend(snow: f64, no_snow: f64, p_snow: f64, p_no_snow: f64) -> f64 {
    let term = |x: f64, p: f64| {
        if p == 0.0 {
            Some(0.0)
        } else if is_valid(x) {
            Some(x * p)
        } else {
            None
        }
    };
    match (term(snow, p_snow), term(no_snow, p_no_snow)) {
        (Some(a), Some(b)) => a + b,
        _ => NO_DATA,
    }
}

/// Merge the snow and no-snow records of one pixel.
///
/// Return
/// ----------
/// * `Ok(MergedResult)`; the merged record is [`InversionResult::no_data`] when neither
///   input is usable.
/// * `Err(InversionError::DimensionMismatch)` if the two records have different sizes.
pub fn merge_snow_modes(
    snow: &InversionResult,
    no_snow: &InversionResult,
) -> Result<MergedResult, InversionError> {
    let n = snow.n_params();
    if no_snow.n_params() != n {
        return Err(InversionError::DimensionMismatch {
            what: "snow / no-snow parameters",
            expected: n,
            found: no_snow.n_params(),
        });
    }

    let (n_snow, n_no_snow) = (samples(snow), samples(no_snow));
    let total = n_snow + n_no_snow;

    if total > 0.0 {
        let (ps, pn) = (n_snow / total, n_no_snow / total);
        let mix = |a: f64, b: f64| blend(a, b, ps, pn);

        let parameters = DVector::from_iterator(
            n,
            snow.parameters.iter().zip(no_snow.parameters.iter()).map(|(&a, &b)| mix(a, b)),
        );
        let covariance = DMatrix::from_fn(n, n, |i, j| {
            mix(snow.covariance[(i, j)], no_snow.covariance[(i, j)])
        });
        let days = |d: i32| if d == NO_DATA_DAYS { NO_DATA } else { d as f64 };
        let days_blend = mix(days(snow.days_to_closest_sample), days(no_snow.days_to_closest_sample));

        let result = InversionResult {
            parameters,
            covariance,
            entropy: mix(snow.entropy, no_snow.entropy),
            relative_entropy: mix(snow.relative_entropy, no_snow.relative_entropy),
            weighted_samples: mix(snow.weighted_samples, no_snow.weighted_samples),
            days_to_closest_sample: if days_blend == NO_DATA {
                NO_DATA_DAYS
            } else {
                days_blend.round() as i32
            },
            goodness_of_fit: mix(snow.goodness_of_fit, no_snow.goodness_of_fit),
            snow_mode: if ps > pn { SnowMode::Snow } else { SnowMode::NoSnow },
        };
        return Ok(MergedResult {
            result,
            snow_fraction: ps,
        });
    }

    let pick = |r: &InversionResult, fraction: f64| MergedResult {
        result: r.clone(),
        snow_fraction: fraction,
    };
    Ok(
        match (is_valid(snow.entropy), is_valid(no_snow.entropy)) {
            (true, true) if snow.entropy <= no_snow.entropy => pick(snow, 1.0),
            (true, true) => pick(no_snow, 0.0),
            (true, false) => pick(snow, 1.0),
            (false, true) => pick(no_snow, 0.0),
            (false, false) => MergedResult {
                result: InversionResult::no_data(n, SnowMode::NoSnow),
                snow_fraction: NO_DATA,
            },
        },
    )
}

#[cfg(test)]
mod merge_tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(mode: SnowMode, value: f64, samples: f64, entropy: f64) -> InversionResult {
        InversionResult {
            parameters: DVector::from_element(3, value),
            covariance: DMatrix::identity(3, 3) * value,
            entropy,
            relative_entropy: NO_DATA,
            weighted_samples: samples,
            days_to_closest_sample: 4,
            goodness_of_fit: value,
            snow_mode: mode,
        }
    }

    #[test]
    fn test_weighted_merge() {
        let s = record(SnowMode::Snow, 1.0, 1.0, -2.0);
        let ns = record(SnowMode::NoSnow, 0.0, 3.0, -4.0);
        let merged = merge_snow_modes(&s, &ns).unwrap();
        assert_relative_eq!(merged.snow_fraction, 0.25);
        assert_relative_eq!(merged.result.parameters[1], 0.25);
        assert_relative_eq!(merged.result.entropy, -3.5);
        assert_relative_eq!(merged.result.weighted_samples, 2.5);
        assert_eq!(merged.result.days_to_closest_sample, 4);
        assert_eq!(merged.result.relative_entropy, NO_DATA);
        assert_eq!(merged.result.snow_mode, SnowMode::NoSnow);
    }

    #[test]
    fn test_failed_side_does_not_contaminate() {
        let s = InversionResult::no_data(3, SnowMode::Snow);
        let ns = record(SnowMode::NoSnow, 0.3, 2.0, -4.0);
        let merged = merge_snow_modes(&s, &ns).unwrap();
        assert_eq!(merged.snow_fraction, 0.0);
        assert_relative_eq!(merged.result.parameters[0], 0.3);
    }

    #[test]
    fn test_selection_without_samples() {
        let s = record(SnowMode::Snow, 1.0, 0.0, -2.0);
        let ns = record(SnowMode::NoSnow, 0.0, 0.0, -4.0);
        let merged = merge_snow_modes(&s, &ns).unwrap();
        assert_eq!(merged.snow_fraction, 0.0);
        assert_eq!(merged.result, ns);

        let tie = record(SnowMode::NoSnow, 0.0, 0.0, -2.0);
        assert_eq!(merge_snow_modes(&s, &tie).unwrap().result, s);

        let none = InversionResult::no_data(3, SnowMode::NoSnow);
        let merged = merge_snow_modes(&none, &none).unwrap();
        assert!(merged.result.is_no_data());
        assert_eq!(merged.snow_fraction, NO_DATA);
    }
}
