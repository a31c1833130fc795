//! # Inversion parameters
//!
//! This module defines the [`InversionParams`] configuration struct and its builder, which
//! control how a pixel's observations are accumulated over time, combined with a prior and
//! inverted.
//!
//! ## Purpose
//!
//! [`InversionParams`] replaces every piece of process-wide configuration: it is built once,
//! validated, and passed by reference to each [`pixel::PixelInversion`]. It lets you:
//!
//! - Select the retrieval date (`year`, `doy`) and the snow mode,
//! - Size the parameter vector (`n_bands`, three kernels per band),
//! - Choose the accumulation window and the temporal decay law,
//! - Enable or disable the prior and scale its standard deviations,
//! - Bound the condition number accepted by the solver and the goodness-of-fit rounding slack.
//!
//! ## Pipeline overview
//!
//! 1. **Daily accumulation** – observations of each day fold into a daily normal-equation system.
//! 2. **Windowed aggregation** – daily systems within `window` are summed with weights
//!    given by `decay` applied to their distance to the retrieval date.
//! 3. **Prior combination** – the prior (if `use_prior`) is added in information form.
//! 4. **Solve** – parameters and covariance; systems with condition number above
//!    `max_condition_number` are rejected as singular.
//! 5. **Quality** – entropy, relative entropy, goodness of fit, sample counts.
//!
//! ## Example
//!
//! ```rust,no_run
//! use albedo_inversion::inversion::InversionParams;
//! use albedo_inversion::constants::SnowMode;
//!
//! let params = InversionParams::builder()
//!     .year(2005)
//!     .doy(121)
//!     .snow_mode(SnowMode::Snow)
//!     .halflife_days(11.54)
//!     .build()
//!     .unwrap();
//! println!("{params:#}");
//! ```
//!
//! Parameters can also be decoded from any serde format as a flat set of named options;
//! omitted options keep their defaults.
//!
//! ## See also
//!
//! * [`pixel::PixelInversion`] – per-pixel orchestrator consuming these parameters.
//! * [`inversion_result::InversionResult`] – output record.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering::{Equal, Greater};
use std::fmt;

use crate::accumulation::{DayWindow, TemporalDecay};
use crate::constants::{
    n_params, DayOfYear, SnowMode, WindowDay, DEFAULT_GOF_TOLERANCE, DEFAULT_MAX_CONDITION,
    DEFAULT_N_BANDS, DEFAULT_PRIOR_SCALE_FACTOR,
};
use crate::inversion_errors::InversionError;

pub mod inversion_result;
pub mod pixel;

/// Configuration of a BRDF inversion run.
///
/// Fields
/// -----------------
/// **Retrieval**
/// * `snow_mode` – which observations and prior are used.
/// * `year`, `doy` – retrieval date; the window axis is anchored on January 1st of `year`.
/// * `n_bands` – number of spectral bands; the parameter vector has `3 × n_bands` entries.
///
/// **Accumulation**
/// * `window` – inclusive range of window days that contribute.
/// * `decay` – temporal weighting law.
///
/// **Prior**
/// * `use_prior` – `false` forces a prior-free inversion.
/// * `prior_scale_factor` – factor applied to prior standard deviations of the mean/SD schema.
///
/// **Numerics**
/// * `max_condition_number` – largest accepted condition number of the information matrix.
/// * `min_weighted_samples` – without a prior, pixels at or below this weighted sample count
///   are reported as insufficient data.
/// * `gof_tolerance` – relative slack under which a negative goodness of fit is rounding.
///
/// Defaults
/// -----------------
/// * `snow_mode`: no snow
/// * `year`: 2005, `doy`: 1, `n_bands`: 3
/// * `window`: days −90..=454
/// * `decay`: exponential, halflife 11.54 d
/// * `use_prior`: true, `prior_scale_factor`: 30.0
/// * `max_condition_number`: 1e12, `min_weighted_samples`: 0.0, `gof_tolerance`: 1e-9
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InversionParams {
    // --- Retrieval ---
    pub snow_mode: SnowMode,
    pub year: i32,
    pub doy: DayOfYear,
    pub n_bands: usize,

    // --- Accumulation ---
    pub window: DayWindow,
    pub decay: TemporalDecay,

    // --- Prior ---
    pub use_prior: bool,
    pub prior_scale_factor: f64,

    // --- Numerics ---
    pub max_condition_number: f64,
    pub min_weighted_samples: f64,
    pub gof_tolerance: f64,
}

impl InversionParams {
    /// Equivalent to [`InversionParams::default()`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Fluent, validating builder.
    pub fn builder() -> InversionParamsBuilder {
        InversionParamsBuilder::new()
    }

    /// Size of the parameter vector.
    #[inline]
    pub fn n_params(&self) -> usize {
        n_params(self.n_bands)
    }

    /// Retrieval date on the window axis.
    #[inline]
    pub fn target_day(&self) -> WindowDay {
        self.doy as WindowDay - 1
    }

    /// Re-run the builder checks on parameters obtained some other way (e.g. deserialized).
    pub fn validated(self) -> Result<Self, InversionError> {
        InversionParamsBuilder { params: self }.build()
    }
}

impl Default for InversionParams {
    fn default() -> Self {
        InversionParams {
            snow_mode: SnowMode::NoSnow,
            year: 2005,
            doy: 1,
            n_bands: DEFAULT_N_BANDS,

            window: DayWindow::default(),
            decay: TemporalDecay::default(),

            use_prior: true,
            prior_scale_factor: DEFAULT_PRIOR_SCALE_FACTOR,

            max_condition_number: DEFAULT_MAX_CONDITION,
            min_weighted_samples: 0.0,
            gof_tolerance: DEFAULT_GOF_TOLERANCE,
        }
    }
}

/// Builder for [`InversionParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct InversionParamsBuilder {
    params: InversionParams,
}

impl InversionParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: InversionParams::default(),
        }
    }

    // --- Retrieval ---
    pub fn snow_mode(mut self, v: SnowMode) -> Self {
        self.params.snow_mode = v;
        self
    }
    pub fn year(mut self, v: i32) -> Self {
        self.params.year = v;
        self
    }
    pub fn doy(mut self, v: DayOfYear) -> Self {
        self.params.doy = v;
        self
    }
    pub fn n_bands(mut self, v: usize) -> Self {
        self.params.n_bands = v;
        self
    }

    // --- Accumulation ---
    pub fn window(mut self, v: DayWindow) -> Self {
        self.params.window = v;
        self
    }
    pub fn decay(mut self, v: TemporalDecay) -> Self {
        self.params.decay = v;
        self
    }
    /// Shorthand for an exponential decay with the given e-folding length.
    pub fn halflife_days(mut self, v: f64) -> Self {
        self.params.decay = TemporalDecay::Exponential { halflife_days: v };
        self
    }

    // --- Prior ---
    pub fn use_prior(mut self, v: bool) -> Self {
        self.params.use_prior = v;
        self
    }
    pub fn prior_scale_factor(mut self, v: f64) -> Self {
        self.params.prior_scale_factor = v;
        self
    }

    // --- Numerics ---
    pub fn max_condition_number(mut self, v: f64) -> Self {
        self.params.max_condition_number = v;
        self
    }
    pub fn min_weighted_samples(mut self, v: f64) -> Self {
        self.params.min_weighted_samples = v;
        self
    }
    pub fn gof_tolerance(mut self, v: f64) -> Self {
        self.params.gof_tolerance = v;
        self
    }

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Return true iff x >= 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `1 ≤ doy ≤ 366`, `n_bands ≥ 1`.
    /// * `window.start ≤ window.end`, and the retrieval date lies inside the window.
    /// * the decay width is strictly positive and finite.
    /// * `max_condition_number > 1`, `prior_scale_factor > 0`.
    /// * `min_weighted_samples ≥ 0`, `gof_tolerance ≥ 0`.
    ///
    /// Returns
    /// -----------------
    /// * `Ok(InversionParams)` if all values are valid.
    /// * `Err(InversionError::InvalidInversionParameter)` naming the first offending option.
    pub fn build(self) -> Result<InversionParams, InversionError> {
        let p = &self.params;
        let invalid = |msg: &str| Err(InversionError::InvalidInversionParameter(msg.into()));

        if !(1..=366).contains(&p.doy) {
            return invalid("doy must be in 1..=366");
        }
        if p.n_bands == 0 {
            return invalid("n_bands must be >= 1");
        }
        if p.window.is_empty() {
            return invalid("window start must not exceed window end");
        }
        if !p.window.contains(p.target_day()) {
            return invalid("retrieval date must lie inside the window");
        }
        if !p.decay.is_well_formed() {
            return invalid("decay width must be > 0");
        }
        if !(Self::gt0(p.max_condition_number - 1.0)) {
            return invalid("max_condition_number must be > 1");
        }
        if !Self::gt0(p.prior_scale_factor) {
            return invalid("prior_scale_factor must be > 0");
        }
        if !Self::ge0(p.min_weighted_samples) {
            return invalid("min_weighted_samples must be >= 0");
        }
        if !Self::ge0(p.gof_tolerance) {
            return invalid("gof_tolerance must be >= 0");
        }

        Ok(self.params)
    }
}

impl fmt::Display for InversionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 44;
            writeln!(f, "BRDF Inversion Parameters")?;
            writeln!(f, "-------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = " ".repeat(PARAM_COL.saturating_sub(s.len()).max(1));
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Retrieval]")?;
            line!("snow_mode            = {}", self.snow_mode, "Snow / no-snow retrieval")?;
            line!("year                 = {}", self.year, "Target year")?;
            line!("doy                  = {}", self.doy, "Target day of year")?;
            line!("n_bands              = {}", self.n_bands, "Spectral bands (3 kernels each)")?;

            writeln!(f, "\n[Accumulation]")?;
            line!("window               = {}", self.window, "Contributing window days")?;
            line!("decay                = {}", self.decay, "Temporal weighting law")?;

            writeln!(f, "\n[Prior]")?;
            line!("use_prior            = {}", self.use_prior, "Combine with prior")?;
            line!(
                "prior_scale_factor   = {:.2}",
                self.prior_scale_factor,
                "Scale on prior SDs"
            )?;

            writeln!(f, "\n[Numerics]")?;
            line!(
                "max_condition_number = {:.1e}",
                self.max_condition_number,
                "Singular-system threshold"
            )?;
            line!(
                "min_weighted_samples = {:.3}",
                self.min_weighted_samples,
                "Insufficient-data threshold"
            )?;
            line!(
                "gof_tolerance        = {:.1e}",
                self.gof_tolerance,
                "Relative rounding slack on GoF"
            )?;
            Ok(())
        } else {
            write!(
                f,
                "InversionParams(mode={}, date={}-{:03}, bands={}, window={}, decay={}, prior={}, scale={:.1}, cond≤{:.1e})",
                self.snow_mode,
                self.year,
                self.doy,
                self.n_bands,
                self.window,
                self.decay,
                self.use_prior,
                self.prior_scale_factor,
                self.max_condition_number,
            )
        }
    }
}

#[cfg(test)]
mod inversion_params_tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let p = InversionParams::default().validated().unwrap();
        assert_eq!(p.n_params(), 9);
        assert_eq!(p.target_day(), 0);
    }

    #[test]
    fn test_builder_rejects() {
        assert!(InversionParams::builder().doy(0).build().is_err());
        assert!(InversionParams::builder().doy(367).build().is_err());
        assert!(InversionParams::builder().n_bands(0).build().is_err());
        assert!(InversionParams::builder().halflife_days(0.0).build().is_err());
        assert!(InversionParams::builder().halflife_days(f64::NAN).build().is_err());
        assert!(InversionParams::builder().max_condition_number(1.0).build().is_err());
        assert!(InversionParams::builder().prior_scale_factor(-1.0).build().is_err());
        assert!(InversionParams::builder().gof_tolerance(f64::NAN).build().is_err());
        assert!(InversionParams::builder()
            .window(DayWindow::new(10, 20))
            .doy(1)
            .build()
            .is_err());
    }

    #[test]
    fn test_builder_accepts() {
        let p = InversionParams::builder()
            .year(2010)
            .doy(366)
            .n_bands(1)
            .snow_mode(SnowMode::Snow)
            .decay(TemporalDecay::Gaussian { sigma_days: 15.0 })
            .use_prior(false)
            .build()
            .unwrap();
        assert_eq!(p.n_params(), 3);
        assert_eq!(p.target_day(), 365);
    }

    #[test]
    fn test_display() {
        let p = InversionParams::default();
        let compact = format!("{p}");
        assert!(compact.starts_with("InversionParams(mode=no_snow, date=2005-001"));
        let pretty = format!("{p:#}");
        assert!(pretty.contains("[Accumulation]"));
        assert!(pretty.contains("exponential(halflife=11.54d)"));
    }
}
