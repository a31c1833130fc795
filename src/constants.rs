//! # Constants and type definitions for albedo_inversion
//!
//! This module centralizes the **sentinel values**, **window bounds**, **model coefficients**
//! and **common type definitions** shared by the accumulation, inversion and albedo modules.
//!
//! ## Overview
//!
//! - No-data sentinels written into output records
//! - Temporal window layout and the default decay constant
//! - Spectral band naming
//! - Polynomial coefficients of the kernel integrals used for albedo
//! - Core type aliases (day indices)
//!
//! Parameter vectors are laid out **band-major**: index `3·b + k` holds kernel `k`
//! (0 = isotropic, 1 = volumetric, 2 = geometric) of band `b`.

use serde::{Deserialize, Serialize};
use std::fmt;

// -------------------------------------------------------------------------------------------------
// Sentinels
// -------------------------------------------------------------------------------------------------

/// Value written to every floating-point output field of a failed or empty retrieval.
pub const NO_DATA: f64 = -9999.0;

/// Days-to-closest-sample value when no day in the window carried data.
pub const NO_DATA_DAYS: i32 = -1;

/// Fill value used by some reflectance providers for "not computed".
pub const REFLECTANCE_FILL: f64 = 9999.0;

// -------------------------------------------------------------------------------------------------
// Model layout
// -------------------------------------------------------------------------------------------------

/// Number of BRDF kernels per band (isotropic, volumetric, geometric).
pub const N_KERNELS: usize = 3;

/// Default number of broadband channels (VIS, NIR, SW).
pub const DEFAULT_N_BANDS: usize = 3;

/// Broadband channel names, in parameter order.
pub const BAND_NAMES: [&str; DEFAULT_N_BANDS] = ["VIS", "NIR", "SW"];

/// Days per year on the window axis (leap days fold into the following year).
pub const DAYS_PER_YEAR: i32 = 365;

/// First day of the default accumulation window, relative to January 1st of the target year.
pub const WINDOW_START_DAY: i32 = -90;

/// Last day (inclusive) of the default accumulation window.
pub const WINDOW_END_DAY: i32 = 454;

/// Default e-folding length (days) of the exponential temporal decay.
pub const DEFAULT_HALFLIFE_DAYS: f64 = 11.54;

/// Default factor applied to prior standard deviations.
pub const DEFAULT_PRIOR_SCALE_FACTOR: f64 = 30.0;

/// Upper bound of a scaled prior standard deviation.
pub const PRIOR_MAX_SD: f64 = 1.0;

/// Standard deviation substituted for a zero prior SD on a positive mean.
pub const PRIOR_FALLBACK_SD: f64 = 1.0;

/// Default bound on the condition number of the normal-equation matrix.
pub const DEFAULT_MAX_CONDITION: f64 = 1.0e12;

/// Default relative tolerance under which a negative goodness of fit is treated as rounding.
pub const DEFAULT_GOF_TOLERANCE: f64 = 1.0e-9;

// -------------------------------------------------------------------------------------------------
// Kernel integral polynomials (Ross-Thick / Li-Sparse)
// -------------------------------------------------------------------------------------------------

/// Black-sky polynomial for the volumetric kernel: `g0 + g1·θ² + g2·θ³`.
pub const BSA_VOL_POLY: [f64; 3] = [-0.007574, -0.070887, 0.307588];

/// Black-sky polynomial for the geometric kernel: `g0 + g1·θ² + g2·θ³`.
pub const BSA_GEO_POLY: [f64; 3] = [-1.284909, -0.166314, 0.041840];

/// White-sky integral of the volumetric kernel.
pub const WSA_VOL: f64 = 0.189184;

/// White-sky integral of the geometric kernel.
pub const WSA_GEO: f64 = -1.377622;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Day index on the window axis, relative to January 1st (day 0) of the target year.
pub type WindowDay = i32;

/// Day of year, 1-based.
pub type DayOfYear = u32;

/// Number of BRDF parameters for a given number of bands.
#[inline]
pub fn n_params(n_bands: usize) -> usize {
    N_KERNELS * n_bands
}

// -------------------------------------------------------------------------------------------------
// Identifiers
// -------------------------------------------------------------------------------------------------

/// Raster position of a pixel inside a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelIndex {
    pub x: u32,
    pub y: u32,
}

impl PixelIndex {
    pub fn new(x: u32, y: u32) -> Self {
        PixelIndex { x, y }
    }
}

impl fmt::Display for PixelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(u32, u32)> for PixelIndex {
    fn from((x, y): (u32, u32)) -> Self {
        PixelIndex { x, y }
    }
}

/// Whether a retrieval uses the snow-covered or the snow-free observations and prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnowMode {
    #[default]
    NoSnow,
    Snow,
}

impl SnowMode {
    /// True when an observation with the given snow flag belongs to this mode.
    #[inline]
    pub fn accepts(self, snow: bool) -> bool {
        match self {
            SnowMode::Snow => snow,
            SnowMode::NoSnow => !snow,
        }
    }
}

impl fmt::Display for SnowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnowMode::Snow => write!(f, "snow"),
            SnowMode::NoSnow => write!(f, "no_snow"),
        }
    }
}

impl std::str::FromStr for SnowMode {
    type Err = crate::inversion_errors::InversionError;

    /// Accepts `snow` / `no_snow` (also `nosnow`, `no-snow`), case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snow" => Ok(SnowMode::Snow),
            "no_snow" | "nosnow" | "no-snow" => Ok(SnowMode::NoSnow),
            other => Err(crate::inversion_errors::InversionError::InvalidInversionParameter(
                format!("unknown snow mode '{other}'"),
            )),
        }
    }
}

#[cfg(test)]
mod constants_tests {
    use super::*;

    #[test]
    fn test_window_spans_545_days() {
        assert_eq!(WINDOW_END_DAY - WINDOW_START_DAY + 1, 545);
        assert_eq!(n_params(DEFAULT_N_BANDS), 9);
    }

    #[test]
    fn test_snow_mode_parsing() {
        assert_eq!("snow".parse::<SnowMode>().unwrap(), SnowMode::Snow);
        assert_eq!("No-Snow".parse::<SnowMode>().unwrap(), SnowMode::NoSnow);
        assert!("ice".parse::<SnowMode>().is_err());
        assert_eq!(SnowMode::NoSnow.to_string(), "no_snow");
        assert!(SnowMode::Snow.accepts(true));
        assert!(!SnowMode::NoSnow.accepts(true));
    }
}
