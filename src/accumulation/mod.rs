//! # Temporal accumulation
//!
//! Observations are folded in two passes:
//!
//! 1. [`daily::DailyAccumulator`] – all usable observations of one pixel on one day,
//! 2. [`full::FullAccumulator`] – the ~545 daily systems of the window, each scaled by a
//!    temporal weight that decreases with the distance (in days) to the retrieval date.
//!
//! ## Window axis
//!
//! Days are indexed relative to January 1st (day 0) of the target year, with 365 days per
//! year. The default [`DayWindow`] covers day −90 through +454: the last quarter of the
//! previous year, the target year, and the whole following year up to the end of March.
//!
//! ## Temporal weighting
//!
//! [`TemporalWeighting`] is the seam between the aggregation and the decay law. It is
//! implemented by [`TemporalDecay`] (the configurable laws) and by any `Fn(u32) -> f64`,
//! so callers can plug an ad-hoc kernel without touching the aggregation.
//!
//! | law | weight(Δ) |
//! |---|---|
//! | `Exponential { halflife_days }` | `exp(−Δ / halflife)` |
//! | `Gaussian { sigma_days }` | `exp(−Δ² / 2σ²)` |
//! | `Boxcar { half_width_days }` | `1` if `Δ ≤ half_width`, else `0` |
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{WindowDay, DEFAULT_HALFLIFE_DAYS, WINDOW_END_DAY, WINDOW_START_DAY};

pub mod daily;
pub mod full;

/// Weight given to a daily system `days_apart` days away from the retrieval date.
///
/// Implementations must depend on the offset alone and be non-increasing in it.
pub trait TemporalWeighting {
    fn weight(&self, days_apart: u32) -> f64;
}

impl<F> TemporalWeighting for F
where
    F: Fn(u32) -> f64,
{
    #[inline]
    fn weight(&self, days_apart: u32) -> f64 {
        self(days_apart)
    }
}

/// Configurable decay laws.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum TemporalDecay {
    Exponential { halflife_days: f64 },
    Gaussian { sigma_days: f64 },
    Boxcar { half_width_days: u32 },
}

impl Default for TemporalDecay {
    fn default() -> Self {
        TemporalDecay::Exponential {
            halflife_days: DEFAULT_HALFLIFE_DAYS,
        }
    }
}

impl TemporalDecay {
    /// True when the law's width parameter is strictly positive and finite.
    pub fn is_well_formed(&self) -> bool {
        match *self {
            TemporalDecay::Exponential { halflife_days } => {
                halflife_days.is_finite() && halflife_days > 0.0
            }
            TemporalDecay::Gaussian { sigma_days } => sigma_days.is_finite() && sigma_days > 0.0,
            TemporalDecay::Boxcar { .. } => true,
        }
    }
}

impl TemporalWeighting for TemporalDecay {
    fn weight(&self, days_apart: u32) -> f64 {
        let d = f64::from(days_apart);
        match *self {
            TemporalDecay::Exponential { halflife_days } => (-d / halflife_days).exp(),
            TemporalDecay::Gaussian { sigma_days } => {
                (-(d * d) / (2.0 * sigma_days * sigma_days)).exp()
            }
            TemporalDecay::Boxcar { half_width_days } => {
                if days_apart <= half_width_days {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for TemporalDecay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalDecay::Exponential { halflife_days } => {
                write!(f, "exponential(halflife={halflife_days:.2}d)")
            }
            TemporalDecay::Gaussian { sigma_days } => write!(f, "gaussian(sigma={sigma_days:.2}d)"),
            TemporalDecay::Boxcar { half_width_days } => {
                write!(f, "boxcar(half_width={half_width_days}d)")
            }
        }
    }
}

/// Inclusive range of window days contributing to a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub start: WindowDay,
    pub end: WindowDay,
}

impl Default for DayWindow {
    fn default() -> Self {
        DayWindow {
            start: WINDOW_START_DAY,
            end: WINDOW_END_DAY,
        }
    }
}

impl DayWindow {
    pub fn new(start: WindowDay, end: WindowDay) -> Self {
        DayWindow { start, end }
    }

    #[inline]
    pub fn contains(&self, day: WindowDay) -> bool {
        (self.start..=self.end).contains(&day)
    }

    /// Number of days in the window (0 when `start > end`).
    #[inline]
    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start + 1) as usize
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn days(&self) -> impl Iterator<Item = WindowDay> {
        self.start..=self.end
    }
}

impl fmt::Display for DayWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[cfg(test)]
mod accumulation_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exponential_default() {
        let decay = TemporalDecay::default();
        assert_eq!(decay.weight(0), 1.0);
        assert_relative_eq!(decay.weight(12), (-12.0f64 / 11.54).exp(), epsilon = 1e-15);
    }

    #[test]
    fn test_laws_are_non_increasing() {
        let laws = [
            TemporalDecay::default(),
            TemporalDecay::Gaussian { sigma_days: 20.0 },
            TemporalDecay::Boxcar { half_width_days: 8 },
        ];
        for law in laws {
            let weights: Vec<f64> = (0..200).map(|d| law.weight(d)).collect();
            assert!(weights.windows(2).all(|w| w[1] <= w[0]), "{law}");
        }
        assert_eq!(TemporalDecay::Boxcar { half_width_days: 8 }.weight(9), 0.0);
    }

    #[test]
    fn test_closure_weighting() {
        let linear = |d: u32| (1.0 - f64::from(d) / 100.0).max(0.0);
        assert_relative_eq!(linear.weight(25), 0.75, epsilon = 1e-15);
    }

    #[test]
    fn test_day_window() {
        let w = DayWindow::default();
        assert_eq!(w.len(), 545);
        assert!(w.contains(-90) && w.contains(454));
        assert!(!w.contains(455));
        assert!(DayWindow::new(3, 2).is_empty());
        assert!(!TemporalDecay::Exponential { halflife_days: 0.0 }.is_well_formed());
    }
}
