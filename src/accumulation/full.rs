//! # Full (windowed) accumulation
//!
//! Combines the daily systems of a window into the single system inverted for one retrieval
//! date:
//!
//! ```text
//! M = Σ w(d)·M_d    V = Σ w(d)·V_d    E = Σ w(d)·E_d    n = Σ w(d)·n_d
//! w(d) = weighting(|target − d|)
//! ```
//!
//! Daily systems are summed in ascending day order whatever the order they were supplied in,
//! so results are reproducible bit for bit across permutations of distinct days.
use itertools::Itertools;
use tracing::debug;

use crate::accumulation::daily::DailyAccumulator;
use crate::accumulation::{DayWindow, TemporalWeighting};
use crate::constants::{WindowDay, NO_DATA_DAYS};
use crate::inversion_errors::InversionError;
use crate::normal_equations::NormalEquations;

#[derive(Debug, Clone, PartialEq)]
pub struct FullAccumulator {
    system: NormalEquations,
    target_day: WindowDay,
    days_to_closest_sample: Option<u32>,
    days_with_data: usize,
}

impl FullAccumulator {
    /// The zero accumulator: no day of the window carried data.
    pub fn empty(n_params: usize, target_day: WindowDay) -> Self {
        FullAccumulator {
            system: NormalEquations::zeros(n_params),
            target_day,
            days_to_closest_sample: None,
            days_with_data: 0,
        }
    }

    /// Aggregate the daily systems of a window around `target_day`.
    ///
    /// Arguments
    /// -----------------
    /// * `n_params`: size of the parameter vector (`3 × n_bands`).
    /// * `dailies`: daily accumulators in any order; days outside `window` are ignored.
    /// * `target_day`: retrieval date on the window axis.
    /// * `window`: inclusive range of contributing days.
    /// * `weighting`: temporal decay applied to `|target_day − day|`.
    ///
    /// Return
    /// ----------
    /// * The weighted sum, with `days_to_closest_sample` the smallest distance between the
    ///   target and a day holding at least one sample (`None` if there is none).
    /// * `Err(InversionError::DimensionMismatch)` if a daily system has another size.
    ///
    /// See also
    /// ------------
    /// * [`crate::accumulation::TemporalDecay`] – built-in decay laws.
    pub fn accumulate<W>(
        n_params: usize,
        dailies: &[DailyAccumulator],
        target_day: WindowDay,
        window: &DayWindow,
        weighting: &W,
    ) -> Result<Self, InversionError>
    where
        W: TemporalWeighting + ?Sized,
    {
        let mut acc = FullAccumulator::empty(n_params, target_day);

        let (inside, outside): (Vec<&DailyAccumulator>, Vec<&DailyAccumulator>) =
            dailies.iter().partition(|d| window.contains(d.day()));
        if !outside.is_empty() {
            debug!(
                ignored = outside.len(),
                %window,
                "daily accumulators outside the window ignored"
            );
        }

        for daily in inside.into_iter().sorted_by_key(|d| d.day()) {
            if daily.n_params() != n_params {
                return Err(InversionError::DimensionMismatch {
                    what: "daily accumulator",
                    expected: n_params,
                    found: daily.n_params(),
                });
            }
            if daily.is_empty() {
                continue;
            }

            let days_apart = target_day.abs_diff(daily.day());
            let w = weighting.weight(days_apart);
            acc.system = acc.system.add_scaled(daily.system(), w)?;
            acc.days_with_data += 1;
            acc.days_to_closest_sample = Some(match acc.days_to_closest_sample {
                Some(best) => best.min(days_apart),
                None => days_apart,
            });
        }

        Ok(acc)
    }

    #[inline]
    pub fn system(&self) -> &NormalEquations {
        &self.system
    }

    #[inline]
    pub fn target_day(&self) -> WindowDay {
        self.target_day
    }

    #[inline]
    pub fn days_to_closest_sample(&self) -> Option<u32> {
        self.days_to_closest_sample
    }

    /// Days to closest sample with the no-data marker for an empty window.
    pub fn days_to_closest_sample_or_sentinel(&self) -> i32 {
        self.days_to_closest_sample
            .map_or(NO_DATA_DAYS, |d| i32::try_from(d).unwrap_or(i32::MAX))
    }

    /// Number of days that contributed at least one sample.
    #[inline]
    pub fn days_with_data(&self) -> usize {
        self.days_with_data
    }

    #[inline]
    pub fn weighted_samples(&self) -> f64 {
        self.system.weighted_samples()
    }

    #[inline]
    pub fn n_params(&self) -> usize {
        self.system.n_params()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.system.is_empty()
    }
}
