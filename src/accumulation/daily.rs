//! # Daily accumulation
//!
//! A [`DailyAccumulator`] is the normal-equation system of one pixel on one day. Every usable
//! observation `o` of that day adds
//!
//! ```text
//! M += Kₒᵗ Cₒ⁻¹ Kₒ     V += Kₒᵗ Cₒ⁻¹ ρₒ     E += ρₒᵗ Cₒ⁻¹ ρₒ     n += 1
//! ```
//!
//! With uncorrelated band errors `Cₒ⁻¹ = diag(1/σ²)`, i.e. the usual inverse-variance weight.
//! A day without usable observations yields the all-zero accumulator, which is the additive
//! identity of the full accumulation.
use tracing::trace;

use crate::constants::{n_params, SnowMode, WindowDay};
use crate::inversion_errors::InversionError;
use crate::normal_equations::NormalEquations;
use crate::observation::Observation;

#[derive(Debug, Clone, PartialEq)]
pub struct DailyAccumulator {
    system: NormalEquations,
    day: WindowDay,
}

impl DailyAccumulator {
    /// The "no data" accumulator for `day`.
    pub fn empty(n_params: usize, day: WindowDay) -> Self {
        DailyAccumulator {
            system: NormalEquations::zeros(n_params),
            day,
        }
    }

    /// Wrap an already accumulated system (e.g. one read back from storage).
    pub fn from_system(system: NormalEquations, day: WindowDay) -> Self {
        DailyAccumulator { system, day }
    }

    /// Fold the observations of one day into a daily system.
    ///
    /// Arguments
    /// -----------------
    /// * `day`: window day the observations belong to.
    /// * `observations`: every observation of the pixel on that day, usable or not.
    /// * `n_bands`: number of spectral bands of the retrieval.
    /// * `mode`: snow mode; observations with the other snow flag are skipped.
    ///
    /// Return
    /// ----------
    /// * The daily accumulator; all-zero when nothing was usable.
    /// * `Err(InversionError::DimensionMismatch)` if an observation does not carry `n_bands` bands.
    pub fn from_observations<'a, I>(
        day: WindowDay,
        observations: I,
        n_bands: usize,
        mode: SnowMode,
    ) -> Result<Self, InversionError>
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        let mut system = NormalEquations::zeros(n_params(n_bands));

        for obs in observations {
            if obs.n_bands() != n_bands {
                return Err(InversionError::DimensionMismatch {
                    what: "observation bands",
                    expected: n_bands,
                    found: obs.n_bands(),
                });
            }
            if let Some(reason) = obs.rejection(mode) {
                trace!(day, %reason, "observation skipped");
                continue;
            }
            let c_inv = match obs.inverse_band_covariance() {
                Ok(c_inv) => c_inv,
                Err(reason) => {
                    trace!(day, %reason, "observation skipped");
                    continue;
                }
            };
            system.add_observation(&obs.kernel_matrix(), &c_inv, &obs.reflectances());
        }

        Ok(DailyAccumulator { system, day })
    }

    /// Merge two accumulators of the same day (e.g. two sensors).
    pub fn combine(&self, other: &DailyAccumulator) -> Result<Self, InversionError> {
        if self.day != other.day {
            return Err(InversionError::InvalidObservation(format!(
                "cannot merge daily accumulators of days {} and {}",
                self.day, other.day
            )));
        }
        Ok(DailyAccumulator {
            system: self.system.combine(&other.system)?,
            day: self.day,
        })
    }

    #[inline]
    pub fn day(&self) -> WindowDay {
        self.day
    }

    #[inline]
    pub fn system(&self) -> &NormalEquations {
        &self.system
    }

    #[inline]
    pub fn weighted_samples(&self) -> f64 {
        self.system.weighted_samples()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.system.is_empty()
    }

    #[inline]
    pub fn n_params(&self) -> usize {
        self.system.n_params()
    }
}
