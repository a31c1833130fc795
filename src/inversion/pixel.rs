//! # Per-pixel inversion
//!
//! [`PixelInversion`] runs the whole pipeline for one pixel and one snow mode:
//!
//! ```text
//! AccumulatingDaily → Aggregating → CombiningPrior → Solving → ComputingQuality → Done
//!                                                      │              │
//!                                                      └──── Failed ──┘
//! ```
//!
//! Expected failures (no data, singular system) and numeric anomalies never escape as
//! errors from [`PixelInversion::run_observations`] / [`PixelInversion::run_daily`]: they
//! yield an [`InversionOutcome`] holding the no-data record and the reason. Callers that
//! prefer `?` use the `try_invert_*` variants.
//!
//! An instance borrows the parameters read-only and holds no shared state, so one instance
//! per pixel (or per worker) is all the synchronization needed.
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace, warn};

use crate::accumulation::daily::DailyAccumulator;
use crate::accumulation::full::FullAccumulator;
use crate::constants::WindowDay;
use crate::inversion::inversion_result::{InversionOutcome, InversionResult};
use crate::inversion::InversionParams;
use crate::inversion_errors::{FailureKind, InversionError};
use crate::observation::Observation;
use crate::posterior::{combine_with_prior, PosteriorSystem, PriorUsage};
use crate::prior::{PriorParameters, PriorRecord};
use crate::quality::compute_quality;
use crate::solver::solve_normal_equations;

/// Pipeline position of a [`PixelInversion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InversionStage {
    AccumulatingDaily,
    Aggregating,
    CombiningPrior,
    Solving,
    ComputingQuality,
    Done,
    Failed,
}

impl InversionStage {
    /// True for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, InversionStage::Done | InversionStage::Failed)
    }
}

impl fmt::Display for InversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InversionStage::AccumulatingDaily => "accumulating daily",
            InversionStage::Aggregating => "aggregating",
            InversionStage::CombiningPrior => "combining prior",
            InversionStage::Solving => "solving",
            InversionStage::ComputingQuality => "computing quality",
            InversionStage::Done => "done",
            InversionStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where the prior of a run comes from.
enum PriorSource<'p> {
    Normalized(Option<&'p PriorParameters>),
    /// The raw record could not be normalized.
    Unreadable(InversionError),
}

/// Orchestrator of one pixel inversion.
#[derive(Debug, Clone)]
pub struct PixelInversion<'a> {
    params: &'a InversionParams,
    stage: InversionStage,
}

impl<'a> PixelInversion<'a> {
    pub fn new(params: &'a InversionParams) -> Self {
        PixelInversion {
            params,
            stage: InversionStage::AccumulatingDaily,
        }
    }

    /// Current (or final) stage.
    #[inline]
    pub fn stage(&self) -> InversionStage {
        self.stage
    }

    #[inline]
    pub fn params(&self) -> &InversionParams {
        self.params
    }

    /// Invert a pixel from its raw observations.
    ///
    /// Observations are grouped by window day, folded into daily accumulators, then
    /// processed as in [`PixelInversion::run_daily`]. Observations outside the window,
    /// masked, or of the other snow mode do not contribute.
    ///
    /// Arguments
    /// -----------------
    /// * `observations`: every observation of the pixel, in any order.
    /// * `prior`: normalized prior of the pixel, if any.
    ///
    /// Return
    /// ----------
    /// * An [`InversionOutcome`]; on failure its result is the no-data record.
    pub fn run_observations(
        &mut self,
        observations: &[Observation],
        prior: Option<&PriorParameters>,
    ) -> InversionOutcome {
        self.run_observations_from(observations, PriorSource::Normalized(prior))
    }

    /// Same as [`PixelInversion::run_observations`] with a raw prior record.
    ///
    /// A record that cannot be normalized is reported as [`PriorUsage::Rejected`] and the
    /// pixel is inverted without prior.
    pub fn run_observations_with_record(
        &mut self,
        observations: &[Observation],
        record: Option<&PriorRecord>,
    ) -> InversionOutcome {
        let normalized = record
            .map(|r| PriorParameters::from_record(r, self.params.prior_scale_factor))
            .transpose();
        match normalized {
            Ok(prior) => {
                self.run_observations_from(observations, PriorSource::Normalized(prior.as_ref()))
            }
            Err(err) => {
                debug!(%err, "prior record unreadable");
                self.run_observations_from(observations, PriorSource::Unreadable(err))
            }
        }
    }

    /// Invert a pixel from precomputed daily accumulators.
    ///
    /// See also
    /// ------------
    /// * [`FullAccumulator::accumulate`] – windowing and weighting of `dailies`.
    pub fn run_daily(
        &mut self,
        dailies: &[DailyAccumulator],
        prior: Option<&PriorParameters>,
    ) -> InversionOutcome {
        self.transition(InversionStage::AccumulatingDaily);
        self.run_from_dailies(dailies, PriorSource::Normalized(prior))
    }

    /// [`PixelInversion::run_observations`], returning the failure as an error.
    pub fn try_invert_observations(
        &mut self,
        observations: &[Observation],
        prior: Option<&PriorParameters>,
    ) -> Result<InversionResult, InversionError> {
        self.run_observations(observations, prior).into_result()
    }

    /// [`PixelInversion::run_daily`], returning the failure as an error.
    pub fn try_invert_daily(
        &mut self,
        dailies: &[DailyAccumulator],
        prior: Option<&PriorParameters>,
    ) -> Result<InversionResult, InversionError> {
        self.run_daily(dailies, prior).into_result()
    }

    fn run_observations_from(
        &mut self,
        observations: &[Observation],
        prior: PriorSource<'_>,
    ) -> InversionOutcome {
        self.transition(InversionStage::AccumulatingDaily);
        match self.daily_accumulators(observations) {
            Ok(dailies) => self.run_from_dailies(&dailies, prior),
            Err(err) => {
                let usage = self.usage_before_prior(&prior, &err);
                self.finish(Err(err), usage)
            }
        }
    }

    fn daily_accumulators(
        &self,
        observations: &[Observation],
    ) -> Result<Vec<DailyAccumulator>, InversionError> {
        let mut by_day: BTreeMap<WindowDay, Vec<&Observation>> = BTreeMap::new();
        for obs in observations {
            by_day
                .entry(obs.window_day(self.params.year))
                .or_default()
                .push(obs);
        }
        by_day
            .into_iter()
            .map(|(day, group)| {
                DailyAccumulator::from_observations(
                    day,
                    group,
                    self.params.n_bands,
                    self.params.snow_mode,
                )
            })
            .collect()
    }

    fn run_from_dailies(
        &mut self,
        dailies: &[DailyAccumulator],
        prior: PriorSource<'_>,
    ) -> InversionOutcome {
        self.transition(InversionStage::Aggregating);
        let full = match FullAccumulator::accumulate(
            self.params.n_params(),
            dailies,
            self.params.target_day(),
            &self.params.window,
            &self.params.decay,
        ) {
            Ok(full) => full,
            Err(err) => {
                let usage = self.usage_before_prior(&prior, &err);
                return self.finish(Err(err), usage);
            }
        };

        self.transition(InversionStage::CombiningPrior);
        let posterior = match prior {
            PriorSource::Normalized(p) => combine_with_prior(&full, p, self.params.use_prior),
            PriorSource::Unreadable(err) => {
                let mut posterior = combine_with_prior(&full, None, self.params.use_prior);
                if self.params.use_prior {
                    posterior.usage = PriorUsage::Rejected(err);
                }
                posterior
            }
        };
        let usage = posterior.usage.clone();

        let result = self.solve_and_assess(&full, &posterior);
        self.finish(result, usage)
    }

    fn solve_and_assess(
        &mut self,
        full: &FullAccumulator,
        posterior: &PosteriorSystem,
    ) -> Result<InversionResult, InversionError> {
        self.transition(InversionStage::Solving);
        if !posterior.usage.is_applied()
            && posterior.weighted_samples <= self.params.min_weighted_samples
        {
            return Err(InversionError::InsufficientData(posterior.weighted_samples));
        }
        let solved = solve_normal_equations(
            &posterior.m,
            &posterior.v,
            self.params.max_condition_number,
        )?;
        trace!(method = %solved.method, condition = solved.condition_number, "system solved");

        self.transition(InversionStage::ComputingQuality);
        let quality = compute_quality(posterior, full, &solved, self.params.gof_tolerance)?;

        Ok(InversionResult {
            parameters: solved.parameters,
            covariance: solved.covariance,
            entropy: quality.entropy,
            relative_entropy: quality.relative_entropy,
            weighted_samples: quality.weighted_samples,
            days_to_closest_sample: quality.days_to_closest_sample,
            goodness_of_fit: quality.goodness_of_fit,
            snow_mode: self.params.snow_mode,
        })
    }

    /// Prior provenance of a run that failed before the prior step.
    fn usage_before_prior(&self, prior: &PriorSource<'_>, err: &InversionError) -> PriorUsage {
        match prior {
            _ if !self.params.use_prior => PriorUsage::NotRequested,
            PriorSource::Normalized(None) => PriorUsage::Absent,
            PriorSource::Normalized(Some(_)) => PriorUsage::Rejected(err.clone()),
            PriorSource::Unreadable(e) => PriorUsage::Rejected(e.clone()),
        }
    }

    fn finish(
        &mut self,
        result: Result<InversionResult, InversionError>,
        prior_usage: PriorUsage,
    ) -> InversionOutcome {
        match result {
            Ok(result) => {
                self.transition(InversionStage::Done);
                InversionOutcome {
                    result,
                    prior_usage,
                    failure: None,
                    stage: InversionStage::Done,
                }
            }
            Err(err) => {
                match err.kind() {
                    FailureKind::NumericAnomaly => {
                        warn!(stage = %self.stage, %err, "numeric anomaly in pixel inversion")
                    }
                    _ => debug!(stage = %self.stage, %err, "pixel inversion failed"),
                }
                self.transition(InversionStage::Failed);
                InversionOutcome {
                    result: InversionResult::no_data(
                        self.params.n_params(),
                        self.params.snow_mode,
                    ),
                    prior_usage,
                    failure: Some(err),
                    stage: InversionStage::Failed,
                }
            }
        }
    }

    fn transition(&mut self, next: InversionStage) {
        trace!(from = %self.stage, to = %next, "inversion stage");
        self.stage = next;
    }
}
