//! # Prior combination
//!
//! Bayesian linear-Gaussian update in information form:
//!
//! ```text
//! M_post = M_obs + C_prior⁻¹
//! V_post = V_obs + C_prior⁻¹ · mean_prior
//! ```
//!
//! When the prior is absent, not requested or unusable, the posterior system is the
//! observation system unchanged and [`PriorUsage`] records why. A rejected prior never fails
//! a pixel.
use nalgebra::{DMatrix, DVector};
use std::fmt;
use tracing::debug;

use crate::accumulation::full::FullAccumulator;
use crate::inversion_errors::InversionError;
use crate::prior::PriorParameters;

/// Provenance of the prior term in a posterior system.
#[derive(Debug, Clone, PartialEq)]
pub enum PriorUsage {
    Applied,
    /// The caller asked for a prior-free inversion.
    NotRequested,
    /// No prior was supplied for this pixel.
    Absent,
    /// A prior was supplied but could not be used.
    Rejected(InversionError),
}

impl PriorUsage {
    #[inline]
    pub fn is_applied(&self) -> bool {
        matches!(self, PriorUsage::Applied)
    }
}

impl fmt::Display for PriorUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorUsage::Applied => write!(f, "applied"),
            PriorUsage::NotRequested => write!(f, "not requested"),
            PriorUsage::Absent => write!(f, "absent"),
            PriorUsage::Rejected(e) => write!(f, "rejected ({e})"),
        }
    }
}

/// Normal equations after the prior step.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorSystem {
    pub m: DMatrix<f64>,
    pub v: DVector<f64>,
    pub weighted_samples: f64,
    pub usage: PriorUsage,
    /// Information matrix of the prior when it was applied.
    pub prior_information: Option<DMatrix<f64>>,
    /// Prior mean when it was applied.
    pub prior_mean: Option<DVector<f64>>,
}

/// Combine a windowed observation system with an optional prior.
///
/// Arguments
/// -----------------
/// * `full`: the aggregated observation system.
/// * `prior`: the pixel's prior, if any.
/// * `use_prior`: `false` forces a prior-free inversion.
///
/// Return
/// ----------
/// * A [`PosteriorSystem`]. Unless the usage is [`PriorUsage::Applied`], `m` and `v` are
///   exact copies of the observation system.
pub fn combine_with_prior(
    full: &FullAccumulator,
    prior: Option<&PriorParameters>,
    use_prior: bool,
) -> PosteriorSystem {
    let obs = full.system();
    let observation_only = |usage: PriorUsage| PosteriorSystem {
        m: obs.m().clone(),
        v: obs.v().clone(),
        weighted_samples: obs.weighted_samples(),
        usage,
        prior_information: None,
        prior_mean: None,
    };

    if !use_prior {
        return observation_only(PriorUsage::NotRequested);
    }
    let Some(prior) = prior else {
        return observation_only(PriorUsage::Absent);
    };

    if prior.n_params() != obs.n_params() {
        let err = InversionError::DimensionMismatch {
            what: "prior parameters",
            expected: obs.n_params(),
            found: prior.n_params(),
        };
        debug!(%err, "prior rejected");
        return observation_only(PriorUsage::Rejected(err));
    }

    match prior.information_form() {
        Ok(info) => PosteriorSystem {
            m: obs.m() + &info.m,
            v: obs.v() + &info.v,
            weighted_samples: obs.weighted_samples(),
            usage: PriorUsage::Applied,
            prior_information: Some(info.m),
            prior_mean: Some(prior.mean().clone()),
        },
        Err(err) => {
            debug!(%err, "prior rejected");
            observation_only(PriorUsage::Rejected(err))
        }
    }
}
