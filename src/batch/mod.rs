//! # Batch inversion over pixel sets
//!
//! A tile is processed pixel by pixel: every pixel carries its own observations and prior,
//! and nothing is shared between pixels except the read-only [`InversionParams`].
//!
//! Data Model
//! -----------------
//! * **Key:** [`PixelIndex`] (raster position).
//! * **Value:** [`PixelInputs`] = observations + optional raw [`PriorRecord`].
//! * **Set:** [`PixelSet`] = `HashMap<PixelIndex, PixelInputs, ahash::RandomState>`.
//! * **Output:** [`BatchInversionResult`] = `PixelIndex → InversionOutcome`, one entry per
//!   processed pixel, failures included.
//!
//! Failures are per pixel and never abort the batch. [`FailureStats`] summarizes them by
//! [`FailureKind`] and is logged at `info` level when a batch ends.
//!
//! Feature Flags
//! -----------------
//! * `progress` – live progress bar (`indicatif`) during [`pixel_batch::PixelBatch::invert_all`].
//! * `parallel` – [`pixel_batch::PixelBatch::invert_all_par`] on the `rayon` thread pool.
//!
//! ```rust,no_run
//! use albedo_inversion::batch::{PixelInputs, PixelSet};
//! use albedo_inversion::batch::pixel_batch::PixelBatch;
//! use albedo_inversion::inversion::InversionParams;
//!
//! let mut tile = PixelSet::default();
//! tile.insert((0, 0).into(), PixelInputs::default());
//! let params = InversionParams::default();
//! let results = tile.invert_all(&params);
//! println!("{:#}", albedo_inversion::batch::FailureStats::from_outcomes(results.values()));
//! ```
use std::{collections::HashMap, fmt};

use ahash::RandomState;
use serde::{Deserialize, Serialize};

use crate::constants::PixelIndex;
use crate::inversion::inversion_result::{InversionOutcome, InversionResult};
use crate::inversion::pixel::PixelInversion;
use crate::inversion::InversionParams;
use crate::inversion_errors::{FailureKind, InversionError};
use crate::observation::Observation;
use crate::prior::PriorRecord;

pub mod pixel_batch;

/// Everything needed to invert one pixel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelInputs {
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub prior: Option<PriorRecord>,
}

impl PixelInputs {
    pub fn new(observations: Vec<Observation>, prior: Option<PriorRecord>) -> Self {
        PixelInputs {
            observations,
            prior,
        }
    }

    /// Run the full pipeline on this pixel.
    pub fn invert(&self, params: &InversionParams) -> InversionOutcome {
        PixelInversion::new(params)
            .run_observations_with_record(&self.observations, self.prior.as_ref())
    }
}

pub type PixelSet = HashMap<PixelIndex, PixelInputs, RandomState>;

pub type BatchInversionResult = HashMap<PixelIndex, InversionOutcome, RandomState>;

/// Borrow the result of a pixel.
///
/// Return
/// ----------
/// * `Ok(Some(&InversionResult))` – the pixel was inverted.
/// * `Ok(None)` – the pixel is not in the map (not processed, or cancelled).
/// * `Err(&InversionError)` – the inversion failed for that pixel.
pub fn result_for<'a>(
    all: &'a BatchInversionResult,
    key: &PixelIndex,
) -> Result<Option<&'a InversionResult>, &'a InversionError> {
    match all.get(key) {
        None => Ok(None),
        Some(outcome) => match &outcome.failure {
            Some(err) => Err(err),
            None => Ok(Some(&outcome.result)),
        },
    }
}

/// Per-kind failure counts of a batch.
///
/// Display
/// -----------------
/// * `format!("{}", stats)` – `total=…, ok=…, insufficient=…, singular=…, anomaly=…, other=…`
/// * `format!("{:#}", stats)` – aligned multi-line table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureStats {
    pub total: usize,
    pub succeeded: usize,
    pub insufficient_data: usize,
    pub singular_system: usize,
    pub numeric_anomaly: usize,
    pub other: usize,
}

impl FailureStats {
    pub fn from_outcomes<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a InversionOutcome>,
    {
        let mut stats = FailureStats::default();
        for outcome in outcomes {
            stats.record(outcome);
        }
        stats
    }

    pub fn record(&mut self, outcome: &InversionOutcome) {
        self.total += 1;
        match outcome.failure.as_ref().map(InversionError::kind) {
            None => self.succeeded += 1,
            Some(FailureKind::InsufficientData) => self.insufficient_data += 1,
            Some(FailureKind::SingularSystem) => self.singular_system += 1,
            Some(FailureKind::NumericAnomaly) => self.numeric_anomaly += 1,
            Some(FailureKind::Other) => self.other += 1,
        }
    }

    #[inline]
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }

    /// 0.0 for an empty batch.
    pub fn fraction_failed(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed() as f64 / self.total as f64
        }
    }
}

impl fmt::Display for FailureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Pixel inversion summary")?;
            writeln!(f, "-----------------------")?;
            writeln!(f, "total             : {}", self.total)?;
            writeln!(f, "succeeded         : {}", self.succeeded)?;
            writeln!(f, "insufficient data : {}", self.insufficient_data)?;
            writeln!(f, "singular system   : {}", self.singular_system)?;
            writeln!(f, "numeric anomaly   : {}", self.numeric_anomaly)?;
            write!(f, "other             : {}", self.other)
        } else {
            write!(
                f,
                "total={}, ok={}, insufficient={}, singular={}, anomaly={}, other={}",
                self.total,
                self.succeeded,
                self.insufficient_data,
                self.singular_system,
                self.numeric_anomaly,
                self.other
            )
        }
    }
}
