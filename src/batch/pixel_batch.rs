//! # Batch drivers
//!
//! [`PixelBatch`] is implemented by [`PixelSet`] and runs [`PixelInputs::invert`] on every
//! pixel with one shared [`InversionParams`].
//!
//! * `invert_all` – sequential; with the `progress` feature a progress bar reports the
//!   throughput and the running failure count.
//! * `invert_all_with_cancel` – polls `should_cancel()` on a wall-clock interval (not an
//!   iteration count) so cancellation latency stays bounded whatever the pixel cost. Pixels
//!   processed before cancellation keep their results.
//! * `invert_all_par` (feature `parallel`) – same as `invert_all` on the rayon pool.
//!
//! Each driver ends with one `info` line carrying the [`FailureStats`] of the batch.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::info;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::batch::{BatchInversionResult, FailureStats, PixelInputs, PixelSet};
use crate::inversion::InversionParams;

/// Interval between two calls of the cancellation predicate.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub trait PixelBatch {
    /// Invert every pixel of the set.
    ///
    /// Arguments
    /// -----------------
    /// * `params`: configuration shared by every pixel.
    ///
    /// Return
    /// ----------
    /// * One [`InversionOutcome`](crate::inversion::inversion_result::InversionOutcome) per
    ///   pixel; failures are isolated to their pixel.
    fn invert_all(&self, params: &InversionParams) -> BatchInversionResult;

    /// [`PixelBatch::invert_all`] with cooperative cancellation.
    ///
    /// `should_cancel` is called at most every 20 ms; when it returns `true` the loop stops
    /// and the outcomes gathered so far are returned.
    fn invert_all_with_cancel<F>(
        &self,
        params: &InversionParams,
        should_cancel: F,
    ) -> BatchInversionResult
    where
        F: FnMut() -> bool;

    /// [`PixelBatch::invert_all`] on the rayon thread pool.
    #[cfg(feature = "parallel")]
    fn invert_all_par(&self, params: &InversionParams) -> BatchInversionResult;

    /// Total number of observations across pixels.
    fn total_observations(&self) -> usize;

    fn number_of_pixels(&self) -> usize;
}

#[cfg(feature = "progress")]
fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new((len as u64).max(1));
    let style = ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

fn log_summary(stats: &FailureStats, elapsed: Duration, cancelled: bool) {
    info!(
        %stats,
        elapsed_ms = elapsed.as_millis() as u64,
        cancelled,
        "batch inversion finished"
    );
}

impl PixelBatch for PixelSet {
    fn invert_all(&self, params: &InversionParams) -> BatchInversionResult {
        self.invert_all_with_cancel(params, || false)
    }

    fn invert_all_with_cancel<F>(
        &self,
        params: &InversionParams,
        mut should_cancel: F,
    ) -> BatchInversionResult
    where
        F: FnMut() -> bool,
    {
        let start = Instant::now();
        let mut results: BatchInversionResult = HashMap::default();
        let mut stats = FailureStats::default();
        let mut cancelled = false;

        #[cfg(feature = "progress")]
        let pb = progress_bar(self.len());

        let mut last_poll = Instant::now();
        for (pixel, inputs) in self.iter() {
            if last_poll.elapsed() >= POLL_INTERVAL {
                if should_cancel() {
                    cancelled = true;
                    break;
                }
                last_poll = Instant::now();
            }

            let outcome = inputs.invert(params);
            stats.record(&outcome);
            results.insert(*pixel, outcome);

            #[cfg(feature = "progress")]
            {
                pb.set_message(format!("failed: {}", stats.failed()));
                pb.inc(1);
            }
        }

        #[cfg(feature = "progress")]
        {
            pb.disable_steady_tick();
            pb.finish_and_clear();
        }

        log_summary(&stats, start.elapsed(), cancelled);
        results
    }

    #[cfg(feature = "parallel")]
    fn invert_all_par(&self, params: &InversionParams) -> BatchInversionResult {
        let start = Instant::now();
        let results: BatchInversionResult = self
            .par_iter()
            .map(|(pixel, inputs)| (*pixel, inputs.invert(params)))
            .collect();
        log_summary(
            &FailureStats::from_outcomes(results.values()),
            start.elapsed(),
            false,
        );
        results
    }

    #[inline]
    fn total_observations(&self) -> usize {
        self.values().map(|p: &PixelInputs| p.observations.len()).sum()
    }

    #[inline]
    fn number_of_pixels(&self) -> usize {
        self.len()
    }
}
