//! # albedo_inversion
//!
//! Temporal accumulation of directional reflectance observations and weighted
//! least-squares inversion of a three-kernel BRDF model (isotropic, volumetric, geometric)
//! per spectral band, optionally constrained by a Gaussian prior.
//!
//! Pipeline, per pixel and snow mode:
//!
//! 1. [`accumulation::daily`] – one normal-equation system per day.
//! 2. [`accumulation::full`] – temporally weighted sum over the window.
//! 3. [`posterior`] – prior added in information form.
//! 4. [`solver`] – parameters and covariance.
//! 5. [`quality`] – entropy, relative entropy, goodness of fit.
//!
//! [`inversion::pixel::PixelInversion`] chains these stages, [`batch`] drives whole tiles,
//! [`merge`] combines the snow and no-snow retrievals and [`albedo`] integrates the result
//! into black-sky and white-sky albedo.
pub mod accumulation;
pub mod albedo;
pub mod batch;
pub mod constants;
pub mod inversion;
pub mod inversion_errors;
pub mod merge;
pub mod normal_equations;
pub mod observation;
pub mod posterior;
pub mod prior;
pub mod quality;
pub mod solver;

pub use accumulation::{daily::DailyAccumulator, full::FullAccumulator, DayWindow, TemporalDecay};
pub use batch::{PixelInputs, PixelSet};
pub use constants::{PixelIndex, SnowMode};
pub use inversion::inversion_result::{InversionOutcome, InversionResult};
pub use inversion::pixel::PixelInversion;
pub use inversion::InversionParams;
pub use inversion_errors::InversionError;
pub use observation::{BandSample, Observation};
pub use prior::{PriorParameters, PriorRecord};
