use thiserror::Error;

/// Errors raised by the accumulation and inversion pipeline.
///
/// Per-pixel outcomes (`InsufficientData`, `SingularSystem`, `NumericAnomaly`) are
/// normally absorbed by the orchestrator into a no-data record; they still travel
/// as values so batch statistics and logs can tell them apart.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InversionError {
    #[error("Insufficient data: {0} weighted samples in the accumulation window")]
    InsufficientData(f64),

    #[error("Singular normal-equation system: {0}")]
    SingularSystem(String),

    #[error("Invalid prior: {0}")]
    InvalidPrior(String),

    #[error("Numeric anomaly after solve: {0}")]
    NumericAnomaly(String),

    #[error("Invalid inversion parameter: {0}")]
    InvalidInversionParameter(String),

    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid observation: {0}")]
    InvalidObservation(String),
}

/// Coarse classification of a per-pixel failure, used for batch statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InsufficientData,
    SingularSystem,
    NumericAnomaly,
    Other,
}

impl InversionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            InversionError::InsufficientData(_) => FailureKind::InsufficientData,
            InversionError::SingularSystem(_) => FailureKind::SingularSystem,
            InversionError::NumericAnomaly(_) => FailureKind::NumericAnomaly,
            _ => FailureKind::Other,
        }
    }

    /// True for outcomes caused by sparse or degenerate data rather than by the algorithm.
    pub fn is_expected(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::InsufficientData | FailureKind::SingularSystem
        )
    }
}
