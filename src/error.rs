//! Error taxonomy for the core engine (§A.7).
//!
//! Fatal taxa are returned from the constructor that can detect them.
//! Non-fatal taxa never surface as `Err`; they are folded into
//! [`crate::callback::SweepStatus`] instead. See `SPEC_FULL.md` §B.3.

use thiserror::Error;

/// Errors the core engine can return. Never includes the non-fatal taxa of
/// §A.7 (`SOLVER_NON_CONVERGENCE`, `NUMERICAL_BREAKDOWN`,
/// `TRUNCATION_DEGRADED`) — those are reported through the run callback.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TnCoreError {
    /// A channel's parameters are self-inconsistent (Δ ≤ 0, |λ| ≥ 1, n_max ≤ 0, ...).
    #[error("invalid channel configuration: {reason}")]
    ConfigInvalid { reason: String },

    /// The power-law → exponential-sum fit failed its modulus or error bound.
    #[error(
        "power-law fit invalid: {reason} (max_rel_error={max_rel_error:.3e}, bound={bound:.3e})"
    )]
    InvalidFit {
        reason: String,
        max_rel_error: f64,
        bound: f64,
    },

    /// Site-chain length disagrees with MPO/MPS length, or a bond-dimension chain is inconsistent.
    #[error("dimension mismatch: expected {expected}, found {found} ({context})")]
    DimensionMismatch {
        expected: String,
        found: String,
        context: String,
    },
}

pub type Result<T> = std::result::Result<T, TnCoreError>;
