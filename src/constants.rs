//! Numerical constants shared across the engine.
use crate::C64;

/// The imaginary unit, for convenience in Hamiltonian/propagator expressions.
pub static I: C64 = C64::new(0., 1.);

/// Relative tolerance below which a Lanczos/Arnoldi beta is treated as a breakdown (§A.4.8).
pub const BREAKDOWN_TOL: f64 = 1e-12;

/// Ritz-residual tolerance below which Lanczos terminates early (§A.4.8).
pub const LANCZOS_RESIDUAL_TOL: f64 = 1e-10;

/// Relative eigenvalue-modulus bound for the power-law exponential fit (§A.4.2).
pub const FIT_EIGENVALUE_EPS: f64 = 1e-8;

/// Relative-cutoff applied to `pinv` in the power-law fit's QR step (§A.9 design note).
pub const FIT_PINV_CUTOFF: f64 = 1e-12;

/// Fraction of discarded squared norm above which a truncated SVD is flagged
/// `TRUNCATION_DEGRADED` (§A.7).
pub const TRUNCATION_DEGRADED_THRESHOLD: f64 = 1e-2;
