//! Core numerical engine for a 1D tensor-network (MPS/MPO) ground-state and
//! time-evolution simulator: channel compilation through an FSM into
//! bond-dimension-optimal MPOs, canonical-form MPS machinery, truncated SVD,
//! environment caching, and two-site DMRG/TDVP sweep algorithms.
//!
//! Builds as a plain rlib by default; enable the `python` feature for the
//! PyO3 bindings in [`pybindings`].

use num_complex::Complex;

/// Convenience alias used throughout the engine; every scalar quantity is
/// stored as a complex number regardless of its logical [`scalar::ScalarKind`]
/// (§A.9 design note: promote at storage time, not at every arithmetic site).
pub type C64 = Complex<f64>;

pub mod callback;
pub mod channel;
pub mod constants;
pub mod effective_h;
pub mod error;
pub mod fsm;
pub mod linalg;
pub mod mps;
pub mod mpo;
pub mod numerics;
pub mod observables;
pub mod powerlaw;
pub mod runtime;
pub mod scalar;
pub mod site;
pub mod solvers;
pub mod sweep;
pub mod tensor;

#[cfg(feature = "python")]
pub mod pybindings;

pub use channel::{Channel, Species};
pub use error::{Result, TnCoreError};
pub use fsm::{build_fsm, Fsm};
pub use mpo::{build_mpo, Mpo};
pub use mps::Mps;
pub use runtime::RuntimeContext;
pub use scalar::ScalarKind;
pub use site::{OperatorSymbol, SiteChain, SiteKind};
