//! Channel IR (§A.3, §A.4.2): the closed tagged union describing Hamiltonian
//! terms that the FSM compiler turns into an MPO.
use crate::error::{Result, TnCoreError};
use crate::powerlaw::fit_power_law;
use crate::site::OperatorSymbol;
use crate::C64;

/// Which site-kind's operator table a channel's symbols resolve against.
/// (§A.9 open question: a cleaner IR would key geometry separately from
/// species; kept as a channel field for fidelity to §A.3's `Field(species,
/// op, w)` signature.)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Species {
    Spin,
    Boson,
}

impl Species {
    /// Whether `symbol` is meaningful for this species (used by the FSM
    /// compiler and MPO assembler to decide identity fallback, §A.4.4).
    pub fn accepts(self, symbol: OperatorSymbol) -> bool {
        use OperatorSymbol::*;
        match self {
            Species::Spin => matches!(symbol, Id | X | Y | Z | SPlus | SMinus),
            Species::Boson => matches!(symbol, Id | A | ADag | N),
        }
    }
}

/// A single exponential term `ν·λ^r` produced by the power-law fit (§A.4.2).
#[derive(Debug, Clone, Copy)]
pub struct ExpTerm {
    pub nu: C64,
    pub lambda: C64,
}

#[derive(Debug, Clone)]
pub enum Channel {
    /// `w · Σᵢ Oᵢ`
    Field {
        species: Species,
        op: OperatorSymbol,
        w: C64,
    },
    /// `w · Σᵢ Aᵢ B_{i+Δ}`, Δ ≥ 1.
    FiniteRangeCoupling {
        species: Species,
        op_a: OperatorSymbol,
        op_b: OperatorSymbol,
        delta: usize,
        w: C64,
    },
    /// `amp · Σ_{i<j} Aᵢ Bⱼ λ^{j-i}`, 0 < |λ| < 1.
    ExpChannelCoupling {
        species: Species,
        op_a: OperatorSymbol,
        op_b: OperatorSymbol,
        amp: C64,
        lambda: C64,
    },
    /// `J · Σ_{i<j} Aᵢ Bⱼ / (j-i)^α`, compiled to a sum of `k` exponentials.
    PowerLawCoupling {
        species: Species,
        op_a: OperatorSymbol,
        op_b: OperatorSymbol,
        j: C64,
        alpha: f64,
        k: usize,
        n: usize,
    },
    /// `w · Σᵢ Oᵢ`, restricted to boson sites.
    BosonOnly { op: OperatorSymbol, w: C64 },
    /// Product of a spin sub-channel list with a boson operator, coupling weight `w_b`.
    SpinBosonInteraction {
        spin_sub_channels: Vec<Channel>,
        boson_op: OperatorSymbol,
        w_b: C64,
    },
}

impl Channel {
    /// Structural validation raised at FSM build time (§A.7 `CONFIG_INVALID`).
    /// Does not run the power-law fit (that is `INVALID_FIT`, a distinct
    /// taxon raised lazily by [`Channel::power_law_terms`]).
    pub fn validate(&self) -> Result<()> {
        match self {
            Channel::Field { species, op, .. } => require_species(*species, *op),
            Channel::FiniteRangeCoupling {
                species,
                op_a,
                op_b,
                delta,
                ..
            } => {
                require_species(*species, *op_a)?;
                require_species(*species, *op_b)?;
                if *delta < 1 {
                    return Err(TnCoreError::ConfigInvalid {
                        reason: format!("FiniteRangeCoupling delta must be >= 1, got {delta}"),
                    });
                }
                Ok(())
            }
            Channel::ExpChannelCoupling {
                species,
                op_a,
                op_b,
                lambda,
                ..
            } => {
                require_species(*species, *op_a)?;
                require_species(*species, *op_b)?;
                if !(lambda.norm() > 0.0 && lambda.norm() < 1.0) {
                    return Err(TnCoreError::ConfigInvalid {
                        reason: format!("ExpChannelCoupling requires 0 < |lambda| < 1, got {}", lambda.norm()),
                    });
                }
                Ok(())
            }
            Channel::PowerLawCoupling {
                species,
                op_a,
                op_b,
                alpha,
                k,
                n,
                ..
            } => {
                require_species(*species, *op_a)?;
                require_species(*species, *op_b)?;
                if *alpha <= 0.0 {
                    return Err(TnCoreError::ConfigInvalid {
                        reason: format!("PowerLawCoupling alpha must be > 0, got {alpha}"),
                    });
                }
                if *k == 0 || *n == 0 || *k > *n {
                    return Err(TnCoreError::ConfigInvalid {
                        reason: format!("PowerLawCoupling requires 1 <= K <= N, got K={k}, N={n}"),
                    });
                }
                // The fit needs `rows = N-K+1 >= K` (i.e. `N+1 >= 2K`) to slice
                // `K` columns out of the Hankel SVD's basis; otherwise rejecting
                // here keeps it out of reach of the out-of-bounds slice.
                if 2 * *k > *n + 1 {
                    return Err(TnCoreError::ConfigInvalid {
                        reason: format!(
                            "PowerLawCoupling requires N+1 >= 2*K, got K={k}, N={n}"
                        ),
                    });
                }
                Ok(())
            }
            Channel::BosonOnly { op, .. } => require_species(Species::Boson, *op),
            Channel::SpinBosonInteraction {
                spin_sub_channels,
                boson_op,
                ..
            } => {
                require_species(Species::Boson, *boson_op)?;
                for sub in spin_sub_channels {
                    sub.validate()?;
                }
                Ok(())
            }
        }
    }

    /// Run the power-law → exponential fit, if this is a [`Channel::PowerLawCoupling`].
    pub fn power_law_terms(&self) -> Option<Result<Vec<ExpTerm>>> {
        match self {
            Channel::PowerLawCoupling { alpha, k, n, .. } => Some(fit_power_law(*alpha, *k, *n)),
            _ => None,
        }
    }
}

fn require_species(species: Species, op: OperatorSymbol) -> Result<()> {
    if species.accepts(op) {
        Ok(())
    } else {
        Err(TnCoreError::ConfigInvalid {
            reason: format!("operator {op:?} is not valid for species {species:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_range_rejects_zero_delta() {
        let c = Channel::FiniteRangeCoupling {
            species: Species::Spin,
            op_a: OperatorSymbol::Z,
            op_b: OperatorSymbol::Z,
            delta: 0,
            w: C64::new(1.0, 0.0),
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn exp_channel_rejects_unit_modulus_lambda() {
        let c = Channel::ExpChannelCoupling {
            species: Species::Spin,
            op_a: OperatorSymbol::Z,
            op_b: OperatorSymbol::Z,
            amp: C64::new(1.0, 0.0),
            lambda: C64::new(1.0, 0.0),
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn power_law_rejects_k_too_close_to_n() {
        // K=N passes the `1 <= K <= N` check but leaves only `rows = 1 < K`
        // for the fit's Hankel basis; validate() must reject it up front.
        let c = Channel::PowerLawCoupling {
            species: Species::Spin,
            op_a: OperatorSymbol::Z,
            op_b: OperatorSymbol::Z,
            j: C64::new(1.0, 0.0),
            alpha: 1.5,
            k: 4,
            n: 4,
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn field_rejects_mismatched_species() {
        let c = Channel::Field {
            species: Species::Boson,
            op: OperatorSymbol::Z,
            w: C64::new(1.0, 0.0),
        };
        assert!(c.validate().is_err());
    }
}
