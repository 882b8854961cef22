//! FSM compiler (§A.4.3): channels → a weighted transition graph over
//! auxiliary states, whose vertex count is the resulting MPO's bond
//! dimension.
use std::collections::HashMap;

use crate::channel::{Channel, Species};
use crate::error::Result;
use crate::site::OperatorSymbol;
use crate::C64;

/// Sentinel target/source used while building, standing in for the final
/// idle state until the last pass knows `χ` and can relabel it (§A.4.3:
/// "a placeholder final self-loop that is relabeled at the end").
const FINAL_PLACEHOLDER: usize = usize::MAX;

/// The initial idle state is always vertex 1.
pub const INITIAL: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FsmEdge {
    pub source: usize,
    pub target: usize,
    pub op: OperatorSymbol,
    /// Which site kind `op` is resolved against; ignored when `op ==
    /// OperatorSymbol::Id` (identity is universal).
    pub species: Species,
    pub weight: C64,
}

/// The compiled transition graph (§A.3 "FSM transition graph"). `chi` is the
/// MPO bond dimension; vertex `1` is the initial idle state, vertex `chi` is
/// the final idle state.
#[derive(Debug, Clone)]
pub struct Fsm {
    pub chi: usize,
    pub edges: Vec<FsmEdge>,
}

/// Compile a channel list into an FSM transition graph (§A.4.3).
pub fn build_fsm(channels: &[Channel]) -> Result<Fsm> {
    for c in channels {
        c.validate()?;
    }

    let mut ns: usize = INITIAL;
    let mut edges = vec![
        FsmEdge {
            source: INITIAL,
            target: INITIAL,
            op: OperatorSymbol::Id,
            species: Species::Spin,
            weight: C64::new(1.0, 0.0),
        },
        FsmEdge {
            source: FINAL_PLACEHOLDER,
            target: FINAL_PLACEHOLDER,
            op: OperatorSymbol::Id,
            species: Species::Spin,
            weight: C64::new(1.0, 0.0),
        },
    ];

    for channel in channels {
        emit_channel(channel, &mut ns, &mut edges, FINAL_PLACEHOLDER)?;
    }

    let chi = ns + 1;
    for edge in edges.iter_mut() {
        if edge.source == FINAL_PLACEHOLDER {
            edge.source = chi;
        }
        if edge.target == FINAL_PLACEHOLDER {
            edge.target = chi;
        }
    }

    let edges = dedup_edges(edges);
    Ok(Fsm { chi, edges })
}

/// Emit the edges for one channel. `final_target` is where this channel's
/// "final-going" transitions land — ordinarily [`FINAL_PLACEHOLDER`], but
/// redirected to an interstitial vertex when this channel is a sub-channel
/// of a [`Channel::SpinBosonInteraction`] (§A.4.3).
fn emit_channel(
    channel: &Channel,
    ns: &mut usize,
    edges: &mut Vec<FsmEdge>,
    final_target: usize,
) -> Result<()> {
    match channel {
        Channel::Field { species, op, w } => {
            edges.push(FsmEdge {
                source: final_target,
                target: INITIAL,
                op: *op,
                species: *species,
                weight: *w,
            });
        }
        Channel::BosonOnly { op, w } => {
            edges.push(FsmEdge {
                source: final_target,
                target: INITIAL,
                op: *op,
                species: Species::Boson,
                weight: *w,
            });
        }
        Channel::FiniteRangeCoupling {
            species,
            op_a,
            op_b,
            delta,
            w,
        } => {
            let base = *ns;
            edges.push(FsmEdge {
                source: base + 1,
                target: INITIAL,
                op: *op_a,
                species: *species,
                weight: C64::new(1.0, 0.0),
            });
            for k in 1..*delta {
                edges.push(FsmEdge {
                    source: base + 1 + k,
                    target: base + k,
                    op: OperatorSymbol::Id,
                    species: *species,
                    weight: C64::new(1.0, 0.0),
                });
            }
            edges.push(FsmEdge {
                source: final_target,
                target: base + delta,
                op: *op_b,
                species: *species,
                weight: *w,
            });
            *ns += delta;
        }
        Channel::ExpChannelCoupling {
            species,
            op_a,
            op_b,
            amp,
            lambda,
        } => {
            let base = *ns;
            edges.push(FsmEdge {
                source: base + 1,
                target: INITIAL,
                op: *op_a,
                species: *species,
                weight: C64::new(1.0, 0.0),
            });
            edges.push(FsmEdge {
                source: base + 1,
                target: base + 1,
                op: OperatorSymbol::Id,
                species: *species,
                weight: *lambda,
            });
            edges.push(FsmEdge {
                source: final_target,
                target: base + 1,
                op: *op_b,
                species: *species,
                weight: amp * lambda,
            });
            *ns += 1;
        }
        Channel::PowerLawCoupling {
            species,
            op_a,
            op_b,
            j,
            alpha,
            k,
            n,
        } => {
            let terms = crate::powerlaw::fit_power_law(*alpha, *k, *n)?;
            let base = *ns;
            for (idx, term) in terms.iter().enumerate() {
                let state = base + 1 + idx;
                edges.push(FsmEdge {
                    source: state,
                    target: INITIAL,
                    op: *op_a,
                    species: *species,
                    weight: C64::new(1.0, 0.0),
                });
                edges.push(FsmEdge {
                    source: state,
                    target: state,
                    op: OperatorSymbol::Id,
                    species: *species,
                    weight: term.lambda,
                });
                edges.push(FsmEdge {
                    source: final_target,
                    target: state,
                    op: *op_b,
                    species: *species,
                    weight: j * term.nu * term.lambda,
                });
            }
            *ns += terms.len();
        }
        Channel::SpinBosonInteraction {
            spin_sub_channels,
            boson_op,
            w_b,
        } => {
            *ns += 1;
            let boson_entry = *ns;
            for sub in spin_sub_channels {
                emit_channel(sub, ns, edges, boson_entry)?;
            }
            edges.push(FsmEdge {
                source: final_target,
                target: boson_entry,
                op: *boson_op,
                species: Species::Boson,
                weight: *w_b,
            });
        }
    }
    Ok(())
}

fn dedup_edges(edges: Vec<FsmEdge>) -> Vec<FsmEdge> {
    let mut order: Vec<(usize, usize, OperatorSymbol, Species)> = Vec::new();
    let mut weights: HashMap<(usize, usize, OperatorSymbol, Species), C64> = HashMap::new();
    for e in edges {
        let key = (e.source, e.target, e.op, e.species);
        let entry = weights.entry(key).or_insert_with(|| {
            order.push(key);
            C64::new(0.0, 0.0)
        });
        *entry += e.weight;
    }
    order
        .into_iter()
        .map(|key| FsmEdge {
            source: key.0,
            target: key.1,
            op: key.2,
            species: key.3,
            weight: weights[&key],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_channel_adds_no_auxiliary_states() {
        let channels = vec![Channel::Field {
            species: Species::Spin,
            op: OperatorSymbol::Z,
            w: C64::new(0.5, 0.0),
        }];
        let fsm = build_fsm(&channels).unwrap();
        assert_eq!(fsm.chi, 2);
    }

    #[test]
    fn finite_range_coupling_adds_delta_auxiliary_states() {
        let channels = vec![Channel::FiniteRangeCoupling {
            species: Species::Spin,
            op_a: OperatorSymbol::Z,
            op_b: OperatorSymbol::Z,
            delta: 3,
            w: C64::new(1.0, 0.0),
        }];
        let fsm = build_fsm(&channels).unwrap();
        assert_eq!(fsm.chi, 1 + 3 + 1);
    }

    #[test]
    fn duplicate_fields_merge_weights() {
        let channels = vec![
            Channel::Field {
                species: Species::Spin,
                op: OperatorSymbol::X,
                w: C64::new(0.5, 0.0),
            },
            Channel::Field {
                species: Species::Spin,
                op: OperatorSymbol::X,
                w: C64::new(0.25, 0.0),
            },
        ];
        let fsm = build_fsm(&channels).unwrap();
        let field_edges: Vec<_> = fsm
            .edges
            .iter()
            .filter(|e| e.op == OperatorSymbol::X && e.target == INITIAL)
            .collect();
        assert_eq!(field_edges.len(), 1);
        assert!((field_edges[0].weight.re - 0.75).abs() < 1e-12);
    }

    #[test]
    fn invalid_channel_is_rejected_at_build_time() {
        let channels = vec![Channel::FiniteRangeCoupling {
            species: Species::Spin,
            op_a: OperatorSymbol::Z,
            op_b: OperatorSymbol::Z,
            delta: 0,
            w: C64::new(1.0, 0.0),
        }];
        assert!(build_fsm(&channels).is_err());
    }
}
