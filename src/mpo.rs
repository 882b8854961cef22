//! MPO assembler (§A.4.4): turns a compiled [`Fsm`] plus a site chain into
//! the chain of bulk tensors, with the trivial boundary dimensions collapsed
//! at the two ends.
use ndarray::Array4;

use crate::channel::Species;
use crate::error::{Result, TnCoreError};
use crate::fsm::{Fsm, FsmEdge, INITIAL};
use crate::runtime::RuntimeContext;
use crate::site::{OperatorSymbol, SiteChain, SiteKind, SiteTable};
use crate::C64;

/// A finite matrix product operator: `tensors[i]` has shape `(chi_left(i),
/// chi_right(i), d(i), d(i))`, with `chi_left(0) == chi_right(n-1) == 1`.
#[derive(Debug, Clone)]
pub struct Mpo {
    pub tensors: Vec<Array4<C64>>,
    /// The FSM's bond dimension; the interior bulk dimension shared by every
    /// non-boundary bond.
    pub chi: usize,
}

impl Mpo {
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Bond dimension to the right of site `i` (`0..len()-1`); the last site
    /// has no right bond.
    pub fn bond_dim(&self, i: usize) -> usize {
        self.tensors[i].dim().1
    }

    /// Largest bond dimension anywhere in the chain (§B.5 bond-dimension
    /// reporting).
    pub fn max_bond_dim(&self) -> usize {
        self.tensors.iter().map(|t| t.dim().1).max().unwrap_or(0)
    }
}

/// Assemble an MPO from a compiled FSM and a site chain (§A.4.4).
pub fn build_mpo(fsm: &Fsm, chain: &SiteChain, ctx: &RuntimeContext) -> Result<Mpo> {
    let n = chain.len();
    if n == 0 {
        return Err(TnCoreError::DimensionMismatch {
            expected: "at least one site".into(),
            found: "0".into(),
            context: "build_mpo".into(),
        });
    }
    let chi = fsm.chi;

    let mut tensors = Vec::with_capacity(n);
    for i in 0..n {
        let kind = chain.kind(i);
        let table = crate::site::site_table(ctx, kind);
        let d = table.dim;

        let mut bulk = Array4::<C64>::zeros((chi, chi, d, d));
        for edge in &fsm.edges {
            let op = resolve_operator(&table, kind, edge);
            let (a, b) = (edge.source - 1, edge.target - 1);
            for r in 0..d {
                for c in 0..d {
                    bulk[[a, b, r, c]] += edge.weight * op[[r, c]];
                }
            }
        }

        let tensor = if n == 1 {
            Array4::from_shape_fn((1, 1, d, d), |(_, _, r, c)| bulk[[chi - 1, INITIAL - 1, r, c]])
        } else if i == 0 {
            Array4::from_shape_fn((1, chi, d, d), |(_, b, r, c)| bulk[[chi - 1, b, r, c]])
        } else if i == n - 1 {
            Array4::from_shape_fn((chi, 1, d, d), |(a, _, r, c)| bulk[[a, INITIAL - 1, r, c]])
        } else {
            bulk
        };
        tensors.push(tensor);
    }

    Ok(Mpo { tensors, chi })
}

/// The operator an edge contributes at a given site: the edge's own operator
/// when its species matches the site, the site's identity otherwise (§A.4.4's
/// identity-fallback rule for heterogeneous chains).
fn resolve_operator<'a>(table: &'a SiteTable, kind: SiteKind, edge: &FsmEdge) -> &'a ndarray::Array2<C64> {
    let symbol = if edge.op == OperatorSymbol::Id || edge.species == kind.species() {
        edge.op
    } else {
        OperatorSymbol::Id
    };
    table
        .operator(symbol)
        .expect("identity-fallback guarantees a resolvable operator symbol")
}
