//! Site catalog (§A.4.1): per-site local Hilbert space, operator table, and
//! precomputed eigenbases.
use std::collections::HashMap;
use std::sync::Arc;

use ndarray::Array2;

use crate::channel::Species;
use crate::error::{Result, TnCoreError};
use crate::numerics::hermitian_eigen;
use crate::runtime::RuntimeContext;
use crate::scalar::ScalarKind;
use crate::C64;

/// Symbolic operator names resolved per-site by the catalog (§A.3's
/// `operator(site, symbol)`). Spin sites answer `I, X, Y, Z, SPlus, SMinus`;
/// boson sites answer `I, A, ADag, N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorSymbol {
    Id,
    X,
    Y,
    Z,
    SPlus,
    SMinus,
    A,
    ADag,
    N,
}

/// Which of a site's Hermitian operators an eigenbasis request names.
pub type Axis = OperatorSymbol;

/// A single site's kind and parameters; also the cache key shared sites are
/// looked up by (§A.4.1: "cached... so identical sites share tables").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKind {
    /// Spin-`S` site; `twice_s` stores `2S` so half-integer spins hash exactly.
    Spin { twice_s: u32 },
    /// Truncated-Fock boson site with `n_max` excitations.
    Boson { n_max: usize },
}

impl SiteKind {
    pub fn spin(s: f64) -> Result<SiteKind> {
        let twice_s = (2.0 * s).round();
        if twice_s < 1.0 || (2.0 * s - twice_s).abs() > 1e-9 {
            return Err(TnCoreError::ConfigInvalid {
                reason: format!("spin quantum number {s} is not a positive half-integer"),
            });
        }
        Ok(SiteKind::Spin {
            twice_s: twice_s as u32,
        })
    }

    pub fn boson(n_max: usize) -> Result<SiteKind> {
        if n_max == 0 {
            return Err(TnCoreError::ConfigInvalid {
                reason: "boson site n_max must be >= 1".into(),
            });
        }
        Ok(SiteKind::Boson { n_max })
    }

    pub fn local_dim(self) -> usize {
        match self {
            SiteKind::Spin { twice_s } => twice_s as usize + 1,
            SiteKind::Boson { n_max } => n_max + 1,
        }
    }

    pub fn spin_quantum_number(self) -> Option<f64> {
        match self {
            SiteKind::Spin { twice_s } => Some(twice_s as f64 / 2.0),
            SiteKind::Boson { .. } => None,
        }
    }

    /// Promotion rule (§A.4.1): spin sites carry a complex `Y` operator, boson
    /// sites are real by default.
    pub fn scalar_kind(self) -> ScalarKind {
        match self {
            SiteKind::Spin { .. } => ScalarKind::Complex,
            SiteKind::Boson { .. } => ScalarKind::Real,
        }
    }

    /// The channel species this site kind answers to (§A.4.4: the MPO
    /// assembler falls back to this site's identity whenever an edge names
    /// the other species).
    pub fn species(self) -> Species {
        match self {
            SiteKind::Spin { .. } => Species::Spin,
            SiteKind::Boson { .. } => Species::Boson,
        }
    }
}

/// An ordered, possibly heterogeneous sequence of sites (§A.3 "site chain").
#[derive(Debug, Clone)]
pub struct SiteChain {
    kinds: Vec<SiteKind>,
}

impl SiteChain {
    pub fn new(kinds: Vec<SiteKind>) -> SiteChain {
        SiteChain { kinds }
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn kind(&self, i: usize) -> SiteKind {
        self.kinds[i]
    }

    pub fn local_dim(&self, i: usize) -> usize {
        self.kinds[i].local_dim()
    }

    pub fn iter(&self) -> impl Iterator<Item = SiteKind> + '_ {
        self.kinds.iter().copied()
    }

    pub fn scalar_kind(&self) -> ScalarKind {
        ScalarKind::promote_all(self.iter().map(|k| k.scalar_kind()))
    }
}

/// Precomputed operator table and eigenbases for one [`SiteKind`] (§A.4.1).
pub struct SiteTable {
    pub dim: usize,
    operators: HashMap<OperatorSymbol, Array2<C64>>,
    eigenbases: HashMap<Axis, (Vec<f64>, Array2<C64>)>,
}

impl SiteTable {
    pub fn operator(&self, symbol: OperatorSymbol) -> Result<&Array2<C64>> {
        self.operators.get(&symbol).ok_or_else(|| TnCoreError::ConfigInvalid {
            reason: format!("operator {symbol:?} is not defined on this site kind"),
        })
    }

    pub fn eigenbasis(&self, axis: Axis) -> Result<&(Vec<f64>, Array2<C64>)> {
        self.eigenbases.get(&axis).ok_or_else(|| TnCoreError::ConfigInvalid {
            reason: format!("no eigenbasis for axis {axis:?} on this site kind"),
        })
    }
}

/// Look up (building and caching if necessary) the operator table for `kind`
/// within `ctx` (§A.9 "scope the process-wide cache to a runtime context").
pub fn site_table(ctx: &RuntimeContext, kind: SiteKind) -> Arc<SiteTable> {
    ctx.site_table_or_build(kind, build_site_table)
}

fn build_site_table(kind: SiteKind) -> SiteTable {
    match kind {
        SiteKind::Spin { twice_s } => build_spin_table(twice_s as f64 / 2.0),
        SiteKind::Boson { n_max } => build_boson_table(n_max),
    }
}

fn build_spin_table(s: f64) -> SiteTable {
    let d = (2.0 * s + 1.0).round() as usize;
    // basis ordering: index k <-> m = s - k, k = 0..d (descending m)
    let m_of = |k: usize| s - k as f64;

    let mut id = Array2::<C64>::zeros((d, d));
    let mut sz = Array2::<C64>::zeros((d, d));
    let mut splus = Array2::<C64>::zeros((d, d));
    let mut sminus = Array2::<C64>::zeros((d, d));

    for k in 0..d {
        id[[k, k]] = C64::new(1.0, 0.0);
        sz[[k, k]] = C64::new(m_of(k), 0.0);
    }
    // S+ |s,m> = sqrt(s(s+1) - m(m+1)) |s,m+1>; basis index for m+1 is k-1.
    for k in 1..d {
        let m = m_of(k);
        let coeff = (s * (s + 1.0) - m * (m + 1.0)).max(0.0).sqrt();
        splus[[k - 1, k]] = C64::new(coeff, 0.0);
    }
    // S- |s,m> = sqrt(s(s+1) - m(m-1)) |s,m-1>; basis index for m-1 is k+1.
    for k in 0..d - 1 {
        let m = m_of(k);
        let coeff = (s * (s + 1.0) - m * (m - 1.0)).max(0.0).sqrt();
        sminus[[k + 1, k]] = C64::new(coeff, 0.0);
    }

    let half = C64::new(0.5, 0.0);
    let half_i = C64::new(0.0, 0.5);
    let sx = (&splus + &sminus) * half;
    let sy = (&splus - &sminus) * (-half_i);

    let mut operators = HashMap::new();
    operators.insert(OperatorSymbol::Id, id);
    operators.insert(OperatorSymbol::X, sx.clone());
    operators.insert(OperatorSymbol::Y, sy.clone());
    operators.insert(OperatorSymbol::Z, sz.clone());
    operators.insert(OperatorSymbol::SPlus, splus);
    operators.insert(OperatorSymbol::SMinus, sminus);

    let mut eigenbases = HashMap::new();
    eigenbases.insert(OperatorSymbol::X, hermitian_eigen(&sx));
    eigenbases.insert(OperatorSymbol::Y, hermitian_eigen(&sy));
    eigenbases.insert(OperatorSymbol::Z, hermitian_eigen(&operators[&OperatorSymbol::Z]));

    SiteTable {
        dim: d,
        operators,
        eigenbases,
    }
}

fn build_boson_table(n_max: usize) -> SiteTable {
    let d = n_max + 1;
    let mut id = Array2::<C64>::zeros((d, d));
    let mut a = Array2::<C64>::zeros((d, d));
    let mut adag = Array2::<C64>::zeros((d, d));
    let mut n_op = Array2::<C64>::zeros((d, d));

    for k in 0..d {
        id[[k, k]] = C64::new(1.0, 0.0);
        n_op[[k, k]] = C64::new(k as f64, 0.0);
    }
    // a |n> = sqrt(n) |n-1>; basis index for n is k = n.
    for k in 1..d {
        a[[k - 1, k]] = C64::new((k as f64).sqrt(), 0.0);
    }
    // a† |n> = sqrt(n+1) |n+1>, truncated: a†|n_max> = 0.
    for k in 0..d - 1 {
        adag[[k + 1, k]] = C64::new((k as f64 + 1.0).sqrt(), 0.0);
    }

    let mut operators = HashMap::new();
    operators.insert(OperatorSymbol::Id, id);
    operators.insert(OperatorSymbol::A, a);
    operators.insert(OperatorSymbol::ADag, adag);
    operators.insert(OperatorSymbol::N, n_op.clone());

    // Number-basis eigenvectors are the identity columns (§A.4.5).
    let values: Vec<f64> = (0..d).map(|k| k as f64).collect();
    let vectors = Array2::<C64>::from_shape_fn((d, d), |(i, j)| {
        if i == j {
            C64::new(1.0, 0.0)
        } else {
            C64::new(0.0, 0.0)
        }
    });

    let mut eigenbases = HashMap::new();
    eigenbases.insert(OperatorSymbol::N, (values, vectors));

    SiteTable {
        dim: d,
        operators,
        eigenbases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeContext;

    #[test]
    fn spin_half_operators_match_pauli_over_two() {
        let ctx = RuntimeContext::new();
        let kind = SiteKind::spin(0.5).unwrap();
        let table = site_table(&ctx, kind);
        assert_eq!(table.dim, 2);
        let sz = table.operator(OperatorSymbol::Z).unwrap();
        assert!((sz[[0, 0]].re - 0.5).abs() < 1e-12);
        assert!((sz[[1, 1]].re + 0.5).abs() < 1e-12);
    }

    #[test]
    fn boson_number_eigenbasis_is_identity() {
        let ctx = RuntimeContext::new();
        let kind = SiteKind::boson(4).unwrap();
        let table = site_table(&ctx, kind);
        let (values, vectors) = table.eigenbasis(OperatorSymbol::N).unwrap();
        assert_eq!(values, &[0.0, 1.0, 2.0, 3.0, 4.0]);
        for i in 0..5 {
            for j in 0..5 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((vectors[[i, j]].re - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn identical_sites_share_cached_table() {
        let ctx = RuntimeContext::new();
        let kind = SiteKind::spin(1.0).unwrap();
        let a = site_table(&ctx, kind);
        let b = site_table(&ctx, kind);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
