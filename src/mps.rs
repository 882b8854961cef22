//! Matrix product state (§A.3, §A.4.5): a chain of rank-3 tensors carrying
//! the canonical-form invariant as mutable state.
use ndarray::Array3;
use rand::Rng;
use rand_distr::{StandardNormal, Uniform};

use crate::error::{Result, TnCoreError};
use crate::runtime::RuntimeContext;
use crate::scalar::ScalarKind;
use crate::site::{OperatorSymbol, SiteChain};
use crate::C64;

/// Per-site product-state descriptor: the eigenvector of `axis` at
/// `index` (§A.4.5: "(axis, eigenindex) for spin sites or a Fock integer for
/// boson sites" — a boson pattern is `axis = N, index = <Fock number>`,
/// since the number-basis eigenbasis is exactly the Fock basis).
#[derive(Debug, Clone, Copy)]
pub struct SitePattern {
    pub axis: OperatorSymbol,
    pub index: usize,
}

/// Bond-dimension / element-count summary (§B.5 memory reporting).
#[derive(Debug, Clone, Copy)]
pub struct MpsStats {
    pub max_bond_dim: usize,
    pub total_elements: usize,
}

#[derive(Debug, Clone)]
pub struct Mps {
    pub tensors: Vec<Array3<C64>>,
    /// `Some(c)` when canonicalized with that center; `None` after
    /// construction or any mutation that doesn't restore canonical form.
    pub center: Option<usize>,
    pub scalar_kind: ScalarKind,
}

impl Mps {
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn bond_dim(&self, i: usize) -> usize {
        self.tensors[i].dim().2
    }

    pub fn stats(&self) -> MpsStats {
        let max_bond_dim = self.tensors.iter().map(|t| t.dim().2).max().unwrap_or(0);
        let total_elements = self.tensors.iter().map(|t| t.len()).sum();
        MpsStats { max_bond_dim, total_elements }
    }

    /// Construct a product state from a per-site pattern (§A.4.5).
    pub fn product_state(chain: &SiteChain, ctx: &RuntimeContext, patterns: &[SitePattern]) -> Result<Mps> {
        if patterns.len() != chain.len() {
            return Err(TnCoreError::DimensionMismatch {
                expected: format!("{} site patterns", chain.len()),
                found: format!("{}", patterns.len()),
                context: "Mps::product_state".into(),
            });
        }
        let mut tensors = Vec::with_capacity(chain.len());
        for (i, pattern) in patterns.iter().enumerate() {
            let kind = chain.kind(i);
            let table = crate::site::site_table(ctx, kind);
            let (_, vectors) = table.eigenbasis(pattern.axis)?;
            if pattern.index >= table.dim {
                return Err(TnCoreError::ConfigInvalid {
                    reason: format!("site {i} eigenindex {} out of range for dim {}", pattern.index, table.dim),
                });
            }
            let d = table.dim;
            let tensor = Array3::from_shape_fn((1, d, 1), |(_, s, _)| vectors[[s, pattern.index]]);
            tensors.push(tensor);
        }
        Ok(Mps {
            tensors,
            center: None,
            scalar_kind: chain.scalar_kind(),
        })
    }

    /// Construct a random MPS of uniform target bond `chi0` (§A.4.5). Not
    /// canonicalized and not normalized; the caller's first sweep does both.
    pub fn random(chain: &SiteChain, _ctx: &RuntimeContext, chi0: usize, scalar_kind: ScalarKind, rng: &mut impl Rng) -> Mps {
        let n = chain.len();
        let mut tensors = Vec::with_capacity(n);
        for i in 0..n {
            let d = chain.local_dim(i);
            let chi_l = if i == 0 { 1 } else { chi0 };
            let chi_r = if i == n - 1 { 1 } else { chi0 };
            let tensor = Array3::from_shape_fn((chi_l, d, chi_r), |_| draw_scalar(rng, scalar_kind));
            tensors.push(tensor);
        }
        Mps {
            tensors,
            center: None,
            scalar_kind,
        }
    }
}

fn draw_scalar(rng: &mut impl Rng, kind: ScalarKind) -> C64 {
    match kind {
        ScalarKind::Real => {
            let dist = Uniform::new(-1.0, 1.0);
            C64::new(rng.sample(dist), 0.0)
        }
        ScalarKind::Complex => {
            let re: f64 = rng.sample(StandardNormal);
            let im: f64 = rng.sample(StandardNormal);
            C64::new(re, im)
        }
    }
}
