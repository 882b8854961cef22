//! Observable consumers (§A.6): read-only computations over a finalized MPS
//! — single-site and subsystem expectation values, two-site correlators,
//! the Schmidt spectrum at a bond, and Rényi-α entanglement entropy.
use ndarray::Array2;

use crate::error::{Result, TnCoreError};
use crate::mps::Mps;
use crate::tensor::{canonicalize, group_left, transfer_step, trivial_transfer, truncated_svd, SvdPolicy};
use crate::C64;

fn require_site(mps: &Mps, i: usize) -> Result<()> {
    if i >= mps.len() {
        return Err(TnCoreError::DimensionMismatch {
            expected: format!("site index < {}", mps.len()),
            found: format!("{i}"),
            context: "observables".into(),
        });
    }
    Ok(())
}

/// `<psi| O_i |psi> / <psi|psi>` (§A.6).
pub fn expectation_value(mps: &Mps, op: &Array2<C64>, i: usize) -> Result<f64> {
    require_site(mps, i)?;
    let mut t = trivial_transfer();
    let mut norm_t = trivial_transfer();
    for (k, a) in mps.tensors.iter().enumerate() {
        norm_t = transfer_step(&norm_t, a, None);
        t = transfer_step(&t, a, if k == i { Some(op) } else { None });
    }
    let norm = norm_t[[0, 0]].re;
    Ok(t[[0, 0]].re / norm)
}

/// `<psi| Σ_{i=l}^{m} O_i |psi> / <psi|psi>`, `l <= m` (§A.6 subsystem sum,
/// supplemented per §B.5 with an explicit inclusive range rather than the
/// whole chain).
pub fn subsystem_sum(mps: &Mps, op: &Array2<C64>, l: usize, m: usize) -> Result<f64> {
    require_site(mps, l)?;
    require_site(mps, m)?;
    if l > m {
        return Err(TnCoreError::ConfigInvalid {
            reason: format!("subsystem_sum requires l <= m, got l={l}, m={m}"),
        });
    }
    let mut total = 0.0;
    for i in l..=m {
        total += expectation_value(mps, op, i)?;
    }
    Ok(total)
}

/// `<psi| O_i^A O_j^B |psi> / <psi|psi>`, requiring `i < j` (§B.5: the
/// correlator is scoped to ordered pairs; callers wanting the symmetric or
/// connected correlator compose it from two calls plus the single-site
/// expectations).
pub fn two_site_correlator(mps: &Mps, op_a: &Array2<C64>, op_b: &Array2<C64>, i: usize, j: usize) -> Result<f64> {
    require_site(mps, i)?;
    require_site(mps, j)?;
    if i >= j {
        return Err(TnCoreError::ConfigInvalid {
            reason: format!("two_site_correlator requires i < j, got i={i}, j={j}"),
        });
    }
    let mut t = trivial_transfer();
    let mut norm_t = trivial_transfer();
    for (k, a) in mps.tensors.iter().enumerate() {
        norm_t = transfer_step(&norm_t, a, None);
        let op = if k == i {
            Some(op_a)
        } else if k == j {
            Some(op_b)
        } else {
            None
        };
        t = transfer_step(&t, a, op);
    }
    let norm = norm_t[[0, 0]].re;
    Ok(t[[0, 0]].re / norm)
}

/// The Schmidt spectrum across the bond between site `bond` and `bond + 1`
/// (§A.6, §A.8 scenario 6). Requires `bond + 1 < mps.len()`. Operates on a
/// clone so the caller's canonical center and environments are undisturbed.
pub fn schmidt_spectrum(mps: &Mps, bond: usize) -> Result<Vec<f64>> {
    if bond + 1 >= mps.len() {
        return Err(TnCoreError::DimensionMismatch {
            expected: format!("bond index < {}", mps.len().saturating_sub(1)),
            found: format!("{bond}"),
            context: "schmidt_spectrum".into(),
        });
    }
    let mut copy = mps.clone();
    canonicalize(&mut copy, bond);
    let m = group_left(&copy.tensors[bond]);
    let svd = truncated_svd(&m, &SvdPolicy::exact());
    Ok(svd.s.to_vec())
}

/// Rényi-α entanglement entropy from a Schmidt spectrum (§B.5's general
/// formula, supplementing §A.6's "Rényi-α entropy at a bond"):
/// `S_α = ln(Σ p_k^α) / (1 - α)` for α ≠ 1, and the von Neumann limit
/// `-Σ p_k ln p_k` as α → 1. The spectrum need not be pre-normalized; this
/// re-normalizes `p_k = s_k² / Σ s_k²` internally.
pub fn renyi_entropy(spectrum: &[f64], alpha: f64) -> f64 {
    let sq: Vec<f64> = spectrum.iter().map(|s| s * s).collect();
    let norm: f64 = sq.iter().sum();
    if norm <= 0.0 {
        return 0.0;
    }
    let probs: Vec<f64> = sq.iter().map(|p| p / norm).collect();

    if (alpha - 1.0).abs() < 1e-9 {
        -probs.iter().filter(|&&p| p > 1e-300).map(|&p| p * p.ln()).sum::<f64>()
    } else {
        let sum_pow: f64 = probs.iter().map(|&p| p.powf(alpha)).sum();
        sum_pow.ln() / (1.0 - alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mps::SitePattern;
    use crate::runtime::RuntimeContext;
    use crate::site::{OperatorSymbol, SiteChain, SiteKind};

    #[test]
    fn product_state_has_zero_entanglement_entropy() {
        let ctx = RuntimeContext::new();
        let chain = SiteChain::new(vec![SiteKind::spin(0.5).unwrap(); 4]);
        let patterns = vec![SitePattern { axis: OperatorSymbol::Z, index: 0 }; 4];
        let mps = Mps::product_state(&chain, &ctx, &patterns).unwrap();

        for bond in 0..3 {
            let spectrum = schmidt_spectrum(&mps, bond).unwrap();
            assert_eq!(spectrum.len(), 1);
            assert!((spectrum[0] - 1.0).abs() < 1e-12);
            let s1 = renyi_entropy(&spectrum, 1.0);
            assert!(s1.abs() < 1e-12, "s1={s1}");
            let s2 = renyi_entropy(&spectrum, 2.0);
            assert!(s2.abs() < 1e-12, "s2={s2}");
        }
    }

    #[test]
    fn expectation_value_of_up_polarized_z_is_one_half() {
        let ctx = RuntimeContext::new();
        let chain = SiteChain::new(vec![SiteKind::spin(0.5).unwrap(); 3]);
        let patterns = vec![SitePattern { axis: OperatorSymbol::Z, index: 0 }; 3];
        let mps = Mps::product_state(&chain, &ctx, &patterns).unwrap();
        let table = crate::site::site_table(&ctx, SiteKind::spin(0.5).unwrap());
        let z = table.operator(OperatorSymbol::Z).unwrap();
        for i in 0..3 {
            let v = expectation_value(&mps, z, i).unwrap();
            assert!((v - 0.5).abs() < 1e-12, "v={v}");
        }
        let total = subsystem_sum(&mps, z, 0, 2).unwrap();
        assert!((total - 1.5).abs() < 1e-12);
    }

    #[test]
    fn correlator_rejects_unordered_indices() {
        let ctx = RuntimeContext::new();
        let chain = SiteChain::new(vec![SiteKind::spin(0.5).unwrap(); 3]);
        let patterns = vec![SitePattern { axis: OperatorSymbol::Z, index: 0 }; 3];
        let mps = Mps::product_state(&chain, &ctx, &patterns).unwrap();
        let table = crate::site::site_table(&ctx, SiteKind::spin(0.5).unwrap());
        let z = table.operator(OperatorSymbol::Z).unwrap();
        assert!(two_site_correlator(&mps, z, z, 2, 1).is_err());
    }
}
