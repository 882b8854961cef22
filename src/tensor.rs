//! Tensor machinery (§A.4.6): truncated SVD, canonical-form shifting,
//! environment build/update, and the three contraction primitives the sweep
//! engine and observables are built from.
use ndarray::{Array1, Array2, Array3, Array4};

use crate::linalg::{to_faer, to_ndarray};
use crate::mps::Mps;
use crate::mpo::Mpo;
use crate::C64;

/// `(chi_max, cutoff)` truncation policy (§A.4.6).
#[derive(Debug, Clone, Copy)]
pub struct SvdPolicy {
    pub chi_max: usize,
    pub cutoff: f64,
}

impl SvdPolicy {
    pub const fn exact() -> SvdPolicy {
        SvdPolicy {
            chi_max: usize::MAX,
            cutoff: 0.0,
        }
    }
}

/// Result of a truncated SVD: `u`, `s`, and `vt` (`V†`), plus the discarded
/// squared-norm (§A.4.6's truncation-error estimate).
pub struct TruncatedSvd {
    pub u: Array2<C64>,
    pub s: Array1<f64>,
    pub vt: Array2<C64>,
    pub truncation_error: f64,
}

/// `M = U Σ V†`, keeping singular values `σ_k ≥ cutoff·σ_max` and at most
/// `chi_max` of them. Ties at the cutoff keep the larger index (§A.4.6,
/// §A.9's determinism note: enforced here rather than left to the backend).
pub fn truncated_svd(m: &Array2<C64>, policy: &SvdPolicy) -> TruncatedSvd {
    let mat = to_faer(m.view());
    let svd = mat.svd().expect("SVD should not fail for a finite dense matrix");
    let u_full = to_ndarray(svd.U().as_ref());
    let vt_full = to_ndarray(svd.V().as_ref()).t().mapv(|c| c.conj());
    let s_full: Vec<f64> = svd.S().column_vector().iter().map(|v| v.re).collect();

    let sigma_max = s_full.iter().copied().fold(0.0, f64::max);
    let threshold = sigma_max * policy.cutoff;

    // Keep the largest-index run of singular values at/above threshold
    // (values come back in non-increasing order from the backend).
    let mut keep = 0;
    for &sigma in &s_full {
        if sigma >= threshold && keep < policy.chi_max {
            keep += 1;
        } else {
            break;
        }
    }
    keep = keep.max(1).min(s_full.len());

    let truncation_error = s_full[keep..].iter().map(|s| s * s).sum();
    let u = u_full.slice(ndarray::s![.., 0..keep]).to_owned();
    let s = Array1::from(s_full[0..keep].to_vec());
    let vt = vt_full.slice(ndarray::s![0..keep, ..]).to_owned();

    TruncatedSvd { u, s, vt, truncation_error }
}

/// Reshape a rank-3 MPS tensor `[chi_l, d, chi_r]` into the left-grouped
/// matrix `[chi_l*d, chi_r]`.
pub fn group_left(a: &Array3<C64>) -> Array2<C64> {
    let (chi_l, d, chi_r) = a.dim();
    Array2::from_shape_fn((chi_l * d, chi_r), |(row, c)| a[[row / d, row % d, c]])
}

/// Reshape a rank-3 MPS tensor `[chi_l, d, chi_r]` into the right-grouped
/// matrix `[chi_l, d*chi_r]`.
pub fn group_right(a: &Array3<C64>) -> Array2<C64> {
    let (chi_l, d, chi_r) = a.dim();
    Array2::from_shape_fn((chi_l, d * chi_r), |(r, col)| a[[r, col / chi_r, col % chi_r]])
}

fn ungroup_left(m: &Array2<C64>, d: usize) -> Array3<C64> {
    let (rows, chi_r) = m.dim();
    let chi_l = rows / d;
    Array3::from_shape_fn((chi_l, d, chi_r), |(a, s, b)| m[[a * d + s, b]])
}

fn ungroup_right(m: &Array2<C64>, d: usize) -> Array3<C64> {
    let (chi_l, cols) = m.dim();
    let chi_r = cols / d;
    Array3::from_shape_fn((chi_l, d, chi_r), |(a, s, b)| m[[a, s * chi_r + b]])
}

fn matmul(a: &Array2<C64>, b: &Array2<C64>) -> Array2<C64> {
    let (n, k) = a.dim();
    let (k2, p) = b.dim();
    debug_assert_eq!(k, k2);
    Array2::from_shape_fn((n, p), |(i, j)| {
        let mut acc = C64::new(0.0, 0.0);
        for l in 0..k {
            acc += a[[i, l]] * b[[l, j]];
        }
        acc
    })
}

/// Left-orthogonalize `tensors[i]`, absorbing the remainder into
/// `tensors[i+1]` (§A.4.6 "left-shift one bond"). Requires `i + 1 <
/// tensors.len()`.
fn left_orthogonalize_step(tensors: &mut [Array3<C64>], i: usize) {
    let d = tensors[i].dim().1;
    let m = group_left(&tensors[i]);
    let svd = truncated_svd(&m, &SvdPolicy::exact());
    let norm = svd.s.iter().map(|s| s * s).sum::<f64>().sqrt();
    let mut r = Array2::<C64>::zeros((svd.s.len(), svd.vt.ncols()));
    for i2 in 0..svd.s.len() {
        for j in 0..svd.vt.ncols() {
            r[[i2, j]] = C64::new(svd.s[i2] / norm, 0.0) * svd.vt[[i2, j]];
        }
    }
    tensors[i] = ungroup_left(&svd.u, d);

    let next_d = tensors[i + 1].dim().1;
    let next = group_right(&tensors[i + 1]);
    let absorbed = matmul(&r, &next);
    tensors[i + 1] = ungroup_right(&absorbed, next_d);
}

/// Right-orthogonalize `tensors[i]`, absorbing the remainder into
/// `tensors[i-1]`. Requires `i >= 1`.
fn right_orthogonalize_step(tensors: &mut [Array3<C64>], i: usize) {
    let d = tensors[i].dim().1;
    let m = group_right(&tensors[i]);
    let svd = truncated_svd(&m, &SvdPolicy::exact());
    let norm = svd.s.iter().map(|s| s * s).sum::<f64>().sqrt();
    let mut l = Array2::<C64>::zeros((svd.u.nrows(), svd.s.len()));
    for i2 in 0..svd.u.nrows() {
        for j in 0..svd.s.len() {
            l[[i2, j]] = svd.u[[i2, j]] * C64::new(svd.s[j] / norm, 0.0);
        }
    }
    tensors[i] = ungroup_right(&svd.vt, d);

    let prev_d = tensors[i - 1].dim().1;
    let prev = group_left(&tensors[i - 1]);
    let absorbed = matmul(&prev, &l);
    tensors[i - 1] = ungroup_left(&absorbed, prev_d);
}

/// Shift the canonical center to `c`, sweeping right-to-left from `N-1` down
/// to `c+1` and then left-to-right from `0` up to `c-1` (§A.4.6).
pub fn canonicalize(mps: &mut Mps, c: usize) {
    let n = mps.tensors.len();
    for i in (c + 1..n).rev() {
        right_orthogonalize_step(&mut mps.tensors, i);
    }
    for i in 0..c {
        left_orthogonalize_step(&mut mps.tensors, i);
    }
    mps.center = Some(c);
}

/// Left environment update (§A.4.6): `env` is `[chi_ket, chi_mpo, chi_bra]`
/// before site `i`; returns the same shape after absorbing site `i`.
pub fn extend_left_environment(env: &Array3<C64>, a: &Array3<C64>, w: &Array4<C64>) -> Array3<C64> {
    let (chi_l, chi_w_l, _) = env.dim();
    let (_, chi_w_r, d, _) = w.dim();
    let (_, _, chi_r) = a.dim();

    let mut out = Array3::<C64>::zeros((chi_r, chi_w_r, chi_r));
    for b in 0..chi_r {
        for n in 0..chi_w_r {
            for bp in 0..chi_r {
                let mut acc = C64::new(0.0, 0.0);
                for ak in 0..chi_l {
                    for m in 0..chi_w_l {
                        for ab in 0..chi_l {
                            let e = env[[ak, m, ab]];
                            if e == C64::new(0.0, 0.0) {
                                continue;
                            }
                            for s1 in 0..d {
                                for s2 in 0..d {
                                    acc += e * a[[ak, s1, b]] * w[[m, n, s1, s2]] * a[[ab, s2, bp]].conj();
                                }
                            }
                        }
                    }
                }
                out[[b, n, bp]] = acc;
            }
        }
    }
    out
}

/// Right environment update: `env` is `[chi_ket, chi_mpo, chi_bra]` after
/// site `i`; returns the same shape after absorbing site `i` from the right.
pub fn extend_right_environment(env: &Array3<C64>, a: &Array3<C64>, w: &Array4<C64>) -> Array3<C64> {
    let (chi_r, chi_w_r, _) = env.dim();
    let (chi_w_l, _, d, _) = w.dim();
    let (chi_l, _, _) = a.dim();

    let mut out = Array3::<C64>::zeros((chi_l, chi_w_l, chi_l));
    for a_ in 0..chi_l {
        for m in 0..chi_w_l {
            for ap in 0..chi_l {
                let mut acc = C64::new(0.0, 0.0);
                for b in 0..chi_r {
                    for n in 0..chi_w_r {
                        for bp in 0..chi_r {
                            let e = env[[b, n, bp]];
                            if e == C64::new(0.0, 0.0) {
                                continue;
                            }
                            for s1 in 0..d {
                                for s2 in 0..d {
                                    acc += a[[a_, s1, b]] * w[[m, n, s1, s2]] * a[[ap, s2, bp]].conj() * e;
                                }
                            }
                        }
                    }
                }
                out[[a_, m, ap]] = acc;
            }
        }
    }
    out
}

/// Build left environments `[0..c)` and right environments `(c..n)` for an
/// MPS/MPO pair, leaving `c` itself undefined (§A.3: "E[c] is undefined").
pub struct EnvironmentCache {
    pub left: Vec<Array3<C64>>,
    pub right: Vec<Array3<C64>>,
}

/// The rank-1 boundary environment `[1,1,1]` (§A.3: `E[0]`/`E[N+1]`), also the
/// seed the sweep engine's incremental left/right environment chains start
/// from.
pub fn trivial_env() -> Array3<C64> {
    Array3::from_elem((1, 1, 1), C64::new(1.0, 0.0))
}

/// Build the full environment cache around center `c` (§A.4.6).
pub fn build_environment(mps: &Mps, mpo: &Mpo, c: usize) -> EnvironmentCache {
    let n = mps.tensors.len();
    let mut left = vec![trivial_env(); c + 1];
    for i in 0..c {
        left[i + 1] = extend_left_environment(&left[i], &mps.tensors[i], &mpo.tensors[i]);
    }
    let mut right = vec![trivial_env(); n - c];
    for i in (c + 1..n).rev() {
        let slot = n - 1 - i;
        right[slot + 1] = extend_right_environment(&right[slot], &mps.tensors[i], &mpo.tensors[i]);
    }
    EnvironmentCache { left, right }
}

/// 2-index transfer-matrix update used by observables (§A.4.6): `t` is
/// `[chi_ket, chi_bra]` before site `i`; `op` is an optional local operator
/// inserted at site `i` (`None` gives the plain inner-product contraction).
pub fn transfer_step(t: &Array2<C64>, a: &Array3<C64>, op: Option<&Array2<C64>>) -> Array2<C64> {
    let (chi_l, d, chi_r) = a.dim();
    let mut out = Array2::<C64>::zeros((chi_r, chi_r));
    for b in 0..chi_r {
        for bp in 0..chi_r {
            let mut acc = C64::new(0.0, 0.0);
            for ak in 0..chi_l {
                for ab in 0..chi_l {
                    let tv = t[[ak, ab]];
                    if tv == C64::new(0.0, 0.0) {
                        continue;
                    }
                    match op {
                        Some(o) => {
                            for s1 in 0..d {
                                for s2 in 0..d {
                                    acc += tv * a[[ak, s1, b]] * o[[s1, s2]] * a[[ab, s2, bp]].conj();
                                }
                            }
                        }
                        None => {
                            for s in 0..d {
                                acc += tv * a[[ak, s, b]] * a[[ab, s, bp]].conj();
                            }
                        }
                    }
                }
            }
            out[[b, bp]] = acc;
        }
    }
    out
}

/// The rank-1 boundary transfer matrix `[1,1]`, the seed observables' plain
/// transfer-matrix contractions start from.
pub fn trivial_transfer() -> Array2<C64> {
    Array2::from_elem((1, 1), C64::new(1.0, 0.0))
}

/// `<psi|psi>` via the plain transfer-matrix contraction (§A.4.6's
/// inner-product primitive).
pub fn norm_squared(mps: &Mps) -> f64 {
    let mut t = trivial_transfer();
    for a in &mps.tensors {
        t = transfer_step(&t, a, None);
    }
    t[[0, 0]].re
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_svd_with_no_cutoff_is_exact() {
        let m = Array2::from_shape_fn((3, 2), |(i, j)| C64::new((i + 1) as f64 * (j + 1) as f64, 0.0));
        let svd = truncated_svd(&m, &SvdPolicy::exact());
        assert!(svd.truncation_error.abs() < 1e-12);

        let mut reconstructed = Array2::<C64>::zeros((3, 2));
        for i in 0..3 {
            for j in 0..2 {
                let mut acc = C64::new(0.0, 0.0);
                for k in 0..svd.s.len() {
                    acc += svd.u[[i, k]] * C64::new(svd.s[k], 0.0) * svd.vt[[k, j]];
                }
                reconstructed[[i, j]] = acc;
            }
        }
        for i in 0..3 {
            for j in 0..2 {
                assert!((reconstructed[[i, j]] - m[[i, j]]).norm() < 1e-8);
            }
        }
    }

    #[test]
    fn truncated_svd_keeps_larger_index_on_ties() {
        let m = Array2::from_shape_fn((2, 2), |(i, j)| if i == j { C64::new(1.0, 0.0) } else { C64::new(0.0, 0.0) });
        let policy = SvdPolicy { chi_max: 1, cutoff: 0.5 };
        let svd = truncated_svd(&m, &policy);
        assert_eq!(svd.s.len(), 1);
    }

    #[test]
    fn canonicalize_preserves_norm() {
        use crate::mps::Mps;
        use crate::runtime::RuntimeContext;
        use crate::scalar::ScalarKind;
        use crate::site::{SiteChain, SiteKind};
        use rand::SeedableRng;

        let ctx = RuntimeContext::new();
        let chain = SiteChain::new(vec![SiteKind::spin(0.5).unwrap(); 4]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut mps = Mps::random(&chain, &ctx, 3, ScalarKind::Complex, &mut rng);
        let n0 = norm_squared(&mps);
        canonicalize(&mut mps, 2);
        let n1 = norm_squared(&mps);
        assert!((n0 - n1).abs() / n0.max(1e-300) < 1e-8);
        assert_eq!(mps.center, Some(2));
    }
}
