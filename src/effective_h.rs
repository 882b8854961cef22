//! Effective-H operators (§A.4.7): the local linear-operator contracts the
//! sweep engine hands to the Lanczos and Krylov-exponential solvers, without
//! ever materializing the full effective matrix.
use ndarray::{Array2, Array3, Array4, Array5};

use crate::C64;

/// The "linear operator" contract shared by all three effective
/// Hamiltonians: apply to a flattened state vector, report an operator-norm
/// estimate for solver step-size guidance (§A.4.7).
pub trait LinearOperator {
    fn dim(&self) -> usize;
    fn apply(&self, v: &[C64]) -> Vec<C64>;
    fn operator_norm_estimate(&self) -> f64 {
        power_iteration_norm_estimate(self, 8)
    }
}

/// A handful of power-iteration steps from a deterministic seed vector,
/// shared by every [`LinearOperator`] impl below for its default
/// `operator_norm_estimate` (cheap and good enough for solver step sizing;
/// §A.4.8 never asks for an exact spectral norm).
pub fn power_iteration_norm_estimate(op: &dyn LinearOperator, iters: usize) -> f64 {
    let n = op.dim();
    if n == 0 {
        return 0.0;
    }
    let mut v: Vec<C64> = (0..n)
        .map(|i| C64::new((i % 7) as f64 - 3.0, (i % 5) as f64 - 2.0))
        .collect();
    let mut norm = vec_norm(&v);
    if norm < 1e-300 {
        return 0.0;
    }
    for x in v.iter_mut() {
        *x /= C64::new(norm, 0.0);
    }
    let mut estimate = 0.0;
    for _ in 0..iters {
        let w = op.apply(&v);
        norm = vec_norm(&w);
        if norm < 1e-300 {
            break;
        }
        estimate = norm;
        v = w.iter().map(|x| x / C64::new(norm, 0.0)).collect();
    }
    estimate
}

fn vec_norm(v: &[C64]) -> f64 {
    v.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt()
}

/// Two-site effective Hamiltonian at bond `(i, i+1)` (§A.4.7): acts on a
/// rank-4 block `[chi_l, d_i, d_{i+1}, chi_r]`. Used by DMRG and two-site
/// TDVP.
pub struct TwoSiteHEff<'a> {
    pub l: &'a Array3<C64>,
    pub r: &'a Array3<C64>,
    pub w_i: &'a Array4<C64>,
    pub w_ip1: &'a Array4<C64>,
}

impl<'a> TwoSiteHEff<'a> {
    pub fn new(
        l: &'a Array3<C64>,
        r: &'a Array3<C64>,
        w_i: &'a Array4<C64>,
        w_ip1: &'a Array4<C64>,
    ) -> TwoSiteHEff<'a> {
        TwoSiteHEff { l, r, w_i, w_ip1 }
    }

    /// `(chi_l, d_i, d_{i+1}, chi_r)`, the shape of every block this
    /// operator accepts and returns.
    pub fn dims(&self) -> (usize, usize, usize, usize) {
        let chi_l = self.l.dim().2;
        let chi_r = self.r.dim().2;
        let d_i = self.w_i.dim().2;
        let d_ip1 = self.w_ip1.dim().2;
        (chi_l, d_i, d_ip1, chi_r)
    }

    pub fn apply_block(&self, psi: &Array4<C64>) -> Array4<C64> {
        let left = contract_left_and_site(self.l, psi, self.w_i);
        contract_site_and_right(&left, self.w_ip1, self.r)
    }
}

impl<'a> LinearOperator for TwoSiteHEff<'a> {
    fn dim(&self) -> usize {
        let (a, b, c, d) = self.dims();
        a * b * c * d
    }

    fn apply(&self, v: &[C64]) -> Vec<C64> {
        let psi = Array4::from_shape_vec(self.dims(), v.to_vec())
            .expect("flat vector matches the two-site block shape");
        self.apply_block(&psi)
            .into_raw_vec_and_offset()
            .0
    }
}

/// `out[al',n,s1',s2,ar] = sum_{al,m,s1} L[al,m,al'] Psi[al,s1,s2,ar] W_i[m,n,s1,s1']`.
fn contract_left_and_site(l: &Array3<C64>, psi: &Array4<C64>, w_i: &Array4<C64>) -> Array5<C64> {
    let (chi_l, chi_wl, chi_lp) = l.dim();
    let (_, d_i, d_ip1, chi_r) = psi.dim();
    let (_, chi_wm, _, d_ip) = w_i.dim();

    let mut out = Array5::<C64>::zeros((chi_lp, chi_wm, d_ip, d_ip1, chi_r));
    for alp in 0..chi_lp {
        for n in 0..chi_wm {
            for s1p in 0..d_ip {
                for s2 in 0..d_ip1 {
                    for ar in 0..chi_r {
                        let mut acc = C64::new(0.0, 0.0);
                        for al in 0..chi_l {
                            for m in 0..chi_wl {
                                let lv = l[[al, m, alp]];
                                if lv == C64::new(0.0, 0.0) {
                                    continue;
                                }
                                for s1 in 0..d_i {
                                    acc += lv * psi[[al, s1, s2, ar]] * w_i[[m, n, s1, s1p]];
                                }
                            }
                        }
                        out[[alp, n, s1p, s2, ar]] = acc;
                    }
                }
            }
        }
    }
    out
}

/// `out[al',s1',s2',ar'] = sum_{n,s2,ar,p} T[al',n,s1',s2,ar] W_ip1[n,p,s2,s2'] R[ar,p,ar']`.
fn contract_site_and_right(temp: &Array5<C64>, w_ip1: &Array4<C64>, r: &Array3<C64>) -> Array4<C64> {
    let (chi_lp, chi_wm, d_ip, d_ip1, chi_r) = temp.dim();
    let (_, chi_wr, _, d_ip1p) = w_ip1.dim();
    let (_, _, chi_rp) = r.dim();

    let mut out = Array4::<C64>::zeros((chi_lp, d_ip, d_ip1p, chi_rp));
    for alp in 0..chi_lp {
        for s1p in 0..d_ip {
            for s2p in 0..d_ip1p {
                for arp in 0..chi_rp {
                    let mut acc = C64::new(0.0, 0.0);
                    for n in 0..chi_wm {
                        for s2 in 0..d_ip1 {
                            for ar in 0..chi_r {
                                let tv = temp[[alp, n, s1p, s2, ar]];
                                if tv == C64::new(0.0, 0.0) {
                                    continue;
                                }
                                for p in 0..chi_wr {
                                    acc += tv * w_ip1[[n, p, s2, s2p]] * r[[ar, p, arp]];
                                }
                            }
                        }
                    }
                    out[[alp, s1p, s2p, arp]] = acc;
                }
            }
        }
    }
    out
}

/// One-site effective Hamiltonian at site `i` (§A.4.7): acts on a rank-3
/// block `[chi_l, d_i, chi_r]`. Used by the one-site TDVP back-evolution
/// half-step.
pub struct OneSiteHEff<'a> {
    pub l: &'a Array3<C64>,
    pub r: &'a Array3<C64>,
    pub w: &'a Array4<C64>,
}

impl<'a> OneSiteHEff<'a> {
    pub fn new(l: &'a Array3<C64>, r: &'a Array3<C64>, w: &'a Array4<C64>) -> OneSiteHEff<'a> {
        OneSiteHEff { l, r, w }
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.l.dim().2, self.w.dim().2, self.r.dim().2)
    }

    pub fn apply_block(&self, psi: &Array3<C64>) -> Array3<C64> {
        let (chi_l, chi_wl, chi_lp) = self.l.dim();
        let (_, d, chi_r) = psi.dim();
        let (_, chi_wr, _, dp) = self.w.dim();
        let (_, _, chi_rp) = self.r.dim();

        let mut out = Array3::<C64>::zeros((chi_lp, dp, chi_rp));
        for alp in 0..chi_lp {
            for s1p in 0..dp {
                for arp in 0..chi_rp {
                    let mut acc = C64::new(0.0, 0.0);
                    for al in 0..chi_l {
                        for m in 0..chi_wl {
                            let lv = self.l[[al, m, alp]];
                            if lv == C64::new(0.0, 0.0) {
                                continue;
                            }
                            for s1 in 0..d {
                                for n in 0..chi_wr {
                                    for ar in 0..chi_r {
                                        acc += lv
                                            * psi[[al, s1, ar]]
                                            * self.w[[m, n, s1, s1p]]
                                            * self.r[[ar, n, arp]];
                                    }
                                }
                            }
                        }
                    }
                    out[[alp, s1p, arp]] = acc;
                }
            }
        }
        out
    }
}

impl<'a> LinearOperator for OneSiteHEff<'a> {
    fn dim(&self) -> usize {
        let (a, b, c) = self.dims();
        a * b * c
    }

    fn apply(&self, v: &[C64]) -> Vec<C64> {
        let psi = Array3::from_shape_vec(self.dims(), v.to_vec())
            .expect("flat vector matches the one-site block shape");
        self.apply_block(&psi).into_raw_vec_and_offset().0
    }
}

/// Zero-site effective Hamiltonian on a bond (§A.4.7): a rank-2 matrix on
/// `[chi_l, chi_r]`, with no local operator in between (the MPO bond index
/// is simply shared between `l` and `r`). Used by the backward bond update
/// of single-site TDVP; kept for §A.4.7's full operator set even though the
/// two-site sweep of §A.4.9 drives its back-evolution through
/// [`OneSiteHEff`] instead (§A.9 open question on the exact back-step form).
pub struct ZeroSiteHEff<'a> {
    pub l: &'a Array3<C64>,
    pub r: &'a Array3<C64>,
}

impl<'a> ZeroSiteHEff<'a> {
    pub fn new(l: &'a Array3<C64>, r: &'a Array3<C64>) -> ZeroSiteHEff<'a> {
        ZeroSiteHEff { l, r }
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.l.dim().2, self.r.dim().2)
    }

    pub fn apply_block(&self, c: &Array2<C64>) -> Array2<C64> {
        let (chi_l, chi_w, chi_lp) = self.l.dim();
        let (_, chi_r) = c.dim();
        let (_, _, chi_rp) = self.r.dim();

        let mut out = Array2::<C64>::zeros((chi_lp, chi_rp));
        for alp in 0..chi_lp {
            for arp in 0..chi_rp {
                let mut acc = C64::new(0.0, 0.0);
                for al in 0..chi_l {
                    for m in 0..chi_w {
                        let lv = self.l[[al, m, alp]];
                        if lv == C64::new(0.0, 0.0) {
                            continue;
                        }
                        for ar in 0..chi_r {
                            acc += lv * c[[al, ar]] * self.r[[ar, m, arp]];
                        }
                    }
                }
                out[[alp, arp]] = acc;
            }
        }
        out
    }
}

impl<'a> LinearOperator for ZeroSiteHEff<'a> {
    fn dim(&self) -> usize {
        let (a, b) = self.dims();
        a * b
    }

    fn apply(&self, v: &[C64]) -> Vec<C64> {
        let c = Array2::from_shape_vec(self.dims(), v.to_vec())
            .expect("flat vector matches the zero-site block shape");
        self.apply_block(&c).into_raw_vec_and_offset().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_env(chi: usize) -> Array3<C64> {
        Array3::from_shape_fn((chi, 1, chi), |(i, _, j)| {
            if i == j {
                C64::new(1.0, 0.0)
            } else {
                C64::new(0.0, 0.0)
            }
        })
    }

    fn identity_mpo(d: usize) -> Array4<C64> {
        Array4::from_shape_fn((1, 1, d, d), |(_, _, i, j)| {
            if i == j {
                C64::new(1.0, 0.0)
            } else {
                C64::new(0.0, 0.0)
            }
        })
    }

    #[test]
    fn two_site_identity_mpo_acts_as_identity() {
        let l = identity_env(1);
        let r = identity_env(1);
        let w_i = identity_mpo(2);
        let w_ip1 = identity_mpo(2);
        let heff = TwoSiteHEff::new(&l, &r, &w_i, &w_ip1);
        let psi = Array4::from_shape_fn((1, 2, 2, 1), |(_, s1, s2, _)| {
            C64::new((s1 + 2 * s2) as f64 + 1.0, 0.0)
        });
        let out = heff.apply_block(&psi);
        for ((i0, i1, i2, i3), v) in out.indexed_iter() {
            assert!((v - psi[[i0, i1, i2, i3]]).norm() < 1e-12);
        }
    }

    #[test]
    fn one_site_identity_mpo_preserves_norm() {
        let l = identity_env(1);
        let r = identity_env(1);
        let w = identity_mpo(3);
        let heff = OneSiteHEff::new(&l, &r, &w);
        let psi = Array3::from_shape_fn((1, 3, 1), |(_, s, _)| C64::new(s as f64 + 1.0, 0.0));
        let out = heff.apply_block(&psi);
        for ((i0, i1, i2), v) in out.indexed_iter() {
            assert!((v - psi[[i0, i1, i2]]).norm() < 1e-12);
        }
    }
}
