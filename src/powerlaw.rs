//! Power-law → sum-of-exponentials fit (§A.4.2).
//!
//! Approximates `f(r) = 1/r^α` on `r ∈ [1, N]` by `Σ_k ν_k λ_k^r`, turning a
//! long-range interaction into a bounded-bond-dimension MPO (§A.4.3's
//! `PowerLawCoupling` branch consumes this directly).
use ndarray::Array1;
use ndarray::Array2;

use crate::channel::ExpTerm;
use crate::constants::{FIT_EIGENVALUE_EPS, FIT_PINV_CUTOFF};
use crate::error::{Result, TnCoreError};
use crate::numerics::{lstsq, pinv, real_eigenvalues};
use crate::C64;

/// Default bound on the max-relative-error over `[1, N]` a fit must meet;
/// the testable properties of §A.8 check against this for α ∈ {1,1.5,2,3}.
pub const DEFAULT_MAX_REL_ERROR: f64 = 0.05;

/// Fit `1/r^α` on `r = 1..N` by `K` exponentials, with the default relative
/// error bound.
pub fn fit_power_law(alpha: f64, k: usize, n: usize) -> Result<Vec<ExpTerm>> {
    fit_power_law_with_bound(alpha, k, n, DEFAULT_MAX_REL_ERROR)
}

/// As [`fit_power_law`], with an explicit max-relative-error bound (§A.4.2's
/// "configured bound").
pub fn fit_power_law_with_bound(alpha: f64, k: usize, n: usize, max_rel_error_bound: f64) -> Result<Vec<ExpTerm>> {
    if k == 0 || n == 0 || k > n {
        return Err(TnCoreError::ConfigInvalid {
            reason: format!("power-law fit requires 1 <= K <= N, got K={k}, N={n}"),
        });
    }
    // `thin_orthonormal_basis` slices `K` columns out of a basis with only
    // `rows = N-K+1` rows; without `N+1 >= 2K` that slice is out of bounds.
    if 2 * k > n + 1 {
        return Err(TnCoreError::ConfigInvalid {
            reason: format!("power-law fit requires N+1 >= 2*K, got K={k}, N={n}"),
        });
    }

    // Step 1: F[r] = 1/r^alpha, r = 1..N (0-indexed: f[r0] = 1/(r0+1)^alpha).
    let f: Array1<f64> = (1..=n).map(|r| 1.0 / (r as f64).powf(alpha)).collect();

    // Step 2: Hankel matrix M[i,j] = F[i+j-1] (1-indexed); rows = N-K+1, cols = K.
    let rows = n - k + 1;
    let m = Array2::<C64>::from_shape_fn((rows, k), |(i, j)| C64::new(f[i + j], 0.0));

    // Step 3: thin orthonormal basis of the column space of M (see module docs
    // for why SVD's U stands in for QR's Q here), split into the two
    // shift-overlapping blocks Q1, Q2.
    let u = thin_orthonormal_basis(&m);
    let shift_rows = rows - 1;
    let q1 = u.slice(ndarray::s![0..shift_rows, ..]).to_owned();
    let q2 = u.slice(ndarray::s![1..shift_rows + 1, ..]).to_owned();

    // Step 4: V = pinv(Q1) Q2; eigenvalues are the lambda_k.
    let q1_pinv = pinv(&q1, FIT_PINV_CUTOFF);
    let v = matmul(&q1_pinv, &q2);
    let v_real = v.map(|c| c.re);
    let lambdas = real_eigenvalues(&v_real);

    for &lambda in &lambdas {
        if lambda.norm() >= 1.0 + FIT_EIGENVALUE_EPS {
            return Err(TnCoreError::InvalidFit {
                reason: format!("eigenvalue modulus {} >= 1", lambda.norm()),
                max_rel_error: f64::NAN,
                bound: max_rel_error_bound,
            });
        }
    }

    // Step 5: Lambda[r,j] = lambda_j^r (1-indexed r); solve nu = Lambda \ F.
    let lambda_mat = Array2::<C64>::from_shape_fn((n, k), |(r0, j)| {
        let lam = C64::new(lambdas[j].re, lambdas[j].im);
        lam.powi((r0 + 1) as i32)
    });
    let f_complex: Array1<C64> = f.iter().map(|&x| C64::new(x, 0.0)).collect();
    let nu = lstsq(&lambda_mat, &f_complex);

    let terms: Vec<ExpTerm> = (0..k)
        .map(|j| ExpTerm {
            nu: nu[j],
            lambda: C64::new(lambdas[j].re, lambdas[j].im),
        })
        .collect();

    let max_rel_error = max_relative_error(&terms, alpha, n);
    if max_rel_error > max_rel_error_bound {
        return Err(TnCoreError::InvalidFit {
            reason: "max relative error over [1, N] exceeds bound".into(),
            max_rel_error,
            bound: max_rel_error_bound,
        });
    }

    Ok(terms)
}

fn max_relative_error(terms: &[ExpTerm], alpha: f64, n: usize) -> f64 {
    (1..=n)
        .map(|r| {
            let exact = 1.0 / (r as f64).powf(alpha);
            let approx: C64 = terms
                .iter()
                .map(|t| t.nu * t.lambda.powi(r as i32))
                .sum();
            (exact - approx.re).abs() / exact
        })
        .fold(0.0, f64::max)
}

fn thin_orthonormal_basis(m: &Array2<C64>) -> Array2<C64> {
    use crate::linalg::{to_faer, to_ndarray};
    let mat = to_faer(m.view());
    let svd = mat.svd().expect("SVD should not fail for a finite dense matrix");
    to_ndarray(svd.U().as_ref()).slice(ndarray::s![.., 0..m.ncols()]).to_owned()
}

fn matmul(a: &Array2<C64>, b: &Array2<C64>) -> Array2<C64> {
    let (n, k) = (a.nrows(), a.ncols());
    let cols = b.ncols();
    Array2::from_shape_fn((n, cols), |(i, j)| {
        let mut acc = C64::new(0.0, 0.0);
        for l in 0..k {
            acc += a[[i, l]] * b[[l, j]];
        }
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_k_greater_than_n() {
        assert!(fit_power_law(1.5, 20, 10).is_err());
    }

    #[test]
    fn rejects_k_leaving_fewer_hankel_rows_than_k() {
        // K <= N but N+1 < 2K: rows = N-K+1 < K, which would otherwise panic
        // slicing K columns out of the basis.
        assert!(fit_power_law(1.5, 4, 4).is_err());
    }

    #[test]
    fn fits_within_bound_for_moderate_alpha() {
        for &alpha in &[1.0, 1.5, 2.0, 3.0] {
            let terms = fit_power_law_with_bound(alpha, 10, 100, 0.05)
                .unwrap_or_else(|e| panic!("fit failed for alpha={alpha}: {e:?}"));
            for t in &terms {
                assert!(t.lambda.norm() < 1.0 + 1e-6);
            }
            let err = max_relative_error(&terms, alpha, 100);
            assert!(err <= 0.05, "alpha={alpha} err={err}");
        }
    }
}
