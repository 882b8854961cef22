//! Small dense-linear-algebra kernels that back [`crate::powerlaw`] (§A.4.2,
//! §A.9 design note: "pivot the QR and guard the pinv with a relative-cutoff
//! on singular values").
//!
//! The spec's fit procedure asks for a thin QR of the Hankel matrix purely to
//! get an orthonormal basis of its column space; an orthonormal basis from a
//! thin SVD spans the same subspace, and the eigenvalues of the resulting
//! shift operator `pinv(Q1)·Q2` are invariant under the choice of orthonormal
//! basis (any two differ by an orthogonal similarity transform). We reuse the
//! SVD kernel (needed everywhere else in the engine for truncation anyway)
//! instead of introducing a second decomposition primitive.
use faer::Mat;
use ndarray::{Array1, Array2};
use num_complex::Complex64;

use crate::linalg::{to_faer, to_ndarray};
use crate::C64;

/// Diagonalize a (numerically) Hermitian operator, ascending eigenvalues,
/// with a stable tie-break on the original ordering (§A.3). Shared by the
/// site catalog's eigenbasis precomputation and the Lanczos solver's
/// tridiagonal diagonalization (§A.4.8).
pub fn hermitian_eigen(op: &Array2<C64>) -> (Vec<f64>, Array2<C64>) {
    let m = to_faer(op.view());
    let eig = m
        .self_adjoint_eigen(faer::Side::Lower)
        .expect("Hermitian diagonalization should never fail for finite-dim input");
    let values_raw: Vec<f64> = eig.S().column_vector().iter().map(|v| v.re).collect();
    let vectors_raw = eig.U();

    let mut order: Vec<usize> = (0..values_raw.len()).collect();
    order.sort_by(|&i, &j| values_raw[i].partial_cmp(&values_raw[j]).unwrap().then(i.cmp(&j)));

    let d = values_raw.len();
    let values = order.iter().map(|&i| values_raw[i]).collect();
    let vectors = Array2::from_shape_fn((d, d), |(row, col)| vectors_raw[(row, order[col])]);
    (values, vectors)
}

/// Dense matrix exponential via scaling-and-squaring with a truncated Taylor
/// series (§A.4.8: "direct dense matrix exponential" on the small Krylov
/// Hessenberg matrix `H̄_m`, not an eigendecomposition — `H̄_m` need not be
/// diagonalizable at all for a general, non-Hermitian effective Hamiltonian).
pub fn expm(a: &Array2<C64>) -> Array2<C64> {
    let n = a.nrows();
    if n == 0 {
        return Array2::zeros((0, 0));
    }
    let norm_bound: f64 = a.iter().map(|x| x.norm()).fold(0.0, f64::max) * n as f64;
    let mut scale = 1.0;
    let mut squarings = 0u32;
    while norm_bound * scale > 0.5 {
        scale *= 0.5;
        squarings += 1;
    }
    let scaled = a.mapv(|x| x * C64::new(scale, 0.0));

    let eye = Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            C64::new(1.0, 0.0)
        } else {
            C64::new(0.0, 0.0)
        }
    });
    let mut term = eye.clone();
    let mut result = eye;
    const TAYLOR_TERMS: usize = 20;
    for k in 1..=TAYLOR_TERMS {
        term = matmul_square(&term, &scaled).mapv(|x| x / C64::new(k as f64, 0.0));
        result = &result + &term;
    }
    for _ in 0..squarings {
        result = matmul_square(&result, &result);
    }
    result
}

fn matmul_square(a: &Array2<C64>, b: &Array2<C64>) -> Array2<C64> {
    let n = a.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        let mut acc = C64::new(0.0, 0.0);
        for l in 0..n {
            acc += a[[i, l]] * b[[l, j]];
        }
        acc
    })
}

/// Pseudo-inverse of `a` via SVD, discarding singular values below
/// `rel_cutoff · sigma_max` (the guard the design note asks for).
pub fn pinv(a: &Array2<C64>, rel_cutoff: f64) -> Array2<C64> {
    let m = to_faer(a.view());
    let svd = m.svd().expect("SVD should not fail for a finite dense matrix");
    let u = svd.U();
    let v = svd.V();
    let s = svd.S().column_vector();

    let sigma_max = (0..s.nrows()).map(|i| s[i].re).fold(0.0, f64::max);
    let threshold = sigma_max * rel_cutoff;

    let mut s_inv = Mat::<C64>::zeros(s.nrows(), s.nrows());
    for i in 0..s.nrows() {
        if s[i].re > threshold {
            s_inv[(i, i)] = C64::new(1.0 / s[i].re, 0.0);
        }
    }

    let pinv_mat = v * s_inv * u.adjoint();
    to_ndarray(pinv_mat.as_ref())
}

/// Least-squares solve `a·x ≈ b` via the pseudo-inverse (§A.4.2 step 5).
pub fn lstsq(a: &Array2<C64>, b: &Array1<C64>) -> Array1<C64> {
    let p = pinv(a, 1e-12);
    let mut x = Array1::<C64>::zeros(p.nrows());
    for i in 0..p.nrows() {
        let mut acc = C64::new(0.0, 0.0);
        for j in 0..p.ncols() {
            acc += p[[i, j]] * b[j];
        }
        x[i] = acc;
    }
    x
}

/// Real general eigenvalues of a small square matrix via Hessenberg
/// reduction followed by the shifted-QR algorithm with deflation. Hand
/// rolled rather than reached for a library general-eigenvalue routine
/// because the fit's matrices are tiny (`K` on the order of 10) and the
/// routine only needs to support that regime robustly.
pub fn real_eigenvalues(a: &Array2<f64>) -> Vec<Complex64> {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "real_eigenvalues requires a square matrix");
    if n == 0 {
        return Vec::new();
    }
    let mut h = hessenberg(a);
    let mut eigs = Vec::with_capacity(n);
    let mut hi = n;
    let mut iter_budget = 30 * n * n + 100;

    while hi > 0 {
        if hi == 1 {
            eigs.push(Complex64::new(h[[0, 0]], 0.0));
            hi = 0;
            continue;
        }
        // Deflate any negligible subdiagonal entries first.
        let mut lo = hi - 1;
        while lo > 0 && h[[lo, lo - 1]].abs() > 1e-13 * (h[[lo - 1, lo - 1]].abs() + h[[lo, lo]].abs()).max(1e-300)
        {
            lo -= 1;
        }
        if lo == hi - 1 {
            eigs.push(Complex64::new(h[[lo, lo]], 0.0));
            hi -= 1;
            continue;
        }
        if lo == hi - 2 {
            let (a11, a12, a21, a22) = (h[[lo, lo]], h[[lo, lo + 1]], h[[lo + 1, lo]], h[[lo + 1, lo + 1]]);
            let (e1, e2) = eigenvalues_2x2(a11, a12, a21, a22);
            eigs.push(e1);
            eigs.push(e2);
            hi -= 2;
            continue;
        }
        if iter_budget == 0 {
            // Budget exhausted: report remaining diagonal entries as a
            // best-effort approximation rather than looping forever.
            for i in 0..hi {
                eigs.push(Complex64::new(h[[i, i]], 0.0));
            }
            break;
        }
        iter_budget -= 1;

        // Wilkinson shift from the trailing 2x2 block of the active submatrix.
        let shift = wilkinson_shift(&h, hi);
        let active = h.slice(ndarray::s![0..hi, 0..hi]).to_owned();
        let shifted = &active - &(Array2::<f64>::eye(hi) * shift);
        let (q, r) = qr_real(&shifted);
        let next = r.dot(&q) + Array2::<f64>::eye(hi) * shift;
        h.slice_mut(ndarray::s![0..hi, 0..hi]).assign(&next);
    }

    eigs.reverse();
    eigs
}

fn eigenvalues_2x2(a11: f64, a12: f64, a21: f64, a22: f64) -> (Complex64, Complex64) {
    let tr = a11 + a22;
    let det = a11 * a22 - a12 * a21;
    let disc = tr * tr - 4.0 * det;
    if disc >= 0.0 {
        let sq = disc.sqrt();
        (
            Complex64::new((tr + sq) / 2.0, 0.0),
            Complex64::new((tr - sq) / 2.0, 0.0),
        )
    } else {
        let sq = (-disc).sqrt() / 2.0;
        let re = tr / 2.0;
        (Complex64::new(re, sq), Complex64::new(re, -sq))
    }
}

fn wilkinson_shift(h: &Array2<f64>, hi: usize) -> f64 {
    let a11 = h[[hi - 2, hi - 2]];
    let a12 = h[[hi - 2, hi - 1]];
    let a21 = h[[hi - 1, hi - 2]];
    let a22 = h[[hi - 1, hi - 1]];
    let (e1, e2) = eigenvalues_2x2(a11, a12, a21, a22);
    if e1.im == 0.0 && e2.im == 0.0 {
        if (e1.re - a22).abs() < (e2.re - a22).abs() {
            e1.re
        } else {
            e2.re
        }
    } else {
        a22
    }
}

/// Reduce a real square matrix to upper Hessenberg form by orthogonal similarity.
fn hessenberg(a: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let mut h = a.clone();
    for k in 0..n.saturating_sub(2) {
        let col: Vec<f64> = (k + 1..n).map(|i| h[[i, k]]).collect();
        let norm = col.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm < 1e-300 {
            continue;
        }
        let alpha = if col[0] >= 0.0 { -norm } else { norm };
        let mut v = col.clone();
        v[0] -= alpha;
        let v_norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if v_norm < 1e-300 {
            continue;
        }
        for vi in v.iter_mut() {
            *vi /= v_norm;
        }
        // H <- (I - 2vv^T) H (I - 2vv^T), restricted to rows/cols k+1..n.
        for j in 0..n {
            let mut dot = 0.0;
            for (idx, &vi) in v.iter().enumerate() {
                dot += vi * h[[k + 1 + idx, j]];
            }
            for (idx, &vi) in v.iter().enumerate() {
                h[[k + 1 + idx, j]] -= 2.0 * vi * dot;
            }
        }
        for i in 0..n {
            let mut dot = 0.0;
            for (idx, &vi) in v.iter().enumerate() {
                dot += vi * h[[i, k + 1 + idx]];
            }
            for (idx, &vi) in v.iter().enumerate() {
                h[[i, k + 1 + idx]] -= 2.0 * vi * dot;
            }
        }
    }
    h
}

/// Thin QR of a real square matrix via modified Gram-Schmidt (used only
/// inside the shifted-QR eigenvalue iteration above, on small matrices).
fn qr_real(a: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut q = a.clone();
    let mut r = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        for i in 0..j {
            let dot = q.column(i).dot(&q.column(j));
            r[[i, j]] = dot;
            let col_i = q.column(i).to_owned();
            let mut col_j = q.column_mut(j);
            col_j -= &(col_i * dot);
        }
        let norm = q.column(j).dot(&q.column(j)).sqrt();
        r[[j, j]] = norm;
        if norm > 1e-300 {
            let mut col_j = q.column_mut(j);
            col_j /= norm;
        }
    }
    (q, r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn real_eigenvalues_of_diagonal_matrix() {
        let a = arr2(&[[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, -1.0]]);
        let mut eigs: Vec<f64> = real_eigenvalues(&a).iter().map(|e| e.re).collect();
        eigs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((eigs[0] - (-1.0)).abs() < 1e-8);
        assert!((eigs[1] - 2.0).abs() < 1e-8);
        assert!((eigs[2] - 3.0).abs() < 1e-8);
    }

    #[test]
    fn real_eigenvalues_of_rotation_are_complex() {
        // 90-degree rotation: eigenvalues +-i.
        let a = arr2(&[[0.0, -1.0], [1.0, 0.0]]);
        let eigs = real_eigenvalues(&a);
        assert_eq!(eigs.len(), 2);
        assert!(eigs.iter().all(|e| (e.re).abs() < 1e-8));
        assert!(eigs.iter().all(|e| (e.im.abs() - 1.0).abs() < 1e-8));
    }

    #[test]
    fn pinv_round_trips_on_full_rank_square_matrix() {
        let a = Array2::<C64>::from_shape_fn((3, 3), |(i, j)| {
            C64::new(if i == j { 2.0 } else { 0.1 * (i as f64 - j as f64) }, 0.0)
        });
        let p = pinv(&a, 1e-12);
        // a * pinv(a) ~= I
        let mut prod = Array2::<C64>::zeros((3, 3));
        for i in 0..3 {
            for j in 0..3 {
                let mut acc = C64::new(0.0, 0.0);
                for k in 0..3 {
                    acc += a[[i, k]] * p[[k, j]];
                }
                prod[[i, j]] = acc;
            }
        }
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((prod[[i, j]].re - expected).abs() < 1e-6);
                assert!(prod[[i, j]].im.abs() < 1e-6);
            }
        }
    }
}
