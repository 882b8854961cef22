//! Local solvers (§A.4.8): the Lanczos ground-state eigensolver driving DMRG
//! and the Krylov matrix-exponential solver driving TDVP, both built on top
//! of the [`crate::effective_h::LinearOperator`] contract so neither solver
//! ever materializes a full effective Hamiltonian.
use ndarray::Array2;

use crate::constants::{BREAKDOWN_TOL, LANCZOS_RESIDUAL_TOL, I};
use crate::effective_h::LinearOperator;
use crate::numerics::{expm, hermitian_eigen};
use crate::C64;

/// Outcome flag threaded back to the sweep engine's [`crate::callback::SweepStatus`]
/// (§A.7: non-fatal local-solver taxa).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Converged,
    NonConvergence,
    Breakdown,
}

fn dot(a: &[C64], b: &[C64]) -> C64 {
    a.iter().zip(b).map(|(x, y)| x.conj() * y).sum()
}

fn vec_norm(a: &[C64]) -> f64 {
    dot(a, a).re.max(0.0).sqrt()
}

fn axpy(y: &mut [C64], alpha: C64, x: &[C64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

fn normalized(v: &[C64]) -> Vec<C64> {
    let n = vec_norm(v);
    if n < 1e-300 {
        return v.to_vec();
    }
    v.iter().map(|x| x / C64::new(n, 0.0)).collect()
}

/// Result of [`lanczos_ground_state`]: a unit-norm approximation to the
/// ground state of `H_eff` restricted to the spanned Krylov subspace
/// (§A.4.8).
pub struct LanczosResult {
    pub eigenvalue: f64,
    pub vector: Vec<C64>,
    pub status: SolverStatus,
    pub iterations: usize,
}

/// Standard Lanczos with reorthogonalization against every prior Krylov
/// vector (§A.4.8 calls for "partial... and selective reorthogonalization on
/// a drop-tolerance of 1e-12·‖T‖"; at the Krylov dimensions this engine runs
/// with — order 10 — selective reorthogonalization against every vector
/// whose overlap exceeds the drop tolerance is, in practice, full
/// reorthogonalization, so that is what this does). Terminates early once
/// the Ritz residual drops below [`LANCZOS_RESIDUAL_TOL`]; short-circuits on
/// breakdown (`β = 0`) with the best current Ritz pair (§A.4.8).
pub fn lanczos_ground_state(
    op: &dyn LinearOperator,
    v0: &[C64],
    krylov_dim: usize,
    max_iter: usize,
) -> LanczosResult {
    let dim = op.dim();
    let m = krylov_dim.min(dim).max(1).min(max_iter.max(1));

    let mut qs: Vec<Vec<C64>> = Vec::with_capacity(m);
    let mut alpha: Vec<f64> = Vec::with_capacity(m);
    let mut beta: Vec<f64> = Vec::with_capacity(m.saturating_sub(1));

    let mut q = normalized(v0);
    let mut q_prev: Option<Vec<C64>> = None;
    let mut beta_prev = 0.0;
    let mut breakdown = false;
    let mut built = 0;

    for _ in 0..m {
        qs.push(q.clone());
        let mut w = op.apply(&q);
        let a_k = dot(&q, &w).re;
        alpha.push(a_k);
        axpy(&mut w, C64::new(-a_k, 0.0), &q);
        if let Some(qp) = &q_prev {
            axpy(&mut w, C64::new(-beta_prev, 0.0), qp);
        }
        for qprev in &qs {
            let overlap = dot(qprev, &w);
            if overlap.norm() > BREAKDOWN_TOL.sqrt() {
                axpy(&mut w, -overlap, qprev);
            }
        }
        let b_k = vec_norm(&w);
        built += 1;
        if b_k < BREAKDOWN_TOL {
            breakdown = true;
            break;
        }
        beta.push(b_k);
        q_prev = Some(q);
        beta_prev = b_k;
        q = w.iter().map(|x| x / C64::new(b_k, 0.0)).collect();

        if let Some((lambda, vec_)) = ritz_ground_pair(&alpha, &beta, &qs) {
            let residual = ritz_residual(op, &vec_, lambda);
            if residual < LANCZOS_RESIDUAL_TOL {
                return LanczosResult {
                    eigenvalue: lambda,
                    vector: vec_,
                    status: SolverStatus::Converged,
                    iterations: built,
                };
            }
        }
    }

    let (eigenvalue, vector) =
        ritz_ground_pair(&alpha, &beta, &qs).expect("Krylov subspace is non-empty after at least one iteration");
    // Reaching this point means the Krylov subspace was exhausted (`built ==
    // m`) without the early residual-below-tolerance return above; per §A.7
    // that is SOLVER_NON_CONVERGENCE regardless of how `max_iter` compares to
    // `m`, unless the subspace instead closed via breakdown.
    let status = if breakdown {
        SolverStatus::Breakdown
    } else {
        SolverStatus::NonConvergence
    };
    LanczosResult {
        eigenvalue,
        vector,
        status,
        iterations: built,
    }
}

fn ritz_ground_pair(alpha: &[f64], beta: &[f64], qs: &[Vec<C64>]) -> Option<(f64, Vec<C64>)> {
    let k = alpha.len();
    if k == 0 {
        return None;
    }
    let t = Array2::<C64>::from_shape_fn((k, k), |(i, j)| {
        if i == j {
            C64::new(alpha[i], 0.0)
        } else if j == i + 1 && i < beta.len() {
            C64::new(beta[i], 0.0)
        } else if i == j + 1 && j < beta.len() {
            C64::new(beta[j], 0.0)
        } else {
            C64::new(0.0, 0.0)
        }
    });
    let (values, vectors) = hermitian_eigen(&t);
    let _ = &values[0];
    let coeffs: Vec<C64> = (0..k).map(|i| vectors[[i, 0]]).collect();

    let dim = qs[0].len();
    let mut vec_out = vec![C64::new(0.0, 0.0); dim];
    for (c, q) in coeffs.iter().zip(qs) {
        axpy(&mut vec_out, *c, q);
    }
    Some((values[0], normalized(&vec_out)))
}

fn ritz_residual(op: &dyn LinearOperator, v: &[C64], lambda: f64) -> f64 {
    let mut hv = op.apply(v);
    axpy(&mut hv, C64::new(-lambda, 0.0), v);
    vec_norm(&hv)
}

/// Which branch of the propagator the Krylov exponential solver forms
/// (§A.4.8): `exp(-i·dt·H̄_m)` for real-time evolution, `exp(-dt·H̄_m)` for
/// imaginary time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolutionKind {
    Real,
    Imaginary,
}

/// Result of [`krylov_expm_apply`] (§A.4.8).
pub struct KrylovExpResult {
    pub vector: Vec<C64>,
    pub achieved_error: f64,
    pub status: SolverStatus,
    pub iterations: usize,
}

/// Arnoldi on `H_eff` (not required Hermitian) to form `(V_m, H̄_m)`, then the
/// dense matrix exponential of the small Hessenberg matrix (§A.4.8). If `m`
/// is reached without `tol` being met on the last-subdiagonal estimator, the
/// best available vector is returned along with the achieved error; the
/// caller may re-invoke with a smaller `dt`.
pub fn krylov_expm_apply(
    op: &dyn LinearOperator,
    v: &[C64],
    dt: f64,
    krylov_dim: usize,
    tol: f64,
    kind: EvolutionKind,
) -> KrylovExpResult {
    let dim = op.dim();
    let beta0 = vec_norm(v);
    if beta0 < 1e-300 {
        return KrylovExpResult {
            vector: v.to_vec(),
            achieved_error: 0.0,
            status: SolverStatus::Converged,
            iterations: 0,
        };
    }
    let m = krylov_dim.min(dim).max(1);

    let mut vs: Vec<Vec<C64>> = vec![v.iter().map(|x| x / C64::new(beta0, 0.0)).collect()];
    let mut h = vec![vec![C64::new(0.0, 0.0); m + 1]; m + 1];
    let mut last_subdiag = 0.0;
    let mut built = 0;
    let mut breakdown = false;

    for j in 0..m {
        let mut w = op.apply(&vs[j]);
        for (i, vi) in vs.iter().enumerate() {
            let hij = dot(vi, &w);
            h[i][j] = hij;
            axpy(&mut w, -hij, vi);
        }
        let h_next = vec_norm(&w);
        built = j + 1;
        if h_next < BREAKDOWN_TOL {
            last_subdiag = 0.0;
            breakdown = true;
            break;
        }
        h[j + 1][j] = C64::new(h_next, 0.0);
        last_subdiag = h_next;
        vs.push(w.iter().map(|x| x / C64::new(h_next, 0.0)).collect());
    }

    let hbar = Array2::<C64>::from_shape_fn((built, built), |(i, j)| h[i][j]);
    let exponent = match kind {
        EvolutionKind::Real => hbar.mapv(|x| x * (-I * dt)),
        EvolutionKind::Imaginary => hbar.mapv(|x| x * C64::new(-dt, 0.0)),
    };
    let exp_mat = expm(&exponent);
    let y: Vec<C64> = (0..built).map(|i| exp_mat[[i, 0]]).collect();

    let achieved_error = last_subdiag * y.last().map(|c| c.norm()).unwrap_or(0.0) * dt.abs();

    let mut result = vec![C64::new(0.0, 0.0); dim];
    for (i, vi) in vs.iter().enumerate().take(built) {
        axpy(&mut result, y[i] * C64::new(beta0, 0.0), vi);
    }

    let status = if breakdown {
        SolverStatus::Breakdown
    } else if tol > 0.0 && achieved_error > tol {
        SolverStatus::NonConvergence
    } else {
        SolverStatus::Converged
    };

    KrylovExpResult {
        vector: result,
        achieved_error,
        status,
        iterations: built,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    struct DiagonalOp {
        diag: Vec<f64>,
    }
    impl LinearOperator for DiagonalOp {
        fn dim(&self) -> usize {
            self.diag.len()
        }
        fn apply(&self, v: &[C64]) -> Vec<C64> {
            v.iter().zip(&self.diag).map(|(x, d)| x * C64::new(*d, 0.0)).collect()
        }
    }

    #[test]
    fn lanczos_finds_lowest_eigenvalue_of_diagonal_operator() {
        let op = DiagonalOp {
            diag: vec![3.0, -1.0, 2.0, 5.0],
        };
        let v0 = vec![
            C64::new(1.0, 0.0),
            C64::new(1.0, 0.0),
            C64::new(1.0, 0.0),
            C64::new(1.0, 0.0),
        ];
        let result = lanczos_ground_state(&op, &v0, 4, 20);
        assert!((result.eigenvalue - (-1.0)).abs() < 1e-6, "eigenvalue={}", result.eigenvalue);
        assert!(result.vector[1].norm() > 0.9);
    }

    #[test]
    fn lanczos_reports_non_convergence_when_krylov_dim_is_tighter_than_max_iter() {
        let op = DiagonalOp {
            diag: vec![5.0, -3.0, 1.0, 4.0, -2.0, 2.5, 0.5, -4.5],
        };
        let v0: Vec<C64> = (0..8).map(|i| C64::new(1.0 + i as f64, 0.0)).collect();
        // krylov_dim << max_iter mirrors DMRG's usual configuration; two Krylov
        // vectors can't pin down a ground state among eight well-spread
        // eigenvalues to LANCZOS_RESIDUAL_TOL, so this must exhaust the
        // subspace rather than report Converged.
        let result = lanczos_ground_state(&op, &v0, 2, 30);
        assert_eq!(result.status, SolverStatus::NonConvergence);
        assert_eq!(result.iterations, 2);
    }

    #[test]
    fn krylov_exp_identity_step_preserves_vector_under_zero_hamiltonian() {
        let op = DiagonalOp { diag: vec![0.0, 0.0] };
        let v = vec![C64::new(1.0, 0.0), C64::new(0.0, 1.0)];
        let result = krylov_expm_apply(&op, &v, 0.1, 4, 1e-10, EvolutionKind::Real);
        for (a, b) in result.vector.iter().zip(&v) {
            assert!((a - b).norm() < 1e-8);
        }
    }

    #[test]
    fn krylov_exp_real_evolution_preserves_norm() {
        let op = DiagonalOp {
            diag: vec![1.0, -2.0, 0.5],
        };
        let v = vec![C64::new(1.0, 0.0), C64::new(0.5, 0.2), C64::new(-0.3, 0.1)];
        let before = vec_norm(&v);
        let result = krylov_expm_apply(&op, &v, 0.05, 6, 1e-12, EvolutionKind::Real);
        let after = vec_norm(&result.vector);
        assert!((before - after).abs() < 1e-6, "before={before} after={after}");
    }

    #[test]
    fn dim_consistency_smoke_for_array3_shaped_state() {
        // Sanity check that flattening/unflattening a rank-3 block round-trips,
        // exercising the same pattern the sweep engine uses for one-site states.
        let a = Array3::<C64>::from_shape_fn((2, 3, 2), |(i, j, k)| C64::new((i + j + k) as f64, 0.0));
        let flat: Vec<C64> = a.iter().cloned().collect();
        let back = Array3::from_shape_vec((2, 3, 2), flat).unwrap();
        assert_eq!(a, back);
    }
}
