//! Dense and matrix-free linear solvers backing the samplers.
//!
//! The per-entity posterior draws and hyperparameter updates all reduce to
//! small symmetric positive definite systems, solved via Cholesky through
//! `scirs2_linalg`. The macau link-matrix solve additionally offers a
//! matrix-free conjugate-gradient path on the feature normal equations,
//! which never materializes FᵀF.

use scirs2_core::ndarray_ext::{Array1, Array2};

use tensorfact_core::SideInfo;

use crate::error::EngineError;

/// Outcome of an iterative solve.
#[derive(Debug, Clone, Copy)]
pub struct SolveReport {
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
}

/// Lower Cholesky factor of a symmetric positive definite matrix.
///
/// Failure means the precision matrix lost positive definiteness, which is
/// a fatal numerical error for the sampler.
pub fn cholesky_factor(a: &Array2<f64>, context: &str) -> Result<Array2<f64>, EngineError> {
    scirs2_linalg::cholesky(&a.view(), None).map_err(|e| EngineError::numerical(context, e))
}

/// Solve `L x = b` for lower-triangular `L` by forward substitution.
pub fn solve_lower(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut x = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut s = b[i];
        for j in 0..i {
            s -= l[[i, j]] * x[j];
        }
        x[i] = s / l[[i, i]];
    }
    x
}

/// Solve `Lᵀ x = b` for lower-triangular `L` by back substitution.
pub fn solve_upper(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut s = b[i];
        for j in (i + 1)..n {
            s -= l[[j, i]] * x[j];
        }
        x[i] = s / l[[i, i]];
    }
    x
}

/// Solve `A X = B` column by column for symmetric positive definite `A`.
pub fn spd_solve(
    a: &Array2<f64>,
    b: &Array2<f64>,
    context: &str,
) -> Result<Array2<f64>, EngineError> {
    let l = cholesky_factor(a, context)?;
    let mut x = Array2::<f64>::zeros(b.dim());
    for (j, col) in b.columns().into_iter().enumerate() {
        let y = solve_lower(&l, &col.to_owned());
        let xj = solve_upper(&l, &y);
        x.column_mut(j).assign(&xj);
    }
    Ok(x)
}

/// Inverse of a symmetric positive definite matrix via Cholesky.
pub fn spd_inverse(a: &Array2<f64>, context: &str) -> Result<Array2<f64>, EngineError> {
    let n = a.nrows();
    let eye = Array2::<f64>::eye(n);
    spd_solve(a, &eye, context)
}

/// Conjugate gradient on the regularized feature normal equations
/// `(FᵀF + reg·I) x = b`, applying `F` and `Fᵀ` matrix-free.
pub fn cg_normal_eq(
    side: &SideInfo,
    reg: f64,
    b: &Array1<f64>,
    tol: f64,
    max_iter: usize,
) -> (Array1<f64>, SolveReport) {
    let apply = |x: &Array1<f64>| -> Array1<f64> {
        let fx = side.mul_vec(x);
        side.t_mul_vec(&fx) + &(x * reg)
    };

    let mut x = Array1::<f64>::zeros(b.len());
    let mut r = b.clone();
    let mut p = r.clone();
    let mut rs_old = r.dot(&r);
    let b_norm = rs_old.sqrt().max(f64::EPSILON);

    if rs_old.sqrt() / b_norm < tol {
        return (
            x,
            SolveReport {
                iterations: 0,
                residual: 0.0,
                converged: true,
            },
        );
    }

    let mut iterations = 0;
    let mut converged = false;
    for _ in 0..max_iter {
        let ap = apply(&p);
        let denom = p.dot(&ap);
        if denom.abs() < f64::EPSILON {
            break;
        }
        let alpha = rs_old / denom;
        x = &x + &(&p * alpha);
        r = &r - &(&ap * alpha);
        iterations += 1;

        let rs_new = r.dot(&r);
        if rs_new.sqrt() / b_norm < tol {
            rs_old = rs_new;
            converged = true;
            break;
        }
        p = &r + &(&p * (rs_new / rs_old));
        rs_old = rs_new;
    }

    let report = SolveReport {
        iterations,
        residual: rs_old.sqrt() / b_norm,
        converged,
    };
    (x, report)
}
