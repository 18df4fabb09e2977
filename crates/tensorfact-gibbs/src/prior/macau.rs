//! Normal prior with side information (macau).
//!
//! The prior mean of each entity is shifted by a linear map of its feature
//! row: `mu_n = mu + beta' f_n`. The link matrix `beta` is resampled each
//! sweep from a ridge-regularized regression of the noise-injected factors
//! on the features, either by direct Cholesky on FᵀF or matrix-free
//! conjugate gradient.

use std::sync::Arc;

use scirs2_core::ndarray_ext::{Array1, Array2, Axis};
use scirs2_core::random::rngs::StdRng;

use tensorfact_core::{Block, SideInfo};

use crate::config::MacauSolver;
use crate::error::EngineError;
use crate::model::Model;
use crate::noise::NoiseModel;
use crate::rand::{cond_normal_wishart_data, mvnormal_prec_rows, rand_gamma, sample_posterior};
use crate::solver::{cg_normal_eq, spd_solve};

use super::{block_grams, entity_rng, likelihood_stats, map_entities};

// Gamma hyperprior on the link precision when it is resampled.
const BETA_PRECISION_NU0: f64 = 1e-3;
const BETA_PRECISION_MU0: f64 = 1.0;

#[derive(Debug)]
pub struct MacauPrior {
    mode: usize,
    mu: Array1<f64>,
    lambda: Array2<f64>,
    mu0: Array1<f64>,
    b0: f64,
    wi: Array2<f64>,
    df: f64,

    side: Arc<SideInfo>,
    /// Link matrix, `(num_features, num_latent)`.
    beta: Array2<f64>,
    /// Feature-predicted means `F beta`, `(extent, num_latent)`.
    uhat: Array2<f64>,
    bt_b: Array2<f64>,
    beta_precision: f64,
    sample_beta_precision: bool,
    solver: MacauSolver,
    /// FᵀF, materialized once for the direct solver.
    ft_f: Option<Array2<f64>>,
}

impl MacauPrior {
    pub fn new(
        mode: usize,
        num_latent: usize,
        side: Arc<SideInfo>,
        beta_precision: f64,
        sample_beta_precision: bool,
        solver: MacauSolver,
    ) -> Self {
        let num_feat = side.num_features();
        let extent = side.num_rows();
        let ft_f = match solver {
            MacauSolver::Direct => Some(side.ft_f()),
            MacauSolver::Cg { .. } => None,
        };
        Self {
            mode,
            mu: Array1::zeros(num_latent),
            lambda: Array2::eye(num_latent) * 10.0,
            mu0: Array1::zeros(num_latent),
            b0: 2.0,
            wi: Array2::eye(num_latent),
            df: num_latent as f64,
            side,
            beta: Array2::zeros((num_feat, num_latent)),
            uhat: Array2::zeros((extent, num_latent)),
            bt_b: Array2::zeros((num_latent, num_latent)),
            beta_precision,
            sample_beta_precision,
            solver,
            ft_f,
        }
    }

    pub fn beta(&self) -> &Array2<f64> {
        &self.beta
    }

    pub fn beta_precision(&self) -> f64 {
        self.beta_precision
    }

    pub(crate) fn sample_mode(
        &mut self,
        model: &mut Model,
        blocks: &[(Block, NoiseModel)],
        iter: usize,
        seed: u64,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, EngineError> {
        let mode = self.mode;
        let extent = model.dims()[mode];
        let grams = block_grams(model, mode, blocks);

        let model_ref = &*model;
        let lambda = &self.lambda;
        let mu = &self.mu;
        let uhat = &self.uhat;
        let rows = map_entities(extent, |n| {
            let mut rng_n = entity_rng(seed, iter, mode, n);
            let (mut rr, mut mm) = likelihood_stats(model_ref, mode, n, blocks, &grams, &mut rng_n);
            let full_mu = mu + &uhat.row(n);
            rr += &lambda.dot(&full_mu);
            mm += lambda;
            sample_posterior(&mut rng_n, &mm, &rr)
        })?;

        let factor = model.factor_mut(mode);
        for (n, row) in rows.iter().enumerate() {
            factor.row_mut(n).assign(row);
        }

        self.update_hyper(model.factor(mode), rng)
    }

    fn update_hyper(
        &mut self,
        factor: &Array2<f64>,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, EngineError> {
        let num_feat = self.side.num_features();

        // Normal-Wishart on the residual factors, with the link matrix
        // folded into the scale.
        let centered = factor - &self.uhat;
        let wi = &self.wi + &(&self.bt_b * self.beta_precision);
        let (mu, lambda) = cond_normal_wishart_data(
            rng,
            &centered,
            &self.mu0,
            self.b0,
            &wi,
            self.df + num_feat as f64,
        )?;
        self.mu = mu;
        self.lambda = lambda;

        // Noise-injected regression target Fᵀ(U + E - mu) + sqrt(bp) E'.
        let hyper_u = {
            let noise = mvnormal_prec_rows(rng, &self.lambda, factor.nrows())?;
            let mut h = factor + &noise;
            for mut row in h.rows_mut() {
                row -= &self.mu;
            }
            h
        };
        let mut ft_y = self.side.ft_mul(&hyper_u);
        let extra = mvnormal_prec_rows(rng, &self.lambda, num_feat)?;
        ft_y += &(&extra * self.beta_precision.sqrt());

        let warnings = self.solve_beta(&ft_y)?;

        self.bt_b = self.beta.t().dot(&self.beta);
        if self.sample_beta_precision {
            self.beta_precision = self.sample_precision(rng);
        }
        self.uhat = self.side.mul(&self.beta);
        Ok(warnings)
    }

    /// Solve `(FᵀF + bp I) beta = Ft_y` with the configured solver.
    fn solve_beta(&mut self, ft_y: &Array2<f64>) -> Result<Vec<String>, EngineError> {
        match self.solver {
            MacauSolver::Direct => {
                let ft_f = self
                    .ft_f
                    .as_ref()
                    .ok_or_else(|| EngineError::numerical("macau link solve", "missing FᵀF"))?;
                let mut a = ft_f.clone();
                for i in 0..a.nrows() {
                    a[[i, i]] += self.beta_precision;
                }
                self.beta = spd_solve(&a, ft_y, "macau link solve")?;
                Ok(Vec::new())
            }
            MacauSolver::Cg { tol, max_iter } => {
                let mut warnings = Vec::new();
                for (k, col) in ft_y.columns().into_iter().enumerate() {
                    let (x, report) =
                        cg_normal_eq(&self.side, self.beta_precision, &col.to_owned(), tol, max_iter);
                    if !report.converged {
                        warnings.push(format!(
                            "link solve for mode {} component {k} stopped at residual {:.3e} after {} iterations",
                            self.mode, report.residual, report.iterations
                        ));
                    }
                    self.beta.column_mut(k).assign(&x);
                }
                Ok(warnings)
            }
        }
    }

    /// Gamma posterior draw for the link precision.
    fn sample_precision(&self, rng: &mut StdRng) -> f64 {
        let n_elem = (self.beta.nrows() * self.beta.ncols()) as f64;
        let trace: f64 = self
            .bt_b
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, row)| row.dot(&self.lambda.column(i)))
            .sum();
        let nux = BETA_PRECISION_NU0 + n_elem;
        let mux = BETA_PRECISION_MU0 * nux / (BETA_PRECISION_NU0 + BETA_PRECISION_MU0 * trace);
        rand_gamma(rng, 0.5 * nux, 2.0 * mux / nux)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;
    use scirs2_core::random::SeedableRng;

    fn identity_side(n: usize) -> Arc<SideInfo> {
        Arc::new(SideInfo::dense(Array2::eye(n)))
    }

    #[test]
    fn uhat_follows_features() {
        // With identity features, uhat converges toward the factors
        // themselves as beta is resampled.
        let mut rng = StdRng::seed_from_u64(3);
        let mut prior = MacauPrior::new(
            0,
            2,
            identity_side(4),
            10.0,
            false,
            MacauSolver::Direct,
        );
        let factor = Array2::from_shape_fn((4, 2), |(i, j)| (i + j) as f64);
        prior.update_hyper(&factor, &mut rng).unwrap();
        assert_eq!(prior.uhat.dim(), (4, 2));
        // beta = (I + bp I)^-1 (noise-injected target): finite and nonzero.
        assert!(prior.beta().iter().all(|v| v.is_finite()));
        assert!(prior.beta().iter().any(|&v| v != 0.0));
    }

    #[test]
    fn direct_and_cg_solvers_agree() {
        let side = Arc::new(SideInfo::dense(array![
            [1.0, 0.0, 2.0],
            [0.0, 1.0, 1.0],
            [1.0, 1.0, 0.0],
            [2.0, 0.0, 1.0],
        ]));
        let ft_y = array![[1.0, -1.0], [0.5, 2.0], [0.0, 1.0]];

        let mut direct = MacauPrior::new(0, 2, side.clone(), 5.0, false, MacauSolver::Direct);
        direct.solve_beta(&ft_y).unwrap();

        let mut cg = MacauPrior::new(
            0,
            2,
            side,
            5.0,
            false,
            MacauSolver::Cg {
                tol: 1e-12,
                max_iter: 200,
            },
        );
        let warnings = cg.solve_beta(&ft_y).unwrap();
        assert!(warnings.is_empty());

        for i in 0..3 {
            for j in 0..2 {
                assert!((direct.beta()[[i, j]] - cg.beta()[[i, j]]).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn exhausted_cg_reports_a_warning() {
        let side = Arc::new(SideInfo::dense(Array2::from_shape_fn(
            (6, 4),
            |(i, j)| ((i * 7 + j * 3) % 5) as f64,
        )));
        let ft_y = Array2::from_elem((4, 1), 1.0);
        let mut prior = MacauPrior::new(
            0,
            1,
            side,
            0.01,
            false,
            MacauSolver::Cg {
                tol: 1e-16,
                max_iter: 1,
            },
        );
        let warnings = prior.solve_beta(&ft_y).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("did not") || warnings[0].contains("stopped"));
    }

    #[test]
    fn precision_sampling_reacts_to_link_scale() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut prior = MacauPrior::new(
            0,
            2,
            identity_side(3),
            1.0,
            true,
            MacauSolver::Direct,
        );
        // Large link coefficients push the sampled precision down.
        prior.beta = Array2::from_elem((3, 2), 50.0);
        prior.bt_b = prior.beta.t().dot(&prior.beta);
        prior.lambda = Array2::eye(2);
        let bp = prior.sample_precision(&mut rng);
        assert!(bp < 0.1, "bp {bp}");
    }
}
