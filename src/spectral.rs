//! Spectral SIS threshold on temporal networks.
//!
//! The linearised SIS dynamics over one period of a snapshot sequence are
//! propagated by
//!
//! ```text
//! T = expm((ηA_K − ρI)Δt_K) ⋯ expm((ηA_1 − ρI)Δt_1)
//! ```
//!
//! and the epidemic grows iff the leading eigenvalue of `T` exceeds 1.
//! Everything here is a pure function of its inputs.

use ndarray::{Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::network::SparseAdjacencyMatrices;

/// Solver settings for the leading-eigenvalue iteration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EigenOptions {
    pub maxiter: usize,
    /// Relative change of the leading Ritz value that counts as converged.
    pub tol: f64,
}

impl Default for EigenOptions {
    fn default() -> Self {
        Self {
            maxiter: 10_000,
            tol: 1e-9,
        }
    }
}

impl EigenOptions {
    pub fn validate(&self) -> Result<()> {
        if self.maxiter == 0 || !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "maxiter={} must be positive and tol={} finite and positive",
                self.maxiter, self.tol
            )));
        }
        Ok(())
    }
}

/// Eigenvalue as `(real, imaginary)`.
pub type Eigenvalue = (f64, f64);

const TAYLOR_MAX_TERMS: usize = 30;
const SCALED_NORM: f64 = 0.5;
const MAX_EXPANSIONS: usize = 100;
const MAX_GOLDEN_STEPS: usize = 200;
const SEARCH_TOL: f64 = 1e-10;

/// Matrix exponential by scaling and squaring with a Taylor core.
pub fn expm(a: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let norm = one_norm(a);
    let squarings = if norm > SCALED_NORM {
        (norm / SCALED_NORM).log2().ceil() as i32
    } else {
        0
    };
    let scaled = a / 2f64.powi(squarings);

    let mut result = Array2::<f64>::eye(n);
    let mut term = Array2::<f64>::eye(n);
    for k in 1..=TAYLOR_MAX_TERMS {
        term = term.dot(&scaled) / k as f64;
        result += &term;
        if one_norm(&term) <= f64::EPSILON * one_norm(&result) {
            break;
        }
    }
    for _ in 0..squarings {
        result = result.dot(&result);
    }
    result
}

/// Maximum absolute column sum.
fn one_norm(a: &Array2<f64>) -> f64 {
    a.axis_iter(Axis(1))
        .map(|column| column.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// The (up to) two eigenvalues of largest real part, largest first.
///
/// Subspace iteration on a two-dimensional block with Rayleigh–Ritz
/// extraction; a complex pair shows up as conjugate Ritz values.
pub fn leading_eigenvalues(matrix: &Array2<f64>, options: &EigenOptions) -> Result<Vec<Eigenvalue>> {
    options.validate()?;
    let n = matrix.nrows();
    if n == 0 || matrix.ncols() != n {
        return Err(Error::InvalidConfig(format!(
            "expected a non-empty square matrix, got {:?}",
            matrix.shape()
        )));
    }
    if matrix.iter().any(|x| !x.is_finite()) {
        return Err(Error::NumericalInstability {
            iterations: 0,
            detail: "matrix has non-finite entries".to_string(),
        });
    }
    if n == 1 {
        return Ok(vec![(matrix[[0, 0]], 0.0)]);
    }

    let mut block = Array2::<f64>::zeros((n, 2));
    let center = (n as f64 - 1.0) / 2.0;
    for i in 0..n {
        block[[i, 0]] = 1.0;
        block[[i, 1]] = i as f64 - center;
    }
    let mut q = orthonormalize(block);

    let mut previous = f64::NAN;
    for iteration in 1..=options.maxiter {
        let z = matrix.dot(&q);
        let h = q.t().dot(&z);
        let ritz = eigenvalues_2x2(&h);
        let mu = ritz[0].0;
        trace!(iteration, mu, "subspace iteration");

        if !mu.is_finite() {
            return Err(Error::NumericalInstability {
                iterations: iteration,
                detail: format!("Ritz value diverged to {mu}"),
            });
        }
        if (mu - previous).abs() <= options.tol * mu.abs().max(1.0) {
            debug!(iterations = iteration, mu, "leading eigenvalues converged");
            return Ok(ritz.to_vec());
        }
        previous = mu;
        q = orthonormalize(z);
    }

    Err(Error::NumericalInstability {
        iterations: options.maxiter,
        detail: format!("leading eigenvalue did not converge to tol={}", options.tol),
    })
}

/// Modified Gram–Schmidt on the columns of `block`. A column that collapses
/// is replaced by the first unit vector independent of the previous ones.
fn orthonormalize(mut block: Array2<f64>) -> Array2<f64> {
    let (n, k) = block.dim();
    for j in 0..k {
        let mut norm = project_out(&mut block, j);
        if norm <= 1e-300 {
            for unit in 0..n {
                block.column_mut(j).fill(0.0);
                block[[unit, j]] = 1.0;
                norm = project_out(&mut block, j);
                if norm >= 0.5 {
                    break;
                }
            }
        }
        block.column_mut(j).mapv_inplace(|x| x / norm);
    }
    block
}

/// Remove the components of column `j` along columns `0..j`; returns the
/// remaining norm.
fn project_out(block: &mut Array2<f64>, j: usize) -> f64 {
    for p in 0..j {
        let dot = block.column(p).dot(&block.column(j));
        let previous = block.column(p).to_owned();
        block.column_mut(j).scaled_add(-dot, &previous);
    }
    block.column(j).dot(&block.column(j)).sqrt()
}

/// Eigenvalues of a 2×2 matrix, larger real part first.
fn eigenvalues_2x2(h: &Array2<f64>) -> [Eigenvalue; 2] {
    let (a, b, c, d) = (h[[0, 0]], h[[0, 1]], h[[1, 0]], h[[1, 1]]);
    let half_trace = (a + d) / 2.0;
    let discriminant = ((a - d) / 2.0).powi(2) + b * c;
    if discriminant >= 0.0 {
        let root = discriminant.sqrt();
        [(half_trace + root, 0.0), (half_trace - root, 0.0)]
    } else {
        let root = (-discriminant).sqrt();
        [(half_trace, root), (half_trace, -root)]
    }
}

/// Leading real part `μ_max` of the one-period propagator of linearised SIS.
///
/// # Arguments
/// * `sequence` - Adjacency matrices with their snapshot times
/// * `infection_rate` - η
/// * `recovery_rate` - ρ
/// * `options` - Eigen-solver settings
pub fn sis_max_eigenvalue(
    sequence: &SparseAdjacencyMatrices,
    infection_rate: f64,
    recovery_rate: f64,
    options: &EigenOptions,
) -> Result<f64> {
    if !(infection_rate.is_finite() && recovery_rate.is_finite()) {
        return Err(Error::InvalidConfig(format!(
            "rates must be finite, got eta={infection_rate} rho={recovery_rate}"
        )));
    }
    let n = sequence.n;
    if n == 0 {
        return Err(Error::InvalidConfig("adjacency sequence has no nodes".to_string()));
    }

    let identity = Array2::<f64>::eye(n);
    let factors: Vec<Array2<f64>> = sequence
        .adjacency_matrices
        .par_iter()
        .enumerate()
        .map(|(i, adjacency)| {
            let dt = sequence.interval(i);
            let generator = (adjacency.to_dense() * infection_rate - &identity * recovery_rate) * dt;
            expm(&generator)
        })
        .collect();

    let propagator = factors
        .iter()
        .fold(identity.clone(), |product, factor| factor.dot(&product));

    let eigenvalues = leading_eigenvalues(&propagator, options)?;
    let mu_max = eigenvalues
        .iter()
        .map(|&(re, _)| re)
        .fold(f64::NEG_INFINITY, f64::max);
    trace!(infection_rate, recovery_rate, mu_max, "sis max eigenvalue");
    Ok(mu_max)
}

/// Infection rate at which `μ_max = 1`, and `μ_max` there.
pub fn sis_critical_infection_rate(
    sequence: &SparseAdjacencyMatrices,
    recovery_rate: f64,
    options: &EigenOptions,
) -> Result<(f64, f64)> {
    let (eta, _) = minimize_scalar(
        |eta| {
            let mu = sis_max_eigenvalue(sequence, eta, recovery_rate, options)?;
            Ok((1.0 - mu).powi(2))
        },
        1.0,
    )?;
    let mu = sis_max_eigenvalue(sequence, eta, recovery_rate, options)?;
    debug!(recovery_rate, critical_infection_rate = eta, mu, "critical infection rate");
    Ok((eta, mu))
}

/// Recovery rate at which `μ_max = 1`, and `μ_max` there.
pub fn sis_critical_recovery_rate(
    sequence: &SparseAdjacencyMatrices,
    infection_rate: f64,
    options: &EigenOptions,
) -> Result<(f64, f64)> {
    let (rho, _) = minimize_scalar(
        |rho| {
            let mu = sis_max_eigenvalue(sequence, infection_rate, rho, options)?;
            Ok((1.0 - mu).powi(2))
        },
        1.0,
    )?;
    let mu = sis_max_eigenvalue(sequence, infection_rate, rho, options)?;
    debug!(infection_rate, critical_recovery_rate = rho, mu, "critical recovery rate");
    Ok((rho, mu))
}

/// Derivative-free minimisation of `f` over `x >= 0`, starting at `x0`:
/// downhill bracketing followed by golden-section search.
pub fn minimize_scalar<F>(mut f: F, x0: f64) -> Result<(f64, f64)>
where
    F: FnMut(f64) -> Result<f64>,
{
    let (lo, hi) = bracket_minimum(&mut f, x0.max(0.0), 1.0)?;

    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    let (mut lo, mut hi) = (lo, hi);
    let mut x1 = hi - inv_phi * (hi - lo);
    let mut x2 = lo + inv_phi * (hi - lo);
    let mut f1 = f(x1)?;
    let mut f2 = f(x2)?;

    for _ in 0..MAX_GOLDEN_STEPS {
        if hi - lo <= SEARCH_TOL * (x1.abs() + x2.abs()).max(1e-12) {
            break;
        }
        if f1 < f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - inv_phi * (hi - lo);
            f1 = f(x1)?;
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + inv_phi * (hi - lo);
            f2 = f(x2)?;
        }
    }

    Ok(if f1 < f2 { (x1, f1) } else { (x2, f2) })
}

/// Interval `[lo, hi]` within `x >= 0` that contains a local minimum.
fn bracket_minimum<F>(f: &mut F, x0: f64, step: f64) -> Result<(f64, f64)>
where
    F: FnMut(f64) -> Result<f64>,
{
    const GROWTH: f64 = 1.618_033_988_749_895;

    let (mut a, mut fa) = (x0, f(x0)?);
    let (mut b, mut fb) = (x0 + step, f(x0 + step)?);
    if fb > fa {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }

    for _ in 0..MAX_EXPANSIONS {
        let c = (b + GROWTH * (b - a)).max(0.0);
        let fc = f(c)?;
        if fc >= fb {
            return Ok((a.min(c), a.max(c)));
        }
        if c == 0.0 {
            // still descending at the boundary
            return Ok((0.0, b));
        }
        a = b;
        b = c;
        fb = fc;
    }

    Err(Error::NumericalInstability {
        iterations: MAX_EXPANSIONS,
        detail: "could not bracket a minimum".to_string(),
    })
}
