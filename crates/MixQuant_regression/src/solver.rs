// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Bounded-variable least squares.
//!
//! Minimizes $\|y - X\beta\|^2$ subject to per-coefficient box
//! constraints with an active-set iteration: start from the unconstrained
//! SVD solution, clamp the worst bound violator, re-solve on the free
//! set, and release clamped variables whose gradient points back inside
//! the feasible box. The objective is a convex quadratic, so the
//! iteration terminates at the unique KKT point; the same path runs when
//! no bounds are present, in which case the seed is already stationary.

use nalgebra::{DMatrix, DVector};

use MixQuant_error::MixQuantError;

/// A per-coefficient box constraint: `(lower, upper)`, either side open.
pub type Bound = (Option<f64>, Option<f64>);

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The bounded least-squares solver.
#[derive(Clone, Debug)]
pub struct BoundedLeastSquares {
    /// Cap on active-set iterations before the solver gives up and
    /// returns its best effort.
    pub max_iterations: usize,

    /// Tolerance for bound violations and gradient stationarity.
    pub tolerance: f64,
}

/// Result of a bounded least-squares solve.
#[derive(Clone, Debug)]
pub struct BoundedSolution {
    /// The minimizer (best effort when not converged).
    pub coefficients: DVector<f64>,

    /// Whether the KKT conditions were met within the iteration cap.
    pub converged: bool,

    /// Active-set iterations used.
    pub iterations: usize,
}

/// Which bound a clamped variable sits on.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Clamp {
    Lower(f64),
    Upper(f64),
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl Default for BoundedLeastSquares {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-9,
        }
    }
}

/// Solves the unconstrained least-squares problem via SVD. Falls back to
/// the minimum-norm solution on rank-deficient designs.
///
/// # Errors
/// - `MixQuantError::RegressionError` if the SVD solve fails outright.
pub fn least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<DVector<f64>, MixQuantError> {
    let svd = x.clone().svd(true, true);
    svd.solve(y, f64::EPSILON.sqrt())
        .map_err(|e| MixQuantError::RegressionError(format!("SVD solve failed: {e}")))
}

impl BoundedLeastSquares {
    /// Solves `min ||y - X beta||^2` subject to the box constraints.
    ///
    /// # Errors
    /// - `MixQuantError::RegressionError` on shape mismatches, an empty
    ///   design, or an all-zero design.
    pub fn solve(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        bounds: &[Bound],
    ) -> Result<BoundedSolution, MixQuantError> {
        let n = x.nrows();
        let k = x.ncols();

        if y.len() != n {
            return Err(MixQuantError::RegressionError(format!(
                "y has {} rows, X has {n}",
                y.len()
            )));
        }
        if n == 0 || k == 0 {
            return Err(MixQuantError::RegressionError(
                "empty design matrix".to_string(),
            ));
        }
        if bounds.len() != k {
            return Err(MixQuantError::RegressionError(format!(
                "{} bounds for {k} coefficients",
                bounds.len()
            )));
        }
        if x.iter().all(|v| *v == 0.0) {
            return Err(MixQuantError::RegressionError(
                "design matrix has no variance".to_string(),
            ));
        }

        let mut clamps: Vec<Option<Clamp>> = vec![None; k];
        let mut beta = least_squares(x, y)?;
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;

            if let Some((index, clamp)) = self.worst_violation(&beta, bounds, &clamps) {
                clamps[index] = Some(clamp);
                beta = self.solve_free_subsystem(x, y, &clamps)?;
                continue;
            }

            match self.releasable_clamp(x, y, &beta, &clamps) {
                Some(index) => {
                    clamps[index] = None;
                    beta = self.solve_free_subsystem(x, y, &clamps)?;
                }
                None => {
                    converged = true;
                    break;
                }
            }
        }

        Ok(BoundedSolution {
            coefficients: beta,
            converged,
            iterations,
        })
    }

    /// Least squares over the free variables, holding clamped ones at
    /// their bounds.
    fn solve_free_subsystem(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        clamps: &[Option<Clamp>],
    ) -> Result<DVector<f64>, MixQuantError> {
        let k = x.ncols();
        let free: Vec<usize> = (0..k).filter(|j| clamps[*j].is_none()).collect();

        let mut beta = DVector::zeros(k);
        let mut y_adjusted = y.clone();

        for (j, clamp) in clamps.iter().enumerate() {
            if let Some(clamp) = clamp {
                let value = match clamp {
                    Clamp::Lower(v) | Clamp::Upper(v) => *v,
                };
                beta[j] = value;
                y_adjusted -= x.column(j) * value;
            }
        }

        if free.is_empty() {
            return Ok(beta);
        }

        let columns: Vec<DVector<f64>> = free.iter().map(|j| x.column(*j).into_owned()).collect();
        let x_free = DMatrix::from_columns(&columns);
        let beta_free = least_squares(&x_free, &y_adjusted)?;

        for (slot, j) in free.iter().enumerate() {
            beta[*j] = beta_free[slot];
        }

        Ok(beta)
    }

    /// The free variable violating its bound the most, with the clamp it
    /// should move to.
    fn worst_violation(
        &self,
        beta: &DVector<f64>,
        bounds: &[Bound],
        clamps: &[Option<Clamp>],
    ) -> Option<(usize, Clamp)> {
        let mut worst: Option<(usize, Clamp, f64)> = None;

        for (j, bound) in bounds.iter().enumerate() {
            if clamps[j].is_some() {
                continue;
            }

            let (lower, upper) = *bound;
            let mut candidate: Option<(Clamp, f64)> = None;
            if let Some(lo) = lower {
                if beta[j] < lo - self.tolerance {
                    candidate = Some((Clamp::Lower(lo), lo - beta[j]));
                }
            }
            if candidate.is_none() {
                if let Some(hi) = upper {
                    if beta[j] > hi + self.tolerance {
                        candidate = Some((Clamp::Upper(hi), beta[j] - hi));
                    }
                }
            }

            if let Some((clamp, distance)) = candidate {
                let is_worse = worst.map_or(true, |(_, _, d)| distance > d);
                if is_worse {
                    worst = Some((j, clamp, distance));
                }
            }
        }

        worst.map(|(j, clamp, _)| (j, clamp))
    }

    /// The clamped variable whose gradient points back into the feasible
    /// box the hardest, if any. Releasing it lowers the objective.
    fn releasable_clamp(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        beta: &DVector<f64>,
        clamps: &[Option<Clamp>],
    ) -> Option<usize> {
        let residual = x * beta - y;
        let gradient = x.transpose() * residual;

        let mut worst: Option<(usize, f64)> = None;
        for (j, clamp) in clamps.iter().enumerate() {
            let release = match clamp {
                // At the lower bound the objective falls when the
                // coefficient rises, i.e. when the gradient is negative.
                Some(Clamp::Lower(_)) if gradient[j] < -self.tolerance => -gradient[j],
                Some(Clamp::Upper(_)) if gradient[j] > self.tolerance => gradient[j],
                _ => continue,
            };
            let is_worse = worst.map_or(true, |(_, g)| release > g);
            if is_worse {
                worst = Some((j, release));
            }
        }

        worst.map(|(j, _)| j)
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_solver {
    use super::*;
    use MixQuant_utils::assert_approx_equal;

    fn design(rows: &[[f64; 2]]) -> DMatrix<f64> {
        DMatrix::from_fn(rows.len(), 2, |i, j| rows[i][j])
    }

    #[test]
    fn test_unbounded_matches_closed_form() {
        // y = 2x + 1 exactly.
        let x = design(&[[1.0, 1.0], [1.0, 2.0], [1.0, 3.0], [1.0, 4.0]]);
        let y = DVector::from_vec(vec![3.0, 5.0, 7.0, 9.0]);

        let solver = BoundedLeastSquares::default();
        let solution = solver.solve(&x, &y, &[(None, None), (None, None)]).unwrap();

        assert!(solution.converged);
        assert_approx_equal!(solution.coefficients[0], 1.0, 1e-6);
        assert_approx_equal!(solution.coefficients[1], 2.0, 1e-6);
    }

    #[test]
    fn test_active_upper_bound_is_exact() {
        // The unconstrained slope is 3; cap it at 2 and let the intercept
        // absorb the rest.
        let x = design(&[[1.0, 1.0], [1.0, 2.0], [1.0, 3.0], [1.0, 4.0]]);
        let y = DVector::from_vec(vec![3.0, 6.0, 9.0, 12.0]);

        let solver = BoundedLeastSquares::default();
        let solution = solver
            .solve(&x, &y, &[(None, None), (None, Some(2.0))])
            .unwrap();

        assert!(solution.converged);
        assert_approx_equal!(solution.coefficients[1], 2.0, 1e-12);
        // Intercept shifts to mean(y - 2x) = 2.5.
        assert_approx_equal!(solution.coefficients[0], 2.5, 1e-6);
    }

    #[test]
    fn test_inactive_bound_leaves_solution_untouched() {
        let x = design(&[[1.0, 1.0], [1.0, 2.0], [1.0, 3.0], [1.0, 4.0]]);
        let y = DVector::from_vec(vec![3.0, 5.0, 7.0, 9.0]);

        let solver = BoundedLeastSquares::default();
        let solution = solver
            .solve(&x, &y, &[(None, None), (Some(0.0), Some(10.0))])
            .unwrap();

        assert!(solution.converged);
        assert_approx_equal!(solution.coefficients[1], 2.0, 1e-6);
    }

    #[test]
    fn test_lower_bound_activates() {
        // The unconstrained slope is negative; force it non-negative.
        let x = design(&[[1.0, 1.0], [1.0, 2.0], [1.0, 3.0], [1.0, 4.0]]);
        let y = DVector::from_vec(vec![9.0, 7.0, 5.0, 3.0]);

        let solver = BoundedLeastSquares::default();
        let solution = solver
            .solve(&x, &y, &[(None, None), (Some(0.0), None)])
            .unwrap();

        assert!(solution.converged);
        assert_approx_equal!(solution.coefficients[1], 0.0, 1e-12);
        assert_approx_equal!(solution.coefficients[0], 6.0, 1e-6);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let x = design(&[[1.0, 1.0], [1.0, 2.0]]);
        let y = DVector::from_vec(vec![1.0]);
        let solver = BoundedLeastSquares::default();
        assert!(solver.solve(&x, &y, &[(None, None), (None, None)]).is_err());
    }

    #[test]
    fn test_zero_design_rejected() {
        let x = DMatrix::zeros(3, 2);
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let solver = BoundedLeastSquares::default();
        assert!(solver.solve(&x, &y, &[(None, None), (None, None)]).is_err());
    }
}
