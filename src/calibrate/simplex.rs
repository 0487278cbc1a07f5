//! Nelder-Mead simplex minimization.
//!
//! Derivative-free local search over a handful of parameters. The
//! implementation follows the classic reflect/expand/contract/shrink
//! scheme with optional box clamping: every candidate point is clipped
//! into the box before evaluation, so the search never leaves it.

use std::cmp::Ordering;

/// Standard Nelder-Mead coefficients.
const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Initial simplex perturbation: 5% of each nonzero coordinate, a small
/// absolute step where the coordinate is zero.
const NONZERO_DELTA: f64 = 0.05;
const ZERO_DELTA: f64 = 0.00025;

pub(crate) struct SimplexOptions {
    /// Iteration cap; defaults to 200 per dimension.
    pub max_iter: Option<usize>,
    /// Convergence threshold on the simplex coordinate spread.
    pub x_tol: f64,
    /// Convergence threshold on the simplex value spread.
    pub f_tol: f64,
    /// Print a progress line every this many iterations (0 = silent).
    pub log_every: usize,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self { max_iter: None, x_tol: 1e-4, f_tol: 1e-4, log_every: 0 }
    }
}

pub(crate) struct MinimizeResult {
    pub x: Vec<f64>,
    pub fun: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimize `f` starting from `x0`, optionally clamped into `bounds`.
pub(crate) fn minimize<F>(
    mut f: F,
    x0: &[f64],
    bounds: Option<&[(f64, f64)]>,
    opts: &SimplexOptions,
) -> MinimizeResult
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x0.len();
    assert!(n > 0, "minimize: empty starting point");
    if let Some(bounds) = bounds {
        assert!(bounds.len() == n, "minimize: bounds length must match x0");
    }

    let clamp = |x: &mut [f64]| {
        if let Some(bounds) = bounds {
            for (xi, &(lo, hi)) in x.iter_mut().zip(bounds) {
                *xi = xi.clamp(lo, hi);
            }
        }
    };

    // Initial simplex: the starting point plus one perturbed vertex per
    // dimension.
    let mut start = x0.to_vec();
    clamp(&mut start);
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    let f_start = f(&start);
    simplex.push((start.clone(), f_start));
    for i in 0..n {
        let mut vertex = start.clone();
        if vertex[i] != 0.0 {
            vertex[i] *= 1.0 + NONZERO_DELTA;
        } else {
            vertex[i] = ZERO_DELTA;
        }
        clamp(&mut vertex);
        let value = f(&vertex);
        simplex.push((vertex, value));
    }

    let max_iter = opts.max_iter.unwrap_or(200 * n);
    let mut iterations = 0;
    let mut converged = false;

    loop {
        simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        // Spread of the simplex relative to its best vertex.
        let f_best = simplex[0].1;
        let mut x_spread = 0.0_f64;
        let mut f_spread = 0.0_f64;
        for (vertex, value) in &simplex[1..] {
            for (a, b) in vertex.iter().zip(&simplex[0].0) {
                x_spread = x_spread.max((a - b).abs());
            }
            f_spread = f_spread.max((value - f_best).abs());
        }
        if x_spread <= opts.x_tol && f_spread <= opts.f_tol {
            converged = true;
            break;
        }
        if iterations >= max_iter {
            break;
        }
        iterations += 1;

        // Centroid of all vertices except the worst.
        let worst = simplex[n].clone();
        let mut centroid = vec![0.0; n];
        for (vertex, _) in &simplex[..n] {
            for (c, v) in centroid.iter_mut().zip(vertex) {
                *c += v;
            }
        }
        centroid.iter_mut().for_each(|c| *c /= n as f64);

        // A point on the worst-through-centroid line, clamped into bounds.
        let point_along = |t: f64| -> Vec<f64> {
            let mut x: Vec<f64> = centroid
                .iter()
                .zip(&worst.0)
                .map(|(c, w)| c + t * (c - w))
                .collect();
            clamp(&mut x);
            x
        };

        let reflected = point_along(REFLECT);
        let f_reflected = f(&reflected);

        if f_reflected < simplex[0].1 {
            let expanded = point_along(EXPAND);
            let f_expanded = f(&expanded);
            simplex[n] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
        } else if f_reflected < simplex[n - 1].1 {
            simplex[n] = (reflected, f_reflected);
        } else {
            let contracted = if f_reflected < worst.1 {
                point_along(CONTRACT)
            } else {
                point_along(-CONTRACT)
            };
            let f_contracted = f(&contracted);
            if f_contracted < worst.1.min(f_reflected) {
                simplex[n] = (contracted, f_contracted);
            } else {
                // Shrink every vertex toward the best one.
                let best = simplex[0].0.clone();
                for (vertex, value) in simplex[1..].iter_mut() {
                    for (v, b) in vertex.iter_mut().zip(&best) {
                        *v = *b + SHRINK * (*v - *b);
                    }
                    clamp(vertex);
                    *value = f(vertex);
                }
            }
        }

        if opts.log_every > 0 && iterations % opts.log_every == 0 {
            println!(
                "Iter {}: best {:.6e} at {:?} | spread x {:.3e} f {:.3e}",
                iterations, simplex[0].1, simplex[0].0, x_spread, f_spread,
            );
        }
    }

    simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    let (x, fun) = simplex.swap_remove(0);
    MinimizeResult { x, fun, iterations, converged }
}
