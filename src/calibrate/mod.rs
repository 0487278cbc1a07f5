//! Parameter calibration against observed flows.
//!
//! Parametric models are fit by minimizing the mean squared error of
//! their normalized predictions with a derivative-free simplex search;
//! parameter-free models skip calibration entirely.

mod simplex;

use anyhow::Result;

use crate::eval;
use crate::model::Model;
use crate::sample::SampleMatrix;

use simplex::SimplexOptions;

/// Outcome of calibrating one parametric model.
#[derive(Copy, Clone, Debug)]
pub struct Calibration {
    /// Best-fit parameter value.
    pub param: f64,
    /// Minimized mean squared error.
    pub objective: f64,
    /// Simplex iterations spent.
    pub iterations: usize,
    /// Whether the simplex met its tolerance before the iteration cap.
    pub converged: bool,
}

/// Calibrate `model` against `samples`.
///
/// Returns `None` for parameter-free models. `log_every` > 0 prints an
/// optimizer progress line at that interval.
pub fn calibrate(
    model: Model,
    samples: &SampleMatrix,
    log_every: usize,
) -> Result<Option<Calibration>> {
    if !model.needs_param() {
        return Ok(None);
    }

    let (init, bound) = model.initial_guess();
    let bounds = bound.map(|b| vec![b]);
    let opts = SimplexOptions { log_every, ..SimplexOptions::default() };

    let result = simplex::minimize(
        |p| trial_objective(model, samples, p[0]),
        &[init],
        bounds.as_deref(),
        &opts,
    );

    Ok(Some(Calibration {
        param: result.x[0],
        objective: result.fun,
        iterations: result.iterations,
        converged: result.converged,
    }))
}

/// Normalized-prediction MSE for one trial parameter.
///
/// Degenerate trials (zero-sum origin block, overflowing powers) map to
/// infinity so the search backs away instead of aborting the run.
fn trial_objective(model: Model, samples: &SampleMatrix, param: f64) -> f64 {
    let mut weights = match model.allocate(
        samples.distance(),
        samples.opportunity(),
        samples.dest_mass(),
        samples.origin_mass(),
        Some(param),
    ) {
        Ok(weights) => weights,
        Err(_) => return f64::INFINITY,
    };
    if samples.normalize(&mut weights).is_err() {
        return f64::INFINITY;
    }
    let mse = eval::mean_squared_error(samples.observed(), &weights);
    if mse.is_finite() { mse } else { f64::INFINITY }
}
