//! Flattened design matrix for model fitting.
//!
//! The nested flow/distance/opportunity tables are flattened into
//! parallel columns, one row per origin-destination pair with observed
//! flow, stored CSR-style: each origin owns a contiguous block of rows
//! delimited by `offsets`, and `outflow` records the observed total
//! leaving each origin. The per-origin block structure is what the
//! normalizer rescales against.

use anyhow::{anyhow, ensure, Result};

use crate::dataset::{FlowData, UnitId};
use crate::model::Model;

/// Which attribute column (and opportunity table) acts as "mass".
///
/// `Workplace` uses the second attribute column and the work-based
/// opportunity table; datasets that carry only one of each fall back to
/// the residence side.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MassSelection {
    Residence,
    Workplace,
}

/// Flattened samples in origin-major order.
#[derive(Debug, Clone)]
pub struct SampleMatrix {
    origins: Vec<UnitId>,
    dests: Vec<UnitId>,
    distance: Vec<f64>,
    opportunity: Vec<f64>,
    dest_mass: Vec<f64>,
    origin_mass: Vec<f64>,
    observed: Vec<f64>,

    // Per-origin block partition.
    origin_ids: Vec<UnitId>,
    offsets: Vec<usize>,
    outflow: Vec<f64>,
}

impl SampleMatrix {
    /// Flatten `data` into parallel sample columns.
    ///
    /// Origins are visited in sorted order, destinations in sorted order
    /// within each origin; only pairs with recorded flow become rows.
    /// Origins present in the distance table but absent from the flow
    /// table are skipped. A flowed pair missing from the distance or
    /// opportunity table is a fatal error.
    pub fn build(data: &FlowData, mass: MassSelection) -> Result<Self> {
        let io = match (mass, &data.io_work) {
            (MassSelection::Workplace, Some(io_work)) => io_work,
            _ => &data.io_res,
        };
        let fid = match (mass, &data.io_work) {
            (MassSelection::Workplace, Some(_)) => 1,
            _ => 0,
        };

        let mut samples = Self {
            origins: Vec::new(),
            dests: Vec::new(),
            distance: Vec::new(),
            opportunity: Vec::new(),
            dest_mass: Vec::new(),
            origin_mass: Vec::new(),
            observed: Vec::new(),
            origin_ids: Vec::new(),
            offsets: vec![0],
            outflow: Vec::new(),
        };

        for (&origin, flows) in data.dist.keys().filter_map(|o| data.flow.get_key_value(o)) {
            if flows.is_empty() {
                continue;
            }
            let origin_attr = attr_feature(data, origin, fid)?;
            let mut total = 0.0;
            for (&dest, &volume) in flows {
                let distance = pair_value(&data.dist, origin, dest)
                    .ok_or_else(|| anyhow!("[sample] no distance recorded for pair {origin} -> {dest}"))?;
                let opportunity = pair_value(io, origin, dest)
                    .ok_or_else(|| anyhow!("[sample] no opportunity recorded for pair {origin} -> {dest}"))?;

                samples.origins.push(origin);
                samples.dests.push(dest);
                samples.distance.push(distance);
                samples.opportunity.push(opportunity);
                samples.dest_mass.push(attr_feature(data, dest, fid)?);
                samples.origin_mass.push(origin_attr);
                samples.observed.push(volume);
                total += volume;
            }
            samples.origin_ids.push(origin);
            samples.offsets.push(samples.origins.len());
            samples.outflow.push(total);
        }

        ensure!(!samples.is_empty(), "[sample] dataset produced no samples");
        Ok(samples)
    }

    /// Number of origin-destination samples.
    #[inline] pub fn len(&self) -> usize { self.observed.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.observed.is_empty() }

    /// Number of origins with at least one sample.
    #[inline] pub fn num_origins(&self) -> usize { self.origin_ids.len() }

    #[inline] pub fn origins(&self) -> &[UnitId] { &self.origins }

    #[inline] pub fn dests(&self) -> &[UnitId] { &self.dests }

    #[inline] pub fn distance(&self) -> &[f64] { &self.distance }

    #[inline] pub fn opportunity(&self) -> &[f64] { &self.opportunity }

    #[inline] pub fn dest_mass(&self) -> &[f64] { &self.dest_mass }

    #[inline] pub fn origin_mass(&self) -> &[f64] { &self.origin_mass }

    #[inline] pub fn observed(&self) -> &[f64] { &self.observed }

    /// Observed total outflow per origin, aligned with block order.
    #[inline] pub fn outflow(&self) -> &[f64] { &self.outflow }

    /// Rescale each origin's block of `weights` so it sums to that
    /// origin's observed outflow.
    pub fn normalize(&self, weights: &mut [f64]) -> Result<()> {
        ensure!(
            weights.len() == self.len(),
            "[sample] weights len ({}) != sample len ({})",
            weights.len(),
            self.len()
        );
        normalize_blocks(weights, &self.offsets, &self.outflow).map_err(|block| {
            anyhow!(
                "[sample] allocation weights for origin {} sum to zero",
                self.origin_ids[block]
            )
        })
    }

    /// Allocate with `model` and normalize: the full prediction step.
    pub fn predict(&self, model: Model, param: Option<f64>) -> Result<Vec<f64>> {
        let mut weights = model.allocate(
            &self.distance,
            &self.opportunity,
            &self.dest_mass,
            &self.origin_mass,
            param,
        )?;
        self.normalize(&mut weights)?;
        Ok(weights)
    }
}

/// Rescale each contiguous block of `weights` to sum to the matching
/// `target` total. On a zero block sum, returns the offending block
/// index as the error.
pub(crate) fn normalize_blocks(
    weights: &mut [f64],
    offsets: &[usize],
    targets: &[f64],
) -> std::result::Result<(), usize> {
    debug_assert_eq!(offsets.len(), targets.len() + 1);
    for (block, window) in offsets.windows(2).enumerate() {
        let slice = &mut weights[window[0]..window[1]];
        if slice.is_empty() {
            continue;
        }
        let sum: f64 = slice.iter().sum();
        if sum == 0.0 {
            return Err(block);
        }
        let scale = targets[block] / sum;
        slice.iter_mut().for_each(|w| *w *= scale);
    }
    Ok(())
}

fn attr_feature(data: &FlowData, unit: UnitId, fid: usize) -> Result<f64> {
    data.attr
        .get(&unit)
        .and_then(|row| row.get(fid).copied())
        .ok_or_else(|| anyhow!("[sample] no attribute {fid} for unit {unit}"))
}

fn pair_value(table: &crate::dataset::PairTable, origin: UnitId, dest: UnitId) -> Option<f64> {
    table.get(&origin)?.get(&dest).copied()
}
