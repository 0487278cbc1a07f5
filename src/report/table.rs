//! Per-sample prediction table output.

use std::{fs::File, path::Path};

use anyhow::{ensure, Context, Result};
use polars::{frame::DataFrame, io::SerWriter, prelude::{CsvWriter, NamedFrom}, series::Series};

use crate::model::Model;
use crate::sample::SampleMatrix;

/// Write the benchmark report CSV: one row per sample carrying its
/// predictors and observed flow, plus one column of predicted flow per
/// evaluated model, row-aligned with the samples.
pub(crate) fn write_bench_report(
    path: &Path,
    samples: &SampleMatrix,
    predictions: &[(Model, Vec<f64>)],
) -> Result<()> {
    let mut columns = vec![
        Series::new("ori".into(), samples.origins().to_vec()).into(),
        Series::new("dest".into(), samples.dests().to_vec()).into(),
        Series::new("dist".into(), samples.distance().to_vec()).into(),
        Series::new("io".into(), samples.opportunity().to_vec()).into(),
        Series::new("dpop".into(), samples.dest_mass().to_vec()).into(),
        Series::new("opop".into(), samples.origin_mass().to_vec()).into(),
        Series::new("vol".into(), samples.observed().to_vec()).into(),
    ];
    for (model, predicted) in predictions {
        ensure!(
            predicted.len() == samples.len(),
            "[report::table] {} prediction rows ({}) != sample rows ({})",
            model.tag(),
            predicted.len(),
            samples.len()
        );
        columns.push(Series::new(model.tag().into(), predicted.clone()).into());
    }

    let mut df = DataFrame::new(columns)?;
    let file = File::create(path)
        .with_context(|| format!("[report::table] Failed to create {}", path.display()))?;
    CsvWriter::new(file)
        .finish(&mut df)
        .with_context(|| format!("[report::table] Failed to write CSV to {:?}", path))
}
