//! Tabular (CSV) readers for attribute and long-form pivot tables.

use std::{fs::File, path::Path};

use ahash::AHashMap;
use anyhow::{anyhow, ensure, Context, Result};
use polars::{frame::DataFrame, io::SerReader, prelude::{CsvReader, DataType}};

use super::{AttrTable, PairTable, UnitId};

/// Reads a CSV file from `path` into a Polars DataFrame.
pub(crate) fn read_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("[dataset::table] Failed to open CSV file: {}", path.display()))?;
    CsvReader::new(file)
        .finish()
        .with_context(|| format!("[dataset::table] Failed to read CSV from {:?}", path))
}

/// Read the attribute rows for `units` from a CSV table.
///
/// `id_col` names the unit-identifier column and `select` the feature
/// columns, in the order they should appear in each attribute row.
/// A requested feature absent from the table, or a unit absent from the
/// id column, is a fatal error.
pub(crate) fn read_attr_table(
    path: &Path,
    id_col: &str,
    select: &[&str],
    units: &[UnitId],
) -> Result<AttrTable> {
    let df = read_csv(path)?;

    let columns = df.get_column_names();
    let missing: Vec<&str> = select
        .iter()
        .copied()
        .filter(|feat| !columns.iter().any(|c| c.as_str() == *feat))
        .collect();
    ensure!(
        missing.is_empty(),
        "[dataset::table] features {missing:?} not found in {}",
        path.display()
    );

    // Unit id -> row index lookup.
    let ids = df.column(id_col)?.cast(&DataType::Int64)?;
    let index: AHashMap<UnitId, usize> = ids
        .i64()?
        .into_no_null_iter()
        .enumerate()
        .map(|(row, id)| (id, row))
        .collect();

    let mut features: Vec<Vec<f64>> = Vec::with_capacity(select.len());
    for feat in select {
        let col = df.column(feat)?.cast(&DataType::Float64)?;
        features.push(col.f64()?.into_no_null_iter().collect());
    }

    let mut attr = AttrTable::new();
    for &unit in units {
        let row = *index.get(&unit).ok_or_else(|| {
            anyhow!("[dataset::table] unit {unit} not found in {}", path.display())
        })?;
        attr.insert(unit, features.iter().map(|col| col[row]).collect());
    }
    Ok(attr)
}

/// Read a long-form `o_id, d_id, <value>` CSV into a nested pair table.
pub(crate) fn read_pivot_table(path: &Path, value_col: &str) -> Result<PairTable> {
    let df = read_csv(path)?;

    let origins = df.column("o_id")?.cast(&DataType::Int64)?;
    let dests = df.column("d_id")?.cast(&DataType::Int64)?;
    let values = df.column(value_col)?.cast(&DataType::Float64)?;

    let mut table = PairTable::new();
    for ((o, d), v) in origins
        .i64()?
        .into_no_null_iter()
        .zip(dests.i64()?.into_no_null_iter())
        .zip(values.f64()?.into_no_null_iter())
    {
        table.entry(o).or_default().insert(d, v);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tempfile(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn attr_table_selects_named_features() {
        let file = write_tempfile(
            "geoid,respop,employedpop,workpop\n101,500,320,410\n102,800,510,690\n",
        );

        let attr = read_attr_table(file.path(), "geoid", &["respop", "workpop"], &[101, 102]).unwrap();
        assert_eq!(attr[&101], vec![500.0, 410.0]);
        assert_eq!(attr[&102], vec![800.0, 690.0]);
    }

    #[test]
    fn missing_feature_is_an_error() {
        let file = write_tempfile("geoid,respop\n101,500\n");

        let err = read_attr_table(file.path(), "geoid", &["respop", "workpop"], &[101])
            .unwrap_err()
            .to_string();
        assert!(err.contains("workpop"), "error should name the missing feature: {err}");
    }

    #[test]
    fn missing_unit_is_an_error() {
        let file = write_tempfile("geoid,respop\n101,500\n");
        assert!(read_attr_table(file.path(), "geoid", &["respop"], &[101, 999]).is_err());
    }

    #[test]
    fn pivot_table_nests_by_origin() {
        let file = write_tempfile(
            "o_id,d_id,geodesic_dist\n1,2,10.5\n1,3,22.0\n2,1,10.5\n",
        );

        let table = read_pivot_table(file.path(), "geodesic_dist").unwrap();
        assert_eq!(table[&1][&2], 10.5);
        assert_eq!(table[&1][&3], 22.0);
        assert_eq!(table[&2][&1], 10.5);
    }
}
