//! Dense flow-matrix loading and sparse conversion.
//!
//! The Guangdong datasets store flows as a dense origin x destination
//! matrix in a small magic-tagged little-endian binary format, with a
//! separate index -> unit-id mapping. Both are converted here into the
//! sparse nested form the rest of the pipeline consumes.

use std::{collections::BTreeMap, fs::File, io::{BufReader, Read}, path::Path};

use anyhow::{ensure, Context, Result};
use ndarray::Array2;

use super::{PairTable, UnitId};

/// Read a dense row-major f64 matrix from a `FMTX` binary file.
pub(crate) fn read_dense_matrix(path: &Path) -> Result<Array2<f64>> {
    let file = File::open(path)
        .with_context(|| format!("[dataset::matrix] Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    // Header
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)
        .context("[dataset::matrix] Failed to read magic bytes")?;
    ensure!(&magic == b"FMTX", "[dataset::matrix] Invalid matrix magic: expected 'FMTX'");

    let mut b8 = [0u8; 8];
    reader.read_exact(&mut b8)
        .context("[dataset::matrix] Failed to read row count")?;
    let rows = u64::from_le_bytes(b8) as usize;

    reader.read_exact(&mut b8)
        .context("[dataset::matrix] Failed to read column count")?;
    let cols = u64::from_le_bytes(b8) as usize;

    // Values (row-major)
    let mut data = vec![0f64; rows * cols];
    for x in &mut data {
        reader.read_exact(&mut b8)
            .context("[dataset::matrix] Failed to read matrix values")?;
        *x = f64::from_le_bytes(b8);
    }

    Array2::from_shape_vec((rows, cols), data)
        .context("[dataset::matrix] Matrix shape mismatch")
}

/// Read the JSON matrix-index -> unit-id mapping as a dense vector.
pub(crate) fn read_index_mapping(path: &Path) -> Result<Vec<UnitId>> {
    let file = File::open(path)
        .with_context(|| format!("[dataset::matrix] Failed to open {}", path.display()))?;
    let mapping: BTreeMap<usize, UnitId> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("[dataset::matrix] Failed to parse id mapping from {}", path.display()))?;

    for (expect, &index) in mapping.keys().enumerate() {
        ensure!(
            index == expect,
            "[dataset::matrix] id mapping is not contiguous: missing index {expect}"
        );
    }
    Ok(mapping.into_values().collect())
}

/// Convert a dense flow matrix to the sparse nested form.
///
/// Zero entries and self-flows are dropped; origins whose entire row is
/// zero are left out of the table.
pub(crate) fn sparse_from_dense(matrix: &Array2<f64>, ids: &[UnitId]) -> Result<PairTable> {
    ensure!(
        matrix.nrows() == ids.len() && matrix.ncols() == ids.len(),
        "[dataset::matrix] matrix is {}x{} but the id mapping has {} entries",
        matrix.nrows(),
        matrix.ncols(),
        ids.len()
    );

    let mut flow = PairTable::new();
    for (i, row) in matrix.rows().into_iter().enumerate() {
        if row.sum() == 0.0 {
            continue;
        }
        let entries: BTreeMap<UnitId, f64> = row
            .iter()
            .enumerate()
            .filter(|&(j, &v)| j != i && v != 0.0)
            .map(|(j, &v)| (ids[j], v))
            .collect();
        flow.insert(ids[i], entries);
    }
    Ok(flow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;

    fn encode_matrix(rows: usize, cols: usize, values: &[f64]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"FMTX");
        bytes.extend_from_slice(&(rows as u64).to_le_bytes());
        bytes.extend_from_slice(&(cols as u64).to_le_bytes());
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn dense_matrix_round_trips_through_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&encode_matrix(2, 3, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();

        let matrix = read_dense_matrix(file.path()).unwrap();
        assert_eq!(matrix, array![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]]);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"NOPE").unwrap();
        assert!(read_dense_matrix(file.path()).is_err());
    }

    #[test]
    fn index_mapping_must_be_contiguous() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"0": 11, "2": 13}}"#).unwrap();
        assert!(read_index_mapping(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"0": 11, "1": 12, "2": 13}}"#).unwrap();
        assert_eq!(read_index_mapping(file.path()).unwrap(), vec![11, 12, 13]);
    }

    #[test]
    fn sparse_conversion_drops_zeros_and_self_flows() {
        let matrix = array![
            [5.0, 2.0, 0.0],  // self-flow 5.0 dropped, zero dropped
            [0.0, 0.0, 0.0],  // all-zero origin dropped entirely
            [4.0, 1.0, 0.0],
        ];
        let flow = sparse_from_dense(&matrix, &[11, 12, 13]).unwrap();

        assert_eq!(flow.len(), 2);
        assert_eq!(flow[&11], BTreeMap::from([(12, 2.0)]));
        assert!(!flow.contains_key(&12));
        assert_eq!(flow[&13], BTreeMap::from([(11, 4.0), (12, 1.0)]));
    }

    #[test]
    fn mismatched_id_mapping_is_an_error() {
        let matrix = array![[0.0, 1.0], [1.0, 0.0]];
        assert!(sparse_from_dense(&matrix, &[11]).is_err());
    }
}
