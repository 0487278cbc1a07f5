//! Serialized nested-mapping readers.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};

use super::PairTable;

/// Reads an origin -> destination -> value mapping from a JSON file.
///
/// Keys are unit identifiers serialized as JSON object keys; values are
/// numeric. Missing files and malformed entries are fatal.
pub(crate) fn read_pair_table(path: &Path) -> Result<PairTable> {
    let file = File::open(path)
        .with_context(|| format!("[dataset::nested] Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .with_context(|| format!("[dataset::nested] Failed to parse pair table from {}", path.display()))
}
