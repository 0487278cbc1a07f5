//! Dataset adapters.
//!
//! Each adapter reads one geographic dataset from disk and produces the
//! same in-memory representation: sparse origin-destination flow counts,
//! dense distance and intervening-opportunity lookups, and per-unit
//! attribute rows. Everything downstream of this module is
//! dataset-agnostic.

mod matrix;
mod nested;
mod table;

use std::{collections::BTreeMap, fmt, path::Path, str::FromStr};

use anyhow::{bail, ensure, Result};

/// Identifier of a spatial unit (MSOA/MLAD suffix, county FIPS, street
/// number, ...). All supported datasets key their units by integers.
pub type UnitId = i64;

/// Nested origin -> destination -> value lookup. Sorted keys give a
/// deterministic origin-then-destination traversal order.
pub type PairTable = BTreeMap<UnitId, BTreeMap<UnitId, f64>>;

/// Per-unit attribute rows (fixed-length, order fixed by the adapter).
pub type AttrTable = BTreeMap<UnitId, Vec<f64>>;

/// A named source dataset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dataset {
    England,
    Us,
    Jingjinji,
    GdCommute,
    GdMobility,
}

impl Dataset {
    pub fn tag(&self) -> &'static str {
        match self {
            Dataset::England => "england",
            Dataset::Us => "US",
            Dataset::Jingjinji => "JJJ",
            Dataset::GdCommute => "gd_commute",
            Dataset::GdMobility => "gd_mobility",
        }
    }
}

impl FromStr for Dataset {
    type Err = anyhow::Error;

    fn from_str(tag: &str) -> Result<Self> {
        Ok(match tag {
            "england" => Dataset::England,
            "US" => Dataset::Us,
            "JJJ" => Dataset::Jingjinji,
            "gd_commute" => Dataset::GdCommute,
            "gd_mobility" => Dataset::GdMobility,
            _ => bail!("[dataset] unknown dataset: '{tag}'"),
        })
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Spatial aggregation level within a dataset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Level {
    Msoa,
    Mlad,
    County,
    Subdistrict,
}

impl Level {
    pub fn tag(&self) -> &'static str {
        match self {
            Level::Msoa => "msoa",
            Level::Mlad => "mlad",
            Level::County => "county",
            Level::Subdistrict => "subdistrict",
        }
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(tag: &str) -> Result<Self> {
        Ok(match tag {
            "msoa" => Level::Msoa,
            "mlad" => Level::Mlad,
            "county" => Level::County,
            "subdistrict" => Level::Subdistrict,
            _ => bail!("[dataset] unknown aggregation level: '{tag}'"),
        })
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Uniform in-memory representation produced by every adapter.
///
/// `flow` is sparse (nonzero, no self-flows); `dist` and the opportunity
/// tables must cover every pair present in `flow`. Datasets with a single
/// opportunity table leave `io_work` empty; mass selection then falls
/// back to the residence side.
#[derive(Debug, Clone)]
pub struct FlowData {
    pub flow: PairTable,
    pub dist: PairTable,
    pub io_res: PairTable,
    pub io_work: Option<PairTable>,
    pub attr: AttrTable,
}

/// Load `dataset` at `level` from the files under `data_dir`.
///
/// `modified_io` selects England's modified intervening-opportunity
/// tables (separate files at mlad level; at msoa level the standard
/// tables shifted by each origin's own population).
pub fn load(data_dir: &Path, dataset: Dataset, level: Level, modified_io: bool) -> Result<FlowData> {
    match dataset {
        Dataset::England => load_england(data_dir, level, modified_io),
        Dataset::Us => load_us(data_dir, level),
        Dataset::Jingjinji => load_jingjinji(data_dir, level),
        Dataset::GdCommute => load_gd_commute(data_dir, level),
        Dataset::GdMobility => load_gd_mobility(data_dir, level),
    }
}

fn load_england(data_dir: &Path, level: Level, modified_io: bool) -> Result<FlowData> {
    ensure!(
        matches!(level, Level::Msoa | Level::Mlad),
        "[dataset] england is not available at the '{level}' level"
    );
    let base = data_dir.join("England");
    let flow = nested::read_pair_table(&base.join(format!("England_{level}_census11_supp3.json")))?;
    let dist = nested::read_pair_table(&base.join(format!("England_{level}_dist.json")))?;

    let units: Vec<UnitId> = dist.keys().copied().collect();
    let attr = table::read_attr_table(
        &base.join(format!("England_{level}_census11_attr.csv")),
        "geoid",
        &["respop", "workpop"],
        &units,
    )?;

    let (io_res, io_work) = if modified_io && level == Level::Mlad {
        (
            nested::read_pair_table(&base.join(format!("England_{level}_miores.json")))?,
            nested::read_pair_table(&base.join(format!("England_{level}_miowork.json")))?,
        )
    } else {
        let mut io_res = nested::read_pair_table(&base.join(format!("England_{level}_iores.json")))?;
        let mut io_work = nested::read_pair_table(&base.join(format!("England_{level}_iowork.json")))?;
        if modified_io && level == Level::Msoa {
            // Shift each origin's opportunity values by its own resident
            // (resp. workplace) population.
            for (origin, row) in io_res.iter_mut() {
                let respop = attr_value(&attr, *origin, 0)?;
                row.values_mut().for_each(|v| *v += respop);
            }
            for (origin, row) in io_work.iter_mut() {
                let workpop = attr_value(&attr, *origin, 1)?;
                row.values_mut().for_each(|v| *v += workpop);
            }
        }
        (io_res, io_work)
    };

    Ok(FlowData { flow, dist, io_res, io_work: Some(io_work), attr })
}

fn load_us(data_dir: &Path, level: Level) -> Result<FlowData> {
    ensure!(level == Level::County, "[dataset] US is not available at the '{level}' level");
    let base = data_dir.join("US");
    let flow = nested::read_pair_table(&base.join(format!("us_acs15_{level}_flow.json")))?;
    let dist = nested::read_pair_table(&base.join(format!("us_{level}_dist.json")))?;
    let io_res = nested::read_pair_table(&base.join(format!("us_{level}_iores.json")))?;
    let io_work = nested::read_pair_table(&base.join(format!("us_{level}_iowork.json")))?;

    let units: Vec<UnitId> = dist.keys().copied().collect();
    let attr = table::read_attr_table(
        &base.join(format!("us_acs15_{level}_attr.csv")),
        "geoid",
        &["respop", "workpop"],
        &units,
    )?;

    Ok(FlowData { flow, dist, io_res, io_work: Some(io_work), attr })
}

fn load_jingjinji(data_dir: &Path, level: Level) -> Result<FlowData> {
    ensure!(level == Level::County, "[dataset] JJJ is not available at the '{level}' level");
    let base = data_dir.join("Jingjinji");
    let flow = nested::read_pair_table(&base.join(format!("JJJ_{level}_flow.json")))?;
    let dist = nested::read_pair_table(&base.join(format!("JJJ_{level}_dist.json")))?;
    let io_res = nested::read_pair_table(&base.join(format!("JJJ_{level}_io.json")))?;

    let units: Vec<UnitId> = dist.keys().copied().collect();
    let attr = table::read_attr_table(
        &base.join(format!("JJJ_{level}_attr.csv")),
        "geoid",
        &["pop_wan"],
        &units,
    )?;

    Ok(FlowData { flow, dist, io_res, io_work: None, attr })
}

fn load_gd_commute(data_dir: &Path, level: Level) -> Result<FlowData> {
    ensure!(
        matches!(level, Level::Subdistrict | Level::County),
        "[dataset] gd_commute is not available at the '{level}' level"
    );
    let base = data_dir.join("GD_data").join(format!("Commuting_{level}"));
    let ids = matrix::read_index_mapping(&base.join(format!("gd_commute_ids_mapping_inter{level}.json")))?;
    let dense = matrix::read_dense_matrix(&base.join(format!("gd_commute_flow_matrix_inter{level}.bin")))?;
    let flow = matrix::sparse_from_dense(&dense, &ids)?;
    let dist = table::read_pivot_table(
        &base.join(format!("gd_commute_dist_inter{level}.csv")),
        "geodesic_dist",
    )?;
    let io_res = table::read_pivot_table(
        &base.join(format!("gd_commute_opportunity_inter{level}_res.csv")),
        "opportunity",
    )?;
    let io_work = table::read_pivot_table(
        &base.join(format!("gd_commute_opportunity_inter{level}_work.csv")),
        "opportunity",
    )?;
    let attr = table::read_attr_table(
        &base.join(format!("gd_commute_attr_inter{level}.csv")),
        gd_id_column(level),
        &["home_pop", "work_pop"],
        &ids,
    )?;

    Ok(FlowData { flow, dist, io_res, io_work: Some(io_work), attr })
}

fn load_gd_mobility(data_dir: &Path, level: Level) -> Result<FlowData> {
    ensure!(
        matches!(level, Level::Subdistrict | Level::County),
        "[dataset] gd_mobility is not available at the '{level}' level"
    );
    let base = data_dir.join("GD_data").join(format!("Mobility_{level}"));
    let ids = matrix::read_index_mapping(&base.join(format!("gd_mobility_ids_mapping_inter{level}.json")))?;
    let dense = matrix::read_dense_matrix(&base.join(format!("gd_mobility_flow_matrix_inter{level}.bin")))?;
    let flow = matrix::sparse_from_dense(&dense, &ids)?;
    let dist = table::read_pivot_table(
        &base.join(format!("gd_mobility_dist_inter{level}.csv")),
        "geodesic_dist",
    )?;
    let io_res = table::read_pivot_table(
        &base.join(format!("gd_mobility_opportunity_inter{level}.csv")),
        "opportunity",
    )?;
    let attr = table::read_attr_table(
        &base.join(format!("gd_mobility_attr_inter{level}.csv")),
        gd_id_column(level),
        &["pop"],
        &ids,
    )?;

    Ok(FlowData { flow, dist, io_res, io_work: None, attr })
}

/// Unit-id column of the Guangdong attribute tables.
fn gd_id_column(level: Level) -> &'static str {
    match level {
        Level::Subdistrict => "street_num",
        _ => "county",
    }
}

fn attr_value(attr: &AttrTable, unit: UnitId, index: usize) -> Result<f64> {
    attr.get(&unit)
        .and_then(|row| row.get(index).copied())
        .ok_or_else(|| anyhow::anyhow!("[dataset] no attribute {index} for unit {unit}"))
}
