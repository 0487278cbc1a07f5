//! End-to-end pipeline tests over a tiny on-disk dataset.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use flowbench::commands::bench::{run_bench, BenchConfig};
use flowbench::commands::synth::{run_synth, SynthConfig};
use flowbench::{Dataset, Level, MassSelection, Model, NoiseKind, SynthOptions};

type Nested = BTreeMap<i64, BTreeMap<i64, f64>>;

const UNITS: [i64; 4] = [11, 12, 13, 14];

/// Write a four-county Jingjinji-shaped dataset under `data_dir`.
fn write_test_dataset(data_dir: &Path) {
    let base = data_dir.join("Jingjinji");
    fs::create_dir_all(&base).unwrap();

    let mut flow = Nested::new();
    flow.insert(11, BTreeMap::from([(12, 50.0), (13, 20.0)]));
    flow.insert(12, BTreeMap::from([(11, 30.0), (14, 10.0)]));
    flow.insert(13, BTreeMap::from([(11, 15.0)]));
    flow.insert(14, BTreeMap::from([(12, 12.0), (13, 8.0)]));

    // Dense distance and opportunity tables over all ordered pairs.
    let mut dist = Nested::new();
    let mut io = Nested::new();
    for (i, &o) in UNITS.iter().enumerate() {
        let mut drow = BTreeMap::new();
        let mut iorow = BTreeMap::new();
        for (j, &d) in UNITS.iter().enumerate() {
            if i == j {
                continue;
            }
            drow.insert(d, 5.0 * (i as f64 - j as f64).abs());
            iorow.insert(d, 40.0 * ((i + j) % 3) as f64);
        }
        dist.insert(o, drow);
        io.insert(o, iorow);
    }

    let write = |name: &str, table: &Nested| {
        let file = fs::File::create(base.join(name)).unwrap();
        serde_json::to_writer(file, table).unwrap();
    };
    write("JJJ_county_flow.json", &flow);
    write("JJJ_county_dist.json", &dist);
    write("JJJ_county_io.json", &io);

    fs::write(
        base.join("JJJ_county_attr.csv"),
        "geoid,area_km2,pop_wan,gdp_yi\n\
         11,120.5,300,41.0\n\
         12,90.0,250,38.5\n\
         13,210.3,120,12.2\n\
         14,55.1,90,9.9\n",
    )
    .unwrap();
}

#[test]
fn bench_pipeline_writes_report_and_plots() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let out_dir = dir.path().join("out");
    write_test_dataset(&data_dir);

    let config = BenchConfig {
        dataset: Dataset::Jingjinji,
        level: Level::County,
        models: vec![Model::GravityZipf, Model::GravityPower, Model::Radiation],
        mass: MassSelection::Workplace, // falls back to residence: JJJ has one table
        modified_io: false,
        data_dir,
        out_dir: out_dir.clone(),
    };
    run_bench(&config, 0).unwrap();

    let report = fs::read_to_string(out_dir.join("bench_JJJ_county.csv")).unwrap();
    let mut lines = report.lines();
    assert_eq!(
        lines.next().unwrap(),
        "ori,dest,dist,io,dpop,opop,vol,GM_Zipf,GM_Pow,RM"
    );
    assert_eq!(lines.count(), 7); // one row per observed flow

    for tag in ["GM_Zipf", "GM_Pow", "RM"] {
        let plot = out_dir.join(format!("bench_JJJ_county_{tag}.svg"));
        assert!(plot.exists(), "missing plot {}", plot.display());
    }
}

#[test]
fn bench_predictions_conserve_outflow() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let out_dir = dir.path().join("out");
    write_test_dataset(&data_dir);

    let config = BenchConfig {
        dataset: Dataset::Jingjinji,
        level: Level::County,
        models: vec![Model::Radiation],
        mass: MassSelection::Residence,
        modified_io: false,
        data_dir,
        out_dir: out_dir.clone(),
    };
    run_bench(&config, 0).unwrap();

    // Parse the report and re-aggregate predictions per origin.
    let report = fs::read_to_string(out_dir.join("bench_JJJ_county.csv")).unwrap();
    let mut observed_totals: BTreeMap<i64, f64> = BTreeMap::new();
    let mut predicted_totals: BTreeMap<i64, f64> = BTreeMap::new();
    for line in report.lines().skip(1) {
        let fields: Vec<&str> = line.split(',').collect();
        let origin: i64 = fields[0].parse().unwrap();
        *observed_totals.entry(origin).or_insert(0.0) += fields[6].parse::<f64>().unwrap();
        *predicted_totals.entry(origin).or_insert(0.0) += fields[7].parse::<f64>().unwrap();
    }
    for (origin, observed) in &observed_totals {
        let predicted = predicted_totals[origin];
        assert!(
            (predicted - observed).abs() < 1e-9 * observed.max(1.0),
            "origin {origin}: predicted total {predicted} != observed {observed}"
        );
    }
}

#[test]
fn synth_pipeline_writes_flow_table_metadata_and_plot() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let out_dir = dir.path().join("out");
    write_test_dataset(&data_dir);

    let config = SynthConfig {
        dataset: Dataset::Jingjinji,
        level: Level::County,
        model: Model::Radiation,
        param: None,
        options: SynthOptions {
            seed: 1231,
            noise: NoiseKind::LogAdditive,
            sigma: 0.1,
            threshold: 1,
            mass: MassSelection::Residence,
        },
        data_dir,
        out_dir: out_dir.clone(),
    };
    run_synth(&config, 0).unwrap();

    let stem = "JJJ_county_RM_logadd0.1_supp1_1231";
    let flow: BTreeMap<i64, BTreeMap<i64, i64>> =
        serde_json::from_str(&fs::read_to_string(out_dir.join(format!("{stem}.json"))).unwrap())
            .unwrap();
    assert_eq!(flow.len(), UNITS.len());
    for (origin, row) in &flow {
        for (dest, volume) in row {
            assert_ne!(origin, dest);
            assert!(*volume >= 1, "flow {origin}->{dest} below threshold");
        }
    }

    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join(format!("{stem}.meta.json"))).unwrap())
            .unwrap();
    assert_eq!(meta["seed"], 1231);
    assert_eq!(meta["model"], "RM");
    assert_eq!(meta["noisetype"], "logadd");
    assert!(meta["cpc"].as_f64().unwrap() > 0.0);
    assert!(meta["flownum"].as_u64().unwrap() > 0);

    assert!(out_dir.join(format!("{stem}.svg")).exists());
}

#[test]
fn unknown_dataset_and_model_tags_fail_fast() {
    assert!("mars".parse::<Dataset>().is_err());
    assert!("GM_Quux".parse::<Model>().is_err());
    assert!("tract".parse::<Level>().is_err());
}
