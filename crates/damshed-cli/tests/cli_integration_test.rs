//! Integration tests for the damshed binary
//!
//! These tests run the real binary against a small workspace: a 5x5 grid that
//! drains south, one river reach across the middle row and one FHReD dam.

use damshed_core::models::{GridAlignment, GridWindow, Raster};
use damshed_geo::raster_io::write_raster;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn damshed(workspace: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_damshed"))
        .arg("--workspace")
        .arg(workspace)
        .args(args)
        .env_remove("DAMSHED_BATCH")
        .env_remove("DAMSHED_WORKSPACE")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute damshed")
}

fn json_data(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, stdout));
    assert_eq!(parsed["status"], "success");
    parsed["data"].clone()
}

fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let grid = GridAlignment::new(0.0, 5.0, 1.0).unwrap();
    let window = GridWindow::new(0, 0, 5, 5);

    write_raster(&root.join("grids/dir.json"), &Raster::filled(grid, window, 4.0)).unwrap();
    let acc: Vec<Option<f64>> = (0..25).map(|i| Some((i / 5 + 1) as f64)).collect();
    write_raster(&root.join("grids/acc.json"), &Raster::from_values(grid, window, acc).unwrap()).unwrap();

    fs::write(
        root.join("reaches.geojson"),
        r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"LineString","coordinates":[[0.5,2.5],[4.5,2.5]]},"properties":{"OBJECTID":7}}
        ]}"#,
    )
    .unwrap();
    fs::write(
        root.join("fhred.geojson"),
        r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"Point","coordinates":[2.3,2.4]},"properties":{"DAM_ID":1.0,"GOID":7,"UPLAND_SKM":100.0}},
            {"type":"Feature","geometry":{"type":"Point","coordinates":[0.5,0.5]},"properties":{"DAM_ID":2.0,"GOID":99}}
        ]}"#,
    )
    .unwrap();
    fs::write(
        root.join("scenarios.geojson"),
        r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"Polygon","coordinates":[[[0,0],[5,0],[5,5],[0,5],[0,0]]]},"properties":{"RC1":5.0}}
        ]}"#,
    )
    .unwrap();
    fs::write(
        root.join("damshed.toml"),
        r#"
batch = "_1"
flow_direction = "grids/dir.json"
flow_accumulation = "grids/acc.json"
reaches = "reaches.geojson"
fhred_dams = "fhred.geojson"
variables = ["RC1"]
merged_output = "merged"

[[variable_sources]]
path = "scenarios.geojson"
fields = ["RC1"]
"#,
    )
    .unwrap();

    dir
}

#[test]
fn test_config_show_json_is_valid() {
    let workspace = setup_workspace();
    let output = damshed(workspace.path(), &["config", "show", "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let data = json_data(&output);
    assert!(data["config_file"].as_str().unwrap().ends_with("damshed.toml"));
    let settings = data["settings"].as_array().unwrap();
    let batch = settings.iter().find(|s| s["key"] == "batch").unwrap();
    assert_eq!(batch["value"], "_1");
    assert_eq!(batch["source"], "File");
}

#[test]
fn test_dry_run_writes_nothing() {
    let workspace = setup_workspace();
    let output = damshed(workspace.path(), &["delineate-fhred-primary", "--dry-run", "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let data = json_data(&output);
    assert_eq!(data["dry_run"], true);
    assert_eq!(data["create"], 2);
    assert!(!workspace.path().join("fhred_catch_1").exists());
    assert!(!workspace.path().join("fhred_rivs_1").exists());
}

#[test]
fn test_pipeline_end_to_end() {
    let workspace = setup_workspace();
    let root = workspace.path();

    let output = damshed(root, &["delineate-fhred-primary", "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report = json_data(&output);
    assert_eq!(report["processed"], 1);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["failures"][0]["dam_id"], "2");
    assert!(root.join("fhred_catch_1/shed_1.json").is_file());
    assert!(root.join("fhred_rivs_1/rivs_1.json").is_file());

    // Second run skips the existing catchment
    let report = json_data(&damshed(root, &["delineate-fhred-primary", "--json"]));
    assert_eq!(report["processed"], 0);
    assert_eq!(report["skipped"], 1);

    let output = damshed(root, &["build-variable-rasters", "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(json_data(&output)["built"][0], "RC1");

    let output = damshed(root, &["aggregate-statistics", "--dataset", "fhred", "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report = json_data(&output);
    assert_eq!(report["processed"], 1);
    assert!(root.join("fhred_stats_1.jsonl").is_file());

    let output = damshed(root, &["merge-results", "--dataset", "fhred", "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let summary = json_data(&output);
    assert_eq!(summary["updated"], 1);
    assert_eq!(summary["untouched"], 1);

    let merged: Value =
        serde_json::from_str(&fs::read_to_string(root.join("merged/fhred_results_1.geojson")).unwrap()).unwrap();
    let features = merged["features"].as_array().unwrap();
    let dam = features.iter().find(|f| f["properties"]["DAM_ID"] == 1.0).unwrap();
    assert_eq!(dam["properties"]["RC1"], 5.0);
    assert!(dam["properties"]["area_calc"].as_f64().unwrap() > 0.0);
    let other = features.iter().find(|f| f["properties"]["DAM_ID"] == 2.0).unwrap();
    assert!(other["properties"].get("RC1").is_none());
}

#[test]
fn test_fallback_replaces_listed_dams() {
    let workspace = setup_workspace();
    let root = workspace.path();
    assert!(damshed(root, &["delineate-fhred-primary"]).status.success());

    let output = damshed(root, &["delineate-fhred-fallback", "--dam", "1.0", "--dam", "404", "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report = json_data(&output);
    assert_eq!(report["processed"], 1);
    assert_eq!(report["unmatched"][0], "404");
}

fn merged_area(root: &Path) -> f64 {
    let output = damshed(root, &["merge-results", "--dataset", "fhred", "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let merged: Value =
        serde_json::from_str(&fs::read_to_string(root.join("merged/fhred_results_1.geojson")).unwrap()).unwrap();
    let features = merged["features"].as_array().unwrap();
    let dam = features.iter().find(|f| f["properties"]["DAM_ID"] == 1.0).unwrap();
    dam["properties"]["area_calc"].as_f64().unwrap()
}

#[test]
fn test_fallback_statistics_are_recomputed_on_resume() {
    let workspace = setup_workspace();
    let root = workspace.path();
    assert!(damshed(root, &["delineate-fhred-primary"]).status.success());
    assert!(damshed(root, &["build-variable-rasters"]).status.success());
    assert!(damshed(root, &["aggregate-statistics", "--dataset", "fhred"]).status.success());
    let primary_area = merged_area(root);

    // Every reach cell ties for the most upstream, so the catchment widens
    let output = damshed(root, &["delineate-fhred-fallback", "--dam", "1"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let output = damshed(root, &["aggregate-statistics", "--dataset", "fhred", "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report = json_data(&output);
    assert_eq!(report["processed"], 1);
    assert_eq!(report["skipped"], 0);

    assert!(merged_area(root) > primary_area);
}

#[test]
fn test_missing_configuration_fails_with_hint() {
    let dir = TempDir::new().unwrap();
    let output = damshed(dir.path(), &["delineate-grand"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("flow_direction"), "stderr: {}", stderr);
    assert!(stderr.contains("damshed config show"));
}
