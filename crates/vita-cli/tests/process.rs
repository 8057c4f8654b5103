use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs, path::PathBuf};
use tempfile::tempdir;
use vita_lib::{FrameResult, ProcessorConfig, PENDING_PRESSURE};

#[test]
fn process_emits_one_line_per_frame() -> Result<(), Box<dyn Error>> {
    let input = workspace_root().join("test_data/ppg_frames.csv");
    let mut cmd = cargo_bin_cmd!("vita");
    cmd.args(["process", "--input", input.to_str().expect("utf8 path")]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output)?;
    let results: Vec<FrameResult> = text
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;

    assert_eq!(results.len(), 8);
    assert_eq!(results[1].timestamp_ms, 33);
    for result in &results {
        assert_eq!(result.bpm, 0);
        assert_eq!(result.blood_pressure, PENDING_PRESSURE);
        assert!(result.filtered_value.is_finite());
    }
    Ok(())
}

#[test]
fn simulated_session_summary() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let recording = temp.path().join("session.csv");
    cargo_bin_cmd!("vita")
        .args([
            "simulate",
            "--duration-s",
            "40",
            "--bpm",
            "66",
            "--out",
            recording.to_str().expect("utf8 path"),
        ])
        .assert()
        .success();
    assert!(fs::read_to_string(&recording)?.starts_with("timestamp_ms,value"));

    let mut cmd = cargo_bin_cmd!("vita");
    cmd.args([
        "process",
        "--summary",
        "--input",
        recording.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;

    assert_eq!(summary["frames"], 1200);
    assert_eq!(summary["learning"], false);
    assert_eq!(summary["rhythm"], "NORMAL");
    let bpm = summary["last"]["bpm"].as_i64().expect("bpm");
    assert!((bpm - 66).abs() <= 3, "bpm {bpm}");
    let spo2 = summary["last"]["spo2"].as_i64().expect("spo2");
    assert!((70..=100).contains(&spo2), "spo2 {spo2}");
    Ok(())
}

#[test]
fn process_reads_stdin_and_config() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("vita.toml");
    fs::write(&config_path, "min_window = 20\n\n[spo2]\nmin_samples = 10\n")?;

    let mut cmd = cargo_bin_cmd!("vita");
    cmd.args([
        "process",
        "--summary",
        "--config",
        config_path.to_str().expect("utf8 path"),
    ])
    .write_stdin("timestamp_ms,value\n0,150.0\n33,150.4\n67,\n");
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["frames"], 3);
    assert_eq!(summary["substituted_samples"], 1);
    assert_eq!(summary["last"]["rhythm"], "LEARNING");
    Ok(())
}

#[test]
fn invalid_config_is_reported() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("bad.toml");
    fs::write(&config_path, "min_window = 1\n")?;
    let input = workspace_root().join("test_data/ppg_frames.csv");
    cargo_bin_cmd!("vita")
        .args([
            "process",
            "--config",
            config_path.to_str().expect("utf8 path"),
            "--input",
            input.to_str().expect("utf8 path"),
        ])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn default_config_round_trips() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("vita");
    cmd.arg("default-config");
    let output = cmd.assert().success().get_output().stdout.clone();
    let parsed = ProcessorConfig::from_toml_str(&String::from_utf8(output)?)?;
    assert_eq!(parsed, ProcessorConfig::default());
    Ok(())
}

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .expect("crates dir")
        .parent()
        .expect("workspace root")
        .to_path_buf()
}
