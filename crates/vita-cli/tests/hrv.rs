use assert_cmd::cargo::cargo_bin_cmd;
use std::{error::Error, path::PathBuf};
use vita_lib::metrics::hrv::HrvSummary;

#[test]
fn hrv_summary_from_rr_file() -> Result<(), Box<dyn Error>> {
    let input = workspace_root().join("test_data/rr_intervals.txt");
    let mut cmd = cargo_bin_cmd!("vita");
    cmd.args(["hrv", "--input", input.to_str().expect("utf8 path")]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: HrvSummary = serde_json::from_slice(&output)?;

    assert_eq!(summary.n, 12);
    assert_close(summary.mean_rr, 810.583_333, 1e-3);
    assert_close(summary.rmssd, 18.884_818, 1e-3);
    assert_eq!(summary.pnn50, 0.0);
    Ok(())
}

#[test]
fn hrv_reads_stdin() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("vita");
    cmd.arg("hrv").write_stdin("800\n900\n800\n");
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: HrvSummary = serde_json::from_slice(&output)?;
    assert_eq!(summary.n, 3);
    assert_close(summary.rmssd, 100.0, 1e-9);
    assert_close(summary.pnn50, 1.0, 1e-9);
    Ok(())
}

#[test]
fn hrv_rejects_bad_input() {
    let mut cmd = cargo_bin_cmd!("vita");
    cmd.arg("hrv").write_stdin("800\n-5\n");
    cmd.assert().failure();
}

fn assert_close(a: f64, b: f64, tol: f64) {
    let diff = (a - b).abs();
    assert!(diff <= tol, "diff {diff} exceeded tol {tol} ({a} vs {b})");
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
