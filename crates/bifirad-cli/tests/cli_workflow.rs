use bifirad_core::modules::results::{RayValue, ResultTable};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const TMY3: &str = "724666,\"DENVER\",CO,-7.0,39.74,-105.18,1829\n\
Date (MM/DD/YYYY),Time (HH:MM),GHI (W/m^2),DNI (W/m^2),DHI (W/m^2),Alb (unitless)\n\
06/21/1990,01:00,0,0,0,0.2\n\
06/21/1990,12:00,950,850,110,0.2\n\
06/21/1990,13:00,930,840,115,0.2\n\
06/22/1990,12:00,900,800,120,0.2\n";

fn run_bifirad(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bifirad"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
        .expect("bifirad should start")
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent directory should be created");
    }
    fs::write(path, content).expect("file should be written");
}

fn write_config(dir: &Path, tracking: bool) {
    write_file(&dir.join("site.csv"), TMY3);
    let tracking = if tracking { r#""tracking": {"limit_angle": 45.0},"# } else { "" };
    write_file(
        &dir.join("config.json"),
        &format!(
            r#"{{
                "name": "demo",
                "weather": {{"file": "site.csv"}},
                "ground": "litesoil",
                "module": {{"x": 1.0, "y": 2.0}},
                "scene": {{"tilt": 25.0, "hub_height": 1.5, "pitch": 5.0, "nMods": 3, "nRows": 2}},
                {tracking}
                "sky": {{"mode": "cumulative"}}
            }}"#
        ),
    );
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn tracker_command_writes_the_tracker_dictionary() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(temp.path(), true);

    let output = run_bifirad(&["tracker", "--workdir", "work"], temp.path());
    assert!(output.status.success(), "tracker should succeed, stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("TRACKER completed for 'config'"));

    let text = fs::read_to_string(temp.path().join("work/trackerdict.json"))
        .expect("tracker dictionary should be written");
    let parsed: Value = serde_json::from_str(&text).expect("tracker dictionary should be JSON");
    assert_eq!(parsed["cumulativesky"], Value::Bool(true));
    assert!(!parsed["entries"].as_array().expect("entries are a list").is_empty());
}

#[test]
fn scene_command_writes_module_and_scene_files() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_config(temp.path(), false);

    let output = run_bifirad(&["scene"], temp.path());
    assert!(output.status.success(), "scene should succeed, stderr: {}", stderr(&output));
    assert!(temp.path().join("objects/demo.rad").is_file());
    assert!(temp.path().join("module.json").is_file());
    assert!(temp.path().join("materials/ground.rad").is_file());

    let scenes: Vec<String> = fs::read_dir(temp.path().join("objects"))
        .expect("objects should be listed")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("demo_C_"))
        .collect();
    assert_eq!(scenes.len(), 1, "one scene file expected, found {scenes:?}");
}

#[test]
fn materials_command_lists_builtin_grounds() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_bifirad(&["materials"], temp.path());
    assert!(output.status.success(), "materials should succeed, stderr: {}", stderr(&output));
    assert!(stdout(&output).lines().any(|line| line.starts_with("litesoil\t")));
}

#[test]
fn performance_command_reports_json_statistics() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_file(
        &temp.path().join("series.csv"),
        "time,model,meas\n1,90,100\n2,190,200\n3,300,300\n",
    );
    let output = run_bifirad(
        &["performance", "--file", "series.csv", "--modeled", "model", "--measured", "meas", "--json"],
        temp.path(),
    );
    assert!(output.status.success(), "performance should succeed, stderr: {}", stderr(&output));
    let parsed: Value = serde_json::from_str(&stdout(&output)).expect("stdout should be JSON");
    assert_eq!(parsed["count"], Value::from(2));
    assert_eq!(parsed["MBD_abs"], Value::from(-5.0));
}

fn ray(wm2: f64, mattype: &str) -> RayValue {
    RayValue {
        x: 0.0,
        y: 0.0,
        z: 1.0,
        r: wm2,
        g: wm2,
        b: wm2,
        mattype: mattype.to_string(),
        wm2,
    }
}

#[test]
fn mismatch_command_summarises_results_files() {
    let temp = TempDir::new().expect("tempdir should be created");
    let front = vec![ray(800.0, "a0.PVmodule.6457"); 12];
    let back = vec![ray(80.0, "a0.PVmodule.2310"); 12];
    ResultTable::from_scans(&front, Some(&back))
        .write(&temp.path().join("results/irr_noon.csv"))
        .expect("results should be written");

    let output = run_bifirad(&["mismatch", "--bifi", "0.7"], temp.path());
    assert!(output.status.success(), "mismatch should succeed, stderr: {}", stderr(&output));
    let text = fs::read_to_string(temp.path().join("mismatch.csv")).expect("mismatch csv should exist");
    let mut lines = text.lines();
    assert!(lines.next().is_some_and(|header| header.starts_with("file,Mismatch_rel,")));
    assert!(lines.next().is_some_and(|row| row.starts_with("irr_noon.csv,0.0,0.0,")));
}

#[test]
fn invalid_inputs_map_to_input_exit_code() {
    let temp = TempDir::new().expect("tempdir should be created");

    let output = run_bifirad(&["mismatch", "--orientation", "diagonal"], temp.path());
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ERROR: [INPUT.MISMATCH_ORIENTATION]"));
    assert!(stderr(&output).contains("FATAL EXIT CODE: 2"));

    let output = run_bifirad(&["compile"], temp.path());
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("[INPUT.CLI_INPUT_MISSING]"));

    let output = run_bifirad(&["render"], temp.path());
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("[INPUT.CLI_USAGE]"));
}
