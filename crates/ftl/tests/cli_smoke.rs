//! Command-line smoke tests that don't need a running container engine:
//! chart discovery/scaffolding, the unknown-command suggestion, and registry
//! persistence under an isolated `FTL_HOME`.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn ftl_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ftl").unwrap();
    cmd.env("FTL_HOME", home.path());
    cmd
}

fn write_minimal_chart(root: &std::path::Path, prefix: &str) {
    fs::write(root.join("ftl.yaml"), format!("prefix: {prefix}\n")).unwrap();
    let app_dir = root.join("app");
    fs::create_dir_all(&app_dir).unwrap();
    fs::write(app_dir.join("Dockerfile"), "FROM alpine:latest\nCMD [\"sleep\", \"infinity\"]\n").unwrap();
}

/// `AppContext::load` pings the engine eagerly, so any command besides
/// `doctor` needs a reachable engine even just to read the chart.
fn is_docker_available() -> bool {
    std::process::Command::new("docker")
        .arg("info")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[test]
fn unrecognized_command_suggests_closest_match() {
    let home = TempDir::new().unwrap();
    let mut cmd = ftl_cmd(&home);
    cmd.arg("buld");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized command 'buld'"))
        .stderr(predicate::str::contains("did you mean 'build'"));
}

#[test]
fn help_exits_successfully() {
    let home = TempDir::new().unwrap();
    let mut cmd = ftl_cmd(&home);
    cmd.arg("--help");

    cmd.assert().success().stdout(predicate::str::contains("orchestrator"));
}

#[test]
fn create_project_scaffolds_manifest_and_sample_container() {
    let workdir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    let mut cmd = ftl_cmd(&home);
    cmd.current_dir(&workdir).args(["create", "project", "demo"]);
    cmd.assert().success().stdout(predicate::str::contains("created chart 'demo'"));

    let project = workdir.path().join("demo");
    assert!(project.join("ftl.yaml").is_file());
    assert!(project.join("app/Dockerfile").is_file());

    let manifest = fs::read_to_string(project.join("ftl.yaml")).unwrap();
    assert!(manifest.contains("prefix: demo"));
}

#[test]
fn create_project_refuses_to_overwrite_existing_directory() {
    let workdir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    fs::create_dir(workdir.path().join("demo")).unwrap();

    let mut cmd = ftl_cmd(&home);
    cmd.current_dir(&workdir).args(["create", "project", "demo"]);
    cmd.assert().failure().stderr(predicate::str::contains("already exists"));
}

#[test]
fn chart_add_then_list_round_trips_through_registry() {
    let chart_dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    write_minimal_chart(chart_dir.path(), "demo");

    let mut add = ftl_cmd(&home);
    add.args(["chart", "add"]).arg(chart_dir.path());
    add.assert().success();

    let mut list = ftl_cmd(&home);
    list.args(["chart", "list"]);
    list.assert().success().stdout(predicate::str::contains(
        chart_dir.path().canonicalize().unwrap().display().to_string(),
    ));
}

#[test]
fn build_fails_fast_with_no_chart_in_scope() {
    let workdir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();

    let mut cmd = ftl_cmd(&home);
    cmd.current_dir(&workdir).arg("build");
    cmd.assert().failure().stderr(predicate::str::contains("ftl.yaml"));
}

#[test]
fn hosts_prints_nothing_for_a_chart_with_no_domainname() {
    if !is_docker_available() {
        eprintln!("Skipping hosts_prints_nothing_for_a_chart_with_no_domainname: Docker not available");
        return;
    }
    let chart_dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    write_minimal_chart(chart_dir.path(), "demo");

    let mut cmd = ftl_cmd(&home);
    cmd.args(["--chart"]).arg(chart_dir.path()).arg("hosts");
    cmd.assert().success().stdout(predicate::str::contains("no domainname"));
}

#[test]
fn profile_show_lists_every_container_with_default_options() {
    if !is_docker_available() {
        eprintln!("Skipping profile_show_lists_every_container_with_default_options: Docker not available");
        return;
    }
    let chart_dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    write_minimal_chart(chart_dir.path(), "demo");

    let mut cmd = ftl_cmd(&home);
    cmd.args(["--chart"]).arg(chart_dir.path()).args(["profile", "show"]);
    cmd.assert().success().stdout(predicate::str::contains("app"));
}

#[test]
fn mount_then_mounts_shows_the_enabled_devmode() {
    if !is_docker_available() {
        eprintln!("Skipping mount_then_mounts_shows_the_enabled_devmode: Docker not available");
        return;
    }
    let chart_dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    write_minimal_chart(chart_dir.path(), "demo");
    fs::write(
        chart_dir.path().join("app/ftl.yaml"),
        "devmodes:\n  src:\n    /src:\n      source: .\n      mode: rw\n",
    )
    .unwrap();

    let mut mount = ftl_cmd(&home);
    mount.args(["--chart"]).arg(chart_dir.path()).args(["mount", "app", "src"]);
    mount.assert().success();

    let mut mounts = ftl_cmd(&home);
    mounts.args(["--chart"]).arg(chart_dir.path()).args(["mounts", "app"]);
    mounts.assert().success().stdout(predicate::str::contains("* src"));
}
