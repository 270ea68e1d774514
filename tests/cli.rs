// assert_cmd spawns the compiled binary; assert_fs builds hermetic fixtures.
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::process::Command;

mod util;

fn twv() -> Command {
    Command::cargo_bin("twv").expect("bin")
}

#[test]
fn process_writes_one_hierarchy_per_paper() {
    let tmp = util::two_revision_fixture();

    twv()
        .current_dir(tmp.path())
        .args(["--quiet", "process", "-i", "data_raw", "-o", "data_output", "-j", "2"])
        .assert()
        .success();

    let out = tmp.child("data_output/2401.00001/hierarchy.json");
    out.assert(predicate::path::is_file());

    let text = std::fs::read_to_string(out.path()).expect("read hierarchy");
    let json: Value = serde_json::from_str(&text).expect("valid json");
    let hierarchy = json["hierarchy"].as_object().expect("hierarchy object");
    assert!(hierarchy.contains_key("1"));
    assert!(hierarchy.contains_key("2"));
}

#[test]
fn process_dry_run_lists_without_writing() {
    let tmp = util::two_revision_fixture();

    twv()
        .current_dir(tmp.path())
        .args(["--dry-run", "process", "-i", "data_raw", "-o", "data_output"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2401.00001"))
        .stdout(predicate::str::contains("main.tex"));

    tmp.child("data_output").assert(predicate::path::missing());
}

#[test]
fn process_reads_locations_from_config_file() {
    let tmp = util::single_revision_fixture();
    tmp.child("texweave.toml")
        .write_str("[pipeline]\ndata_raw = \"data_raw\"\ndata_output = \"built\"\noutput_file = \"tree.json\"\n")
        .expect("write config");

    twv()
        .current_dir(tmp.path())
        .args(["--quiet", "process"])
        .assert()
        .success();

    tmp.child("built/2401.00001/tree.json")
        .assert(predicate::path::is_file());
}

#[test]
fn root_prints_the_chosen_file_and_explains() {
    let tmp = util::two_revision_fixture();
    let dir = tmp.child("data_raw/2401.00001/tex/v2");

    twv()
        .current_dir(tmp.path())
        .args(["--no-color", "root", "--explain"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("main.tex"))
        .stdout(predicate::str::contains("response.tex"))
        .stdout(predicate::str::contains("root"));
}

#[test]
fn root_fails_without_tex_files() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    tmp.child("notes.txt").write_str("hello").expect("write");

    twv()
        .current_dir(tmp.path())
        .args(["root", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No root .tex file found"));
}

#[test]
fn flatten_inlines_includes_and_strips_bibliography() {
    let tmp = util::single_revision_fixture();
    let dir = tmp.child("data_raw/2401.00001/tex/v1");

    twv()
        .current_dir(tmp.path())
        .arg("flatten")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("% <BEGIN_FILE: sections/intro.tex>"))
        .stdout(predicate::str::contains("Graphs are everywhere."))
        .stdout(predicate::str::contains("\\bibliography{refs}").not());

    twv()
        .current_dir(tmp.path())
        .args(["flatten", "--keep-bibliography", "--json"])
        .arg(dir.child("main.tex").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"merged_files\""))
        .stdout(predicate::str::contains("bibliography{refs}"));
}

#[test]
fn tree_prints_json_nodes() {
    let tmp = util::single_revision_fixture();
    let dir = tmp.child("data_raw/2401.00001/tex/v1");

    let output = twv()
        .current_dir(tmp.path())
        .args(["tree", "--json", "--paper-id", "2401.00001"])
        .arg(dir.path())
        .output()
        .expect("run tree");
    assert!(output.status.success());

    let json: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(json["type"], "document");
    assert!(json["id"].as_str().unwrap().starts_with("2401.00001-v1-document-"));
    assert!(!json["children"].as_array().unwrap().is_empty());
}

#[test]
fn tree_renders_html_and_cleaned_latex() {
    let tmp = util::single_revision_fixture();
    let dir = tmp.child("data_raw/2401.00001/tex/v1");

    twv()
        .current_dir(tmp.path())
        .args(["tree", "--html", "--paper-id", "2401.00001"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("<title>2401.00001 - v1</title>"))
        .stdout(predicate::str::contains("<h2>Introduction</h2>"))
        .stdout(predicate::str::contains("<p>Graphs are everywhere.</p>"));

    twv()
        .current_dir(tmp.path())
        .args(["tree", "--cleaned"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\\section{Introduction}"))
        .stdout(predicate::str::contains("BEGIN_FILE").not());
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    twv().current_dir(tmp.path()).args(["--quiet", "init"]).assert().success();
    tmp.child("texweave.toml").assert(predicate::path::is_file());

    twv()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    twv().current_dir(tmp.path()).args(["--quiet", "init", "--force"]).assert().success();
}

#[test]
fn completions_print_to_stdout() {
    twv()
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("twv"));
}
