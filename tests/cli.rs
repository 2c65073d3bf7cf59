use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CUTOFFS: &str = "COLLEGE NAME,PROGRAM NAME,UR,OBC,SC\n\
    CollegeA,ProgA,590,570,\n\
    CollegeB,ProgA,610,n/a,500\n\
    Miranda House,ProgA,595,575,520\n\
    CollegeC,ProgB,400,380,350\n";

fn workspace(require_login: bool) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        format!(
            "cutoff_file = \"du_cutoff.csv\"\n\
             users_file = \"users.csv\"\n\
             output_directory = \"output\"\n\
             require_login = {}\n\
             \n\
             [counsel]\n\
             enabled = false\n",
            require_login
        ),
    )
    .unwrap();
    dir
}

fn with_cutoffs(require_login: bool) -> TempDir {
    let dir = workspace(require_login);
    fs::write(dir.path().join("du_cutoff.csv"), CUTOFFS).unwrap();
    dir
}

fn app(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("college-preference").unwrap();
    cmd.current_dir(dir)
        .env_remove("GOOGLE_API_KEY")
        .env_remove("COLLEGE_PREFERENCE_LOG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "command failed: {:?}", output);
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn find_ranks_colleges_at_or_below_score() {
    let dir = with_cutoffs(false);
    let stdout = stdout_of(app(dir.path()).args([
        "find", "--program", "proga", "--category", "UR", "--score", "600",
    ]));

    assert!(stdout.contains("Eligible Colleges: 2"));
    let college_a = stdout.find("CollegeA").unwrap();
    let miranda = stdout.find("Miranda House").unwrap();
    assert!(college_a < miranda, "larger margin should rank first:\n{}", stdout);
    assert!(stdout.contains("10.0"));
    assert!(!stdout.contains("CollegeB"));
}

#[test]
fn no_match_shows_nearest_cutoffs_in_ascending_order() {
    let dir = with_cutoffs(false);
    let stdout = stdout_of(app(dir.path()).args([
        "find", "--program", "ProgA", "--category", "UR", "--score", "580",
    ]));

    assert!(stdout.contains("did not meet the cutoff"));
    let a = stdout.find("CollegeA (ProgA): 590.0").unwrap();
    let m = stdout.find("Miranda House (ProgA): 595.0").unwrap();
    let b = stdout.find("CollegeB (ProgA): 610.0").unwrap();
    assert!(a < m && m < b);
}

#[test]
fn missing_category_column_is_reported() {
    let dir = with_cutoffs(false);
    app(dir.path())
        .args(["find", "--program", "ProgA", "--category", "st", "--score", "900"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cutoff category 'ST' not available"));
}

#[test]
fn girls_only_restricts_results() {
    let dir = with_cutoffs(false);
    let stdout = stdout_of(app(dir.path()).args([
        "find", "--program", "ProgA", "--category", "UR", "--score", "700", "--girls-only",
    ]));

    assert!(stdout.contains("Girls' Colleges only"));
    assert!(stdout.contains("Miranda House"));
    assert!(!stdout.contains("CollegeA"));
    assert!(!stdout.contains("CollegeB"));
}

#[test]
fn missing_dataset_prompts_upload() {
    let dir = workspace(false);
    app(dir.path())
        .args(["find", "--program", "ProgA", "--category", "UR", "--score", "600"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Use the 'upload' command"));
}

#[test]
fn export_writes_reloadable_csv() {
    let dir = with_cutoffs(false);
    app(dir.path())
        .args(["find", "--program", "ProgA", "--category", "OBC", "--score", "600", "--export"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Preference list saved to"));

    let exported = fs::read_to_string(dir.path().join("output").join("Preferences_ProgA_OBC.csv")).unwrap();
    let mut lines = exported.lines();
    assert_eq!(lines.next(), Some("Rank,COLLEGE NAME,PROGRAM NAME,OBC,Marks Above Cutoff"));
    assert_eq!(lines.next(), Some("1,CollegeA,ProgA,570,30"));
    assert_eq!(lines.next(), Some("2,Miranda House,ProgA,575,25"));
    assert_eq!(lines.next(), None);
}

#[test]
fn negative_score_is_rejected() {
    let dir = with_cutoffs(false);
    app(dir.path())
        .args(["find", "--program", "ProgA", "--category", "UR", "--score=-5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("non-negative"));
}

#[test]
fn upload_replaces_table_and_normalizes_headers() {
    let dir = workspace(false);
    let upload = dir.path().join("new.csv");
    fs::write(&upload, " college name ,Program Name,ur\nX College,History,450\n").unwrap();

    app(dir.path())
        .args(["upload", upload.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 rows"));

    let saved = fs::read_to_string(dir.path().join("du_cutoff.csv")).unwrap();
    assert!(saved.starts_with("COLLEGE NAME,PROGRAM NAME,UR\n"));

    app(dir.path())
        .arg("programs")
        .assert()
        .success()
        .stdout(predicate::str::contains("1. History"));
}

#[test]
fn analytics_renders_both_charts() {
    let dir = with_cutoffs(false);
    let stdout = stdout_of(app(dir.path()).args(["analytics", "--program", "ProgA", "--category", "SC"]));

    assert!(stdout.contains("Top 10 Colleges by SC cutoff for ProgA"));
    assert!(stdout.contains("College-wise Average SC Cutoff"));
    assert!(stdout.contains("CollegeC"));
    assert!(!stdout.contains("CollegeA"));
}

#[test]
fn signup_then_login() {
    let dir = workspace(false);
    app(dir.path())
        .args(["signup", "-u", "asha", "-p", "pw1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Account created"));

    app(dir.path())
        .args(["signup", "-u", "asha", "-p", "pw2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("username already exists"));

    app(dir.path())
        .args(["login", "-u", "asha", "-p", "pw1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Welcome, asha"));

    app(dir.path())
        .args(["login", "-u", "asha", "-p", "wrong"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("incorrect password"));
}

#[test]
fn required_login_gates_queries() {
    let dir = with_cutoffs(true);
    app(dir.path())
        .args(["find", "--program", "ProgA", "--category", "UR", "--score", "600"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("login required"));

    app(dir.path()).args(["signup", "-u", "ravi", "-p", "pw"]).assert().success();

    app(dir.path())
        .args(["find", "--program", "ProgA", "--category", "UR", "--score", "600", "-u", "ravi", "-p", "pw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed in: ravi"))
        .stdout(predicate::str::contains("CollegeA"));
}

#[test]
fn first_run_writes_default_config() {
    let dir = tempfile::tempdir().unwrap();
    app(dir.path())
        .arg("programs")
        .assert()
        .success()
        .stdout(predicate::str::contains("Creating default configuration file"));

    let config = fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(config.contains("cutoff_file = \"du_cutoff.csv\""));
}
