//! Runs the `optiform` binary offline (`--mock`) against temp files.

use std::path::Path;
use std::process::Command;

fn run_optiform(config_home: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_optiform"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("LOG_FILE")
        .env_remove("OPTIFORM_MODEL")
        .output()
        .expect("failed to run optiform binary")
}

#[test]
fn help_lists_subcommands() {
    let home = tempfile::tempdir().unwrap();
    let out = run_optiform(home.path(), &["--help"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("solve"));
    assert!(stdout.contains("batch"));
    assert!(stdout.contains("summary"));
}

#[test]
fn mock_solve_matches_offline_answer() {
    let home = tempfile::tempdir().unwrap();
    let out = run_optiform(
        home.path(),
        &["--mock", "solve", "-m", "maximize 3x + 2y", "--answer", "0", "--json"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["solved"], true);
    assert_eq!(v["stop_reason"], "answer_matched");
    assert_eq!(v["iterations"], 1);
}

#[test]
fn search_section_in_config_file_sets_budget() {
    let home = tempfile::tempdir().unwrap();
    let app = home.path().join("optiform");
    std::fs::create_dir_all(&app).unwrap();
    std::fs::write(app.join("config.toml"), "[search]\nmax_iterations = 2\n").unwrap();

    let out = run_optiform(home.path(), &["--mock", "solve", "-m", "minimize cost", "--json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["stop_reason"], "budget_exhausted");
    assert_eq!(v["iterations"], 2);

    let out = run_optiform(
        home.path(),
        &["--mock", "--iterations", "3", "solve", "-m", "minimize cost", "--json"],
    );
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["iterations"], 3);
}

#[test]
fn mock_batch_writes_results_and_resumes() {
    let home = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let dataset = work.path().join("toy.jsonl");
    let output = work.path().join("results.jsonl");
    std::fs::write(
        &dataset,
        "{\"question\": \"a\", \"answer\": 0}\n{\"question\": \"b\", \"answer\": 5}\n",
    )
    .unwrap();
    let args = [
        "--mock",
        "--iterations",
        "2",
        "batch",
        "--dataset",
        dataset.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
        "--jobs",
        "2",
    ];

    let out = run_optiform(home.path(), &args);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("toy"));
    assert!(stdout.contains("TOTAL"));
    let lines = std::fs::read_to_string(&output).unwrap();
    assert_eq!(lines.lines().count(), 2);

    let out = run_optiform(home.path(), &args);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("already completed"));
    assert_eq!(std::fs::read_to_string(&output).unwrap().lines().count(), 2);

    let out = run_optiform(home.path(), &["summary", "--output", output.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains(" 50.0%"));
}

#[test]
fn solve_without_problem_fails() {
    let home = tempfile::tempdir().unwrap();
    let out = run_optiform(home.path(), &["--mock", "solve"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("provide a problem"));
}

#[test]
fn batch_only_runs_named_dataset() {
    let home = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let dataset = work.path().join("mixed.jsonl");
    let output = work.path().join("results.jsonl");
    std::fs::write(
        &dataset,
        concat!(
            "{\"question\": \"a\", \"answer\": 0, \"dataset\": \"nl4opt\"}\n",
            "{\"question\": \"b\", \"answer\": 0, \"dataset\": \"mamo\"}\n",
            "{\"question\": \"c\", \"answer\": 3, \"dataset\": \"nl4opt\"}\n",
        ),
    )
    .unwrap();
    let out = run_optiform(
        home.path(),
        &[
            "--mock",
            "--iterations",
            "1",
            "batch",
            "--dataset",
            dataset.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--only",
            "mamo",
        ],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let lines = std::fs::read_to_string(&output).unwrap();
    assert_eq!(lines.lines().count(), 1);
    let record: serde_json::Value = serde_json::from_str(lines.trim()).unwrap();
    assert_eq!(record["dataset"], "mamo");
}

#[test]
fn malformed_config_file_is_reported() {
    let home = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let app = home.path().join("optiform");
    std::fs::create_dir_all(&app).unwrap();
    std::fs::write(app.join("config.toml"), "[env\nOPENAI_API_KEY = \n").unwrap();

    let output = work.path().join("results.jsonl");
    let out = run_optiform(home.path(), &["summary", "--output", output.to_str().unwrap()]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stderr).contains("configuration not loaded"));
}
