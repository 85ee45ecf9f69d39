//! JSONL problem sets and the append-only results file.
//!
//! A dataset line is `{"question": ..., "answer": ...}` with optional `id` and
//! `dataset`; the answer may be a number or a numeric string. A result line is
//! one [`ResultRecord`].

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::CliError;

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<Value>,
    question: String,
    #[serde(default)]
    answer: Option<Value>,
    #[serde(default)]
    dataset: Option<String>,
}

/// One problem to solve.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub id: String,
    pub dataset: String,
    pub question: String,
    pub answer: Option<f64>,
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads every non-blank line of `path`. Lines without an `id` get
/// `<dataset>-<line>`; `dataset` defaults to the file stem.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>, CliError> {
    let content = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    let default_dataset = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());

    let mut tasks = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawRecord = serde_json::from_str(line).map_err(|e| CliError::Dataset {
            path: path.to_path_buf(),
            line: line_no,
            reason: e.to_string(),
        })?;
        let dataset = raw.dataset.unwrap_or_else(|| default_dataset.clone());
        let answer = match &raw.answer {
            None | Some(Value::Null) => None,
            Some(v) => Some(number(v).ok_or_else(|| CliError::Dataset {
                path: path.to_path_buf(),
                line: line_no,
                reason: format!("answer {} is not a number", v),
            })?),
        };
        tasks.push(Task {
            id: raw
                .id
                .as_ref()
                .and_then(id_string)
                .unwrap_or_else(|| format!("{}-{}", dataset, line_no)),
            dataset,
            question: raw.question,
            answer,
        });
    }
    Ok(tasks)
}

/// Outcome of one batch problem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,
    pub dataset: String,
    pub expected: Option<f64>,
    pub predicted: Option<f64>,
    /// Best solver run finished without crashing.
    pub executed: bool,
    pub correct: bool,
    pub reward: Option<f64>,
    pub iterations: usize,
    pub stop_reason: String,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub formulation: Option<String>,
}

/// Records in `path`; a missing file is empty and malformed lines are skipped.
pub fn read_results(path: &Path) -> Result<Vec<ResultRecord>, CliError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CliError::io(path, e)),
    };
    let mut out = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ResultRecord>(line) {
            Ok(r) => out.push(r),
            Err(e) => warn!(path = %path.display(), line = i + 1, error = %e, "skipping malformed result line"),
        }
    }
    Ok(out)
}

/// Ids already present in the results file.
pub fn completed_ids(records: &[ResultRecord]) -> HashSet<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

/// Tasks still to run: not in `done`, in dataset `only` when given (ASCII
/// case-insensitive), at most `limit` of them, in file order.
pub fn select_pending(
    tasks: Vec<Task>,
    done: &HashSet<String>,
    only: Option<&str>,
    limit: Option<usize>,
) -> Vec<Task> {
    tasks
        .into_iter()
        .filter(|t| only.map_or(true, |name| t.dataset.eq_ignore_ascii_case(name)))
        .filter(|t| !done.contains(&t.id))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Appends one JSON line per record and flushes after each.
pub struct ResultWriter {
    path: PathBuf,
    file: File,
}

impl ResultWriter {
    pub fn open(path: &Path) -> Result<Self, CliError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CliError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn append(&mut self, record: &ResultRecord) -> Result<(), CliError> {
        let line = serde_json::to_string(record)?;
        writeln!(self.file, "{}", line)
            .and_then(|_| self.file.flush())
            .map_err(|e| CliError::io(&self.path, e))
    }
}
