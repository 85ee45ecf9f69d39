//! Per-dataset execution rate and solving accuracy.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::dataset::ResultRecord;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetSummary {
    pub dataset: String,
    pub total: usize,
    pub executed: usize,
    pub correct: usize,
}

impl DatasetSummary {
    /// Executed share in percent; 0 for an empty set.
    pub fn execution_rate(&self) -> f64 {
        percent(self.executed, self.total)
    }

    /// Correct share in percent; 0 for an empty set.
    pub fn solving_accuracy(&self) -> f64 {
        percent(self.correct, self.total)
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

/// One row per dataset, sorted by name. Later records for an id replace earlier ones.
pub fn summarize(records: &[ResultRecord]) -> Vec<DatasetSummary> {
    let mut latest: BTreeMap<(&str, &str), &ResultRecord> = BTreeMap::new();
    for r in records {
        latest.insert((r.dataset.as_str(), r.id.as_str()), r);
    }
    let mut rows: BTreeMap<&str, DatasetSummary> = BTreeMap::new();
    for ((dataset, _), r) in latest {
        let row = rows.entry(dataset).or_insert_with(|| DatasetSummary {
            dataset: dataset.to_string(),
            ..Default::default()
        });
        row.total += 1;
        row.executed += usize::from(r.executed);
        row.correct += usize::from(r.correct);
    }
    rows.into_values().collect()
}

/// Fixed-width table with a TOTAL row.
pub fn render_table(rows: &[DatasetSummary]) -> String {
    let mut total = DatasetSummary {
        dataset: "TOTAL".to_string(),
        ..Default::default()
    };
    let mut out = String::new();
    let rule = "-".repeat(60);
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(
        out,
        "{:<20} {:>6} {:>6} {:>8} {:>7} {:>7}",
        "Dataset", "Total", "Exec", "Correct", "ER%", "SA%"
    );
    let _ = writeln!(out, "{}", rule);
    for row in rows {
        total.total += row.total;
        total.executed += row.executed;
        total.correct += row.correct;
        write_row(&mut out, row);
    }
    let _ = writeln!(out, "{}", rule);
    write_row(&mut out, &total);
    let _ = writeln!(out, "{}", "=".repeat(60));
    out
}

fn write_row(out: &mut String, row: &DatasetSummary) {
    let _ = writeln!(
        out,
        "{:<20} {:>6} {:>6} {:>8} {:>6.1}% {:>6.1}%",
        row.dataset,
        row.total,
        row.executed,
        row.correct,
        row.execution_rate(),
        row.solving_accuracy()
    );
}
