//! Report - worker ごとの top-k 正解率と task 別の内訳
//!
//! 対象は「ラベルが確定していて、その worker が回答済み」の task だけ。
//! 一致判定は大文字小文字を無視した完全一致。task は新しい順（store の逆順）。

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::app::status::worker_columns;
use crate::domain::{Guess, MAX_CANDIDATES, Task, TaskId, Timestamp, WorkerId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerScore {
    pub worker_id: WorkerId,
    pub answered: usize,
    /// `hits[k - 1]` = tasks whose label appears in the top `k` candidates.
    pub hits: [usize; MAX_CANDIDATES],
}

impl WorkerScore {
    fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            answered: 0,
            hits: [0; MAX_CANDIDATES],
        }
    }

    pub fn accuracy(&self, k: usize) -> f64 {
        if self.answered == 0 || k == 0 {
            return 0.0;
        }
        let k = k.min(MAX_CANDIDATES);
        self.hits[k - 1] as f64 / self.answered as f64
    }
}

/// One worker's answer to one resolved task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cell {
    Hit { label: String, rank: usize },
    Miss { first: Option<String> },
    NotAnswered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRow {
    pub task_id: TaskId,
    pub source_url: String,
    pub resolved_label: String,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scoreboard {
    pub updated_at: Option<Timestamp>,
    pub workers: Vec<WorkerScore>,
    pub rows: Vec<TaskRow>,
}

impl Scoreboard {
    /// Columns follow `workers`; when it is empty, every worker with a guess, sorted by id.
    pub fn build(
        tasks: &[Task],
        guesses: &[Guess],
        workers: &[WorkerId],
        updated_at: Option<Timestamp>,
    ) -> Self {
        let columns = worker_columns(workers, guesses);
        let by_key: HashMap<(&TaskId, &WorkerId), &Guess> = guesses
            .iter()
            .map(|g| ((&g.task_id, &g.worker_id), g))
            .collect();

        let mut scores: Vec<WorkerScore> = columns.iter().cloned().map(WorkerScore::new).collect();
        let mut rows = Vec::new();

        for task in tasks.iter().rev() {
            let Some(label) = task.resolved_label.as_deref() else {
                continue;
            };
            let mut cells = Vec::with_capacity(columns.len());
            for (worker_id, score) in columns.iter().zip(scores.iter_mut()) {
                let Some(guess) = by_key.get(&(&task.task_id, worker_id)) else {
                    cells.push(Cell::NotAnswered);
                    continue;
                };
                score.answered += 1;
                match guess.candidates.rank_of(label) {
                    Some(rank) => {
                        for hit in &mut score.hits[rank - 1..] {
                            *hit += 1;
                        }
                        cells.push(Cell::Hit {
                            label: guess.candidates.as_slice()[rank - 1].clone(),
                            rank,
                        });
                    }
                    None => cells.push(Cell::Miss {
                        first: guess.candidates.as_slice().first().cloned(),
                    }),
                }
            }
            if cells.iter().all(|c| *c == Cell::NotAnswered) {
                continue;
            }
            rows.push(TaskRow {
                task_id: task.task_id.clone(),
                source_url: task.source_url.clone(),
                resolved_label: label.to_string(),
                cells,
            });
        }

        Scoreboard {
            updated_at,
            workers: scores,
            rows,
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## Font recognition benchmark");
        out.push('\n');
        if let Some(at) = self.updated_at {
            let _ = writeln!(out, "*Updated at {}*", at.format("%Y-%m-%d %H:%M UTC"));
            out.push('\n');
        }

        let header: Vec<String> = self.workers.iter().map(|w| w.worker_id.to_string()).collect();

        let _ = writeln!(out, "### Metrics");
        out.push('\n');
        let _ = writeln!(out, "| Metric | {} |", header.join(" | "));
        let _ = writeln!(out, "|---|{}", "---|".repeat(header.len()));
        let totals: Vec<String> = self.workers.iter().map(|w| w.answered.to_string()).collect();
        let _ = writeln!(out, "| Total tasks | {} |", totals.join(" | "));
        for k in 1..=MAX_CANDIDATES {
            let row: Vec<String> = self
                .workers
                .iter()
                .map(|w| format!("{:.2}%", w.accuracy(k) * 100.0))
                .collect();
            let _ = writeln!(out, "| Top-{k} accuracy | {} |", row.join(" | "));
        }
        out.push('\n');

        let _ = writeln!(out, "### Breakdown");
        out.push('\n');
        let _ = writeln!(out, "| Task | Identified font | {} |", header.join(" | "));
        let _ = writeln!(out, "|---|---|{}", "---|".repeat(header.len()));
        for row in &self.rows {
            let cells: Vec<String> = row.cells.iter().map(render_cell).collect();
            let _ = writeln!(
                out,
                "| [{}]({}) | {} | {} |",
                row.task_id,
                row.source_url,
                escape(&row.resolved_label),
                cells.join(" | ")
            );
        }
        out
    }
}

fn render_cell(cell: &Cell) -> String {
    match cell {
        Cell::Hit { label, rank } => format!("✅ {} ({rank})", escape(label)),
        Cell::Miss { first: Some(first) } => format!("❌ {}", escape(first)),
        Cell::Miss { first: None } => "❌ (abstained)".to_string(),
        Cell::NotAnswered => String::new(),
    }
}

fn escape(text: &str) -> String {
    text.replace('|', "\\|")
}
