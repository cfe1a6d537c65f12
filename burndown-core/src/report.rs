//! Burndown report: one row per sprint, historical or forecast
//!
//! This is the only output the presentation layer consumes.

use serde::Serialize;

use crate::backlog::Backlog;
use crate::config::ForecastConfig;
use crate::forecast::{Forecast, ForecastStep, SprintSnapshot, Termination};
use crate::models::SprintStatus;

/// Chart threshold drawn at 80% completion
pub const TARGET_RATE: f64 = 80.0;
/// Chart threshold drawn at 100% completion
pub const MAXIMUM_RATE: f64 = 100.0;

/// Report column titles, in output order
pub const REPORT_COLUMNS: [&str; 14] = [
    "Sprint",
    "Start Date",
    "Full Name",
    "Status",
    "Remaining",
    "Completed",
    "Missed",
    "In Progress",
    "Planned",
    "Average Velocity",
    "Forecast",
    "Completion Rate",
    "Target",
    "Maximum",
];

/// One cell of the tabular output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Empty, Cell::Number)
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Number(n) if n.fract() == 0.0 => write!(f, "{:.0}", n),
            Cell::Number(n) => write!(f, "{:.2}", n),
            Cell::Empty => Ok(()),
        }
    }
}

/// A report row. Completion rate and the two chart markers are only
/// filled for completed sprints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub name: String,
    pub start_date: Option<String>,
    pub full_name: String,
    pub status: SprintStatus,
    pub remaining: Option<f64>,
    pub completed: f64,
    pub missed: f64,
    pub in_progress: f64,
    pub planned: f64,
    pub average_velocity: Option<f64>,
    pub forecast: Option<f64>,
    pub completion_rate: Option<f64>,
    pub target: Option<f64>,
    pub maximum: Option<f64>,
}

impl From<SprintSnapshot> for ReportRow {
    fn from(s: SprintSnapshot) -> Self {
        let completed_sprint = s.status == SprintStatus::Completed;
        let completion_rate = if completed_sprint {
            completion_rate(s.completed, s.missed)
        } else {
            None
        };

        Self {
            name: s.name,
            start_date: s.start_date_str,
            full_name: s.full_name,
            status: s.status,
            remaining: s.remaining,
            completed: s.completed,
            missed: s.missed,
            in_progress: s.in_progress,
            planned: s.planned,
            average_velocity: s.average_velocity,
            forecast: s.forecast,
            completion_rate,
            target: completed_sprint.then_some(TARGET_RATE),
            maximum: completed_sprint.then_some(MAXIMUM_RATE),
        }
    }
}

impl ReportRow {
    pub fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.name.clone()),
            self.start_date.clone().map_or(Cell::Empty, Cell::Text),
            Cell::Text(self.full_name.clone()),
            Cell::Text(self.status.to_string()),
            Cell::from(self.remaining),
            Cell::Number(self.completed),
            Cell::Number(self.missed),
            Cell::Number(self.in_progress),
            Cell::Number(self.planned),
            Cell::from(self.average_velocity),
            Cell::from(self.forecast),
            Cell::from(self.completion_rate),
            Cell::from(self.target),
            Cell::from(self.maximum),
        ]
    }
}

/// Percentage of committed points that were completed, rounded.
/// `None` when nothing was committed.
pub fn completion_rate(completed: f64, missed: f64) -> Option<f64> {
    let committed = completed + missed;
    if committed <= 0.0 {
        return None;
    }
    Some((completed / committed * 100.0).round())
}

/// The full burndown of one backlog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BurndownReport {
    pub backlog: String,
    pub total_points: f64,
    pub rows: Vec<ReportRow>,
    pub termination: Termination,
}

impl BurndownReport {
    /// Drains a fresh forecast over the backlog
    pub fn build(backlog: &Backlog, config: &ForecastConfig) -> Self {
        let mut forecast = Forecast::new(backlog, config);
        let mut rows = Vec::new();

        let termination = loop {
            match forecast.next_step() {
                ForecastStep::Sprint(snapshot) => rows.push(ReportRow::from(snapshot)),
                ForecastStep::Done(termination) => break termination,
            }
        };

        log::info!(
            "{}: {} report rows ({})",
            backlog.name(),
            rows.len(),
            termination
        );

        Self {
            backlog: backlog.name().to_string(),
            total_points: backlog.total_points(),
            rows,
            termination,
        }
    }

    /// Header row followed by one row of cells per sprint
    pub fn to_table(&self) -> Vec<Vec<Cell>> {
        let header = REPORT_COLUMNS
            .iter()
            .map(|c| Cell::Text(c.to_string()))
            .collect();

        std::iter::once(header)
            .chain(self.rows.iter().map(ReportRow::cells))
            .collect()
    }

    /// Projected rows only
    pub fn forecast_rows(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows.iter().filter(|r| r.status == SprintStatus::Auto)
    }

    /// The last row of the report, i.e. where the burndown ends
    pub fn last_row(&self) -> Option<&ReportRow> {
        self.rows.last()
    }
}
