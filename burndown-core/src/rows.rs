//! Row source: turning sheet rows into a backlog
//!
//! A sheet is an ordered list of fixed-width rows
//! `[id, theme, text, criteria, points, comment, release, status]`.
//! Sprint marker rows carry "Sprint N" in the text column and the start date
//! in the criteria column; the "Not Assigned" marker opens the unscheduled
//! section; any row whose id is an integer is a story of the current section.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::backlog::Backlog;
use crate::config::ForecastConfig;
use crate::error::{BurndownError, ParseError};
use crate::models::{
    Sprint, SprintStatus, Story, StoryStatus, DEFAULT_DATE_FORMAT, NOT_ASSIGNED, SPRINT_PREFIX,
};

/// Number of columns in a sheet row
pub const ROW_WIDTH: usize = 8;

/// Column titles, in sheet order
pub const COLUMNS: [&str; ROW_WIDTH] = [
    "ID", "Theme", "Story", "Criteria", "Points", "Comment", "Release", "Status",
];

/// One sheet row with every cell as text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRecord {
    pub id: String,
    pub theme: String,
    pub text: String,
    pub criteria: String,
    pub points: String,
    pub comment: String,
    pub release: String,
    pub status: String,
}

/// What a row means to the backlog builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    SprintMarker,
    NotAssignedMarker,
    Story(i64),
    Ignored,
}

impl RowRecord {
    /// Builds a record from cells, padding short rows and dropping extra cells
    pub fn from_cells<S: AsRef<str>>(cells: &[S]) -> Self {
        let cell = |i: usize| {
            cells
                .get(i)
                .map(|c| c.as_ref().trim().to_string())
                .unwrap_or_default()
        };
        Self {
            id: cell(0),
            theme: cell(1),
            text: cell(2),
            criteria: cell(3),
            points: cell(4),
            comment: cell(5),
            release: cell(6),
            status: cell(7),
        }
    }

    /// Cells in sheet order
    pub fn cells(&self) -> [&str; ROW_WIDTH] {
        [
            &self.id,
            &self.theme,
            &self.text,
            &self.criteria,
            &self.points,
            &self.comment,
            &self.release,
            &self.status,
        ]
    }

    /// Marker row opening a dated sprint
    pub fn sprint_marker(name: &str, start: Option<&str>, status: SprintStatus) -> Self {
        Self {
            text: name.to_string(),
            criteria: start.unwrap_or_default().to_string(),
            status: match status {
                SprintStatus::Planned => String::new(),
                other => other.to_string(),
            },
            ..Self::default()
        }
    }

    pub fn classify(&self) -> RowKind {
        if self.text.starts_with(SPRINT_PREFIX) {
            RowKind::SprintMarker
        } else if self.text == NOT_ASSIGNED {
            RowKind::NotAssignedMarker
        } else if let Some(id) = parse_id(&self.id) {
            RowKind::Story(id)
        } else {
            RowKind::Ignored
        }
    }
}

/// Story ids are integers, though spreadsheets may export them as "12.0"
fn parse_id(value: &str) -> Option<i64> {
    if let Ok(id) = value.parse::<i64>() {
        return Some(id);
    }
    let id = value.parse::<f64>().ok()?;
    (id.is_finite() && id.fract() == 0.0 && id.abs() < i64::MAX as f64).then_some(id as i64)
}

/// Folds sheet rows into a [`Backlog`]
pub struct BacklogBuilder<'c> {
    config: &'c ForecastConfig,
    release: Option<String>,
}

impl<'c> BacklogBuilder<'c> {
    pub fn new(config: &'c ForecastConfig) -> Self {
        Self {
            config,
            release: None,
        }
    }

    /// Only push stories of this release
    pub fn release(mut self, release: Option<&str>) -> Self {
        self.release = release.map(|r| r.to_string());
        self
    }

    pub fn build(&self, name: &str, rows: &[RowRecord]) -> Result<Backlog, BurndownError> {
        let mut backlog = Backlog::new(name);

        for (line, row) in rows.iter().enumerate() {
            match row.classify() {
                RowKind::SprintMarker => {
                    let start = self.parse_start_date(row)?;
                    let sprint = Sprint::new(&row.text, start, SprintStatus::parse(&row.status))?;
                    backlog.push_sprint(sprint);
                }
                RowKind::NotAssignedMarker => backlog.push_not_assigned(),
                RowKind::Story(id) => {
                    if let Some(release) = &self.release {
                        if &row.release != release {
                            log::debug!("{}: story {} not in release {}", name, id, release);
                            continue;
                        }
                    }
                    let points = parse_points(id, &row.points)?;
                    let release = Some(row.release.clone());
                    let story = Story::new(id, points, StoryStatus::parse(&row.status), release)?;
                    backlog.push_story(story)?;
                }
                RowKind::Ignored if !row.id.is_empty() && row.id != COLUMNS[0] => {
                    log::warn!(
                        "{}: skipping row {}, id {:?} is not a whole number",
                        name,
                        line + 1,
                        row.id
                    );
                }
                RowKind::Ignored => {
                    log::debug!("{}: skipping row {} ({:?})", name, line + 1, row.text);
                }
            }
        }

        Ok(backlog)
    }

    fn parse_start_date(&self, row: &RowRecord) -> Result<Option<NaiveDate>, ParseError> {
        let value = row.criteria.trim();
        if value.is_empty() {
            return Ok(None);
        }

        NaiveDate::parse_from_str(value, &self.config.date_format)
            .or_else(|_| NaiveDate::parse_from_str(value, DEFAULT_DATE_FORMAT))
            .map(Some)
            .map_err(|_| ParseError::InvalidStartDate {
                sprint: row.text.clone(),
                value: value.to_string(),
                format: self.config.date_format.clone(),
            })
    }
}

/// Unestimated stories count as zero points
fn parse_points(id: i64, value: &str) -> Result<f64, ParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0.0);
    }
    value.parse().map_err(|_| ParseError::InvalidPoints {
        id,
        value: value.to_string(),
    })
}
