use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ParseError, ValidationError};

/// Prefix every dated sprint name carries, e.g. "Sprint 12"
pub const SPRINT_PREFIX: &str = "Sprint ";

/// Name of the synthetic sprint holding unscheduled stories
pub const NOT_ASSIGNED: &str = "Not Assigned";

/// Date format used when none is configured
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Represents the status of a story
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StoryStatus {
    Missed,
    Completed,
    InProgress,
    Planned,
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoryStatus::Missed => write!(f, "Missed"),
            StoryStatus::Completed => write!(f, "Completed"),
            StoryStatus::InProgress => write!(f, "In Progress"),
            StoryStatus::Planned => write!(f, "Planned"),
        }
    }
}

impl StoryStatus {
    /// Parse a status cell. Anything unrecognized lands in `Planned`.
    pub fn parse(s: &str) -> Self {
        match normalize_status(s).as_str() {
            "missed" => StoryStatus::Missed,
            "completed" => StoryStatus::Completed,
            "inprogress" => StoryStatus::InProgress,
            "planned" | "" => StoryStatus::Planned,
            _ => {
                log::warn!("Unknown story status {:?}, treating as Planned", s);
                StoryStatus::Planned
            }
        }
    }
}

/// Represents the status of a sprint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SprintStatus {
    Missed,
    Completed,
    InProgress,
    Planned,
    /// A future sprint synthesized by the forecast
    Auto,
}

impl fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SprintStatus::Missed => write!(f, "Missed"),
            SprintStatus::Completed => write!(f, "Completed"),
            SprintStatus::InProgress => write!(f, "In Progress"),
            SprintStatus::Planned => write!(f, "Planned"),
            SprintStatus::Auto => write!(f, "Auto"),
        }
    }
}

impl SprintStatus {
    /// Parse a sprint status cell. Empty and unrecognized values become `Planned`.
    pub fn parse(s: &str) -> Self {
        match normalize_status(s).as_str() {
            "missed" => SprintStatus::Missed,
            "completed" => SprintStatus::Completed,
            "inprogress" => SprintStatus::InProgress,
            "auto" => SprintStatus::Auto,
            "planned" | "" => SprintStatus::Planned,
            _ => {
                log::warn!("Unknown sprint status {:?}, treating as Planned", s);
                SprintStatus::Planned
            }
        }
    }
}

fn normalize_status(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .collect::<String>()
        .to_lowercase()
}

/// One backlog item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Story {
    id: i64,
    points: f64,
    status: StoryStatus,
    release: Option<String>,
    /// Number of the sprint the story was pushed into, `None` while unassigned
    /// or when it sits in the "Not Assigned" sprint
    sprint_number: Option<u32>,
}

impl Story {
    /// Creates a story, rejecting negative or non-finite points
    pub fn new(
        id: i64,
        points: f64,
        status: StoryStatus,
        release: Option<String>,
    ) -> Result<Self, ValidationError> {
        if !points.is_finite() {
            return Err(ValidationError::NonFinitePoints { id });
        }
        if points < 0.0 {
            return Err(ValidationError::NegativePoints { id, points });
        }

        Ok(Self {
            id,
            points,
            status,
            release: release.filter(|r| !r.trim().is_empty()),
            sprint_number: None,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn points(&self) -> f64 {
        self.points
    }

    pub fn status(&self) -> StoryStatus {
        self.status
    }

    pub fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }

    pub fn sprint_number(&self) -> Option<u32> {
        self.sprint_number
    }

    /// Only the backlog assigns sprints, and only while taking ownership of the story
    pub(crate) fn assign_sprint(&mut self, number: Option<u32>) {
        self.sprint_number = number;
    }
}

/// Point totals of a sprint, partitioned by story status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PointTotals {
    pub completed: f64,
    pub missed: f64,
    pub in_progress: f64,
    pub planned: f64,
}

impl PointTotals {
    /// Sum of all four buckets
    pub fn total(&self) -> f64 {
        self.completed + self.missed + self.in_progress + self.planned
    }

    fn add(&mut self, status: StoryStatus, points: f64) {
        match status {
            StoryStatus::Missed => self.missed += points,
            StoryStatus::Completed => self.completed += points,
            StoryStatus::InProgress => self.in_progress += points,
            StoryStatus::Planned => self.planned += points,
        }
    }
}

/// A time-boxed unit of work aggregating the stories pushed into it
#[derive(Debug, Clone, PartialEq)]
pub struct Sprint {
    name: String,
    /// `None` only for the "Not Assigned" sprint
    number: Option<u32>,
    start_date: Option<NaiveDate>,
    status: SprintStatus,
    totals: PointTotals,
    stories: Vec<Story>,
    /// Position within the owning backlog, set when appended
    index: Option<usize>,
    /// Name of the owning backlog, set when appended
    backlog: Option<String>,
}

impl Sprint {
    /// Creates a dated sprint. The name must read "Sprint <N>".
    pub fn new(
        name: &str,
        start_date: Option<NaiveDate>,
        status: SprintStatus,
    ) -> Result<Self, ParseError> {
        let number = parse_sprint_number(name)?;
        Ok(Self::with_number(name.to_string(), Some(number), start_date, status))
    }

    /// The singleton sprint holding stories not yet scheduled
    pub fn not_assigned() -> Self {
        Self::with_number(NOT_ASSIGNED.to_string(), None, None, SprintStatus::Planned)
    }

    /// A future sprint projected by the forecast
    pub fn forecast(number: u32, start_date: Option<NaiveDate>) -> Self {
        Self::with_number(
            format!("{}{}", SPRINT_PREFIX, number),
            Some(number),
            start_date,
            SprintStatus::Auto,
        )
    }

    fn with_number(
        name: String,
        number: Option<u32>,
        start_date: Option<NaiveDate>,
        status: SprintStatus,
    ) -> Self {
        Self {
            name,
            number,
            start_date,
            status,
            totals: PointTotals::default(),
            stories: Vec::new(),
            index: None,
            backlog: None,
        }
    }

    /// Adds a story, crediting its points to the bucket of its status
    pub fn push(&mut self, story: Story) {
        self.totals.add(story.status, story.points);
        self.stories.push(story);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> Option<u32> {
        self.number
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    /// Start date rendered with the given chrono format
    pub fn start_date_str(&self, format: &str) -> Option<String> {
        self.start_date.map(|d| d.format(format).to_string())
    }

    /// "<name> (<start date>)", or just the name when undated
    pub fn full_name(&self, format: &str) -> String {
        match self.start_date_str(format) {
            Some(date) => format!("{} ({})", self.name, date),
            None => self.name.clone(),
        }
    }

    pub fn status(&self) -> SprintStatus {
        self.status
    }

    pub fn totals(&self) -> PointTotals {
        self.totals
    }

    pub fn completed(&self) -> f64 {
        self.totals.completed
    }

    pub fn missed(&self) -> f64 {
        self.totals.missed
    }

    pub fn in_progress(&self) -> f64 {
        self.totals.in_progress
    }

    pub fn planned(&self) -> f64 {
        self.totals.planned
    }

    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn backlog(&self) -> Option<&str> {
        self.backlog.as_deref()
    }

    pub(crate) fn attach(&mut self, backlog: &str, index: usize) {
        self.backlog = Some(backlog.to_string());
        self.index = Some(index);
    }
}

/// Extracts N from "Sprint N". Like a lenient integer parse, trailing text
/// after the digits is ignored ("Sprint 4 - Hardening" is sprint 4).
pub fn parse_sprint_number(name: &str) -> Result<u32, ParseError> {
    let rest = name
        .strip_prefix(SPRINT_PREFIX)
        .ok_or_else(|| ParseError::MissingSprintPrefix(name.to_string()))?;

    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    digits
        .parse()
        .map_err(|_| ParseError::InvalidSprintNumber(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: i64, points: f64, status: StoryStatus) -> Story {
        Story::new(id, points, status, None).unwrap()
    }

    #[test]
    fn test_story_rejects_negative_points() {
        let err = Story::new(7, -1.0, StoryStatus::Planned, None).unwrap_err();
        assert_eq!(err, ValidationError::NegativePoints { id: 7, points: -1.0 });

        assert!(Story::new(8, f64::NAN, StoryStatus::Planned, None).is_err());
        assert!(Story::new(9, 0.0, StoryStatus::Planned, None).is_ok());
    }

    #[test]
    fn test_story_blank_release_is_none() {
        let s = Story::new(1, 3.0, StoryStatus::Planned, Some("  ".into())).unwrap();
        assert_eq!(s.release(), None);

        let s = Story::new(1, 3.0, StoryStatus::Planned, Some("R1".into())).unwrap();
        assert_eq!(s.release(), Some("R1"));
        assert_eq!(s.sprint_number(), None);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(StoryStatus::parse("In Progress"), StoryStatus::InProgress);
        assert_eq!(StoryStatus::parse("completed"), StoryStatus::Completed);
        assert_eq!(StoryStatus::parse("Blocked"), StoryStatus::Planned);
        assert_eq!(SprintStatus::parse(""), SprintStatus::Planned);
        assert_eq!(SprintStatus::parse("Missed"), SprintStatus::Missed);
        assert_eq!(SprintStatus::parse("in-progress"), SprintStatus::InProgress);
    }

    #[test]
    fn test_parse_sprint_number() {
        assert_eq!(parse_sprint_number("Sprint 12"), Ok(12));
        assert_eq!(parse_sprint_number("Sprint 4 - Hardening"), Ok(4));
        assert_eq!(
            parse_sprint_number("Sprnt 3"),
            Err(ParseError::MissingSprintPrefix("Sprnt 3".into()))
        );
        assert_eq!(
            parse_sprint_number("Sprint X"),
            Err(ParseError::InvalidSprintNumber("Sprint X".into()))
        );
    }

    #[test]
    fn test_sprint_push_partitions_points() {
        let mut sprint = Sprint::new("Sprint 1", None, SprintStatus::Completed).unwrap();
        sprint.push(story(1, 3.0, StoryStatus::Completed));
        sprint.push(story(2, 5.0, StoryStatus::Missed));
        sprint.push(story(3, 2.0, StoryStatus::InProgress));
        sprint.push(story(4, 1.0, StoryStatus::Planned));
        sprint.push(story(5, 8.0, StoryStatus::Completed));

        assert_eq!(sprint.completed(), 11.0);
        assert_eq!(sprint.missed(), 5.0);
        assert_eq!(sprint.in_progress(), 2.0);
        assert_eq!(sprint.planned(), 1.0);
        assert_eq!(sprint.stories().len(), 5);
    }

    #[test]
    fn test_sprint_totals_sum_to_pushed_points() {
        let statuses = [
            StoryStatus::Completed,
            StoryStatus::Missed,
            StoryStatus::InProgress,
            StoryStatus::Planned,
        ];
        let mut sprint = Sprint::new("Sprint 2", None, SprintStatus::InProgress).unwrap();
        let mut expected = 0.0;
        for i in 0..40 {
            let points = (i % 7) as f64 + 0.5;
            expected += points;
            sprint.push(story(i, points, statuses[i as usize % statuses.len()]));
        }

        assert_eq!(sprint.totals().total(), expected);
    }

    #[test]
    fn test_full_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let sprint = Sprint::new("Sprint 3", Some(date), SprintStatus::Planned).unwrap();
        assert_eq!(sprint.full_name(DEFAULT_DATE_FORMAT), "Sprint 3 (2024-03-04)");
        assert_eq!(sprint.full_name("%d/%m"), "Sprint 3 (04/03)");

        let na = Sprint::not_assigned();
        assert_eq!(na.full_name(DEFAULT_DATE_FORMAT), NOT_ASSIGNED);
        assert_eq!(na.number(), None);
    }

    #[test]
    fn test_forecast_sprint() {
        let sprint = Sprint::forecast(9, None);
        assert_eq!(sprint.name(), "Sprint 9");
        assert_eq!(sprint.number(), Some(9));
        assert_eq!(sprint.status(), SprintStatus::Auto);
        assert_eq!(sprint.totals(), PointTotals::default());
    }
}
