//! Forecast iterator
//!
//! Walks the sprints of a backlog in order, then keeps going with synthesized
//! sprints that burn the remaining points at the last rolling average
//! velocity. Completed sprints reduce the remaining work by what was actually
//! completed; every other sprint (planned, in progress, missed or projected)
//! is assumed to burn the average.
//!
//! Only non-completed sprints can end the walk: once their projected
//! remaining work reaches zero the iterator stops.

use chrono::NaiveDate;
use serde::Serialize;
use std::borrow::Cow;

use crate::backlog::Backlog;
use crate::config::ForecastConfig;
use crate::models::{Sprint, SprintStatus};

/// Number of sprints in the rolling velocity window
pub const VELOCITY_WINDOW: usize = 3;

/// A sprint as seen by the forecast, historical or projected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintSnapshot {
    pub index: usize,
    pub name: String,
    pub number: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub start_date_str: Option<String>,
    pub full_name: String,
    pub status: SprintStatus,
    pub completed: f64,
    pub missed: f64,
    pub in_progress: f64,
    pub planned: f64,
    /// Set on completed sprints only
    pub average_velocity: Option<f64>,
    /// Set on completed sprints only
    pub remaining: Option<f64>,
    /// Set on every non-completed sprint
    pub forecast: Option<f64>,
}

impl SprintSnapshot {
    fn from_sprint(sprint: &Sprint, index: usize, date_format: &str) -> Self {
        let totals = sprint.totals();
        Self {
            index,
            name: sprint.name().to_string(),
            number: sprint.number(),
            start_date: sprint.start_date(),
            start_date_str: sprint.start_date_str(date_format),
            full_name: sprint.full_name(date_format),
            status: sprint.status(),
            completed: totals.completed,
            missed: totals.missed,
            in_progress: totals.in_progress,
            planned: totals.planned,
            average_velocity: None,
            remaining: None,
            forecast: None,
        }
    }
}

/// Why the forecast stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// A non-completed sprint brought the projected remaining work to zero
    BurndownComplete,
    /// A future sprint would be projected without any positive velocity
    NoVelocity,
    /// The cap on synthesized sprints was reached
    ForecastLimit,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::BurndownComplete => write!(f, "burndown complete"),
            Termination::NoVelocity => write!(f, "no velocity to project"),
            Termination::ForecastLimit => write!(f, "forecast limit reached"),
        }
    }
}

/// Result of one forecast step
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastStep {
    Sprint(SprintSnapshot),
    Done(Termination),
}

/// Stateful, finite, non-restartable walk over a backlog's sprints
pub struct Forecast<'a> {
    backlog: &'a Backlog,
    sprint_length: chrono::Duration,
    date_format: String,
    limit: usize,
    /// Index of the last produced sprint, `None` before the first call
    index: Option<usize>,
    remaining: f64,
    average: Option<f64>,
    start_date: Option<NaiveDate>,
    synthesized: usize,
    finished: Option<Termination>,
}

impl<'a> Forecast<'a> {
    pub fn new(backlog: &'a Backlog, config: &ForecastConfig) -> Self {
        Self {
            backlog,
            sprint_length: config.sprint_length(),
            date_format: config.date_format.clone(),
            limit: config.forecast_limit,
            index: None,
            remaining: backlog.total_points(),
            average: None,
            start_date: None,
            synthesized: 0,
            finished: None,
        }
    }

    /// Produces the next sprint, or the terminal step. Once terminated,
    /// every further call returns the same terminal step.
    pub fn next_step(&mut self) -> ForecastStep {
        if let Some(termination) = self.finished {
            return ForecastStep::Done(termination);
        }

        let index = self.index.map_or(0, |i| i + 1);
        self.index = Some(index);

        let backlog = self.backlog;
        let sprint = match backlog.get_sprint(index) {
            Some(sprint) => {
                self.start_date = match sprint.start_date() {
                    Some(date) => Some(date),
                    None => self.advance_start_date(),
                };
                Cow::Borrowed(sprint)
            }
            None => {
                if self.synthesized >= self.limit {
                    return self.finish(Termination::ForecastLimit);
                }
                self.synthesized += 1;
                self.start_date = self.advance_start_date();
                let number = u32::try_from(index + 1).unwrap_or(u32::MAX);
                Cow::Owned(Sprint::forecast(number, self.start_date))
            }
        };
        let projected = sprint.status() == SprintStatus::Auto;

        let mut snapshot = SprintSnapshot::from_sprint(&sprint, index, &self.date_format);

        if snapshot.status == SprintStatus::Completed {
            self.remaining -= snapshot.completed;
            if let Some(average) = self.rolling_average(index) {
                self.average = Some(average);
            }
            snapshot.average_velocity = self.average;
            snapshot.remaining = Some(self.remaining);
        } else {
            self.remaining -= self.average.unwrap_or(0.0);
            snapshot.forecast = Some(self.remaining);
        }

        log::debug!(
            "forecast step {}: {} ({}) remaining {:.1}",
            index,
            snapshot.name,
            snapshot.status,
            self.remaining
        );

        if matches!(snapshot.forecast, Some(f) if f <= 0.0) {
            return self.finish(Termination::BurndownComplete);
        }
        if projected && !self.average.is_some_and(|a| a > 0.0) {
            return self.finish(Termination::NoVelocity);
        }

        ForecastStep::Sprint(snapshot)
    }

    /// Index of the last produced sprint
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn average_velocity(&self) -> Option<f64> {
        self.average
    }

    pub fn termination(&self) -> Option<Termination> {
        self.finished
    }

    fn finish(&mut self, termination: Termination) -> ForecastStep {
        log::debug!("forecast finished: {}", termination);
        self.finished = Some(termination);
        ForecastStep::Done(termination)
    }

    fn advance_start_date(&self) -> Option<NaiveDate> {
        self.start_date
            .and_then(|d| d.checked_add_signed(self.sprint_length))
    }

    /// Mean completed points over the sprint at `index` and up to two before it
    fn rolling_average(&self, index: usize) -> Option<f64> {
        let first = (index + 1).saturating_sub(VELOCITY_WINDOW);
        let window: Vec<f64> = (first..=index)
            .filter_map(|i| self.backlog.get_sprint(i))
            .map(Sprint::completed)
            .collect();

        if window.is_empty() {
            return None;
        }
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }
}

impl Iterator for Forecast<'_> {
    type Item = SprintSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_step() {
            ForecastStep::Sprint(snapshot) => Some(snapshot),
            ForecastStep::Done(_) => None,
        }
    }
}

impl std::iter::FusedIterator for Forecast<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropertyStore;
    use crate::models::{Story, StoryStatus};

    fn config() -> ForecastConfig {
        ForecastConfig::resolve(&PropertyStore::with_defaults()).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Builds a backlog with one completed story per (status, completed points) pair
    fn backlog_with(sprints: &[(SprintStatus, f64)], unassigned: f64) -> Backlog {
        let mut backlog = Backlog::new("Product");
        let mut id = 0;
        for (n, (status, points)) in sprints.iter().enumerate() {
            let start = date(2024, 1, 1) + chrono::Duration::days(14 * n as i64);
            let name = format!("Sprint {}", n + 1);
            backlog.push_sprint(Sprint::new(&name, Some(start), *status).unwrap());
            id += 1;
            let story_status = if *status == SprintStatus::Completed {
                StoryStatus::Completed
            } else {
                StoryStatus::Planned
            };
            backlog
                .push_story(Story::new(id, *points, story_status, None).unwrap())
                .unwrap();
        }
        if unassigned > 0.0 {
            backlog.push_not_assigned();
            backlog
                .push_story(Story::new(id + 1, unassigned, StoryStatus::Planned, None).unwrap())
                .unwrap();
        }
        backlog
    }

    #[test]
    fn test_rolling_average_over_three_sprints() {
        let backlog = backlog_with(
            &[
                (SprintStatus::Completed, 10.0),
                (SprintStatus::Completed, 20.0),
                (SprintStatus::Completed, 30.0),
                (SprintStatus::Completed, 40.0),
            ],
            100.0,
        );
        let averages: Vec<_> = Forecast::new(&backlog, &config())
            .take(4)
            .map(|s| s.average_velocity)
            .collect();

        assert_eq!(
            averages,
            vec![Some(10.0), Some(15.0), Some(20.0), Some(30.0)]
        );
    }

    #[test]
    fn test_completed_backlog_stops_after_history() {
        let backlog = backlog_with(
            &[
                (SprintStatus::Completed, 10.0),
                (SprintStatus::Completed, 10.0),
            ],
            0.0,
        );
        assert_eq!(backlog.total_points(), 20.0);

        let mut forecast = Forecast::new(&backlog, &config());
        let rows: Vec<_> = forecast.by_ref().collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].remaining, Some(10.0));
        assert_eq!(rows[1].remaining, Some(0.0));
        assert!(rows.iter().all(|r| r.forecast.is_none()));
        assert_eq!(forecast.termination(), Some(Termination::BurndownComplete));
    }

    #[test]
    fn test_empty_backlog_terminates_immediately() {
        let backlog = Backlog::new("Empty");
        let mut forecast = Forecast::new(&backlog, &config());

        assert_eq!(
            forecast.next_step(),
            ForecastStep::Done(Termination::BurndownComplete)
        );
        assert_eq!(forecast.index(), Some(0));
        assert_eq!(forecast.average_velocity(), None);
    }

    #[test]
    fn test_projects_future_sprints_at_average_velocity() {
        let backlog = backlog_with(&[(SprintStatus::Completed, 10.0)], 30.0);
        let rows: Vec<_> = Forecast::new(&backlog, &config()).collect();

        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Sprint 1", "Sprint 2", "Sprint 3"]);

        assert_eq!(rows[0].remaining, Some(30.0));
        assert_eq!(rows[1].status, SprintStatus::Auto);
        assert_eq!(rows[1].forecast, Some(20.0));
        assert_eq!(rows[2].forecast, Some(10.0));

        assert_eq!(rows[1].start_date, Some(date(2024, 1, 15)));
        assert_eq!(rows[2].start_date, Some(date(2024, 1, 29)));
        assert_eq!(rows[2].full_name, "Sprint 3 (2024-01-29)");
    }

    #[test]
    fn test_planned_history_burns_average() {
        let backlog = backlog_with(
            &[
                (SprintStatus::Completed, 10.0),
                (SprintStatus::Planned, 5.0),
            ],
            20.0,
        );
        let rows: Vec<_> = Forecast::new(&backlog, &config()).collect();

        // 35 total: 25 after sprint 1, then 10 per sprint
        assert_eq!(rows[1].status, SprintStatus::Planned);
        assert_eq!(rows[1].forecast, Some(15.0));
        assert_eq!(rows[2].forecast, Some(5.0));
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_undated_history_advances_running_date() {
        let mut backlog = backlog_with(&[(SprintStatus::Completed, 10.0)], 0.0);
        backlog.push_sprint(Sprint::new("Sprint 2", None, SprintStatus::Planned).unwrap());
        backlog
            .push_story(Story::new(50, 30.0, StoryStatus::Planned, None).unwrap())
            .unwrap();

        let rows: Vec<_> = Forecast::new(&backlog, &config()).collect();
        assert_eq!(rows[1].start_date, None);
        assert_eq!(rows[2].name, "Sprint 3");
        assert_eq!(rows[2].start_date, Some(date(2024, 1, 29)));
    }

    #[test]
    fn test_no_velocity_stops_projection() {
        let backlog = backlog_with(&[(SprintStatus::InProgress, 8.0)], 0.0);
        let mut forecast = Forecast::new(&backlog, &config());
        let rows: Vec<_> = forecast.by_ref().collect();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].forecast, Some(8.0));
        assert_eq!(forecast.termination(), Some(Termination::NoVelocity));
    }

    #[test]
    fn test_forecast_limit() {
        let backlog = backlog_with(&[(SprintStatus::Completed, 1.0)], 1000.0);
        let mut config = config();
        config.forecast_limit = 5;

        let mut forecast = Forecast::new(&backlog, &config);
        let rows: Vec<_> = forecast.by_ref().collect();

        assert_eq!(rows.len(), 6);
        assert_eq!(forecast.termination(), Some(Termination::ForecastLimit));
    }

    #[test]
    fn test_index_is_monotonic_and_fused() {
        let backlog = backlog_with(&[(SprintStatus::Completed, 10.0)], 20.0);
        let mut forecast = Forecast::new(&backlog, &config());

        let mut last = None;
        while let ForecastStep::Sprint(snapshot) = forecast.next_step() {
            assert!(last.map_or(true, |l| snapshot.index > l));
            last = Some(snapshot.index);
        }

        let index = forecast.index();
        assert_eq!(
            forecast.next_step(),
            ForecastStep::Done(Termination::BurndownComplete)
        );
        assert_eq!(forecast.index(), index);
        assert!(forecast.next().is_none());
    }
}
