//! Planning the next sprint marker of a backlog

use chrono::{Datelike, NaiveDate};

use crate::backlog::Backlog;
use crate::config::ForecastConfig;
use crate::models::{SprintStatus, SPRINT_PREFIX};
use crate::rows::RowRecord;

/// Number and start date of the sprint following the backlog's last one
pub fn next_sprint(backlog: &Backlog, config: &ForecastConfig, today: NaiveDate) -> (u32, NaiveDate) {
    let number = backlog
        .last_sprint()
        .and_then(|s| s.number())
        .map_or(1, |n| n + 1);

    let count = backlog.sprint_count();
    let last_dated = backlog
        .sprints()
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, s)| s.start_date().map(|d| (i, d)));

    let start = match last_dated {
        Some((i, date)) => {
            let gap = i32::try_from(count - i).unwrap_or(1);
            date + config.sprint_length() * gap
        }
        None => next_weekday(today, config.sprint_start_day),
    };

    (number, start)
}

/// Marker row for the next sprint, ready to be inserted into the sheet
pub fn next_sprint_marker(backlog: &Backlog, config: &ForecastConfig, today: NaiveDate) -> RowRecord {
    let (number, start) = next_sprint(backlog, config, today);
    if start.weekday() != config.sprint_start_day {
        log::warn!(
            "{}: next sprint starts on {}, expected {}",
            backlog.name(),
            start.weekday(),
            config.sprint_start_day
        );
    }

    let name = format!("{}{}", SPRINT_PREFIX, number);
    let start = start.format(&config.date_format).to_string();
    RowRecord::sprint_marker(&name, Some(&start), SprintStatus::Planned)
}

/// First date on or after `from` falling on `weekday`
pub fn next_weekday(from: NaiveDate, weekday: chrono::Weekday) -> NaiveDate {
    let ahead = (7 + weekday.num_days_from_monday() - from.weekday().num_days_from_monday()) % 7;
    from + chrono::Duration::days(i64::from(ahead))
}
