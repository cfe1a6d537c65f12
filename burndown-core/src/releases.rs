//! Points by release across a backlog

use serde::Serialize;
use std::collections::BTreeMap;

use crate::backlog::Backlog;
use crate::models::StoryStatus;

/// Label used for stories without a release
pub const NO_RELEASE: &str = "(none)";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReleaseSummary {
    pub release: String,
    pub stories: usize,
    /// Points of non-missed stories
    pub total: f64,
    pub completed: f64,
    pub missed: f64,
    /// Points scheduled into a dated sprint
    pub scheduled: f64,
}

impl ReleaseSummary {
    pub fn remaining(&self) -> f64 {
        self.total - self.completed
    }
}

/// One summary per release, ordered by release name
pub fn summarize_releases(backlog: &Backlog) -> Vec<ReleaseSummary> {
    let mut by_release: BTreeMap<&str, ReleaseSummary> = BTreeMap::new();

    for story in backlog.stories() {
        let release = story.release().unwrap_or(NO_RELEASE);
        let summary = by_release.entry(release).or_insert_with(|| ReleaseSummary {
            release: release.to_string(),
            ..ReleaseSummary::default()
        });

        summary.stories += 1;
        match story.status() {
            StoryStatus::Missed => summary.missed += story.points(),
            StoryStatus::Completed => {
                summary.completed += story.points();
                summary.total += story.points();
            }
            _ => summary.total += story.points(),
        }
        if story.sprint_number().is_some() {
            summary.scheduled += story.points();
        }
    }

    by_release.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Sprint, SprintStatus, Story};

    #[test]
    fn test_summarize_releases() {
        let mut backlog = Backlog::new("Product");
        backlog.push_sprint(Sprint::new("Sprint 1", None, SprintStatus::Completed).unwrap());
        let stories = [
            (1, 3.0, StoryStatus::Completed, Some("R1")),
            (2, 2.0, StoryStatus::Missed, Some("R1")),
            (3, 5.0, StoryStatus::InProgress, Some("R2")),
        ];
        for (id, points, status, release) in stories {
            let story = Story::new(id, points, status, release.map(String::from)).unwrap();
            backlog.push_story(story).unwrap();
        }
        backlog.push_not_assigned();
        backlog
            .push_story(Story::new(4, 8.0, StoryStatus::Planned, None).unwrap())
            .unwrap();

        let summaries = summarize_releases(&backlog);
        let names: Vec<_> = summaries.iter().map(|s| s.release.as_str()).collect();
        assert_eq!(names, vec![NO_RELEASE, "R1", "R2"]);

        let none = &summaries[0];
        assert_eq!(none.total, 8.0);
        assert_eq!(none.scheduled, 0.0);

        let r1 = &summaries[1];
        assert_eq!(r1.stories, 2);
        assert_eq!(r1.total, 3.0);
        assert_eq!(r1.missed, 2.0);
        assert_eq!(r1.remaining(), 0.0);
        assert_eq!(r1.scheduled, 5.0);

        let r2 = &summaries[2];
        assert_eq!(r2.remaining(), 5.0);
    }
}
