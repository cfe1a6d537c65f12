//! Backlog: the ordered sprints of one project track plus its unscheduled stories

use crate::error::StateError;
use crate::models::{Sprint, Story, StoryStatus};

/// Which sprint receives the next pushed story
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Sprint(usize),
    NotAssigned,
}

#[derive(Debug, Clone)]
pub struct Backlog {
    name: String,
    sprints: Vec<Sprint>,
    not_assigned: Option<Sprint>,
    current: Option<Cursor>,
    total_points: f64,
}

impl Backlog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sprints: Vec::new(),
            not_assigned: None,
            current: None,
            total_points: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a sprint and makes it the target of subsequent story pushes
    pub fn push_sprint(&mut self, mut sprint: Sprint) {
        let index = self.sprints.len();
        sprint.attach(&self.name, index);
        log::debug!("{}: sprint {} at index {}", self.name, sprint.name(), index);
        self.sprints.push(sprint);
        self.current = Some(Cursor::Sprint(index));
    }

    /// Creates the "Not Assigned" sprint and makes it current. A second
    /// marker re-selects the existing one so there is only ever one.
    pub fn push_not_assigned(&mut self) {
        if self.not_assigned.is_some() {
            log::warn!("{}: repeated \"Not Assigned\" marker", self.name);
        } else {
            self.not_assigned = Some(Sprint::not_assigned());
        }
        self.current = Some(Cursor::NotAssigned);
    }

    /// Routes a story to the current sprint and records its sprint number
    pub fn push_story(&mut self, mut story: Story) -> Result<(), StateError> {
        let sprint = match self.current {
            Some(Cursor::Sprint(i)) => &mut self.sprints[i],
            Some(Cursor::NotAssigned) => match self.not_assigned.as_mut() {
                Some(sprint) => sprint,
                None => return Err(StateError::NoCurrentSprint(story.id())),
            },
            None => return Err(StateError::NoCurrentSprint(story.id())),
        };

        story.assign_sprint(sprint.number());
        if story.status() != StoryStatus::Missed {
            self.total_points += story.points();
        }
        sprint.push(story);
        Ok(())
    }

    /// Sprint at position `i`, if any
    pub fn get_sprint(&self, i: usize) -> Option<&Sprint> {
        self.sprints.get(i)
    }

    pub fn sprints(&self) -> &[Sprint] {
        &self.sprints
    }

    pub fn sprint_count(&self) -> usize {
        self.sprints.len()
    }

    pub fn not_assigned(&self) -> Option<&Sprint> {
        self.not_assigned.as_ref()
    }

    /// Points of every pushed story that was not missed
    pub fn total_points(&self) -> f64 {
        self.total_points
    }

    /// All stories, dated sprints first, then the unassigned ones
    pub fn stories(&self) -> impl Iterator<Item = &Story> {
        self.sprints
            .iter()
            .chain(self.not_assigned.iter())
            .flat_map(|s| s.stories().iter())
    }

    /// The last dated sprint, used when planning the next one
    pub fn last_sprint(&self) -> Option<&Sprint> {
        self.sprints.last()
    }
}
