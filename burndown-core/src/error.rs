//! Error types for the burndown core
//!
//! The engine itself never panics on bad data: every failure mode of
//! building a backlog or resolving configuration surfaces as one of these.

use thiserror::Error;

/// Story data that cannot be accepted
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Story {id} has negative points: {points}")]
    NegativePoints { id: i64, points: f64 },

    #[error("Story {id} has non-finite points")]
    NonFinitePoints { id: i64 },
}

/// Text that cannot be parsed into a model value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Sprint name must start with \"Sprint \": {0:?}")]
    MissingSprintPrefix(String),

    #[error("Sprint name has no numeric part: {0:?}")]
    InvalidSprintNumber(String),

    #[error("Invalid start date {value:?} for {sprint} (expected format {format})")]
    InvalidStartDate {
        sprint: String,
        value: String,
        format: String,
    },

    #[error("Invalid points {value:?} for story {id}")]
    InvalidPoints { id: i64, value: String },
}

/// Backlog operations invoked in the wrong order
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("Story {0} pushed before any sprint was started")]
    NoCurrentSprint(i64),
}

/// Missing or invalid configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Configuration value '{0}' is not set")]
    Missing(&'static str),

    #[error("Configuration value '{key}' is invalid: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Any error raised while turning rows into a burndown report
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BurndownError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
