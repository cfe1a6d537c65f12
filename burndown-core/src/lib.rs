pub mod backlog;
pub mod config;
pub mod error;
pub mod export;
pub mod forecast;
pub mod models;
pub mod planning;
pub mod releases;
pub mod report;
pub mod rows;
pub mod storage;

// Re-export commonly used types
pub use backlog::Backlog;
pub use config::{get_config_path, ConfigProvider, ForecastConfig, PropertyStore};
pub use error::{BurndownError, ConfigError, ParseError, StateError, ValidationError};
pub use export::ExportFormat;
pub use forecast::{Forecast, ForecastStep, SprintSnapshot, Termination};
pub use models::{PointTotals, Sprint, SprintStatus, Story, StoryStatus};
pub use planning::next_sprint_marker;
pub use releases::{summarize_releases, ReleaseSummary};
pub use report::{BurndownReport, Cell, ReportRow};
pub use rows::{BacklogBuilder, RowKind, RowRecord};
pub use storage::{Workbook, WorkbookFormat, WorkbookStorage};
