use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backlog::Backlog;
use crate::config::ForecastConfig;
use crate::rows::{BacklogBuilder, RowKind, RowRecord};

/// A raw sheet cell as exported by the spreadsheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{:.0}", f),
            CellValue::Float(f) => f.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

/// Sheet name used when a file name gives none
pub const DEFAULT_SHEET: &str = "Backlog";

type SheetRows = Vec<Vec<Option<CellValue>>>;

/// Named sheets of rows, one sheet per backlog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    #[serde(default)]
    pub sheets: BTreeMap<String, SheetRows>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.keys().map(|k| k.as_str()).collect()
    }

    /// Rows of a sheet with every cell rendered as text
    pub fn rows(&self, sheet: &str) -> Option<Vec<RowRecord>> {
        self.sheets.get(sheet).map(|rows| {
            rows.iter()
                .map(|cells| {
                    let text: Vec<String> = cells
                        .iter()
                        .map(|c| c.as_ref().map(CellValue::as_text).unwrap_or_default())
                        .collect();
                    RowRecord::from_cells(&text)
                })
                .collect()
        })
    }

    /// Builds the backlog stored in a sheet
    pub fn backlog(
        &self,
        sheet: &str,
        config: &ForecastConfig,
        release: Option<&str>,
    ) -> Result<Backlog> {
        let rows = self
            .rows(sheet)
            .with_context(|| format!("Sheet not found: {}", sheet))?;

        let backlog = BacklogBuilder::new(config)
            .release(release)
            .build(sheet, &rows)
            .with_context(|| format!("Failed to read backlog {}", sheet))?;
        Ok(backlog)
    }

    /// Inserts a sprint marker just before the "Not Assigned" marker,
    /// or at the end of the sheet when there is none
    pub fn insert_sprint_marker(&mut self, sheet: &str, marker: &RowRecord) -> Result<()> {
        let rows = self
            .rows(sheet)
            .with_context(|| format!("Sheet not found: {}", sheet))?;

        let position = rows
            .iter()
            .position(|r| r.classify() == RowKind::NotAssignedMarker)
            .unwrap_or(rows.len());

        if let Some(cells) = self.sheets.get_mut(sheet) {
            cells.insert(position, record_cells(marker));
        }
        Ok(())
    }

    /// Parses tab-separated text as a single sheet. Cells are kept as written,
    /// including columns past the status column, so the sheet can be written
    /// back unchanged.
    pub fn from_tsv(sheet: &str, content: &str) -> Self {
        let rows: SheetRows = content
            .lines()
            .map(|line| {
                line.split('\t')
                    .map(|c| (!c.is_empty()).then(|| CellValue::Text(c.to_string())))
                    .collect()
            })
            .collect();

        let mut workbook = Self::new();
        workbook.sheets.insert(sheet.to_string(), rows);
        workbook
    }

    /// Renders a single-sheet workbook as tab-separated text
    pub fn to_tsv(&self) -> Result<String> {
        if self.sheets.len() > 1 {
            anyhow::bail!(
                "A tab-separated file holds one sheet, workbook has {}",
                self.sheets.len()
            );
        }

        let mut out = String::new();
        if let Some(rows) = self.sheets.values().next() {
            for cells in rows {
                let line: Vec<String> = cells
                    .iter()
                    .map(|c| c.as_ref().map(CellValue::as_text).unwrap_or_default())
                    .collect();
                out.push_str(&line.join("\t"));
                out.push('\n');
            }
        }
        Ok(out)
    }
}

fn record_cells(row: &RowRecord) -> Vec<Option<CellValue>> {
    row.cells()
        .iter()
        .map(|c| (!c.is_empty()).then(|| CellValue::Text(c.to_string())))
        .collect()
}

/// On-disk encodings of a workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    Yaml,
    Json,
    Tsv,
}

impl WorkbookFormat {
    /// Infer from the file extension, defaulting to YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => WorkbookFormat::Json,
            Some("tsv") | Some("txt") => WorkbookFormat::Tsv,
            _ => WorkbookFormat::Yaml,
        }
    }
}

/// Loads and saves a workbook with file locking, so that a report is never
/// built from a half-written workbook
pub struct WorkbookStorage {
    file_path: PathBuf,
    lock_file_path: PathBuf,
    format: WorkbookFormat,
}

impl WorkbookStorage {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let lock_file_path = match file_path.extension().and_then(|e| e.to_str()) {
            Some(ext) => file_path.with_extension(format!("{}.lock", ext)),
            None => file_path.with_extension("lock"),
        };
        let format = WorkbookFormat::from_path(&file_path);
        Self {
            file_path,
            lock_file_path,
            format,
        }
    }

    /// Returns the path to the workbook file
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn format(&self) -> WorkbookFormat {
        self.format
    }

    /// Acquire an exclusive lock for writing. The returned handle must be
    /// held for the duration of the write.
    fn acquire_write_lock(&self) -> Result<File> {
        if let Some(parent) = self.lock_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to create lock file: {:?}", self.lock_file_path))?;

        self.wait_for_lock(|| FileExt::try_lock_exclusive(&lock_file))?;

        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        Ok(lock_file)
    }

    /// Acquire a shared lock for reading, if anyone has ever written a lock file
    fn acquire_read_lock(&self) -> Result<Option<File>> {
        if !self.lock_file_path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_file_path))?;

        self.wait_for_lock(|| FileExt::try_lock_shared(&lock_file))?;
        Ok(Some(lock_file))
    }

    fn wait_for_lock<F>(&self, mut try_lock: F) -> Result<()>
    where
        F: FnMut() -> std::io::Result<()>,
    {
        let start = std::time::Instant::now();
        let timeout = Duration::from_secs(5);

        loop {
            match try_lock() {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > timeout {
                        anyhow::bail!(
                            "Timeout waiting for file lock - another process is writing: {:?}",
                            self.file_path
                        );
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire lock on {:?}", self.lock_file_path)
                    })
                }
            }
        }
    }

    /// Loads the workbook under a shared lock
    pub fn load(&self) -> Result<Workbook> {
        let _lock = self.acquire_read_lock()?;
        self.read()
    }

    /// Saves the workbook under an exclusive lock
    pub fn save(&self, workbook: &Workbook) -> Result<()> {
        let _lock = self.acquire_write_lock()?;
        self.write(workbook)
    }

    /// Reloads, applies `update_fn` and saves while holding the write lock
    pub fn update_atomically<F, T>(&self, update_fn: F) -> Result<T>
    where
        F: FnOnce(&mut Workbook) -> Result<T>,
    {
        let _lock = self.acquire_write_lock()?;
        let mut workbook = self.read()?;
        let result = update_fn(&mut workbook)?;
        self.write(&workbook)?;
        Ok(result)
    }

    fn read(&self) -> Result<Workbook> {
        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to open workbook: {:?}", self.file_path))?;

        let workbook = match self.format {
            WorkbookFormat::Yaml => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML from {:?}", self.file_path))?,
            WorkbookFormat::Json => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON from {:?}", self.file_path))?,
            WorkbookFormat::Tsv => Workbook::from_tsv(&self.sheet_name_from_path(), &content),
        };
        Ok(workbook)
    }

    fn write(&self, workbook: &Workbook) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = match self.format {
            WorkbookFormat::Yaml => serde_yaml::to_string(workbook)?,
            WorkbookFormat::Json => serde_json::to_string_pretty(workbook)?,
            WorkbookFormat::Tsv => workbook.to_tsv()?,
        };
        fs::write(&self.file_path, content)
            .with_context(|| format!("Failed to write workbook: {:?}", self.file_path))?;
        Ok(())
    }

    /// A tab-separated file is one sheet named after the file stem
    pub fn sheet_name_from_path(&self) -> String {
        self.file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(DEFAULT_SHEET)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropertyStore;
    use crate::models::{SprintStatus, NOT_ASSIGNED};
    use tempfile::TempDir;

    const SAMPLE_YAML: &str = r#"
sheets:
  Product:
    - [ID, Theme, Story, Criteria, Points, Comment, Release, Status]
    - [null, null, Sprint 1, "2024-01-01", null, null, null, Completed]
    - [1, Login, Log in, null, 3, null, R1, Completed]
    - [2, Login, Log out, null, 2.5, null, 1.0, Missed]
    - [null, null, Not Assigned]
    - [3, Search, Search, null, 8, null, R2, null]
"#;

    #[test]
    fn test_workbook_rows_from_yaml() {
        let workbook: Workbook = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Product"]);

        let rows = workbook.rows("Product").unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[1].text, "Sprint 1");
        assert_eq!(rows[1].criteria, "2024-01-01");
        assert_eq!(rows[2].id, "1");
        assert_eq!(rows[3].points, "2.5");
        assert_eq!(rows[3].release, "1");
        assert_eq!(rows[5].status, "");
        assert!(workbook.rows("Missing").is_none());
    }

    #[test]
    fn test_workbook_backlog() {
        let workbook: Workbook = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        let config = ForecastConfig::resolve(&PropertyStore::with_defaults()).unwrap();

        let backlog = workbook.backlog("Product", &config, None).unwrap();
        assert_eq!(backlog.sprint_count(), 1);
        assert_eq!(backlog.total_points(), 11.0);

        let r1 = workbook.backlog("Product", &config, Some("R1")).unwrap();
        assert_eq!(r1.total_points(), 3.0);

        assert!(workbook.backlog("Missing", &config, None).is_err());
    }

    #[test]
    fn test_insert_sprint_marker_before_not_assigned() {
        let mut workbook: Workbook = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        let marker = RowRecord::sprint_marker("Sprint 2", Some("2024-01-15"), SprintStatus::Planned);
        workbook.insert_sprint_marker("Product", &marker).unwrap();

        let rows = workbook.rows("Product").unwrap();
        assert_eq!(rows[4].text, "Sprint 2");
        assert_eq!(rows[5].text, NOT_ASSIGNED);

        assert!(workbook.insert_sprint_marker("Missing", &marker).is_err());
    }

    #[test]
    fn test_yaml_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = WorkbookStorage::new(dir.path().join("backlog.yaml"));
        assert_eq!(storage.format(), WorkbookFormat::Yaml);

        let workbook: Workbook = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        storage.save(&workbook).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.rows("Product"), workbook.rows("Product"));
    }

    #[test]
    fn test_json_storage_update_atomically() {
        let dir = TempDir::new().unwrap();
        let storage = WorkbookStorage::new(dir.path().join("backlog.json"));
        assert_eq!(storage.format(), WorkbookFormat::Json);

        let workbook: Workbook = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        storage.save(&workbook).unwrap();

        let count = storage
            .update_atomically(|wb| {
                let marker = RowRecord::sprint_marker("Sprint 2", None, SprintStatus::Planned);
                wb.insert_sprint_marker("Product", &marker)?;
                Ok(wb.rows("Product").map(|r| r.len()).unwrap_or(0))
            })
            .unwrap();
        assert_eq!(count, 7);

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.rows("Product").unwrap()[4].text, "Sprint 2");
    }

    #[test]
    fn test_tsv_storage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Platform.tsv");
        fs::write(
            &path,
            "ID\tTheme\tStory\n\t\tSprint 1\t2024-01-01\n7\tOps\tDeploy\t\t5\t\t\tPlanned\n",
        )
        .unwrap();

        let storage = WorkbookStorage::new(&path);
        let workbook = storage.load().unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Platform"]);

        let rows = workbook.rows("Platform").unwrap();
        assert_eq!(rows[2].id, "7");
        assert_eq!(rows[2].points, "5");
        assert_eq!(rows[2].status, "Planned");

        storage.save(&workbook).unwrap();
        assert_eq!(storage.load().unwrap().rows("Platform"), Some(rows));
    }

    #[test]
    fn test_tsv_update_keeps_extra_columns_and_spacing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Ops.tsv");
        fs::write(
            &path,
            "\t\tSprint 1\t2024-01-01\t\t\t\tCompleted\n\
             7\tOps\tDeploy \t\t5\t\t\tPlanned\towner=alice\n\
             \t\tNot Assigned\n",
        )
        .unwrap();

        let storage = WorkbookStorage::new(&path);
        storage
            .update_atomically(|wb| {
                let marker = RowRecord::sprint_marker("Sprint 2", Some("2024-01-15"), SprintStatus::Planned);
                wb.insert_sprint_marker("Ops", &marker)
            })
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "7\tOps\tDeploy \t\t5\t\t\tPlanned\towner=alice");
        assert_eq!(lines[2], "\t\tSprint 2\t2024-01-15\t\t\t\t");
        assert_eq!(lines[3], "\t\tNot Assigned");

        // the extra column does not reach the backlog row
        let rows = storage.load().unwrap().rows("Ops").unwrap();
        assert_eq!(rows[1].text, "Deploy");
        assert_eq!(rows[1].status, "Planned");
    }

    #[test]
    fn test_missing_workbook_fails() {
        let dir = TempDir::new().unwrap();
        let storage = WorkbookStorage::new(dir.path().join("absent.yaml"));
        assert!(storage.load().is_err());
    }
}
