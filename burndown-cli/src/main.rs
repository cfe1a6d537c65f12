mod cli;
mod prompts;

use anyhow::{Context, Result};
use clap::Parser;
use colored::{ColoredString, Colorize};
use std::path::{Path, PathBuf};

use burndown_core::config::{
    KEY_BACKLOGS, KEY_DATE_FORMAT, KEY_FORECAST_LIMIT, KEY_SPRINT_LENGTH, KEY_SPRINT_START_DAY,
};
use burndown_core::{
    export, get_config_path, next_sprint_marker, summarize_releases, BurndownReport, Cell,
    ExportFormat, ForecastConfig, PropertyStore, ReportRow, SprintStatus, WorkbookStorage,
};

use crate::cli::{Cli, Command, ConfigCommand, SprintCommand};

const KNOWN_KEYS: [&str; 5] = [
    KEY_BACKLOGS,
    KEY_SPRINT_LENGTH,
    KEY_SPRINT_START_DAY,
    KEY_DATE_FORMAT,
    KEY_FORECAST_LIMIT,
];

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => get_config_path()?,
    };

    match &cli.command {
        Command::Config(config_cmd) => {
            handle_config_command(config_cmd, &config_path)?;
        }
        Command::Report {
            backlog,
            release,
            format,
            output,
        } => {
            let config = load_config(&config_path)?;
            let storage = open_workbook(cli.workbook.as_deref())?;
            show_report(
                &storage,
                &config,
                backlog.as_deref(),
                release.as_deref(),
                format,
                output.as_deref(),
            )?;
        }
        Command::Summary => {
            let config = load_config(&config_path)?;
            let storage = open_workbook(cli.workbook.as_deref())?;
            show_summary(&storage, &config)?;
        }
        Command::Releases { backlog } => {
            let config = load_config(&config_path)?;
            let storage = open_workbook(cli.workbook.as_deref())?;
            show_releases(&storage, &config, backlog.as_deref())?;
        }
        Command::Sprint(SprintCommand::Add { backlog }) => {
            let config = load_config(&config_path)?;
            let storage = open_workbook(cli.workbook.as_deref())?;
            add_sprint(&storage, &config, backlog.as_deref())?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

/// Loads and resolves configuration before any backlog is read
fn load_config(path: &Path) -> Result<ForecastConfig> {
    if !path.exists() {
        anyhow::bail!(
            "No configuration found at {:?}. Run `burndown config init` to create one.",
            path
        );
    }

    let store = PropertyStore::load(path)?;
    let config = ForecastConfig::resolve(&store)
        .with_context(|| format!("Invalid configuration in {:?}", path))?;
    Ok(config)
}

fn open_workbook(path: Option<&Path>) -> Result<WorkbookStorage> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::var("BURNDOWN_WORKBOOK")
            .map(PathBuf::from)
            .context("No workbook given. Use --workbook or set BURNDOWN_WORKBOOK.")?,
    };
    Ok(WorkbookStorage::new(path))
}

/// Picks the backlog to work on: the named one, the only one, or a prompt
fn select_backlog(name: Option<&str>, config: &ForecastConfig) -> Result<String> {
    if let Some(name) = name {
        if !config.backlog_names.iter().any(|b| b == name) {
            anyhow::bail!(
                "Backlog '{}' is not configured. Configured backlogs: {}",
                name,
                config.backlog_names.join(", ")
            );
        }
        return Ok(name.to_string());
    }

    if let [only] = config.backlog_names.as_slice() {
        return Ok(only.clone());
    }

    prompts::prompt_select_backlog(&config.backlog_names)
}

fn show_report(
    storage: &WorkbookStorage,
    config: &ForecastConfig,
    backlog_name: Option<&str>,
    release: Option<&str>,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let name = select_backlog(backlog_name, config)?;
    let workbook = storage.load()?;
    let backlog = workbook.backlog(&name, config, release)?;
    let report = BurndownReport::build(&backlog, config);

    if format == "table" {
        if output.is_some() {
            anyhow::bail!("The table format prints to the terminal. Use tsv or markdown for files.");
        }
        print_report_table(&report, release);
        return Ok(());
    }

    let Some(export_format) = ExportFormat::parse(format) else {
        anyhow::bail!(
            "Unknown report format: {}. Supported formats: table, json, yaml, markdown, tsv",
            format
        );
    };

    match output {
        Some(path) => {
            export::export_report(&report, export_format, path)?;
            println!("Exported {} report to {}", export_format, path.display());
        }
        None => print!("{}", export::render(&report, export_format)?),
    }

    Ok(())
}

fn colored_status(status: SprintStatus) -> ColoredString {
    let label = format!("{:<12}", status.to_string());
    match status {
        SprintStatus::Completed => label.green(),
        SprintStatus::Missed => label.red(),
        SprintStatus::InProgress => label.yellow(),
        SprintStatus::Planned => label.normal(),
        SprintStatus::Auto => label.cyan(),
    }
}

fn print_report_table(report: &BurndownReport, release: Option<&str>) {
    let title = match release {
        Some(r) => format!("{} (release {})", report.backlog, r),
        None => report.backlog.clone(),
    };
    println!("{}", title.blue().bold());
    println!(
        "{}: {}",
        "Total points".cyan(),
        Cell::Number(report.total_points)
    );
    println!();

    if report.rows.is_empty() {
        println!("{}", "No sprints to report.".yellow());
        return;
    }

    println!(
        "{:<24} {:<12} {:>9} {:>9} {:>7} {:>11} {:>8} {:>9} {:>9} {:>6}",
        "Sprint".bold(),
        "Status".bold(),
        "Remaining".bold(),
        "Completed".bold(),
        "Missed".bold(),
        "In Progress".bold(),
        "Planned".bold(),
        "Velocity".bold(),
        "Forecast".bold(),
        "Rate".bold()
    );

    for row in &report.rows {
        print_report_row(row);
    }

    println!();
    println!("{}: {}", "Stopped".cyan(), report.termination);
    if let Some(last) = report.last_row() {
        println!("{}: {}", "Last sprint".cyan(), last.full_name);
    }
}

fn print_report_row(row: &ReportRow) {
    let cell = |v: Option<f64>| Cell::from(v).to_string();
    let rate = row
        .completion_rate
        .map(|r| format!("{}%", Cell::Number(r)))
        .unwrap_or_default();

    println!(
        "{:<24} {} {:>9} {:>9} {:>7} {:>11} {:>8} {:>9} {:>9} {:>6}",
        row.full_name,
        colored_status(row.status),
        cell(row.remaining),
        Cell::Number(row.completed).to_string(),
        Cell::Number(row.missed).to_string(),
        Cell::Number(row.in_progress).to_string(),
        Cell::Number(row.planned).to_string(),
        cell(row.average_velocity),
        cell(row.forecast),
        rate
    );
}

fn show_summary(storage: &WorkbookStorage, config: &ForecastConfig) -> Result<()> {
    let workbook = storage.load()?;

    println!("{}", "Backlogs:".blue().bold());
    for name in &config.backlog_names {
        if workbook.rows(name).is_none() {
            println!("  {}: {}", name.cyan(), "missing from workbook".red());
            continue;
        }

        let backlog = workbook.backlog(name, config, None)?;
        let report = BurndownReport::build(&backlog, config);
        let forecast = report.forecast_rows().count();
        let end = report
            .last_row()
            .map(|r| r.full_name.clone())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {}: {} points, {} sprints, {} forecast, ends {} ({})",
            name.cyan(),
            Cell::Number(backlog.total_points()),
            backlog.sprint_count(),
            forecast,
            end,
            report.termination
        );
    }

    Ok(())
}

fn show_releases(
    storage: &WorkbookStorage,
    config: &ForecastConfig,
    backlog_name: Option<&str>,
) -> Result<()> {
    let name = select_backlog(backlog_name, config)?;
    let backlog = storage.load()?.backlog(&name, config, None)?;
    let summaries = summarize_releases(&backlog);

    println!("{}", format!("Releases in {}", name).blue().bold());
    if summaries.is_empty() {
        println!("{}", "No stories found.".yellow());
        return Ok(());
    }

    println!(
        "{:<16} {:>7} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "Release".bold(),
        "Stories".bold(),
        "Points".bold(),
        "Completed".bold(),
        "Remaining".bold(),
        "Scheduled".bold(),
        "Missed".bold()
    );
    for s in &summaries {
        println!(
            "{:<16} {:>7} {:>9} {:>9} {:>9} {:>9} {:>9}",
            s.release,
            s.stories,
            Cell::Number(s.total).to_string(),
            Cell::Number(s.completed).to_string(),
            Cell::Number(s.remaining()).to_string(),
            Cell::Number(s.scheduled).to_string(),
            Cell::Number(s.missed).to_string()
        );
    }

    Ok(())
}

fn add_sprint(
    storage: &WorkbookStorage,
    config: &ForecastConfig,
    backlog_name: Option<&str>,
) -> Result<()> {
    let name = select_backlog(backlog_name, config)?;
    let today = chrono::Local::now().date_naive();

    let marker = storage.update_atomically(|workbook| {
        let backlog = workbook.backlog(&name, config, None)?;
        let marker = next_sprint_marker(&backlog, config, today);
        workbook.insert_sprint_marker(&name, &marker)?;
        Ok(marker)
    })?;

    println!("{}", "Sprint added successfully!".green());
    println!("{}: {} ({})", name.cyan(), marker.text, marker.criteria);
    Ok(())
}

fn handle_config_command(cmd: &ConfigCommand, path: &Path) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            if !path.exists() {
                println!("No configuration at {}", path.display());
                println!("Run `burndown config init` to create one.");
                return Ok(());
            }
            let store = PropertyStore::load(path)?;

            println!("{} {}", "Configuration:".blue().bold(), path.display());
            println!();
            for (key, value) in store.iter() {
                println!("{}: {}", key.cyan(), value);
            }

            println!();
            match ForecastConfig::resolve(&store) {
                Ok(config) => println!(
                    "{} {} backlog(s), {}-day sprints starting {}",
                    "Valid:".green(),
                    config.backlog_names.len(),
                    config.sprint_length_days,
                    config.sprint_start_day
                ),
                Err(e) => println!("{} {}", "Invalid:".red(), e),
            }
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration already exists at {:?}. Use --force to overwrite.",
                    path
                );
            }
            PropertyStore::with_defaults().save(path)?;
            println!("{} {}", "Configuration written to".green(), path.display());
        }
        ConfigCommand::Set { key, value } => {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                anyhow::bail!(
                    "Unknown configuration key: {}. Known keys: {}",
                    key,
                    KNOWN_KEYS.join(", ")
                );
            }
            let mut store = load_store_or_default(path)?;
            store.set(key, value);
            if let Err(e) = ForecastConfig::resolve(&store) {
                log::warn!("Configuration is not usable yet: {}", e);
            }
            store.save(path)?;
            println!("{} = {}", key.cyan(), value);
        }
        ConfigCommand::Unset { key } => {
            let mut store = load_store_or_default(path)?;
            if store.remove(key).is_none() {
                anyhow::bail!("Configuration key not set: {}", key);
            }
            store.save(path)?;
            println!("Removed {}", key.cyan());
        }
    }

    Ok(())
}

fn load_store_or_default(path: &Path) -> Result<PropertyStore> {
    if path.exists() {
        PropertyStore::load(path)
    } else {
        Ok(PropertyStore::new())
    }
}
