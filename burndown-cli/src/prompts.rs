use anyhow::Result;
use inquire::Select;

/// Prompts the user to pick one of the configured backlogs
pub fn prompt_select_backlog(names: &[String]) -> Result<String> {
    if names.is_empty() {
        anyhow::bail!("No backlogs configured");
    }

    let selection = Select::new("Select a backlog:", names.to_vec()).prompt()?;
    Ok(selection)
}
