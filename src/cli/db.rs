use super::ui;
use crate::core::config::AppConfig;
use crate::store::Database;
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

/// Creates the database file and schema if missing.
pub fn init(config: &AppConfig) -> Result<()> {
    let database = Database::new(config.database_path()?);
    database.initialize()?;
    println!("Database ready at {}", database.path().display());
    Ok(())
}

pub fn backup(config: &AppConfig) -> Result<()> {
    let store = Database::new(config.database_path()?).connect()?;
    let target = store.backup(&config.backup_dir()?)?;
    println!("Backed up to {}", target.display());
    Ok(())
}

pub fn status(config: &AppConfig) -> Result<()> {
    let database = Database::new(config.database_path()?);
    let store = database.connect()?;
    let size = std::fs::metadata(database.path())?.len();

    println!(
        "{} {}",
        ui::style_text("Database:", ui::StyleType::TotalLabel),
        database.path().display()
    );
    println!(
        "{}",
        ui::style_text(&format!("{:.1} KiB", size as f64 / 1024.0), ui::StyleType::Subtle)
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Table"), ui::header_cell("Rows")]);
    for (name, count) in store.table_counts()? {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(count).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");
    Ok(())
}
