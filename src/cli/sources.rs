use super::ui;
use crate::core::config::AppConfig;
use crate::core::manager::SourceManager;
use anyhow::Result;
use comfy_table::Cell;

pub fn run(config: &AppConfig) -> Result<()> {
    let manager = SourceManager::new(config)?;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Type"),
        ui::header_cell("Name"),
        ui::header_cell("Markets"),
        ui::header_cell("US default"),
    ]);
    for info in manager.source_info() {
        let markets = info
            .markets
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            Cell::new(info.source_type),
            Cell::new(info.name),
            Cell::new(markets),
            Cell::new(if info.us_preferred { "yes" } else { "" }),
        ]);
    }
    println!("{table}");
    Ok(())
}
