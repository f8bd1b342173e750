use super::ui;
use crate::core::config::AppConfig;
use crate::core::quote::EntityKind;
use crate::store::Database;
use anyhow::Result;
use comfy_table::Cell;

/// Prints the latest stored observation for every entity of `kind`.
pub fn run(config: &AppConfig, kind: EntityKind) -> Result<()> {
    let store = Database::new(config.database_path()?).connect()?;
    let entities = store.entities(kind)?;
    if entities.is_empty() {
        println!("No {kind} entities tracked yet. Add some with `holdings add {kind}`.");
        return Ok(());
    }

    let value_header = match kind {
        EntityKind::Stock => "Close",
        EntityKind::Fund => "NAV",
        EntityKind::Currency => "Rate (CNY)",
    };
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Market"),
        ui::header_cell("Date"),
        ui::header_cell(value_header),
    ]);

    for entity in &entities {
        let latest = store.latest_for(entity)?;
        table.add_row(vec![
            Cell::new(&entity.code),
            Cell::new(&entity.name),
            Cell::new(entity.market.map(|m| m.to_string()).unwrap_or_default()),
            ui::format_optional_cell(latest.as_ref().map(|o| o.date), |d| d.to_string()),
            ui::format_optional_cell(latest.as_ref().map(|o| o.value), |v| v.to_string()),
        ]);
    }

    println!(
        "\n{}",
        ui::style_text(&format!("Latest {kind} values"), ui::StyleType::Title)
    );
    println!("{table}");
    Ok(())
}
