use super::{select, ui};
use crate::core::config::AppConfig;
use crate::core::fetcher::{BatchReport, FetchAllReport, Fetcher};
use crate::core::manager::SourceManager;
use crate::core::source::DataSourceType;
use crate::store::Database;
use anyhow::Result;
use comfy_table::Color;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FetchTarget {
    /// Every tracked stock
    Stocks,
    /// Only stocks listed in the US
    UsStocks,
    Funds,
    /// Exchange rates to CNY
    Rates,
    /// Backup, then stocks, funds and rates
    All,
}

impl FetchTarget {
    /// Whether the batch can route through the US source: US stocks, and US
    /// funds priced on the equity path.
    fn routes_us(self) -> bool {
        matches!(
            self,
            FetchTarget::Stocks | FetchTarget::UsStocks | FetchTarget::Funds | FetchTarget::All
        )
    }
}

pub async fn run(config: &AppConfig, target: FetchTarget, us_source: Option<DataSourceType>) -> Result<()> {
    let mut manager = SourceManager::new(config)?;
    if target.routes_us() {
        let preference = match us_source {
            Some(source) => Some(source),
            None => select::prompt_us_source(&manager)?,
        };
        if let Some(source) = preference {
            manager.set_us_source(source)?;
        }
    }

    let fetcher = Fetcher::new(
        Arc::new(manager),
        Database::new(config.database_path()?),
        config.backup_dir()?,
        config.fetch.clone(),
    )
    .with_progress(Arc::new(ui::BatchProgressBar::default()));

    info!("Running {:?} fetch", target);
    match target {
        FetchTarget::Stocks => print_batches(&[&fetcher.fetch_stock_prices().await?]),
        FetchTarget::UsStocks => print_batches(&[&fetcher.fetch_us_stock_prices().await?]),
        FetchTarget::Funds => print_batches(&[&fetcher.fetch_fund_navs().await?]),
        FetchTarget::Rates => print_batches(&[&fetcher.fetch_exchange_rates().await?]),
        FetchTarget::All => {
            let report = fetcher.fetch_all().await;
            print_all(&report);
            let aborted = report.aborted();
            if !aborted.is_empty() {
                let kinds: Vec<String> = aborted.iter().map(|k| k.to_string()).collect();
                anyhow::bail!("Batches could not run: {}", kinds.join(", "));
            }
        }
    }
    Ok(())
}

fn print_batches(reports: &[&BatchReport]) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Batch"),
        ui::header_cell("Inserted"),
        ui::header_cell("Skipped"),
        ui::header_cell("Failed"),
        ui::header_cell("Total"),
    ]);
    for report in reports {
        if let Some(error) = &report.error {
            table.add_row(vec![
                comfy_table::Cell::new(report.kind),
                comfy_table::Cell::new(format!("aborted: {error}")).fg(Color::Red),
            ]);
            continue;
        }
        table.add_row(vec![
            comfy_table::Cell::new(report.kind),
            ui::count_cell(report.inserted, Color::Green),
            ui::count_cell(report.skipped, Color::Yellow),
            ui::count_cell(report.failure_count(), Color::Red),
            ui::count_cell(report.total(), Color::Reset),
        ]);
    }
    println!("{table}");

    let failed: Vec<String> = reports
        .iter()
        .flat_map(|r| r.failed.iter().map(|e| e.label()))
        .collect();
    if !failed.is_empty() {
        println!("\n{}", ui::style_text("Failed", ui::StyleType::Error));
        for label in failed {
            println!("  {label}");
        }
    }
}

fn print_all(report: &FetchAllReport) {
    match &report.backup {
        Some(path) => println!(
            "{}",
            ui::style_text(&format!("Backup: {}", path.display()), ui::StyleType::Subtle)
        ),
        None => println!(
            "{}",
            ui::style_text("Backup failed, see log", ui::StyleType::Error)
        ),
    }
    print_batches(&report.batches());
    println!(
        "\n{} {}",
        ui::style_text("Succeeded:", ui::StyleType::TotalLabel),
        ui::style_text(&report.success_count().to_string(), ui::StyleType::TotalValue)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_us_routed_targets() {
        assert!(FetchTarget::Stocks.routes_us());
        assert!(FetchTarget::UsStocks.routes_us());
        assert!(FetchTarget::Funds.routes_us());
        assert!(FetchTarget::All.routes_us());
        assert!(!FetchTarget::Rates.routes_us());
    }
}
