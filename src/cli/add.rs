use crate::core::config::AppConfig;
use crate::core::manager::SourceManager;
use crate::core::quote::Market;
use crate::store::Database;
use anyhow::{Result, bail};
use tracing::info;

pub fn stock(config: &AppConfig, code: &str, name: &str, market: Option<Market>) -> Result<()> {
    let code = normalize_code(code);
    let market = market.unwrap_or_else(|| SourceManager::infer_market(&code));
    if market == Market::Unknown {
        bail!("Cannot infer the market of {code}; pass --market");
    }
    let store = Database::new(config.database_path()?).connect()?;
    let id = store.add_stock(&code, name, market)?;
    info!("Added stock {} as id {}", code, id);
    println!("Added stock {code} [{market}]");
    Ok(())
}

pub fn fund(config: &AppConfig, code: &str, name: &str, market: Option<Market>) -> Result<()> {
    let code = normalize_code(code);
    let store = Database::new(config.database_path()?).connect()?;
    let id = store.add_fund(&code, name, market)?;
    info!("Added fund {} as id {}", code, id);
    println!("Added fund {code}");
    Ok(())
}

pub fn currency(config: &AppConfig, code: &str) -> Result<()> {
    let store = Database::new(config.database_path()?).connect()?;
    let id = store.add_currency(code)?;
    info!("Added currency {} as id {}", code, id);
    println!("Added currency {}", code.trim().to_uppercase());
    Ok(())
}

/// US tickers are stored upper-cased; numeric codes are left alone.
fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
