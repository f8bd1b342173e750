pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

pub use crate::core::config;

use crate::cli::fetch::FetchTarget;
use crate::core::quote::{EntityKind, Market};
use crate::core::source::DataSourceType;
use anyhow::Result;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Write the example configuration and create the database.
    Setup,
    Fetch {
        target: FetchTarget,
        us_source: Option<DataSourceType>,
    },
    Show(EntityKind),
    AddStock {
        code: String,
        name: String,
        market: Option<Market>,
    },
    AddFund {
        code: String,
        name: String,
        market: Option<Market>,
    },
    AddCurrency(String),
    Sources,
    DbInit,
    DbBackup,
    DbStatus,
}

fn load_config(config_path: Option<&str>) -> Result<config::AppConfig> {
    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Running {:?}", command);
    match command {
        // Runs before any configuration exists
        AppCommand::Setup => cli::setup::run(config_path),
        AppCommand::Fetch { target, us_source } => {
            cli::fetch::run(&load_config(config_path)?, target, us_source).await
        }
        AppCommand::Show(kind) => cli::show::run(&load_config(config_path)?, kind),
        AppCommand::AddStock { code, name, market } => {
            cli::add::stock(&load_config(config_path)?, &code, &name, market)
        }
        AppCommand::AddFund { code, name, market } => {
            cli::add::fund(&load_config(config_path)?, &code, &name, market)
        }
        AppCommand::AddCurrency(code) => cli::add::currency(&load_config(config_path)?, &code),
        AppCommand::Sources => cli::sources::run(&load_config(config_path)?),
        AppCommand::DbInit => cli::db::init(&load_config(config_path)?),
        AppCommand::DbBackup => cli::db::backup(&load_config(config_path)?),
        AppCommand::DbStatus => cli::db::status(&load_config(config_path)?),
    }
}
