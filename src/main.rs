use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use holdings::AppCommand;
use holdings::cli::fetch::FetchTarget;
use holdings::core::log::init_logging;
use holdings::core::quote::{EntityKind, Market};
use holdings::core::source::DataSourceType;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration and database
    Setup,
    /// Fetch latest prices, NAVs or exchange rates and store them
    Fetch {
        #[arg(value_enum)]
        target: FetchTarget,
        /// Data source for US stocks (akshare, yfinance, alpha_vantage); asked interactively if omitted
        #[arg(long)]
        us_source: Option<DataSourceType>,
    },
    /// Display the latest stored values
    Show {
        #[arg(value_enum)]
        kind: ShowKind,
    },
    /// Track a new stock, fund or currency
    Add {
        #[command(subcommand)]
        entity: AddCommand,
    },
    /// List available data sources
    Sources,
    /// Database maintenance
    Db {
        #[command(subcommand)]
        action: DbCommand,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ShowKind {
    Stocks,
    Funds,
    Rates,
}

#[derive(Subcommand)]
enum AddCommand {
    Stock {
        code: String,
        #[arg(short, long, default_value = "")]
        name: String,
        /// SH, SZ, BJ, US or HK; inferred from the code when omitted
        #[arg(short, long)]
        market: Option<Market>,
    },
    Fund {
        code: String,
        #[arg(short, long, default_value = "")]
        name: String,
        #[arg(short, long)]
        market: Option<Market>,
    },
    Currency {
        /// ISO code such as USD
        code: String,
    },
}

#[derive(Subcommand)]
enum DbCommand {
    /// Create the database schema
    Init,
    /// Copy the database into the backup directory
    Backup,
    /// Show row counts
    Status,
}

impl From<Commands> for AppCommand {
    fn from(cmd: Commands) -> AppCommand {
        match cmd {
            Commands::Setup => AppCommand::Setup,
            Commands::Fetch { target, us_source } => AppCommand::Fetch { target, us_source },
            Commands::Show { kind } => AppCommand::Show(match kind {
                ShowKind::Stocks => EntityKind::Stock,
                ShowKind::Funds => EntityKind::Fund,
                ShowKind::Rates => EntityKind::Currency,
            }),
            Commands::Add { entity } => match entity {
                AddCommand::Stock { code, name, market } => AppCommand::AddStock { code, name, market },
                AddCommand::Fund { code, name, market } => AppCommand::AddFund { code, name, market },
                AddCommand::Currency { code } => AppCommand::AddCurrency(code),
            },
            Commands::Sources => AppCommand::Sources,
            Commands::Db { action } => match action {
                DbCommand::Init => AppCommand::DbInit,
                DbCommand::Backup => AppCommand::DbBackup,
                DbCommand::Status => AppCommand::DbStatus,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(cmd) => holdings::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
