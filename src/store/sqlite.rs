//! SQLite persistence for tracked entities and their daily observations.

use crate::core::quote::{Entity, EntityKind, Market, Quote};
use crate::store::{InsertOutcome, Observation};
use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use rusqlite::{Connection, DatabaseName, OpenFlags, OptionalExtension, params};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS market (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS stock (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    market_id INTEGER NOT NULL REFERENCES market(id),
    UNIQUE(code, market_id)
);
CREATE TABLE IF NOT EXISTS fund (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL DEFAULT '',
    market_id INTEGER REFERENCES market(id)
);
CREATE TABLE IF NOT EXISTS foreign_exchange (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    currency TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS stock_net_asset_value (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stock_id INTEGER NOT NULL REFERENCES stock(id),
    date TEXT NOT NULL,
    nav TEXT NOT NULL,
    UNIQUE(stock_id, date)
);
CREATE TABLE IF NOT EXISTS fund_net_asset_value (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fund_id INTEGER NOT NULL REFERENCES fund(id),
    date TEXT NOT NULL,
    nav TEXT NOT NULL,
    UNIQUE(fund_id, date)
);
CREATE TABLE IF NOT EXISTS foreign_exchange_rate (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    currency_id INTEGER NOT NULL REFERENCES foreign_exchange(id),
    date TEXT NOT NULL,
    rate TEXT NOT NULL,
    UNIQUE(currency_id, date)
);
"#;

const MARKETS: [(&str, &str); 6] = [
    ("SH", "Shanghai Stock Exchange"),
    ("SZ", "Shenzhen Stock Exchange"),
    ("BJ", "Beijing Stock Exchange"),
    ("US", "US Markets"),
    ("HK", "Hong Kong Stock Exchange"),
    ("OF", "Off-exchange Funds"),
];

/// Tables reported by `db status`, in display order.
pub const TABLES: [&str; 7] = [
    "market",
    "stock",
    "fund",
    "foreign_exchange",
    "stock_net_asset_value",
    "fund_net_asset_value",
    "foreign_exchange_rate",
];

/// Location of the database file. Every batch opens its own [`Store`].
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Database { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the file, schema and market rows. Safe to run repeatedly.
    pub fn initialize(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to create database {}", self.path.display()))?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create database schema")?;
        for (code, name) in MARKETS {
            conn.execute(
                "INSERT OR IGNORE INTO market (code, name) VALUES (?1, ?2)",
                params![code, name],
            )?;
        }
        conn.execute(
            "INSERT OR IGNORE INTO foreign_exchange (currency) VALUES ('CNY')",
            [],
        )?;
        info!("Initialized database at {}", self.path.display());
        Ok(())
    }

    /// Opens an existing database; a missing file is an error rather than a new empty store.
    pub fn connect(&self) -> Result<Store> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| {
            format!(
                "Failed to open database {} (run `holdings setup` first)",
                self.path.display()
            )
        })?;
        debug!("Connected to {}", self.path.display());
        Ok(Store { conn })
    }
}

pub struct Store {
    conn: Connection,
}

fn parse_market(code: Option<String>) -> Option<Market> {
    code.and_then(|c| Market::from_str(&c).ok())
}

fn observation(date: &str, value: &str) -> Result<Observation> {
    Ok(Observation {
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("Invalid stored date: {date}"))?,
        value: Decimal::from_str(value).with_context(|| format!("Invalid stored value: {value}"))?,
    })
}

impl Store {
    fn securities(&self, sql: &str, kind: EntityKind) -> Result<Vec<Entity>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(Entity {
                id: row.get(0)?,
                kind,
                code: row.get(1)?,
                name: row.get(2)?,
                market: parse_market(row.get(3)?),
            })
        })?;
        let entities = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        debug!("Loaded {} {} entities", entities.len(), kind);
        Ok(entities)
    }

    pub fn all_stocks(&self) -> Result<Vec<Entity>> {
        self.securities(
            "SELECT s.id, s.code, s.name, m.code FROM stock s
             LEFT JOIN market m ON s.market_id = m.id ORDER BY s.id",
            EntityKind::Stock,
        )
    }

    pub fn us_stocks(&self) -> Result<Vec<Entity>> {
        self.securities(
            "SELECT s.id, s.code, s.name, m.code FROM stock s
             LEFT JOIN market m ON s.market_id = m.id WHERE m.code = 'US' ORDER BY s.id",
            EntityKind::Stock,
        )
    }

    pub fn all_funds(&self) -> Result<Vec<Entity>> {
        self.securities(
            "SELECT f.id, f.code, f.name, m.code FROM fund f
             LEFT JOIN market m ON f.market_id = m.id ORDER BY f.id",
            EntityKind::Fund,
        )
    }

    /// Tracked foreign currencies; CNY is the base and never fetched.
    pub fn all_currencies(&self) -> Result<Vec<Entity>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, currency FROM foreign_exchange WHERE currency != 'CNY' ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Entity {
                id: row.get(0)?,
                kind: EntityKind::Currency,
                code: row.get(1)?,
                name: String::new(),
                market: None,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn entities(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        match kind {
            EntityKind::Stock => self.all_stocks(),
            EntityKind::Fund => self.all_funds(),
            EntityKind::Currency => self.all_currencies(),
        }
    }

    fn insert_value(&self, sql: &str, id: i64, date: NaiveDate, value: Decimal) -> Result<InsertOutcome> {
        let changed = self
            .conn
            .execute(sql, params![id, date.format("%Y-%m-%d").to_string(), value.to_string()])?;
        Ok(if changed == 0 {
            InsertOutcome::Skipped
        } else {
            InsertOutcome::Inserted
        })
    }

    pub fn insert_stock_nav(&self, stock_id: i64, date: NaiveDate, nav: Decimal) -> Result<InsertOutcome> {
        self.insert_value(
            "INSERT OR IGNORE INTO stock_net_asset_value (stock_id, date, nav) VALUES (?1, ?2, ?3)",
            stock_id,
            date,
            nav,
        )
    }

    pub fn insert_fund_nav(&self, fund_id: i64, date: NaiveDate, nav: Decimal) -> Result<InsertOutcome> {
        self.insert_value(
            "INSERT OR IGNORE INTO fund_net_asset_value (fund_id, date, nav) VALUES (?1, ?2, ?3)",
            fund_id,
            date,
            nav,
        )
    }

    pub fn insert_exchange_rate(&self, currency_id: i64, date: NaiveDate, rate: Decimal) -> Result<InsertOutcome> {
        self.insert_value(
            "INSERT OR IGNORE INTO foreign_exchange_rate (currency_id, date, rate) VALUES (?1, ?2, ?3)",
            currency_id,
            date,
            rate,
        )
    }

    /// Stores `quote` against the table matching the entity's kind.
    pub fn insert_quote(&self, entity: &Entity, quote: &Quote) -> Result<InsertOutcome> {
        match entity.kind {
            EntityKind::Stock => self.insert_stock_nav(entity.id, quote.as_of, quote.value),
            EntityKind::Fund => self.insert_fund_nav(entity.id, quote.as_of, quote.value),
            EntityKind::Currency => self.insert_exchange_rate(entity.id, quote.as_of, quote.value),
        }
    }

    fn latest(&self, sql: &str, id: i64) -> Result<Option<Observation>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(sql, params![id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        row.map(|(date, value)| observation(&date, &value))
            .transpose()
    }

    pub fn latest_stock_nav(&self, stock_id: i64) -> Result<Option<Observation>> {
        self.latest(
            "SELECT date, nav FROM stock_net_asset_value WHERE stock_id = ?1 ORDER BY date DESC LIMIT 1",
            stock_id,
        )
    }

    pub fn latest_fund_nav(&self, fund_id: i64) -> Result<Option<Observation>> {
        self.latest(
            "SELECT date, nav FROM fund_net_asset_value WHERE fund_id = ?1 ORDER BY date DESC LIMIT 1",
            fund_id,
        )
    }

    pub fn latest_exchange_rate(&self, currency_id: i64) -> Result<Option<Observation>> {
        self.latest(
            "SELECT date, rate FROM foreign_exchange_rate WHERE currency_id = ?1 ORDER BY date DESC LIMIT 1",
            currency_id,
        )
    }

    pub fn latest_for(&self, entity: &Entity) -> Result<Option<Observation>> {
        match entity.kind {
            EntityKind::Stock => self.latest_stock_nav(entity.id),
            EntityKind::Fund => self.latest_fund_nav(entity.id),
            EntityKind::Currency => self.latest_exchange_rate(entity.id),
        }
    }

    fn market_id(&self, market: Market) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT id FROM market WHERE code = ?1",
                params![market.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| anyhow!("Unknown market {market}"))
    }

    pub fn add_stock(&self, code: &str, name: &str, market: Market) -> Result<i64> {
        if market == Market::Unknown {
            bail!("Cannot determine the market of stock {code}; pass it explicitly");
        }
        let market_id = self.market_id(market)?;
        self.conn
            .execute(
                "INSERT INTO stock (code, name, market_id) VALUES (?1, ?2, ?3)",
                params![code, name, market_id],
            )
            .with_context(|| format!("Failed to add stock {code} [{market}]"))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_fund(&self, code: &str, name: &str, market: Option<Market>) -> Result<i64> {
        let market_id = match market {
            Some(Market::Unknown) | None => None,
            Some(m) => Some(self.market_id(m)?),
        };
        self.conn
            .execute(
                "INSERT INTO fund (code, name, market_id) VALUES (?1, ?2, ?3)",
                params![code, name, market_id],
            )
            .with_context(|| format!("Failed to add fund {code}"))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_currency(&self, currency: &str) -> Result<i64> {
        let currency = currency.trim().to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            bail!("Invalid currency code: {currency}");
        }
        self.conn
            .execute(
                "INSERT INTO foreign_exchange (currency) VALUES (?1)",
                params![currency],
            )
            .with_context(|| format!("Failed to add currency {currency}"))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        TABLES
            .iter()
            .map(|table| {
                let count: i64 =
                    self.conn
                        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                Ok((*table, count))
            })
            .collect()
    }

    /// Copies the live database into `backup_dir` using SQLite's online backup.
    pub fn backup(&self, backup_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(backup_dir)
            .with_context(|| format!("Failed to create backup directory: {}", backup_dir.display()))?;
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let target = backup_dir.join(format!("holdings_backup_{timestamp}.sqlite"));
        self.conn
            .backup(DatabaseName::Main, &target, None)
            .with_context(|| format!("Failed to back up database to {}", target.display()))?;
        info!("Database backed up to {}", target.display());
        Ok(target)
    }
}
