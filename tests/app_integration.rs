use holdings::AppCommand;
use holdings::cli::fetch::FetchTarget;
use holdings::core::quote::{EntityKind, Market};
use holdings::core::source::DataSourceType;
use holdings::store::Database;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

// Adds automatic logging to test
mod test_utils {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // 2024-03-01 14:30:00 UTC, 09:30 in New York
    const TS_MAR_1: i64 = 1_709_303_400;

    pub fn yahoo_chart(close: f64) -> String {
        format!(
            r#"{{"chart":{{"result":[{{"meta":{{"gmtoffset":-18000}},"timestamp":[{TS_MAR_1}],"indicators":{{"quote":[{{"close":[{close}]}}]}}}}],"error":null}}}}"#
        )
    }

    /// One server standing in for every vendor: each adapter gets its own paths.
    pub async fn create_vendor_server() -> MockServer {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/qt/stock/kline/get"))
            .and(query_param("secid", "1.600519"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"rc":0,"data":{"code":"600519","klines":["2024-02-29,1680.00,1685.50","2024-03-01,1686.00,1688.00"]}}"#,
            ))
            .mount(&server)
            .await;

        // Domestic FX feeds are down; the rate has to come from Yahoo
        Mock::given(method("GET"))
            .and(path("/api/qt/stock/kline/get"))
            .and(query_param("secid", "120.USDCNYC"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/qt/stock/kline/get"))
            .and(query_param("secid", "133.USDCNH"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"rc":0,"data":null}"#))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/f10/lsjz"))
            .and(query_param("fundCode", "161725"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Data":{"LSJZList":[{"FSRQ":"2024-03-01","DWJZ":"0.8123"}]},"ErrCode":0}"#,
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_string(yahoo_chart(179.66)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/USDCNY=X"))
            .respond_with(ResponseTemplate::new(200).set_body_string(yahoo_chart(7.1234)))
            .mount(&server)
            .await;

        server
    }
}

struct TestEnv {
    _dir: TempDir,
    config_path: PathBuf,
    db_path: PathBuf,
    backup_dir: PathBuf,
}

impl TestEnv {
    fn new(vendor_uri: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = dir.path().join("holdings.db");
        let backup_dir = dir.path().join("backups");
        let config_path = dir.path().join("config.yaml");
        let config_content = format!(
            r#"
data_source: yfinance
database:
  path: "{db}"
  backup_dir: "{backups}"
fetch:
  request_throttle_seconds: 0
  retry_delay_seconds: 0
  max_retries: 2
  max_workers: 3
providers:
  akshare:
    eastmoney_url: "{uri}"
    tencent_url: "{uri}"
    fund_url: "{uri}"
    fund_estimate_url: "{uri}"
  yahoo:
    base_url: "{uri}"
  alpha_vantage:
    base_url: "{uri}"
    api_key_env: "HOLDINGS_TEST_UNSET_AV_KEY"
"#,
            db = db_path.display(),
            backups = backup_dir.display(),
            uri = vendor_uri,
        );
        fs::write(&config_path, config_content).expect("Failed to write config file");

        TestEnv {
            _dir: dir,
            config_path,
            db_path,
            backup_dir,
        }
    }

    fn config(&self) -> Option<&str> {
        self.config_path.to_str()
    }

    async fn run(&self, command: AppCommand) {
        let result = holdings::run_command(command.clone(), self.config()).await;
        assert!(
            result.is_ok(),
            "{:?} failed with: {:?}",
            command,
            result.err()
        );
    }
}

fn backups_in(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[test_log::test(tokio::test)]
async fn test_full_fetch_flow_with_mock_vendors() {
    let server = test_utils::create_vendor_server().await;
    let env = TestEnv::new(&server.uri());

    env.run(AppCommand::DbInit).await;
    env.run(AppCommand::AddStock {
        code: "600519".to_string(),
        name: "Kweichow Moutai".to_string(),
        market: None,
    })
    .await;
    env.run(AppCommand::AddStock {
        code: "aapl".to_string(),
        name: "Apple".to_string(),
        market: Some(Market::Us),
    })
    .await;
    env.run(AppCommand::AddFund {
        code: "161725".to_string(),
        name: String::new(),
        market: None,
    })
    .await;
    env.run(AppCommand::AddCurrency("usd".to_string())).await;

    env.run(AppCommand::Fetch {
        target: FetchTarget::All,
        us_source: Some(DataSourceType::Yfinance),
    })
    .await;
    assert_eq!(backups_in(&env.backup_dir), 1);

    let store = Database::new(&env.db_path).connect().unwrap();
    let stocks = store.all_stocks().unwrap();
    assert_eq!(stocks.len(), 2);
    let moutai = store.latest_for(&stocks[0]).unwrap().unwrap();
    assert_eq!(moutai.value.to_string(), "1688.0000");
    assert_eq!(moutai.date.to_string(), "2024-03-01");
    let apple = store.latest_for(&stocks[1]).unwrap().unwrap();
    assert_eq!(stocks[1].code, "AAPL");
    assert_eq!(apple.value.to_string(), "179.6600");

    let fund = store.all_funds().unwrap().remove(0);
    assert_eq!(store.latest_for(&fund).unwrap().unwrap().value.to_string(), "0.8123");

    let usd = store.all_currencies().unwrap().remove(0);
    let rate = store.latest_for(&usd).unwrap().unwrap();
    info!(?rate, "USD rate after fall-through");
    assert_eq!(rate.value.to_string(), "7.1234");

    let before = store.table_counts().unwrap();
    env.run(AppCommand::Fetch {
        target: FetchTarget::Stocks,
        us_source: Some(DataSourceType::Yfinance),
    })
    .await;
    assert_eq!(store.table_counts().unwrap(), before);

    env.run(AppCommand::Show(EntityKind::Stock)).await;
    env.run(AppCommand::Show(EntityKind::Currency)).await;
    env.run(AppCommand::DbStatus).await;
}

#[test_log::test(tokio::test)]
async fn test_us_only_fetch_skips_domestic_stocks() {
    let server = test_utils::create_vendor_server().await;
    let env = TestEnv::new(&server.uri());

    env.run(AppCommand::DbInit).await;
    env.run(AppCommand::AddStock {
        code: "600519".to_string(),
        name: String::new(),
        market: None,
    })
    .await;
    env.run(AppCommand::AddStock {
        code: "AAPL".to_string(),
        name: String::new(),
        market: None,
    })
    .await;

    env.run(AppCommand::Fetch {
        target: FetchTarget::UsStocks,
        us_source: Some(DataSourceType::Yfinance),
    })
    .await;

    let store = Database::new(&env.db_path).connect().unwrap();
    let stocks = store.all_stocks().unwrap();
    assert!(store.latest_for(&stocks[0]).unwrap().is_none());
    assert!(store.latest_for(&stocks[1]).unwrap().is_some());
    assert_eq!(backups_in(&env.backup_dir), 0);
}

#[test_log::test(tokio::test)]
async fn test_fetch_without_database_fails() {
    let server = test_utils::create_vendor_server().await;
    let env = TestEnv::new(&server.uri());

    let result = holdings::run_command(
        AppCommand::Fetch {
            target: FetchTarget::Funds,
            us_source: Some(DataSourceType::Yfinance),
        },
        env.config(),
    )
    .await;
    assert!(result.is_err());
    assert!(!env.db_path.exists());
}

#[test_log::test(tokio::test)]
async fn test_us_source_must_serve_us() {
    let server = test_utils::create_vendor_server().await;
    let env = TestEnv::new(&server.uri());
    env.run(AppCommand::DbInit).await;

    // Every registered source serves US, so any explicit choice is accepted
    for source in DataSourceType::ALL {
        env.run(AppCommand::Fetch {
            target: FetchTarget::Stocks,
            us_source: Some(source),
        })
        .await;
    }
    env.run(AppCommand::Sources).await;
}

#[test_log::test(tokio::test)]
async fn test_setup_refuses_existing_config() {
    let server = test_utils::create_vendor_server().await;
    let env = TestEnv::new(&server.uri());
    let before = fs::read_to_string(&env.config_path).unwrap();

    let result = holdings::run_command(AppCommand::Setup, env.config()).await;
    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&env.config_path).unwrap(), before);
    assert!(!env.db_path.exists());
}
