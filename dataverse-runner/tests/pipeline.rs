//! End-to-end pipeline runs against mock market APIs.

use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};

use dataverse_core::domain::{Source, Tier};
use dataverse_runner::{Pipeline, PipelineConfig, RunState, RunStatus};

fn config(dir: &std::path::Path, url: &str) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.storage_root = dir.join("data");
    config.log_dir = dir.join("logs");
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter_fraction = 0.0;
    config.http_timeout_secs = 5;
    config.crypto.base_url = url.to_string();
    config.crypto.per_page = 25;
    config.stock.base_url = url.to_string();
    config.stock.api_key = Some("test-key".into());
    config.stock.symbols = vec!["AAPL".into()];
    config.forex.base_url = url.to_string();
    config.forex.symbols = vec!["EUR".into(), "GBP".into()];
    config
}

fn coin(i: usize) -> Value {
    json!({
        "id": format!("coin-{i}"),
        "symbol": format!("c{i}"),
        "name": format!("Coin {i}"),
        "current_price": 10.0 + i as f64,
        "market_cap": 5e9 + i as f64 * 1e9,
        "total_volume": 1e7,
        "price_change_percentage_24h": -0.5,
        "last_updated": "2024-03-01T11:58:00.000Z"
    })
}

fn mock_crypto(server: &mut ServerGuard) -> Mock {
    let mut coins: Vec<Value> = (0..23).map(coin).collect();
    let mut missing = coin(90);
    missing.as_object_mut().unwrap().remove("symbol");
    let mut wrong = coin(91);
    wrong["market_cap"] = json!("huge");
    coins.push(missing);
    coins.push(wrong);

    server
        .mock("GET", "/api/v3/coins/markets")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(Value::Array(coins).to_string())
        .create()
}

fn mock_forex(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", "/latest")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"amount":1.0,"base":"USD","date":"2024-03-01","rates":{"EUR":0.9231,"GBP":0.7905}}"#)
        .create()
}

#[test]
fn coingecko_scenario_records_23_rows() {
    let mut server = mockito::Server::new();
    let mock = mock_crypto(&mut server);
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(dir.path(), &server.url())).unwrap();

    let record = pipeline.run_extraction(Source::Crypto);
    mock.assert();

    assert_eq!(record.status, RunStatus::Success);
    assert_eq!(record.state, RunState::Succeeded);
    assert_eq!(record.rows_written, 23);
    assert_eq!(record.dropped_records, 2);
    assert!(record.partial);

    let entry = pipeline.reader().latest(Tier::Bronze, Source::Crypto).unwrap();
    assert_eq!(Some(&entry.path), record.snapshot_path.as_ref());
    assert_eq!(pipeline.reader().read_records(&entry).unwrap().len(), 23);

    let logged = pipeline.logger().read_all().unwrap();
    assert_eq!(logged, vec![record]);
    let status = std::fs::read_to_string(pipeline.logger().status_log_path()).unwrap();
    assert!(status.contains("| INFO | crypto_extractor | ✅ 23 rows"));
}

#[test]
fn stock_failure_is_isolated_from_other_sources() {
    let mut server = mockito::Server::new();
    let _crypto = mock_crypto(&mut server);
    let _forex = mock_forex(&mut server);
    let stock = server
        .mock("GET", Matcher::Regex("^/api/v3/quote/".into()))
        .expect(0)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), &server.url());
    cfg.stock.api_key = None;
    let pipeline = Pipeline::new(cfg).unwrap();

    let summary = pipeline.run_cycle();
    stock.assert();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_sources(), vec![Source::Stock]);

    let stock_outcome = summary
        .outcomes
        .iter()
        .find(|o| o.source == Source::Stock)
        .unwrap();
    assert_eq!(stock_outcome.extraction.status, RunStatus::Failure);
    assert!(stock_outcome.promotion.is_none());

    let reader = pipeline.reader();
    for source in [Source::Crypto, Source::Forex] {
        for tier in Tier::ALL {
            assert_eq!(reader.list(tier, source).unwrap().len(), 1, "{tier}/{source}");
        }
    }
    assert!(reader.list(Tier::Bronze, Source::Stock).unwrap().is_empty());

    // 3 runs each for crypto and forex, 1 for stock.
    assert_eq!(pipeline.logger().read_all().unwrap().len(), 7);
}

#[test]
fn stock_server_error_is_isolated_from_other_sources() {
    let mut server = mockito::Server::new();
    let crypto = mock_crypto(&mut server);
    let forex = mock_forex(&mut server);
    let stock = server
        .mock("GET", "/api/v3/quote/AAPL")
        .match_query(Matcher::Any)
        .with_status(500)
        .expect(3)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(dir.path(), &server.url())).unwrap();

    let summary = pipeline.run_cycle();
    stock.assert();
    crypto.assert();
    forex.assert();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed_sources(), vec![Source::Stock]);

    let stock_outcome = summary
        .outcomes
        .iter()
        .find(|o| o.source == Source::Stock)
        .unwrap();
    assert_eq!(stock_outcome.extraction.failed_in, Some(RunState::Fetching));
    assert!(stock_outcome
        .extraction
        .error_detail
        .as_deref()
        .unwrap()
        .contains("after 3 attempt(s)"));
    assert!(stock_outcome.promotion.is_none());

    let reader = pipeline.reader();
    for source in [Source::Crypto, Source::Forex] {
        for tier in Tier::ALL {
            assert_eq!(reader.list(tier, source).unwrap().len(), 1, "{tier}/{source}");
        }
    }
    for tier in Tier::ALL {
        assert!(reader.list(tier, Source::Stock).unwrap().is_empty());
    }
    assert_eq!(pipeline.logger().read_all().unwrap().len(), 7);
}

#[test]
fn outage_leaves_no_snapshot() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/v3/coins/markets")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(3)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(dir.path(), &server.url())).unwrap();
    let record = pipeline.run_extraction(Source::Crypto);
    mock.assert();

    assert_eq!(record.status, RunStatus::Failure);
    assert_eq!(record.failed_in, Some(RunState::Fetching));
    assert_eq!(record.rows_written, 0);
    assert!(record.error_detail.unwrap().contains("after 3 attempt(s)"));
    assert!(pipeline
        .reader()
        .list(Tier::Bronze, Source::Crypto)
        .unwrap()
        .is_empty());
}

#[test]
fn promotion_builds_silver_and_gold() {
    let mut server = mockito::Server::new();
    let _crypto = mock_crypto(&mut server);
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(dir.path(), &server.url())).unwrap();

    assert!(pipeline.run_extraction(Source::Crypto).is_success());
    let outcome = pipeline.run_promotion(Source::Crypto);
    assert!(outcome.is_success());
    assert_eq!(outcome.silver.rows_written, 23);
    assert_eq!(outcome.silver.stage, Tier::Silver);

    let reader = pipeline.reader();
    let silver = reader.latest(Tier::Silver, Source::Crypto).unwrap();
    assert_eq!(reader.read_records(&silver).unwrap().len(), 23);

    // Market caps run 5e9..2.7e10: five Mid Cap coins, the rest Large Cap.
    let gold = outcome.gold.unwrap();
    assert_eq!(gold.rows_written, 2);
    let entry = reader.latest(Tier::Gold, Source::Crypto).unwrap();
    let frame = reader.read_frame(&entry).unwrap();
    assert_eq!(frame.height(), 2);

    let status = std::fs::read_to_string(pipeline.logger().status_log_path()).unwrap();
    assert!(status.contains("crypto_transformer | ✅ 23 rows"));
    assert!(status.contains("crypto_aggregator | ✅ 2 rows"));
}

#[test]
fn stock_and_forex_extract_with_keys() {
    let mut server = mockito::Server::new();
    let _forex = mock_forex(&mut server);
    let _stock = server
        .mock("GET", "/api/v3/quote/AAPL")
        .match_query(Matcher::UrlEncoded("apikey".into(), "test-key".into()))
        .with_status(200)
        .with_body(
            json!([{
                "symbol": "AAPL",
                "name": "Apple Inc.",
                "price": 180.5,
                "open": 179.0,
                "dayHigh": 181.0,
                "dayLow": 178.5,
                "volume": 52_000_000,
                "changesPercentage": 0.84,
                "timestamp": 1_709_294_400
            }])
            .to_string(),
        )
        .create();

    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(dir.path(), &server.url())).unwrap();

    let stock = pipeline.run_extraction(Source::Stock);
    assert!(stock.is_success(), "{:?}", stock.error_detail);
    assert_eq!(stock.rows_written, 1);

    let forex = pipeline.run_extraction(Source::Forex);
    assert!(forex.is_success(), "{:?}", forex.error_detail);
    assert_eq!(forex.rows_written, 2);
    assert!(!forex.partial);
}
