//! Extractors against a mock HTTP server, through to a bronze snapshot.

use chrono::{TimeZone, Utc};
use mockito::Matcher;
use serde_json::{json, Value};
use std::time::Duration;

use dataverse_core::domain::{Source, Tier};
use dataverse_core::extract::{CryptoApi, ExtractionError, Extractor, ForexApi, StockApi};
use dataverse_core::http::{FetchError, HttpClient, Jitter, RetryPolicy};
use dataverse_core::storage::{LayeredWriter, SnapshotReader};
use dataverse_core::validate::SchemaErrorKind;

fn client() -> HttpClient {
    let policy = RetryPolicy::new(3, Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
        .with_jitter(Jitter::None);
    HttpClient::new(policy, Duration::from_secs(5)).unwrap()
}

fn coin(i: usize) -> Value {
    json!({
        "id": format!("coin-{i}"),
        "symbol": format!("c{i}"),
        "name": format!("Coin {i}"),
        "current_price": 10.0 + i as f64,
        "market_cap": 5e9 + i as f64 * 1e9,
        "total_volume": 1e7,
        "price_change_percentage_24h": 1.5,
        "last_updated": "2024-03-01T11:58:00.000Z"
    })
}

fn coingecko_body() -> String {
    let mut coins: Vec<Value> = (0..23).map(coin).collect();
    // Missing price, and a price of the wrong type.
    let mut no_price = coin(100);
    no_price.as_object_mut().unwrap().remove("current_price");
    let mut bad_type = coin(101);
    bad_type["current_price"] = json!("free");
    coins.insert(3, no_price);
    coins.push(bad_type);
    Value::Array(coins).to_string()
}

#[test]
fn coingecko_partial_batch_publishes_survivors() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/v3/coins/markets")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("vs_currency".into(), "usd".into()),
            Matcher::UrlEncoded("order".into(), "market_cap_desc".into()),
            Matcher::UrlEncoded("per_page".into(), "25".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(coingecko_body())
        .expect(1)
        .create();

    let api = CryptoApi::new(server.url()).with_per_page(25);
    let extractor = Extractor::new(api, client());
    let batch = extractor.extract().unwrap();
    mock.assert();

    assert_eq!(batch.source(), Source::Crypto);
    assert_eq!(batch.row_count(), 23);
    assert!(batch.is_partial());
    let kinds: Vec<_> = batch.dropped().iter().map(|d| d.error.kind).collect();
    assert_eq!(
        kinds,
        vec![SchemaErrorKind::MissingField, SchemaErrorKind::TypeMismatch]
    );
    assert_eq!(batch.dropped()[0].index, 3);
    assert_eq!(batch.records()[0].symbol(), "C0");

    let dir = tempfile::tempdir().unwrap();
    let snap = LayeredWriter::new(dir.path())
        .write(&batch, Tier::Bronze)
        .unwrap();
    assert_eq!(snap.row_count, 23);

    let reader = SnapshotReader::new(dir.path());
    let entry = reader.latest(Tier::Bronze, Source::Crypto).unwrap();
    assert_eq!(entry.path, snap.path);
    assert_eq!(reader.read_records(&entry).unwrap(), batch.records());
}

#[test]
fn all_invalid_response_fails_extraction() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/api/v3/coins/markets")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"id": "x"}, {"symbol": "y"}]"#)
        .create();

    let err = Extractor::new(CryptoApi::new(server.url()), client())
        .extract()
        .unwrap_err();
    match err {
        ExtractionError::NoValidRecords { total, .. } => assert_eq!(total, 2),
        other => panic!("expected NoValidRecords, got {other:?}"),
    }
}

#[test]
fn empty_response_fails_extraction() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/api/v3/coins/markets")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create();

    let err = Extractor::new(CryptoApi::new(server.url()), client())
        .extract()
        .unwrap_err();
    assert!(matches!(err, ExtractionError::NoValidRecords { total: 0, .. }));
}

#[test]
fn bad_stock_key_is_permanent_and_not_retried() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/v3/quote/AAPL,MSFT")
        .match_query(Matcher::UrlEncoded("apikey".into(), "wrong".into()))
        .with_status(401)
        .with_body(r#"{"Error Message": "Invalid API KEY."}"#)
        .expect(1)
        .create();

    let api = StockApi::new(server.url(), vec!["AAPL".into(), "MSFT".into()])
        .with_api_key(Some("wrong".into()));
    let err = Extractor::new(api, client()).extract().unwrap_err();

    mock.assert();
    assert!(matches!(
        err,
        ExtractionError::Fetch(FetchError::Permanent { status: 401, .. })
    ));
}

#[test]
fn stock_quotes_use_their_own_timestamp() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/api/v3/quote/AAPL")
        .match_query(Matcher::Any)
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

    let api = StockApi::new(server.url(), vec!["AAPL".into()]).with_api_key(Some("k".into()));
    let batch = Extractor::new(api, client()).extract().unwrap();
    assert_eq!(batch.row_count(), 1);
    assert_eq!(
        batch.records()[0].timestamp(),
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    );
}

#[test]
fn forex_server_outage_exhausts_retries() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/latest")
        .match_query(Matcher::Any)
        .with_status(502)
        .expect(3)
        .create();

    let api = ForexApi::new(server.url(), "USD", vec!["EUR".into()]);
    let err = Extractor::new(api, client()).extract().unwrap_err();

    mock.assert();
    assert!(matches!(
        err,
        ExtractionError::Fetch(FetchError::Network { attempts: 3, .. })
    ));
}

#[test]
fn forex_rates_become_pair_records() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/latest")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("from".into(), "USD".into()),
            Matcher::UrlEncoded("to".into(), "EUR,JPY".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"amount":1.0,"base":"USD","date":"2024-03-01","rates":{"EUR":0.9231,"JPY":-1}}"#,
        )
        .create();

    let api = ForexApi::new(server.url(), "USD", vec!["EUR".into(), "JPY".into()]);
    let batch = Extractor::new(api, client()).extract().unwrap();

    assert_eq!(batch.row_count(), 1);
    assert_eq!(batch.records()[0].symbol(), "USD/EUR");
    assert_eq!(batch.dropped().len(), 1);
    assert_eq!(batch.dropped()[0].error.kind, SchemaErrorKind::RangeViolation);
}
