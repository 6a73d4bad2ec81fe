use std::collections::HashMap;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use serde_json::json;

use comtrade_matrix::app::{App, ProgressEvent, ProgressSink};
use comtrade_matrix::comtrade::{
    AvailabilityRecord, ComtradeClient, RawTradeEntry, TradeQuery, TradeResponse,
    parse_trade_response,
};
use comtrade_matrix::config::{ConfigLoader, RunConfig};
use comtrade_matrix::domain::CountryCode;
use comtrade_matrix::error::MatrixError;
use comtrade_matrix::failure_log::{LogStatus, MemoryFailureLog};
use comtrade_matrix::writer::MatrixWriter;

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

enum Reply {
    Records(Vec<RawTradeEntry>),
    Empty(&'static str),
    /// Payload with a validation message but no `dataset` array.
    Malformed(&'static str),
    Fail,
    Reject,
}

/// Answers `fetch_trade` by the joined reporter list of the query.
struct MockComtrade {
    availability: Vec<AvailabilityRecord>,
    replies: HashMap<String, Reply>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockComtrade {
    fn new(availability: Vec<AvailabilityRecord>) -> Self {
        Self {
            availability,
            replies: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn reply(mut self, reporters: &str, reply: Reply) -> Self {
        self.replies.insert(reporters.to_string(), reply);
        self
    }

    fn calls(&self, reporters: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(reporters)
            .copied()
            .unwrap_or(0)
    }
}

impl ComtradeClient for MockComtrade {
    fn fetch_trade(&self, query: &TradeQuery) -> Result<TradeResponse, MatrixError> {
        let key = query.reporters.join(",");
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;
        match self.replies.get(&key) {
            Some(Reply::Records(records)) => Ok(TradeResponse {
                records: records.clone(),
                validation_message: String::new(),
            }),
            Some(Reply::Empty(message)) => Ok(TradeResponse {
                records: Vec::new(),
                validation_message: message.to_string(),
            }),
            Some(Reply::Malformed(message)) => {
                parse_trade_response(json!({"validation": {"message": message}}))
            }
            Some(Reply::Fail) => Err(MatrixError::ComtradeHttp("connection reset".to_string())),
            Some(Reply::Reject) => Err(MatrixError::InvalidCommodity(query.commodity.to_string())),
            None => Ok(TradeResponse {
                records: Vec::new(),
                validation_message: String::new(),
            }),
        }
    }

    fn fetch_availability(&self) -> Result<Vec<AvailabilityRecord>, MatrixError> {
        Ok(self.availability.clone())
    }
}

fn country(un_id: &str, iso3: &str, name: &str) -> CountryCode {
    CountryCode {
        un_id: un_id.to_string(),
        iso3: iso3.to_string(),
        name: name.to_string(),
        valid_from: 1962,
        valid_to: i32::MAX,
    }
}

fn annual(reporter: &str, year: i32) -> AvailabilityRecord {
    AvailabilityRecord {
        reporter: reporter.to_string(),
        period: year.to_string(),
        frequency: "ANNUAL".to_string(),
    }
}

fn entry(reporter: &str, partner: &str, period: &str, net_weight: f64) -> RawTradeEntry {
    RawTradeEntry {
        reporter: reporter.to_string(),
        partner: partner.to_string(),
        period: period.to_string(),
        net_weight: Some(net_weight),
    }
}

fn config(json: &str) -> RunConfig {
    ConfigLoader::parse(json).unwrap()
}

fn output_dir(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap()
}

fn read(path: &Utf8PathBuf) -> String {
    std::fs::read_to_string(path.as_std_path()).unwrap()
}

#[test]
fn single_flow_lands_in_reporter_row() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let countries = vec![
        country("4", "AFG", "Afghanistan"),
        country("8", "ALB", "Albania"),
    ];
    let client = MockComtrade::new(vec![annual("4", 2010), annual("8", 2010)])
        .reply("4,8", Reply::Records(vec![entry("4", "8", "2010", 100.0)]));
    let app = App::new(client, MatrixWriter::new(out.clone()));
    let config = config(r#"{"start_year": 2010, "end_year": 2010, "commodity_list": ["6802"]}"#);
    let mut log = MemoryFailureLog::default();

    let result = app.run(&config, &countries, &mut log, &NoopSink).unwrap();

    assert_eq!(result.commodities.len(), 1);
    assert_eq!(result.commodities[0].records, 1);
    assert_eq!(
        read(&out.join("6802_2010.csv")),
        "iso3,AFG,ALB\nAFG,0,100\nALB,0,0\n"
    );
    // Albania reported nothing for 2010.
    assert_eq!(log.entries.len(), 1);
    assert_eq!(log.entries[0].reporter_id, "8");
    assert_eq!(log.entries[0].status, LogStatus::NoData);
}

#[test]
fn failing_batch_is_logged_and_zero_filled() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let countries = vec![
        country("4", "AFG", "Afghanistan"),
        country("8", "ALB", "Albania"),
    ];
    let client = MockComtrade::new(vec![annual("4", 2010), annual("8", 2010)])
        .reply("4", Reply::Fail)
        .reply("8", Reply::Records(vec![entry("8", "4", "2010", 50.0)]));
    let app = App::new(client, MatrixWriter::new(out.clone()));
    let config = config(
        r#"{"start_year": 2010, "end_year": 2010, "commodity_list": ["6802"], "country_batch_size": 1}"#,
    );
    let mut log = MemoryFailureLog::default();

    let result = app.run(&config, &countries, &mut log, &NoopSink).unwrap();

    assert_eq!(result.commodities[0].requests, 2);
    assert_eq!(result.commodities[0].failed_batches, 1);
    assert_eq!(
        read(&out.join("6802_2010.csv")),
        "iso3,AFG,ALB\nAFG,0,0\nALB,50,0\n"
    );
    let failures = log
        .entries
        .iter()
        .filter(|entry| entry.status == LogStatus::Fail)
        .collect::<Vec<_>>();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].reporter_id, "4");
    assert_eq!(failures[0].commodity, "6802");
    assert_eq!(failures[0].period, "2010");
    assert!(failures[0].message.contains("connection reset"));
}

#[test]
fn failing_batch_is_tried_exactly_twice() {
    let temp = tempfile::tempdir().unwrap();
    let countries = vec![country("4", "AFG", "Afghanistan")];
    let client = MockComtrade::new(vec![annual("4", 2010)]).reply("4", Reply::Fail);
    let app = App::new(&client, MatrixWriter::new(output_dir(&temp)));
    let config = config(r#"{"start_year": 2010, "end_year": 2010, "commodity_list": [6802]}"#);
    let mut log = MemoryFailureLog::default();

    app.run(&config, &countries, &mut log, &NoopSink).unwrap();

    assert_eq!(client.calls("4"), 2);
    let no_data = log
        .entries
        .iter()
        .find(|entry| entry.status == LogStatus::NoData)
        .unwrap();
    assert!(no_data.message.starts_with("fetch failed"));
}

#[test]
fn payload_without_dataset_is_retried_then_logged() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let countries = vec![
        country("4", "AFG", "Afghanistan"),
        country("8", "ALB", "Albania"),
    ];
    let client = MockComtrade::new(vec![annual("4", 2010), annual("8", 2010)])
        .reply("4", Reply::Malformed("Usage limit exceeded."))
        .reply("8", Reply::Records(vec![entry("8", "4", "2010", 50.0)]));
    let app = App::new(&client, MatrixWriter::new(out.clone()));
    let config = config(
        r#"{"start_year": 2010, "end_year": 2010, "commodity_list": ["6802"], "country_batch_size": 1}"#,
    );
    let mut log = MemoryFailureLog::default();

    let result = app.run(&config, &countries, &mut log, &NoopSink).unwrap();

    assert_eq!(client.calls("4"), 2);
    assert_eq!(result.commodities[0].failed_batches, 1);
    assert_eq!(result.commodities[0].empty_batches, 0);
    let failures = log
        .entries
        .iter()
        .filter(|entry| entry.status == LogStatus::Fail)
        .collect::<Vec<_>>();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].reporter_id, "4");
    assert!(failures[0].message.contains("Usage limit exceeded."));
    assert_eq!(
        read(&out.join("6802_2010.csv")),
        "iso3,AFG,ALB\nAFG,0,0\nALB,50,0\n"
    );
}

#[test]
fn rejected_batch_is_skipped_without_retry() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let countries = vec![
        country("4", "AFG", "Afghanistan"),
        country("8", "ALB", "Albania"),
    ];
    let client = MockComtrade::new(vec![annual("4", 2010), annual("8", 2010)])
        .reply("4", Reply::Reject)
        .reply("8", Reply::Records(vec![entry("8", "4", "2010", 50.0)]));
    let app = App::new(&client, MatrixWriter::new(out.clone()));
    let config = config(
        r#"{"start_year": 2010, "end_year": 2010, "commodity_list": ["6802"], "country_batch_size": 1}"#,
    );
    let mut log = MemoryFailureLog::default();

    let result = app.run(&config, &countries, &mut log, &NoopSink).unwrap();

    assert_eq!(client.calls("4"), 1);
    assert_eq!(result.commodities[0].failed_batches, 1);
    assert!(
        log.entries
            .iter()
            .any(|entry| entry.status == LogStatus::Fail && entry.reporter_id == "4")
    );
    assert_eq!(
        read(&out.join("6802_2010.csv")),
        "iso3,AFG,ALB\nAFG,0,0\nALB,50,0\n"
    );
}

#[test]
fn empty_response_is_not_retried() {
    let temp = tempfile::tempdir().unwrap();
    let countries = vec![country("4", "AFG", "Afghanistan")];
    let client =
        MockComtrade::new(vec![annual("4", 2010)]).reply("4", Reply::Empty("No data matches"));
    let mut log = MemoryFailureLog::default();
    let config = config(r#"{"start_year": 2010, "end_year": 2010, "commodity_list": ["6802"]}"#);

    let app = App::new(&client, MatrixWriter::new(output_dir(&temp)));
    let result = app.run(&config, &countries, &mut log, &NoopSink).unwrap();

    assert_eq!(client.calls("4"), 1);
    assert_eq!(result.commodities[0].empty_batches, 1);
    assert!(
        log.entries
            .iter()
            .all(|entry| entry.status == LogStatus::NoData && entry.message == "No data matches")
    );
    assert_eq!(log.entries.len(), 2);
}

#[test]
fn unavailable_countries_are_not_requested() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let countries = vec![
        country("4", "AFG", "Afghanistan"),
        country("8", "ALB", "Albania"),
    ];
    let client = MockComtrade::new(vec![annual("8", 2010)])
        .reply("8", Reply::Records(vec![entry("8", "4", "2010", 3.0)]));
    let app = App::new(client, MatrixWriter::new(out.clone()));
    let config = config(r#"{"start_year": 2010, "end_year": 2010, "commodity_list": ["6802"]}"#);
    let mut log = MemoryFailureLog::default();

    let result = app.run(&config, &countries, &mut log, &NoopSink).unwrap();

    assert_eq!(result.plan.no_data, 1);
    assert_eq!(result.commodities[0].requests, 1);
    assert_eq!(
        read(&out.join("6802_2010.csv")),
        "iso3,AFG,ALB\nAFG,0,0\nALB,3,0\n"
    );
    assert_eq!(log.entries[0].message, "no annual data available");
}

#[test]
fn monthly_run_writes_one_matrix_per_month() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let countries = vec![
        country("4", "AFG", "Afghanistan"),
        country("8", "ALB", "Albania"),
    ];
    let availability = (1..=5)
        .map(|month| AvailabilityRecord {
            reporter: "4".to_string(),
            period: format!("2010{month:02}"),
            frequency: "MONTHLY".to_string(),
        })
        .collect();
    let client = MockComtrade::new(availability).reply(
        "4",
        Reply::Records(vec![
            entry("4", "8", "201003", 7.0),
            // Annual rows never leak into a monthly run.
            entry("4", "8", "2010", 99.0),
        ]),
    );
    let app = App::new(client, MatrixWriter::new(out.clone()));
    let config = config(
        r#"{"start_year": 2010, "end_year": 2010, "temporal_resolution": "monthly", "commodity_list": ["6802"]}"#,
    );
    let mut log = MemoryFailureLog::default();

    let result = app.run(&config, &countries, &mut log, &NoopSink).unwrap();

    assert_eq!(result.commodities[0].files.len(), 12);
    assert_eq!(result.commodities[0].records, 1);
    assert_eq!(
        read(&out.join("6802_201003.csv")),
        "iso3,AFG,ALB\nAFG,0,7\nALB,0,0\n"
    );
    assert_eq!(
        read(&out.join("6802_201004.csv")),
        "iso3,AFG,ALB\nAFG,0,0\nALB,0,0\n"
    );
}

#[test]
fn historical_codes_collapse_into_one_label() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let countries = vec![
        country("4", "AFG", "Afghanistan"),
        country("276", "DEU", "Germany"),
        country("280", "DEU", "Fmr Fed. Rep. of Germany"),
    ];
    let client = MockComtrade::new(vec![annual("4", 1990), annual("276", 1990), annual("280", 1990)])
        .reply(
            "4,276,280",
            Reply::Records(vec![
                entry("4", "276", "1990", 1.0),
                entry("4", "280", "1990", 2.0),
                entry("276", "4", "1990", 10.0),
                entry("280", "4", "1990", 20.0),
                entry("280", "276", "1990", 5.0),
            ]),
        );
    let app = App::new(client, MatrixWriter::new(out.clone()));
    let config = config(r#"{"start_year": 1990, "end_year": 1990, "commodity_list": ["6902"]}"#);
    let mut log = MemoryFailureLog::default();

    app.run(&config, &countries, &mut log, &NoopSink).unwrap();

    assert_eq!(
        read(&out.join("6902_1990.csv")),
        "iso3,AFG,DEU\nAFG,0,3\nDEU,30,5\n"
    );
}

#[test]
fn availability_failure_is_fatal() {
    struct Down;

    impl ComtradeClient for Down {
        fn fetch_trade(&self, _query: &TradeQuery) -> Result<TradeResponse, MatrixError> {
            Err(MatrixError::ComtradeHttp("down".to_string()))
        }

        fn fetch_availability(&self) -> Result<Vec<AvailabilityRecord>, MatrixError> {
            Err(MatrixError::ComtradeStatus {
                status: 503,
                message: "unavailable".to_string(),
            })
        }
    }

    let temp = tempfile::tempdir().unwrap();
    let app = App::new(Down, MatrixWriter::new(output_dir(&temp)));
    let config = config(r#"{"start_year": 2010, "end_year": 2010, "commodity_list": ["6802"]}"#);
    let mut log = MemoryFailureLog::default();
    let countries = vec![country("4", "AFG", "Afghanistan")];

    let err = app
        .run(&config, &countries, &mut log, &NoopSink)
        .unwrap_err();
    assert!(matches!(err, MatrixError::ComtradeStatus { status: 503, .. }));
}
