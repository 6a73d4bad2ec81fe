use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{CommodityCode, Frequency};
use crate::error::MatrixError;

pub const DEFAULT_BASE_URL: &str = "https://comtrade.un.org";
const MAX_RECORDS: u32 = 250_000;

/// One `api/get` request: a commodity, a batch of reporters and a batch of years.
#[derive(Debug, Clone)]
pub struct TradeQuery {
    pub commodity: CommodityCode,
    pub reporters: Vec<String>,
    pub years: Vec<i32>,
    pub frequency: Frequency,
    pub credential: Option<String>,
}

/// Trade entry as returned in the `dataset` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawTradeEntry {
    #[serde(rename = "rtCode", deserialize_with = "code_as_string")]
    pub reporter: String,
    #[serde(rename = "ptCode", deserialize_with = "code_as_string")]
    pub partner: String,
    #[serde(rename = "period", deserialize_with = "code_as_string")]
    pub period: String,
    #[serde(rename = "NetWeight", default)]
    pub net_weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeResponse {
    pub records: Vec<RawTradeEntry>,
    pub validation_message: String,
}

/// One row of the data-availability listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AvailabilityRecord {
    #[serde(rename = "r", deserialize_with = "code_as_string")]
    pub reporter: String,
    #[serde(rename = "ps", deserialize_with = "code_as_string")]
    pub period: String,
    #[serde(rename = "freq")]
    pub frequency: String,
}

pub trait ComtradeClient {
    fn fetch_trade(&self, query: &TradeQuery) -> Result<TradeResponse, MatrixError>;
    fn fetch_availability(&self) -> Result<Vec<AvailabilityRecord>, MatrixError>;
}

impl<T: ComtradeClient + ?Sized> ComtradeClient for &T {
    fn fetch_trade(&self, query: &TradeQuery) -> Result<TradeResponse, MatrixError> {
        (**self).fetch_trade(query)
    }

    fn fetch_availability(&self) -> Result<Vec<AvailabilityRecord>, MatrixError> {
        (**self).fetch_availability()
    }
}

#[derive(Clone)]
pub struct ComtradeHttpClient {
    client: Client,
    base_url: String,
}

impl ComtradeHttpClient {
    pub fn new() -> Result<Self, MatrixError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, MatrixError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("comtrade-matrix/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MatrixError::ComtradeHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| MatrixError::ComtradeHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn trade_url(&self) -> String {
        format!("{}/api/get/plus", self.base_url)
    }

    fn availability_url(&self) -> String {
        format!("{}/api/refs/da/view", self.base_url)
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, MatrixError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Comtrade request failed".to_string());
        Err(MatrixError::ComtradeStatus { status, message })
    }

    fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, MatrixError> {
        debug!(url, params = %redact(params), "comtrade.request");
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .map_err(|err| MatrixError::ComtradeHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| MatrixError::ComtradeParse(err.to_string()))
    }
}

impl ComtradeClient for ComtradeHttpClient {
    fn fetch_trade(&self, query: &TradeQuery) -> Result<TradeResponse, MatrixError> {
        let params = trade_params(query);
        let raw = self.get_json(&self.trade_url(), &params)?;
        parse_trade_response(raw)
    }

    fn fetch_availability(&self) -> Result<Vec<AvailabilityRecord>, MatrixError> {
        let params = [("type", "C".to_string()), ("px", "HS".to_string())];
        let raw = self.get_json(&self.availability_url(), &params)?;
        serde_json::from_value(raw).map_err(|err| MatrixError::ComtradeParse(err.to_string()))
    }
}

pub fn trade_params(query: &TradeQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("max", MAX_RECORDS.to_string()),
        ("type", "C".to_string()),
        ("px", "HS".to_string()),
        ("cc", query.commodity.to_string()),
        ("r", query.reporters.join(",")),
        ("rg", "1".to_string()),
        ("p", "all".to_string()),
        ("freq", query.frequency.api_code().to_string()),
        (
            "ps",
            query
                .years
                .iter()
                .map(|year| year.to_string())
                .collect::<Vec<_>>()
                .join(","),
        ),
        ("fmt", "json".to_string()),
    ];
    if let Some(token) = &query.credential {
        params.push(("token", token.clone()));
    }
    params
}

/// Decode an `api/get` payload. A payload without a `dataset` array is malformed.
pub fn parse_trade_response(raw: Value) -> Result<TradeResponse, MatrixError> {
    let validation_message = raw
        .get("validation")
        .and_then(|value| value.get("message"))
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string();
    let dataset = raw
        .get("dataset")
        .and_then(|value| value.as_array())
        .ok_or_else(|| {
            let detail = if validation_message.is_empty() {
                "response has no dataset".to_string()
            } else {
                format!("response has no dataset: {validation_message}")
            };
            MatrixError::ComtradeParse(detail)
        })?;
    let records = dataset
        .iter()
        .map(|entry| RawTradeEntry::deserialize(entry))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| MatrixError::ComtradeParse(err.to_string()))?;
    Ok(TradeResponse {
        records,
        validation_message,
    })
}

fn redact(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| {
            if *key == "token" {
                format!("{key}=***")
            } else {
                format!("{key}={value}")
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn code_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value.trim().to_string()),
        Value::Number(value) => Ok(value.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected code, got {other}"
        ))),
    }
}
