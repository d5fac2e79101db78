// Bitkub REST client implementing the exchange gateway

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Method, Url};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::clients::bitkub_ws::TickerCache;
use crate::clients::{ExchangeGateway, GatewayError};
use crate::config::ExchangeConfig;
use crate::core::types::{
    Balances, Order, OrderInfo, OrderRequest, OrderResult, OrderStatus, OrderType, Pair, Side, Ticker,
};

type HmacSha256 = Hmac<Sha256>;

const TICKER_PATH: &str = "/api/market/ticker";
const BALANCES_PATH: &str = "/api/v3/market/balances";
const PLACE_BID_PATH: &str = "/api/v3/market/place-bid";
const PLACE_ASK_PATH: &str = "/api/v3/market/place-ask";
const CANCEL_PATH: &str = "/api/v3/market/cancel-order";
const OPEN_ORDERS_PATH: &str = "/api/v3/market/my-open-orders";
const ORDER_INFO_PATH: &str = "/api/v3/market/order-info";

/// Format `value` with `precision` decimals and strip trailing zeros
/// (`0.00150000` -> `0.0015`, `995000.00` -> `995000`).
pub fn format_decimal(value: f64, precision: usize) -> String {
    let formatted = format!("{:.*}", precision, value);
    if !formatted.contains('.') {
        return formatted;
    }
    formatted.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// JSON number written exactly as `format_decimal` prints it, never in
/// exponent form
fn decimal_value(value: f64, precision: usize) -> Result<Box<RawValue>, GatewayError> {
    let text = format_decimal(value, precision);
    RawValue::from_string(text.clone()).map_err(|_| GatewayError::Parse(format!("not a decimal: {}", text)))
}

#[derive(Serialize)]
struct PlaceOrderBody<'a> {
    sym: String,
    amt: Box<RawValue>,
    rat: Box<RawValue>,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
}

#[derive(Debug)]
pub struct BitkubClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    price_precision: usize,  // also used for quote-currency amounts
    amount_precision: usize, // base-currency amounts
    ticker_cache: Option<(TickerCache, Duration)>,
}

impl BitkubClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            price_precision: config.price_precision,
            amount_precision: config.amount_precision,
            ticker_cache: None,
        })
    }

    /// Serve ticker prices from a streaming cache while they are younger than `max_age`
    pub fn with_ticker_cache(mut self, cache: TickerCache, max_age: Duration) -> Self {
        self.ticker_cache = Some((cache, max_age));
        self
    }

    /// Hex HMAC-SHA256 of the request payload
    pub fn sign(&self, payload: &str) -> Result<String, GatewayError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| GatewayError::Auth(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| GatewayError::Parse(format!("bad url: {}", e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn public_get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, GatewayError> {
        let url = self.url(path, query)?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(GatewayError::Http(response.status().as_u16()));
        }

        response.json::<Value>().await.map_err(|e| GatewayError::Parse(e.to_string()))
    }

    async fn secure_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<Value, GatewayError> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(GatewayError::Auth("API credentials not configured".to_string()));
        }

        let url = self.url(path, query)?;
        let timestamp = Utc::now().timestamp_millis().to_string();
        let has_body = body.is_some();
        let body_text = body.unwrap_or_default();

        let mut payload = format!("{}{}{}", timestamp, method.as_str(), path);
        if let Some(q) = url.query() {
            payload.push('?');
            payload.push_str(q);
        }
        payload.push_str(&body_text);
        let signature = self.sign(&payload)?;

        let mut request = self
            .client
            .request(method, url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header("X-BTK-APIKEY", &self.api_key)
            .header("X-BTK-TIMESTAMP", &timestamp)
            .header("X-BTK-SIGN", signature);
        if has_body {
            request = request.body(body_text);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::Http(response.status().as_u16()));
        }

        let json: Value = response.json().await.map_err(|e| GatewayError::Parse(e.to_string()))?;
        unwrap_result(json)
    }
}

/// Strip the `{"error": 0, "result": ...}` envelope
fn unwrap_result(json: Value) -> Result<Value, GatewayError> {
    let code = json
        .get("error")
        .and_then(Value::as_i64)
        .ok_or_else(|| GatewayError::Parse("missing error field".to_string()))?;

    match code {
        0 => Ok(json.get("result").cloned().unwrap_or(Value::Null)),
        3 | 5 | 6 => Err(GatewayError::Auth(format!("exchange error code {}", code))),
        _ => Err(GatewayError::Exchange { code }),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Num(f64),
    Text(String),
}

fn loose_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Loose::deserialize(deserializer)? {
        Loose::Num(n) => Ok(n),
        Loose::Text(s) => s.trim().parse::<f64>().map_err(D::Error::custom),
    }
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected string or number, got {}", other))),
    }
}

fn timestamp_from(raw: &Value) -> Option<DateTime<Utc>> {
    let secs_or_millis = match raw {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.parse::<i64>().ok()?,
        _ => return None,
    };
    if secs_or_millis > 1_000_000_000_000 {
        Utc.timestamp_millis_opt(secs_or_millis).single()
    } else {
        Utc.timestamp_opt(secs_or_millis, 0).single()
    }
}

#[derive(Deserialize)]
struct WireOpenOrder {
    #[serde(deserialize_with = "loose_string")]
    id: String,
    hash: String,
    side: String,
    #[serde(rename = "type", default)]
    order_type: Option<String>,
    #[serde(deserialize_with = "loose_f64")]
    rate: f64,
    #[serde(deserialize_with = "loose_f64", default)]
    fee: f64,
    #[serde(deserialize_with = "loose_f64", default)]
    credit: f64,
    #[serde(deserialize_with = "loose_f64")]
    amount: f64,
    #[serde(deserialize_with = "loose_f64", default)]
    receive: f64,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    ts: Value,
}

impl WireOpenOrder {
    fn into_order(self) -> Result<Order, GatewayError> {
        let side = Side::parse(&self.side)
            .ok_or_else(|| GatewayError::Parse(format!("unknown side '{}'", self.side)))?;
        let order_type = match self.order_type.as_deref() {
            Some("market") => OrderType::Market,
            _ => OrderType::Limit,
        };

        Ok(Order {
            id: self.id,
            hash: self.hash,
            side,
            order_type,
            rate: self.rate,
            fee: self.fee,
            credit: self.credit,
            amount: self.amount,
            receive: self.receive,
            client_id: self.client_id.filter(|c| !c.is_empty()),
            created_at: timestamp_from(&self.ts),
        })
    }
}

#[derive(Deserialize)]
struct WirePlacedOrder {
    #[serde(deserialize_with = "loose_string")]
    id: String,
    hash: String,
    #[serde(deserialize_with = "loose_f64", default)]
    amt: f64,
    #[serde(deserialize_with = "loose_f64", default)]
    rat: f64,
    #[serde(deserialize_with = "loose_f64", default)]
    fee: f64,
    #[serde(deserialize_with = "loose_f64", default)]
    rec: f64,
}

#[derive(Deserialize)]
struct WireOrderInfo {
    #[serde(deserialize_with = "loose_string")]
    id: String,
    status: String,
    #[serde(deserialize_with = "loose_f64", default)]
    amount: f64,
    #[serde(deserialize_with = "loose_f64", default)]
    rate: f64,
    #[serde(deserialize_with = "loose_f64", default)]
    filled: f64,
}

#[derive(Deserialize)]
struct WireBalance {
    #[serde(deserialize_with = "loose_f64")]
    available: f64,
}

fn parse_pair(symbol: &str) -> Result<Pair, GatewayError> {
    Pair::parse(symbol).ok_or_else(|| GatewayError::Parse(format!("invalid symbol '{}'", symbol)))
}

#[async_trait]
impl ExchangeGateway for BitkubClient {
    async fn ticker(&self, symbol: &str) -> Result<Ticker, GatewayError> {
        if let Some((cache, max_age)) = &self.ticker_cache {
            if let Some(last) = cache.fresh(symbol, *max_age) {
                return Ok(Ticker::from_last(last));
            }
        }

        let json = self.public_get(TICKER_PATH, &[("sym", symbol)]).await?;
        let entry = json
            .get(symbol)
            .ok_or_else(|| GatewayError::Unavailable(format!("no ticker for {}", symbol)))?;

        let last = entry
            .get("last")
            .and_then(Value::as_f64)
            .ok_or_else(|| GatewayError::Parse("ticker without last price".to_string()))?;

        Ok(Ticker {
            last,
            highest_bid: entry.get("highestBid").and_then(Value::as_f64),
            lowest_ask: entry.get("lowestAsk").and_then(Value::as_f64),
        })
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<Order>, GatewayError> {
        let pair = parse_pair(symbol)?;
        let market = pair.market_symbol();
        let result = self
            .secure_request(Method::GET, OPEN_ORDERS_PATH, &[("sym", market.as_str())], None)
            .await?;

        if result.is_null() {
            return Ok(Vec::new());
        }

        let wire: Vec<WireOpenOrder> =
            serde_json::from_value(result).map_err(|e| GatewayError::Parse(e.to_string()))?;
        wire.into_iter().map(WireOpenOrder::into_order).collect()
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderResult, GatewayError> {
        let pair = parse_pair(&request.symbol)?;
        let (path, amount_precision) = match request.side {
            Side::Buy => (PLACE_BID_PATH, self.price_precision),
            Side::Sell => (PLACE_ASK_PATH, self.amount_precision),
        };

        let body = PlaceOrderBody {
            sym: pair.market_symbol(),
            amt: decimal_value(request.amount, amount_precision)?,
            rat: decimal_value(request.price, self.price_precision)?,
            typ: request.order_type.as_str(),
            client_id: request.client_id.as_deref(),
        };
        let body = serde_json::to_string(&body).map_err(|e| GatewayError::Parse(e.to_string()))?;

        debug!(
            side = request.side.as_str(),
            amount = %format_decimal(request.amount, amount_precision),
            price = %format_decimal(request.price, self.price_precision),
            "Placing order"
        );

        let result = self.secure_request(Method::POST, path, &[], Some(body)).await?;
        let placed: WirePlacedOrder =
            serde_json::from_value(result).map_err(|e| GatewayError::Parse(e.to_string()))?;

        Ok(OrderResult {
            id: placed.id,
            hash: placed.hash,
            amount: placed.amt,
            rate: placed.rat,
            fee: placed.fee,
            receive: placed.rec,
        })
    }

    async fn cancel_order(&self, hash: &str) -> Result<(), GatewayError> {
        self.secure_request(Method::POST, CANCEL_PATH, &[], Some(json!({ "hash": hash }).to_string()))
            .await
            .map(|_| ())
    }

    async fn order_info(&self, hash: &str) -> Result<OrderInfo, GatewayError> {
        let result = self
            .secure_request(Method::GET, ORDER_INFO_PATH, &[("hash", hash)], None)
            .await?;
        let info: WireOrderInfo =
            serde_json::from_value(result).map_err(|e| GatewayError::Parse(e.to_string()))?;

        Ok(OrderInfo {
            id: info.id,
            status: OrderStatus::parse(&info.status),
            amount: info.amount,
            rate: info.rate,
            filled: info.filled,
        })
    }

    async fn available_balances(&self) -> Result<Balances, GatewayError> {
        let result = self
            .secure_request(Method::POST, BALANCES_PATH, &[], Some("{}".to_string()))
            .await?;

        let map = result
            .as_object()
            .ok_or_else(|| GatewayError::Parse("balances result is not an object".to_string()))?;

        let mut balances = Balances::new();
        for (currency, raw) in map {
            match serde_json::from_value::<WireBalance>(raw.clone()) {
                Ok(balance) if balance.available > 0.0 => {
                    balances.insert(currency.to_ascii_uppercase(), balance.available);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable balance for {}: {}", currency, e),
            }
        }

        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(secret: &str) -> BitkubClient {
        let config = ExchangeConfig {
            api_key: "key".to_string(),
            api_secret: secret.to_string(),
            ..ExchangeConfig::default()
        };
        BitkubClient::new(&config).unwrap()
    }

    #[test]
    fn test_format_decimal_strips_trailing_zeros() {
        assert_eq!(format_decimal(0.0015, 8), "0.0015");
        assert_eq!(format_decimal(995000.0, 2), "995000");
        assert_eq!(format_decimal(225.0 / 1_005_000.0, 8), "0.00022388");
        assert_eq!(format_decimal(12.7, 0), "13");
    }

    #[test]
    fn test_small_amounts_are_not_written_in_exponent_form() {
        let body = PlaceOrderBody {
            sym: "btc_thb".to_string(),
            amt: decimal_value(0.0000052, 8).unwrap(),
            rat: decimal_value(995000.0, 2).unwrap(),
            typ: "limit",
            client_id: None,
        };
        let text = serde_json::to_string(&body).unwrap();

        assert_eq!(text, r#"{"sym":"btc_thb","amt":0.0000052,"rat":995000,"typ":"limit"}"#);
        assert!(decimal_value(f64::NAN, 8).is_err());
    }

    #[test]
    fn test_signature_is_hex_and_deterministic() {
        let c = client("secret");
        let a = c.sign("1700000000000POST/api/v3/market/balances{}").unwrap();
        let b = c.sign("1700000000000POST/api/v3/market/balances{}").unwrap();
        let other = c.sign("1700000000001POST/api/v3/market/balances{}").unwrap();

        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_eq!(a, b);
        assert_ne!(a, other);
        assert_ne!(a, client("another").sign("1700000000000POST/api/v3/market/balances{}").unwrap());
    }

    #[test]
    fn test_unwrap_result_maps_error_codes() {
        assert_eq!(unwrap_result(json!({"error": 0, "result": [1]})).unwrap(), json!([1]));
        assert!(matches!(unwrap_result(json!({"error": 6})), Err(GatewayError::Auth(_))));
        assert!(matches!(
            unwrap_result(json!({"error": 18})),
            Err(GatewayError::Exchange { code: 18 })
        ));
        assert!(matches!(unwrap_result(json!({"result": 1})), Err(GatewayError::Parse(_))));
    }

    #[test]
    fn test_open_order_accepts_string_numbers() {
        let wire: WireOpenOrder = serde_json::from_value(json!({
            "id": 42,
            "hash": "fwQ6dnQ",
            "side": "SELL",
            "type": "limit",
            "rate": "1005000.00",
            "fee": "0.56",
            "credit": "0.56",
            "amount": "0.00022388",
            "receive": "225.00",
            "client_id": "",
            "ts": 1707220636
        }))
        .unwrap();

        let order = wire.into_order().unwrap();
        assert_eq!(order.id, "42");
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.rate, 1_005_000.0);
        assert_eq!(order.receive, 225.0);
        assert!(order.client_id.is_none());
        assert!(order.created_at.is_some());
    }
}
