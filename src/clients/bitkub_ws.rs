// WebSocket ticker feed for Bitkub

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use crate::core::resilience::ShutdownSignal;

/// Last traded prices pushed by the ticker stream, keyed by symbol
#[derive(Debug, Clone, Default)]
pub struct TickerCache {
    prices: Arc<RwLock<HashMap<String, (f64, Instant)>>>,
}

impl TickerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, symbol: &str, last: f64) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(symbol.to_string(), (last, Instant::now()));
        }
    }

    pub fn latest(&self, symbol: &str) -> Option<f64> {
        let prices = self.prices.read().ok()?;
        prices.get(symbol).map(|(last, _)| *last)
    }

    /// Price for `symbol` if it was received within `max_age`
    pub fn fresh(&self, symbol: &str, max_age: Duration) -> Option<f64> {
        let prices = self.prices.read().ok()?;
        prices
            .get(symbol)
            .filter(|(_, at)| at.elapsed() <= max_age)
            .map(|(last, _)| *last)
    }
}

/// Extract the last price from a ticker message
pub fn parse_bitkub_ticker(data: &Value) -> Option<f64> {
    match data.get("last")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
    .filter(|last| *last > 0.0)
}

pub struct TickerStream {
    ws_url: String,
    symbol: String,
    cache: TickerCache,
    reconnect_delay: Duration,
}

impl TickerStream {
    pub fn new(ws_url: &str, symbol: &str, cache: TickerCache) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
            symbol: symbol.to_string(),
            cache,
            reconnect_delay: Duration::from_secs(1),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn stream_url(&self) -> String {
        format!("{}/market.ticker.{}", self.ws_url, self.symbol.to_ascii_lowercase())
    }

    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Keep the feed alive, reconnecting after every close or error, until shutdown
    pub async fn run(self, shutdown: ShutdownSignal) {
        while !shutdown.is_triggered() {
            tokio::select! {
                result = self.consume() => match result {
                    Ok(()) => warn!("⚠️ Ticker stream {} closed", self.stream_url()),
                    Err(e) => error!("❌ Ticker stream {} failed: {}", self.stream_url(), e),
                },
                _ = shutdown.wait() => break,
            }

            tokio::select! {
                _ = sleep(self.reconnect_delay) => debug!("Reconnecting ticker stream"),
                _ = shutdown.wait() => break,
            }
        }

        info!("🛑 Ticker stream for {} stopped", self.symbol);
    }

    async fn consume(&self) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let url = self.stream_url();
        let (mut ws_stream, _) = connect_async(url.as_str()).await?;
        info!("✅ Connected to {}", url);

        while let Some(message) = ws_stream.next().await {
            match message? {
                Message::Text(text) => {
                    // A frame may carry several newline-separated messages
                    for line in text.lines().filter(|l| !l.trim().is_empty()) {
                        if let Ok(data) = serde_json::from_str::<Value>(line) {
                            if let Some(last) = parse_bitkub_ticker(&data) {
                                self.cache.update(&self.symbol, last);
                            }
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_ticker_message() {
        let msg = json!({"stream": "market.ticker.thb_btc", "id": 1, "last": 1_000_000.5});
        assert_eq!(parse_bitkub_ticker(&msg), Some(1_000_000.5));

        let msg = json!({"stream": "market.ticker.thb_btc", "last": "2000"});
        assert_eq!(parse_bitkub_ticker(&msg), Some(2000.0));

        assert_eq!(parse_bitkub_ticker(&json!({"last": 0})), None);
        assert_eq!(parse_bitkub_ticker(&json!({"event": "ping"})), None);
    }

    #[test]
    fn test_cache_freshness() {
        let cache = TickerCache::new();
        assert!(cache.latest("THB_BTC").is_none());

        cache.update("THB_BTC", 42.0);
        assert_eq!(cache.latest("THB_BTC"), Some(42.0));
        assert_eq!(cache.fresh("THB_BTC", Duration::from_secs(60)), Some(42.0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.fresh("THB_BTC", Duration::from_millis(1)), None);
    }

    #[test]
    fn test_stream_url() {
        let stream = TickerStream::new("wss://api.bitkub.com/websocket-api/", "THB_BTC", TickerCache::new());
        assert_eq!(stream.stream_url(), "wss://api.bitkub.com/websocket-api/market.ticker.thb_btc");
    }
}
