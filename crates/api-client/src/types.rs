// In crates/api-client/src/types.rs

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

/// The REST client for a Binance-compatible spot exchange.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// The persistent HTTP client.
    pub http_client: Client,
    /// The user's API key.
    pub api_key: String,
    /// The user's secret key.
    pub secret_key: String,
    /// The base URL of the REST API.
    pub base_url: String,
    /// How long a signed request stays valid on the exchange side.
    pub recv_window_ms: u64,
}

/// Temporary struct to deserialize the kline response,
/// which is a JSON array of mixed types.
#[derive(Debug, Deserialize)]
pub struct RawKline(
    pub i64,         // 0: Open time
    pub String,      // 1: Open
    pub String,      // 2: High
    pub String,      // 3: Low
    pub String,      // 4: Close
    pub String,      // 5: Volume
    pub i64,         // 6: Close time
    pub String,      // 7: Quote asset volume
    pub i64,         // 8: Number of trades
    pub String,      // 9: Taker buy base asset volume
    pub String,      // 10: Taker buy quote asset volume
    pub String,      // 11: Ignore
);

#[derive(Debug, Deserialize, Clone)]
pub struct TickerPrice {
    pub price: Decimal,
}

/// `POST /api/v3/order` response with `newOrderRespType=FULL`.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderResponse {
    pub order_id: i64,
    pub status: String, // "FILLED", "PARTIALLY_FILLED", "EXPIRED", ...
    pub executed_qty: Decimal, // The actual filled quantity
    #[serde(rename = "cummulativeQuoteQty")]
    pub cumulative_quote_qty: Decimal, // The cumulative quote asset transacted
}
