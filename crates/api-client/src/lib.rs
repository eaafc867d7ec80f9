// In crates/api-client/src/lib.rs

use app_config::types::ExchangeSettings;
use async_trait::async_trait;
use chrono::Utc;
use core_types::{FillStatus, Kline, OrderAmount, OrderFill, OrderRequest, Symbol};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::Value;
use sha2::Sha256;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
// Create a type alias for the HMAC-SHA256 implementation.
type HmacSha256 = Hmac<Sha256>;

pub mod error;
pub mod scripted;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use scripted::{ScriptedExchange, ScriptedFill};
pub use types::*;

/// The capability the trading core needs from an exchange.
///
/// Any implementation (the REST client, the paper exchange, a scripted fake) is interchangeable;
/// the core never looks past this interface.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// The name of the exchange backend, for logs.
    fn name(&self) -> &'static str;

    /// The latest `count` closed candles for `symbol`, oldest first.
    async fn get_candles(&self, symbol: &Symbol, interval: &str, count: u16) -> Result<Vec<Kline>>;

    /// The last traded price.
    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal>;

    /// Submits an immediate order and reports what actually filled.
    ///
    /// A rejected or unfilled order is reported as `FillStatus::Failed`, not as an `Err`;
    /// `Err` means the outcome is unknown or the exchange could not be reached.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderFill>;
}

#[async_trait]
impl<T: Exchange + ?Sized> Exchange for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn get_candles(&self, symbol: &Symbol, interval: &str, count: u16) -> Result<Vec<Kline>> {
        (**self).get_candles(symbol, interval, count).await
    }

    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal> {
        (**self).get_price(symbol).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderFill> {
        (**self).place_order(order).await
    }
}

/// Awaits an exchange call under an explicit deadline. Elapsing is reported as `Error::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(limit)),
    }
}

impl ApiClient {
    /// Constructs a new ApiClient from ExchangeSettings.
    pub fn new(settings: &ExchangeSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| Error::ClientBuildError(e.to_string()))?;
        Ok(ApiClient {
            http_client,
            api_key: settings.api_key.clone(),
            secret_key: settings.secret_key.clone(),
            base_url: settings.rest_base_url.trim_end_matches('/').to_string(),
            recv_window_ms: settings.recv_window_ms,
        })
    }

    /// Generates an HMAC-SHA256 signature for a given query string.
    ///
    /// # Returns
    ///
    /// A hexadecimal string representation of the signature.
    fn sign(&self, query_string: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| Error::ClientBuildError(format!("invalid secret key: {e}")))?;
        mac.update(query_string.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Appends `recvWindow`, `timestamp` and `signature` to the parameters.
    fn create_signed_query(&self, params: &mut String) -> Result<()> {
        let timestamp = Utc::now().timestamp_millis();

        if !params.is_empty() {
            params.push('&');
        }
        params.push_str(&format!("recvWindow={}&timestamp={}", self.recv_window_ms, timestamp));

        let signature = self.sign(params)?;
        params.push_str(&format!("&signature={}", signature));
        Ok(())
    }

    /// Turns a response body into JSON, surfacing the exchange's `{code, msg}` error shape.
    fn parse_body(text: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(text).map_err(Error::DeserializationFailed)?;
        if let Some(code) = value.get("code").and_then(Value::as_i64) {
            if code != 0 {
                let msg = value.get("msg").and_then(Value::as_str).unwrap_or("Unknown error").to_string();
                return Err(Error::ApiError { code, msg });
            }
        }
        Ok(value)
    }

    /// Fetches historical kline (candlestick) data.
    ///
    /// This corresponds to the `GET /api/v3/klines` endpoint.
    pub async fn get_historical_klines(
        &self,
        symbol: &Symbol,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Kline>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol.exchange_code(),
            interval,
            limit
        );

        let body = self.http_client.get(&url).send().await?.text().await?;
        let value = Self::parse_body(&body)?;
        let raw_klines: Vec<RawKline> = serde_json::from_value(value)?;

        raw_klines.into_iter().map(kline_from_raw).collect()
    }

    /// Fetches the last traded price.
    ///
    /// This corresponds to the `GET /api/v3/ticker/price` endpoint.
    pub async fn get_ticker_price(&self, symbol: &Symbol) -> Result<Decimal> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            symbol.exchange_code()
        );
        let body = self.http_client.get(&url).send().await?.text().await?;
        let ticker: TickerPrice = serde_json::from_value(Self::parse_body(&body)?)?;
        Ok(ticker.price)
    }

    /// Places a new market order.
    /// Corresponds to `POST /api/v3/order`. Buys are sized by quote amount, sells by quantity.
    pub async fn place_market_order(&self, order: &OrderRequest) -> Result<NewOrderResponse> {
        let size_param = match order.amount {
            OrderAmount::Quote(amount) => format!("quoteOrderQty={}", amount.round_dp(8).normalize()),
            OrderAmount::Base(quantity) => format!("quantity={}", quantity.normalize()),
        };
        let mut params = format!(
            "symbol={}&side={}&type=MARKET&{}&newOrderRespType=FULL",
            order.symbol.exchange_code(),
            order.side,
            size_param
        );
        self.create_signed_query(&mut params)?;

        let url = format!("{}/api/v3/order", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(params)
            .send()
            .await?;

        let text = response.text().await?;
        let order_response: NewOrderResponse = serde_json::from_value(Self::parse_body(&text)?)?;

        Ok(order_response)
    }
}

fn kline_from_raw(raw: RawKline) -> Result<Kline> {
    let parse = |field: &str| -> Result<Decimal> {
        field
            .parse()
            .map_err(|_| Error::ApiError { code: -1, msg: format!("malformed kline field: {field}") })
    };
    Ok(Kline {
        open_time: raw.0,
        open: parse(&raw.1)?,
        high: parse(&raw.2)?,
        low: parse(&raw.3)?,
        close: parse(&raw.4)?,
        volume: parse(&raw.5)?,
        close_time: raw.6,
    })
}

/// Maps the exchange's order response onto the core's fill model.
///
/// Whatever the reported status, the executed quantity decides: nothing executed means failed,
/// less than a fully `FILLED` order means partial. The average price comes from the cumulative
/// quote amount, which already reflects every individual trade.
pub fn fill_from_response(response: &NewOrderResponse) -> OrderFill {
    let order_id = Some(response.order_id.to_string());
    if response.executed_qty <= Decimal::ZERO {
        return OrderFill::failed(order_id);
    }
    let status = if response.status == "FILLED" { FillStatus::Filled } else { FillStatus::Partial };
    OrderFill {
        order_id,
        status,
        filled_quantity: response.executed_qty,
        avg_price: response.cumulative_quote_qty / response.executed_qty,
    }
}

#[async_trait]
impl Exchange for ApiClient {
    fn name(&self) -> &'static str {
        "SpotRestClient"
    }

    async fn get_candles(&self, symbol: &Symbol, interval: &str, count: u16) -> Result<Vec<Kline>> {
        let mut klines = self.get_historical_klines(symbol, interval, count).await?;
        // The last kline is still forming; only closed candles feed the indicator.
        let now = Utc::now().timestamp_millis();
        klines.retain(|k| k.close_time < now);
        Ok(klines)
    }

    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal> {
        self.get_ticker_price(symbol).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderFill> {
        tracing::info!(symbol = %order.symbol, side = %order.side, amount = ?order.amount, "Submitting market order.");
        match self.place_market_order(order).await {
            Ok(response) => {
                let fill = fill_from_response(&response);
                tracing::info!(order_id = response.order_id, status = %response.status, ?fill, "Order acknowledged.");
                Ok(fill)
            }
            // The exchange answered and refused: the order definitely did not trade.
            Err(Error::ApiError { code, msg }) => {
                tracing::error!(code, %msg, "Order rejected by exchange.");
                Ok(OrderFill::failed(None))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient {
            http_client: reqwest::Client::new(),
            api_key: "key".into(),
            secret_key: "secret".into(),
            base_url: server.uri(),
            recv_window_ms: 5000,
        }
    }

    fn response(status: &str, executed: Decimal, quote: Decimal) -> NewOrderResponse {
        NewOrderResponse { order_id: 7, status: status.into(), executed_qty: executed, cumulative_quote_qty: quote }
    }

    #[test]
    fn test_full_fill_average_price() {
        let fill = fill_from_response(&response("FILLED", dec!(0.1), dec!(10)));
        assert_eq!(fill.status, FillStatus::Filled);
        assert_eq!(fill.avg_price, dec!(100));
        assert_eq!(fill.order_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_expired_with_execution_is_partial() {
        let fill = fill_from_response(&response("EXPIRED", dec!(0.06), dec!(6)));
        assert_eq!(fill.status, FillStatus::Partial);
        assert_eq!(fill.filled_quantity, dec!(0.06));
    }

    #[test]
    fn test_nothing_executed_is_failed() {
        let fill = fill_from_response(&response("EXPIRED", Decimal::ZERO, Decimal::ZERO));
        assert_eq!(fill.status, FillStatus::Failed);
    }

    #[test]
    fn test_raw_kline_parsing() {
        let raw: RawKline = serde_json::from_str(
            r#"[1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","0"]"#,
        )
        .unwrap();
        let kline = kline_from_raw(raw).unwrap();
        assert_eq!(kline.open_time, 1499040000000);
        assert_eq!(kline.close, dec!(0.01577100));
        assert_eq!(kline.close_time, 1499644799999);
    }

    #[test]
    fn test_error_body_is_surfaced() {
        let err = ApiClient::parse_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#).unwrap_err();
        assert!(matches!(err, Error::ApiError { code: -1121, .. }));
    }

    #[test]
    fn test_signature_is_deterministic_hex() {
        let client = ApiClient {
            http_client: reqwest::Client::new(),
            api_key: "key".into(),
            secret_key: "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j".into(),
            base_url: "https://api.binance.com".into(),
            recv_window_ms: 5000,
        };
        // Reference vector from the exchange's signed-endpoint documentation.
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            client.sign(query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[tokio::test]
    async fn test_with_timeout_reports_elapsed_deadline() {
        let result: Result<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_get_candles_drops_forming_kline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .and(query_param("symbol", "BTCUSDT"))
            .and(query_param("interval", "1h"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                [1700000000000i64, "100", "101", "99", "100.5", "12", 1700003599999i64, "1200", 10, "6", "600", "0"],
                [4102444800000i64, "100.5", "102", "100", "101", "3", 4102448399999i64, "300", 4, "1", "100", "0"]
            ])))
            .mount(&server)
            .await;

        let klines = client_for(&server).get_candles(&Symbol::new("BTC/USDT"), "1h", 2).await.unwrap();
        assert_eq!(klines.len(), 1);
        assert_eq!(klines[0].close, dec!(100.5));
    }

    #[tokio::test]
    async fn test_get_price_reads_ticker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/price"))
            .and(query_param("symbol", "ETHUSDT"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"symbol": "ETHUSDT", "price": "2000.50"})),
            )
            .mount(&server)
            .await;

        let price = client_for(&server).get_price(&Symbol::new("ETHUSDT")).await.unwrap();
        assert_eq!(price, dec!(2000.50));
    }

    #[tokio::test]
    async fn test_place_order_sends_signed_quote_sized_buy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/order"))
            .and(header("X-MBX-APIKEY", "key"))
            .and(body_string_contains("symbol=BTCUSDT&side=BUY&type=MARKET&quoteOrderQty=10&newOrderRespType=FULL"))
            .and(body_string_contains("recvWindow=5000"))
            .and(body_string_contains("&signature="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "symbol": "BTCUSDT",
                "orderId": 42,
                "status": "FILLED",
                "side": "BUY",
                "executedQty": "0.1",
                "cummulativeQuoteQty": "10",
                "fills": [{"price": "100", "qty": "0.1", "commission": "0", "commissionAsset": "BNB"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = OrderRequest::market_buy(Symbol::new("BTC/USDT"), dec!(10));
        let fill = client_for(&server).place_order(&order).await.unwrap();
        assert_eq!(fill.status, FillStatus::Filled);
        assert_eq!(fill.order_id.as_deref(), Some("42"));
        assert_eq!(fill.avg_price, dec!(100));
    }

    #[tokio::test]
    async fn test_place_order_sells_by_quantity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/order"))
            .and(body_string_contains("side=SELL&type=MARKET&quantity=0.06"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "orderId": 43,
                "status": "EXPIRED",
                "executedQty": "0.04",
                "cummulativeQuoteQty": "4.2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = OrderRequest::market_sell(Symbol::new("BTCUSDT"), dec!(0.06));
        let fill = client_for(&server).place_order(&order).await.unwrap();
        assert_eq!(fill.status, FillStatus::Partial);
        assert_eq!(fill.filled_quantity, dec!(0.04));
        assert_eq!(fill.avg_price, dec!(105));
    }

    #[tokio::test]
    async fn test_rejected_order_is_a_failed_fill() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/order"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"code": -2010, "msg": "Account has insufficient balance."})),
            )
            .mount(&server)
            .await;

        let order = OrderRequest::market_buy(Symbol::new("BTCUSDT"), dec!(10));
        let fill = client_for(&server).place_order(&order).await.unwrap();
        assert_eq!(fill.status, FillStatus::Failed);
        assert_eq!(fill.filled_quantity, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/price"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server).get_price(&Symbol::new("BTCUSDT")).await;
        assert!(matches!(result, Err(Error::DeserializationFailed(_))));
    }
}
