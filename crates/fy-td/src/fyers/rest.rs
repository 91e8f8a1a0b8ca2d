//! Broker REST client.
//!
//! # Endpoints
//!
//! | Operation     | Method | Path                     | Limiter |
//! |---------------|--------|--------------------------|---------|
//! | Profile       | GET    | `/api/v3/profile`        | general |
//! | Funds         | GET    | `/api/v3/funds`          | general |
//! | Holdings      | GET    | `/api/v3/holdings`       | general |
//! | Positions     | GET    | `/api/v3/positions`      | general |
//! | Place order   | POST   | `/api/v3/orders/sync`    | order   |
//! | Modify order  | PATCH  | `/api/v3/orders/sync`    | order   |
//! | Cancel order  | DELETE | `/api/v3/orders/sync`    | order   |
//! | Order book    | GET    | `/api/v3/orders`         | general |
//! | Trade book    | GET    | `/api/v3/tradebook`      | general |
//! | History       | GET    | `/data/history`          | history |
//! | Quotes        | GET    | `/data/quotes`           | general |
//! | OHLC          | GET    | `/data/ohlc`             | general |
//! | LTP           | GET    | `/data/ltp`              | general |
//! | Depth         | GET    | `/data/depth`            | general |
//!
//! Transport failures and HTTP 429 are retried with a linearly growing delay.
//! Everything else is mapped once onto [`FyError`] and returned.

use std::sync::Arc;
use std::time::Duration;

use fy_core::FyError;
use fy_core::config::{BrokerageConfig, RestConfig};
use parking_lot::RwLock;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use super::models::*;
use super::rate_limiter::{EndpointClass, RateLimiter};

/// Called when the broker reports the session credential as unusable.
pub type SessionExpiryCallback = Arc<dyn Fn(&FyError) + Send + Sync>;

/// Broker codes that mean the access token is invalid or expired.
const TOKEN_ERROR_CODES: &[i64] = &[-8, -15, -16, -17];

pub struct RestClient {
    http: reqwest::Client,
    /// `{rest_url}/api/v3`
    api_base: String,
    /// `{data_url}/data`
    data_base: String,
    auth_header: String,
    config: RestConfig,
    general: RateLimiter,
    orders: RateLimiter,
    history: RateLimiter,
    on_session_expired: RwLock<Option<SessionExpiryCallback>>,
}

impl RestClient {
    pub fn new(config: &BrokerageConfig) -> Result<Self, FyError> {
        let rest = config.rest.clone();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(rest.request_timeout_secs))
            .build()
            .map_err(|e| FyError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            api_base: format!("{}/api/v3", rest.rest_url.trim_end_matches('/')),
            data_base: format!("{}/data", rest.data_url.trim_end_matches('/')),
            auth_header: config.auth_header(),
            general: RateLimiter::per_second(rest.general_per_sec),
            orders: RateLimiter::per_second(rest.order_per_sec),
            history: RateLimiter::per_second(rest.history_per_sec),
            config: rest,
            on_session_expired: RwLock::new(None),
        })
    }

    /// Register the hook invoked on token / permission errors.
    pub fn set_session_expiry_callback(&self, callback: SessionExpiryCallback) {
        *self.on_session_expired.write() = Some(callback);
    }

    // -----------------------------------------------------------------------
    // Account
    // -----------------------------------------------------------------------

    pub async fn profile(&self) -> Result<Profile, FyError> {
        let resp: ProfileResponse = self.get_api(EndpointClass::General, "/profile").await?;
        Ok(resp.data)
    }

    pub async fn funds(&self) -> Result<Vec<FundLimit>, FyError> {
        let resp: FundsResponse = self.get_api(EndpointClass::General, "/funds").await?;
        Ok(resp.fund_limit)
    }

    pub async fn holdings(&self) -> Result<Vec<HoldingRow>, FyError> {
        let resp: HoldingsResponse = self.get_api(EndpointClass::General, "/holdings").await?;
        Ok(resp.holdings)
    }

    pub async fn positions(&self) -> Result<Vec<PositionRow>, FyError> {
        let resp: PositionsResponse = self.get_api(EndpointClass::General, "/positions").await?;
        Ok(resp.net_positions)
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    pub async fn place_order(&self, req: &PlaceOrderRequest) -> Result<OrderActionResponse, FyError> {
        self.order_action(Method::POST, req).await
    }

    pub async fn modify_order(&self, req: &ModifyOrderRequest) -> Result<OrderActionResponse, FyError> {
        self.order_action(Method::PATCH, req).await
    }

    pub async fn cancel_order(&self, broker_order_id: &str) -> Result<OrderActionResponse, FyError> {
        let req = CancelOrderRequest {
            id: broker_order_id.to_string(),
        };
        self.order_action(Method::DELETE, &req).await
    }

    async fn order_action<B: serde::Serialize>(
        &self,
        method: Method,
        body: &B,
    ) -> Result<OrderActionResponse, FyError> {
        let body = serde_json::to_value(body).map_err(|e| FyError::Input(e.to_string()))?;
        let url = format!("{}/orders/sync", self.api_base);
        self.request(EndpointClass::Order, method, &url, &[], Some(&body))
            .await
    }

    pub async fn order_book(&self) -> Result<Vec<OrderRow>, FyError> {
        let resp: OrderBookResponse = self.get_api(EndpointClass::General, "/orders").await?;
        Ok(resp.order_book)
    }

    pub async fn trade_book(&self) -> Result<Vec<TradeRow>, FyError> {
        let resp: TradeBookResponse = self.get_api(EndpointClass::General, "/tradebook").await?;
        Ok(resp.trade_book)
    }

    // -----------------------------------------------------------------------
    // Market data
    // -----------------------------------------------------------------------

    pub async fn history(&self, req: &HistoryRequest) -> Result<Vec<Candle>, FyError> {
        let url = format!("{}/history", self.data_base);
        let query = [
            ("symbol", req.symbol.clone()),
            ("resolution", req.resolution.clone()),
            ("date_format", "0".to_string()),
            ("range_from", req.range_from.to_string()),
            ("range_to", req.range_to.to_string()),
            ("cont_flag", "1".to_string()),
        ];
        let resp: HistoryResponse = self
            .request(EndpointClass::History, Method::GET, &url, &query, None)
            .await?;
        Ok(resp.candles)
    }

    pub async fn quotes(&self, symbols: &[String]) -> Result<Vec<QuoteEntry>, FyError> {
        self.symbol_list_query("/quotes", symbols).await
    }

    pub async fn ohlc(&self, symbols: &[String]) -> Result<Vec<QuoteEntry>, FyError> {
        self.symbol_list_query("/ohlc", symbols).await
    }

    /// Last traded price per symbol.
    pub async fn ltp(&self, symbols: &[String]) -> Result<Vec<(String, f64)>, FyError> {
        let entries = self.symbol_list_query("/ltp", symbols).await?;
        Ok(entries.into_iter().map(|e| (e.n, e.v.lp)).collect())
    }

    pub async fn depth(&self, symbol: &str) -> Result<Depth, FyError> {
        let url = format!("{}/depth", self.data_base);
        let query = [
            ("symbol", symbol.to_string()),
            ("ohlcv_flag", "1".to_string()),
        ];
        let mut resp: DepthResponse = self
            .request(EndpointClass::General, Method::GET, &url, &query, None)
            .await?;
        resp.d
            .remove(symbol)
            .ok_or_else(|| FyError::Data(format!("no depth for {symbol}")))
    }

    async fn symbol_list_query(&self, path: &str, symbols: &[String]) -> Result<Vec<QuoteEntry>, FyError> {
        if symbols.is_empty() {
            return Err(FyError::InvalidArgument("no symbols".into()));
        }
        let url = format!("{}{path}", self.data_base);
        let query = [("symbols", symbols.join(","))];
        let resp: QuotesResponse = self
            .request(EndpointClass::General, Method::GET, &url, &query, None)
            .await?;
        Ok(resp.d)
    }

    // -----------------------------------------------------------------------
    // Request plumbing
    // -----------------------------------------------------------------------

    async fn get_api<T: DeserializeOwned>(&self, class: EndpointClass, path: &str) -> Result<T, FyError> {
        let url = format!("{}{path}", self.api_base);
        self.request(class, Method::GET, &url, &[], None).await
    }

    fn limiter(&self, class: EndpointClass) -> &RateLimiter {
        match class {
            EndpointClass::General => &self.general,
            EndpointClass::Order => &self.orders,
            EndpointClass::History => &self.history,
        }
    }

    /// Rate-limit, send, retry transient failures, classify the outcome.
    async fn request<T: DeserializeOwned>(
        &self,
        class: EndpointClass,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, FyError> {
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.limiter(class).acquire().await;

            let mut req = self
                .http
                .request(method.clone(), url)
                .header(AUTHORIZATION, &self.auth_header);
            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if attempt <= max_retries {
                        let delay = self.config.retry_base() * attempt;
                        warn!("[fyers-rest] {method} {url} failed ({e}), retry {attempt}/{max_retries} in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    error!("[fyers-rest] {method} {url} failed after {attempt} attempts: {e}");
                    return Err(FyError::Network(e.to_string()));
                }
            };

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt <= max_retries {
                    let delay = self.config.rate_limit_base() * attempt;
                    warn!("[fyers-rest] {method} {url} rate limited, retry {attempt}/{max_retries} in {delay:?}");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(FyError::RateLimit(format!("{method} {url}: retries exhausted")));
            }

            let text = resp
                .text()
                .await
                .map_err(|e| FyError::Network(format!("reading response: {e}")))?;
            debug!("[fyers-rest] {method} {url} -> {status}");

            let outcome = if status.is_success() {
                parse_success(&text)
            } else {
                Err(classify_error(status.as_u16(), &text))
            };
            let auth_rejected = matches!(
                status,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            );
            if let Err(e) = &outcome {
                if auth_rejected || e.is_session_error() {
                    self.notify_session_expired(e);
                }
            }
            return outcome;
        }
    }

    fn notify_session_expired(&self, err: &FyError) {
        warn!("[fyers-rest] session credential rejected: {err}");
        let callback = self.on_session_expired.read().clone();
        if let Some(cb) = callback {
            cb(err);
        }
    }
}

/// Map a non-200 response.
fn classify_error(status: u16, text: &str) -> FyError {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => classify_body(status, body),
        Err(_) => FyError::from_status(status, text.trim().to_string()),
    }
}

fn classify_body(status: u16, body: ErrorBody) -> FyError {
    if let Some(kind) = body.error_type.as_deref() {
        return FyError::from_broker(kind, body.message);
    }
    if TOKEN_ERROR_CODES.contains(&body.code) {
        return FyError::Token(body.message);
    }
    FyError::from_status(status, body.message)
}

/// Deserialize a 200 body, honouring an `"s": "error"` envelope.
fn parse_success<T: DeserializeOwned>(text: &str) -> Result<T, FyError> {
    if text.trim().is_empty() {
        return Err(FyError::Data("empty response body".into()));
    }
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| FyError::Data(format!("invalid JSON: {e}")))?;
    if value.get("s").and_then(|s| s.as_str()) == Some("error") {
        let body: ErrorBody = serde_json::from_value(value).unwrap_or_default();
        let status = u16::try_from(body.code).unwrap_or(0);
        return Err(classify_body(status, body));
    }
    serde_json::from_value(value).map_err(|e| FyError::Data(format!("unexpected response shape: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RestClient {
        let config = BrokerageConfig {
            client_id: "XX0000-100".into(),
            access_token: "tok".into(),
            rest: RestConfig {
                rest_url: server.uri(),
                data_url: server.uri(),
                max_retries: 2,
                retry_base_ms: 5,
                rate_limit_base_ms: 10,
                general_per_sec: 100,
                order_per_sec: 100,
                history_per_sec: 100,
                ..Default::default()
            },
            market_data: Default::default(),
            order_events: Default::default(),
            supervisor: Default::default(),
            subscriptions: vec![],
        };
        RestClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn profile_sends_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/profile"))
            .and(header("Authorization", "XX0000-100:tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok", "code": 200,
                "data": {"name": "A TRADER", "fy_id": "XX0000"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let profile = client(&server).profile().await.unwrap();
        assert_eq!(profile.fy_id, "XX0000");
    }

    #[tokio::test]
    async fn retries_after_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/funds"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/funds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok",
                "fund_limit": [{"id": 10, "title": "Available Balance", "equityAmount": 2500.5}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let funds = client(&server).funds().await.unwrap();
        assert_eq!(funds[0].equity_amount, 2500.5);
    }

    #[tokio::test]
    async fn exhausted_429_is_rate_limit_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/holdings"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server).holdings().await.unwrap_err();
        assert!(matches!(err, FyError::RateLimit(_)));
    }

    #[tokio::test]
    async fn token_error_invokes_session_callback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/positions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "s": "error", "code": -16, "message": "Could not authenticate",
                "error_type": "TokenException"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rest = client(&server);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        rest.set_session_expiry_callback(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        let err = rest.positions().await.unwrap_err();
        assert_eq!(err, FyError::Token("Could not authenticate".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unauthorized_status_invokes_session_callback_for_any_error_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/profile"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "s": "error", "code": -50, "message": "Invalid app id",
                "error_type": "InputException"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/funds"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "s": "error", "code": -99, "message": "Blocked",
                "error_type": "GeneralException"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rest = client(&server);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        rest.set_session_expiry_callback(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        let err = rest.profile().await.unwrap_err();
        assert_eq!(err, FyError::Input("Invalid app id".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        rest.funds().await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn error_envelope_on_200_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "error", "code": -99, "message": "Market is closed",
                "error_type": "MarketException"
            })))
            .mount(&server)
            .await;

        let err = client(&server).order_book().await.unwrap_err();
        assert!(matches!(err, FyError::Market(m) if m == "Market is closed"));
    }

    #[tokio::test]
    async fn empty_body_is_data_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/tradebook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = client(&server).trade_book().await.unwrap_err();
        assert!(matches!(err, FyError::Data(_)));
    }

    #[tokio::test]
    async fn non_200_without_error_type_uses_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/orders/sync"))
            .and(body_partial_json(json!({"symbol": "NSE:SBIN-EQ", "side": 1, "type": 2})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "s": "error", "code": -50, "message": "Invalid quantity"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let req = PlaceOrderRequest {
            symbol: "NSE:SBIN-EQ".into(),
            qty: 0,
            order_type: 2,
            side: 1,
            product_type: "INTRADAY".into(),
            limit_price: 0.0,
            stop_price: 0.0,
            validity: "DAY".into(),
            disclosed_qty: 0,
            offline_order: false,
            order_tag: None,
        };
        let err = client(&server).place_order(&req).await.unwrap_err();
        assert_eq!(err, FyError::Input("Invalid quantity".into()));
    }

    #[tokio::test]
    async fn cancel_uses_delete_with_id() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v3/orders/sync"))
            .and(body_partial_json(json!({"id": "2401"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok", "code": 1103, "message": "Order cancelled", "id": "2401"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client(&server).cancel_order("2401").await.unwrap();
        assert_eq!(resp.id, "2401");
    }

    #[tokio::test]
    async fn history_query_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/history"))
            .and(query_param("symbol", "NSE:SBIN-EQ"))
            .and(query_param("resolution", "D"))
            .and(query_param("range_from", "1700000000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok", "candles": [[1700000000, 600, 610, 595, 605, 12000]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let candles = client(&server)
            .history(&HistoryRequest {
                symbol: "NSE:SBIN-EQ".into(),
                resolution: "D".into(),
                range_from: 1_700_000_000,
                range_to: 1_700_086_400,
            })
            .await
            .unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0][4], 605.0);
    }

    #[tokio::test]
    async fn ltp_and_depth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/ltp"))
            .and(query_param("symbols", "NSE:SBIN-EQ,NSE:TCS-EQ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok",
                "d": [{"n": "NSE:SBIN-EQ", "v": {"lp": 812.3}}, {"n": "NSE:TCS-EQ", "v": {"lp": 3900.0}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/depth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok",
                "d": {"NSE:SBIN-EQ": {"bids": [{"price": 812.2, "volume": 50, "ord": 2}], "ask": [], "ltp": 812.3}}
            })))
            .mount(&server)
            .await;

        let rest = client(&server);
        let ltp = rest
            .ltp(&["NSE:SBIN-EQ".to_string(), "NSE:TCS-EQ".to_string()])
            .await
            .unwrap();
        assert_eq!(ltp[1], ("NSE:TCS-EQ".to_string(), 3900.0));

        let depth = rest.depth("NSE:SBIN-EQ").await.unwrap();
        assert_eq!(depth.bids[0].ord, 2);
        assert!(depth.asks.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_becomes_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let server = MockServer::start().await;
        let mut rest = client(&server);
        rest.api_base = format!("http://{addr}/api/v3");
        let err = rest.profile().await.unwrap_err();
        assert!(matches!(err, FyError::Network(_)));
    }

    #[test]
    fn token_codes_without_error_type() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"s":"error","code":-16,"message":"expired"}"#).unwrap();
        assert_eq!(classify_body(200, body), FyError::Token("expired".into()));
        assert!(matches!(classify_error(503, "<html>"), FyError::Network(_)));
    }
}
