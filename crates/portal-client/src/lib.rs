use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use portal_types::domain::analytics::AnalyticsSummary;
use portal_types::domain::customer::Customer;
use portal_types::domain::ingest::normalize_orders;
use portal_types::domain::order::{Order, OrderStatus};
use portal_types::ports::order_cache::OrderCache;
use portal_types::ports::order_gateway::{
    FetchOutcome, GatewayError, OrderGateway, OrderList, ServerAck,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod envelope;
pub mod jsonp;
pub mod transport;

use jsonp::{CallbackRegistry, JsonpTransport, DEFAULT_JSONP_TIMEOUT};
use transport::{Call, HttpTransport, Transport};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_ORDER_LIMIT: u32 = 100;

const UPDATE_ACTION: &str = "update_status";

pub struct GatewayBuilder {
    endpoint: Url,
    proxy: Option<Url>,
    headers: HeaderMap,
    timeout: Duration,
    jsonp_timeout: Duration,
    client: Option<reqwest::Client>,
    cache: Option<Arc<dyn OrderCache>>,
    order_limit: u32,
}

/// The order endpoint as seen by the portal.
///
/// Reads go plain HTTP first and JSONP second, then fall back to the cached
/// snapshot. Status mutations try POST, GET and JSONP in that order.
pub struct RemoteOrderGateway {
    http: HttpTransport,
    jsonp: JsonpTransport,
    cache: Option<Arc<dyn OrderCache>>,
    order_limit: u32,
}

impl RemoteOrderGateway {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        Self::builder(endpoint)?.build()
    }

    pub fn builder(endpoint: &str) -> anyhow::Result<GatewayBuilder> {
        let endpoint = Url::parse(endpoint).context("invalid endpoint url")?;
        Ok(GatewayBuilder {
            endpoint,
            proxy: None,
            headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            jsonp_timeout: DEFAULT_JSONP_TIMEOUT,
            client: None,
            cache: None,
            order_limit: DEFAULT_ORDER_LIMIT,
        })
    }

    /// JSONP callbacks still waiting for a response.
    pub fn pending_callbacks(&self) -> &CallbackRegistry {
        self.jsonp.registry()
    }

    fn orders_call(&self) -> Call {
        Call::get(
            "orders",
            vec![
                ("action", "getOrders".to_string()),
                ("limit", self.order_limit.to_string()),
            ],
        )
    }

    /// Tries each attempt in order until one succeeds.
    ///
    /// The token is checked before every attempt and raced against the one in
    /// flight. A rejection or cancellation ends the chain at once.
    async fn first_success(
        &self,
        attempts: Vec<(&dyn Transport, Call)>,
        cancel: &CancellationToken,
    ) -> Result<Value, GatewayError> {
        let mut last = GatewayError::Transport("no transport attempted".into());
        for (transport, call) in attempts {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                r = transport.send(&call) => r,
            };
            match result.and_then(envelope::check) {
                Ok(value) => {
                    debug!(transport = %transport.kind(), call = call.label, "request succeeded");
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(transport = %transport.kind(), call = call.label, error = %e, "request failed, trying next transport");
                    last = e;
                }
            }
        }
        Err(last)
    }

    async fn read(&self, call: Call, cancel: &CancellationToken) -> Result<Value, GatewayError> {
        let attempts = vec![
            (&self.http as &dyn Transport, call.clone()),
            (&self.jsonp as &dyn Transport, call),
        ];
        self.first_success(attempts, cancel).await
    }
}

#[async_trait]
impl OrderGateway for RemoteOrderGateway {
    async fn fetch_orders(&self, cancel: &CancellationToken) -> FetchOutcome {
        let err = match self.try_fetch_orders(cancel).await {
            Ok(orders) => return FetchOutcome::Fetched(OrderList::live(orders)),
            Err(GatewayError::Cancelled) => return FetchOutcome::Cancelled,
            Err(e) => e,
        };

        let cached = match &self.cache {
            Some(cache) => cache.load().await,
            None => None,
        };
        match cached {
            Some(orders) => {
                warn!(error = %err, count = orders.len(), "endpoint unreachable, serving cached orders");
                FetchOutcome::Fetched(OrderList::offline(orders))
            }
            None => {
                warn!(error = %err, "endpoint unreachable and no fresh snapshot");
                FetchOutcome::Fetched(OrderList::offline(Vec::new()))
            }
        }
    }

    async fn try_fetch_orders(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Order>, GatewayError> {
        let value = self.read(self.orders_call(), cancel).await?;
        let orders = normalize_orders(&envelope::payload(value, "orders"));
        if let Some(cache) = &self.cache {
            cache.save(&orders).await;
        }
        debug!(count = orders.len(), "orders fetched");
        Ok(orders)
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<ServerAck, GatewayError> {
        let params = vec![
            ("action", UPDATE_ACTION.to_string()),
            ("order_id", order_id.to_string()),
            ("status", status.as_str().to_string()),
        ];
        let body = json!({
            "action": UPDATE_ACTION,
            "order_id": order_id,
            "status": status.as_str(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        let attempts = vec![
            (&self.http as &dyn Transport, Call::post(UPDATE_ACTION, body)),
            (&self.http as &dyn Transport, Call::get(UPDATE_ACTION, params.clone())),
            (&self.jsonp as &dyn Transport, Call::get(UPDATE_ACTION, params)),
        ];

        let value = self
            .first_success(attempts, &CancellationToken::new())
            .await?;
        info!(order_id, status = %status, "status update acknowledged");
        Ok(ServerAck::from_value(value))
    }

    async fn fetch_analytics(&self) -> AnalyticsSummary {
        let call = Call::get("analytics", vec![("action", "getAnalytics".to_string())]);
        match self.read(call, &CancellationToken::new()).await {
            Ok(value) => AnalyticsSummary::from_value(&envelope::payload(value, "analytics")),
            Err(e) => {
                warn!(error = %e, "analytics unavailable");
                AnalyticsSummary::default()
            }
        }
    }

    async fn fetch_customers(&self) -> Vec<Customer> {
        let call = Call::get("customers", vec![("action", "getCustomers".to_string())]);
        match self.read(call, &CancellationToken::new()).await {
            Ok(value) => Customer::list_from_value(&envelope::payload(value, "customers")),
            Err(e) => {
                warn!(error = %e, "customers unavailable");
                Vec::new()
            }
        }
    }
}

impl GatewayBuilder {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_jsonp_timeout(mut self, timeout: Duration) -> Self {
        self.jsonp_timeout = timeout;
        self
    }

    pub fn with_header(
        mut self,
        key: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let header_name =
            HeaderName::from_bytes(key.as_ref().as_bytes()).context("invalid header name")?;
        let header_value = HeaderValue::from_str(value.as_ref()).context("invalid header value")?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn with_reqwest_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Route plain HTTP requests through `<proxy>?target=<url>`.
    pub fn with_proxy(mut self, proxy: &str) -> anyhow::Result<Self> {
        self.proxy = Some(Url::parse(proxy).context("invalid proxy url")?);
        Ok(self)
    }

    pub fn with_cache(mut self, cache: Arc<dyn OrderCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_order_limit(mut self, limit: u32) -> Self {
        self.order_limit = limit;
        self
    }

    pub fn build(self) -> anyhow::Result<RemoteOrderGateway> {
        let client = match self.client {
            Some(client) => client,
            None => {
                let mut builder = reqwest::Client::builder().timeout(self.timeout);
                if !self.headers.is_empty() {
                    builder = builder.default_headers(self.headers);
                }
                builder.build()?
            }
        };

        Ok(RemoteOrderGateway {
            http: HttpTransport::new(client.clone(), self.endpoint.clone(), self.proxy),
            jsonp: JsonpTransport::new(client, self.endpoint, self.jsonp_timeout),
            cache: self.cache,
            order_limit: self.order_limit,
        })
    }
}
