//! JSONP fallback transport.
//!
//! Some deployments of the endpoint only answer script-style requests: the
//! response is `callback({...})` instead of plain JSON. Every request gets a
//! unique callback name which stays registered until the request settles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use portal_types::ports::order_gateway::GatewayError;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::transport::{cache_buster, map_reqwest, with_query, Call, Method, Transport, TransportKind};

pub const DEFAULT_JSONP_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback names currently waiting for a response.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    pending: Arc<DashMap<String, Instant>>,
}

impl CallbackRegistry {
    pub fn register(&self, name: String) -> CallbackSlot {
        self.pending.insert(name.clone(), Instant::now());
        CallbackSlot {
            name,
            pending: self.pending.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pending.contains_key(name)
    }
}

/// Deregisters its callback when dropped, whichever way the request ended.
pub struct CallbackSlot {
    name: String,
    pending: Arc<DashMap<String, Instant>>,
}

impl CallbackSlot {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CallbackSlot {
    fn drop(&mut self) {
        if let Some((_, since)) = self.pending.remove(&self.name) {
            debug!(callback = %self.name, elapsed_ms = since.elapsed().as_millis() as u64, "jsonp callback released");
        }
    }
}

/// `<prefix>_<epoch-ms>_<9 random chars>`
pub fn callback_name(prefix: &str) -> String {
    let prefix: String = prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), &random[..9])
}

/// Extracts the JSON argument of `name(...)`.
///
/// Tolerates a leading `/**/` and a trailing `;`. A plain JSON body is
/// accepted as is, for endpoints that ignore the callback parameter.
pub fn unwrap_jsonp(body: &str, name: &str) -> Result<Value, GatewayError> {
    let trimmed = body.trim();
    let trimmed = trimmed.strip_prefix("/**/").unwrap_or(trimmed).trim_start();

    if let Some(rest) = trimmed.strip_prefix(name) {
        let rest = rest.trim();
        let rest = rest.strip_suffix(';').unwrap_or(rest).trim_end();
        let inner = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(|| GatewayError::Decode(format!("malformed call to {name}")))?;
        return serde_json::from_str(inner).map_err(|e| GatewayError::Decode(e.to_string()));
    }

    serde_json::from_str(trimmed)
        .map_err(|_| GatewayError::Decode(format!("callback {name} was not invoked")))
}

pub struct JsonpTransport {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
    registry: CallbackRegistry,
}

impl JsonpTransport {
    pub fn new(client: reqwest::Client, endpoint: Url, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
            registry: CallbackRegistry::default(),
        }
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    async fn request(&self, url: Url, name: &str) -> Result<Value, GatewayError> {
        let res = self.client.get(url).send().await.map_err(map_reqwest)?;
        let status = res.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                code: status.as_u16(),
                message: None,
            });
        }
        let body = res.text().await.map_err(map_reqwest)?;
        unwrap_jsonp(&body, name)
    }
}

#[async_trait]
impl Transport for JsonpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Jsonp
    }

    async fn send(&self, call: &Call) -> Result<Value, GatewayError> {
        if call.method != Method::Get {
            return Err(GatewayError::Transport("jsonp only carries GET requests".into()));
        }

        let slot = self.registry.register(callback_name(call.label));
        let mut params = call.params.clone();
        params.push(("callback", slot.name().to_string()));
        params.push(("_", cache_buster()));
        let url = with_query(&self.endpoint, &params);

        match tokio::time::timeout(self.timeout, self.request(url, slot.name())).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        }
    }
}
