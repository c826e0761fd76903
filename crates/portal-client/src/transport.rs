use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use portal_types::ports::order_gateway::GatewayError;
use reqwest::Url;
use serde_json::Value;

use crate::envelope::error_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One request against the endpoint, independent of how it travels.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    /// Short name used for logs and as the JSONP callback prefix.
    pub label: &'static str,
    pub params: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl Call {
    pub fn get(label: &'static str, params: Vec<(&'static str, String)>) -> Self {
        Self {
            method: Method::Get,
            label,
            params,
            body: None,
        }
    }

    pub fn post(label: &'static str, body: Value) -> Self {
        Self {
            method: Method::Post,
            label,
            params: Vec::new(),
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Fetch,
    Jsonp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Fetch => f.write_str("fetch"),
            TransportKind::Jsonp => f.write_str("jsonp"),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;
    async fn send(&self, call: &Call) -> Result<Value, GatewayError>;
}

/// Epoch-millisecond value for the `_` cache-busting parameter.
pub fn cache_buster() -> String {
    Utc::now().timestamp_millis().to_string()
}

pub(crate) fn with_query(base: &Url, params: &[(&str, String)]) -> Url {
    let mut url = base.clone();
    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in params {
            pairs.append_pair(k, v);
        }
    }
    url
}

pub(crate) fn map_reqwest(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(err.to_string())
    }
}

/// Plain HTTP against the endpoint, optionally through a forwarding proxy.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    proxy: Option<Url>,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, endpoint: Url, proxy: Option<Url>) -> Self {
        Self {
            client,
            endpoint,
            proxy,
        }
    }

    pub(crate) fn target(&self, call: &Call) -> Url {
        let mut params = call.params.clone();
        if call.method == Method::Get {
            params.push(("_", cache_buster()));
        }
        let url = with_query(&self.endpoint, &params);
        match &self.proxy {
            Some(proxy) => with_query(proxy, &[("target", url.to_string())]),
            None => url,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Fetch
    }

    async fn send(&self, call: &Call) -> Result<Value, GatewayError> {
        let url = self.target(call);
        let request = match call.method {
            Method::Get => self.client.get(url),
            Method::Post => self
                .client
                .post(url)
                .json(call.body.as_ref().unwrap_or(&Value::Null)),
        };

        let res = request.send().await.map_err(map_reqwest)?;
        let status = res.status();
        let text = res.text().await.map_err(map_reqwest)?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                code: status.as_u16(),
                message: error_message(&text),
            });
        }
        serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}
