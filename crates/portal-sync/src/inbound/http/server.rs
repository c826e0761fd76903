use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    serve, Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::application::notify::FeedEntry;
use crate::application::portal::{ConnectionReport, PortalService, PortalView};
use crate::application::scheduler::PollResult;
use crate::application::status::{PresetAnswer, StatusChange, UpdatePolicy};
use crate::errors::AppError;
use portal_types::domain::analytics::AnalyticsSummary;
use portal_types::domain::customer::Customer;
use portal_types::domain::order::{Order, OrderStatus};
use portal_types::ports::order_gateway::OrderGateway;

#[derive(Clone)]
pub struct HttpServerConfig {
    pub port: String,
}

pub struct HttpServer<G: OrderGateway> {
    pub service: Arc<PortalService<G>>,
    pub config: HttpServerConfig,
}

#[derive(Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub policy: Option<UpdatePolicy>,
}

#[derive(Deserialize)]
pub struct VisibilitySignal {
    pub visible: bool,
}

#[derive(Deserialize)]
pub struct NetworkSignal {
    pub online: bool,
}

#[derive(Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub since: u64,
}

impl<G: OrderGateway> HttpServer<G> {
    pub async fn new(service: Arc<PortalService<G>>, config: HttpServerConfig) -> anyhow::Result<Self> {
        Ok(Self { service, config })
    }

    pub fn router(&self) -> Router {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                let request_id = Uuid::new_v4();
                tracing::info_span!(
                    "http_request",
                    %request_id,
                    method = %request.method(),
                    uri
                )
            })
            .on_request(
                |request: &axum::extract::Request<_>, span: &tracing::Span| {
                    tracing::debug!(
                        parent: span,
                        method = %request.method(),
                        uri = %request.uri(),
                        "request"
                    );
                },
            )
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &tracing::Span| {
                    tracing::info!(
                        parent: span,
                        status = %response.status(),
                        latency_ms = %latency.as_millis(),
                        "response"
                    );
                },
            );

        Router::new()
            .route("/health", get(health))
            .route("/orders", get(board_view::<G>))
            .route("/orders/refresh", post(refresh::<G>))
            .route("/orders/{id}", get(get_order::<G>))
            .route("/orders/{id}/status", patch(change_status::<G>))
            .route("/signals/visibility", post(visibility::<G>))
            .route("/signals/network", post(network::<G>))
            .route("/diagnostics/connection", get(test_connection::<G>))
            .route("/analytics", get(analytics::<G>))
            .route("/customers", get(customers::<G>))
            .route("/notifications", get(notifications::<G>))
            .layer(trace_layer)
            .with_state(self.service.clone())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.router();
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.port).parse()?;
        tracing::info!("starting server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        self.service.shutdown().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn board_view<G: OrderGateway>(State(service): State<Arc<PortalService<G>>>) -> Json<PortalView> {
    Json(service.view().await)
}

async fn get_order<G: OrderGateway>(
    State(service): State<Arc<PortalService<G>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(service.order(&id).await?))
}

async fn change_status<G: OrderGateway>(
    State(service): State<Arc<PortalService<G>>>,
    Path(id): Path<String>,
    Json(payload): Json<ChangeStatusRequest>,
) -> Result<(StatusCode, Json<StatusChange>), AppError> {
    let status: OrderStatus = payload
        .status
        .parse()
        .map_err(|e: portal_types::domain::order::UnknownStatus| AppError::BadRequest(e.to_string()))?;
    let change = service
        .change_status(&id, status, payload.policy, &PresetAnswer(payload.confirm))
        .await?;
    let code = match change {
        StatusChange::Applied { .. } => StatusCode::OK,
        // Cancelling needs an explicit `confirm: true`.
        StatusChange::Declined { .. } => StatusCode::CONFLICT,
    };
    Ok((code, Json(change)))
}

async fn refresh<G: OrderGateway>(State(service): State<Arc<PortalService<G>>>) -> Json<PollResult> {
    Json(service.refresh().await)
}

async fn visibility<G: OrderGateway>(
    State(service): State<Arc<PortalService<G>>>,
    Json(signal): Json<VisibilitySignal>,
) -> StatusCode {
    service.set_visibility(signal.visible).await;
    StatusCode::NO_CONTENT
}

async fn network<G: OrderGateway>(
    State(service): State<Arc<PortalService<G>>>,
    Json(signal): Json<NetworkSignal>,
) -> StatusCode {
    service.set_online(signal.online).await;
    StatusCode::NO_CONTENT
}

async fn test_connection<G: OrderGateway>(
    State(service): State<Arc<PortalService<G>>>,
) -> Result<Json<ConnectionReport>, AppError> {
    Ok(Json(service.test_connection().await?))
}

async fn analytics<G: OrderGateway>(State(service): State<Arc<PortalService<G>>>) -> Json<AnalyticsSummary> {
    Json(service.analytics().await)
}

async fn customers<G: OrderGateway>(State(service): State<Arc<PortalService<G>>>) -> Json<Vec<Customer>> {
    Json(service.customers().await)
}

async fn notifications<G: OrderGateway>(
    State(service): State<Arc<PortalService<G>>>,
    Query(query): Query<FeedQuery>,
) -> Json<Vec<FeedEntry>> {
    Json(service.notifications(query.since))
}
