//! HTTP gateway.
//!
//! Maps inbound requests onto fan-out rounds and serializes the collected
//! answers as a JSON array.  Every route sits behind a CORS guard that only
//! lets `GET` through, answers `OPTIONS` itself and rejects everything
//! else with `405`.
//!
//! A client of the gateway always gets `200` and an array from the
//! aggregation routes.  Failing upstreams are simply absent from it.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::aggregator::fan_out;
use crate::client::{RowsDocument, TablesDocument, UpstreamClient};
use crate::error::{GatewayError, UpstreamError};
use crate::registry::Registry;

const ALLOWED_METHODS: &str = "GET, OPTIONS";

/// Shared state of the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    registry: Registry,
    client: UpstreamClient,
}

impl GatewayState {
    pub fn new(registry: Registry, client: UpstreamClient) -> Self {
        Self { registry, client }
    }
}

/// One upstream's contribution to an aggregated response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResponse<T> {
    /// URL the document was fetched from.
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Data")]
    pub data: T,
}

/// Builds the gateway router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/tables", get(list_tables))
        .route("/tables/", get(missing_table_name))
        .route("/tables/{name}", get(table_rows))
        .layer(middleware::from_fn(cors_guard))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Binds `addr` and serves the gateway until the listener fails.
pub async fn run_http_server(addr: SocketAddr, state: GatewayState) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind { addr, source })?;
    serve(listener, state).await
}

/// Serves the gateway on an already bound listener.
pub async fn serve(listener: TcpListener, state: GatewayState) -> Result<(), GatewayError> {
    if let Ok(local) = listener.local_addr() {
        info!("starting http server on {}", local);
    }
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).await.map_err(GatewayError::Serve)
}

async fn list_tables(
    State(state): State<GatewayState>,
) -> Json<Vec<AggregateResponse<TablesDocument>>> {
    let client = state.client.clone();
    let results = fan_out(&state.registry, move |addr| {
        let client = client.clone();
        async move { client.tables(&addr).await }
    })
    .await;

    Json(
        results
            .into_iter()
            .map(|r| AggregateResponse {
                url: UpstreamClient::tables_url(&r.address),
                data: r.document,
            })
            .collect(),
    )
}

async fn table_rows(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> Json<Vec<AggregateResponse<RowsDocument>>> {
    let client = state.client.clone();
    let results = fan_out(&state.registry, move |addr| {
        let client = client.clone();
        let table = name.clone();
        async move {
            let url = UpstreamClient::table_rows_url(&addr, &table)?;
            let rows = client.table_rows(&addr, &table).await?;
            Ok::<_, UpstreamError>((url.to_string(), rows))
        }
    })
    .await;

    Json(
        results
            .into_iter()
            .map(|r| {
                let (url, data) = r.document;
                AggregateResponse { url, data }
            })
            .collect(),
    )
}

async fn missing_table_name() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, "Bad Request")
}

/// Filters request methods and adds cross-origin headers to every response.
async fn cors_guard(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let mut response = match method {
        Method::GET => next.run(request).await,
        Method::OPTIONS => StatusCode::OK.into_response(),
        _ => (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, ALLOWED_METHODS)],
            "Method Not Allowed",
        )
            .into_response(),
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    response
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let version = request.version();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        "{:?} {} {:?} {:?} {} {:?}",
        version,
        response.status().as_u16(),
        method.as_str(),
        path,
        remote,
        start.elapsed()
    );
    response
}
