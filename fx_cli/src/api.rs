//! HTTP front end: health, symbol list and gated predictions

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use fx_forecast::{Assistant, ForecastError, PredictionOutput, RefreshGate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state behind every route
#[derive(Debug)]
pub struct ApiState {
    assistant: Assistant,
    gate: RefreshGate,
}

impl ApiState {
    pub fn new(assistant: Assistant) -> Self {
        let config = assistant.config();
        let gate = RefreshGate::new(config.paths().last_update(), config.update_interval_hours);
        Self { assistant, gate }
    }

    /// Refresh data and models when stale, then predict.
    ///
    /// An unknown symbol is rejected before any refresh work starts.
    fn predict(&self, symbol: Option<&str>) -> fx_forecast::Result<PredictionOutput> {
        if let Some(symbol) = symbol.map(str::trim).filter(|s| !s.is_empty()) {
            self.assistant.config().resolve_symbol(symbol)?;
        }

        self.gate.refresh_if_stale(Utc::now(), || {
            let summary = self.assistant.refresh()?;
            if !summary.downloads.is_complete() || !summary.training.is_complete() {
                warn!(
                    download_failures = ?summary.downloads.failed_symbols(),
                    training_failures = ?summary.training.failed_symbols(),
                    "Refresh finished with failures"
                );
            }
            Ok(())
        })?;

        self.assistant.predict(symbol)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SymbolsResponse {
    pub symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub symbol: Option<String>,
}

/// Error body `{"detail": message}` with a status picked from the error kind
#[derive(Debug)]
pub enum ApiError {
    Forecast(ForecastError),
    Internal(String),
}

impl From<ForecastError> for ApiError {
    fn from(e: ForecastError) -> Self {
        ApiError::Forecast(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Forecast(ForecastError::UnknownSymbol { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Forecast(e) if e.is_not_ready() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Forecast(e) => e.to_string(),
            ApiError::Internal(message) => message.clone(),
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), %detail, "Request failed");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/symbols", get(symbols))
        .route("/predict", get(predict))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn symbols(State(state): State<Arc<ApiState>>) -> Json<SymbolsResponse> {
    Json(SymbolsResponse {
        symbols: state.assistant.list_symbols(),
    })
}

async fn predict(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PredictQuery>,
) -> Result<Json<PredictionOutput>, ApiError> {
    // downloads, training and model loading are blocking work
    let output = tokio::task::spawn_blocking(move || state.predict(query.symbol.as_deref()))
        .await
        .map_err(|e| ApiError::Internal(format!("prediction task failed: {}", e)))??;
    Ok(Json(output))
}

/// Serve until Ctrl-C
pub async fn serve(state: Arc<ApiState>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "FX assistant API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Could not listen for Ctrl-C");
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration, NaiveDate};
    use fx_forecast::acquisition::InMemorySource;
    use fx_forecast::data::RawBar;
    use fx_forecast::models::GradientBoostingParams;
    use fx_forecast::{AppConfig, SymbolConfig};
    use std::path::Path;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn bars(days: usize) -> Vec<RawBar> {
        let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        (0..days)
            .map(|i| {
                let t = i as f64;
                let close = 30.0 * (0.0004 * t + 0.02 * (0.31 * t).sin()).exp();
                RawBar::new(start + Duration::days(i as i64), close * 1.005, close * 0.995, close)
            })
            .collect()
    }

    fn state(root: &Path, source: InMemorySource) -> Arc<ApiState> {
        let config = AppConfig {
            data_dir: root.join("data"),
            models_dir: root.join("models"),
            reports_dir: root.join("reports"),
            model: GradientBoostingParams {
                n_estimators: 10,
                ..GradientBoostingParams::default()
            },
            symbols: vec![SymbolConfig::new("USDTRY", "USDTRY=X")],
            ..AppConfig::default()
        };
        Arc::new(ApiState::new(Assistant::new(config, Arc::new(source)).unwrap()))
    }

    async fn get_json(state: Arc<ApiState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_and_symbols() {
        let dir = tempdir().unwrap();
        let state = state(dir.path(), InMemorySource::new());

        let (status, body) = get_json(Arc::clone(&state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));

        let (status, body) = get_json(state, "/symbols").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "symbols": ["USDTRY"] }));
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_bad_request_without_refresh() {
        let dir = tempdir().unwrap();
        let state = state(dir.path(), InMemorySource::new());

        let (status, body) = get_json(Arc::clone(&state), "/predict?symbol=USDJPY").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("USDJPY"));
        assert!(state.gate.last_update().is_none());
    }

    #[tokio::test]
    async fn test_missing_data_is_service_unavailable() {
        let dir = tempdir().unwrap();
        let state = state(dir.path(), InMemorySource::new());

        let (status, body) = get_json(state, "/predict?symbol=usdtry").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["detail"].as_str().unwrap().contains("USDTRY"));
    }

    #[tokio::test]
    async fn test_stale_state_refreshes_then_predicts() {
        let dir = tempdir().unwrap();
        let source = InMemorySource::new().with_ticker("USDTRY=X", bars(700));
        let state = state(dir.path(), source);

        let (status, body) = get_json(Arc::clone(&state), "/predict?symbol=USDTRY").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "USDTRY");
        assert!(body["forecast"]["h3"].is_number());
        assert!(state.gate.last_update().is_some());

        let (status, body) = get_json(state, "/predict").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }
}
