use crate::config::StoreSettings;
use crate::service;
use crate::storage::DocumentSource;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    /// `None` when the store settings were incomplete or the store failed to open.
    pub source: Option<Arc<dyn DocumentSource>>,
    pub settings: StoreSettings,
}

pub fn router(state: AppState, static_dir: PathBuf) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/latest", get(latest_handler))
        .route("/api/history/:location", get(history_handler))
        .route("/health", get(health_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_web_server(state: AppState, static_dir: PathBuf, port: u16) -> anyhow::Result<()> {
    let app = router(state, static_dir);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Server running at http://localhost:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn error_response(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "success": false,
            "error": message
        })),
    )
        .into_response()
}

/// Runs a blocking store call off the async workers.
async fn with_source<T, F>(state: &AppState, f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn DocumentSource) -> anyhow::Result<T> + Send + 'static,
{
    let source = state
        .source
        .clone()
        .ok_or_else(|| anyhow::anyhow!("document store is not configured"))?;
    tokio::task::spawn_blocking(move || f(source.as_ref())).await?
}

async fn latest_handler(State(state): State<AppState>) -> Response {
    info!("/api/latest called");

    match with_source(&state, |source| Ok(service::latest_readings(source))).await {
        Ok(records) => Json(serde_json::json!({
            "success": true,
            "timestamp": now_iso(),
            "data": records
        }))
        .into_response(),
        Err(e) => {
            error!("Failed to fetch latest data: {:#}", e);
            error_response("Failed to fetch latest data")
        }
    }
}

async fn history_handler(State(state): State<AppState>, Path(location): Path<String>) -> Response {
    let lookup = location.clone();
    match with_source(&state, move |source| service::history(source, &lookup)).await {
        Ok(records) => Json(serde_json::json!({
            "success": true,
            "data": records
        }))
        .into_response(),
        Err(e) => {
            error!("Failed to fetch history for {}: {:#}", location, e);
            error_response("Failed to fetch history")
        }
    }
}

/// Store settings as reported on `/health`. Unset names are left out.
#[derive(Serialize)]
struct StoreHealth<'a> {
    endpoint: &'static str,
    key: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container: Option<&'a str>,
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let presence = |value: &Option<String>| if value.is_some() { "configured" } else { "missing" };
    let settings = &state.settings;
    let store = StoreHealth {
        endpoint: presence(&settings.endpoint),
        key: presence(&settings.key),
        database: settings.database.as_deref(),
        container: settings.container.as_deref(),
    };

    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": now_iso(),
        "store": store
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::service::tests::FakeSource;
    use crate::storage::DocumentStore;
    use serde_json::{json, Value};

    fn static_dir() -> PathBuf {
        PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/public"))
    }

    pub(crate) async fn spawn(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state, static_dir());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    pub(crate) fn state_with(source: impl DocumentSource + 'static) -> AppState {
        AppState {
            source: Some(Arc::new(source) as Arc<dyn DocumentSource>),
            settings: StoreSettings {
                endpoint: Some("/var/lib/canal".into()),
                key: None,
                database: Some("RideauCanalDB".into()),
                container: Some("SensorAggregations".into()),
            },
        }
    }

    fn http() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    async fn get_json(url: &str) -> (StatusCode, Value) {
        let resp = http().get(url).send().await.unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.json().await.unwrap())
    }

    #[tokio::test]
    async fn latest_and_history_for_one_location() {
        let store = DocumentStore::open_in_memory("SensorAggregations").unwrap();
        for (ts, ice) in [
            ("2025-01-15T10:00:00Z", 30.0),
            ("2025-01-15T10:10:00Z", 32.0),
            ("2025-01-15T10:05:00Z", 31.0),
        ] {
            store
                .insert(&json!({
                    "location": "NAC",
                    "timestamp": ts,
                    "avgIceThickness": ice,
                    "avgSurfaceTemp": -4.0,
                    "maxSnow": 3.0
                }))
                .unwrap();
        }
        let base = spawn(state_with(store)).await;

        let (status, latest) = get_json(&format!("{base}/api/latest")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest["success"], json!(true));
        assert!(latest["timestamp"].is_string());
        let data = latest["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["location"], json!("NAC"));
        assert_eq!(data[0]["timestamp"], json!("2025-01-15T10:10:00Z"));
        assert_eq!(data[0]["avgSurfaceTemperature"], json!(-4.0));

        let (status, history) = get_json(&format!("{base}/api/history/NAC")).await;
        assert_eq!(status, StatusCode::OK);
        let timestamps: Vec<_> = history["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["timestamp"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            timestamps,
            vec![
                "2025-01-15T10:10:00Z",
                "2025-01-15T10:05:00Z",
                "2025-01-15T10:00:00Z"
            ]
        );
    }

    #[tokio::test]
    async fn history_decodes_location_segment() {
        let source = FakeSource::default().with("Dow's Lake", "2025-01-15T10:00:00Z", 27.5);
        let base = spawn(state_with(source)).await;

        let (status, body) = get_json(&format!("{base}/api/history/Dow%27s%20Lake")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["location"], json!("Dow's Lake"));
        assert_eq!(body["data"][0]["avgIceThickness"], json!(27.5));
    }

    #[tokio::test]
    async fn latest_survives_one_failing_location() {
        let source = FakeSource::default()
            .with("Dow's Lake", "2025-01-15T10:00:00Z", 27.0)
            .with("Fifth Avenue", "2025-01-15T10:00:00Z", 24.0)
            .with("NAC", "2025-01-15T10:00:00Z", 31.0)
            .failing("Fifth Avenue");
        let base = spawn(state_with(source)).await;

        let (status, body) = get_json(&format!("{base}/api/latest")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        let locations: Vec<_> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["location"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(locations, vec!["Dow's Lake", "NAC"]);
    }

    #[tokio::test]
    async fn history_failure_is_an_error_envelope() {
        let base = spawn(state_with(FakeSource::default().failing("NAC"))).await;

        let (status, body) = get_json(&format!("{base}/api/history/NAC")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "success": false, "error": "Failed to fetch history" })
        );
    }

    #[tokio::test]
    async fn unconfigured_store_fails_data_routes_but_not_health() {
        let base = spawn(AppState {
            source: None,
            settings: StoreSettings::default(),
        })
        .await;

        let (status, body) = get_json(&format!("{base}/api/latest")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], json!("Failed to fetch latest data"));

        let (status, health) = get_json(&format!("{base}/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], json!("healthy"));
        assert_eq!(health["store"]["endpoint"], json!("missing"));
        let store = health["store"].as_object().unwrap();
        assert!(!store.contains_key("database"));
        assert!(!store.contains_key("container"));
    }

    #[tokio::test]
    async fn health_reports_configured_settings() {
        let base = spawn(state_with(FakeSource::default())).await;

        let (_, health) = get_json(&format!("{base}/health")).await;
        assert_eq!(health["store"]["endpoint"], json!("configured"));
        assert_eq!(health["store"]["key"], json!("missing"));
        assert_eq!(health["store"]["database"], json!("RideauCanalDB"));
        assert_eq!(health["store"]["container"], json!("SensorAggregations"));
    }

    #[tokio::test]
    async fn serves_dashboard_and_404s_unknown_paths() {
        let base = spawn(state_with(FakeSource::default())).await;

        let page = http().get(format!("{base}/")).send().await.unwrap();
        assert_eq!(page.status().as_u16(), 200);
        assert!(page.text().await.unwrap().contains("iceThicknessChart"));

        let script = http().get(format!("{base}/app.js")).send().await.unwrap();
        assert_eq!(script.status().as_u16(), 200);

        let missing = http().get(format!("{base}/api/nothing-here")).send().await.unwrap();
        assert_eq!(missing.status().as_u16(), 404);
    }
}
