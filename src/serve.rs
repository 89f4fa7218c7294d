use crate::config::{LauncherConfig, LifecycleConfig, ServerConfig};
use crate::heartbeat::HeartbeatState;
use crate::signals::{self, ShutdownReason, Terminator};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// How long graceful shutdown may take before the process exits anyway.
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub heartbeat: Arc<HeartbeatState>,
    pub terminator: Arc<dyn Terminator>,
    pub shutdown_delay: Duration,
    pub version: Arc<str>,
}

impl AppState {
    pub fn new(
        heartbeat: Arc<HeartbeatState>,
        terminator: Arc<dyn Terminator>,
        lifecycle: &LifecycleConfig,
        version: &str,
    ) -> Self {
        Self {
            heartbeat,
            terminator,
            shutdown_delay: lifecycle.shutdown_delay(),
            version: Arc::from(version),
        }
    }
}

/// Lifecycle routes, without transport layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/heartbeat", get(heartbeat))
        .route("/shutdown", post(shutdown))
        .route("/api/health", get(health))
        .with_state(state)
}

/// Wrap `router` with the request timeout, the server-wide in-flight cap and tracing.
///
/// `Router::layer` applies a layer to every route separately, so the cap must
/// share one semaphore across all of them.
pub fn with_limits(router: Router, server: &ServerConfig) -> Router {
    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            server.request_timeout(),
        ))
        .layer(GlobalConcurrencyLimitLayer::new(server.connection_limit))
        .layer(TraceLayer::new_for_http())
}

/// Bind, serve, and drain on SIGTERM or Ctrl-C.
pub async fn run(config: &LauncherConfig, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let server = &config.server;
    let app = with_limits(router(state), server);

    let listener = tokio::net::TcpListener::bind(server.addr()).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("serve listening on {local_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signals::shutdown_signal().await;
            signals::force_exit_after(FORCE_EXIT_AFTER);
        })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn heartbeat(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.heartbeat.record_heartbeat();
    tracing::trace!("heartbeat received");
    Json(serde_json::json!({"status": "ok"}))
}

/// Schedule termination on a one-shot timer so this response reaches the browser first.
async fn shutdown(State(state): State<AppState>) -> Json<serde_json::Value> {
    tracing::info!(
        delay_ms = state.shutdown_delay.as_millis() as u64,
        "shutdown requested"
    );
    let terminator = Arc::clone(&state.terminator);
    let delay = state.shutdown_delay;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        terminator.terminate(ShutdownReason::Requested);
    });
    Json(serde_json::json!({"status": "shutting_down"}))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "version": &*state.version}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::testing::RecordingTerminator;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    fn test_state() -> (AppState, Arc<RecordingTerminator>) {
        let terminator = Arc::new(RecordingTerminator::default());
        let state = AppState::new(
            Arc::new(HeartbeatState::new()),
            terminator.clone(),
            &LifecycleConfig::default(),
            "1.4.0",
        );
        (state, terminator)
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_heartbeat_records_timestamp() {
        let (state, _) = test_state();
        let heartbeat = Arc::clone(&state.heartbeat);
        assert!(heartbeat.read_heartbeat().is_none());

        let response = router(state)
            .oneshot(request("GET", "/heartbeat"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body, serde_json::json!({"status": "ok"}));
        assert!(heartbeat.read_heartbeat().is_some());
    }

    #[tokio::test]
    async fn test_heartbeat_rejects_post() {
        let (state, _) = test_state();
        let heartbeat = Arc::clone(&state.heartbeat);

        let response = router(state)
            .oneshot(request("POST", "/heartbeat"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(heartbeat.read_heartbeat().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_responds_before_terminating() {
        let (state, terminator) = test_state();

        let response = router(state)
            .oneshot(request("POST", "/shutdown"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body, serde_json::json!({"status": "shutting_down"}));
        assert_eq!(terminator.count(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(terminator.count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(terminator.reasons(), vec![ShutdownReason::Requested]);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_get() {
        let (state, terminator) = test_state();

        let response = router(state)
            .oneshot(request("GET", "/shutdown"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(terminator.count(), 0);
    }

    #[tokio::test]
    async fn test_health_reports_version() {
        let (state, _) = test_state();

        let response = router(state)
            .oneshot(request("GET", "/api/health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["version"], "1.4.0");
    }

    #[tokio::test]
    async fn test_connection_limit_spans_all_routes() {
        let (state, _) = test_state();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let slow_entered = Arc::clone(&entered);
        let slow_release = Arc::clone(&release);
        let routes = router(state).route(
            "/slow",
            get(move || {
                let entered = Arc::clone(&slow_entered);
                let release = Arc::clone(&slow_release);
                async move {
                    entered.notify_one();
                    release.notified().await;
                    "done"
                }
            }),
        );
        let server = ServerConfig {
            connection_limit: 1,
            ..ServerConfig::default()
        };
        let app = with_limits(routes, &server);

        let slow = tokio::spawn(app.clone().oneshot(request("GET", "/slow")));
        entered.notified().await;

        let blocked = tokio::time::timeout(
            Duration::from_millis(300),
            app.clone().oneshot(request("GET", "/heartbeat")),
        )
        .await;
        assert!(blocked.is_err(), "heartbeat served while /slow holds the only permit");

        release.notify_one();
        let slow_response = slow.await.unwrap().unwrap();
        assert_eq!(slow_response.status(), StatusCode::OK);

        let response = app.oneshot(request("GET", "/heartbeat")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (state, _) = test_state();

        let response = router(state)
            .oneshot(request("GET", "/nope"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
