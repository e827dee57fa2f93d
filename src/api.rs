//! REST API server for the banking assistant
//!
//! Exposes the turn orchestrator over HTTP. Chat routes require a bearer
//! token; the token is verified before the turn runs or any session is read.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::auth::{Caller, TokenService};
use crate::error::AssistantError;

pub const SESSION_HEADER: &str = "x-session-id";

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub tokens: Arc<TokenService>,
}

fn status_for(error: &AssistantError) -> StatusCode {
    match error {
        AssistantError::ValidationError(_) => StatusCode::BAD_REQUEST,
        AssistantError::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
        AssistantError::SessionForbidden(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// Auth Middleware
/// =============================

pub async fn jwt_auth_middleware(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiResponse>)> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Missing Authorization header".into())),
        ))?;

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid token format".into())),
        ));
    };

    match state.tokens.verify(token.trim()) {
        Ok(claims) => {
            request.extensions_mut().insert(Caller::from(claims));
            Ok(next.run(request).await)
        }
        Err(e) => {
            warn!(error = %e, "Rejected chat request");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::error("Invalid or expired token".into())),
            ))
        }
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    let requested_session = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty());

    info!(
        caller = %caller.principal,
        session = ?requested_session,
        "Received chat turn"
    );

    match state
        .orchestrator
        .handle_turn(&caller, requested_session, &req.message)
        .await
    {
        Ok(turn) => {
            let session_header = HeaderValue::from_str(&turn.session_id).ok();
            let mut response = (StatusCode::OK, Json(ApiResponse::success(&turn))).into_response();
            if let Some(value) = session_header {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(SESSION_HEADER), value);
            }
            response
        }
        Err(e) => {
            let status = status_for(&e);
            warn!(caller = %caller.principal, error = %e, %status, "Chat turn rejected");
            (status, Json(ApiResponse::error(e.to_string()))).into_response()
        }
    }
}

/// =============================
/// Router
/// =============================

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(SESSION_HEADER),
        ])
        .expose_headers([HeaderName::from_static(SESSION_HEADER)])
}

pub fn create_router(state: ApiState, cors_origins: &[String]) -> Router {
    let protected = Router::new()
        .route("/chat", post(chat_handler))
        .route("/api/chat", post(chat_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(router: Router, port: u16) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TurnGraph;
    use crate::auth::{CallerScopedResolver, Claims};
    use crate::classifier::KeywordIntentClassifier;
    use crate::conversational::{PassThroughReasoner, TemplateResponder};
    use crate::ledger::{InMemoryLedger, Ledger};
    use crate::memory::{InMemorySessionStore, SessionStore};
    use crate::tools::create_default_registry;
    use crate::tools::rates::testing::StaticRateSource;
    use axum::body::Body;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "api-test-secret";

    struct TestApp {
        router: Router,
        tokens: Arc<TokenService>,
        sessions: InMemorySessionStore,
    }

    async fn app() -> TestApp {
        let ledger = InMemoryLedger::new();
        ledger.seed_account("Alice", dec!(120)).await.unwrap();
        ledger.seed_account("Bob", dec!(10)).await.unwrap();
        let sessions = InMemorySessionStore::new();
        let tokens = Arc::new(TokenService::new(SECRET));

        let graph = TurnGraph::new(
            Arc::new(KeywordIntentClassifier),
            Arc::new(PassThroughReasoner),
            Arc::new(TemplateResponder),
            Arc::new(create_default_registry(
                Arc::new(ledger),
                Arc::new(StaticRateSource { quote: None }),
            )),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            graph,
            Arc::new(sessions.clone()),
            Arc::new(CallerScopedResolver),
        ));

        TestApp {
            router: create_router(
                ApiState {
                    orchestrator,
                    tokens: tokens.clone(),
                },
                &[],
            ),
            tokens,
            sessions,
        }
    }

    fn chat_request(path: &str, token: Option<&str>, session: Option<&str>, body: Value) -> Request {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let response = app
            .router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_chat_requires_valid_token() {
        let app = app().await;

        let missing = app
            .router
            .clone()
            .oneshot(chat_request("/chat", None, None, json!({"message": "balance"})))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let now = chrono::Utc::now().timestamp() as usize;
        let expired = app
            .tokens
            .issue_claims(&Claims {
                sub: "Alice".to_string(),
                exp: now - 3_600,
                iat: now - 7_200,
                jti: None,
            })
            .unwrap();
        let response = app
            .router
            .clone()
            .oneshot(chat_request("/chat", Some(&expired), None, json!({"message": "balance"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let forged = TokenService::new("wrong")
            .issue("Alice", Duration::from_secs(60))
            .unwrap();
        let response = app
            .router
            .oneshot(chat_request("/chat", Some(&forged), None, json!({"message": "balance"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert!(app.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_chat_turn() {
        let app = app().await;
        let token = app.tokens.issue("Alice", Duration::from_secs(600)).unwrap();

        let response = app
            .router
            .oneshot(chat_request(
                "/chat",
                Some(&token),
                None,
                json!({"message": "What's my balance?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(SESSION_HEADER));

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["reply"], "Alice's balance is $120.00");
        assert_eq!(body["data"]["intent"], "balance");
        assert!(body["data"]["session_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_api_chat_alias_keeps_requested_session() {
        let app = app().await;
        let token = app.tokens.issue("Bob", Duration::from_secs(600)).unwrap();

        let response = app
            .router
            .oneshot(chat_request(
                "/api/chat",
                Some(&token),
                Some("bob-session"),
                json!({"message": "show my transactions"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["data"]["session_id"], "bob-session");
        assert!(app.sessions.get("bob-session").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_boundary_errors() {
        let app = app().await;
        let alice = app.tokens.issue("Alice", Duration::from_secs(600)).unwrap();
        let bob = app.tokens.issue("Bob", Duration::from_secs(600)).unwrap();

        let empty = app
            .router
            .clone()
            .oneshot(chat_request("/chat", Some(&alice), None, json!({"message": "  "})))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let ok = app
            .router
            .clone()
            .oneshot(chat_request("/chat", Some(&alice), Some("shared"), json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let forbidden = app
            .router
            .oneshot(chat_request("/chat", Some(&bob), Some("shared"), json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(forbidden).await["success"], false);
    }
}
