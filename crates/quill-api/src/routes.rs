use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use quill_core::ai::{
    AnalysisService, GeminiClient, NoteAnalysis, QuizQuestion, DEFAULT_QUIZ_QUESTIONS,
    MAX_QUIZ_QUESTIONS,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{
    client_fingerprint, EndpointRateLimiter, ProtectedEndpoint, RateLimitMetricsSnapshot,
};

const MIN_ANALYZE_CONTENT_CHARS: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    analysis: Option<Arc<dyn AnalysisService>>,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self, AppError> {
        let analysis = match config.gemini_config() {
            Some(gemini) => {
                let client =
                    GeminiClient::new(gemini).map_err(|error| AppError::Config(error.to_string()))?;
                Some(Arc::new(client) as Arc<dyn AnalysisService>)
            }
            None => {
                tracing::warn!("GEMINI_API_KEY is not set; AI endpoints will return 500");
                None
            }
        };
        Ok(Self::new(config, analysis))
    }

    pub fn new(config: Arc<AppConfig>, analysis: Option<Arc<dyn AnalysisService>>) -> Self {
        Self {
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(config.as_ref())),
            analysis,
            config,
        }
    }

    fn analysis(&self) -> Result<&dyn AnalysisService, AppError> {
        self.analysis
            .as_deref()
            .ok_or_else(|| AppError::Config("AI service is not configured on the backend".to_string()))
    }
}

/// Caller identity used for rate limiting.
#[derive(Debug, Clone)]
struct ClientKey(String);

pub fn app_router(state: AppState) -> Router {
    let ai_routes = Router::new()
        .route("/analyze", post(analyze))
        .route("/quiz", post(quiz))
        .route("/chat", post(chat))
        .route_layer(middleware::from_fn_with_state(state.clone(), identify_client));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1/ai", ai_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    ai_configured: bool,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        ai_configured: state.analysis.is_some(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot(),
    })
}

/// Key callers by socket address; the forwarded header only counts when the
/// deployment says a trusted proxy sets it.
async fn identify_client(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let forwarded = if state.config.trust_forwarded_for {
        forwarded_for(request.headers())
    } else {
        None
    };
    let key = forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());
    request.extensions_mut().insert(ClientKey(key));
    next.run(request).await
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    content: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    success: bool,
    analysis: NoteAnalysis,
}

async fn analyze(
    State(state): State<AppState>,
    Extension(client): Extension<ClientKey>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let (Some(content), Some(title)) = (required(request.content), required(request.title)) else {
        return Err(AppError::bad_request("Content and title are required"));
    };
    if content.trim().chars().count() < MIN_ANALYZE_CONTENT_CHARS {
        return Err(AppError::bad_request(format!(
            "Content must be at least {MIN_ANALYZE_CONTENT_CHARS} characters"
        )));
    }

    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Analyze, &client.0)
        .await?;
    let analysis = state.analysis()?.analyze(&content, &title).await?;
    tracing::info!(
        endpoint = ProtectedEndpoint::Analyze.label(),
        client = client_fingerprint(&client.0),
        content_len = content.len(),
        "Generated note analysis"
    );
    Ok(Json(AnalyzeResponse {
        success: true,
        analysis,
    }))
}

#[derive(Debug, Deserialize)]
struct QuizRequest {
    content: Option<String>,
    title: Option<String>,
    question_count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct QuizResponse {
    success: bool,
    questions: Vec<QuizQuestion>,
}

async fn quiz(
    State(state): State<AppState>,
    Extension(client): Extension<ClientKey>,
    Json(request): Json<QuizRequest>,
) -> Result<Json<QuizResponse>, AppError> {
    let (Some(content), Some(title)) = (required(request.content), required(request.title)) else {
        return Err(AppError::bad_request("Content and title are required"));
    };
    let count = request.question_count.unwrap_or(DEFAULT_QUIZ_QUESTIONS);
    if !(1..=MAX_QUIZ_QUESTIONS).contains(&count) {
        return Err(AppError::bad_request(format!(
            "question_count must be between 1 and {MAX_QUIZ_QUESTIONS}"
        )));
    }

    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Quiz, &client.0)
        .await?;
    let questions = state
        .analysis()?
        .generate_quiz(&content, &title, count)
        .await?;
    tracing::info!(
        endpoint = ProtectedEndpoint::Quiz.label(),
        client = client_fingerprint(&client.0),
        questions = questions.len(),
        "Generated quiz"
    );
    Ok(Json(QuizResponse {
        success: true,
        questions,
    }))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    content: Option<String>,
    question: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    success: bool,
    answer: String,
}

async fn chat(
    State(state): State<AppState>,
    Extension(client): Extension<ClientKey>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let (Some(content), Some(question)) = (required(request.content), required(request.question))
    else {
        return Err(AppError::bad_request("Content and question are required"));
    };

    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Chat, &client.0)
        .await?;
    let answer = state.analysis()?.ask_question(&content, &question).await?;
    tracing::info!(
        endpoint = ProtectedEndpoint::Chat.label(),
        client = client_fingerprint(&client.0),
        "Answered study question"
    );
    Ok(Json(ChatResponse {
        success: true,
        answer,
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use quill_core::ai::{AiError, Difficulty};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    struct FakeAnalysis {
        fail: bool,
    }

    #[async_trait]
    impl AnalysisService for FakeAnalysis {
        async fn analyze(&self, _content: &str, title: &str) -> Result<NoteAnalysis, AiError> {
            if self.fail {
                return Err(AiError::Malformed("not json".into()));
            }
            Ok(NoteAnalysis {
                summary: format!("About {title}"),
                key_points: vec!["one".into()],
                tags: vec!["study".into()],
                difficulty: Difficulty::Beginner,
                estimated_read_time: 1,
                study_tips: vec![],
            })
        }

        async fn generate_quiz(
            &self,
            _content: &str,
            _title: &str,
            count: usize,
        ) -> Result<Vec<QuizQuestion>, AiError> {
            Ok((0..count)
                .map(|index| QuizQuestion {
                    question: format!("Q{index}?"),
                    options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    correct_answer: 0,
                    explanation: String::new(),
                    kind: "multiple-choice".into(),
                })
                .collect())
        }

        async fn ask_question(&self, _content: &str, question: &str) -> Result<String, AiError> {
            Ok(format!("Answer to {question}"))
        }
    }

    fn config_with(limit: u32, trust_forwarded_for: bool) -> Arc<AppConfig> {
        Arc::new(AppConfig {
            bind_addr: "127.0.0.1:0".into(),
            gemini_api_key: None,
            gemini_model: "test".into(),
            rate_limit_window: Duration::from_secs(60),
            ai_rate_limit_per_window: limit,
            trust_forwarded_for,
        })
    }

    fn config(limit: u32) -> Arc<AppConfig> {
        config_with(limit, false)
    }

    fn router(limit: u32, fail: bool) -> Router {
        app_router(AppState::new(
            config(limit),
            Some(Arc::new(FakeAnalysis { fail })),
        ))
    }

    fn json_request(path: &str, body: &Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn post_json(router: Router, path: &str, body: Value) -> (StatusCode, HeaderMap, Value) {
        send(router, json_request(path, &body)).await
    }

    /// Post from `peer`, optionally claiming another origin via `X-Forwarded-For`.
    async fn post_from(
        router: Router,
        peer: &str,
        forwarded: Option<&str>,
        body: &Value,
    ) -> StatusCode {
        let mut request = json_request("/v1/ai/chat", body);
        let addr: SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        if let Some(forwarded) = forwarded {
            request
                .headers_mut()
                .insert("x-forwarded-for", forwarded.parse().unwrap());
        }
        send(router, request).await.0
    }

    async fn send(router: Router, request: HttpRequest<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, value)
    }

    #[tokio::test]
    async fn analyze_returns_analysis() {
        let (status, _, body) = post_json(
            router(30, false),
            "/v1/ai/analyze",
            json!({"title": "Cells", "content": "Mitochondria make energy."}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["analysis"]["summary"], "About Cells");
        assert_eq!(body["analysis"]["difficulty"], "beginner");
    }

    #[tokio::test]
    async fn analyze_validates_input() {
        let (status, _, body) =
            post_json(router(30, false), "/v1/ai/analyze", json!({"content": "long enough text"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("required"));

        let (status, _, _) = post_json(
            router(30, false),
            "/v1/ai/analyze",
            json!({"title": "T", "content": "short"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_bad_gateway() {
        let (status, _, body) = post_json(
            router(30, true),
            "/v1/ai/analyze",
            json!({"title": "Cells", "content": "Mitochondria make energy."}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("not usable"));
    }

    #[tokio::test]
    async fn quiz_defaults_and_bounds_question_count() {
        let (status, _, body) = post_json(
            router(30, false),
            "/v1/ai/quiz",
            json!({"title": "T", "content": "Some content"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["questions"].as_array().unwrap().len(), 5);
        assert_eq!(body["questions"][0]["type"], "multiple-choice");

        let (status, _, _) = post_json(
            router(30, false),
            "/v1/ai/quiz",
            json!({"title": "T", "content": "Some content", "question_count": 21}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_answers_question() {
        let (status, _, body) = post_json(
            router(30, false),
            "/v1/ai/chat",
            json!({"content": "notes", "question": "why?"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "Answer to why?");
    }

    #[tokio::test]
    async fn rate_limit_returns_retry_after() {
        let router = router(1, false);
        let body = json!({"content": "notes", "question": "why?"});

        let (status, _, _) = post_json(router.clone(), "/v1/ai/chat", body.clone()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, headers, _) = post_json(router, "/v1/ai/chat", body).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(headers.contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn rotating_forwarded_header_does_not_reset_the_limit() {
        let router = router(1, false);
        let body = json!({"content": "notes", "question": "why?"});

        let first = post_from(router.clone(), "198.51.100.9:4000", Some("203.0.113.1"), &body).await;
        assert_eq!(first, StatusCode::OK);
        let second = post_from(router.clone(), "198.51.100.9:4001", Some("203.0.113.2"), &body).await;
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);

        let other_peer = post_from(router, "198.51.100.10:4000", None, &body).await;
        assert_eq!(other_peer, StatusCode::OK);
    }

    #[tokio::test]
    async fn trusted_proxy_keys_on_forwarded_client() {
        let router = app_router(AppState::new(
            config_with(1, true),
            Some(Arc::new(FakeAnalysis { fail: false })),
        ));
        let body = json!({"content": "notes", "question": "why?"});

        let first = post_from(router.clone(), "10.0.0.2:80", Some("203.0.113.1"), &body).await;
        let second = post_from(router.clone(), "10.0.0.2:80", Some("203.0.113.2"), &body).await;
        let repeat = post_from(router, "10.0.0.2:80", Some("203.0.113.1, 10.0.0.2"), &body).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::OK);
        assert_eq!(repeat, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn missing_ai_backend_is_a_server_error() {
        let router = app_router(AppState::new(config(30), None));
        let (status, _, _) = post_json(
            router,
            "/v1/ai/chat",
            json!({"content": "notes", "question": "why?"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn healthz_reports_status() {
        let request = HttpRequest::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let response = router(30, false).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["ai_configured"], true);
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.1, 10.0.0.1".parse().unwrap());
        assert_eq!(forwarded_for(&headers).as_deref(), Some("198.51.100.1"));
        assert_eq!(forwarded_for(&HeaderMap::new()), None);
    }
}
