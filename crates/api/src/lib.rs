mod assistant;
mod payments;
mod rate_limit;

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Json, Path as AxumPath, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use club_agents::{ClubAgent, ServiceError};
use club_core::checkout::DEFAULT_CURRENCY;
use club_core::{
    category_name, format_price, ChatBackend, ChatInput, CourseFilters, NewReview, ReviewFilters,
    COURSE_CATEGORIES,
};
use club_observability::{AppMetrics, MetricsSnapshot};
use club_storage::{load_catalog_seed, Store};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use crate::assistant::AssistantConfig;
pub use crate::payments::StripeConfig;
pub use crate::rate_limit::{IpRateLimiter, RateDecision};

const MAX_CHAT_INPUT_CHARS: usize = 2_000;
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;
const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<ClubAgent<Store>>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: IpRateLimiter,
    pub http_client: Client,
    pub assistant: Option<AssistantConfig>,
    pub payments: Option<StripeConfig>,
    pub allowed_origins: Arc<Vec<String>>,
    pub store_backend: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    store: &'static str,
    metrics: MetricsSnapshot,
    capabilities: HealthCapabilities,
}

#[derive(Debug, Serialize)]
struct HealthCapabilities {
    assistant: bool,
    payments: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatRequest {
    #[serde(alias = "message")]
    text: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PaymentIntentRequest {
    #[serde(alias = "courseId")]
    course_id: String,
}

/// Builds the router from env config, seeding the store from `catalog_path`
/// when the file exists.
pub async fn build_app(catalog_path: impl AsRef<Path>) -> Result<Router> {
    let catalog_path = catalog_path.as_ref();
    let metrics = AppMetrics::shared();

    let store = match env::var("CLUB_DATABASE_URL") {
        Ok(database_url) if !database_url.trim().is_empty() => {
            Store::sqlite(database_url.trim()).await?
        }
        _ => Store::memory(),
    };
    let store_backend = store.backend_name();

    let payments = StripeConfig::from_env(DEFAULT_CURRENCY);
    let currency = payments
        .as_ref()
        .map(|config| config.currency.clone())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let agent = Arc::new(ClubAgent::new(Arc::new(store), metrics.clone()).with_currency(currency));

    if catalog_path.exists() {
        let seed = load_catalog_seed(catalog_path)?;
        agent
            .seed(seed)
            .await
            .with_context(|| format!("failed seeding catalog from {}", catalog_path.display()))?;
    } else {
        warn!(path = %catalog_path.display(), "catalog seed not found, starting empty");
    }

    let api_key = env::var("CLUB_API_KEY").unwrap_or_else(|_| "dev-club-key".to_string());
    let api_rate_limit_window = Duration::from_secs(
        env::var("CLUB_API_RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(60),
    );
    let api_rate_limit_max = env::var("CLUB_API_RATE_LIMIT_MAX")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(80);

    let state = ApiState {
        agent,
        metrics,
        api_key,
        limiter: IpRateLimiter::new(api_rate_limit_window, api_rate_limit_max),
        http_client: Client::builder()
            .connect_timeout(Duration::from_secs(6))
            .timeout(Duration::from_secs(20))
            .build()
            .context("failed to build HTTP client")?,
        assistant: AssistantConfig::from_env(),
        payments,
        allowed_origins: Arc::new(parse_allowed_origins(
            env::var("CLUB_ALLOWED_ORIGINS").ok().as_deref(),
        )),
        store_backend,
    };

    info!(
        store = store_backend,
        assistant = state.assistant.is_some(),
        payments = state.payments.is_some(),
        "api state ready"
    );

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/categories", get(categories))
        .route("/v1/courses", get(courses_list))
        .route("/v1/courses/published", get(courses_published))
        .route("/v1/courses/:slug", get(course_detail))
        .route("/v1/courses/:slug/lessons", get(course_lessons))
        .route("/v1/courses/:slug/lessons/:lesson_id", get(lesson_page))
        .route("/v1/reviews", get(reviews_list).post(review_create))
        .route("/v1/reviews/summary/:course_id", get(review_summary))
        .route("/v1/chat", post(chat))
        .route("/v1/payments/create_intent", post(payment_intent_create))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        store: state.store_backend,
        metrics: state.metrics.snapshot(),
        capabilities: HealthCapabilities {
            assistant: state.assistant.is_some(),
            payments: state.payments.is_some(),
        },
    };

    (StatusCode::OK, Json(payload))
}

async fn categories() -> impl IntoResponse {
    Json(json!({ "categories": COURSE_CATEGORIES }))
}

async fn courses_list(
    State(state): State<ApiState>,
    Query(filters): Query<CourseFilters>,
) -> Response {
    match state.agent.list_courses(filters).await {
        Ok(courses) => Json(json!({ "count": courses.len(), "courses": courses })).into_response(),
        Err(error) => internal_error("course listing failed", error),
    }
}

async fn courses_published(State(state): State<ApiState>) -> Response {
    match state.agent.published_courses().await {
        Ok(courses) => Json(json!({ "count": courses.len(), "courses": courses })).into_response(),
        Err(error) => internal_error("published course listing failed", error),
    }
}

async fn course_detail(State(state): State<ApiState>, AxumPath(slug): AxumPath<String>) -> Response {
    let course = match state.agent.course_by_slug(&slug).await {
        Ok(Some(course)) => course,
        Ok(None) => return course_not_found(&slug),
        Err(error) => return internal_error("course lookup failed", error),
    };

    let rating = match state.agent.rating_summary(&course.id).await {
        Ok(summary) => summary,
        Err(error) => return internal_error("rating summary failed", error),
    };
    let recent_reviews = match state.agent.recent_reviews(&course.id).await {
        Ok(reviews) => reviews,
        Err(error) => return internal_error("recent reviews failed", error),
    };

    Json(json!({
        "category_name": category_name(&course.category),
        "display_price": format_price(course.price_cents),
        "rating": rating,
        "recent_reviews": recent_reviews,
        "course": course
    }))
    .into_response()
}

async fn course_lessons(
    State(state): State<ApiState>,
    AxumPath(slug): AxumPath<String>,
) -> Response {
    match state.agent.course_lessons(&slug).await {
        Ok(Some(lessons)) => Json(json!({
            "course_slug": slug,
            "count": lessons.len(),
            "lessons": lessons
        }))
        .into_response(),
        Ok(None) => course_not_found(&slug),
        Err(error) => internal_error("lesson listing failed", error),
    }
}

async fn lesson_page(
    State(state): State<ApiState>,
    AxumPath((slug, lesson_id)): AxumPath<(String, String)>,
) -> Response {
    match state.agent.lesson_page(&slug, &lesson_id).await {
        Ok(Some(page)) => Json(page).into_response(),
        Ok(None) => api_error(
            StatusCode::NOT_FOUND,
            "lesson_not_found",
            format!("no lesson {lesson_id} in course {slug}"),
        ),
        Err(error) => internal_error("lesson lookup failed", error),
    }
}

async fn reviews_list(
    State(state): State<ApiState>,
    Query(filters): Query<ReviewFilters>,
) -> Response {
    match state.agent.reviews(filters).await {
        Ok(reviews) => Json(json!({ "count": reviews.len(), "reviews": reviews })).into_response(),
        Err(error) => internal_error("review listing failed", error),
    }
}

async fn review_create(State(state): State<ApiState>, Json(input): Json<NewReview>) -> Response {
    match state.agent.add_review(input).await {
        Ok(review) => (StatusCode::CREATED, Json(review)).into_response(),
        Err(ServiceError::Validation(error)) => {
            api_error(StatusCode::BAD_REQUEST, "invalid_review", error.to_string())
        }
        Err(ServiceError::NotFound(what)) => {
            api_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        Err(ServiceError::Storage(error)) => internal_error("review insert failed", error),
    }
}

async fn review_summary(
    State(state): State<ApiState>,
    AxumPath(course_id): AxumPath<String>,
) -> Response {
    match state.agent.rating_summary(&course_id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(error) => internal_error("rating summary failed", error),
    }
}

async fn chat(State(state): State<ApiState>, Json(request): Json<ChatRequest>) -> Response {
    let text = truncate_chars(request.text.trim(), MAX_CHAT_INPUT_CHARS);
    let mode = sanitize_enum_value(
        request.mode.as_deref().unwrap_or("faq"),
        &["faq", "assistant"],
        "faq",
    );

    let mut reply = state.agent.handle_chat(ChatInput { text: text.clone() });
    if mode != "assistant" {
        return Json(reply).into_response();
    }

    let Some(config) = state.assistant.as_ref() else {
        reply.backend = ChatBackend::FaqFallback;
        return Json(reply).into_response();
    };

    state.metrics.inc_assistant_call();
    match assistant::complete(&state.http_client, config, &text).await {
        Ok(answer) => {
            reply.reply_text = answer;
            reply.backend = ChatBackend::Assistant;
        }
        Err(error) => {
            state.metrics.inc_assistant_failure();
            warn!(error = %error, "assistant call failed, serving faq reply");
            reply.backend = ChatBackend::FaqFallback;
        }
    }

    Json(reply).into_response()
}

async fn payment_intent_create(
    State(state): State<ApiState>,
    Json(request): Json<PaymentIntentRequest>,
) -> Response {
    let Some(config) = state.payments.as_ref() else {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "payments_unavailable",
            "Stripe payments are not configured",
        );
    };

    let quote = match state.agent.checkout_quote(request.course_id.trim()).await {
        Ok(quote) => quote,
        Err(ServiceError::Validation(error)) => {
            return api_error(StatusCode::BAD_REQUEST, "not_purchasable", error.to_string())
        }
        Err(ServiceError::NotFound(what)) => {
            return api_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        Err(ServiceError::Storage(error)) => return internal_error("checkout quote failed", error),
    };

    match payments::create_payment_intent(&state.http_client, config, &quote).await {
        Ok(intent) => {
            state.metrics.inc_checkout_intent();
            info!(
                course_id = %quote.course_id,
                amount_cents = quote.amount_cents,
                "payment intent created"
            );
            Json(json!({
                "payment_intent_id": intent.id,
                "client_secret": intent.client_secret,
                "amount_cents": quote.amount_cents,
                "currency": quote.currency,
                "display_price": quote.display_price
            }))
            .into_response()
        }
        Err(error) => {
            warn!(
                course_id = %quote.course_id,
                error = %format!("{error:#}"),
                "stripe payment intent failed"
            );
            api_error(
                StatusCode::BAD_GATEWAY,
                "stripe_payment_intent_failed",
                "payment provider request failed",
            )
        }
    }
}

fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into()
        })),
    )
        .into_response()
}

fn course_not_found(slug: &str) -> Response {
    api_error(
        StatusCode::NOT_FOUND,
        "course_not_found",
        format!("no published course with slug {slug}"),
    )
}

fn internal_error(context: &'static str, error: anyhow::Error) -> Response {
    warn!(error = %error, "{context}");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Error processing your request",
    )
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.method(), request.uri().path())
    {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if header_key == state.api_key {
        return next.run(request).await;
    }

    // Browser requests from first-party origins need no key.
    if request_origin_is_allowed(&state, request.headers()) {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "unauthorized",
            "message": "missing or invalid x-api-key, and request origin is not allowed"
        })),
    )
        .into_response()
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || request.uri().path() == "/health" {
        return next.run(request).await;
    }

    if state.limiter.tracked_keys() > MAX_TRACKED_CLIENTS {
        state.limiter.purge_idle();
    }

    let ip = request_ip(&request);
    let decision = state.limiter.check(&ip);
    if !decision.allowed {
        let retry_after = decision.retry_after.as_secs().max(1);
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "rate_limited",
                "message": "rate limit exceeded for this IP"
            })),
        )
            .into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        header::HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(decision.remaining),
    );
    response
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );

    response
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:3000")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}

fn parse_allowed_origins(raw: Option<&str>) -> Vec<String> {
    let default_origins = [
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "https://motiondesign.club",
        "https://www.motiondesign.club",
    ];

    raw.map(|value| {
        value
            .split(',')
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>()
    })
    .unwrap_or_else(|| {
        default_origins
            .iter()
            .map(|value| value.trim_end_matches('/').to_string())
            .collect()
    })
}

fn request_origin_is_allowed(state: &ApiState, headers: &HeaderMap) -> bool {
    headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().trim_end_matches('/'))
        .filter(|value| !value.is_empty())
        .is_some_and(|origin| state.allowed_origins.iter().any(|allowed| allowed == origin))
}

fn is_public_endpoint(method: &Method, path: &str) -> bool {
    if path == "/health" {
        return true;
    }
    *method == Method::GET
        && (path == "/v1/categories" || path.starts_with("/v1/courses") || path.starts_with("/v1/reviews"))
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| "local".to_string())
}

fn sanitize_enum_value(value: &str, allowed: &[&str], default_value: &str) -> String {
    let normalized = value.trim().to_lowercase();
    if allowed.iter().any(|candidate| *candidate == normalized) {
        normalized
    } else {
        default_value.to_string()
    }
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
