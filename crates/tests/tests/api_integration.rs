use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use club_agents::ClubAgent;
use club_api::{build_app, build_router, ApiState, AssistantConfig, IpRateLimiter, StripeConfig};
use club_observability::AppMetrics;
use club_storage::{load_catalog_seed, Store};
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "dev-club-key";

fn catalog_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data/catalog.json")
}

async fn app() -> Router {
    build_app(catalog_path()).await.expect("app should build")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, parsed)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let (status, body) = send(app().await, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body.get("metrics").is_some());
}

#[tokio::test]
async fn chat_requires_api_key() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "How much is a course?" }).to_string()))
        .unwrap();

    let (status, body) = send(app().await, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn chat_answers_pricing_question() {
    let (status, body) = send(
        app().await,
        post_json("/v1/chat", json!({ "text": "What's the PRICE of a course?" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "pricing");
    assert_eq!(body["backend"], "faq");
    assert!(body["reply_text"].as_str().unwrap().contains("$49 to $199"));
}

#[tokio::test]
async fn chat_falls_back_for_unknown_text() {
    let (status, body) = send(
        app().await,
        post_json("/v1/chat", json!({ "message": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "fallback");
    assert_eq!(
        body["reply_text"],
        "I'm here to help! Could you please provide more details about your question?"
    );
}

#[tokio::test]
async fn allowed_origin_can_chat_without_key() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .header("origin", "http://localhost:3000")
        .body(Body::from(json!({ "text": "Do you offer a refund?" }).to_string()))
        .unwrap();

    let (status, body) = send(app().await, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "refund");
}

#[tokio::test]
async fn assistant_mode_without_openai_serves_faq() {
    let (status, body) = send(
        app().await,
        post_json(
            "/v1/chat",
            json!({ "text": "CERTIFICATE please", "mode": "assistant" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "certificate");
    assert_eq!(body["backend"], "faq_fallback");
}

#[tokio::test]
async fn course_filters_apply() {
    let (status, body) = send(app().await, get("/v1/courses?search=BLENDER")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (_, body) = send(app().await, get("/v1/courses?category=after-effects")).await;
    let slugs = body["courses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|course| course["slug"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        slugs,
        vec!["motion-principles-masterclass", "after-effects-kickstart"]
    );

    let (_, body) = send(app().await, get("/v1/courses?category=all&limit=2")).await;
    assert_eq!(body["count"], 2);

    let (_, body) = send(app().await, get("/v1/courses/published")).await;
    assert_eq!(body["count"], 3);
}

#[tokio::test]
async fn course_detail_hides_drafts() {
    let (status, body) = send(app().await, get("/v1/courses/after-effects-kickstart")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category_name"], "After Effects Kickstart");
    assert_eq!(body["display_price"], "$49.00");
    assert_eq!(body["rating"]["review_count"], 2);
    let recent = body["recent_reviews"].as_array().unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0]["id"], "review-seed-2");

    let (status, body) = send(app().await, get("/v1/courses/geometry-nodes-lab")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "course_not_found");
}

#[tokio::test]
async fn lessons_are_ordered_and_pages_link_neighbors() {
    let (status, body) = send(
        app().await,
        get("/v1/courses/after-effects-kickstart/lessons"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids = body["lessons"]
        .as_array()
        .unwrap()
        .iter()
        .map(|lesson| lesson["id"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["lesson-ae-1", "lesson-ae-2", "lesson-ae-3"]);

    let (status, page) = send(
        app().await,
        get("/v1/courses/after-effects-kickstart/lessons/lesson-ae-2"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["video"]["kind"], "youtube");
    assert_eq!(
        page["video"]["embed_url"],
        "https://www.youtube.com/embed/mdcAe0002"
    );
    assert_eq!(page["previous_lesson_id"], "lesson-ae-1");
    assert_eq!(page["next_lesson_id"], "lesson-ae-3");
    assert_eq!(page["duration_label"], "22 min");

    let (_, last) = send(
        app().await,
        get("/v1/courses/after-effects-kickstart/lessons/lesson-ae-3"),
    )
    .await;
    assert_eq!(last["video"]["kind"], "hosted");
    assert_eq!(last["next_lesson_id"], Value::Null);
    assert_eq!(last["duration_label"], "1h 10m");

    let (status, _) = send(
        app().await,
        get("/v1/courses/after-effects-kickstart/lessons/lesson-blender-1"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reviews_list_sorts_and_filters() {
    let (status, body) = send(
        app().await,
        get("/v1/reviews?course_id=course-blender-3d&sort_by=lowest"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["reviews"][0]["rating"], 3);

    let (_, body) = send(app().await, get("/v1/reviews?rating=5")).await;
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn posted_review_updates_summary() {
    let app = app().await;

    let (status, created) = send(
        app.clone(),
        post_json(
            "/v1/reviews",
            json!({
                "user_id": "user-sam",
                "user_name": "  Sam  ",
                "rating": 2,
                "comment": "Too fast for a beginner.",
                "course_id": "course-blender-3d"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["user_name"], "Sam");

    let (status, summary) = send(app, get("/v1/reviews/summary/course-blender-3d")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["review_count"], 3);
    assert_eq!(summary["average_rating"], 3.3);
    assert_eq!(summary["distribution"]["2"], 1);
    assert_eq!(summary["distribution"]["4"], 0);
}

#[tokio::test]
async fn invalid_review_is_rejected() {
    let (status, body) = send(
        app().await,
        post_json(
            "/v1/reviews",
            json!({
                "user_id": "user-sam",
                "user_name": "Sam",
                "rating": 6,
                "comment": "Off the scale",
                "course_id": "course-blender-3d"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_review");

    let (status, _) = send(
        app().await,
        post_json(
            "/v1/reviews",
            json!({
                "user_id": "user-sam",
                "user_name": "Sam",
                "rating": 4,
                "comment": "Which course?",
                "course_id": "course-missing"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn payment_intent_requires_stripe() {
    let (status, body) = send(
        app().await,
        post_json(
            "/v1/payments/create_intent",
            json!({ "course_id": "course-ae-kickstart" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "payments_unavailable");
}

#[tokio::test]
async fn categories_are_listed() {
    let (status, body) = send(app().await, get("/v1/categories")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"][1]["id"], "blender");
}

fn limited_router(max_requests: usize) -> Router {
    let metrics = AppMetrics::shared();
    build_router(ApiState {
        agent: Arc::new(ClubAgent::new(Arc::new(Store::memory()), metrics.clone())),
        metrics,
        api_key: API_KEY.to_string(),
        limiter: IpRateLimiter::new(Duration::from_secs(60), max_requests),
        http_client: reqwest::Client::new(),
        assistant: None,
        payments: None,
        allowed_origins: Arc::new(Vec::new()),
        store_backend: "memory",
    })
}

#[tokio::test]
async fn rate_limit_returns_retry_after() {
    let app = limited_router(1);

    let response = app.clone().oneshot(get("/v1/categories")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "1");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

    let response = app.clone().oneshot(get("/v1/categories")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    let (status, _) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_security_and_request_id_headers() {
    let response = limited_router(10).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert!(response.headers().contains_key("x-request-id"));
}

// Nothing listens on the discard port, so every upstream call fails fast.
const UNREACHABLE: &str = "http://127.0.0.1:9";

async fn unreachable_upstream_router() -> (Router, Arc<AppMetrics>) {
    let metrics = AppMetrics::shared();
    let agent = ClubAgent::new(Arc::new(Store::memory()), metrics.clone());
    agent
        .seed(load_catalog_seed(catalog_path()).unwrap())
        .await
        .unwrap();

    let mut assistant = AssistantConfig::new("sk-test");
    assistant.endpoint = format!("{UNREACHABLE}/v1/chat/completions");
    let mut payments = StripeConfig::new("sk_test_123", "usd");
    payments.endpoint = format!("{UNREACHABLE}/v1/payment_intents");

    let router = build_router(ApiState {
        agent: Arc::new(agent),
        metrics: metrics.clone(),
        api_key: API_KEY.to_string(),
        limiter: IpRateLimiter::new(Duration::from_secs(60), 100),
        http_client: reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap(),
        assistant: Some(assistant),
        payments: Some(payments),
        allowed_origins: Arc::new(Vec::new()),
        store_backend: "memory",
    });
    (router, metrics)
}

#[tokio::test]
async fn failed_assistant_call_falls_back_to_faq() {
    let (app, metrics) = unreachable_upstream_router().await;

    let (status, body) = send(
        app.clone(),
        post_json(
            "/v1/chat",
            json!({ "text": "What does a course cost?", "mode": "assistant" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backend"], "faq_fallback");
    assert_eq!(body["topic"], "pricing");

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.assistant_calls_total, 1);
    assert_eq!(snapshot.assistant_failures_total, 1);

    let (_, health) = send(app, get("/health")).await;
    assert_eq!(health["metrics"]["assistant_failures_total"], 1);
    assert_eq!(health["capabilities"]["assistant"], true);
}

#[tokio::test]
async fn failed_payment_intent_is_bad_gateway() {
    let (app, metrics) = unreachable_upstream_router().await;

    let (status, body) = send(
        app,
        post_json(
            "/v1/payments/create_intent",
            json!({ "course_id": "course-ae-kickstart" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "stripe_payment_intent_failed");
    assert_eq!(body["message"], "payment provider request failed");
    assert!(!body["message"].as_str().unwrap().contains("127.0.0.1"));
    assert_eq!(metrics.snapshot().checkout_intents_total, 0);
}
