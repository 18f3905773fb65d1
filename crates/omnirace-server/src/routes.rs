//! Route definitions for the OmniRace API.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, state::AppState};

/// Create the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        // Racing endpoint
        .route("/v1/race", post(handlers::race_completion))
        // Apply middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        // Add state
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use omnirace_core::StreamFrame;
    use omnirace_providers::{build_adapters, ProviderSpec, WireFamily};
    use omnirace_scheduler::{RaceConfig, RaceScheduler};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Unique env var per test so parallel tests never share credentials.
    fn unique_env(tag: &str) -> String {
        format!("RACE_TEST_{}_{}", tag, uuid::Uuid::new_v4().simple())
    }

    fn spec_for(server_uri: &str, env: &str) -> ProviderSpec {
        ProviderSpec {
            name: "openai".to_string(),
            endpoint: format!("{server_uri}/v1/chat/completions"),
            model: "gpt-test".to_string(),
            credential_env: env.to_string(),
            timeout: Duration::from_secs(5),
            family: WireFamily::OpenAiSse,
            priority: 10,
        }
    }

    fn app_for(specs: Vec<ProviderSpec>) -> Router {
        let adapters = build_adapters(specs).unwrap();
        let scheduler = RaceScheduler::new(
            adapters,
            RaceConfig::default().with_global_timeout(Duration::from_secs(5)),
        );
        create_router(AppState::new(scheduler))
    }

    fn race_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/race")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app_for(vec![]);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_without_keys_is_unavailable() {
        let env = unique_env("READY");
        let app = app_for(vec![spec_for("http://localhost:9", &env)]);
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_get_on_race_path_is_405() {
        let app = app_for(vec![]);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/race")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_blank_prompt_is_400() {
        let app = app_for(vec![]);
        let response = app
            .oneshot(race_request(r#"{"prompt":"   "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_prompt_is_400() {
        let app = app_for(vec![]);
        let response = app
            .oneshot(race_request(r#"{"system":"be nice"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_no_keys_is_500_with_sentinel_body() {
        let env = unique_env("NOKEYS");
        let app = app_for(vec![spec_for("http://localhost:9", &env)]);
        let response = app
            .oneshot(race_request(r#"{"prompt":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["text"], "<no keys found>");
    }

    #[tokio::test]
    async fn test_all_rejected_is_503_with_failure_class() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let env = unique_env("ALLFAIL");
        std::env::set_var(&env, "sk-test-key-123456");

        let app = app_for(vec![spec_for(&server.uri(), &env)]);
        let response = app
            .oneshot(race_request(r#"{"prompt":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get("x-failure-class").unwrap(),
            "all_providers_failed"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], true);
        let text = json["text"].as_str().unwrap();
        assert!(text.contains("openai"));
        assert!(text.contains("429"));
        // The raw key never appears in an error body.
        assert!(!text.contains("sk-test-key-123456"));
    }

    #[tokio::test]
    async fn test_success_streams_winner_envelopes() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let env = unique_env("WIN");
        std::env::set_var(&env, "sk-test-key-123456");

        let app = app_for(vec![spec_for(&server.uri(), &env)]);
        let response = app
            .oneshot(race_request(r#"{"prompt":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-race-provider").unwrap(), "openai");
        assert_eq!(response.headers().get("x-race-key").unwrap(), "sk-t***56");
        assert!(response.headers().contains_key("x-race-latency-ms"));
        assert!(response.headers().contains_key("x-first-byte-ms"));

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let frames: Vec<StreamFrame> = serde_json::Deserializer::from_slice(&body)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();

        let text: String = frames.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(text, "Hello there");
        assert!(frames.iter().all(|f| f.provider == "openai"));
        assert!(frames.iter().all(|f| f.key_id == "sk-t***56"));
        // The raw key never leaks into the body.
        assert!(!String::from_utf8_lossy(&body).contains("sk-test-key-123456"));
    }

    #[tokio::test]
    async fn test_slow_loser_never_streamed() {
        // Fast winner and a deliberately slow second provider; the response
        // must only ever carry the winner's text.
        let fast = MockServer::start().await;
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"fast\"}}]}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&fast)
            .await;

        let slow = MockServer::start().await;
        let slow_sse = "data: {\"choices\":[{\"delta\":{\"content\":\"slow\"}}]}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(slow_sse)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&slow)
            .await;

        let env = unique_env("LOSER");
        std::env::set_var(&env, "sk-test-key-123456");

        let mut slow_spec = spec_for(&slow.uri(), &env);
        slow_spec.name = "groq".to_string();
        slow_spec.priority = 20;

        let adapters = build_adapters(vec![spec_for(&fast.uri(), &env), slow_spec]).unwrap();
        let scheduler = RaceScheduler::new(
            adapters,
            RaceConfig::default().with_global_timeout(Duration::from_secs(5)),
        );
        let app = create_router(AppState::new(scheduler));

        let response = app
            .oneshot(race_request(r#"{"prompt":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-race-provider").unwrap(), "openai");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("fast"));
        assert!(!text.contains("slow"));
    }
}
