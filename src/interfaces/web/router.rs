use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::AppState;
use super::handlers::{analyze, battle, chat, history, status};

fn build_cors(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.trim().parse().ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api", get(status::root))
        .route("/api/health", get(status::health))
        .route("/api/models", get(status::models))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .route("/api/chat/stream", post(chat::chat_stream_endpoint))
        .route("/api/battle/stream", post(battle::battle_stream_endpoint))
        .route("/api/analyze", post(analyze::analyze_endpoint))
        .route("/api/chats", get(history::list_chats))
        .route("/api/battles", get(history::list_battles))
        .layer(middleware::from_fn(security_headers))
        .layer(build_cors(&state.config.cors_origins))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}

#[cfg(test)]
mod tests {
    use super::super::testing::state_with;
    use super::*;
    use crate::core::analysis::testing::{CannedFetcher, CannedImages};
    use crate::core::error::{FetchError, ImageGenError};
    use crate::core::llm::LlmProvider;
    use crate::core::llm::testing::ScriptedProvider;
    use crate::core::memory::types::ChatSession;
    use crate::core::memory::{TranscriptSink, TranscriptStore};
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::util::ServiceExt;

    const ANALYSIS_REPLY: &str = r#"```json
{"business_type": "portfolio", "visual_score": 90, "ux_score": 90,
 "seo_score": 90, "exposure_score": 90, "redesign_description": "More whitespace."}
```"#;

    fn providers(claude: &str, gpt: Option<&str>, gemini: &str) -> Vec<Arc<dyn LlmProvider>> {
        let gpt: Arc<dyn LlmProvider> = match gpt {
            Some(reply) => Arc::new(ScriptedProvider::replying("openai", reply)),
            None => Arc::new(ScriptedProvider::failing("openai", "insufficient quota")),
        };
        vec![
            Arc::new(ScriptedProvider::replying("anthropic", claude)),
            gpt,
            Arc::new(ScriptedProvider::replying("gemini", gemini)),
        ]
    }

    fn default_app() -> (Router, TranscriptStore) {
        let (state, store) = state_with(
            providers("Claude here", Some("GPT here"), "Gemini here"),
            CannedFetcher::page("<html><title>Site</title></html>"),
            CannedImages(Ok(b"png".to_vec())),
        );
        (build_api_router(state), store)
    }

    async fn json_request(
        app: Router,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let body = match body {
            Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
            None => Body::empty(),
        };

        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body_bytes = axum::body::to_bytes(resp.into_body(), 4 * 1024 * 1024)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));
        (status, json)
    }

    /// Posts to a streaming route and returns (event name, payload) pairs.
    async fn sse_request(app: Router, path: &str, body: Value) -> Vec<(String, Value)> {
        let req = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );
        let bytes = axum::body::to_bytes(resp.into_body(), 4 * 1024 * 1024)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        text.split("\n\n")
            .filter(|frame| !frame.trim().is_empty())
            .map(|frame| {
                let mut name = String::new();
                let mut data = String::new();
                for line in frame.lines() {
                    if let Some(v) = line.strip_prefix("event:") {
                        name = v.trim().to_string();
                    } else if let Some(v) = line.strip_prefix("data:") {
                        data.push_str(v.trim_start());
                    }
                }
                (name, serde_json::from_str(&data).unwrap())
            })
            .collect()
    }

    async fn wait_for_chats(store: &TranscriptStore, count: usize) -> Vec<ChatSession> {
        for _ in 0..100 {
            let chats = store.recent_chats(10).await.unwrap();
            if chats.len() >= count {
                return chats;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        store.recent_chats(10).await.unwrap()
    }

    #[tokio::test]
    async fn security_headers_present_on_responses() {
        let (app, _) = default_app();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(
            resp.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn banner_and_health() {
        let (app, store) = default_app();
        let (status, json) = json_request(app.clone(), Method::GET, "/api", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ready");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));

        let (_, json) = json_request(app.clone(), Method::GET, "/api/health", None).await;
        assert_eq!(json["database"], "connected");

        store.close().await;
        let (status, json) = json_request(app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["database"], "disconnected");
    }

    #[tokio::test]
    async fn models_are_listed_in_battle_order() {
        let (app, _) = default_app();
        let (_, json) = json_request(app, Method::GET, "/api/models", None).await;
        let tags: Vec<&str> = json["models"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["tag"].as_str().unwrap())
            .collect();
        assert_eq!(tags, ["claude", "gpt", "gemini"]);
    }

    #[tokio::test]
    async fn chat_stream_delivers_tokens_then_done_and_stores_transcript() {
        let (app, store) = default_app();
        let events = sse_request(
            app,
            "/api/chat/stream",
            json!({
                "messages": [{"role": "user", "content": "hi"}],
                "model": "gpt",
                "session_id": "web-1"
            }),
        )
        .await;

        let tokens: String = events
            .iter()
            .filter(|(name, _)| name == "token")
            .map(|(_, data)| {
                assert_eq!(data["done"], false);
                data["token"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(tokens, "GPT here");
        let (last_name, last_data) = events.last().unwrap();
        assert_eq!(last_name, "done");
        assert_eq!(last_data["done"], true);

        let chats = wait_for_chats(&store, 1).await;
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].session_id, "web-1");
        assert_eq!(chats[0].model, "gpt");
        assert_eq!(chats[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn chat_stream_rejects_unknown_model() {
        let (app, _) = default_app();
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/chat/stream",
            Some(json!({ "messages": [], "model": "llama" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("llama"));
    }

    #[tokio::test]
    async fn chat_stream_reports_provider_failure_as_error_event() {
        let (state, _) = state_with(
            providers("x", None, "y"),
            CannedFetcher::page(""),
            CannedImages(Ok(vec![1])),
        );
        let events = sse_request(
            build_api_router(state),
            "/api/chat/stream",
            json!({ "messages": [{"role": "user", "content": "hi"}], "model": "gpt" }),
        )
        .await;

        let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["error", "done"]);
        assert!(
            events[0].1["error"]
                .as_str()
                .unwrap()
                .contains("insufficient quota")
        );
    }

    #[tokio::test]
    async fn battle_stream_keeps_model_order_and_isolates_failures() {
        let (state, store) = state_with(
            providers("Claude wins", None, "Gemini wins"),
            CannedFetcher::page(""),
            CannedImages(Ok(vec![1])),
        );
        let events = sse_request(
            build_api_router(state),
            "/api/battle/stream",
            json!({ "prompt": "Who wins?", "session_id": "arena" }),
        )
        .await;

        let lifecycle: Vec<(String, String)> = events
            .iter()
            .filter(|(name, _)| name != "token" && name != "done")
            .map(|(name, data)| (data["model"].as_str().unwrap().to_string(), name.clone()))
            .collect();
        let expected: Vec<(String, String)> = [
            ("claude", "start"),
            ("claude", "complete"),
            ("gpt", "error"),
            ("gemini", "start"),
            ("gemini", "complete"),
        ]
        .iter()
        .map(|(m, n)| (m.to_string(), n.to_string()))
        .collect();
        assert_eq!(lifecycle, expected);
        assert_eq!(events.last().unwrap().0, "done");

        let mut runs = Vec::new();
        for _ in 0..100 {
            runs = store.recent_battles(5).await.unwrap();
            if !runs.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].session_id, "arena");
        assert_eq!(runs[0].responses.len(), 2);
    }

    #[tokio::test]
    async fn battle_stream_rejects_blank_prompt() {
        let (app, _) = default_app();
        let (status, _) = json_request(
            app,
            Method::POST,
            "/api/battle/stream",
            Some(json!({ "prompt": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analyze_returns_full_result() {
        let (state, _) = state_with(
            providers(ANALYSIS_REPLY, Some("-"), "-"),
            CannedFetcher::page("<html><title>Folio</title><footer></footer></html>"),
            CannedImages(Ok(b"png".to_vec())),
        );
        let (status, json) = json_request(
            build_api_router(state),
            Method::POST,
            "/api/analyze",
            Some(json!({ "url": "folio.example" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["url"], "https://folio.example");
        assert_eq!(json["scraped_data"]["title"], "Folio");
        assert_eq!(json["scraped_data"]["has_footer"], true);
        assert_eq!(json["analysis"]["business_type"], "portfolio");
        assert_eq!(json["overall_score"], 90.0);
        assert_eq!(json["mockup_image"], "cG5n");
        assert_eq!(json["mockup_generated"], true);
        assert!(json["analyzed_at"].is_string());
    }

    #[tokio::test]
    async fn analyze_fetch_failure_is_a_single_error_response() {
        let (state, _) = state_with(
            providers(ANALYSIS_REPLY, Some("-"), "-"),
            CannedFetcher::error(FetchError::Timeout {
                url: "https://slow.example".to_string(),
                secs: 15,
            }),
            CannedImages(Ok(b"png".to_vec())),
        );
        let (status, json) = json_request(
            build_api_router(state),
            Method::POST,
            "/api/analyze",
            Some(json!({ "url": "slow.example" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["success"], false);
        assert_eq!(json["stage"], "fetch");
        assert!(json.get("overall_score").is_none());
    }

    #[tokio::test]
    async fn analyze_maps_bad_url_and_bad_model_output() {
        let (state, _) = state_with(
            providers("not json at all", Some("-"), "-"),
            CannedFetcher::page("<html></html>"),
            CannedImages(Ok(b"png".to_vec())),
        );
        let app = build_api_router(state);

        let (status, json) = json_request(
            app.clone(),
            Method::POST,
            "/api/analyze",
            Some(json!({ "url": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["stage"], "fetch");

        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/analyze",
            Some(json!({ "url": "ok.example" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["stage"], "parse");
    }

    #[tokio::test]
    async fn analyze_survives_mockup_failure() {
        let (state, _) = state_with(
            providers(ANALYSIS_REPLY, Some("-"), "-"),
            CannedFetcher::page("<html></html>"),
            CannedImages(Err(ImageGenError::Http {
                status: 429,
                body: "rate limited".to_string(),
            })),
        );
        let (status, json) = json_request(
            build_api_router(state),
            Method::POST,
            "/api/analyze",
            Some(json!({ "url": "example.com" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["mockup_generated"], false);
        assert_eq!(json["mockup_image"], "");
        assert_eq!(json["warnings"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_routes_respect_limit_and_order() {
        let (app, store) = default_app();
        for i in 0..3 {
            store
                .append_chat(&ChatSession {
                    record_id: uuid::Uuid::new_v4(),
                    session_id: format!("s{i}"),
                    model: "claude".to_string(),
                    messages: Vec::new(),
                    error: None,
                    created_at: chrono::Utc::now(),
                })
                .await
                .unwrap();
        }

        let (status, json) = json_request(app.clone(), Method::GET, "/api/chats?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = json["chats"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["session_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["s2", "s1"]);

        let (status, json) = json_request(app, Method::GET, "/api/battles", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["battles"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn method_not_allowed_returns_405() {
        let (app, _) = default_app();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/analyze")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn api_route_contract_has_all_expected_paths() {
        let paths = [
            "/api",
            "/api/health",
            "/api/models",
            "/api/logs",
            "/api/chat/stream",
            "/api/battle/stream",
            "/api/analyze",
            "/api/chats",
            "/api/battles",
        ];

        let (app, _) = default_app();
        for path in paths {
            let req = Request::builder()
                .method(Method::PUT)
                .uri(path)
                .body(Body::empty())
                .expect("request should build");
            let resp = app
                .clone()
                .oneshot(req)
                .await
                .expect("router oneshot should succeed");
            assert_ne!(
                resp.status(),
                StatusCode::NOT_FOUND,
                "Route missing from router: {}",
                path
            );
        }
    }
}
