use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::error::ImageGenError;

/// Renders one image for a text prompt and returns its raw bytes.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, ImageGenError>;
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
}

pub struct OpenAiImageGenerator {
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
    client: Client,
}

impl OpenAiImageGenerator {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1/images/generations";

    pub fn new(endpoint: String, api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            endpoint,
            api_key,
            model,
            timeout,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, ImageGenError> {
        let req = ImageRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: "1536x1024",
        };
        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ImageGenError::Timeout(self.timeout.as_secs())
                } else {
                    ImageGenError::Transport(e.to_string())
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            return Err(ImageGenError::Http {
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }

        let parsed: ImageResponse = res
            .json()
            .await
            .map_err(|e| ImageGenError::Decode(e.to_string()))?;
        let encoded = parsed
            .data
            .into_iter()
            .find_map(|d| d.b64_json)
            .ok_or(ImageGenError::Empty)?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| ImageGenError::Decode(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ImageGenError::Empty);
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

    /// Image endpoint on a loopback port answering with a fixed status and body.
    async fn mock_images(status: u16, reply: Value) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let app = Router::new().route(
            "/v1/images",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let reply = reply.clone();
                let recorder = recorder.clone();
                async move {
                    recorder.lock().unwrap().push((headers, body));
                    (StatusCode::from_u16(status).unwrap(), Json(reply))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}/v1/images"), seen)
    }

    fn generator(endpoint: String) -> OpenAiImageGenerator {
        OpenAiImageGenerator::new(
            endpoint,
            "sk-img".to_string(),
            "gpt-image-1".to_string(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn decodes_first_b64_image() {
        let (url, seen) = mock_images(
            200,
            json!({ "data": [{ "url": "ignored" }, { "b64_json": STANDARD.encode(b"png-bytes") }] }),
        )
        .await;

        let bytes = generator(url).generate("a homepage").await.unwrap();
        assert_eq!(bytes, b"png-bytes");

        let seen = seen.lock().unwrap();
        let (headers, body) = &seen[0];
        assert_eq!(headers["authorization"], "Bearer sk-img");
        assert_eq!(body["model"], "gpt-image-1");
        assert_eq!(body["n"], 1);
        assert_eq!(body["prompt"], "a homepage");
    }

    #[tokio::test]
    async fn error_status_keeps_code_and_body() {
        let (url, _) = mock_images(400, json!({ "error": "content policy" })).await;

        let err = generator(url).generate("x").await.unwrap_err();
        match err {
            ImageGenError::Http { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("content policy"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_b64_json_is_empty() {
        let (url, _) = mock_images(200, json!({ "data": [{ "url": "https://cdn/x.png" }] })).await;
        let err = generator(url).generate("x").await.unwrap_err();
        assert!(matches!(err, ImageGenError::Empty));

        let (url, _) = mock_images(200, json!({})).await;
        let err = generator(url).generate("x").await.unwrap_err();
        assert!(matches!(err, ImageGenError::Empty));
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_decode_error() {
        let (url, _) = mock_images(200, json!({ "data": [{ "b64_json": "not base64!!" }] })).await;
        let err = generator(url).generate("x").await.unwrap_err();
        assert!(matches!(err, ImageGenError::Decode(_)));

        let (url, _) = mock_images(200, json!({ "data": "nope" })).await;
        let err = generator(url).generate("x").await.unwrap_err();
        assert!(matches!(err, ImageGenError::Decode(_)));
    }
}
