use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::error::ProviderError;
use super::types::{ChatMessage, ChatRequest, ChatResponse};
use super::{Provider, ProviderDescriptor, TaskRequest};
use crate::config::ProviderConfig;
use crate::error::AppError;

/// Provider speaking the OpenAI-compatible `chat/completions` protocol.
pub struct ChatProvider {
    descriptor: ProviderDescriptor,
    api_key: String,
    temperature: Option<f32>,
    headers: BTreeMap<String, String>,
    client: Client,
}

impl ChatProvider {
    pub fn new(
        descriptor: ProviderDescriptor,
        api_key: String,
        temperature: Option<f32>,
        timeout: Duration,
        headers: BTreeMap<String, String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Setup(e.to_string()))?;
        Ok(Self {
            descriptor,
            api_key,
            temperature,
            headers,
            client,
        })
    }

    /// Build a provider from its config entry, resolving the API key from the environment.
    pub fn from_config(config: &ProviderConfig, priority: usize) -> Result<Self, AppError> {
        let api_key = config.api_key()?;
        let descriptor = ProviderDescriptor {
            name: config.name.clone(),
            endpoint: completions_url(&config.base_url),
            model: config.model.clone(),
            priority,
        };
        Self::new(
            descriptor,
            api_key,
            config.temperature,
            Duration::from_secs(config.timeout_secs),
            config.headers.clone(),
        )
        .map_err(|e| AppError::Config(format!("provider {}: {e}", config.name)))
    }
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

#[async_trait]
impl Provider for ChatProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn submit(&self, request: &TaskRequest) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: self.descriptor.model.clone(),
            messages: vec![
                ChatMessage::system(request.system_prompt.as_str()),
                ChatMessage::user(request.input.as_str()),
            ],
            temperature: self.temperature,
        };

        let mut builder = self
            .client
            .post(&self.descriptor.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ProviderError::from_status(
                status.as_u16(),
                message,
                retry_after_secs,
            ));
        }

        let bytes = response.bytes().await?;
        let parsed: ChatResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        parsed
            .first_text()
            .map(str::to_string)
            .ok_or(ProviderError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TaskKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer, temperature: Option<f32>) -> ChatProvider {
        let mut headers = BTreeMap::new();
        headers.insert("X-Title".to_string(), "noteforge".to_string());
        ChatProvider::new(
            ProviderDescriptor {
                name: "mock".into(),
                endpoint: completions_url(&format!("{}/v1/", server.uri())),
                model: "test-model".into(),
                priority: 0,
            },
            "sk-test".into(),
            temperature,
            Duration::from_secs(5),
            headers,
        )
        .unwrap()
    }

    fn request() -> TaskRequest {
        TaskRequest {
            kind: TaskKind::Rewrite,
            system_prompt: "rewrite it".into(),
            input: "original text".into(),
        }
    }

    #[test]
    fn completions_url_trims_trailing_slash() {
        assert_eq!(
            completions_url("https://api.moonshot.cn/v1/"),
            "https://api.moonshot.cn/v1/chat/completions"
        );
        assert_eq!(
            completions_url("https://openrouter.ai/api/v1"),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn success_returns_trimmed_text_and_sends_expected_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("x-title", "noteforge"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "temperature": 0.6,
                "messages": [
                    {"role": "system", "content": "rewrite it"},
                    {"role": "user", "content": "original text"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "\n new text \n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider_for(&server, Some(0.6)).submit(&request()).await.unwrap();
        assert_eq!(text, "new text");
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = provider_for(&server, None).submit(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = provider_for(&server, None).submit(&request()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("bad gateway"));
    }

    #[tokio::test]
    async fn auth_failure_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let err = provider_for(&server, None).submit(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unauthorized { status: 401, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn bad_request_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("model not found"))
            .mount(&server)
            .await;

        let err = provider_for(&server, None).submit(&request()).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn malformed_body_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let err = provider_for(&server, None).submit(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn empty_content_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": ""}}]
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server, None).submit(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let provider = ChatProvider::new(
            ProviderDescriptor {
                name: "gone".into(),
                endpoint: completions_url(&uri),
                model: "m".into(),
                priority: 0,
            },
            "sk".into(),
            None,
            Duration::from_secs(2),
            BTreeMap::new(),
        )
        .unwrap();

        let err = provider.submit(&request()).await.unwrap_err();
        assert!(err.is_transient(), "unexpected: {err:?}");
    }
}
