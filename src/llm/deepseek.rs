use async_trait::async_trait;
use log::{ error, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };
use std::time::Duration;

use super::CompletionClient;
use crate::cli::Args;
use crate::error::ChatError;
use crate::models::chat::ChatMessage;

/// Client for the DeepSeek `/chat/completions` endpoint. Model and sampling
/// parameters are fixed at construction; nothing here is client-tunable.
pub struct DeepSeekClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionEnvelope {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    model: String,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl DeepSeekClient {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens,
            temperature,
        })
    }

    pub fn from_args(args: &Args) -> Result<Self, ChatError> {
        Self::new(
            args.chat_api_key.clone(),
            args.chat_base_url.clone(),
            args.chat_model.clone(),
            args.chat_max_tokens,
            args.chat_temperature,
            Duration::from_secs(args.upstream_timeout_secs),
        )
    }

    fn build_request<'a>(&'a self, messages: &'a [ChatMessage]) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        }
    }
}

fn extract_reply(envelope: CompletionEnvelope) -> Result<String, ChatError> {
    envelope.choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ChatError::MalformedResponse("completion has no choices".to_string()))
}

#[async_trait]
impl CompletionClient for DeepSeekClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let url = format!("{}/chat/completions", self.base_url);
        let req = self.build_request(messages);

        let resp = match
            self.http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&req)
                .send().await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!("Upstream completion call timed out");
                return Err(ChatError::Timeout);
            }
            Err(e) => {
                error!("Upstream completion call failed: {}", e);
                return Err(ChatError::Network(e.to_string()));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Upstream returned {}: {}", status, body);
            return Err(match status.as_u16() {
                401 | 403 => ChatError::Unauthorized,
                429 => ChatError::RateLimited,
                400 => ChatError::UpstreamBadRequest(body),
                code => ChatError::Upstream(format!("status {}", code)),
            });
        }

        let envelope = resp
            .json::<CompletionEnvelope>().await
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;

        if !envelope.model.is_empty() && envelope.model != self.model {
            warn!("Upstream answered with model '{}'", envelope.model);
        }

        extract_reply(envelope)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
