use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::InferenceSettings;
use crate::model::ChatTurn;

pub const FALLBACK_REPLY: &str = "Désolé, je n'ai pas pu générer une réponse.";
const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference endpoint credentials are not configured")]
    NotConfigured,
    #[error("inference endpoint answered {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("inference request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Something that turns a system prompt and a conversation into a reply.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, messages: &[ChatTurn]) -> Result<String, InferenceError>;
}

/// Stand-in used when no credentials are configured; every call fails.
pub struct Unconfigured;

#[async_trait]
impl CompletionClient for Unconfigured {
    async fn complete(&self, _: &str, _: &[ChatTurn]) -> Result<String, InferenceError> {
        Err(InferenceError::NotConfigured)
    }
}

/// Cloudflare Workers AI text generation.
pub struct CloudflareClient {
    http: Client,
    endpoint: String,
    api_token: String,
}

impl CloudflareClient {
    pub fn new(
        settings: &InferenceSettings,
        account_id: &str,
        api_token: &str,
    ) -> Result<Self, InferenceError> {
        let http = Client::builder().timeout(settings.timeout).build()?;
        let endpoint = format!(
            "{}/accounts/{}/ai/run/{}",
            settings.base_url.trim_end_matches('/'),
            account_id,
            settings.model
        );
        Ok(CloudflareClient {
            http,
            endpoint,
            api_token: api_token.to_owned(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

fn run_request<'a>(system_prompt: &'a str, messages: &'a [ChatTurn]) -> RunRequest<'a> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    wire.push(WireMessage {
        role: "system",
        content: system_prompt,
    });
    wire.extend(messages.iter().map(|m| WireMessage {
        role: m.role.as_str(),
        content: &m.content,
    }));
    RunRequest {
        messages: wire,
        max_tokens: MAX_TOKENS,
        temperature: TEMPERATURE,
    }
}

fn extract_reply(body: &Value) -> String {
    body.pointer("/result/response")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_REPLY)
        .to_owned()
}

#[async_trait]
impl CompletionClient for CloudflareClient {
    async fn complete(&self, system_prompt: &str, messages: &[ChatTurn]) -> Result<String, InferenceError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&run_request(system_prompt, messages))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        Ok(extract_reply(&body))
    }
}

/// Builds the client the settings allow for: Cloudflare when both credentials
/// are present, otherwise one that reports the missing configuration.
pub fn from_settings(settings: &InferenceSettings) -> Result<Box<dyn CompletionClient>, InferenceError> {
    match (&settings.account_id, &settings.api_token) {
        (Some(account_id), Some(api_token)) => {
            let client = CloudflareClient::new(settings, account_id, api_token)?;
            log::info!("inference endpoint: {}", client.endpoint());
            Ok(Box::new(client))
        }
        _ => {
            log::warn!("CLOUDFLARE_ACCOUNT_ID or CLOUDFLARE_API_TOKEN missing, chat is disabled");
            Ok(Box::new(Unconfigured))
        }
    }
}
