// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Blocking client for a single chat-completion endpoint. Requests go to
/// the configured URL unchanged; no path is appended.
#[derive(Debug, Clone)]
pub struct Client {
    endpoint: Url,
    model: String,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let trimmed = endpoint.trim();
        if trimmed.is_empty() {
            bail!("chat.endpoint must not be empty");
        }
        let endpoint = Url::parse(trimmed)
            .with_context(|| format!("chat.endpoint {trimmed:?} is not a valid URL"))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!(
                "chat.endpoint {trimmed:?} uses scheme {:?}; use http or https",
                endpoint.scheme()
            );
        }
        if model.trim().is_empty() {
            bail!("chat.model must not be empty");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            endpoint,
            model: model.trim().to_owned(),
            timeout,
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends the whole conversation and returns the first choice's content.
    /// `Ok(None)` means the server answered but carried no content.
    pub fn chat_complete(&self, messages: &[Message]) -> Result<Option<String>> {
        let request = ChatRequest::new(&self.model, messages);
        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            messages = messages.len(),
            "sending chat completion"
        );
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .map_err(|error| connection_error(self.endpoint.as_str(), error))?;

        let status = response.status();
        let body = response.text().context("read chat response")?;
        let parsed: Value = serde_json::from_str(&body).with_context(|| {
            format!("decode chat response ({})", status.as_u16())
        })?;
        if !status.is_success() {
            tracing::warn!(
                endpoint = %self.endpoint,
                status = status.as_u16(),
                error = %clean_error_response(status, &body),
                "chat endpoint returned an error status"
            );
        }

        let content = reply_content(&parsed);
        if content.is_none() {
            tracing::warn!(endpoint = %self.endpoint, "chat response had no content");
        }
        Ok(content)
    }
}

/// First choice's message text. Any missing or null step along the path
/// counts as no content.
fn reply_content(body: &Value) -> Option<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn connection_error(endpoint: &str, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("request to {endpoint} timed out -- raise chat.timeout or check the server");
    }
    anyhow!(
        "cannot reach {} -- check chat.endpoint and your network ({})",
        endpoint,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<OpenAIErrorEnvelope>(body)
        && let Some(error) = parsed.error
        && !error.message.is_empty()
    {
        return anyhow!("server error ({}): {}", status.as_u16(), error.message);
    }

    if let Ok(parsed) = serde_json::from_str::<PlainErrorEnvelope>(body)
        && let Some(error) = parsed.error
        && !error.is_empty()
    {
        return anyhow!("server error ({}): {}", status.as_u16(), error);
    }

    let body = body.trim();
    if !body.is_empty() && body.len() < 100 && !body.contains('{') {
        return anyhow!("server error ({}): {}", status.as_u16(), body);
    }

    anyhow!("server returned {}", status.as_u16())
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

impl<'a> ChatRequest<'a> {
    fn new(model: &'a str, messages: &'a [Message]) -> Self {
        Self {
            model,
            messages: messages
                .iter()
                .map(|message| ChatMessage {
                    role: message.role.as_str(),
                    content: &message.content,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorEnvelope {
    error: Option<OpenAIErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PlainErrorEnvelope {
    error: Option<String>,
}
