//! Thin gateway to the external text-generation provider: a system prompt
//! plus user content in, plain text out. No retries, no rate limiting; the
//! shared HTTP client's timeouts are the only deadline. Callers gate every
//! call on [`LlmConfig::is_configured`] and supply their own fallback text.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::models::ChatMessage;

/// Single-shot completion: one user message under a system prompt.
pub async fn complete(
    client: &reqwest::Client,
    config: &LlmConfig,
    system_prompt: &str,
    user_prompt: &str,
    max_tokens: u32,
) -> Result<String> {
    let messages = vec![ChatMessage {
        role: "user".to_string(),
        content: user_prompt.to_string(),
        is_error: None,
    }];
    complete_with_history(client, config, system_prompt, &messages, max_tokens).await
}

/// Completion over a full conversation. `messages` must already be
/// normalized: first turn from the user, roles strictly alternating
/// (see `api::solver::normalize_conversation`).
pub async fn complete_with_history(
    client: &reqwest::Client,
    config: &LlmConfig,
    system_prompt: &str,
    messages: &[ChatMessage],
    max_tokens: u32,
) -> Result<String> {
    match config.provider.as_str() {
        "anthropic" => call_anthropic(client, config, system_prompt, messages, max_tokens).await,
        "openai" => call_openai(client, config, system_prompt, messages, max_tokens).await,
        other => anyhow::bail!("Unknown LLM provider: {other}"),
    }
}

// ─── Anthropic ───────────────────────────────────────────

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

async fn call_anthropic(
    client: &reqwest::Client,
    config: &LlmConfig,
    system_prompt: &str,
    messages: &[ChatMessage],
    max_tokens: u32,
) -> Result<String> {
    let url = format!("{}/v1/messages", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let req = AnthropicRequest {
        model: config.model.clone(),
        max_tokens,
        system: system_prompt.to_string(),
        messages: messages.to_vec(),
    };

    let resp = client
        .post(&url)
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&req)
        .send()
        .await
        .context("Failed to call Anthropic messages API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Anthropic API returned {status}: {body}");
    }

    let body: AnthropicResponse = resp.json().await?;
    Ok(body
        .content
        .first()
        .map(|c| c.text.clone())
        .unwrap_or_default())
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

async fn call_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    system_prompt: &str,
    messages: &[ChatMessage],
    max_tokens: u32,
) -> Result<String> {
    let url = format!("{}/v1/chat/completions", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    // OpenAI carries the system prompt as the leading message
    let mut api_messages = Vec::with_capacity(messages.len() + 1);
    api_messages.push(ChatMessage {
        role: "system".to_string(),
        content: system_prompt.to_string(),
        is_error: None,
    });
    api_messages.extend(messages.iter().cloned());

    let req = OpenAiChatRequest {
        model: config.model.clone(),
        messages: api_messages,
        max_tokens,
    };

    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&req)
        .send()
        .await
        .context("Failed to call OpenAI chat API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI API returned {status}: {body}");
    }

    let body: OpenAiChatResponse = resp.json().await?;
    Ok(body
        .choices
        .first()
        .map(|c| c.message.content.clone())
        .unwrap_or_default())
}
