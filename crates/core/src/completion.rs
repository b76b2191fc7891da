use crate::conversation::ChatTurn;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

// Fixed sampling parameters; every request uses these.
const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 150;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// The HTTP exchange itself could not complete: network failure or a
    /// non-success status code.
    #[error("completion request failed: {0}")]
    Transport(String),
    /// The response body lacked the expected reply structure.
    #[error("completion response was malformed: {0}")]
    MalformedResponse(String),
}

// The `CompletionApi` trait is the seam between the session controller and
// the hosted endpoint. The controller depends on this abstraction rather than
// the concrete HTTP client, so unit tests can script replies with `mockall`'s
// `MockCompletionApi` instead of making real network calls.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait CompletionApi {
    /// Requests one reply for `user_message` within `topic`, with `context`
    /// as the prior conversation. Every call is a fresh, independent request:
    /// no retry, no timeout enforcement, no caching.
    async fn request_reply(
        &self,
        user_message: &str,
        topic: &str,
        context: &[ChatTurn],
    ) -> Result<String, CompletionError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

/// Client for the hosted chat-completion endpoint.
///
/// The API key is held as a [`SecretString`] and exposed only at the moment
/// the request is signed; it never appears in logs or debug output.
pub struct CompletionClient {
    client: Client,
    api_key: SecretString,
    model: String,
}

impl CompletionClient {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.into(),
        }
    }

    // Request layout is fixed: one synthesized system message (language
    // directive plus topic-scoped persona), then all context turns in order,
    // then the user message last.
    fn build_messages(user_message: &str, topic: &str, context: &[ChatTurn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: format!(
                "You speak English. You are a helpful assistant specializing in {topic}. \
                 Keep responses concise and natural."
            ),
        });
        messages.extend(context.iter().map(|turn| ChatMessage {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }));
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user_message.to_string(),
        });
        messages
    }
}

#[async_trait]
impl CompletionApi for CompletionClient {
    async fn request_reply(
        &self,
        user_message: &str,
        topic: &str,
        context: &[ChatTurn],
    ) -> Result<String, CompletionError> {
        let messages = Self::build_messages(user_message, topic, context);
        let body = ChatRequest {
            model: &self.model,
            messages: &messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        tracing::debug!(
            model = %self.model,
            message_count = messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompletionError::Transport(format!(
                "API call failed: {status}"
            )));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

        let choice = reply.choices.into_iter().next().ok_or_else(|| {
            CompletionError::MalformedResponse("response contained no choices".to_string())
        })?;

        if choice.message.content.is_empty() {
            return Err(CompletionError::MalformedResponse(
                "reply content was empty".to_string(),
            ));
        }

        Ok(choice.message.content)
    }
}
