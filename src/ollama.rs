//! Chat model access through the Ollama `/api/chat` endpoint.

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info_span, instrument, trace, Instrument};

// ---

#[derive(Debug, Error)]
pub enum ChatModelError {
    // ---
    #[error("Request Error: {0}")]
    Request(String),

    #[error("API Error: {0}")]
    Api(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

/// Role of a message sent to the model.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A model that completes a chat transcript.
///
/// Generation must halt at any of the `stop` sequences; the stop sequence
/// itself is not part of the returned text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        stop: &[String],
    ) -> Result<String, ChatModelError>;
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions<'a>,
}

#[derive(Serialize, Debug)]
struct ChatOptions<'a> {
    temperature: f32,
    stop: &'a [String],
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    message: ChatMessage,
    #[serde(default)]
    done_reason: Option<String>,
}

/// Client for a single model on an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    // ---
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    /// `base_url` is the server root, e.g. `http://localhost:11434`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
        // ---
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    #[instrument(name = "ollama.post", skip_all, fields(endpoint))]
    async fn post<T, R>(&self, endpoint: &str, request_body: &T) -> Result<R, ChatModelError>
    where
        T: Serialize + fmt::Debug,
        R: DeserializeOwned + fmt::Debug,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let span = info_span!("http.request", %url);
        async {
            let response = self
                .client
                .post(&url)
                .json(request_body)
                .send()
                .await
                .map_err(|e| ChatModelError::Request(e.to_string()))?;

            let status = response.status();
            debug!(%status, "received response");

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Failed to read error body".into());

                error!(%status, body = %error_text, "request failed");
                return Err(ChatModelError::Api(format!(
                    "Request failed: {status} - {error_text}"
                )));
            }

            let response_text = response
                .text()
                .await
                .map_err(|e| ChatModelError::Api(format!("Failed to read response text: {e}")))?;

            match serde_json::from_str::<R>(&response_text) {
                Ok(parsed) => {
                    trace!(?parsed, "deserialized response");
                    Ok(parsed)
                }
                Err(e) => {
                    error!(%e, raw = %response_text, "deserialization error");
                    Err(ChatModelError::Serialization(format!(
                        "Error decoding response body: {e}. Raw JSON was: '{response_text}'"
                    )))
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        stop: &[String],
    ) -> Result<String, ChatModelError> {
        // ---
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
                stop,
            },
        };

        let response: ChatResponse = self.post("/api/chat", &request).await?;
        debug!(done_reason = ?response.done_reason, "model turn complete");
        Ok(response.message.content)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        // ---
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let stop = vec!["Observation:".to_string()];
        let request = ChatRequest {
            model: "llama3",
            messages: &messages,
            stream: false,
            options: ChatOptions {
                temperature: 0.5,
                stop: &stop,
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "llama3",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hi"}
                ],
                "stream": false,
                "options": {"temperature": 0.5, "stop": ["Observation:"]}
            })
        );
    }

    #[test]
    fn test_response_deserialization() {
        // ---
        let response: ChatResponse = serde_json::from_value(json!({
            "model": "llama3",
            "created_at": "2024-03-01T10:00:00Z",
            "message": {"role": "assistant", "content": "Thought: hi"},
            "done": true,
            "done_reason": "stop"
        }))
        .unwrap();
        assert_eq!(response.message.content, "Thought: hi");
        assert_eq!(response.done_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_request_error() {
        // ---
        let client = OllamaClient::new("http://bad host", "llama3", 0.8);
        let err = client
            .complete(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatModelError::Request(_)));
    }
}
