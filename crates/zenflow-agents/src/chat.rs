use std::sync::Mutex;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use zenflow_core::config::{AgentProfile, ModelConfig, RetryConfig};
use zenflow_core::error::{Result, ZenflowError};
use zenflow_core::traits::AgentCapability;

use crate::retry::with_retry;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Messages of history sent with each request.
pub const HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChatTurn {
    role: String,
    content: String,
}

impl ChatTurn {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatTurnContent,
}

#[derive(Deserialize)]
struct ChatTurnContent {
    #[serde(default)]
    content: Option<String>,
}

/// Persona-driven agent backed by an OpenAI-compatible chat endpoint.
///
/// Keeps a rolling conversation history; each request carries the persona
/// prompt plus the last [`HISTORY_WINDOW`] messages. Without an API key the
/// agent answers with a canned reply for its kind instead of calling out.
pub struct ChatAgent {
    http: Client,
    profile: AgentProfile,
    model: ModelConfig,
    api_key: Option<String>,
    history: Mutex<Vec<ChatTurn>>,
}

impl ChatAgent {
    pub fn new(profile: AgentProfile, model: ModelConfig) -> Self {
        let api_key = model
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                (model.provider == "openai")
                    .then(|| std::env::var("OPENAI_API_KEY").ok())
                    .flatten()
                    .filter(|k| !k.trim().is_empty())
            });

        Self {
            http: Client::new(),
            profile,
            model,
            api_key,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> &str {
        &self.profile.kind
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Number of messages currently held in history.
    pub fn history_len(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn clear_history(&self) {
        if let Ok(mut history) = self.history.lock() {
            history.clear();
        }
    }

    fn push_turn(&self, turn: ChatTurn) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push(turn);
        let excess = history.len().saturating_sub(HISTORY_WINDOW);
        history.drain(..excess);
    }

    /// System prompt followed by the history window.
    pub(crate) fn request_messages(&self) -> Vec<ChatTurn> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let start = history.len().saturating_sub(HISTORY_WINDOW);

        let mut messages = Vec::with_capacity(HISTORY_WINDOW + 1);
        if !self.profile.system_prompt.is_empty() {
            messages.push(ChatTurn::new("system", self.profile.system_prompt.clone()));
        }
        messages.extend(history[start..].iter().cloned());
        messages
    }

    async fn complete(&self, api_key: &str, messages: &[ChatTurn]) -> Result<String> {
        let url = self.model.base_url.as_deref().unwrap_or(OPENAI_API_URL);
        let body = ChatRequest {
            model: &self.model.model_id,
            messages: messages.to_vec(),
            max_tokens: self.model.max_tokens,
            temperature: (self.model.temperature > 0.0).then_some(self.model.temperature),
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ZenflowError::AgentRequest(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(ZenflowError::AgentRequest(format!("HTTP {}: {}", status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ZenflowError::AgentRequest(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ZenflowError::AgentRequest("empty completion".into()))
    }
}

impl AgentCapability for ChatAgent {
    fn id(&self) -> &str {
        &self.profile.id
    }

    fn name(&self) -> &str {
        &self.profile.name
    }

    fn respond(&self, text: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.push_turn(ChatTurn::new("user", text));

            let Some(api_key) = self.api_key.as_deref() else {
                debug!(agent_id = %self.profile.id, "No API key, using canned reply");
                return Ok(fallback_reply(&self.profile.kind, &self.profile.name));
            };

            let messages = self.request_messages();
            let retry = self.model.retry.clone().unwrap_or(RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            });

            let reply = with_retry(&retry, || self.complete(api_key, &messages)).await?;
            info!(
                agent_id = %self.profile.id,
                model = %self.model.model_id,
                chars = reply.len(),
                "Agent replied"
            );

            self.push_turn(ChatTurn::new("assistant", reply.clone()));
            Ok(reply)
        })
    }
}

/// Canned reply used when no model credentials are configured.
pub fn fallback_reply(kind: &str, name: &str) -> String {
    match kind {
        "manager" => format!(
            "[{}] I'll coordinate this task with the team. Configure a model API key for real replies.",
            name
        ),
        "whatsapp" => format!(
            "[{}] Got your message. Configure a model API key to enable automatic replies.",
            name
        ),
        "social_media" => format!(
            "[{}] I'll prepare the content. Configure a model API key to create posts.",
            name
        ),
        "traffic" => format!(
            "[{}] Reviewing campaign metrics. Configure a model API key to optimize campaigns.",
            name
        ),
        _ => format!("[{}] Message received. Configure a model API key.", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(kind: &str) -> AgentProfile {
        AgentProfile {
            id: "mgr".into(),
            name: "Manager".into(),
            kind: kind.into(),
            system_prompt: "You coordinate the agency.".into(),
            model: None,
        }
    }

    fn offline_model() -> ModelConfig {
        ModelConfig {
            provider: "ollama".into(),
            ..ModelConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fallback_without_api_key() {
        let agent = ChatAgent::new(profile("manager"), offline_model());
        assert!(!agent.has_api_key());

        let reply = agent.respond("approve the post".into()).await.unwrap();
        assert!(reply.starts_with("[Manager] I'll coordinate"));
    }

    #[test]
    fn test_fallback_per_kind() {
        assert!(fallback_reply("traffic", "Ads").contains("campaign"));
        assert!(fallback_reply("whatsapp", "Zap").starts_with("[Zap]"));
        assert_eq!(
            fallback_reply("unknown", "X"),
            "[X] Message received. Configure a model API key."
        );
    }

    #[test]
    fn test_explicit_api_key() {
        let model = ModelConfig {
            api_key: Some("sk-test".into()),
            ..offline_model()
        };
        assert!(ChatAgent::new(profile("manager"), model).has_api_key());
    }

    #[test]
    fn test_history_window() {
        let agent = ChatAgent::new(profile("manager"), offline_model());
        for i in 0..25 {
            agent.push_turn(ChatTurn::new("user", format!("msg {}", i)));
        }
        assert_eq!(agent.history_len(), HISTORY_WINDOW);

        let messages = agent.request_messages();
        assert_eq!(messages.len(), HISTORY_WINDOW + 1);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "msg 15");
        assert_eq!(messages[HISTORY_WINDOW].content, "msg 24");

        agent.clear_history();
        assert_eq!(agent.history_len(), 0);
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "gpt-4-turbo",
            messages: vec![ChatTurn::new("user", "hi")],
            max_tokens: 1000,
            temperature: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_parse_completion() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"Done."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Done."));
    }
}
