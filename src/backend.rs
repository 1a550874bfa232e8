use crate::form::CustomizeRecord;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const GREETING_ENDPOINT: &str = "get_greeting";
pub const MESSAGE_ENDPOINT: &str = "get";
pub const MENU_ENDPOINT: &str = "get_buttons";
pub const CUSTOMIZE_ENDPOINT: &str = "submit_customize_data";

/// Response tag the message endpoint uses for image-bearing replies.
pub const COOLING_GRAPH_TYPE: &str = "cooling_graph";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuButton {
    pub label: String,
    pub value: String,
}

impl MenuButton {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Greeting {
    pub greeting: String,
    #[serde(default)]
    pub buttons: Vec<MenuButton>,
}

/// One level of the product menu. An empty `buttons` list marks a leaf.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MenuLevel {
    #[serde(default)]
    pub current_label: String,
    #[serde(default)]
    pub buttons: Vec<MenuButton>,
    #[serde(default)]
    pub has_children: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

impl MenuLevel {
    pub fn is_leaf(&self) -> bool {
        self.buttons.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageReply {
    /// Pre-formatted markup, rendered verbatim.
    Markup(String),
    CoolingGraph {
        model_name: String,
        image_url: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoolingGraphPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "modelName")]
    pub model_name: String,
    #[serde(rename = "coolingImageUrl")]
    pub cooling_image_url: String,
}

impl MessageReply {
    /// Interpret a JSON body from the message endpoint.
    pub fn from_json(value: Value) -> Self {
        if value.get("type").and_then(Value::as_str) == Some(COOLING_GRAPH_TYPE) {
            match serde_json::from_value::<CoolingGraphPayload>(value.clone()) {
                Ok(graph) => {
                    return MessageReply::CoolingGraph {
                        model_name: graph.model_name,
                        image_url: graph.cooling_image_url,
                    };
                }
                Err(err) => debug!(?err, "cooling graph payload incomplete; rendering raw"),
            }
        }
        match value {
            Value::String(text) => MessageReply::Markup(text),
            other => MessageReply::Markup(other.to_string()),
        }
    }
}

/// Body of the customize-data endpoint: `{message}` or `{error}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned status {status}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
    },
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// The four endpoints the chat controller talks to.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn greeting(&self) -> Result<Greeting, BackendError>;
    async fn send_message(&self, msg: &str, button_path: &str)
    -> Result<MessageReply, BackendError>;
    async fn menu(&self, selected_button: &str) -> Result<MenuLevel, BackendError>;
    async fn submit_customize(&self, record: &CustomizeRecord)
    -> Result<SubmitAck, BackendError>;
}

/// reqwest-backed client for a live backend.
#[derive(Clone)]
pub struct HttpChatBackend {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpChatBackend {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::Client)?;
        Ok(Self {
            base_url: with_trailing_slash(base_url),
            client,
        })
    }

    fn endpoint(&self, name: &str) -> Result<Url, BackendError> {
        Ok(self.base_url.join(name)?)
    }

    async fn send(
        &self,
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        let resp = request
            .send()
            .await
            .map_err(|source| BackendError::Transport { endpoint, source })?;
        let status = resp.status();
        debug!(%endpoint, %status, "backend responded");
        if !status.is_success() {
            return Err(BackendError::Status { endpoint, status });
        }
        Ok(resp)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        endpoint: &'static str,
        resp: reqwest::Response,
    ) -> Result<T, BackendError> {
        let bytes = resp
            .bytes()
            .await
            .map_err(|source| BackendError::Transport { endpoint, source })?;
        serde_json::from_slice(&bytes).map_err(|source| BackendError::Decode { endpoint, source })
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn is_json(resp: &reqwest::Response) -> bool {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false)
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn greeting(&self) -> Result<Greeting, BackendError> {
        let url = self.endpoint(GREETING_ENDPOINT)?;
        let resp = self
            .send(GREETING_ENDPOINT, self.client.get(url))
            .await?;
        Self::read_json(GREETING_ENDPOINT, resp).await
    }

    async fn send_message(
        &self,
        msg: &str,
        button_path: &str,
    ) -> Result<MessageReply, BackendError> {
        let url = self.endpoint(MESSAGE_ENDPOINT)?;
        let request = self
            .client
            .post(url)
            .form(&[("msg", msg), ("button_path", button_path)]);
        let resp = self.send(MESSAGE_ENDPOINT, request).await?;
        if is_json(&resp) {
            let value: Value = Self::read_json(MESSAGE_ENDPOINT, resp).await?;
            return Ok(MessageReply::from_json(value));
        }
        let body = resp.text().await.map_err(|source| BackendError::Transport {
            endpoint: MESSAGE_ENDPOINT,
            source,
        })?;
        Ok(MessageReply::Markup(body))
    }

    async fn menu(&self, selected_button: &str) -> Result<MenuLevel, BackendError> {
        let url = self.endpoint(MENU_ENDPOINT)?;
        let request = self
            .client
            .post(url)
            .form(&[("selected_button", selected_button)]);
        let resp = self.send(MENU_ENDPOINT, request).await?;
        Self::read_json(MENU_ENDPOINT, resp).await
    }

    async fn submit_customize(
        &self,
        record: &CustomizeRecord,
    ) -> Result<SubmitAck, BackendError> {
        let url = self.endpoint(CUSTOMIZE_ENDPOINT)?;
        // The endpoint reports failures as `{error}` bodies, so the body is read
        // before the status is judged.
        let resp = self
            .client
            .post(url)
            .json(record)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                endpoint: CUSTOMIZE_ENDPOINT,
                source,
            })?;
        let status = resp.status();
        match Self::read_json::<SubmitAck>(CUSTOMIZE_ENDPOINT, resp).await {
            Ok(ack) => Ok(ack),
            Err(_) if !status.is_success() => Err(BackendError::Status {
                endpoint: CUSTOMIZE_ENDPOINT,
                status,
            }),
            Err(err) => Err(err),
        }
    }
}
