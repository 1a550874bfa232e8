use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// How the controller treats a response that arrives after a newer request
/// of the same kind was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseOrdering {
    /// Drop responses whose request is no longer the latest one.
    #[default]
    DiscardStale,
    /// Apply every response in arrival order.
    ApplyAll,
}

impl std::str::FromStr for ResponseOrdering {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard-stale" | "discard_stale" => Ok(Self::DiscardStale),
            "apply-all" | "apply_all" => Ok(Self::ApplyAll),
            other => Err(anyhow::anyhow!("unknown response ordering {other:?}")),
        }
    }
}

/// Runtime configuration for the chat client and the demo backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub backend_url: url::Url,
    pub request_timeout: Duration,
    pub bind_addr: SocketAddr,
    pub response_ordering: ResponseOrdering,
    pub speech_command: Option<String>,
    pub pdf_catalog_path: Option<PathBuf>,
    pub enable_cors: bool,
}

impl ChatConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_url = lookup("BACKEND_URL")
            .unwrap_or_else(|| "http://127.0.0.1:8080".to_string())
            .parse()
            .context("failed to parse BACKEND_URL")?;

        let request_timeout = lookup("REQUEST_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_secs(30));

        let bind_addr: SocketAddr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("failed to parse BIND_ADDR")?;

        let response_ordering = match lookup("RESPONSE_ORDERING") {
            Some(v) => v.parse().context("failed to parse RESPONSE_ORDERING")?,
            None => ResponseOrdering::default(),
        };

        let speech_command = lookup("SPEECH_COMMAND").filter(|v| !v.trim().is_empty());
        let pdf_catalog_path = lookup("PDF_CATALOG_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let enable_cors = lookup("ENABLE_CORS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        Ok(Self {
            backend_url,
            request_timeout,
            bind_addr,
            response_ordering,
            speech_command,
            pdf_catalog_path,
            enable_cors,
        })
    }
}
