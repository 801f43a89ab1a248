use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// What is playing upstream right now
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteState {
    pub track_id: String,
    pub position_seconds: f64,
}

impl RemoteState {
    /// Extract the track identity and position from a player payload
    ///
    /// Expects `{"track": {"id": ...}, "position": <seconds>}`; everything else
    /// is ignored. Returns `None` when no usable identity or position is found.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let track_id = match payload.get("track")?.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let position = match payload.get("position") {
            None => 0.0,
            Some(Value::Number(n)) => n.as_f64()?,
            Some(Value::String(s)) => s.trim().parse::<f64>().ok()?,
            Some(_) => return None,
        };

        if !position.is_finite() {
            return None;
        }

        Some(Self {
            track_id,
            position_seconds: position.max(0.0),
        })
    }
}

/// Strip bulky fields (lyrics) before logging a payload
pub fn sanitize_for_log(payload: &Value) -> Value {
    let mut cleaned = payload.clone();
    if let Some(track) = cleaned.get_mut("track").and_then(Value::as_object_mut) {
        track.remove("lyrics");
    }
    cleaned
}

/// Source of remote playback state
///
/// Never fails: any problem is reported as `None` ("unavailable").
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn fetch(&self) -> Option<RemoteState>;
}

/// Polls a JSON player endpoint over HTTP
pub struct HttpStateSource {
    client: reqwest::Client,
    url: String,
}

impl HttpStateSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch_payload(&self) -> reqwest::Result<Value> {
        self.client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await
    }
}

#[async_trait]
impl StateSource for HttpStateSource {
    async fn fetch(&self) -> Option<RemoteState> {
        let payload = match self.fetch_payload().await {
            Ok(payload) => payload,
            Err(e) if e.is_timeout() => {
                tracing::warn!("Timed out fetching player state from {}", self.url);
                return None;
            }
            Err(e) if e.is_decode() => {
                tracing::warn!("Player state from {} is not valid JSON: {}", self.url, e);
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to fetch player state from {}: {}", self.url, e);
                return None;
            }
        };

        tracing::debug!("Fetched state: {}", sanitize_for_log(&payload));

        let state = RemoteState::from_payload(&payload);
        if state.is_none() {
            tracing::debug!("No valid track info found in API response");
        }
        state
    }
}
