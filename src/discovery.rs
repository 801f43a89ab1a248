use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// URL fragments that mark a likely audio stream
pub const STREAM_HINTS: [&str; 8] = [
    ".m3u8", ".mp3", ".aac", ".ogg", ".opus", ".flac", ".ts", ".webm",
];

/// A URL is a candidate if it carries a media hint or is served as audio
pub fn is_stream_candidate(url: &str, content_type: Option<&str>) -> bool {
    let lowered = url.to_lowercase();
    if STREAM_HINTS.iter().any(|hint| lowered.contains(hint)) {
        return true;
    }
    content_type.is_some_and(|ct| ct.to_lowercase().contains("audio"))
}

/// Ordered, de-duplicated candidate list (first seen wins)
#[derive(Debug, Default)]
pub struct Candidates {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl Candidates {
    pub fn push(&mut self, url: String) {
        if self.seen.insert(url.clone()) {
            self.ordered.push(url);
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

/// Finds the media URL(s) behind a player page
#[async_trait]
pub trait StreamDiscovery: Send + Sync {
    async fn discover(&self, player_url: &str) -> Result<Vec<String>>;
}

/// Discovers streams by fetching the player page and scanning its markup
///
/// Covers pages that reference their stream directly (an `<audio src>`, an
/// HLS URL in inline script, or a player URL that is itself the stream).
pub struct PageDiscovery {
    client: reqwest::Client,
    absolute_url: Regex,
    attribute_url: Regex,
}

impl PageDiscovery {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            absolute_url: Regex::new(r#"https?://[^\s"'<>`\\]+"#)?,
            attribute_url: Regex::new(r#"(?i)\b(?:src|href)\s*=\s*["']([^"']+)["']"#)?,
        })
    }

    /// Collect candidate URLs from a page body in document order
    pub fn scan_page(&self, base: &Url, body: &str) -> Vec<String> {
        let mut found: Vec<(usize, String)> = self
            .absolute_url
            .find_iter(body)
            .map(|m| (m.start(), m.as_str().to_string()))
            .collect();

        for caps in self.attribute_url.captures_iter(body) {
            if let Some(value) = caps.get(1) {
                if let Ok(resolved) = base.join(value.as_str()) {
                    found.push((value.start(), resolved.to_string()));
                }
            }
        }
        found.sort_by_key(|(offset, _)| *offset);

        let mut candidates = Candidates::default();
        for (_, url) in found {
            if is_stream_candidate(&url, None) {
                candidates.push(url);
            }
        }
        candidates.into_vec()
    }
}

#[async_trait]
impl StreamDiscovery for PageDiscovery {
    async fn discover(&self, player_url: &str) -> Result<Vec<String>> {
        tracing::info!("Loading player page {}", player_url);

        let response = self
            .client
            .get(player_url)
            .send()
            .await
            .with_context(|| format!("Failed to load player page {}", player_url))?
            .error_for_status()
            .with_context(|| format!("Player page {} returned an error", player_url))?;

        let page_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // The player URL is the stream itself; don't try to read it to the end
        if content_type
            .as_deref()
            .is_some_and(|ct| ct.to_lowercase().contains("audio"))
        {
            return Ok(vec![page_url.to_string()]);
        }

        let body = response
            .text()
            .await
            .context("Failed to read player page")?;

        let candidates = self.scan_page(&page_url, &body);
        tracing::debug!("Found {} stream candidates", candidates.len());
        Ok(candidates)
    }
}
