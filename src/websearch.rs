//! Web search fallback via the DuckDuckGo instant-answer API.
//!
//! Best effort by design: the orchestrator treats any failure here as "no
//! results" rather than failing the whole answer, so errors stay `anyhow`
//! and are logged, not escalated.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::WebSearchConfig;

/// Web search boundary. Returns `Ok(None)` when the search succeeded but
/// produced nothing usable.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Option<String>>;
}

/// DuckDuckGo instant-answer client. No API key required.
pub struct DuckDuckGo {
    config: WebSearchConfig,
    client: reqwest::Client,
}

impl DuckDuckGo {
    pub fn new(config: WebSearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGo {
    async fn search(&self, query: &str) -> Result<Option<String>> {
        let url = format!("{}/", self.config.endpoint.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .context("web search request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("web search returned {}", resp.status());
        }

        let json: serde_json::Value = resp.json().await.context("web search returned non-JSON")?;
        Ok(extract_results(&json))
    }
}

/// Collect the abstract and related-topic snippets into one context block.
fn extract_results(json: &serde_json::Value) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(abstract_text) = json.get("Abstract").and_then(|v| v.as_str()) {
        if !abstract_text.trim().is_empty() {
            parts.push(abstract_text.trim().to_string());
        }
    }

    if let Some(topics) = json.get("RelatedTopics").and_then(|v| v.as_array()) {
        for topic in topics {
            collect_topic_text(topic, &mut parts);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

// Related topics are either flat entries with a Text field or named groups
// holding a nested Topics array.
fn collect_topic_text(topic: &serde_json::Value, parts: &mut Vec<String>) {
    if let Some(text) = topic.get("Text").and_then(|v| v.as_str()) {
        if !text.trim().is_empty() {
            parts.push(text.trim().to_string());
        }
    }
    if let Some(nested) = topic.get("Topics").and_then(|v| v.as_array()) {
        for inner in nested {
            collect_topic_text(inner, parts);
        }
    }
}
