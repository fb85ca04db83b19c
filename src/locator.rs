//! Text locators for the coordinate mapper's assisted layer.
//!
//! - **[`OllamaLocator`]**: asks a local Ollama model to copy the passage
//!   of the context that corresponds to an anchor.
//!
//! The mapper verifies every excerpt against the context, so a model that
//! paraphrases instead of copying simply fails to place the anchor.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use rhizome_core::mapper::TextLocator;

use crate::config::LocatorConfig;
use crate::embedding::{post_with_retry, DEFAULT_OLLAMA_URL};

/// Reply the model gives when nothing in the context corresponds.
const NO_MATCH: &str = "NONE";

/// Create the locator named by `config.provider`, or `None` when disabled.
pub fn create_locator(config: &LocatorConfig) -> Result<Option<Arc<dyn TextLocator>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "ollama" => Ok(Some(Arc::new(OllamaLocator::new(config)?))),
        other => bail!("Unknown locator provider: {}", other),
    }
}

/// Locator backed by Ollama's `POST /api/generate`.
pub struct OllamaLocator {
    model: String,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaLocator {
    pub fn new(config: &LocatorConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("locator.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl TextLocator for OllamaLocator {
    async fn locate(&self, anchor_text: &str, context: &str) -> Result<Option<String>> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": build_prompt(anchor_text, context),
            "stream": false,
            "options": { "temperature": 0 },
        });
        let endpoint = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let json = post_with_retry("Ollama", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await
        .map_err(|e| anyhow!("{} (is Ollama running at {}?)", e, self.url))?;
        parse_generate_response(&json)
    }
}

fn build_prompt(anchor_text: &str, context: &str) -> String {
    format!(
        "The ANCHOR below was extracted from a page layout. The CONTEXT is the same \
         region of the document after cleanup, so wording may differ slightly.\n\
         Copy, character for character, the passage of CONTEXT that corresponds to ANCHOR. \
         Reply with that passage only. If nothing corresponds, reply {NO_MATCH}.\n\n\
         ANCHOR:\n{anchor_text}\n\nCONTEXT:\n{context}\n"
    )
}

/// Pull the excerpt out of a non-streaming `/api/generate` reply.
fn parse_generate_response(json: &serde_json::Value) -> Result<Option<String>> {
    let reply = json
        .get("response")
        .and_then(|r| r.as_str())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing response field"))?;

    let excerpt = reply.trim().trim_matches('"').trim();
    if excerpt.is_empty() || excerpt.eq_ignore_ascii_case(NO_MATCH) {
        return Ok(None);
    }
    Ok(Some(excerpt.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_excerpt() {
        let json = serde_json::json!({"response": "  \"The argument from design fails.\"\n"});
        assert_eq!(
            parse_generate_response(&json).unwrap().as_deref(),
            Some("The argument from design fails.")
        );
    }

    #[test]
    fn test_parse_no_match() {
        let json = serde_json::json!({"response": "none"});
        assert_eq!(parse_generate_response(&json).unwrap(), None);
        let json = serde_json::json!({"response": "   "});
        assert_eq!(parse_generate_response(&json).unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_malformed_reply() {
        let json = serde_json::json!({"error": "model not found"});
        assert!(parse_generate_response(&json).is_err());
    }

    #[test]
    fn test_prompt_carries_both_texts() {
        let prompt = build_prompt("anchor words", "context words");
        assert!(prompt.contains("ANCHOR:\nanchor words"));
        assert!(prompt.contains("CONTEXT:\ncontext words"));
    }

    #[test]
    fn test_create_locator() {
        assert!(create_locator(&LocatorConfig::default()).unwrap().is_none());

        let config = LocatorConfig {
            provider: "ollama".to_string(),
            model: Some("llama3.2".to_string()),
            ..Default::default()
        };
        assert!(create_locator(&config).unwrap().is_some());

        let config = LocatorConfig {
            provider: "ollama".to_string(),
            ..Default::default()
        };
        assert!(create_locator(&config).is_err());
    }
}
