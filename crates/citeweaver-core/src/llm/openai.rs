//! Chat-completions client for OpenAI-compatible endpoints (OpenAI, vLLM,
//! Ollama, llama.cpp server).

use std::time::Duration;

use serde_json::{Value, json};

use super::{HeadingChoice, LlmError, ModelFuture, TextModel, extract_json, strip_code_fence};
use crate::LlmConfig;

const NORMALIZE_PROMPT: &str = "You clean up bibliography sections extracted from documents. \
Rewrite the text so that every reference occupies exactly one line. Join references that were \
wrapped across several lines, split references that were run together, and drop page headers, \
page numbers and stray fragments that are not part of any reference. Keep the wording of each \
reference unchanged. Output only the references, one per line, with no numbering added and no \
commentary.";

const HEADING_PROMPT: &str = "You are given the list of headings of a document, in order. \
Identify the heading that starts its references or bibliography section. Answer with a JSON \
object of the form {\"heading\": \"<heading text exactly as given>\"}.";

const CITATION_FIELDS: &str = "title, authors (array of full names in citation order), year \
(integer), journal, venue, volume, issue, pages, abstract, doi, arxiv_id, url. Use null for \
anything the text does not state. Do not invent values.";

pub struct OpenAiCompatible {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiCompatible {
    /// Build a client from configuration. The hosted OpenAI endpoint needs an
    /// API key; self-hosted endpoints may run without one.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_none() && config.api_base.contains("api.openai.com") {
            return Err(LlmError::NotConfigured(
                "set LLM_API_KEY or point LLM_API_BASE at a local endpoint".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn chat(&self, system: &str, user: &str, json_mode: bool) -> Result<String, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let mut body = json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let mut req = self.client.post(&url).json(&body);
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let data: Value = resp.json().await?;
        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        tracing::debug!(model = %self.config.model, chars = content.len(), "model replied");
        Ok(content.to_string())
    }
}

impl TextModel for OpenAiCompatible {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn normalize_references<'a>(&'a self, raw: &'a str) -> ModelFuture<'a, String> {
        Box::pin(async move {
            let reply = self.chat(NORMALIZE_PROMPT, raw, false).await?;
            Ok(strip_code_fence(&reply).to_string())
        })
    }

    fn choose_heading<'a>(&'a self, candidates: &'a [String]) -> ModelFuture<'a, HeadingChoice> {
        Box::pin(async move {
            let listing = candidates
                .iter()
                .map(|h| format!("- {h}"))
                .collect::<Vec<_>>()
                .join("\n");
            let reply = self.chat(HEADING_PROMPT, &listing, true).await?;
            let value = extract_json(&reply).ok_or_else(|| LlmError::InvalidJson(reply.clone()))?;
            serde_json::from_value(value).map_err(|e| LlmError::InvalidJson(e.to_string()))
        })
    }

    fn parse_citations<'a>(
        &'a self,
        text: &'a str,
        batched: bool,
    ) -> ModelFuture<'a, Option<Value>> {
        Box::pin(async move {
            let system = if batched {
                format!(
                    "Extract every citation in the text, which holds several references \
                     separated by blank lines. Answer with a JSON object \
                     {{\"citations\": [...]}} containing one object per reference, in order, \
                     with the fields: {CITATION_FIELDS}"
                )
            } else {
                format!(
                    "Extract the bibliographic record described by the text. Answer with one \
                     JSON object with the fields: {CITATION_FIELDS}"
                )
            };
            let reply = self.chat(&system, text, true).await?;
            Ok(extract_json(&reply))
        })
    }
}
