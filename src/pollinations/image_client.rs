use bytes::Bytes;
use rand::Rng;
use reqwest::{header::CONTENT_TYPE, Url};
use std::fmt;

use crate::error::{GenerationError, Result};

/// Characters of a non-image body kept for diagnostics.
const BODY_SNIPPET_CHARS: usize = 200;
const MAX_SEED: u32 = 1_000_000;

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Bytes,
    pub content_type: String,
    pub seed: u32,
}

#[derive(Clone)]
pub struct ImageClient {
    http: reqwest::Client,
    base_url: String,
}

impl ImageClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// `{base}/prompt/{prompt}` with the prompt escaped as a single path segment.
    pub fn prompt_url(&self, prompt: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GenerationError::Config(format!("Invalid base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| GenerationError::Config(format!("Base URL {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .push("prompt")
            .push(prompt);
        Ok(url)
    }

    /// One generation request with a fresh random seed. Headers are checked
    /// before the body is pulled; only image bodies are downloaded in full.
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        width: u32,
        height: u32,
    ) -> Result<GeneratedImage> {
        let seed = random_seed();
        let url = self.prompt_url(prompt)?;
        let params = [
            ("model", model.to_string()),
            ("seed", seed.to_string()),
            ("width", width.to_string()),
            ("height", height.to_string()),
            ("nologo", "true".to_string()),
        ];

        log::debug!("Requesting {} with {:?}", url, params);

        let response = self
            .http
            .get(url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match content_type {
            Some(content_type) if content_type.contains("image") => {
                let bytes = response.bytes().await?;
                log::debug!(
                    "Model {} returned {} bytes of {} (seed {})",
                    model,
                    bytes.len(),
                    content_type,
                    seed
                );
                Ok(GeneratedImage {
                    bytes,
                    content_type,
                    seed,
                })
            }
            other => {
                Err(GenerationError::UnexpectedContentType {
                    content_type: other.unwrap_or_else(|| "none".to_string()),
                    snippet: body_snippet(response.text().await),
                })
            }
        }
    }
}

fn body_snippet<E: fmt::Display>(body: std::result::Result<String, E>) -> String {
    match body {
        Ok(body) => body.chars().take(BODY_SNIPPET_CHARS).collect(),
        Err(e) => format!("<unreadable body: {}>", e),
    }
}

fn random_seed() -> u32 {
    rand::thread_rng().gen_range(1..=MAX_SEED)
}
