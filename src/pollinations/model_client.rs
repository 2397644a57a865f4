use reqwest::StatusCode;
use std::time::Duration;

use crate::error::{GenerationError, Result};

#[derive(Clone)]
pub struct ModelClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ModelClient {
    pub fn new(http: reqwest::Client, base_url: String, timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            timeout,
        }
    }

    /// Fetches the remote model catalogue, sorted by name.
    pub async fn list(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        log::info!("Fetching model list from {}", url);

        let response = self.http.get(&url).timeout(self.timeout).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(GenerationError::Status(format!(
                "Model list request returned {}",
                status
            )));
        }

        let body = response.text().await?;
        let mut models: Vec<String> = serde_json::from_str(&body).map_err(|e| {
            GenerationError::Serialization(format!("Unexpected model list format: {}", e))
        })?;
        models.sort();

        log::info!("Loaded {} remote models", models.len());
        Ok(models)
    }
}
