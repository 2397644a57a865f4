pub mod image_client;
pub mod model_client;

use crate::{
    config::GeneratorConfig,
    error::{GenerationError, Result},
};

pub use image_client::{GeneratedImage, ImageClient};
pub use model_client::ModelClient;

#[derive(Clone)]
pub struct PollinationsClient {
    image_client: ImageClient,
    model_client: ModelClient,
}

impl PollinationsClient {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GenerationError::Config(format!("Failed to build HTTP client: {}", e)))?;

        log::debug!(
            "Pollinations client ready: base={} timeout={}s",
            config.base_url,
            config.request_timeout.as_secs_f32()
        );

        Ok(Self {
            image_client: ImageClient::new(http.clone(), config.base_url.clone()),
            model_client: ModelClient::new(http, config.base_url.clone(), config.models_timeout),
        })
    }

    pub fn image(&self) -> &ImageClient {
        &self.image_client
    }

    pub fn models(&self) -> &ModelClient {
        &self.model_client
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.model_client.list().await
    }
}
